//! Deterministic system-prompt assembly (spec §4.4.1).
//!
//! Grounded in `original_source/massgen/system_prompt_sections.py`'s
//! priority-ordered, XML-tag-wrapped section architecture ("Position is
//! Power": instructions near the top of a prompt are followed more
//! reliably). Sections render lowest-priority-number-first; a
//! lower-priority-number section is understood to take precedence over a
//! higher one if their instructions conflict.

use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Critical = 1,
    High = 5,
    Medium = 10,
    Low = 15,
    Auxiliary = 20,
}

/// One piece of an agent's system prompt (spec §4.4.1: "identity,
/// coordination primitives, skills, memory, workspace description, task").
pub trait PromptSection {
    fn title(&self) -> &str;
    fn priority(&self) -> Priority;
    fn xml_tag(&self) -> &str;
    fn enabled(&self) -> bool {
        true
    }
    fn build_content(&self) -> String;

    /// `<tag priority="...">content</tag>`, matching the teacher's
    /// `SystemPromptSection::render` example.
    fn render(&self) -> String {
        format!(
            "<{tag} priority=\"{priority}\">\n{content}\n</{tag}>",
            tag = self.xml_tag(),
            priority = self.priority(),
            content = self.build_content()
        )
    }
}

/// A plain-text section with a fixed priority, sufficient for the common
/// cases (identity, task, workspace description) that don't need a bespoke
/// `PromptSection` impl.
pub struct StaticSection {
    pub title: String,
    pub priority: Priority,
    pub xml_tag: String,
    pub content: String,
    pub enabled: bool,
}

impl StaticSection {
    pub fn new(
        title: impl Into<String>,
        priority: Priority,
        xml_tag: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            priority,
            xml_tag: xml_tag.into(),
            content: content.into(),
            enabled: true,
        }
    }
}

impl PromptSection for StaticSection {
    fn title(&self) -> &str {
        &self.title
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn xml_tag(&self) -> &str {
        &self.xml_tag
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    fn build_content(&self) -> String {
        self.content.clone()
    }
}

/// Assemble the final prompt: disabled sections are dropped, the rest are
/// sorted by priority (ascending, so `Critical` renders first) and joined
/// with a blank line. A stable sort preserves caller-supplied order among
/// sections that share a priority, so assembly is a pure function of the
/// input list (spec §4.4.1 "deterministic given the same inputs").
pub fn assemble_prompt(sections: &[Box<dyn PromptSection>]) -> String {
    let mut enabled: Vec<&Box<dyn PromptSection>> =
        sections.iter().filter(|s| s.enabled()).collect();
    enabled.sort_by_key(|s| s.priority());
    enabled
        .iter()
        .map(|s| s.render())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// The fixed coordination-primitives section every agent gets, describing
/// `new_answer`/`vote` (spec §4.4 step 2). High priority: this instruction
/// must not be overridden by a lower-priority skill or memory section.
pub fn coordination_primitives_section() -> StaticSection {
    StaticSection::new(
        "coordination primitives",
        Priority::Critical,
        "coordination",
        "Call `new_answer` with your proposed answer, or `vote` for another \
         agent's answer by agent_id. Calling one replaces whichever of the \
         two you called most recently.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembly_orders_by_priority_ascending() {
        let sections: Vec<Box<dyn PromptSection>> = vec![
            Box::new(StaticSection::new("task", Priority::Low, "task", "do X")),
            Box::new(coordination_primitives_section()),
        ];
        let rendered = assemble_prompt(&sections);
        let coord_pos = rendered.find("coordination").unwrap();
        let task_pos = rendered.find("task").unwrap();
        assert!(coord_pos < task_pos);
    }

    #[test]
    fn disabled_sections_are_dropped() {
        let mut disabled = StaticSection::new("skills", Priority::Medium, "skills", "unused");
        disabled.enabled = false;
        let sections: Vec<Box<dyn PromptSection>> = vec![Box::new(disabled)];
        assert_eq!(assemble_prompt(&sections), "");
    }
}
