//! Orchestrator (spec §4.5): the per-turn state machine. Owns all
//! coordination state; runners reach it only by sending `RunnerEvent`s, never
//! by touching shared memory directly (spec §5 "Shared-resource policy").
//!
//! Grounded in the teacher's `codex.rs` `Session` + `AgentTask` pattern: one
//! `tokio::spawn` per concurrent unit of work, each cancellable through an
//! `AbortHandle`/`CancellationToken`, reporting back over a channel that a
//! single owning task drains and folds into its own state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use futures::StreamExt;
use massgen_protocol::AgentState;
use massgen_protocol::Message;
use massgen_protocol::RestartTrigger;
use massgen_protocol::Role;
use massgen_protocol::StreamChunk;
use massgen_protocol::ToolCall;
use massgen_protocol::ToolResult;
use massgen_protocol::ToolSpec;
use massgen_protocol::VotePolicy;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agent::Agent;
use crate::agent::AgentContext;
use crate::attempt_storage::AttemptStorage;
use crate::backend::TurnContext;
use crate::conversation_history::ConversationHistory;
use crate::coordination_tracker::CoordinationTracker;
use crate::coordination_tracker::EventType;
use crate::error::CoreError;
use crate::error::Result;
use crate::tools::ToolHandler;
use crate::tools::is_coordination_tool;

const MAX_TOOL_ROUNDS: u32 = 8;

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown-time".to_string())
}

fn coordination_tool_specs(task_tools: &[ToolSpec], restart_tool_name: &str) -> Vec<ToolSpec> {
    let mut tools = vec![
        ToolSpec {
            name: "new_answer".to_string(),
            description: "Propose the answer for this turn.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"content": {"type": "string"}},
                "required": ["content"],
            }),
        },
        ToolSpec {
            name: "vote".to_string(),
            description: "Vote for another agent's proposed answer.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "agent_id": {"type": "string"},
                    "reason": {"type": "string"},
                },
                "required": ["agent_id"],
            }),
        },
        ToolSpec {
            name: restart_tool_name.to_string(),
            description: "Ask the orchestrator to restart this turn with a fresh attempt.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"reason": {"type": "string"}},
            }),
        },
    ];
    tools.extend(task_tools.iter().cloned());
    tools
}

/// What a runner reports back to the orchestrator (spec §4.4 step 3, §4.5
/// transitions). The orchestrator, not the runner, owns `AgentState`.
#[derive(Debug)]
enum RunnerEvent {
    NewAnswer {
        agent_id: String,
        answer: String,
    },
    Vote {
        agent_id: String,
        target_agent_id: String,
        reason: Option<String>,
    },
    RestartRequested {
        agent_id: String,
        reason: Option<String>,
    },
    Completed {
        agent_id: String,
    },
    Failed {
        agent_id: String,
        reason: String,
    },
}

/// Runs one agent's attempt to `done` (or further rounds of tool use),
/// translating the backend's chunk stream into `RunnerEvent`s (spec §4.4).
#[allow(clippy::too_many_arguments)]
async fn run_agent_runner(
    agent: Arc<Agent>,
    mut messages: Vec<Message>,
    tools: Vec<ToolSpec>,
    tool_handler: Option<Arc<dyn ToolHandler>>,
    tx: mpsc::Sender<RunnerEvent>,
    cancel: CancellationToken,
    restart_tool_name: String,
) {
    let agent_id = agent.agent_id.clone();
    let permissions = Arc::new(agent.permission_manager());
    let ctx = AgentContext {
        agent_id: agent_id.clone(),
        permissions: permissions.clone(),
    };

    let mut round = 0u32;
    loop {
        round += 1;
        if round > MAX_TOOL_ROUNDS {
            let _ = tx
                .send(RunnerEvent::Failed {
                    agent_id: agent_id.clone(),
                    reason: "exceeded the maximum number of tool-call rounds for one attempt".to_string(),
                })
                .await;
            return;
        }

        let turn_ctx = TurnContext {
            agent_id: agent_id.clone(),
        };
        let mut stream = agent
            .backend
            .execute_streaming(messages.clone(), tools.clone(), turn_ctx)
            .await;

        let mut assistant_text = String::new();
        let mut pending_tool_calls: Vec<ToolCall> = Vec::new();
        let mut coordination_seen = false;
        let mut terminated_with_error = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = tx.send(RunnerEvent::Completed { agent_id: agent_id.clone() }).await;
                    return;
                }
                chunk = stream.next() => {
                    match chunk {
                        None => break,
                        Some(Err(e)) => {
                            let _ = tx.send(RunnerEvent::Failed { agent_id: agent_id.clone(), reason: e.user_message() }).await;
                            return;
                        }
                        Some(Ok(StreamChunk::Content { text })) => assistant_text.push_str(&text),
                        Some(Ok(StreamChunk::Reasoning { .. })) => {}
                        Some(Ok(StreamChunk::ToolCalls { calls })) => {
                            record_calls(calls, &mut pending_tool_calls, &mut coordination_seen, &agent_id, &tx, &restart_tool_name).await;
                        }
                        Some(Ok(StreamChunk::ToolResult { .. })) => {}
                        Some(Ok(StreamChunk::CompleteMessage { tool_calls, .. })) => {
                            let fresh: Vec<ToolCall> = tool_calls
                                .into_iter()
                                .filter(|c| !pending_tool_calls.iter().any(|p| p.id == c.id))
                                .collect();
                            record_calls(fresh, &mut pending_tool_calls, &mut coordination_seen, &agent_id, &tx, &restart_tool_name).await;
                        }
                        Some(Ok(StreamChunk::Status { .. })) => {}
                        Some(Ok(StreamChunk::Error { message })) => {
                            terminated_with_error = true;
                            let _ = tx.send(RunnerEvent::Failed { agent_id: agent_id.clone(), reason: message }).await;
                        }
                        Some(Ok(StreamChunk::Done)) => break,
                    }
                }
            }
        }

        if terminated_with_error {
            return;
        }

        if pending_tool_calls.is_empty() {
            if !coordination_seen {
                let _ = tx
                    .send(RunnerEvent::Completed {
                        agent_id: agent_id.clone(),
                    })
                    .await;
            }
            return;
        }

        messages.push(Message {
            role: Role::Assistant,
            content: assistant_text,
            tool_calls: pending_tool_calls.clone(),
            tool_call_id: None,
        });
        for call in &pending_tool_calls {
            let result = dispatch_tool_call(call, &permissions, tool_handler.as_deref(), &ctx).await;
            messages.push(Message {
                role: Role::Tool,
                content: result.output,
                tool_calls: Vec::new(),
                tool_call_id: Some(result.call_id),
            });
        }
    }
}

/// Splits freshly observed tool calls into coordination events (sent
/// immediately) and ordinary calls (accumulated for dispatch once the stream
/// reaches `done`, per spec §4.4 step 3).
async fn record_calls(
    calls: Vec<ToolCall>,
    pending: &mut Vec<ToolCall>,
    coordination_seen: &mut bool,
    agent_id: &str,
    tx: &mpsc::Sender<RunnerEvent>,
    restart_tool_name: &str,
) {
    for call in calls {
        if let Some(answer) = call.as_new_answer() {
            *coordination_seen = true;
            let _ = tx
                .send(RunnerEvent::NewAnswer {
                    agent_id: agent_id.to_string(),
                    answer,
                })
                .await;
        } else if let Some((target_agent_id, reason)) = call.as_vote() {
            *coordination_seen = true;
            let _ = tx
                .send(RunnerEvent::Vote {
                    agent_id: agent_id.to_string(),
                    target_agent_id,
                    reason,
                })
                .await;
        } else if let Some(reason) = call.as_restart_request(restart_tool_name) {
            let _ = tx
                .send(RunnerEvent::RestartRequested {
                    agent_id: agent_id.to_string(),
                    reason,
                })
                .await;
        } else if is_coordination_tool(&call.name) {
            // Reserved name with arguments that didn't parse (spec §9:
            // "malformed arguments downgrade to ProtocolError"); drop it.
            warn!(agent_id, tool_name = %call.name, "dropping malformed coordination tool call");
        } else {
            pending.push(call);
        }
    }
}

async fn dispatch_tool_call(
    call: &ToolCall,
    permissions: &crate::permission::PermissionManager,
    tool_handler: Option<&dyn ToolHandler>,
    ctx: &AgentContext,
) -> ToolResult {
    let (allowed, reason) = permissions.check_call(&call.name, &call.arguments);
    if !allowed {
        return ToolResult {
            call_id: call.id.clone(),
            output: reason,
            is_error: true,
        };
    }
    match tool_handler {
        Some(handler) => handler.handle(&call.name, call.arguments.clone(), ctx).await,
        None => ToolResult {
            call_id: call.id.clone(),
            output: "no tool handler is configured for this agent".to_string(),
            is_error: true,
        },
    }
}

/// Per-agent bookkeeping the orchestrator keeps across one attempt, beyond
/// what `AgentState` itself carries (spec §4.5 winner-selection tie-break 2
/// needs an actual instant, not just the round number `AgentState` stores).
#[derive(Default)]
struct AttemptState {
    states: HashMap<String, AgentState>,
    answer_observed_at: HashMap<String, Instant>,
    /// Votes for an agent that hadn't reached `has_answer` yet (spec §4.5
    /// "votes for not-yet-answered agents are queued").
    pending_votes: HashMap<String, (String, Option<String>)>,
    restart_requested: Option<RestartTrigger>,
}

enum Closure {
    Winner {
        agent_id: String,
    },
    Restart(RestartTrigger),
}

pub struct TurnOutcome {
    pub winner_agent_id: String,
    pub answer: String,
    pub attempt_number: u64,
}

pub struct Orchestrator {
    agents: Vec<Arc<Agent>>,
    task_tools: Vec<ToolSpec>,
    per_attempt_timeout: Duration,
    max_restarts_per_turn: u32,
    vote_policy: VotePolicy,
    storage: Arc<AttemptStorage>,
    tracker: Arc<CoordinationTracker>,
    tool_handler: Option<Arc<dyn ToolHandler>>,
    /// Name of the tool-call an agent issues to request a restart (spec
    /// §4.5 step 5), configurable per `OrchestratorConfig::restart_tool_name`.
    restart_tool_name: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        agents: Vec<Arc<Agent>>,
        task_tools: Vec<ToolSpec>,
        per_attempt_timeout: Duration,
        max_restarts_per_turn: u32,
        vote_policy: VotePolicy,
        storage: Arc<AttemptStorage>,
        tracker: Arc<CoordinationTracker>,
        tool_handler: Option<Arc<dyn ToolHandler>>,
        restart_tool_name: String,
    ) -> Self {
        Self {
            agents,
            task_tools,
            per_attempt_timeout,
            max_restarts_per_turn,
            vote_policy,
            storage,
            tracker,
            tool_handler,
            restart_tool_name,
        }
    }

    /// Runs every attempt of one turn to completion: restarts loop internally
    /// until a winner is selected or the restart budget is exhausted (spec
    /// §4.5 steps 4-6).
    pub async fn run_turn(&self, session_id: &str, turn_number: u64, task: &str, history: &[Message]) -> Result<TurnOutcome> {
        if self.agents.is_empty() {
            return Err(CoreError::RestartExhausted(0));
        }

        self.tracker.record(
            EventType::ContextReceived,
            None,
            Some(1),
            format!("turn {turn_number} task received"),
            now_rfc3339(),
        );

        let mut attempt_number: u64 = 1;
        let mut restarts_used: u32 = 0;
        let mut briefing: Option<String> = None;

        loop {
            let (closure, state, answers) = self
                .run_attempt(session_id, attempt_number, task, history, briefing.as_deref())
                .await?;

            match closure {
                Closure::Winner { agent_id } => {
                    let workspace = self
                        .agents
                        .iter()
                        .find(|a| a.agent_id == agent_id)
                        .map(|a| a.workspace.path.clone());
                    let answer = self.final_presentation(session_id, attempt_number, &agent_id, task, history, &answers).await?;

                    self.storage
                        .save_attempt(
                            session_id,
                            turn_number,
                            attempt_number,
                            task,
                            &answer,
                            Some(agent_id.clone()),
                            workspace.as_deref(),
                            None,
                            None,
                            &now_rfc3339(),
                        )
                        .await?;
                    self.storage.mark_successful_attempt(session_id, turn_number, attempt_number).await?;

                    self.tracker.record(
                        EventType::FinalAgentSelected,
                        Some(agent_id.clone()),
                        Some(attempt_number),
                        "winner selected",
                        now_rfc3339(),
                    );
                    self.tracker.record(
                        EventType::FinalAnswer,
                        Some(agent_id.clone()),
                        Some(attempt_number),
                        answer.clone(),
                        now_rfc3339(),
                    );

                    return Ok(TurnOutcome {
                        winner_agent_id: agent_id,
                        answer,
                        attempt_number,
                    });
                }
                Closure::Restart(trigger) => {
                    if restarts_used >= self.max_restarts_per_turn {
                        return Err(CoreError::RestartExhausted(self.max_restarts_per_turn));
                    }
                    let reason = restart_reason_text(&trigger);
                    let snapshot_source = state
                        .states
                        .iter()
                        .find(|(_, s)| !matches!(s, AgentState::Failed { .. }))
                        .and_then(|(id, _)| self.agents.iter().find(|a| &a.agent_id == id))
                        .map(|a| a.workspace.path.clone());
                    let attempt_answer_text = answers.values().next().cloned().unwrap_or_default();

                    self.storage
                        .save_attempt(
                            session_id,
                            turn_number,
                            attempt_number,
                            task,
                            &attempt_answer_text,
                            None,
                            snapshot_source.as_deref(),
                            Some(reason.clone()),
                            Some(format!("restarting after attempt {attempt_number}: {reason}")),
                            &now_rfc3339(),
                        )
                        .await?;

                    self.tracker.record(
                        EventType::RestartCompleted,
                        None,
                        Some(attempt_number),
                        reason.clone(),
                        now_rfc3339(),
                    );

                    let previous = self
                        .storage
                        .previous_attempts_context(session_id, turn_number, attempt_number + 1)
                        .await;
                    briefing = Some(compose_restart_briefing(&previous, &reason));
                    restarts_used += 1;
                    attempt_number += 1;
                }
            }
        }
    }

    /// Runs one attempt: launches every agent's runner, aggregates events
    /// until closure, and decides whether it produced a winner or must
    /// restart (spec §4.5 steps 1-5).
    async fn run_attempt(
        &self,
        session_id: &str,
        attempt_number: u64,
        task: &str,
        history: &[Message],
        briefing: Option<&str>,
    ) -> Result<(Closure, AttemptState, HashMap<String, String>)> {
        let tools = coordination_tool_specs(&self.task_tools, &self.restart_tool_name);
        let (tx, mut rx) = mpsc::channel::<RunnerEvent>(256);
        let cancel = CancellationToken::new();

        let state = Arc::new(Mutex::new(AttemptState::default()));
        {
            let mut s = state.lock().await;
            for agent in &self.agents {
                s.states.insert(agent.agent_id.clone(), AgentState::Working);
            }
        }

        let mut handles = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            let mut conv = ConversationHistory::new();
            conv.record_messages(history.iter().cloned());
            let mut messages: Vec<Message> = vec![Message::system(agent.system_prompt.clone())];
            messages.extend(conv.contents());
            let mut user_task = task.to_string();
            if let Some(briefing) = briefing {
                user_task.push_str("\n\n");
                user_task.push_str(briefing);
            }
            messages.push(Message::user(user_task));

            let agent = agent.clone();
            let tools = tools.clone();
            let tool_handler = self.tool_handler.clone();
            let tx = tx.clone();
            let cancel = cancel.child_token();
            let restart_tool_name = self.restart_tool_name.clone();
            handles.push(tokio::spawn(async move {
                run_agent_runner(agent, messages, tools, tool_handler, tx, cancel, restart_tool_name).await;
            }));
        }
        drop(tx);

        let answers: Arc<Mutex<HashMap<String, String>>> = Arc::new(Mutex::new(HashMap::new()));
        let deadline = tokio::time::sleep(self.per_attempt_timeout);
        tokio::pin!(deadline);

        let closure = loop {
            tokio::select! {
                _ = &mut deadline => {
                    cancel.cancel();
                    let mut s = state.lock().await;
                    for (id, st) in s.states.iter_mut() {
                        if matches!(st, AgentState::Working) {
                            warn!(agent_id = %id, "per-attempt timeout; treating straggler as completed");
                            *st = AgentState::Completed;
                        }
                    }
                    break self.decide_closure(&s);
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        let s = state.lock().await;
                        break self.decide_closure(&s);
                    };
                    let mut s = state.lock().await;
                    self.apply_event(&mut s, event, &answers, attempt_number).await;
                    if s.states.values().all(|st| st.is_terminal_coordination_state()) {
                        if let Some(trigger) = s.restart_requested.clone() {
                            break Closure::Restart(trigger);
                        }
                        break self.decide_closure(&s);
                    }
                }
            }
        };

        cancel.cancel();
        for handle in handles {
            handle.abort();
        }
        let _ = session_id;

        let final_state = Arc::try_unwrap(state)
            .unwrap_or_else(|_| unreachable!("orchestrator holds the only handle to attempt state"))
            .into_inner();
        let answers = Arc::try_unwrap(answers)
            .unwrap_or_else(|_| unreachable!("orchestrator holds the only handle to the answers map"))
            .into_inner();

        Ok((closure, final_state, answers))
    }

    async fn apply_event(
        &self,
        s: &mut AttemptState,
        event: RunnerEvent,
        answers: &Arc<Mutex<HashMap<String, String>>>,
        attempt_number: u64,
    ) {
        match event {
            RunnerEvent::NewAnswer { agent_id, answer } => {
                s.states.insert(agent_id.clone(), AgentState::HasAnswer { answer: answer.clone(), round: attempt_number });
                s.answer_observed_at.insert(agent_id.clone(), Instant::now());
                s.pending_votes.remove(&agent_id);
                answers.lock().await.insert(agent_id.clone(), answer.clone());

                self.tracker.record(
                    EventType::NewAnswer,
                    Some(agent_id.clone()),
                    Some(attempt_number),
                    answer,
                    now_rfc3339(),
                );

                // Promote any vote that was queued waiting on this agent.
                let promoted: Vec<String> = s
                    .pending_votes
                    .iter()
                    .filter(|(_, (target, _))| *target == agent_id)
                    .map(|(voter, _)| voter.clone())
                    .collect();
                for voter in promoted {
                    if let Some((target, reason)) = s.pending_votes.remove(&voter) {
                        s.states.insert(voter.clone(), AgentState::Voted { target_agent_id: target.clone(), round: attempt_number });
                        self.tracker.record(
                            EventType::VoteCast,
                            Some(voter),
                            Some(attempt_number),
                            format!("queued vote for {target} resolved: {}", reason.unwrap_or_default()),
                            now_rfc3339(),
                        );
                    }
                }
            }
            RunnerEvent::Vote { agent_id, target_agent_id, reason } => {
                let target_has_answer = matches!(s.states.get(&target_agent_id), Some(AgentState::HasAnswer { .. }));
                if target_has_answer {
                    s.states.insert(agent_id.clone(), AgentState::Voted { target_agent_id: target_agent_id.clone(), round: attempt_number });
                    s.pending_votes.remove(&agent_id);
                    self.tracker.record(
                        EventType::VoteCast,
                        Some(agent_id),
                        Some(attempt_number),
                        format!("voted for {target_agent_id}: {}", reason.unwrap_or_default()),
                        now_rfc3339(),
                    );
                } else {
                    s.pending_votes.insert(agent_id.clone(), (target_agent_id.clone(), reason));
                    self.tracker.record(
                        EventType::VoteCast,
                        Some(agent_id),
                        Some(attempt_number),
                        format!("queued: {target_agent_id} has not answered yet"),
                        now_rfc3339(),
                    );
                }
            }
            RunnerEvent::RestartRequested { agent_id, reason } => {
                self.tracker.record(
                    EventType::StatusChange,
                    Some(agent_id.clone()),
                    Some(attempt_number),
                    format!("requested restart: {}", reason.clone().unwrap_or_default()),
                    now_rfc3339(),
                );
                s.restart_requested.get_or_insert(RestartTrigger::AgentRequested { agent_id });
            }
            RunnerEvent::Completed { agent_id } => {
                s.states.insert(agent_id.clone(), AgentState::Completed);
                self.tracker.record(EventType::StatusChange, Some(agent_id), Some(attempt_number), "completed", now_rfc3339());
            }
            RunnerEvent::Failed { agent_id, reason } => {
                s.states.insert(agent_id.clone(), AgentState::Failed { reason: reason.clone() });
                self.tracker.record(EventType::StatusChange, Some(agent_id), Some(attempt_number), format!("failed: {reason}"), now_rfc3339());
            }
        }
    }

    /// Decide whether the closed attempt produced a winner or must restart
    /// (spec §4.5 step 4-5; dropped votes for agents that never answered are
    /// simply discarded here, as queued entries that were never promoted).
    fn decide_closure(&self, s: &AttemptState) -> Closure {
        if let Some(trigger) = s.restart_requested.clone() {
            return Closure::Restart(trigger);
        }

        let candidates: Vec<&String> = s
            .states
            .iter()
            .filter(|(_, st)| matches!(st, AgentState::HasAnswer { .. }))
            .map(|(id, _)| id)
            .collect();
        if candidates.is_empty() {
            return Closure::Restart(RestartTrigger::Inconclusive);
        }

        let failed_count = s.states.values().filter(|st| matches!(st, AgentState::Failed { .. })).count();
        if failed_count * 2 > self.agents.len() {
            return Closure::Restart(RestartTrigger::FailureThreshold { failed_count });
        }

        let mut votes: HashMap<&str, u32> = candidates.iter().map(|c| (c.as_str(), 0)).collect();
        for (voter, st) in &s.states {
            if let AgentState::Voted { target_agent_id, .. } = st {
                if voter == target_agent_id && self.vote_policy == VotePolicy::RejectSelfVote {
                    continue;
                }
                if let Some(count) = votes.get_mut(target_agent_id.as_str()) {
                    *count += 1;
                }
            }
        }

        let better = |a: &str, b: &str| -> std::cmp::Ordering {
            let va = votes.get(a).copied().unwrap_or(0);
            let vb = votes.get(b).copied().unwrap_or(0);
            va.cmp(&vb)
                .then_with(|| {
                    let ta = s.answer_observed_at.get(a);
                    let tb = s.answer_observed_at.get(b);
                    // Earlier instant wins; reverse so the larger ordering wins.
                    tb.cmp(&ta)
                })
                .then_with(|| b.cmp(a))
        };
        let Some((first, rest)) = candidates.split_first() else {
            // Unreachable: `candidates.is_empty()` already returned above.
            return Closure::Restart(RestartTrigger::Inconclusive);
        };
        let mut winner: &str = first.as_str();
        for candidate in rest {
            if better(candidate.as_str(), winner) == std::cmp::Ordering::Greater {
                winner = candidate.as_str();
            }
        }

        Closure::Winner {
            agent_id: winner.to_string(),
        }
    }

    /// Re-invokes the winner with a final-presentation prompt and cancels
    /// everyone else (spec §4.5 step 6). Other agents were already aborted
    /// when the attempt closed; this call is the winner's dedicated pass.
    async fn final_presentation(
        &self,
        _session_id: &str,
        attempt_number: u64,
        winner_agent_id: &str,
        task: &str,
        history: &[Message],
        answers: &HashMap<String, String>,
    ) -> Result<String> {
        self.tracker.record(
            EventType::FinalRoundStart,
            Some(winner_agent_id.to_string()),
            Some(attempt_number),
            "final presentation round",
            now_rfc3339(),
        );

        let winner = self
            .agents
            .iter()
            .find(|a| a.agent_id == winner_agent_id)
            .ok_or_else(|| CoreError::Protocol(format!("winner '{winner_agent_id}' is not a known agent")))?;

        let draft = answers.get(winner_agent_id).cloned().unwrap_or_default();
        let mut conv = ConversationHistory::new();
        conv.record_messages(history.iter().cloned());
        let mut messages: Vec<Message> = vec![Message::system(winner.system_prompt.clone())];
        messages.extend(conv.contents());
        messages.push(Message::user(task.to_string()));
        messages.push(Message::assistant(draft));
        messages.push(Message::user(
            "Your answer was selected by the other agents. Produce the final, \
             user-facing answer now."
                .to_string(),
        ));

        let turn_ctx = TurnContext {
            agent_id: winner_agent_id.to_string(),
        };
        let mut stream = winner.backend.execute_streaming(messages, Vec::new(), turn_ctx).await;
        let mut final_text = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk? {
                StreamChunk::Content { text } => final_text.push_str(&text),
                StreamChunk::CompleteMessage { content, .. } => {
                    if final_text.is_empty() {
                        final_text = content;
                    }
                }
                StreamChunk::Done => break,
                StreamChunk::Error { message } => return Err(CoreError::Transport { agent_id: winner_agent_id.to_string(), message }),
                _ => {}
            }
        }
        Ok(final_text)
    }
}

fn restart_reason_text(trigger: &RestartTrigger) -> String {
    match trigger {
        RestartTrigger::AgentRequested { agent_id } => format!("agent '{agent_id}' requested a restart"),
        RestartTrigger::Inconclusive => "no agent produced a candidate answer".to_string(),
        RestartTrigger::FailureThreshold { failed_count } => format!("{failed_count} agents failed"),
    }
}

fn compose_restart_briefing(previous: &[massgen_protocol::Attempt], reason: &str) -> String {
    let mut briefing = format!("This turn is being restarted ({reason}). Prior attempts:\n");
    for attempt in previous {
        briefing.push_str(&format!(
            "- attempt {}: {}\n",
            attempt.attempt_number,
            if attempt.answer_text.is_empty() {
                "(no answer)"
            } else {
                attempt.answer_text.as_str()
            }
        ));
    }
    briefing
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use massgen_protocol::ToolCall;
    use massgen_protocol::simulate_stream;
    use tempfile::TempDir;

    use super::*;
    use crate::backend::Backend;
    use crate::backend::BackendStream;
    use crate::permission::ManagedPath;

    struct ScriptedBackend {
        chunks: Vec<StreamChunk>,
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn execute_streaming(&self, _messages: Vec<Message>, _tools: Vec<ToolSpec>, _context: TurnContext) -> BackendStream {
            BackendStream::from_chunks(self.chunks.clone())
        }
    }

    /// A backend that answers differently depending on how many times it has
    /// already been invoked, so a test can simulate an agent whose behavior
    /// changes across a restart (spec §8 scenario 4: attempt 1 unsuccessful,
    /// attempt 2 successful).
    struct AttemptAwareBackend {
        scripts: Vec<Vec<StreamChunk>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl AttemptAwareBackend {
        fn new(scripts: Vec<Vec<StreamChunk>>) -> Self {
            Self {
                scripts,
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Backend for AttemptAwareBackend {
        async fn execute_streaming(&self, _messages: Vec<Message>, _tools: Vec<ToolSpec>, _context: TurnContext) -> BackendStream {
            let call_index = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let script = self
                .scripts
                .get(call_index)
                .or_else(|| self.scripts.last())
                .cloned()
                .unwrap_or_default();
            BackendStream::from_chunks(script)
        }
    }

    fn agent_with(id: &str, dir: &TempDir, chunks: Vec<StreamChunk>) -> Arc<Agent> {
        agent_with_backend(id, dir, Arc::new(ScriptedBackend { chunks }))
    }

    fn agent_with_backend(id: &str, dir: &TempDir, backend: Arc<dyn Backend>) -> Arc<Agent> {
        Arc::new(Agent::new(
            id,
            format!("you are {id}"),
            backend,
            ManagedPath::writable(dir.path().join(id)),
            Vec::new(),
        ))
    }

    fn new_answer_call(content: &str) -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: "new_answer".to_string(),
            arguments: serde_json::json!({"content": content}),
        }
    }

    fn vote_call(target: &str) -> ToolCall {
        ToolCall {
            id: "c2".to_string(),
            name: "vote".to_string(),
            arguments: serde_json::json!({"agent_id": target, "reason": "looks right"}),
        }
    }

    fn test_orchestrator(agents: Vec<Arc<Agent>>, storage_dir: &TempDir) -> Orchestrator {
        let storage = Arc::new(AttemptStorage::new(storage_dir.path().to_path_buf(), None));
        Orchestrator::new(
            agents,
            Vec::new(),
            Duration::from_secs(5),
            3,
            VotePolicy::AllowSelfVote,
            storage,
            Arc::new(CoordinationTracker::new()),
            None,
            "request_restart".to_string(),
        )
    }

    #[tokio::test]
    async fn single_agent_trivial_success() {
        let workspaces = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();
        let a = agent_with("a", &workspaces, simulate_stream("", vec![new_answer_call("hi")]));
        let orch = test_orchestrator(vec![a], &storage_dir);

        let outcome = orch.run_turn("s1", 1, "say hi", &[]).await.unwrap();
        assert_eq!(outcome.winner_agent_id, "a");
        assert_eq!(outcome.attempt_number, 1);
    }

    #[tokio::test]
    async fn two_agents_vote_based_selection() {
        let workspaces = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();
        let a = agent_with("a", &workspaces, simulate_stream("", vec![new_answer_call("42")]));
        let b = agent_with("b", &workspaces, simulate_stream("", vec![vote_call("a")]));
        let orch = test_orchestrator(vec![a, b], &storage_dir);

        let outcome = orch.run_turn("s2", 1, "what is the answer", &[]).await.unwrap();
        assert_eq!(outcome.winner_agent_id, "a");
    }

    #[tokio::test]
    async fn inconclusive_attempt_exhausts_restart_budget() {
        let workspaces = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();

        // Every attempt: everyone votes, nobody answers -> inconclusive on
        // every restart, so the budget runs out.
        let a = agent_with("a", &workspaces, simulate_stream("", vec![vote_call("b")]));
        let b = agent_with("b", &workspaces, simulate_stream("", vec![vote_call("c")]));
        let c = agent_with("c", &workspaces, simulate_stream("", vec![vote_call("a")]));
        let orch = test_orchestrator(vec![a, b, c], &storage_dir);

        let result = orch.run_turn("s3", 1, "pick one", &[]).await;
        assert!(matches!(result, Err(CoreError::RestartExhausted(_))));
    }

    #[tokio::test]
    async fn inconclusive_attempt_triggers_restart_then_succeeds() {
        let workspaces = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();

        // Attempt 1: all three agents vote for each other in a cycle and
        // nobody answers -> inconclusive -> restart. Attempt 2: "a" answers
        // and the other two vote for it -> winner "a" (spec §8 scenario 4:
        // "turn has attempts {1 (unsuccessful), 2 (successful, winner=a)}").
        let a = agent_with_backend(
            "a",
            &workspaces,
            Arc::new(AttemptAwareBackend::new(vec![
                simulate_stream("", vec![vote_call("b")]),
                simulate_stream("", vec![new_answer_call("42")]),
            ])),
        );
        let b = agent_with_backend(
            "b",
            &workspaces,
            Arc::new(AttemptAwareBackend::new(vec![
                simulate_stream("", vec![vote_call("c")]),
                simulate_stream("", vec![vote_call("a")]),
            ])),
        );
        let c = agent_with_backend(
            "c",
            &workspaces,
            Arc::new(AttemptAwareBackend::new(vec![
                simulate_stream("", vec![vote_call("a")]),
                simulate_stream("", vec![vote_call("a")]),
            ])),
        );
        let orch = test_orchestrator(vec![a, b, c], &storage_dir);

        let outcome = orch.run_turn("s3", 1, "pick one", &[]).await.unwrap();
        assert_eq!(outcome.winner_agent_id, "a");
        assert_eq!(outcome.attempt_number, 2);

        let attempts = orch.storage.load_attempts("s3", Some(1)).await;
        let mut by_number: Vec<u64> = attempts.iter().map(|a| a.attempt_number).collect();
        by_number.sort_unstable();
        assert_eq!(by_number, vec![1, 2]);
        let attempt_2 = attempts.iter().find(|a| a.attempt_number == 2).unwrap();
        assert_eq!(attempt_2.winning_agent_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn permission_denied_write_does_not_touch_filesystem() {
        let workspaces = TempDir::new().unwrap();
        let storage_dir = TempDir::new().unwrap();
        let denied_target = workspaces.path().join("outside.txt");

        struct DenyingHandler;
        #[async_trait]
        impl ToolHandler for DenyingHandler {
            async fn handle(&self, _name: &str, _arguments: serde_json::Value, _ctx: &AgentContext) -> ToolResult {
                panic!("handler should never be reached for a permission-denied call");
            }
        }

        let write_call = ToolCall {
            id: "w1".to_string(),
            name: "write_file".to_string(),
            arguments: serde_json::json!({"path": denied_target.to_string_lossy(), "content": "x"}),
        };
        let mut chunks = vec![StreamChunk::ToolCalls { calls: vec![write_call] }];
        chunks.extend(simulate_stream("", vec![new_answer_call("done")]));

        let a = agent_with("a", &workspaces, chunks);
        let storage = Arc::new(AttemptStorage::new(storage_dir.path().to_path_buf(), None));
        let orch = Orchestrator::new(
            vec![a],
            Vec::new(),
            Duration::from_secs(5),
            1,
            VotePolicy::AllowSelfVote,
            storage,
            Arc::new(CoordinationTracker::new()),
            Some(Arc::new(DenyingHandler)),
            "request_restart".to_string(),
        );

        let outcome = orch.run_turn("s4", 1, "write then answer", &[]).await.unwrap();
        assert_eq!(outcome.winner_agent_id, "a");
        assert!(!denied_target.exists());
    }
}
