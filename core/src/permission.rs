//! Path Permission Manager (spec §4.2): classifies every filesystem-affecting
//! tool call an agent makes as allowed-read, allowed-write, or denied, before
//! the call is dispatched.
//!
//! Grounded in the teacher's `safety.rs` lexical-prefix-matching approach to
//! checking a patch against a set of writable roots, generalized here from
//! "one policy for the whole session" to "an ordered list of managed paths,
//! innermost wins".

use std::path::Path;
use std::path::PathBuf;

use massgen_protocol::chunk::extract_path_like_strings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Read,
    Write,
}

/// One directory an agent is scoped to, with the access level granted on it.
#[derive(Debug, Clone)]
pub struct ManagedPath {
    pub path: PathBuf,
    pub permission: Permission,
}

impl ManagedPath {
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            permission: Permission::Read,
        }
    }

    pub fn writable(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            permission: Permission::Write,
        }
    }
}

/// Fixed read/write classification for common tool verbs (spec §4.2: "Tool
/// names must be classified... from a fixed table"). Unmatched names default
/// to `Write`, per the spec's closing instruction to err toward write.
const READ_ONLY_TOOLS: &[&str] = &["read_file", "list_dir", "stat", "glob", "grep", "search"];

fn tool_requires_write(tool_name: &str) -> bool {
    !READ_ONLY_TOOLS.contains(&tool_name)
}

/// Resolve `path` to an absolute, symlink-resolved form. Falls back to a
/// lexical (non-canonicalizing) normalization when the path does not yet
/// exist on disk — e.g. a file a `write_file` call is about to create —
/// since `std::fs::canonicalize` requires the path to exist.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let mut resolved = if path.is_absolute() {
        PathBuf::new()
    } else {
        std::env::current_dir().unwrap_or_default()
    };
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }
    resolved
}

/// Holds the ordered set of managed paths for one agent's attempt and
/// answers `(tool_name, arguments) -> (allowed, reason)` for every
/// filesystem-affecting call (spec §4.2 steps 1-4).
pub struct PermissionManager {
    managed: Vec<ManagedPath>,
}

impl PermissionManager {
    pub fn new(managed: Vec<ManagedPath>) -> Self {
        Self { managed }
    }

    /// Find the innermost managed path that is a prefix of `resolved`, i.e.
    /// the one whose own resolved path is the longest prefix match.
    fn innermost_match(&self, resolved: &Path) -> Option<&ManagedPath> {
        self.managed
            .iter()
            .filter(|m| resolved.starts_with(resolve(&m.path)))
            .max_by_key(|m| resolve(&m.path).as_os_str().len())
    }

    /// Evaluate one candidate path against the managed set. Returns
    /// `(allowed, reason)` per spec §4.2.
    fn check_path(&self, raw_path: &str, requires_write: bool) -> (bool, String) {
        let resolved = resolve(Path::new(raw_path));
        match self.innermost_match(&resolved) {
            None => (
                false,
                format!("{} is outside every managed path", resolved.display()),
            ),
            Some(managed) if requires_write && managed.permission == Permission::Read => (
                false,
                format!("{} is read-only", resolved.display()),
            ),
            Some(_) => (true, "allowed".to_string()),
        }
    }

    /// Check a tool call before it is dispatched. Extracts every path-like
    /// argument and denies if any one of them fails; the reason names the
    /// first offending path.
    pub fn check_call(&self, tool_name: &str, arguments: &serde_json::Value) -> (bool, String) {
        let requires_write = tool_requires_write(tool_name);
        let paths = extract_path_like_strings(arguments);
        if paths.is_empty() {
            // No path-like argument found: a filesystem-affecting tool with
            // no discoverable target is treated as unconstrained by this
            // manager (e.g. a no-path list-workspace call); the caller is
            // still responsible for deciding whether to dispatch it.
            return (true, "no path argument found".to_string());
        }
        for path in &paths {
            let (allowed, reason) = self.check_path(path, requires_write);
            if !allowed {
                return (false, reason);
            }
        }
        (true, "allowed".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn denies_write_outside_any_managed_path() {
        let dir = TempDir::new().unwrap();
        let mgr = PermissionManager::new(vec![ManagedPath::writable(dir.path())]);
        let (allowed, _) = mgr.check_call(
            "write_file",
            &serde_json::json!({"path": "/definitely/not/managed/x.txt"}),
        );
        assert!(!allowed);
    }

    #[test]
    fn denies_write_to_read_only_context_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("note.txt");
        std::fs::write(&file, "hi").unwrap();
        let mgr = PermissionManager::new(vec![ManagedPath::read_only(dir.path())]);
        let (allowed, reason) = mgr.check_call(
            "write_file",
            &serde_json::json!({"path": file.to_string_lossy()}),
        );
        assert!(!allowed);
        assert!(reason.contains("read-only"));
    }

    #[test]
    fn allows_read_from_read_only_context_path() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("note.txt");
        std::fs::write(&file, "hi").unwrap();
        let mgr = PermissionManager::new(vec![ManagedPath::read_only(dir.path())]);
        let (allowed, _) = mgr.check_call(
            "read_file",
            &serde_json::json!({"path": file.to_string_lossy()}),
        );
        assert!(allowed);
    }

    #[test]
    fn innermost_managed_path_wins() {
        let outer = TempDir::new().unwrap();
        let inner = outer.path().join("writable_subdir");
        std::fs::create_dir_all(&inner).unwrap();
        let target = inner.join("f.txt");
        let mgr = PermissionManager::new(vec![
            ManagedPath::read_only(outer.path()),
            ManagedPath::writable(&inner),
        ]);
        let (allowed, _) = mgr.check_call(
            "write_file",
            &serde_json::json!({"path": target.to_string_lossy()}),
        );
        assert!(allowed);
    }

    #[test]
    fn unknown_tool_name_errs_toward_write() {
        assert!(tool_requires_write("some_future_tool"));
        assert!(!tool_requires_write("read_file"));
    }
}
