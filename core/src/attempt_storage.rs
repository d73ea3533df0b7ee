//! Attempt Storage (spec §4.3): persists each turn's attempts and restores
//! session history.
//!
//! Grounded in two places: the teacher's `rollout.rs`, whose async writer
//! task owns the file handles and drains a channel so callers never block on
//! disk I/O (generalized here from "append a line" to "stage a directory,
//! then rename it into place" as the atomicity boundary); and
//! `original_source/massgen/attempt_storage.py` /
//! `original_source/massgen/session/_state.py`, which this module follows
//! for the on-disk layout, the `SESSION_SUMMARY` appendix, and the
//! split-location merge rule used when a session exists in two candidate
//! roots.

use std::path::Path;
use std::path::PathBuf;

use massgen_protocol::Attempt;
use massgen_protocol::TurnRecord;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::CoreError;
use crate::error::Result;
use crate::util::backoff;

const MAX_SAVE_RETRIES: u32 = 3;

struct SaveAttemptJob {
    session_id: String,
    turn_number: u64,
    attempt_number: u64,
    task: String,
    answer_text: String,
    winning_agent_id: Option<String>,
    restart_reason: Option<String>,
    restart_instructions: Option<String>,
    workspace_source: Option<PathBuf>,
    timestamp: String,
    respond: oneshot::Sender<Result<Attempt>>,
}

struct MarkSuccessfulJob {
    session_id: String,
    turn_number: u64,
    attempt_number: u64,
    respond: oneshot::Sender<Result<()>>,
}

enum WriteJob {
    SaveAttempt(SaveAttemptJob),
    MarkSuccessful(MarkSuccessfulJob),
}

/// Durable attempt/turn/session persistence. Writes are funneled through a
/// single background task per `AttemptStorage` instance so that the
/// single-writer-per-session contract (spec §5 "Shared-resource policy")
/// holds without the caller needing its own lock.
#[derive(Clone)]
pub struct AttemptStorage {
    tx: mpsc::Sender<WriteJob>,
    /// Both candidate base roots, primary first. Reads merge across both;
    /// the background writer task holds its own copy to resolve where a new
    /// write lands (see `resolve_write_base`).
    bases: Vec<PathBuf>,
}

impl AttemptStorage {
    pub fn new(primary_root: PathBuf, alternate_root: Option<PathBuf>) -> Self {
        let (tx, rx) = mpsc::channel(256);
        let bases = match &alternate_root {
            Some(alt) => vec![primary_root.clone(), alt.clone()],
            None => vec![primary_root.clone()],
        };
        tokio::spawn(writer_loop(primary_root, alternate_root, rx));
        Self { tx, bases }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn save_attempt(
        &self,
        session_id: &str,
        turn_number: u64,
        attempt_number: u64,
        task: &str,
        answer_text: &str,
        winning_agent_id: Option<String>,
        workspace_source: Option<&Path>,
        restart_reason: Option<String>,
        restart_instructions: Option<String>,
        timestamp: &str,
    ) -> Result<Attempt> {
        let (respond, rx) = oneshot::channel();
        let job = SaveAttemptJob {
            session_id: session_id.to_string(),
            turn_number,
            attempt_number,
            task: task.to_string(),
            answer_text: answer_text.to_string(),
            winning_agent_id,
            restart_reason,
            restart_instructions,
            workspace_source: workspace_source.map(Path::to_path_buf),
            timestamp: timestamp.to_string(),
            respond,
        };
        self.tx
            .send(WriteJob::SaveAttempt(job))
            .await
            .map_err(|_| CoreError::Storage("attempt storage writer task is gone".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Storage("attempt storage writer task dropped response".to_string()))?
    }

    /// Idempotent for the same `(turn, attempt)`; fatal if a different
    /// attempt was already marked successful for this turn (spec §4.3:
    /// "turns are single-winner").
    pub async fn mark_successful_attempt(
        &self,
        session_id: &str,
        turn_number: u64,
        attempt_number: u64,
    ) -> Result<()> {
        let (respond, rx) = oneshot::channel();
        let job = MarkSuccessfulJob {
            session_id: session_id.to_string(),
            turn_number,
            attempt_number,
            respond,
        };
        self.tx
            .send(WriteJob::MarkSuccessful(job))
            .await
            .map_err(|_| CoreError::Storage("attempt storage writer task is gone".to_string()))?;
        rx.await
            .map_err(|_| CoreError::Storage("attempt storage writer task dropped response".to_string()))?
    }

    /// Never fails for an unknown session; returns an empty sequence
    /// instead (spec §4.3 "load_attempts").
    pub async fn load_attempts(&self, session_id: &str, turn: Option<u64>) -> Vec<Attempt> {
        let bases = self.session_bases();
        let mut attempts = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for base in &bases {
            let session_dir = base.join(session_id);
            let Ok(mut turn_dirs) = tokio::fs::read_dir(&session_dir).await else {
                continue;
            };
            while let Ok(Some(entry)) = turn_dirs.next_entry().await {
                let Some(turn_number) = parse_numbered_dir(&entry.file_name(), "turn_") else {
                    continue;
                };
                if let Some(wanted) = turn {
                    if turn_number != wanted {
                        continue;
                    }
                }
                let Ok(mut attempt_dirs) = tokio::fs::read_dir(entry.path()).await else {
                    continue;
                };
                while let Ok(Some(a_entry)) = attempt_dirs.next_entry().await {
                    let Some(attempt_number) = parse_numbered_dir(&a_entry.file_name(), "attempt_")
                    else {
                        continue;
                    };
                    let key = (turn_number, attempt_number);
                    if !seen.insert(key) {
                        continue;
                    }
                    if let Some(attempt) =
                        load_attempt_dir(session_id, turn_number, attempt_number, &a_entry.path())
                            .await
                    {
                        attempts.push(attempt);
                    }
                }
            }
        }
        attempts.sort_by_key(|a| (a.turn_number, a.attempt_number));
        attempts
    }

    /// For each closed turn, the successful attempt, or the latest attempt
    /// with a logged warning if none was marked (spec §4.3).
    pub async fn previous_turns_for_session(&self, session_id: &str) -> Vec<TurnRecord> {
        let attempts = self.load_attempts(session_id, None).await;
        let mut by_turn: std::collections::BTreeMap<u64, Vec<Attempt>> =
            std::collections::BTreeMap::new();
        for attempt in attempts {
            by_turn.entry(attempt.turn_number).or_default().push(attempt);
        }
        let mut records = Vec::new();
        for (turn_number, attempts) in by_turn {
            let successful = self.read_successful_marker(session_id, turn_number).await;
            let chosen = match successful {
                Some(winner_attempt) => attempts.iter().find(|a| a.attempt_number == winner_attempt),
                None => None,
            };
            let chosen = match chosen {
                Some(a) => a,
                None => {
                    let Some(latest) = attempts.iter().max_by_key(|a| a.attempt_number) else {
                        continue;
                    };
                    if successful.is_some() {
                        warn!(
                            session_id,
                            turn_number, "successful_attempt marker points at a missing attempt; using latest"
                        );
                    } else {
                        warn!(
                            session_id,
                            turn_number, "turn has no successful_attempt marker; using latest attempt"
                        );
                    }
                    latest
                }
            };
            records.push(TurnRecord {
                turn_number,
                task: chosen.task.clone(),
                winning_agent_id: chosen.winning_agent_id.clone(),
                answer_text: chosen.answer_text.clone(),
                workspace_path: chosen.workspace_snapshot_path.clone(),
            });
        }
        records
    }

    /// All attempts with `attempt_number < current_attempt` in the given
    /// turn, used to brief agents during a restart (spec §4.3).
    pub async fn previous_attempts_context(
        &self,
        session_id: &str,
        turn_number: u64,
        current_attempt: u64,
    ) -> Vec<Attempt> {
        self.load_attempts(session_id, Some(turn_number))
            .await
            .into_iter()
            .filter(|a| a.attempt_number < current_attempt)
            .collect()
    }

    async fn read_successful_marker(&self, session_id: &str, turn_number: u64) -> Option<u64> {
        for base in self.session_bases() {
            let marker = base
                .join(session_id)
                .join(format!("turn_{turn_number}"))
                .join("successful_attempt.json");
            if let Ok(contents) = tokio::fs::read_to_string(&marker).await {
                if let Ok(value) = serde_json::from_str::<SuccessfulMarker>(&contents) {
                    return Some(value.attempt);
                }
            }
        }
        None
    }

    fn session_bases(&self) -> Vec<PathBuf> {
        self.bases.clone()
    }
}

#[derive(serde::Deserialize)]
struct SuccessfulMarker {
    attempt: u64,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct AttemptMetadata {
    task: String,
    winning_agent_id: Option<String>,
    restart_reason: Option<String>,
    restart_instructions: Option<String>,
    timestamp: String,
}

fn parse_numbered_dir(name: &std::ffi::OsStr, prefix: &str) -> Option<u64> {
    name.to_str()?.strip_prefix(prefix)?.parse().ok()
}

async fn load_attempt_dir(
    session_id: &str,
    turn_number: u64,
    attempt_number: u64,
    dir: &Path,
) -> Option<Attempt> {
    let metadata_raw = tokio::fs::read_to_string(dir.join("metadata.json")).await.ok()?;
    let metadata: AttemptMetadata = serde_json::from_str(&metadata_raw).ok()?;
    let answer_text = tokio::fs::read_to_string(dir.join("answer.txt")).await.unwrap_or_default();
    let workspace_dir = dir.join("workspace");
    let workspace_snapshot_path = if tokio::fs::try_exists(&workspace_dir).await.unwrap_or(false) {
        Some(workspace_dir.to_string_lossy().to_string())
    } else {
        None
    };
    Some(Attempt {
        session_id: session_id.to_string(),
        turn_number,
        attempt_number,
        task: metadata.task,
        winning_agent_id: metadata.winning_agent_id,
        restart_reason: metadata.restart_reason,
        restart_instructions: metadata.restart_instructions,
        timestamp: metadata.timestamp,
        answer_text,
        workspace_snapshot_path,
    })
}

/// Lists the turn numbers present directly under `base/session_id`.
async fn find_turns(base: &Path, session_id: &str) -> Vec<u64> {
    let mut turns = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(base.join(session_id)).await else {
        return turns;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(n) = parse_numbered_dir(&entry.file_name(), "turn_") {
            turns.push(n);
        }
    }
    turns
}

/// Picks the base a new write should land in (spec §4.3 "Restore
/// semantics"): the location holding `turn_1`, or else the location with the
/// highest turn number, with a warning logged in the fallback case.
async fn resolve_write_base(
    primary: &Path,
    alternate: Option<&Path>,
    session_id: &str,
) -> PathBuf {
    let Some(alt) = alternate else {
        return primary.to_path_buf();
    };
    let primary_turns = find_turns(primary, session_id).await;
    let alt_turns = find_turns(alt, session_id).await;
    if primary_turns.contains(&1) {
        return primary.to_path_buf();
    }
    if alt_turns.contains(&1) {
        return alt.to_path_buf();
    }
    let primary_max = primary_turns.iter().max().copied();
    let alt_max = alt_turns.iter().max().copied();
    match (primary_max, alt_max) {
        (Some(p), Some(a)) if a > p => {
            warn!(
                session_id,
                "session split across two storage locations with no turn_1; using the \
                 location with the higher turn number"
            );
            alt.to_path_buf()
        }
        (None, Some(_)) => {
            warn!(
                session_id,
                "session split across two storage locations with no turn_1; using the \
                 location with the higher turn number"
            );
            alt.to_path_buf()
        }
        _ => primary.to_path_buf(),
    }
}

async fn writer_loop(primary_root: PathBuf, alternate_root: Option<PathBuf>, mut rx: mpsc::Receiver<WriteJob>) {
    while let Some(job) = rx.recv().await {
        match job {
            WriteJob::SaveAttempt(job) => {
                let base = resolve_write_base(&primary_root, alternate_root.as_deref(), &job.session_id).await;
                let result = save_attempt_with_retries(&base, job).await;
                // `respond` was consumed by `save_attempt_with_retries`; nothing
                // left to do here.
                let _ = result;
            }
            WriteJob::MarkSuccessful(job) => {
                let base = resolve_write_base(&primary_root, alternate_root.as_deref(), &job.session_id).await;
                let result = mark_successful(&base, &job.session_id, job.turn_number, job.attempt_number).await;
                let _ = job.respond.send(result);
            }
        }
    }
}

async fn save_attempt_with_retries(base: &Path, job: SaveAttemptJob) -> Result<()> {
    let SaveAttemptJob {
        session_id,
        turn_number,
        attempt_number,
        task,
        answer_text,
        winning_agent_id,
        restart_reason,
        restart_instructions,
        workspace_source,
        timestamp,
        respond,
    } = job;

    let mut last_err = None;
    for attempt_try in 1..=MAX_SAVE_RETRIES {
        match save_attempt_once(
            base,
            &session_id,
            turn_number,
            attempt_number,
            &task,
            &answer_text,
            winning_agent_id.clone(),
            restart_reason.clone(),
            restart_instructions.clone(),
            workspace_source.as_deref(),
            &timestamp,
        )
        .await
        {
            Ok(attempt) => {
                let _ = respond.send(Ok(attempt));
                return Ok(());
            }
            Err(e) => {
                last_err = Some(e);
                tokio::time::sleep(backoff(attempt_try)).await;
            }
        }
    }
    let err = last_err.unwrap_or_else(|| CoreError::Storage("unknown storage error".to_string()));
    let _ = respond.send(Err(CoreError::Storage(err.to_string())));
    Err(CoreError::Storage(err.to_string()))
}

#[allow(clippy::too_many_arguments)]
async fn save_attempt_once(
    base: &Path,
    session_id: &str,
    turn_number: u64,
    attempt_number: u64,
    task: &str,
    answer_text: &str,
    winning_agent_id: Option<String>,
    restart_reason: Option<String>,
    restart_instructions: Option<String>,
    workspace_source: Option<&Path>,
    timestamp: &str,
) -> Result<Attempt> {
    let session_dir = base.join(session_id);
    let turn_dir = session_dir.join(format!("turn_{turn_number}"));
    let staging_dir = turn_dir.join(format!("attempt_{attempt_number}.tmp"));
    let final_dir = turn_dir.join(format!("attempt_{attempt_number}"));

    if tokio::fs::try_exists(&staging_dir).await.unwrap_or(false) {
        tokio::fs::remove_dir_all(&staging_dir).await.ok();
    }
    tokio::fs::create_dir_all(&staging_dir)
        .await
        .map_err(|e| CoreError::Storage(format!("creating staging dir: {e}")))?;

    let metadata = AttemptMetadata {
        task: task.to_string(),
        winning_agent_id: winning_agent_id.clone(),
        restart_reason: restart_reason.clone(),
        restart_instructions: restart_instructions.clone(),
        timestamp: timestamp.to_string(),
    };
    let metadata_json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| CoreError::Storage(format!("serializing metadata: {e}")))?;
    tokio::fs::write(staging_dir.join("metadata.json"), metadata_json)
        .await
        .map_err(|e| CoreError::Storage(format!("writing metadata: {e}")))?;
    tokio::fs::write(staging_dir.join("answer.txt"), answer_text)
        .await
        .map_err(|e| CoreError::Storage(format!("writing answer: {e}")))?;

    let workspace_snapshot_path = if let Some(source) = workspace_source {
        let dest = staging_dir.join("workspace");
        copy_workspace_tree(source, &dest)
            .await
            .map_err(|e| CoreError::Storage(format!("copying workspace: {e}")))?;
        Some(final_dir.join("workspace").to_string_lossy().to_string())
    } else {
        None
    };

    tokio::fs::rename(&staging_dir, &final_dir)
        .await
        .map_err(|e| CoreError::Storage(format!("committing attempt dir: {e}")))?;

    append_session_summary(
        &session_dir,
        turn_number,
        attempt_number,
        &winning_agent_id,
        &restart_reason,
    )
    .await;

    Ok(Attempt {
        session_id: session_id.to_string(),
        turn_number,
        attempt_number,
        task: task.to_string(),
        winning_agent_id,
        restart_reason,
        restart_instructions,
        timestamp: timestamp.to_string(),
        answer_text: answer_text.to_string(),
        workspace_snapshot_path,
    })
}

async fn copy_workspace_tree(source: &Path, dest: &Path) -> std::io::Result<()> {
    let source = source.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::create_dir_all(&dest)?;
        for entry in walkdir::WalkDir::new(&source).into_iter().filter_map(std::result::Result::ok) {
            let rel = entry.path().strip_prefix(&source).unwrap_or(entry.path());
            let target = dest.join(rel);
            if entry.file_type().is_dir() {
                std::fs::create_dir_all(&target)?;
            } else if entry.file_type().is_file() {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    })
    .await
    .unwrap_or_else(|e| Err(std::io::Error::other(e)))
}

async fn append_session_summary(
    session_dir: &Path,
    turn_number: u64,
    attempt_number: u64,
    winning_agent_id: &Option<String>,
    restart_reason: &Option<String>,
) {
    use tokio::io::AsyncWriteExt;

    let line = match (winning_agent_id, restart_reason) {
        (Some(winner), _) => {
            format!("turn {turn_number} attempt {attempt_number}: winner={winner}\n")
        }
        (None, Some(reason)) => {
            format!("turn {turn_number} attempt {attempt_number}: restarted ({reason})\n")
        }
        (None, None) => format!("turn {turn_number} attempt {attempt_number}: recorded\n"),
    };

    if tokio::fs::create_dir_all(session_dir).await.is_err() {
        return;
    }
    if let Ok(mut file) = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(session_dir.join("SESSION_SUMMARY"))
        .await
    {
        let _ = file.write_all(line.as_bytes()).await;
    }
}

async fn mark_successful(
    base: &Path,
    session_id: &str,
    turn_number: u64,
    attempt_number: u64,
) -> Result<()> {
    let turn_dir = base.join(session_id).join(format!("turn_{turn_number}"));
    let marker_path = turn_dir.join("successful_attempt.json");

    if let Ok(existing) = tokio::fs::read_to_string(&marker_path).await {
        if let Ok(marker) = serde_json::from_str::<SuccessfulMarker>(&existing) {
            if marker.attempt == attempt_number {
                return Ok(());
            }
            return Err(CoreError::Storage(format!(
                "turn {turn_number} already has a successful attempt ({}); turns are single-winner",
                marker.attempt
            )));
        }
    }

    tokio::fs::create_dir_all(&turn_dir)
        .await
        .map_err(|e| CoreError::Storage(format!("creating turn dir: {e}")))?;
    let json = serde_json::to_string(&SuccessfulMarker { attempt: attempt_number })
        .map_err(|e| CoreError::Storage(format!("serializing marker: {e}")))?;
    let tmp_path = turn_dir.join("successful_attempt.json.tmp");
    tokio::fs::write(&tmp_path, json)
        .await
        .map_err(|e| CoreError::Storage(format!("writing marker: {e}")))?;
    tokio::fs::rename(&tmp_path, &marker_path)
        .await
        .map_err(|e| CoreError::Storage(format!("committing marker: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn save(
        storage: &AttemptStorage,
        session_id: &str,
        turn_number: u64,
        attempt_number: u64,
        answer_text: &str,
        winning_agent_id: Option<&str>,
        workspace_source: Option<&Path>,
    ) -> Attempt {
        storage
            .save_attempt(
                session_id,
                turn_number,
                attempt_number,
                "do the thing",
                answer_text,
                winning_agent_id.map(str::to_string),
                workspace_source,
                None,
                None,
                "2026-01-01T00:00:00Z",
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn mark_successful_attempt_is_idempotent_but_rejects_a_different_winner() {
        let root = TempDir::new().unwrap();
        let storage = AttemptStorage::new(root.path().to_path_buf(), None);
        save(&storage, "s1", 1, 1, "first try", None, None).await;
        save(&storage, "s1", 1, 2, "second try", None, None).await;

        storage.mark_successful_attempt("s1", 1, 2).await.unwrap();
        // Calling again with the same attempt number is a no-op, not an error.
        storage.mark_successful_attempt("s1", 1, 2).await.unwrap();

        let err = storage.mark_successful_attempt("s1", 1, 1).await.unwrap_err();
        assert!(matches!(err, CoreError::Storage(_)));
    }

    #[tokio::test]
    async fn save_attempt_round_trips_through_load_attempts() {
        let root = TempDir::new().unwrap();
        let workspace_source = TempDir::new().unwrap();
        tokio::fs::write(workspace_source.path().join("notes.txt"), b"hello workspace")
            .await
            .unwrap();
        tokio::fs::create_dir_all(workspace_source.path().join("nested")).await.unwrap();
        tokio::fs::write(workspace_source.path().join("nested").join("deep.txt"), b"deep content")
            .await
            .unwrap();

        let storage = AttemptStorage::new(root.path().to_path_buf(), None);
        let saved = storage
            .save_attempt(
                "s2",
                1,
                1,
                "what is the answer",
                "the answer is 42",
                Some("agent-a".to_string()),
                Some(workspace_source.path()),
                Some("agent requested it".to_string()),
                Some("try again with more care".to_string()),
                "2026-01-02T00:00:00Z",
            )
            .await
            .unwrap();

        let loaded = storage.load_attempts("s2", Some(1)).await;
        assert_eq!(loaded.len(), 1);
        let loaded = &loaded[0];

        assert_eq!(loaded.session_id, saved.session_id);
        assert_eq!(loaded.turn_number, saved.turn_number);
        assert_eq!(loaded.attempt_number, saved.attempt_number);
        assert_eq!(loaded.task, saved.task);
        assert_eq!(loaded.answer_text, "the answer is 42");
        assert_eq!(loaded.winning_agent_id.as_deref(), Some("agent-a"));
        assert_eq!(loaded.restart_reason.as_deref(), Some("agent requested it"));
        assert_eq!(loaded.restart_instructions.as_deref(), Some("try again with more care"));
        assert_eq!(loaded.timestamp, "2026-01-02T00:00:00Z");

        let workspace_dir = Path::new(loaded.workspace_snapshot_path.as_deref().unwrap());
        let copied_notes = tokio::fs::read_to_string(workspace_dir.join("notes.txt")).await.unwrap();
        assert_eq!(copied_notes, "hello workspace");
        let copied_nested = tokio::fs::read_to_string(workspace_dir.join("nested").join("deep.txt")).await.unwrap();
        assert_eq!(copied_nested, "deep content");
    }

    #[tokio::test]
    async fn previous_turns_for_session_ignores_unmarked_successful_siblings() {
        let root = TempDir::new().unwrap();
        let storage = AttemptStorage::new(root.path().to_path_buf(), None);
        save(&storage, "s3", 1, 1, "inconclusive attempt", None, None).await;
        save(&storage, "s3", 1, 2, "winning answer", Some("agent-b"), None).await;
        storage.mark_successful_attempt("s3", 1, 2).await.unwrap();

        let records = storage.previous_turns_for_session("s3").await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].turn_number, 1);
        assert_eq!(records[0].answer_text, "winning answer");
        assert_eq!(records[0].winning_agent_id.as_deref(), Some("agent-b"));
    }

    #[tokio::test]
    async fn resolve_write_base_prefers_the_location_holding_turn_1() {
        let primary = TempDir::new().unwrap();
        let alternate = TempDir::new().unwrap();
        tokio::fs::create_dir_all(alternate.path().join("s4").join("turn_1")).await.unwrap();
        tokio::fs::create_dir_all(primary.path().join("s4").join("turn_3")).await.unwrap();

        let chosen = resolve_write_base(primary.path(), Some(alternate.path()), "s4").await;
        assert_eq!(chosen, alternate.path().to_path_buf());
    }

    #[tokio::test]
    async fn resolve_write_base_falls_back_to_highest_turn_number_when_neither_has_turn_1() {
        let primary = TempDir::new().unwrap();
        let alternate = TempDir::new().unwrap();
        tokio::fs::create_dir_all(primary.path().join("s5").join("turn_2")).await.unwrap();
        tokio::fs::create_dir_all(alternate.path().join("s5").join("turn_5")).await.unwrap();

        let chosen = resolve_write_base(primary.path(), Some(alternate.path()), "s5").await;
        assert_eq!(chosen, alternate.path().to_path_buf());
    }

    #[tokio::test]
    async fn resolve_write_base_defaults_to_primary_with_no_alternate() {
        let primary = TempDir::new().unwrap();
        let chosen = resolve_write_base(primary.path(), None, "s6").await;
        assert_eq!(chosen, primary.path().to_path_buf());
    }

    #[tokio::test]
    async fn split_location_merge_lands_new_writes_at_the_turn_1_location() {
        let primary = TempDir::new().unwrap();
        let alternate = TempDir::new().unwrap();
        // Turn 1 of this session already lives in `alternate`.
        tokio::fs::create_dir_all(alternate.path().join("s7").join("turn_1").join("attempt_1")).await.unwrap();
        tokio::fs::write(
            alternate.path().join("s7").join("turn_1").join("attempt_1").join("metadata.json"),
            serde_json::to_string(&AttemptMetadata {
                task: "first".to_string(),
                winning_agent_id: Some("agent-a".to_string()),
                restart_reason: None,
                restart_instructions: None,
                timestamp: "2026-01-01T00:00:00Z".to_string(),
            })
            .unwrap(),
        )
        .await
        .unwrap();
        tokio::fs::write(
            alternate.path().join("s7").join("turn_1").join("attempt_1").join("answer.txt"),
            "first answer",
        )
        .await
        .unwrap();

        let storage = AttemptStorage::new(primary.path().to_path_buf(), Some(alternate.path().to_path_buf()));
        storage
            .save_attempt(
                "s7",
                2,
                1,
                "second turn",
                "second answer",
                None,
                None,
                None,
                None,
                "2026-01-03T00:00:00Z",
            )
            .await
            .unwrap();

        assert!(alternate.path().join("s7").join("turn_2").join("attempt_1").exists());
        assert!(!primary.path().join("s7").join("turn_2").exists());
    }

    #[tokio::test]
    async fn session_resume_reconstructs_turn_history_in_order() {
        let root = TempDir::new().unwrap();
        let storage = AttemptStorage::new(root.path().to_path_buf(), None);

        save(&storage, "s8", 1, 1, "turn one answer", Some("agent-a"), None).await;
        storage.mark_successful_attempt("s8", 1, 1).await.unwrap();
        save(&storage, "s8", 2, 1, "turn two answer", Some("agent-b"), None).await;
        storage.mark_successful_attempt("s8", 2, 1).await.unwrap();

        let records = storage.previous_turns_for_session("s8").await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].turn_number, 1);
        assert_eq!(records[0].answer_text, "turn one answer");
        assert_eq!(records[1].turn_number, 2);
        assert_eq!(records[1].answer_text, "turn two answer");

        let next_turn = records.iter().map(|t| t.turn_number).max().unwrap_or(0) + 1;
        assert_eq!(next_turn, 3);
    }
}
