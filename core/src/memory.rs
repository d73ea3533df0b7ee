//! The memory adapter capability (spec §6 "Memory adapter contract").
//!
//! Grounded in the same shape as `crate::backend::Backend` and
//! `crate::tools::ToolHandler`: one trait, no concrete implementation in
//! this crate. The core only needs to know that *something* can save/load/
//! search/update opaque content by id; it never knows the storage backend
//! (vector store, mem0, a flat file) behind it (spec §1 Non-goals: "does not
//! implement vector stores").

use async_trait::async_trait;
use strum_macros::Display;

use crate::error::Result;

/// Coarse retention tier a caller may request for a saved memory (spec §6).
/// The core does not interpret this beyond passing it through; a concrete
/// adapter decides what "short" vs. "long" means for its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MemoryTier {
    Short,
    Long,
}

/// `save(content, tier)`, `load(id)`, `search(query)`, `update(id, content)`
/// (spec §6). No implementation ships in this crate; an external adapter
/// (vector store, mem0, etc.) satisfies this trait independently of the
/// coordination core.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Persist `content` under the given tier, returning an id a later
    /// `load`/`update` can use.
    async fn save(&self, content: String, tier: MemoryTier) -> Result<String>;

    /// Fetch previously saved content by id. `None` if the id is unknown,
    /// never an error — an unknown id is a normal outcome, not a failure.
    async fn load(&self, id: &str) -> Result<Option<String>>;

    /// Free-text search over saved content. Ranking and recall are entirely
    /// up to the adapter.
    async fn search(&self, query: &str) -> Result<Vec<String>>;

    /// Replace the content stored under `id`.
    async fn update(&self, id: &str, content: String) -> Result<()>;
}
