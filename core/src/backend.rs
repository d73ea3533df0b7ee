//! The backend capability (spec §6) and the stream type a runner consumes it
//! through.
//!
//! Grounded in the teacher's `client_common::ResponseStream`, which wraps an
//! `mpsc::Receiver` in a `futures::Stream` impl so callers can `.next()` it
//! inside a `tokio::select!` alongside a cancellation branch. Here the item
//! type is the core's own `StreamChunk` rather than a provider-specific
//! `ResponseEvent`.

use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
use futures::Stream;
use massgen_protocol::Message;
use massgen_protocol::StreamChunk;
use massgen_protocol::ToolSpec;
use tokio::sync::mpsc;

use crate::error::CoreError;

/// Extra context a backend may use to shape its request (e.g. a model name
/// or temperature chosen by the caller's config layer). Opaque to the core:
/// see spec §3 "a backend handle (opaque)".
#[derive(Debug, Clone, Default)]
pub struct TurnContext {
    pub agent_id: String,
}

/// A lazy, cancellable sequence of `StreamChunk`s (spec §4.1). Implements
/// `futures::Stream` by delegating to an internal channel receiver so a
/// runner can `.next().await` it the same way regardless of whether the
/// producing backend streams natively or used
/// `massgen_protocol::chunk::simulate_stream` to synthesize one.
pub struct BackendStream {
    rx: mpsc::Receiver<Result<StreamChunk, CoreError>>,
}

impl BackendStream {
    pub fn new(rx: mpsc::Receiver<Result<StreamChunk, CoreError>>) -> Self {
        Self { rx }
    }

    /// Build a stream from an already-complete vector of chunks, e.g. the
    /// output of `simulate_stream`. Used by in-memory test fakes and by
    /// non-streaming backend adapters.
    pub fn from_chunks(chunks: Vec<StreamChunk>) -> Self {
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // An unbounded-enough buffer per above; a full channel here
            // would indicate a caller-side bug, not a runtime condition.
            let _ = tx.try_send(Ok(chunk));
        }
        Self { rx }
    }
}

impl Stream for BackendStream {
    type Item = Result<StreamChunk, CoreError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// One operation, `execute_streaming`, uniform across every LLM provider
/// (spec §6, §9 "dynamic dispatch / polymorphic backends -> capability
/// interfaces"). No implementation ships in this crate.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn execute_streaming(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSpec>,
        context: TurnContext,
    ) -> BackendStream;
}
