use std::pin::Pin;

use futures_util::Stream;

use crate::{ChatCompletion, ChatCompletionChunk, CompletionRequest, Error};

/// A lazy, pull-driven sequence of canonical chunks.
///
/// Nothing is produced ahead of `poll_next`; dropping the stream releases
/// the underlying connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, Error>> + Send>>;

/// The vendor-agnostic adapter contract.
///
/// One implementation per vendor, plus the canonical-passthrough proxy.
/// Adapters translate between the canonical schema and their native wire
/// format; they never see another vendor's shapes.
#[async_trait::async_trait]
pub trait ChatProvider: Send + Sync + 'static {
    /// Stable identifier for routing diagnostics (vendor name or proxy name).
    fn name(&self) -> &str;

    /// Run a buffered chat completion.
    async fn completion(&self, request: &CompletionRequest) -> Result<ChatCompletion, Error>;

    /// Run a streaming chat completion. The stream terminates cleanly on the
    /// vendor's end-of-stream signal or the decoder sentinel and is not
    /// restartable.
    async fn stream_completion(&self, request: &CompletionRequest) -> Result<ChunkStream, Error>;

    /// Vendor-specific recognition predicate, used only as a resolution
    /// fallback for bare model names.
    fn supports_model(&self, _model: &str) -> bool {
        false
    }
}
