// Extraction backend and outbound message traits

use async_trait::async_trait;

use super::errors::ExtractionError;
use super::models::{DownloadJob, DownloadOutcome, ProbeResult, SourceOverride};
use crate::server::protocol::ServerMessage;

/// Trait for media extraction backends (yt-dlp in production)
#[async_trait]
pub trait MediaExtractor: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// Metadata-only extraction. Applies override cookies, never the override format.
    async fn probe(
        &self,
        url: &str,
        overrides: Option<&SourceOverride>,
    ) -> Result<ProbeResult, ExtractionError>;

    /// Fetch the media into `job.destination`, which must be non-empty.
    /// Applies override cookies and format.
    async fn download(
        &self,
        job: &DownloadJob,
        overrides: Option<&SourceOverride>,
    ) -> Result<DownloadOutcome, ExtractionError>;
}

/// Where the orchestrator sends messages for the client it is serving
pub trait MessageSink: Send + Sync {
    fn send(&self, message: ServerMessage);
}
