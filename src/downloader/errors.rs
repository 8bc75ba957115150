// Error types for the extraction gateway and the request orchestrator

use thiserror::Error;

/// Failure of a single yt-dlp invocation
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// yt-dlp binary could not be started
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// yt-dlp has no extractor for the URL
    #[error("Unsupported URL: {0}")]
    UnsupportedUrl(String),

    /// The site refused the request (429, bot check)
    #[error("Rate limited by site: {0}")]
    RateLimited(String),

    /// Failed to parse yt-dlp JSON output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Invocation exceeded the configured deadline
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// Process exited unsuccessfully or could not be driven
    #[error("Execution error: {0}")]
    ExecutionError(String),
}

impl From<String> for ExtractionError {
    /// Classify yt-dlp stderr output
    fn from(s: String) -> Self {
        let detail = s.trim().to_string();

        if detail.contains("command not found") || detail.contains("No such file") {
            return Self::ToolNotFound(detail);
        }

        if detail.contains("Unsupported URL") || detail.contains("is not a valid URL") {
            return Self::UnsupportedUrl(detail);
        }

        if detail.contains("HTTP Error 429")
            || detail.contains("Too Many Requests")
            || detail.contains("confirm you're not a bot")
        {
            return Self::RateLimited(detail);
        }

        Self::ExecutionError(detail)
    }
}

/// Everything that can end a single download request early.
///
/// None of these escape the orchestrator: each one is turned into an
/// `error` message for the client that asked.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("metadata probe failed: {0}")]
    ProbeFailure(#[source] ExtractionError),

    #[error("download failed: {0}")]
    DownloadFailure(#[source] ExtractionError),

    #[error("no title found for {url}")]
    NoTitle { url: String },

    #[error("No paths found")]
    NoCandidates,

    #[error("unknown destination id {id}")]
    UnknownDestination { id: String },

    #[error("destination {name} (id {id}) has no path configured")]
    InvalidDestinationPath { id: String, name: String },
}

impl RequestError {
    /// Short machine key sent in the `error` field
    pub fn key(&self) -> &'static str {
        match self {
            Self::ProbeFailure(_) | Self::DownloadFailure(_) => "run",
            Self::NoTitle { .. } => "no_title",
            Self::NoCandidates => "no_paths",
            Self::UnknownDestination { .. } => "unknown_destination",
            Self::InvalidDestinationPath { .. } => "invalid_path",
        }
    }
}
