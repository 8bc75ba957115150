// Downloader module - probe, rank, pick, download

pub mod backends;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod overrides;
pub mod ranking;
pub mod tools;
pub mod traits;
pub mod utils;

pub use errors::{ExtractionError, RequestError};
pub use models::{DestinationCandidate, DestinationCatalog, OverrideTable, SourceOverride};
pub use orchestrator::{Orchestrator, Session};
pub use traits::{MediaExtractor, MessageSink};
