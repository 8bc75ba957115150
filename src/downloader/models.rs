// Common data models for the download pipeline

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A folder a download can be routed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationCandidate {
    /// Sequential id assigned at load time ("0", "1", ...), stable for one run only
    pub id: String,
    pub name: String,
    /// Target directory. May be empty in the catalog; rejected at download time.
    #[serde(rename = "path")]
    pub filesystem_path: String,
    /// Lowercase, de-duplicated
    pub keywords: Vec<String>,
}

impl DestinationCandidate {
    /// Build a candidate, lowercasing and de-duplicating the keywords
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        filesystem_path: impl Into<String>,
        keywords: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let mut normalized: Vec<String> = Vec::new();
        for keyword in keywords {
            let keyword = keyword.as_ref().to_lowercase();
            if !normalized.contains(&keyword) {
                normalized.push(keyword);
            }
        }

        Self {
            id: id.into(),
            name: name.into(),
            filesystem_path: filesystem_path.into(),
            keywords: normalized,
        }
    }

    /// Whether this entry can receive a download
    pub fn has_target(&self) -> bool {
        !self.filesystem_path.is_empty()
    }
}

/// Read-only table of destinations, built once at startup
#[derive(Debug, Clone, Default)]
pub struct DestinationCatalog {
    entries: Vec<DestinationCandidate>,
}

impl DestinationCatalog {
    pub fn new(entries: Vec<DestinationCandidate>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[DestinationCandidate] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&DestinationCandidate> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-site cookies / format rule, matched by URL substring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceOverride {
    pub url_pattern: String,
    /// Path to a Netscape cookies file
    pub cookies: Option<String>,
    /// yt-dlp format selector
    pub format: Option<String>,
}

impl SourceOverride {
    /// Build an override; empty strings count as "not set"
    pub fn new(
        url_pattern: impl Into<String>,
        cookies: Option<String>,
        format: Option<String>,
    ) -> Self {
        Self {
            url_pattern: url_pattern.into(),
            cookies: cookies.filter(|c| !c.is_empty()),
            format: format.filter(|f| !f.is_empty()),
        }
    }
}

/// Ordered override rules; first match wins
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: Vec<SourceOverride>,
}

impl OverrideTable {
    pub fn new(entries: Vec<SourceOverride>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[SourceOverride] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Metadata from one probe invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeResult {
    /// `None` when the extractor reported no (or an empty) title
    pub title: Option<String>,
    pub tags: Vec<String>,
    /// Number of formats the extractor listed (logging only)
    pub format_count: usize,
}

/// Everything the extractor needs to perform one download
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadJob {
    pub url: String,
    pub destination: PathBuf,
    pub audio_only: bool,
}

/// Result of a successful download
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DownloadOutcome {
    /// Final file as reported by the extractor, if it could be determined
    pub file: Option<String>,
}
