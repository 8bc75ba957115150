// yt-dlp backend - probe with --dump-json, download with streamed progress

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info};

use crate::downloader::errors::ExtractionError;
use crate::downloader::models::{DownloadJob, DownloadOutcome, ProbeResult, SourceOverride};
use crate::downloader::traits::MediaExtractor;
use crate::downloader::utils::{run_output, run_streaming};

/// Extractor that shells out to the yt-dlp binary
pub struct YtDlpExtractor {
    binary: String,
    quiet: bool,
    deadline: Option<Duration>,
}

impl YtDlpExtractor {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            quiet: false,
            deadline: None,
        }
    }

    /// Pass `--quiet` to every invocation
    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    /// Kill invocations that run longer than this
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    fn probe_args(&self, url: &str, overrides: Option<&SourceOverride>) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
        ];

        if self.quiet {
            args.push("--quiet".to_string());
        }

        // Format is a download concern; probing only needs cookies
        if let Some(cookies) = overrides.and_then(|o| o.cookies.as_ref()) {
            args.push("--cookies".to_string());
            args.push(cookies.clone());
        }

        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn download_args(&self, job: &DownloadJob, overrides: Option<&SourceOverride>) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "-P".to_string(),
            job.destination.to_string_lossy().into_owned(),
        ];

        if self.quiet {
            args.push("--quiet".to_string());
        }

        if let Some(rule) = overrides {
            if let Some(cookies) = &rule.cookies {
                args.push("--cookies".to_string());
                args.push(cookies.clone());
            }
            if let Some(format) = &rule.format {
                args.push("-f".to_string());
                args.push(format.clone());
            }
        }

        if job.audio_only {
            args.extend([
                "-x".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
            ]);
        }

        args.push("--".to_string());
        args.push(job.url.clone());
        args
    }
}

fn failure(stderr: &str, status: std::process::ExitStatus) -> ExtractionError {
    if stderr.trim().is_empty() {
        ExtractionError::ExecutionError(format!("yt-dlp exited with {}", status))
    } else {
        ExtractionError::from(stderr.to_string())
    }
}

/// Pull title, tags and format count out of `--dump-json` output
pub fn parse_probe(stdout: &[u8]) -> Result<ProbeResult, ExtractionError> {
    let json: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| ExtractionError::ParseError(format!("Invalid JSON: {}", e)))?;

    if !json.is_object() {
        return Err(ExtractionError::ParseError(
            "Expected a JSON object from yt-dlp".to_string(),
        ));
    }

    let title = json["title"]
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string);

    let tags = json["tags"]
        .as_array()
        .map(|tags| {
            tags.iter()
                .filter_map(|tag| tag.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let format_count = json["formats"].as_array().map_or(0, Vec::len);

    Ok(ProbeResult {
        title,
        tags,
        format_count,
    })
}

/// Interesting lines from `yt-dlp --newline` output
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressLine {
    Progress { percent: f32, status: String },
    /// A file yt-dlp is writing or converting to
    Destination(String),
    /// Final merged output
    Merged(String),
    AlreadyDownloaded(String),
}

impl ProgressLine {
    /// File name carried by the line, if any
    pub fn file(&self) -> Option<&str> {
        match self {
            Self::Progress { .. } => None,
            Self::Destination(file) | Self::Merged(file) | Self::AlreadyDownloaded(file) => {
                Some(file)
            }
        }
    }
}

/// Parse yt-dlp progress line like:
/// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    lazy_static::lazy_static! {
        static ref PROGRESS_RE: Regex = Regex::new(
            r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*(\d+\.?\d*\s*\w+)(?:\s+at\s+(\S+\s*\S*/s))?(?:\s+ETA\s+(\S+))?"
        ).unwrap();
        static ref DEST_RE: Regex = Regex::new(r"^\[(?:download|ExtractAudio)\]\s+Destination:\s+(.+)$").unwrap();
        static ref MERGE_RE: Regex = Regex::new(r#"^\[Merger\]\s+Merging formats into "(.+)"$"#).unwrap();
        static ref ALREADY_RE: Regex = Regex::new(r"^\[download\]\s+(.+) has already been downloaded").unwrap();
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let size = caps.get(2).map_or("?", |m| m.as_str());
        let status = match (caps.get(3), caps.get(4)) {
            (Some(speed), Some(eta)) => {
                format!("{:.1}% of {} @ {} ETA {}", percent, size, speed.as_str(), eta.as_str())
            }
            (Some(speed), None) => format!("{:.1}% of {} @ {}", percent, size, speed.as_str()),
            _ => format!("{:.1}% of {}", percent, size),
        };
        return Some(ProgressLine::Progress { percent, status });
    }

    if let Some(caps) = MERGE_RE.captures(line) {
        return Some(ProgressLine::Merged(caps[1].to_string()));
    }

    if let Some(caps) = DEST_RE.captures(line) {
        return Some(ProgressLine::Destination(caps[1].trim().to_string()));
    }

    if let Some(caps) = ALREADY_RE.captures(line) {
        return Some(ProgressLine::AlreadyDownloaded(caps[1].to_string()));
    }

    None
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(
        &self,
        url: &str,
        overrides: Option<&SourceOverride>,
    ) -> Result<ProbeResult, ExtractionError> {
        let args = self.probe_args(url, overrides);
        debug!(binary = %self.binary, args = ?args, "Running probe");

        let output = run_output(&self.binary, &args, self.deadline).await?;
        if !output.status.success() {
            return Err(failure(&String::from_utf8_lossy(&output.stderr), output.status));
        }

        parse_probe(&output.stdout)
    }

    async fn download(
        &self,
        job: &DownloadJob,
        overrides: Option<&SourceOverride>,
    ) -> Result<DownloadOutcome, ExtractionError> {
        let args = self.download_args(job, overrides);
        debug!(binary = %self.binary, args = ?args, "Running download");

        let mut file: Option<String> = None;
        let run = run_streaming(&self.binary, &args, self.deadline, |line| {
            match parse_progress_line(line) {
                Some(ProgressLine::Progress { percent, status }) => {
                    debug!(url = %job.url, percent, "{status}")
                }
                Some(parsed) => {
                    if let Some(name) = parsed.file() {
                        info!(url = %job.url, file = %name, "yt-dlp output file");
                        file = Some(name.to_string());
                    }
                }
                None => {}
            }
        })
        .await?;

        if !run.status.success() {
            return Err(failure(&run.stderr, run.status));
        }

        Ok(DownloadOutcome { file })
    }
}
