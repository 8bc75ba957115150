// Request orchestration - probe, offer ranked destinations, then download
//
// One `Session` per client connection. Probing and downloading happen inside
// `Session::handle`, so a session is only ever IDLE or AWAITING_CHOICE
// between messages.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::errors::RequestError;
use super::models::{DestinationCandidate, DestinationCatalog, DownloadJob, OverrideTable};
use super::overrides::resolve;
use super::ranking::{rank, RankingMode};
use super::traits::{MediaExtractor, MessageSink};
use crate::server::protocol::{ClientMessage, ServerMessage};

/// Shared, read-only tables plus the extraction backend
pub struct Orchestrator {
    catalog: DestinationCatalog,
    overrides: OverrideTable,
    ranking: RankingMode,
    extractor: Arc<dyn MediaExtractor>,
}

impl Orchestrator {
    pub fn new(
        catalog: DestinationCatalog,
        overrides: OverrideTable,
        ranking: RankingMode,
        extractor: Arc<dyn MediaExtractor>,
    ) -> Self {
        Self {
            catalog,
            overrides,
            ranking,
            extractor,
        }
    }

    /// Start a fresh, idle session that reports to `sink`
    pub fn session(self: &Arc<Self>, sink: Arc<dyn MessageSink>) -> Session {
        Session {
            orchestrator: Arc::clone(self),
            sink,
            state: SessionState::Idle,
        }
    }
}

/// A connection has been offered destinations for `url` and owes us a pick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChoice {
    pub url: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingChoice(PendingChoice),
}

/// Per-connection request state machine
pub struct Session {
    orchestrator: Arc<Orchestrator>,
    sink: Arc<dyn MessageSink>,
    state: SessionState,
}

impl Session {
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Process one client message to completion
    pub async fn handle(&mut self, message: ClientMessage) {
        match message {
            ClientMessage::Download { url } => self.start(url).await,
            ClientMessage::PickedPath {
                url,
                id,
                audio_only,
            } => self.pick(url, id, audio_only).await,
        }
    }

    async fn start(&mut self, url: String) {
        if let SessionState::AwaitingChoice(pending) = &self.state {
            debug!(url = %pending.url, "Abandoning pending choice for new request");
        }
        self.state = SessionState::Idle;

        match self.probe(&url).await {
            Ok((title, paths)) => {
                info!(
                    url = %url,
                    title = %title,
                    candidates = paths.len(),
                    "Offering destinations"
                );
                self.state = SessionState::AwaitingChoice(PendingChoice {
                    url: url.clone(),
                    title,
                });
                self.sink.send(ServerMessage::ChoosePath { url, paths });
            }
            Err(err) => self.report(&url, err),
        }
    }

    async fn probe(&self, url: &str) -> Result<(String, Vec<DestinationCandidate>), RequestError> {
        let orchestrator = &self.orchestrator;
        let rule = resolve(url, orchestrator.overrides.entries());

        info!(url = %url, backend = orchestrator.extractor.name(), "Probing metadata");
        let probe = orchestrator
            .extractor
            .probe(url, rule)
            .await
            .map_err(RequestError::ProbeFailure)?;

        debug!(
            title = ?probe.title,
            tags = ?probe.tags,
            formats = probe.format_count,
            "Probe result"
        );

        let title = probe.title.ok_or_else(|| RequestError::NoTitle {
            url: url.to_string(),
        })?;

        let ranked = rank(
            &title,
            &probe.tags,
            orchestrator.catalog.entries(),
            orchestrator.ranking,
        );
        if ranked.is_empty() {
            return Err(RequestError::NoCandidates);
        }

        Ok((title, ranked.into_iter().cloned().collect()))
    }

    async fn pick(&mut self, url: String, id: String, audio_only: bool) {
        let pending = match std::mem::take(&mut self.state) {
            SessionState::AwaitingChoice(pending) if pending.url == url => pending,
            other => {
                debug!(url = %url, id = %id, state = ?other, "Ignoring stale path pick");
                self.state = other;
                return;
            }
        };

        if let Err(err) = self.download(&pending, &id, audio_only).await {
            self.report(&url, err);
        }
    }

    async fn download(
        &self,
        pending: &PendingChoice,
        id: &str,
        audio_only: bool,
    ) -> Result<(), RequestError> {
        let orchestrator = &self.orchestrator;

        let destination = orchestrator
            .catalog
            .get(id)
            .ok_or_else(|| RequestError::UnknownDestination { id: id.to_string() })?;

        if !destination.has_target() {
            return Err(RequestError::InvalidDestinationPath {
                id: destination.id.clone(),
                name: destination.name.clone(),
            });
        }

        let rule = resolve(&pending.url, orchestrator.overrides.entries());
        if let Some(rule) = rule {
            info!(
                pattern = %rule.url_pattern,
                cookies = rule.cookies.is_some(),
                format = ?rule.format,
                "Custom url settings"
            );
        }

        let job = DownloadJob {
            url: pending.url.clone(),
            destination: PathBuf::from(&destination.filesystem_path),
            audio_only,
        };

        info!(
            url = %job.url,
            path = %destination.filesystem_path,
            audio_only,
            "Downloading to path"
        );
        self.sink.send(ServerMessage::DownloadStarted {
            url: pending.url.clone(),
            title: pending.title.clone(),
            path: destination.filesystem_path.clone(),
        });

        let outcome = orchestrator
            .extractor
            .download(&job, rule)
            .await
            .map_err(RequestError::DownloadFailure)?;

        info!(url = %job.url, file = ?outcome.file, "Download finished");
        self.sink.send(ServerMessage::DownloadFinished {
            url: pending.url.clone(),
            title: pending.title.clone(),
            path: destination.filesystem_path.clone(),
            file: outcome.file,
        });

        Ok(())
    }

    fn report(&self, url: &str, err: RequestError) {
        match &err {
            RequestError::NoCandidates | RequestError::NoTitle { .. } => {
                warn!(url = %url, "{err}")
            }
            _ => error!(url = %url, key = err.key(), "{err}"),
        }

        self.sink.send(ServerMessage::error(err.key(), err.to_string()));
    }
}
