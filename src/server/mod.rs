// WebSocket front door: `/ws` upgrades, everything else is a 404

pub mod connection;
pub mod protocol;
pub mod registry;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::downloader::orchestrator::Orchestrator;
use registry::ConnectionRegistry;

/// Shared by every connection handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub registry: ConnectionRegistry,
    /// Bound on each connection's inbound request queue
    pub queue_capacity: usize,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, queue_capacity: usize) -> Self {
        Self {
            orchestrator,
            registry: ConnectionRegistry::new(),
            queue_capacity,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .fallback(not_found)
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| connection::handle_socket(socket, state, remote))
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Invalid route")
}

/// Serve until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Listening for connections");
    }

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::errors::ExtractionError;
    use crate::downloader::models::{
        DestinationCandidate, DestinationCatalog, DownloadJob, DownloadOutcome, OverrideTable,
        ProbeResult, SourceOverride,
    };
    use crate::downloader::ranking::RankingMode;
    use crate::downloader::traits::MediaExtractor;
    use async_trait::async_trait;
    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::time::{sleep, timeout, timeout_at, Instant};
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    /// Probes of URLs containing "slow" take `slow`; everything is recorded
    struct TimedExtractor {
        slow: Duration,
        events: Mutex<Vec<String>>,
    }

    impl TimedExtractor {
        fn slow(slow: Duration) -> Arc<Self> {
            Arc::new(Self {
                slow,
                events: Mutex::new(Vec::new()),
            })
        }

        fn record(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaExtractor for TimedExtractor {
        fn name(&self) -> &'static str {
            "timed"
        }

        async fn probe(
            &self,
            url: &str,
            _overrides: Option<&SourceOverride>,
        ) -> Result<ProbeResult, ExtractionError> {
            self.record(format!("start {url}"));
            if url.contains("slow") {
                sleep(self.slow).await;
            }
            self.record(format!("end {url}"));

            Ok(ProbeResult {
                title: Some("Cool Song Remix".into()),
                tags: vec![],
                format_count: 1,
            })
        }

        async fn download(
            &self,
            job: &DownloadJob,
            _overrides: Option<&SourceOverride>,
        ) -> Result<DownloadOutcome, ExtractionError> {
            self.record(format!("download {}", job.url));
            Ok(DownloadOutcome {
                file: Some(format!("{}/song.mp3", job.destination.display())),
            })
        }
    }

    async fn start(extractor: Arc<TimedExtractor>) -> SocketAddr {
        let catalog = DestinationCatalog::new(vec![
            DestinationCandidate::new("0", "Downloads", "/d", Vec::<String>::new()),
            DestinationCandidate::new("1", "Music", "/m", ["music", "song"]),
        ]);
        let orchestrator = Arc::new(Orchestrator::new(
            catalog,
            OverrideTable::default(),
            RankingMode::TitleOnly,
            extractor,
        ));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(orchestrator, 4);
        tokio::spawn(serve(listener, state, std::future::pending()));
        addr
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
            .await
            .unwrap();
        ws
    }

    async fn send(ws: &mut Client, value: Value) {
        ws.send(WsMessage::text(value.to_string())).await.unwrap();
    }

    async fn request(ws: &mut Client, url: &str) {
        send(ws, json!({"type": "download", "data": {"url": url}})).await;
    }

    async fn next_json(ws: &mut Client) -> Value {
        loop {
            let frame = ws.next().await.unwrap().unwrap();
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_websocket_round_trip() {
        let addr = start(TimedExtractor::slow(Duration::ZERO)).await;
        let mut ws = connect(addr).await;

        // unknown types are ignored without a reply
        send(&mut ws, json!({"type": "hello", "data": {}})).await;
        request(&mut ws, "https://a.com/v").await;

        let offer = next_json(&mut ws).await;
        assert_eq!(offer["type"], "choose_path");
        assert_eq!(offer["url"], "https://a.com/v");
        assert_eq!(offer["paths"][0]["id"], "1");
        assert_eq!(offer["paths"][1]["id"], "0");

        send(
            &mut ws,
            json!({"type": "picked_path", "data": {"url": "https://a.com/v", "id": "1"}}),
        )
        .await;

        let started = next_json(&mut ws).await;
        assert_eq!(started["type"], "download-started");
        assert_eq!(started["path"], "/m");

        let finished = next_json(&mut ws).await;
        assert_eq!(finished["type"], "download-finished");
        assert_eq!(finished["title"], "Cool Song Remix");
        assert_eq!(finished["file"], "/m/song.mp3");
    }

    #[tokio::test]
    async fn test_one_connection_is_handled_in_order() {
        let extractor = TimedExtractor::slow(Duration::from_millis(200));
        let addr = start(extractor.clone()).await;
        let mut ws = connect(addr).await;

        request(&mut ws, "slow-1").await;
        request(&mut ws, "slow-2").await;

        assert_eq!(next_json(&mut ws).await["url"], "slow-1");
        assert_eq!(next_json(&mut ws).await["url"], "slow-2");
        assert_eq!(
            extractor.events(),
            vec!["start slow-1", "end slow-1", "start slow-2", "end slow-2"]
        );
    }

    #[tokio::test]
    async fn test_slow_connection_does_not_hold_up_others() {
        let addr = start(TimedExtractor::slow(Duration::from_secs(3))).await;
        let mut busy = connect(addr).await;
        let mut other = connect(addr).await;

        request(&mut busy, "slow-1").await;
        sleep(Duration::from_millis(50)).await;
        request(&mut other, "fast-1").await;

        let offer = timeout(Duration::from_secs(1), next_json(&mut other))
            .await
            .expect("second connection waited on the first");
        assert_eq!(offer["type"], "choose_path");
        assert_eq!(offer["url"], "fast-1");
    }

    #[tokio::test]
    async fn test_disconnect_drops_queued_requests() {
        let extractor = TimedExtractor::slow(Duration::from_millis(300));
        let addr = start(extractor.clone()).await;
        let mut watcher = connect(addr).await;
        let mut leaving = connect(addr).await;

        request(&mut leaving, "slow-1").await;
        send(
            &mut leaving,
            json!({"type": "picked_path", "data": {"url": "slow-1", "id": "1"}}),
        )
        .await;
        request(&mut leaving, "slow-2").await;
        sleep(Duration::from_millis(50)).await;
        leaving.close(None).await.unwrap();
        drop(leaving);

        // the in-flight offer has no origin left and is broadcast; nothing else may follow
        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_millis(1200);
        while let Ok(Some(Ok(frame))) = timeout_at(deadline, watcher.next()).await {
            if let WsMessage::Text(text) = frame {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                seen.push(format!("{} {}", value["type"], value["url"]));
            }
        }

        assert!(
            seen.iter().all(|frame| frame == r#""choose_path" "slow-1""#),
            "unexpected frames: {seen:?}"
        );
        assert_eq!(extractor.events(), vec!["start slow-1", "end slow-1"]);
    }

    #[tokio::test]
    async fn test_other_routes_are_not_found() {
        let addr = start(TimedExtractor::slow(Duration::ZERO)).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /nope HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 404"));
        assert!(response.ends_with("Invalid route"));
    }
}
