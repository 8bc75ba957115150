// Per-connection tasks: frame reader, single-consumer worker, writer
//
// The reader never runs a request itself. It decodes frames into a bounded
// queue; one worker per connection takes from that queue in order, so
// requests from the same client are handled one at a time. On disconnect the
// worker finishes the request in flight and discards whatever is still queued.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, Receiver, Sender, UnboundedReceiver};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::protocol::{decode, ClientMessage, Inbound, ServerMessage};
use super::registry::ConnectionId;
use super::AppState;
use crate::downloader::orchestrator::Session;

/// Drive one upgraded socket until the client goes away
pub async fn handle_socket(socket: WebSocket, state: AppState, remote: SocketAddr) {
    let (id, outbound) = state.registry.add();
    info!(connection = id, addr = %remote, live = state.registry.len(), "New connection");

    let (ws_tx, ws_rx) = socket.split();
    let writer = tokio::spawn(write_loop(id, ws_tx, outbound));

    let (queue_tx, queue_rx) = mpsc::channel(state.queue_capacity.max(1));
    let session = state
        .orchestrator
        .session(Arc::new(state.registry.sink_for(id)));
    let (closed_tx, closed_rx) = oneshot::channel();
    let worker = tokio::spawn(work_loop(id, session, queue_rx, closed_rx));

    read_loop(id, ws_rx, queue_tx).await;

    let _ = closed_tx.send(());
    // Closes this connection's outbound queue; late replies get broadcast instead
    state.registry.remove(id);
    info!(connection = id, addr = %remote, live = state.registry.len(), "Connection closed");

    // No cancellation: an in-flight request runs to completion, then the session
    // (and any pending choice) is dropped.
    if let Err(err) = worker.await {
        error!(connection = id, error = %err, "Worker task failed");
    }
    if let Err(err) = writer.await {
        error!(connection = id, error = %err, "Writer task failed");
    }
}

async fn read_loop(
    id: ConnectionId,
    mut frames: SplitStream<WebSocket>,
    queue: Sender<ClientMessage>,
) {
    while let Some(frame) = frames.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!(connection = id, error = %err, "ReadMessage failed");
                break;
            }
        };

        match frame {
            Message::Text(text) => match decode(text.as_str()) {
                Ok(Inbound::Message(message)) => {
                    debug!(connection = id, message = ?message, "Message");
                    if queue.send(message).await.is_err() {
                        warn!(connection = id, "Worker gone, closing connection");
                        break;
                    }
                }
                Ok(Inbound::Unknown(kind)) => {
                    info!(connection = id, kind = %kind, "Unknown message type");
                }
                Err(err) => {
                    warn!(connection = id, error = %err, "Dropping undecodable message");
                }
            },
            Message::Close(_) => break,
            // Ping/pong are answered by axum; binary frames are not part of the protocol
            _ => {}
        }
    }
}

async fn work_loop(
    id: ConnectionId,
    mut session: Session,
    mut queue: Receiver<ClientMessage>,
    mut closed: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            // checked first so nothing queued starts after the client left
            biased;
            _ = &mut closed => break,
            message = queue.recv() => match message {
                Some(message) => session.handle(message).await,
                None => break,
            },
        }
    }

    queue.close();
    let mut discarded = 0;
    while queue.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        info!(connection = id, discarded, "Dropped queued requests of closed connection");
    }
    debug!(connection = id, state = ?session.state(), "Worker finished");
}

async fn write_loop(
    id: ConnectionId,
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound: UnboundedReceiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(err) => {
                error!(
                    connection = id,
                    kind = message.kind(),
                    error = %err,
                    "Failed to encode message"
                );
                continue;
            }
        };

        if let Err(err) = ws_tx.send(Message::Text(text.into())).await {
            warn!(connection = id, error = %err, "WriteMessage failed");
            break;
        }
    }

    let _ = ws_tx.close().await;
}
