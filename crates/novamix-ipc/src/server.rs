//! IPC server implementation.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::codec::JsonLinesCodec;
use crate::error::IpcResult;
use crate::events::{Event, EventType};
use crate::messages::{Method, Request, Response, ServerMessage};

/// A request forwarded to the daemon, with the channel its response goes to.
pub type IncomingRequest = (u64, Request, mpsc::Sender<Response>);

/// IPC server that listens for client connections.
///
/// `Subscribe` and `Unsubscribe` are answered here, per connection; every
/// other request is forwarded to the daemon loop.
pub struct IpcServer {
    listener: UnixListener,
    path: PathBuf,
    next_client_id: AtomicU64,
    event_tx: broadcast::Sender<Event>,
    request_tx: mpsc::Sender<IncomingRequest>,
}

impl IpcServer {
    /// Create a new IPC server bound to the given socket path.
    ///
    /// # Errors
    /// Returns an error if the socket cannot be created.
    pub async fn bind(socket_path: &Path) -> IpcResult<(Self, mpsc::Receiver<IncomingRequest>)> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if socket_path.exists() {
            tokio::fs::remove_file(socket_path).await?;
        }

        let listener = UnixListener::bind(socket_path)?;
        info!(?socket_path, "IPC server listening");

        let (event_tx, _) = broadcast::channel(256);
        let (request_tx, request_rx) = mpsc::channel(64);

        Ok((
            Self {
                listener,
                path: socket_path.to_path_buf(),
                next_client_id: AtomicU64::new(1),
                event_tx,
                request_tx,
            },
            request_rx,
        ))
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => {
                    let client_id = self.next_client_id.fetch_add(1, Ordering::SeqCst);
                    info!(client_id, "Client connected");

                    let event_rx = self.event_tx.subscribe();
                    let request_tx = self.request_tx.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_client(client_id, stream, event_rx, request_tx).await
                        {
                            error!(client_id, error = %e, "Client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                }
            }
        }
    }

    /// Get a clone of the event sender for broadcasting from other tasks.
    pub fn event_sender(&self) -> broadcast::Sender<Event> {
        self.event_tx.clone()
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = ?self.path, error = %e, "Socket file not removed");
        }
    }
}

async fn handle_client(
    client_id: u64,
    stream: UnixStream,
    mut event_rx: broadcast::Receiver<Event>,
    request_tx: mpsc::Sender<IncomingRequest>,
) -> IpcResult<()> {
    let (mut sink, mut requests) = Framed::new(stream, JsonLinesCodec::<Request>::new()).split();
    let (response_tx, mut response_rx) = mpsc::channel::<Response>(16);
    let mut subscriptions: HashSet<EventType> = HashSet::new();

    loop {
        tokio::select! {
            // Read request from client
            frame = requests.next() => {
                let request = match frame {
                    Some(Ok(request)) => request,
                    Some(Err(e)) => {
                        warn!(client_id, error = %e, "Read error");
                        break;
                    }
                    None => {
                        debug!(client_id, "Client disconnected");
                        break;
                    }
                };
                debug!(client_id, request_id = request.id, "Received request");

                let local = match &request.method {
                    Method::Subscribe { events } => {
                        subscribe(&mut subscriptions, events);
                        Some(subscription_response(request.id, &subscriptions))
                    }
                    Method::Unsubscribe { events } => {
                        unsubscribe(&mut subscriptions, events);
                        Some(subscription_response(request.id, &subscriptions))
                    }
                    _ => None,
                };

                if let Some(response) = local {
                    sink.send(ServerMessage::Response(response)).await?;
                } else if request_tx
                    .send((client_id, request, response_tx.clone()))
                    .await
                    .is_err()
                {
                    warn!(client_id, "Daemon is no longer accepting requests");
                    break;
                }
            }

            // Send response to client
            Some(response) = response_rx.recv() => {
                sink.send(ServerMessage::Response(response)).await?;
            }

            // Forward events to client
            event = event_rx.recv() => {
                match event {
                    Ok(event) if subscriptions.contains(&event.event) => {
                        sink.send(ServerMessage::Event(event)).await?;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(client_id, skipped, "Client fell behind, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    info!(client_id, "Client handler exiting");
    Ok(())
}

fn subscribe(subscriptions: &mut HashSet<EventType>, events: &[EventType]) {
    if events.is_empty() {
        subscriptions.extend(EventType::ALL);
    } else {
        subscriptions.extend(events.iter().copied());
    }
}

fn unsubscribe(subscriptions: &mut HashSet<EventType>, events: &[EventType]) {
    if events.is_empty() {
        subscriptions.clear();
    } else {
        for event in events {
            subscriptions.remove(event);
        }
    }
}

fn subscription_response(id: u64, subscriptions: &HashSet<EventType>) -> Response {
    let mut subscribed: Vec<_> = subscriptions.iter().copied().collect();
    subscribed.sort_by_key(|e| EventType::ALL.iter().position(|a| a == e));
    Response::ok(id, json!({ "subscribed": subscribed }))
}
