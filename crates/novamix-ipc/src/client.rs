//! IPC client implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::UnixStream;
use tokio::net::unix::OwnedWriteHalf;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error};

use crate::codec::JsonLinesCodec;
use crate::error::{IpcError, IpcResult};
use crate::events::Event;
use crate::messages::{Method, Request, Response, ServerMessage};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// IPC client for connecting to the Novamix daemon.
pub struct IpcClient {
    writer: Mutex<FramedWrite<OwnedWriteHalf, JsonLinesCodec<Request>>>,
    next_id: AtomicU64,
    pending: PendingMap,
    event_rx: mpsc::Receiver<Event>,
}

impl IpcClient {
    /// Connect to the daemon at the given socket path.
    ///
    /// # Errors
    /// Returns an error if the connection fails.
    pub async fn connect(socket_path: &Path) -> IpcResult<Self> {
        let stream = UnixStream::connect(socket_path).await?;
        let (reader, writer) = stream.into_split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::channel(64);

        // Spawn reader task
        let pending_reader = Arc::clone(&pending);
        tokio::spawn(async move {
            let mut frames = FramedRead::new(reader, JsonLinesCodec::<ServerMessage>::new());

            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(ServerMessage::Response(response)) => {
                        if let Some(tx) = pending_reader.lock().await.remove(&response.id) {
                            let _ = tx.send(response);
                        }
                    }
                    Ok(ServerMessage::Event(event)) => {
                        let _ = event_tx.send(event).await;
                    }
                    Err(e) => {
                        error!(error = %e, "Read error");
                        break;
                    }
                }
            }

            debug!("Connection closed");
            // Wake every caller still waiting on a response
            pending_reader.lock().await.clear();
        });

        Ok(Self {
            writer: Mutex::new(FramedWrite::new(writer, JsonLinesCodec::new())),
            next_id: AtomicU64::new(1),
            pending,
            event_rx,
        })
    }

    /// Send a request and wait for a response.
    ///
    /// # Errors
    /// Returns an error if the request cannot be written, the connection
    /// closes, or no response arrives in time.
    pub async fn request(&self, method: Method) -> IpcResult<Response> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request { id, method };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = self.writer.lock().await.send(request).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(IpcError::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(IpcError::Timeout)
            }
        }
    }

    /// Send a request and unwrap its result.
    ///
    /// # Errors
    /// Returns [`IpcError::ServerError`] if the daemon rejected the request,
    /// or any error from [`IpcClient::request`].
    pub async fn call(&self, method: Method) -> IpcResult<Value> {
        self.request(method)
            .await?
            .result
            .map_err(|e| IpcError::ServerError { code: e.code, message: e.message })
    }

    /// Get the event receiver for incoming events.
    pub fn events(&mut self) -> &mut mpsc::Receiver<Event> {
        &mut self.event_rx
    }
}
