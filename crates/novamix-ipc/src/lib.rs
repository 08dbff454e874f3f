//! Novamix IPC - Unix socket protocol and client library.
//!
//! This crate defines the newline-delimited JSON protocol spoken between
//! the daemon and `novamix-ctl`, the server side used by the daemon, and a
//! client library.

pub mod client;
pub mod codec;
pub mod error;
pub mod events;
pub mod messages;
pub mod server;

pub use client::IpcClient;
pub use codec::JsonLinesCodec;
pub use error::{IpcError, IpcResult};
pub use events::{
    DeviceConnectedData, DeviceDisconnectedData, ErrorData, Event, EventType, HeadsetReportData,
    MixChangedData, SinkMissingData, StateChangedData,
};
pub use messages::{ErrorInfo, Method, Request, Response, ServerMessage};
pub use server::{IncomingRequest, IpcServer};

use std::path::PathBuf;

/// Get the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/novamix/daemon.sock` or falls back to
/// `/run/user/$UID/novamix/daemon.sock`.
#[must_use]
#[allow(unsafe_code)] // libc::getuid() is safe to call
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("novamix/daemon.sock")
    } else {
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/run/user/{uid}/novamix/daemon.sock"))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use tokio_test::assert_ok;

    use super::*;

    async fn bind_temp()
    -> (tempfile::TempDir, IpcServer, tokio::sync::mpsc::Receiver<IncomingRequest>) {
        let dir = tempfile::tempdir().unwrap();
        let (server, requests) =
            IpcServer::bind(&dir.path().join("nested/daemon.sock")).await.unwrap();
        (dir, server, requests)
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let (dir, server, mut requests) = bind_temp().await;
        let server = std::sync::Arc::new(server);
        let accept = std::sync::Arc::clone(&server);
        tokio::spawn(async move { accept.run().await });

        // Fake daemon loop
        tokio::spawn(async move {
            while let Some((_, request, response_tx)) = requests.recv().await {
                let result = match request.method {
                    Method::GetMix => Ok(json!({"ratio": 100})),
                    _ => Err(ErrorInfo::new(messages::codes::DEVICE_UNAVAILABLE, "no device")),
                };
                let _ = response_tx.send(Response { id: request.id, result }).await;
            }
        });

        let client = assert_ok!(IpcClient::connect(&dir.path().join("nested/daemon.sock")).await);

        let mix = assert_ok!(client.call(Method::GetMix).await);
        assert_eq!(mix, json!({"ratio": 100}));

        assert_matches!(
            client.call(Method::SetSonarIcon { enabled: true }).await,
            Err(IpcError::ServerError { code: 503, .. })
        );
    }

    #[tokio::test]
    async fn test_events_only_reach_subscribers() {
        let (dir, server, _requests) = bind_temp().await;
        let events = server.event_sender();
        let server = std::sync::Arc::new(server);
        let accept = std::sync::Arc::clone(&server);
        tokio::spawn(async move { accept.run().await });

        let mut client =
            assert_ok!(IpcClient::connect(&dir.path().join("nested/daemon.sock")).await);
        let subscribed = assert_ok!(
            client.call(Method::Subscribe { events: vec![EventType::MixChanged] }).await
        );
        assert_eq!(subscribed, json!({"subscribed": ["mix_changed"]}));

        events.send(Event::new(EventType::HeadsetReport, &json!({"ignored": true}))).unwrap();
        events.send(Event::new(EventType::MixChanged, &json!({"ratio": 150}))).unwrap();

        let event = client.events().recv().await.unwrap();
        assert_eq!(event.event, EventType::MixChanged);
        assert_eq!(event.data, json!({"ratio": 150}));
    }

    #[tokio::test]
    async fn test_socket_file_removed_on_drop() {
        let (dir, server, _requests) = bind_temp().await;
        let path = dir.path().join("nested/daemon.sock");
        assert!(path.exists());

        drop(server);
        assert!(!path.exists());
    }
}
