//! Listener thread that feeds decoded reports into the async world.

use std::thread::JoinHandle;

use novamix_core::HeadsetMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{HidError, HidResult};
use crate::reader::ReportReader;
use crate::transport::Transport;

/// Events emitted by the listener thread.
#[derive(Debug)]
pub enum ListenerEvent {
    /// A report was decoded
    Message(HeadsetMessage),
    /// The device went away; the thread has exited
    Disconnected(HidError),
}

/// Handle to a running listener thread.
pub struct HidListener {
    handle: JoinHandle<()>,
}

impl HidListener {
    /// Run the blocking read loop on a dedicated thread.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn<T: Transport>(
        reader: ReportReader<T>,
    ) -> HidResult<(Self, mpsc::Receiver<ListenerEvent>)> {
        let (tx, rx) = mpsc::channel(64);

        let handle = std::thread::Builder::new()
            .name("hid-listener".to_string())
            .spawn(move || run_listener(reader, &tx))?;

        Ok((Self { handle }, rx))
    }

    /// Whether the thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

fn run_listener<T: Transport>(reader: ReportReader<T>, tx: &mpsc::Sender<ListenerEvent>) {
    info!("HID listener started");

    for item in reader.reports() {
        let event = match item {
            Ok(message) => ListenerEvent::Message(message),
            Err(e) => {
                warn!(error = %e, "HID listener lost the device");
                ListenerEvent::Disconnected(e)
            }
        };

        if tx.blocking_send(event).is_err() {
            debug!("Listener receiver dropped");
            break;
        }
    }

    info!("HID listener exiting");
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use novamix_core::protocol::{RX, opt};

    use super::*;
    use crate::reader::tests::FakeTransport;

    #[test]
    fn test_listener_forwards_then_disconnects() {
        let fake = FakeTransport::with_reports(&[
            &[RX, opt::CHATMIX, 100, 10],
            &[RX, opt::SONAR_ICON, 1, 0],
        ]);
        let (_listener, mut rx) = HidListener::spawn(ReportReader::new(fake)).unwrap();

        assert_matches!(
            rx.blocking_recv(),
            Some(ListenerEvent::Message(HeadsetMessage::ChatMix { game: 100, chat: 10 }))
        );
        assert_matches!(
            rx.blocking_recv(),
            Some(ListenerEvent::Message(HeadsetMessage::SonarIcon { enabled: true }))
        );
        assert_matches!(
            rx.blocking_recv(),
            Some(ListenerEvent::Disconnected(HidError::DeviceDisconnected))
        );

        // Sender is dropped when the thread exits
        assert!(rx.blocking_recv().is_none());
    }
}
