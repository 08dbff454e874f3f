//! Blocking report reader.

use novamix_core::HeadsetMessage;
use novamix_core::protocol::REPORT_LEN;
use tracing::{debug, trace};

use crate::error::HidResult;
use crate::transport::Transport;

/// Reads and decodes reports from the base station.
///
/// Reads block without a timeout: the reader is meant to own a dedicated
/// thread.
pub struct ReportReader<T: Transport> {
    transport: T,
    buf: [u8; REPORT_LEN],
}

impl<T: Transport> ReportReader<T> {
    /// Wrap a transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport, buf: [0; REPORT_LEN] }
    }

    /// Block until the next decodable report arrives.
    ///
    /// Reports too short to decode are skipped.
    ///
    /// # Errors
    /// Returns [`crate::HidError::DeviceDisconnected`] when the device goes away.
    pub fn read(&mut self) -> HidResult<HeadsetMessage> {
        loop {
            let len = self.transport.read(&mut self.buf)?;
            let report = &self.buf[..len.min(REPORT_LEN)];
            trace!(?report, "HID report");

            match HeadsetMessage::decode(report) {
                Ok(message) => return Ok(message),
                Err(e) => debug!(error = %e, "Skipping undecodable report"),
            }
        }
    }

    /// Turn the reader into an endless stream of messages.
    ///
    /// The iterator yields the first error and then ends; a fresh device
    /// open is needed to continue.
    #[must_use]
    pub fn reports(self) -> Reports<T> {
        Reports { reader: self, done: false }
    }
}

/// Lazy, non-restartable sequence of headset messages.
pub struct Reports<T: Transport> {
    reader: ReportReader<T>,
    done: bool,
}

impl<T: Transport> Iterator for Reports<T> {
    type Item = HidResult<HeadsetMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = self.reader.read();
        if item.is_err() {
            self.done = true;
        }
        Some(item)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use assert_matches::assert_matches;
    use novamix_core::protocol::{RX, opt};

    use super::*;
    use crate::error::HidError;

    /// Scripted transport: hands out queued reports, then disconnects.
    #[derive(Clone, Default)]
    pub(crate) struct FakeTransport {
        pub(crate) incoming: Arc<Mutex<VecDeque<Vec<u8>>>>,
        pub(crate) written: Arc<Mutex<Vec<Vec<u8>>>>,
    }

    impl FakeTransport {
        pub(crate) fn with_reports(reports: &[&[u8]]) -> Self {
            let fake = Self::default();
            fake.incoming.lock().unwrap().extend(reports.iter().map(|r| r.to_vec()));
            fake
        }

        pub(crate) fn written(&self) -> Vec<Vec<u8>> {
            self.written.lock().unwrap().clone()
        }
    }

    impl Transport for FakeTransport {
        fn read(&self, buf: &mut [u8]) -> HidResult<usize> {
            let report =
                self.incoming.lock().unwrap().pop_front().ok_or(HidError::DeviceDisconnected)?;
            buf[..report.len()].copy_from_slice(&report);
            Ok(report.len())
        }

        fn write(&self, report: &[u8]) -> HidResult<usize> {
            self.written.lock().unwrap().push(report.to_vec());
            Ok(report.len())
        }
    }

    #[test]
    fn test_read_decodes_chatmix() {
        let fake = FakeTransport::with_reports(&[&[RX, opt::CHATMIX, 100, 30]]);
        let mut reader = ReportReader::new(fake);

        assert_eq!(reader.read().unwrap(), HeadsetMessage::ChatMix { game: 100, chat: 30 });
        assert_matches!(reader.read(), Err(HidError::DeviceDisconnected));
    }

    #[test]
    fn test_read_skips_short_reports() {
        let fake = FakeTransport::with_reports(&[&[RX], &[], &[RX, opt::VOLUME, 8, 0]]);
        let mut reader = ReportReader::new(fake);

        assert_eq!(reader.read().unwrap(), HeadsetMessage::Volume { attenuation: 8 });
    }

    #[test]
    fn test_reports_end_after_first_error() {
        let fake = FakeTransport::with_reports(&[
            &[RX, opt::CHATMIX, 100, 100],
            &[RX, opt::EQ_PRESET, 4, 0],
        ]);
        let mut reports = ReportReader::new(fake.clone()).reports();

        assert_matches!(reports.next(), Some(Ok(HeadsetMessage::ChatMix { .. })));
        assert_matches!(reports.next(), Some(Ok(HeadsetMessage::EqPreset { preset: 4 })));
        assert_matches!(reports.next(), Some(Err(HidError::DeviceDisconnected)));

        // Late reports on the same handle are never seen
        fake.incoming.lock().unwrap().push_back(vec![RX, opt::CHATMIX, 0, 100]);
        assert!(reports.next().is_none());
    }
}
