//! Command side of the base station.

use novamix_core::DeviceCommand;
use tracing::{debug, info, warn};

use crate::error::HidResult;
use crate::transport::Transport;

/// Sends commands to the base station and undoes feature toggles on drop.
pub struct DeviceControl<T: Transport> {
    transport: T,
    chatmix_controls: bool,
    sonar_icon: bool,
}

impl<T: Transport> DeviceControl<T> {
    /// Wrap a transport.
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self { transport, chatmix_controls: false, sonar_icon: false }
    }

    /// Send a command.
    ///
    /// # Errors
    /// Returns an error if the command cannot be encoded or written.
    pub fn send(&mut self, command: DeviceCommand) -> HidResult<()> {
        let report = command.encode()?;
        self.transport.write(&report)?;
        debug!(?command, "Command sent to base station");

        match command {
            DeviceCommand::SetChatMixControls { enabled } => self.chatmix_controls = enabled,
            DeviceCommand::SetSonarIcon { enabled } => self.sonar_icon = enabled,
            _ => {}
        }
        Ok(())
    }

    /// Whether ChatMix controls were enabled through this handle.
    #[must_use]
    pub fn chatmix_controls(&self) -> bool {
        self.chatmix_controls
    }

    /// Whether the Sonar icon was enabled through this handle.
    #[must_use]
    pub fn sonar_icon(&self) -> bool {
        self.sonar_icon
    }

    /// Switch off every feature this handle switched on.
    ///
    /// # Errors
    /// Returns the first write error; remaining features are still attempted.
    pub fn restore(&mut self) -> HidResult<()> {
        let mut result = Ok(());

        if self.chatmix_controls {
            info!("Disabling ChatMix controls");
            if let Err(e) = self.send(DeviceCommand::SetChatMixControls { enabled: false }) {
                result = Err(e);
            }
        }

        if self.sonar_icon {
            info!("Disabling Sonar icon");
            if let Err(e) = self.send(DeviceCommand::SetSonarIcon { enabled: false }) {
                result = result.and(Err(e));
            }
        }

        // Don't retry from Drop after an explicit restore
        self.forget();
        result
    }

    /// Forget what was enabled without writing anything. For a handle whose
    /// device is already gone.
    pub fn forget(&mut self) {
        self.chatmix_controls = false;
        self.sonar_icon = false;
    }
}

impl<T: Transport> Drop for DeviceControl<T> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!(error = %e, "Failed to restore base station settings");
        }
    }
}

#[cfg(test)]
mod tests {
    use novamix_core::protocol::{TX, opt};

    use super::*;
    use crate::reader::tests::FakeTransport;

    fn header(report: &[u8]) -> [u8; 3] {
        [report[0], report[1], report[2]]
    }

    #[test]
    fn test_send_tracks_enabled_features() {
        let fake = FakeTransport::default();
        let mut control = DeviceControl::new(fake.clone());

        control.send(DeviceCommand::SetChatMixControls { enabled: true }).unwrap();
        control.send(DeviceCommand::SetSonarIcon { enabled: true }).unwrap();
        assert!(control.chatmix_controls());
        assert!(control.sonar_icon());

        control.send(DeviceCommand::SetSonarIcon { enabled: false }).unwrap();
        assert!(!control.sonar_icon());
        assert_eq!(fake.written().len(), 3);
    }

    #[test]
    fn test_drop_restores_features() {
        let fake = FakeTransport::default();
        {
            let mut control = DeviceControl::new(fake.clone());
            control.send(DeviceCommand::SetChatMixControls { enabled: true }).unwrap();
            control.send(DeviceCommand::SetSonarIcon { enabled: true }).unwrap();
        }

        let written = fake.written();
        assert_eq!(written.len(), 4);
        assert_eq!(header(&written[2]), [TX, opt::CHATMIX_ENABLE, 0]);
        assert_eq!(header(&written[3]), [TX, opt::SONAR_ICON, 0]);
    }

    #[test]
    fn test_restore_runs_once() {
        let fake = FakeTransport::default();
        let mut control = DeviceControl::new(fake.clone());
        control.send(DeviceCommand::SetChatMixControls { enabled: true }).unwrap();

        control.restore().unwrap();
        drop(control);

        assert_eq!(fake.written().len(), 2);
    }

    #[test]
    fn test_untouched_features_are_left_alone() {
        let fake = FakeTransport::default();
        {
            let mut control = DeviceControl::new(fake.clone());
            control.send(DeviceCommand::SetEqPreset { preset: 4 }).unwrap();
        }

        let written = fake.written();
        assert_eq!(written.len(), 1);
        assert_eq!(header(&written[0]), [TX, opt::EQ_PRESET, 4]);
    }

    #[test]
    fn test_invalid_command_is_not_written() {
        let fake = FakeTransport::default();
        let mut control = DeviceControl::new(fake.clone());

        assert!(control.send(DeviceCommand::SetEqBand { band: 1, gain_db: 40.0 }).is_err());
        assert!(fake.written().is_empty());
    }

    #[test]
    fn test_forget_skips_restore() {
        let fake = FakeTransport::default();
        {
            let mut control = DeviceControl::new(fake.clone());
            control.send(DeviceCommand::SetSonarIcon { enabled: true }).unwrap();
            control.forget();
        }

        assert_eq!(fake.written().len(), 1);
    }
}
