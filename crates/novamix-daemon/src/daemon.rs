//! The read, translate, apply pipeline and everything the main loop mutates.

use anyhow::{Result, bail};
use novamix_core::{
    Backoff, Command, DaemonEvent, DaemonState, DeviceCommand, HeadsetMessage, HeadsetStatus,
    MixCurve, MixLevels, MixRatio, StateSnapshot, Volume,
};
use novamix_hid::{DeviceControl, HidError, HidListener, HidResult, ListenerEvent, Transport};
use novamix_ipc::messages::codes;
use novamix_ipc::{
    DeviceConnectedData, DeviceDisconnectedData, ErrorData, ErrorInfo, Event, EventType,
    HeadsetReportData, MixChangedData, Request, Response, SinkMissingData, StateChangedData,
};
use novamix_pipewire::{PwError, SinkBackend, SinkController, SinkEvent, SinkPair};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::server;

/// Features switched on every time the base station is opened.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceFeatures {
    pub sonar_icon: bool,
    pub chatmix_controls: bool,
}

impl DeviceFeatures {
    fn startup_commands(self) -> impl Iterator<Item = DeviceCommand> {
        [
            self.chatmix_controls.then_some(DeviceCommand::SetChatMixControls { enabled: true }),
            self.sonar_icon.then_some(DeviceCommand::SetSonarIcon { enabled: true }),
        ]
        .into_iter()
        .flatten()
    }
}

/// Identity of an opened base station.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub serial: Option<String>,
    pub path: String,
}

/// Whether the main loop keeps going after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// Handles held while the base station is open.
struct Session<T: Transport> {
    control: DeviceControl<T>,
    listener: HidListener,
    events: mpsc::Receiver<ListenerEvent>,
    info: DeviceInfo,
}

/// Daemon state owned by the main loop.
pub struct Daemon<B: SinkBackend, T: Transport> {
    controller: SinkController<B>,
    sinks: SinkPair,
    curve: MixCurve,
    features: DeviceFeatures,
    state: DaemonState,
    session: Option<Session<T>>,
    ratio: Option<MixRatio>,
    levels: Option<MixLevels>,
    missing_sinks: Vec<String>,
    headset: HeadsetStatus,
    backoff: Backoff,
    reconnect_at: Option<Instant>,
    events: broadcast::Sender<Event>,
}

impl<B: SinkBackend, T: Transport> Daemon<B, T> {
    pub fn new(
        controller: SinkController<B>,
        sinks: SinkPair,
        curve: MixCurve,
        features: DeviceFeatures,
        backoff: Backoff,
        events: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            controller,
            sinks,
            curve,
            features,
            state: DaemonState::Starting,
            session: None,
            ratio: None,
            levels: None,
            missing_sinks: Vec::new(),
            headset: HeadsetStatus::default(),
            backoff,
            reconnect_at: None,
            events,
        }
    }

    pub fn state(&self) -> DaemonState {
        self.state
    }

    /// When the next open attempt is due, if one is scheduled.
    pub fn reconnect_at(&self) -> Option<Instant> {
        self.reconnect_at
    }

    pub fn backend(&self) -> &B {
        self.controller.backend()
    }

    pub fn snapshot(&self) -> StateSnapshot {
        let info = self.session.as_ref().map(|s| &s.info);
        StateSnapshot {
            state: self.state,
            device_connected: self.session.is_some(),
            device_serial: info.and_then(|i| i.serial.clone()),
            device_path: info.map(|i| i.path.clone()),
            curve: self.curve,
            ratio: self.ratio,
            levels: self.levels,
            game_sink: self.sinks.game.clone(),
            chat_sink: self.sinks.chat.clone(),
            missing_sinks: self.missing_sinks.clone(),
            headset: self.headset.clone(),
            reconnect_attempts: self.backoff.attempts(),
        }
    }

    /// Wait for the listener thread's next event. Never resolves while no
    /// device is open; `None` means the thread went away.
    pub async fn next_listener_event(&mut self) -> Option<ListenerEvent> {
        match self.session.as_mut() {
            Some(session) => session.events.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Take ownership of a freshly opened base station.
    pub fn attach(
        &mut self,
        mut control: DeviceControl<T>,
        listener: HidListener,
        events: mpsc::Receiver<ListenerEvent>,
        info: DeviceInfo,
    ) {
        for command in self.features.startup_commands() {
            match control.send(command) {
                Ok(()) => self.note_command(command),
                Err(e) => warn!(?command, error = %e, "Failed to enable base station feature"),
            }
        }

        info!(
            serial = info.serial.as_deref().unwrap_or("unknown"),
            path = %info.path,
            "Base station ready"
        );
        self.emit(
            EventType::DeviceConnected,
            &DeviceConnectedData { serial: info.serial.clone(), path: info.path.clone() },
        );

        self.session = Some(Session { control, listener, events, info });
        self.backoff.reset();
        self.reconnect_at = None;
        self.transition(DaemonEvent::DeviceOpened);
    }

    /// Record a failed open and schedule the next attempt.
    ///
    /// # Errors
    /// Returns an error if retrying cannot help (missing permissions, an
    /// unrecoverable I/O error) or once the reconnect budget is spent.
    pub fn open_failed(&mut self, error: &HidError) -> Result<()> {
        if matches!(error, HidError::PermissionDenied) {
            error!("Permission denied opening the base station; install the udev rule");
            bail!("Cannot open base station: {error}");
        }
        if !error.is_recoverable() {
            error!(error = %error, "Base station open failed permanently");
            bail!("Cannot open base station: {error}");
        }

        debug!(error = %error, "Base station open failed");
        self.transition(DaemonEvent::OpenFailed);
        self.schedule_reconnect(&error.to_string())
    }

    /// Dispatch an event from the listener thread.
    ///
    /// # Errors
    /// Returns an error if the device was lost and the reconnect budget is
    /// already spent.
    pub fn handle_listener_event(&mut self, event: Option<ListenerEvent>) -> Result<()> {
        match event {
            Some(ListenerEvent::Message(message)) => {
                self.handle_message(&message);
                Ok(())
            }
            Some(ListenerEvent::Disconnected(e)) => self.device_lost(&e),
            None => self.device_lost(&HidError::DeviceDisconnected),
        }
    }

    pub fn handle_message(&mut self, message: &HeadsetMessage) {
        debug!(%message, "Headset report");
        self.emit(
            EventType::HeadsetReport,
            &HeadsetReportData { message: message.clone(), text: message.to_string() },
        );

        match message {
            HeadsetMessage::ChatMix { game, chat } => {
                self.apply_mix(MixRatio::from_levels(*game, *chat));
            }
            HeadsetMessage::Volume { attenuation } => self.headset.attenuation = Some(*attenuation),
            HeadsetMessage::EqPreset { preset } => self.headset.eq_preset = Some(*preset),
            HeadsetMessage::ChatMixControls { enabled } => self.headset.chatmix_controls = *enabled,
            HeadsetMessage::SonarIcon { enabled } => self.headset.sonar_icon = *enabled,
            HeadsetMessage::EqBand { .. } | HeadsetMessage::Unknown { .. } => {}
        }
    }

    /// Translate a dial position and apply it to both sinks.
    pub fn apply_mix(&mut self, ratio: MixRatio) {
        self.transition(DaemonEvent::ReportReceived);

        let levels = self.curve.translate(ratio);
        debug!(ratio = ratio.steps(), game = %levels.game, chat = %levels.chat, "Applying ChatMix");

        self.missing_sinks.clear();
        for failure in self.controller.apply_levels(&self.sinks, levels) {
            self.report_sink_failure(failure);
        }

        self.ratio = Some(ratio);
        self.levels = Some(levels);
        self.emit(EventType::MixChanged, &MixChangedData { ratio, levels });
        self.transition(DaemonEvent::ApplyFinished);
    }

    /// React to sinks coming and going.
    ///
    /// # Errors
    /// Returns an error if the PipeWire connection is gone.
    pub fn handle_sink_event(&mut self, event: SinkEvent) -> Result<()> {
        match event {
            SinkEvent::Connected => info!("PipeWire connected"),

            SinkEvent::SinkAdded(sink) => {
                if let Some(volume) = self.pending_volume(&sink.name) {
                    info!(sink = %sink.name, %volume, "ChatMix sink appeared, applying last level");
                    self.missing_sinks.retain(|name| name != &sink.name);
                    if let Err(e) = self.controller.apply(&sink.name, volume) {
                        self.report_sink_failure(e);
                    }
                }
            }

            SinkEvent::SinkRemoved { id, name } => {
                if name == self.sinks.game || name == self.sinks.chat {
                    warn!(id, sink = %name, "ChatMix sink removed");
                    self.controller.invalidate();
                }
            }

            SinkEvent::Disconnected => {
                error!("Lost connection to PipeWire");
                self.emit_error("pipewire", "PipeWire connection lost");
                bail!("PipeWire connection lost");
            }
        }
        Ok(())
    }

    /// Answer an IPC request, running any device command it carries.
    pub fn handle_request(&mut self, request: &Request) -> (Response, Flow) {
        let handled = server::handle_request(&request.method, &self.snapshot());
        let mut result = handled.response;
        let mut flow = Flow::Continue;

        match handled.command {
            Some(Command::Device(command)) => {
                if let Err(e) = self.send_device_command(command) {
                    warn!(?command, error = %e, "Device command failed");
                    result = Err(ErrorInfo::new(codes::DEVICE_ERROR, e.to_string()));
                }
            }
            Some(Command::Shutdown) => flow = Flow::Shutdown,
            None => {}
        }

        (Response { id: request.id, result }, flow)
    }

    pub fn begin_shutdown(&mut self, reason: &str) {
        info!(reason, "Shutting down");
        self.transition(DaemonEvent::ShutdownRequested);
    }

    /// Undo device feature toggles and release the base station.
    pub fn cleanup(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.control.restore() {
                warn!(error = %e, "Failed to restore base station settings");
            }
            // The listener thread stays blocked in read until process exit
            debug!(listener_exited = session.listener.is_finished(), "Base station released");
        }
        self.reconnect_at = None;
        self.transition(DaemonEvent::CleanupFinished);
    }

    fn device_lost(&mut self, error: &HidError) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            // Nothing to restore on a device that is gone
            session.control.forget();
            debug!(
                listener_exited = session.listener.is_finished(),
                "Base station handles dropped"
            );
        }

        warn!(error = %error, "Base station lost");
        self.emit(
            EventType::DeviceDisconnected,
            &DeviceDisconnectedData { reason: error.to_string() },
        );
        self.transition(DaemonEvent::ReadFailed);
        self.schedule_reconnect(&error.to_string())
    }

    fn schedule_reconnect(&mut self, reason: &str) -> Result<()> {
        let Some(delay) = self.backoff.next_delay() else {
            let attempts = self.backoff.attempts();
            error!(attempts, reason, "Giving up on the base station");
            self.reconnect_at = None;
            bail!("Base station unavailable after {attempts} attempts: {reason}");
        };

        info!(attempt = self.backoff.attempts(), delay = ?delay, reason, "Will retry base station");
        self.reconnect_at = Some(Instant::now() + delay);
        Ok(())
    }

    fn send_device_command(&mut self, command: DeviceCommand) -> HidResult<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(HidError::DeviceNotFound);
        };
        session.control.send(command)?;
        self.note_command(command);
        Ok(())
    }

    fn note_command(&mut self, command: DeviceCommand) {
        match command {
            DeviceCommand::SetSonarIcon { enabled } => self.headset.sonar_icon = enabled,
            DeviceCommand::SetChatMixControls { enabled } => {
                self.headset.chatmix_controls = enabled;
            }
            DeviceCommand::SetVolume { attenuation } => {
                self.headset.attenuation = Some(attenuation);
            }
            DeviceCommand::SetEqPreset { preset } => self.headset.eq_preset = Some(preset),
            DeviceCommand::SetEqBand { .. } => {}
        }
    }

    fn pending_volume(&self, sink: &str) -> Option<Volume> {
        let levels = self.levels?;
        if sink == self.sinks.game {
            Some(levels.game)
        } else if sink == self.sinks.chat {
            Some(levels.chat)
        } else {
            None
        }
    }

    fn report_sink_failure(&mut self, failure: PwError) {
        match failure {
            PwError::SinkNotFound(sink) => {
                self.emit(EventType::SinkMissing, &SinkMissingData { sink: sink.clone() });
                if !self.missing_sinks.contains(&sink) {
                    self.missing_sinks.push(sink);
                }
            }
            other => {
                error!(
                    error = %other,
                    backend = self.controller.backend().name(),
                    "Failed to set sink volume"
                );
                self.emit_error("sinks", &other.to_string());
            }
        }
    }

    fn transition(&mut self, event: DaemonEvent) {
        let next = self.state.next(event);
        if next == self.state {
            return;
        }

        debug!(from = %self.state, to = %next, ?event, "State transition");
        // Listening <-> Applying happens on every report; don't broadcast it
        let routine = matches!(
            (self.state, next),
            (DaemonState::Listening, DaemonState::Applying)
                | (DaemonState::Applying, DaemonState::Listening)
        );
        self.state = next;
        if !routine {
            self.emit(EventType::StateChanged, &StateChangedData { state: next });
        }
    }

    fn emit(&self, event: EventType, data: &impl Serialize) {
        let _ = self.events.send(Event::new(event, data));
    }

    fn emit_error(&self, source: &str, message: &str) {
        self.emit(
            EventType::Error,
            &ErrorData {
                code: codes::DEVICE_ERROR,
                message: message.to_string(),
                source: source.to_string(),
            },
        );
    }
}
