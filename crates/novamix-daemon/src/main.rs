//! Novamix Daemon - ChatMix for the Arctis Nova Pro Wireless.
//!
//! Listens to the base station's ChatMix dial and sets the volume of two
//! virtual sinks, "game" and "chat", that loop back into the headset.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hidapi::{HidApi, HidDevice};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod backend;
mod config;
mod daemon;
mod server;
mod signals;

use backend::Backend;
use config::{BackendKind, Config, LogFormat};
use daemon::{Daemon, DeviceFeatures, DeviceInfo, Flow};
use novamix_hid::{
    DeviceIds, HidError, HidListener, HidResult, NovaProWireless, is_device_connected,
};
use novamix_ipc::{IpcServer, socket_path};
use novamix_pipewire::{
    LoopbackSink, PactlBackend, PipeWireRuntime, SinkController, SinkEvent, SinkRegistry,
};

/// How long to wait for the PipeWire thread to connect before using pactl.
const PIPEWIRE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config()?;
    init_logging(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Novamix daemon");

    let ids = config.device.ids()?;
    let (backend, mut sink_events) = start_backend(config.sinks.backend).await;
    info!(backend = %backend_name(&backend), "Sink backend ready");

    let mut loopbacks = spawn_loopbacks(&config);

    let mut api = HidApi::new().context("Failed to initialize hidapi")?;

    let socket = socket_path();
    info!(?socket, "Starting IPC server");
    let (ipc_server, mut request_rx) =
        IpcServer::bind(&socket).await.context("Failed to start IPC server")?;
    let ipc_server = Arc::new(ipc_server);
    let event_tx = ipc_server.event_sender();
    let accept = Arc::clone(&ipc_server);
    let ipc_handle = tokio::spawn(async move {
        accept.run().await;
    });

    let mut shutdown_rx = signals::setup_signal_handlers()?;

    let features = DeviceFeatures {
        sonar_icon: config.device.sonar_icon,
        chatmix_controls: config.device.chatmix_controls,
    };
    let mut daemon: Daemon<Backend, HidDevice> = Daemon::new(
        SinkController::new(backend),
        config.sinks.pair(),
        config.mix.curve,
        features,
        config.reconnect.backoff(),
        event_tx,
    );

    let result =
        run(&mut daemon, &mut api, ids, &mut sink_events, &mut request_rx, &mut shutdown_rx)
            .await;

    if let Err(e) = &result {
        error!(error = %e, "Daemon stopping on error");
    }

    daemon.begin_shutdown(if result.is_ok() { "requested" } else { "error" });
    daemon.cleanup();
    for loopback in &mut loopbacks {
        loopback.stop();
    }
    daemon.backend().shutdown();
    ipc_handle.abort();

    info!("Novamix daemon stopped");
    result
}

/// Main loop. Returns when shutdown is requested or on a fatal error.
async fn run(
    daemon: &mut Daemon<Backend, HidDevice>,
    api: &mut HidApi,
    ids: DeviceIds,
    sink_events: &mut Option<mpsc::Receiver<SinkEvent>>,
    request_rx: &mut mpsc::Receiver<novamix_ipc::IncomingRequest>,
    shutdown_rx: &mut mpsc::Receiver<&'static str>,
) -> Result<()> {
    try_open(daemon, api, ids)?;

    info!("Daemon running. Press Ctrl+C to exit.");

    loop {
        let reconnect_at = daemon.reconnect_at();

        tokio::select! {
            event = daemon.next_listener_event() => {
                daemon.handle_listener_event(event)?;
            }

            Some(event) = next_sink_event(sink_events) => {
                daemon.handle_sink_event(event)?;
            }

            Some((client_id, request, response_tx)) = request_rx.recv() => {
                debug!(client_id, request_id = request.id, "Handling IPC request");
                let (response, flow) = daemon.handle_request(&request);
                let _ = response_tx.send(response).await;
                if flow == Flow::Shutdown {
                    info!("Shutdown requested over IPC");
                    return Ok(());
                }
            }

            () = wait_until(reconnect_at) => {
                debug!("Retrying base station");
                try_open(daemon, api, ids)?;
            }

            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                return Ok(());
            }
        }
    }
}

/// Open the base station and hand it to the daemon. The daemon decides
/// whether a failure is retried or fatal.
fn try_open(
    daemon: &mut Daemon<Backend, HidDevice>,
    api: &mut HidApi,
    ids: DeviceIds,
) -> Result<()> {
    match open_device(daemon, api, ids) {
        Ok(()) => Ok(()),
        Err(e) => daemon.open_failed(&e),
    }
}

fn open_device(
    daemon: &mut Daemon<Backend, HidDevice>,
    api: &mut HidApi,
    ids: DeviceIds,
) -> HidResult<()> {
    if !is_device_connected(ids.vendor_id, ids.product_id) {
        return Err(HidError::DeviceNotFound);
    }

    let device = NovaProWireless::open(api, ids)?;
    let info = DeviceInfo { serial: device.serial().map(String::from), path: device.path() };
    let (reader, control) = device.split();
    let (listener, events) = HidListener::spawn(reader)?;

    daemon.attach(control, listener, events, info);
    Ok(())
}

/// Connect the configured sink backend. A PipeWire connection that fails
/// or stalls falls back to pactl.
async fn start_backend(kind: BackendKind) -> (Backend, Option<mpsc::Receiver<SinkEvent>>) {
    if kind == BackendKind::Pactl {
        return (Backend::Pactl(PactlBackend::new()), None);
    }

    info!("Starting PipeWire runtime...");
    let (runtime, mut events) = match PipeWireRuntime::spawn(SinkRegistry::new()) {
        Ok(spawned) => spawned,
        Err(e) => {
            warn!(error = %e, "Failed to start PipeWire runtime, using pactl");
            return (Backend::Pactl(PactlBackend::new()), None);
        }
    };

    let connected = timeout(PIPEWIRE_CONNECT_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            match event {
                SinkEvent::Connected => return true,
                SinkEvent::Disconnected => return false,
                _ => {}
            }
        }
        false
    })
    .await;

    if matches!(connected, Ok(true)) {
        (Backend::PipeWire(runtime), Some(events))
    } else {
        warn!("PipeWire connection failed, using pactl");
        runtime.shutdown();
        (Backend::Pactl(PactlBackend::new()), None)
    }
}

fn backend_name(backend: &Backend) -> &'static str {
    use novamix_pipewire::SinkBackend;
    backend.name()
}

/// Spawn the game and chat loopbacks if configured. Failures are logged;
/// the daemon still runs against whatever sinks exist.
fn spawn_loopbacks(config: &Config) -> Vec<LoopbackSink> {
    if !config.sinks.create_loopbacks {
        return Vec::new();
    }

    let target = config.sinks.output.as_deref();
    [config.sinks.game.as_str(), config.sinks.chat.as_str()]
        .into_iter()
        .filter_map(|name| match LoopbackSink::spawn(name, target) {
            Ok(sink) => Some(sink),
            Err(e) => {
                error!(name, error = %e, "Failed to create loopback sink");
                None
            }
        })
        .collect()
}

async fn next_sink_event(events: &mut Option<mpsc::Receiver<SinkEvent>>) -> Option<SinkEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn init_logging(config: &Config) -> Result<()> {
    // Matches every novamix_* target
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("novamix={}", config.daemon.log_level).parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.daemon.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
