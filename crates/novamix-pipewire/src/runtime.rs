//! Native PipeWire backend.
//!
//! PipeWire objects must be used on the thread that runs their main loop,
//! so the runtime owns a dedicated thread. It tracks `Audio/Sink` nodes in a
//! shared [`SinkRegistry`] and services volume requests sent from the daemon.

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Cursor;
use std::rc::Rc;
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use libspa::param::ParamType;
use libspa::pod::serialize::PodSerializer;
use libspa::pod::{Object, Pod, Property, PropertyFlags, Value, ValueArray};
use libspa::utils::SpaTypes;
use novamix_core::Volume;
use pipewire::context::ContextRc;
use pipewire::main_loop::MainLoopRc;
use pipewire::node::Node;
use pipewire::registry::{GlobalObject, RegistryRc};
use pipewire::spa::utils::dict::DictRef;
use pipewire::types::ObjectType;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::backend::SinkBackend;
use crate::error::{PwError, PwResult};
use crate::node::SinkInfo;
use crate::registry::SinkRegistry;

/// SPA property keys for volume control
pub mod spa_props {
    /// Per-channel volumes array (cubic scale)
    pub const SPA_PROP_CHANNEL_VOLUMES: u32 = 65544;
}

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Events emitted by the PipeWire thread.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// Connection established
    Connected,
    /// A sink appeared
    SinkAdded(SinkInfo),
    /// A sink went away
    SinkRemoved { id: u32, name: String },
    /// Connection lost; the thread has exited
    Disconnected,
}

enum Request {
    SetVolume { id: u32, volume: f32, channels: u32 },
    Shutdown,
}

type Response = PwResult<()>;

/// PipeWire runtime handle for the async world.
pub struct PipeWireRuntime {
    request_tx: pipewire::channel::Sender<Request>,
    response_rx: std_mpsc::Receiver<Response>,
    sinks: SinkRegistry,
}

impl PipeWireRuntime {
    /// Spawn the PipeWire thread and return a handle plus its event stream.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned. Connection failures
    /// are logged by the thread and surface as [`SinkEvent::Disconnected`].
    pub fn spawn(sinks: SinkRegistry) -> PwResult<(Self, mpsc::Receiver<SinkEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (request_tx, request_rx) = pipewire::channel::channel();
        let (response_tx, response_rx) = std_mpsc::channel();

        let thread_sinks = sinks.clone();
        std::thread::Builder::new().name("pipewire-runtime".to_string()).spawn(move || {
            if let Err(e) =
                run_pipewire_thread(&thread_sinks, &event_tx, request_rx, response_tx)
            {
                error!(error = %e, "PipeWire runtime failed");
            }
            thread_sinks.clear();
            let _ = event_tx.blocking_send(SinkEvent::Disconnected);
        })?;

        Ok((Self { request_tx, response_rx, sinks }, event_rx))
    }

    /// Request shutdown of the PipeWire thread.
    pub fn shutdown(&self) {
        let _ = self.request_tx.send(Request::Shutdown);
    }
}

impl SinkBackend for PipeWireRuntime {
    fn resolve(&self, name: &str) -> PwResult<Option<u32>> {
        Ok(self.sinks.find_by_name(name).map(|s| s.id))
    }

    fn set_volume(&self, id: u32, volume: Volume) -> PwResult<()> {
        let Some(sink) = self.sinks.get(id) else {
            return Err(PwError::SinkNotFound(id.to_string()));
        };

        // Drop answers to requests that previously timed out
        while self.response_rx.try_recv().is_ok() {}

        self.request_tx
            .send(Request::SetVolume { id, volume: volume.cubic(), channels: sink.channels })
            .map_err(|_| PwError::MainLoopError("Request channel closed".to_string()))?;

        match self.response_rx.recv_timeout(RESPONSE_TIMEOUT) {
            Ok(response) => response,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                Err(PwError::VolumeControlFailed("Timeout waiting for PipeWire".to_string()))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                Err(PwError::MainLoopError("PipeWire thread exited".to_string()))
            }
        }
    }

    fn name(&self) -> &'static str {
        "pipewire"
    }
}

fn run_pipewire_thread(
    sinks: &SinkRegistry,
    event_tx: &mpsc::Sender<SinkEvent>,
    request_rx: pipewire::channel::Receiver<Request>,
    response_tx: std_mpsc::Sender<Response>,
) -> PwResult<()> {
    pipewire::init();

    info!("PipeWire runtime starting...");

    let main_loop = MainLoopRc::new(None)
        .map_err(|e| PwError::MainLoopError(format!("Failed to create main loop: {e}")))?;

    let context = ContextRc::new(&main_loop, None)
        .map_err(|e| PwError::ConnectionFailed(format!("Failed to create context: {e}")))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| PwError::ConnectionFailed(format!("Failed to connect: {e}")))?;

    let registry = core
        .get_registry_rc()
        .map_err(|e| PwError::RegistryError(format!("Failed to get registry: {e}")))?;

    info!("Connected to PipeWire");
    let _ = event_tx.blocking_send(SinkEvent::Connected);

    // Bound node proxies, needed to set params on sinks we don't own
    let proxies: Rc<RefCell<HashMap<u32, Node>>> = Rc::new(RefCell::new(HashMap::new()));

    let registry_bind = registry.clone();
    let proxies_global = Rc::clone(&proxies);
    let proxies_remove = Rc::clone(&proxies);
    let sinks_global = sinks.clone();
    let sinks_remove = sinks.clone();
    let event_tx_global = event_tx.clone();
    let event_tx_remove = event_tx.clone();

    let _listener = registry
        .add_listener_local()
        .global(move |global| {
            handle_global(&registry_bind, &sinks_global, &proxies_global, &event_tx_global, global);
        })
        .global_remove(move |id| {
            handle_global_remove(&sinks_remove, &proxies_remove, &event_tx_remove, id);
        })
        .register();

    // A core error means the connection is gone; leave the loop so the
    // daemon sees Disconnected
    let main_loop_for_error = main_loop.clone();
    let _core_listener = core
        .add_listener_local()
        .error(move |id, seq, res, message| {
            warn!(id, seq, res, message, "PipeWire core error");
            if id == pipewire::core::PW_ID_CORE {
                main_loop_for_error.quit();
            }
        })
        .register();

    let main_loop_for_shutdown = main_loop.clone();
    let _request_receiver = request_rx.attach(main_loop.loop_(), move |request| match request {
        Request::SetVolume { id, volume, channels } => {
            let response = set_node_volume(&proxies.borrow(), id, volume, channels);
            let _ = response_tx.send(response);
        }
        Request::Shutdown => {
            info!("PipeWire runtime received shutdown request");
            main_loop_for_shutdown.quit();
        }
    });

    info!("Starting PipeWire main loop");
    main_loop.run();

    info!("PipeWire runtime exiting");
    Ok(())
}

fn set_node_volume(
    proxies: &HashMap<u32, Node>,
    id: u32,
    volume: f32,
    channels: u32,
) -> PwResult<()> {
    let node = proxies.get(&id).ok_or_else(|| PwError::SinkNotFound(id.to_string()))?;

    let bytes = channel_volumes_pod(volume, channels)?;
    let pod = Pod::from_bytes(&bytes)
        .ok_or_else(|| PwError::VolumeControlFailed("Invalid Props pod".to_string()))?;

    node.set_param(ParamType::Props, 0, pod);
    debug!(id, volume, channels, "Props param set");
    Ok(())
}

/// Serialize a `Props` object carrying `channelVolumes`.
fn channel_volumes_pod(volume: f32, channels: u32) -> PwResult<Vec<u8>> {
    let count = usize::try_from(channels.max(1)).unwrap_or(2);
    let value = Value::Object(Object {
        type_: SpaTypes::ObjectParamProps.as_raw(),
        id: ParamType::Props.as_raw(),
        properties: vec![Property {
            key: spa_props::SPA_PROP_CHANNEL_VOLUMES,
            flags: PropertyFlags::empty(),
            value: Value::ValueArray(ValueArray::Float(vec![volume; count])),
        }],
    });

    let (cursor, _) = PodSerializer::serialize(Cursor::new(Vec::new()), &value)
        .map_err(|e| PwError::VolumeControlFailed(format!("Failed to serialize pod: {e:?}")))?;
    Ok(cursor.into_inner())
}

fn handle_global(
    registry: &RegistryRc,
    sinks: &SinkRegistry,
    proxies: &Rc<RefCell<HashMap<u32, Node>>>,
    event_tx: &mpsc::Sender<SinkEvent>,
    global: &GlobalObject<&DictRef>,
) {
    if !matches!(global.type_, ObjectType::Node) {
        return;
    }
    let Some(props) = global.props.as_ref() else {
        return;
    };
    let Some(sink) = SinkInfo::from_props(global.id, |key| props.get(key)) else {
        return;
    };

    match registry.bind::<Node, _>(global) {
        Ok(node) => {
            proxies.borrow_mut().insert(global.id, node);
        }
        Err(e) => {
            warn!(id = global.id, name = %sink.name, error = %e, "Failed to bind sink node");
            return;
        }
    }

    info!(id = sink.id, name = %sink.name, channels = sink.channels, "Sink appeared");
    sinks.add(sink.clone());
    let _ = event_tx.blocking_send(SinkEvent::SinkAdded(sink));
}

fn handle_global_remove(
    sinks: &SinkRegistry,
    proxies: &Rc<RefCell<HashMap<u32, Node>>>,
    event_tx: &mpsc::Sender<SinkEvent>,
    id: u32,
) {
    proxies.borrow_mut().remove(&id);

    if let Some(sink) = sinks.remove(id) {
        info!(id, name = %sink.name, "Sink removed");
        let _ = event_tx.blocking_send(SinkEvent::SinkRemoved { id, name: sink.name });
    }
}

#[cfg(test)]
mod tests {
    use libspa::pod::deserialize::PodDeserializer;

    use super::*;

    #[test]
    fn test_channel_volumes_pod_round_trip() {
        let bytes = channel_volumes_pod(0.125, 2).unwrap();
        let (_, value) = PodDeserializer::deserialize_any_from(&bytes).unwrap();

        let Value::Object(object) = value else {
            panic!("expected object pod");
        };
        assert_eq!(object.type_, SpaTypes::ObjectParamProps.as_raw());
        assert_eq!(object.id, ParamType::Props.as_raw());
        assert_eq!(object.properties.len(), 1);
        assert_eq!(object.properties[0].key, spa_props::SPA_PROP_CHANNEL_VOLUMES);
        assert_eq!(
            object.properties[0].value,
            Value::ValueArray(ValueArray::Float(vec![0.125, 0.125]))
        );
    }

    #[test]
    fn test_channel_volumes_pod_never_empty() {
        let bytes = channel_volumes_pod(1.0, 0).unwrap();
        let (_, value) = PodDeserializer::deserialize_any_from(&bytes).unwrap();

        let Value::Object(object) = value else {
            panic!("expected object pod");
        };
        assert_eq!(object.properties[0].value, Value::ValueArray(ValueArray::Float(vec![1.0])));
    }
}
