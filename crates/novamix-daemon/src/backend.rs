//! Sink backend chosen at startup.

use novamix_core::Volume;
use novamix_pipewire::{PactlBackend, PipeWireRuntime, PwResult, SinkBackend};

/// Either the native PipeWire runtime or the `pactl` fallback.
pub enum Backend {
    PipeWire(PipeWireRuntime),
    Pactl(PactlBackend),
}

impl Backend {
    /// Stop the PipeWire thread, if there is one.
    pub fn shutdown(&self) {
        if let Self::PipeWire(runtime) = self {
            runtime.shutdown();
        }
    }
}

impl SinkBackend for Backend {
    fn resolve(&self, name: &str) -> PwResult<Option<u32>> {
        match self {
            Self::PipeWire(runtime) => runtime.resolve(name),
            Self::Pactl(pactl) => pactl.resolve(name),
        }
    }

    fn set_volume(&self, id: u32, volume: Volume) -> PwResult<()> {
        match self {
            Self::PipeWire(runtime) => runtime.set_volume(id, volume),
            Self::Pactl(pactl) => pactl.set_volume(id, volume),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::PipeWire(runtime) => runtime.name(),
            Self::Pactl(pactl) => pactl.name(),
        }
    }
}
