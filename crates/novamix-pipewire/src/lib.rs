//! Novamix PipeWire - virtual sinks and volume control.
//!
//! This crate handles everything on the audio-server side:
//! - Tracking the live sink list and resolving sinks by name
//! - Setting sink volumes, natively or through `pactl`
//! - Spawning the loopback sinks that feed the headset output

pub mod backend;
pub mod controller;
pub mod error;
pub mod loopback;
pub mod node;
pub mod pactl;
pub mod registry;
pub mod runtime;

pub use backend::SinkBackend;
pub use controller::{SinkController, SinkPair};
pub use error::{PwError, PwResult};
pub use loopback::LoopbackSink;
pub use node::SinkInfo;
pub use pactl::PactlBackend;
pub use registry::SinkRegistry;
pub use runtime::{PipeWireRuntime, SinkEvent};
