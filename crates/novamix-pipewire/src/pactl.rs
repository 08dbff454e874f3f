//! `pactl` fallback for volume control.
//!
//! Works on any PulseAudio-compatible server, including `pipewire-pulse`,
//! without linking libpipewire at runtime.

use std::process::Command;

use novamix_core::Volume;
use tracing::debug;

use crate::backend::SinkBackend;
use crate::error::{PwError, PwResult};

/// Volume control through the `pactl` command-line tool.
pub struct PactlBackend {
    program: String,
}

impl PactlBackend {
    /// Use `pactl` from `$PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_program("pactl")
    }

    /// Use a specific `pactl` binary.
    #[must_use]
    pub fn with_program(program: impl Into<String>) -> Self {
        Self { program: program.into() }
    }

    fn run(&self, args: &[&str]) -> PwResult<String> {
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| PwError::CommandFailed(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PwError::CommandFailed(format!(
                "{} failed: {}",
                self.program,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for PactlBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SinkBackend for PactlBackend {
    fn resolve(&self, name: &str) -> PwResult<Option<u32>> {
        let stdout = self.run(&["list", "short", "sinks"])?;
        Ok(parse_short_sinks(&stdout).into_iter().find(|(_, n)| n == name).map(|(id, _)| id))
    }

    fn set_volume(&self, id: u32, volume: Volume) -> PwResult<()> {
        let id_arg = id.to_string();
        let volume_arg = volume.to_string();

        match self.run(&["set-sink-volume", &id_arg, &volume_arg]) {
            Ok(_) => {
                debug!(id, %volume, "Sink volume set via pactl");
                Ok(())
            }
            Err(PwError::CommandFailed(msg)) if is_no_such_entity(&msg) => {
                Err(PwError::SinkNotFound(id_arg))
            }
            Err(e) => Err(e),
        }
    }

    fn name(&self) -> &'static str {
        "pactl"
    }
}

/// Parse `pactl list short sinks` output into `(index, name)` pairs.
fn parse_short_sinks(output: &str) -> Vec<(u32, String)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let id = fields.next()?.trim().parse().ok()?;
            let name = fields.next()?.trim();
            (!name.is_empty()).then(|| (id, name.to_string()))
        })
        .collect()
}

fn is_no_such_entity(message: &str) -> bool {
    message.contains("No such entity") || message.contains("Failure: No such")
}
