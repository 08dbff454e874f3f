//! Virtual loopback sinks.
//!
//! Each ChatMix channel is a `pw-loopback` process: its capture side is an
//! `Audio/Sink` applications can play into, its playback side feeds the
//! headset output.

use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{PwError, PwResult};

/// How long `stop` waits for a graceful exit.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);

const STOP_POLL: Duration = Duration::from_millis(20);

/// A running `pw-loopback` sink. The process is stopped on drop.
pub struct LoopbackSink {
    name: String,
    child: Child,
}

impl LoopbackSink {
    /// Spawn a loopback sink called `name` that plays into `target`
    /// (or the default sink when `None`).
    ///
    /// # Errors
    /// Returns an error if `pw-loopback` cannot be started.
    pub fn spawn(name: &str, target: Option<&str>) -> PwResult<Self> {
        let args = loopback_args(name, target);
        debug!(?args, "Starting pw-loopback");

        let child = Command::new("pw-loopback")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| PwError::LoopbackFailed(format!("pw-loopback for {name}: {e}")))?;

        info!(
            name,
            pid = child.id(),
            target = target.unwrap_or("default"),
            "Loopback sink started"
        );
        Ok(Self { name: name.to_string(), child })
    }

    /// Whether the process is still alive.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the process to exit with SIGTERM, falling back to SIGKILL if it
    /// is still around after [`STOP_TIMEOUT`].
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }

        if let Err(e) = terminate(&self.child) {
            warn!(name = %self.name, error = %e, "Failed to send SIGTERM to pw-loopback");
        }

        let deadline = Instant::now() + STOP_TIMEOUT;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    info!(name = %self.name, %status, "Loopback sink stopped");
                    return;
                }
                Ok(None) if Instant::now() < deadline => thread::sleep(STOP_POLL),
                Ok(None) => break,
                Err(e) => {
                    warn!(name = %self.name, error = %e, "Failed to reap pw-loopback");
                    return;
                }
            }
        }

        warn!(name = %self.name, "pw-loopback ignored SIGTERM, killing");
        if let Err(e) = self.child.kill() {
            warn!(name = %self.name, error = %e, "Failed to kill pw-loopback");
            return;
        }
        if let Err(e) = self.child.wait() {
            warn!(name = %self.name, error = %e, "Failed to reap pw-loopback");
        }
    }
}

#[allow(unsafe_code)] // kill(2) on a pid we own
fn terminate(child: &Child) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(child.id())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    // SAFETY: kill has no memory-safety preconditions
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

impl Drop for LoopbackSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Node name `pw-loopback -n <name>` gives its capture sink.
#[must_use]
pub fn sink_node_name(name: &str) -> String {
    format!("input.{name}")
}

fn loopback_args(name: &str, target: Option<&str>) -> Vec<String> {
    let mut args = Vec::with_capacity(5);
    if let Some(target) = target {
        args.push("-P".to_string());
        args.push(target.to_string());
    }
    args.push("--capture-props=media.class=Audio/Sink".to_string());
    args.push("-n".to_string());
    args.push(name.to_string());
    args
}

#[cfg(test)]
mod tests {
    use std::os::unix::process::ExitStatusExt;

    use super::*;

    fn running(program: &str, args: &[&str]) -> LoopbackSink {
        let child = Command::new(program).args(args).spawn().unwrap();
        LoopbackSink { name: "test".to_string(), child }
    }

    #[test]
    fn test_stop_sends_sigterm() {
        let mut sink = running("sleep", &["30"]);
        assert!(sink.is_running());

        sink.stop();

        let status = sink.child.try_wait().unwrap().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGTERM));
        assert!(!sink.is_running());
    }

    #[test]
    fn test_stop_kills_after_timeout() {
        let mut sink = running("sh", &["-c", "trap '' TERM; exec sleep 30"]);
        // Let the shell install the trap
        thread::sleep(Duration::from_millis(300));

        let started = Instant::now();
        sink.stop();

        let status = sink.child.try_wait().unwrap().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
        assert!(started.elapsed() >= STOP_TIMEOUT);
    }

    #[test]
    fn test_stop_on_exited_process() {
        let mut sink = running("true", &[]);
        sink.child.wait().unwrap();

        sink.stop();
        assert!(!sink.is_running());
    }

    #[test]
    fn test_args_with_target() {
        assert_eq!(
            loopback_args("NovaGame", Some("alsa_output.headset")),
            [
                "-P",
                "alsa_output.headset",
                "--capture-props=media.class=Audio/Sink",
                "-n",
                "NovaGame"
            ]
        );
    }

    #[test]
    fn test_args_without_target() {
        assert_eq!(
            loopback_args("NovaChat", None),
            ["--capture-props=media.class=Audio/Sink", "-n", "NovaChat"]
        );
    }

    #[test]
    fn test_sink_node_name() {
        assert_eq!(sink_node_name("NovaGame"), "input.NovaGame");
    }
}
