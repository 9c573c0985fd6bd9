use std::sync::Arc;

use bytes::Bytes;
use roostutils::strip_ansi;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use crate::{
    config::{StopMethod, DEFAULT_CONSOLE_SINK_CAPACITY},
    environment::ProcessState,
};

use super::Server;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Fan-out channel for a server's moderated console stream.
///
/// A thin wrapper over a broadcast channel: pushes never block, and a
/// subscriber that falls behind sees a lag error rather than slowing the
/// producer. Output pushed while nobody subscribes is dropped.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    tx: broadcast::Sender<Bytes>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ConsoleSink {
    /// Creates a sink whose subscribers may lag up to `capacity` chunks
    /// before losing output.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to the stream from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.tx.subscribe()
    }

    /// Pushes one chunk of process output to all subscribers.
    pub fn push(&self, data: Bytes) {
        let _ = self.tx.send(data);
    }

    /// Pushes a supervisor-authored notice, visually set off from process
    /// output by a colored prefix.
    pub fn push_daemon_message(&self, message: &str) {
        self.push(Bytes::from(format!(
            "\x1b[33m\x1b[1m[roost]:\x1b[0m {message}"
        )));
    }
}

impl Server {
    /// Ingests one chunk of raw console output.
    ///
    /// The chunk is counted against the output throttle, handed to the line
    /// matcher on its own task so detection never delays delivery, and
    /// forwarded to the sink unless currently suppressed. A persistent
    /// throttle violation stops the server.
    pub async fn process_console_output(self: Arc<Self>, data: Bytes) {
        let violated = self
            .throttle
            .increment(|| {
                self.sink.push_daemon_message(
                    "Your server is outputting too much data and is being throttled.",
                );
            })
            .is_err();

        // Skip over regular power actions and stop the instance directly.
        // Nothing to do when a previous violation already has it stopping.
        if violated && self.environment.state().await != ProcessState::Stopping {
            self.environment.set_state(ProcessState::Stopping).await;

            let server = Arc::clone(&self);
            tokio::spawn(async move {
                warn!(server = %server.uuid, "stopping server instance, violating throttle limits");
                server.sink.push_daemon_message(
                    "Your server is being stopped for outputting too much data in a short period of time.",
                );

                let grace = server.throttle.config().stop_grace();
                if let Err(err) = server.environment.wait_for_stop(grace, true).await {
                    // The stop failed; unless the process died on its own,
                    // put the state back so a later violation can retry.
                    if server.environment.state().await != ProcessState::Offline {
                        server.environment.set_state(ProcessState::Running).await;
                    }

                    error!(server = %server.uuid, error = %err, "failed to stop server after throttle violation");
                }
            });
        }

        let server = Arc::clone(&self);
        let chunk = data.clone();
        tokio::spawn(async move {
            server.on_console_output(&chunk).await;
        });

        if !self.throttle.throttled() {
            self.sink.push(data);
        }
    }

    /// Scans one console line for state transitions.
    ///
    /// While the process is starting, the configured completion matchers are
    /// tested in order and the first match marks the server running. While
    /// the process reports itself running, an exact match against a
    /// command-type stop value marks it offline directly: the process
    /// acknowledged its own stop command, so `Stopping` is skipped.
    async fn on_console_output(&self, data: &[u8]) {
        let state = self.environment.state().await;
        if !state.is_running() {
            return;
        }

        let config = self.process_configuration().await;

        // Work on an owned copy; the inbound buffer is shared with the sink
        // and must never change underneath it.
        let raw = data.to_vec();

        if state == ProcessState::Starting {
            let line = if *config.get_startup().get_strip_ansi() {
                strip_ansi(&raw)
            } else {
                raw.clone()
            };

            for matcher in config.get_startup().get_done() {
                if !matcher.matches(&line) {
                    continue;
                }

                debug!(
                    server = %self.uuid,
                    matcher = %matcher,
                    line = %String::from_utf8_lossy(&line),
                    "detected running state based on console line output",
                );
                self.environment.set_state(ProcessState::Running).await;
                break;
            }
        }

        // Checked independently of the startup branch so a stop command
        // echoed on the line that completed startup still counts. The
        // comparison uses the unstripped bytes, exactly as configured.
        if self.is_running().await {
            let stop = config.get_stop();
            if *stop.get_method() == StopMethod::Command && raw == stop.get_value().as_bytes() {
                self.environment.set_state(ProcessState::Offline).await;
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_SINK_CAPACITY)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sink_delivers_to_subscribers() {
        let sink = ConsoleSink::default();
        let mut first = sink.subscribe();
        let mut second = sink.subscribe();

        sink.push(Bytes::from_static(b"hello"));

        assert_eq!(first.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(second.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_sink_daemon_message_carries_colored_prefix() {
        let sink = ConsoleSink::default();
        let mut rx = sink.subscribe();

        sink.push_daemon_message("stopping process now");

        let chunk = rx.recv().await.unwrap();
        assert!(chunk.starts_with(b"\x1b[33m\x1b[1m[roost]:\x1b[0m "));
        assert!(chunk.ends_with(b"stopping process now"));
    }

    #[tokio::test]
    async fn test_sink_drops_output_without_subscribers() {
        let sink = ConsoleSink::default();
        sink.push(Bytes::from_static(b"nobody listening"));

        // Only output pushed after subscribing is delivered.
        let mut rx = sink.subscribe();
        sink.push(Bytes::from_static(b"caught"));

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"caught"));
        assert!(rx.try_recv().is_err());
    }
}
