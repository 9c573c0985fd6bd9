use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use roostutils::EventBus;
use tokio::sync::broadcast;

use crate::RoostResult;

use super::ProcessState;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Topic the environment publishes process state transitions on. The payload
/// is the new state's wire name.
pub const STATE_CHANGE_EVENT: &str = "state change";

/// Topic the environment publishes resource usage samples on. The payload is
/// a serialized [`crate::server::Stats`].
pub const RESOURCE_EVENT: &str = "resources";

/// Topic for raw image pull progress payloads.
pub const IMAGE_PULL_STATUS: &str = "image pull status";

/// Topic signalling that an image pull started.
pub const IMAGE_PULL_STARTED: &str = "image pull started";

/// Topic signalling that an image pull completed.
pub const IMAGE_PULL_COMPLETED: &str = "image pull completed";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The isolated runtime hosting a managed server process.
///
/// Implementations own the authoritative [`ProcessState`] and the raw console
/// stream, and report lifecycle activity on their event bus: state changes,
/// resource samples and image pull progress. The supervisor consumes those
/// events and steers the process back through this interface.
#[async_trait]
pub trait ProcessEnvironment: Send + Sync {
    /// Returns a handle to the bus the environment reports lifecycle events
    /// on.
    fn events(&self) -> EventBus;

    /// Subscribes to the raw console output stream. Each received chunk is
    /// one line of output without its trailing newline.
    fn subscribe_console(&self) -> broadcast::Receiver<Bytes>;

    /// Returns the current process state.
    async fn state(&self) -> ProcessState;

    /// Replaces the process state and publishes the transition on the event
    /// bus. The replacement is a single atomic store; callers never
    /// read-modify-write.
    async fn set_state(&self, state: ProcessState);

    /// Requests a graceful stop and waits up to `timeout` for the process to
    /// go offline. With `terminate` set, the process is forcefully killed
    /// once the timeout elapses instead of being left running.
    async fn wait_for_stop(&self, timeout: Duration, terminate: bool) -> RoostResult<()>;
}
