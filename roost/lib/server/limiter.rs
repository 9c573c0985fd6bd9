use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use tracing::error;
use uuid::Uuid;

use crate::environment::ProcessEnvironment;

use super::ConsoleSink;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long a server over its disk quota is given to stop gracefully before
/// being terminated.
const STOP_TIMEOUT: Duration = Duration::from_secs(15);

/// The console warning published when the limiter fires.
const DISK_LIMIT_MESSAGE: &str =
    "Server is exceeding the assigned disk space limit, stopping process now.";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Stops a server that exceeds its disk quota, at most once per boot.
///
/// The guard rearms when the process transitions back to `Starting`, so a
/// server that keeps violating its quota is stopped once per boot cycle
/// rather than hammered on every stats sample. Concurrent triggers collapse
/// into a single execution.
pub struct DiskSpaceLimiter {
    /// The server the limiter belongs to, for log context.
    uuid: Uuid,

    /// Set once the limiter has fired for the current boot.
    tripped: AtomicBool,

    /// The environment asked to stop the process.
    environment: Arc<dyn ProcessEnvironment>,

    /// The sink the warning notice goes to.
    sink: ConsoleSink,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DiskSpaceLimiter {
    /// Creates a limiter acting on the given environment and console sink.
    pub fn new(uuid: Uuid, environment: Arc<dyn ProcessEnvironment>, sink: ConsoleSink) -> Self {
        Self {
            uuid,
            tripped: AtomicBool::new(false),
            environment,
            sink,
        }
    }

    /// Rearms the limiter for a fresh boot. Idempotent, and safe to call
    /// while a trigger is in flight.
    pub fn reset(&self) {
        self.tripped.store(false, Ordering::SeqCst);
    }

    /// Warns the console and stops the process, if the limiter has not
    /// already fired since it was last rearmed.
    pub async fn trigger(&self) {
        if !self.engage() {
            return;
        }

        self.sink.push_daemon_message(DISK_LIMIT_MESSAGE);

        if let Err(err) = self.environment.wait_for_stop(STOP_TIMEOUT, true).await {
            error!(server = %self.uuid, error = %err, "failed to stop server exceeding disk quota");
        }
    }

    /// Claims the single trigger slot. Returns false when the limiter already
    /// fired for this boot.
    fn engage(&self) -> bool {
        self.tripped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
