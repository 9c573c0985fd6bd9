use std::sync::Arc;

use getset::Getters;
use roostutils::EventBus;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::{
    config::{ConsoleThrottles, ProcessConfiguration},
    environment::ProcessEnvironment,
};

use super::{
    events::STATUS_EVENT, ConsoleSink, ConsoleThrottle, DiskSpaceLimiter, Filesystem,
    ResourceUsage,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Static settings a server is created with.
#[derive(Debug, Clone, PartialEq, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ServerSettings {
    /// The server's unique identifier, used in logs and outward events.
    pub(super) uuid: Uuid,

    /// The process lifecycle rules the server starts with.
    #[builder(default)]
    pub(super) process: ProcessConfiguration,

    /// The console throttling tunables.
    #[builder(default)]
    pub(super) throttles: ConsoleThrottles,
}

/// A supervised server process.
///
/// The aggregate ties together the environment hosting the process, the
/// filesystem accounting, the output throttle, the disk limiter, the
/// moderated console sink and the outward event bus. Create one with
/// [`Server::new`], then call [`Server::start_event_listeners`] to begin
/// supervision.
pub struct Server {
    /// The server's unique identifier.
    pub(super) uuid: Uuid,

    /// The environment hosting the managed process.
    pub(super) environment: Arc<dyn ProcessEnvironment>,

    /// Disk usage accounting for the server's data.
    pub(super) filesystem: Arc<dyn Filesystem>,

    /// The current process lifecycle rules.
    pub(super) process: RwLock<ProcessConfiguration>,

    /// The console output throttle.
    pub(super) throttle: ConsoleThrottle,

    /// The disk quota enforcement guard.
    pub(super) disk_limiter: DiskSpaceLimiter,

    /// The last reported resource snapshot.
    pub(super) resources: RwLock<ResourceUsage>,

    /// The moderated console stream.
    pub(super) sink: ConsoleSink,

    /// The bus outward-facing consumers subscribe to.
    pub(super) events: EventBus,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Server {
    /// Creates a new server supervising the process hosted by the given
    /// environment.
    pub fn new(
        settings: ServerSettings,
        environment: Arc<dyn ProcessEnvironment>,
        filesystem: Arc<dyn Filesystem>,
    ) -> Arc<Self> {
        let sink = ConsoleSink::default();
        let disk_limiter =
            DiskSpaceLimiter::new(settings.uuid, Arc::clone(&environment), sink.clone());

        Arc::new(Self {
            uuid: settings.uuid,
            environment,
            filesystem,
            process: RwLock::new(settings.process),
            throttle: ConsoleThrottle::new(settings.throttles),
            disk_limiter,
            resources: RwLock::new(ResourceUsage::default()),
            sink,
            events: EventBus::new(),
        })
    }

    /// The server's unique identifier.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Returns a handle to the bus carrying this server's outward events.
    pub fn events(&self) -> EventBus {
        self.events.clone()
    }

    /// The moderated console stream.
    pub fn sink(&self) -> &ConsoleSink {
        &self.sink
    }

    /// Reports whether the server counts as running: either mid-startup or
    /// fully online.
    pub async fn is_running(&self) -> bool {
        self.environment.state().await.is_running()
    }

    /// Returns a copy of the last reported resource snapshot.
    pub async fn resource_usage(&self) -> ResourceUsage {
        self.resources.read().await.clone()
    }

    /// Returns a copy of the current process lifecycle rules.
    pub async fn process_configuration(&self) -> ProcessConfiguration {
        self.process.read().await.clone()
    }

    /// Replaces the process lifecycle rules, e.g. after a configuration
    /// re-sync. Checks already in flight finish against the rules they read.
    pub async fn update_process_configuration(&self, config: ProcessConfiguration) {
        *self.process.write().await = config;
    }

    /// Refreshes the reported state and announces it to outward consumers.
    /// Runs for every state event the environment emits.
    pub(super) async fn on_state_change(&self) {
        let state = self.environment.state().await;

        {
            let mut resources = self.resources.write().await;
            resources.state = state;
        }

        debug!(server = %self.uuid, state = %state, "server status changed");
        self.events
            .publish(STATUS_EVENT, Value::String(state.to_string()))
            .await;
    }
}
