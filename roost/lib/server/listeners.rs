use std::sync::Arc;

use roostutils::Event;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::environment::{
    ProcessState, IMAGE_PULL_COMPLETED, IMAGE_PULL_STARTED, IMAGE_PULL_STATUS, RESOURCE_EVENT,
    STATE_CHANGE_EVENT,
};

use super::{
    events::{INSTALL_OUTPUT_EVENT, STATS_EVENT},
    Server, Stats,
};

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Server {
    /// Starts the background listeners routing environment activity into
    /// supervision logic. Call once, right after creating the server.
    ///
    /// One routing task multiplexes the state, stats and image pull channels
    /// and hands each event to its handler on a fresh task, so a slow
    /// handler never delays receipt of the next event. A second task pumps
    /// raw console chunks into [`Server::process_console_output`]. Both
    /// tasks hold only a weak handle to the server and wind down once it is
    /// dropped; there is no explicit teardown.
    pub async fn start_event_listeners(self: Arc<Self>) {
        let bus = self.environment.events();
        let mut state_events = bus.on(&[STATE_CHANGE_EVENT]).await;
        let mut stats_events = bus.on(&[RESOURCE_EVENT]).await;
        let mut image_events = bus
            .on(&[IMAGE_PULL_STATUS, IMAGE_PULL_STARTED, IMAGE_PULL_COMPLETED])
            .await;
        let mut console = self.environment.subscribe_console();

        let weak = Arc::downgrade(&self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(event) = state_events.recv() => {
                        match weak.upgrade() {
                            Some(server) => {
                                tokio::spawn(async move { server.handle_state_event(event).await });
                            }
                            None => break,
                        }
                    }
                    Some(event) = stats_events.recv() => {
                        match weak.upgrade() {
                            Some(server) => {
                                tokio::spawn(async move { server.handle_stats_event(event).await });
                            }
                            None => break,
                        }
                    }
                    Some(event) = image_events.recv() => {
                        match weak.upgrade() {
                            Some(server) => {
                                tokio::spawn(async move { server.handle_image_event(event).await });
                            }
                            None => break,
                        }
                    }
                    else => break,
                }
            }
        });

        let uuid = self.uuid;
        let weak = Arc::downgrade(&self);
        tokio::spawn(async move {
            loop {
                match console.recv().await {
                    Ok(chunk) => match weak.upgrade() {
                        Some(server) => server.process_console_output(chunk).await,
                        None => break,
                    },
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(server = %uuid, skipped, "console stream lagged, dropping chunks");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        debug!(server = %self.uuid, "registered server event listeners");
    }

    /// Handles one state event: a fresh boot rearms the protective guards,
    /// and every transition refreshes the outward status.
    async fn handle_state_event(&self, event: Event) {
        let starting = event
            .data
            .as_str()
            .and_then(|s| s.parse::<ProcessState>().ok())
            == Some(ProcessState::Starting);

        if starting {
            self.disk_limiter.reset();
            self.throttle.reset();
        }

        self.on_state_change().await;
    }

    /// Handles one resource sample: refreshes the reported snapshot,
    /// enforces the disk quota, then publishes the snapshot outward.
    async fn handle_stats_event(&self, event: Event) {
        let stats = match serde_json::from_value::<Stats>(event.data) {
            Ok(stats) => stats,
            Err(err) => {
                warn!(server = %self.uuid, error = %err, "dropping malformed resource sample");
                return;
            }
        };

        let state = self.environment.state().await;
        let disk_bytes = self.filesystem.cached_usage();
        {
            let mut resources = self.resources.write().await;
            resources.stats = stats;
            resources.state = state;
            resources.disk_bytes = disk_bytes;
        }

        if !self.filesystem.has_space_available() {
            self.disk_limiter.trigger().await;
        }

        let usage = self.resource_usage().await;
        self.events.publish_serialize(STATS_EVENT, &usage).await;
    }

    /// Handles one image pull event: progress payloads are relayed to the
    /// install log verbatim, start and completion become console notices.
    async fn handle_image_event(&self, event: Event) {
        match event.topic.as_str() {
            IMAGE_PULL_STATUS => {
                self.events.publish(INSTALL_OUTPUT_EVENT, event.data).await;
            }
            IMAGE_PULL_STARTED => {
                self.sink.push_daemon_message(
                    "Pulling container image, this could take a few minutes to complete...",
                );
            }
            _ => {
                self.sink
                    .push_daemon_message("Finished pulling container image");
            }
        }
    }
}
