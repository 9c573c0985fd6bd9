use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use roost::{
    config::{
        ConsoleThrottles, ProcessConfiguration, StartupDetection, StopConfiguration, StopMethod,
    },
    environment::{
        ProcessEnvironment, ProcessState, IMAGE_PULL_COMPLETED, IMAGE_PULL_STARTED,
        IMAGE_PULL_STATUS, RESOURCE_EVENT, STATE_CHANGE_EVENT,
    },
    server::{
        Filesystem, Server, ServerSettings, Stats, INSTALL_OUTPUT_EVENT, STATS_EVENT, STATUS_EVENT,
    },
    RoostError, RoostResult,
};
use roostutils::EventBus;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// How long to let spawned handler tasks settle before asserting.
const SETTLE: Duration = Duration::from_millis(100);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An in-memory process environment driving the supervisor in tests.
///
/// State changes publish on the bus exactly like a real runtime adapter, and
/// a successful stop request takes the process offline. Setting `fail_stops`
/// makes stop requests error out instead.
struct TestEnvironment {
    bus: EventBus,
    console: broadcast::Sender<Bytes>,
    state: RwLock<ProcessState>,
    stop_requests: AtomicU64,
    fail_stops: AtomicBool,
}

/// Filesystem accounting stub with an adjustable quota verdict.
struct TestFilesystem {
    space_available: AtomicBool,
    usage: AtomicU64,
}

/// A wired-up server together with its collaborators.
struct Harness {
    server: Arc<Server>,
    environment: Arc<TestEnvironment>,
    filesystem: Arc<TestFilesystem>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TestEnvironment {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bus: EventBus::new(),
            console: broadcast::channel(64).0,
            state: RwLock::new(ProcessState::Offline),
            stop_requests: AtomicU64::new(0),
            fail_stops: AtomicBool::new(false),
        })
    }

    /// Feeds one line of console output into the supervisor.
    fn emit_console(&self, line: impl Into<Bytes>) {
        let _ = self.console.send(line.into());
    }

    /// Publishes one resource sample on the environment bus.
    async fn publish_stats(&self, stats: &Stats) {
        self.bus.publish_serialize(RESOURCE_EVENT, stats).await;
    }
}

impl TestFilesystem {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            space_available: AtomicBool::new(true),
            usage: AtomicU64::new(0),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ProcessEnvironment for TestEnvironment {
    fn events(&self) -> EventBus {
        self.bus.clone()
    }

    fn subscribe_console(&self) -> broadcast::Receiver<Bytes> {
        self.console.subscribe()
    }

    async fn state(&self) -> ProcessState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ProcessState) {
        *self.state.write().await = state;
        self.bus
            .publish(STATE_CHANGE_EVENT, Value::String(state.to_string()))
            .await;
    }

    async fn wait_for_stop(&self, _timeout: Duration, _terminate: bool) -> RoostResult<()> {
        self.stop_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_stops.load(Ordering::SeqCst) {
            return Err(RoostError::custom(anyhow::anyhow!(
                "runtime refused the stop request"
            )));
        }

        // A real process takes a moment to wind down; keep the state in
        // `Stopping` long enough for chunks already in flight to observe it.
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.set_state(ProcessState::Offline).await;
        Ok(())
    }
}

impl Filesystem for TestFilesystem {
    fn has_space_available(&self) -> bool {
        self.space_available.load(Ordering::SeqCst)
    }

    fn cached_usage(&self) -> u64 {
        self.usage.load(Ordering::SeqCst)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn harness(process: ProcessConfiguration, throttles: ConsoleThrottles) -> Harness {
    let environment = TestEnvironment::new();
    let filesystem = TestFilesystem::new();
    let settings = ServerSettings::builder()
        .uuid(Uuid::new_v4())
        .process(process)
        .throttles(throttles)
        .build();

    let server = Server::new(settings, environment.clone(), filesystem.clone());
    server.clone().start_event_listeners().await;

    Harness {
        server,
        environment,
        filesystem,
    }
}

fn lifecycle_rules(done: &[&str], strip_ansi: bool) -> ProcessConfiguration {
    ProcessConfiguration::builder()
        .startup(
            StartupDetection::builder()
                .done(done.iter().map(|p| p.parse().unwrap()).collect())
                .strip_ansi(strip_ansi)
                .build(),
        )
        .stop(
            StopConfiguration::builder()
                .method(StopMethod::Command)
                .value("stop".to_string())
                .build(),
        )
        .build()
}

fn relaxed_throttles() -> ConsoleThrottles {
    ConsoleThrottles::builder()
        .lines(10_000)
        .line_reset_interval(60_000)
        .decay_interval(60_000)
        .maximum_trigger_count(100)
        .build()
}

fn strict_throttles(lines: u64, max_triggers: u64) -> ConsoleThrottles {
    ConsoleThrottles::builder()
        .lines(lines)
        .line_reset_interval(60_000)
        .decay_interval(60_000)
        .maximum_trigger_count(max_triggers)
        .build()
}

fn is_daemon_message(chunk: &[u8]) -> bool {
    chunk.starts_with(b"\x1b[33m\x1b[1m[roost]:")
}

fn drain(rx: &mut broadcast::Receiver<Bytes>) -> Vec<Bytes> {
    let mut out = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        out.push(chunk);
    }
    out
}

async fn settle() {
    tokio::time::sleep(SETTLE).await;
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_done_matcher_flips_starting_to_running() -> anyhow::Result<()> {
    let h = harness(
        lifecycle_rules(&["Ready", "Server started"], false),
        relaxed_throttles(),
    )
    .await;

    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    h.environment.emit_console("[init] loading world...");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Starting);

    h.environment.emit_console("[12:00:01] Server started in 3.2s");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Running);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_done_matching_respects_strip_ansi_setting() -> anyhow::Result<()> {
    // With stripping disabled, the escape prefix defeats an anchored matcher.
    let h = harness(lifecycle_rules(&["regex:^Done"], false), relaxed_throttles()).await;
    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    h.environment.emit_console("\x1b[32mDone (3.2s)!\x1b[0m");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Starting);

    // With stripping enabled, the same line matches.
    let h = harness(lifecycle_rules(&["regex:^Done"], true), relaxed_throttles()).await;
    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    h.environment.emit_console("\x1b[32mDone (3.2s)!\x1b[0m");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Running);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_stop_command_echo_flips_running_to_offline() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&[], false), relaxed_throttles()).await;

    h.environment.set_state(ProcessState::Running).await;
    settle().await;

    // The comparison is exact, not substring.
    h.environment.emit_console("stop now");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Running);

    h.environment.emit_console("stop");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Offline);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_stop_echo_counts_on_the_chunk_that_completed_startup() -> anyhow::Result<()> {
    // A single chunk can finish startup detection and still be recognized as
    // the stop command echo.
    let h = harness(lifecycle_rules(&["stop"], false), relaxed_throttles()).await;

    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    h.environment.emit_console("stop");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Offline);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_console_is_not_reinterpreted_while_offline() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&["Ready"], false), relaxed_throttles()).await;
    let mut console = h.server.sink().subscribe();

    h.environment.emit_console("Ready");
    h.environment.emit_console("stop");
    settle().await;

    // No detection ran, but the output still reached the sink.
    assert_eq!(h.environment.state().await, ProcessState::Offline);
    let delivered = drain(&mut console);
    assert_eq!(delivered, vec![Bytes::from("Ready"), Bytes::from("stop")]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_detection_leaves_the_delivered_chunk_untouched() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&["regex:^Done"], true), relaxed_throttles()).await;
    let mut console = h.server.sink().subscribe();

    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    let chunk = Bytes::from_static(b"\x1b[32mDone (3.2s)!\x1b[0m");
    h.environment.emit_console(chunk.clone());
    settle().await;

    // Stripping happened on a working copy only; subscribers get the
    // original bytes, escapes and all.
    assert_eq!(h.environment.state().await, ProcessState::Running);
    assert_eq!(drain(&mut console), vec![chunk]);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_disk_limiter_fires_once_per_boot_cycle() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&[], false), relaxed_throttles()).await;
    let mut console = h.server.sink().subscribe();

    h.filesystem.space_available.store(false, Ordering::SeqCst);
    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    h.environment.publish_stats(&Stats::default()).await;
    settle().await;
    assert_eq!(h.environment.stop_requests.load(Ordering::SeqCst), 1);

    // Further samples in the same boot cycle are ignored.
    h.environment.publish_stats(&Stats::default()).await;
    h.environment.publish_stats(&Stats::default()).await;
    settle().await;
    assert_eq!(h.environment.stop_requests.load(Ordering::SeqCst), 1);

    let warnings = drain(&mut console)
        .iter()
        .filter(|chunk| is_daemon_message(chunk))
        .count();
    assert_eq!(warnings, 1);

    // A fresh boot rearms the limiter.
    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    h.environment.publish_stats(&Stats::default()).await;
    settle().await;
    assert_eq!(h.environment.stop_requests.load(Ordering::SeqCst), 2);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_stats_event_refreshes_snapshot_and_publishes_outward() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&[], false), relaxed_throttles()).await;
    let mut stats_events = h.server.events().on(&[STATS_EVENT]).await;

    h.environment.set_state(ProcessState::Running).await;
    settle().await;
    h.filesystem.usage.store(2048, Ordering::SeqCst);

    let sample = Stats::builder()
        .memory_bytes(512)
        .memory_limit_bytes(4096)
        .cpu_absolute(1.5)
        .uptime(9000)
        .build();
    h.environment.publish_stats(&sample).await;
    settle().await;

    let usage = h.server.resource_usage().await;
    assert_eq!(*usage.get_stats(), sample);
    assert_eq!(*usage.get_state(), ProcessState::Running);
    assert_eq!(*usage.get_disk_bytes(), 2048);

    let event = stats_events.try_recv()?;
    assert_eq!(event.data["memory_bytes"], json!(512));
    assert_eq!(event.data["state"], json!("running"));
    assert_eq!(event.data["disk_bytes"], json!(2048));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_malformed_stats_payload_is_dropped() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&[], false), relaxed_throttles()).await;
    let mut stats_events = h.server.events().on(&[STATS_EVENT]).await;

    h.environment
        .events()
        .publish(RESOURCE_EVENT, json!("not a sample"))
        .await;
    settle().await;

    assert_eq!(h.server.resource_usage().await, Default::default());
    assert!(stats_events.try_recv().is_err());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_state_events_refresh_outward_status() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&[], false), relaxed_throttles()).await;
    let mut status_events = h.server.events().on(&[STATUS_EVENT]).await;

    h.environment.set_state(ProcessState::Starting).await;
    settle().await;
    assert_eq!(status_events.try_recv()?.data, json!("starting"));
    assert_eq!(
        *h.server.resource_usage().await.get_state(),
        ProcessState::Starting
    );

    h.environment.set_state(ProcessState::Running).await;
    settle().await;
    assert_eq!(status_events.try_recv()?.data, json!("running"));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_image_pull_events_surface_notices_and_install_log() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&[], false), relaxed_throttles()).await;
    let mut console = h.server.sink().subscribe();
    let mut install_events = h.server.events().on(&[INSTALL_OUTPUT_EVENT]).await;
    let bus = h.environment.events();

    bus.publish(IMAGE_PULL_STARTED, Value::Null).await;
    settle().await;
    let started = console.recv().await?;
    assert!(is_daemon_message(&started));
    assert!(started.ends_with(b"could take a few minutes to complete..."));

    let progress = json!({ "status": "Downloading", "progress": "[==>       ]" });
    bus.publish(IMAGE_PULL_STATUS, progress.clone()).await;
    settle().await;
    assert_eq!(install_events.try_recv()?.data, progress);
    assert!(console.try_recv().is_err());

    bus.publish(IMAGE_PULL_COMPLETED, Value::Null).await;
    settle().await;
    let finished = console.recv().await?;
    assert!(finished.ends_with(b"Finished pulling container image"));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_throttle_violation_initiates_single_bounded_stop() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&[], false), strict_throttles(5, 2)).await;
    let mut console = h.server.sink().subscribe();

    h.environment.set_state(ProcessState::Running).await;
    settle().await;

    // Chunk 5 strikes and warns; chunk 6 crosses the activation limit and
    // stops the server; chunk 7 arrives while already stopping.
    for _ in 0..7 {
        h.environment.emit_console("spam");
    }
    settle().await;
    settle().await;

    assert_eq!(h.environment.stop_requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.environment.state().await, ProcessState::Offline);

    let delivered = drain(&mut console);
    let raw: Vec<_> = delivered
        .iter()
        .filter(|chunk| !is_daemon_message(chunk))
        .collect();
    assert_eq!(raw.len(), 4, "output past the allowance must be suppressed");
    assert!(delivered.iter().any(|chunk| chunk.ends_with(
        b"Your server is being stopped for outputting too much data in a short period of time."
    )));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_failed_throttle_stop_reverts_state_for_retry() -> anyhow::Result<()> {
    // An activation limit of one turns the first strike into a violation.
    let h = harness(lifecycle_rules(&[], false), strict_throttles(2, 1)).await;
    h.environment.fail_stops.store(true, Ordering::SeqCst);

    h.environment.set_state(ProcessState::Running).await;
    settle().await;

    h.environment.emit_console("spam");
    h.environment.emit_console("spam");
    settle().await;
    settle().await;

    // The stop failed, so the server went back to running rather than
    // wedging in the stopping state.
    assert_eq!(h.environment.stop_requests.load(Ordering::SeqCst), 1);
    assert_eq!(h.environment.state().await, ProcessState::Running);

    // Which means the next violating chunk gets to try again.
    h.environment.emit_console("spam");
    settle().await;
    settle().await;
    assert_eq!(h.environment.stop_requests.load(Ordering::SeqCst), 2);

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_starting_event_rearms_the_throttle() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&[], false), strict_throttles(3, 1)).await;

    h.environment.set_state(ProcessState::Running).await;
    settle().await;

    h.environment.emit_console("spam");
    h.environment.emit_console("spam");
    settle().await;

    // A fresh boot clears the accumulated count before it can cross the
    // allowance.
    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    h.environment.emit_console("spam");
    h.environment.emit_console("spam");
    settle().await;

    assert_eq!(h.environment.stop_requests.load(Ordering::SeqCst), 0);
    assert!(h.environment.state().await.is_running());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_updated_lifecycle_rules_apply_to_later_chunks() -> anyhow::Result<()> {
    let h = harness(lifecycle_rules(&["Ready"], false), relaxed_throttles()).await;

    h.environment.set_state(ProcessState::Starting).await;
    settle().await;

    h.environment.emit_console("Booted");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Starting);

    h.server
        .update_process_configuration(lifecycle_rules(&["Booted"], false))
        .await;

    h.environment.emit_console("Booted");
    settle().await;
    assert_eq!(h.environment.state().await, ProcessState::Running);

    Ok(())
}
