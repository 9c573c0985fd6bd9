use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::environment::ProcessState;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A resource usage sample reported by the process environment.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct Stats {
    /// The memory currently in use, in bytes.
    #[serde(default)]
    #[builder(default)]
    pub(super) memory_bytes: u64,

    /// The memory limit imposed on the process, in bytes.
    #[serde(default)]
    #[builder(default)]
    pub(super) memory_limit_bytes: u64,

    /// The absolute CPU usage, in percent of a single core.
    #[serde(default)]
    #[builder(default)]
    pub(super) cpu_absolute: f64,

    /// Network counters for the process.
    #[serde(default)]
    #[builder(default)]
    pub(super) network: NetworkStats,

    /// How long the process has been up, in milliseconds.
    #[serde(default)]
    #[builder(default)]
    pub(super) uptime: u64,
}

/// Network counters for the process.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct NetworkStats {
    /// Bytes received.
    #[serde(default)]
    #[builder(default)]
    pub(super) rx_bytes: u64,

    /// Bytes sent.
    #[serde(default)]
    #[builder(default)]
    pub(super) tx_bytes: u64,
}

/// The server's last known resource snapshot, as reported to outward
/// consumers.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize, Getters)]
#[getset(get = "pub with_prefix")]
pub struct ResourceUsage {
    /// The most recent stats sample.
    #[serde(flatten)]
    pub(super) stats: Stats,

    /// The process state at the time of the sample.
    #[serde(default)]
    pub(super) state: ProcessState,

    /// The cached disk usage, in bytes.
    #[serde(default)]
    pub(super) disk_bytes: u64,
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_resource_usage_flattens_stats_on_the_wire() -> anyhow::Result<()> {
        let usage = ResourceUsage {
            stats: Stats::builder()
                .memory_bytes(1024)
                .cpu_absolute(42.5)
                .network(NetworkStats::builder().rx_bytes(10).tx_bytes(20).build())
                .uptime(5000)
                .build(),
            state: ProcessState::Running,
            disk_bytes: 2048,
        };

        let value = serde_json::to_value(&usage)?;

        assert_eq!(value["memory_bytes"], json!(1024));
        assert_eq!(value["cpu_absolute"], json!(42.5));
        assert_eq!(value["network"]["rx_bytes"], json!(10));
        assert_eq!(value["state"], json!("running"));
        assert_eq!(value["disk_bytes"], json!(2048));

        Ok(())
    }

    #[test]
    fn test_stats_deserialize_fills_missing_fields() -> anyhow::Result<()> {
        let stats: Stats = serde_json::from_str(r#"{ "memory_bytes": 512 }"#)?;

        assert_eq!(*stats.get_memory_bytes(), 512);
        assert_eq!(*stats.get_uptime(), 0);
        assert_eq!(*stats.get_network().get_rx_bytes(), 0);

        Ok(())
    }
}
