//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Topic the server announces process state changes on. The payload is the
/// new state's wire name.
pub const STATUS_EVENT: &str = "status";

/// Topic the server publishes resource snapshots on. The payload is a
/// serialized [`super::ResourceUsage`].
pub const STATS_EVENT: &str = "stats";

/// Topic install and image pull progress is relayed on, verbatim.
pub const INSTALL_OUTPUT_EVENT: &str = "install output";
