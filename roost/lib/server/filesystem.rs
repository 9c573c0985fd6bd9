//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Disk usage accounting for a server's data directory.
///
/// Implementations answer from cached bookkeeping; these queries sit on the
/// stats hot path and must not touch the disk.
pub trait Filesystem: Send + Sync {
    /// Reports whether the server is still within its disk quota.
    fn has_space_available(&self) -> bool;

    /// Returns the cached disk usage in bytes.
    fn cached_usage(&self) -> u64;
}
