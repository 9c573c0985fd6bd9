//! Process environment interfaces and state tracking.

mod environment;
mod state;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use environment::*;
pub use state::*;
