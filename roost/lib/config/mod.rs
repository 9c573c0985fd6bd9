//! Configuration types and helpers.

mod defaults;
mod process;
mod throttles;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use process::*;
pub use throttles::*;
