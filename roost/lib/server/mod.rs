//! Server aggregate and its supervision machinery.

mod console;
mod events;
mod filesystem;
mod limiter;
mod listeners;
mod resources;
mod server;
mod throttle;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use console::*;
pub use events::*;
pub use filesystem::*;
pub use limiter::*;
pub use resources::*;
pub use server::*;
pub use throttle::*;
