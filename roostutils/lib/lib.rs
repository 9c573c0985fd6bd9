//! `roostutils` is a library containing general utilities for the roost project.

#![warn(missing_docs)]

pub mod bus;
pub mod term;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use bus::*;
pub use term::*;
