//! `roost` is a lifecycle supervision engine for server processes running in
//! isolated runtimes.
//!
//! # Overview
//!
//! roost consumes the raw activity stream an isolated runtime emits about a
//! managed server process and turns it into:
//! - Authoritative process state transitions
//! - Protective interventions (output throttling, disk quota enforcement)
//! - A moderated console stream fit for downstream consumption
//!
//! # Key Components
//!
//! - **Server**: the aggregate tying together the environment, the guards
//!   and the sinks
//! - **Event dispatcher**: routes state, stats and image pull events onto
//!   their handlers without ever blocking ingestion
//! - **Console throttle**: rolling-window rate accounting that escalates
//!   persistent violations into a forced stop
//! - **Disk limiter**: once-per-boot quota enforcement
//! - **Line matcher**: detects startup completion and stop acknowledgement
//!   from console output
//!
//! The runtime itself stays behind the [`environment::ProcessEnvironment`]
//! trait; roost never starts or inspects processes directly.
//!
//! # Usage Example
//!
//! ```rust
//! use roost::{
//!     config::{
//!         ConsoleThrottles, ProcessConfiguration, StartupDetection, StopConfiguration,
//!         StopMethod,
//!     },
//!     server::ServerSettings,
//! };
//! use uuid::Uuid;
//!
//! # fn main() -> anyhow::Result<()> {
//! let settings = ServerSettings::builder()
//!     .uuid(Uuid::new_v4())
//!     .process(
//!         ProcessConfiguration::builder()
//!             .startup(
//!                 StartupDetection::builder()
//!                     .done(vec!["Server started".parse()?])
//!                     .strip_ansi(true)
//!                     .build(),
//!             )
//!             .stop(
//!                 StopConfiguration::builder()
//!                     .method(StopMethod::Command)
//!                     .value("stop".to_string())
//!                     .build(),
//!             )
//!             .build(),
//!     )
//!     .throttles(ConsoleThrottles::default())
//!     .build();
//! # let _ = settings;
//! # Ok(())
//! # }
//! ```
//!
//! With an environment and filesystem implementation in hand, supervision is
//! two calls: `Server::new(settings, environment, filesystem)` followed by
//! `server.start_event_listeners().await`.

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod config;
pub mod environment;
pub mod server;

pub use error::*;
