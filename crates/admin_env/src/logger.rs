//!
//! Logger of the system.
//!

pub use tracing::{debug, error, event as log, info, warn};

pub mod config;
mod setup;
pub mod types;

pub use self::{
    config::Config,
    setup::{setup, TelemetryGuard},
    types::{Flow, Level},
};
