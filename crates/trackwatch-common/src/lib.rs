//! ---
//! tw_section: "01-core-functionality"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Shared primitives and utilities for the core runtime."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
//! Configuration, logging bootstrap, alert identifier generation, and the
//! static node-to-location directory shared across the TrackWatch workspace.

pub mod config;
pub mod directory;
pub mod logging;
pub mod time;

pub use config::AppConfig;
pub use directory::{Location, LocationDirectory};
pub use logging::init_tracing;
pub use time::AlertIdGenerator;
