//! ---
//! tw_section: "05-networking-external-interfaces"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Query, command, and observer event-stream surfaces."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
//! Thin network shims over the core: the REST query/command API and the
//! WebSocket event stream. Both are spawned as independent servers with
//! graceful shutdown handles.

pub mod rest;
pub mod websocket;

pub use rest::{AlertsApiBuilder, AlertsApiHandle};
pub use websocket::{EventStreamBuilder, EventStreamHandle};
