//! ---
//! tw_section: "01-core-functionality"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Shared primitives and utilities for the core runtime."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::LocationsConfig;

/// Geographic position and display name for a track section node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
    pub name: String,
}

impl Location {
    pub fn new(lat: f64, lng: f64, name: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            name: name.into(),
        }
    }
}

/// Read-only lookup from node identifier to geographic location.
///
/// The table is deployment configuration, not computed state. Unrecognized
/// node identifiers resolve to the configured fallback location so that alert
/// creation can never fail on a missing table entry.
#[derive(Debug, Clone)]
pub struct LocationDirectory {
    nodes: IndexMap<String, Location>,
    fallback: Location,
}

impl LocationDirectory {
    /// Build the directory from the `[locations]` configuration section.
    pub fn from_config(config: &LocationsConfig) -> Self {
        Self {
            nodes: config.nodes.clone(),
            fallback: config.fallback.clone(),
        }
    }

    /// Resolve a node identifier to its location, falling back for unknowns.
    pub fn locate(&self, node_id: &str) -> Location {
        self.nodes
            .get(node_id)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Number of configured nodes, for startup logging.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for LocationDirectory {
    fn default() -> Self {
        Self::from_config(&LocationsConfig::default())
    }
}
