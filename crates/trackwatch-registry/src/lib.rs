//! ---
//! tw_section: "03-persistence"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Durable alert collection and its mutation gate."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The durable alert registry: the single writer over the persisted alert
//! collection, enforcing the one-open-alert-per-node invariant.

/// Result alias used throughout the registry crate.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Error type for the registry subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Wrapper for IO errors encountered while reading/writing the collection.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Wrapper for JSON serialization issues.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Reported when the stored collection fails integrity verification.
    #[error("alert collection hash mismatch")]
    HashMismatch,
}

pub mod store;

pub use store::{AlertRegistry, UpsertOutcome};
