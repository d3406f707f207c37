//! ---
//! tw_section: "04-classification-capability"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "External anomaly classification client."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
//! Wrapper around the external anomaly classification capability, owning the
//! absorb-to-fallback failure contract.

pub mod client;

pub use client::{Classifier, HttpClassifier};
