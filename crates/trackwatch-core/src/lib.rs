//! ---
//! tw_section: "01-core-functionality"
//! tw_subsection: "module"
//! tw_type: "source"
//! tw_scope: "code"
//! tw_description: "Ingestion pipeline and alert correlation."
//! tw_version: "v0.1.0"
//! tw_owner: "tbd"
//! ---
//! The TrackWatch core: field synthesis, alert correlation, the ingestion
//! pipeline loop, and the simulation feed.

pub mod correlation;
pub mod enrich;
pub mod feed;
pub mod metrics;
pub mod pipeline;

pub use correlation::CorrelationEngine;
pub use enrich::FieldSynthesizer;
pub use feed::SimFeed;
pub use metrics::{new_registry, PipelineMetrics, SharedRegistry};
pub use pipeline::IngestionPipeline;
