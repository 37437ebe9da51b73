//! Discourse-level annotation inference for Settlers of Catan transcripts.
//!
//! This crate augments an existing corpus annotation store: engine-generated
//! event messages from recorded game sessions are matched against an ordered
//! pattern catalog, fed through per-session narrative thread state, and
//! linked into a directed, typed relation graph (plus composite groupings).
//! Requests are deduplicated against anything already annotated, and links
//! whose endpoints the store cannot address together are routed to a
//! plain-text report for manual resolution.
//!
//! # Quick start
//!
//! ```
//! use catan_discourse::testing::SessionBuilder;
//! use catan_discourse::{annotate_session, EngineConfig};
//!
//! let mut store = SessionBuilder::new("pilot02")
//!     .partition(&[
//!         "Alice joined the game.",
//!         "Alice sat down at seat 0.",
//!     ])
//!     .build();
//!
//! let config = EngineConfig::default().with_id_seed(1);
//! let report = annotate_session(&mut store, &config).unwrap();
//! assert_eq!(report.relations_created, 1);
//! ```

pub mod annotation;
pub mod boundary;
pub mod catalog;
pub mod driver;
pub mod emit;
pub mod store;
pub mod testing;
pub mod tracker;
pub mod units;

// Primary public API
pub use annotation::{
    Event, Group, IdFactory, LocalId, PartitionId, Provenance, QualifiedId, Relation, RelationKind,
};
pub use catalog::{Catalog, ClassifyContext, EventKind};
pub use driver::{annotate_session, EngineConfig, EngineError};
pub use emit::{DedupIndex, EmissionEngine, SessionReport};
pub use store::{AnnotationStore, JsonStore, MemoryStore, StoreError};
pub use tracker::{NarrativeTracker, TrackerError};
