//! Session driver: walks partitions in session order, feeding classified
//! events through the tracker and emission engine.

use crate::annotation::IdFactory;
use crate::catalog::{Catalog, ClassifyContext};
use crate::emit::{DedupIndex, EmissionEngine, SessionReport};
use crate::store::{AnnotationStore, StoreError};
use crate::tracker::{NarrativeTracker, TrackerError};
use crate::units;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that abort a session run.
///
/// Partitions already committed when the error surfaces are not rolled back.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Author tag stamped into created annotations.
    pub author: String,

    /// Fixed id seed; defaults to the wall clock when unset.
    pub id_seed: Option<i64>,

    /// Whether to run the unit-level enrichment pass.
    pub annotate_units: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            author: "stacnl".to_string(),
            id_seed: None,
            annotate_units: true,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with the given author tag.
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            ..Self::default()
        }
    }

    /// Fix the id seed (deterministic ids, mainly for tests).
    pub fn with_id_seed(mut self, seed: i64) -> Self {
        self.id_seed = Some(seed);
        self
    }

    /// Skip the unit-level enrichment pass.
    pub fn without_units_pass(mut self) -> Self {
        self.annotate_units = false;
        self
    }
}

/// Annotate one complete session.
///
/// Builds the dedup index with a read-only pre-pass over every partition,
/// optionally runs the unit-level enrichment pass, then walks partitions in
/// session order feeding offset-sorted events through the tracker. New
/// structures are appended and committed after each partition; accumulators
/// still open after the last partition are flushed before the final commit.
pub fn annotate_session<S: AnnotationStore>(
    store: &mut S,
    config: &EngineConfig,
) -> Result<SessionReport, EngineError> {
    let partitions = store.partitions()?;
    info!(partitions = partitions.len(), "annotating session");

    // read-only index phase; mutation must not start before it completes
    let mut index = DedupIndex::new();
    for partition in &partitions {
        index.absorb(partition, &store.read_structures(partition)?);
    }

    let seed = config.id_seed.unwrap_or_else(wall_clock_seed);
    let mut ids = IdFactory::new(&config.author, seed);

    let mut units_retyped = 0;
    let mut resources_marked = 0;
    if config.annotate_units {
        for partition in &partitions {
            let stats = units::annotate_partition(store, partition, &mut ids)?;
            units_retyped += stats.retyped;
            resources_marked += stats.resources_marked;
            store.commit(partition)?;
        }
    }

    let catalog = Catalog::standard();
    let mut tracker = NarrativeTracker::new();
    let mut engine = EmissionEngine::new(index, ids);

    for partition in &partitions {
        let mut events = store.read_events(partition)?;
        // store iteration order is not guaranteed to match textual order
        events.sort_by_key(|event| event.start);
        for event in &events {
            let ctx = ClassifyContext {
                trade_pending: tracker.trade_pending(),
            };
            let kind = catalog.classify(&event.text, ctx);
            debug!(id = %event.id, ?kind, "classified event");
            tracker.observe(&event.id, &kind, &mut engine)?;
        }
        engine.drain_into(store)?;
    }

    // the distribution accumulator carries across partitions; close it out
    tracker.finish(&mut engine);
    engine.drain_into(store)?;

    let mut report = engine.into_report();
    report.units_retyped = units_retyped;
    report.resources_marked = resources_marked;
    Ok(report)
}

fn wall_clock_seed() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
