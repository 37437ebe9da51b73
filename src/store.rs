//! Annotation store adapter: the trait the engine drives, plus in-memory and
//! JSON-file reference implementations.
//!
//! The corpus's own on-disk tree format lives behind other implementations of
//! [`AnnotationStore`]; the implementations here exist for tests and local
//! runs.

use crate::annotation::{Event, Group, LocalId, PartitionId, Provenance, Relation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown partition: {0}")]
    UnknownPartition(PartitionId),

    #[error("span {start}..{end} is out of bounds for partition {partition}")]
    SpanOutOfBounds {
        partition: PartitionId,
        start: usize,
        end: usize,
    },

    #[error("unknown unit {unit} in partition {partition}")]
    UnknownUnit {
        partition: PartitionId,
        unit: LocalId,
    },

    #[error("store version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Unit annotation types used by the enrichment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    /// An unenriched non-linguistic segment.
    Segment,
    /// A trade offer.
    Offer,
    /// A completed trade.
    Accept,
    /// A rejected trade offer.
    Refusal,
    /// Any other system message.
    Other,
    /// A resource mention inside another unit's span.
    Resource,
}

impl UnitKind {
    /// The store's label for this unit type.
    pub fn label(&self) -> &'static str {
        match self {
            UnitKind::Segment => "NonplayerSegment",
            UnitKind::Offer => "Offer",
            UnitKind::Accept => "Accept",
            UnitKind::Refusal => "Refusal",
            UnitKind::Other => "Other",
            UnitKind::Resource => "Resource",
        }
    }
}

/// One name/value feature on a unit annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub value: String,
}

impl Feature {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A unit-level annotation over a character span.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitAnnotation {
    pub id: LocalId,
    pub kind: UnitKind,
    pub features: Vec<Feature>,
    pub start: usize,
    pub end: usize,
    pub provenance: Provenance,
}

impl UnitAnnotation {
    /// Set a feature, replacing any existing value under the same name.
    pub fn set_feature(&mut self, name: &str, value: impl Into<String>) {
        if let Some(feature) = self.features.iter_mut().find(|f| f.name == name) {
            feature.value = value.into();
        } else {
            self.features.push(Feature::new(name, value));
        }
    }

    /// Value of a feature, if present.
    pub fn feature(&self, name: &str) -> Option<&str> {
        self.features
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Relations and groups of one partition, as read by the dedup pre-pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionStructures {
    pub relations: Vec<Relation>,
    pub groups: Vec<Group>,
}

/// Everything one partition holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionData {
    /// Raw transcript text of this partition.
    pub text: String,
    /// Non-linguistic events, in store order (not necessarily textual order).
    pub events: Vec<Event>,
    /// Unit-level annotations.
    pub units: Vec<UnitAnnotation>,
    /// Discourse relations.
    pub relations: Vec<Relation>,
    /// Composite discourse units.
    pub groups: Vec<Group>,
}

/// Read/write access to one session's annotation store.
pub trait AnnotationStore {
    /// Partitions of the session, in session order.
    fn partitions(&self) -> Result<Vec<PartitionId>, StoreError>;

    /// Non-linguistic events of a partition. Iteration order is not
    /// guaranteed to match textual order; callers re-sort by offset.
    fn read_events(&self, partition: &PartitionId) -> Result<Vec<Event>, StoreError>;

    /// Existing relations and groups, for the read-only dedup pre-pass.
    fn read_structures(&self, partition: &PartitionId) -> Result<PartitionStructures, StoreError>;

    /// Literal text behind a character span.
    fn resolve_text(
        &self,
        partition: &PartitionId,
        start: usize,
        end: usize,
    ) -> Result<String, StoreError>;

    /// Unit-level annotations of a partition.
    fn read_units(&self, partition: &PartitionId) -> Result<Vec<UnitAnnotation>, StoreError>;

    fn append_relation(
        &mut self,
        partition: &PartitionId,
        relation: Relation,
    ) -> Result<(), StoreError>;

    fn append_group(&mut self, partition: &PartitionId, group: Group) -> Result<(), StoreError>;

    fn append_unit(&mut self, partition: &PartitionId, unit: UnitAnnotation)
        -> Result<(), StoreError>;

    /// Replace a unit annotation in place, matched by id.
    fn update_unit(&mut self, partition: &PartitionId, unit: UnitAnnotation)
        -> Result<(), StoreError>;

    /// Persist a partition. Called after each partition completes; committed
    /// partitions are never rolled back.
    fn commit(&mut self, partition: &PartitionId) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store, used by tests and the session builder.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    partitions: BTreeMap<PartitionId, PartitionData>,
    commits: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a partition with its data. Session order follows partition ids.
    pub fn insert_partition(&mut self, id: PartitionId, data: PartitionData) {
        self.partitions.insert(id, data);
    }

    /// Direct read access to a partition's data.
    pub fn partition(&self, id: &PartitionId) -> Option<&PartitionData> {
        self.partitions.get(id)
    }

    /// Number of commits performed so far.
    pub fn commit_count(&self) -> usize {
        self.commits
    }

    fn data(&self, id: &PartitionId) -> Result<&PartitionData, StoreError> {
        self.partitions
            .get(id)
            .ok_or_else(|| StoreError::UnknownPartition(id.clone()))
    }

    fn data_mut(&mut self, id: &PartitionId) -> Result<&mut PartitionData, StoreError> {
        self.partitions
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownPartition(id.clone()))
    }
}

impl AnnotationStore for MemoryStore {
    fn partitions(&self) -> Result<Vec<PartitionId>, StoreError> {
        Ok(self.partitions.keys().cloned().collect())
    }

    fn read_events(&self, partition: &PartitionId) -> Result<Vec<Event>, StoreError> {
        Ok(self.data(partition)?.events.clone())
    }

    fn read_structures(&self, partition: &PartitionId) -> Result<PartitionStructures, StoreError> {
        let data = self.data(partition)?;
        Ok(PartitionStructures {
            relations: data.relations.clone(),
            groups: data.groups.clone(),
        })
    }

    fn resolve_text(
        &self,
        partition: &PartitionId,
        start: usize,
        end: usize,
    ) -> Result<String, StoreError> {
        let data = self.data(partition)?;
        data.text
            .get(start..end)
            .map(str::to_string)
            .ok_or_else(|| StoreError::SpanOutOfBounds {
                partition: partition.clone(),
                start,
                end,
            })
    }

    fn read_units(&self, partition: &PartitionId) -> Result<Vec<UnitAnnotation>, StoreError> {
        Ok(self.data(partition)?.units.clone())
    }

    fn append_relation(
        &mut self,
        partition: &PartitionId,
        relation: Relation,
    ) -> Result<(), StoreError> {
        self.data_mut(partition)?.relations.push(relation);
        Ok(())
    }

    fn append_group(&mut self, partition: &PartitionId, group: Group) -> Result<(), StoreError> {
        self.data_mut(partition)?.groups.push(group);
        Ok(())
    }

    fn append_unit(
        &mut self,
        partition: &PartitionId,
        unit: UnitAnnotation,
    ) -> Result<(), StoreError> {
        self.data_mut(partition)?.units.push(unit);
        Ok(())
    }

    fn update_unit(
        &mut self,
        partition: &PartitionId,
        unit: UnitAnnotation,
    ) -> Result<(), StoreError> {
        let data = self.data_mut(partition)?;
        match data.units.iter_mut().find(|u| u.id == unit.id) {
            Some(existing) => {
                *existing = unit;
                Ok(())
            }
            None => Err(StoreError::UnknownUnit {
                partition: partition.clone(),
                unit: unit.id,
            }),
        }
    }

    fn commit(&mut self, partition: &PartitionId) -> Result<(), StoreError> {
        self.data(partition)?;
        self.commits += 1;
        Ok(())
    }
}

// ============================================================================
// JSON-file store
// ============================================================================

/// Current on-disk format version for JSON partition files.
const STORE_VERSION: u32 = 1;

/// One partition as persisted to disk.
#[derive(Debug, Serialize, Deserialize)]
struct SavedPartition {
    /// Format version for compatibility checking.
    version: u32,
    /// The partition contents.
    data: PartitionData,
}

/// A session stored as one JSON file per partition in a directory.
#[derive(Debug)]
pub struct JsonStore {
    dir: PathBuf,
    inner: MemoryStore,
}

impl JsonStore {
    /// Open a session directory, loading every `*.json` partition file.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        let mut inner = MemoryStore::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let content = std::fs::read_to_string(&path)?;
                let saved: SavedPartition = serde_json::from_str(&content)?;
                if saved.version != STORE_VERSION {
                    return Err(StoreError::VersionMismatch {
                        expected: STORE_VERSION,
                        found: saved.version,
                    });
                }
                inner.insert_partition(PartitionId::new(stem), saved.data);
            }
        }
        Ok(Self { dir, inner })
    }

    /// Create an empty session store rooted at `dir`.
    pub fn create(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            inner: MemoryStore::new(),
        })
    }

    /// Add a partition; it is persisted on the next commit.
    pub fn insert_partition(&mut self, id: PartitionId, data: PartitionData) {
        self.inner.insert_partition(id, data);
    }

    fn partition_path(&self, id: &PartitionId) -> PathBuf {
        self.dir.join(format!("{}.json", id.as_str()))
    }
}

impl AnnotationStore for JsonStore {
    fn partitions(&self) -> Result<Vec<PartitionId>, StoreError> {
        self.inner.partitions()
    }

    fn read_events(&self, partition: &PartitionId) -> Result<Vec<Event>, StoreError> {
        self.inner.read_events(partition)
    }

    fn read_structures(&self, partition: &PartitionId) -> Result<PartitionStructures, StoreError> {
        self.inner.read_structures(partition)
    }

    fn resolve_text(
        &self,
        partition: &PartitionId,
        start: usize,
        end: usize,
    ) -> Result<String, StoreError> {
        self.inner.resolve_text(partition, start, end)
    }

    fn read_units(&self, partition: &PartitionId) -> Result<Vec<UnitAnnotation>, StoreError> {
        self.inner.read_units(partition)
    }

    fn append_relation(
        &mut self,
        partition: &PartitionId,
        relation: Relation,
    ) -> Result<(), StoreError> {
        self.inner.append_relation(partition, relation)
    }

    fn append_group(&mut self, partition: &PartitionId, group: Group) -> Result<(), StoreError> {
        self.inner.append_group(partition, group)
    }

    fn append_unit(
        &mut self,
        partition: &PartitionId,
        unit: UnitAnnotation,
    ) -> Result<(), StoreError> {
        self.inner.append_unit(partition, unit)
    }

    fn update_unit(
        &mut self,
        partition: &PartitionId,
        unit: UnitAnnotation,
    ) -> Result<(), StoreError> {
        self.inner.update_unit(partition, unit)
    }

    fn commit(&mut self, partition: &PartitionId) -> Result<(), StoreError> {
        self.inner.commit(partition)?;
        let data = self.inner.data(partition)?.clone();
        let saved = SavedPartition {
            version: STORE_VERSION,
            data,
        };
        let content = serde_json::to_string_pretty(&saved)?;
        std::fs::write(self.partition_path(partition), content)?;
        Ok(())
    }
}
