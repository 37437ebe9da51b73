//! Core annotation data model: identifiers, events, relations, groups and
//! provenance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Identifier of one partition (subdoc) of a session, e.g. `pilot02_07`.
///
/// A partition is the store's atomic addressing unit: two endpoints on
/// different partitions cannot be linked there directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionId(String);

impl PartitionId {
    /// Create a partition id from its store name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Partition-scoped annotation identifier in the store's `author_stamp`
/// convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalId(String);

impl LocalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Globally-qualified identifier: partition tag plus partition-local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedId {
    /// Partition holding the identified annotation.
    pub partition: PartitionId,
    /// Identifier inside that partition.
    pub local: LocalId,
}

impl QualifiedId {
    pub fn new(partition: PartitionId, local: LocalId) -> Self {
        Self { partition, local }
    }
}

impl fmt::Display for QualifiedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.partition, self.local)
    }
}

/// One non-linguistic segment of a transcript. Read-only input to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Globally-qualified identifier.
    pub id: QualifiedId,
    /// Start character offset in the partition text.
    pub start: usize,
    /// End character offset (exclusive).
    pub end: usize,
    /// Literal message text.
    pub text: String,
}

impl Event {
    /// The partition-scoped part of this event's id.
    pub fn local(&self) -> &LocalId {
        &self.id.local
    }
}

/// Kinds of directed discourse relations the engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    Sequence,
    Result,
    Continuation,
    Elaboration,
    QuestionAnswerPair,
}

impl RelationKind {
    /// The store's label for this relation kind.
    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Sequence => "Sequence",
            RelationKind::Result => "Result",
            RelationKind::Continuation => "Continuation",
            RelationKind::Elaboration => "Elaboration",
            RelationKind::QuestionAnswerPair => "Question-answer_pair",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Provenance metadata attached to every structure this engine creates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Author tag of the creating tool or annotator.
    pub author: String,
    /// Creation stamp.
    pub created: i64,
    /// Last modifier; `n/a` until a human touches the structure.
    pub last_modifier: String,
    /// Last modification stamp.
    pub last_modified: i64,
}

impl Provenance {
    pub fn new(author: impl Into<String>, created: i64) -> Self {
        Self {
            author: author.into(),
            created,
            last_modifier: "n/a".to_string(),
            last_modified: 0,
        }
    }
}

/// A directed, typed link between two endpoints of the discourse graph.
/// Created once, never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub id: LocalId,
    pub kind: RelationKind,
    pub source: QualifiedId,
    pub target: QualifiedId,
    pub provenance: Provenance,
}

/// A composite discourse unit: an identified set of members under one id.
///
/// `nested` holds embedded groups ("fat" grouping). Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: LocalId,
    /// Event-level members.
    pub members: Vec<QualifiedId>,
    /// Embedded group members.
    pub nested: Vec<QualifiedId>,
    pub provenance: Provenance,
}

impl Group {
    /// Local-id signature used for dedup lookups: members plus nested groups.
    pub fn signature(&self) -> BTreeSet<LocalId> {
        self.members
            .iter()
            .chain(self.nested.iter())
            .map(|id| id.local.clone())
            .collect()
    }
}

/// Mints fresh annotation identifiers in the store's `author_stamp`
/// convention.
///
/// One factory is created per run and threaded explicitly through every call
/// that needs a fresh id; there is no ambient counter.
#[derive(Debug)]
pub struct IdFactory {
    author: String,
    next_stamp: i64,
}

impl IdFactory {
    /// Create a factory for the given author, starting at `seed`.
    pub fn new(author: impl Into<String>, seed: i64) -> Self {
        Self {
            author: author.into(),
            next_stamp: seed,
        }
    }

    /// Mint a fresh local id plus its creation stamp.
    pub fn mint(&mut self) -> (LocalId, i64) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        (LocalId::new(format!("{}_{}", self.author, stamp)), stamp)
    }

    pub fn author(&self) -> &str {
        &self.author
    }
}
