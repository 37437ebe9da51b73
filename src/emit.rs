//! Relation and group emission: dedup against pre-existing structures, id
//! minting, and buffering of new structures for the write phase.
//!
//! The dedup index is built by a complete read-only pre-pass over every
//! partition before any mutation begins, and newly created structures are
//! folded into it as they are minted, so later requests in the same run
//! dedup against both.

use crate::annotation::{
    Group, IdFactory, LocalId, PartitionId, Provenance, QualifiedId, Relation, RelationKind,
};
use crate::boundary::{self, Placement};
use crate::store::{AnnotationStore, PartitionStructures, StoreError};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

/// Unordered endpoint signature of a relation.
fn endpoint_signature(a: &QualifiedId, b: &QualifiedId) -> BTreeSet<LocalId> {
    [a.local.clone(), b.local.clone()].into_iter().collect()
}

/// Index of every relation and group already present in the session's store
/// segments.
#[derive(Debug, Default)]
pub struct DedupIndex {
    relations: HashMap<RelationKind, HashSet<BTreeSet<LocalId>>>,
    groups: HashMap<BTreeSet<LocalId>, QualifiedId>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one partition's existing structures into the index.
    pub fn absorb(&mut self, partition: &PartitionId, structures: &PartitionStructures) {
        for relation in &structures.relations {
            self.insert_relation(relation.kind, &relation.source, &relation.target);
        }
        for group in &structures.groups {
            let id = QualifiedId::new(partition.clone(), group.id.clone());
            self.insert_group(group.signature(), id);
        }
    }

    pub fn contains_relation(&self, kind: RelationKind, a: &QualifiedId, b: &QualifiedId) -> bool {
        self.relations
            .get(&kind)
            .map(|set| set.contains(&endpoint_signature(a, b)))
            .unwrap_or(false)
    }

    /// Existing group covering exactly this member signature, if any.
    pub fn find_group(&self, signature: &BTreeSet<LocalId>) -> Option<QualifiedId> {
        self.groups.get(signature).cloned()
    }

    fn insert_relation(&mut self, kind: RelationKind, a: &QualifiedId, b: &QualifiedId) {
        self.relations
            .entry(kind)
            .or_default()
            .insert(endpoint_signature(a, b));
    }

    fn insert_group(&mut self, signature: BTreeSet<LocalId>, id: QualifiedId) {
        self.groups.insert(signature, id);
    }
}

/// Outcome counters and report lines for one engine run.
#[derive(Debug, Clone, Default)]
pub struct SessionReport {
    /// Two lines per link the store could not address (manual resolution).
    pub implicit_relations: Vec<String>,
    /// One line per dedup match.
    pub auto_relations: Vec<String>,
    /// Relations newly created this run.
    pub relations_created: usize,
    /// Groups newly created this run.
    pub groups_created: usize,
    /// Segment units retyped by the enrichment pass.
    pub units_retyped: usize,
    /// Resource sub-annotations added by the enrichment pass.
    pub resources_marked: usize,
}

impl SessionReport {
    /// Write the implicit- and auto-relations reports into `dir`.
    ///
    /// A report file is written only when its list is non-empty.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> io::Result<()> {
        let dir = dir.as_ref();
        if !self.implicit_relations.is_empty() {
            fs::write(
                dir.join("Implicit_Relations.txt"),
                self.implicit_relations.join("\n"),
            )?;
        }
        if !self.auto_relations.is_empty() {
            fs::write(dir.join("Auto_Relations.txt"), self.auto_relations.join("\n"))?;
        }
        Ok(())
    }
}

/// Deduplicating emission engine for relation and group requests.
///
/// Requests are side-effect-only for relations; group requests return the
/// resulting (possibly pre-existing) id for use by subsequent requests. New
/// structures are buffered per partition until [`EmissionEngine::drain_into`]
/// hands them to the store adapter.
#[derive(Debug)]
pub struct EmissionEngine {
    index: DedupIndex,
    ids: IdFactory,
    report: SessionReport,
    outbox: BTreeMap<PartitionId, PartitionStructures>,
}

impl EmissionEngine {
    pub fn new(index: DedupIndex, ids: IdFactory) -> Self {
        Self {
            index,
            ids,
            report: SessionReport::default(),
            outbox: BTreeMap::new(),
        }
    }

    /// Request a directed relation between two endpoints.
    ///
    /// A dedup match is recorded as an auto-relation; a cross-partition pair
    /// is routed to the implicit-relations report. Otherwise a new relation
    /// is minted and buffered for the partition both endpoints share.
    pub fn request_relation(
        &mut self,
        kind: RelationKind,
        a: &QualifiedId,
        b: &QualifiedId,
        context: &str,
    ) {
        if self.index.contains_relation(kind, a, b) {
            debug!(%a, %b, %kind, context, "relation already annotated");
            self.report
                .auto_relations
                .push(format!("auto relation for {context}: {a} ------ {kind} -----> {b}"));
            return;
        }
        match boundary::place(a, b) {
            Placement::Crossing { .. } => {
                debug!(%a, %b, %kind, context, "cross-partition relation reported");
                self.report
                    .implicit_relations
                    .extend(boundary::implicit_relation_lines(kind, a, b, context));
            }
            Placement::Within(partition) => {
                let (id, stamp) = self.ids.mint();
                let relation = Relation {
                    id,
                    kind,
                    source: a.clone(),
                    target: b.clone(),
                    provenance: Provenance::new(self.ids.author(), stamp),
                };
                self.index.insert_relation(kind, a, b);
                self.outbox
                    .entry(partition)
                    .or_default()
                    .relations
                    .push(relation);
                self.report.relations_created += 1;
            }
        }
    }

    /// Request a group over the given members.
    pub fn request_group(
        &mut self,
        members: &[QualifiedId],
        context: &str,
    ) -> Option<QualifiedId> {
        self.request_group_inner(members, &[], context)
    }

    /// Request a group that also embeds other groups ("fat" grouping).
    pub fn request_fat_group(
        &mut self,
        members: &[QualifiedId],
        nested: &[QualifiedId],
        context: &str,
    ) -> Option<QualifiedId> {
        self.request_group_inner(members, nested, context)
    }

    fn request_group_inner(
        &mut self,
        members: &[QualifiedId],
        nested: &[QualifiedId],
        context: &str,
    ) -> Option<QualifiedId> {
        let signature: BTreeSet<LocalId> = members
            .iter()
            .chain(nested.iter())
            .map(|id| id.local.clone())
            .collect();
        if let Some(existing) = self.index.find_group(&signature) {
            debug!(%existing, context, "group already annotated");
            self.report.auto_relations.push(format!(
                "auto group for {context}: {existing} covers {} members",
                signature.len()
            ));
            return Some(existing);
        }
        match boundary::place_all(members.iter().chain(nested.iter()))? {
            Placement::Crossing { from, to } => {
                let all: Vec<QualifiedId> = members.iter().chain(nested.iter()).cloned().collect();
                self.report
                    .implicit_relations
                    .extend(boundary::implicit_group_lines(&from, &to, &all, context));
                None
            }
            Placement::Within(partition) => {
                let (local, stamp) = self.ids.mint();
                let qualified = QualifiedId::new(partition.clone(), local.clone());
                let group = Group {
                    id: local,
                    members: members.to_vec(),
                    nested: nested.to_vec(),
                    provenance: Provenance::new(self.ids.author(), stamp),
                };
                self.index.insert_group(signature, qualified.clone());
                self.outbox.entry(partition).or_default().groups.push(group);
                self.report.groups_created += 1;
                Some(qualified)
            }
        }
    }

    /// Relations buffered and not yet drained into the store.
    pub fn pending_relations(&self) -> impl Iterator<Item = &Relation> {
        self.outbox.values().flat_map(|s| s.relations.iter())
    }

    /// Groups buffered and not yet drained into the store.
    pub fn pending_groups(&self) -> impl Iterator<Item = &Group> {
        self.outbox.values().flat_map(|s| s.groups.iter())
    }

    /// Drain buffered structures into the store and commit each touched
    /// partition.
    pub fn drain_into<S: AnnotationStore>(&mut self, store: &mut S) -> Result<(), StoreError> {
        for (partition, structures) in std::mem::take(&mut self.outbox) {
            for relation in structures.relations {
                store.append_relation(&partition, relation)?;
            }
            for group in structures.groups {
                store.append_group(&partition, group)?;
            }
            store.commit(&partition)?;
        }
        Ok(())
    }

    pub fn report(&self) -> &SessionReport {
        &self.report
    }

    pub fn into_report(self) -> SessionReport {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn qid(partition: &str, local: &str) -> QualifiedId {
        QualifiedId::new(PartitionId::new(partition), LocalId::new(local))
    }

    fn engine() -> EmissionEngine {
        EmissionEngine::new(DedupIndex::new(), IdFactory::new("stacnl", 0))
    }

    #[test]
    fn test_create_then_dedup_same_run() {
        let mut engine = engine();
        let a = qid("pilot02_01", "seg_1");
        let b = qid("pilot02_01", "seg_2");

        engine.request_relation(RelationKind::Sequence, &a, &b, "join and sit");
        assert_eq!(engine.report().relations_created, 1);

        // the second identical request must see the first one
        engine.request_relation(RelationKind::Sequence, &a, &b, "join and sit");
        assert_eq!(engine.report().relations_created, 1);
        assert_eq!(engine.report().auto_relations.len(), 1);
    }

    #[test]
    fn test_dedup_ignores_endpoint_order_within_kind() {
        let mut engine = engine();
        let a = qid("pilot02_01", "seg_1");
        let b = qid("pilot02_01", "seg_2");

        engine.request_relation(RelationKind::Result, &a, &b, "monopoly");
        engine.request_relation(RelationKind::Result, &b, &a, "monopoly");
        assert_eq!(engine.report().relations_created, 1);

        // a different kind over the same endpoints is a distinct relation
        engine.request_relation(RelationKind::Sequence, &a, &b, "road building");
        assert_eq!(engine.report().relations_created, 2);
    }

    #[test]
    fn test_cross_partition_relation_is_reported_not_created() {
        let mut engine = engine();
        let a = qid("pilot02_01", "seg_1");
        let b = qid("pilot02_02", "seg_2");

        engine.request_relation(RelationKind::Sequence, &a, &b, "join and sit");
        assert_eq!(engine.report().relations_created, 0);
        assert_eq!(engine.report().implicit_relations.len(), 2);
        assert!(engine.report().implicit_relations[0].contains("pilot02_01"));
        assert!(engine.report().implicit_relations[0].contains("pilot02_02"));
    }

    #[test]
    fn test_group_reuse_returns_existing_id() {
        let mut engine = engine();
        let members = [qid("pilot02_01", "seg_1"), qid("pilot02_01", "seg_2")];

        let first = engine.request_group(&members, "roll and distribution");
        let second = engine.request_group(&members, "roll and distribution");
        assert_eq!(first, second);
        assert_eq!(engine.report().groups_created, 1);
        assert_eq!(engine.report().auto_relations.len(), 1);
    }

    #[test]
    fn test_fat_group_signature_includes_nested() {
        let mut engine = engine();
        let members = [qid("pilot02_01", "seg_3"), qid("pilot02_01", "seg_4")];
        let nested = [qid("pilot02_01", "stacnl_99")];

        let fat = engine.request_fat_group(&members, &nested, "robber episode");
        assert!(fat.is_some());
        // the flat group over the same members is a different signature
        let flat = engine.request_group(&members, "robber episode");
        assert_ne!(fat, flat);
        assert_eq!(engine.report().groups_created, 2);
    }

    #[test]
    fn test_cross_partition_group_yields_no_id() {
        let mut engine = engine();
        let members = [qid("pilot02_01", "seg_1"), qid("pilot02_02", "seg_2")];

        let group = engine.request_group(&members, "trade offer");
        assert!(group.is_none());
        assert_eq!(engine.report().groups_created, 0);
        assert_eq!(engine.report().implicit_relations.len(), 2);
    }

    #[test]
    fn test_drain_appends_and_commits() {
        let mut engine = engine();
        let mut store = MemoryStore::new();
        store.insert_partition(PartitionId::new("pilot02_01"), Default::default());

        let a = qid("pilot02_01", "seg_1");
        let b = qid("pilot02_01", "seg_2");
        engine.request_relation(RelationKind::Sequence, &a, &b, "join and sit");
        engine.request_group(&[a, b], "roll and distribution");

        engine.drain_into(&mut store).unwrap();
        let data = store.partition(&PartitionId::new("pilot02_01")).unwrap();
        assert_eq!(data.relations.len(), 1);
        assert_eq!(data.groups.len(), 1);
        assert_eq!(store.commit_count(), 1);
        assert_eq!(engine.pending_relations().count(), 0);
    }

    #[test]
    fn test_index_absorbs_existing_structures() {
        let partition = PartitionId::new("pilot02_01");
        let a = qid("pilot02_01", "seg_1");
        let b = qid("pilot02_01", "seg_2");
        let existing = PartitionStructures {
            relations: vec![Relation {
                id: LocalId::new("stacnl_7"),
                kind: RelationKind::Sequence,
                source: a.clone(),
                target: b.clone(),
                provenance: Provenance::new("stacnl", 7),
            }],
            groups: vec![Group {
                id: LocalId::new("stacnl_8"),
                members: vec![a.clone(), b.clone()],
                nested: vec![],
                provenance: Provenance::new("stacnl", 8),
            }],
        };

        let mut index = DedupIndex::new();
        index.absorb(&partition, &existing);
        let mut engine = EmissionEngine::new(index, IdFactory::new("stacnl", 100));

        engine.request_relation(RelationKind::Sequence, &a, &b, "join and sit");
        let group = engine.request_group(&[a, b], "roll and distribution");
        assert_eq!(engine.report().relations_created, 0);
        assert_eq!(engine.report().groups_created, 0);
        assert_eq!(engine.report().auto_relations.len(), 2);
        assert_eq!(group, Some(qid("pilot02_01", "stacnl_8")));
    }
}
