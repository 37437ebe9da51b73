//! Partition boundary resolution for relation and group endpoints.
//!
//! The store can only hold a structure whose endpoints share one partition;
//! anything else is routed to a human-readable report for manual resolution.

use crate::annotation::{PartitionId, QualifiedId, RelationKind};

/// Where a requested structure can be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Every endpoint shares this partition; the structure can be stored.
    Within(PartitionId),
    /// Endpoints live on different partitions; the store cannot address the
    /// structure directly.
    Crossing {
        from: PartitionId,
        to: PartitionId,
    },
}

/// Resolve the placement of a two-endpoint link.
pub fn place(a: &QualifiedId, b: &QualifiedId) -> Placement {
    if a.partition == b.partition {
        Placement::Within(a.partition.clone())
    } else {
        Placement::Crossing {
            from: a.partition.clone(),
            to: b.partition.clone(),
        }
    }
}

/// Resolve the placement of a multi-member structure.
///
/// Returns `None` for an empty member list; otherwise `Within` when every id
/// shares one partition, or `Crossing` between the first two distinct
/// partitions seen.
pub fn place_all<'a>(ids: impl IntoIterator<Item = &'a QualifiedId>) -> Option<Placement> {
    let mut ids = ids.into_iter();
    let first = ids.next()?;
    for id in ids {
        if id.partition != first.partition {
            return Some(Placement::Crossing {
                from: first.partition.clone(),
                to: id.partition.clone(),
            });
        }
    }
    Some(Placement::Within(first.partition.clone()))
}

/// Report lines for a relation the store cannot address.
pub fn implicit_relation_lines(
    kind: RelationKind,
    a: &QualifiedId,
    b: &QualifiedId,
    context: &str,
) -> [String; 2] {
    [
        format!(
            "Implicit relation from partition {} to partition {} for {}:",
            a.partition, b.partition, context
        ),
        format!("{} ------ {} -----> {}", a, kind, b),
    ]
}

/// Report lines for a group whose members span partitions.
pub fn implicit_group_lines(
    from: &PartitionId,
    to: &PartitionId,
    members: &[QualifiedId],
    context: &str,
) -> [String; 2] {
    let listed = members
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    [
        format!(
            "Implicit group from partition {} to partition {} for {}:",
            from, to, context
        ),
        format!("[{listed}]"),
    ]
}
