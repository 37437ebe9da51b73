//! Deterministic fixtures for engine tests: build a session store from raw
//! message lists.

use crate::annotation::{Event, LocalId, PartitionId, Provenance, QualifiedId};
use crate::store::{MemoryStore, PartitionData, UnitAnnotation, UnitKind};

/// Builds a [`MemoryStore`] session from raw message lists.
///
/// Messages are laid out one per line; each becomes both a discourse event
/// and an unenriched segment unit with matching span and id. Segment ids are
/// unique across the whole session, the way real store ids are.
pub struct SessionBuilder {
    game: String,
    partitions: Vec<Vec<String>>,
}

impl SessionBuilder {
    pub fn new(game: impl Into<String>) -> Self {
        Self {
            game: game.into(),
            partitions: Vec::new(),
        }
    }

    /// Append a partition holding the given messages, in textual order.
    pub fn partition(mut self, messages: &[&str]) -> Self {
        self.partitions
            .push(messages.iter().map(|m| m.to_string()).collect());
        self
    }

    pub fn build(self) -> MemoryStore {
        let mut store = MemoryStore::new();
        let mut segment = 0;
        for (index, messages) in self.partitions.iter().enumerate() {
            let partition = PartitionId::new(format!("{}_{:02}", self.game, index + 1));
            let mut data = PartitionData::default();
            let mut offset = 0;
            for message in messages {
                segment += 1;
                let start = offset;
                let end = start + message.len();
                offset = end + 1;
                data.text.push_str(message);
                data.text.push('\n');

                let local = LocalId::new(format!("seg_{segment}"));
                data.events.push(Event {
                    id: QualifiedId::new(partition.clone(), local.clone()),
                    start,
                    end,
                    text: message.clone(),
                });
                data.units.push(UnitAnnotation {
                    id: local,
                    kind: UnitKind::Segment,
                    features: Vec::new(),
                    start,
                    end,
                    provenance: Provenance::new("transcriber", 0),
                });
            }
            store.insert_partition(partition, data);
        }
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AnnotationStore;

    #[test]
    fn test_builder_lays_out_offsets() {
        let store = SessionBuilder::new("pilot02")
            .partition(&["Alice joined the game.", "Alice sat down at seat 0."])
            .build();
        let partition = PartitionId::new("pilot02_01");
        let events = store.read_events(&partition).expect("events");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].start, 0);
        assert_eq!(events[0].end, 22);
        assert_eq!(events[1].start, 23);
        assert_eq!(
            store
                .resolve_text(&partition, events[1].start, events[1].end)
                .unwrap(),
            "Alice sat down at seat 0."
        );
    }

    #[test]
    fn test_builder_ids_are_session_unique() {
        let store = SessionBuilder::new("pilot02")
            .partition(&["Alice joined the game."])
            .partition(&["Alice sat down at seat 0."])
            .build();
        let first = store
            .read_events(&PartitionId::new("pilot02_01"))
            .unwrap();
        let second = store
            .read_events(&PartitionId::new("pilot02_02"))
            .unwrap();
        assert_eq!(first[0].local().as_str(), "seg_1");
        assert_eq!(second[0].local().as_str(), "seg_2");
    }
}
