//! Unit-level enrichment: types, surface acts, addressees and resource
//! sub-annotations for non-linguistic segments.
//!
//! Runs per partition before the discourse pass. Only unenriched segments
//! are touched, so re-running the pass is a no-op.

use crate::annotation::{IdFactory, LocalId, PartitionId, Provenance};
use crate::store::{AnnotationStore, Feature, StoreError, UnitAnnotation, UnitKind};
use lazy_static::lazy_static;
use regex::{Match, Regex};
use tracing::debug;

const SURFACE_ACT: &str = "Surface_act";
const ADDRESSEE: &str = "Addressee";

/// A "<qty> <kind>" list, e.g. `1 ore` or `2 clay, 1 wheat`.
const RESOURCE_LIST: &str =
    r"\d+ (?:clay|ore|sheep|wheat|wood)(?:, \d+ (?:clay|ore|sheep|wheat|wood))*";

lazy_static! {
    // pattern literals are compile-time fixtures; failure here is a defect
    static ref OFFER: Regex = Regex::new(&format!(
        r"^(?P<actor>.+) made an offer to trade (?P<give>{RESOURCE_LIST})? for (?P<take>{RESOURCE_LIST})?(?P<bank> from the bank or a port)?\.$"
    ))
    .expect("unit pattern");
    static ref TRADE_DONE: Regex = Regex::new(&format!(
        r"^(?P<actor>.+) traded (?P<give>{RESOURCE_LIST})? for (?P<take>{RESOURCE_LIST})? from (?P<partner>.+)\.$"
    ))
    .expect("unit pattern");
    static ref REJECT: Regex =
        Regex::new(r"^(?P<actor>.+) rejected trade offer\.$").expect("unit pattern");
    static ref GETS: Regex =
        Regex::new(&format!(r"^(?P<actor>.+) gets (?P<gains>{RESOURCE_LIST})\.$"))
            .expect("unit pattern");
    static ref MONOPOLY: Regex =
        Regex::new(r"^(?P<actor>.+) monopolized (?P<resource>clay|ore|sheep|wheat|wood)\.$")
            .expect("unit pattern");
    static ref FROM_LINE: Regex = Regex::new(r"^from (?P<peer>.+?)\.?$").expect("unit pattern");
}

const BLOCKED: &str = "You can't make that trade.";

/// Per-partition trade memory for addressee resolution.
#[derive(Debug, Default)]
struct TradeMemory {
    /// Most recent offering player; addressee for rejections and blocks.
    trader: Option<String>,
    /// Unit id of the last peer offer, awaiting a possible `... from <peer>`
    /// pair.
    last_offer: Option<LocalId>,
    ellipsis_pending: bool,
    /// Offer units whose addressee is resolved by a later `from` line.
    patches: Vec<(LocalId, String)>,
}

/// Counters from one partition's enrichment pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitsStats {
    /// Segment units retyped.
    pub retyped: usize,
    /// Resource sub-annotations added.
    pub resources_marked: usize,
}

/// Enrich every unenriched segment unit of one partition.
pub fn annotate_partition<S: AnnotationStore>(
    store: &mut S,
    partition: &PartitionId,
    ids: &mut IdFactory,
) -> Result<UnitsStats, StoreError> {
    let mut stats = UnitsStats::default();
    let mut memory = TradeMemory::default();
    let mut resources: Vec<UnitAnnotation> = Vec::new();
    let mut enriched: Vec<UnitAnnotation> = Vec::new();

    let mut units = store.read_units(partition)?;
    units.sort_by_key(|u| u.start);

    for unit in units {
        if unit.kind != UnitKind::Segment {
            continue;
        }
        let text = store.resolve_text(partition, unit.start, unit.end)?;
        let mut unit = unit;
        enrich(&mut unit, &text, &mut memory, &mut resources, ids);
        enriched.push(unit);
    }

    // a later `... from <peer>` pair resolves an earlier offer's addressee
    for (target, peer) in memory.patches.drain(..) {
        if let Some(unit) = enriched.iter_mut().find(|u| u.id == target) {
            unit.set_feature(ADDRESSEE, peer);
        }
    }

    for unit in enriched {
        stats.retyped += 1;
        store.update_unit(partition, unit)?;
    }
    for resource in resources {
        stats.resources_marked += 1;
        store.append_unit(partition, resource)?;
    }
    debug!(%partition, stats.retyped, stats.resources_marked, "units pass complete");
    Ok(stats)
}

fn enrich(
    unit: &mut UnitAnnotation,
    text: &str,
    memory: &mut TradeMemory,
    resources: &mut Vec<UnitAnnotation>,
    ids: &mut IdFactory,
) {
    if let Some(caps) = OFFER.captures(text) {
        unit.kind = UnitKind::Offer;
        unit.set_feature(SURFACE_ACT, "Assertion");
        unit.set_feature(ADDRESSEE, "?");
        mark_resources(caps.name("give"), "Givable", unit.start, resources, ids);
        mark_resources(caps.name("take"), "Receivable", unit.start, resources, ids);
        memory.trader = Some(caps["actor"].to_string());
        // only a peer offer can be narrowed by a later `from` line
        memory.last_offer = if caps.name("bank").is_none() {
            Some(unit.id.clone())
        } else {
            None
        };
        memory.ellipsis_pending = false;
        return;
    }

    if let Some(caps) = TRADE_DONE.captures(text) {
        unit.kind = UnitKind::Accept;
        unit.set_feature(SURFACE_ACT, "Assertion");
        let partner = &caps["partner"];
        if partner == "the bank" || partner == "a port" {
            unit.set_feature(ADDRESSEE, "All");
        } else {
            unit.set_feature(ADDRESSEE, partner);
        }
        mark_resources(caps.name("give"), "?", unit.start, resources, ids);
        mark_resources(caps.name("take"), "Possessed", unit.start, resources, ids);
        return;
    }

    if REJECT.is_match(text) {
        unit.kind = UnitKind::Refusal;
        unit.set_feature(SURFACE_ACT, "Assertion");
        unit.set_feature(ADDRESSEE, memory.trader.as_deref().unwrap_or("All"));
        return;
    }

    if text == BLOCKED {
        unit.kind = UnitKind::Other;
        unit.set_feature(SURFACE_ACT, "Assertion");
        unit.set_feature(ADDRESSEE, memory.trader.as_deref().unwrap_or("All"));
        return;
    }

    if let Some(caps) = GETS.captures(text) {
        unit.kind = UnitKind::Other;
        unit.set_feature(SURFACE_ACT, "Assertion");
        unit.set_feature(ADDRESSEE, "All");
        mark_resources(caps.name("gains"), "Possessed", unit.start, resources, ids);
        return;
    }

    if let Some(caps) = MONOPOLY.captures(text) {
        unit.kind = UnitKind::Other;
        unit.set_feature(SURFACE_ACT, "Assertion");
        unit.set_feature(ADDRESSEE, "All");
        if let Some(resource) = caps.name("resource") {
            let start = unit.start + resource.start();
            let end = unit.start + resource.end();
            resources.push(resource_unit(
                ids,
                "Possessed",
                "?",
                resource.as_str(),
                start,
                end,
            ));
        }
        return;
    }

    // everything else is a plain assertion to the table
    unit.kind = UnitKind::Other;
    unit.set_feature(SURFACE_ACT, "Assertion");
    unit.set_feature(ADDRESSEE, "All");

    if text == "..." {
        if memory.last_offer.is_some() {
            memory.ellipsis_pending = true;
        }
    } else if let Some(caps) = FROM_LINE.captures(text) {
        if memory.ellipsis_pending {
            if let Some(offer) = memory.last_offer.take() {
                memory.patches.push((offer, caps["peer"].to_string()));
            }
            memory.ellipsis_pending = false;
        }
    }
}

/// Add one `Resource` annotation per "<qty> <kind>" element of a captured
/// resource list, with exact spans inside the parent unit.
fn mark_resources(
    list: Option<Match<'_>>,
    status: &str,
    base: usize,
    out: &mut Vec<UnitAnnotation>,
    ids: &mut IdFactory,
) {
    let Some(list) = list else { return };
    let mut cursor = base + list.start();
    for element in list.as_str().split(", ") {
        let start = cursor;
        let end = start + element.len();
        cursor = end + 2; // ", "
        let (quantity, kind) = element.split_once(' ').unwrap_or((element, ""));
        out.push(resource_unit(ids, status, quantity, kind, start, end));
    }
}

fn resource_unit(
    ids: &mut IdFactory,
    status: &str,
    quantity: &str,
    kind: &str,
    start: usize,
    end: usize,
) -> UnitAnnotation {
    let (id, stamp) = ids.mint();
    UnitAnnotation {
        id,
        kind: UnitKind::Resource,
        features: vec![
            Feature::new("Status", status),
            Feature::new("Quantity", quantity),
            Feature::new("Correctness", "True"),
            Feature::new("Kind", kind),
        ],
        start,
        end,
        provenance: Provenance::new(ids.author(), stamp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::SessionBuilder;

    fn annotated(messages: &[&str]) -> (MemoryStore, PartitionId) {
        let mut store = SessionBuilder::new("pilot02").partition(messages).build();
        let partition = PartitionId::new("pilot02_01");
        let mut ids = IdFactory::new("stacnl", 0);
        annotate_partition(&mut store, &partition, &mut ids).expect("units pass");
        (store, partition)
    }

    fn resource_units(store: &MemoryStore, partition: &PartitionId) -> Vec<UnitAnnotation> {
        store
            .partition(partition)
            .expect("partition")
            .units
            .iter()
            .filter(|u| u.kind == UnitKind::Resource)
            .cloned()
            .collect()
    }

    #[test]
    fn test_offer_is_retyped_with_resource_spans() {
        let (store, partition) = annotated(&["Xan made an offer to trade 1 ore for 1 wheat."]);
        let data = store.partition(&partition).unwrap();
        let offer = &data.units[0];
        assert_eq!(offer.kind, UnitKind::Offer);
        assert_eq!(offer.feature(SURFACE_ACT), Some("Assertion"));
        assert_eq!(offer.feature(ADDRESSEE), Some("?"));

        let resources = resource_units(&store, &partition);
        assert_eq!(resources.len(), 2);
        let givable = &resources[0];
        assert_eq!(givable.feature("Status"), Some("Givable"));
        assert_eq!(givable.feature("Quantity"), Some("1"));
        assert_eq!(givable.feature("Kind"), Some("ore"));
        assert_eq!(
            store
                .resolve_text(&partition, givable.start, givable.end)
                .unwrap(),
            "1 ore"
        );
        let receivable = &resources[1];
        assert_eq!(receivable.feature("Status"), Some("Receivable"));
        assert_eq!(
            store
                .resolve_text(&partition, receivable.start, receivable.end)
                .unwrap(),
            "1 wheat"
        );
    }

    #[test]
    fn test_multi_resource_offer_spans() {
        let (store, partition) =
            annotated(&["Xan made an offer to trade 2 clay, 1 sheep for 1 wheat."]);
        let resources = resource_units(&store, &partition);
        assert_eq!(resources.len(), 3);
        let spans: Vec<String> = resources
            .iter()
            .map(|r| {
                store
                    .resolve_text(&partition, r.start, r.end)
                    .expect("span")
            })
            .collect();
        assert_eq!(spans, vec!["2 clay", "1 sheep", "1 wheat"]);
    }

    #[test]
    fn test_completed_trade_addressee() {
        let (store, partition) = annotated(&["Bob traded 1 wheat for 1 ore from Xan."]);
        let data = store.partition(&partition).unwrap();
        assert_eq!(data.units[0].kind, UnitKind::Accept);
        assert_eq!(data.units[0].feature(ADDRESSEE), Some("Xan"));

        let (store, partition) = annotated(&["Bob traded 1 wheat for 1 ore from the bank."]);
        let data = store.partition(&partition).unwrap();
        assert_eq!(data.units[0].feature(ADDRESSEE), Some("All"));
    }

    #[test]
    fn test_rejection_addresses_the_trader() {
        let (store, partition) = annotated(&[
            "Xan made an offer to trade 1 ore for 1 wheat.",
            "Bob rejected trade offer.",
        ]);
        let data = store.partition(&partition).unwrap();
        assert_eq!(data.units[1].kind, UnitKind::Refusal);
        assert_eq!(data.units[1].feature(ADDRESSEE), Some("Xan"));
    }

    #[test]
    fn test_rejection_without_trader_addresses_all() {
        let (store, partition) = annotated(&["Bob rejected trade offer."]);
        let data = store.partition(&partition).unwrap();
        assert_eq!(data.units[0].feature(ADDRESSEE), Some("All"));
    }

    #[test]
    fn test_gets_and_monopoly_mark_possessed_resources() {
        let (store, partition) = annotated(&["Bob gets 2 wood.", "Ed monopolized wheat."]);
        let resources = resource_units(&store, &partition);
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].feature("Status"), Some("Possessed"));
        assert_eq!(
            store
                .resolve_text(&partition, resources[0].start, resources[0].end)
                .unwrap(),
            "2 wood"
        );
        assert_eq!(resources[1].feature("Quantity"), Some("?"));
        assert_eq!(
            store
                .resolve_text(&partition, resources[1].start, resources[1].end)
                .unwrap(),
            "wheat"
        );
    }

    #[test]
    fn test_ellipsis_from_pair_backpatches_offer_addressee() {
        let (store, partition) = annotated(&[
            "Xan made an offer to trade 1 ore for 1 wheat.",
            "...",
            "from Bob.",
        ]);
        let data = store.partition(&partition).unwrap();
        assert_eq!(data.units[0].feature(ADDRESSEE), Some("Bob"));
        assert_eq!(data.units[1].kind, UnitKind::Other);
        assert_eq!(data.units[2].kind, UnitKind::Other);
    }

    #[test]
    fn test_from_line_without_ellipsis_does_not_backpatch() {
        let (store, partition) = annotated(&[
            "Xan made an offer to trade 1 ore for 1 wheat.",
            "from Bob.",
        ]);
        let data = store.partition(&partition).unwrap();
        assert_eq!(data.units[0].feature(ADDRESSEE), Some("?"));
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let (mut store, partition) = annotated(&["Xan made an offer to trade 1 ore for 1 wheat."]);
        let before = store.partition(&partition).unwrap().units.len();
        let mut ids = IdFactory::new("stacnl", 100);
        let stats = annotate_partition(&mut store, &partition, &mut ids).unwrap();
        assert_eq!(stats.retyped, 0);
        assert_eq!(stats.resources_marked, 0);
        assert_eq!(store.partition(&partition).unwrap().units.len(), before);
    }
}
