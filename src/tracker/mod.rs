//! Per-session narrative memory: which threads are open, what closes them,
//! and which relation/group requests each event triggers.
//!
//! One tracker is constructed at session start, threaded by `&mut` through
//! the driver's sequential walk, and discarded at session end. Thread state
//! carries across partition boundaries within a session.

use crate::annotation::{QualifiedId, RelationKind};
use crate::catalog::{CardKind, EventKind, RollOutcome};
use crate::emit::EmissionEngine;
use thiserror::Error;
use tracing::debug;

mod threads;

pub use threads::{DiceThread, RobberThread, RoadThread, ThreadLabel, TradeThread};

/// Fatal tracker faults.
///
/// A re-entrancy violation means the transcript broke an assumption the
/// relation rules depend on; continuing would corrupt the graph, so the run
/// aborts naming the thread and the offending event.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("{thread} thread re-entered before it was closed (at event {event})")]
    ReentrantThread {
        thread: ThreadLabel,
        event: QualifiedId,
    },
}

/// Per-session narrative state.
#[derive(Debug, Default)]
pub struct NarrativeTracker {
    /// Player who joined and is expected to sit down next.
    join: Option<(String, QualifiedId)>,
    /// Most recent seat-taking event.
    sat: Option<(String, QualifiedId)>,
    /// Tail of the game-setup chain, while the chain is open.
    setup: Option<QualifiedId>,
    /// Turn-to-roll prompt awaiting its roll.
    roll_marker: Option<QualifiedId>,
    /// Whether the previous non-linguistic event was a turn-to-roll prompt.
    consecutive: bool,
    dice: DiceThread,
    /// Resource-state assertions awaiting the next distribution flush.
    resources: Vec<QualifiedId>,
    robber: RobberThread,
    /// Multi-discard round: the plural header first, then each discarder.
    discard: Vec<QualifiedId>,
    trade: TradeThread,
    /// Monopoly card play awaiting its resolution.
    monopoly: Option<QualifiedId>,
    road: RoadThread,
    /// Time warning awaiting an extension.
    time: Option<QualifiedId>,
}

impl NarrativeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the trade thread holds at least one pending element. Feeds
    /// the catalog's continuation disambiguation.
    pub fn trade_pending(&self) -> bool {
        self.trade.is_pending()
    }

    /// Feed one classified event through the thread transitions.
    ///
    /// Transitions run in the same fixed priority order as the pattern
    /// catalog; each event is consumed by exactly one transition.
    pub fn observe(
        &mut self,
        id: &QualifiedId,
        kind: &EventKind,
        emit: &mut EmissionEngine,
    ) -> Result<(), TrackerError> {
        let was_consecutive = self.consecutive;
        self.consecutive = false;

        match kind {
            EventKind::Join { actor } => {
                self.join = Some((actor.clone(), id.clone()));
            }
            EventKind::SatDown { actor, .. } => self.on_sat_down(actor, id, emit),
            EventKind::GameStateZero => {
                if let Some((_, sat)) = &self.sat {
                    emit.request_relation(RelationKind::Result, sat, id, "seat and game state");
                }
            }
            EventKind::GameStarted => {
                self.setup = Some(id.clone());
            }
            EventKind::TurnToRoll { .. } => {
                // the setup chain ends here; the roll prompt itself is not
                // chained in
                self.setup = None;
                self.roll_marker = Some(id.clone());
                self.consecutive = true;
            }
            _ => {
                if let Some(previous) = self.setup.take() {
                    // while setup is open, every other event extends the chain
                    emit.request_relation(RelationKind::Result, &previous, id, "game setup chain");
                    self.setup = Some(id.clone());
                } else {
                    self.observe_turn_event(id, kind, was_consecutive, emit)?;
                }
            }
        }
        Ok(())
    }

    /// Flush accumulators that are still open once the session's last
    /// partition has been walked.
    pub fn finish(&mut self, emit: &mut EmissionEngine) {
        self.flush_distribution(emit);
    }

    fn observe_turn_event(
        &mut self,
        id: &QualifiedId,
        kind: &EventKind,
        was_consecutive: bool,
        emit: &mut EmissionEngine,
    ) -> Result<(), TrackerError> {
        match kind {
            EventKind::PlayedCard { card, .. } => {
                self.on_played_card(card, id, was_consecutive, emit)?;
            }
            EventKind::MonopolyResolved { .. } => {
                if let Some(marker) = self.monopoly.take() {
                    emit.request_relation(RelationKind::Result, &marker, id, "monopoly");
                }
            }
            EventKind::DiceRoll { outcome, .. } => {
                if let Some(marker) = self.roll_marker.take() {
                    emit.request_relation(RelationKind::Result, &marker, id, "turn and roll");
                }
                match outcome {
                    RollOutcome::Yield => {
                        self.flush_distribution(emit);
                        self.dice = DiceThread::Collecting {
                            roll: id.clone(),
                            gets: Vec::new(),
                        };
                    }
                    RollOutcome::RobberTrigger => {
                        if self.robber.is_active() {
                            return Err(TrackerError::ReentrantThread {
                                thread: ThreadLabel::Robber,
                                event: id.clone(),
                            });
                        }
                        self.robber = RobberThread::Collecting(vec![id.clone()]);
                    }
                }
            }
            EventKind::ResourceGet { .. } | EventKind::NoResourceGet => match &mut self.dice {
                DiceThread::Collecting { gets, .. } => gets.push(id.clone()),
                DiceThread::Idle => debug!(%id, "yield event outside an open roll; ignored"),
            },
            EventKind::ResourceStateAssertion { .. } => self.resources.push(id.clone()),
            EventKind::DiscardNeeded { several: true, .. } => self.discard.push(id.clone()),
            EventKind::DiscardNeeded { several: false, .. } | EventKind::DiscardDone { .. } => {
                if self.discard.is_empty() {
                    self.robber_accumulate(id);
                } else {
                    self.discard.push(id.clone());
                }
            }
            EventKind::RobberWillMove { .. } | EventKind::RobberMustChooseVictim { .. } => {
                self.robber_accumulate(id);
            }
            EventKind::RobberMoved { .. } | EventKind::ResourceStolen { .. } => {
                self.close_robber(id, emit);
            }
            EventKind::TradeOffer { .. } => {
                // a fresh offer always restarts the thread
                self.trade = TradeThread::Pending(vec![id.clone()]);
            }
            EventKind::TradeContinuation { peer } => self.on_trade_continuation(peer, id, emit),
            EventKind::TradeAccepted { .. } => self.close_trade(id, "trade accept", true, emit),
            EventKind::TradeRejected { .. } => self.close_trade(id, "trade reject", true, emit),
            EventKind::TradeBlocked => self.close_trade(id, "blocked trade", false, emit),
            EventKind::RoadBuilt { .. } => self.on_road_built(id, emit),
            EventKind::TimeWarning => {
                self.time = Some(id.clone());
            }
            EventKind::TimeExtended => {
                if let Some(warning) = self.time.take() {
                    emit.request_relation(RelationKind::Result, &warning, id, "time extension");
                }
            }
            EventKind::Unclassified => {}
            // handled before the setup gate
            EventKind::Join { .. }
            | EventKind::SatDown { .. }
            | EventKind::GameStateZero
            | EventKind::GameStarted
            | EventKind::TurnToRoll { .. } => {}
        }
        Ok(())
    }

    fn on_sat_down(&mut self, actor: &str, id: &QualifiedId, emit: &mut EmissionEngine) {
        let joined = self.join.take();
        self.sat = Some((actor.to_string(), id.clone()));
        if let Some((join_actor, join_id)) = joined {
            // no other non-linguistic event can occur between a join and the
            // matching sit, so no consecutive check is needed
            if join_actor == actor {
                emit.request_relation(RelationKind::Sequence, &join_id, id, "join and sit");
            }
        }
    }

    fn on_played_card(
        &mut self,
        card: &CardKind,
        id: &QualifiedId,
        was_consecutive: bool,
        emit: &mut EmissionEngine,
    ) -> Result<(), TrackerError> {
        if was_consecutive {
            if let Some(roll) = &self.roll_marker {
                emit.request_relation(RelationKind::Sequence, roll, id, "turn and card play");
            }
        }
        match card {
            CardKind::Soldier => {
                if self.robber.is_active() {
                    return Err(TrackerError::ReentrantThread {
                        thread: ThreadLabel::Robber,
                        event: id.clone(),
                    });
                }
                self.robber = RobberThread::Collecting(vec![id.clone()]);
            }
            CardKind::Monopoly => {
                if self.monopoly.is_some() {
                    return Err(TrackerError::ReentrantThread {
                        thread: ThreadLabel::Monopoly,
                        event: id.clone(),
                    });
                }
                self.monopoly = Some(id.clone());
            }
            CardKind::RoadBuilding => {
                if self.road != RoadThread::Idle {
                    return Err(TrackerError::ReentrantThread {
                        thread: ThreadLabel::Road,
                        event: id.clone(),
                    });
                }
                self.road = RoadThread::Armed { card: id.clone() };
            }
            CardKind::Other(_) => {}
        }
        Ok(())
    }

    fn robber_accumulate(&mut self, id: &QualifiedId) {
        match &mut self.robber {
            RobberThread::Collecting(events) => events.push(id.clone()),
            RobberThread::Idle => debug!(%id, "robber event outside an open episode; ignored"),
        }
    }

    fn close_robber(&mut self, id: &QualifiedId, emit: &mut EmissionEngine) {
        let mut episode = match std::mem::take(&mut self.robber) {
            RobberThread::Collecting(events) => events,
            RobberThread::Idle => {
                debug!(%id, "robber closure without an open episode; ignored");
                return;
            }
        };
        episode.push(id.clone());
        let context = "robber episode";
        let trigger = &episode[0];
        let interior = &episode[1..];

        let discard_group = if self.discard.len() > 1 {
            let round = std::mem::take(&mut self.discard);
            let header = &round[0];
            let discarders = &round[1..];
            let group = emit.request_group(discarders, "discard round");
            if let Some(group) = &group {
                emit.request_relation(RelationKind::Result, header, group, "discard round");
            }
            for pair in discarders.windows(2) {
                emit.request_relation(RelationKind::Sequence, &pair[0], &pair[1], "discard round");
            }
            group
        } else {
            None
        };

        let episode_group = match &discard_group {
            Some(discard_group) => {
                if let Some(first_interior) = interior.first() {
                    emit.request_relation(RelationKind::Result, discard_group, first_interior, context);
                }
                emit.request_fat_group(interior, std::slice::from_ref(discard_group), context)
            }
            None => emit.request_group(interior, context),
        };
        if let Some(episode_group) = &episode_group {
            emit.request_relation(RelationKind::Result, trigger, episode_group, context);
        }
        for pair in interior.windows(2) {
            emit.request_relation(RelationKind::Result, &pair[0], &pair[1], context);
        }
    }

    fn on_trade_continuation(
        &mut self,
        peer: &Option<String>,
        id: &QualifiedId,
        emit: &mut EmissionEngine,
    ) {
        let mut queue = match std::mem::take(&mut self.trade) {
            TradeThread::Pending(queue) => queue,
            TradeThread::Idle => {
                // the catalog only emits continuations while an offer is
                // pending, so this is a driver misuse rather than data
                debug!(%id, "trade continuation with no pending offer; ignored");
                return;
            }
        };
        if peer.is_some() && queue.len() >= 2 {
            let context = "trade offer";
            emit.request_relation(RelationKind::Elaboration, &queue[0], &queue[1], context);
            emit.request_relation(RelationKind::Continuation, &queue[1], id, context);
            queue.push(id.clone());
            match emit.request_group(&queue, context) {
                // the group stands in for the whole offer from here on
                Some(group) => self.trade = TradeThread::Pending(vec![group]),
                None => self.trade = TradeThread::Pending(queue),
            }
        } else {
            queue.push(id.clone());
            self.trade = TradeThread::Pending(queue);
        }
    }

    fn close_trade(
        &mut self,
        id: &QualifiedId,
        context: &str,
        clears: bool,
        emit: &mut EmissionEngine,
    ) {
        match &self.trade {
            TradeThread::Pending(queue) => {
                if let Some(head) = queue.first() {
                    emit.request_relation(RelationKind::QuestionAnswerPair, head, id, context);
                }
                if clears {
                    self.trade = TradeThread::Idle;
                }
                // a blocked trade keeps the offer live: acceptance can still
                // follow once the blocking condition clears
            }
            TradeThread::Idle => {
                debug!(%id, context, "trade closure with no pending offer; ignored");
            }
        }
    }

    fn on_road_built(&mut self, id: &QualifiedId, emit: &mut EmissionEngine) {
        match std::mem::take(&mut self.road) {
            // an ordinary build, not part of a card play
            RoadThread::Idle => {}
            RoadThread::Armed { card } => {
                self.road = RoadThread::OneBuilt {
                    card,
                    first: id.clone(),
                };
            }
            RoadThread::OneBuilt { card, first } => {
                let context = "road building";
                let builds = [first.clone(), id.clone()];
                if let Some(group) = emit.request_group(&builds, context) {
                    emit.request_relation(RelationKind::Result, &card, &group, context);
                }
                emit.request_relation(RelationKind::Sequence, &first, id, context);
            }
        }
    }

    /// Close out the distribution accumulator and the resource tally that
    /// rides along with it.
    fn flush_distribution(&mut self, emit: &mut EmissionEngine) {
        let context = "roll and distribution";
        let endpoint = match std::mem::take(&mut self.dice) {
            DiceThread::Idle => None,
            DiceThread::Collecting { roll, gets } => match gets.len() {
                0 => {
                    debug!(%roll, "roll closed with no yield events");
                    None
                }
                1 => {
                    emit.request_relation(RelationKind::Result, &roll, &gets[0], context);
                    Some(gets[0].clone())
                }
                _ => {
                    let group = emit.request_group(&gets, context);
                    if let Some(group) = &group {
                        emit.request_relation(RelationKind::Result, &roll, group, context);
                    }
                    for pair in gets.windows(2) {
                        emit.request_relation(
                            RelationKind::Continuation,
                            &pair[0],
                            &pair[1],
                            context,
                        );
                    }
                    group
                }
            },
        };

        if !self.resources.is_empty() {
            let context = "resource tally";
            let tally = std::mem::take(&mut self.resources);
            let group = emit.request_group(&tally, context);
            for pair in tally.windows(2) {
                emit.request_relation(RelationKind::Continuation, &pair[0], &pair[1], context);
            }
            if let (Some(endpoint), Some(group)) = (&endpoint, &group) {
                emit.request_relation(RelationKind::Result, endpoint, group, context);
            }
        }
    }
}
