//! Event pattern catalog: ordered, first-match-wins classification of raw
//! engine messages into semantic event kinds.
//!
//! The catalog is an explicit list of (name, anchored pattern, extractor)
//! entries evaluated in one deterministic pass, so precedence is auditable
//! independently of the state machine that consumes the results. Two
//! patterns matching one literal ambiguously is a catalog defect, not a
//! runtime fault.

use regex::{Captures, Regex};
use std::fmt;

/// The five tradable resource kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Clay,
    Ore,
    Sheep,
    Wheat,
    Wood,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Clay => "clay",
            ResourceKind::Ore => "ore",
            ResourceKind::Sheep => "sheep",
            ResourceKind::Wheat => "wheat",
            ResourceKind::Wood => "wood",
        }
    }

    fn parse(name: &str) -> Option<ResourceKind> {
        match name {
            "clay" => Some(ResourceKind::Clay),
            "ore" => Some(ResourceKind::Ore),
            "sheep" => Some(ResourceKind::Sheep),
            "wheat" => Some(ResourceKind::Wheat),
            "wood" => Some(ResourceKind::Wood),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quantity of one resource kind, as captured from a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceGain {
    pub quantity: u32,
    pub kind: ResourceKind,
}

/// Development card kinds recognized in "played a ... card" messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardKind {
    Soldier,
    Monopoly,
    RoadBuilding,
    Other(String),
}

impl CardKind {
    fn parse(name: &str) -> CardKind {
        match name {
            "Soldier" => CardKind::Soldier,
            "Monopoly" => CardKind::Monopoly,
            "Road Building" => CardKind::RoadBuilding,
            other => CardKind::Other(other.to_string()),
        }
    }
}

/// Outcome class of a dice roll: a sum of 7 hands control to the robber and
/// never yields resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollOutcome {
    Yield,
    RobberTrigger,
}

/// Trade counterparty class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradePartner {
    Peer,
    Bank,
}

/// Board piece kinds in "built a ..." messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece {
    Road,
    Settlement,
}

/// Semantic tag for one classified event, with captured fields.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Join { actor: String },
    SatDown { actor: String, seat: u32 },
    GameStateZero,
    GameStarted,
    TurnToRoll { actor: String },
    DiceRoll { actor: String, outcome: RollOutcome },
    ResourceGet { actor: String, gains: Vec<ResourceGain> },
    NoResourceGet,
    ResourceStateAssertion { actor: String },
    PlayedCard { actor: String, card: CardKind },
    DiscardNeeded { actors: String, several: bool },
    DiscardDone { actor: String, count: u32 },
    RobberWillMove { actor: String },
    RobberMustChooseVictim { actor: String },
    RobberMoved { actor: String },
    ResourceStolen { thief: String, victim: String },
    TradeOffer { actor: String, partner: TradePartner },
    TradeContinuation { peer: Option<String> },
    TradeAccepted { actor: String, partner: String },
    TradeRejected { actor: String },
    TradeBlocked,
    MonopolyResolved { actor: String, resource: ResourceKind },
    RoadBuilt { actor: String, piece: Piece },
    TimeWarning,
    TimeExtended,
    Unclassified,
}

/// Context bits the catalog needs to disambiguate otherwise-ambiguous lines.
///
/// A bare `...` or `from <peer>` line is a trade continuation only while the
/// trade thread already holds a pending element; otherwise it is an
/// unrelated trailing clause and falls through to `Unclassified`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassifyContext {
    /// Whether the trade thread currently holds at least one pending element.
    pub trade_pending: bool,
}

type Extractor = fn(&Captures<'_>, ClassifyContext) -> Option<EventKind>;

struct Rule {
    name: &'static str,
    pattern: Regex,
    extract: Extractor,
}

/// Ordered, first-match-wins catalog of event patterns.
pub struct Catalog {
    rules: Vec<Rule>,
}

/// A "<qty> <kind>" list, e.g. `1 ore` or `2 clay, 1 wheat`.
const RESOURCE_LIST: &str =
    r"\d+ (?:clay|ore|sheep|wheat|wood)(?:, \d+ (?:clay|ore|sheep|wheat|wood))*";

fn rule(name: &'static str, pattern: &str, extract: Extractor) -> Rule {
    // pattern literals are compile-time fixtures; failure here is a catalog
    // defect, not a runtime fault
    Rule {
        name,
        pattern: Regex::new(pattern).expect("catalog pattern"),
        extract,
    }
}

fn actor(caps: &Captures<'_>) -> String {
    caps["actor"].to_string()
}

impl Catalog {
    /// The standard catalog for the game's engine messages.
    ///
    /// Order matters: more specific forms precede the general ones they
    /// overlap with (bank offer before peer offer, must-choose-victim before
    /// robber-moved, plural discard before singular).
    pub fn standard() -> Self {
        let rules = vec![
            rule(
                "join",
                r"^(?P<actor>.+) joined the game\.$",
                |caps, _| Some(EventKind::Join { actor: actor(caps) }),
            ),
            rule(
                "sat_down",
                r"^(?P<actor>.+) sat down at seat (?P<seat>\d)\.$",
                |caps, _| {
                    Some(EventKind::SatDown {
                        actor: actor(caps),
                        seat: caps["seat"].parse().ok()?,
                    })
                },
            ),
            rule("game_state_zero", r"^Game state 0\.$", |_, _| {
                Some(EventKind::GameStateZero)
            }),
            rule("game_started", r"^Game started\.$", |_, _| {
                Some(EventKind::GameStarted)
            }),
            rule(
                "turn_to_roll",
                r"^It's (?P<actor>.+)'s turn to roll the dice\.$",
                |caps, _| Some(EventKind::TurnToRoll { actor: actor(caps) }),
            ),
            rule(
                "played_card",
                r"^(?P<actor>.+) played a (?P<card>.{1,20}?) card\.$",
                |caps, _| {
                    Some(EventKind::PlayedCard {
                        actor: actor(caps),
                        card: CardKind::parse(&caps["card"]),
                    })
                },
            ),
            rule(
                "monopoly_resolved",
                r"^(?P<actor>.+) monopolized (?P<resource>clay|ore|sheep|wheat|wood)\.$",
                |caps, _| {
                    Some(EventKind::MonopolyResolved {
                        actor: actor(caps),
                        resource: ResourceKind::parse(&caps["resource"])?,
                    })
                },
            ),
            rule(
                "dice_roll",
                r"^(?P<actor>.+) rolled a (?P<first>\d) and a (?P<second>\d)\.$",
                |caps, _| {
                    let first: u32 = caps["first"].parse().ok()?;
                    let second: u32 = caps["second"].parse().ok()?;
                    let outcome = if first + second == 7 {
                        RollOutcome::RobberTrigger
                    } else {
                        RollOutcome::Yield
                    };
                    Some(EventKind::DiceRoll {
                        actor: actor(caps),
                        outcome,
                    })
                },
            ),
            rule(
                // one roll yields at most two distinct resource kinds
                "resource_get",
                r"^(?P<actor>.+) gets (?P<q1>\d+) (?P<r1>clay|ore|sheep|wheat|wood)(?:, (?P<q2>\d+) (?P<r2>clay|ore|sheep|wheat|wood))?\.$",
                |caps, _| {
                    let mut gains = vec![ResourceGain {
                        quantity: caps["q1"].parse().ok()?,
                        kind: ResourceKind::parse(&caps["r1"])?,
                    }];
                    if let (Some(q2), Some(r2)) = (caps.name("q2"), caps.name("r2")) {
                        gains.push(ResourceGain {
                            quantity: q2.as_str().parse().ok()?,
                            kind: ResourceKind::parse(r2.as_str())?,
                        });
                    }
                    Some(EventKind::ResourceGet {
                        actor: actor(caps),
                        gains,
                    })
                },
            ),
            rule(
                "no_resource_get",
                r"^No player gets anything\.$",
                |_, _| Some(EventKind::NoResourceGet),
            ),
            rule(
                "resource_state",
                r"^(?P<actor>.+) has (?P<count>\d+) resources?\.$",
                |caps, _| {
                    Some(EventKind::ResourceStateAssertion { actor: actor(caps) })
                },
            ),
            rule(
                // plural subject list; the literal-prefix split against the
                // singular form below is a documented edge case
                "discard_needed_several",
                r"^(?P<actor>.+) need to discard\.$",
                |caps, _| {
                    Some(EventKind::DiscardNeeded {
                        actors: actor(caps),
                        several: true,
                    })
                },
            ),
            rule(
                "discard_needed",
                r"^(?P<actor>.+) needs to discard\.$",
                |caps, _| {
                    Some(EventKind::DiscardNeeded {
                        actors: actor(caps),
                        several: false,
                    })
                },
            ),
            rule(
                "discard_done",
                r"^(?P<actor>.+) discarded (?P<count>\d+) resources\.$",
                |caps, _| {
                    Some(EventKind::DiscardDone {
                        actor: actor(caps),
                        count: caps["count"].parse().ok()?,
                    })
                },
            ),
            rule(
                "robber_will_move",
                r"^(?P<actor>.+) will move the robber\.$",
                |caps, _| Some(EventKind::RobberWillMove { actor: actor(caps) }),
            ),
            rule(
                "robber_must_choose",
                r"^(?P<actor>.+) moved the robber, must choose a victim\.$",
                |caps, _| Some(EventKind::RobberMustChooseVictim { actor: actor(caps) }),
            ),
            rule(
                "robber_moved",
                r"^(?P<actor>.+) moved the robber\.$",
                |caps, _| Some(EventKind::RobberMoved { actor: actor(caps) }),
            ),
            rule(
                "resource_stolen",
                r"^(?P<actor>.+) stole a resource from (?P<victim>.+?)\.?$",
                |caps, _| {
                    Some(EventKind::ResourceStolen {
                        thief: actor(caps),
                        victim: caps["victim"].to_string(),
                    })
                },
            ),
            rule(
                "trade_bank_offer",
                &format!(
                    r"^(?P<actor>.+) made an offer to trade (?P<give>{RESOURCE_LIST})? for (?P<take>{RESOURCE_LIST})? from the bank or a port\.$"
                ),
                |caps, _| {
                    Some(EventKind::TradeOffer {
                        actor: actor(caps),
                        partner: TradePartner::Bank,
                    })
                },
            ),
            rule(
                "trade_offer",
                &format!(
                    r"^(?P<actor>.+) made an offer to trade (?P<give>{RESOURCE_LIST})? for (?P<take>{RESOURCE_LIST})?\.$"
                ),
                |caps, _| {
                    Some(EventKind::TradeOffer {
                        actor: actor(caps),
                        partner: TradePartner::Peer,
                    })
                },
            ),
            rule("trade_ellipsis", r"^\.\.\.$", |_, ctx| {
                if ctx.trade_pending {
                    Some(EventKind::TradeContinuation { peer: None })
                } else {
                    None
                }
            }),
            rule(
                "trade_from",
                r"^from (?P<peer>.+?)\.?$",
                |caps, ctx| {
                    if ctx.trade_pending {
                        Some(EventKind::TradeContinuation {
                            peer: Some(caps["peer"].to_string()),
                        })
                    } else {
                        None
                    }
                },
            ),
            rule(
                "trade_blocked",
                r"^You can't make that trade\.$",
                |_, _| Some(EventKind::TradeBlocked),
            ),
            rule(
                "trade_accepted",
                &format!(
                    r"^(?P<actor>.+) traded (?P<give>{RESOURCE_LIST})? for (?P<take>{RESOURCE_LIST})? from (?P<partner>.+)\.$"
                ),
                |caps, _| {
                    Some(EventKind::TradeAccepted {
                        actor: actor(caps),
                        partner: caps["partner"].to_string(),
                    })
                },
            ),
            rule(
                "trade_rejected",
                r"^(?P<actor>.+) rejected trade offer\.$",
                |caps, _| Some(EventKind::TradeRejected { actor: actor(caps) }),
            ),
            rule(
                "road_built",
                r"^(?P<actor>.+) built a (?P<piece>road|settlement)\.$",
                |caps, _| {
                    let piece = match &caps["piece"] {
                        "road" => Piece::Road,
                        _ => Piece::Settlement,
                    };
                    Some(EventKind::RoadBuilt {
                        actor: actor(caps),
                        piece,
                    })
                },
            ),
            rule(
                "time_warning",
                r"^.*Less than .+ minutes remaining\.$",
                |_, _| Some(EventKind::TimeWarning),
            ),
            rule(
                "time_extended",
                r"^.*Type \*ADDTIME\* to extend this game .+\.$",
                |_, _| Some(EventKind::TimeExtended),
            ),
        ];
        Self { rules }
    }

    /// Classify one raw message. Pure function of its inputs; falls through
    /// to [`EventKind::Unclassified`] when no rule applies.
    pub fn classify(&self, text: &str, ctx: ClassifyContext) -> EventKind {
        let text = text.trim();
        for rule in &self.rules {
            if let Some(caps) = rule.pattern.captures(text) {
                if let Some(kind) = (rule.extract)(&caps, ctx) {
                    return kind;
                }
                // a gated rule declined; keep scanning
            }
        }
        EventKind::Unclassified
    }

    /// Names of the rules, in evaluation order.
    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name).collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}
