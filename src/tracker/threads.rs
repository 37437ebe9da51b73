//! Tagged state for each narrative thread.
//!
//! Every thread is `Idle` until its opening event arrives, so the
//! re-entrancy check is a pattern match rather than a surprise on a
//! non-empty list.

use crate::annotation::QualifiedId;
use std::fmt;

/// Names of the narrative threads, used in re-entrancy diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadLabel {
    JoinSat,
    Setup,
    Distribution,
    Robber,
    Trade,
    Monopoly,
    Road,
    Countdown,
}

impl ThreadLabel {
    pub fn name(&self) -> &'static str {
        match self {
            ThreadLabel::JoinSat => "join/sit",
            ThreadLabel::Setup => "game setup",
            ThreadLabel::Distribution => "resource distribution",
            ThreadLabel::Robber => "robber",
            ThreadLabel::Trade => "trade",
            ThreadLabel::Monopoly => "monopoly",
            ThreadLabel::Road => "road building",
            ThreadLabel::Countdown => "countdown",
        }
    }
}

impl fmt::Display for ThreadLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resource-distribution accumulator: one roll plus its yield events.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DiceThread {
    #[default]
    Idle,
    Collecting {
        roll: QualifiedId,
        gets: Vec<QualifiedId>,
    },
}

impl DiceThread {
    pub fn is_collecting(&self) -> bool {
        matches!(self, DiceThread::Collecting { .. })
    }
}

/// Robber episode accumulator: the trigger first, then interior events.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RobberThread {
    #[default]
    Idle,
    Collecting(Vec<QualifiedId>),
}

impl RobberThread {
    pub fn is_active(&self) -> bool {
        matches!(self, RobberThread::Collecting(_))
    }
}

/// Pending trade offer: the head element plus any continuations.
///
/// The head is replaced by a group id once continuations are folded.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum TradeThread {
    #[default]
    Idle,
    Pending(Vec<QualifiedId>),
}

impl TradeThread {
    pub fn is_pending(&self) -> bool {
        matches!(self, TradeThread::Pending(_))
    }
}

/// Road Building card progress: waiting for two build events.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RoadThread {
    #[default]
    Idle,
    Armed {
        card: QualifiedId,
    },
    OneBuilt {
        card: QualifiedId,
        first: QualifiedId,
    },
}
