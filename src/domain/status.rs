//! Offer lifecycle state machine.
//!
//! ```text
//! AwaitingContent -> AwaitingAnalysis -> ReadyForDecision -> {Applied | Rejected | Processed}
//!        |
//!        +--------> Expired
//! (any) -----------> Ignored   (manual only)
//! ```
//!
//! Automated stages only ever move an offer forward along these edges.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    AwaitingContent,
    AwaitingAnalysis,
    ReadyForDecision,
    Applied,
    Rejected,
    Processed,
    Ignored,
    Expired,
}

impl OfferStatus {
    pub const INITIAL: OfferStatus = OfferStatus::AwaitingContent;

    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::AwaitingContent => "awaiting_content",
            OfferStatus::AwaitingAnalysis => "awaiting_analysis",
            OfferStatus::ReadyForDecision => "ready_for_decision",
            OfferStatus::Applied => "applied",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Processed => "processed",
            OfferStatus::Ignored => "ignored",
            OfferStatus::Expired => "expired",
        }
    }

    /// Position along the lifecycle; statuses past the pipeline share the top rank.
    pub fn rank(&self) -> u8 {
        match self {
            OfferStatus::AwaitingContent => 0,
            OfferStatus::AwaitingAnalysis => 1,
            OfferStatus::ReadyForDecision => 2,
            _ => 3,
        }
    }

    /// `ReadyForDecision` and everything after it is out of the pipeline's hands.
    pub fn is_terminal_for_pipeline(&self) -> bool {
        self.rank() >= OfferStatus::ReadyForDecision.rank()
    }

    /// Apply a lifecycle event, returning the next status.
    pub fn apply(self, event: StatusEvent) -> Result<OfferStatus, TransitionError> {
        use OfferStatus::*;
        use StatusEvent::*;

        match (self, event) {
            (_, ManualIgnore) => Ok(Ignored),
            (AwaitingContent, ContentEnriched) => Ok(AwaitingAnalysis),
            (AwaitingContent, PageGone) => Ok(Expired),
            (AwaitingAnalysis, AnalysisCompleted) => Ok(ReadyForDecision),
            (from, event) => Err(TransitionError { from, event }),
        }
    }

    /// Whether an automated stage may move an offer from `self` to `next`.
    pub fn can_advance_to(self, next: OfferStatus) -> bool {
        [
            StatusEvent::ContentEnriched,
            StatusEvent::PageGone,
            StatusEvent::AnalysisCompleted,
        ]
        .into_iter()
        .any(|event| self.apply(event) == Ok(next))
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awaiting_content" => Ok(OfferStatus::AwaitingContent),
            "awaiting_analysis" => Ok(OfferStatus::AwaitingAnalysis),
            "ready_for_decision" => Ok(OfferStatus::ReadyForDecision),
            "applied" => Ok(OfferStatus::Applied),
            "rejected" => Ok(OfferStatus::Rejected),
            "processed" => Ok(OfferStatus::Processed),
            "ignored" => Ok(OfferStatus::Ignored),
            "expired" => Ok(OfferStatus::Expired),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown offer status: {0}")]
pub struct UnknownStatus(pub String);

/// Something that happened to an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// Enrichment produced usable text.
    ContentEnriched,
    /// The posting page no longer exists (404/410).
    PageGone,
    /// AI qualification written.
    AnalysisCompleted,
    /// Dashboard action; never emitted by the pipeline.
    ManualIgnore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition from {from} on {event:?}")]
pub struct TransitionError {
    pub from: OfferStatus,
    pub event: StatusEvent,
}
