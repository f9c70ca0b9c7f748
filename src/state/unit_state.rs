/// Unit-of-work state definitions for tracking crawl progress
///
/// Both passes share one state machine. The list pass walks
/// `Pending → Fetching → (Fetched | FailedTransient | FailedTerminal) → Checkpointed`;
/// the detail pass additionally starts at `Discovered` and may end at
/// `SkippedDuplicate` without ever being fetched.
use std::fmt;

/// Represents the current state of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    // ===== Discovery States =====
    /// Identifier pair extracted from a list record
    Discovered,

    /// Pair is already fetched, checkpointed, or seen earlier in the scan
    SkippedDuplicate,

    // ===== Active States =====
    /// Unit is scheduled and not in the checkpoint
    Pending,

    /// Request for this unit is in flight
    Fetching,

    /// Records for this unit have been written to the sink
    Fetched,

    // ===== Terminal States =====
    /// Unit is recorded in the checkpoint
    Checkpointed,

    /// Unit failed this run and stays pending for a later run
    FailedTransient,

    /// Unit failed often enough to be abandoned
    FailedTerminal,
}

impl UnitState {
    /// Returns true if no further processing happens for this unit in this run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Checkpointed | Self::FailedTransient | Self::FailedTerminal | Self::SkippedDuplicate
        )
    }

    /// Returns true if the unit failed this run
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedTransient | Self::FailedTerminal)
    }

    /// Whether moving from `self` to `next` follows the state machine
    pub fn can_transition_to(&self, next: UnitState) -> bool {
        use UnitState::*;
        matches!(
            (self, next),
            (Discovered, Pending)
                | (Discovered, SkippedDuplicate)
                | (Pending, Fetching)
                | (Fetching, Fetched)
                | (Fetching, FailedTransient)
                | (Fetching, FailedTerminal)
                | (Fetched, Checkpointed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::SkippedDuplicate => "skipped_duplicate",
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Fetched => "fetched",
            Self::Checkpointed => "checkpointed",
            Self::FailedTransient => "failed_transient",
            Self::FailedTerminal => "failed_terminal",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
