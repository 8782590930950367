use serde::{Deserialize, Serialize};

use crate::status::StatusCode;

/// Two-state transitions that can carry a callback.
///
/// Each kind is bound to one two-state variable of the condition and to one
/// slot of the callback table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// EnabledState is about to become true.
    Enabled,
    /// AckedState is about to become true.
    Acked,
    /// ConfirmedState is about to become true.
    Confirmed,
    /// ActiveState is about to become true.
    Active,
}

/// All transition kinds, in slot order.
pub const ALL_TRANSITIONS: [TransitionKind; TransitionKind::COUNT] = [
    TransitionKind::Enabled,
    TransitionKind::Acked,
    TransitionKind::Confirmed,
    TransitionKind::Active,
];

impl TransitionKind {
    /// Number of transition kinds (and callback slots per condition).
    pub const COUNT: usize = 4;

    /// Slot index in the callback table.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Enabled => 0,
            Self::Acked => 1,
            Self::Confirmed => 2,
            Self::Active => 3,
        }
    }

    /// Browse name of the two-state variable this transition flips.
    #[must_use]
    pub const fn variable(self) -> &'static str {
        match self {
            Self::Enabled => "EnabledState",
            Self::Acked => "AckedState",
            Self::Confirmed => "ConfirmedState",
            Self::Active => "ActiveState",
        }
    }

    /// Short label used in logs.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Acked => "acked",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
        }
    }

    /// Status the node store reports when the variable is already true.
    #[must_use]
    pub const fn already_set_status(self) -> StatusCode {
        match self {
            Self::Enabled => StatusCode::BAD_CONDITION_ALREADY_ENABLED,
            Self::Acked => StatusCode::BAD_CONDITION_BRANCH_ALREADY_ACKED,
            Self::Confirmed => StatusCode::BAD_CONDITION_BRANCH_ALREADY_CONFIRMED,
            Self::Active => StatusCode::BAD_INVALID_STATE,
        }
    }
}
