//! OPC UA style status codes.
//!
//! The top two bits carry the severity (`00` good, `01` uncertain, `10` bad).
//! Callbacks return a `StatusCode` to accept or reject an in-progress transition.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 32-bit status code as used by the hosting server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u32);

const SEVERITY_MASK: u32 = 0xC000_0000;
const SEVERITY_BAD: u32 = 0x8000_0000;
const SEVERITY_UNCERTAIN: u32 = 0x4000_0000;

#[allow(missing_docs)]
impl StatusCode {
    pub const GOOD: Self = Self(0x0000_0000);
    pub const BAD_INTERNAL_ERROR: Self = Self(0x8002_0000);
    pub const BAD_USER_ACCESS_DENIED: Self = Self(0x801F_0000);
    pub const BAD_NODE_ID_INVALID: Self = Self(0x8033_0000);
    pub const BAD_NODE_ID_UNKNOWN: Self = Self(0x8034_0000);
    pub const BAD_NOT_SUPPORTED: Self = Self(0x803D_0000);
    pub const BAD_NOT_FOUND: Self = Self(0x803E_0000);
    pub const BAD_REFERENCE_TYPE_ID_INVALID: Self = Self(0x804C_0000);
    pub const BAD_NODE_ID_EXISTS: Self = Self(0x805E_0000);
    pub const BAD_TYPE_DEFINITION_INVALID: Self = Self(0x8063_0000);
    pub const BAD_SOURCE_NODE_ID_INVALID: Self = Self(0x8064_0000);
    pub const BAD_NO_MATCH: Self = Self(0x806F_0000);
    pub const BAD_TYPE_MISMATCH: Self = Self(0x8074_0000);
    pub const BAD_INVALID_STATE: Self = Self(0x80AF_0000);
    pub const BAD_CONDITION_ALREADY_ENABLED: Self = Self(0x80CC_0000);
    pub const BAD_CONDITION_BRANCH_ALREADY_ACKED: Self = Self(0x80CF_0000);
    pub const BAD_CONDITION_BRANCH_ALREADY_CONFIRMED: Self = Self(0x80D0_0000);

    /// Wraps a raw status value.
    #[must_use]
    pub const fn new(code: u32) -> Self {
        Self(code)
    }

    /// Returns the raw 32-bit value.
    #[must_use]
    pub const fn code(self) -> u32 {
        self.0
    }

    /// Returns true for good statuses (severity bits `00`).
    #[must_use]
    pub const fn is_good(self) -> bool {
        self.0 & SEVERITY_MASK == 0
    }

    /// Returns true for uncertain statuses (severity bits `01`).
    #[must_use]
    pub const fn is_uncertain(self) -> bool {
        self.0 & SEVERITY_MASK == SEVERITY_UNCERTAIN
    }

    /// Returns true for bad statuses (severity bit `1x`).
    #[must_use]
    pub const fn is_bad(self) -> bool {
        self.0 & SEVERITY_BAD != 0
    }

    /// Symbolic name for the codes this crate knows about.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        let name = match self.0 {
            0x0000_0000 => "Good",
            0x8002_0000 => "BadInternalError",
            0x801F_0000 => "BadUserAccessDenied",
            0x8033_0000 => "BadNodeIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x803D_0000 => "BadNotSupported",
            0x803E_0000 => "BadNotFound",
            0x804C_0000 => "BadReferenceTypeIdInvalid",
            0x805E_0000 => "BadNodeIdExists",
            0x8063_0000 => "BadTypeDefinitionInvalid",
            0x8064_0000 => "BadSourceNodeIdInvalid",
            0x806F_0000 => "BadNoMatch",
            0x8074_0000 => "BadTypeMismatch",
            0x80AF_0000 => "BadInvalidState",
            0x80CC_0000 => "BadConditionAlreadyEnabled",
            0x80CF_0000 => "BadConditionBranchAlreadyAcked",
            0x80D0_0000 => "BadConditionBranchAlreadyConfirmed",
            _ => return None,
        };
        Some(name)
    }
}

impl Default for StatusCode {
    fn default() -> Self {
        Self::GOOD
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.0),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_bits() {
        assert!(StatusCode::GOOD.is_good());
        assert!(!StatusCode::GOOD.is_bad());
        assert!(StatusCode::BAD_INTERNAL_ERROR.is_bad());
        assert!(!StatusCode::BAD_INTERNAL_ERROR.is_good());

        let uncertain = StatusCode::new(0x4000_0000);
        assert!(uncertain.is_uncertain());
        assert!(!uncertain.is_good());
        assert!(!uncertain.is_bad());
    }

    #[test]
    fn test_display_known_and_unknown() {
        let msg = StatusCode::BAD_NODE_ID_EXISTS.to_string();
        assert!(msg.contains("BadNodeIdExists"));
        assert!(msg.contains("0x805E0000"));

        assert_eq!(StatusCode::new(0x8123_0000).to_string(), "0x81230000");
    }
}
