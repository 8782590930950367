//! Values written to and read from condition fields.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::node_id::NodeId;

/// Text with an optional locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale tag, empty for invariant text.
    pub locale: String,
    /// The text itself.
    pub text: String,
}

impl LocalizedText {
    /// Creates a localized text.
    #[must_use]
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }

    /// Creates a locale-invariant text.
    #[must_use]
    pub fn invariant(text: impl Into<String>) -> Self {
        Self::new("", text)
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Shape of a `Variant`, used by the node store to type-check field writes.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantKind {
    Null,
    Boolean,
    UInt16,
    UInt32,
    String,
    LocalizedText,
    DateTime,
    ByteString,
    NodeId,
}

/// A dynamically typed field value.
///
/// # Examples
///
/// ```
/// use ua_alarms::{Variant, VariantKind};
///
/// let v = Variant::from(400u16);
/// assert_eq!(v.kind(), VariantKind::UInt16);
/// assert_eq!(Variant::from(true).as_bool(), Some(true));
/// ```
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Variant {
    #[default]
    Null,
    Boolean(bool),
    UInt16(u16),
    UInt32(u32),
    String(String),
    LocalizedText(LocalizedText),
    DateTime(DateTime<Utc>),
    ByteString(Vec<u8>),
    NodeId(NodeId),
}

#[allow(missing_docs)]
impl Variant {
    #[must_use]
    pub const fn kind(&self) -> VariantKind {
        match self {
            Self::Null => VariantKind::Null,
            Self::Boolean(_) => VariantKind::Boolean,
            Self::UInt16(_) => VariantKind::UInt16,
            Self::UInt32(_) => VariantKind::UInt32,
            Self::String(_) => VariantKind::String,
            Self::LocalizedText(_) => VariantKind::LocalizedText,
            Self::DateTime(_) => VariantKind::DateTime,
            Self::ByteString(_) => VariantKind::ByteString,
            Self::NodeId(_) => VariantKind::NodeId,
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_u16(&self) -> Option<u16> {
        match self {
            Self::UInt16(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_localized_text(&self) -> Option<&LocalizedText> {
        match self {
            Self::LocalizedText(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_date_time(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::DateTime(v) => Some(v),
            _ => None,
        }
    }

    pub const fn as_node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeId(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<u16> for Variant {
    fn from(v: u16) -> Self {
        Self::UInt16(v)
    }
}

impl From<u32> for Variant {
    fn from(v: u32) -> Self {
        Self::UInt32(v)
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<LocalizedText> for Variant {
    fn from(v: LocalizedText) -> Self {
        Self::LocalizedText(v)
    }
}

impl From<DateTime<Utc>> for Variant {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTime(v)
    }
}

impl From<NodeId> for Variant {
    fn from(v: NodeId) -> Self {
        Self::NodeId(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Variant::Null.kind(), VariantKind::Null);
        assert_eq!(Variant::from("x").kind(), VariantKind::String);
        assert_eq!(
            Variant::from(LocalizedText::invariant("Alarm active")).kind(),
            VariantKind::LocalizedText
        );
        assert_eq!(Variant::from(Utc::now()).kind(), VariantKind::DateTime);
    }

    #[test]
    fn test_accessors_reject_other_shapes() {
        let v = Variant::from(7u16);
        assert_eq!(v.as_u16(), Some(7));
        assert_eq!(v.as_bool(), None);
        assert!(v.as_localized_text().is_none());
    }
}
