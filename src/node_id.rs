//! Node identity and naming.
//!
//! A `NodeId` addresses a node in the hosting server's node store. Conditions,
//! condition sources, types and reference types are all addressed this way.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier part of a `NodeId`.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(Uuid),
    Opaque(Vec<u8>),
}

/// Address of a node: namespace index plus identifier.
///
/// The null node id (`ns=0;i=0`) stands for "none": no parent reference type,
/// a server-assigned id, or a released condition.
///
/// # Examples
///
/// ```
/// use ua_alarms::NodeId;
///
/// let id = NodeId::numeric(1, 42);
/// assert_eq!(id.to_string(), "ns=1;i=42");
/// assert!(NodeId::null().is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index.
    pub namespace: u16,
    /// Identifier within the namespace.
    pub identifier: Identifier,
}

impl NodeId {
    /// Creates a numeric node id.
    #[must_use]
    pub const fn numeric(namespace: u16, value: u32) -> Self {
        Self {
            namespace,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Creates a string node id.
    #[must_use]
    pub fn string(namespace: u16, value: impl Into<String>) -> Self {
        Self {
            namespace,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Creates a GUID node id.
    #[must_use]
    pub const fn guid(namespace: u16, value: Uuid) -> Self {
        Self {
            namespace,
            identifier: Identifier::Guid(value),
        }
    }

    /// Creates an opaque (byte string) node id.
    #[must_use]
    pub fn opaque(namespace: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace,
            identifier: Identifier::Opaque(value.into()),
        }
    }

    /// The null node id.
    #[must_use]
    pub const fn null() -> Self {
        Self::numeric(0, 0)
    }

    /// Returns true if this is the null node id.
    ///
    /// Empty string/opaque identifiers and the nil GUID in namespace 0 are null as well.
    #[must_use]
    pub fn is_null(&self) -> bool {
        if self.namespace != 0 {
            return false;
        }
        match &self.identifier {
            Identifier::Numeric(v) => *v == 0,
            Identifier::String(s) => s.is_empty(),
            Identifier::Guid(g) => g.is_nil(),
            Identifier::Opaque(b) => b.is_empty(),
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};", self.namespace)?;
        }
        match &self.identifier {
            Identifier::Numeric(v) => write!(f, "i={v}"),
            Identifier::String(s) => write!(f, "s={s}"),
            Identifier::Guid(g) => write!(f, "g={g}"),
            Identifier::Opaque(b) => write!(f, "b={}", hex::encode(b)),
        }
    }
}

/// Well-known object type ids (namespace 0).
#[derive(Debug, Clone, Copy)]
pub struct ObjectTypeId;

#[allow(missing_docs)]
impl ObjectTypeId {
    pub const BASE_OBJECT_TYPE: NodeId = NodeId::numeric(0, 58);
    pub const CONDITION_TYPE: NodeId = NodeId::numeric(0, 2782);
    pub const ACKNOWLEDGEABLE_CONDITION_TYPE: NodeId = NodeId::numeric(0, 2881);
    pub const ALARM_CONDITION_TYPE: NodeId = NodeId::numeric(0, 2915);
    pub const DISCRETE_ALARM_TYPE: NodeId = NodeId::numeric(0, 10523);
    pub const OFF_NORMAL_ALARM_TYPE: NodeId = NodeId::numeric(0, 10637);
}

/// Well-known reference type ids (namespace 0).
#[derive(Debug, Clone, Copy)]
pub struct ReferenceTypeId;

#[allow(missing_docs)]
impl ReferenceTypeId {
    pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);
    pub const HAS_EVENT_SOURCE: NodeId = NodeId::numeric(0, 36);
    pub const HAS_PROPERTY: NodeId = NodeId::numeric(0, 46);
    pub const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);
    pub const HAS_NOTIFIER: NodeId = NodeId::numeric(0, 48);
    pub const HAS_CONDITION: NodeId = NodeId::numeric(0, 9006);
}

/// Well-known object ids (namespace 0).
#[derive(Debug, Clone, Copy)]
pub struct ObjectId;

#[allow(missing_docs)]
impl ObjectId {
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);
}

/// Namespace-qualified name, used for browse names and condition field names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace: u16,
    /// Name text.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    #[must_use]
    pub fn new(namespace: u16, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }
}

impl From<&str> for QualifiedName {
    fn from(name: &str) -> Self {
        Self::new(0, name)
    }
}

impl From<String> for QualifiedName {
    fn from(name: String) -> Self {
        Self::new(0, name)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.namespace, self.name)
        }
    }
}
