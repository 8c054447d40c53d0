//! Capability and type identifiers.
//!
//! A demanded quantity is a `(capability, type)` pair: the name of a
//! physical quantity plus the concrete result type a consumer expects.
//! Type matching along dependency edges is exact.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::util::InternedString;

/// The name of a physical quantity or calculation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Capability(InternedString);

impl Capability {
    /// Create a capability name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Capability(InternedString::new(name))
    }

    /// Get the capability name.
    pub fn as_str(&self) -> &'static str {
        self.0.as_str()
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Capability::new(s)
    }
}

/// A runtime tag for a Rust result type.
///
/// Couples the `TypeId` used for matching with the type name used in
/// diagnostics. Equality and hashing consider only the `TypeId`.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
}

impl TypeTag {
    /// Tag for a concrete type.
    pub fn of<T: 'static>() -> Self {
        TypeTag {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The display name of the tagged type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The underlying `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl Hash for TypeTag {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({})", self.name)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A demanded quantity: capability plus expected result type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Quantity {
    pub capability: Capability,
    pub type_tag: TypeTag,
}

impl Quantity {
    /// Create a quantity from a capability name and a result type.
    pub fn new<T: 'static>(capability: impl AsRef<str>) -> Self {
        Quantity {
            capability: Capability::new(capability),
            type_tag: TypeTag::of::<T>(),
        }
    }

    /// Create a quantity from parts.
    pub fn from_parts(capability: Capability, type_tag: TypeTag) -> Self {
        Quantity {
            capability,
            type_tag,
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.capability, self.type_tag)
    }
}
