//! Field and include tags.
//!
//! Tags are stable positive integers in `1..=MAX_PAYLOAD_INDEX`. Zero,
//! negative and out-of-range values are rejected when the tag is built, so
//! an invalid tag never reaches a registry.

use std::any::{type_name, TypeId};
use std::fmt;

use crate::error::{PeerError, Result};

/// Largest valid tag.
pub const MAX_PAYLOAD_INDEX: u32 = 64;

fn checked_tag(tag: i64) -> Result<u32> {
    if tag < 1 || tag > i64::from(MAX_PAYLOAD_INDEX) {
        return Err(PeerError::InvalidTag {
            tag,
            max: MAX_PAYLOAD_INDEX,
        });
    }
    Ok(tag as u32)
}

/// Tag of a payload member field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PayloadDataIndex(u32);

impl PayloadDataIndex {
    /// Validate a member tag.
    pub fn new(tag: impl Into<i64>) -> Result<Self> {
        checked_tag(tag.into()).map(Self)
    }

    /// Numeric tag.
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Tag of an include (subtype) mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PayloadIncludeIndex(u32);

impl PayloadIncludeIndex {
    /// Validate an include tag.
    pub fn new(tag: impl Into<i64>) -> Result<Self> {
        checked_tag(tag.into()).map(Self)
    }

    /// Numeric tag.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PayloadDataIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PayloadIncludeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Concrete type an include tag wires to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IncludeTarget {
    type_id: TypeId,
    type_name: &'static str,
}

impl IncludeTarget {
    /// Target naming `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
        }
    }

    /// Whether this target names `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Fully qualified type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Include tag plus its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeTag {
    index: PayloadIncludeIndex,
    target: IncludeTarget,
}

impl IncludeTag {
    /// Pair an include tag with its target; an absent target is rejected.
    pub fn new(index: PayloadIncludeIndex, target: impl Into<Option<IncludeTarget>>) -> Result<Self> {
        let target = target.into().ok_or_else(|| PeerError::missing("target"))?;
        Ok(Self { index, target })
    }

    /// The tag.
    pub fn index(&self) -> PayloadIncludeIndex {
        self.index
    }

    /// The wired type.
    pub fn target(&self) -> IncludeTarget {
        self.target
    }
}
