//! Identifier types
//!
//! This module defines the identifiers shared by every layer:
//! - EntityTag: 16-bit discriminator for an entity type
//! - ObjectId: bit-packed 64-bit object identifier
//! - Tid: identity of one committed unit-of-work in the commit log
//!
//! ## ObjectId Layout
//!
//! ```text
//! ┌──────────────────┬──────────────────────────┬────────────────┐
//! │ entity tag (16)  │ hi block (40)            │ lo counter (8) │
//! └──────────────────┴──────────────────────────┴────────────────┘
//! ```
//!
//! The hi block field holds the value reserved from the shared counter row
//! verbatim. Reserved values are multiples of [`RESERVATION_SIZE`], so two
//! consecutive blocks of one entity type differ by 256 in `hi`, and the
//! counter row itself must stay below [`HI_LIMIT`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bits used by the entity tag
pub const TAG_BITS: u32 = 16;
/// Number of bits used by the hi block
pub const HI_BITS: u32 = 40;
/// Number of bits used by the lo counter
pub const LO_BITS: u32 = 8;

/// Number of identifiers handed out locally per counter reservation
pub const RESERVATION_SIZE: u64 = 1 << LO_BITS;

/// Exclusive upper bound of the hi block field, and so of the counter row
pub const HI_LIMIT: u64 = 1 << HI_BITS;

/// Exclusive upper bound of the 48-bit sequence part of an ObjectId
pub const SEQUENCE_LIMIT: u64 = 1 << (HI_BITS + LO_BITS);

const SEQUENCE_MASK: u64 = SEQUENCE_LIMIT - 1;
const LO_MASK: u64 = RESERVATION_SIZE - 1;

/// Discriminator for an entity type
///
/// Tags are assigned once in the entity registry and are part of every
/// ObjectId, so they MUST NOT change for an existing type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityTag(pub u16);

impl EntityTag {
    /// Raw tag value
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for EntityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Globally unique, type-tagged object identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    /// Compose an ObjectId from an entity tag and a 48-bit sequence value
    ///
    /// Returns None if `sequence` does not fit in 48 bits.
    pub fn compose(tag: EntityTag, sequence: u64) -> Option<Self> {
        if sequence >= SEQUENCE_LIMIT {
            return None;
        }
        Some(ObjectId(((tag.0 as u64) << (HI_BITS + LO_BITS)) | sequence))
    }

    /// Compose an ObjectId from its three fields
    ///
    /// Returns None if `hi` does not fit in 40 bits.
    pub fn from_parts(tag: EntityTag, hi: u64, lo: u8) -> Option<Self> {
        if hi >= HI_LIMIT {
            return None;
        }
        Self::compose(tag, (hi << LO_BITS) | lo as u64)
    }

    /// Reinterpret a raw 64-bit value as an ObjectId
    pub fn from_raw(raw: u64) -> Self {
        ObjectId(raw)
    }

    /// Raw 64-bit value
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Entity tag embedded in the identifier
    pub fn entity_tag(&self) -> EntityTag {
        EntityTag((self.0 >> (HI_BITS + LO_BITS)) as u16)
    }

    /// Hi block field (the reserved counter value)
    pub fn hi(&self) -> u64 {
        (self.0 & SEQUENCE_MASK) >> LO_BITS
    }

    /// Lo counter field
    pub fn lo(&self) -> u8 {
        (self.0 & LO_MASK) as u8
    }

    /// 48-bit sequence part (`hi << 8 | lo`)
    pub fn sequence(&self) -> u64 {
        self.0 & SEQUENCE_MASK
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}_{:010x}_{:02x}", self.entity_tag().0, self.hi(), self.lo())
    }
}

/// Identity of a committed unit-of-work
///
/// Assigned by the commit log when the entry is inserted. Monotonic, but
/// values burned by aborted transactions are never reused, so gaps are normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tid(pub u64);

impl Tid {
    /// Raw value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid:{}", self.0)
    }
}
