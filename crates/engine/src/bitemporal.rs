//! Bitemporal valid-from policy
//!
//! The valid-from of an aggregate is computed once, from its root, and
//! inherited by every node of the aggregate's delta tree.
//!
//! | Root type | New root | Persisted root |
//! |---|---|---|
//! | old-style | caller value | caller value |
//! | policy None | caller value | caller value |
//! | policy All | as-of | as-of |
//! | policy Default | caller value | as-of |
//!
//! Whenever an aggregate with a persisted root is written, the unit of work's
//! as-of date must not precede the root's stored valid-from, whatever the
//! policy: history cannot be recorded before the object's own inception. A
//! new root has no stored valid-from yet and is not checked.

use chrono::{DateTime, Utc};

use chronicle_core::{EntityDescriptor, Error, HistorizationPolicy, ObjectId, Result};

/// Valid-from computed for one aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateValidFrom {
    /// Value inherited by every node
    pub value: DateTime<Utc>,
    /// The unit of work's as-of date was stamped (rather than passed through)
    pub stamped: bool,
}

/// Compute the valid-from of an aggregate from its root
///
/// `current` is the root's in-memory valid-from, which carries the caller's
/// value for new objects and objects whose type passes it through.
pub fn aggregate_valid_from(
    descriptor: &EntityDescriptor,
    root_is_new: bool,
    current: DateTime<Utc>,
    as_of: DateTime<Utc>,
) -> AggregateValidFrom {
    let pass_through = AggregateValidFrom {
        value: current,
        stamped: false,
    };
    let stamp = AggregateValidFrom {
        value: as_of,
        stamped: true,
    };

    if descriptor.old_style {
        return pass_through;
    }
    match descriptor.policy {
        HistorizationPolicy::None => pass_through,
        HistorizationPolicy::All => stamp,
        HistorizationPolicy::Default if root_is_new => pass_through,
        HistorizationPolicy::Default => stamp,
    }
}

/// Check the as-of date against a persisted root's stored valid-from
///
/// # Errors
/// Returns `BitemporalViolation` if `as_of` precedes `inception`.
pub fn check_inception(
    root: ObjectId,
    descriptor: &EntityDescriptor,
    as_of: DateTime<Utc>,
    inception: DateTime<Utc>,
) -> Result<()> {
    if as_of < inception {
        return Err(Error::BitemporalViolation {
            object_id: root,
            entity: descriptor.name.clone(),
            as_of,
            valid_from: inception,
        });
    }
    Ok(())
}
