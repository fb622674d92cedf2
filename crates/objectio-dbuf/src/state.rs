//! The dbuf state machine (C4, spec.md §4.3).
//!
//! States are bit flags. `UNCACHED`, `NOFILL`, `CACHED`, and `EVICTING`
//! are exclusive — when set, no other bit may also be set. `PARTIAL`,
//! `READ`, and `FILL` combine with each other (and may appear alone) to
//! describe a block that is live but not yet a stable, fully resolved
//! `CACHED` buffer.
//!
//! This is a hand-rolled bitmask rather than a `bitflags`-crate type:
//! the set is small, fixed, and the validity constraint ("only these
//! combinations may ever be set together") is exactly the kind of
//! invariant this crate's debug assertions exist to enforce, so the
//! combination check lives right next to the bit definitions.

use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateFlags(u8);

impl StateFlags {
    pub const UNCACHED: StateFlags = StateFlags(1 << 0);
    pub const NOFILL: StateFlags = StateFlags(1 << 1);
    pub const CACHED: StateFlags = StateFlags(1 << 2);
    pub const EVICTING: StateFlags = StateFlags(1 << 3);
    pub const PARTIAL: StateFlags = StateFlags(1 << 4);
    pub const READ: StateFlags = StateFlags(1 << 5);
    pub const FILL: StateFlags = StateFlags(1 << 6);

    const EXCLUSIVE: StateFlags = StateFlags(
        Self::UNCACHED.0 | Self::NOFILL.0 | Self::CACHED.0 | Self::EVICTING.0,
    );

    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, other: StateFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub const fn intersects(self, other: StateFlags) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub const fn union(self, other: StateFlags) -> Self {
        Self(self.0 | other.0)
    }

    #[must_use]
    pub const fn remove(self, other: StateFlags) -> Self {
        Self(self.0 & !other.0)
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True for exactly the combinations spec.md §4.3 lists as legal:
    /// any one exclusive state alone, or any non-empty subset of
    /// `{PARTIAL, READ, FILL}` alone.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        if self.0 == 0 {
            return false;
        }
        let exclusive_bits = self.0 & Self::EXCLUSIVE.0;
        let composite_bits = self.0 & !Self::EXCLUSIVE.0;
        if exclusive_bits != 0 {
            // An exclusive state may never share bits with anything else,
            // including another exclusive state.
            exclusive_bits == self.0 && exclusive_bits.count_ones() == 1
        } else {
            composite_bits != 0
        }
    }

    #[must_use]
    pub const fn composite_implies_single_dirty(self) -> bool {
        self.contains(Self::PARTIAL)
    }
}

impl fmt::Debug for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (bit, name) in [
            (Self::UNCACHED, "UNCACHED"),
            (Self::NOFILL, "NOFILL"),
            (Self::CACHED, "CACHED"),
            (Self::EVICTING, "EVICTING"),
            (Self::PARTIAL, "PARTIAL"),
            (Self::READ, "READ"),
            (Self::FILL, "FILL"),
        ] {
            if self.contains(bit) {
                parts.push(name);
            }
        }
        if parts.is_empty() {
            write!(f, "<empty>")
        } else {
            write!(f, "{}", parts.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclusive_states_are_valid_alone() {
        for s in [StateFlags::UNCACHED, StateFlags::NOFILL, StateFlags::CACHED, StateFlags::EVICTING] {
            assert!(s.is_valid());
        }
    }

    #[test]
    fn exclusive_state_cannot_combine() {
        assert!(!StateFlags::UNCACHED.union(StateFlags::FILL).is_valid());
        assert!(!StateFlags::CACHED.union(StateFlags::EVICTING).is_valid());
    }

    #[test]
    fn documented_composites_are_valid() {
        assert!(StateFlags::PARTIAL.union(StateFlags::FILL).is_valid());
        assert!(StateFlags::READ.union(StateFlags::FILL).is_valid());
        assert!(StateFlags::PARTIAL.union(StateFlags::READ).is_valid());
        assert!(StateFlags::PARTIAL.union(StateFlags::READ).union(StateFlags::FILL).is_valid());
        assert!(StateFlags::READ.is_valid());
        assert!(StateFlags::FILL.is_valid());
    }

    #[test]
    fn empty_is_invalid() {
        assert!(!StateFlags::empty().is_valid());
    }

    #[test]
    fn partial_implies_single_dirty_record() {
        assert!(StateFlags::PARTIAL.union(StateFlags::FILL).composite_implies_single_dirty());
        assert!(!StateFlags::READ.union(StateFlags::FILL).composite_implies_single_dirty());
    }
}
