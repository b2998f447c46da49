//! Small bitsets over dense ordinal spaces, grounded on ORSON/GLOBAL's
//! `set` type (`original_source/global.h`, `makeSet`/`isInSet`/`union`),
//! which is a fixed-size bitmask over hook tags used to decide, e.g.,
//! which statement forms the emitter must wrap in braces (`wraps` in
//! `original_source/statement.c`).
//!
//! A hand-rolled bitmask would work for a set over 45 hooks, but the
//! corpus reaches for `bit-set`/`bit-vec` wherever it needs a bitset
//! (kept in the dependency table for exactly this), so we use those
//! instead of rolling our own.

use bit_set::BitSet;

use crate::hook::Hook;

/// A set of [`Hook`] tags, backed by a dense bitset keyed on
/// [`Hook::ordinal`]. Cheap to copy by value conceptually, though the
/// underlying storage is heap-allocated like any `BitSet`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookSet(BitSet);

impl HookSet {
    /// The empty set.
    #[must_use] pub fn new() -> Self {
        Self(BitSet::with_capacity(Hook::ALL.len()))
    }

    /// Build a set from a fixed list of hooks, mirroring `makeSet`'s
    /// varargs constructor.
    #[must_use] pub fn of(hooks: &[Hook]) -> Self {
        let mut set = Self::new();
        for &h in hooks {
            set.insert(h);
        }
        set
    }

    pub fn insert(&mut self, hook: Hook) -> bool {
        self.0.insert(hook.ordinal())
    }

    #[must_use] pub fn contains(&self, hook: Hook) -> bool {
        self.0.contains(hook.ordinal())
    }

    /// In-place union, mirroring `global.h`'s `union`.
    pub fn union_with(&mut self, other: &HookSet) {
        self.0.union_with(&other.0);
    }

    #[must_use] pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_and_union() {
        let mut a = HookSet::of(&[Hook::If, Hook::Last, Hook::With]);
        assert!(a.contains(Hook::If));
        assert!(!a.contains(Hook::While));

        let b = HookSet::of(&[Hook::While]);
        a.union_with(&b);
        assert!(a.contains(Hook::While));
    }
}
