//! Name interning.
//!
//! Grounded on mmcc's `Symbol` / dense symbol map (`types/entity.rs`, which
//! interns primitive-operator keywords through a `LazyLock`-backed table)
//! and on the Leo compiler's `Symbol` newtype, an `IndexSet`-backed interner
//! keyed by an `FxHash` build hasher (`other_examples/..-leo__compiler-span-
//! src-symbol.rs`). A [`Name`] additionally carries the disambiguating
//! number the source language's object model requires: zero for a "clean"
//! name written by a user, nonzero for a compiler-generated "stub".

use std::cell::RefCell;
use std::fmt;
use std::num::NonZeroU32;

use fxhash::FxBuildHasher;
use indexmap::IndexSet;

/// An interned `(printable string, disambiguator)` pair.
///
/// Two `Name`s are equal iff they were interned from the same string and
/// disambiguator. A disambiguator of `0` is "clean"; anything else marks a
/// compiler-generated stub, which [`Name::make_stub`] guarantees is unique
/// and therefore never equal to any other name, including another stub
/// built from the same base string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(NonZeroU32);

#[derive(Default)]
struct Interner {
    strings: IndexSet<(Box<str>, u32), FxBuildHasher>,
    next_stub: u32,
}

thread_local! {
    // The core is single-threaded and synchronous (see the concurrency
    // model), so a thread-local `RefCell` is the whole interner: no
    // `Mutex`, no process-wide `static mut`.
    static INTERNER: RefCell<Interner> = RefCell::new(Interner {
        strings: IndexSet::default(),
        // Stub disambiguators count down from `u32::MAX` so they can
        // never collide with a disambiguator supplied by a parser
        // (which only ever mints clean names, disambiguator 0).
        next_stub: u32::MAX,
    });
}

impl Name {
    fn from_index(index: usize) -> Name {
        let index = u32::try_from(index).expect("more names than fit in a u32").saturating_add(1);
        Name(NonZeroU32::new(index).expect("index overflowed"))
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// Intern a clean (disambiguator `0`) name.
    pub fn intern(s: &str) -> Name {
        INTERNER.with_borrow_mut(|interner| {
            let (index, _) = interner.strings.insert_full((Box::from(s), 0));
            Name::from_index(index)
        })
    }

    /// Make a fresh stub name derived from `base`'s printable string. Two
    /// calls with the same `base` never compare equal.
    pub fn make_stub(base: Name) -> Name {
        INTERNER.with_borrow_mut(|interner| {
            let text = interner.strings[base.index()].0.clone();
            let disambig = interner.next_stub;
            interner.next_stub = interner
                .next_stub
                .checked_sub(1)
                .expect("exhausted the stub disambiguator space");
            let (index, fresh) = interner.strings.insert_full((text, disambig));
            debug_assert!(fresh, "stub disambiguator collided with an existing name");
            Name::from_index(index)
        })
    }

    /// True if this name is a generated stub rather than a user-written
    /// identifier.
    pub fn is_stub(self) -> bool {
        INTERNER.with_borrow(|interner| interner.strings[self.index()].1 != 0)
    }

    /// Run `f` with a borrow of this name's printable text.
    pub fn with_str<R>(self, f: impl FnOnce(&str) -> R) -> R {
        INTERNER.with_borrow(|interner| f(&interner.strings[self.index()].0))
    }

    /// Clone this name's printable text into an owned `String`.
    pub fn to_string_owned(self) -> String {
        self.with_str(str::to_owned)
    }

    /// This name's dense interning id, monotonic in first-seen order.
    /// Used by the emitter to mint a stable, unique C identifier suffix
    /// for a mangled name (§4.10's `_oN` convention).
    #[must_use] pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| write!(f, "{s}"))?;
        let disambig = INTERNER.with_borrow(|interner| interner.strings[self.index()].1);
        if disambig != 0 {
            write!(f, "#{disambig:x}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| write!(f, "{s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_structural() {
        let a = Name::intern("foo");
        let b = Name::intern("foo");
        let c = Name::intern("bar");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn stubs_are_never_equal_to_anything_else() {
        let base = Name::intern("x");
        let stub1 = Name::make_stub(base);
        let stub2 = Name::make_stub(base);
        assert_ne!(stub1, base);
        assert_ne!(stub2, base);
        assert_ne!(stub1, stub2);
        assert!(stub1.is_stub());
        assert!(!base.is_stub());
        stub1.with_str(|s| assert_eq!(s, "x"));
    }
}
