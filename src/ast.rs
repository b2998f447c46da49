//! Raw, untyped source terms (§3 "Term", §6 "Source-file input").
//!
//! This is the tree a parser hands the transformer: a generic
//! s-expression over literals, interned names, and hook-headed
//! applications, each carrying the source char-count the original
//! attaches to every pair's `info` slot for error attribution. It is
//! deliberately *not* the structured [`crate::ir::ty::Type`] /
//! [`crate::ir::expr::Expr`] pair the transformer produces — see
//! `ir/mod.rs` for why those are split out as their own typed enums.

use std::rc::Rc;

use crate::hook::{Hook, PrimOp};
use crate::symbol::Name;

/// A source position, packing a file id and a char offset the way the
/// original packs `(file id, offset)` into a 32-bit word (§3
/// "Lifecycle").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    pub file: FileId,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileId(pub u32);

impl Span {
    /// A span meaning "not attributable", the Rust analogue of the
    /// original's `info == -1` sentinel for internally constructed pairs.
    pub const INTERNAL: Span = Span { file: FileId(u32::MAX), offset: u32::MAX };

    #[must_use] pub fn is_internal(self) -> bool {
        self == Span::INTERNAL
    }
}

/// A raw source term. Reference-counted like [`crate::ir::ty::Type`], so
/// sharing a subtree (e.g. reusing a parsed parameter list across `alt`
/// members) is just an `Rc::clone`.
pub type Term = Rc<TermKind>;

pub enum TermKind {
    Char(u32),
    /// A bare integer literal, untyped until the transformer elaborates
    /// it to `int2` by default (§3).
    Int(i64),
    /// An integer literal with an explicit width tag (one of
    /// `Hook::Char0/Char1/Int0/Int1/Int2`), used where the source pins
    /// the literal to a narrower type than the `int2` default, e.g.
    /// `int0-literal 1`.
    IntAt(i64, Hook),
    Real(f64),
    /// A `row char0` string literal.
    Str(Box<[u8]>),
    /// An interned identifier reference.
    Name(Name),
    /// A singleton structural/control/type-constructor tag, used bare
    /// (e.g. `nil`, `skip`) or as the head of a [`TermKind::Node`].
    Hook(Hook),
    /// A bare primitive-operator reference, used as the head of a
    /// [`TermKind::Prim`] application.
    Prim(PrimOp),
    /// A hook-headed application: `(hook subterm...)`, the term-tree
    /// analogue of the original's `Pair` (`car` is the hook, `cdr` the
    /// argument list). `span` is the Rust stand-in for the original's
    /// `info` slot.
    Node(Hook, Vec<Term>, Span),
    /// A primitive-operator application: `(op subterm...)`.
    PrimApp(PrimOp, Vec<Term>, Span),
}

impl TermKind {
    #[must_use] pub fn span(&self) -> Span {
        match self {
            TermKind::Node(_, _, span) | TermKind::PrimApp(_, _, span) => *span,
            _ => Span::INTERNAL,
        }
    }
}

/// A small in-memory builder API standing in for the (out-of-scope)
/// parser, used by tests and by embedders that already have a term tree
/// in hand (§6).
pub mod build {
    use super::{FileId, Hook, PrimOp, Span, Term, TermKind};
    use crate::symbol::Name;
    use std::rc::Rc;

    #[must_use] pub fn char_lit(c: u32) -> Term {
        Rc::new(TermKind::Char(c))
    }

    #[must_use] pub fn int_lit(n: i64) -> Term {
        Rc::new(TermKind::Int(n))
    }

    /// An integer literal pinned to an explicit width, e.g.
    /// `int_lit_at(1, Hook::Int0)` for a narrow-typed `1`.
    #[must_use] pub fn int_lit_at(n: i64, width: Hook) -> Term {
        Rc::new(TermKind::IntAt(n, width))
    }

    #[must_use] pub fn int0_lit(n: i64) -> Term {
        int_lit_at(n, Hook::Int0)
    }

    #[must_use] pub fn int1_lit(n: i64) -> Term {
        int_lit_at(n, Hook::Int1)
    }

    #[must_use] pub fn real_lit(x: f64) -> Term {
        Rc::new(TermKind::Real(x))
    }

    #[must_use] pub fn str_lit(bytes: &[u8]) -> Term {
        Rc::new(TermKind::Str(bytes.into()))
    }

    #[must_use] pub fn name(n: &str) -> Term {
        Rc::new(TermKind::Name(Name::intern(n)))
    }

    #[must_use] pub fn hook(h: Hook) -> Term {
        Rc::new(TermKind::Hook(h))
    }

    #[must_use] pub fn prim(op: PrimOp) -> Term {
        Rc::new(TermKind::Prim(op))
    }

    #[must_use] pub fn node(h: Hook, args: Vec<Term>, file: FileId, offset: u32) -> Term {
        Rc::new(TermKind::Node(h, args, Span { file, offset }))
    }

    #[must_use] pub fn prim_app(op: PrimOp, args: Vec<Term>, file: FileId, offset: u32) -> Term {
        Rc::new(TermKind::PrimApp(op, args, Span { file, offset }))
    }
}

/// The external collaborator that supplies source units to `load`
/// (§4.8, §6). The actual scanner/parser is out of scope; this trait is
/// the seam a real parser module would implement, and what tests use an
/// in-memory double for.
pub trait SourceLoader {
    /// Load the named source unit's already-parsed term tree.
    fn load(&mut self, name: Name) -> Result<Term, LoadError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("could not load source unit `{name}`: {reason}")]
pub struct LoadError {
    pub name: String,
    pub reason: String,
}

/// An in-memory [`SourceLoader`] backed by a fixed map, for tests and for
/// embedders that have already parsed every unit up front.
#[derive(Default)]
pub struct MapLoader {
    units: std::collections::HashMap<Name, Term>,
}

impl MapLoader {
    #[must_use] pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: Name, term: Term) -> &mut Self {
        self.units.insert(name, term);
        self
    }
}

impl SourceLoader for MapLoader {
    fn load(&mut self, name: Name) -> Result<Term, LoadError> {
        self.units.get(&name).cloned().ok_or_else(|| LoadError {
            name: name.to_string_owned(),
            reason: "no such unit registered with this loader".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use build::*;

    #[test]
    fn map_loader_round_trips_a_registered_unit() {
        let mut loader = MapLoader::new();
        let unit = name("main");
        loader.insert(Name::intern("main"), unit.clone());
        let loaded = loader.load(Name::intern("main")).expect("registered");
        assert!(Rc::ptr_eq(&loaded, &unit));
    }

    #[test]
    fn missing_unit_is_an_error() {
        let mut loader = MapLoader::new();
        assert!(loader.load(Name::intern("nope")).is_err());
    }

    #[test]
    fn internal_span_is_not_attributable() {
        let t = char_lit('x' as u32);
        assert!(t.span().is_internal());
    }
}
