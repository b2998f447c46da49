//! Binding scopes (§4.2 "Layer").
//!
//! The original keeps a chain of hand-balanced AVL trees (an explicit
//! left-heavy/right-heavy/even tag per binder) ordered by pointer
//! identity. Since every [`Name`] here is already an interned dense id
//! (`Ord` on its backing `NonZeroU32`), pointer-identity ordering and
//! `Name`'s derived `Ord` coincide, so a persistent balanced map already
//! gives us the original's tree discipline for free. `im::OrdMap` is a
//! teacher dependency (`Cargo.toml`'s `im = "15.1"`), so we reuse it here
//! rather than hand-rolling AVL balancing, the way `build_mir.rs` reuses
//! `HashMap`-based caches instead of a bespoke tree.
//!
//! Persistence also buys us cheap, correct "undo": form application and
//! procedure re-expansion both need to push a scope, try something, and
//! discard it on failure (§4.5, §4.9); cloning an `im::OrdMap` is O(1)
//! and shares structure with the original.

use im::OrdMap;

use crate::ast::Span;
use crate::ir::ty::Type;
use crate::symbol::Name;

/// What a layer's bindings arise from (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// A general associative map (e.g. a `with`'s local equates).
    Plain,
    /// Bindings from a `with`/`prog` equate form, visible to form
    /// dispatch.
    Equate,
    /// Temporary bindings for quantified names created during form
    /// application (§4.5, §4.7).
    Skolem,
}

/// One binder: a bound name's type (or, for a type-valued binding, the
/// layer its free names resolve in), its value, and the span of its
/// defining site.
#[derive(Clone)]
pub struct Binder {
    pub info: Type,
    pub value: Value,
    pub span: Span,
}

/// What a binder's `value` slot can hold. Kept as an enum rather than a
/// trait object since a layer only ever binds one of these two things.
#[derive(Clone)]
pub enum Value {
    Type(Type),
    Expr(crate::ir::expr::Expr),
}

/// One scope in the binder chain. Persistent: cloning a `Layer` is O(1)
/// and shares the tree with its source, matching how `push`/`pop` in the
/// original only ever manipulate the chain's topmost link.
#[derive(Clone)]
pub struct Layer {
    kind: LayerKind,
    here: OrdMap<Name, Binder>,
    outer: Option<std::rc::Rc<Layer>>,
}

impl Layer {
    /// A fresh outermost layer (the prelude scope sits here).
    #[must_use] pub fn root(kind: LayerKind) -> Layer {
        Layer { kind, here: OrdMap::new(), outer: None }
    }

    /// `push`: open a new innermost scope on top of `self`.
    #[must_use] pub fn push(self, kind: LayerKind) -> Layer {
        Layer { kind, here: OrdMap::new(), outer: Some(std::rc::Rc::new(self)) }
    }

    /// `pop`: discard the innermost scope, returning its parent. Panics
    /// if called on a root layer, mirroring the original's assumption
    /// that `pop` is only ever called on a layer a matching `push`
    /// produced.
    #[must_use] pub fn pop(self) -> Layer {
        match self.outer {
            Some(outer) => (*outer).clone(),
            None => panic!("popped past the root layer"),
        }
    }

    #[must_use] pub fn kind(&self) -> LayerKind {
        self.kind
    }

    /// `set`: insert or replace a binding in the innermost tree only.
    pub fn set(&mut self, key: Name, binder: Binder) {
        self.here.insert(key, binder);
    }

    /// `in`: membership test restricted to the innermost tree.
    #[must_use] pub fn contains_here(&self, key: Name) -> bool {
        self.here.contains_key(&key)
    }

    /// `try-get`: search the chain from innermost out.
    #[must_use] pub fn try_get(&self, key: Name) -> Option<&Binder> {
        if let Some(b) = self.here.get(&key) {
            return Some(b);
        }
        self.outer.as_ref().and_then(|outer| outer.try_get(key))
    }

    /// `get`: like [`Layer::try_get`], panicking on an absent name. The
    /// transformer is expected to have already recorded an `unbound`
    /// diagnostic and substituted `skip` before ever calling this with a
    /// name that might not resolve (§4.8, §7); reaching here with a
    /// truly-absent name is an internal invariant violation.
    #[must_use] pub fn get(&self, key: Name) -> &Binder {
        self.try_get(key).unwrap_or_else(|| panic!("unbound name {key:?} reached Layer::get"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ty::{simple, TypeKind};

    fn binder(ty: Type) -> Binder {
        Binder { info: ty.clone(), value: Value::Type(ty), span: Span::INTERNAL }
    }

    #[test]
    fn inner_binding_shadows_outer() {
        let x = Name::intern("x");
        let mut outer = Layer::root(LayerKind::Plain);
        outer.set(x, binder(simple(TypeKind::Int1)));

        let mut inner = outer.push(LayerKind::Plain);
        inner.set(x, binder(simple(TypeKind::Real1)));

        assert!(matches!(&inner.get(x).value, Value::Type(t) if matches!(**t, TypeKind::Real1)));
        let popped = inner.pop();
        assert!(matches!(&popped.get(x).value, Value::Type(t) if matches!(**t, TypeKind::Int1)));
    }

    #[test]
    fn try_get_misses_cleanly() {
        let layer = Layer::root(LayerKind::Plain);
        assert!(layer.try_get(Name::intern("nope")).is_none());
    }

    #[test]
    fn contains_here_ignores_outer_scopes() {
        let x = Name::intern("y");
        let mut outer = Layer::root(LayerKind::Plain);
        outer.set(x, binder(simple(TypeKind::Int1)));
        let inner = outer.push(LayerKind::Plain);
        assert!(!inner.contains_here(x));
        assert!(inner.try_get(x).is_some());
    }
}
