//! Skolemization (§4.7), grounded on `original_source/type.c`'s
//! `skolemize`/`isSkolemizable`.
//!
//! A "labeler" layer there prevents infinite recursion into cyclic
//! structured types while deciding Skolemizability; here we use a plain
//! `HashSet` keyed by `Rc` pointer identity, since the only thing the
//! original's labeler ever records is "have I visited this pointer
//! before", not any actual value.

use std::collections::HashSet;
use std::rc::Rc;

use crate::ctx::TransformCtx;
use crate::ir::ty::{Type, TypeKind};
use crate::layer::Layer;

/// Produce a fresh opaque Skolem witness for `ty` (assumed strongly
/// ground in `layer`), mirroring `skolemize`. If `ty` is Skolemizable
/// (has a proper subtype other than itself), the witness wraps it in a
/// `sko` node; otherwise the witness is a structurally-identical copy at
/// a fresh address, so it is still unique enough to use as a Skolem
/// layer key.
pub fn skolemize(ctx: &mut TransformCtx, layer: &Layer, ty: &Type) -> Type {
    let mut seen = HashSet::new();
    if is_skolemizable(layer, ty, &mut seen) {
        Rc::new(TypeKind::Sko { base: ty.clone(), id: ctx.sko_ids().next() })
    } else {
        copy_shallow(ty)
    }
}

/// `isSkolemizable`: true if `ty` has at least one proper subtype
/// distinct from itself.
fn is_skolemizable(layer: &Layer, ty: &Type, seen: &mut HashSet<*const TypeKind>) -> bool {
    let ptr = Rc::as_ptr(ty);
    if !seen.insert(ptr) {
        // Already visited this node on the current recursion path: a
        // cyclic structured type does not itself add Skolemizability
        // beyond what its acyclic parts already contribute.
        return false;
    }
    match &**ty {
        // Trivially Skolemizable: can be witnessed by an ALTS/GEN/FORM
        // member, a joker's wider set, or (for pointers) `null`.
        TypeKind::Gen { .. } | TypeKind::Form { .. } | TypeKind::Joker(_) | TypeKind::Ref(_) | TypeKind::Row(_) => true,

        // Trivially not Skolemizable: every ground instance of these is
        // indistinguishable from the type itself.
        TypeKind::Char0
        | TypeKind::Char1
        | TypeKind::Int0
        | TypeKind::Int1
        | TypeKind::Int2
        | TypeKind::Real0
        | TypeKind::Real1
        | TypeKind::Void
        | TypeKind::Null
        | TypeKind::List => false,

        TypeKind::Array { elem, .. } => is_skolemizable(layer, elem, seen),
        TypeKind::Var(inner) | TypeKind::Cell(inner) | TypeKind::TypeOf(inner) => is_skolemizable(layer, inner, seen),

        TypeKind::Proc { params, yields } => {
            params.iter().any(|p| is_skolemizable(layer, &p.ty, seen)) || is_skolemizable(layer, yields, seen)
        }

        TypeKind::Tuple(slots) => slots.iter().any(|s| is_skolemizable(layer, &s.ty, seen)),

        // `sym(no-name)`, the anonymous nominal type, is Skolemizable;
        // a named `sym` is not (it denotes exactly one declared type).
        TypeKind::Sym(name) => name.with_str(str::is_empty),

        TypeKind::Sko { .. } => false,
    }
}

/// Copy a type's pair head unchanged, giving it a fresh `Rc` address
/// (§4.7: "copy the pair head of the base unchanged, so the witness is
/// still at a unique pointer address").
fn copy_shallow(ty: &Type) -> Type {
    Rc::new(match &**ty {
        TypeKind::Char0 => TypeKind::Char0,
        TypeKind::Char1 => TypeKind::Char1,
        TypeKind::Int0 => TypeKind::Int0,
        TypeKind::Int1 => TypeKind::Int1,
        TypeKind::Int2 => TypeKind::Int2,
        TypeKind::Real0 => TypeKind::Real0,
        TypeKind::Real1 => TypeKind::Real1,
        TypeKind::Void => TypeKind::Void,
        TypeKind::Null => TypeKind::Null,
        TypeKind::List => TypeKind::List,
        TypeKind::Sym(name) => TypeKind::Sym(*name),
        other => panic!("copy_shallow called on a Skolemizable type: {other:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ty::simple;
    use crate::layer::LayerKind;

    #[test]
    fn int_is_not_skolemizable_and_copies_shallow() {
        let mut ctx = TransformCtx::new();
        let layer = Layer::root(LayerKind::Plain);
        let t = simple(TypeKind::Int1);
        let witness = skolemize(&mut ctx, &layer, &t);
        assert!(matches!(&*witness, TypeKind::Int1));
        assert!(!Rc::ptr_eq(&witness, &t));
    }

    #[test]
    fn joker_is_skolemizable_and_wrapped_in_sko() {
        let mut ctx = TransformCtx::new();
        let layer = Layer::root(LayerKind::Plain);
        let t = simple(TypeKind::Joker(crate::ir::ty::JokerTag::Obj));
        let witness = skolemize(&mut ctx, &layer, &t);
        assert!(matches!(&*witness, TypeKind::Sko { .. }));
    }

    #[test]
    fn two_skolemizations_of_the_same_type_are_distinct_witnesses() {
        let mut ctx = TransformCtx::new();
        let layer = Layer::root(LayerKind::Plain);
        let t = simple(TypeKind::Joker(crate::ir::ty::JokerTag::Obj));
        let a = skolemize(&mut ctx, &layer, &t);
        let b = skolemize(&mut ctx, &layer, &t);
        assert!(!Rc::ptr_eq(&a, &b));
    }
}
