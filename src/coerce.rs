//! The coercion engine (§4.4), grounded on `original_source/coerce.c`'s
//! `isCoerced`/`isCoercing`.
//!
//! The original's `isCoercing` is a `while` loop "simulating tail
//! recursion" through a chain of nested GCC statement-expression
//! lambdas, one per candidate coercion target; we write the equivalent
//! as ordinary recursive calls, since Rust doesn't need the tail-call
//! simulation trick a C compiler without guaranteed TCO does.

use crate::ctx::TransformCtx;
use crate::hook::Hook;
use crate::ir::expr::{Constant, Expr, ExprKind};
use crate::ir::ty::{simple, Type, TypeKind};
use crate::layer::Layer;
use crate::subtype::{is_matched, is_subtype};

type Etc<'a> = dyn FnMut(&mut TransformCtx, Type, Expr) -> bool + 'a;

/// `is_coerced`: top-level entry point. If `l_type` is already a subtype
/// of `r_type`, succeeds immediately. Otherwise searches the coercion
/// table, rewriting `l_term` at each step, until some coercion sequence
/// both type-checks and satisfies the continuation.
///
/// Opens a fresh match-obligation scope for the whole attempt (mirroring
/// `original_source/coerce.c:43`'s `f.oldMatches = matches; matches =
/// nil;`) and, once a candidate is otherwise acceptable, calls
/// `is_matched` to re-examine whatever obligations the search deferred
/// before committing to it.
pub fn is_coerced(
    ctx: &mut TransformCtx,
    l_type: &mut Type,
    l_term: &mut Expr,
    r_layer: &Layer,
    r_type: &Type,
) -> bool {
    let plain = Layer::root(crate::layer::LayerKind::Plain);
    let mut result = None;
    let mut scope = ctx.begin_matches();
    let ok = is_coercing(&mut scope, &plain, l_type.clone(), l_term.clone(), r_layer, r_type, &mut |ctx, ty, term| {
        if !is_matched(ctx) {
            return false;
        }
        result = Some((ty, term));
        true
    });
    if ok {
        if let Some((ty, term)) = result {
            *l_type = ty;
            *l_term = term;
        }
    }
    ok
}

/// `is_coercing`: the workhorse. `etc` receives the (possibly rewritten)
/// type/term pair and decides whether to accept it.
pub fn is_coercing(
    ctx: &mut TransformCtx,
    l_layer: &Layer,
    l_type: Type,
    l_term: Expr,
    r_layer: &Layer,
    r_type: &Type,
    etc: &mut Etc<'_>,
) -> bool {
    let lt = l_type.clone();
    let lm = l_term.clone();
    let without_coercion = is_subtype(ctx, l_layer, &l_type, r_layer, r_type, &mut |ctx| {
        etc(ctx, lt.clone(), lm.clone())
    });
    if without_coercion {
        return true;
    }

    for (target, cast_hook) in candidates(&l_type) {
        let cast_term = fold_cast(cast_hook, &l_term, &target);
        if is_coercing(ctx, l_layer, target.clone(), cast_term.clone(), r_layer, r_type, etc) {
            return true;
        }
        let _ = cast_term;
    }
    false
}

/// Ground coercion: like [`is_coercing`] but `r_type` is known to be
/// strongly ground, so no match obligations can be generated; used by
/// `original_source/type.c`'s `isGroundCotype` fast path.
pub fn is_ground_coercing(ctx: &mut TransformCtx, l_type: &Type, r_type: &Type) -> bool {
    let layer = Layer::root(crate::layer::LayerKind::Plain);
    let dummy = Expr::new(l_type.clone(), ExprKind::Skip);
    is_coercing(ctx, &layer, l_type.clone(), dummy, &layer, r_type, &mut |_ctx, _ty, _term| true)
}

/// The coercion table (§4.4): for a given source type, the candidate
/// target types in trial order, paired with the `Hook` tag the emitted
/// cast node should carry.
fn candidates(ty: &Type) -> Vec<(Type, Hook)> {
    match &**ty {
        TypeKind::Char0 => vec![
            (simple(TypeKind::Char1), Hook::Char1),
            (simple(TypeKind::Int0), Hook::Int0),
            (simple(TypeKind::Int1), Hook::Int1),
        ],
        TypeKind::Char1 => vec![(simple(TypeKind::Int2), Hook::Int2)],
        TypeKind::Int0 => vec![(simple(TypeKind::Int1), Hook::Int1), (simple(TypeKind::Int2), Hook::Int2)],
        TypeKind::Int1 => vec![(simple(TypeKind::Int2), Hook::Int2)],
        TypeKind::Real0 => vec![(simple(TypeKind::Real1), Hook::Real1)],
        TypeKind::Ref(base) => vec![(std::rc::Rc::new(TypeKind::Row(base.clone())), Hook::Row)],
        TypeKind::Var(inner) => vec![(inner.clone(), Hook::Refer)],
        _ => vec![],
    }
}

/// Wrap `term` in a cast node, constant-folding when `term` is already a
/// constant (§4.4: `toChar0(k)`, `toInt0(k)`, etc. apply the target
/// type's modular-wrap semantics).
fn fold_cast(to: Hook, term: &Expr, target_ty: &Type) -> Expr {
    if let ExprKind::Constant(c) = &*term.kind {
        if let Some(folded) = fold_constant(to, c) {
            return Expr::new(target_ty.clone(), ExprKind::Constant(folded));
        }
    }
    Expr::new(target_ty.clone(), ExprKind::Cast { to, value: term.clone() })
}

fn fold_constant(to: Hook, c: &Constant) -> Option<Constant> {
    match (to, c) {
        (Hook::Char1, Constant::Char(code)) => Some(Constant::Char(*code)),
        (Hook::Int0, Constant::Char(code)) => Some(Constant::Int(i64::from(*code as u8))),
        (Hook::Int1, Constant::Char(code)) => Some(Constant::Int(i64::from(*code as u32) & 0xFFFF_FFFF)),
        (Hook::Int2, Constant::Char(code)) => Some(Constant::Int(i64::from(*code))),
        (Hook::Int1, Constant::Int(n)) => Some(Constant::Int(i64::from(*n as i32))),
        (Hook::Int2, Constant::Int(n)) => Some(Constant::Int(*n)),
        (Hook::Real1, Constant::Real(x)) => Some(Constant::Real(*x)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::LayerKind;

    #[test]
    fn char0_coerces_to_int1_through_the_table() {
        let mut ctx = TransformCtx::new();
        let l_layer = Layer::root(LayerKind::Plain);
        let r_layer = Layer::root(LayerKind::Plain);
        let mut ty = simple(TypeKind::Char0);
        let mut term = Expr::new(ty.clone(), ExprKind::Constant(Constant::Char(65)));
        let target = simple(TypeKind::Int1);
        assert!(is_coerced(&mut ctx, &mut ty, &mut term, &r_layer, &target));
        assert!(matches!(&*ty, TypeKind::Int1));
        let _ = l_layer;
    }

    #[test]
    fn incompatible_types_do_not_coerce() {
        let mut ctx = TransformCtx::new();
        let r_layer = Layer::root(LayerKind::Plain);
        let mut ty = simple(TypeKind::Int1);
        let mut term = Expr::new(ty.clone(), ExprKind::Constant(Constant::Int(1)));
        let target = simple(TypeKind::Proc { params: vec![], yields: simple(TypeKind::Void) });
        assert!(!is_coerced(&mut ctx, &mut ty, &mut term, &r_layer, &target));
    }
}
