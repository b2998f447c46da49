//! Second-pass cleanup after a top-level `prog` has been transformed
//! (§4.9), grounded on `original_source/forward.c`'s `updatePointers`/
//! `updateProcedures`.

use crate::ctx::TransformCtx;
use crate::diagnostics::{Diagnostic, Position};
use crate::ir::ty::PointerBase;
use crate::layer::{Layer, LayerKind};

/// `update_pointers`: walk every registered forward-pointer base and
/// replace it in place with its bound value, if any. A base whose name
/// is still unbound is a diagnostic, not an internal error — the
/// original's `objectError(right, typeExeErr)`-style checks stay
/// user-facing.
pub fn resolve_forward_pointers(ctx: &mut TransformCtx, layer: &Layer) {
    for base in ctx.bases().to_vec() {
        let name = match &*base.borrow() {
            PointerBase::Forward(name) => *name,
            PointerBase::Resolved(_) => continue,
        };
        match layer.try_get(name) {
            Some(binder) => {
                *base.borrow_mut() = PointerBase::Resolved(binder.info.clone());
            }
            None => {
                ctx.diagnostics.record(Position(0), Diagnostic::UnforwardedPointer);
            }
        }
    }
}

/// `update_procedures`: dequeue every pending procedure closure, rebind
/// its parameters to fresh stub names in a new plain layer, transform
/// its body, and check the result coerces to its declared yield type.
/// Re-expanding a body may enqueue more procedures; this runs to fixed
/// point, matching the original's single `while` loop over the shared
/// `(first_proc, last_proc)` queue.
pub fn resolve_procedures(
    ctx: &mut TransformCtx,
    mut transform_body: impl FnMut(&mut TransformCtx, &crate::ast::Term, &Layer) -> (crate::ir::ty::Type, crate::ir::expr::Expr),
) -> Vec<crate::ir::expr::Expr> {
    let mut expanded = Vec::new();
    while let Some(pending) = ctx.dequeue_procedure() {
        let mut layer = pending.layer.push(LayerKind::Plain);
        for param in &pending.params {
            if let Some(name) = param.name {
                let stub = crate::symbol::Name::make_stub(name);
                layer.set(
                    stub,
                    crate::layer::Binder {
                        info: param.ty.clone(),
                        value: crate::layer::Value::Type(param.ty.clone()),
                        span: crate::ast::Span::INTERNAL,
                    },
                );
            }
        }
        let (mut body_ty, mut body_val) = transform_body(ctx, &pending.body, &layer);
        let accepts = matches!(&*pending.yields, crate::ir::ty::TypeKind::Void)
            || crate::coerce::is_ground_coercing(ctx, &body_ty, &pending.yields);
        if !accepts {
            ctx.diagnostics.record(Position(0), Diagnostic::ProcedureYieldMismatch);
        } else if !matches!(&*pending.yields, crate::ir::ty::TypeKind::Void) {
            let _ = crate::coerce::is_coerced(ctx, &mut body_ty, &mut body_val, &layer, &pending.yields);
        }
        expanded.push(body_val);
    }
    expanded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ty::{simple, Base, PointerBase, TypeKind};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn resolves_a_bound_forward_pointer() {
        let mut ctx = TransformCtx::new();
        let mut layer = Layer::root(LayerKind::Plain);
        let name = crate::symbol::Name::intern("node");
        let base: Base = Rc::new(RefCell::new(PointerBase::Forward(name)));
        ctx.register_base(base.clone());

        layer.set(
            name,
            crate::layer::Binder { info: simple(TypeKind::Int1), value: crate::layer::Value::Type(simple(TypeKind::Int1)), span: crate::ast::Span::INTERNAL },
        );
        resolve_forward_pointers(&mut ctx, &layer);
        assert!(matches!(&*base.borrow(), PointerBase::Resolved(t) if matches!(**t, TypeKind::Int1)));
    }

    #[test]
    fn unbound_forward_pointer_is_a_diagnostic() {
        let mut ctx = TransformCtx::new();
        let layer = Layer::root(LayerKind::Plain);
        let base: Base = Rc::new(RefCell::new(PointerBase::Forward(crate::symbol::Name::intern("ghost"))));
        ctx.register_base(base);
        resolve_forward_pointers(&mut ctx, &layer);
        assert!(!ctx.diagnostics.is_empty());
    }
}
