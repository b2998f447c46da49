//! Form closures, application, and subsumption (§4.5, §4.6), grounded on
//! `original_source/form.c`'s `isApplied`/`formConcatenate` and the
//! subsumption check they both rely on.

use crate::ctx::TransformCtx;
use crate::ir::expr::Expr;
use crate::ir::ty::{Param, Type, TypeKind};
use crate::layer::{Layer, LayerKind};

/// One overload of a form closure: its (possibly `gen`-prefixed) type,
/// the layer its free names resolve in, and its still-untransformed
/// body (transformed lazily, on the member that actually gets applied).
#[derive(Clone)]
pub struct Member {
    pub ty: Type,
    pub layer: Layer,
    pub body: crate::ast::Term,
}

/// A form closure: `close` followed by one or more members (§3 "Form
/// closure"). A singleton closure is the common case; `alt` produces
/// multi-member closures.
#[derive(Clone)]
pub struct Closure {
    pub members: Vec<Member>,
}

/// Destructure a member's type into its `gen` parameter names and
/// `(params, yields)`, Skolemizing each `gen` name into `layer` as we go
/// (§4.5 step 2).
fn destructure_member_type(
    ctx: &mut TransformCtx,
    layer: &mut Layer,
    ty: &Type,
) -> (Vec<Param>, Type) {
    let mut cur = ty.clone();
    loop {
        match &*cur.clone() {
            TypeKind::Gen { params, base } => {
                for &name in params {
                    let witness = crate::skolem::skolemize(ctx, layer, base);
                    layer.set(
                        name,
                        crate::layer::Binder {
                            info: witness,
                            value: crate::layer::Value::Type(base.clone()),
                            span: crate::ast::Span::INTERNAL,
                        },
                    );
                }
                cur = base.clone();
            }
            TypeKind::Proc { params, yields } | TypeKind::Form { params, yields } => {
                return (params.clone(), yields.clone());
            }
            other => panic!("member type is neither proc/form nor gen-prefixed: {other:?}"),
        }
    }
}

/// `apply_form`: search `closure`'s members in declaration order for the
/// first whose parameter list accepts `arg_types`/`arg_values`. On
/// success, transforms the member's body and coerces the result to the
/// member's yield type.
///
/// The actual body transformation is supplied by the caller as
/// `transform_body`, since the transformer (§4.8) is what knows how to
/// reduce a raw [`crate::ast::Term`] — `form.rs` only owns dispatch and
/// coercion, matching how `original_source/form.c` calls back into
/// `transform.c`'s `transform` rather than embedding it.
pub fn apply_form(
    ctx: &mut TransformCtx,
    closure: &Closure,
    arg_types: &[Type],
    arg_values: &[Expr],
    transform_body: &mut dyn FnMut(&mut TransformCtx, &crate::ast::Term, &Layer) -> (Type, Expr),
) -> Option<(Type, Expr)> {
    'member: for member in &closure.members {
        let mut layer = member.layer.clone().push(LayerKind::Skolem);
        let (params, yields) = destructure_member_type(ctx, &mut layer, &member.ty);

        if params.len() != arg_types.len() {
            continue;
        }

        let mut bound = Vec::with_capacity(params.len());
        for ((param, arg_ty), arg_val) in params.iter().zip(arg_types).zip(arg_values) {
            let mut ty = arg_ty.clone();
            let mut val = arg_val.clone();
            if !crate::coerce::is_coerced(ctx, &mut ty, &mut val, &layer, &param.ty) {
                continue 'member;
            }
            if let Some(name) = param.name {
                bound.push((name, ty, val));
            }
        }

        for (name, ty, val) in bound {
            layer.set(
                name,
                crate::layer::Binder {
                    info: ty,
                    value: crate::layer::Value::Expr(val),
                    span: crate::ast::Span::INTERNAL,
                },
            );
        }

        let (mut result_ty, mut result_val) = transform_body(ctx, &member.body, &layer);
        if matches!(&*yields, TypeKind::Void) {
            result_val = Expr::new(yields.clone(), crate::ir::expr::ExprKind::Cast {
                to: crate::hook::Hook::Void,
                value: result_val,
            });
            result_ty = yields.clone();
        } else if !crate::coerce::is_coerced(ctx, &mut result_ty, &mut result_val, &layer, &yields) {
            continue 'member;
        }
        return Some((result_ty, result_val));
    }
    None
}

/// `is_subsuming` / `is_subsumed` (§4.6): a member form type subsumes
/// another when the other's parameter list coerces componentwise into
/// the first's, without generating diagnostics.
pub fn is_subsuming(ctx: &mut TransformCtx, wider: &Type, narrower: &Type) -> bool {
    let (Some(wp), Some(np)) = (as_callable_params(wider), as_callable_params(narrower)) else {
        return false;
    };
    if wp.len() != np.len() {
        return false;
    }
    wp.iter().zip(np.iter()).all(|(w, n)| crate::coerce::is_ground_coercing(ctx, &n.ty, &w.ty))
}

fn as_callable_params(ty: &Type) -> Option<&[Param]> {
    match &**ty {
        TypeKind::Proc { params, .. } | TypeKind::Form { params, .. } => Some(params),
        _ => None,
    }
}

/// `form_concatenate`: build an `alt` closure from `left`'s members
/// followed by `right`'s members that are not subsumed by any member
/// already accumulated.
pub fn form_concatenate(ctx: &mut TransformCtx, left: Closure, right: Closure) -> Closure {
    let mut members = Vec::new();
    let mut types: Vec<Type> = Vec::new();
    for member in left.members.into_iter().chain(right.members) {
        if types.iter().any(|acc| is_subsuming(ctx, acc, &member.ty)) {
            continue;
        }
        types.push(member.ty.clone());
        members.push(member);
    }
    Closure { members }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ty::simple;

    fn proc_ty(param_tys: Vec<Type>, yields: Type) -> Type {
        std::rc::Rc::new(TypeKind::Proc {
            params: param_tys.into_iter().map(|ty| Param { name: None, ty }).collect(),
            yields,
        })
    }

    #[test]
    fn wider_int2_param_subsumes_narrower_int1() {
        let mut ctx = TransformCtx::new();
        let wider = proc_ty(vec![simple(TypeKind::Int2)], simple(TypeKind::Void));
        let narrower = proc_ty(vec![simple(TypeKind::Int1)], simple(TypeKind::Void));
        assert!(is_subsuming(&mut ctx, &wider, &narrower));
        assert!(!is_subsuming(&mut ctx, &narrower, &wider));
    }

    #[test]
    fn concatenate_drops_subsumed_members() {
        let mut ctx = TransformCtx::new();
        let layer = Layer::root(LayerKind::Plain);
        let body = crate::ast::build::hook(crate::hook::Hook::Skip);
        let wide = Member { ty: proc_ty(vec![simple(TypeKind::Int2)], simple(TypeKind::Void)), layer: layer.clone(), body: body.clone() };
        let narrow = Member { ty: proc_ty(vec![simple(TypeKind::Int1)], simple(TypeKind::Void)), layer: layer.clone(), body };
        let left = Closure { members: vec![wide] };
        let right = Closure { members: vec![narrow] };
        let combined = form_concatenate(&mut ctx, left, right);
        assert_eq!(combined.members.len(), 1);
    }
}
