//! The pre-populated outer binding scope seeding [`PrimOp`]-typed names
//! (§1 "the prelude of built-in types and operators"). The core treats
//! the prelude as data, not as a scanner-recognized keyword table: this
//! module just builds the root [`Layer`] every top-level `prog` starts
//! from.

use crate::ast::Span;
use crate::hook::PrimOp;
use crate::ir::ty::{simple, Param, TypeKind};
use crate::layer::{Binder, Layer, LayerKind, Value};
use crate::symbol::Name;

fn int_binop(yields: TypeKind) -> crate::ir::ty::Type {
    let int1 = simple(TypeKind::Int1);
    std::rc::Rc::new(TypeKind::Proc {
        params: vec![
            Param { name: None, ty: int1.clone() },
            Param { name: None, ty: int1 },
        ],
        yields: simple(yields),
    })
}

/// Build a fresh root layer with every [`PrimOp`] bound to a procedure
/// type over `int1` operands (a representative ground instance; the
/// transformer's per-call-site type checking does the real dispatch
/// against the argument types actually supplied, the way the original's
/// hook dispatch in `transform.c` does, not this prelude binding).
#[must_use] pub fn root_layer() -> Layer {
    let mut layer = Layer::root(LayerKind::Plain);
    PrimOp::scan(|op, keyword| {
        let ty = int_binop(TypeKind::Int1);
        layer.set(
            Name::intern(keyword),
            Binder { info: ty.clone(), value: Value::Type(ty), span: Span::INTERNAL },
        );
    });
    layer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_prim_op_keyword_is_bound() {
        let layer = root_layer();
        PrimOp::scan(|_, keyword| {
            assert!(layer.try_get(Name::intern(keyword)).is_some(), "missing {keyword}");
        });
    }
}
