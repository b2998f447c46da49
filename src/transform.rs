//! The central reducer (§4.8), grounded on the dispatch shape of
//! `original_source/form.c`/`type.c` but written against the structured
//! [`crate::ast::Term`] → [`crate::ir::expr::Expr`] pipeline rather than
//! a single untyped pair tree.
//!
//! A term that fails to transform is replaced by `skip : void` (§4.8,
//! §7) so reduction continues and more diagnostics can surface; nothing
//! here aborts on a source/object error, only on an internal invariant
//! violation (`panic!`, matching the teacher's own
//! `panic!("uninferred type variable ...")` idiom).
//!
//! Type expressions are themselves `Term`s before elaboration (§3), the
//! same way the original threads one universal pair tree through both
//! value and type syntax; [`Transformer::transform_type`] is the
//! type-level twin of [`Transformer::transform`].

use crate::ast::{Span, Term, TermKind};
use crate::ctx::TransformCtx;
use crate::diagnostics::{Diagnostic, Position};
use crate::form::{Closure, Member};
use crate::hook::{Hook, PrimOp};
use crate::ir::expr::{CaseArm, Constant, Equate, Expr, ExprKind};
use crate::ir::ty::{simple, Param, PointerBase, Slot, Type, TypeKind};
use crate::layer::{Binder, Layer, LayerKind, Value};

/// A reduced `(type, value)` pair, matching §4.8's description of the
/// transformer's output.
pub type Reduced = (Type, Expr);

fn position(span: Span) -> Position {
    Position(span.offset)
}

fn skip() -> Reduced {
    (simple(TypeKind::Void), Expr::new(simple(TypeKind::Void), ExprKind::Skip))
}

fn row_of(elem: Type) -> Type {
    simple(TypeKind::Row(std::rc::Rc::new(std::cell::RefCell::new(PointerBase::Resolved(elem)))))
}

/// The scalar type an explicit-width integer-literal hook names.
fn scalar_type_for_width(hook: Hook) -> Type {
    match hook {
        Hook::Char0 => simple(TypeKind::Char0),
        Hook::Char1 => simple(TypeKind::Char1),
        Hook::Int0 => simple(TypeKind::Int0),
        Hook::Int1 => simple(TypeKind::Int1),
        Hook::Int2 => simple(TypeKind::Int2),
        other => panic!("{other:?} does not name a scalar integer-literal width"),
    }
}

/// The narrowest type every one of `types` can still coerce into (§4.4):
/// coercion only ever widens, so a mixed-width primitive application's
/// result type is the join across its operands, not simply the first
/// operand's own type. Tried in increasing width order along the two
/// independent coercion tracks (`char`/`int`, `real`) so the first
/// candidate that accepts every operand is also the narrowest one that
/// does.
fn prim_common_type(ctx: &mut TransformCtx, types: &[Type]) -> Option<Type> {
    let ladder = [
        simple(TypeKind::Char0),
        simple(TypeKind::Char1),
        simple(TypeKind::Int0),
        simple(TypeKind::Int1),
        simple(TypeKind::Int2),
        simple(TypeKind::Real0),
        simple(TypeKind::Real1),
    ];
    ladder.into_iter().find(|candidate| types.iter().all(|t| crate::coerce::is_ground_coercing(ctx, t, candidate)))
}

/// A value is *removable* (§4.8 `with`) when it can be inlined at its
/// use sites and never needs its own emitted binding: constants, `nil`,
/// `skip`, and constant `row char0` strings.
fn is_removable(expr: &Expr) -> bool {
    matches!(&*expr.kind, ExprKind::Constant(_) | ExprKind::NilLit | ExprKind::Skip)
}

fn as_closure(expr: &Expr) -> Option<Closure> {
    match &*expr.kind {
        ExprKind::Closure(c) => Some((**c).clone()),
        _ => None,
    }
}

/// The transformer. Holds the loader collaborator (§6) and nothing else
/// mutable of its own; all engine state lives in the [`TransformCtx`]
/// passed to every call, per §5's "never a module global" policy.
pub struct Transformer<'a> {
    pub loader: &'a mut dyn crate::ast::SourceLoader,
}

impl Transformer<'_> {
    /// Reduce `term` in `layer`, dispatching on its outer tag.
    pub fn transform(&mut self, ctx: &mut TransformCtx, layer: &Layer, term: &Term) -> Reduced {
        match &**term {
            TermKind::Char(c) => (simple(TypeKind::Char1), Expr::new(simple(TypeKind::Char1), ExprKind::Constant(Constant::Char(*c)))),
            TermKind::Int(n) => (simple(TypeKind::Int2), Expr::new(simple(TypeKind::Int2), ExprKind::Constant(Constant::Int(*n)))),
            TermKind::IntAt(n, width) => {
                let ty = scalar_type_for_width(*width);
                (ty.clone(), Expr::new(ty, ExprKind::Constant(Constant::Int(*n))))
            }
            TermKind::Real(x) => (simple(TypeKind::Real1), Expr::new(simple(TypeKind::Real1), ExprKind::Constant(Constant::Real(*x)))),
            TermKind::Str(bytes) => {
                let ty = row_of(simple(TypeKind::Char0));
                (ty.clone(), Expr::new(ty, ExprKind::Constant(Constant::Str(bytes.as_ref().into()))))
            }
            TermKind::Hook(Hook::Nil) => (simple(TypeKind::Null), Expr::new(simple(TypeKind::Null), ExprKind::NilLit)),
            TermKind::Hook(Hook::Skip) => skip(),
            TermKind::Hook(Hook::Halt) => (simple(TypeKind::Void), Expr::new(simple(TypeKind::Void), ExprKind::Halt)),
            TermKind::Hook(other) => panic!("bare hook {other:?} is not a valid top-level value term"),

            TermKind::Name(name) => match layer.try_get(*name) {
                Some(binder) => (binder.info.clone(), expr_of(binder)),
                None => {
                    ctx.diagnostics.record(Position(0), Diagnostic::UnboundName(name.to_string_owned()));
                    skip()
                }
            },

            TermKind::Prim(op) => {
                ctx.diagnostics.record(Position(0), Diagnostic::Other {
                    mnemonic: "bpu",
                    message: format!("bare primitive `{}` used as a value", op.keyword()),
                });
                skip()
            }

            TermKind::PrimApp(op, args, span) => self.transform_prim_app(ctx, layer, *op, args, *span),

            TermKind::Node(hook, args, span) => self.transform_node(ctx, layer, *hook, args, *span),
        }
    }

    /// Evaluate `term` as a type expression (§3), the type-level analogue
    /// of [`Transformer::transform`]. Invoked only from contexts that
    /// already know they are looking at a type position (`proc`/`form`
    /// parameter and yield slots, `ref`/`row`/`var`/`array`/`tuple`
    /// annotations); anything else reaching here is an internal error.
    pub fn transform_type(&mut self, ctx: &mut TransformCtx, layer: &Layer, term: &Term) -> Type {
        match &**term {
            TermKind::Hook(Hook::Char0) => simple(TypeKind::Char0),
            TermKind::Hook(Hook::Char1) => simple(TypeKind::Char1),
            TermKind::Hook(Hook::Int0) => simple(TypeKind::Int0),
            TermKind::Hook(Hook::Int1) => simple(TypeKind::Int1),
            TermKind::Hook(Hook::Int2) => simple(TypeKind::Int2),
            TermKind::Hook(Hook::Real0) => simple(TypeKind::Real0),
            TermKind::Hook(Hook::Real1) => simple(TypeKind::Real1),
            TermKind::Hook(Hook::Void) => simple(TypeKind::Void),
            TermKind::Hook(Hook::Null) => simple(TypeKind::Null),
            TermKind::Hook(Hook::ListTy) => simple(TypeKind::List),

            TermKind::Name(name) => match layer.try_get(*name) {
                Some(binder) => match &binder.value {
                    Value::Type(t) => t.clone(),
                    Value::Expr(_) => binder.info.clone(),
                },
                None => {
                    // Not yet bound: register a forward pointer so a
                    // later `resolve_forward_pointers` pass can patch it
                    // once the defining `with`/`prog` equate appears
                    // (§4.9), matching `original_source/forward.c`.
                    let base = std::rc::Rc::new(std::cell::RefCell::new(PointerBase::Forward(*name)));
                    ctx.register_base(base.clone());
                    simple(TypeKind::Row(base))
                }
            },

            TermKind::Node(Hook::Refer, args, _) => {
                let inner = self.transform_type(ctx, layer, &args[0]);
                simple(TypeKind::Ref(std::rc::Rc::new(std::cell::RefCell::new(PointerBase::Resolved(inner)))))
            }
            TermKind::Node(Hook::Row, args, _) => {
                let inner = self.transform_type(ctx, layer, &args[0]);
                simple(TypeKind::Row(std::rc::Rc::new(std::cell::RefCell::new(PointerBase::Resolved(inner)))))
            }
            TermKind::Node(Hook::Var, args, _) => simple(TypeKind::Var(self.transform_type(ctx, layer, &args[0]))),
            TermKind::Node(Hook::Cell, args, _) => simple(TypeKind::Cell(self.transform_type(ctx, layer, &args[0]))),
            TermKind::Node(Hook::TypeOf, args, _) => simple(TypeKind::TypeOf(self.transform_type(ctx, layer, &args[0]))),

            TermKind::Node(Hook::Array, args, span) => {
                let [count_term, elem_term] = args.as_slice() else {
                    panic!("malformed `array` type term");
                };
                let TermKind::Int(count) = &**count_term else {
                    ctx.diagnostics.record(position(*span), Diagnostic::UnexpectedType);
                    return simple(TypeKind::Void);
                };
                let elem = self.transform_type(ctx, layer, elem_term);
                simple(TypeKind::Array { count: u32::try_from(*count).unwrap_or(0), elem })
            }

            TermKind::Node(Hook::Tuple, args, _) => {
                let slots = args
                    .chunks(2)
                    .map(|chunk| {
                        let [ty_term, count_term] = chunk else {
                            panic!("malformed `tuple` slot pair");
                        };
                        let ty = self.transform_type(ctx, layer, ty_term);
                        let count = match &**count_term {
                            TermKind::Int(n) => u32::try_from(*n).unwrap_or(1),
                            _ => 1,
                        };
                        Slot { ty, count }
                    })
                    .collect();
                simple(TypeKind::Tuple(slots))
            }

            TermKind::Node(Hook::Joker, args, span) => {
                let TermKind::Name(tag_name) = &*args[0] else {
                    panic!("`joker` type term's tag is not a name");
                };
                let tag = tag_name.with_str(|s| match s {
                    "obj" => Some(crate::ir::ty::JokerTag::Obj),
                    "exe" => Some(crate::ir::ty::JokerTag::Exe),
                    "inj" => Some(crate::ir::ty::JokerTag::Inj),
                    "foj" => Some(crate::ir::ty::JokerTag::Foj),
                    "mut" => Some(crate::ir::ty::JokerTag::Mut),
                    "rej" => Some(crate::ir::ty::JokerTag::Rej),
                    "nom" => Some(crate::ir::ty::JokerTag::Nom),
                    _ => None,
                });
                match tag {
                    Some(tag) => simple(TypeKind::Joker(tag)),
                    None => {
                        ctx.diagnostics.record(position(*span), Diagnostic::UnexpectedType);
                        simple(TypeKind::Void)
                    }
                }
            }

            TermKind::Node(Hook::Sym, args, _) => {
                let TermKind::Name(n) = &*args[0] else {
                    panic!("`sym` type term's name is not a name");
                };
                simple(TypeKind::Sym(*n))
            }

            TermKind::Node(Hook::Proc, args, _) => {
                let (params, yields, _body) = self.member_shape(ctx, layer, args);
                simple(TypeKind::Proc { params, yields })
            }
            TermKind::Node(Hook::Form, args, _) => {
                let (params, yields, _body) = self.member_shape(ctx, layer, args);
                simple(TypeKind::Form { params, yields })
            }
            TermKind::Node(Hook::Gen, args, _) => {
                let (names, inner_term) = args.split_at(args.len() - 1);
                let names: Vec<_> = names
                    .iter()
                    .map(|t| match &**t {
                        TermKind::Name(n) => *n,
                        _ => panic!("`gen` parameter is not a name"),
                    })
                    .collect();
                let base = self.transform_type(ctx, layer, &inner_term[0]);
                simple(TypeKind::Gen { params: names, base })
            }

            _other => panic!("term in type position has no type-evaluation rule"),
        }
    }

    /// Parse the common `proc`/`form` node shape: alternating
    /// `(name, type)` parameter pairs, a trailing yield-type term, and a
    /// body term.
    fn member_shape(&mut self, ctx: &mut TransformCtx, layer: &Layer, args: &[Term]) -> (Vec<Param>, Type, Term) {
        assert!(args.len() >= 2 && (args.len() - 2) % 2 == 0, "malformed proc/form parameter list");
        let (pairs, tail) = args.split_at(args.len() - 2);
        let params = pairs
            .chunks(2)
            .map(|chunk| {
                let [name_term, ty_term] = chunk else { unreachable!() };
                let name = match &**name_term {
                    TermKind::Name(n) => Some(*n),
                    TermKind::Hook(Hook::Skip) => None,
                    _ => panic!("malformed parameter name term"),
                };
                let ty = self.transform_type(ctx, layer, ty_term);
                Param { name, ty }
            })
            .collect();
        let yields = self.transform_type(ctx, layer, &tail[0]);
        (params, yields, tail[1].clone())
    }

    fn build_member_closure(&mut self, ctx: &mut TransformCtx, layer: &Layer, hook: Hook, args: &[Term]) -> (Type, Closure) {
        match hook {
            Hook::Proc | Hook::Form => {
                let (params, yields, body) = self.member_shape(ctx, layer, args);
                let ty = match hook {
                    Hook::Proc => simple(TypeKind::Proc { params, yields }),
                    _ => simple(TypeKind::Form { params, yields }),
                };
                (ty.clone(), Closure { members: vec![Member { ty, layer: layer.clone(), body }] })
            }
            Hook::Gen => {
                let (names, inner) = args.split_at(args.len() - 1);
                let names: Vec<_> = names
                    .iter()
                    .map(|t| match &**t {
                        TermKind::Name(n) => *n,
                        _ => panic!("`gen` parameter is not a name"),
                    })
                    .collect();
                let TermKind::Node(inner_hook, inner_args, _) = &*inner[0] else {
                    panic!("`gen` body is not a `proc`/`form` node");
                };
                let (base_ty, inner_closure) = self.build_member_closure(ctx, layer, *inner_hook, inner_args);
                let gen_ty = simple(TypeKind::Gen { params: names, base: base_ty });
                let mut closure = inner_closure;
                for member in &mut closure.members {
                    member.ty = gen_ty.clone();
                }
                (gen_ty, closure)
            }
            other => panic!("{other:?} is not a closure-producing hook"),
        }
    }

    fn transform_prim_app(&mut self, ctx: &mut TransformCtx, layer: &Layer, op: PrimOp, args: &[Term], span: Span) -> Reduced {
        let reduced: Vec<Reduced> = args.iter().map(|a| self.transform(ctx, layer, a)).collect();
        let common = if reduced.is_empty() {
            simple(TypeKind::Int2)
        } else {
            let types: Vec<Type> = reduced.iter().map(|(ty, _)| ty.clone()).collect();
            match prim_common_type(ctx, &types) {
                Some(ty) => ty,
                None => {
                    ctx.diagnostics.record(position(span), Diagnostic::UnexpectedType);
                    return skip();
                }
            }
        };
        let mut values = Vec::with_capacity(reduced.len());
        for (mut ty, mut val) in reduced {
            if !crate::coerce::is_coerced(ctx, &mut ty, &mut val, layer, &common) {
                ctx.diagnostics.record(position(span), Diagnostic::UnexpectedType);
                return skip();
            }
            values.push(val);
        }
        if let Some(folded) = fold_prim(op, &values) {
            return (common, folded);
        }
        (common.clone(), Expr::new(common, ExprKind::Prim { op, args: values }))
    }

    fn transform_node(&mut self, ctx: &mut TransformCtx, layer: &Layer, hook: Hook, args: &[Term], span: Span) -> Reduced {
        match hook {
            Hook::With => self.transform_with(ctx, layer, args, span, false),
            Hook::Prog => self.transform_with(ctx, layer, args, span, true),

            Hook::Load => {
                if let [unit] = args {
                    if let TermKind::Name(name) = &**unit {
                        match self.loader.load(*name) {
                            Ok(loaded) => return self.transform(ctx, layer, &loaded),
                            Err(e) => {
                                ctx.diagnostics.record(position(span), Diagnostic::Other { mnemonic: "ldf", message: e.to_string() });
                                return skip();
                            }
                        }
                    }
                }
                panic!("malformed `load` node reached the transformer");
            }

            Hook::Proc | Hook::Form | Hook::Gen => {
                let (ty, closure) = self.build_member_closure(ctx, layer, hook, args);
                (ty.clone(), Expr::new(ty, ExprKind::Closure(std::rc::Rc::new(closure))))
            }

            Hook::Apply => self.transform_apply(ctx, layer, args, span),

            Hook::If => self.transform_if(ctx, layer, args),
            Hook::Case => self.transform_case(ctx, layer, args),
            Hook::Last => self.transform_last(ctx, layer, args),
            Hook::While => self.transform_while(ctx, layer, args),

            Hook::CellMake => {
                let (ty, val) = self.transform(ctx, layer, &args[0]);
                let cell_ty = simple(TypeKind::Cell(ty));
                (cell_ty.clone(), Expr::new(cell_ty, ExprKind::CellMake(val)))
            }
            Hook::CellGet => {
                let (ty, val) = self.transform(ctx, layer, &args[0]);
                let inner = match &*ty {
                    TypeKind::Cell(inner) => inner.clone(),
                    _ => {
                        ctx.diagnostics.record(position(span), Diagnostic::UnexpectedType);
                        return skip();
                    }
                };
                (inner.clone(), Expr::new(inner, ExprKind::CellGet(val)))
            }
            Hook::CellSet => {
                let (_, cell) = self.transform(ctx, layer, &args[0]);
                let (_, value) = self.transform(ctx, layer, &args[1]);
                (simple(TypeKind::Void), Expr::new(simple(TypeKind::Void), ExprKind::CellSet { cell, value }))
            }
            Hook::VarSet => {
                let (_, var) = self.transform(ctx, layer, &args[0]);
                let (_, value) = self.transform(ctx, layer, &args[1]);
                (simple(TypeKind::Void), Expr::new(simple(TypeKind::Void), ExprKind::VarSet { var, value }))
            }

            Hook::Refer => {
                let (ty, val) = self.transform(ctx, layer, &args[0]);
                let base = std::rc::Rc::new(std::cell::RefCell::new(PointerBase::Resolved(ty)));
                let ref_ty = simple(TypeKind::Ref(base));
                (ref_ty.clone(), Expr::new(ref_ty, ExprKind::Refer(val)))
            }
            Hook::Row => {
                let (ty, val) = self.transform(ctx, layer, &args[0]);
                let base = match &*ty {
                    TypeKind::Ref(b) => b.clone(),
                    _ => {
                        ctx.diagnostics.record(position(span), Diagnostic::UnexpectedType);
                        return skip();
                    }
                };
                let row_ty = simple(TypeKind::Row(base));
                (row_ty.clone(), Expr::new(row_ty, ExprKind::Row(val)))
            }
            Hook::RowTo | Hook::ToRow | Hook::VarTo | Hook::ToVar => {
                let (ty, val) = self.transform(ctx, layer, &args[0]);
                let kind = match hook {
                    Hook::RowTo => ExprKind::RowTo(val),
                    Hook::ToRow => ExprKind::ToRow(val),
                    Hook::VarTo => ExprKind::VarTo(val),
                    _ => ExprKind::ToVar(val),
                };
                (ty.clone(), Expr::new(ty, kind))
            }

            // `env-get`/`env-set`/`env-has`/`env-del` read and write the
            // host process environment right here, at transform time
            // (§6); the result is folded into an ordinary constant, so
            // none of these hooks ever reach the emitter.
            Hook::EnvGet => {
                let TermKind::Name(n) = &*args[0] else { panic!("malformed `env-get` node") };
                let key = n.with_str(str::to_owned);
                match std::env::var(&key) {
                    Ok(value) => {
                        let ty = row_of(simple(TypeKind::Char0));
                        (ty.clone(), Expr::new(ty, ExprKind::Constant(Constant::Str(value.into_bytes().into()))))
                    }
                    Err(_) => {
                        ctx.diagnostics.record(position(span), Diagnostic::Other { mnemonic: "kne", message: format!("key `{key}` not in environment") });
                        skip()
                    }
                }
            }
            Hook::EnvHas => {
                let TermKind::Name(n) = &*args[0] else { panic!("malformed `env-has` node") };
                let present = n.with_str(|s| std::env::var_os(s).is_some());
                let ty = simple(TypeKind::Int0);
                (ty.clone(), Expr::new(ty, ExprKind::Constant(Constant::Int(i64::from(present)))))
            }
            Hook::EnvSet => {
                let TermKind::Name(n) = &*args[0] else { panic!("malformed `env-set` node") };
                let (_, value) = self.transform(ctx, layer, &args[1]);
                let ExprKind::Constant(Constant::Str(bytes)) = &*value.kind else {
                    ctx.diagnostics.record(position(span), Diagnostic::UnexpectedType);
                    return skip();
                };
                let text = String::from_utf8_lossy(bytes).into_owned();
                n.with_str(|key| {
                    // SAFETY: the core is single-threaded and synchronous
                    // (§5); no other code in this process touches the
                    // environment concurrently.
                    unsafe { std::env::set_var(key, &text) };
                });
                (simple(TypeKind::Void), Expr::new(simple(TypeKind::Void), ExprKind::Skip))
            }
            Hook::EnvDel => {
                let TermKind::Name(n) = &*args[0] else { panic!("malformed `env-del` node") };
                n.with_str(|key| {
                    // SAFETY: see `env-set` above.
                    unsafe { std::env::remove_var(key) };
                });
                (simple(TypeKind::Void), Expr::new(simple(TypeKind::Void), ExprKind::Skip))
            }

            Hook::Debug => {
                let values: Vec<Expr> = args.iter().map(|a| self.transform(ctx, layer, a).1).collect();
                (simple(TypeKind::Void), Expr::new(simple(TypeKind::Void), ExprKind::Debug(values)))
            }

            other => {
                ctx.diagnostics.record(position(span), Diagnostic::Other {
                    mnemonic: "nyi",
                    message: format!("hook {other:?} has no transformation rule"),
                });
                skip()
            }
        }
    }

    /// `apply` (§4.5, §4.8): reduce the callee to a closure and every
    /// argument, then hand both to [`crate::form::apply_form`], which
    /// owns dispatch/coercion; this module only supplies the callback
    /// that lets a chosen member's body be transformed in turn.
    fn transform_apply(&mut self, ctx: &mut TransformCtx, layer: &Layer, args: &[Term], span: Span) -> Reduced {
        let Some((callee_term, arg_terms)) = args.split_first() else {
            panic!("`apply` node has no callee");
        };
        let (_, callee_val) = self.transform(ctx, layer, callee_term);
        let Some(closure) = as_closure(&callee_val) else {
            ctx.diagnostics.record(position(span), Diagnostic::FormNotApplicable);
            return skip();
        };

        let reduced: Vec<Reduced> = arg_terms.iter().map(|a| self.transform(ctx, layer, a)).collect();
        let arg_types: Vec<Type> = reduced.iter().map(|(t, _)| t.clone()).collect();
        let arg_values: Vec<Expr> = reduced.into_iter().map(|(_, v)| v).collect();

        let mut transform_body = |ctx: &mut TransformCtx, body: &Term, layer: &Layer| self.transform(ctx, layer, body);
        match crate::form::apply_form(ctx, &closure, &arg_types, &arg_values, &mut transform_body) {
            Some(reduced) => reduced,
            None => {
                ctx.diagnostics.record(position(span), Diagnostic::FormNotApplicable);
                skip()
            }
        }
    }

    /// `with` / `prog`: open a new equate layer, bind each equate in
    /// order (so later equates may reference earlier ones), transform
    /// the body, and — for `prog` only — run the §4.9 resolution passes
    /// at this unit's outer level. Two closures bound to the same name
    /// in the same scope accumulate via [`crate::form::form_concatenate`]
    /// rather than the second shadowing the first, matching how the
    /// original lets repeated `form`/`alt` definitions of one name
    /// extend its closure.
    fn transform_with(&mut self, ctx: &mut TransformCtx, outer: &Layer, args: &[Term], span: Span, is_prog: bool) -> Reduced {
        let Some((body_term, equate_terms)) = args.split_last() else {
            panic!("`with`/`prog` node has no body term");
        };
        let mut layer = outer.clone().push(LayerKind::Equate);
        let mut equates = Vec::new();

        for chunk in equate_terms.chunks(2) {
            let [name_term, value_term] = chunk else {
                panic!("malformed equate list in `with`/`prog`");
            };
            let TermKind::Name(name) = &**name_term else {
                panic!("equate key is not a name");
            };
            let (mut ty, mut val) = self.transform(ctx, &layer, value_term);

            let existing_closure = if layer.contains_here(*name) {
                as_closure(&expr_of(layer.get(*name)))
            } else {
                None
            };
            if let (Some(existing), Some(incoming)) = (existing_closure, as_closure(&val)) {
                let combined = crate::form::form_concatenate(ctx, existing, incoming);
                ty = combined.members.first().map_or(ty, |m| m.ty.clone());
                val = Expr::new(ty.clone(), ExprKind::Closure(std::rc::Rc::new(combined)));
            }

            let removable = is_removable(&val);
            layer.set(*name, Binder { info: ty.clone(), value: Value::Expr(val.clone()), span });
            equates.push(Equate { name: *name, value: val, removable });
        }

        let (body_ty, body_val) = self.transform(ctx, &layer, body_term);

        if is_prog {
            let expanded = crate::resolve::resolve_procedures(ctx, |ctx, term, layer| self.transform(ctx, layer, term));
            crate::resolve::resolve_forward_pointers(ctx, &layer);
            for value in expanded {
                equates.push(Equate { name: crate::symbol::Name::make_stub(crate::symbol::Name::intern("_proc")), removable: false, value });
            }
            return (body_ty.clone(), Expr::new(body_ty, ExprKind::Prog { equates, body: body_val }));
        }
        (body_ty.clone(), Expr::new(body_ty, ExprKind::With { equates, body: body_val }))
    }

    fn transform_if(&mut self, ctx: &mut TransformCtx, layer: &Layer, args: &[Term]) -> Reduced {
        let mut arms = Vec::new();
        let mut otherwise = None;
        let mut i = 0;
        while i + 1 < args.len() {
            let (_, cond_val) = self.transform(ctx, layer, &args[i]);
            let (_, body_val) = self.transform(ctx, layer, &args[i + 1]);
            arms.push((cond_val, body_val));
            i += 2;
        }
        if i < args.len() {
            otherwise = Some(Box::new(self.transform(ctx, layer, &args[i]).1));
        }
        let ty = arms.first().map_or_else(|| simple(TypeKind::Void), |(_, b)| b.ty.clone());
        (ty.clone(), Expr::new(ty, ExprKind::If { arms, otherwise }))
    }

    fn transform_case(&mut self, ctx: &mut TransformCtx, layer: &Layer, args: &[Term]) -> Reduced {
        let Some((selector_term, rest)) = args.split_first() else {
            panic!("`case` node has no selector");
        };
        let (_, selector) = self.transform(ctx, layer, selector_term);
        let mut arms = Vec::new();
        let (body_terms, default_term) = rest.split_at(rest.len().saturating_sub(1));
        let mut i = 0;
        while i + 1 < body_terms.len() {
            let labels_term = &body_terms[i];
            let body_term = &body_terms[i + 1];
            let labels = match &**labels_term {
                TermKind::Node(_, label_terms, _) => label_terms.iter().map(|t| self.transform(ctx, layer, t).1).collect(),
                _ => vec![self.transform(ctx, layer, labels_term).1],
            };
            let body = self.transform(ctx, layer, body_term).1;
            arms.push(CaseArm { labels, body });
            i += 2;
        }
        let default = default_term.first().map(|t| Box::new(self.transform(ctx, layer, t).1));
        let ty = arms.first().map_or_else(|| simple(TypeKind::Void), |a| a.body.ty.clone());
        (ty.clone(), Expr::new(ty, ExprKind::Case { selector, arms, default }))
    }

    fn transform_last(&mut self, ctx: &mut TransformCtx, layer: &Layer, args: &[Term]) -> Reduced {
        let items: Vec<Expr> = args.iter().map(|a| self.transform(ctx, layer, a).1).collect();
        let ty = items.last().map_or_else(|| simple(TypeKind::Void), |e| e.ty.clone());
        (ty.clone(), Expr::new(ty, ExprKind::Last(items)))
    }

    fn transform_while(&mut self, ctx: &mut TransformCtx, layer: &Layer, args: &[Term]) -> Reduced {
        let (_, cond) = self.transform(ctx, layer, &args[0]);
        let (_, body) = self.transform(ctx, layer, &args[1]);
        (simple(TypeKind::Void), Expr::new(simple(TypeKind::Void), ExprKind::While { cond, body: Box::new(body) }))
    }
}

fn expr_of(binder: &Binder) -> Expr {
    match &binder.value {
        Value::Expr(e) => e.clone(),
        Value::Type(t) => Expr::new(simple(TypeKind::TypeOf(t.clone())), ExprKind::Skip),
    }
}

/// Constant-fold a primitive application when every argument is already
/// a constant (§4.8 "Constant-folds if all arguments are constants").
fn fold_prim(op: PrimOp, args: &[Expr]) -> Option<Expr> {
    let consts: Vec<&Constant> = args
        .iter()
        .map(|a| match &*a.kind {
            ExprKind::Constant(c) => Some(c),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;

    use PrimOp::{IntAdd, IntMul, IntNeg, IntSub, Not, RealAdd, RealMul, RealSub};
    let result = match (op, consts.as_slice()) {
        (IntAdd, [Constant::Int(a), Constant::Int(b)]) => Constant::Int(a.wrapping_add(*b)),
        (IntSub, [Constant::Int(a), Constant::Int(b)]) => Constant::Int(a.wrapping_sub(*b)),
        (IntMul, [Constant::Int(a), Constant::Int(b)]) => Constant::Int(a.wrapping_mul(*b)),
        (RealAdd, [Constant::Real(a), Constant::Real(b)]) => Constant::Real(a + b),
        (RealSub, [Constant::Real(a), Constant::Real(b)]) => Constant::Real(a - b),
        (RealMul, [Constant::Real(a), Constant::Real(b)]) => Constant::Real(a * b),
        (IntNeg, [Constant::Int(a)]) => Constant::Int(a.wrapping_neg()),
        (Not, [Constant::Int(a)]) => Constant::Int(i64::from(*a == 0)),
        _ => return None,
    };
    let ty = args[0].ty.clone();
    Some(Expr::new(ty, ExprKind::Constant(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{build, MapLoader};

    #[test]
    fn literal_int_transforms_to_int2() {
        let mut loader = MapLoader::new();
        let mut t = Transformer { loader: &mut loader };
        let mut ctx = TransformCtx::new();
        let layer = crate::prelude::root_layer();
        let (ty, val) = t.transform(&mut ctx, &layer, &build::int_lit(42));
        assert!(matches!(&*ty, TypeKind::Int2));
        assert!(matches!(&*val.kind, ExprKind::Constant(Constant::Int(42))));
    }

    #[test]
    fn constant_folding_reduces_int_add() {
        let mut loader = MapLoader::new();
        let mut t = Transformer { loader: &mut loader };
        let mut ctx = TransformCtx::new();
        let layer = crate::prelude::root_layer();
        let term = build::prim_app(PrimOp::IntAdd, vec![build::int_lit(1), build::int_lit(2)], crate::ast::FileId(0), 0);
        let (_, val) = t.transform(&mut ctx, &layer, &term);
        assert!(matches!(&*val.kind, ExprKind::Constant(Constant::Int(3))));
    }

    #[test]
    fn int0_literal_elaborates_to_a_narrow_constant() {
        let mut loader = MapLoader::new();
        let mut t = Transformer { loader: &mut loader };
        let mut ctx = TransformCtx::new();
        let layer = crate::prelude::root_layer();
        let (ty, val) = t.transform(&mut ctx, &layer, &build::int0_lit(1));
        assert!(matches!(&*ty, TypeKind::Int0));
        assert!(matches!(&*val.kind, ExprKind::Constant(Constant::Int(1))));
    }

    #[test]
    fn mixed_width_int_add_widens_to_the_wider_operand_not_the_first() {
        let mut loader = MapLoader::new();
        let mut t = Transformer { loader: &mut loader };
        let mut ctx = TransformCtx::new();
        let layer = crate::prelude::root_layer();
        let term = build::prim_app(PrimOp::IntAdd, vec![build::int0_lit(1), build::int_lit(100)], crate::ast::FileId(0), 0);
        let (ty, val) = t.transform(&mut ctx, &layer, &term);
        assert!(matches!(&*ty, TypeKind::Int2), "the join of int0 and int2 is int2, not the first operand's int0");
        assert!(ctx.diagnostics.is_empty());
        // Both operands reduce to constants, so the usual constant-fold
        // step collapses the whole application (including the int0
        // operand's widening int-cast) down to one folded value.
        assert!(matches!(&*val.kind, ExprKind::Constant(Constant::Int(101))));
    }

    #[test]
    fn unbound_name_becomes_skip_and_records_a_diagnostic() {
        let mut loader = MapLoader::new();
        let mut t = Transformer { loader: &mut loader };
        let mut ctx = TransformCtx::new();
        let layer = crate::prelude::root_layer();
        let (ty, val) = t.transform(&mut ctx, &layer, &build::name("ghost"));
        assert!(matches!(&*ty, TypeKind::Void));
        assert!(matches!(&*val.kind, ExprKind::Skip));
        assert!(!ctx.diagnostics.is_empty());
    }

    #[test]
    fn proc_literal_applies_to_matching_arguments() {
        let mut loader = MapLoader::new();
        let mut t = Transformer { loader: &mut loader };
        let mut ctx = TransformCtx::new();
        let layer = crate::prelude::root_layer();

        let proc_term = build::node(
            Hook::Proc,
            vec![build::name("x"), build::hook(Hook::Int1), build::hook(Hook::Int1), build::name("x")],
            crate::ast::FileId(0),
            0,
        );
        let apply_term = build::node(Hook::Apply, vec![proc_term, build::int_lit(7)], crate::ast::FileId(0), 1);
        let (ty, val) = t.transform(&mut ctx, &layer, &apply_term);
        assert!(matches!(&*ty, TypeKind::Int1));
        assert!(matches!(&*val.kind, ExprKind::Constant(Constant::Int(_)) | ExprKind::Cast { .. } | ExprKind::Name(_)));
    }
}
