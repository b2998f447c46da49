//! Structured, post-parse representations: [`ty::Type`] expressions and
//! [`expr::Expr`] value terms. These are what the transformer (§4.8)
//! produces from raw [`crate::ast::Term`] trees; everything downstream
//! (subtyping, coercion, form dispatch, emission) operates on these, not
//! on the raw syntax.

pub mod expr;
pub mod ty;
