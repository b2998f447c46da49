//! Shared transformation state (§5 "Shared resource policy").
//!
//! The original keeps several of these as genuine C globals (`calls`,
//! the `matches` chain, the `bases` list, the procedure queue). §5 is
//! explicit that this crate must not reproduce that as a Rust
//! module-level `static`: everything lives in one [`TransformCtx`] value
//! threaded through every entry point, and every push is paired with a
//! `Drop`-based guard that pops on every exit path, including the early
//! return of a `?`. This mirrors the RAII scope-guard pattern the rest
//! of the pack reaches for instead of manual save/restore bookkeeping.

use crate::ir::ty::Type;
use crate::layer::Layer;

/// One outstanding recursion guard entry: a pair of type pointers
/// currently being compared structurally by the subtype engine (§4.3
/// "Recursion guard"). Identity, not structural equality, is what makes
/// two cyclic pointer types "the same call again".
#[derive(Clone)]
struct CallFrame {
    left: *const crate::ir::ty::TypeKind,
    right: *const crate::ir::ty::TypeKind,
}

/// A deferred match obligation (§4.3 "Matches"): the engine could not
/// decide a name's binding outright and instead recorded what would need
/// to hold for the comparison to succeed.
#[derive(Clone)]
pub struct MatchObligation {
    pub left_layer: Layer,
    pub left_type: Type,
    pub right_layer: Layer,
    pub right_type: Type,
}

/// A procedure closure whose body transformation was deferred until all
/// equates in its defining scope are available (§4.9).
pub struct PendingProcedure {
    pub params: Vec<crate::ir::ty::Param>,
    pub yields: Type,
    pub layer: Layer,
    pub body: crate::ast::Term,
}

/// The context threaded through subtyping, coercion, form application,
/// Skolemization, and transformation. Exactly one of these exists per
/// top-level `prog` being transformed.
#[derive(Default)]
pub struct TransformCtx {
    calls: Vec<CallFrame>,
    matches: Vec<MatchObligation>,
    bases: Vec<crate::ir::ty::Base>,
    procedures: std::collections::VecDeque<PendingProcedure>,
    pub diagnostics: crate::diagnostics::Diagnostics,
    sko_ids: crate::ir::ty::SkoIds,
}

impl TransformCtx {
    #[must_use] pub fn new() -> Self {
        Self::default()
    }

    #[must_use] pub fn sko_ids(&self) -> &crate::ir::ty::SkoIds {
        &self.sko_ids
    }

    /// True if `(left, right)` is already on the `calls` stack, i.e. the
    /// subtype engine should coinductively assume the comparison holds
    /// rather than recurse again (§4.3).
    #[must_use] pub fn is_calling(&self, left: &Type, right: &Type) -> bool {
        let (l, r) = (std::rc::Rc::as_ptr(left), std::rc::Rc::as_ptr(right));
        self.calls.iter().any(|f| f.left == l && f.right == r)
    }

    /// Push `(left, right)` onto the `calls` stack, returning a guard
    /// that pops it when dropped. The guard derefs to `&mut TransformCtx`
    /// so the guarded scope keeps using `ctx` exactly as before, just
    /// through the guard instead of the original borrow (which the
    /// borrow checker now reserves for the guard's exclusive use,
    /// matching "push/pop-scoped around each structural comparison").
    #[must_use] pub fn enter_call<'a>(&'a mut self, left: &Type, right: &Type) -> CallGuard<'a> {
        self.calls.push(CallFrame { left: std::rc::Rc::as_ptr(left), right: std::rc::Rc::as_ptr(right) });
        CallGuard { ctx: self }
    }

    /// Record a registered forward-pointer base for later resolution
    /// (§4.9's pointer update pass).
    pub fn register_base(&mut self, base: crate::ir::ty::Base) {
        self.bases.push(base);
    }

    #[must_use] pub fn bases(&self) -> &[crate::ir::ty::Base] {
        &self.bases
    }

    /// Enqueue a deferred procedure body for §4.9 expansion.
    pub fn enqueue_procedure(&mut self, proc: PendingProcedure) {
        self.procedures.push_back(proc);
    }

    pub fn dequeue_procedure(&mut self) -> Option<PendingProcedure> {
        self.procedures.pop_front()
    }

    #[must_use] pub fn has_pending_procedures(&self) -> bool {
        !self.procedures.is_empty()
    }

    /// Push a match obligation, returning a guard that pops it (and
    /// anything pushed after it) when dropped, so a failed coercion
    /// attempt never leaves a stale obligation behind for the next one.
    #[must_use] pub fn enter_match<'a>(&'a mut self, obligation: MatchObligation) -> MatchGuard<'a> {
        let mark = self.matches.len();
        self.matches.push(obligation);
        MatchGuard { ctx: self, mark }
    }

    /// Open a fresh match-obligation scope without pushing anything yet:
    /// whatever the guarded attempt pushes onto `matches` is rolled back
    /// when the guard drops. Mirrors `coerce.c:43`'s `f.oldMatches =
    /// matches; matches = nil; ...; matches = f.oldMatches` around a
    /// whole `isCoercing` attempt, rather than a single obligation.
    #[must_use] pub fn begin_matches<'a>(&'a mut self) -> MatchGuard<'a> {
        let mark = self.matches.len();
        MatchGuard { ctx: self, mark }
    }

    #[must_use] pub fn matches(&self) -> &[MatchObligation] {
        &self.matches
    }
}

/// RAII guard restoring the `calls` stack to its pre-push length on drop,
/// including on an early return through `?` inside the guarded scope.
pub struct CallGuard<'a> {
    ctx: &'a mut TransformCtx,
}

impl std::ops::Deref for CallGuard<'_> {
    type Target = TransformCtx;
    fn deref(&self) -> &TransformCtx {
        self.ctx
    }
}

impl std::ops::DerefMut for CallGuard<'_> {
    fn deref_mut(&mut self) -> &mut TransformCtx {
        self.ctx
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.ctx.calls.pop();
    }
}

/// RAII guard truncating the `matches` chain back to its pre-push length
/// on drop.
pub struct MatchGuard<'a> {
    ctx: &'a mut TransformCtx,
    mark: usize,
}

impl std::ops::Deref for MatchGuard<'_> {
    type Target = TransformCtx;
    fn deref(&self) -> &TransformCtx {
        self.ctx
    }
}

impl std::ops::DerefMut for MatchGuard<'_> {
    fn deref_mut(&mut self) -> &mut TransformCtx {
        self.ctx
    }
}

impl Drop for MatchGuard<'_> {
    fn drop(&mut self) {
        self.ctx.matches.truncate(self.mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ty::{simple, TypeKind};
    use crate::layer::LayerKind;

    #[test]
    fn call_guard_pops_on_drop_even_on_early_return() {
        let mut ctx = TransformCtx::new();
        let l = simple(TypeKind::Int1);
        let r = simple(TypeKind::Int2);

        fn probe(ctx: &mut TransformCtx, l: &Type, r: &Type) -> bool {
            let guard = ctx.enter_call(l, r);
            if true {
                return guard.is_calling(l, r);
            }
            unreachable!()
        }

        assert!(probe(&mut ctx, &l, &r));
        assert!(!ctx.is_calling(&l, &r));
    }

    #[test]
    fn match_guard_truncates_back_to_mark() {
        let mut ctx = TransformCtx::new();
        let obligation = MatchObligation {
            left_layer: Layer::root(LayerKind::Plain),
            left_type: simple(TypeKind::Int1),
            right_layer: Layer::root(LayerKind::Plain),
            right_type: simple(TypeKind::Int2),
        };
        {
            let guard = ctx.enter_match(obligation.clone());
            assert_eq!(guard.matches().len(), 1);
        }
        assert_eq!(ctx.matches().len(), 0);
    }
}
