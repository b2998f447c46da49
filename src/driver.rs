//! Pipeline glue: load → transform → resolve → emit (§6 "External
//! interfaces"), grounded on how `original_source/main.c`'s `main`
//! sequences the same four stages around one shared error stream.

use crate::ast::SourceLoader;
use crate::config::CompilerOptions;
use crate::ctx::TransformCtx;
use crate::diagnostics::{Diagnostic, Diagnostics, Position};
use crate::emit::{self, EmitCtx};
use crate::set::HookSet;
use crate::symbol::Name;
use crate::transform::Transformer;

/// The result of compiling one entry unit: the generated C translation
/// unit (empty if compilation halted before emission) and the full
/// diagnostic ledger accumulated along the way.
pub struct CompileOutput {
    pub c_source: String,
    pub diagnostics: Diagnostics,
}

/// Compile `entry` (already loadable through `loader`) to a C
/// translation unit. Never panics on a source-level problem; every
/// recoverable failure is recorded in the returned ledger instead
/// (§7's "accumulate, don't abort" policy). A non-empty ledger at the
/// end of transformation halts emission, matching the original's `ch`
/// mnemonic ("compilation halted").
#[must_use] pub fn compile(options: &CompilerOptions, loader: &mut dyn SourceLoader, entry: Name) -> CompileOutput {
    let mut ctx = TransformCtx::new();
    let layer = crate::prelude::root_layer();

    let term = match loader.load(entry) {
        Ok(term) => term,
        Err(e) => {
            let mut diagnostics = Diagnostics::new();
            diagnostics.record(Position(0), Diagnostic::Other { mnemonic: "ldf", message: e.to_string() });
            return CompileOutput { c_source: String::new(), diagnostics };
        }
    };

    let (_, body) = {
        let mut transformer = Transformer { loader };
        transformer.transform(&mut ctx, &layer, &term)
    };

    if !ctx.diagnostics.is_empty() {
        ctx.diagnostics.record(Position(0), Diagnostic::CompilationHalted);
        return CompileOutput { c_source: String::new(), diagnostics: ctx.diagnostics };
    }

    let mut emit_ctx = EmitCtx::new(options.gc_marking);
    emit_ctx.out.push_str(&emit::banner(&options.compiler_version, &options.banner_timestamp));
    emit::emit_statement(&mut emit_ctx, &body, &HookSet::new());

    CompileOutput { c_source: emit_ctx.out, diagnostics: ctx.diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{build, FileId, MapLoader};
    use crate::hook::{Hook, PrimOp};

    #[test]
    fn compiles_a_trivial_unit_to_c() {
        let mut loader = MapLoader::new();
        let body = build::prim_app(PrimOp::IntAdd, vec![build::int_lit(1), build::int_lit(2)], FileId(0), 0);
        let unit = build::node(Hook::Prog, vec![body], FileId(0), 0);
        loader.insert(Name::intern("main"), unit);

        let options = CompilerOptions::default();
        let output = compile(&options, &mut loader, Name::intern("main"));
        assert!(output.diagnostics.is_empty());
        assert!(output.c_source.contains('3') || output.c_source.contains('+'));
    }

    #[test]
    fn missing_entry_unit_is_a_diagnostic_not_a_panic() {
        let mut loader = MapLoader::new();
        let options = CompilerOptions::default();
        let output = compile(&options, &mut loader, Name::intern("nope"));
        assert!(!output.diagnostics.is_empty());
        assert!(output.c_source.is_empty());
    }
}
