//! Accumulated, non-fatal compiler errors.
//!
//! ORSON's `diagnose*` family (`original_source/global.h`) writes directly
//! to an error stream keyed by a three-or-four-letter mnemonic escape and a
//! source position, and compilation continues past the point of error so
//! later diagnostics can still surface (`original_source/type.c`,
//! `original_source/form.c` both replace a failed subterm with `skipHook`
//! rather than aborting). We keep that "accumulate, don't abort" shape but
//! give each mnemonic family a typed [`Diagnostic`] variant via `thiserror`,
//! matching how the teacher reports its own fatal conditions
//! (`panic!("uninferred type variable ...")` in `build_mir.rs`) rather than
//! stringly-typed errors.

use std::fmt;

use thiserror::Error;

/// A single char-offset position in a (conceptually single) source buffer,
/// mirroring the `info` slot the original attaches to every term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(pub u32);

/// One non-fatal compiler diagnostic. Every variant corresponds to a fixed
/// mnemonic the original's `global.h` table assigns: `aax`, `ehut`, `me`,
/// `ch`, and the others named below.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `aax`: two apostrophes expected around a character literal.
    #[error("two apostrophes expected")]
    ApostrophesExpected,

    /// `ehut`: an expression was given a type other than what its context
    /// requires.
    #[error("expression has unexpected type")]
    UnexpectedType,

    /// A name was referenced that has no binding in any enclosing layer.
    #[error("name `{0}` is unbound")]
    UnboundName(String),

    /// A form was applied to a tuple of arguments it cannot accept.
    #[error("no alternative of this form matches the given arguments")]
    FormNotApplicable,

    /// A `gen` parameter could not be Skolemized (its layer forbids it, or
    /// it occurs free in an already-fixed type).
    #[error("type variable `{0}` cannot be made generic here")]
    NotSkolemizable(String),

    /// A forward-declared pointer target (`row`/`var` base) was never
    /// bound by the time pointer resolution ran.
    #[error("unforwarded pointer type expected")]
    UnforwardedPointer,

    /// A procedure's declared yield type does not accept its body's type.
    #[error("procedure body does not coerce to its declared yield type")]
    ProcedureYieldMismatch,

    /// `ch`: compilation halted because an earlier pass recorded at least
    /// one other diagnostic and emission cannot proceed.
    #[error("compilation halted")]
    CompilationHalted,

    /// Any other condition, carrying the original's bare mnemonic escape
    /// and a human-readable message, for conditions that don't (yet)
    /// warrant a dedicated variant.
    #[error("{mnemonic}: {message}")]
    Other { mnemonic: &'static str, message: String },
}

impl Diagnostic {
    /// The fixed mnemonic escape this diagnostic reports under.
    #[must_use] pub fn mnemonic(&self) -> &str {
        match self {
            Diagnostic::ApostrophesExpected => "aax",
            Diagnostic::UnexpectedType => "ehut",
            Diagnostic::UnboundName(_) => "unb",
            Diagnostic::FormNotApplicable => "fna",
            Diagnostic::NotSkolemizable(_) => "nsk",
            Diagnostic::UnforwardedPointer => "ufp",
            Diagnostic::ProcedureYieldMismatch => "pym",
            Diagnostic::CompilationHalted => "ch",
            Diagnostic::Other { mnemonic, .. } => mnemonic,
        }
    }
}

/// One recorded diagnostic together with the source position it was
/// attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub at: Position,
    pub diagnostic: Diagnostic,
}

/// The accumulator threaded through transformation and emission. Mirrors
/// the original's append-only error stream: nothing here ever removes an
/// entry, and recording one never unwinds control flow.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Located>,
}

impl Diagnostics {
    #[must_use] pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, at: Position, diagnostic: Diagnostic) {
        self.entries.push(Located { at, diagnostic });
    }

    #[must_use] pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use] pub fn entries(&self) -> &[Located] {
        &self.entries
    }

    /// Render every diagnostic, one per line, ordered by source position
    /// then by mnemonic, so the same ledger always renders identically.
    #[must_use] pub fn render(&self, ascii_only: bool) -> String {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| (a.at, a.diagnostic.mnemonic()).cmp(&(b.at, b.diagnostic.mnemonic())));
        let mut out = String::new();
        let bullet = if ascii_only { "*" } else { "\u{2022}" };
        for entry in &sorted {
            out.push_str(bullet);
            out.push(' ');
            out.push_str(&format!(
                "{}:{} {}\n",
                entry.at.0,
                entry.diagnostic.mnemonic(),
                entry.diagnostic
            ));
        }
        out
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render(true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_is_deterministic_regardless_of_insertion_order() {
        let mut a = Diagnostics::new();
        a.record(Position(10), Diagnostic::UnexpectedType);
        a.record(Position(2), Diagnostic::CompilationHalted);

        let mut b = Diagnostics::new();
        b.record(Position(2), Diagnostic::CompilationHalted);
        b.record(Position(10), Diagnostic::UnexpectedType);

        assert_eq!(a.render(true), b.render(true));
    }

    #[test]
    fn ascii_and_utf8_rendering_differ_only_in_bullet() {
        let mut d = Diagnostics::new();
        d.record(Position(0), Diagnostic::UnboundName("x".into()));
        let ascii = d.render(true);
        let utf8 = d.render(false);
        assert!(ascii.starts_with('*'));
        assert!(utf8.starts_with('\u{2022}'));
    }
}
