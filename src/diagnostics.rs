//! Error kinds, spans, and the per-translation-unit diagnostic buffer (§7).
//!
//! No exceptions are used for control flow inside the core: every fallible
//! analysis returns a `Result<_, CoreError>` or pushes a `CoreError` into the
//! caller's [`DiagnosticBag`]. The error enum is hand-written (matching the
//! teacher's `CodeGenError` convention) rather than built from a derive-heavy
//! error crate, since the core never needs `anyhow`-style dynamic context.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A location in original (pre-inline) source, plus the chain of call sites
/// an inlined statement was substituted through. A diagnostic raised against
/// code produced by the inline kernel (C4) can therefore report "in `helper`
/// (line 12), inlined at line 40, inlined at line 58", etc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub file: PathBuf,
    pub start_line: usize,
    pub end_line: usize,
    /// Call sites this span was substituted through, innermost first.
    #[serde(default)]
    pub provenance: Vec<ProvenanceLink>,
}

impl SourceSpan {
    pub fn new(file: impl Into<PathBuf>, line: usize) -> Self {
        SourceSpan {
            file: file.into(),
            start_line: line,
            end_line: line,
            provenance: Vec::new(),
        }
    }

    pub fn span(file: impl Into<PathBuf>, start_line: usize, end_line: usize) -> Self {
        SourceSpan {
            file: file.into(),
            start_line,
            end_line,
            provenance: Vec::new(),
        }
    }

    /// Record that this span was just substituted into a call site during
    /// inlining. Pushed by the inline kernel as it splices callee statements.
    pub fn with_inline_provenance(mut self, call_site: SourceSpan, inline_id: u64) -> Self {
        self.provenance.push(ProvenanceLink {
            call_site: Box::new(call_site),
            inline_id,
        });
        self
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start_line == self.end_line {
            write!(f, "{}:{}", self.file.display(), self.start_line + 1)?;
        } else {
            write!(
                f,
                "{}:{}-{}",
                self.file.display(),
                self.start_line + 1,
                self.end_line + 1
            )?;
        }
        for link in &self.provenance {
            write!(f, " (inlined at {})", link.call_site)?;
        }
        Ok(())
    }
}

/// One hop in a provenance chain: the call site a statement was spliced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceLink {
    pub call_site: Box<SourceSpan>,
    pub inline_id: u64,
}

/// A witness value accompanying certain diagnostics (an uncovered match
/// value, the two conflicting states at a linear merge point).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Witness {
    /// A human-readable rendering of an uncovered match pattern, e.g.
    /// `"Enum::Other(_)"` or `"42"`.
    UncoveredValue(String),
    /// The two incompatible linear states observed at a merge point, for a
    /// named slot.
    LinearStates {
        slot: String,
        left: String,
        right: String,
    },
}

/// Every error kind the core can raise, grouped as in §7.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    // Parsing/Shape
    TypeShapeInvalid(String),
    RefinedArityMismatch(String),
    // Type
    TypeMismatch { expected: String, found: String },
    InvalidCast { from: String, to: String },
    ExternSignatureMismatch(String),
    // Effect
    EffectUnbound(String),
    EffectRepin(String),
    EffectSuffixRequired(String),
    EffectCycle(String),
    // Linear
    LinearOverwrite(String),
    LinearCopy(String),
    LinearUseAfterConsume(String),
    LinearUndefined(String),
    LinearInconsistentMerge(String),
    LinearExitNotConsumed(String),
    // Refinement
    RefineTagNotSubset(String),
    RefineBaseToRefined(String),
    RefineOutsideForLoop(String),
    // Match
    MatchNonExhaustive(String),
    MatchPatternTypeMismatch(String),
    // Control flow
    LabelNotVisible(String),
    GotoEndToUncle(String),
    UnreachableAfterReturn(String),
    // Driver
    CompileCycle(String),
    RecursiveInline(String),
    VariantCollision(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::TypeShapeInvalid(m) => write!(f, "invalid type shape: {m}"),
            ErrorKind::RefinedArityMismatch(m) => write!(f, "refined predicate arity mismatch: {m}"),
            ErrorKind::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            ErrorKind::InvalidCast { from, to } => write!(f, "invalid cast from {from} to {to}"),
            ErrorKind::ExternSignatureMismatch(m) => write!(f, "extern signature mismatch: {m}"),
            ErrorKind::EffectUnbound(name) => write!(f, "effect '{name}' is unbound"),
            ErrorKind::EffectRepin(name) => write!(f, "effect '{name}' was already pinned"),
            ErrorKind::EffectSuffixRequired(name) => {
                write!(f, "override of effect '{name}' requires an explicit suffix")
            }
            ErrorKind::EffectCycle(m) => write!(f, "effect resolution cycle: {m}"),
            ErrorKind::LinearOverwrite(slot) => write!(f, "linear slot '{slot}' overwritten while live"),
            ErrorKind::LinearCopy(slot) => write!(f, "linear slot '{slot}' copied by assignment"),
            ErrorKind::LinearUseAfterConsume(slot) => {
                write!(f, "linear slot '{slot}' used after being consumed")
            }
            ErrorKind::LinearUndefined(slot) => write!(f, "linear slot '{slot}' used before being defined"),
            ErrorKind::LinearInconsistentMerge(slot) => {
                write!(f, "linear slot '{slot}' has inconsistent state across a merge")
            }
            ErrorKind::LinearExitNotConsumed(slot) => {
                write!(f, "linear slot '{slot}' is not consumed on every exit path")
            }
            ErrorKind::RefineTagNotSubset(m) => write!(f, "refined conversion rejected: {m}"),
            ErrorKind::RefineBaseToRefined(m) => {
                write!(f, "base type cannot convert directly to refined type: {m}")
            }
            ErrorKind::RefineOutsideForLoop(m) => write!(f, "'refine' used outside a for-loop: {m}"),
            ErrorKind::MatchNonExhaustive(witness) => {
                write!(f, "match is not exhaustive; uncovered: {witness}")
            }
            ErrorKind::MatchPatternTypeMismatch(m) => write!(f, "pattern type mismatch: {m}"),
            ErrorKind::LabelNotVisible(name) => write!(f, "label '{name}' is not visible here"),
            ErrorKind::GotoEndToUncle(name) => {
                write!(f, "'goto_end' to uncle label '{name}' is not allowed")
            }
            ErrorKind::UnreachableAfterReturn(m) => write!(f, "unreachable code after return: {m}"),
            ErrorKind::CompileCycle(m) => write!(f, "compilation dependency cycle: {m}"),
            ErrorKind::RecursiveInline(name) => write!(f, "recursive inline of '{name}' is forbidden"),
            ErrorKind::VariantCollision(m) => write!(f, "compiled variant collision: {m}"),
        }
    }
}

/// An error paired with where it happened and, when applicable, a witness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreError {
    pub kind: ErrorKind,
    pub span: SourceSpan,
    pub witness: Option<Witness>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, span: SourceSpan) -> Self {
        CoreError {
            kind,
            span,
            witness: None,
        }
    }

    pub fn with_witness(mut self, witness: Witness) -> Self {
        self.witness = Some(witness);
        self
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.span, self.kind)
    }
}

impl std::error::Error for CoreError {}

/// Per-translation-unit accumulator of [`CoreError`]s. The driver refuses to
/// call into `ir::emit` for a unit whose bag is non-empty (§7).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiagnosticBag {
    errors: Vec<CoreError>,
}

impl DiagnosticBag {
    pub fn new() -> Self {
        DiagnosticBag::default()
    }

    pub fn push(&mut self, error: CoreError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[CoreError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<CoreError> {
        self.errors
    }

    pub fn extend(&mut self, other: DiagnosticBag) {
        self.errors.extend(other.errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_chain_renders_innermost_first() {
        let callee_span = SourceSpan::new("lib.pyc", 11)
            .with_inline_provenance(SourceSpan::new("main.pyc", 39), 1);
        let rendered = callee_span.to_string();
        assert!(rendered.contains("lib.pyc:12"));
        assert!(rendered.contains("inlined at main.pyc:40"));
    }

    #[test]
    fn core_error_round_trips_through_json() {
        let err = CoreError::new(
            ErrorKind::LinearExitNotConsumed("t".into()),
            SourceSpan::new("a.pyc", 3),
        )
        .with_witness(Witness::LinearStates {
            slot: "t".into(),
            left: "Live".into(),
            right: "Consumed".into(),
        });
        let json = serde_json::to_string(&err).unwrap();
        let back: CoreError = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }

    #[test]
    fn diagnostic_bag_blocks_emission_when_nonempty() {
        let mut bag = DiagnosticBag::new();
        assert!(bag.is_empty());
        bag.push(CoreError::new(
            ErrorKind::EffectUnbound("rng".into()),
            SourceSpan::new("a.pyc", 0),
        ));
        assert!(!bag.is_empty());
        assert_eq!(bag.errors().len(), 1);
    }
}
