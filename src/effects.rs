//! Effect Resolver (C5)
//!
//! Models `effect.name` as a per-session named slot with three layers —
//! an immutable pin, a LIFO stack of scoped overrides, and a library
//! default — and resolves reads of `effect.name` at compile time to a
//! concrete implementation symbol. Also tracks, per compiled function,
//! which effect names it (transitively) reads, which the driver (C10)
//! consults to decide whether a caller under an override must be
//! redirected to a callee's effect-suffixed variant (§4.3).

use crate::ast::Expr;
use crate::diagnostics::{CoreError, ErrorKind, SourceSpan};
use std::collections::{HashMap, HashSet};

/// One override pushed by a `with effect(...)` block: the bindings it
/// installs and the suffix those bindings are named under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideFrame {
    pub bindings: HashMap<String, Expr>,
    pub suffix: String,
}

/// The three-tier binding for one effect name.
#[derive(Debug, Clone, Default)]
struct EffectSlot {
    pinned: Option<Expr>,
    default: Option<Expr>,
}

/// Per-session effect state: pins/defaults for every known effect name,
/// plus the scoped override stack. Lives on the driver session (§5); never
/// a process-global.
#[derive(Debug, Clone, Default)]
pub struct EffectEnv {
    slots: HashMap<String, EffectSlot>,
    overrides: Vec<OverrideFrame>,
}

impl EffectEnv {
    pub fn new() -> Self {
        EffectEnv::default()
    }

    /// `effect.default(name=impl)` — installs a default only if one isn't
    /// already present; otherwise silently replaces it (the library is
    /// allowed to refine its own defaults, only pins are protected).
    pub fn set_default(&mut self, name: impl Into<String>, value: Expr) {
        self.slots.entry(name.into()).or_default().default = Some(value);
    }

    /// `effect.name = impl` — installs a pin. Fails `EffectRepin` if a pin
    /// already exists for this name.
    pub fn pin(&mut self, name: &str, value: Expr, span: SourceSpan) -> Result<(), CoreError> {
        let slot = self.slots.entry(name.to_string()).or_default();
        if slot.pinned.is_some() {
            return Err(CoreError::new(ErrorKind::EffectRepin(name.to_string()), span));
        }
        slot.pinned = Some(value);
        Ok(())
    }

    /// Pushes a scoped override frame. Per §4.3, a non-empty binding set
    /// requires an explicit suffix.
    pub fn push_override(
        &mut self,
        bindings: HashMap<String, Expr>,
        suffix: Option<String>,
        span: SourceSpan,
    ) -> Result<(), CoreError> {
        let suffix = match (bindings.is_empty(), suffix) {
            (false, None) => {
                return Err(CoreError::new(
                    ErrorKind::EffectSuffixRequired("with effect(...)".to_string()),
                    span,
                ));
            }
            (_, Some(s)) => s,
            (true, None) => String::new(),
        };
        self.overrides.push(OverrideFrame { bindings, suffix });
        Ok(())
    }

    /// Pops the innermost override frame on scope exit. A caller popping
    /// with no frame pushed is a programmer error (§5: "unbalanced pop").
    pub fn pop_override(&mut self) -> OverrideFrame {
        self.overrides.pop().expect("unbalanced effect override pop")
    }

    /// Resolve `effect.name` at this point: pin > topmost override binding
    /// this name > default > `EffectUnbound`.
    pub fn resolve(&self, name: &str, span: SourceSpan) -> Result<&Expr, CoreError> {
        if let Some(slot) = self.slots.get(name) {
            if let Some(pinned) = &slot.pinned {
                return Ok(pinned);
            }
        }
        for frame in self.overrides.iter().rev() {
            if let Some(value) = frame.bindings.get(name) {
                return Ok(value);
            }
        }
        if let Some(slot) = self.slots.get(name) {
            if let Some(default) = &slot.default {
                return Ok(default);
            }
        }
        Err(CoreError::new(ErrorKind::EffectUnbound(name.to_string()), span))
    }

    /// The effect suffix currently active, formed from the topmost override
    /// frame's suffix (empty string if no override is on the stack).
    pub fn active_suffix(&self) -> &str {
        self.overrides.last().map(|f| f.suffix.as_str()).unwrap_or("")
    }

    /// Whether any override on the stack binds `name` — used by the driver
    /// to decide transitive redirection (§4.3 "Transitive propagation").
    pub fn overrides_bind(&self, name: &str) -> bool {
        self.overrides.iter().any(|f| f.bindings.contains_key(name))
    }
}

/// The set of effect names a function reads, directly or (once computed by
/// the driver's call-graph walk) transitively through its callees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectReadSet(pub HashSet<String>);

impl EffectReadSet {
    pub fn intersects_override(&self, env: &EffectEnv) -> bool {
        self.0.iter().any(|name| env.overrides_bind(name))
    }
}

/// Collect the effect names read directly in `expr` (via `Expr::EffectRef`).
/// The driver composes this with the call graph to build each function's
/// transitive read set.
pub fn direct_effect_reads(expr: &Expr, out: &mut HashSet<String>) {
    match expr {
        Expr::EffectRef { name, .. } => {
            out.insert(name.clone());
        }
        Expr::Field(base, _) | Expr::Consume(base) | Expr::Move(base) | Expr::Ptr(base) => {
            direct_effect_reads(base, out)
        }
        Expr::Call { args, .. } | Expr::TypeCall { args, .. } => {
            for a in args {
                direct_effect_reads(a, out);
            }
        }
        Expr::Assume { values, .. } | Expr::Refine { values, .. } | Expr::Tuple(values) => {
            for v in values {
                direct_effect_reads(v, out);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            direct_effect_reads(lhs, out);
            direct_effect_reads(rhs, out);
        }
        Expr::Unary { operand, .. } => direct_effect_reads(operand, out),
        Expr::IntLit(_)
        | Expr::FloatLit(_)
        | Expr::BoolLit(_)
        | Expr::StrLit(_)
        | Expr::Var(_)
        | Expr::LinearNew
        | Expr::Sizeof(_)
        | Expr::Nullptr => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> SourceSpan {
        SourceSpan::new("fixture.pyc", 0)
    }

    #[test]
    fn pin_beats_override_and_default() {
        let mut env = EffectEnv::new();
        env.set_default("rng", Expr::Var("DefaultRng".into()));
        env.pin("rng", Expr::Var("PinnedRng".into()), span()).unwrap();
        let mut bindings = HashMap::new();
        bindings.insert("rng".to_string(), Expr::Var("MockRng".into()));
        env.push_override(bindings, Some("mock".into()), span()).unwrap();
        assert_eq!(env.resolve("rng", span()).unwrap(), &Expr::Var("PinnedRng".into()));
    }

    #[test]
    fn second_pin_is_rejected() {
        let mut env = EffectEnv::new();
        env.pin("rng", Expr::Var("A".into()), span()).unwrap();
        let err = env.pin("rng", Expr::Var("B".into()), span()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EffectRepin(_)));
    }

    #[test]
    fn override_without_suffix_is_rejected_unless_empty() {
        let mut env = EffectEnv::new();
        let mut bindings = HashMap::new();
        bindings.insert("rng".to_string(), Expr::Var("Mock".into()));
        let err = env.push_override(bindings, None, span()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EffectSuffixRequired(_)));

        let mut env2 = EffectEnv::new();
        env2.push_override(HashMap::new(), None, span()).unwrap();
        assert_eq!(env2.active_suffix(), "");
    }

    #[test]
    fn unbound_effect_fails() {
        let env = EffectEnv::new();
        let err = env.resolve("rng", span()).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EffectUnbound(_)));
    }

    #[test]
    fn override_pop_restores_previous_suffix() {
        let mut env = EffectEnv::new();
        let mut bindings = HashMap::new();
        bindings.insert("rng".to_string(), Expr::Var("Mock".into()));
        env.push_override(bindings, Some("mock".into()), span()).unwrap();
        assert_eq!(env.active_suffix(), "mock");
        env.pop_override();
        assert_eq!(env.active_suffix(), "");
    }
}
