//! IR Emission Contract (C11, expanded)
//!
//! C11 itself — translating a fully checked, lowered AST into LLVM IR — is
//! out of focus for this crate (§1, §4.8): a real backend is a distinct
//! external collaborator. What the core must provide is a well-formed
//! input and a trait boundary a backend implements. [`StubEmitter`] renders
//! a deterministic textual placeholder good enough for driver-level tests
//! to assert which symbols were scheduled for emission without depending
//! on LLVM.

use crate::diagnostics::CoreError;
use crate::types::Type;

/// A function after every core pass has run: inlined, type-checked,
/// refined, linear-checked, matches lowered, and with its final mangled
/// symbol name resolved (§6, `{name}_{compile_suffix}_{effect_suffix}`).
#[derive(Debug, Clone, PartialEq)]
pub struct TypedFunction {
    pub symbol: String,
    pub param_types: Vec<Type>,
    pub result_type: Type,
    pub is_extern: bool,
}

/// The boundary a real LLVM backend implements. The core only needs one
/// method: hand it a [`TypedFunction`], get back emitted IR text or a
/// `CoreError` if the backend itself rejects the input.
pub trait IrEmitter {
    fn emit_function(&self, func: &TypedFunction) -> Result<String, CoreError>;
}

/// A backend-free emitter used by driver tests: renders the symbol name and
/// mangled suffixes, parameter types, and result type as a single line of
/// placeholder text, with no attempt at real codegen.
#[derive(Debug, Clone, Default)]
pub struct StubEmitter;

impl IrEmitter for StubEmitter {
    fn emit_function(&self, func: &TypedFunction) -> Result<String, CoreError> {
        let params: Vec<String> = func.param_types.iter().map(Type::to_string).collect();
        Ok(format!(
            "define {} @{}({}){}",
            func.result_type,
            func.symbol,
            params.join(", "),
            if func.is_extern { " ; extern" } else { "" }
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IntType;

    #[test]
    fn stub_emitter_is_deterministic() {
        let func = TypedFunction {
            symbol: "add_mock".to_string(),
            param_types: vec![
                Type::Int(IntType::new(true, 32).unwrap()),
                Type::Int(IntType::new(true, 32).unwrap()),
            ],
            result_type: Type::Int(IntType::new(true, 32).unwrap()),
            is_extern: false,
        };
        let emitter = StubEmitter;
        let a = emitter.emit_function(&func).unwrap();
        let b = emitter.emit_function(&func).unwrap();
        assert_eq!(a, b);
        assert!(a.contains("add_mock"));
    }

    #[test]
    fn extern_functions_are_annotated() {
        let func = TypedFunction {
            symbol: "puts".to_string(),
            param_types: vec![Type::Ptr(Box::new(Type::Int(IntType::new(false, 8).unwrap())))],
            result_type: Type::Void,
            is_extern: true,
        };
        let rendered = StubEmitter.emit_function(&func).unwrap();
        assert!(rendered.contains("extern"));
    }
}
