//! Exit rule variants for the inline kernel (C4).
//!
//! An [`ExitRule`] tells [`super::kernel`] how to rewrite the statements
//! that "leave" a callee body once it has been spliced into a caller.
//! `Return` and `Yield` cover the two host-language shapes the kernel
//! substitutes (plain function calls, generator-driven `for` loops);
//! `Macro` is an escape hatch for a caller-supplied rewrite that doesn't
//! fit either (reserved for future intrinsics; unused by the current
//! driver but kept so a future inline site doesn't need a third kernel
//! entry point).

use crate::ast::Stmt;
use std::rc::Rc;

/// Strategy for rewriting a callee's exit statements once spliced into a
/// caller. See §4.1.
pub enum ExitRule {
    /// Ordinary function inlining: `return expr` becomes an assignment to
    /// `result_var`; a value-less `return` is dropped.
    Return { result_var: String },
    /// Generator inlining behind a `for var in callee(): body else: else_body`.
    /// `loop_body`/`else_body` are the **caller's** statements, not the
    /// callee's; they get spliced at every `yield` and after the callee's
    /// loop exits normally, respectively.
    Yield {
        loop_var: String,
        loop_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        break_label: String,
        continue_label: String,
    },
    /// Caller-supplied arbitrary transform of a single exit statement.
    Macro(Rc<dyn Fn(&Stmt) -> Vec<Stmt>>),
}

impl std::fmt::Debug for ExitRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitRule::Return { result_var } => {
                f.debug_struct("Return").field("result_var", result_var).finish()
            }
            ExitRule::Yield {
                loop_var,
                break_label,
                continue_label,
                ..
            } => f
                .debug_struct("Yield")
                .field("loop_var", loop_var)
                .field("break_label", break_label)
                .field("continue_label", continue_label)
                .finish(),
            ExitRule::Macro(_) => f.debug_tuple("Macro").field(&"<fn>").finish(),
        }
    }
}

impl ExitRule {
    /// A function compiled under this rule must not contain a value-bearing
    /// `return` (Return rule requires it to be *the* exit mechanism; Yield
    /// rule forbids it outright per §4.1).
    pub fn forbids_value_return(&self) -> bool {
        matches!(self, ExitRule::Yield { .. })
    }
}
