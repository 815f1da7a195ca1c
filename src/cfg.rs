//! CFG, Scopes, and Goto/Label Validation (C9)
//!
//! Scopes form a tree rooted at the function scope; a `label` statement is
//! a scope with two jump targets, `begin` (outside the body) and `end`
//! (inside, after defer execution). This module builds that scope
//! structure from the statement tree and validates `goto`/`goto_begin`/
//! `goto_end` targets against it (§4.6). Defer FIFO replay itself is
//! computed alongside linear-state transfer in [`crate::linear`], since
//! that is where per-scope state is already threaded through the walk;
//! this module is the authority for *which* jumps are legal.

use crate::ast::Stmt;
use crate::diagnostics::{CoreError, DiagnosticBag, ErrorKind, SourceSpan};
use std::collections::HashSet;

/// Collect every label name declared anywhere in `body`, regardless of
/// nesting. `goto("X")` targets are resolved against this set: "forward
/// references are allowed" (§4.6), so plain `goto` does not need `X` to be
/// a visible ancestor, only to exist.
fn collect_label_names(body: &[Stmt], out: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Label { name, body: inner, .. } => {
                out.insert(name.clone());
                collect_label_names(inner, out);
            }
            Stmt::If { then_body, else_body, .. } => {
                collect_label_names(then_body, out);
                collect_label_names(else_body, out);
            }
            Stmt::While { body, else_body, .. } | Stmt::For { body, else_body, .. } => {
                collect_label_names(body, out);
                collect_label_names(else_body, out);
            }
            Stmt::Match { arms, .. } => {
                for arm in arms {
                    collect_label_names(&arm.body, out);
                }
            }
            Stmt::WithEffect { body, .. } => collect_label_names(body, out),
            _ => {}
        }
    }
}

/// Validate every `goto`/`goto_begin`/`goto_end` in `body` against the
/// label scope tree, returning any violations.
pub fn validate_gotos(body: &[Stmt]) -> DiagnosticBag {
    let mut errors = DiagnosticBag::new();
    let mut all_labels = HashSet::new();
    collect_label_names(body, &mut all_labels);
    let mut ancestors = Vec::new();
    walk(body, &mut ancestors, &all_labels, &mut errors);
    errors
}

fn walk(body: &[Stmt], ancestors: &mut Vec<String>, all_labels: &HashSet<String>, errors: &mut DiagnosticBag) {
    for stmt in body {
        match stmt {
            Stmt::Label { name, body: inner, .. } => {
                ancestors.push(name.clone());
                walk(inner, ancestors, all_labels, errors);
                ancestors.pop();
            }
            Stmt::Goto(name, span) | Stmt::GotoBegin(name, span) => {
                check_goto_target(name, span, all_labels, errors);
            }
            Stmt::GotoEnd(name, span) => {
                check_goto_end_target(name, span, ancestors, all_labels, errors);
            }
            Stmt::If { then_body, else_body, .. } => {
                walk(then_body, ancestors, all_labels, errors);
                walk(else_body, ancestors, all_labels, errors);
            }
            Stmt::While { body, else_body, .. } | Stmt::For { body, else_body, .. } => {
                walk(body, ancestors, all_labels, errors);
                walk(else_body, ancestors, all_labels, errors);
            }
            Stmt::Match { arms, .. } => {
                for arm in arms {
                    walk(&arm.body, ancestors, all_labels, errors);
                }
            }
            Stmt::WithEffect { body, .. } => walk(body, ancestors, all_labels, errors),
            _ => {}
        }
    }
}

fn check_goto_target(name: &str, span: &SourceSpan, all_labels: &HashSet<String>, errors: &mut DiagnosticBag) {
    if !all_labels.contains(name) {
        errors.push(CoreError::new(
            ErrorKind::LabelNotVisible(name.to_string()),
            span.clone(),
        ));
    }
}

fn check_goto_end_target(
    name: &str,
    span: &SourceSpan,
    ancestors: &[String],
    all_labels: &HashSet<String>,
    errors: &mut DiagnosticBag,
) {
    if ancestors.iter().any(|a| a == name) {
        return;
    }
    if all_labels.contains(name) {
        errors.push(CoreError::new(ErrorKind::GotoEndToUncle(name.to_string()), span.clone()));
    } else {
        errors.push(CoreError::new(
            ErrorKind::LabelNotVisible(name.to_string()),
            span.clone(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn span() -> SourceSpan {
        SourceSpan::new("fixture.pyc", 0)
    }

    #[test]
    fn goto_end_to_self_is_legal() {
        let body = vec![Stmt::Label {
            name: "A".into(),
            body: vec![Stmt::GotoEnd("A".into(), span())],
            span: span(),
        }];
        assert!(validate_gotos(&body).is_empty());
    }

    #[test]
    fn goto_end_to_ancestor_is_legal() {
        let body = vec![Stmt::Label {
            name: "A".into(),
            body: vec![Stmt::Label {
                name: "B".into(),
                body: vec![Stmt::GotoEnd("A".into(), span())],
                span: span(),
            }],
            span: span(),
        }];
        assert!(validate_gotos(&body).is_empty());
    }

    #[test]
    fn s6_goto_end_to_uncle_is_rejected() {
        // with label("A"): with label("B"): pass
        // outside A: goto_end("B")
        let body = vec![
            Stmt::Label {
                name: "A".into(),
                body: vec![Stmt::Label {
                    name: "B".into(),
                    body: vec![Stmt::Expr(Expr::IntLit(0), span())],
                    span: span(),
                }],
                span: span(),
            },
            Stmt::GotoEnd("B".into(), span()),
        ];
        let errors = validate_gotos(&body);
        assert_eq!(errors.errors().len(), 1);
        assert!(matches!(errors.errors()[0].kind, ErrorKind::GotoEndToUncle(_)));
    }

    #[test]
    fn goto_forward_reference_is_legal() {
        let body = vec![
            Stmt::Goto("Later".into(), span()),
            Stmt::Label {
                name: "Later".into(),
                body: vec![],
                span: span(),
            },
        ];
        assert!(validate_gotos(&body).is_empty());
    }

    #[test]
    fn goto_to_unknown_label_is_rejected() {
        let body = vec![Stmt::Goto("Nowhere".into(), span())];
        let errors = validate_gotos(&body);
        assert_eq!(errors.errors().len(), 1);
        assert!(matches!(errors.errors()[0].kind, ErrorKind::LabelNotVisible(_)));
    }
}
