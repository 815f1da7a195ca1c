//! The inline kernel: AST-level substitution of a callee body into a
//! caller under an [`ExitRule`] (C4, §4.1).
//!
//! This is the one place in the crate that rewrites a function body rather
//! than merely analyzing it. Everything downstream (C6–C9) runs on the
//! *already inlined* tree, which is why the kernel must run before the
//! linear checker, the refinement engine, and match lowering.

use super::exit_rule::ExitRule;
use crate::ast::{Expr, FieldStep, FunctionDef, LValue, MatchArm, Pattern, Stmt};
use crate::diagnostics::SourceSpan;
use crate::scope_analysis::{self, ScopeClassification};
use std::collections::HashMap;

/// An immutable record of one inline substitution: the callee body, its
/// call-site arguments, the precomputed param/local/capture classification,
/// a process-wide unique `inline_id`, and the exit rule to apply.
pub struct InlineOp<'a> {
    pub callee: &'a FunctionDef,
    pub args: Vec<Expr>,
    pub classification: ScopeClassification,
    pub inline_id: u64,
    pub exit_rule: ExitRule,
    pub call_site: SourceSpan,
}

impl<'a> InlineOp<'a> {
    pub fn new(
        callee: &'a FunctionDef,
        args: Vec<Expr>,
        inline_id: u64,
        exit_rule: ExitRule,
        call_site: SourceSpan,
    ) -> Self {
        let classification = scope_analysis::classify(callee);
        InlineOp {
            callee,
            args,
            classification,
            inline_id,
            exit_rule,
            call_site,
        }
    }
}

/// Build the rename map covering only `local_vars`; params and captures are
/// left untouched (§4.1 step 1).
fn build_rename_map(op: &InlineOp) -> HashMap<String, String> {
    op.classification
        .locals
        .iter()
        .map(|name| (name.clone(), format!("{name}_inline_{}", op.inline_id)))
        .collect()
}

/// Splice `op.callee`'s body into the caller, returning the replacement
/// statement list. The caller (inline site) is responsible for detecting
/// recursive inlining before calling this (a visiting set keyed by callee
/// identity) — the kernel performs one substitution, not a fixpoint.
pub fn substitute(op: &InlineOp) -> Vec<Stmt> {
    let rename = build_rename_map(op);

    let mut stmts = Vec::with_capacity(op.callee.params.len() + 1);
    for (param, arg) in op.callee.params.iter().zip(op.args.iter()) {
        stmts.push(Stmt::Let {
            name: param.name.clone(),
            ty: None,
            value: rewrite_expr(arg, &rename),
            span: op.call_site.clone(),
        });
    }

    let rewritten_body: Vec<Stmt> = op
        .callee
        .body
        .iter()
        .flat_map(|s| rewrite_stmt(s, &rename, &op.exit_rule))
        .collect();

    match &op.exit_rule {
        ExitRule::Return { .. } | ExitRule::Macro(_) => {
            stmts.extend(rewritten_body);
        }
        ExitRule::Yield {
            break_label,
            else_body,
            ..
        } => {
            let mut label_body = rewritten_body;
            label_body.extend(else_body.iter().map(|s| rewrite_stmt_plain(s, &rename)));
            stmts.push(Stmt::Label {
                name: break_label.clone(),
                body: label_body,
                span: op.call_site.clone(),
            });
        }
    }
    stmts
}

fn rewrite_name(name: &str, rename: &HashMap<String, String>) -> String {
    rename.get(name).cloned().unwrap_or_else(|| name.to_string())
}

fn rewrite_expr(expr: &Expr, rename: &HashMap<String, String>) -> Expr {
    match expr {
        Expr::Var(name) => Expr::Var(rewrite_name(name, rename)),
        Expr::Field(base, step) => Expr::Field(Box::new(rewrite_expr(base, rename)), step.clone()),
        Expr::Call { callee, args } => Expr::Call {
            callee: callee.clone(),
            args: args.iter().map(|a| rewrite_expr(a, rename)).collect(),
        },
        Expr::TypeCall {
            type_name,
            type_args,
            args,
        } => Expr::TypeCall {
            type_name: type_name.clone(),
            type_args: type_args.clone(),
            args: args.iter().map(|a| rewrite_expr(a, rename)).collect(),
        },
        Expr::EffectRef { name, path } => Expr::EffectRef {
            name: name.clone(),
            path: path.clone(),
        },
        Expr::LinearNew => Expr::LinearNew,
        Expr::Consume(e) => Expr::Consume(Box::new(rewrite_expr(e, rename))),
        Expr::Move(e) => Expr::Move(Box::new(rewrite_expr(e, rename))),
        Expr::Assume {
            values,
            predicates,
            tags,
        } => Expr::Assume {
            values: values.iter().map(|v| rewrite_expr(v, rename)).collect(),
            predicates: predicates.clone(),
            tags: tags.clone(),
        },
        Expr::Refine { values, predicates } => Expr::Refine {
            values: values.iter().map(|v| rewrite_expr(v, rename)).collect(),
            predicates: predicates.clone(),
        },
        Expr::Binary { op, lhs, rhs } => Expr::Binary {
            op: *op,
            lhs: Box::new(rewrite_expr(lhs, rename)),
            rhs: Box::new(rewrite_expr(rhs, rename)),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: Box::new(rewrite_expr(operand, rename)),
        },
        Expr::Tuple(items) => Expr::Tuple(items.iter().map(|v| rewrite_expr(v, rename)).collect()),
        Expr::Ptr(e) => Expr::Ptr(Box::new(rewrite_expr(e, rename))),
        Expr::IntLit(_)
        | Expr::FloatLit(_)
        | Expr::BoolLit(_)
        | Expr::StrLit(_)
        | Expr::Sizeof(_)
        | Expr::Nullptr => expr.clone(),
    }
}

fn rewrite_lvalue(lv: &LValue, rename: &HashMap<String, String>) -> LValue {
    match lv {
        LValue::Var(name) => LValue::Var(rewrite_name(name, rename)),
        LValue::Field(base, step) => LValue::Field(Box::new(rewrite_lvalue(base, rename)), step.clone()),
    }
}

fn rewrite_pattern(pattern: &Pattern, rename: &HashMap<String, String>) -> Pattern {
    match pattern {
        Pattern::Binding(name) => Pattern::Binding(rewrite_name(name, rename)),
        Pattern::Or(pats) => Pattern::Or(pats.iter().map(|p| rewrite_pattern(p, rename)).collect()),
        Pattern::Sequence(pats) => {
            Pattern::Sequence(pats.iter().map(|p| rewrite_pattern(p, rename)).collect())
        }
        Pattern::Struct { tag, fields } => Pattern::Struct {
            tag: tag.clone(),
            fields: fields
                .iter()
                .map(|(n, p)| (n.clone(), rewrite_pattern(p, rename)))
                .collect(),
        },
        Pattern::Wildcard | Pattern::IntLit(_) | Pattern::BoolLit(_) => pattern.clone(),
    }
}

/// Rewrite a statement with no exit-rule substitution applied (used for an
/// exit rule's own `else_body`, which contains no `yield`/value-`return`).
fn rewrite_stmt_plain(stmt: &Stmt, rename: &HashMap<String, String>) -> Stmt {
    let mut out = rewrite_stmt_generic(stmt, rename, &mut |s, r| vec![rewrite_stmt_plain(s, r)]);
    assert_eq!(out.len(), 1);
    out.pop().unwrap()
}

/// Rewrite one callee statement, applying `exit_rule` at Return/Yield nodes
/// and recursing structurally everywhere else. Returns a list since an
/// exit node may expand into several statements (or none).
fn rewrite_stmt(stmt: &Stmt, rename: &HashMap<String, String>, exit_rule: &ExitRule) -> Vec<Stmt> {
    match (stmt, exit_rule) {
        (Stmt::Return(value, span), ExitRule::Return { result_var }) => match value {
            Some(e) => vec![Stmt::Assign {
                target: LValue::Var(result_var.clone()),
                value: rewrite_expr(e, rename),
                span: span.clone(),
            }],
            None => vec![],
        },
        (Stmt::Return(_, span), ExitRule::Yield { break_label, .. }) => {
            vec![Stmt::GotoEnd(break_label.clone(), span.clone())]
        }
        (Stmt::Yield(exprs, span), ExitRule::Yield {
            loop_var,
            loop_body,
            break_label,
            continue_label,
            ..
        }) => {
            let value = if exprs.len() == 1 {
                rewrite_expr(&exprs[0], rename)
            } else {
                Expr::Tuple(exprs.iter().map(|e| rewrite_expr(e, rename)).collect())
            };
            let assign = Stmt::Assign {
                target: LValue::Var(loop_var.clone()),
                value,
                span: span.clone(),
            };
            let rewritten_loop_body: Vec<Stmt> = loop_body
                .iter()
                .map(|s| rewrite_caller_loop_stmt(s, break_label, continue_label))
                .collect();
            let wrapped = Stmt::Label {
                name: continue_label.clone(),
                body: rewritten_loop_body,
                span: span.clone(),
            };
            vec![assign, wrapped]
        }
        (Stmt::Return(value, span), ExitRule::Macro(transform)) => {
            transform(&Stmt::Return(value.clone(), span.clone()))
        }
        (Stmt::Yield(exprs, span), ExitRule::Macro(transform)) => {
            transform(&Stmt::Yield(exprs.clone(), span.clone()))
        }
        (other, _) => rewrite_stmt_generic(other, rename, &mut |s, r| rewrite_stmt(s, r, exit_rule)),
    }
}

/// Structural recursion shared by [`rewrite_stmt`] and [`rewrite_stmt_plain`]:
/// rewrite names in non-exit statements and recurse into nested bodies via
/// `recur`, which decides how to handle exit nodes.
fn rewrite_stmt_generic(
    stmt: &Stmt,
    rename: &HashMap<String, String>,
    recur: &mut dyn FnMut(&Stmt, &HashMap<String, String>) -> Vec<Stmt>,
) -> Vec<Stmt> {
    let flat = |body: &[Stmt], recur: &mut dyn FnMut(&Stmt, &HashMap<String, String>) -> Vec<Stmt>| {
        body.iter().flat_map(|s| recur(s, rename)).collect::<Vec<_>>()
    };
    match stmt {
        Stmt::Let { name, ty, value, span } => vec![Stmt::Let {
            name: rewrite_name(name, rename),
            ty: ty.clone(),
            value: rewrite_expr(value, rename),
            span: span.clone(),
        }],
        Stmt::Assign { target, value, span } => vec![Stmt::Assign {
            target: rewrite_lvalue(target, rename),
            value: rewrite_expr(value, rename),
            span: span.clone(),
        }],
        Stmt::Expr(e, span) => vec![Stmt::Expr(rewrite_expr(e, rename), span.clone())],
        Stmt::Return(e, span) => vec![Stmt::Return(e.as_ref().map(|e| rewrite_expr(e, rename)), span.clone())],
        Stmt::Yield(exprs, span) => {
            vec![Stmt::Yield(exprs.iter().map(|e| rewrite_expr(e, rename)).collect(), span.clone())]
        }
        Stmt::Break(span) => vec![Stmt::Break(span.clone())],
        Stmt::Continue(span) => vec![Stmt::Continue(span.clone())],
        Stmt::If {
            cond,
            then_body,
            else_body,
            span,
        } => vec![Stmt::If {
            cond: rewrite_expr(cond, rename),
            then_body: flat(then_body, recur),
            else_body: flat(else_body, recur),
            span: span.clone(),
        }],
        Stmt::While {
            cond,
            body,
            else_body,
            span,
        } => vec![Stmt::While {
            cond: rewrite_expr(cond, rename),
            body: flat(body, recur),
            else_body: flat(else_body, recur),
            span: span.clone(),
        }],
        Stmt::For {
            var,
            iter,
            body,
            else_body,
            span,
        } => vec![Stmt::For {
            var: rewrite_name(var, rename),
            iter: rewrite_expr(iter, rename),
            body: flat(body, recur),
            else_body: flat(else_body, recur),
            span: span.clone(),
        }],
        Stmt::Match { subject, arms, span } => vec![Stmt::Match {
            subject: rewrite_expr(subject, rename),
            arms: arms
                .iter()
                .map(|arm| MatchArm {
                    pattern: rewrite_pattern(&arm.pattern, rename),
                    guard: arm.guard.as_ref().map(|g| rewrite_expr(g, rename)),
                    body: flat(&arm.body, recur),
                    span: arm.span.clone(),
                })
                .collect(),
            span: span.clone(),
        }],
        Stmt::Defer { callee, args, span } => vec![Stmt::Defer {
            callee: callee.clone(),
            args: args.iter().map(|a| rewrite_expr(a, rename)).collect(),
            span: span.clone(),
        }],
        Stmt::Label { name, body, span } => vec![Stmt::Label {
            name: name.clone(),
            body: flat(body, recur),
            span: span.clone(),
        }],
        Stmt::Goto(name, span) => vec![Stmt::Goto(name.clone(), span.clone())],
        Stmt::GotoBegin(name, span) => vec![Stmt::GotoBegin(name.clone(), span.clone())],
        Stmt::GotoEnd(name, span) => vec![Stmt::GotoEnd(name.clone(), span.clone())],
        Stmt::WithEffect {
            bindings,
            suffix,
            body,
            span,
        } => vec![Stmt::WithEffect {
            bindings: bindings
                .iter()
                .map(|(n, v)| (n.clone(), rewrite_expr(v, rename)))
                .collect(),
            suffix: suffix.clone(),
            body: flat(body, recur),
            span: span.clone(),
        }],
        Stmt::EffectDefault { name, value, span } => vec![Stmt::EffectDefault {
            name: name.clone(),
            value: rewrite_expr(value, rename),
            span: span.clone(),
        }],
        Stmt::EffectPin { name, value, span } => vec![Stmt::EffectPin {
            name: name.clone(),
            value: rewrite_expr(value, rename),
            span: span.clone(),
        }],
    }
}

/// Rewrite a statement from the **caller's** loop body (the Yield rule's
/// `loop_body`), retargeting only its own top-level `break`/`continue` —
/// ones nested inside a further loop or label within `loop_body` belong to
/// that inner construct and are left untouched.
fn rewrite_caller_loop_stmt(stmt: &Stmt, break_label: &str, continue_label: &str) -> Stmt {
    match stmt {
        Stmt::Break(span) => Stmt::GotoEnd(break_label.to_string(), span.clone()),
        Stmt::Continue(span) => Stmt::GotoEnd(continue_label.to_string(), span.clone()),
        Stmt::If {
            cond,
            then_body,
            else_body,
            span,
        } => Stmt::If {
            cond: cond.clone(),
            then_body: then_body
                .iter()
                .map(|s| rewrite_caller_loop_stmt(s, break_label, continue_label))
                .collect(),
            else_body: else_body
                .iter()
                .map(|s| rewrite_caller_loop_stmt(s, break_label, continue_label))
                .collect(),
            span: span.clone(),
        },
        Stmt::Match { subject, arms, span } => Stmt::Match {
            subject: subject.clone(),
            arms: arms
                .iter()
                .map(|arm| MatchArm {
                    pattern: arm.pattern.clone(),
                    guard: arm.guard.clone(),
                    body: arm
                        .body
                        .iter()
                        .map(|s| rewrite_caller_loop_stmt(s, break_label, continue_label))
                        .collect(),
                    span: arm.span.clone(),
                })
                .collect(),
            span: span.clone(),
        },
        Stmt::Label { name, body, span } => Stmt::Label {
            name: name.clone(),
            body: body
                .iter()
                .map(|s| rewrite_caller_loop_stmt(s, break_label, continue_label))
                .collect(),
            span: span.clone(),
        },
        // `While`/`For` introduce their own break/continue target; do not descend.
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Decorator, Param};
    use crate::types::{IntType, Type};

    fn span() -> SourceSpan {
        SourceSpan::new("fixture.pyc", 0)
    }

    fn i32_ty() -> Type {
        Type::Int(IntType::new(true, 32).unwrap())
    }

    fn simple_add() -> FunctionDef {
        FunctionDef {
            name: "add".into(),
            decorators: vec![Decorator::Inline],
            params: vec![
                Param { name: "a".into(), ty: i32_ty() },
                Param { name: "b".into(), ty: i32_ty() },
            ],
            result: i32_ty(),
            body: vec![
                Stmt::Let {
                    name: "tmp".into(),
                    ty: None,
                    value: Expr::Binary {
                        op: BinOp::Add,
                        lhs: Box::new(Expr::Var("a".into())),
                        rhs: Box::new(Expr::Var("b".into())),
                    },
                    span: span(),
                },
                Stmt::Return(Some(Expr::Var("tmp".into())), span()),
            ],
        }
    }

    #[test]
    fn locals_are_renamed_params_are_not() {
        let callee = simple_add();
        let op = InlineOp::new(
            &callee,
            vec![Expr::IntLit(1), Expr::IntLit(2)],
            7,
            ExitRule::Return { result_var: "result".into() },
            span(),
        );
        let out = substitute(&op);
        // two param bindings + one renamed `let` + one assignment to result
        assert_eq!(out.len(), 4);
        match &out[2] {
            Stmt::Let { name, .. } => assert_eq!(name, "tmp_inline_7"),
            other => panic!("expected renamed let, got {other:?}"),
        }
        match &out[3] {
            Stmt::Assign { target, value, .. } => {
                assert_eq!(*target, LValue::Var("result".into()));
                match value {
                    Expr::Var(name) => assert_eq!(name, "tmp_inline_7"),
                    other => panic!("expected renamed var read, got {other:?}"),
                }
            }
            other => panic!("expected assign, got {other:?}"),
        }
    }

    #[test]
    fn plain_return_is_dropped_under_return_rule() {
        let callee = FunctionDef {
            name: "noop".into(),
            decorators: vec![Decorator::Inline],
            params: vec![],
            result: Type::Void,
            body: vec![Stmt::Return(None, span())],
            ..simple_add()
        };
        let op = InlineOp::new(&callee, vec![], 1, ExitRule::Return { result_var: "_r".into() }, span());
        let out = substitute(&op);
        assert!(out.is_empty());
    }

    #[test]
    fn yield_expands_to_assignment_and_wrapped_loop_body() {
        let callee = FunctionDef {
            name: "counter".into(),
            decorators: vec![Decorator::Inline],
            params: vec![],
            result: Type::Void,
            body: vec![Stmt::Yield(vec![Expr::IntLit(0)], span())],
            ..simple_add()
        };
        let op = InlineOp::new(
            &callee,
            vec![],
            3,
            ExitRule::Yield {
                loop_var: "x".into(),
                loop_body: vec![Stmt::Expr(Expr::Var("x".into()), span())],
                else_body: vec![],
                break_label: "for_3_break".into(),
                continue_label: "for_3_continue".into(),
            },
            span(),
        );
        let out = substitute(&op);
        // one outer Label(break_label) wrapping [assign, Label(continue_label){...}]
        assert_eq!(out.len(), 1);
        match &out[0] {
            Stmt::Label { name, body, .. } => {
                assert_eq!(name, "for_3_break");
                assert_eq!(body.len(), 2);
                assert!(matches!(body[0], Stmt::Assign { .. }));
                assert!(matches!(body[1], Stmt::Label { .. }));
            }
            other => panic!("expected label, got {other:?}"),
        }
    }
}
