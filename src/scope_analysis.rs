//! Scope Analysis for Inline Substitution
//!
//! Classifies every identifier bound or read inside a callee function body
//! as a **parameter**, a **local**, or a **capture**, ahead of any rewriting
//! by the inline kernel ([`crate::inline`]). Keeping this classification a
//! separate, immutable pass (rather than deciding rename-or-not while
//! walking the tree) is what lets the kernel's rewriter stay a pure
//! substitution over a precomputed map.
//!
//! A name is a capture if it is read in the body but never a parameter and
//! never the target of a `let` inside the body — i.e. it resolves to
//! something outside the callee (a module-level function name, an effect
//! binding via `EffectRef`, or — for nested label scopes — an outer local).
//! Only captures are exempt from the inline kernel's rename pass (§4.1).

use crate::ast::{FunctionDef, Stmt};
use std::collections::HashSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeClassification {
    pub params: HashSet<String>,
    pub locals: HashSet<String>,
    pub captures: HashSet<String>,
}

impl ScopeClassification {
    pub fn is_local(&self, name: &str) -> bool {
        self.locals.contains(name)
    }

    pub fn is_param(&self, name: &str) -> bool {
        self.params.contains(name)
    }

    pub fn is_capture(&self, name: &str) -> bool {
        self.captures.contains(name)
    }
}

/// Classify every identifier in `callee`'s body relative to its parameter
/// list. Declarations (`let`, `for` loop variables, match bindings) are
/// locals; everything else read but never declared or bound is a capture.
pub fn classify(callee: &FunctionDef) -> ScopeClassification {
    let mut class = ScopeClassification::default();
    for p in &callee.params {
        class.params.insert(p.name.clone());
    }

    collect_locals(&callee.body, &mut class.locals);

    let mut reads = Vec::new();
    for stmt in &callee.body {
        collect_reads(stmt, &mut reads);
    }
    for name in reads {
        if !class.params.contains(&name) && !class.locals.contains(&name) {
            class.captures.insert(name);
        }
    }
    class
}

fn collect_locals(body: &[Stmt], locals: &mut HashSet<String>) {
    for stmt in body {
        match stmt {
            Stmt::Let { name, .. } => {
                locals.insert(name.clone());
            }
            Stmt::For { var, body, else_body, .. } => {
                locals.insert(var.clone());
                collect_locals(body, locals);
                collect_locals(else_body, locals);
            }
            Stmt::If { then_body, else_body, .. } => {
                collect_locals(then_body, locals);
                collect_locals(else_body, locals);
            }
            Stmt::While { body, else_body, .. } => {
                collect_locals(body, locals);
                collect_locals(else_body, locals);
            }
            Stmt::Match { arms, .. } => {
                for arm in arms {
                    collect_pattern_bindings(&arm.pattern, locals);
                    collect_locals(&arm.body, locals);
                }
            }
            Stmt::Label { body, .. } => collect_locals(body, locals),
            Stmt::WithEffect { body, .. } => collect_locals(body, locals),
            Stmt::Assign { .. }
            | Stmt::Expr(..)
            | Stmt::Return(..)
            | Stmt::Yield(..)
            | Stmt::Break(_)
            | Stmt::Continue(_)
            | Stmt::Defer { .. }
            | Stmt::Goto(..)
            | Stmt::GotoBegin(..)
            | Stmt::GotoEnd(..)
            | Stmt::EffectDefault { .. }
            | Stmt::EffectPin { .. } => {}
        }
    }
}

fn collect_pattern_bindings(pattern: &crate::ast::Pattern, locals: &mut HashSet<String>) {
    use crate::ast::Pattern;
    match pattern {
        Pattern::Binding(name) => {
            locals.insert(name.clone());
        }
        Pattern::Or(pats) | Pattern::Sequence(pats) => {
            for p in pats {
                collect_pattern_bindings(p, locals);
            }
        }
        Pattern::Struct { fields, .. } => {
            for (_, p) in fields {
                collect_pattern_bindings(p, locals);
            }
        }
        Pattern::Wildcard | Pattern::IntLit(_) | Pattern::BoolLit(_) => {}
    }
}

fn collect_reads(stmt: &Stmt, out: &mut Vec<String>) {
    match stmt {
        Stmt::Let { value, .. } | Stmt::EffectDefault { value, .. } | Stmt::EffectPin { value, .. } => {
            value.free_vars(out)
        }
        Stmt::Assign { target, value, .. } => {
            out.push(target.root().to_string());
            value.free_vars(out);
        }
        Stmt::Expr(e, _) => e.free_vars(out),
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                e.free_vars(out);
            }
        }
        Stmt::Yield(exprs, _) => {
            for e in exprs {
                e.free_vars(out);
            }
        }
        Stmt::If { cond, then_body, else_body, .. } => {
            cond.free_vars(out);
            for s in then_body.iter().chain(else_body) {
                collect_reads(s, out);
            }
        }
        Stmt::While { cond, body, else_body, .. } => {
            cond.free_vars(out);
            for s in body.iter().chain(else_body) {
                collect_reads(s, out);
            }
        }
        Stmt::For { iter, body, else_body, .. } => {
            iter.free_vars(out);
            for s in body.iter().chain(else_body) {
                collect_reads(s, out);
            }
        }
        Stmt::Match { subject, arms, .. } => {
            subject.free_vars(out);
            for arm in arms {
                if let Some(g) = &arm.guard {
                    g.free_vars(out);
                }
                for s in &arm.body {
                    collect_reads(s, out);
                }
            }
        }
        Stmt::Defer { args, .. } => {
            for a in args {
                a.free_vars(out);
            }
        }
        Stmt::Label { body, .. } => {
            for s in body {
                collect_reads(s, out);
            }
        }
        Stmt::WithEffect { bindings, body, .. } => {
            for (_, v) in bindings {
                v.free_vars(out);
            }
            for s in body {
                collect_reads(s, out);
            }
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Goto(..) | Stmt::GotoBegin(..) | Stmt::GotoEnd(..) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decorator, Expr, Param};
    use crate::diagnostics::SourceSpan;
    use crate::types::{IntType, Type};

    fn span() -> SourceSpan {
        SourceSpan::new("fixture.pyc", 0)
    }

    fn i32_ty() -> Type {
        Type::Int(IntType::new(true, 32).unwrap())
    }

    fn func(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> FunctionDef {
        FunctionDef {
            name: name.to_string(),
            decorators: vec![Decorator::Inline],
            params,
            result: i32_ty(),
            body,
            span: span(),
        }
    }

    #[test]
    fn parameters_are_never_captures() {
        let callee = func(
            "add",
            vec![
                Param { name: "a".into(), ty: i32_ty() },
                Param { name: "b".into(), ty: i32_ty() },
            ],
            vec![Stmt::Return(
                Some(Expr::Binary {
                    op: crate::ast::BinOp::Add,
                    lhs: Box::new(Expr::Var("a".into())),
                    rhs: Box::new(Expr::Var("b".into())),
                }),
                span(),
            )],
        );
        let class = classify(&callee);
        assert!(class.is_param("a"));
        assert!(class.is_param("b"));
        assert!(class.captures.is_empty());
    }

    #[test]
    fn let_bound_name_is_local_not_capture() {
        let callee = func(
            "double",
            vec![Param { name: "x".into(), ty: i32_ty() }],
            vec![
                Stmt::Let {
                    name: "y".into(),
                    ty: None,
                    value: Expr::Binary {
                        op: crate::ast::BinOp::Add,
                        lhs: Box::new(Expr::Var("x".into())),
                        rhs: Box::new(Expr::Var("x".into())),
                    },
                    span: span(),
                },
                Stmt::Return(Some(Expr::Var("y".into())), span()),
            ],
        );
        let class = classify(&callee);
        assert!(class.is_local("y"));
        assert!(class.captures.is_empty());
    }

    #[test]
    fn free_read_outside_params_and_locals_is_capture() {
        let callee = func(
            "use_global",
            vec![Param { name: "x".into(), ty: i32_ty() }],
            vec![Stmt::Return(
                Some(Expr::Binary {
                    op: crate::ast::BinOp::Add,
                    lhs: Box::new(Expr::Var("x".into())),
                    rhs: Box::new(Expr::Var("counter".into())),
                }),
                span(),
            )],
        );
        let class = classify(&callee);
        assert!(class.is_capture("counter"));
        assert!(!class.is_local("counter"));
    }

    #[test]
    fn for_loop_variable_and_match_bindings_are_local() {
        let callee = func(
            "walk",
            vec![Param { name: "n".into(), ty: i32_ty() }],
            vec![Stmt::For {
                var: "i".into(),
                iter: Expr::Var("n".into()),
                body: vec![Stmt::Match {
                    subject: Expr::Var("i".into()),
                    arms: vec![crate::ast::MatchArm {
                        pattern: crate::ast::Pattern::Binding("bound".into()),
                        guard: None,
                        body: vec![Stmt::Expr(Expr::Var("bound".into()), span())],
                        span: span(),
                    }],
                    span: span(),
                }],
                else_body: vec![],
                span: span(),
            }],
        );
        let class = classify(&callee);
        assert!(class.is_local("i"));
        assert!(class.is_local("bound"));
        assert!(class.captures.is_empty());
    }
}
