//! Compilation Driver (C10)
//!
//! Owns every piece of per-compilation state explicitly (§5: "never in
//! process-global statics"): the symbol [`Registry`], the [`EffectEnv`], the
//! call graph built from the program's top-level functions, a cache of
//! already-compiled `(name, compile_suffix, effect_suffix)` triples, and the
//! monotonic inline-id counter the inline kernel (C4) needs for its rename
//! scheme.
//!
//! Two distinct notions of "cycle" are tracked separately, since they have
//! different legality:
//! - An `@inline` callee that (transitively) inlines back into itself cannot
//!   terminate, since the kernel performs one AST splice per call and has no
//!   base case; this is `RecursiveInline`, detected via `inlining_stack`.
//! - A compiled unit whose effect-suffixed variant cannot be resolved
//!   without first resolving another variant that depends on it back is
//!   `CompileCycle`, detected via `variant_stack`. Ordinary recursive or
//!   mutually-recursive *calls* between two non-suffixed, non-inlined
//!   functions are not cycles at all: codegen only needs a callee's mangled
//!   name to emit a call instruction, not its finished body, so the driver
//!   never re-enters `compile_unit` for a plain call.

use crate::ast::{Expr, FunctionDef, LValue, MatchArm, Pattern, Program, Stmt, TypeDecl};
use crate::call_graph::CallGraph;
use crate::cfg;
use crate::diagnostics::{CoreError, DiagnosticBag, ErrorKind, SourceSpan};
use crate::effects::{direct_effect_reads, EffectEnv, EffectReadSet};
use crate::inline::{self, ExitRule, InlineOp};
use crate::ir::{IrEmitter, TypedFunction};
use crate::linear::LinearChecker;
use crate::matching::{self, Arm};
use crate::refinement;
use crate::registry::{Entity, Registry, SymbolKey};
use crate::types::{IntType, Type, Variant};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

pub struct DriverSession<'a> {
    functions_by_name: HashMap<&'a str, &'a FunctionDef>,
    registry: Registry,
    effects: EffectEnv,
    call_graph: CallGraph,
    compiled: HashMap<SymbolKey, TypedFunction>,
    next_inline_id: u64,
    diagnostics: DiagnosticBag,
    /// Maps a declared enum variant's bare name to the full `Type::Enum` it
    /// belongs to, so a `match` subject's type can be recovered from the
    /// variant tags appearing in its arms (§4.7/§4.5) without a general
    /// expression type-checker.
    enum_by_variant: HashMap<String, Type>,
}

impl<'a> DriverSession<'a> {
    pub fn new(program: &'a Program) -> Self {
        let call_graph = CallGraph::build(program);
        let mut functions_by_name = HashMap::new();
        let mut registry = Registry::new();
        for f in &program.functions {
            functions_by_name.insert(f.name.as_str(), f);
            registry.define_function(
                SymbolKey::base(f.name.clone()),
                Entity::Function {
                    params: f.params.iter().map(|p| p.ty.clone()).collect(),
                    result: f.result.clone(),
                    is_extern: f.is_extern(),
                },
            );
        }

        let mut enum_by_variant = HashMap::new();
        for decl in &program.type_decls {
            if let TypeDecl::Enum { tag_type, variants, .. } = decl {
                let tag_type = match tag_type {
                    Type::Int(it) => *it,
                    _ => IntType::new(true, 32).unwrap(),
                };
                let enum_ty = Type::Enum {
                    tag_type,
                    variants: variants
                        .iter()
                        .map(|(name, tag_value, payload)| Variant {
                            name: name.clone(),
                            tag_value: *tag_value,
                            payload: payload.clone(),
                        })
                        .collect(),
                };
                for (name, ..) in variants {
                    enum_by_variant.insert(name.clone(), enum_ty.clone());
                }
            }
        }

        DriverSession {
            functions_by_name,
            registry,
            effects: EffectEnv::new(),
            call_graph,
            compiled: HashMap::new(),
            next_inline_id: 0,
            diagnostics: DiagnosticBag::new(),
            enum_by_variant,
        }
    }

    pub fn effects_mut(&mut self) -> &mut EffectEnv {
        &mut self.effects
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn next_inline_id(&mut self) -> u64 {
        let id = self.next_inline_id;
        self.next_inline_id += 1;
        id
    }

    /// Compile every `@compile`-decorated unit, in call-graph order (§5,
    /// "a compilation is deterministic given its inputs"). Returns every
    /// symbol the session emitted — including effect-suffixed variants
    /// forwarded to as a side effect of compiling another unit under an
    /// active override, since those are distinct emitted symbols too (§8,
    /// invariant 3) — or the accumulated diagnostics if any unit failed a
    /// check. A unit with pending errors never reaches `emitter` (§7).
    pub fn compile_program(&mut self, emitter: &dyn IrEmitter) -> Result<Vec<TypedFunction>, DiagnosticBag> {
        let mut order = self.call_graph.compilation_order();
        order.retain(|name| {
            self.functions_by_name
                .get(name.as_str())
                .is_some_and(|f| f.is_compile_unit())
        });

        for name in order {
            let key = SymbolKey::base(name.clone());
            let mut variant_stack = Vec::new();
            let mut inlining_stack = Vec::new();
            let _ = self.compile_unit(&name, key, &mut variant_stack, &mut inlining_stack, emitter);
        }

        if self.diagnostics.is_empty() {
            let mut out: Vec<TypedFunction> = self.compiled.values().cloned().collect();
            out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            Ok(out)
        } else {
            Err(std::mem::take(&mut self.diagnostics))
        }
    }

    fn compile_unit(
        &mut self,
        name: &str,
        key: SymbolKey,
        variant_stack: &mut Vec<SymbolKey>,
        inlining_stack: &mut Vec<String>,
        emitter: &dyn IrEmitter,
    ) -> Result<TypedFunction, ()> {
        if let Some(cached) = self.compiled.get(&key) {
            debug!(symbol = %key.mangled(), "unit already compiled, reusing cached variant");
            return Ok(cached.clone());
        }
        if variant_stack.contains(&key) {
            warn!(symbol = %key.mangled(), "effect-suffix forwarding cycle detected");
            self.diagnostics.push(CoreError::new(
                ErrorKind::CompileCycle(format!(
                    "variant '{}' depends on itself through effect-suffix forwarding",
                    key.mangled()
                )),
                SourceSpan::new("driver", 0),
            ));
            return Err(());
        }
        variant_stack.push(key.clone());

        let func = match self.functions_by_name.get(name) {
            Some(f) => *f,
            None => {
                variant_stack.pop();
                return Err(());
            }
        };

        self.diagnostics.extend(cfg::validate_gotos(&func.body));

        let expanded_body = self.expand_inlines(&func.body, inlining_stack);
        let expanded = FunctionDef {
            body: expanded_body,
            ..func.clone()
        };
        self.diagnostics.extend(LinearChecker::new().check_function(&expanded));
        self.check_matches(&expanded.body);

        let suffix = self.effects.active_suffix().to_string();
        if !suffix.is_empty() {
            if let Some(callees) = self.call_graph.callees(name).cloned() {
                for callee in callees {
                    if callee == name {
                        continue;
                    }
                    if self.callee_reads_override(&callee) {
                        let callee_key = SymbolKey::base(callee.clone()).with_effect_suffix(suffix.clone());
                        let _ = self.compile_unit(&callee, callee_key, variant_stack, inlining_stack, emitter);
                    }
                }
            }
        }

        variant_stack.pop();

        if !self.diagnostics.is_empty() {
            return Err(());
        }

        let typed = TypedFunction {
            symbol: key.mangled(),
            param_types: func.params.iter().map(|p| p.ty.clone()).collect(),
            result_type: func.result.clone(),
            is_extern: func.is_extern(),
        };
        match emitter.emit_function(&typed) {
            Ok(_) => {
                debug!(symbol = %typed.symbol, "unit emitted");
                self.compiled.insert(key, typed.clone());
                Ok(typed)
            }
            Err(e) => {
                warn!(symbol = %typed.symbol, "backend rejected emitted unit");
                self.diagnostics.push(e);
                Err(())
            }
        }
    }

    fn callee_reads_override(&self, callee: &str) -> bool {
        let Some(func) = self.functions_by_name.get(callee) else {
            return false;
        };
        let mut reads = HashSet::new();
        for stmt in &func.body {
            collect_stmt_effect_reads(stmt, &mut reads);
        }
        EffectReadSet(reads).intersects_override(&self.effects)
    }

    /// Expand every call to an `@inline`-decorated function in `body`,
    /// recursively. Only statement-level calls are recognized as inline
    /// sites (a plain `Expr::Call`, or one assigned via `let`/`=`); a call
    /// nested inside a larger expression (an `if` condition, a match
    /// guard) is left alone, matching the kernel's statement-splicing
    /// contract rather than attempting expression-level substitution.
    fn expand_inlines(&mut self, body: &[Stmt], inlining_stack: &mut Vec<String>) -> Vec<Stmt> {
        let mut out = Vec::with_capacity(body.len());
        for stmt in body {
            out.extend(self.expand_stmt(stmt, inlining_stack));
        }
        out
    }

    fn expand_stmt(&mut self, stmt: &Stmt, inlining_stack: &mut Vec<String>) -> Vec<Stmt> {
        match stmt {
            Stmt::Expr(Expr::Call { callee, args }, span) if self.is_inline_target(callee) => {
                self.inline_call_site(callee, args, None, span, inlining_stack)
            }
            Stmt::Let {
                name,
                value: Expr::Call { callee, args },
                span,
                ..
            } if self.is_inline_target(callee) => {
                self.inline_call_site(callee, args, Some(name.clone()), span, inlining_stack)
            }
            Stmt::Assign {
                target: LValue::Var(name),
                value: Expr::Call { callee, args },
                span,
            } if self.is_inline_target(callee) => {
                self.inline_call_site(callee, args, Some(name.clone()), span, inlining_stack)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                span,
            } => vec![Stmt::If {
                cond: cond.clone(),
                then_body: self.expand_inlines(then_body, inlining_stack),
                else_body: self.expand_inlines(else_body, inlining_stack),
                span: span.clone(),
            }],
            Stmt::While {
                cond,
                body,
                else_body,
                span,
            } => vec![Stmt::While {
                cond: cond.clone(),
                body: self.expand_inlines(body, inlining_stack),
                else_body: self.expand_inlines(else_body, inlining_stack),
                span: span.clone(),
            }],
            Stmt::For {
                var,
                iter: Expr::Call { callee, args },
                body,
                else_body,
                span,
            } if self.is_inline_target(callee) => {
                self.inline_generator_site(callee, args, var, body, else_body, span, inlining_stack)
            }
            Stmt::For {
                var,
                iter: Expr::Refine { values, predicates },
                body,
                else_body,
                span,
            } => self.lower_refine_for(var, values, predicates, body, else_body, span, inlining_stack),
            Stmt::For {
                var,
                iter,
                body,
                else_body,
                span,
            } => vec![Stmt::For {
                var: var.clone(),
                iter: iter.clone(),
                body: self.expand_inlines(body, inlining_stack),
                else_body: self.expand_inlines(else_body, inlining_stack),
                span: span.clone(),
            }],
            Stmt::Match { subject, arms, span } => vec![Stmt::Match {
                subject: subject.clone(),
                arms: arms
                    .iter()
                    .map(|arm| MatchArm {
                        pattern: arm.pattern.clone(),
                        guard: arm.guard.clone(),
                        body: self.expand_inlines(&arm.body, inlining_stack),
                        span: arm.span.clone(),
                    })
                    .collect(),
                span: span.clone(),
            }],
            Stmt::Label { name, body, span } => vec![Stmt::Label {
                name: name.clone(),
                body: self.expand_inlines(body, inlining_stack),
                span: span.clone(),
            }],
            Stmt::WithEffect {
                bindings,
                suffix,
                body,
                span,
            } => vec![Stmt::WithEffect {
                bindings: bindings.clone(),
                suffix: suffix.clone(),
                body: self.expand_inlines(body, inlining_stack),
                span: span.clone(),
            }],
            other => vec![other.clone()],
        }
    }

    fn is_inline_target(&self, callee: &str) -> bool {
        self.functions_by_name.get(callee).is_some_and(|f| f.requests_inline())
    }

    fn inline_call_site(
        &mut self,
        callee_name: &str,
        args: &[Expr],
        result_var: Option<String>,
        span: &SourceSpan,
        inlining_stack: &mut Vec<String>,
    ) -> Vec<Stmt> {
        if inlining_stack.iter().any(|n| n == callee_name) {
            warn!(callee = callee_name, "inline splice cannot terminate, rejecting");
            self.diagnostics.push(CoreError::new(
                ErrorKind::RecursiveInline(callee_name.to_string()),
                span.clone(),
            ));
            return vec![];
        }
        let Some(callee) = self.functions_by_name.get(callee_name).copied() else {
            return vec![];
        };
        let id = self.next_inline_id();
        let result_var = result_var.unwrap_or_else(|| format!("_inline_discard_{id}"));
        let op = InlineOp::new(callee, args.to_vec(), id, ExitRule::Return { result_var }, span.clone());
        let expanded = inline::substitute(&op);

        inlining_stack.push(callee_name.to_string());
        let reexpanded = self.expand_inlines(&expanded, inlining_stack);
        inlining_stack.pop();
        reexpanded
    }

    /// `for var in gen(...): body else: else_body` where `gen` is an
    /// `@inline` generator — lowers via the kernel's `ExitRule::Yield`
    /// rather than `Return` (§4.1): the caller's loop body is spliced in at
    /// every `yield` in `gen`, `break`/`continue` become `goto_end`s to
    /// fresh per-site labels, and the caller's `else_body` runs once after
    /// `gen` exits without a `break`.
    #[allow(clippy::too_many_arguments)]
    fn inline_generator_site(
        &mut self,
        callee_name: &str,
        args: &[Expr],
        loop_var: &str,
        body: &[Stmt],
        else_body: &[Stmt],
        span: &SourceSpan,
        inlining_stack: &mut Vec<String>,
    ) -> Vec<Stmt> {
        if inlining_stack.iter().any(|n| n == callee_name) {
            warn!(callee = callee_name, "inline splice cannot terminate, rejecting");
            self.diagnostics.push(CoreError::new(
                ErrorKind::RecursiveInline(callee_name.to_string()),
                span.clone(),
            ));
            return vec![];
        }
        let Some(callee) = self.functions_by_name.get(callee_name).copied() else {
            return vec![];
        };
        let id = self.next_inline_id();
        let loop_body = self.expand_inlines(body, inlining_stack);
        let else_body = self.expand_inlines(else_body, inlining_stack);
        let op = InlineOp::new(
            callee,
            args.to_vec(),
            id,
            ExitRule::Yield {
                loop_var: loop_var.to_string(),
                loop_body,
                else_body,
                break_label: format!("for_{id}_break"),
                continue_label: format!("for_{id}_continue"),
            },
            span.clone(),
        );
        let expanded = inline::substitute(&op);

        inlining_stack.push(callee_name.to_string());
        let reexpanded = self.expand_inlines(&expanded, inlining_stack);
        inlining_stack.pop();
        reexpanded
    }

    /// `for var in refine(v.., p..): body else: else_body` (§4.4, scenario
    /// S8) lowers to a guarded `if`: the loop variable is bound to the
    /// `assume`d refined value and `body` runs once iff every predicate in
    /// `p..` holds of `v..`; otherwise `else_body` runs. Unlike the
    /// generator form this never loops — `refine` yields at most once.
    #[allow(clippy::too_many_arguments)]
    fn lower_refine_for(
        &mut self,
        loop_var: &str,
        values: &[Expr],
        predicates: &[String],
        body: &[Stmt],
        else_body: &[Stmt],
        span: &SourceSpan,
        inlining_stack: &mut Vec<String>,
    ) -> Vec<Stmt> {
        if let Err(e) = refinement::validate_refine_site(true, span.clone()) {
            self.diagnostics.push(e);
        }
        for pred in predicates {
            if let Some(pred_fn) = self.functions_by_name.get(pred.as_str()) {
                if let Err(e) = refinement::validate_assume_arity(values.len(), pred_fn.params.len(), span.clone()) {
                    self.diagnostics.push(e);
                }
            }
        }

        let bind_refined = Stmt::Let {
            name: loop_var.to_string(),
            ty: None,
            value: Expr::Assume {
                values: values.to_vec(),
                predicates: predicates.to_vec(),
                tags: vec![],
            },
            span: span.clone(),
        };

        let cond = refinement::predicate_conjunction(predicates)
            .into_iter()
            .map(|pred| Expr::Call {
                callee: pred,
                args: values.to_vec(),
            })
            .reduce(|acc, call| Expr::Binary {
                op: crate::ast::BinOp::And,
                lhs: Box::new(acc),
                rhs: Box::new(call),
            });

        let mut then_body = vec![bind_refined];
        then_body.extend(self.expand_inlines(body, inlining_stack));
        let else_body = self.expand_inlines(else_body, inlining_stack);

        match cond {
            Some(cond) => vec![Stmt::If {
                cond,
                then_body,
                else_body,
                span: span.clone(),
            }],
            // No predicates at all: vacuously true, `refine` always yields.
            None => then_body,
        }
    }

    /// Check exhaustiveness of every `match` in `body` (recursing into
    /// nested scopes) and decide its lowering (C8, §4.5, §8 invariant 2). A
    /// non-exhaustive match is fatal, matching `compile_unit`'s other checks
    /// — it never reaches `emitter`. The subject's type is recovered from
    /// the shapes of the patterns appearing in its arms (a bare `Bool`
    /// literal implies `Type::Bool`, a tagged `Struct` pattern implies the
    /// enum it was declared under) rather than through a general expression
    /// type-checker, which this crate doesn't otherwise carry; a match whose
    /// subject type can't be recovered this way is left unchecked.
    fn check_matches(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.check_matches_in_stmt(stmt);
        }
    }

    fn check_matches_in_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Match { arms, span, .. } => {
                let arm_data: Vec<Arm<'_>> = arms
                    .iter()
                    .map(|a| Arm {
                        pattern: &a.pattern,
                        has_guard: a.guard.is_some(),
                    })
                    .collect();
                if let Some(subject_ty) = self.infer_match_subject_type(arms) {
                    match matching::check_exhaustive(&subject_ty, &arm_data, span.clone()) {
                        Ok(()) => {
                            let lowering = matching::choose_lowering(&subject_ty, &arm_data);
                            debug!(?lowering, "match lowering decided");
                        }
                        Err(e) => self.diagnostics.push(e),
                    }
                }
                for arm in arms {
                    self.check_matches(&arm.body);
                }
            }
            Stmt::If { then_body, else_body, .. } => {
                self.check_matches(then_body);
                self.check_matches(else_body);
            }
            Stmt::While { body, else_body, .. } | Stmt::For { body, else_body, .. } => {
                self.check_matches(body);
                self.check_matches(else_body);
            }
            Stmt::Label { body, .. } | Stmt::WithEffect { body, .. } => {
                self.check_matches(body);
            }
            _ => {}
        }
    }

    fn infer_match_subject_type(&self, arms: &[MatchArm]) -> Option<Type> {
        let mut patterns: Vec<&Pattern> = Vec::new();
        for arm in arms {
            patterns.extend(matching::flatten_row(&arm.pattern));
        }
        if patterns.iter().any(|p| matches!(p, Pattern::BoolLit(_))) {
            return Some(Type::Bool);
        }
        patterns.iter().find_map(|p| match p {
            Pattern::Struct { tag: Some(name), .. } => self.enum_by_variant.get(name).cloned(),
            _ => None,
        })
    }
}

/// Collect every effect name read directly in `stmt`, recursing into nested
/// bodies — the same shape as `FunctionDef::called_names`, but gathering
/// `EffectRef`s instead of call targets.
fn collect_stmt_effect_reads(stmt: &Stmt, out: &mut HashSet<String>) {
    match stmt {
        Stmt::Let { value, .. } | Stmt::EffectDefault { value, .. } | Stmt::EffectPin { value, .. } => {
            direct_effect_reads(value, out)
        }
        Stmt::Assign { value, .. } => direct_effect_reads(value, out),
        Stmt::Expr(e, _) => direct_effect_reads(e, out),
        Stmt::Return(e, _) => {
            if let Some(e) = e {
                direct_effect_reads(e, out);
            }
        }
        Stmt::Yield(exprs, _) => {
            for e in exprs {
                direct_effect_reads(e, out);
            }
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => {
            direct_effect_reads(cond, out);
            for s in then_body.iter().chain(else_body) {
                collect_stmt_effect_reads(s, out);
            }
        }
        Stmt::While { cond, body, else_body, .. } => {
            direct_effect_reads(cond, out);
            for s in body.iter().chain(else_body) {
                collect_stmt_effect_reads(s, out);
            }
        }
        Stmt::For { iter, body, else_body, .. } => {
            direct_effect_reads(iter, out);
            for s in body.iter().chain(else_body) {
                collect_stmt_effect_reads(s, out);
            }
        }
        Stmt::Match { subject, arms, .. } => {
            direct_effect_reads(subject, out);
            for arm in arms {
                if let Some(g) = &arm.guard {
                    direct_effect_reads(g, out);
                }
                for s in &arm.body {
                    collect_stmt_effect_reads(s, out);
                }
            }
        }
        Stmt::Defer { args, .. } => {
            for a in args {
                direct_effect_reads(a, out);
            }
        }
        Stmt::Label { body, .. } => {
            for s in body {
                collect_stmt_effect_reads(s, out);
            }
        }
        Stmt::WithEffect { bindings, body, .. } => {
            for (_, v) in bindings {
                direct_effect_reads(v, out);
            }
            for s in body {
                collect_stmt_effect_reads(s, out);
            }
        }
        Stmt::Break(_) | Stmt::Continue(_) | Stmt::Goto(..) | Stmt::GotoBegin(..) | Stmt::GotoEnd(..) => {}
    }
}
