//! Abstract syntax tree consumed by the core.
//!
//! The host syntax parser is an external collaborator: by the time a
//! [`Program`] reaches this crate, `with`/`match`/`for` etc. have already
//! been parsed into the shapes below. Decorators and intrinsics are
//! represented as plain enum variants rather than syntax, since the core
//! never re-parses source text.

use crate::diagnostics::SourceSpan;
use crate::types::Type;

/// A full translation unit set handed to the driver: function/class
/// declarations in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub functions: Vec<FunctionDef>,
    pub type_decls: Vec<TypeDecl>,
}

/// `class` declarations that become struct/enum/union type records.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDecl {
    Struct { name: String, fields: Vec<(String, Type)> },
    Union { name: String, fields: Vec<(String, Type)> },
    Enum {
        name: String,
        tag_type: Type,
        variants: Vec<(String, i64, Option<Type>)>,
    },
}

impl TypeDecl {
    pub fn name(&self) -> &str {
        match self {
            TypeDecl::Struct { name, .. } => name,
            TypeDecl::Union { name, .. } => name,
            TypeDecl::Enum { name, .. } => name,
        }
    }
}

/// Semantic markers recognized on a function definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decorator {
    /// Marks a function as a translation unit.
    Compile,
    /// Marks an external symbol declaration; body is expected to be empty.
    Extern { lib: String },
    /// Requests unconditional AST inlining at every call site.
    Inline,
    /// Assigns a non-propagating compile-suffix component to this unit.
    CompileSuffix(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub decorators: Vec<Decorator>,
    pub params: Vec<Param>,
    pub result: Type,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

impl FunctionDef {
    pub fn is_compile_unit(&self) -> bool {
        self.decorators.contains(&Decorator::Compile)
    }

    pub fn is_extern(&self) -> bool {
        self.decorators
            .iter()
            .any(|d| matches!(d, Decorator::Extern { .. }))
    }

    pub fn requests_inline(&self) -> bool {
        self.decorators.contains(&Decorator::Inline)
    }

    pub fn compile_suffix(&self) -> Option<&str> {
        self.decorators.iter().find_map(|d| match d {
            Decorator::CompileSuffix(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// All function names this body calls directly (not recursing into
    /// nested function literals, since the host language has none at
    /// statement level beyond inline kernels operating on whole defs).
    pub fn called_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for stmt in &self.body {
            stmt.collect_called_names(&mut out);
        }
        out
    }
}

/// One step into a field path, used both by l-values and by the linear
/// checker's per-slot tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldStep {
    Name(String),
    Index(usize),
}

/// A field path rooted at a variable, e.g. `s.0` or `point.x`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub root: String,
    pub steps: Vec<FieldStep>,
}

impl FieldPath {
    pub fn root_only(root: impl Into<String>) -> Self {
        FieldPath {
            root: root.into(),
            steps: Vec::new(),
        }
    }

    pub fn extend(&self, step: FieldStep) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        FieldPath {
            root: self.root.clone(),
            steps,
        }
    }

    /// Render as a human-readable slot name for diagnostics, e.g. `s.0`.
    pub fn display(&self) -> String {
        let mut out = self.root.clone();
        for step in &self.steps {
            match step {
                FieldStep::Name(n) => {
                    out.push('.');
                    out.push_str(n);
                }
                FieldStep::Index(i) => {
                    out.push('.');
                    out.push_str(&i.to_string());
                }
            }
        }
        out
    }

    /// Whether `self` is the same root variable as (or nested under) `other`.
    pub fn is_under(&self, other: &FieldPath) -> bool {
        self.root == other.root && self.steps.starts_with(&other.steps)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StrLit(String),
    Var(String),
    Field(Box<Expr>, FieldStep),
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    /// `array[i32, 5]()` style subscripted type construction.
    TypeCall {
        type_name: String,
        type_args: Vec<Type>,
        args: Vec<Expr>,
    },
    /// `effect.X` or `effect.X.Y`, resolved at compile time.
    EffectRef {
        name: String,
        path: Vec<String>,
    },
    /// `linear()` — allocates a fresh live linear token.
    LinearNew,
    /// `consume(v)`.
    Consume(Box<Expr>),
    /// `move(v)`.
    Move(Box<Expr>),
    /// `assume(v.., pred.., tag..)` / `RefinedTypeName(v..)`.
    Assume {
        values: Vec<Expr>,
        predicates: Vec<String>,
        tags: Vec<String>,
    },
    /// `refine(v.., pred..)`, legal only as the iterable of a `for` loop.
    Refine {
        values: Vec<Expr>,
        predicates: Vec<String>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Tuple(Vec<Expr>),
    Sizeof(Type),
    Ptr(Box<Expr>),
    Nullptr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

impl Expr {
    fn collect_called_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Call { callee, args } => {
                out.push(callee);
                for a in args {
                    a.collect_called_names(out);
                }
            }
            Expr::TypeCall { args, .. } => {
                for a in args {
                    a.collect_called_names(out);
                }
            }
            Expr::Field(base, _) | Expr::Consume(base) | Expr::Move(base) | Expr::Ptr(base) => {
                base.collect_called_names(out)
            }
            Expr::Assume { values, .. } | Expr::Refine { values, .. } | Expr::Tuple(values) => {
                for v in values {
                    v.collect_called_names(out);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_called_names(out);
                rhs.collect_called_names(out);
            }
            Expr::Unary { operand, .. } => operand.collect_called_names(out),
            Expr::IntLit(_)
            | Expr::FloatLit(_)
            | Expr::BoolLit(_)
            | Expr::StrLit(_)
            | Expr::Var(_)
            | Expr::EffectRef { .. }
            | Expr::LinearNew
            | Expr::Sizeof(_)
            | Expr::Nullptr => {}
        }
    }

    /// Every free variable name this expression reads, used by scope
    /// analysis to classify an identifier as param/local/capture.
    pub fn free_vars(&self, out: &mut Vec<String>) {
        match self {
            Expr::Var(name) => out.push(name.clone()),
            Expr::Field(base, _) | Expr::Consume(base) | Expr::Move(base) | Expr::Ptr(base) => {
                base.free_vars(out)
            }
            Expr::Call { args, .. } => {
                for a in args {
                    a.free_vars(out);
                }
            }
            Expr::TypeCall { args, .. } => {
                for a in args {
                    a.free_vars(out);
                }
            }
            Expr::Assume { values, .. } | Expr::Refine { values, .. } | Expr::Tuple(values) => {
                for v in values {
                    v.free_vars(out);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.free_vars(out);
                rhs.free_vars(out);
            }
            Expr::Unary { operand, .. } => operand.free_vars(out),
            Expr::IntLit(_)
            | Expr::FloatLit(_)
            | Expr::BoolLit(_)
            | Expr::StrLit(_)
            | Expr::EffectRef { .. }
            | Expr::LinearNew
            | Expr::Sizeof(_)
            | Expr::Nullptr => {}
        }
    }
}

/// The left-hand side of an assignment; may name a nested field path.
#[derive(Debug, Clone, PartialEq)]
pub enum LValue {
    Var(String),
    Field(Box<LValue>, FieldStep),
}

impl LValue {
    pub fn root(&self) -> &str {
        match self {
            LValue::Var(name) => name,
            LValue::Field(base, _) => base.root(),
        }
    }

    pub fn to_field_path(&self) -> FieldPath {
        fn steps(lv: &LValue, out: &mut Vec<FieldStep>) {
            if let LValue::Field(base, step) = lv {
                steps(base, out);
                out.push(step.clone());
            }
        }
        let mut out = Vec::new();
        steps(self, &mut out);
        FieldPath {
            root: self.root().to_string(),
            steps: out,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Wildcard,
    Binding(String),
    IntLit(i64),
    BoolLit(bool),
    Or(Vec<Pattern>),
    /// `Variant { field: pat, .. }` or `Variant(pat, ..)` — `tag` identifies
    /// the enum variant (or struct) being destructured, `fields` pairs an
    /// optional field name with its sub-pattern.
    Struct {
        tag: Option<String>,
        fields: Vec<(Option<String>, Pattern)>,
    },
    Sequence(Vec<Pattern>),
}

impl Pattern {
    /// Whether this pattern, taken alone and unguarded, covers every value
    /// of its subject type (a bare wildcard or binding).
    pub fn is_catch_all(&self) -> bool {
        matches!(self, Pattern::Wildcard | Pattern::Binding(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        ty: Option<Type>,
        value: Expr,
        span: SourceSpan,
    },
    Assign {
        target: LValue,
        value: Expr,
        span: SourceSpan,
    },
    Expr(Expr, SourceSpan),
    Return(Option<Expr>, SourceSpan),
    /// `yield e1, e2, ...` — tuple yield lowers to a multi-assignment by the
    /// Yield exit rule.
    Yield(Vec<Expr>, SourceSpan),
    Break(SourceSpan),
    Continue(SourceSpan),
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        span: SourceSpan,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        span: SourceSpan,
    },
    /// `for var in iter: body else: else_body` — `iter` may be a plain call
    /// (generator inlining target), a `refine(...)` call, or a
    /// constant-iterable loop.
    For {
        var: String,
        iter: Expr,
        body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        span: SourceSpan,
    },
    Match {
        subject: Expr,
        arms: Vec<MatchArm>,
        span: SourceSpan,
    },
    /// `defer(callee, args...)`.
    Defer {
        callee: String,
        args: Vec<Expr>,
        span: SourceSpan,
    },
    /// `with label("X"): body`.
    Label {
        name: String,
        body: Vec<Stmt>,
        span: SourceSpan,
    },
    Goto(String, SourceSpan),
    GotoBegin(String, SourceSpan),
    GotoEnd(String, SourceSpan),
    /// `with effect(name=impl, ...; suffix=S): body`.
    WithEffect {
        bindings: Vec<(String, Expr)>,
        suffix: Option<String>,
        body: Vec<Stmt>,
        span: SourceSpan,
    },
    /// `effect.default(name=impl)`.
    EffectDefault {
        name: String,
        value: Expr,
        span: SourceSpan,
    },
    /// `effect.name = impl` (a pin, distinct from a plain variable store).
    EffectPin {
        name: String,
        value: Expr,
        span: SourceSpan,
    },
}

impl Stmt {
    pub fn span(&self) -> &SourceSpan {
        match self {
            Stmt::Let { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::Expr(_, span)
            | Stmt::Return(_, span)
            | Stmt::Yield(_, span)
            | Stmt::Break(span)
            | Stmt::Continue(span)
            | Stmt::If { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Match { span, .. }
            | Stmt::Defer { span, .. }
            | Stmt::Label { span, .. }
            | Stmt::Goto(_, span)
            | Stmt::GotoBegin(_, span)
            | Stmt::GotoEnd(_, span)
            | Stmt::WithEffect { span, .. }
            | Stmt::EffectDefault { span, .. }
            | Stmt::EffectPin { span, .. } => span,
        }
    }

    fn collect_called_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Stmt::Let { value, .. } | Stmt::EffectDefault { value, .. } | Stmt::EffectPin { value, .. } => {
                value.collect_called_names(out)
            }
            Stmt::Assign { value, .. } => value.collect_called_names(out),
            Stmt::Expr(e, _) => e.collect_called_names(out),
            Stmt::Return(e, _) => {
                if let Some(e) = e {
                    e.collect_called_names(out);
                }
            }
            Stmt::Yield(exprs, _) => {
                for e in exprs {
                    e.collect_called_names(out);
                }
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                cond.collect_called_names(out);
                for s in then_body.iter().chain(else_body) {
                    s.collect_called_names(out);
                }
            }
            Stmt::While {
                cond,
                body,
                else_body,
                ..
            } => {
                cond.collect_called_names(out);
                for s in body.iter().chain(else_body) {
                    s.collect_called_names(out);
                }
            }
            Stmt::For {
                iter,
                body,
                else_body,
                ..
            } => {
                iter.collect_called_names(out);
                for s in body.iter().chain(else_body) {
                    s.collect_called_names(out);
                }
            }
            Stmt::Match { subject, arms, .. } => {
                subject.collect_called_names(out);
                for arm in arms {
                    if let Some(g) = &arm.guard {
                        g.collect_called_names(out);
                    }
                    for s in &arm.body {
                        s.collect_called_names(out);
                    }
                }
            }
            Stmt::Defer { callee, args, .. } => {
                out.push(callee);
                for a in args {
                    a.collect_called_names(out);
                }
            }
            Stmt::Label { body, .. } => {
                for s in body {
                    s.collect_called_names(out);
                }
            }
            Stmt::WithEffect { bindings, body, .. } => {
                for (_, v) in bindings {
                    v.collect_called_names(out);
                }
                for s in body {
                    s.collect_called_names(out);
                }
            }
            Stmt::Break(_) | Stmt::Continue(_) | Stmt::Goto(..) | Stmt::GotoBegin(..) | Stmt::GotoEnd(..) => {}
        }
    }
}
