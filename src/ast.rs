use std::ops::Range;

use chrono::NaiveDate;

use crate::diagnostics::{Provenance, SourceSpan};

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Bool(bool),
    String(String),
    Date(NaiveDate),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    In,
    Keyof,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEqual => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::In => "in",
            BinaryOp::Keyof => "keyof",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "not",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub name: String,
    pub element: Option<String>,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTest {
    Is,
    Can,
}

#[derive(Debug, Clone)]
pub enum CastTarget {
    Kind(TypeExpr),
    Unit(String),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: SourceSpan,
    /// Token indices covered by this expression, end exclusive.
    pub tokens: Range<usize>,
}

impl Expr {
    pub fn provenance(&self) -> Provenance {
        Provenance::tokens(self.tokens.clone())
    }
}

/// A labelled element of a vector literal or call argument list.
#[derive(Debug, Clone)]
pub struct Item {
    pub name: Option<String>,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub enum Index {
    Slice {
        start: Option<Expr>,
        end: Option<Expr>,
        step: Option<Expr>,
    },
    Expr(Expr),
}

#[derive(Debug, Clone)]
pub enum Clause {
    Range {
        binding: String,
        start: Expr,
        end: Expr,
        inclusive: bool,
        step: Option<Expr>,
    },
    Each {
        binding: String,
        source: Expr,
    },
}

impl Clause {
    pub fn binding(&self) -> &str {
        match self {
            Clause::Range { binding, .. } | Clause::Each { binding, .. } => binding,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    Prepend,
    Append,
    Include,
    Exclude,
}

#[derive(Debug, Clone)]
pub struct Modifier {
    pub kind: ModifierKind,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct Constructor {
    pub body: Option<Expr>,
    pub clauses: Vec<Clause>,
    pub modifiers: Vec<Modifier>,
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    Literal(Literal),
    Name(String),
    Measurement {
        value: Box<Expr>,
        unit: String,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c`, read as a conjunction of adjacent comparisons.
    Comparison {
        first: Box<Expr>,
        rest: Vec<(BinaryOp, Expr)>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Fallback {
        attempt: Box<Expr>,
        fallback: Box<Expr>,
    },
    TypeTest {
        expr: Box<Expr>,
        test: TypeTest,
        ty: TypeExpr,
    },
    Cast {
        expr: Box<Expr>,
        target: CastTarget,
    },
    Call {
        callee: String,
        args: Vec<Item>,
        is_macro: bool,
    },
    Pipe {
        value: Box<Expr>,
        call: Box<Expr>,
    },
    Index {
        target: Box<Expr>,
        index: Box<Index>,
    },
    /// `target{index}`: matrix column, or an indexed decision variable.
    Column {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Vector(Vec<Item>),
    Construct(Box<Constructor>),
    Spread(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `x = e`, `a, b = e`, `a, b = e1, e2`, `x is Kind = e`.
    Declare {
        targets: Vec<Target>,
        annotation: Option<TypeExpr>,
        values: Vec<Expr>,
    },
    /// `x, y is Variable`.
    Variables(Vec<Target>),
    Function {
        target: Target,
        params: Vec<String>,
        body: Expr,
        text: String,
    },
    Append {
        target: Target,
        value: Expr,
    },
    Import {
        module: Target,
    },
    Assert(Expr),
    Macro(Expr),
    Expr(Expr),
    Empty,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: SourceSpan,
}

impl Stmt {
    /// Names this statement binds in the symbol table.
    pub fn declared_names(&self) -> Vec<&str> {
        match &self.kind {
            StmtKind::Declare { targets, .. } | StmtKind::Variables(targets) => {
                targets.iter().map(|t| t.name.as_str()).collect()
            }
            StmtKind::Function { target, .. }
            | StmtKind::Append { target, .. }
            | StmtKind::Import { module: target } => vec![target.name.as_str()],
            StmtKind::Assert(_) | StmtKind::Macro(_) | StmtKind::Expr(_) | StmtKind::Empty => {
                Vec::new()
            }
        }
    }
}

/// Names an expression reads that are not bound inside it, in first-use order.
pub fn free_names(expr: &Expr, bound: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut scope = bound.to_vec();
    collect_names(expr, &mut scope, &mut out);
    out
}

fn push_name(name: &str, scope: &[String], out: &mut Vec<String>) {
    let root = name.split('.').next().unwrap_or(name);
    if !scope.iter().any(|s| s == root) && !out.iter().any(|o| o == root) {
        out.push(root.to_string());
    }
}

fn collect_names(expr: &Expr, scope: &mut Vec<String>, out: &mut Vec<String>) {
    match &expr.kind {
        ExprKind::Literal(_) => {}
        ExprKind::Name(name) => push_name(name, scope, out),
        ExprKind::Measurement { value, .. } => collect_names(value, scope, out),
        ExprKind::Binary { left, right, .. } => {
            collect_names(left, scope, out);
            collect_names(right, scope, out);
        }
        ExprKind::Comparison { first, rest } => {
            collect_names(first, scope, out);
            for (_, operand) in rest {
                collect_names(operand, scope, out);
            }
        }
        ExprKind::Unary { expr, .. }
        | ExprKind::TypeTest { expr, .. }
        | ExprKind::Cast { expr, .. }
        | ExprKind::Spread(expr) => collect_names(expr, scope, out),
        ExprKind::Ternary {
            condition,
            then_branch,
            else_branch,
        } => {
            collect_names(condition, scope, out);
            collect_names(then_branch, scope, out);
            collect_names(else_branch, scope, out);
        }
        ExprKind::Fallback { attempt, fallback } => {
            collect_names(attempt, scope, out);
            collect_names(fallback, scope, out);
        }
        ExprKind::Call { callee, args, .. } => {
            push_name(callee, scope, out);
            for arg in args {
                collect_names(&arg.value, scope, out);
            }
        }
        ExprKind::Pipe { value, call } => {
            collect_names(value, scope, out);
            collect_names(call, scope, out);
        }
        ExprKind::Index { target, index } => {
            collect_names(target, scope, out);
            match index.as_ref() {
                Index::Slice { start, end, step } => {
                    for part in [start, end, step].into_iter().flatten() {
                        collect_names(part, scope, out);
                    }
                }
                Index::Expr(inner) => collect_names(inner, scope, out),
            }
        }
        ExprKind::Column { target, index } => {
            collect_names(target, scope, out);
            collect_names(index, scope, out);
        }
        ExprKind::Vector(items) => {
            for item in items {
                collect_names(&item.value, scope, out);
            }
        }
        ExprKind::Construct(constructor) => {
            let depth = scope.len();
            for clause in &constructor.clauses {
                match clause {
                    Clause::Range {
                        start, end, step, ..
                    } => {
                        collect_names(start, scope, out);
                        collect_names(end, scope, out);
                        if let Some(step) = step {
                            collect_names(step, scope, out);
                        }
                    }
                    Clause::Each { source, .. } => collect_names(source, scope, out),
                }
            }
            scope.extend(constructor.clauses.iter().map(|c| c.binding().to_string()));
            if let Some(body) = &constructor.body {
                collect_names(body, scope, out);
            }
            scope.truncate(depth);
            for modifier in &constructor.modifiers {
                collect_names(&modifier.value, scope, out);
            }
        }
    }
}
