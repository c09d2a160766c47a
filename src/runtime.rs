//! Expression Resolution Engine.
//!
//! A [`Resolver`] evaluates one parsed statement against a read-only view of
//! the document's symbol table and the function catalog. It never mutates
//! the environment: bindings the statement wants to create are returned as
//! [`Declaration`]s and committed by the document once the dependency graph
//! has accepted them.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use log::{debug, trace};

use crate::{
    ast::{
        free_names, BinaryOp, CastTarget, Clause, Constructor, Expr, ExprKind, Index, Item,
        Literal, ModifierKind, Stmt, StmtKind, Target, TypeExpr, TypeTest,
    },
    diagnostics::{
        Diagnostic, ErrorCode, Provenance, RecommendationCode, Severity, SourceSpan, TokenMarks,
        WarningCode,
    },
    environment::{append_all, Environment, LineId, SiteKind},
    lexer::Token,
    ops,
    stdlib::{self, Argument, Catalog, Entry, MacroContext},
    value::{
        approx_eq, format_number, is_integral, Array, Kind, UserFunction, Value, ValueKind,
        EPSILON,
    },
};

/// Names a statement may not bind.
const RESERVED: [&str; 2] = ["result", "val"];

/// Per-document evaluation settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub suppress_warnings: bool,
    pub suppress_recommendations: bool,
    /// Line resolutions allowed in one propagation pass.
    pub propagation_cap: usize,
    pub spread_cap: usize,
    pub range_cap: usize,
    pub recursion_limit: usize,
    /// Asks the caller to run macro lines once the document has loaded.
    /// Resolution never runs macros itself; the CLI calls
    /// `Document::execute` after loading when this is set.
    pub execute: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            suppress_warnings: false,
            suppress_recommendations: false,
            propagation_cap: 10_000,
            spread_cap: 1_000,
            range_cap: 100_000,
            recursion_limit: 256,
            execute: false,
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_suppressed_warnings(mut self, suppress: bool) -> Self {
        self.suppress_warnings = suppress;
        self
    }

    pub fn with_suppressed_recommendations(mut self, suppress: bool) -> Self {
        self.suppress_recommendations = suppress;
        self
    }

    pub fn with_propagation_cap(mut self, cap: usize) -> Self {
        self.propagation_cap = cap;
        self
    }

    pub fn with_spread_cap(mut self, cap: usize) -> Self {
        self.spread_cap = cap;
        self
    }

    pub fn with_range_cap(mut self, cap: usize) -> Self {
        self.range_cap = cap;
        self
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_execute(mut self, execute: bool) -> Self {
        self.execute = execute;
        self
    }
}

/// A binding a statement asks the document to commit.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub name: String,
    pub kind: SiteKind,
    pub value: Value,
    pub span: SourceSpan,
}

/// Everything one statement produced.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub declarations: Vec<Declaration>,
    pub imports: Vec<String>,
    pub value: Option<Value>,
    pub error: Option<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub recommendations: Vec<Diagnostic>,
    pub marks: TokenMarks,
    /// Every non-local name the statement looked up, including failed lookups.
    pub references: Vec<String>,
}

impl Resolution {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub struct Resolver<'a> {
    env: &'a Environment,
    catalog: &'a Catalog,
    settings: &'a Settings,
    source: &'a str,
    tokens: &'a [Token],
    line: LineId,
    scopes: Vec<IndexMap<String, Value>>,
    piped: Vec<Value>,
    /// Site that values computed inside a user function body are attributed to.
    call_site: Option<(SourceSpan, Provenance)>,
    depth: usize,
    references: IndexSet<String>,
    materialized: Vec<Declaration>,
    warnings: Vec<Diagnostic>,
    recommendations: Vec<Diagnostic>,
    marks: TokenMarks,
}

impl<'a> Resolver<'a> {
    pub fn new(
        env: &'a Environment,
        catalog: &'a Catalog,
        settings: &'a Settings,
        line: LineId,
        source: &'a str,
        tokens: &'a [Token],
    ) -> Self {
        Self {
            env,
            catalog,
            settings,
            source,
            tokens,
            line,
            scopes: Vec::new(),
            piped: Vec::new(),
            call_site: None,
            depth: 0,
            references: IndexSet::new(),
            materialized: Vec::new(),
            warnings: Vec::new(),
            recommendations: Vec::new(),
            marks: TokenMarks::new(tokens.len()),
        }
    }

    /// Resolves one statement. Macros run only when a context is supplied.
    pub fn resolve(mut self, stmt: &Stmt, macros: Option<&mut MacroContext<'_>>) -> Resolution {
        let mut declarations = Vec::new();
        let mut imports = Vec::new();
        let outcome = match self.statement(stmt, macros, &mut declarations, &mut imports) {
            Ok(value) => {
                declarations.append(&mut self.materialized);
                self.check_declarations(&declarations).map(|()| value)
            }
            Err(error) => Err(error),
        };
        let whole = Provenance::tokens(0..self.tokens.len());
        let (value, error) = match outcome {
            Ok(value) => (value, None),
            Err(error) => {
                declarations.clear();
                imports.clear();
                (None, Some(error.or_at(stmt.span, &whole)))
            }
        };

        let mut marks = std::mem::take(&mut self.marks);
        if let Some(error) = &error {
            marks.mark(&error.marked, Severity::Error);
        }
        if !self.settings.suppress_warnings {
            for warning in &self.warnings {
                marks.mark(&warning.marked, Severity::Warning);
            }
        }
        if !self.settings.suppress_recommendations {
            for recommendation in &self.recommendations {
                marks.mark(&recommendation.marked, Severity::Recommendation);
            }
        }
        Resolution {
            declarations,
            imports,
            value: value.map(|value| value.on_line(self.line)),
            error,
            warnings: self.warnings,
            recommendations: self.recommendations,
            marks,
            references: self.references.into_iter().collect(),
        }
    }

    /// A name taken by another line is recorded as read, so this line is
    /// retried once the other declaration goes away.
    fn check_declarations(&mut self, declarations: &[Declaration]) -> Result<(), Diagnostic> {
        for declaration in declarations {
            let checked = self
                .env
                .check(self.line, &declaration.name, declaration.kind, declaration.span);
            if let Err(error) = checked {
                self.references.insert(declaration.name.clone());
                return Err(error.with_provenance(&self.span_tokens(declaration.span)));
            }
        }
        Ok(())
    }

    fn statement(
        &mut self,
        stmt: &Stmt,
        macros: Option<&mut MacroContext<'_>>,
        out: &mut Vec<Declaration>,
        imports: &mut Vec<String>,
    ) -> Result<Option<Value>, Diagnostic> {
        match &stmt.kind {
            StmtKind::Empty => Ok(None),
            StmtKind::Expr(expr) => self.eval(expr).map(Some),
            StmtKind::Assert(expr) => self.assert(expr).map(Some),
            StmtKind::Macro(expr) => self.run_macro(expr, macros),
            StmtKind::Import { module } => {
                self.import(module)?;
                imports.push(module.name.clone());
                Ok(None)
            }
            StmtKind::Declare {
                targets,
                annotation,
                values,
            } => self.declare(targets, annotation.as_ref(), values, out),
            StmtKind::Variables(targets) => {
                let mut declared = Vec::with_capacity(targets.len());
                for target in targets {
                    self.check_target(target)?;
                    let value = Value::variable(target.name.clone());
                    declared.push(value.clone());
                    out.push(Declaration {
                        name: target.name.clone(),
                        kind: SiteKind::Variable,
                        value,
                        span: target.span,
                    });
                }
                Ok(Some(single_or_vector(declared)))
            }
            StmtKind::Function {
                target,
                params,
                body,
                text,
            } => {
                self.check_target(target)?;
                let mut seen: Vec<&String> = Vec::new();
                for param in params {
                    if seen.contains(&param) {
                        self.note(
                            Diagnostic::warning(WarningCode::DuplicateParameter)
                                .with_str(param.clone())
                                .with_span(target.span)
                                .with_provenance(&self.span_tokens(target.span)),
                        );
                    }
                    seen.push(param);
                }
                let free = free_names(body, params);
                for name in &free {
                    if *name != target.name && (self.env.contains(name) || !self.catalog.is_builtin(name)) {
                        self.references.insert(name.clone());
                    }
                }
                let function = UserFunction {
                    name: target.name.clone(),
                    params: params.clone(),
                    body: Rc::new(body.clone()),
                    free_names: free,
                    text: text.clone(),
                };
                let value = Value::new(ValueKind::Function(function));
                out.push(Declaration {
                    name: target.name.clone(),
                    kind: SiteKind::Function,
                    value: value.clone(),
                    span: target.span,
                });
                Ok(Some(value))
            }
            StmtKind::Append { target, value } => self.append(target, value, out).map(Some),
        }
    }

    fn check_target(&mut self, target: &Target) -> Result<(), Diagnostic> {
        let provenance = self.span_tokens(target.span);
        if RESERVED.contains(&target.name.as_str()) {
            return Err(Diagnostic::error(ErrorCode::ReservedName)
                .with_str(target.name.clone())
                .with_span(target.span)
                .with_provenance(&provenance));
        }
        if self.catalog.is_builtin(&target.name) {
            self.note(
                Diagnostic::warning(WarningCode::ShadowsBuiltin)
                    .with_str(target.name.clone())
                    .with_span(target.span)
                    .with_provenance(&provenance),
            );
        }
        Ok(())
    }

    fn declare(
        &mut self,
        targets: &[Target],
        annotation: Option<&TypeExpr>,
        values: &[Expr],
        out: &mut Vec<Declaration>,
    ) -> Result<Option<Value>, Diagnostic> {
        for target in targets {
            self.check_target(target)?;
        }
        let declared_kind = annotation.map(|ty| self.type_kind(ty)).transpose()?;
        let mut evaluated = Vec::with_capacity(values.len());
        for expr in values {
            evaluated.push(self.eval(expr)?);
        }
        let assigned = if evaluated.len() == targets.len() {
            evaluated
        } else if let [single] = evaluated.as_slice() {
            match single.as_vector() {
                Some(array) if array.len() == targets.len() => array.items.clone(),
                _ => {
                    return Err(Diagnostic::error(ErrorCode::DimensionMismatch)
                        .with_str(format!(
                            "{} names cannot take their values from {}",
                            targets.len(),
                            single.label()
                        ))
                        .marking(single))
                }
            }
        } else {
            return Err(Diagnostic::error(ErrorCode::DimensionMismatch).with_str(format!(
                "{} names but {} values",
                targets.len(),
                evaluated.len()
            )));
        };

        let mut committed = Vec::with_capacity(targets.len());
        for (target, value) in targets.iter().zip(assigned) {
            let value = match declared_kind {
                Some(kind) => value.cast_to(kind).map_err(|_| {
                    Diagnostic::error(ErrorCode::TypeDeclaration)
                        .with_value(&value)
                        .with_kind(kind)
                })?,
                None => value,
            };
            committed.push(value.clone());
            out.push(Declaration {
                name: target.name.clone(),
                kind: SiteKind::Declare,
                value,
                span: target.span,
            });
        }
        Ok(Some(single_or_vector(committed)))
    }

    fn append(
        &mut self,
        target: &Target,
        expr: &Expr,
        out: &mut Vec<Declaration>,
    ) -> Result<Value, Diagnostic> {
        self.references.insert(target.name.clone());
        let provenance = self.span_tokens(target.span);
        let base = self.env.get(&target.name).ok_or_else(|| {
            Diagnostic::error(ErrorCode::UnknownName)
                .with_name(target.name.clone())
                .with_span(target.span)
                .with_provenance(&provenance)
        })?;
        let base = base.at(target.span, provenance);
        if base.as_array().is_none() {
            return Err(Diagnostic::error(ErrorCode::AppendTarget)
                .with_value(&base)
                .with_kind(base.kind()));
        }
        let value = self.eval(expr)?;
        let composed = append_all(&base, &[&value]).ok_or_else(|| {
            Diagnostic::error(ErrorCode::AppendTarget)
                .with_value(&base)
                .with_kind(base.kind())
                .marking(&value)
        })?;
        out.push(Declaration {
            name: target.name.clone(),
            kind: SiteKind::Append,
            value: value.unnamed(),
            span: target.span,
        });
        Ok(composed.named(target.name.clone()))
    }

    fn import(&mut self, module: &Target) -> Result<(), Diagnostic> {
        let provenance = self.span_tokens(module.span);
        if !self.catalog.has_module(&module.name) {
            return Err(Diagnostic::error(ErrorCode::UnknownModule)
                .with_str(module.name.clone())
                .with_span(module.span)
                .with_provenance(&provenance));
        }
        if self.env.is_imported(&module.name) {
            self.note(
                Diagnostic::recommendation(RecommendationCode::AlreadyImported)
                    .with_str(module.name.clone())
                    .with_span(module.span)
                    .with_provenance(&provenance),
            );
        }
        Ok(())
    }

    fn assert(&mut self, expr: &Expr) -> Result<Value, Diagnostic> {
        let value = self.eval(expr)?;
        match value.as_bool() {
            Some(true) => Ok(value),
            Some(false) => {
                let text = self
                    .source
                    .get(expr.span.start..expr.span.end)
                    .unwrap_or("assertion");
                Err(Diagnostic::error(ErrorCode::AssertionFailed)
                    .with_name(text)
                    .marking(&value))
            }
            None => Err(Diagnostic::error(ErrorCode::AssertionNotBoolean)
                .with_kind(value.kind())
                .marking(&value)),
        }
    }

    fn run_macro(
        &mut self,
        expr: &Expr,
        macros: Option<&mut MacroContext<'_>>,
    ) -> Result<Option<Value>, Diagnostic> {
        let ExprKind::Call { callee, args, .. } = &expr.kind else {
            return self.eval(expr).map(Some);
        };
        let Some(context) = macros else {
            debug!("line {}: {callee}! skipped outside execute mode", self.line);
            return Ok(None);
        };
        let (catalog, env) = (self.catalog, self.env);
        let found = catalog.lookup(callee, env.imports()).ok_or_else(|| {
            Diagnostic::error(ErrorCode::UnknownFunction).with_str(format!("{callee}!"))
        })?;
        let entry = *found.entry;
        self.recommendations.extend(found.recommendations);
        let Entry::Macro(native) = entry else {
            return Err(Diagnostic::error(ErrorCode::UnknownFunction).with_str(format!("{callee}!")));
        };
        let arguments = self.arguments(args)?;
        let (bound, notes) = stdlib::bind(
            native.name,
            native.params,
            arguments,
            self.span(expr),
            &self.prov(expr),
        )?;
        for note in notes {
            self.note(note);
        }
        debug!("line {}: executing {}!", self.line, native.name);
        let produced = (native.execute)(&bound, context)?;
        for warning in produced.warnings {
            self.note_at(warning, expr);
        }
        Ok(Some(self.located(produced.value, expr)))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, Diagnostic> {
        match self.eval_kind(expr) {
            Ok(value) => Ok(self.located(value, expr)),
            Err(error) => Err(error.or_at(self.span(expr), &self.prov(expr))),
        }
    }

    fn eval_kind(&mut self, expr: &Expr) -> Result<Value, Diagnostic> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::number(*n),
                Literal::Bool(b) => Value::boolean(*b),
                Literal::String(s) => Value::string(s.clone()),
                Literal::Date(date) => Value::date(*date),
                Literal::None => Value::none(),
            }),
            ExprKind::Name(name) => self.name(name),
            ExprKind::Measurement { value, unit } => {
                let value = self.eval(value)?;
                ops::convert_units(&value, unit)
            }
            ExprKind::Binary { op, left, right } => self.binary(*op, left, right),
            ExprKind::Comparison { first, rest } => self.comparison(first, rest),
            ExprKind::Unary { op, expr: operand } => {
                let value = self.eval(operand)?;
                ops::unary(*op, &value)
            }
            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                let test = self.eval(condition)?;
                match test.as_bool() {
                    Some(true) => self.eval(then_branch),
                    Some(false) => self.eval(else_branch),
                    None => Err(Diagnostic::error(ErrorCode::ConditionNotBoolean)
                        .with_value(&test)
                        .with_kind(test.kind())),
                }
            }
            ExprKind::Fallback { attempt, fallback } => self.fallback(attempt, fallback),
            ExprKind::TypeTest {
                expr: operand,
                test,
                ty,
            } => {
                let kind = self.type_kind(ty)?;
                let value = self.eval(operand)?;
                let outcome = match test {
                    TypeTest::Is => {
                        value.kind() == kind || (kind == Kind::LIST && value.as_vector().is_some())
                    }
                    TypeTest::Can => value.castable_to(kind),
                };
                Ok(Value::boolean(outcome))
            }
            ExprKind::Cast {
                expr: operand,
                target,
            } => {
                let value = self.eval(operand)?;
                match target {
                    CastTarget::Kind(ty) => {
                        let kind = self.type_kind(ty)?;
                        if value.kind() == kind {
                            self.note(
                                Diagnostic::recommendation(RecommendationCode::RedundantCast)
                                    .with_value(&value)
                                    .with_kind(kind),
                            );
                        }
                        value.cast_to(kind).map(Value::unnamed)
                    }
                    CastTarget::Unit(unit) => ops::convert_units(&value, unit),
                }
            }
            ExprKind::Call {
                callee,
                args,
                is_macro,
            } => {
                if *is_macro {
                    return Err(Diagnostic::error(ErrorCode::MacroPlacement)
                        .with_str(format!("{callee}!")));
                }
                self.call(callee, args, expr, None)
            }
            ExprKind::Pipe { value, call } => {
                let piped = self.eval(value)?;
                match &call.kind {
                    ExprKind::Call {
                        callee,
                        args,
                        is_macro: false,
                    } => self.call(callee, args, call, Some(piped)),
                    _ => Err(Diagnostic::error(ErrorCode::PipeTarget)
                        .with_span(self.span(call))
                        .with_provenance(&self.prov(call))),
                }
            }
            ExprKind::Index { target, index } => self.index(target, index),
            ExprKind::Column { target, index } => self.column(target, index),
            ExprKind::Vector(items) => self.vector(items, expr),
            ExprKind::Construct(constructor) => self.construct(constructor, expr),
            ExprKind::Spread(inner) => {
                let items = self.spread(inner)?;
                Ok(Value::vector(items))
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, Diagnostic> {
        let lhs = self.eval(left)?;
        if let (BinaryOp::And | BinaryOp::Or, Some(b)) = (op, lhs.as_bool()) {
            if (op == BinaryOp::And) != b {
                return Ok(Value::boolean(b));
            }
        }
        let rhs = self.eval(right)?;
        if op == BinaryOp::Keyof && ops::key_names(&rhs).is_none() {
            self.note(Diagnostic::warning(WarningCode::NoNamedIndices).with_value(&rhs));
        }
        ops::binary(op, &lhs, &rhs)
    }

    /// `a < b <= c` is `a < b and b <= c`, each operand evaluated once.
    fn comparison(&mut self, first: &Expr, rest: &[(BinaryOp, Expr)]) -> Result<Value, Diagnostic> {
        let mut previous = self.eval(first)?;
        let mut combined: Option<Value> = None;
        for (op, operand) in rest {
            let next = self.eval(operand)?;
            let link = ops::binary(*op, &previous, &next)?;
            combined = Some(match combined {
                Some(acc) => ops::binary(BinaryOp::And, &acc, &link)?,
                None => link,
            });
            previous = next;
        }
        combined.ok_or_else(|| {
            Diagnostic::error(ErrorCode::UnresolvedExpression).with_str("empty comparison")
        })
    }

    fn fallback(&mut self, attempt: &Expr, fallback: &Expr) -> Result<Value, Diagnostic> {
        let saved = (
            self.warnings.len(),
            self.recommendations.len(),
            self.materialized.len(),
        );
        match self.eval(attempt) {
            Ok(value) => {
                if self.call_site.is_none() {
                    self.marks.suppress(&fallback.provenance());
                }
                Ok(value)
            }
            Err(error) => {
                self.warnings.truncate(saved.0);
                self.recommendations.truncate(saved.1);
                self.materialized.truncate(saved.2);
                if self.call_site.is_none() {
                    self.marks.suppress(&attempt.provenance());
                }
                trace!("line {}: fallback taken after {error}", self.line);
                self.note(
                    Diagnostic::warning(WarningCode::FallbackTaken)
                        .with_str(error.message())
                        .with_span(self.span(attempt)),
                );
                self.eval(fallback)
            }
        }
    }

    fn type_kind(&self, ty: &TypeExpr) -> Result<Kind, Diagnostic> {
        Kind::parse(&ty.name, ty.element.as_deref()).ok_or_else(|| {
            let name = match &ty.element {
                Some(element) => format!("{}<{element}>", ty.name),
                None => ty.name.clone(),
            };
            Diagnostic::error(ErrorCode::UnknownType)
                .with_str(name)
                .with_span(ty.span)
                .with_provenance(&self.span_tokens(ty.span))
        })
    }

    fn local(&self, name: &str) -> Option<&Value> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn name(&mut self, name: &str) -> Result<Value, Diagnostic> {
        if let Some(value) = self.local(name) {
            return Ok(value.clone());
        }
        if name == "result" {
            return self
                .piped
                .last()
                .cloned()
                .ok_or_else(|| Diagnostic::error(ErrorCode::MissingPipeValue));
        }
        if let Some((root, path)) = name.split_once('.') {
            if self.local(root).is_some() || self.env.contains(root) {
                let local = self.local(root).cloned();
                let mut value = match local {
                    Some(value) => value,
                    None => self.global(root)?,
                };
                for key in path.split('.') {
                    value = field(&value, key)?;
                }
                return Ok(value);
            }
        }
        self.global(name)
    }

    fn global(&mut self, name: &str) -> Result<Value, Diagnostic> {
        self.references.insert(name.to_string());
        if let Some(value) = self.env.get(name) {
            return Ok(value);
        }
        let (catalog, env) = (self.catalog, self.env);
        let Some(found) = catalog.lookup(name, env.imports()) else {
            return Err(Diagnostic::error(ErrorCode::UnknownName).with_name(name));
        };
        let entry = *found.entry;
        self.recommendations.extend(found.recommendations);
        match entry {
            Entry::Constant(constant) => Ok(Value::number(constant)),
            Entry::Function(_) | Entry::Macro(_) => Err(Diagnostic::error(
                ErrorCode::UnresolvedExpression,
            )
            .with_str(format!("{name} is a function; call it as {name}(...)"))),
        }
    }

    fn call(
        &mut self,
        callee: &str,
        args: &[Item],
        expr: &Expr,
        piped: Option<Value>,
    ) -> Result<Value, Diagnostic> {
        let user = match self.local(callee).cloned() {
            Some(value) => Some(value),
            None if self.env.contains(callee) => {
                self.references.insert(callee.to_string());
                self.env.get(callee)
            }
            None => None,
        };
        if let Some(value) = user {
            let ValueKind::Function(function) = &*value.kind else {
                return Err(Diagnostic::error(ErrorCode::NotCallable).with_name(callee));
            };
            let arguments = self.call_arguments(args, piped)?;
            return self.call_user(function, arguments, expr);
        }

        self.references.insert(callee.to_string());
        let (catalog, env) = (self.catalog, self.env);
        let Some(found) = catalog.lookup(callee, env.imports()) else {
            return Err(self.unknown_function(callee));
        };
        let entry = *found.entry;
        self.recommendations.extend(found.recommendations);
        match entry {
            Entry::Function(native) => {
                let arguments = self.call_arguments(args, piped)?;
                let (bound, notes) = stdlib::bind(
                    native.name,
                    native.params,
                    arguments,
                    self.span(expr),
                    &self.prov(expr),
                )?;
                for note in notes {
                    self.note(note);
                }
                let produced = (native.operate)(&bound)?;
                for warning in produced.warnings {
                    self.note_at(warning, expr);
                }
                Ok(produced.value)
            }
            Entry::Macro(native) => {
                Err(Diagnostic::error(ErrorCode::MacroPlacement).with_str(format!("{}!", native.name)))
            }
            Entry::Constant(_) => Err(Diagnostic::error(ErrorCode::NotCallable).with_name(callee)),
        }
    }

    fn unknown_function(&self, callee: &str) -> Diagnostic {
        match callee.split_once('.') {
            Some((module, _)) if !self.catalog.has_module(module) => {
                Diagnostic::error(ErrorCode::UnknownModule).with_str(module)
            }
            _ => Diagnostic::error(ErrorCode::UnknownFunction).with_str(callee),
        }
    }

    /// Evaluates call arguments. A piped value fills every `result` in the
    /// arguments, or becomes the first positional argument when none is used.
    fn call_arguments(&mut self, args: &[Item], piped: Option<Value>) -> Result<Vec<Argument>, Diagnostic> {
        let Some(piped) = piped else {
            return self.arguments(args);
        };
        let uses_result = args
            .iter()
            .any(|arg| free_names(&arg.value, &[]).iter().any(|name| name == "result"));
        self.piped.push(piped.clone());
        let arguments = self.arguments(args);
        self.piped.pop();
        let mut arguments = arguments?;
        if !uses_result {
            arguments.insert(0, Argument::positional(piped));
        }
        Ok(arguments)
    }

    fn arguments(&mut self, args: &[Item]) -> Result<Vec<Argument>, Diagnostic> {
        let mut out = Vec::with_capacity(args.len());
        for item in args {
            if let ExprKind::Spread(inner) = &item.value.kind {
                out.extend(self.spread(inner)?.into_iter().map(Argument::positional));
                continue;
            }
            let value = self.eval(&item.value)?;
            out.push(match &item.name {
                Some(name) => Argument::named(name.clone(), value),
                None => Argument::positional(value),
            });
        }
        Ok(out)
    }

    fn call_user(
        &mut self,
        function: &UserFunction,
        arguments: Vec<Argument>,
        expr: &Expr,
    ) -> Result<Value, Diagnostic> {
        if self.depth >= self.settings.recursion_limit {
            return Err(Diagnostic::error(ErrorCode::RecursionLimit)
                .with_str(self.settings.recursion_limit.to_string())
                .with_str(function.name.clone()));
        }
        let mut frame: IndexMap<String, Value> = IndexMap::new();
        let mut positional = Vec::new();
        for argument in arguments {
            match argument.name {
                Some(name) if function.params.contains(&name) => {
                    if frame.contains_key(&name) {
                        self.note(
                            Diagnostic::warning(WarningCode::DuplicateParameter)
                                .with_str(name)
                                .marking(&argument.value),
                        );
                    } else {
                        frame.insert(name, argument.value);
                    }
                }
                Some(name) => {
                    debug!("{}: ignoring unknown parameter `{name}`", function.name);
                    self.note(
                        Diagnostic::recommendation(RecommendationCode::UnusedParameter)
                            .with_str(function.name.clone())
                            .with_str(name)
                            .marking(&argument.value),
                    );
                }
                None => positional.push(argument.value),
            }
        }
        let mut positional = positional.into_iter();
        for param in &function.params {
            if frame.contains_key(param) {
                continue;
            }
            let value = positional.next().ok_or_else(|| {
                Diagnostic::error(ErrorCode::MissingArgument)
                    .with_str(function.name.clone())
                    .with_str(param.clone())
            })?;
            frame.insert(param.clone(), value.unnamed());
        }
        if let Some(extra) = positional.next() {
            return Err(Diagnostic::error(ErrorCode::TooManyArguments)
                .with_str(function.name.clone())
                .with_str(function.params.len().to_string())
                .marking(&extra));
        }

        let site = (self.span(expr), self.prov(expr));
        let scopes = std::mem::replace(&mut self.scopes, vec![frame]);
        let piped = std::mem::take(&mut self.piped);
        let outer = self.call_site.replace(site);
        self.depth += 1;
        let result = self.eval(&function.body);
        self.depth -= 1;
        self.call_site = outer;
        self.piped = piped;
        self.scopes = scopes;
        result.map(Value::unnamed)
    }

    fn spread(&mut self, inner: &Expr) -> Result<Vec<Value>, Diagnostic> {
        let value = self.eval(inner)?;
        let Some(array) = value.as_array() else {
            return Err(Diagnostic::error(ErrorCode::SpreadNotList)
                .with_kind(value.kind())
                .marking(&value));
        };
        if array.len() > self.settings.spread_cap {
            return Err(Diagnostic::error(ErrorCode::SpreadTooLarge)
                .with_value(&value)
                .with_str(array.len().to_string())
                .with_str(self.settings.spread_cap.to_string()));
        }
        Ok(array
            .items
            .iter()
            .map(|item| {
                item.clone()
                    .unnamed()
                    .at(value.meta.span, value.meta.provenance.clone())
            })
            .collect())
    }

    fn index(&mut self, target: &Expr, index: &Index) -> Result<Value, Diagnostic> {
        let base = self.eval(target)?;
        match index {
            Index::Slice { start, end, step } => {
                self.slice(&base, start.as_ref(), end.as_ref(), step.as_ref())
            }
            Index::Expr(inner) => {
                if is_filter(&base, inner) {
                    return self.filter(&base, inner);
                }
                let key = self.eval(inner)?;
                select(&base, &key)
            }
        }
    }

    fn slice(
        &mut self,
        base: &Value,
        start: Option<&Expr>,
        end: Option<&Expr>,
        step: Option<&Expr>,
    ) -> Result<Value, Diagnostic> {
        let len = match &*base.kind {
            ValueKind::Array(array) => array.len(),
            ValueKind::String(text) => text.chars().count(),
            ValueKind::DataFrame(frame) => frame.height(),
            _ => {
                return Err(Diagnostic::error(ErrorCode::NotIndexable)
                    .with_value(base)
                    .with_kind(base.kind()))
            }
        };
        let start = match start {
            Some(expr) => self.eval(expr)?,
            None => Value::number(1.0),
        };
        let end = match end {
            Some(expr) => self.eval(expr)?,
            None => Value::number(len as f64),
        };
        let step_value = match step {
            Some(expr) => self.eval(expr)?,
            None => Value::number(1.0),
        };
        let step = match step_value.as_number() {
            Some(n) if is_integral(n) && n >= 1.0 => n.round() as usize,
            _ => return Err(Diagnostic::error(ErrorCode::SliceStep).with_value(&step_value)),
        };
        if len == 0 {
            return Ok(base.clone().unnamed());
        }
        let from = position(&start, len)?;
        let to = position(&end, len)?;
        if from > to {
            return Err(Diagnostic::error(ErrorCode::SliceOrder)
                .with_value(&start)
                .with_value(&end));
        }
        let picks: Vec<usize> = (from..=to).step_by(step).collect();
        Ok(pick(base, &picks))
    }

    fn filter(&mut self, base: &Value, predicate: &Expr) -> Result<Value, Diagnostic> {
        match &*base.kind {
            ValueKind::Array(array) => {
                let mut picks = Vec::new();
                for (index, item) in array.items.iter().enumerate() {
                    let scope = IndexMap::from([("val".to_string(), item.clone())]);
                    if self.holds(predicate, scope)? {
                        picks.push(index);
                    }
                }
                Ok(pick(base, &picks))
            }
            ValueKind::DataFrame(frame) => {
                let mut picks = Vec::new();
                for index in 0..frame.height() {
                    let mut scope: IndexMap<String, Value> = frame
                        .row(index)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(name, cell)| (name.to_string(), cell.clone()))
                        .collect();
                    if let Some(row) = frame.row_value(index) {
                        scope.insert("val".to_string(), row);
                    }
                    if self.holds(predicate, scope)? {
                        picks.push(index);
                    }
                }
                Ok(Value::new(ValueKind::DataFrame(frame.select_rows(&picks))))
            }
            _ => Err(Diagnostic::error(ErrorCode::NotIndexable)
                .with_value(base)
                .with_kind(base.kind())),
        }
    }

    fn holds(&mut self, predicate: &Expr, scope: IndexMap<String, Value>) -> Result<bool, Diagnostic> {
        self.scopes.push(scope);
        let outcome = self.eval(predicate);
        self.scopes.pop();
        let outcome = outcome?;
        outcome.as_bool().ok_or_else(|| {
            Diagnostic::error(ErrorCode::FilterNotBoolean)
                .with_value(&outcome)
                .with_kind(outcome.kind())
        })
    }

    fn column(&mut self, target: &Expr, index: &Expr) -> Result<Value, Diagnostic> {
        if let ExprKind::Name(name) = &target.kind {
            if self.is_variable_family(name) {
                return self.indexed_variable(name, index);
            }
        }
        let base = self.eval(target)?;
        let key = self.eval(index)?;
        match &*base.kind {
            ValueKind::Array(array) if array.is_matrix() => {
                let width = array.rows.map_or(0, |bounds| bounds.max);
                let col = position(&key, width)?;
                let cells = (0..array.len())
                    .map(|row| {
                        array.cell(row, col).cloned().ok_or_else(|| {
                            Diagnostic::error(ErrorCode::IndexOutOfBounds)
                                .with_value(&key)
                                .with_str(array.row(row).map_or(0, <[Value]>::len).to_string())
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::vector(cells))
            }
            ValueKind::Array(array) => {
                let at = position(&key, array.len())?;
                Ok(array.items[at].clone())
            }
            ValueKind::DataFrame(frame) => match &*key.kind {
                ValueKind::String(name) => field(&base, name),
                _ => {
                    let at = position(&key, frame.width())?;
                    frame
                        .column_at(at)
                        .map(|(_, cells)| Value::vector(cells.to_vec()))
                        .ok_or_else(|| {
                            Diagnostic::error(ErrorCode::IndexOutOfBounds)
                                .with_value(&key)
                                .with_str(frame.width().to_string())
                        })
                }
            },
            _ => Err(Diagnostic::error(ErrorCode::NotIndexable)
                .with_value(&base)
                .with_kind(base.kind())),
        }
    }

    /// `x{k}` builds a decision variable when `x` is undeclared or itself a
    /// variable.
    fn is_variable_family(&mut self, name: &str) -> bool {
        if self.local(name).is_some() {
            return false;
        }
        self.references.insert(name.to_string());
        match self.env.get(name) {
            Some(value) => value.kind() == Kind::Variable,
            None => !self.catalog.is_builtin(name),
        }
    }

    fn indexed_variable(&mut self, name: &str, index: &Expr) -> Result<Value, Diagnostic> {
        let key = self.eval(index)?;
        let suffix = match &*key.kind {
            ValueKind::Number(n) if is_integral(*n) => format_number(*n),
            ValueKind::String(text) => text.clone(),
            _ => return Err(Diagnostic::error(ErrorCode::IndexNotInteger).with_value(&key)),
        };
        let full = format!("{name}<{suffix}>");
        if !self.materialized.iter().any(|declared| declared.name == full) {
            trace!("line {}: materialized {full}", self.line);
            self.materialized.push(Declaration {
                name: full.clone(),
                kind: SiteKind::Variable,
                value: Value::variable(full.clone()),
                span: self.span(index),
            });
        }
        Ok(Value::variable(full))
    }

    fn vector(&mut self, items: &[Item], expr: &Expr) -> Result<Value, Diagnostic> {
        let mut values = Vec::with_capacity(items.len());
        let mut names: Vec<Option<String>> = Vec::with_capacity(items.len());
        for item in items {
            if let ExprKind::Spread(inner) = &item.value.kind {
                for value in self.spread(inner)? {
                    values.push(value);
                    names.push(None);
                }
                continue;
            }
            values.push(self.eval(&item.value)?);
            names.push(item.name.clone());
        }
        let names: Option<Vec<String>> = if names.iter().any(Option::is_some) {
            Some(
                names
                    .into_iter()
                    .enumerate()
                    .map(|(at, name)| name.unwrap_or_else(|| (at + 1).to_string()))
                    .collect(),
            )
        } else {
            None
        };
        Ok(self.finish(values, names, expr))
    }

    /// Builds the final container: nested numeric rows become a matrix,
    /// everything else a vector with an inferred element kind.
    fn finish(&mut self, values: Vec<Value>, names: Option<Vec<String>>, expr: &Expr) -> Value {
        let nested = !values.is_empty()
            && values
                .iter()
                .all(|value| value.as_vector().is_some_and(|row| !row.is_empty()));
        if nested && names.is_none() {
            let rows: Vec<Vec<Value>> = values
                .iter()
                .filter_map(|value| value.as_vector().map(|row| row.items.clone()))
                .collect();
            if let Some(matrix) = Array::matrix(rows) {
                let ragged = matrix.rows.is_some_and(|bounds| !bounds.is_rectangular());
                let value = self.located(Value::array(matrix), expr);
                if ragged {
                    self.note(Diagnostic::warning(WarningCode::RaggedMatrix).with_value(&value));
                }
                return value;
            }
        }
        let values = values.into_iter().map(Value::unnamed).collect();
        let (mut array, mixed) = Array::vector(values);
        if let Some(names) = names {
            let (named, duplicate) = array.with_names(names);
            array = named;
            if let Some(warning) = duplicate {
                self.note_at(warning, expr);
            }
        }
        let value = self.located(Value::array(array), expr);
        if mixed {
            self.note(Diagnostic::warning(WarningCode::HeterogeneousVector).with_value(&value));
        }
        value
    }

    fn construct(&mut self, constructor: &Constructor, expr: &Expr) -> Result<Value, Diagnostic> {
        let mut generated: Vec<(String, Vec<Value>)> = Vec::with_capacity(constructor.clauses.len());
        for clause in &constructor.clauses {
            let values = self.clause(clause)?;
            generated.push((clause.binding().to_string(), values));
        }
        let shortest = generated.iter().map(|(_, values)| values.len()).min().unwrap_or(0);
        if generated.iter().any(|(_, values)| values.len() != shortest) {
            self.note_at(
                Diagnostic::warning(WarningCode::ShortestClause).with_str(shortest.to_string()),
                expr,
            );
        }

        let mut items = Vec::with_capacity(shortest);
        match &constructor.body {
            Some(body) => {
                for at in 0..shortest {
                    let scope = generated
                        .iter()
                        .map(|(binding, values)| (binding.clone(), values[at].clone()))
                        .collect();
                    self.scopes.push(scope);
                    let item = self.eval(body);
                    self.scopes.pop();
                    items.push(item?);
                }
            }
            None if generated.len() == 1 => {
                let (_, mut values) = generated.remove(0);
                values.truncate(shortest);
                items = values;
            }
            None => {
                return Err(Diagnostic::error(ErrorCode::ConstructorBody)
                    .with_str("a constructor with several `for` clauses needs a body expression"))
            }
        }

        for modifier in &constructor.modifiers {
            let value = self.eval(&modifier.value)?;
            let extra: Vec<Value> = match value.as_vector() {
                Some(array) => array.items.clone(),
                None => vec![value.clone()],
            };
            match modifier.kind {
                ModifierKind::Prepend => {
                    items.splice(0..0, extra);
                }
                ModifierKind::Append => items.extend(extra),
                ModifierKind::Include => {
                    for candidate in extra {
                        if !items.iter().any(|item| item.equals(&candidate, false, false)) {
                            items.push(candidate);
                        }
                    }
                }
                ModifierKind::Exclude => {
                    items.retain(|item| !extra.iter().any(|gone| item.equals(gone, false, false)));
                }
            }
        }
        Ok(self.finish(items, None, expr))
    }

    fn clause(&mut self, clause: &Clause) -> Result<Vec<Value>, Diagnostic> {
        match clause {
            Clause::Range {
                start,
                end,
                inclusive,
                step,
                ..
            } => {
                let from = self.eval(start)?;
                let to = self.eval(end)?;
                let (a, b) = match (from.as_number(), to.as_number()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => {
                        return Err(Diagnostic::error(ErrorCode::InvalidOperand)
                            .with_str("to")
                            .with_kind(from.kind())
                            .with_kind(to.kind())
                            .marking(&from)
                            .marking(&to))
                    }
                };
                let step_value = match step {
                    Some(expr) => self.eval(expr)?,
                    None => Value::number(if b < a { -1.0 } else { 1.0 }),
                };
                let s = match step_value.as_number() {
                    Some(s) if s != 0.0 && s.is_finite() => s,
                    _ => return Err(Diagnostic::error(ErrorCode::InvalidStep).with_value(&step_value)),
                };
                if (b - a) * s < 0.0 {
                    self.note(
                        Diagnostic::warning(WarningCode::EmptyRange)
                            .with_value(&from)
                            .with_value(&to)
                            .with_value(&step_value),
                    );
                    return Ok(Vec::new());
                }
                let steps = ((b - a) / s + EPSILON).floor();
                if !steps.is_finite() || steps + 1.0 > self.settings.range_cap as f64 {
                    return Err(Diagnostic::error(ErrorCode::RangeTooLarge)
                        .with_str(self.settings.range_cap.to_string())
                        .marking(&from)
                        .marking(&to));
                }
                let mut count = steps as usize + 1;
                if !inclusive && approx_eq(a + steps * s, b) {
                    count -= 1;
                }
                Ok((0..count).map(|k| Value::number(a + k as f64 * s)).collect())
            }
            Clause::Each { source, .. } => {
                let value = self.eval(source)?;
                match &*value.kind {
                    ValueKind::Array(array) => {
                        Ok(array.items.iter().map(|item| item.clone().unnamed()).collect())
                    }
                    ValueKind::String(text) => {
                        Ok(text.chars().map(|ch| Value::string(ch.to_string())).collect())
                    }
                    ValueKind::DataFrame(frame) => {
                        Ok((0..frame.height()).filter_map(|row| frame.row_value(row)).collect())
                    }
                    _ => Err(Diagnostic::error(ErrorCode::NotIterable)
                        .with_value(&value)
                        .with_kind(value.kind())),
                }
            }
        }
    }

    fn span(&self, expr: &Expr) -> SourceSpan {
        self.call_site.as_ref().map_or(expr.span, |(span, _)| *span)
    }

    fn prov(&self, expr: &Expr) -> Provenance {
        match &self.call_site {
            Some((_, provenance)) => provenance.clone(),
            None => expr.provenance(),
        }
    }

    fn located(&self, value: Value, expr: &Expr) -> Value {
        value.at(self.span(expr), self.prov(expr))
    }

    /// Tokens lying inside `span`.
    fn span_tokens(&self, span: SourceSpan) -> Provenance {
        let mut inside = self
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| token.span.start >= span.start && token.span.end <= span.end)
            .map(|(index, _)| index);
        match inside.next() {
            Some(first) => {
                let last = inside.last().unwrap_or(first);
                Provenance::tokens(first..last + 1)
            }
            None => Provenance::empty(),
        }
    }

    fn note(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity() {
            Severity::Recommendation => self.recommendations.push(diagnostic),
            Severity::Warning | Severity::Error => self.warnings.push(diagnostic),
        }
    }

    fn note_at(&mut self, diagnostic: Diagnostic, expr: &Expr) {
        let diagnostic = diagnostic.or_at(self.span(expr), &self.prov(expr));
        self.note(diagnostic);
    }
}

fn single_or_vector(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::vector(values)
    }
}

/// Resolves a 1-based index, negative counting from the end, to a 0-based
/// position.
fn position(index: &Value, len: usize) -> Result<usize, Diagnostic> {
    let Some(n) = index.as_number() else {
        return Err(Diagnostic::error(ErrorCode::IndexNotInteger).with_value(index));
    };
    if !is_integral(n) {
        return Err(Diagnostic::error(ErrorCode::IndexNotInteger).with_value(index));
    }
    let i = n.round() as i64;
    if i == 0 {
        return Err(Diagnostic::error(ErrorCode::IndexZero).marking(index));
    }
    let resolved = if i < 0 { len as i64 + i } else { i - 1 };
    if resolved < 0 || resolved >= len as i64 {
        return Err(Diagnostic::error(ErrorCode::IndexOutOfBounds)
            .with_value(index)
            .with_str(len.to_string()));
    }
    Ok(resolved as usize)
}

fn is_filter(base: &Value, predicate: &Expr) -> bool {
    let free = free_names(predicate, &[]);
    match &*base.kind {
        ValueKind::Array(_) => free.iter().any(|name| name == "val"),
        ValueKind::DataFrame(frame) => free
            .iter()
            .any(|name| name == "val" || frame.has_column(name)),
        _ => false,
    }
}

/// Named access: vector slots, table columns and test-result fields.
fn field(value: &Value, key: &str) -> Result<Value, Diagnostic> {
    let missing = || {
        Diagnostic::error(ErrorCode::NamedIndexMissing)
            .with_value(value)
            .with_str(key)
    };
    match &*value.kind {
        ValueKind::Array(array) => array
            .name_index(key)
            .map(|at| array.items[at].clone())
            .ok_or_else(missing),
        ValueKind::DataFrame(frame) => frame
            .column(key)
            .map(|cells| Value::vector(cells.to_vec()))
            .ok_or_else(missing),
        ValueKind::StatTest(result) => result.field(key).map(Value::number).ok_or_else(missing),
        _ => Err(Diagnostic::error(ErrorCode::NotIndexable)
            .with_value(value)
            .with_kind(value.kind())),
    }
}

/// Keeps the given 0-based positions of a vector, matrix, string or table.
fn pick(base: &Value, picks: &[usize]) -> Value {
    match &*base.kind {
        ValueKind::Array(array) if array.is_matrix() => {
            let rows: Vec<Vec<Value>> = picks
                .iter()
                .filter_map(|&at| array.row(at).map(<[Value]>::to_vec))
                .collect();
            match Array::matrix(rows) {
                Some(matrix) => Value::array(matrix),
                None => Value::vector(Vec::new()),
            }
        }
        ValueKind::Array(array) => {
            let items = picks
                .iter()
                .filter_map(|&at| array.items.get(at).cloned())
                .collect();
            let mut kept = Array::typed(array.element, items);
            kept.names = array
                .names
                .as_ref()
                .map(|names| picks.iter().filter_map(|&at| names.get(at).cloned()).collect());
            Value::array(kept)
        }
        ValueKind::String(text) => {
            let chars: Vec<char> = text.chars().collect();
            Value::string(picks.iter().filter_map(|&at| chars.get(at)).collect::<String>())
        }
        ValueKind::DataFrame(frame) => Value::new(ValueKind::DataFrame(frame.select_rows(picks))),
        _ => base.clone(),
    }
}

/// `base[key]` for a key that is not a filter.
fn select(base: &Value, key: &Value) -> Result<Value, Diagnostic> {
    let not_indexable = || {
        Diagnostic::error(ErrorCode::NotIndexable)
            .with_value(base)
            .with_kind(base.kind())
    };
    match (&*base.kind, &*key.kind) {
        (_, ValueKind::String(name)) => field(base, name),
        (ValueKind::Array(array), ValueKind::Number(_)) => {
            let at = position(key, array.len())?;
            Ok(array.items[at].clone())
        }
        (ValueKind::String(text), ValueKind::Number(_)) => {
            let chars: Vec<char> = text.chars().collect();
            let at = position(key, chars.len())?;
            Ok(Value::string(chars[at].to_string()))
        }
        (ValueKind::DataFrame(frame), ValueKind::Number(_)) => {
            let at = position(key, frame.height())?;
            frame.row_value(at).ok_or_else(not_indexable)
        }
        (ValueKind::Array(_) | ValueKind::DataFrame(_) | ValueKind::String(_), ValueKind::Array(keys))
            if !keys.is_matrix() =>
        {
            let len = match &*base.kind {
                ValueKind::Array(array) => array.len(),
                ValueKind::DataFrame(frame) => frame.height(),
                ValueKind::String(text) => text.chars().count(),
                _ => 0,
            };
            let mask: Option<Vec<bool>> = keys.items.iter().map(Value::as_bool).collect();
            let picks = match mask {
                Some(mask) if !mask.is_empty() => {
                    if mask.len() != len {
                        return Err(Diagnostic::error(ErrorCode::DimensionMismatch)
                            .with_str(format!("mask of length {} over {len} elements", mask.len()))
                            .marking(key));
                    }
                    mask.iter()
                        .enumerate()
                        .filter(|(_, keep)| **keep)
                        .map(|(at, _)| at)
                        .collect()
                }
                _ => {
                    let mut picks = Vec::with_capacity(keys.len());
                    for item in &keys.items {
                        match (&*base.kind, &*item.kind) {
                            (ValueKind::Array(array), ValueKind::String(name)) => {
                                picks.push(array.name_index(name).ok_or_else(|| {
                                    Diagnostic::error(ErrorCode::NamedIndexMissing)
                                        .with_value(base)
                                        .with_str(name.clone())
                                })?)
                            }
                            _ => picks.push(position(item, len)?),
                        }
                    }
                    picks
                }
            };
            Ok(pick(base, &picks))
        }
        _ => Err(not_indexable()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Code;
    use crate::parser::parse_source;

    fn resolve_in(env: &Environment, source: &str) -> Resolution {
        resolve_with(env, &Settings::default(), source)
    }

    fn resolve_with(env: &Environment, settings: &Settings, source: &str) -> Resolution {
        let (tokens, stmt) = parse_source(source).expect("parses");
        let catalog = Catalog::standard();
        Resolver::new(env, &catalog, settings, LineId(1), source, &tokens).resolve(&stmt, None)
    }

    fn define(env: &mut Environment, source: &str) {
        let resolution = resolve_in(env, source);
        let declaration = &resolution.declarations[0];
        env.define(LineId(1), &declaration.name, SiteKind::Function, declaration.value.clone());
    }

    fn value_of(env: &Environment, source: &str) -> Value {
        let resolution = resolve_in(env, source);
        match resolution.error {
            Some(error) => panic!("{source}: {error}"),
            None => resolution.value.expect("a value"),
        }
    }

    #[test]
    fn pipe_prepends_the_value_unless_result_is_used() {
        let env = Environment::new();
        let value = value_of(&env, "[3, 1, 2] |> max()");
        assert_eq!(value.as_number(), Some(3.0));
        let value = value_of(&env, "2 |> log(8, result)");
        assert!(approx_eq(value.as_number().expect("number"), 3.0));
    }

    #[test]
    fn result_outside_a_pipe_is_an_error() {
        let env = Environment::new();
        let resolution = resolve_in(&env, "result + 1");
        let error = resolution.error.expect("no pipe");
        assert!(error.is_error(ErrorCode::MissingPipeValue));
    }

    #[test]
    fn fallback_suppresses_the_failed_branch() {
        let env = Environment::new();
        let resolution = resolve_in(&env, "fa 1 / 0 fo 7");
        assert_eq!(resolution.value.and_then(|v| v.as_number()), Some(7.0));
        assert_eq!(resolution.warnings.len(), 1);
        assert!(resolution.marks.is_suppressed(1));
        assert!(!resolution.marks.is_suppressed(5));
    }

    #[test]
    fn filters_bind_val() {
        let env = Environment::new();
        let value = value_of(&env, "[1, 5, 2, 8][val > 2]");
        assert!(value.equals(&Value::numbers([5.0, 8.0]), false, true));
    }

    #[test]
    fn constructors_use_the_shortest_clause() {
        let env = Environment::new();
        let resolution = resolve_in(&env, "[x + y for x = 1 to 3 for y in [10, 20]]");
        let value = resolution.value.expect("vector");
        assert!(value.equals(&Value::numbers([11.0, 22.0]), false, true));
        assert_eq!(resolution.warnings.len(), 1);
    }

    #[test]
    fn indexed_variables_are_materialized_once() {
        let env = Environment::new();
        let resolution = resolve_in(&env, "c = x{1} + x{2} + x{1}");
        let names: Vec<&str> = resolution
            .declarations
            .iter()
            .map(|declaration| declaration.name.as_str())
            .collect();
        assert_eq!(names, vec!["c", "x<1>", "x<2>"]);
    }

    #[test]
    fn references_include_failed_lookups() {
        let env = Environment::new();
        let resolution = resolve_in(&env, "y = missing + 1");
        assert!(resolution.error.expect("undefined").is_error(ErrorCode::UnknownName));
        assert_eq!(resolution.references, vec!["missing".to_string()]);
    }

    #[test]
    fn user_functions_see_only_their_parameters() {
        let mut env = Environment::new();
        let sq = resolve_in(&env, "sq(x) = x * x");
        let declaration = &sq.declarations[0];
        env.define(LineId(1), "sq", SiteKind::Function, declaration.value.clone());
        let value = value_of(&env, "sq(4)");
        assert_eq!(value.as_number(), Some(16.0));
        let resolution = resolve_in(&env, "sq()");
        assert!(resolution.error.expect("missing").is_error(ErrorCode::MissingArgument));
    }

    #[test]
    fn slices_are_inclusive_and_one_based() {
        let env = Environment::new();
        let value = value_of(&env, "[1, 2, 3, 4, 5][2:4]");
        assert!(value.equals(&Value::numbers([2.0, 3.0, 4.0]), false, true));
        let value = value_of(&env, "[1, 2, 3, 4, 5][1:5:2]");
        assert!(value.equals(&Value::numbers([1.0, 3.0, 5.0]), false, true));
        let resolution = resolve_in(&env, "[1, 2, 3][3:1]");
        assert!(resolution.error.expect("order").is_error(ErrorCode::SliceOrder));
    }

    #[test]
    fn spreads_splice_into_vectors_and_calls() {
        let mut env = Environment::new();
        let value = value_of(&env, "[0, ...[1, 2], 3]");
        assert!(value.equals(&Value::numbers([0.0, 1.0, 2.0, 3.0]), false, true));

        define(&mut env, "add3(a, b, c) = a + b + c");
        let value = value_of(&env, "add3(...[1, 2, 3])");
        assert_eq!(value.as_number(), Some(6.0));

        let resolution = resolve_in(&env, "[...5]");
        assert!(resolution.error.expect("scalar").is_error(ErrorCode::SpreadNotList));
    }

    #[test]
    fn spreads_beyond_the_cap_fail() {
        let env = Environment::new();
        let settings = Settings::new().with_spread_cap(2);
        let resolution = resolve_with(&env, &settings, "[...[1, 2]]");
        assert!(resolution.is_ok());
        let resolution = resolve_with(&env, &settings, "[...[1, 2, 3]]");
        assert!(resolution.error.expect("three").is_error(ErrorCode::SpreadTooLarge));
    }

    #[test]
    fn ranges_beyond_the_cap_fail() {
        let env = Environment::new();
        let settings = Settings::new().with_range_cap(5);
        let value = resolve_with(&env, &settings, "[for x = 1 to 5]").value.expect("five");
        assert!(value.equals(&Value::numbers([1.0, 2.0, 3.0, 4.0, 5.0]), false, true));
        let resolution = resolve_with(&env, &settings, "[for x = 1 to 6]");
        let error = resolution.error.expect("six");
        assert!(error.is_error(ErrorCode::RangeTooLarge));
        assert_eq!(error.message(), "constructed vector would exceed 5 elements");
    }

    #[test]
    fn unbounded_recursion_hits_the_limit() {
        let mut env = Environment::new();
        define(&mut env, "down(n) = down(n + 1)");
        let settings = Settings::new().with_recursion_limit(8);
        let resolution = resolve_with(&env, &settings, "down(1)");
        let error = resolution.error.expect("runaway");
        assert!(error.is_error(ErrorCode::RecursionLimit));
        assert_eq!(error.message(), "call depth exceeded 8 frames in down");
    }

    #[test]
    fn keyof_on_unnamed_values_warns() {
        let env = Environment::new();
        let resolution = resolve_in(&env, "\"a\" keyof [1, 2]");
        assert_eq!(resolution.value.and_then(|v| v.as_bool()), Some(false));
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(
            resolution.warnings[0].code,
            Code::Warning(WarningCode::NoNamedIndices)
        );

        let resolution = resolve_in(&env, "\"a\" keyof [a: 1]");
        assert_eq!(resolution.value.and_then(|v| v.as_bool()), Some(true));
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn unknown_named_arguments_are_recommendations() {
        let mut env = Environment::new();
        define(&mut env, "twice(x) = 2x");
        let resolution = resolve_in(&env, "twice(3, scale: 4)");
        assert_eq!(resolution.value.and_then(|v| v.as_number()), Some(6.0));
        assert!(resolution.warnings.is_empty());
        assert_eq!(resolution.recommendations.len(), 1);
        let note = &resolution.recommendations[0];
        assert_eq!(note.code, Code::Recommendation(RecommendationCode::UnusedParameter));
        assert_eq!(note.message(), "twice does not take a parameter named scale");
    }
}
