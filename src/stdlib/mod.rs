//! Function and macro catalog.
//!
//! Every built-in satisfies one contract: it declares its parameters and
//! receives them already bound and type-checked as [`Args`]. Registering a
//! new entry never requires changes to the resolver.

mod base;
mod date;
mod graph;
mod lp;
mod macros;
mod plot;
mod stats;
mod table;
mod units;

use std::fmt;

use indexmap::IndexMap;
use log::debug;

use crate::{
    diagnostics::{Diagnostic, ErrorCode, Provenance, RecommendationCode, SourceSpan, WarningCode},
    linear::LpSolver,
    network::PathFinder,
    stats::StatsError,
    value::{ElementKind, Kind, Value, ValueKind},
};

/// One declared parameter. An empty `accepts` list takes any kind;
/// otherwise each alternative is tried in order through casting.
#[derive(Debug, Clone, Copy)]
pub struct Param {
    pub name: &'static str,
    pub accepts: &'static [Kind],
    pub required: bool,
    /// Collects every remaining positional argument.
    pub variadic: bool,
    /// Collects named arguments that match no other parameter.
    pub keywords: bool,
}

impl Param {
    pub const fn required(name: &'static str, accepts: &'static [Kind]) -> Param {
        Param {
            name,
            accepts,
            required: true,
            variadic: false,
            keywords: false,
        }
    }

    pub const fn optional(name: &'static str, accepts: &'static [Kind]) -> Param {
        Param {
            required: false,
            ..Param::required(name, accepts)
        }
    }

    pub const fn variadic(name: &'static str, accepts: &'static [Kind]) -> Param {
        Param {
            variadic: true,
            ..Param::required(name, accepts)
        }
    }

    pub const fn keywords(name: &'static str) -> Param {
        Param {
            keywords: true,
            ..Param::optional(name, &[])
        }
    }
}

pub(crate) const NUMBER: &[Kind] = &[Kind::Number];
pub(crate) const STRING: &[Kind] = &[Kind::String];
pub(crate) const ANY: &[Kind] = &[];
pub(crate) const NUMBERS: &[Kind] = &[Kind::Vector(ElementKind::Number)];

/// A call argument before binding.
#[derive(Debug, Clone)]
pub struct Argument {
    pub name: Option<String>,
    pub value: Value,
}

impl Argument {
    pub fn positional(value: Value) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: Some(name.into()),
            value,
        }
    }
}

/// Arguments bound to a built-in's parameters.
#[derive(Debug, Clone)]
pub struct Args {
    pub function: &'static str,
    values: IndexMap<&'static str, Value>,
    rest: Vec<Value>,
    keywords: Vec<(String, Value)>,
    pub span: SourceSpan,
    pub provenance: Provenance,
}

impl Args {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn value(&self, name: &str) -> Result<&Value, Diagnostic> {
        self.get(name).ok_or_else(|| {
            Diagnostic::error(ErrorCode::MissingArgument)
                .with_str(self.function)
                .with_str(name)
                .with_span(self.span)
                .with_provenance(&self.provenance)
        })
    }

    pub fn number(&self, name: &str) -> Result<f64, Diagnostic> {
        let value = self.value(name)?;
        value.as_number().ok_or_else(|| self.type_error(name, Kind::Number, value))
    }

    pub fn number_or(&self, name: &str, default: f64) -> Result<f64, Diagnostic> {
        match self.get(name) {
            Some(_) => self.number(name),
            None => Ok(default),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64, Diagnostic> {
        let value = self.value(name)?;
        if value.is_integral() {
            Ok(self.number(name)?.round() as i64)
        } else {
            Err(Diagnostic::error(ErrorCode::IndexNotInteger).with_value(value))
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, Diagnostic> {
        let value = self.value(name)?;
        value.as_str().ok_or_else(|| self.type_error(name, Kind::String, value))
    }

    pub fn string_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str, Diagnostic> {
        match self.get(name) {
            Some(_) => self.string(name),
            None => Ok(default),
        }
    }

    /// Numbers of the first variadic parameter, flattening vectors.
    pub fn numbers(&self) -> Result<Vec<f64>, Diagnostic> {
        let mut out = Vec::new();
        for value in &self.rest {
            match &*value.kind {
                ValueKind::Number(n) => out.push(*n),
                ValueKind::Array(array) if !array.is_matrix() => {
                    for item in &array.items {
                        match item.as_number() {
                            Some(n) => out.push(n),
                            None => return Err(self.type_error("values", Kind::Number, item)),
                        }
                    }
                }
                _ => return Err(self.type_error("values", Kind::Number, value)),
            }
        }
        Ok(out)
    }

    /// Numbers held by a single vector parameter.
    pub fn vector_numbers(&self, name: &str) -> Result<Vec<f64>, Diagnostic> {
        let value = self.value(name)?;
        value
            .as_vector()
            .and_then(|array| array.numbers())
            .ok_or_else(|| self.type_error(name, Kind::Vector(ElementKind::Number), value))
    }

    pub fn rest(&self) -> &[Value] {
        &self.rest
    }

    pub fn keywords(&self) -> &[(String, Value)] {
        &self.keywords
    }

    pub fn type_error(&self, param: &str, expected: Kind, found: &Value) -> Diagnostic {
        Diagnostic::error(ErrorCode::ArgumentType)
            .with_str(param)
            .with_str(self.function)
            .with_kind(expected)
            .with_value(found)
    }

    pub fn stats_error(&self, error: StatsError) -> Diagnostic {
        match error {
            StatsError::Empty => Diagnostic::error(ErrorCode::EmptyCollection).with_str(self.function),
            StatsError::TooFew(n) => Diagnostic::error(ErrorCode::TooFewValues)
                .with_str(self.function)
                .with_str(n.to_string()),
            StatsError::LengthMismatch => Diagnostic::error(ErrorCode::DimensionMismatch)
                .with_str(format!("{} needs samples of equal length", self.function)),
            StatsError::ZeroVariance => Diagnostic::error(ErrorCode::MathDomain)
                .with_str(self.function)
                .with_name("a sample without variance"),
        }
    }
}

/// A built-in's result plus any non-fatal findings.
#[derive(Debug, Clone)]
pub struct Produced {
    pub value: Value,
    pub warnings: Vec<Diagnostic>,
}

impl Produced {
    pub fn warn(mut self, warning: Diagnostic) -> Self {
        self.warnings.push(warning);
        self
    }
}

impl From<Value> for Produced {
    fn from(value: Value) -> Self {
        Produced {
            value,
            warnings: Vec::new(),
        }
    }
}

pub type Operate = fn(&Args) -> Result<Produced, Diagnostic>;
pub type Execute = fn(&Args, &mut MacroContext<'_>) -> Result<Produced, Diagnostic>;

#[derive(Clone, Copy)]
pub struct NativeFunction {
    pub name: &'static str,
    pub params: &'static [Param],
    pub operate: Operate,
}

#[derive(Clone, Copy)]
pub struct NativeMacro {
    pub name: &'static str,
    pub params: &'static [Param],
    pub execute: Execute,
}

/// Destination for macro output in execute mode.
pub trait OutputSink {
    fn emit(&mut self, text: &str);
}

impl OutputSink for Vec<String> {
    fn emit(&mut self, text: &str) {
        self.push(text.to_string());
    }
}

/// Collaborators available to a macro while it executes.
pub struct MacroContext<'a> {
    pub sink: &'a mut dyn OutputSink,
    pub solver: Option<&'a dyn LpSolver>,
    pub paths: &'a dyn PathFinder,
}

#[derive(Clone, Copy)]
pub enum Entry {
    Function(NativeFunction),
    Macro(NativeMacro),
    Constant(f64),
}

impl Entry {
    pub fn name(&self) -> Option<&'static str> {
        match self {
            Entry::Function(function) => Some(function.name),
            Entry::Macro(mac) => Some(mac.name),
            Entry::Constant(_) => None,
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Function(function) => write!(f, "{}()", function.name),
            Entry::Macro(mac) => write!(f, "{}!()", mac.name),
            Entry::Constant(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: &'static str,
    /// Prelude modules are searched without an import.
    pub prelude: bool,
    entries: IndexMap<&'static str, Entry>,
}

impl Module {
    pub fn new(name: &'static str, prelude: bool) -> Self {
        Self {
            name,
            prelude,
            entries: IndexMap::new(),
        }
    }

    pub fn function(&mut self, name: &'static str, params: &'static [Param], operate: Operate) {
        self.entries.insert(
            name,
            Entry::Function(NativeFunction {
                name,
                params,
                operate,
            }),
        );
    }

    pub fn constant(&mut self, name: &'static str, value: f64) {
        self.entries.insert(name, Entry::Constant(value));
    }

    pub fn macro_(&mut self, name: &'static str, params: &'static [Param], execute: Execute) {
        self.entries.insert(
            name,
            Entry::Macro(NativeMacro {
                name,
                params,
                execute,
            }),
        );
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

/// Result of looking a name up in the catalog.
#[derive(Debug, Clone)]
pub struct Found<'a> {
    pub module: &'static str,
    pub entry: &'a Entry,
    pub recommendations: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    modules: IndexMap<&'static str, Module>,
}

impl Catalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in catalog.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        catalog.install(base::module());
        catalog.install(stats::module());
        catalog.install(date::module());
        catalog.install(lp::module());
        catalog.install(graph::module());
        catalog.install(units::module());
        catalog.install(table::module());
        catalog.install(plot::module());
        catalog.install(macros::module());
        catalog
    }

    /// Adds or replaces a module.
    pub fn install(&mut self, module: Module) {
        self.modules.insert(module.name, module);
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Whether `name` is provided by any module, imported or not.
    pub fn is_builtin(&self, name: &str) -> bool {
        self.modules.values().any(|module| module.get(name).is_some())
    }

    /// Resolves `name` (optionally `module.name`) against prelude modules
    /// and then the given imports, in import order.
    pub fn lookup<'a, I>(&'a self, name: &str, imports: I) -> Option<Found<'a>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if let Some((module, member)) = name.split_once('.') {
            let module = self.modules.get(module)?;
            return module.get(member).map(|entry| Found {
                module: module.name,
                entry,
                recommendations: Vec::new(),
            });
        }
        if let Some((module, entry)) = self
            .modules
            .values()
            .filter(|module| module.prelude)
            .find_map(|module| module.get(name).map(|entry| (module.name, entry)))
        {
            return Some(Found {
                module,
                entry,
                recommendations: Vec::new(),
            });
        }
        let mut matches = imports
            .into_iter()
            .filter_map(|import| self.modules.get(import))
            .filter_map(|module| module.get(name).map(|entry| (module.name, entry)));
        let (module, entry) = matches.next()?;
        let mut recommendations = Vec::new();
        if matches.next().is_some() {
            recommendations.push(
                Diagnostic::recommendation(RecommendationCode::PreferQualified)
                    .with_str(name)
                    .with_str(format!("{module}.{name}")),
            );
        }
        Some(Found {
            module,
            entry,
            recommendations,
        })
    }
}

/// Binds call arguments to declared parameters: positional first, then
/// named. Returns the bound arguments with warnings and recommendations
/// raised along the way.
pub fn bind(
    function: &'static str,
    params: &'static [Param],
    arguments: Vec<Argument>,
    span: SourceSpan,
    provenance: &Provenance,
) -> Result<(Args, Vec<Diagnostic>), Diagnostic> {
    let mut args = Args {
        function,
        values: IndexMap::new(),
        rest: Vec::new(),
        keywords: Vec::new(),
        span,
        provenance: provenance.clone(),
    };
    let mut notes = Vec::new();
    let keyword_param = params.iter().any(|param| param.keywords);
    let mut slots = params.iter().filter(|param| !param.keywords);
    let mut variadic: Option<&Param> = None;
    let (positional, named): (Vec<Argument>, Vec<Argument>) =
        arguments.into_iter().partition(|arg| arg.name.is_none());

    for argument in positional {
        if let Some(param) = variadic {
            args.rest.push(check_kind(function, param, argument.value)?);
            continue;
        }
        match slots.next() {
            Some(param) if param.variadic => {
                variadic = Some(param);
                args.rest.push(check_kind(function, param, argument.value)?);
            }
            Some(param) => {
                let value = check_kind(function, param, argument.value)?;
                args.values.insert(param.name, value);
            }
            None => {
                let limit = params.iter().filter(|param| !param.keywords).count();
                return Err(Diagnostic::error(ErrorCode::TooManyArguments)
                    .with_str(function)
                    .with_str(limit.to_string())
                    .marking(&argument.value));
            }
        }
    }

    for argument in named {
        let Some(name) = argument.name else { continue };
        let Some(param) = params
            .iter()
            .find(|param| param.name == name && !param.keywords && !param.variadic)
        else {
            if keyword_param {
                if args.keywords.iter().any(|(existing, _)| *existing == name) {
                    notes.push(duplicate(&name, &argument.value));
                } else {
                    args.keywords.push((name, argument.value));
                }
            } else {
                debug!("{function}: ignoring unknown parameter `{name}`");
                notes.push(
                    Diagnostic::recommendation(RecommendationCode::UnusedParameter)
                        .with_str(function)
                        .with_str(name)
                        .marking(&argument.value),
                );
            }
            continue;
        };
        if args.values.contains_key(param.name) {
            notes.push(duplicate(&name, &argument.value));
            continue;
        }
        let value = check_kind(function, param, argument.value)?;
        args.values.insert(param.name, value);
    }

    for param in params {
        let bound = if param.variadic {
            !args.rest.is_empty()
        } else {
            param.keywords || args.values.contains_key(param.name)
        };
        if param.required && !bound {
            return Err(Diagnostic::error(ErrorCode::MissingArgument)
                .with_str(function)
                .with_str(param.name)
                .with_span(span)
                .with_provenance(provenance));
        }
    }
    Ok((args, notes))
}

fn duplicate(name: &str, value: &Value) -> Diagnostic {
    Diagnostic::warning(WarningCode::DuplicateParameter)
        .with_str(name)
        .marking(value)
}

fn check_kind(function: &'static str, param: &Param, value: Value) -> Result<Value, Diagnostic> {
    if param.accepts.is_empty() || param.accepts.contains(&value.kind()) {
        return Ok(value);
    }
    for kind in param.accepts {
        if let Ok(cast) = value.cast_to(*kind) {
            return Ok(cast);
        }
    }
    let expected = param.accepts.first().copied().unwrap_or(Kind::LIST);
    Err(Diagnostic::error(ErrorCode::ArgumentType)
        .with_str(param.name)
        .with_str(function)
        .with_kind(expected)
        .with_value(&value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &[Param] = &[
        Param::required("x", NUMBER),
        Param::optional("digits", NUMBER),
    ];

    fn call(arguments: Vec<Argument>) -> Result<(Args, Vec<Diagnostic>), Diagnostic> {
        bind("round", PARAMS, arguments, SourceSpan::default(), &Provenance::empty())
    }

    #[test]
    fn positional_then_named() {
        let (args, notes) = call(vec![
            Argument::positional(Value::number(2.5)),
            Argument::named("digits", Value::number(1.0)),
        ])
        .expect("binds");
        assert_eq!(args.number("x"), Ok(2.5));
        assert_eq!(args.number("digits"), Ok(1.0));
        assert!(notes.is_empty());
    }

    #[test]
    fn duplicate_parameter_keeps_first() {
        let (args, notes) = call(vec![
            Argument::positional(Value::number(1.0)),
            Argument::named("x", Value::number(9.0)),
        ])
        .expect("binds");
        assert_eq!(args.number("x"), Ok(1.0));
        assert_eq!(notes[0].code, crate::diagnostics::Code::Warning(WarningCode::DuplicateParameter));
    }

    #[test]
    fn unknown_parameter_is_ignored() {
        let (args, notes) = call(vec![
            Argument::positional(Value::number(1.0)),
            Argument::named("precision", Value::number(3.0)),
        ])
        .expect("binds");
        assert!(args.get("precision").is_none());
        assert_eq!(notes.len(), 1);
    }

    #[test]
    fn missing_required_parameter() {
        let err = call(vec![Argument::named("digits", Value::number(1.0))]).expect_err("x missing");
        assert!(err.is_error(ErrorCode::MissingArgument));
        assert_eq!(err.message(), "round is missing required parameter x");
    }

    #[test]
    fn alternatives_are_tried_through_casting() {
        let (args, _) = call(vec![Argument::positional(Value::string("4"))]).expect("castable");
        assert_eq!(args.number("x"), Ok(4.0));
        let err = call(vec![Argument::positional(Value::string("four"))]).expect_err("not castable");
        assert!(err.is_error(ErrorCode::ArgumentType));
    }

    #[test]
    fn too_many_arguments() {
        let err = call(vec![
            Argument::positional(Value::number(1.0)),
            Argument::positional(Value::number(2.0)),
            Argument::positional(Value::number(3.0)),
        ])
        .expect_err("three arguments");
        assert!(err.is_error(ErrorCode::TooManyArguments));
    }

    #[test]
    fn qualified_lookup_skips_imports() {
        let catalog = Catalog::standard();
        assert!(catalog.lookup("mean", []).is_none());
        assert!(catalog.lookup("stats.mean", []).is_some());
        assert!(catalog.lookup("mean", ["stats"]).is_some());
        assert!(catalog.lookup("sqrt", []).is_some());
    }
}
