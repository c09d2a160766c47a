use std::{fmt, rc::Rc};

use chrono::NaiveDate;

use crate::{
    ast::Expr,
    dates::{self, Offset},
    diagnostics::{Diagnostic, ErrorCode, Provenance, SourceSpan, WarningCode},
    environment::LineId,
    linear::{Alias, Bound, LpModel},
    network::{Edge, Network, Node},
    plot::Plot,
    stats::StatTestResult,
    table::DataFrame,
    units::Measurement,
};

/// Absolute tolerance used whenever two numbers are compared.
pub const EPSILON: f64 = 1e-8;

pub fn approx_eq(a: f64, b: f64) -> bool {
    a == b || (a - b).abs() < EPSILON
}

pub fn is_integral(x: f64) -> bool {
    x.is_finite() && approx_eq(x, x.round())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Number,
    Boolean,
    String,
    Variable,
    Alias,
    Date,
    Measurement,
    Offset,
    Any,
}

impl ElementKind {
    pub fn of(kind: Kind) -> Option<ElementKind> {
        Some(match kind {
            Kind::Number => ElementKind::Number,
            Kind::Boolean => ElementKind::Boolean,
            Kind::String => ElementKind::String,
            Kind::Variable => ElementKind::Variable,
            Kind::Alias => ElementKind::Alias,
            Kind::Date => ElementKind::Date,
            Kind::Measurement => ElementKind::Measurement,
            Kind::Offset => ElementKind::Offset,
            _ => return None,
        })
    }

    pub fn kind(self) -> Option<Kind> {
        Some(match self {
            ElementKind::Number => Kind::Number,
            ElementKind::Boolean => Kind::Boolean,
            ElementKind::String => Kind::String,
            ElementKind::Variable => Kind::Variable,
            ElementKind::Alias => Kind::Alias,
            ElementKind::Date => Kind::Date,
            ElementKind::Measurement => Kind::Measurement,
            ElementKind::Offset => Kind::Offset,
            ElementKind::Any => return None,
        })
    }
}

/// Type tag of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Number,
    Boolean,
    String,
    None,
    Variable,
    Alias,
    Date,
    Offset,
    Measurement,
    Vector(ElementKind),
    Matrix(ElementKind),
    DataFrame,
    Network,
    Node,
    Edge,
    Plot,
    LpModel,
    Bound,
    StatTest,
    Function,
    Macro,
}

impl Kind {
    pub const LIST: Kind = Kind::Vector(ElementKind::Any);

    /// Resolves a type name, with an optional element argument for
    /// `Vector<...>` and `Matrix<...>`.
    pub fn parse(name: &str, element: Option<&str>) -> Option<Kind> {
        let element_kind = match element {
            Some(inner) => Some(match Kind::parse(inner, None)? {
                Kind::Vector(ElementKind::Any) => ElementKind::Any,
                other => ElementKind::of(other)?,
            }),
            None => None,
        };
        let kind = match name {
            "Number" => Kind::Number,
            "Boolean" | "Bool" => Kind::Boolean,
            "String" => Kind::String,
            "None" => Kind::None,
            "Variable" => Kind::Variable,
            "Alias" => Kind::Alias,
            "Date" => Kind::Date,
            "Offset" => Kind::Offset,
            "Measurement" => Kind::Measurement,
            "Any" | "List" => Kind::LIST,
            "Vector" => Kind::Vector(element_kind.unwrap_or(ElementKind::Any)),
            "Matrix" => match element_kind.unwrap_or(ElementKind::Number) {
                ElementKind::Number => Kind::Matrix(ElementKind::Number),
                ElementKind::Variable => Kind::Matrix(ElementKind::Variable),
                _ => return None,
            },
            "DataFrame" | "Table" => Kind::DataFrame,
            "Network" => Kind::Network,
            "Node" => Kind::Node,
            "Edge" => Kind::Edge,
            "Plot" => Kind::Plot,
            "LPModel" | "Model" => Kind::LpModel,
            "Bound" => Kind::Bound,
            "StatTest" | "TestResult" => Kind::StatTest,
            "Function" => Kind::Function,
            "Macro" => Kind::Macro,
            _ => return None,
        };
        if element_kind.is_some() && !matches!(kind, Kind::Vector(_) | Kind::Matrix(_)) {
            return None;
        }
        Some(kind)
    }

    /// Kinds that can live in the symbol table and be compared structurally.
    pub fn is_storable(self) -> bool {
        !matches!(self, Kind::Function | Kind::Macro)
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Some(kind) => write!(f, "{kind}"),
            None => write!(f, "Any"),
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Number => write!(f, "Number"),
            Kind::Boolean => write!(f, "Boolean"),
            Kind::String => write!(f, "String"),
            Kind::None => write!(f, "None"),
            Kind::Variable => write!(f, "Variable"),
            Kind::Alias => write!(f, "Alias"),
            Kind::Date => write!(f, "Date"),
            Kind::Offset => write!(f, "Offset"),
            Kind::Measurement => write!(f, "Measurement"),
            Kind::Vector(ElementKind::Any) => write!(f, "List"),
            Kind::Vector(element) => write!(f, "Vector<{element}>"),
            Kind::Matrix(element) => write!(f, "Matrix<{element}>"),
            Kind::DataFrame => write!(f, "DataFrame"),
            Kind::Network => write!(f, "Network"),
            Kind::Node => write!(f, "Node"),
            Kind::Edge => write!(f, "Edge"),
            Kind::Plot => write!(f, "Plot"),
            Kind::LpModel => write!(f, "LPModel"),
            Kind::Bound => write!(f, "Bound"),
            Kind::StatTest => write!(f, "StatTest"),
            Kind::Function => write!(f, "Function"),
            Kind::Macro => write!(f, "Macro"),
        }
    }
}

/// Row metadata carried by an `Array` that holds a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    pub min: usize,
    pub max: usize,
}

impl RowBounds {
    pub fn is_rectangular(self) -> bool {
        self.min == self.max
    }
}

/// Vectors and matrices share one container. A matrix stores its rows as
/// vector values in `items` and records their width bounds in `rows`.
#[derive(Debug, Clone)]
pub struct Array {
    pub element: ElementKind,
    pub items: Vec<Value>,
    pub names: Option<Vec<String>>,
    pub rows: Option<RowBounds>,
}

impl Array {
    /// Builds a vector, inferring a homogeneous element kind. Mixed elements
    /// that are all castable to `Alias` become an alias vector; any other
    /// mixture degrades to a List. The flag reports such a degradation.
    pub fn vector(items: Vec<Value>) -> (Array, bool) {
        let mut kinds = items.iter().map(|item| item.kind());
        let uniform = match kinds.next() {
            Some(kind) => {
                let same = kinds.all(|other| other == kind);
                if same {
                    ElementKind::of(kind)
                } else {
                    None
                }
            }
            None => Some(ElementKind::Any),
        };
        if let Some(element) = uniform {
            return (Array::typed(element, items), false);
        }
        let mixed = {
            let mut distinct: Vec<Kind> = Vec::new();
            for item in &items {
                if !distinct.contains(&item.kind()) {
                    distinct.push(item.kind());
                }
            }
            distinct.len() > 1
        };
        if !items.is_empty() && items.iter().all(|item| item.castable_to(Kind::Alias)) {
            let cast: Vec<Value> = items
                .iter()
                .filter_map(|item| item.cast_to(Kind::Alias).ok())
                .collect();
            return (Array::typed(ElementKind::Alias, cast), false);
        }
        (Array::typed(ElementKind::Any, items), mixed)
    }

    pub fn typed(element: ElementKind, items: Vec<Value>) -> Array {
        Array {
            element,
            items,
            names: None,
            rows: None,
        }
    }

    /// Attaches slot names. Duplicate names invalidate the whole set and
    /// produce a warning instead of an error.
    pub fn with_names(mut self, names: Vec<String>) -> (Array, Option<Diagnostic>) {
        if names.len() != self.items.len() {
            return (self, None);
        }
        let mut seen: Vec<&String> = Vec::new();
        let mut duplicates: Vec<String> = Vec::new();
        for name in &names {
            if seen.contains(&name) {
                if !duplicates.contains(name) {
                    duplicates.push(name.clone());
                }
            } else {
                seen.push(name);
            }
        }
        if !duplicates.is_empty() {
            let warning = Diagnostic::warning(WarningCode::DuplicateNames)
                .with_str(duplicates.join(", "));
            self.names = None;
            return (self, Some(warning));
        }
        self.names = Some(names);
        (self, None)
    }

    /// Builds a matrix from rows of numbers or of variables. Returns `None`
    /// when the elements are not homogeneous matrix elements.
    pub fn matrix(rows: Vec<Vec<Value>>) -> Option<Array> {
        let element = {
            let mut cells = rows.iter().flatten();
            let first = cells.next()?.kind();
            let element = match first {
                Kind::Number => ElementKind::Number,
                Kind::Variable => ElementKind::Variable,
                _ => return None,
            };
            if !rows.iter().flatten().all(|cell| cell.kind() == first) {
                return None;
            }
            element
        };
        let min = rows.iter().map(Vec::len).min().unwrap_or(0);
        let max = rows.iter().map(Vec::len).max().unwrap_or(0);
        let items = rows
            .into_iter()
            .map(|row| Value::new(ValueKind::Array(Array::typed(element, row))))
            .collect();
        Some(Array {
            element,
            items,
            names: None,
            rows: Some(RowBounds { min, max }),
        })
    }

    pub fn is_matrix(&self) -> bool {
        self.rows.is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn kind(&self) -> Kind {
        if self.rows.is_some() {
            Kind::Matrix(self.element)
        } else {
            Kind::Vector(self.element)
        }
    }

    pub fn name_index(&self, name: &str) -> Option<usize> {
        self.names
            .as_ref()
            .and_then(|names| names.iter().position(|candidate| candidate == name))
    }

    /// Row `index` (0-based) of a matrix as a slice of cells.
    pub fn row(&self, index: usize) -> Option<&[Value]> {
        match self.items.get(index).map(|row| row.kind.as_ref()) {
            Some(ValueKind::Array(row)) => Some(&row.items),
            _ => None,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Value> {
        self.row(row).and_then(|cells| cells.get(col))
    }

    pub fn numbers(&self) -> Option<Vec<f64>> {
        self.items.iter().map(Value::as_number).collect()
    }

    /// Matrix cells as numbers, row-major, when the matrix is rectangular.
    pub fn number_grid(&self) -> Option<Vec<Vec<f64>>> {
        let bounds = self.rows?;
        if !bounds.is_rectangular() {
            return None;
        }
        (0..self.items.len())
            .map(|r| self.row(r)?.iter().map(Value::as_number).collect())
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<String>,
    pub body: Rc<Expr>,
    pub free_names: Vec<String>,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    Number(f64),
    Boolean(bool),
    String(String),
    None,
    Variable(String),
    Alias(Alias),
    Date(NaiveDate),
    Offset(Offset),
    Measurement(Measurement),
    Array(Array),
    DataFrame(DataFrame),
    Network(Network),
    Node(Node),
    Edge(Edge),
    Plot(Plot),
    LpModel(LpModel),
    Bound(Bound),
    StatTest(StatTestResult),
    Function(UserFunction),
    Macro(String),
}

/// Binding name, source location and provenance carried by every value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    pub name: Option<String>,
    pub span: SourceSpan,
    pub line: Option<LineId>,
    pub provenance: Provenance,
}

#[derive(Clone)]
pub struct Value {
    pub kind: Rc<ValueKind>,
    pub meta: Meta,
}

impl Value {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind: Rc::new(kind),
            meta: Meta::default(),
        }
    }

    pub fn number(value: f64) -> Self {
        Self::new(ValueKind::Number(value))
    }

    pub fn boolean(value: bool) -> Self {
        Self::new(ValueKind::Boolean(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    pub fn none() -> Self {
        Self::new(ValueKind::None)
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(ValueKind::Variable(name.into()))
    }

    pub fn alias(alias: Alias) -> Self {
        Self::new(ValueKind::Alias(alias))
    }

    pub fn date(date: NaiveDate) -> Self {
        Self::new(ValueKind::Date(date))
    }

    pub fn offset(offset: Offset) -> Self {
        Self::new(ValueKind::Offset(offset))
    }

    pub fn measurement(measurement: Measurement) -> Self {
        Self::new(ValueKind::Measurement(measurement))
    }

    pub fn array(array: Array) -> Self {
        Self::new(ValueKind::Array(array))
    }

    /// A vector with an inferred element kind; see [`Array::vector`].
    pub fn vector(items: Vec<Value>) -> Self {
        Self::array(Array::vector(items).0)
    }

    pub fn numbers(values: impl IntoIterator<Item = f64>) -> Self {
        Self::array(Array::typed(
            ElementKind::Number,
            values.into_iter().map(Value::number).collect(),
        ))
    }

    pub fn strings(values: impl IntoIterator<Item = String>) -> Self {
        Self::array(Array::typed(
            ElementKind::String,
            values.into_iter().map(Value::string).collect(),
        ))
    }

    pub fn number_matrix(rows: &[Vec<f64>]) -> Self {
        let cells = rows
            .iter()
            .map(|row| row.iter().copied().map(Value::number).collect())
            .collect();
        match Array::matrix(cells) {
            Some(array) => Self::array(array),
            None => Self::array(Array {
                element: ElementKind::Number,
                items: Vec::new(),
                names: None,
                rows: Some(RowBounds { min: 0, max: 0 }),
            }),
        }
    }

    pub fn kind(&self) -> Kind {
        match &*self.kind {
            ValueKind::Number(_) => Kind::Number,
            ValueKind::Boolean(_) => Kind::Boolean,
            ValueKind::String(_) => Kind::String,
            ValueKind::None => Kind::None,
            ValueKind::Variable(_) => Kind::Variable,
            ValueKind::Alias(_) => Kind::Alias,
            ValueKind::Date(_) => Kind::Date,
            ValueKind::Offset(_) => Kind::Offset,
            ValueKind::Measurement(_) => Kind::Measurement,
            ValueKind::Array(array) => array.kind(),
            ValueKind::DataFrame(_) => Kind::DataFrame,
            ValueKind::Network(_) => Kind::Network,
            ValueKind::Node(_) => Kind::Node,
            ValueKind::Edge(_) => Kind::Edge,
            ValueKind::Plot(_) => Kind::Plot,
            ValueKind::LpModel(_) => Kind::LpModel,
            ValueKind::Bound(_) => Kind::Bound,
            ValueKind::StatTest(_) => Kind::StatTest,
            ValueKind::Function(_) => Kind::Function,
            ValueKind::Macro(_) => Kind::Macro,
        }
    }

    pub fn type_name(&self) -> String {
        self.kind().to_string()
    }

    /// The binding name when present, otherwise the rendered value.
    pub fn label(&self) -> String {
        match &self.meta.name {
            Some(name) => name.clone(),
            None => self.to_string(),
        }
    }

    /// Copy of this value attributed to a new source location.
    pub fn clone_at(&self, span: SourceSpan) -> Value {
        let mut copy = self.clone();
        copy.meta.span = span;
        copy
    }

    pub fn at(mut self, span: SourceSpan, provenance: Provenance) -> Value {
        self.meta.span = span;
        self.meta.provenance = provenance;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Value {
        self.meta.name = Some(name.into());
        self
    }

    pub fn unnamed(mut self) -> Value {
        self.meta.name = None;
        self
    }

    pub fn on_line(mut self, line: LineId) -> Value {
        self.meta.line = Some(line);
        self
    }

    pub fn as_number(&self) -> Option<f64> {
        match &*self.kind {
            ValueKind::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match &*self.kind {
            ValueKind::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &*self.kind {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match &*self.kind {
            ValueKind::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&Array> {
        self.as_array().filter(|array| !array.is_matrix())
    }

    pub fn is_integral(&self) -> bool {
        self.as_number().is_some_and(is_integral)
    }

    pub fn castable_to(&self, target: Kind) -> bool {
        self.cast_to(target).is_ok()
    }

    /// The only coercion path between kinds. Casting to the value's own kind
    /// returns it unchanged; an impossible cast is a typed error.
    pub fn cast_to(&self, target: Kind) -> Result<Value, Diagnostic> {
        let source = self.kind();
        if source == target {
            return Ok(self.clone());
        }
        let kind = self.cast_kind(source, target).ok_or_else(|| {
            Diagnostic::error(ErrorCode::InvalidCast)
                .with_value(self)
                .with_kind(target)
        })?;
        Ok(Value {
            kind: Rc::new(kind),
            meta: self.meta.clone(),
        })
    }

    fn cast_kind(&self, source: Kind, target: Kind) -> Option<ValueKind> {
        if target == Kind::String && source.is_storable() {
            return Some(ValueKind::String(match &*self.kind {
                ValueKind::String(s) => s.clone(),
                _ => self.to_string(),
            }));
        }
        match (&*self.kind, target) {
            (ValueKind::Number(n), Kind::Boolean) => {
                if approx_eq(*n, 0.0) {
                    Some(ValueKind::Boolean(false))
                } else if approx_eq(*n, 1.0) {
                    Some(ValueKind::Boolean(true))
                } else {
                    None
                }
            }
            (ValueKind::Number(n), Kind::Alias) => Some(ValueKind::Alias(Alias::constant(*n))),
            (ValueKind::Number(n), Kind::Measurement) => {
                Some(ValueKind::Measurement(Measurement::dimensionless(*n)))
            }
            (ValueKind::Number(n), Kind::Offset) if is_integral(*n) => {
                Some(ValueKind::Offset(Offset::days(n.round() as i64)))
            }
            (ValueKind::Boolean(b), Kind::Number) => {
                Some(ValueKind::Number(if *b { 1.0 } else { 0.0 }))
            }
            (ValueKind::String(s), Kind::Number) => {
                s.trim().parse::<f64>().ok().map(ValueKind::Number)
            }
            (ValueKind::String(s), Kind::Boolean) => match s.trim() {
                "true" => Some(ValueKind::Boolean(true)),
                "false" => Some(ValueKind::Boolean(false)),
                _ => None,
            },
            (ValueKind::String(s), Kind::Date) => dates::parse_date(s).map(ValueKind::Date),
            (ValueKind::Variable(name), Kind::Alias) => {
                Some(ValueKind::Alias(Alias::variable(name.clone())))
            }
            (ValueKind::Alias(alias), Kind::Number) => alias.as_constant().map(ValueKind::Number),
            (ValueKind::Alias(alias), Kind::Variable) => {
                alias.as_variable().map(|name| ValueKind::Variable(name.to_string()))
            }
            (ValueKind::Offset(offset), Kind::Number) if offset.months == 0 => {
                Some(ValueKind::Number(offset.days as f64))
            }
            (ValueKind::Offset(offset), Kind::Measurement) if offset.months == 0 => {
                Measurement::from_unit(offset.days as f64, "d")
                    .ok()
                    .map(ValueKind::Measurement)
            }
            (ValueKind::Measurement(m), Kind::Number) if m.is_dimensionless() => {
                Some(ValueKind::Number(m.si_value()))
            }
            (ValueKind::Measurement(m), Kind::Offset) => m
                .as_whole_days()
                .map(|days| ValueKind::Offset(Offset::days(days))),
            (ValueKind::Array(array), Kind::Vector(element)) => {
                self.cast_array(array, element).map(ValueKind::Array)
            }
            (ValueKind::Array(array), Kind::Matrix(element)) if !array.is_matrix() => {
                let mut rows = Vec::with_capacity(array.items.len());
                for item in &array.items {
                    let row = item.as_vector()?;
                    rows.push(row.items.clone());
                }
                let matrix = Array::matrix(rows)?;
                (matrix.element == element).then_some(ValueKind::Array(matrix))
            }
            _ => None,
        }
    }

    fn cast_array(&self, array: &Array, element: ElementKind) -> Option<Array> {
        if array.is_matrix() {
            return (element == ElementKind::Any).then(|| Array {
                element: ElementKind::Any,
                items: array.items.clone(),
                names: None,
                rows: None,
            });
        }
        let items = match element.kind() {
            None => array.items.clone(),
            Some(kind) => array
                .items
                .iter()
                .map(|item| item.cast_to(kind).ok())
                .collect::<Option<Vec<_>>>()?,
        };
        Some(Array {
            element,
            items,
            names: array.names.clone(),
            rows: None,
        })
    }

    /// Compares two values. With `with_reference` only the binding names are
    /// compared; otherwise values are compared structurally. `strict`
    /// requires identical kinds; otherwise `other` is cast to this value's
    /// kind first when possible.
    pub fn equals(&self, other: &Value, with_reference: bool, strict: bool) -> bool {
        if with_reference {
            return match (&self.meta.name, &other.meta.name) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            };
        }
        if self.kind() != other.kind() {
            if strict {
                return false;
            }
            return match other.cast_to(self.kind()) {
                Ok(cast) => self.structurally_equal(&cast),
                Err(_) => false,
            };
        }
        self.structurally_equal(other)
    }

    fn structurally_equal(&self, other: &Value) -> bool {
        match (&*self.kind, &*other.kind) {
            (ValueKind::Number(a), ValueKind::Number(b)) => approx_eq(*a, *b),
            (ValueKind::Boolean(a), ValueKind::Boolean(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::None, ValueKind::None) => true,
            (ValueKind::Variable(a), ValueKind::Variable(b)) => a == b,
            (ValueKind::Alias(a), ValueKind::Alias(b)) => a.approx_eq(b),
            (ValueKind::Date(a), ValueKind::Date(b)) => a == b,
            (ValueKind::Offset(a), ValueKind::Offset(b)) => a == b,
            (ValueKind::Measurement(a), ValueKind::Measurement(b)) => a.approx_eq(b),
            (ValueKind::Array(a), ValueKind::Array(b)) => {
                a.rows == b.rows
                    && a.items.len() == b.items.len()
                    && (a.names.is_none() || b.names.is_none() || a.names == b.names)
                    && a
                        .items
                        .iter()
                        .zip(b.items.iter())
                        .all(|(l, r)| l.equals(r, false, true))
            }
            (ValueKind::DataFrame(a), ValueKind::DataFrame(b)) => a.approx_eq(b),
            (ValueKind::Network(a), ValueKind::Network(b)) => a == b,
            (ValueKind::Node(a), ValueKind::Node(b)) => a == b,
            (ValueKind::Edge(a), ValueKind::Edge(b)) => a == b,
            (ValueKind::Plot(a), ValueKind::Plot(b)) => a == b,
            (ValueKind::LpModel(a), ValueKind::LpModel(b)) => a.approx_eq(b),
            (ValueKind::Bound(a), ValueKind::Bound(b)) => a.approx_eq(b),
            (ValueKind::StatTest(a), ValueKind::StatTest(b)) => a.approx_eq(b),
            (ValueKind::Function(a), ValueKind::Function(b)) => {
                a.name == b.name && a.params == b.params && a.text == b.text
            }
            (ValueKind::Macro(a), ValueKind::Macro(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.meta.name {
            Some(name) => write!(f, "{name} = {self} : {}", self.kind()),
            None => write!(f, "{self} : {}", self.kind()),
        }
    }
}

/// Renders a number without trailing noise.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".into();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf".into() } else { "-inf".into() };
    }
    if is_integral(n) && n.abs() < 1e15 {
        let rounded = n.round();
        return if rounded == 0.0 {
            "0".into()
        } else {
            format!("{rounded:.0}")
        };
    }
    let text = format!("{n:.10}");
    let trimmed = text.trim_end_matches('0').trim_end_matches('.');
    if trimmed == "0" || trimmed == "-0" {
        format!("{n:e}")
    } else {
        trimmed.to_string()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.kind {
            ValueKind::Number(n) => write!(f, "{}", format_number(*n)),
            ValueKind::Boolean(b) => write!(f, "{b}"),
            ValueKind::String(s) => write!(f, "\"{s}\""),
            ValueKind::None => write!(f, "none"),
            ValueKind::Variable(name) => write!(f, "{name}"),
            ValueKind::Alias(alias) => write!(f, "{alias}"),
            ValueKind::Date(date) => write!(f, "@{}", date.format("%Y-%m-%d")),
            ValueKind::Offset(offset) => write!(f, "{offset}"),
            ValueKind::Measurement(m) => write!(f, "{m}"),
            ValueKind::Array(array) => {
                write!(f, "[")?;
                for (idx, item) in array.items.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    match array.names.as_ref().and_then(|names| names.get(idx)) {
                        Some(name) => write!(f, "{name}: {item}")?,
                        None => write!(f, "{item}")?,
                    }
                }
                write!(f, "]")
            }
            ValueKind::DataFrame(frame) => write!(f, "{frame}"),
            ValueKind::Network(network) => write!(f, "{network}"),
            ValueKind::Node(node) => write!(f, "{node}"),
            ValueKind::Edge(edge) => write!(f, "{edge}"),
            ValueKind::Plot(plot) => write!(f, "{plot}"),
            ValueKind::LpModel(model) => write!(f, "{model}"),
            ValueKind::Bound(bound) => write!(f, "{bound}"),
            ValueKind::StatTest(result) => write!(f, "{result}"),
            ValueKind::Function(fun) => write!(f, "{}({})", fun.name, fun.params.join(", ")),
            ValueKind::Macro(name) => write!(f, "{name}!"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_numbers_and_variables_become_alias_vector() {
        let (array, degraded) = Array::vector(vec![Value::number(1.0), Value::variable("x")]);
        assert_eq!(array.kind(), Kind::Vector(ElementKind::Alias));
        assert!(!degraded);
    }

    #[test]
    fn mixed_strings_and_numbers_degrade_to_list() {
        let (array, degraded) = Array::vector(vec![Value::number(1.0), Value::string("a")]);
        assert_eq!(array.kind(), Kind::LIST);
        assert!(degraded);
    }

    #[test]
    fn duplicate_names_drop_the_name_set() {
        let (array, _) = Array::vector(vec![Value::number(1.0), Value::number(2.0)]);
        let (array, warning) = array.with_names(vec!["a".into(), "a".into()]);
        assert!(array.names.is_none());
        assert!(warning.is_some());
    }

    #[test]
    fn cast_is_idempotent() {
        let value = Value::number(3.0);
        let once = value.cast_to(Kind::Alias).expect("number to alias");
        let twice = once.cast_to(Kind::Alias).expect("alias to alias");
        assert!(once.equals(&twice, false, true));
    }

    #[test]
    fn invalid_cast_is_an_error() {
        let err = Value::string("abc")
            .cast_to(Kind::Number)
            .expect_err("not a number");
        assert!(err.is_error(ErrorCode::InvalidCast));
    }

    #[test]
    fn typed_vector_cast_requires_every_element() {
        let list = Value::vector(vec![Value::string("1"), Value::string("x")]);
        assert!(!list.castable_to(Kind::Vector(ElementKind::Number)));
        let list = Value::vector(vec![Value::string("1"), Value::string("2")]);
        let numbers = list
            .cast_to(Kind::Vector(ElementKind::Number))
            .expect("castable");
        assert_eq!(numbers.kind(), Kind::Vector(ElementKind::Number));
    }

    #[test]
    fn number_equality_uses_epsilon() {
        let a = Value::number(0.1 + 0.2);
        let b = Value::number(0.3);
        assert!(a.equals(&b, false, true));
    }

    #[test]
    fn reference_equality_compares_names() {
        let a = Value::number(1.0).named("a");
        let b = Value::number(1.0).named("b");
        assert!(!a.equals(&b, true, true));
        assert!(a.equals(&b, false, true));
    }

    #[test]
    fn ragged_matrix_tracks_bounds() {
        let matrix = Array::matrix(vec![
            vec![Value::number(1.0), Value::number(2.0)],
            vec![Value::number(3.0)],
        ])
        .expect("numeric rows");
        let bounds = matrix.rows.expect("matrix");
        assert_eq!((bounds.min, bounds.max), (1, 2));
        assert!(!bounds.is_rectangular());
    }

    #[test]
    fn parses_generic_kinds() {
        assert_eq!(
            Kind::parse("Vector", Some("Number")),
            Some(Kind::Vector(ElementKind::Number))
        );
        assert_eq!(Kind::parse("Matrix", Some("String")), None);
        assert_eq!(Kind::parse("List", None), Some(Kind::LIST));
    }

    #[test]
    fn formats_numbers_compactly() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(-2.5), "-2.5");
    }
}
