use std::cmp::Ordering;

use super::{Args, Module, Param, Produced, ANY, NUMBER, NUMBERS, STRING};
use crate::{
    diagnostics::{Diagnostic, ErrorCode, WarningCode},
    linear::{self, MatrixError},
    ops::{self, matrix_error},
    value::{format_number, ElementKind, Kind, Value, ValueKind},
};

const MATRIX: &[Kind] = &[Kind::Matrix(ElementKind::Number)];
const LIST: &[Kind] = &[Kind::LIST];

const UNARY: &[Param] = &[Param::required("x", ANY)];
const LOG: &[Param] = &[Param::required("x", ANY), Param::optional("base", NUMBER)];
const ROUND: &[Param] = &[Param::required("x", ANY), Param::optional("digits", NUMBER)];
const VALUES: &[Param] = &[Param::variadic("values", ANY)];
const SEQUENCE: &[Param] = &[Param::required("v", LIST)];
const JOIN: &[Param] = &[Param::required("v", LIST), Param::optional("separator", STRING)];
const SPLIT: &[Param] = &[Param::required("text", STRING), Param::optional("separator", STRING)];
const TEXT: &[Param] = &[Param::required("text", STRING)];
const PAIR: &[Param] = &[Param::required("a", NUMBERS), Param::required("b", NUMBERS)];
const MATRIX_ARG: &[Param] = &[Param::required("m", MATRIX)];
const PRODUCT: &[Param] = &[Param::required("a", MATRIX), Param::required("b", MATRIX)];
const SIZE: &[Param] = &[Param::required("n", NUMBER)];

pub(super) fn module() -> Module {
    let mut math = Module::new("math", true);
    math.constant("pi", std::f64::consts::PI);
    math.constant("tau", std::f64::consts::TAU);
    math.constant("e", std::f64::consts::E);
    math.constant("inf", f64::INFINITY);

    math.function("abs", UNARY, abs);
    math.function("sqrt", UNARY, |args| numeric(args, "sqrt", f64::sqrt));
    math.function("exp", UNARY, |args| numeric(args, "exp", f64::exp));
    math.function("ln", UNARY, |args| numeric(args, "ln", f64::ln));
    math.function("floor", UNARY, |args| numeric(args, "floor", f64::floor));
    math.function("ceil", UNARY, |args| numeric(args, "ceil", f64::ceil));
    math.function("sin", UNARY, |args| numeric(args, "sin", f64::sin));
    math.function("cos", UNARY, |args| numeric(args, "cos", f64::cos));
    math.function("tan", UNARY, |args| numeric(args, "tan", f64::tan));
    math.function("atan", UNARY, |args| numeric(args, "atan", f64::atan));
    math.function("log", LOG, log);
    math.function("round", ROUND, round);

    math.function("len", UNARY, len);
    math.function("sum", VALUES, |args| {
        Ok(Value::number(crate::stats::sum(&args.numbers()?)).into())
    });
    math.function("min", VALUES, |args| {
        crate::stats::min(&args.numbers()?)
            .map(|n| Value::number(n).into())
            .map_err(|err| args.stats_error(err))
    });
    math.function("max", VALUES, |args| {
        crate::stats::max(&args.numbers()?)
            .map(|n| Value::number(n).into())
            .map_err(|err| args.stats_error(err))
    });
    math.function("sort", SEQUENCE, sort);
    math.function("reverse", SEQUENCE, reverse);
    math.function("unique", SEQUENCE, unique);
    math.function("keys", UNARY, keys);

    math.function("join", JOIN, join);
    math.function("split", SPLIT, split);
    math.function("upper", TEXT, |args| {
        Ok(Value::string(args.string("text")?.to_uppercase()).into())
    });
    math.function("lower", TEXT, |args| {
        Ok(Value::string(args.string("text")?.to_lowercase()).into())
    });

    math.function("dot", PAIR, dot);
    math.function("transpose", MATRIX_ARG, |args| {
        with_grid(args, "m", "transpose", |grid| {
            linear::transpose(grid).map(|t| Value::number_matrix(&t))
        })
    });
    math.function("trace", MATRIX_ARG, |args| {
        with_grid(args, "m", "trace", |grid| linear::trace(grid).map(Value::number))
    });
    math.function("det", MATRIX_ARG, |args| {
        with_grid(args, "m", "determinant", |grid| {
            linear::determinant(grid).map(Value::number)
        })
    });
    math.function("inverse", MATRIX_ARG, |args| {
        with_grid(args, "m", "inverse", |grid| {
            linear::inverse(grid).map(|inv| Value::number_matrix(&inv))
        })
    });
    math.function("matmul", PRODUCT, |args| {
        ops::binary(crate::ast::BinaryOp::Mul, args.value("a")?, args.value("b")?).map(Produced::from)
    });
    math.function("identity", SIZE, identity);
    math
}

/// Applies `f` to a number, or element-wise to a vector or matrix.
fn numeric(args: &Args, name: &str, f: fn(f64) -> f64) -> Result<Produced, Diagnostic> {
    apply(args.value("x")?, name, f).map(Produced::from)
}

fn apply(value: &Value, name: &str, f: fn(f64) -> f64) -> Result<Value, Diagnostic> {
    match &*value.kind {
        ValueKind::Number(n) => {
            let result = f(*n);
            if result.is_nan() || (n.is_finite() && result.is_infinite()) {
                return Err(Diagnostic::error(ErrorCode::MathDomain)
                    .with_str(name)
                    .with_value(value));
            }
            Ok(Value::number(result))
        }
        ValueKind::Array(array) => {
            let items = array
                .items
                .iter()
                .map(|item| apply(item, name, f))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ops::rebuild(array, items))
        }
        _ => Err(Diagnostic::error(ErrorCode::ArgumentType)
            .with_str("x")
            .with_str(name)
            .with_kind(Kind::Number)
            .with_value(value)),
    }
}

fn abs(args: &Args) -> Result<Produced, Diagnostic> {
    let value = args.value("x")?;
    match &*value.kind {
        ValueKind::Measurement(m) if m.value() < 0.0 => Ok(Value::measurement(m.scale(-1.0)).into()),
        ValueKind::Measurement(_) => Ok(value.clone().unnamed().into()),
        _ => numeric(args, "abs", f64::abs),
    }
}

fn log(args: &Args) -> Result<Produced, Diagnostic> {
    let base = args.number_or("base", 10.0)?;
    if base <= 0.0 || (base - 1.0).abs() < f64::EPSILON {
        return Err(Diagnostic::error(ErrorCode::MathDomain)
            .with_str("log base")
            .with_value(args.value("base")?));
    }
    let value = apply(args.value("x")?, "log", f64::ln)?;
    ops::binary(crate::ast::BinaryOp::Div, &value, &Value::number(base.ln())).map(Produced::from)
}

fn round(args: &Args) -> Result<Produced, Diagnostic> {
    let digits = match args.get("digits") {
        Some(_) => args.integer("digits")?,
        None => 0,
    };
    let value = args.value("x")?;
    let factor = 10f64.powi(digits as i32);
    if let ValueKind::Measurement(m) = &*value.kind {
        if m.value() == 0.0 {
            return Ok(value.clone().unnamed().into());
        }
        let rounded = (m.value() * factor).round() / factor;
        return Ok(Value::measurement(m.scale(rounded / m.value())).into());
    }
    match &*value.kind {
        ValueKind::Number(n) => Ok(Value::number((n * factor).round() / factor).into()),
        _ => numeric(args, "round", f64::round),
    }
}

fn len(args: &Args) -> Result<Produced, Diagnostic> {
    let value = args.value("x")?;
    let n = match &*value.kind {
        ValueKind::Array(array) => array.len(),
        ValueKind::String(text) => text.chars().count(),
        ValueKind::DataFrame(frame) => frame.height(),
        ValueKind::Network(network) => network.nodes().count(),
        _ => {
            return Err(Diagnostic::error(ErrorCode::NotIterable)
                .with_value(value)
                .with_kind(value.kind()))
        }
    };
    Ok(Value::number(n as f64).into())
}

fn compare_items(a: &Value, b: &Value) -> Option<Ordering> {
    match (&*a.kind, &*b.kind) {
        (ValueKind::Number(x), ValueKind::Number(y)) => Some(x.total_cmp(y)),
        (ValueKind::String(x), ValueKind::String(y)) => Some(x.cmp(y)),
        (ValueKind::Date(x), ValueKind::Date(y)) => Some(x.cmp(y)),
        (ValueKind::Boolean(x), ValueKind::Boolean(y)) => Some(x.cmp(y)),
        (ValueKind::Measurement(x), ValueKind::Measurement(y)) if x.dim() == y.dim() => {
            Some(x.si_value().total_cmp(&y.si_value()))
        }
        _ => None,
    }
}

fn sort(args: &Args) -> Result<Produced, Diagnostic> {
    let value = args.value("v")?;
    let array = value.as_array().ok_or_else(|| args.type_error("v", Kind::LIST, value))?;
    let mut items: Vec<Value> = array.items.clone();
    for pair in items.windows(2) {
        if compare_items(&pair[0], &pair[1]).is_none() {
            return Err(Diagnostic::error(ErrorCode::InvalidOperand)
                .with_str("sort")
                .with_kind(pair[0].kind())
                .with_kind(pair[1].kind())
                .marking(value));
        }
    }
    items.sort_by(|a, b| compare_items(a, b).unwrap_or(Ordering::Equal));
    Ok(Value::vector(items).into())
}

fn reverse(args: &Args) -> Result<Produced, Diagnostic> {
    let value = args.value("v")?;
    let array = value.as_array().ok_or_else(|| args.type_error("v", Kind::LIST, value))?;
    let mut reversed = array.clone();
    reversed.items.reverse();
    if let Some(names) = reversed.names.as_mut() {
        names.reverse();
    }
    Ok(Value::array(reversed).into())
}

fn unique(args: &Args) -> Result<Produced, Diagnostic> {
    let value = args.value("v")?;
    let array = value.as_array().ok_or_else(|| args.type_error("v", Kind::LIST, value))?;
    let mut kept: Vec<Value> = Vec::new();
    for item in &array.items {
        if !kept.iter().any(|seen| seen.equals(item, false, true)) {
            kept.push(item.clone());
        }
    }
    Ok(Value::vector(kept).into())
}

fn keys(args: &Args) -> Result<Produced, Diagnostic> {
    let value = args.value("x")?;
    match ops::key_names(value) {
        Some(names) => Ok(Value::strings(names).into()),
        None => Ok(Produced::from(Value::strings(Vec::new()))
            .warn(Diagnostic::warning(WarningCode::NoNamedIndices).with_value(value))),
    }
}

fn plain(value: &Value) -> String {
    match &*value.kind {
        ValueKind::String(text) => text.clone(),
        ValueKind::Number(n) => format_number(*n),
        _ => value.to_string(),
    }
}

fn join(args: &Args) -> Result<Produced, Diagnostic> {
    let value = args.value("v")?;
    let array = value.as_array().ok_or_else(|| args.type_error("v", Kind::LIST, value))?;
    let separator = args.string_or("separator", ", ")?;
    let parts: Vec<String> = array.items.iter().map(plain).collect();
    Ok(Value::string(parts.join(separator)).into())
}

fn split(args: &Args) -> Result<Produced, Diagnostic> {
    let text = args.string("text")?;
    let parts: Vec<String> = match args.get("separator") {
        Some(_) => {
            let separator = args.string("separator")?;
            if separator.is_empty() {
                text.chars().map(String::from).collect()
            } else {
                text.split(separator).map(String::from).collect()
            }
        }
        None => text.split_whitespace().map(String::from).collect(),
    };
    Ok(Value::strings(parts).into())
}

fn dot(args: &Args) -> Result<Produced, Diagnostic> {
    let (a, b) = (args.vector_numbers("a")?, args.vector_numbers("b")?);
    let right = args.value("b")?;
    linear::dot(&a, &b)
        .map(|n| Value::number(n).into())
        .map_err(|err| matrix_error(err, "dot product", right))
}

fn with_grid(
    args: &Args,
    param: &str,
    operation: &str,
    f: impl FnOnce(&[Vec<f64>]) -> Result<Value, MatrixError>,
) -> Result<Produced, Diagnostic> {
    let value = args.value(param)?;
    let grid = value
        .as_array()
        .and_then(|array| array.number_grid())
        .ok_or_else(|| matrix_error(MatrixError::NotRectangular, operation, value))?;
    f(&grid)
        .map(Produced::from)
        .map_err(|err| matrix_error(err, operation, value))
}

/// Cells a constructed identity matrix may hold.
const MAX_CELLS: usize = 100_000;

fn identity(args: &Args) -> Result<Produced, Diagnostic> {
    let n = args.integer("n")?;
    if n < 1 {
        return Err(Diagnostic::error(ErrorCode::MathDomain)
            .with_str("identity")
            .with_value(args.value("n")?));
    }
    let n = n as usize;
    if n.checked_mul(n).map_or(true, |cells| cells > MAX_CELLS) {
        return Err(Diagnostic::error(ErrorCode::RangeTooLarge)
            .with_str(MAX_CELLS.to_string())
            .with_value(args.value("n")?));
    }
    let grid: Vec<Vec<f64>> = (0..n)
        .map(|r| (0..n).map(|c| if r == c { 1.0 } else { 0.0 }).collect())
        .collect();
    Ok(Value::number_matrix(&grid).into())
}
