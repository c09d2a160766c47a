use std::cmp::Ordering;

use crate::{
    ast::{BinaryOp, UnaryOp},
    dates::{self, Offset},
    diagnostics::{Diagnostic, ErrorCode},
    linear::{self, Alias, Bound, MatrixError, Relation},
    units::{Measurement, UnitError},
    value::{approx_eq, is_integral, Array, ElementKind, Kind, Value, ValueKind},
};

type OpResult = Result<Value, Diagnostic>;

fn invalid(op: BinaryOp, left: &Value, right: &Value) -> Diagnostic {
    Diagnostic::error(ErrorCode::InvalidOperand)
        .with_str(op.symbol())
        .with_kind(left.kind())
        .with_kind(right.kind())
        .marking(left)
        .marking(right)
}

pub(crate) fn matrix_error(error: MatrixError, operation: &str, value: &Value) -> Diagnostic {
    match error {
        MatrixError::NotSquare => {
            Diagnostic::error(ErrorCode::MatrixNotSquare).with_str(operation).marking(value)
        }
        MatrixError::NotRectangular => Diagnostic::error(ErrorCode::MatrixNotRectangular)
            .with_str(operation)
            .marking(value),
        MatrixError::Singular => Diagnostic::error(ErrorCode::MatrixSingular).with_value(value),
        MatrixError::Mismatch => Diagnostic::error(ErrorCode::DimensionMismatch)
            .with_str(format!("{operation} of incompatible shapes"))
            .marking(value),
    }
}

fn unit_error(error: UnitError, left: &Value, right: &Value) -> Diagnostic {
    match error {
        UnitError::DimensionMismatch { .. } => Diagnostic::error(ErrorCode::UnitMismatch)
            .with_value(left)
            .with_value(right),
        UnitError::DivisionByZero => Diagnostic::error(ErrorCode::DivisionByZero).with_value(left),
        UnitError::Overflow => Diagnostic::error(ErrorCode::UnitOverflow)
            .with_value(left)
            .marking(right),
        UnitError::Unknown(symbol) | UnitError::Malformed(symbol) => {
            Diagnostic::error(ErrorCode::UnknownUnit)
                .with_str(symbol)
                .marking(right)
        }
    }
}

/// Applies an arithmetic, comparison or logical operator.
pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    use BinaryOp::*;
    match op {
        Add | Sub | Mul | Div | Mod | Pow => arithmetic(op, left, right),
        Equal | NotEqual | Less | LessEqual | Greater | GreaterEqual => compare(op, left, right),
        And | Or => logical(op, left, right),
        In => membership(left, right),
        Keyof => match key_names(right) {
            Some(names) => match left.as_str() {
                Some(key) => Ok(Value::boolean(names.iter().any(|name| name == key))),
                None => Err(invalid(op, left, right)),
            },
            None => Ok(Value::boolean(false)),
        },
    }
}

/// Named indices a value exposes, or `None` when it has none at all.
pub fn key_names(value: &Value) -> Option<Vec<String>> {
    match &*value.kind {
        ValueKind::Array(array) => array.names.clone(),
        ValueKind::DataFrame(frame) => Some(frame.column_names().map(String::from).collect()),
        ValueKind::StatTest(result) => Some(
            crate::stats::StatTestResult::FIELDS
                .iter()
                .filter(|field| result.field(field).is_some())
                .map(|field| field.to_string())
                .collect(),
        ),
        _ => None,
    }
}

fn is_linear(value: &Value) -> bool {
    matches!(
        &*value.kind,
        ValueKind::Variable(_) | ValueKind::Alias(_)
    )
}

fn as_alias(value: &Value) -> Option<Alias> {
    match &*value.kind {
        ValueKind::Alias(alias) => Some(alias.clone()),
        ValueKind::Variable(name) => Some(Alias::variable(name.clone())),
        ValueKind::Number(n) => Some(Alias::constant(*n)),
        _ => None,
    }
}

fn alias_value(alias: Alias) -> Value {
    match (alias.as_variable(), alias.as_constant()) {
        (_, Some(constant)) => Value::number(constant),
        (Some(name), None) => Value::variable(name),
        (None, None) => Value::alias(alias),
    }
}

fn measurement_value(m: Measurement) -> Value {
    if m.is_dimensionless() && m.unit_text().is_empty() {
        Value::number(m.si_value())
    } else {
        Value::measurement(m)
    }
}

fn as_measurement(value: &Value) -> Option<Measurement> {
    match &*value.kind {
        ValueKind::Measurement(m) => Some(m.clone()),
        ValueKind::Number(n) => Some(Measurement::dimensionless(*n)),
        _ => None,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    use BinaryOp::*;
    match (&*left.kind, &*right.kind) {
        (ValueKind::Number(a), ValueKind::Number(b)) => number_op(op, *a, *b, left, right),
        (ValueKind::String(a), ValueKind::String(b)) if op == Add => {
            Ok(Value::string(format!("{a}{b}")))
        }
        (ValueKind::Array(_), _) | (_, ValueKind::Array(_)) => array_op(op, left, right),
        (ValueKind::Measurement(_), ValueKind::Measurement(_) | ValueKind::Number(_))
        | (ValueKind::Number(_), ValueKind::Measurement(_)) => measurement_op(op, left, right),
        (ValueKind::Date(_), _) | (_, ValueKind::Date(_)) => date_op(op, left, right),
        (ValueKind::Offset(a), ValueKind::Offset(b)) => {
            let offset = match op {
                Add => a.checked_add(*b),
                Sub => a.checked_sub(*b),
                _ => return Err(invalid(op, left, right)),
            };
            offset_value(offset, left, right)
        }
        (ValueKind::Offset(a), ValueKind::Number(n)) | (ValueKind::Number(n), ValueKind::Offset(a))
            if op == Mul && is_integral(*n) =>
        {
            let factor = i64_of(*n);
            offset_value(factor.and_then(|factor| a.checked_scale(factor)), left, right)
        }
        _ if is_linear(left) || is_linear(right) => alias_op(op, left, right),
        _ => Err(invalid(op, left, right)),
    }
}

/// An integral float as `i64`, or `None` outside its range.
fn i64_of(n: f64) -> Option<i64> {
    let rounded = n.round();
    (rounded >= i64::MIN as f64 && rounded < i64::MAX as f64).then_some(rounded as i64)
}

fn offset_value(offset: Option<Offset>, left: &Value, right: &Value) -> OpResult {
    offset.map(Value::offset).ok_or_else(|| {
        Diagnostic::error(ErrorCode::OffsetOverflow)
            .with_value(left)
            .marking(right)
    })
}

fn number_op(op: BinaryOp, a: f64, b: f64, left: &Value, right: &Value) -> OpResult {
    use BinaryOp::*;
    let result = match op {
        Add => a + b,
        Sub => a - b,
        Mul => a * b,
        Div => {
            if b == 0.0 {
                return Err(Diagnostic::error(ErrorCode::DivisionByZero)
                    .with_value(left)
                    .marking(right));
            }
            a / b
        }
        Mod => {
            if b == 0.0 {
                return Err(Diagnostic::error(ErrorCode::ModuloByZero)
                    .with_value(left)
                    .marking(right));
            }
            a.rem_euclid(b)
        }
        Pow => {
            let result = a.powf(b);
            if result.is_nan() {
                return Err(Diagnostic::error(ErrorCode::MathDomain)
                    .with_str("^")
                    .with_value(left)
                    .marking(right));
            }
            result
        }
        _ => return Err(invalid(op, left, right)),
    };
    Ok(Value::number(result))
}

fn measurement_op(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    use BinaryOp::*;
    let (Some(a), Some(b)) = (as_measurement(left), as_measurement(right)) else {
        return Err(invalid(op, left, right));
    };
    let result = match op {
        Add => a.add(&b),
        Sub => a.sub(&b),
        Mul => a.mul(&b),
        Div => a.div(&b),
        Pow => {
            let exponent = right.as_number().filter(|n| is_integral(*n));
            match exponent {
                Some(n) => i64_of(n)
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or(UnitError::Overflow)
                    .and_then(|n| a.powi(n)),
                None => {
                    return Err(Diagnostic::error(ErrorCode::NonIntegerExponent)
                        .with_value(right)
                        .marking(left))
                }
            }
        }
        _ => return Err(invalid(op, left, right)),
    };
    result
        .map(measurement_value)
        .map_err(|error| unit_error(error, left, right))
}

fn date_op(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    use BinaryOp::*;
    let offset_of = |value: &Value| -> Option<Offset> {
        match &*value.kind {
            ValueKind::Offset(offset) => Some(*offset),
            ValueKind::Number(n) if is_integral(*n) => Some(Offset::days(n.round() as i64)),
            ValueKind::Measurement(m) => m.as_whole_days().map(Offset::days),
            _ => None,
        }
    };
    let shifted = |date, offset| {
        dates::shift(date, offset).map(Value::date).ok_or_else(|| {
            Diagnostic::error(ErrorCode::DateOutOfRange)
                .with_value(left)
                .marking(right)
        })
    };
    match (&*left.kind, &*right.kind, op) {
        (ValueKind::Date(a), ValueKind::Date(b), Sub) => Ok(Value::offset(dates::between(*b, *a))),
        (ValueKind::Date(date), _, Add) => match offset_of(right) {
            Some(offset) => shifted(*date, offset),
            None => Err(invalid(op, left, right)),
        },
        (ValueKind::Date(date), _, Sub) => match offset_of(right) {
            Some(offset) => match offset.checked_neg() {
                Some(back) => shifted(*date, back),
                None => offset_value(None, left, right),
            },
            None => Err(invalid(op, left, right)),
        },
        (_, ValueKind::Date(date), Add) => match offset_of(left) {
            Some(offset) => shifted(*date, offset),
            None => Err(invalid(op, left, right)),
        },
        _ => Err(invalid(op, left, right)),
    }
}

fn alias_op(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    use BinaryOp::*;
    let (Some(a), Some(b)) = (as_alias(left), as_alias(right)) else {
        return Err(invalid(op, left, right));
    };
    let result = match op {
        Add => a.add(&b),
        Sub => a.sub(&b),
        Mul => a.mul(&b).ok_or_else(|| {
            Diagnostic::error(ErrorCode::NonLinear)
                .with_value(left)
                .with_value(right)
        })?,
        Div => match b.as_constant() {
            Some(divisor) if divisor == 0.0 => {
                return Err(Diagnostic::error(ErrorCode::DivisionByZero)
                    .with_value(left)
                    .marking(right))
            }
            Some(divisor) => a.scale(1.0 / divisor),
            None => {
                return Err(Diagnostic::error(ErrorCode::NonLinear)
                    .with_value(left)
                    .with_value(right))
            }
        },
        Pow if b.as_constant().is_some_and(|n| approx_eq(n, 1.0)) => a,
        Pow if b.as_constant().is_some_and(|n| approx_eq(n, 0.0)) => Alias::constant(1.0),
        Pow => {
            return Err(Diagnostic::error(ErrorCode::NonLinear)
                .with_value(left)
                .with_value(right))
        }
        _ => return Err(invalid(op, left, right)),
    };
    Ok(alias_value(result))
}

fn grid_of(value: &Value) -> Option<Vec<Vec<f64>>> {
    value.as_array().and_then(Array::number_grid)
}

fn array_op(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    let (l, r) = (left.as_array(), right.as_array());
    match (l, r) {
        (Some(a), Some(b)) if a.is_matrix() && b.is_matrix() && op == BinaryOp::Mul => {
            let (Some(ga), Some(gb)) = (grid_of(left), grid_of(right)) else {
                return Err(matrix_error(MatrixError::NotRectangular, "matrix product", left));
            };
            linear::matmul(&ga, &gb)
                .map(|grid| Value::number_matrix(&grid))
                .map_err(|error| matrix_error(error, "matrix product", left))
        }
        (Some(a), Some(b)) if a.is_matrix() && !b.is_matrix() && op == BinaryOp::Mul => {
            let (Some(grid), Some(column)) = (grid_of(left), b.numbers()) else {
                return Err(invalid(op, left, right));
            };
            let column: Vec<Vec<f64>> = column.into_iter().map(|x| vec![x]).collect();
            linear::matmul(&grid, &column)
                .map(|product| Value::numbers(product.into_iter().map(|row| row[0])))
                .map_err(|error| matrix_error(error, "matrix product", left))
        }
        (Some(a), Some(b)) => {
            if a.len() != b.len() || a.is_matrix() != b.is_matrix() {
                return Err(Diagnostic::error(ErrorCode::DimensionMismatch)
                    .with_str(format!(
                        "{} has {} elements, {} has {}",
                        left.label(),
                        a.len(),
                        right.label(),
                        b.len()
                    ))
                    .marking(left)
                    .marking(right));
            }
            let items = a
                .items
                .iter()
                .zip(&b.items)
                .map(|(x, y)| binary(op, x, y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rebuild(a, items))
        }
        (Some(a), None) => {
            let items = a
                .items
                .iter()
                .map(|x| binary(op, x, right))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rebuild(a, items))
        }
        (None, Some(b)) => {
            let items = b
                .items
                .iter()
                .map(|y| binary(op, left, y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rebuild(b, items))
        }
        (None, None) => Err(invalid(op, left, right)),
    }
}

/// Rebuilds a vector or matrix of the same shape around new items.
pub(crate) fn rebuild(shape: &Array, items: Vec<Value>) -> Value {
    if shape.is_matrix() {
        let rows: Option<Vec<Vec<Value>>> = items
            .iter()
            .map(|row| row.as_vector().map(|r| r.items.clone()))
            .collect();
        if let Some(matrix) = rows.and_then(Array::matrix) {
            return Value::array(matrix);
        }
        return Value::array(Array::typed(ElementKind::Any, items));
    }
    let (mut array, _) = Array::vector(items);
    array.names = shape.names.clone();
    Value::array(array)
}

fn relation(op: BinaryOp) -> Option<Relation> {
    match op {
        BinaryOp::Less | BinaryOp::LessEqual => Some(Relation::LessEqual),
        BinaryOp::Greater | BinaryOp::GreaterEqual => Some(Relation::GreaterEqual),
        BinaryOp::Equal => Some(Relation::Equal),
        _ => None,
    }
}

fn ordering(op: BinaryOp, ord: Ordering) -> bool {
    match op {
        BinaryOp::Less => ord == Ordering::Less,
        BinaryOp::LessEqual => ord != Ordering::Greater,
        BinaryOp::Greater => ord == Ordering::Greater,
        BinaryOp::GreaterEqual => ord != Ordering::Less,
        BinaryOp::Equal => ord == Ordering::Equal,
        _ => ord != Ordering::Equal,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    if let (Some(a), Some(b)) = (left.as_array(), right.as_array()) {
        if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) {
            let equal = left.equals(right, false, false);
            return Ok(Value::boolean(equal == (op == BinaryOp::Equal)));
        }
        if a.len() != b.len() {
            return Err(Diagnostic::error(ErrorCode::DimensionMismatch)
                .with_str("element-wise comparison of vectors of different lengths")
                .marking(left)
                .marking(right));
        }
        return array_op(op, left, right);
    }
    if left.as_array().is_some() || right.as_array().is_some() {
        return array_op(op, left, right);
    }
    if is_linear(left) || is_linear(right) {
        if let (Some(a), Some(b), Some(rel)) = (as_alias(left), as_alias(right), relation(op)) {
            return Ok(Value::new(ValueKind::Bound(Bound::compare(&a, rel, &b))));
        }
        return Err(invalid(op, left, right));
    }
    let ord = match (&*left.kind, &*right.kind) {
        (ValueKind::Number(a), ValueKind::Number(b)) => {
            if approx_eq(*a, *b) {
                Ordering::Equal
            } else {
                a.total_cmp(b)
            }
        }
        (ValueKind::String(a), ValueKind::String(b)) => a.cmp(b),
        (ValueKind::Date(a), ValueKind::Date(b)) => a.cmp(b),
        (ValueKind::Offset(a), ValueKind::Offset(b)) if a.months == b.months => a.days.cmp(&b.days),
        (ValueKind::Measurement(_), _) | (_, ValueKind::Measurement(_)) => {
            let (Some(a), Some(b)) = (as_measurement(left), as_measurement(right)) else {
                return Err(invalid(op, left, right));
            };
            if a.dim() != b.dim() {
                return Err(Diagnostic::error(ErrorCode::UnitMismatch)
                    .with_value(left)
                    .with_value(right));
            }
            if a.approx_eq(&b) {
                Ordering::Equal
            } else {
                a.si_value().total_cmp(&b.si_value())
            }
        }
        _ if matches!(op, BinaryOp::Equal | BinaryOp::NotEqual) => {
            let equal = left.equals(right, false, false);
            return Ok(Value::boolean(equal == (op == BinaryOp::Equal)));
        }
        _ => return Err(invalid(op, left, right)),
    };
    Ok(Value::boolean(ordering(op, ord)))
}

fn logical(op: BinaryOp, left: &Value, right: &Value) -> OpResult {
    match (&*left.kind, &*right.kind) {
        (ValueKind::Boolean(a), ValueKind::Boolean(b)) => Ok(Value::boolean(if op == BinaryOp::And {
            *a && *b
        } else {
            *a || *b
        })),
        (ValueKind::Bound(a), ValueKind::Bound(b)) => Ok(Value::new(ValueKind::Bound(
            if op == BinaryOp::And {
                a.clone().and(b.clone())
            } else {
                a.clone().or(b.clone())
            },
        ))),
        (ValueKind::Array(_), _) | (_, ValueKind::Array(_)) => array_op(op, left, right),
        _ => Err(invalid(op, left, right)),
    }
}

fn membership(left: &Value, right: &Value) -> OpResult {
    match &*right.kind {
        ValueKind::String(haystack) => match left.as_str() {
            Some(needle) => Ok(Value::boolean(haystack.contains(needle))),
            None => Err(invalid(BinaryOp::In, left, right)),
        },
        ValueKind::Array(array) => Ok(Value::boolean(
            array.items.iter().any(|item| item.equals(left, false, false)),
        )),
        ValueKind::DataFrame(frame) => match left.as_str() {
            Some(name) => Ok(Value::boolean(frame.has_column(name))),
            None => Err(invalid(BinaryOp::In, left, right)),
        },
        ValueKind::Network(network) => match &*left.kind {
            ValueKind::String(name) => Ok(Value::boolean(network.contains(name))),
            ValueKind::Node(node) => Ok(Value::boolean(network.contains(&node.name))),
            _ => Err(invalid(BinaryOp::In, left, right)),
        },
        _ => Err(invalid(BinaryOp::In, left, right)),
    }
}

pub fn unary(op: UnaryOp, value: &Value) -> OpResult {
    let fail = || {
        Diagnostic::error(ErrorCode::InvalidUnaryOperand)
            .with_str(op.symbol())
            .with_kind(value.kind())
            .marking(value)
    };
    if let ValueKind::Array(array) = &*value.kind {
        let items = array
            .items
            .iter()
            .map(|item| unary(op, item))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(rebuild(array, items));
    }
    match (op, &*value.kind) {
        (UnaryOp::Not, ValueKind::Boolean(b)) => Ok(Value::boolean(!b)),
        (UnaryOp::Not, _) => Err(fail()),
        (UnaryOp::Plus, ValueKind::Number(_) | ValueKind::Measurement(_))
        | (UnaryOp::Plus, ValueKind::Alias(_) | ValueKind::Variable(_) | ValueKind::Offset(_)) => {
            Ok(value.clone())
        }
        (UnaryOp::Negate, ValueKind::Number(n)) => Ok(Value::number(-n)),
        (UnaryOp::Negate, ValueKind::Measurement(m)) => Ok(Value::measurement(m.scale(-1.0))),
        (UnaryOp::Negate, ValueKind::Offset(o)) => o
            .checked_neg()
            .map(Value::offset)
            .ok_or_else(|| Diagnostic::error(ErrorCode::OffsetOverflow).with_value(value)),
        (UnaryOp::Negate, ValueKind::Alias(_) | ValueKind::Variable(_)) => match as_alias(value) {
            Some(alias) => Ok(alias_value(alias.scale(-1.0))),
            None => Err(fail()),
        },
        _ => Err(fail()),
    }
}

/// `value as unit`: converts a measurement, or attaches units to a number.
pub fn convert_units(value: &Value, unit: &str) -> OpResult {
    let unit_failure = |error: UnitError| match error {
        UnitError::DimensionMismatch { .. } => Diagnostic::error(ErrorCode::InvalidCast)
            .with_value(value)
            .with_kind(Kind::Measurement),
        UnitError::Unknown(symbol) | UnitError::Malformed(symbol) => {
            Diagnostic::error(ErrorCode::UnknownUnit).with_str(symbol)
        }
        UnitError::DivisionByZero => Diagnostic::error(ErrorCode::DivisionByZero).with_value(value),
        UnitError::Overflow => Diagnostic::error(ErrorCode::UnitOverflow).with_value(value),
    };
    match &*value.kind {
        ValueKind::Number(n) => Measurement::from_unit(*n, unit)
            .map(Value::measurement)
            .map_err(unit_failure),
        ValueKind::Measurement(m) => m.convert(unit).map(Value::measurement).map_err(unit_failure),
        ValueKind::Offset(offset) if offset.months == 0 => {
            Measurement::from_unit(offset.days as f64, "d")
                .and_then(|m| m.convert(unit))
                .map(Value::measurement)
                .map_err(unit_failure)
        }
        ValueKind::Array(array) => {
            let items = array
                .items
                .iter()
                .map(|item| convert_units(item, unit))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rebuild(array, items))
        }
        _ => Err(Diagnostic::error(ErrorCode::InvalidCast)
            .with_value(value)
            .with_kind(Kind::Measurement)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_by_zero_is_typed() {
        let err = binary(BinaryOp::Div, &Value::number(5.0), &Value::number(0.0))
            .expect_err("zero divisor");
        assert!(err.is_error(ErrorCode::DivisionByZero));
    }

    #[test]
    fn tiny_divisors_are_not_zero() {
        let quotient = binary(BinaryOp::Div, &Value::number(5.0), &Value::number(1e-9))
            .expect("non-zero divisor");
        assert_eq!(quotient.as_number(), Some(5e9));
        let rest = binary(BinaryOp::Mod, &Value::number(1.0), &Value::number(1e-10));
        assert!(rest.is_ok());
    }

    #[test]
    fn offset_overflow_is_typed() {
        let huge = Value::offset(Offset::days(9_000_000_000_000_000_000));
        let err = binary(BinaryOp::Add, &huge, &huge).expect_err("sum overflows");
        assert!(err.is_error(ErrorCode::OffsetOverflow));
        let err = binary(BinaryOp::Sub, &Value::offset(Offset::days(i64::MIN)), &huge)
            .expect_err("difference overflows");
        assert!(err.is_error(ErrorCode::OffsetOverflow));
        let err = binary(BinaryOp::Mul, &Value::offset(Offset::days(2)), &Value::number(1e19))
            .expect_err("scale overflows");
        assert!(err.is_error(ErrorCode::OffsetOverflow));
        let err = unary(UnaryOp::Negate, &Value::offset(Offset::days(i64::MIN)))
            .expect_err("negation overflows");
        assert!(err.is_error(ErrorCode::OffsetOverflow));
    }

    #[test]
    fn huge_measurement_powers_are_typed() {
        let area = convert_units(&Value::number(2.0), "m^2").expect("unit");
        let err = binary(BinaryOp::Pow, &area, &Value::number(2_000_000_000.0))
            .expect_err("exponent overflows");
        assert!(err.is_error(ErrorCode::UnitOverflow));
        let err = binary(BinaryOp::Pow, &area, &Value::number(1e12)).expect_err("out of range");
        assert!(err.is_error(ErrorCode::UnitOverflow));
        let squared = binary(BinaryOp::Pow, &area, &Value::number(2.0)).expect("m^4");
        assert_eq!(squared.kind(), Kind::Measurement);
    }

    #[test]
    fn scalar_broadcasts_over_vector() {
        let v = Value::numbers([1.0, 2.0, 3.0]);
        let doubled = binary(BinaryOp::Mul, &v, &Value::number(2.0)).expect("broadcast");
        assert!(doubled.equals(&Value::numbers([2.0, 4.0, 6.0]), false, true));
    }

    #[test]
    fn vector_lengths_must_agree() {
        let err = binary(
            BinaryOp::Add,
            &Value::numbers([1.0, 2.0]),
            &Value::numbers([1.0]),
        )
        .expect_err("mismatch");
        assert!(err.is_error(ErrorCode::DimensionMismatch));
    }

    #[test]
    fn variables_build_aliases_and_bounds() {
        let x = Value::variable("x");
        let two_x = binary(BinaryOp::Mul, &Value::number(2.0), &x).expect("linear");
        assert_eq!(two_x.kind(), Kind::Alias);
        let bound = binary(BinaryOp::LessEqual, &two_x, &Value::number(4.0)).expect("bound");
        assert_eq!(bound.kind(), Kind::Bound);
        let err = binary(BinaryOp::Mul, &x, &Value::variable("y")).expect_err("non-linear");
        assert!(err.is_error(ErrorCode::NonLinear));
    }

    #[test]
    fn measurements_check_dimensions() {
        let metres = convert_units(&Value::number(3.0), "m").expect("unit");
        let seconds = convert_units(&Value::number(1.0), "s").expect("unit");
        let err = binary(BinaryOp::Add, &metres, &seconds).expect_err("incompatible");
        assert!(err.is_error(ErrorCode::UnitMismatch));
        let ratio = binary(BinaryOp::Div, &metres, &metres).expect("cancels");
        assert_eq!(ratio.as_number(), Some(1.0));
    }

    #[test]
    fn date_differences_are_offsets() {
        let a = Value::date(dates::parse_date("2024-03-01").expect("date"));
        let b = Value::date(dates::parse_date("2024-02-01").expect("date"));
        let diff = binary(BinaryOp::Sub, &a, &b).expect("offset");
        assert!(diff.equals(&Value::offset(Offset::days(29)), false, true));
        let back = binary(BinaryOp::Sub, &a, &diff).expect("date");
        assert!(back.equals(&b, false, true));
    }

    #[test]
    fn vector_comparison_builds_mask() {
        let mask = binary(
            BinaryOp::Greater,
            &Value::numbers([1.0, 5.0, 3.0]),
            &Value::number(2.0),
        )
        .expect("mask");
        assert_eq!(mask.kind(), Kind::Vector(ElementKind::Boolean));
    }
}
