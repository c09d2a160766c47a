use std::fmt;

use indexmap::{IndexMap, IndexSet};

use crate::value::{approx_eq, format_number};

/// Sparse linear expression `sum(coefficient * variable) + constant`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Alias {
    pub coefficients: IndexMap<String, f64>,
    pub constant: f64,
}

impl Alias {
    pub fn constant(value: f64) -> Self {
        Self {
            coefficients: IndexMap::new(),
            constant: value,
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        let mut coefficients = IndexMap::new();
        coefficients.insert(name.into(), 1.0);
        Self {
            coefficients,
            constant: 0.0,
        }
    }

    pub fn as_constant(&self) -> Option<f64> {
        self.coefficients
            .values()
            .all(|c| approx_eq(*c, 0.0))
            .then_some(self.constant)
    }

    /// The variable name when the alias is exactly `1 * name`.
    pub fn as_variable(&self) -> Option<&str> {
        if !approx_eq(self.constant, 0.0) {
            return None;
        }
        let mut terms = self.terms();
        match (terms.next(), terms.next()) {
            (Some((name, coefficient)), None) if approx_eq(coefficient, 1.0) => Some(name),
            _ => None,
        }
    }

    /// Non-zero terms in insertion order.
    pub fn terms(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.coefficients
            .iter()
            .filter(|(_, c)| !approx_eq(**c, 0.0))
            .map(|(name, c)| (name.as_str(), *c))
    }

    pub fn add(&self, other: &Alias) -> Alias {
        let mut out = self.clone();
        for (name, coefficient) in &other.coefficients {
            *out.coefficients.entry(name.clone()).or_insert(0.0) += coefficient;
        }
        out.constant += other.constant;
        out
    }

    pub fn sub(&self, other: &Alias) -> Alias {
        self.add(&other.scale(-1.0))
    }

    pub fn scale(&self, factor: f64) -> Alias {
        Alias {
            coefficients: self
                .coefficients
                .iter()
                .map(|(name, c)| (name.clone(), c * factor))
                .collect(),
            constant: self.constant * factor,
        }
    }

    /// Product of two aliases; `None` when both sides carry variables.
    pub fn mul(&self, other: &Alias) -> Option<Alias> {
        match (self.as_constant(), other.as_constant()) {
            (Some(a), _) => Some(other.scale(a)),
            (_, Some(b)) => Some(self.scale(b)),
            _ => None,
        }
    }

    pub fn approx_eq(&self, other: &Alias) -> bool {
        if !approx_eq(self.constant, other.constant) {
            return false;
        }
        let names: IndexSet<&String> = self
            .coefficients
            .keys()
            .chain(other.coefficients.keys())
            .collect();
        names.into_iter().all(|name| {
            approx_eq(
                self.coefficients.get(name).copied().unwrap_or(0.0),
                other.coefficients.get(name).copied().unwrap_or(0.0),
            )
        })
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> + '_ {
        self.terms().map(|(name, _)| name)
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, coefficient) in self.terms() {
            let (sign, magnitude) = if coefficient < 0.0 {
                ("-", -coefficient)
            } else {
                ("+", coefficient)
            };
            if first {
                if sign == "-" {
                    write!(f, "-")?;
                }
            } else {
                write!(f, " {sign} ")?;
            }
            if approx_eq(magnitude, 1.0) {
                write!(f, "{name}")?;
            } else {
                write!(f, "{}{name}", format_number(magnitude))?;
            }
            first = false;
        }
        if first {
            return write!(f, "{}", format_number(self.constant));
        }
        if !approx_eq(self.constant, 0.0) {
            if self.constant < 0.0 {
                write!(f, " - {}", format_number(-self.constant))?;
            } else {
                write!(f, " + {}", format_number(self.constant))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    LessEqual,
    GreaterEqual,
    Equal,
}

impl Relation {
    pub fn symbol(self) -> &'static str {
        match self {
            Relation::LessEqual => "<=",
            Relation::GreaterEqual => ">=",
            Relation::Equal => "==",
        }
    }

    fn flipped(self) -> Relation {
        match self {
            Relation::LessEqual => Relation::GreaterEqual,
            Relation::GreaterEqual => Relation::LessEqual,
            Relation::Equal => Relation::Equal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Integer,
    Binary,
    Free,
}

impl Domain {
    pub fn name(self) -> &'static str {
        match self {
            Domain::Integer => "integer",
            Domain::Binary => "binary",
            Domain::Free => "free",
        }
    }
}

/// A constraint or domain restriction over decision variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    /// `expr relation rhs`, with every constant moved to the right.
    Constraint {
        expr: Alias,
        relation: Relation,
        rhs: f64,
    },
    And(Vec<Bound>),
    Or(Vec<Bound>),
    Domain(Domain, String),
}

impl Bound {
    /// Normalises `left relation right` so that variables sit on the left.
    pub fn compare(left: &Alias, relation: Relation, right: &Alias) -> Bound {
        let mut expr = left.sub(right);
        let rhs = -expr.constant;
        expr.constant = 0.0;
        expr.coefficients.retain(|_, c| !approx_eq(*c, 0.0));
        let all_negative = expr.coefficients.values().all(|c| *c < 0.0);
        if all_negative && !expr.coefficients.is_empty() {
            return Bound::Constraint {
                expr: expr.scale(-1.0),
                relation: relation.flipped(),
                rhs: -rhs,
            };
        }
        Bound::Constraint { expr, relation, rhs }
    }

    pub fn and(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::And(mut left), Bound::And(right)) => {
                left.extend(right);
                Bound::And(left)
            }
            (Bound::And(mut left), right) => {
                left.push(right);
                Bound::And(left)
            }
            (left, Bound::And(mut right)) => {
                right.insert(0, left);
                Bound::And(right)
            }
            (left, right) => Bound::And(vec![left, right]),
        }
    }

    pub fn or(self, other: Bound) -> Bound {
        match (self, other) {
            (Bound::Or(mut left), right) => {
                left.push(right);
                Bound::Or(left)
            }
            (left, right) => Bound::Or(vec![left, right]),
        }
    }

    pub fn approx_eq(&self, other: &Bound) -> bool {
        match (self, other) {
            (
                Bound::Constraint {
                    expr: a,
                    relation: ra,
                    rhs: xa,
                },
                Bound::Constraint {
                    expr: b,
                    relation: rb,
                    rhs: xb,
                },
            ) => ra == rb && approx_eq(*xa, *xb) && a.approx_eq(b),
            (Bound::And(a), Bound::And(b)) | (Bound::Or(a), Bound::Or(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(l, r)| l.approx_eq(r))
            }
            (Bound::Domain(da, na), Bound::Domain(db, nb)) => da == db && na == nb,
            _ => false,
        }
    }

    /// Conjunctive constraints in order; `Err` carries the first disjunction.
    fn flatten<'a>(&'a self, out: &mut Vec<&'a Bound>) -> Result<(), &'a Bound> {
        match self {
            Bound::And(parts) => {
                for part in parts {
                    part.flatten(out)?;
                }
                Ok(())
            }
            Bound::Or(_) => Err(self),
            _ => {
                out.push(self);
                Ok(())
            }
        }
    }
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bound::Constraint {
                expr,
                relation,
                rhs,
            } => write!(f, "{expr} {} {}", relation.symbol(), format_number(*rhs)),
            Bound::And(parts) | Bound::Or(parts) => {
                let joiner = if matches!(self, Bound::And(_)) {
                    " and "
                } else {
                    " or "
                };
                let text: Vec<String> = parts.iter().map(|part| part.to_string()).collect();
                write!(f, "{}", text.join(joiner))
            }
            Bound::Domain(domain, name) => write!(f, "{name} is {}", domain.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Maximize,
    Minimize,
}

impl Sense {
    pub fn name(self) -> &'static str {
        match self {
            Sense::Maximize => "maximize",
            Sense::Minimize => "minimize",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LpModel {
    pub sense: Sense,
    pub objective: Alias,
    pub constraints: Vec<Bound>,
}

impl LpModel {
    pub fn approx_eq(&self, other: &LpModel) -> bool {
        self.sense == other.sense
            && self.objective.approx_eq(&other.objective)
            && self.constraints.len() == other.constraints.len()
            && self
                .constraints
                .iter()
                .zip(&other.constraints)
                .all(|(a, b)| a.approx_eq(b))
    }
}

impl fmt::Display for LpModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sense.name(), self.objective)?;
        if !self.constraints.is_empty() {
            let text: Vec<String> = self.constraints.iter().map(|c| c.to_string()).collect();
            write!(f, " subject to {}", text.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub coefficients: IndexMap<String, f64>,
    pub relation: Relation,
    pub rhs: f64,
}

/// Solver input assembled from a model.
#[derive(Debug, Clone, PartialEq)]
pub struct LpProblem {
    pub sense: Sense,
    pub objective: IndexMap<String, f64>,
    pub objective_constant: f64,
    pub constraints: Vec<LinearConstraint>,
    pub integer: IndexSet<String>,
    pub binary: IndexSet<String>,
    pub free: IndexSet<String>,
}

impl LpProblem {
    /// Flattens a model's bounds into an ordered constraint list and domain
    /// sets. Disjunctions have no linear form and are returned as `Err`.
    pub fn assemble(model: &LpModel) -> Result<LpProblem, Bound> {
        let mut flat = Vec::new();
        for bound in &model.constraints {
            bound.flatten(&mut flat).map_err(Clone::clone)?;
        }
        let mut problem = LpProblem {
            sense: model.sense,
            objective: model
                .objective
                .terms()
                .map(|(name, c)| (name.to_string(), c))
                .collect(),
            objective_constant: model.objective.constant,
            constraints: Vec::new(),
            integer: IndexSet::new(),
            binary: IndexSet::new(),
            free: IndexSet::new(),
        };
        for bound in flat {
            match bound {
                Bound::Constraint {
                    expr,
                    relation,
                    rhs,
                } => problem.constraints.push(LinearConstraint {
                    coefficients: expr
                        .terms()
                        .map(|(name, c)| (name.to_string(), c))
                        .collect(),
                    relation: *relation,
                    rhs: *rhs,
                }),
                Bound::Domain(Domain::Integer, name) => {
                    problem.integer.insert(name.clone());
                }
                Bound::Domain(Domain::Binary, name) => {
                    problem.binary.insert(name.clone());
                }
                Bound::Domain(Domain::Free, name) => {
                    problem.free.insert(name.clone());
                }
                Bound::And(_) | Bound::Or(_) => {}
            }
        }
        Ok(problem)
    }

    /// Every variable mentioned, objective first.
    pub fn variables(&self) -> IndexSet<String> {
        let mut names: IndexSet<String> = self.objective.keys().cloned().collect();
        for constraint in &self.constraints {
            names.extend(constraint.coefficients.keys().cloned());
        }
        names.extend(self.integer.iter().cloned());
        names.extend(self.binary.iter().cloned());
        names.extend(self.free.iter().cloned());
        names
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LpSolution {
    pub objective_value: f64,
    pub variable_values: IndexMap<String, f64>,
    pub reduced_cost: IndexMap<String, f64>,
    pub slacks: Vec<f64>,
    pub dual: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("infeasible: {reason}")]
pub struct Infeasible {
    pub reason: String,
}

/// Numerical back end for `solve!`. None ships with the crate; embedders
/// register one on the document.
pub trait LpSolver {
    fn solve(&self, problem: &LpProblem) -> Result<LpSolution, Infeasible>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixError {
    NotSquare,
    NotRectangular,
    Singular,
    Mismatch,
}

fn check_rectangular(m: &[Vec<f64>]) -> Result<usize, MatrixError> {
    let width = m.first().map_or(0, Vec::len);
    if m.iter().any(|row| row.len() != width) {
        return Err(MatrixError::NotRectangular);
    }
    Ok(width)
}

fn check_square(m: &[Vec<f64>]) -> Result<usize, MatrixError> {
    let width = check_rectangular(m)?;
    if width != m.len() {
        return Err(MatrixError::NotSquare);
    }
    Ok(width)
}

pub fn transpose(m: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MatrixError> {
    let width = check_rectangular(m)?;
    Ok((0..width)
        .map(|c| m.iter().map(|row| row[c]).collect())
        .collect())
}

pub fn trace(m: &[Vec<f64>]) -> Result<f64, MatrixError> {
    let n = check_square(m)?;
    Ok((0..n).map(|i| m[i][i]).sum())
}

pub fn matmul(a: &[Vec<f64>], b: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MatrixError> {
    let inner = check_rectangular(a)?;
    let width = check_rectangular(b)?;
    if inner != b.len() {
        return Err(MatrixError::Mismatch);
    }
    Ok(a.iter()
        .map(|row| {
            (0..width)
                .map(|c| (0..inner).map(|k| row[k] * b[k][c]).sum())
                .collect()
        })
        .collect())
}

pub fn dot(a: &[f64], b: &[f64]) -> Result<f64, MatrixError> {
    if a.len() != b.len() {
        return Err(MatrixError::Mismatch);
    }
    Ok(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Gaussian elimination with partial pivoting.
fn eliminate(m: &[Vec<f64>]) -> Result<(Vec<Vec<f64>>, Vec<Vec<f64>>, f64), MatrixError> {
    let n = check_square(m)?;
    let mut a = m.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..n)
        .map(|r| (0..n).map(|c| if r == c { 1.0 } else { 0.0 }).collect())
        .collect();
    let mut det = 1.0;
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&x, &y| a[x][col].abs().total_cmp(&a[y][col].abs()))
            .unwrap_or(col);
        if approx_eq(a[pivot][col], 0.0) {
            return Ok((a, inv, 0.0));
        }
        if pivot != col {
            a.swap(pivot, col);
            inv.swap(pivot, col);
            det = -det;
        }
        let p = a[col][col];
        det *= p;
        for c in 0..n {
            a[col][c] /= p;
            inv[col][c] /= p;
        }
        for r in 0..n {
            if r == col {
                continue;
            }
            let factor = a[r][col];
            if factor == 0.0 {
                continue;
            }
            for c in 0..n {
                a[r][c] -= factor * a[col][c];
                inv[r][c] -= factor * inv[col][c];
            }
        }
    }
    Ok((a, inv, det))
}

pub fn determinant(m: &[Vec<f64>]) -> Result<f64, MatrixError> {
    if m.is_empty() {
        return Ok(1.0);
    }
    eliminate(m).map(|(_, _, det)| det)
}

pub fn inverse(m: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MatrixError> {
    let (_, inv, det) = eliminate(m)?;
    if approx_eq(det, 0.0) {
        return Err(MatrixError::Singular);
    }
    Ok(inv)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xy(x: f64, y: f64, c: f64) -> Alias {
        Alias::variable("x")
            .scale(x)
            .add(&Alias::variable("y").scale(y))
            .add(&Alias::constant(c))
    }

    #[test]
    fn renders_linear_expressions() {
        assert_eq!(xy(2.0, -1.0, 3.0).to_string(), "2x - y + 3");
        assert_eq!(Alias::constant(4.0).to_string(), "4");
    }

    #[test]
    fn product_of_two_variables_is_rejected() {
        let x = Alias::variable("x");
        assert!(x.mul(&Alias::variable("y")).is_none());
        assert!(x.mul(&Alias::constant(3.0)).is_some());
    }

    #[test]
    fn comparison_moves_constants_right() {
        let bound = Bound::compare(&xy(1.0, 1.0, 2.0), Relation::LessEqual, &Alias::constant(10.0));
        assert_eq!(bound.to_string(), "x + y <= 8");
    }

    #[test]
    fn assembling_rejects_disjunctions() {
        let a = Bound::compare(&Alias::variable("x"), Relation::LessEqual, &Alias::constant(1.0));
        let b = Bound::compare(&Alias::variable("x"), Relation::GreaterEqual, &Alias::constant(3.0));
        let model = LpModel {
            sense: Sense::Maximize,
            objective: Alias::variable("x"),
            constraints: vec![a.or(b)],
        };
        assert!(LpProblem::assemble(&model).is_err());
    }

    #[test]
    fn assembling_collects_domains() {
        let model = LpModel {
            sense: Sense::Minimize,
            objective: xy(1.0, 2.0, 0.0),
            constraints: vec![
                Bound::compare(&xy(1.0, 1.0, 0.0), Relation::GreaterEqual, &Alias::constant(1.0))
                    .and(Bound::Domain(Domain::Integer, "x".into())),
            ],
        };
        let problem = LpProblem::assemble(&model).expect("conjunctive");
        assert_eq!(problem.constraints.len(), 1);
        assert!(problem.integer.contains("x"));
        assert_eq!(problem.variables().len(), 2);
    }

    #[test]
    fn inverse_and_determinant() {
        let m = vec![vec![4.0, 7.0], vec![2.0, 6.0]];
        assert!((determinant(&m).expect("square") - 10.0).abs() < 1e-9);
        let inv = inverse(&m).expect("invertible");
        let id = matmul(&m, &inv).expect("conformable");
        assert!((id[0][0] - 1.0).abs() < 1e-9 && id[0][1].abs() < 1e-9);
    }

    #[test]
    fn singular_and_non_square_are_errors() {
        assert_eq!(
            inverse(&[vec![1.0, 2.0], vec![2.0, 4.0]]),
            Err(MatrixError::Singular)
        );
        assert_eq!(trace(&[vec![1.0, 2.0]]), Err(MatrixError::NotSquare));
    }
}
