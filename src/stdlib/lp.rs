use super::{Args, Module, Param, Produced, ANY};
use crate::{
    diagnostics::{Diagnostic, ErrorCode},
    linear::{Bound, Domain, LpModel, LpProblem, Sense},
    table::DataFrame,
    value::{Kind, Value, ValueKind},
};

const MODEL: &[Param] = &[
    Param::required("objective", &[Kind::Alias]),
    Param {
        required: false,
        ..Param::variadic("constraints", ANY)
    },
];
const VARIABLES: &[Param] = &[Param::variadic("variables", ANY)];
const INSPECT: &[Param] = &[Param::required("model", &[Kind::LpModel])];

pub(super) fn module() -> Module {
    let mut module = Module::new("lp", false);
    module.function("maximize", MODEL, |args| model(args, Sense::Maximize));
    module.function("minimize", MODEL, |args| model(args, Sense::Minimize));
    module.function("integer", VARIABLES, |args| domain(args, Domain::Integer));
    module.function("binary", VARIABLES, |args| domain(args, Domain::Binary));
    module.function("free", VARIABLES, |args| domain(args, Domain::Free));
    module.function("problem", INSPECT, problem);
    module
}

fn model(args: &Args, sense: Sense) -> Result<Produced, Diagnostic> {
    let objective = match &*args.value("objective")?.kind {
        ValueKind::Alias(alias) => alias.clone(),
        _ => return Err(args.type_error("objective", Kind::Alias, args.value("objective")?)),
    };
    let mut constraints = Vec::new();
    for value in args.rest() {
        collect_bounds(args, value, &mut constraints)?;
    }
    Ok(Value::new(ValueKind::LpModel(LpModel {
        sense,
        objective,
        constraints,
    }))
    .into())
}

fn collect_bounds(args: &Args, value: &Value, out: &mut Vec<Bound>) -> Result<(), Diagnostic> {
    match &*value.kind {
        ValueKind::Bound(bound) => out.push(bound.clone()),
        ValueKind::Boolean(true) => {}
        ValueKind::Boolean(false) => {
            return Err(Diagnostic::error(ErrorCode::Infeasible)
                .with_value(value)
                .with_str("a constant constraint is false"))
        }
        ValueKind::Array(array) if !array.is_matrix() => {
            for item in &array.items {
                collect_bounds(args, item, out)?;
            }
        }
        _ => return Err(args.type_error("constraints", Kind::Bound, value)),
    }
    Ok(())
}

fn domain(args: &Args, domain: Domain) -> Result<Produced, Diagnostic> {
    let mut names = Vec::new();
    for value in args.rest() {
        match &*value.kind {
            ValueKind::Variable(name) => names.push(name.clone()),
            ValueKind::Array(array) if !array.is_matrix() => {
                for item in &array.items {
                    match &*item.kind {
                        ValueKind::Variable(name) => names.push(name.clone()),
                        _ => return Err(args.type_error("variables", Kind::Variable, item)),
                    }
                }
            }
            _ => return Err(args.type_error("variables", Kind::Variable, value)),
        }
    }
    let mut bounds = names.into_iter().map(|name| Bound::Domain(domain, name));
    let first = bounds.next().ok_or_else(|| {
        Diagnostic::error(ErrorCode::MissingArgument)
            .with_str(domain.name())
            .with_str("variables")
    })?;
    let bound = bounds.fold(first, Bound::and);
    Ok(Value::new(ValueKind::Bound(bound)).into())
}

/// Tabulates the assembled solver input: one row for the objective and
/// one per constraint, one column per variable.
fn problem(args: &Args) -> Result<Produced, Diagnostic> {
    let value = args.value("model")?;
    let ValueKind::LpModel(model) = &*value.kind else {
        return Err(args.type_error("model", Kind::LpModel, value));
    };
    let problem = LpProblem::assemble(model).map_err(|disjunction| {
        Diagnostic::error(ErrorCode::DisjunctiveBound)
            .with_name(disjunction.to_string())
            .marking(value)
    })?;
    let variables = problem.variables();
    let mut rows = vec![Value::string(problem.sense.name())];
    rows.extend((1..=problem.constraints.len()).map(|i| Value::string(format!("c{i}"))));
    let mut columns = vec![("row".to_string(), rows)];
    for variable in &variables {
        let mut cells = vec![Value::number(
            problem.objective.get(variable).copied().unwrap_or(0.0),
        )];
        cells.extend(problem.constraints.iter().map(|constraint| {
            Value::number(constraint.coefficients.get(variable).copied().unwrap_or(0.0))
        }));
        columns.push((variable.clone(), cells));
    }
    let mut relations = vec![Value::string("")];
    relations.extend(
        problem
            .constraints
            .iter()
            .map(|constraint| Value::string(constraint.relation.symbol())),
    );
    columns.push(("relation".to_string(), relations));
    let mut rhs = vec![Value::number(-problem.objective_constant)];
    rhs.extend(problem.constraints.iter().map(|constraint| Value::number(constraint.rhs)));
    columns.push(("rhs".to_string(), rhs));
    let frame = DataFrame::from_columns(columns).map_err(|ragged| {
        Diagnostic::error(ErrorCode::DimensionMismatch).with_str(format!(
            "column {} has {} cells, expected {}",
            ragged.column, ragged.found, ragged.expected
        ))
    })?;
    Ok(Value::new(ValueKind::DataFrame(frame)).into())
}
