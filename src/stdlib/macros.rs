use indexmap::IndexMap;
use log::info;

use super::{graph::node_name, Args, MacroContext, Module, Param, Produced, ANY};
use crate::{
    diagnostics::{Diagnostic, ErrorCode},
    linear::LpProblem,
    table::DataFrame,
    value::{format_number, Array, Kind, Value, ValueKind},
};

const PRINT: &[Param] = &[Param::variadic("values", ANY)];
const SOLVE: &[Param] = &[Param::required("model", &[Kind::LpModel])];
const PATHS: &[Param] = &[
    Param::required("g", &[Kind::Network]),
    Param::required("start", ANY),
];

pub(super) fn module() -> Module {
    let mut module = Module::new("io", true);
    module.macro_("print", PRINT, print);
    module.macro_("solve", SOLVE, solve);
    module.macro_("paths", PATHS, paths);
    module
}

fn print(args: &Args, context: &mut MacroContext<'_>) -> Result<Produced, Diagnostic> {
    let parts: Vec<String> = args
        .rest()
        .iter()
        .map(|value| match &*value.kind {
            ValueKind::String(text) => text.clone(),
            _ => value.to_string(),
        })
        .collect();
    let line = parts.join(" ");
    context.sink.emit(&line);
    Ok(Value::string(line).into())
}

/// Hands the assembled model to the registered solver. The result is a
/// named list with slots `objective`, `values`, `reduced_cost`, `slacks`
/// and `dual`; the last two follow constraint order.
fn solve(args: &Args, context: &mut MacroContext<'_>) -> Result<Produced, Diagnostic> {
    let value = args.value("model")?;
    let ValueKind::LpModel(model) = &*value.kind else {
        return Err(args.type_error("model", Kind::LpModel, value));
    };
    let solver = context
        .solver
        .ok_or_else(|| Diagnostic::error(ErrorCode::NoSolver).marking(value))?;
    let problem = LpProblem::assemble(model).map_err(|disjunction| {
        Diagnostic::error(ErrorCode::DisjunctiveBound)
            .with_name(disjunction.to_string())
            .marking(value)
    })?;
    info!(
        "solving {} over {} variables with {} constraints",
        problem.sense.name(),
        problem.variables().len(),
        problem.constraints.len()
    );
    let solution = solver.solve(&problem).map_err(|infeasible| {
        Diagnostic::error(ErrorCode::Infeasible)
            .with_value(value)
            .with_str(infeasible.reason)
    })?;
    let objective = solution.objective_value + problem.objective_constant;
    context
        .sink
        .emit(&format!("objective = {}", format_number(objective)));
    for (name, amount) in &solution.variable_values {
        context.sink.emit(&format!("{name} = {}", format_number(*amount)));
    }
    for (name, cost) in &solution.reduced_cost {
        context
            .sink
            .emit(&format!("reduced cost of {name} = {}", format_number(*cost)));
    }
    for (row, (slack, dual)) in solution.slacks.iter().zip(&solution.dual).enumerate() {
        context.sink.emit(&format!(
            "constraint {}: slack = {}, dual = {}",
            row + 1,
            format_number(*slack),
            format_number(*dual)
        ));
    }

    let slots = [
        ("objective", Value::number(objective)),
        ("values", named_numbers(&solution.variable_values)),
        ("reduced_cost", named_numbers(&solution.reduced_cost)),
        ("slacks", Value::numbers(solution.slacks.iter().copied())),
        ("dual", Value::numbers(solution.dual.iter().copied())),
    ];
    let (names, items): (Vec<String>, Vec<Value>) = slots
        .into_iter()
        .map(|(name, slot)| (name.to_string(), slot))
        .unzip();
    let (array, _) = Array::vector(items);
    let (array, _) = array.with_names(names);
    Ok(Value::array(array).into())
}

fn named_numbers(entries: &IndexMap<String, f64>) -> Value {
    let (array, _) = Array::vector(entries.values().map(|amount| Value::number(*amount)).collect());
    let (array, _) = array.with_names(entries.keys().cloned().collect());
    Value::array(array)
}

fn paths(args: &Args, context: &mut MacroContext<'_>) -> Result<Produced, Diagnostic> {
    let graph = args.value("g")?;
    let ValueKind::Network(network) = &*graph.kind else {
        return Err(args.type_error("g", Kind::Network, graph));
    };
    let start_value = args.value("start")?;
    let start = node_name(start_value).ok_or_else(|| args.type_error("start", Kind::Node, start_value))?;
    let table = context
        .paths
        .shortest_paths(network, &start)
        .ok_or_else(|| {
            Diagnostic::error(ErrorCode::UnknownNode)
                .with_value(graph)
                .with_str(start.clone())
        })?;
    let mut targets = Vec::new();
    let mut weights = Vec::new();
    let mut routes = Vec::new();
    for (target, entry) in &table {
        let route = entry.path.join(" -> ");
        context
            .sink
            .emit(&format!("{target}: {} via {route}", format_number(entry.weight)));
        targets.push(Value::string(target.clone()));
        weights.push(Value::number(entry.weight));
        routes.push(Value::string(route));
    }
    let frame = DataFrame::from_columns([
        ("node".to_string(), targets),
        ("weight".to_string(), weights),
        ("path".to_string(), routes),
    ])
    .map_err(|ragged| {
        Diagnostic::error(ErrorCode::DimensionMismatch).with_str(ragged.column)
    })?;
    Ok(Value::new(ValueKind::DataFrame(frame)).into())
}
