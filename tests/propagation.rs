use indexmap::IndexMap;
use reckon::{
    diagnostics::{Code, ErrorCode},
    linear::{Infeasible, LpProblem, LpSolution, LpSolver},
    Document, LineId, LineState, Settings, Value,
};

fn number(document: &Document, name: &str) -> Option<f64> {
    document.value_of(name).and_then(|value| value.as_number())
}

fn numbers(document: &Document, name: &str) -> Option<Vec<f64>> {
    document
        .value_of(name)
        .and_then(|value| value.as_vector().and_then(|array| array.numbers()))
}

fn state(document: &Document, id: LineId) -> Option<LineState> {
    document.outcome(id).map(|outcome| outcome.state)
}

fn error(document: &Document, id: LineId) -> Option<Code> {
    document
        .outcome(id)
        .and_then(|outcome| outcome.error.map(|error| error.code))
}

#[test]
fn editing_a_declaration_updates_dependents_only() {
    let mut document = Document::new();
    let x = document.push("x = 5");
    let y = document.push("y = x + 1");
    document.push("z = 2 * 21");
    document.push("w = y * 2");
    assert_eq!(number(&document, "w"), Some(12.0));

    assert!(document.edit(x, "x = 10"));
    assert_eq!(number(&document, "y"), Some(11.0));
    assert_eq!(number(&document, "w"), Some(22.0));
    assert_eq!(document.last_pass(), 3);
    assert_eq!(state(&document, y), Some(LineState::Resolved));
}

#[test]
fn circular_declarations_are_rejected() {
    let mut document = Document::new();
    let a = document.push("a = b + 1");
    let b = document.push("b = a + 1");
    assert_eq!(error(&document, b), Some(Code::Error(ErrorCode::CircularDependency)));
    assert_eq!(number(&document, "a"), None);
    assert_eq!(number(&document, "b"), None);

    document.edit(b, "b = 3");
    assert_eq!(state(&document, a), Some(LineState::Resolved));
    assert_eq!(number(&document, "a"), Some(4.0));
}

#[test]
fn removing_a_line_invalidates_its_readers() {
    let mut document = Document::new();
    let x = document.push("x = 1");
    let y = document.push("y = x + 1");
    assert!(document.remove(x));
    assert_eq!(document.len(), 1);
    assert_eq!(error(&document, y), Some(Code::Error(ErrorCode::UnknownName)));
    assert!(!document.remove(x));
}

#[test]
fn duplicate_declarations_recover_when_the_first_goes_away() {
    let mut document = Document::new();
    let first = document.push("x = 1");
    let second = document.push("x = 2");
    assert_eq!(
        error(&document, second),
        Some(Code::Error(ErrorCode::DuplicateDeclaration))
    );
    assert_eq!(number(&document, "x"), Some(1.0));

    document.remove(first);
    assert_eq!(state(&document, second), Some(LineState::Resolved));
    assert_eq!(number(&document, "x"), Some(2.0));
}

#[test]
fn appends_compose_across_lines() {
    let mut document = Document::new();
    let base = document.push("v = [1, 2]");
    document.push("v << 3");
    document.push("n = stats.count(v)");
    assert_eq!(numbers(&document, "v"), Some(vec![1.0, 2.0, 3.0]));
    assert_eq!(number(&document, "n"), Some(3.0));

    document.edit(base, "v = [7]");
    assert_eq!(numbers(&document, "v"), Some(vec![7.0, 3.0]));
    assert_eq!(number(&document, "n"), Some(2.0));
}

#[test]
fn decision_variables_may_span_lines() {
    let mut document = Document::new();
    let first = document.push("x, y is Variable");
    let second = document.push("x is Variable");
    assert_eq!(state(&document, first), Some(LineState::Resolved));
    assert_eq!(state(&document, second), Some(LineState::Resolved));
}

#[test]
fn imports_repair_unqualified_calls() {
    let mut document = Document::new();
    let m = document.push("m = median([5, 1, 3])");
    assert_eq!(state(&document, m), Some(LineState::Error));

    let import = document.insert(0, "import stats");
    assert_eq!(number(&document, "m"), Some(3.0));

    document.remove(import);
    assert_eq!(state(&document, m), Some(LineState::Error));
}

#[test]
fn user_function_edits_reach_callers() {
    let mut document = Document::new();
    let f = document.push("f(x) = x + 1");
    document.push("y = f(2)");
    assert_eq!(number(&document, "y"), Some(3.0));
    document.edit(f, "f(x) = x * 10");
    assert_eq!(number(&document, "y"), Some(20.0));
}

#[test]
fn debounced_edits_keep_the_last_text() {
    let mut document = Document::new();
    let x = document.push("x = 1");
    document.push("y = x + 1");
    document.queue_edit(x, "x = 2");
    document.queue_edit(x, "x = 40");
    assert_eq!(number(&document, "y"), Some(2.0));
    document.flush();
    assert_eq!(number(&document, "y"), Some(41.0));
}

#[test]
fn macros_run_only_on_execute() {
    let mut document = Document::new();
    document.push("m = 2");
    let print = document.push("print!(m * 3)");
    assert_eq!(state(&document, print), Some(LineState::Resolved));

    let mut output: Vec<String> = Vec::new();
    assert_eq!(document.execute(&mut output), 1);
    assert_eq!(output, vec!["6".to_string()]);
}

#[test]
fn missing_solver_is_reported_on_execute() {
    let mut document = Document::new();
    document.push("x is Variable");
    let solve = document.push("solve!(lp.maximize(2x, x <= 4))");
    let mut output: Vec<String> = Vec::new();
    document.execute(&mut output);
    assert_eq!(error(&document, solve), Some(Code::Error(ErrorCode::NoSolver)));
}

struct FixedSolver;

impl LpSolver for FixedSolver {
    fn solve(&self, problem: &LpProblem) -> Result<LpSolution, Infeasible> {
        let variables = problem.variables();
        Ok(LpSolution {
            objective_value: 8.0,
            variable_values: variables.iter().map(|name| (name.to_string(), 4.0)).collect(),
            reduced_cost: variables.iter().map(|name| (name.to_string(), 0.5)).collect(),
            slacks: vec![0.0; problem.constraints.len()],
            dual: vec![2.0; problem.constraints.len()],
        })
    }
}

fn slot(value: &Value, name: &str) -> Value {
    let array = value.as_array().expect("named list");
    let names = array.names.as_ref().expect("slot names");
    let at = names.iter().position(|slot| slot == name).expect("slot present");
    array.items[at].clone()
}

fn named(value: &Value) -> IndexMap<String, f64> {
    let array = value.as_array().expect("named vector");
    let names = array.names.clone().expect("names");
    names
        .into_iter()
        .zip(array.items.iter().map(|item| item.as_number().expect("number")))
        .collect()
}

#[test]
fn solve_reports_sensitivity_alongside_the_optimum() {
    let mut document = Document::new();
    document.set_solver(Box::new(FixedSolver));
    document.push("x is Variable");
    let solve = document.push("solve!(lp.maximize(2x, x <= 4))");
    let mut output: Vec<String> = Vec::new();
    assert_eq!(document.execute(&mut output), 1);
    assert_eq!(
        output,
        vec![
            "objective = 8".to_string(),
            "x = 4".to_string(),
            "reduced cost of x = 0.5".to_string(),
            "constraint 1: slack = 0, dual = 2".to_string(),
        ]
    );

    let outcome = document.outcome(solve).expect("line exists");
    assert_eq!(outcome.state, LineState::Resolved);
    let result = outcome.value.expect("solution");
    assert_eq!(slot(result, "objective").as_number(), Some(8.0));
    assert_eq!(named(&slot(result, "values")).get("x"), Some(&4.0));
    assert_eq!(named(&slot(result, "reduced_cost")).get("x"), Some(&0.5));
    let slacks = slot(result, "slacks");
    assert_eq!(slacks.as_vector().and_then(|a| a.numbers()), Some(vec![0.0]));
    let dual = slot(result, "dual");
    assert_eq!(dual.as_vector().and_then(|a| a.numbers()), Some(vec![2.0]));
}

#[test]
#[should_panic(expected = "propagation exceeded")]
fn runaway_propagation_panics() {
    let mut document = Document::with_settings(Settings::new().with_propagation_cap(2));
    let x = document.push("x = 1");
    document.push("y = x");
    document.push("z = y");
    document.edit(x, "x = 2");
}
