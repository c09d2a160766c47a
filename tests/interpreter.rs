use reckon::{
    diagnostics::{Code, ErrorCode, WarningCode},
    units::Measurement,
    value::{ElementKind, Kind, Value, ValueKind},
    Document, LineId, LineState,
};

fn document(source: &str) -> (Document, Vec<LineId>) {
    let mut document = Document::new();
    let ids = document.load(source);
    (document, ids)
}

fn value_of(source: &str, name: &str) -> Value {
    let (document, _) = document(source);
    document
        .value_of(name)
        .unwrap_or_else(|| panic!("{name} should be bound"))
}

fn number(source: &str, name: &str) -> f64 {
    value_of(source, name)
        .as_number()
        .unwrap_or_else(|| panic!("{name} should be a number"))
}

fn line_error(source: &str) -> Code {
    let (document, ids) = document(source);
    let last = *ids.last().expect("at least one line");
    let outcome = document.outcome(last).expect("line exists");
    assert_eq!(outcome.state, LineState::Error, "{} resolved", outcome.text);
    outcome.error.expect("error recorded").code
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-8,
        "expected {expected}, found {actual}"
    );
}

#[test]
fn addition_and_subtraction_are_exact_within_tolerance() {
    for (a, b) in [(1.5, 2.25), (-3.0, 7.0), (1e6, -0.001), (0.1, 0.2)] {
        let source = format!("s = {a} + {b}\nd = {a} - {b}");
        assert_close(number(&source, "s"), a + b);
        assert_close(number(&source, "d"), a - b);
    }
}

#[test]
fn vector_indices_are_one_based_and_signed() {
    let source = "v = [10, 20, 30]\nfirst = v[1]\nlast = v[-1]";
    assert_close(number(source, "first"), 10.0);
    assert_close(number(source, "last"), 30.0);
    assert_eq!(
        line_error("v = [10, 20, 30]\nv[0]"),
        Code::Error(ErrorCode::IndexZero)
    );
    assert_eq!(
        line_error("v = [10, 20, 30]\nv[4]"),
        Code::Error(ErrorCode::IndexOutOfBounds)
    );
}

#[test]
fn division_by_zero_is_a_typed_error() {
    assert_eq!(line_error("5 / 0"), Code::Error(ErrorCode::DivisionByZero));
}

#[test]
fn precedence_and_implicit_multiplication() {
    assert_close(number("x = -2^2", "x"), -4.0);
    assert_close(number("a = 3\nb = 2a + 1", "b"), 7.0);
    assert_close(number("c = 2^3^2", "c"), 512.0);
}

#[test]
fn chained_comparisons_are_conjunctions() {
    let value = value_of("t = 1 < 2 < 3\nf = 1 < 3 < 2", "t");
    assert_eq!(value.as_bool(), Some(true));
    let value = value_of("f = 1 < 3 < 2", "f");
    assert_eq!(value.as_bool(), Some(false));
}

#[test]
fn fallback_replaces_a_failing_test() {
    let (document, ids) = document("x = fa 1 / 0 fo 7");
    assert_close(document.value_of("x").and_then(|v| v.as_number()).unwrap_or_default(), 7.0);
    let outcome = document.outcome(ids[0]).expect("line exists");
    assert!(outcome.error.is_none());
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.code == Code::Warning(WarningCode::FallbackTaken)));
}

#[test]
fn assertions_fail_hard() {
    assert_eq!(line_error("assert 1 > 2"), Code::Error(ErrorCode::AssertionFailed));
    assert_eq!(line_error("assert 3"), Code::Error(ErrorCode::AssertionNotBoolean));
    let (document, ids) = document("assert 2 > 1");
    assert_eq!(document.outcome(ids[0]).map(|o| o.state), Some(LineState::Resolved));
}

#[test]
fn typed_declarations_cast_or_fail() {
    let value = value_of("b is Boolean = 1", "b");
    assert_eq!(value.as_bool(), Some(true));
    assert_eq!(line_error("n is Number = \"abc\""), Code::Error(ErrorCode::TypeDeclaration));
}

#[test]
fn user_functions_and_recursion() {
    let source = "f(n) = n <= 1 ? 1 : n * f(n - 1)\nr = f(5)";
    assert_close(number(source, "r"), 120.0);
    let source = "sq(x) = x^2\nr = 3 |> sq()";
    assert_close(number(source, "r"), 9.0);
}

#[test]
fn constructed_vectors() {
    let value = value_of("v = [x^2 for x = 1 to 4]", "v");
    let numbers = value.as_vector().and_then(|a| a.numbers()).expect("numbers");
    assert_eq!(numbers, vec![1.0, 4.0, 9.0, 16.0]);
    let value = value_of("v = [for x = 0 until 1 step 0.25]", "v");
    let numbers = value.as_vector().and_then(|a| a.numbers()).expect("numbers");
    assert_eq!(numbers, vec![0.0, 0.25, 0.5, 0.75]);
}

#[test]
fn nested_numeric_vectors_become_a_matrix() {
    let value = value_of("m = [[1, 2], [3, 4]]", "m");
    assert_eq!(value.kind(), Kind::Matrix(ElementKind::Number));
    assert_close(number("m = [[1, 2], [3, 4]]\nc = m[2]{1}", "c"), 3.0);
}

#[test]
fn named_indices_and_keyof() {
    let source = "p = [a: 1, b: 2]\nx = p[\"b\"]\ny = p.a\nk = \"a\" keyof p";
    assert_close(number(source, "x"), 2.0);
    assert_close(number(source, "y"), 1.0);
    assert_eq!(value_of(source, "k").as_bool(), Some(true));
}

#[test]
fn imports_expose_catalog_namespaces() {
    assert_close(number("m = stats.mean([1, 2, 3])", "m"), 2.0);
    assert_close(number("import stats\nm = median([5, 1, 3])", "m"), 3.0);
    assert_eq!(line_error("import nowhere"), Code::Error(ErrorCode::UnknownModule));
}

#[test]
fn clones_equal_their_source() {
    let source = "n = 4.5\nb = true\ns = \"text\"\nv = [1, 2]\nd = @2024-01-31\nm = [[1, 0], [0, 1]]\nq = 3`km`";
    let (document, _) = document(source);
    for name in ["n", "b", "s", "v", "d", "m", "q"] {
        let value = document.value_of(name).expect("bound");
        assert!(value.clone().equals(&value, false, true), "{name}");
    }
}

#[test]
fn casting_is_idempotent_and_typed() {
    let samples = [
        Value::number(1.0),
        Value::boolean(true),
        Value::string("a"),
        Value::numbers([1.0, 2.0]),
    ];
    for value in &samples {
        for target in [Kind::String, Kind::Number, Kind::Boolean, Kind::LIST] {
            if let Ok(once) = value.cast_to(target) {
                let twice = once.cast_to(target).expect("cast to own kind succeeds");
                assert!(once.equals(&twice, false, true));
            }
        }
    }
    let error = Value::string("a").cast_to(Kind::Network).expect_err("not castable");
    assert_eq!(error.code, Code::Error(ErrorCode::InvalidCast));
}

#[test]
fn measurement_conversion_round_trips() {
    let distance = Measurement::from_unit(5.0, "km").expect("known unit");
    let back = distance
        .convert("m")
        .and_then(|m| m.convert("km"))
        .expect("compatible units");
    assert!(distance.approx_eq(&back));
    assert_close(back.value(), 5.0);
    assert!(distance.convert("s").is_err());

    let value = value_of("d = 5`km` as `m`", "d");
    let ValueKind::Measurement(m) = &*value.kind else {
        panic!("expected a measurement, found {}", value.type_name());
    };
    assert_close(m.value(), 5000.0);
    assert_eq!(line_error("d = 5`km` as `s`"), Code::Error(ErrorCode::InvalidCast));
}

#[test]
fn date_arithmetic() {
    let source = "a = @2024-01-31\nb = @2024-02-10\ngap = b - a";
    let (document, ids) = document(source);
    assert!(document.outcome(ids[2]).and_then(|o| o.error).is_none());
}

#[test]
fn oversized_date_offsets_are_line_errors() {
    for source in [
        "y = date.years(200000000)",
        "w = date.weeks(9000000000000000000)",
        "s = date.days(9e18) + date.days(9e18)",
        "p = date.days(2) * 10000000000000000000",
    ] {
        assert_eq!(line_error(source), Code::Error(ErrorCode::OffsetOverflow), "{source}");
    }
    let (document, ids) = document("q = date.years(2) + date.months(3)");
    assert_eq!(document.outcome(ids[0]).map(|o| o.state), Some(LineState::Resolved));
}

#[test]
fn oversized_unit_powers_are_line_errors() {
    assert_eq!(
        line_error("a = (2`m^2`) ^ 2000000000"),
        Code::Error(ErrorCode::UnitOverflow)
    );
    let value = value_of("a = (2`m`) ^ 3", "a");
    let ValueKind::Measurement(m) = &*value.kind else {
        panic!("expected a measurement, found {}", value.type_name());
    };
    assert_close(m.value(), 8.0);
}

#[test]
fn identity_matrices_are_capped() {
    let value = value_of("i = identity(3)", "i");
    assert_eq!(value.kind(), Kind::Matrix(ElementKind::Number));
    assert_eq!(line_error("i = identity(1000000)"), Code::Error(ErrorCode::RangeTooLarge));
}
