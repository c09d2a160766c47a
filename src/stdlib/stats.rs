use super::{Args, Module, Param, Produced, ANY, NUMBER, NUMBERS};
use crate::{
    diagnostics::Diagnostic,
    stats::{self, StatTestResult, StatsError},
    value::{Value, ValueKind},
};

const VALUES: &[Param] = &[Param::variadic("values", ANY)];
const SAMPLES: &[Param] = &[Param::required("x", NUMBERS), Param::required("y", NUMBERS)];
const TTEST: &[Param] = &[
    Param::required("x", NUMBERS),
    Param::optional("y", NUMBERS),
    Param::optional("mu", NUMBER),
];
const ZTEST: &[Param] = &[
    Param::required("x", NUMBERS),
    Param::required("sigma", NUMBER),
    Param::optional("mu", NUMBER),
];

pub(super) fn module() -> Module {
    let mut module = Module::new("stats", false);
    module.function("mean", VALUES, |args| summary(args, stats::mean));
    module.function("median", VALUES, |args| summary(args, stats::median));
    module.function("variance", VALUES, |args| summary(args, stats::variance));
    module.function("stdev", VALUES, |args| summary(args, stats::stdev));
    module.function("product", VALUES, |args| {
        Ok(Value::number(stats::product(&args.numbers()?)).into())
    });
    module.function("count", VALUES, count);
    module.function("cor", SAMPLES, |args| {
        stats::correlation(&args.vector_numbers("x")?, &args.vector_numbers("y")?)
            .map(|r| Value::number(r).into())
            .map_err(|err| args.stats_error(err))
    });
    module.function("ttest", TTEST, ttest);
    module.function("ztest", ZTEST, |args| {
        let result = stats::ztest(
            &args.vector_numbers("x")?,
            args.number_or("mu", 0.0)?,
            args.number("sigma")?,
        );
        test_value(args, result)
    });
    module
}

fn summary(args: &Args, f: fn(&[f64]) -> Result<f64, StatsError>) -> Result<Produced, Diagnostic> {
    f(&args.numbers()?)
        .map(|n| Value::number(n).into())
        .map_err(|err| args.stats_error(err))
}

/// Counts elements of every kind, flattening vectors.
fn count(args: &Args) -> Result<Produced, Diagnostic> {
    let n: usize = args
        .rest()
        .iter()
        .map(|value| match &*value.kind {
            ValueKind::Array(array) if !array.is_matrix() => array.len(),
            ValueKind::DataFrame(frame) => frame.height(),
            _ => 1,
        })
        .sum();
    Ok(Value::number(n as f64).into())
}

/// One-sample test against `mu` when `y` is absent, Welch's test otherwise.
fn ttest(args: &Args) -> Result<Produced, Diagnostic> {
    let x = args.vector_numbers("x")?;
    let result = match args.get("y") {
        Some(_) => stats::ttest_welch(&x, &args.vector_numbers("y")?),
        None => stats::ttest_one(&x, args.number_or("mu", 0.0)?),
    };
    test_value(args, result)
}

fn test_value(args: &Args, result: Result<StatTestResult, StatsError>) -> Result<Produced, Diagnostic> {
    result
        .map(|result| Value::new(ValueKind::StatTest(result)).into())
        .map_err(|err| args.stats_error(err))
}
