use super::{Args, Module, Param, Produced, NUMBERS, STRING};
use crate::{
    diagnostics::{Diagnostic, ErrorCode},
    plot::{Plot, PlotKind},
    value::{Value, ValueKind},
};

const SERIES: &[Param] = &[
    Param::required("y", NUMBERS),
    Param::optional("x", NUMBERS),
    Param::optional("label", STRING),
];

pub(super) fn module() -> Module {
    let mut module = Module::new("plot", false);
    module.function("plot", SERIES, |args| chart(args, PlotKind::Line));
    module.function("scatter", SERIES, |args| chart(args, PlotKind::Scatter));
    module
}

fn chart(args: &Args, kind: PlotKind) -> Result<Produced, Diagnostic> {
    let ys = args.vector_numbers("y")?;
    let xs = match args.get("x") {
        Some(_) => Some(args.vector_numbers("x")?),
        None => None,
    };
    let y = args.value("y")?;
    let label = match args.get("label") {
        Some(_) => args.string("label")?.to_string(),
        None => y.meta.name.clone().unwrap_or_else(|| "y".to_string()),
    };
    let (x_len, y_len) = (xs.as_ref().map(Vec::len), ys.len());
    Plot::single(kind, label, xs, ys)
        .map(|plot| Value::new(ValueKind::Plot(plot)).into())
        .ok_or_else(|| {
            Diagnostic::error(ErrorCode::DimensionMismatch).with_str(format!(
                "x has {} points, y has {y_len}",
                x_len.unwrap_or(0)
            ))
        })
}
