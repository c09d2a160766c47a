use super::{Args, Module, Param, Produced, ANY, STRING};
use crate::{
    diagnostics::Diagnostic,
    ops,
    value::{Kind, Value, ValueKind},
};

const CONVERT: &[Param] = &[Param::required("x", ANY), Param::required("unit", STRING)];
const MEASURED: &[Param] = &[Param::required("x", &[Kind::Measurement])];

pub(super) fn module() -> Module {
    let mut module = Module::new("units", false);
    module.function("convert", CONVERT, |args| {
        ops::convert_units(args.value("x")?, args.string("unit")?).map(Produced::from)
    });
    module.function("magnitude", MEASURED, |args| {
        measured(args, |m| Value::number(m.value()))
    });
    module.function("unit", MEASURED, |args| {
        measured(args, |m| Value::string(m.unit_text()))
    });
    module
}

fn measured(
    args: &Args,
    f: impl FnOnce(&crate::units::Measurement) -> Value,
) -> Result<Produced, Diagnostic> {
    let value = args.value("x")?;
    match &*value.kind {
        ValueKind::Measurement(m) => Ok(f(m).into()),
        _ => Err(args.type_error("x", Kind::Measurement, value)),
    }
}
