use chrono::NaiveDate;

use super::{Args, Module, Param, Produced, NUMBER, STRING};
use crate::{
    dates::{self, Offset},
    diagnostics::{Diagnostic, ErrorCode},
    value::{Kind, Value, ValueKind},
};

const TEXT: &[Param] = &[Param::required("text", STRING)];
const COUNT: &[Param] = &[Param::required("n", NUMBER)];
const DATE: &[Param] = &[Param::required("d", &[Kind::Date])];
const SPAN: &[Param] = &[
    Param::required("start", &[Kind::Date]),
    Param::required("end", &[Kind::Date]),
];

pub(super) fn module() -> Module {
    let mut module = Module::new("date", false);
    module.function("date", TEXT, |args| {
        let text = args.string("text")?;
        dates::parse_date(text)
            .map(|date| Value::date(date).into())
            .ok_or_else(|| Diagnostic::error(ErrorCode::InvalidDate).with_str(text))
    });
    module.function("days", COUNT, |args| offset(args, |n| Some(Offset::days(n))));
    module.function("weeks", COUNT, |args| offset(args, Offset::weeks));
    module.function("months", COUNT, |args| offset(args, Offset::months));
    module.function("years", COUNT, |args| offset(args, Offset::years));
    module.function("year", DATE, |args| part(args, |d| dates::year(d) as f64));
    module.function("month", DATE, |args| part(args, |d| dates::month(d) as f64));
    module.function("day", DATE, |args| part(args, |d| dates::day(d) as f64));
    module.function("weekday", DATE, |args| part(args, |d| dates::weekday(d) as f64));
    module.function("between", SPAN, |args| {
        let (start, end) = (date_arg(args, "start")?, date_arg(args, "end")?);
        Ok(Value::offset(dates::between(start, end)).into())
    });
    module
}

fn offset(args: &Args, build: fn(i64) -> Option<Offset>) -> Result<Produced, Diagnostic> {
    let count = args.value("n")?;
    build(args.integer("n")?)
        .map(|offset| Value::offset(offset).into())
        .ok_or_else(|| Diagnostic::error(ErrorCode::OffsetOverflow).with_value(count))
}

fn date_arg(args: &Args, name: &str) -> Result<NaiveDate, Diagnostic> {
    let value = args.value(name)?;
    match &*value.kind {
        ValueKind::Date(date) => Ok(*date),
        _ => Err(args.type_error(name, Kind::Date, value)),
    }
}

fn part(args: &Args, f: fn(NaiveDate) -> f64) -> Result<Produced, Diagnostic> {
    Ok(Value::number(f(date_arg(args, "d")?)).into())
}
