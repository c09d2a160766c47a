use super::{Args, Module, Param, Produced, ANY, NUMBER, STRING};
use crate::{
    diagnostics::{Diagnostic, ErrorCode, WarningCode},
    table::DataFrame,
    value::{Kind, Value, ValueKind},
};

const BUILD: &[Param] = &[
    Param {
        required: false,
        ..Param::variadic("columns", ANY)
    },
    Param::keywords("named"),
];
const COLUMN: &[Param] = &[
    Param::required("df", &[Kind::DataFrame]),
    Param::required("name", STRING),
];
const ROW: &[Param] = &[
    Param::required("df", &[Kind::DataFrame]),
    Param::required("i", NUMBER),
];
const FRAME: &[Param] = &[Param::required("df", &[Kind::DataFrame])];

pub(super) fn module() -> Module {
    let mut module = Module::new("table", false);
    module.function("table", BUILD, table);
    module.function("column", COLUMN, |args| {
        let (frame, name) = (frame_arg(args)?, args.string("name")?);
        let df = args.value("df")?;
        frame
            .column(name)
            .map(|cells| Value::vector(cells.to_vec()).into())
            .ok_or_else(|| {
                Diagnostic::error(ErrorCode::NamedIndexMissing)
                    .with_value(df)
                    .with_str(name)
            })
    });
    module.function("row", ROW, |args| {
        let frame = frame_arg(args)?;
        let i = args.integer("i")?;
        let index = resolve_row(i, frame.height()).ok_or_else(|| {
            Diagnostic::error(ErrorCode::IndexOutOfBounds)
                .with_name(i.to_string())
                .with_str(frame.height().to_string())
        })?;
        frame
            .row_value(index)
            .map(Produced::from)
            .ok_or_else(|| Diagnostic::error(ErrorCode::IndexOutOfBounds).with_name(i.to_string()))
    });
    module.function("nrows", FRAME, |args| {
        Ok(Value::number(frame_arg(args)?.height() as f64).into())
    });
    module.function("ncols", FRAME, |args| {
        Ok(Value::number(frame_arg(args)?.width() as f64).into())
    });
    module.function("columns", FRAME, |args| {
        Ok(Value::strings(frame_arg(args)?.column_names().map(String::from)).into())
    });
    module
}

/// 1-based row index, negative counting from the end.
fn resolve_row(i: i64, height: usize) -> Option<usize> {
    let height = height as i64;
    let index = if i < 0 { height + i } else { i - 1 };
    (i != 0 && (0..height).contains(&index)).then_some(index as usize)
}

/// Builds a frame from named vector arguments, or from one named vector
/// whose slots are the columns.
fn table(args: &Args) -> Result<Produced, Diagnostic> {
    let mut columns: Vec<(String, Vec<Value>)> = Vec::new();
    for value in args.rest() {
        let array = value
            .as_vector()
            .ok_or_else(|| args.type_error("columns", Kind::LIST, value))?;
        let names = array
            .names
            .as_ref()
            .ok_or_else(|| args.type_error("columns", Kind::DataFrame, value))?;
        for (name, column) in names.iter().zip(&array.items) {
            columns.push((name.clone(), cells_of(args, column)?));
        }
    }
    for (name, column) in args.keywords() {
        columns.push((name.clone(), cells_of(args, column)?));
    }
    let mut produced_warnings = Vec::new();
    let mut unique: Vec<(String, Vec<Value>)> = Vec::with_capacity(columns.len());
    for (name, cells) in columns {
        if unique.iter().any(|(existing, _)| *existing == name) {
            produced_warnings.push(Diagnostic::warning(WarningCode::DuplicateNames).with_str(name));
            continue;
        }
        unique.push((name, cells));
    }
    let frame = DataFrame::from_columns(unique).map_err(|ragged| {
        Diagnostic::error(ErrorCode::DimensionMismatch).with_str(format!(
            "column {} has {} rows, expected {}",
            ragged.column, ragged.found, ragged.expected
        ))
    })?;
    Ok(Produced {
        value: Value::new(ValueKind::DataFrame(frame)),
        warnings: produced_warnings,
    })
}

fn cells_of(args: &Args, column: &Value) -> Result<Vec<Value>, Diagnostic> {
    column
        .as_vector()
        .map(|array| array.items.iter().map(|cell| cell.clone().unnamed()).collect())
        .ok_or_else(|| args.type_error("columns", Kind::LIST, column))
}

fn frame_arg(args: &Args) -> Result<&DataFrame, Diagnostic> {
    let value = args.value("df")?;
    match &*value.kind {
        ValueKind::DataFrame(frame) => Ok(frame),
        _ => Err(args.type_error("df", Kind::DataFrame, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_row;

    #[test]
    fn rows_are_one_based() {
        assert_eq!(resolve_row(1, 3), Some(0));
        assert_eq!(resolve_row(-1, 3), Some(2));
        assert_eq!(resolve_row(0, 3), None);
        assert_eq!(resolve_row(4, 3), None);
    }
}
