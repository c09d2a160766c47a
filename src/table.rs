use std::fmt;

use indexmap::IndexMap;

use crate::value::{Array, Value};

/// Column-oriented table. Every column has the same number of rows.
#[derive(Debug, Clone, Default)]
pub struct DataFrame {
    columns: IndexMap<String, Vec<Value>>,
    height: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaggedColumns {
    pub column: String,
    pub expected: usize,
    pub found: usize,
}

impl DataFrame {
    pub fn from_columns(
        columns: impl IntoIterator<Item = (String, Vec<Value>)>,
    ) -> Result<Self, RaggedColumns> {
        let mut frame = DataFrame::default();
        for (index, (name, cells)) in columns.into_iter().enumerate() {
            if index == 0 {
                frame.height = cells.len();
            } else if cells.len() != frame.height {
                return Err(RaggedColumns {
                    column: name,
                    expected: frame.height,
                    found: cells.len(),
                });
            }
            frame.columns.insert(name, cells);
        }
        Ok(frame)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.keys().map(String::as_str)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub fn column_at(&self, index: usize) -> Option<(&str, &[Value])> {
        self.columns
            .get_index(index)
            .map(|(name, cells)| (name.as_str(), cells.as_slice()))
    }

    /// Row `index` (0-based) as `(column, cell)` pairs.
    pub fn row(&self, index: usize) -> Option<Vec<(&str, &Value)>> {
        if index >= self.height {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|(name, cells)| (name.as_str(), &cells[index]))
                .collect(),
        )
    }

    /// Row `index` as a named vector.
    pub fn row_value(&self, index: usize) -> Option<Value> {
        let row = self.row(index)?;
        let names = row.iter().map(|(name, _)| name.to_string()).collect();
        let items = row.into_iter().map(|(_, cell)| cell.clone()).collect();
        let (array, _) = Array::vector(items);
        let (array, _) = array.with_names(names);
        Some(Value::array(array))
    }

    /// Keeps rows at the given 0-based indices, in that order.
    pub fn select_rows(&self, indices: &[usize]) -> DataFrame {
        let columns = self
            .columns
            .iter()
            .map(|(name, cells)| {
                (
                    name.clone(),
                    indices
                        .iter()
                        .filter_map(|&i| cells.get(i).cloned())
                        .collect(),
                )
            })
            .collect();
        DataFrame {
            columns,
            height: indices.iter().filter(|&&i| i < self.height).count(),
        }
    }

    pub fn approx_eq(&self, other: &DataFrame) -> bool {
        self.height == other.height
            && self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(&other.columns)
                .all(|((na, ca), (nb, cb))| {
                    na == nb && ca.iter().zip(cb).all(|(a, b)| a.equals(b, false, true))
                })
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header: Vec<&str> = self.column_names().collect();
        writeln!(f, "{}", header.join(" | "))?;
        for r in 0..self.height {
            let cells: Vec<String> = self
                .columns
                .values()
                .map(|cells| cells[r].to_string())
                .collect();
            write!(f, "{}", cells.join(" | "))?;
            if r + 1 < self.height {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn people() -> DataFrame {
        DataFrame::from_columns(vec![
            (
                "name".to_string(),
                vec![Value::string("ann"), Value::string("bob"), Value::string("cy")],
            ),
            (
                "age".to_string(),
                vec![Value::number(31.0), Value::number(25.0), Value::number(40.0)],
            ),
        ])
        .expect("same height")
    }

    #[test]
    fn rejects_ragged_columns() {
        let err = DataFrame::from_columns(vec![
            ("a".to_string(), vec![Value::number(1.0)]),
            ("b".to_string(), vec![]),
        ])
        .expect_err("ragged");
        assert_eq!(err.column, "b");
    }

    #[test]
    fn rows_are_named_vectors() {
        let row = people().row_value(1).expect("row exists");
        let array = row.as_vector().expect("vector");
        assert_eq!(array.name_index("age"), Some(1));
    }

    #[test]
    fn selecting_rows_keeps_order() {
        let frame = people().select_rows(&[2, 0]);
        assert_eq!(frame.height(), 2);
        let ages = frame.column("age").expect("column");
        assert_eq!(ages[0].as_number(), Some(40.0));
    }
}
