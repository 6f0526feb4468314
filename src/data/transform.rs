use log::debug;

use super::model::{columns, Row, Table, Value};
use crate::error::TransformError;

/// Flip the polarity of sentiment columns (multiply by −1).
///
/// Some song exports store score and emotion intensities with the opposite
/// sign convention. The transform is opt-in, returns a new table and leaves
/// the input untouched, so a shared dataset stays valid for every other
/// reader. Applying it twice restores the original values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignInversion {
    columns: Vec<String>,
}

impl Default for SignInversion {
    /// `score` plus every emotion intensity column.
    fn default() -> Self {
        let mut names = vec![columns::SCORE.to_string()];
        names.extend(columns::EMOTIONS.iter().map(|c| c.to_string()));
        SignInversion { columns: names }
    }
}

impl SignInversion {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SignInversion {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Derive a table with the configured columns negated. Every column must
    /// exist and be numeric; nulls stay null.
    pub fn apply(&self, table: &Table) -> Result<Table, TransformError> {
        let mut targets = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            let index = table
                .column_index(column)
                .ok_or_else(|| TransformError::MissingColumn {
                    table: table.name().to_string(),
                    column: column.clone(),
                })?;
            if !table.column_types()[index].is_numeric() {
                return Err(TransformError::NonNumeric {
                    table: table.name().to_string(),
                    column: column.clone(),
                });
            }
            targets.push(index);
        }

        let rows = table
            .rows()
            .iter()
            .map(|row| {
                let mut cells = row.cells().to_vec();
                for &index in &targets {
                    cells[index] = match &cells[index] {
                        Value::Integer(i) => Value::Integer(i.wrapping_neg()),
                        Value::Float(f) if *f == 0.0 => Value::Float(0.0),
                        Value::Float(f) => Value::Float(-f),
                        other => other.clone(),
                    };
                }
                Row::new(cells)
            })
            .collect();

        debug!(
            "inverted sign of {} column(s) in '{}'",
            targets.len(),
            table.name()
        );
        Ok(Table::new(
            table.name(),
            table.column_names().to_vec(),
            table.column_types().to_vec(),
            rows,
        ))
    }

    /// Like [`SignInversion::apply`], but skips configured columns the table
    /// does not have.
    pub fn apply_present(&self, table: &Table) -> Result<Table, TransformError> {
        let present = self
            .columns
            .iter()
            .filter(|c| table.has_column(c))
            .cloned();
        SignInversion::new(present).apply(table)
    }
}
