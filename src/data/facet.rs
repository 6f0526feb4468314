use std::collections::BTreeSet;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::filter::{Dimension, DimensionKind, Selection};
use super::model::{Table, Value};

/// How a fresh session pre-selects membership facets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// Every option selected.
    All,
    /// Only the first `n` options (in ascending order) selected.
    FirstN { n: usize },
}

impl Default for DefaultPolicy {
    fn default() -> Self {
        DefaultPolicy::FirstN { n: 5 }
    }
}

/// Sorted, duplicate-free, non-null values of `column`.
///
/// Values are compared in the column's comparison domain: numeric for
/// numeric columns, text for everything else. An unknown column yields an
/// empty sequence.
pub fn distinct_values(table: &Table, column: &str) -> Vec<Value> {
    let Some(col) = table.column_index(column) else {
        warn!("table '{}' has no column '{column}'", table.name());
        return Vec::new();
    };
    let ty = table.column_types()[col];
    let distinct: BTreeSet<Value> = table
        .rows()
        .iter()
        .map(|row| &row.cells()[col])
        .filter(|v| !v.is_null())
        .map(|v| v.comparable(ty).into_owned())
        .collect();
    distinct.into_iter().collect()
}

/// One dimension together with its selectable options.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facet {
    pub dimension: Dimension,
    pub values: Vec<Value>,
}

impl Facet {
    /// Smallest and largest numeric option, if any.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        let mut numbers = self.values.iter().filter_map(Value::as_f64);
        let first = numbers.next()?;
        Some(numbers.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }
}

/// Distinct options for every dimension of a page, built once per session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FacetIndex {
    facets: Vec<Facet>,
}

impl FacetIndex {
    pub fn build(table: &Table, dimensions: &[Dimension]) -> Self {
        let facets = dimensions
            .iter()
            .map(|dimension| {
                let values = distinct_values(table, &dimension.column);
                debug!(
                    "facet '{}': {} option(s)",
                    dimension.column,
                    values.len()
                );
                Facet {
                    dimension: dimension.clone(),
                    values,
                }
            })
            .collect();
        FacetIndex { facets }
    }

    pub fn get(&self, column: &str) -> Option<&Facet> {
        self.facets.iter().find(|f| f.dimension.column == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Facet> {
        self.facets.iter()
    }

    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    /// Initial selection: range facets span their full extent, membership
    /// facets follow `policy`. A range facet without numeric options is left
    /// unconstrained.
    pub fn default_selection(&self, policy: DefaultPolicy) -> Selection {
        let mut selection = Selection::new();
        for facet in &self.facets {
            match (facet.dimension.kind, policy) {
                (DimensionKind::Range, _) | (DimensionKind::Membership, DefaultPolicy::All) => {
                    selection.select_all(facet)
                }
                (DimensionKind::Membership, DefaultPolicy::FirstN { n }) => selection
                    .set_members(
                        facet.dimension.column.clone(),
                        facet.values.iter().take(n).cloned(),
                    ),
            }
        }
        selection
    }
}
