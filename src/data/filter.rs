use std::collections::{BTreeMap, BTreeSet};

use log::warn;
use serde::{Deserialize, Serialize};

use super::facet::Facet;
use super::model::{columns, ColumnType, RowRef, Table, Value};

// ---------------------------------------------------------------------------
// Dimensions – which columns a page filters on, and how
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    /// Inclusive numeric interval (a slider).
    Range,
    /// Set of accepted values (a multiselect).
    Membership,
}

/// A filterable column of the songs table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub column: String,
    pub kind: DimensionKind,
}

impl Dimension {
    pub fn new(column: impl Into<String>, kind: DimensionKind) -> Self {
        Dimension {
            column: column.into(),
            kind,
        }
    }

    pub fn year() -> Self {
        Dimension::new(columns::RELEASE_YEAR, DimensionKind::Range)
    }

    pub fn artist() -> Self {
        Dimension::new(columns::ARTIST, DimensionKind::Membership)
    }

    pub fn album() -> Self {
        Dimension::new(columns::ALBUM, DimensionKind::Membership)
    }

    pub fn genre() -> Self {
        Dimension::new(columns::GENRE, DimensionKind::Membership)
    }

    /// Year range plus artist, album and genre membership.
    pub fn standard() -> Vec<Dimension> {
        vec![
            Dimension::year(),
            Dimension::artist(),
            Dimension::album(),
            Dimension::genre(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Selection – the user's current choice per dimension
// ---------------------------------------------------------------------------

/// One per-column predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `lower <= value <= upper`; non-numeric and null values never match.
    Range { lower: f64, upper: f64 },
    /// `value ∈ values`. An empty set matches nothing.
    Members(BTreeSet<Value>),
}

impl Predicate {
    pub fn matches(&self, value: &Value, ty: ColumnType) -> bool {
        match self {
            Predicate::Range { lower, upper } => value
                .as_f64()
                .is_some_and(|v| v >= *lower && v <= *upper),
            Predicate::Members(values) => {
                !value.is_null() && values.contains(value.comparable(ty).as_ref())
            }
        }
    }
}

/// Conjunction of predicates keyed by column name. A column without a
/// predicate is unconstrained; a column whose member set is empty hides
/// every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    predicates: BTreeMap<String, Predicate>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Predicate> {
        self.predicates.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Predicate)> {
        self.predicates.iter().map(|(c, p)| (c.as_str(), p))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn set_range(&mut self, column: impl Into<String>, lower: f64, upper: f64) {
        self.predicates
            .insert(column.into(), Predicate::Range { lower, upper });
    }

    pub fn set_members<I>(&mut self, column: impl Into<String>, values: I)
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.predicates
            .insert(column.into(), Predicate::Members(values));
    }

    /// Toggle a single value in a column's member set. A column without a
    /// membership predicate starts from the empty set.
    pub fn toggle(&mut self, column: &str, value: &Value) {
        let entry = self
            .predicates
            .entry(column.to_string())
            .or_insert_with(|| Predicate::Members(BTreeSet::new()));
        if !matches!(entry, Predicate::Members(_)) {
            *entry = Predicate::Members(BTreeSet::new());
        }
        if let Predicate::Members(selected) = entry {
            if !selected.remove(value) {
                selected.insert(value.clone());
            }
        }
    }

    /// Select every option of a facet (the whole span for a range facet).
    pub fn select_all(&mut self, facet: &Facet) {
        match facet.dimension.kind {
            DimensionKind::Membership => {
                self.set_members(facet.dimension.column.clone(), facet.values.iter().cloned())
            }
            DimensionKind::Range => match facet.bounds() {
                Some((lower, upper)) => {
                    self.set_range(facet.dimension.column.clone(), lower, upper)
                }
                None => self.clear(&facet.dimension.column),
            },
        }
    }

    /// Deselect everything in a column, which empties the view.
    pub fn select_none(&mut self, column: &str) {
        self.predicates
            .insert(column.to_string(), Predicate::Members(BTreeSet::new()));
    }

    /// Drop the column's predicate altogether.
    pub fn clear(&mut self, column: &str) {
        self.predicates.remove(column);
    }
}

// ---------------------------------------------------------------------------
// View – rows of a table that pass a selection
// ---------------------------------------------------------------------------

/// A read-only restriction of a table to some of its rows, in source order
/// unless produced by a sort. The table itself is borrowed, never copied.
#[derive(Debug, Clone)]
pub struct View<'a> {
    table: &'a Table,
    indices: Vec<usize>,
}

impl<'a> View<'a> {
    /// Every row of `table`.
    pub fn all(table: &'a Table) -> Self {
        View {
            table,
            indices: (0..table.len()).collect(),
        }
    }

    pub(crate) fn from_indices(table: &'a Table, indices: Vec<usize>) -> Self {
        View { table, indices }
    }

    pub fn table(&self) -> &'a Table {
        self.table
    }

    /// Row indices into the source table.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = RowRef<'a>> + '_ {
        self.indices.iter().filter_map(|&i| self.table.row(i))
    }

    /// Values of `column` for every row in the view, or `None` if the table
    /// has no such column.
    pub fn values(&self, column: &str) -> Option<impl Iterator<Item = &'a Value> + '_> {
        let col = self.table.column_index(column)?;
        let table = self.table;
        Some(self.indices.iter().map(move |&i| table.value(i, col)))
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.table.column_type(column)
    }
}

/// Return the rows of `table` that pass every predicate of `selection`.
///
/// A row passes a column predicate when:
/// * range: its value is numeric and within `[lower, upper]`
/// * membership: its value is non-null and in the selected set
///
/// Predicates on columns the table lacks match nothing.
pub fn apply<'a>(table: &'a Table, selection: &Selection) -> View<'a> {
    let mut resolved = Vec::with_capacity(selection.predicates.len());
    for (column, predicate) in &selection.predicates {
        match table.column_index(column) {
            Some(col) => resolved.push((col, table.column_types()[col], predicate)),
            None => {
                warn!("table '{}' has no column '{column}' to filter on", table.name());
                return View::from_indices(table, Vec::new());
            }
        }
    }

    let indices = (0..table.len())
        .filter(|&row| {
            resolved
                .iter()
                .all(|(col, ty, predicate)| predicate.matches(table.value(row, *col), *ty))
        })
        .collect();

    View::from_indices(table, indices)
}

/// Rows of `table` where any of `columns` holds one of `keys` (compared as
/// text). Used to carry a song selection over to the artist tables.
pub fn related<'a>(table: &'a Table, columns: &[&str], keys: &BTreeSet<Value>) -> View<'a> {
    let cols: Vec<usize> = columns
        .iter()
        .filter_map(|c| table.column_index(c))
        .collect();

    let indices = (0..table.len())
        .filter(|&row| {
            cols.iter().any(|&col| {
                let value = table.value(row, col);
                !value.is_null() && keys.contains(value.comparable(ColumnType::Text).as_ref())
            })
        })
        .collect();

    View::from_indices(table, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::facet::{DefaultPolicy, FacetIndex};
    use crate::data::model::Row;

    fn table() -> Table {
        Table::new(
            "songs",
            vec![
                "artist".into(),
                "release_year".into(),
                "Album".into(),
                "genre".into(),
            ],
            vec![
                ColumnType::Text,
                ColumnType::Year,
                ColumnType::Text,
                ColumnType::Text,
            ],
            vec![
                Row::new(vec!["A".into(), Value::Integer(2000), "X".into(), "pop".into()]),
                Row::new(vec!["B".into(), Value::Integer(2001), "Y".into(), "rock".into()]),
                Row::new(vec!["C".into(), Value::Null, Value::Null, "pop".into()]),
            ],
        )
    }

    fn scenario_selection() -> Selection {
        let mut selection = Selection::new();
        selection.set_range("release_year", 2000.0, 2000.0);
        selection.set_members("artist", ["A", "B"]);
        selection.set_members("Album", ["X", "Y"]);
        selection.set_members("genre", ["pop", "rock"]);
        selection
    }

    #[test]
    fn conjunction_of_range_and_membership() {
        let table = table();
        let view = apply(&table, &scenario_selection());
        assert_eq!(view.indices(), &[0]);
    }

    #[test]
    fn range_is_inclusive_on_both_ends() {
        let table = table();
        let mut selection = Selection::new();
        selection.set_range("release_year", 2000.0, 2001.0);
        assert_eq!(apply(&table, &selection).indices(), &[0, 1]);
    }

    #[test]
    fn null_values_never_match() {
        let table = table();
        let mut selection = Selection::new();
        selection.set_range("release_year", 0.0, 9999.0);
        assert_eq!(apply(&table, &selection).len(), 2);

        let mut selection = Selection::new();
        selection.set_members("Album", [Value::Null]);
        assert!(apply(&table, &selection).is_empty());
    }

    #[test]
    fn empty_member_set_hides_everything() {
        let table = table();
        for column in ["artist", "Album", "genre"] {
            let mut selection = scenario_selection();
            selection.set_range("release_year", 0.0, 9999.0);
            selection.select_none(column);
            assert!(apply(&table, &selection).is_empty(), "{column}");
        }
    }

    #[test]
    fn no_predicates_keeps_every_row() {
        let table = table();
        assert_eq!(apply(&table, &Selection::new()).len(), 3);
    }

    #[test]
    fn apply_is_idempotent() {
        let table = table();
        let selection = scenario_selection();
        let first = apply(&table, &selection);
        let second = apply(&table, &selection);
        assert_eq!(first.indices(), second.indices());
    }

    #[test]
    fn unknown_column_matches_nothing() {
        let table = table();
        let mut selection = Selection::new();
        selection.set_members("mood", ["happy"]);
        assert!(apply(&table, &selection).is_empty());
    }

    #[test]
    fn toggle_adds_and_removes() {
        let mut selection = Selection::new();
        let a = Value::from("A");
        selection.toggle("artist", &a);
        assert_eq!(
            selection.get("artist"),
            Some(&Predicate::Members(BTreeSet::from([a.clone()])))
        );
        selection.toggle("artist", &a);
        assert_eq!(
            selection.get("artist"),
            Some(&Predicate::Members(BTreeSet::new()))
        );
    }

    #[test]
    fn related_matches_any_column() {
        let info = Table::new(
            "artist_info",
            vec!["nome".into(), "banda".into()],
            vec![ColumnType::Text, ColumnType::Text],
            vec![
                Row::new(vec!["Louis".into(), "One Direction".into()]),
                Row::new(vec!["Adele".into(), Value::Null]),
                Row::new(vec!["Zayn".into(), "One Direction".into()]),
            ],
        );
        let keys = BTreeSet::from([Value::from("One Direction")]);
        let view = related(&info, &["nome", "banda"], &keys);
        assert_eq!(view.indices(), &[0, 2]);

        let keys = BTreeSet::from([Value::from("Adele")]);
        assert_eq!(related(&info, &["nome", "banda"], &keys).indices(), &[1]);
    }

    #[test]
    fn members_match_integers_stored_in_float_columns() {
        let table = Table::new(
            "songs",
            vec!["score".into()],
            vec![ColumnType::Float],
            vec![
                Row::new(vec![Value::Float(0.5)]),
                Row::new(vec![Value::Integer(1)]),
            ],
        );
        let index = FacetIndex::build(
            &table,
            &[Dimension::new("score", DimensionKind::Membership)],
        );
        let selection = index.default_selection(DefaultPolicy::All);
        assert_eq!(apply(&table, &selection).indices(), &[0, 1]);

        let mut selection = Selection::new();
        selection.set_members("score", [1.0]);
        assert_eq!(apply(&table, &selection).indices(), &[1]);
    }
}
