//! Aggregations over a [`View`].
//!
//! Every function here is total: an empty view, an unknown column or a column
//! without usable values yields the empty sentinel (`0`, `0.0`, an empty
//! result or [`Value::Null`]) instead of an error, so a presentation layer
//! can render "no data" uniformly.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::filter::View;
use super::model::{ColumnType, Value};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// One group of a grouped aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group<T> {
    pub key: Value,
    pub value: T,
}

/// Ordered mapping from group key to statistic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Grouped<T> {
    groups: Vec<Group<T>>,
}

impl<T> Default for Grouped<T> {
    fn default() -> Self {
        Grouped { groups: Vec::new() }
    }
}

impl<T> Grouped<T> {
    fn from_map(map: BTreeMap<Value, T>) -> Self {
        Grouped {
            groups: map
                .into_iter()
                .map(|(key, value)| Group { key, value })
                .collect(),
        }
    }

    pub fn get(&self, key: &Value) -> Option<&T> {
        self.groups.iter().find(|g| &g.key == key).map(|g| &g.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group<T>> {
        self.groups.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.groups.iter().map(|g| &g.key)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn into_groups(self) -> Vec<Group<T>> {
        self.groups
    }

    /// Keep only the first `n` groups.
    pub fn head(mut self, n: usize) -> Self {
        self.groups.truncate(n);
        self
    }
}

impl<T: PartialOrd> Grouped<T> {
    /// Re-order by statistic. The sort is stable, so equal statistics keep
    /// their current relative order.
    pub fn sorted_by_value(mut self, order: SortOrder) -> Self {
        self.groups.sort_by(|a, b| {
            let ord = a.value.partial_cmp(&b.value).unwrap_or(Ordering::Equal);
            match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
        self
    }
}

impl Grouped<f64> {
    /// Round every statistic to the nearest integer, halves to even (the
    /// rounding the reference dashboards use).
    pub fn rounded(mut self) -> Self {
        for group in &mut self.groups {
            group.value = group.value.round_ties_even();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

/// How [`mode`] picks among equally frequent values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The tied value that appears first in the view.
    #[default]
    FirstSeen,
    /// The smallest tied value.
    Smallest,
}

/// Five-number summary plus mean of one group, enough to draw a box plot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordCount {
    pub word: String,
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Column access helpers
// ---------------------------------------------------------------------------

fn column<'v, 'a>(
    view: &'v View<'a>,
    column: &str,
) -> Option<(ColumnType, impl Iterator<Item = &'a Value> + 'v)> {
    match (view.column_type(column), view.values(column)) {
        (Some(ty), Some(values)) => Some((ty, values)),
        _ => {
            warn!(
                "table '{}' has no column '{column}' to aggregate",
                view.table().name()
            );
            None
        }
    }
}

fn numbers(view: &View<'_>, col: &str) -> Vec<f64> {
    column(view, col)
        .map(|(_, values)| values.filter_map(Value::as_f64).filter(|v| !v.is_nan()).collect())
        .unwrap_or_default()
}

fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Pair each row's group key with its value in `value_column`.
fn keyed<'a>(view: &View<'a>, key: &str, value_column: &str) -> Vec<(Value, &'a Value)> {
    let (Some((key_ty, keys)), Some((_, values))) = (column(view, key), column(view, value_column))
    else {
        return Vec::new();
    };
    keys.zip(values)
        .map(|(k, v)| (k.comparable(key_ty).into_owned(), v))
        .collect()
}

/// Descending by count, ties by key ascending.
fn by_count_desc(map: BTreeMap<Value, usize>) -> Grouped<usize> {
    Grouped::from_map(map).sorted_by_value(SortOrder::Descending)
}

// ---------------------------------------------------------------------------
// Grouped aggregates
// ---------------------------------------------------------------------------

/// Rows per distinct value of `key`, largest group first; equal counts are
/// ordered by key ascending. Null keys form their own group, so the counts
/// always add up to `view.len()`.
pub fn count_by(view: &View<'_>, key: &str) -> Grouped<usize> {
    let Some((ty, keys)) = column(view, key) else {
        return Grouped::default();
    };
    let mut counts: BTreeMap<Value, usize> = BTreeMap::new();
    for k in keys {
        *counts.entry(k.comparable(ty).into_owned()).or_default() += 1;
    }
    by_count_desc(counts)
}

/// Arithmetic mean of `value_column` per distinct non-null `key`, ordered by
/// key. A group without numeric values reports `0.0`.
pub fn mean_by(view: &View<'_>, key: &str, value_column: &str) -> Grouped<f64> {
    let mut sums: BTreeMap<Value, (f64, usize)> = BTreeMap::new();
    for (k, v) in keyed(view, key, value_column) {
        if k.is_null() {
            continue;
        }
        let slot = sums.entry(k).or_default();
        if let Some(v) = v.as_f64().filter(|v| !v.is_nan()) {
            slot.0 += v;
            slot.1 += 1;
        }
    }
    Grouped::from_map(
        sums.into_iter()
            .map(|(k, (sum, n))| (k, if n == 0 { 0.0 } else { sum / n as f64 }))
            .collect(),
    )
}

/// Distinct non-null values of `value_column` per non-null `key`, largest
/// first; ties by key ascending.
pub fn nunique_by(view: &View<'_>, key: &str, value_column: &str) -> Grouped<usize> {
    let value_ty = view.column_type(value_column).unwrap_or(ColumnType::Text);
    let mut sets: BTreeMap<Value, std::collections::BTreeSet<Value>> = BTreeMap::new();
    for (k, v) in keyed(view, key, value_column) {
        if k.is_null() {
            continue;
        }
        let set = sets.entry(k).or_default();
        if !v.is_null() {
            set.insert(v.comparable(value_ty).into_owned());
        }
    }
    by_count_desc(sets.into_iter().map(|(k, set)| (k, set.len())).collect())
}

/// Distribution summary of `value_column` per non-null `key`, ordered by key.
pub fn summary_by(view: &View<'_>, key: &str, value_column: &str) -> Grouped<Summary> {
    let mut groups: BTreeMap<Value, Vec<f64>> = BTreeMap::new();
    for (k, v) in keyed(view, key, value_column) {
        if k.is_null() {
            continue;
        }
        let values = groups.entry(k).or_default();
        if let Some(v) = v.as_f64().filter(|v| !v.is_nan()) {
            values.push(v);
        }
    }
    Grouped::from_map(
        groups
            .into_iter()
            .map(|(k, mut values)| (k, summarize(&mut values)))
            .collect(),
    )
}

fn summarize(values: &mut [f64]) -> Summary {
    if values.is_empty() {
        return Summary::default();
    }
    values.sort_by(f64::total_cmp);
    Summary {
        count: values.len(),
        min: values[0],
        q1: quantile(values, 0.25),
        median: quantile(values, 0.5),
        q3: quantile(values, 0.75),
        max: values[values.len() - 1],
        mean: mean_of(values),
    }
}

/// Linear interpolation between closest ranks over sorted, non-empty input.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

// ---------------------------------------------------------------------------
// Scalar aggregates
// ---------------------------------------------------------------------------

/// Mean of the numeric values of `column`; `0.0` when there are none.
pub fn mean(view: &View<'_>, column: &str) -> f64 {
    mean_of(&numbers(view, column))
}

/// Largest numeric value of `column`; `0.0` when there are none.
pub fn max(view: &View<'_>, column: &str) -> f64 {
    numbers(view, column)
        .into_iter()
        .reduce(f64::max)
        .unwrap_or(0.0)
}

pub fn sum(view: &View<'_>, column: &str) -> f64 {
    numbers(view, column).into_iter().sum()
}

/// Number of distinct non-null values of `column`.
pub fn nunique(view: &View<'_>, col: &str) -> usize {
    let Some((ty, values)) = column(view, col) else {
        return 0;
    };
    values
        .filter(|v| !v.is_null())
        .map(|v| v.comparable(ty).into_owned())
        .collect::<std::collections::BTreeSet<_>>()
        .len()
}

/// The most frequent non-null value of `column`, or [`Value::Null`] when
/// there is none.
pub fn mode(view: &View<'_>, col: &str, tie_break: TieBreak) -> Value {
    let Some((ty, values)) = column(view, col) else {
        return Value::Null;
    };
    // value -> (count, first position)
    let mut counts: HashMap<Value, (usize, usize)> = HashMap::new();
    for (pos, v) in values.enumerate().filter(|(_, v)| !v.is_null()) {
        counts
            .entry(v.comparable(ty).into_owned())
            .or_insert((0, pos))
            .0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(va, (ca, pa)), (vb, (cb, pb))| {
            ca.cmp(cb).then_with(|| match tie_break {
                TieBreak::FirstSeen => pb.cmp(pa),
                TieBreak::Smallest => vb.cmp(va),
            })
        })
        .map(|(v, _)| v)
        .unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Word frequency
// ---------------------------------------------------------------------------

static NON_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z\s]").expect("static pattern"));

/// The `top_n` most frequent words of `text_column`, most frequent first,
/// ties in order of first appearance.
///
/// All texts are joined with a space and lower-cased, every character that is
/// neither an ASCII letter nor whitespace is deleted (so `don't` becomes
/// `dont`), and the remainder is split on whitespace.
pub fn word_frequency(view: &View<'_>, text_column: &str, top_n: usize) -> Vec<WordCount> {
    let Some((_, values)) = column(view, text_column) else {
        return Vec::new();
    };
    let joined = values
        .filter(|v| !v.is_null())
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let cleaned = NON_LETTER.replace_all(&joined, "");

    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in cleaned.split_whitespace() {
        let count = counts.entry(word).or_insert_with(|| {
            order.push(word);
            0
        });
        *count += 1;
    }

    let mut words: Vec<WordCount> = order
        .into_iter()
        .map(|word| WordCount {
            word: word.to_string(),
            count: counts[word],
        })
        .collect();
    // Stable: equal counts stay in first-seen order.
    words.sort_by(|a, b| b.count.cmp(&a.count));
    words.truncate(top_n);
    words
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// The `n` rows with the largest numeric `column`, largest first. Ties keep
/// view order; rows without a numeric value sort last.
pub fn top_rows<'a>(view: &View<'a>, col: &str, n: usize) -> View<'a> {
    let Some(index) = view.table().column_index(col) else {
        warn!(
            "table '{}' has no column '{col}' to rank by",
            view.table().name()
        );
        return View::from_indices(view.table(), Vec::new());
    };
    let table = view.table();
    let mut indices = view.indices().to_vec();
    indices.sort_by(|&a, &b| {
        match (table.value(a, index).as_f64(), table.value(b, index).as_f64()) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
    indices.truncate(n);
    View::from_indices(table, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::{apply, Selection};
    use crate::data::model::{Row, Table};

    fn songs() -> Table {
        let row = |artist: &str, year: i64, genre: &str, score: f64, lyrics: &str| {
            Row::new(vec![
                artist.into(),
                Value::Integer(year),
                genre.into(),
                Value::Float(score),
                lyrics.into(),
            ])
        };
        Table::new(
            "songs",
            vec![
                "artist".into(),
                "release_year".into(),
                "genre".into(),
                "score".into(),
                "lyrics".into(),
            ],
            vec![
                ColumnType::Text,
                ColumnType::Year,
                ColumnType::Text,
                ColumnType::Float,
                ColumnType::Text,
            ],
            vec![
                row("B", 2001, "rock", 1.0, "Run! Run, away."),
                row("A", 2000, "pop", 0.5, "RUN far"),
                row("A", 2001, "pop", -0.5, "don't stop"),
                row("C", 2002, "rock", 2.0, "stop"),
                Row::new(vec!["C".into(), Value::Null, Value::Null, Value::Null, Value::Null]),
            ],
        )
    }

    fn empty(table: &Table) -> View<'_> {
        let mut selection = Selection::new();
        selection.select_none("artist");
        apply(table, &selection)
    }

    #[test]
    fn count_by_orders_by_count_then_key() {
        let table = songs();
        let view = View::all(&table);
        let counts = count_by(&view, "artist");
        let pairs: Vec<(Value, usize)> = counts
            .iter()
            .map(|g| (g.key.clone(), g.value))
            .collect();
        assert_eq!(
            pairs,
            vec![(Value::from("A"), 2), (Value::from("C"), 2), (Value::from("B"), 1)]
        );
    }

    #[test]
    fn count_by_sums_to_view_length() {
        let table = songs();
        let view = View::all(&table);
        for key in ["artist", "genre", "release_year", "score"] {
            let total: usize = count_by(&view, key).iter().map(|g| g.value).sum();
            assert_eq!(total, view.len(), "{key}");
        }
        assert_eq!(count_by(&view, "genre").get(&Value::Null), Some(&1));
    }

    #[test]
    fn mean_by_groups_and_empty_view() {
        let table = songs();
        let view = View::all(&table);
        let means = mean_by(&view, "artist", "score");
        assert_eq!(means.get(&Value::from("A")), Some(&0.0));
        assert_eq!(means.get(&Value::from("B")), Some(&1.0));
        assert_eq!(means.get(&Value::from("C")), Some(&2.0));
        assert_eq!(
            means.keys().cloned().collect::<Vec<_>>(),
            ["A", "B", "C"].map(Value::from)
        );

        let none = empty(&table);
        assert!(mean_by(&none, "artist", "score").is_empty());
        assert!(mean_by(&none, "artist", "score").iter().all(|g| g.value == 0.0));
    }

    #[test]
    fn mean_of_group_without_numbers_is_zero() {
        let table = songs();
        let view = View::all(&table);
        let means = mean_by(&view, "artist", "lyrics");
        assert!(means.iter().all(|g| g.value == 0.0));
    }

    #[test]
    fn scalar_sentinels_on_empty_view() {
        let table = songs();
        let none = empty(&table);
        assert_eq!(mean(&none, "score"), 0.0);
        assert_eq!(max(&none, "score"), 0.0);
        assert_eq!(sum(&none, "score"), 0.0);
        assert_eq!(nunique(&none, "artist"), 0);
        assert_eq!(mode(&none, "artist", TieBreak::FirstSeen), Value::Null);
        assert!(word_frequency(&none, "lyrics", 20).is_empty());
        assert!(count_by(&none, "artist").is_empty());
        assert!(top_rows(&none, "score", 3).is_empty());
    }

    #[test]
    fn unknown_columns_yield_sentinels() {
        let table = songs();
        let view = View::all(&table);
        assert_eq!(mean(&view, "nope"), 0.0);
        assert!(count_by(&view, "nope").is_empty());
        assert!(mean_by(&view, "artist", "nope").is_empty());
        assert_eq!(mode(&view, "nope", TieBreak::Smallest), Value::Null);
    }

    #[test]
    fn scalar_aggregates() {
        let table = songs();
        let view = View::all(&table);
        assert_eq!(mean(&view, "score"), 0.75);
        assert_eq!(max(&view, "score"), 2.0);
        assert_eq!(sum(&view, "score"), 3.0);
        assert_eq!(nunique(&view, "artist"), 3);
        assert_eq!(nunique(&view, "genre"), 2);
    }

    #[test]
    fn mode_tie_breaks() {
        let table = songs();
        let view = View::all(&table);
        // B appears first, but A and C are tied at two rows each.
        assert_eq!(mode(&view, "artist", TieBreak::FirstSeen), Value::from("A"));
        assert_eq!(mode(&view, "artist", TieBreak::Smallest), Value::from("A"));
        assert_eq!(mode(&view, "genre", TieBreak::FirstSeen), Value::from("rock"));
        assert_eq!(mode(&view, "genre", TieBreak::Smallest), Value::from("pop"));
    }

    #[test]
    fn nunique_by_counts_distinct_values() {
        let table = songs();
        let view = View::all(&table);
        let genres = nunique_by(&view, "artist", "genre");
        assert_eq!(genres.get(&Value::from("A")), Some(&1));
        assert_eq!(genres.get(&Value::from("C")), Some(&1));
        let years = nunique_by(&view, "artist", "release_year");
        assert_eq!(years.iter().next().map(|g| (&g.key, g.value)), Some((&Value::from("A"), 2)));
    }

    #[test]
    fn word_frequency_folds_case_and_strips_punctuation() {
        let table = songs();
        let mut selection = Selection::new();
        selection.set_members("artist", ["A", "B"]);
        selection.set_range("release_year", 2000.0, 2001.0);
        selection.set_members("genre", ["rock", "pop"]);
        let view = apply(&table, &selection);
        let view = View::from_indices(&table, view.indices()[..2].to_vec());

        let words = word_frequency(&view, "lyrics", 20);
        let pairs: Vec<(&str, usize)> = words.iter().map(|w| (w.word.as_str(), w.count)).collect();
        assert_eq!(pairs, vec![("run", 3), ("away", 1), ("far", 1)]);
    }

    #[test]
    fn apostrophes_are_deleted_not_split() {
        let table = songs();
        let view = View::all(&table);
        let words = word_frequency(&view, "lyrics", 2);
        assert_eq!(words[0], WordCount { word: "run".into(), count: 3 });
        assert_eq!(words[1], WordCount { word: "stop".into(), count: 2 });
        let all = word_frequency(&view, "lyrics", 100);
        assert!(all.iter().any(|w| w.word == "dont"));
        assert!(!all.iter().any(|w| w.word == "don" || w.word == "t"));
    }

    #[test]
    fn summary_by_computes_quartiles() {
        let table = Table::new(
            "t",
            vec!["k".into(), "v".into()],
            vec![ColumnType::Text, ColumnType::Integer],
            [1, 2, 3, 4]
                .into_iter()
                .map(|v| Row::new(vec!["x".into(), Value::Integer(v)]))
                .collect(),
        );
        let view = View::all(&table);
        let summaries = summary_by(&view, "k", "v");
        let s = summaries.get(&Value::from("x")).unwrap();
        assert_eq!(s.count, 4);
        assert_eq!((s.min, s.q1, s.median, s.q3, s.max), (1.0, 1.75, 2.5, 3.25, 4.0));
        assert_eq!(s.mean, 2.5);
    }

    #[test]
    fn top_rows_is_descending_and_stable() {
        let table = songs();
        let view = View::all(&table);
        let top = top_rows(&view, "score", 3);
        assert_eq!(top.indices(), &[3, 0, 1]);
        let all = top_rows(&view, "score", 10);
        assert_eq!(all.indices().last(), Some(&4));
    }

    #[test]
    fn rounding_is_half_to_even() {
        let grouped = Grouped::from_map(BTreeMap::from([
            (Value::from("a"), 2.5),
            (Value::from("b"), 3.5),
            (Value::from("c"), 3.4),
        ]))
        .rounded();
        let values: Vec<f64> = grouped.iter().map(|g| g.value).collect();
        assert_eq!(values, vec![2.0, 4.0, 3.0]);
    }

    #[test]
    fn sorted_by_value_ascending() {
        let table = songs();
        let view = View::all(&table);
        let means = mean_by(&view, "artist", "score").sorted_by_value(SortOrder::Ascending);
        assert_eq!(
            means.keys().cloned().collect::<Vec<_>>(),
            ["A", "B", "C"].map(Value::from)
        );
        let desc = mean_by(&view, "artist", "score").sorted_by_value(SortOrder::Descending);
        assert_eq!(desc.keys().next(), Some(&Value::from("C")));
    }

    #[test]
    fn equal_numbers_share_a_group() {
        let table = Table::new(
            "songs",
            vec!["score".into()],
            vec![crate::data::model::ColumnType::Float],
            vec![
                Row::new(vec![Value::Integer(1)]),
                Row::new(vec![Value::Float(1.0)]),
                Row::new(vec![Value::Float(0.0)]),
                Row::new(vec![Value::Float(-0.0)]),
            ],
        );
        let view = View::all(&table);
        let counts = count_by(&view, "score");
        assert_eq!(counts.len(), 2);
        assert_eq!(counts.get(&Value::Float(1.0)), Some(&2));
        assert_eq!(counts.get(&Value::Float(0.0)), Some(&2));
        assert_eq!(nunique(&view, "score"), 2);
        assert_eq!(mode(&view, "score", TieBreak::FirstSeen), Value::Float(1.0));
    }
}
