//! Pages declare which dimensions they filter on and which aggregates they
//! show; one pipeline evaluates every page.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::data::aggregate::{
    self, Grouped, SortOrder, Summary, TieBreak, WordCount,
};
use crate::data::filter::{self, Dimension, Predicate, Selection, View};
use crate::data::model::{columns, Table, Value};

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

/// Which table an aggregate reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    /// The filtered songs view.
    #[default]
    Songs,
    /// Artist popularity rows whose artist appears in the filtered songs.
    ArtistPopularity,
    /// Artist info rows whose artist or band appears in the filtered songs.
    ArtistInfo,
}

/// A statistic to compute over a view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Aggregate {
    RowCount,
    CountBy {
        key: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    MeanBy {
        key: String,
        value: String,
        #[serde(default)]
        round: bool,
        #[serde(default)]
        order: Option<SortOrder>,
    },
    NuniqueBy {
        key: String,
        value: String,
        #[serde(default)]
        limit: Option<usize>,
    },
    SummaryBy {
        key: String,
        value: String,
    },
    Mean {
        column: String,
    },
    Max {
        column: String,
    },
    Sum {
        column: String,
    },
    Nunique {
        column: String,
    },
    Mode {
        column: String,
        #[serde(default)]
        tie_break: TieBreak,
    },
    WordFrequency {
        column: String,
        top_n: usize,
    },
    TopRows {
        column: String,
        #[serde(default)]
        n: Option<usize>,
    },
}

/// A named aggregate on one of the page's tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateSpec {
    pub id: String,
    #[serde(default)]
    pub dataset: Dataset,
    #[serde(flatten)]
    pub aggregate: Aggregate,
}

impl AggregateSpec {
    pub fn new(id: impl Into<String>, aggregate: Aggregate) -> Self {
        AggregateSpec {
            id: id.into(),
            dataset: Dataset::Songs,
            aggregate,
        }
    }

    pub fn on(mut self, dataset: Dataset) -> Self {
        self.dataset = dataset;
        self
    }
}

/// One dashboard page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSpec {
    pub name: String,
    #[serde(default = "Dimension::standard")]
    pub dimensions: Vec<Dimension>,
    /// Negate score and emotion columns before filtering.
    #[serde(default)]
    pub invert_sentiment: bool,
    #[serde(default)]
    pub aggregates: Vec<AggregateSpec>,
}

fn count_by(key: &str) -> Aggregate {
    Aggregate::CountBy {
        key: key.into(),
        limit: None,
    }
}

fn nunique_by(key: &str, value: &str) -> Aggregate {
    Aggregate::NuniqueBy {
        key: key.into(),
        value: value.into(),
        limit: None,
    }
}

fn of(column: &str) -> String {
    column.to_string()
}

impl PageSpec {
    pub fn new(name: impl Into<String>) -> Self {
        PageSpec {
            name: name.into(),
            dimensions: Dimension::standard(),
            invert_sentiment: false,
            aggregates: Vec::new(),
        }
    }

    pub fn with(mut self, aggregate: AggregateSpec) -> Self {
        self.aggregates.push(aggregate);
        self
    }

    /// Overview: catalogue sizes, genres, albums and artist demographics.
    pub fn home() -> Self {
        PageSpec::new("home")
            .with(AggregateSpec::new("songs", Aggregate::RowCount))
            .with(AggregateSpec::new("artists", Aggregate::Nunique { column: of(columns::ARTIST) }))
            .with(AggregateSpec::new("albums", Aggregate::Nunique { column: of(columns::ALBUM) }))
            .with(
                AggregateSpec::new("bands", Aggregate::Nunique { column: of(columns::BAND) })
                    .on(Dataset::ArtistInfo),
            )
            .with(AggregateSpec::new("songs_by_genre", count_by(columns::GENRE)))
            .with(AggregateSpec::new(
                "genres_by_artist",
                nunique_by(columns::ARTIST, columns::GENRE),
            ))
            .with(AggregateSpec::new(
                "albums_by_artist",
                nunique_by(columns::ARTIST, columns::ALBUM),
            ))
            .with(AggregateSpec::new(
                "albums_by_year",
                nunique_by(columns::RELEASE_YEAR, columns::ALBUM),
            ))
            .with(AggregateSpec::new("artists_by_sex", count_by(columns::SEX)).on(Dataset::ArtistInfo))
            .with(
                AggregateSpec::new("artists_by_band", nunique_by(columns::BAND, columns::NAME))
                    .on(Dataset::ArtistInfo),
            )
    }

    /// Output and composition: word counts, top words, album sizes.
    pub fn industry() -> Self {
        PageSpec::new("industry")
            .with(AggregateSpec::new("years", Aggregate::Nunique { column: of(columns::RELEASE_YEAR) }))
            .with(AggregateSpec::new("lyrics", Aggregate::Nunique { column: of(columns::LYRICS) }))
            .with(AggregateSpec::new("words", Aggregate::Sum { column: of(columns::WORD_COUNT) }))
            .with(AggregateSpec::new("genres", Aggregate::Nunique { column: of(columns::GENRE) }))
            .with(AggregateSpec::new("songs_by_artist", count_by(columns::ARTIST)))
            .with(AggregateSpec::new(
                "top_words",
                Aggregate::WordFrequency {
                    column: of(columns::LYRICS),
                    top_n: 20,
                },
            ))
            .with(AggregateSpec::new("songs_by_year", count_by(columns::RELEASE_YEAR)))
            .with(AggregateSpec::new(
                "top_albums",
                Aggregate::CountBy {
                    key: of(columns::ALBUM),
                    limit: Some(20),
                },
            ))
            .with(AggregateSpec::new(
                "mean_words_by_year",
                Aggregate::MeanBy {
                    key: of(columns::RELEASE_YEAR),
                    value: of(columns::WORD_COUNT),
                    round: true,
                    order: None,
                },
            ))
            .with(AggregateSpec::new(
                "words_by_artist",
                Aggregate::SummaryBy {
                    key: of(columns::ARTIST),
                    value: of(columns::WORD_COUNT),
                },
            ))
            .with(AggregateSpec::new(
                "genres_by_year",
                nunique_by(columns::RELEASE_YEAR, columns::GENRE),
            ))
            .with(AggregateSpec::new(
                "top_albums_by_genres",
                Aggregate::NuniqueBy {
                    key: of(columns::ALBUM),
                    value: of(columns::GENRE),
                    limit: Some(20),
                },
            ))
    }

    /// Streaming popularity of the selected artists.
    pub fn popularity() -> Self {
        let top = |id: &str, column: &str, n: Option<usize>| {
            AggregateSpec::new(
                id,
                Aggregate::TopRows {
                    column: of(column),
                    n,
                },
            )
            .on(Dataset::ArtistPopularity)
        };
        PageSpec::new("popularity")
            .with(top("top_by_popularity", columns::POPULARITY, Some(10)))
            .with(top("top_by_followers", columns::FOLLOWERS, Some(10)))
            .with(top("ranking", columns::POPULARITY, None))
            .with(
                AggregateSpec::new(
                    "mean_popularity_by_type",
                    Aggregate::MeanBy {
                        key: of(columns::KIND),
                        value: of(columns::POPULARITY),
                        round: true,
                        order: None,
                    },
                )
                .on(Dataset::ArtistPopularity),
            )
            .with(
                AggregateSpec::new(
                    "popularity_by_type",
                    Aggregate::SummaryBy {
                        key: of(columns::KIND),
                        value: of(columns::POPULARITY),
                    },
                )
                .on(Dataset::ArtistPopularity),
            )
    }

    /// Sentiment scores and emotion intensities. Sign-inverted.
    pub fn inference() -> Self {
        let mut page = PageSpec::new("inference")
            .with(AggregateSpec::new("mean_score", Aggregate::Mean { column: of(columns::SCORE) }))
            .with(AggregateSpec::new("max_score", Aggregate::Max { column: of(columns::SCORE) }))
            .with(AggregateSpec::new(
                "top_sentiment",
                Aggregate::Mode {
                    column: of(columns::SENTIMENT),
                    tie_break: TieBreak::FirstSeen,
                },
            ))
            .with(AggregateSpec::new(
                "top_artist",
                Aggregate::Mode {
                    column: of(columns::ARTIST),
                    tie_break: TieBreak::FirstSeen,
                },
            ))
            .with(AggregateSpec::new(
                "score_by_artist",
                Aggregate::MeanBy {
                    key: of(columns::ARTIST),
                    value: of(columns::SCORE),
                    round: false,
                    order: Some(SortOrder::Ascending),
                },
            ))
            .with(AggregateSpec::new("sentiments", count_by(columns::SENTIMENT)))
            .with(AggregateSpec::new(
                "score_by_year",
                Aggregate::MeanBy {
                    key: of(columns::RELEASE_YEAR),
                    value: of(columns::SCORE),
                    round: false,
                    order: None,
                },
            ));
        for emotion in columns::EMOTIONS {
            page = page.with(AggregateSpec::new(
                format!("mean_{emotion}"),
                Aggregate::Mean { column: of(emotion) },
            ));
        }
        // no genre filter on this page
        page.dimensions = vec![Dimension::year(), Dimension::artist(), Dimension::album()];
        page.invert_sentiment = true;
        page
    }

    /// The four built-in dashboard pages.
    pub fn builtin() -> Vec<PageSpec> {
        vec![
            PageSpec::home(),
            PageSpec::industry(),
            PageSpec::popularity(),
            PageSpec::inference(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Owned copy of some rows, for tabular display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn from_view(view: &View<'_>) -> Self {
        let table = view.table();
        RowSet {
            columns: table.column_names().to_vec(),
            rows: view
                .indices()
                .iter()
                .map(|&i| table.rows()[i].cells().to_vec())
                .collect(),
        }
    }
}

/// Result of one [`Aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Output {
    Count(usize),
    Number(f64),
    Value(Value),
    Counts(Grouped<usize>),
    Numbers(Grouped<f64>),
    Summaries(Grouped<Summary>),
    Words(Vec<WordCount>),
    Rows(RowSet),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedOutput {
    pub id: String,
    pub dataset: Dataset,
    pub output: Output,
}

/// Everything a page shows for one selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    pub page: String,
    /// Rows in the filtered songs view. Zero is a valid, empty result.
    pub rows: usize,
    pub outputs: Vec<NamedOutput>,
}

impl PageReport {
    pub fn get(&self, id: &str) -> Option<&Output> {
        self.outputs.iter().find(|o| o.id == id).map(|o| &o.output)
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }
}

/// The three views a page can aggregate over.
#[derive(Debug, Clone)]
pub struct PageViews<'a> {
    pub songs: View<'a>,
    pub artist_popularity: View<'a>,
    pub artist_info: View<'a>,
}

impl<'a> PageViews<'a> {
    /// Filter the songs and carry the artists over to the artist tables.
    ///
    /// Popularity follows the artists picked in the selection, even those
    /// whose songs the other predicates hide; without an artist predicate it
    /// falls back to the surviving artists. Artist info always follows the
    /// surviving artists.
    pub fn build(
        songs: &'a Table,
        artist_popularity: &'a Table,
        artist_info: &'a Table,
        selection: &Selection,
    ) -> Self {
        let songs = filter::apply(songs, selection);
        let surviving: BTreeSet<Value> = songs
            .values(columns::ARTIST)
            .into_iter()
            .flatten()
            .filter(|v| !v.is_null())
            .cloned()
            .collect();
        let picked = match selection.get(columns::ARTIST) {
            Some(Predicate::Members(artists)) => artists,
            _ => &surviving,
        };
        PageViews {
            artist_popularity: filter::related(artist_popularity, &[columns::NAME], picked),
            artist_info: filter::related(artist_info, &[columns::NAME, columns::BAND], &surviving),
            songs,
        }
    }

    pub fn get(&self, dataset: Dataset) -> &View<'a> {
        match dataset {
            Dataset::Songs => &self.songs,
            Dataset::ArtistPopularity => &self.artist_popularity,
            Dataset::ArtistInfo => &self.artist_info,
        }
    }
}

fn limited<T>(grouped: Grouped<T>, limit: Option<usize>) -> Grouped<T> {
    match limit {
        Some(n) => grouped.head(n),
        None => grouped,
    }
}

/// Evaluate one aggregate. Never fails; empty input gives the empty sentinel.
pub fn evaluate(aggregate: &Aggregate, view: &View<'_>) -> Output {
    match aggregate {
        Aggregate::RowCount => Output::Count(view.len()),
        Aggregate::CountBy { key, limit } => {
            Output::Counts(limited(aggregate::count_by(view, key), *limit))
        }
        Aggregate::MeanBy {
            key,
            value,
            round,
            order,
        } => {
            let mut means = aggregate::mean_by(view, key, value);
            if *round {
                means = means.rounded();
            }
            if let Some(order) = order {
                means = means.sorted_by_value(*order);
            }
            Output::Numbers(means)
        }
        Aggregate::NuniqueBy { key, value, limit } => {
            Output::Counts(limited(aggregate::nunique_by(view, key, value), *limit))
        }
        Aggregate::SummaryBy { key, value } => {
            Output::Summaries(aggregate::summary_by(view, key, value))
        }
        Aggregate::Mean { column } => Output::Number(aggregate::mean(view, column)),
        Aggregate::Max { column } => Output::Number(aggregate::max(view, column)),
        Aggregate::Sum { column } => Output::Number(aggregate::sum(view, column)),
        Aggregate::Nunique { column } => Output::Count(aggregate::nunique(view, column)),
        Aggregate::Mode { column, tie_break } => {
            Output::Value(aggregate::mode(view, column, *tie_break))
        }
        Aggregate::WordFrequency { column, top_n } => {
            Output::Words(aggregate::word_frequency(view, column, *top_n))
        }
        Aggregate::TopRows { column, n } => {
            let top = aggregate::top_rows(view, column, n.unwrap_or(usize::MAX));
            Output::Rows(RowSet::from_view(&top))
        }
    }
}

impl PageSpec {
    /// Compute every aggregate of the page over already filtered views.
    pub fn report(&self, views: &PageViews<'_>) -> PageReport {
        PageReport {
            page: self.name.clone(),
            rows: views.songs.len(),
            outputs: self
                .aggregates
                .iter()
                .map(|spec| NamedOutput {
                    id: spec.id.clone(),
                    dataset: spec.dataset,
                    output: evaluate(&spec.aggregate, views.get(spec.dataset)),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{ColumnType, Row};

    fn songs() -> Table {
        Table::new(
            "songs",
            vec![
                "artist".into(),
                "release_year".into(),
                "Album".into(),
                "genre".into(),
            ],
            vec![ColumnType::Text, ColumnType::Year, ColumnType::Text, ColumnType::Text],
            vec![
                Row::new(vec!["A".into(), Value::Integer(2000), "X".into(), "pop".into()]),
                Row::new(vec!["B".into(), Value::Integer(2001), "Y".into(), "rock".into()]),
            ],
        )
    }

    fn popularity() -> Table {
        Table::new(
            "artist_popularity",
            vec!["nome".into(), "popularidade".into(), "tipo".into()],
            vec![ColumnType::Text, ColumnType::Integer, ColumnType::Text],
            vec![
                Row::new(vec!["A".into(), Value::Integer(70), "artist".into()]),
                Row::new(vec!["B".into(), Value::Integer(90), "band".into()]),
            ],
        )
    }

    fn info() -> Table {
        Table::new(
            "artist_info",
            vec!["nome".into(), "banda".into(), "sexo".into()],
            vec![ColumnType::Text, ColumnType::Text, ColumnType::Text],
            vec![
                Row::new(vec!["Ann".into(), "A".into(), "F".into()]),
                Row::new(vec!["Bob".into(), "B".into(), "M".into()]),
            ],
        )
    }

    fn scenario() -> Selection {
        let mut selection = Selection::new();
        selection.set_range("release_year", 2000.0, 2000.0);
        selection.set_members("artist", ["A", "B"]);
        selection.set_members("Album", ["X", "Y"]);
        selection.set_members("genre", ["pop", "rock"]);
        selection
    }

    #[test]
    fn scenario_counts_by_genre() {
        let (songs, pop, info) = (songs(), popularity(), info());
        let views = PageViews::build(&songs, &pop, &info, &scenario());
        assert_eq!(views.songs.len(), 1);
        // B is picked but its only song is outside the year range.
        assert_eq!(views.artist_popularity.indices(), &[0, 1]);
        assert_eq!(views.artist_info.indices(), &[0]);

        let page = PageSpec::new("t")
            .with(AggregateSpec::new("by_genre", count_by("genre")))
            .with(AggregateSpec::new("by_type", count_by("tipo")).on(Dataset::ArtistPopularity));
        let report = page.report(&views);
        match report.get("by_genre") {
            Some(Output::Counts(counts)) => {
                assert_eq!(counts.len(), 1);
                assert_eq!(counts.get(&Value::from("pop")), Some(&1));
            }
            other => panic!("unexpected output {other:?}"),
        }
        match report.get("by_type") {
            Some(Output::Counts(counts)) => {
                assert_eq!(counts.get(&Value::from("artist")), Some(&1))
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn popularity_falls_back_to_surviving_artists() {
        let (songs, pop, info) = (songs(), popularity(), info());
        let mut selection = Selection::new();
        selection.set_range("release_year", 2001.0, 2001.0);
        let views = PageViews::build(&songs, &pop, &info, &selection);
        assert_eq!(views.artist_popularity.indices(), &[1]);
        assert_eq!(views.artist_info.indices(), &[1]);

        selection.select_none("artist");
        let views = PageViews::build(&songs, &pop, &info, &selection);
        assert!(views.artist_popularity.is_empty());
        assert!(views.artist_info.is_empty());
    }

    #[test]
    fn builtin_pages_render_on_empty_selection() {
        let (songs, pop, info) = (songs(), popularity(), info());
        let mut selection = scenario();
        selection.select_none("genre");
        selection.select_none("artist");
        let views = PageViews::build(&songs, &pop, &info, &selection);
        assert!(views.artist_popularity.is_empty());
        for page in PageSpec::builtin() {
            let report = page.report(&views);
            assert!(report.is_empty());
            assert_eq!(report.outputs.len(), page.aggregates.len());
            for named in &report.outputs {
                match &named.output {
                    Output::Count(n) => assert_eq!(*n, 0, "{}", named.id),
                    Output::Number(v) => assert_eq!(*v, 0.0, "{}", named.id),
                    Output::Value(v) => assert!(v.is_null(), "{}", named.id),
                    Output::Counts(g) => assert!(g.is_empty(), "{}", named.id),
                    Output::Numbers(g) => assert!(g.is_empty(), "{}", named.id),
                    Output::Summaries(g) => assert!(g.is_empty(), "{}", named.id),
                    Output::Words(w) => assert!(w.is_empty(), "{}", named.id),
                    Output::Rows(r) => assert!(r.rows.is_empty(), "{}", named.id),
                }
            }
        }
    }

    #[test]
    fn top_rows_output_is_owned_and_ranked() {
        let pop = popularity();
        let view = View::all(&pop);
        let output = evaluate(
            &Aggregate::TopRows {
                column: "popularidade".into(),
                n: Some(1),
            },
            &view,
        );
        match output {
            Output::Rows(rows) => {
                assert_eq!(rows.rows.len(), 1);
                assert_eq!(rows.rows[0][0], Value::from("B"));
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn inference_page_filters_without_genre() {
        let page = PageSpec::inference();
        assert!(page.invert_sentiment);
        assert_eq!(
            page.dimensions,
            vec![Dimension::year(), Dimension::artist(), Dimension::album()]
        );
        assert_eq!(PageSpec::home().dimensions, Dimension::standard());
    }

    #[test]
    fn builtin_aggregate_ids_are_unique() {
        for page in PageSpec::builtin() {
            let ids: BTreeSet<&str> = page.aggregates.iter().map(|a| a.id.as_str()).collect();
            assert_eq!(ids.len(), page.aggregates.len(), "{}", page.name);
        }
    }

    #[test]
    fn report_serializes_to_json() {
        let (songs, pop, info) = (songs(), popularity(), info());
        let views = PageViews::build(&songs, &pop, &info, &scenario());
        let report = PageSpec::home().report(&views);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["page"], "home");
        assert_eq!(json["rows"], 1);
        assert_eq!(json["outputs"][0]["id"], "songs");
        assert_eq!(json["outputs"][0]["output"]["kind"], "count");
        assert_eq!(json["outputs"][0]["output"]["data"], 1);
    }
}
