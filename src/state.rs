use std::sync::Arc;

use log::{error, info};

use crate::config::Config;
use crate::data::facet::{DefaultPolicy, FacetIndex};
use crate::data::filter::{Selection, View};
use crate::data::loader::{self, LoadOptions, SourceLocation};
use crate::data::model::{Schema, Table, Value};
use crate::data::transform::SignInversion;
use crate::error::{DataSourceError, TransformError};
use crate::page::{PageReport, PageSpec, PageViews};

// ---------------------------------------------------------------------------
// Shared datasets
// ---------------------------------------------------------------------------

/// The three source tables, loaded once and shared read-only by every
/// session. Cloning only bumps reference counts.
#[derive(Debug, Clone)]
pub struct Datasets {
    pub songs: Arc<Table>,
    pub artist_popularity: Arc<Table>,
    pub artist_info: Arc<Table>,
}

impl Datasets {
    pub fn new(songs: Table, artist_popularity: Table, artist_info: Table) -> Self {
        Datasets {
            songs: Arc::new(songs),
            artist_popularity: Arc::new(artist_popularity),
            artist_info: Arc::new(artist_info),
        }
    }

    pub fn load(
        songs: &SourceLocation,
        artist_popularity: &SourceLocation,
        artist_info: &SourceLocation,
        options: &LoadOptions,
    ) -> Result<Self, DataSourceError> {
        Ok(Datasets::new(
            loader::load(songs, &Schema::SONGS, options)?,
            loader::load(artist_popularity, &Schema::ARTIST_POPULARITY, options)?,
            loader::load(artist_info, &Schema::ARTIST_INFO, options)?,
        ))
    }
}

// ---------------------------------------------------------------------------
// Dashboard – configuration plus the outcome of loading
// ---------------------------------------------------------------------------

/// Process-wide handle: the configuration and the datasets it points to.
/// A failed load is kept, not raised, so every page can report it.
#[derive(Debug)]
pub struct Dashboard {
    config: Config,
    datasets: Result<Datasets, DataSourceError>,
}

impl Dashboard {
    pub fn load(config: Config) -> Self {
        let sources = &config.sources;
        let datasets = Datasets::load(
            &sources.songs,
            &sources.artist_popularity,
            &sources.artist_info,
            &config.load_options(),
        );
        if let Err(err) = &datasets {
            error!("dashboard has no data: {err}");
        }
        Dashboard { config, datasets }
    }

    pub fn with_datasets(config: Config, datasets: Datasets) -> Self {
        Dashboard {
            config,
            datasets: Ok(datasets),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn datasets(&self) -> Result<&Datasets, &DataSourceError> {
        self.datasets.as_ref()
    }

    /// Start a session on the named page.
    pub fn session(&self, page: &str) -> SessionState {
        let Some(spec) = self.config.page(page) else {
            return SessionState::no_data(format!("unknown page '{page}'"));
        };
        match &self.datasets {
            Ok(datasets) => {
                match Session::new(datasets.clone(), spec.clone(), self.config.facets.default) {
                    Ok(session) => SessionState::Ready(Box::new(session)),
                    Err(err) => SessionState::no_data(err.to_string()),
                }
            }
            Err(err) => SessionState::no_data(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Session – one user's state on one page
// ---------------------------------------------------------------------------

/// What a presentation layer gets when it opens a page.
#[derive(Debug)]
pub enum SessionState {
    Ready(Box<Session>),
    /// Data could not be loaded or prepared; show a placeholder.
    NoData { reason: String },
}

impl SessionState {
    fn no_data(reason: String) -> Self {
        error!("session has no data: {reason}");
        SessionState::NoData { reason }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Ready(session) => Some(&**session),
            SessionState::NoData { .. } => None,
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut Session> {
        match self {
            SessionState::Ready(session) => Some(&mut **session),
            SessionState::NoData { .. } => None,
        }
    }
}

/// Per-user page state: the selection and the options it chooses from.
/// Every read recomputes the view from scratch.
#[derive(Debug, Clone)]
pub struct Session {
    page: PageSpec,
    datasets: Datasets,
    /// The shared songs table, or its sign-inverted derivative.
    songs: Arc<Table>,
    facets: FacetIndex,
    policy: DefaultPolicy,
    selection: Selection,
}

impl Session {
    pub fn new(
        datasets: Datasets,
        page: PageSpec,
        policy: DefaultPolicy,
    ) -> Result<Self, TransformError> {
        let songs = if page.invert_sentiment {
            Arc::new(SignInversion::default().apply_present(&datasets.songs)?)
        } else {
            Arc::clone(&datasets.songs)
        };
        let facets = FacetIndex::build(&songs, &page.dimensions);
        let selection = facets.default_selection(policy);
        info!(
            "session on page '{}': {} songs, {} facet(s)",
            page.name,
            songs.len(),
            facets.len()
        );
        Ok(Session {
            page,
            datasets,
            songs,
            facets,
            policy,
            selection,
        })
    }

    pub fn page(&self) -> &PageSpec {
        &self.page
    }

    pub fn facets(&self) -> &FacetIndex {
        &self.facets
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Replace the whole selection.
    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    /// Back to the default selection.
    pub fn reset(&mut self) {
        self.selection = self.facets.default_selection(self.policy);
    }

    /// Toggle a single value in a column's filter.
    pub fn toggle(&mut self, column: &str, value: &Value) {
        self.selection.toggle(column, value);
    }

    /// Select all values in a column.
    pub fn select_all(&mut self, column: &str) {
        if let Some(facet) = self.facets.get(column) {
            self.selection.select_all(facet);
        }
    }

    /// Deselect all values in a column.
    pub fn select_none(&mut self, column: &str) {
        self.selection.select_none(column);
    }

    pub fn set_range(&mut self, column: &str, lower: f64, upper: f64) {
        self.selection.set_range(column, lower, upper);
    }

    /// The songs table this page reads (sign-inverted if the page asks).
    pub fn songs(&self) -> &Table {
        &self.songs
    }

    /// Songs passing the current selection.
    pub fn view(&self) -> View<'_> {
        crate::data::filter::apply(&self.songs, &self.selection)
    }

    /// Filtered songs plus the related artist rows.
    pub fn views(&self) -> PageViews<'_> {
        PageViews::build(
            &self.songs,
            &self.datasets.artist_popularity,
            &self.datasets.artist_info,
            &self.selection,
        )
    }

    /// Every aggregate of the page for the current selection.
    pub fn report(&self) -> PageReport {
        self.page.report(&self.views())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{columns, ColumnType, Row};
    use crate::page::Output;

    fn datasets() -> Datasets {
        let songs = Table::new(
            "songs",
            vec![
                "artist".into(),
                "release_year".into(),
                "Album".into(),
                "genre".into(),
                "score".into(),
            ],
            vec![
                ColumnType::Text,
                ColumnType::Year,
                ColumnType::Text,
                ColumnType::Text,
                ColumnType::Float,
            ],
            vec![
                Row::new(vec!["A".into(), Value::Integer(2000), "X".into(), "pop".into(), Value::Float(0.5)]),
                Row::new(vec!["B".into(), Value::Integer(2001), "Y".into(), "rock".into(), Value::Float(-1.0)]),
            ],
        );
        let empty = |name: &str, cols: &[&str]| {
            Table::new(
                name,
                cols.iter().map(|c| c.to_string()).collect(),
                vec![ColumnType::Text; cols.len()],
                Vec::new(),
            )
        };
        Datasets::new(
            songs,
            empty("artist_popularity", &["nome", "popularidade"]),
            empty("artist_info", &["nome", "banda", "sexo"]),
        )
    }

    #[test]
    fn sign_inverted_page_leaves_shared_table_alone() {
        let data = datasets();
        let dashboard = Dashboard::with_datasets(Config::default(), data.clone());
        let state = dashboard.session("inference");
        let session = state.session().unwrap();
        let score = session.songs().column_index(columns::SCORE).unwrap();
        assert_eq!(session.songs().value(0, score), &Value::Float(-0.5));
        assert_eq!(data.songs.value(0, score), &Value::Float(0.5));
        assert_eq!(session.report().get("max_score"), Some(&Output::Number(1.0)));
    }

    #[test]
    fn selection_changes_recompute_the_view() {
        let dashboard = Dashboard::with_datasets(Config::default(), datasets());
        let mut state = dashboard.session("home");
        let session = state.session_mut().unwrap();
        assert_eq!(session.view().len(), 2);

        session.select_none(columns::GENRE);
        assert!(session.view().is_empty());
        assert!(session.report().is_empty());

        session.select_all(columns::GENRE);
        session.set_range(columns::RELEASE_YEAR, 2001.0, 2001.0);
        assert_eq!(session.view().indices(), &[1]);

        session.toggle(columns::ARTIST, &Value::from("B"));
        assert!(session.view().is_empty());

        session.reset();
        assert_eq!(session.view().len(), 2);
    }

    #[test]
    fn unknown_page_and_failed_load_are_no_data() {
        let dashboard = Dashboard::with_datasets(Config::default(), datasets());
        assert!(matches!(
            dashboard.session("nope"),
            SessionState::NoData { .. }
        ));

        let mut config = Config::default();
        config.sources.songs = SourceLocation::parse("does/not/exist.csv");
        let dashboard = Dashboard::load(config);
        assert!(dashboard.datasets().is_err());
        match dashboard.session("home") {
            SessionState::NoData { reason } => assert!(reason.contains("does/not/exist.csv")),
            SessionState::Ready(_) => panic!("expected no data"),
        }
    }
}
