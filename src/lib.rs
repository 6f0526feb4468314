//! Filtering and aggregation pipeline behind the Inferify song-lyrics
//! dashboards.
//!
//! Load the song, artist popularity and artist info tables once
//! ([`Dashboard::load`]), open a [`Session`] per user and page, mutate its
//! selection and read a [`PageReport`] back. Rendering is left to the caller.

pub mod config;
pub mod data;
pub mod error;
pub mod page;
pub mod state;

pub use config::Config;
pub use data::aggregate::{Grouped, SortOrder, Summary, TieBreak, WordCount};
pub use data::facet::{distinct_values, DefaultPolicy, Facet, FacetIndex};
pub use data::filter::{apply, Dimension, DimensionKind, Predicate, Selection, View};
pub use data::loader::{load, load_file, LoadOptions, SourceLocation};
pub use data::model::{columns, ColumnType, Schema, Table, Value};
pub use data::transform::SignInversion;
pub use error::{ConfigError, DataSourceError, TransformError};
pub use page::{Aggregate, AggregateSpec, Dataset, Output, PageReport, PageSpec};
pub use state::{Dashboard, Datasets, Session, SessionState};
