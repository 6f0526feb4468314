use std::path::PathBuf;

use thiserror::Error;

/// A source table could not be fetched or understood.
///
/// Fatal for the session that requested the data, but never for the process:
/// [`crate::state::Dashboard::session`] turns it into a "no data" state.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("malformed delimited text in {origin}: {source}")]
    Csv {
        origin: String,
        #[source]
        source: csv::Error,
    },

    #[error("malformed JSON in {origin}: {source}")]
    Json {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed parquet in {origin}: {source}")]
    Parquet {
        origin: String,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("cannot decode record batch in {origin}: {source}")]
    Arrow {
        origin: String,
        #[source]
        source: arrow::error::ArrowError,
    },

    #[error("unsupported file extension '.{extension}' for {origin}")]
    UnsupportedFormat { origin: String, extension: String },

    #[error("{origin} is missing required columns: {}", .missing.join(", "))]
    MissingColumns { origin: String, missing: Vec<String> },

    #[error("malformed data in {origin}: {reason}")]
    Malformed { origin: String, reason: String },
}

/// Configuration could not be read or is inconsistent.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A derived-table transform referenced a column it cannot work on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("table '{table}' has no column '{column}'")]
    MissingColumn { table: String, column: String },

    #[error("column '{column}' of table '{table}' is not numeric")]
    NonNumeric { table: String, column: String },
}
