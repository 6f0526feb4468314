use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Float32Type, Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, UInt16Type,
    UInt32Type, UInt64Type, UInt8Type,
};
use arrow::util::display::array_value_to_string;
use bytes::Bytes;
use log::{debug, info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::model::{ColumnType, Row, Schema, Table, Value};
use crate::error::DataSourceError;

// ---------------------------------------------------------------------------
// Source location and options
// ---------------------------------------------------------------------------

/// Where a table comes from: a local file or an `http(s)://` URL.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum SourceLocation {
    Path(PathBuf),
    Url(String),
}

impl SourceLocation {
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            SourceLocation::Url(location.to_string())
        } else {
            SourceLocation::Path(PathBuf::from(location))
        }
    }

    /// Lower-cased file extension, ignoring any URL query or fragment.
    pub fn extension(&self) -> String {
        match self {
            SourceLocation::Path(path) => path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("")
                .to_ascii_lowercase(),
            SourceLocation::Url(url) => {
                let path = url.split(['?', '#']).next().unwrap_or(url);
                let file = path.rsplit('/').next().unwrap_or(path);
                file.rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_default()
            }
        }
    }
}

impl From<String> for SourceLocation {
    fn from(location: String) -> Self {
        SourceLocation::parse(&location)
    }
}

impl From<&Path> for SourceLocation {
    fn from(path: &Path) -> Self {
        SourceLocation::Path(path.to_path_buf())
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Path(path) => write!(f, "{}", path.display()),
            SourceLocation::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Knobs for reading a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Field delimiter for `.csv` / `.txt` sources (`.tsv` always uses tab).
    pub delimiter: u8,
    /// Extra attempts after a failed remote fetch.
    pub retries: u32,
    /// Per-request timeout for remote fetches.
    pub timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            retries: 1,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Delimited(Option<u8>),
    Json,
    Parquet,
}

impl Format {
    fn detect(extension: &str) -> Option<Self> {
        match extension {
            "csv" | "txt" => Some(Format::Delimited(None)),
            "tsv" => Some(Format::Delimited(Some(b'\t'))),
            "json" => Some(Format::Json),
            "parquet" | "pq" => Some(Format::Parquet),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a table from `source` and normalise it against `schema`.
/// The format is chosen by extension:
///
/// * `.csv` / `.txt` / `.tsv` – delimited text with a header row
/// * `.json`                 – `[{ "artist": "...", ... }, ...]`
/// * `.parquet`              – one column per field
pub fn load(
    source: &SourceLocation,
    schema: &Schema,
    options: &LoadOptions,
) -> Result<Table, DataSourceError> {
    let origin = source.to_string();
    let extension = source.extension();
    let format = Format::detect(&extension).ok_or_else(|| DataSourceError::UnsupportedFormat {
        origin: origin.clone(),
        extension: extension.clone(),
    })?;

    let body = fetch(source, options)?;
    debug!("fetched {} bytes from {origin} as {format:?}", body.len());

    let raw = match format {
        Format::Delimited(delimiter) => {
            parse_delimited(&body, delimiter.unwrap_or(options.delimiter), &origin)?
        }
        Format::Json => parse_json(&body, &origin)?,
        Format::Parquet => parse_parquet(body, &origin)?,
    };

    let table = normalize(raw, schema, &origin)?;
    info!(
        "loaded {} rows x {} columns into '{}' from {origin}",
        table.len(),
        table.column_names().len(),
        schema.name
    );
    Ok(table)
}

/// Load a local file with default options.
pub fn load_file(path: &Path, schema: &Schema) -> Result<Table, DataSourceError> {
    load(&SourceLocation::from(path), schema, &LoadOptions::default())
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

fn fetch(source: &SourceLocation, options: &LoadOptions) -> Result<Bytes, DataSourceError> {
    match source {
        SourceLocation::Path(path) => {
            std::fs::read(path)
                .map(Bytes::from)
                .map_err(|source| DataSourceError::Io {
                    path: path.clone(),
                    source,
                })
        }
        SourceLocation::Url(url) => fetch_url(url, options),
    }
}

fn fetch_url(url: &str, options: &LoadOptions) -> Result<Bytes, DataSourceError> {
    let client = Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|source| DataSourceError::Http {
            url: url.to_string(),
            source,
        })?;

    let mut attempt = 0;
    loop {
        match fetch_once(&client, url) {
            Ok(body) => return Ok(body),
            Err(err) if attempt < options.retries => {
                attempt += 1;
                warn!("{err}; retrying ({attempt}/{})", options.retries);
            }
            Err(err) => return Err(err),
        }
    }
}

fn fetch_once(client: &Client, url: &str) -> Result<Bytes, DataSourceError> {
    let http_error = |source| DataSourceError::Http {
        url: url.to_string(),
        source,
    };
    let response = client.get(url).send().map_err(http_error)?;
    let status = response.status();
    if !status.is_success() {
        return Err(DataSourceError::HttpStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }
    response.bytes().map_err(http_error)
}

// ---------------------------------------------------------------------------
// Raw parsing
// ---------------------------------------------------------------------------

/// Parsed but not yet normalised cells.
struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// Cells are unparsed text (delimited sources); types must be guessed.
    untyped: bool,
}

/// Header row with column names, every following row is a record. Empty
/// cells are null; everything else stays text until [`normalize`].
fn parse_delimited(body: &[u8], delimiter: u8, origin: &str) -> Result<RawTable, DataSourceError> {
    let csv_error = |source| DataSourceError::Csv {
        origin: origin.to_string(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(body);
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(csv_error)?;
        rows.push(
            record
                .iter()
                .map(|cell| {
                    if cell.is_empty() {
                        Value::Null
                    } else {
                        Value::String(cell.to_string())
                    }
                })
                .collect(),
        );
    }

    Ok(RawTable {
        headers,
        rows,
        untyped: true,
    })
}

/// Records-oriented JSON, i.e. `df.to_json(orient='records')`. Columns are
/// ordered by first appearance.
fn parse_json(body: &[u8], origin: &str) -> Result<RawTable, DataSourceError> {
    let root: JsonValue = serde_json::from_slice(body).map_err(|source| DataSourceError::Json {
        origin: origin.to_string(),
        source,
    })?;
    let malformed = |reason: String| DataSourceError::Malformed {
        origin: origin.to_string(),
        reason,
    };

    let records = root
        .as_array()
        .ok_or_else(|| malformed("expected a top-level JSON array".to_string()))?;

    let mut headers: Vec<String> = Vec::new();
    let mut positions: BTreeMap<String, usize> = BTreeMap::new();
    let mut rows = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| malformed(format!("row {i} is not a JSON object")))?;

        let mut cells = vec![Value::Null; headers.len()];
        for (key, val) in obj {
            let col = *positions.entry(key.clone()).or_insert_with(|| {
                headers.push(key.clone());
                headers.len() - 1
            });
            if col >= cells.len() {
                cells.resize(col + 1, Value::Null);
            }
            cells[col] = json_to_value(val);
        }
        rows.push(cells);
    }

    Ok(RawTable {
        headers,
        rows,
        untyped: false,
    })
}

fn json_to_value(val: &JsonValue) -> Value {
    match val {
        JsonValue::String(s) => Value::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                Value::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Null => Value::Null,
        other => Value::String(other.to_string()),
    }
}

/// Works with files written by both pandas (`df.to_parquet()`) and polars
/// (`df.write_parquet()`).
fn parse_parquet(body: Bytes, origin: &str) -> Result<RawTable, DataSourceError> {
    let parquet_error = |source| DataSourceError::Parquet {
        origin: origin.to_string(),
        source,
    };
    let reader = ParquetRecordBatchReaderBuilder::try_new(body)
        .map_err(parquet_error)?
        .build()
        .map_err(parquet_error)?;

    let mut headers: Vec<String> = Vec::new();
    let mut rows = Vec::new();

    for batch_result in reader {
        let batch = batch_result.map_err(|source| DataSourceError::Arrow {
            origin: origin.to_string(),
            source,
        })?;
        if headers.is_empty() {
            headers = batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect();
        }

        for row in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|col| arrow_value(col, row))
                    .collect(),
            );
        }
    }

    Ok(RawTable {
        headers,
        rows,
        untyped: false,
    })
}

/// Extract a single cell from an Arrow column. Types without a direct
/// counterpart (dates, decimals, ...) are rendered as text.
fn arrow_value(col: &ArrayRef, row: usize) -> Value {
    if col.is_null(row) {
        return Value::Null;
    }
    let value = match col.data_type() {
        DataType::Utf8 => col
            .as_string_opt::<i32>()
            .map(|a| Value::String(a.value(row).to_string())),
        DataType::LargeUtf8 => col
            .as_string_opt::<i64>()
            .map(|a| Value::String(a.value(row).to_string())),
        DataType::Int8 => col
            .as_primitive_opt::<Int8Type>()
            .map(|a| Value::Integer(a.value(row) as i64)),
        DataType::Int16 => col
            .as_primitive_opt::<Int16Type>()
            .map(|a| Value::Integer(a.value(row) as i64)),
        DataType::Int32 => col
            .as_primitive_opt::<Int32Type>()
            .map(|a| Value::Integer(a.value(row) as i64)),
        DataType::Int64 => col
            .as_primitive_opt::<Int64Type>()
            .map(|a| Value::Integer(a.value(row))),
        DataType::UInt8 => col
            .as_primitive_opt::<UInt8Type>()
            .map(|a| Value::Integer(a.value(row) as i64)),
        DataType::UInt16 => col
            .as_primitive_opt::<UInt16Type>()
            .map(|a| Value::Integer(a.value(row) as i64)),
        DataType::UInt32 => col
            .as_primitive_opt::<UInt32Type>()
            .map(|a| Value::Integer(a.value(row) as i64)),
        DataType::UInt64 => col
            .as_primitive_opt::<UInt64Type>()
            .and_then(|a| i64::try_from(a.value(row)).ok())
            .map(Value::Integer),
        DataType::Float32 => col
            .as_primitive_opt::<Float32Type>()
            .map(|a| Value::Float(a.value(row) as f64)),
        DataType::Float64 => col
            .as_primitive_opt::<Float64Type>()
            .map(|a| Value::Float(a.value(row))),
        DataType::Boolean => col.as_boolean_opt().map(|a| Value::Bool(a.value(row))),
        _ => array_value_to_string(col, row).ok().map(Value::String),
    };
    value.unwrap_or(Value::Null)
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Check required columns, coerce declared columns to their type, trim
/// filter keys and infer a type for every undeclared column.
fn normalize(raw: RawTable, schema: &Schema, origin: &str) -> Result<Table, DataSourceError> {
    let missing: Vec<String> = schema
        .columns
        .iter()
        .filter(|spec| spec.required && !raw.headers.iter().any(|h| h == spec.name))
        .map(|spec| spec.name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DataSourceError::MissingColumns {
            origin: origin.to_string(),
            missing,
        });
    }
    for spec in schema.columns.iter().filter(|spec| !spec.required) {
        if !raw.headers.iter().any(|h| h == spec.name) {
            debug!("{origin}: optional column '{}' is absent", spec.name);
        }
    }

    let width = raw.headers.len();
    let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(raw.rows.len()); width];
    for mut row in raw.rows {
        row.resize(width, Value::Null);
        for (col, cell) in row.into_iter().enumerate() {
            columns[col].push(cell);
        }
    }

    let mut types = Vec::with_capacity(width);
    for (header, values) in raw.headers.iter().zip(columns.iter_mut()) {
        let ty = match schema.column(header) {
            Some(spec) => {
                let failed = coerce_column(values, spec.ty, spec.trim);
                if failed > 0 {
                    warn!(
                        "{origin}: {failed} value(s) in column '{header}' could not be read as {:?}",
                        spec.ty
                    );
                }
                spec.ty
            }
            None => infer_column(values, raw.untyped),
        };
        types.push(ty);
    }

    let n_rows = columns.first().map_or(0, Vec::len);
    let mut iters: Vec<_> = columns.into_iter().map(Vec::into_iter).collect();
    let rows = (0..n_rows)
        .map(|_| {
            Row::new(
                iters
                    .iter_mut()
                    .map(|it| it.next().unwrap_or(Value::Null))
                    .collect(),
            )
        })
        .collect();

    Ok(Table::new(schema.name, raw.headers, types, rows))
}

/// Coerce every value in place; returns how many non-null inputs became null.
fn coerce_column(values: &mut [Value], ty: ColumnType, trim: bool) -> usize {
    let mut failed = 0;
    for value in values.iter_mut() {
        let was_null = value.is_null();
        *value = coerce(std::mem::replace(value, Value::Null), ty, trim);
        if !was_null && value.is_null() && !matches!(ty, ColumnType::Text) {
            failed += 1;
        }
    }
    failed
}

fn coerce(value: Value, ty: ColumnType, trim: bool) -> Value {
    match ty {
        ColumnType::Text => match value {
            Value::Null => Value::Null,
            Value::String(s) if trim => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Value::Null
                } else if trimmed.len() == s.len() {
                    Value::String(s)
                } else {
                    Value::String(trimmed.to_string())
                }
            }
            Value::String(s) => Value::String(s),
            other => Value::String(other.to_string()),
        },
        ColumnType::Integer => to_integer(&value).map_or(Value::Null, Value::Integer),
        ColumnType::Year => to_integer(&value)
            .filter(|year| (1000..=9999).contains(year))
            .map_or(Value::Null, Value::Integer),
        ColumnType::Float => match value {
            Value::Integer(i) => Value::Float(i as f64),
            Value::Float(f) => Value::Float(f),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_or(Value::Null, Value::Float),
            _ => Value::Null,
        },
        ColumnType::Bool => match value {
            Value::Bool(b) => Value::Bool(b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => Value::Null,
            },
            _ => Value::Null,
        },
    }
}

/// Integers, integral floats (`2001.0`, as pandas writes nullable int
/// columns) and their text forms.
fn to_integer(value: &Value) -> Option<i64> {
    fn integral(f: f64) -> Option<i64> {
        (f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64).then_some(f as i64)
    }
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) => integral(*f),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    }
}

fn guess_value(s: &str) -> Value {
    if s.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Value::Float(f);
    }
    if s == "true" || s == "false" {
        return Value::Bool(s == "true");
    }
    Value::String(s.to_string())
}

/// Pick the narrowest type covering every non-null value of an undeclared
/// column; integers mixed with floats widen to float, anything else mixed
/// falls back to text.
fn infer_column(values: &mut [Value], untyped: bool) -> ColumnType {
    let guessed: Vec<Value> = if untyped {
        values
            .iter()
            .map(|v| match v {
                Value::String(s) => guess_value(s),
                other => other.clone(),
            })
            .collect()
    } else {
        values.to_vec()
    };

    let mut inferred: Option<ColumnType> = None;
    for value in &guessed {
        let ty = match value {
            Value::Null => continue,
            Value::Bool(_) => ColumnType::Bool,
            Value::Integer(_) => ColumnType::Integer,
            Value::Float(_) => ColumnType::Float,
            Value::String(_) => ColumnType::Text,
        };
        inferred = match (inferred, ty) {
            (None, ty) => Some(ty),
            (Some(a), b) if a == b => Some(a),
            (Some(ColumnType::Integer), ColumnType::Float)
            | (Some(ColumnType::Float), ColumnType::Integer) => Some(ColumnType::Float),
            _ => Some(ColumnType::Text),
        };
        if inferred == Some(ColumnType::Text) {
            break;
        }
    }

    let ty = inferred.unwrap_or(ColumnType::Text);
    if ty != ColumnType::Text {
        for (value, guess) in values.iter_mut().zip(guessed) {
            *value = coerce(guess, ty, false);
        }
    } else {
        coerce_column(values, ColumnType::Text, false);
    }
    ty
}
