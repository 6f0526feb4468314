use std::borrow::Cow;
use std::fmt;

use serde::Serialize;

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

/// Literal column headers of the three source tables. These are lookup keys
/// and must match the source files byte for byte (`Album` is capitalised,
/// `release_year` is not).
pub mod columns {
    pub const ARTIST: &str = "artist";
    pub const TITLE: &str = "title";
    pub const ALBUM: &str = "Album";
    pub const GENRE: &str = "genre";
    pub const RELEASE_YEAR: &str = "release_year";
    pub const LYRICS: &str = "lyrics";
    pub const WORD_COUNT: &str = "Word Count";
    pub const SENTIMENT: &str = "sentiment";
    pub const SCORE: &str = "score";

    pub const JOY: &str = "joy";
    pub const SADNESS: &str = "sadness";
    pub const SURPRISE: &str = "surprise";
    pub const TRUST: &str = "trust";
    pub const ANGER: &str = "anger";
    pub const DISGUST: &str = "disgust";
    pub const ANTICIPATION: &str = "anticipation";
    pub const FEAR: &str = "fear";

    /// Per-emotion intensity columns, in dictionary order.
    pub const EMOTIONS: [&str; 8] = [
        JOY,
        SADNESS,
        SURPRISE,
        TRUST,
        ANGER,
        DISGUST,
        ANTICIPATION,
        FEAR,
    ];

    // Artist popularity / artist info tables.
    pub const NAME: &str = "nome";
    pub const POPULARITY: &str = "popularidade";
    pub const FOLLOWERS: &str = "seguidores";
    pub const KIND: &str = "tipo";
    pub const IMAGE: &str = "imagem_principal";
    pub const BAND: &str = "banda";
    pub const SEX: &str = "sexo";
}

// ---------------------------------------------------------------------------
// Value – a single cell
// ---------------------------------------------------------------------------

/// A dynamically-typed cell value.
/// Aggregations key `BTreeMap`s by `Value`, so it must be `Ord`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        use Value::*;
        fn discriminant(v: &Value) -> u8 {
            match v {
                Null => 0,
                Bool(_) => 1,
                Integer(_) => 2,
                Float(_) => 3,
                String(_) => 4,
            }
        }
        let da = discriminant(self);
        let db = discriminant(other);
        if da != db {
            return da.cmp(&db);
        }
        match (self, other) {
            (Null, Null) => std::cmp::Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.total_cmp(b),
            (String(a), String(b)) => a.cmp(b),
            _ => std::cmp::Ordering::Equal,
        }
    }
}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::String(s) => s.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Null => {}
        }
    }
}

/// Null renders as the empty string so that "no data" sentinels can be shown
/// as-is by the presentation layer.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => Ok(()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Interpret the value as an `f64` for numeric aggregation.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce the value into the comparison domain of a column type: numbers
    /// stay numeric for numeric columns, everything else compares as text.
    ///
    /// Integers in a float column widen to floats and `-0.0` becomes `0.0`,
    /// so equal numbers always land on the same key.
    pub fn comparable(&self, ty: ColumnType) -> Cow<'_, Value> {
        if self.is_null() {
            return Cow::Borrowed(self);
        }
        if !ty.is_numeric() {
            return match self {
                Value::String(_) => Cow::Borrowed(self),
                other => Cow::Owned(Value::String(other.to_string())),
            };
        }
        match (ty, self) {
            (ColumnType::Float, Value::Integer(i)) => Cow::Owned(Value::Float(*i as f64)),
            (_, Value::Float(f)) if *f == 0.0 && f.is_sign_negative() => {
                Cow::Owned(Value::Float(0.0))
            }
            _ => Cow::Borrowed(self),
        }
    }
}

// ---------------------------------------------------------------------------
// Column types and schemas
// ---------------------------------------------------------------------------

/// Declared (or inferred) type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    /// Four-digit calendar year.
    Year,
    Integer,
    Float,
    Bool,
    Text,
}

impl ColumnType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnType::Year | ColumnType::Integer | ColumnType::Float)
    }
}

/// One declared column of a [`Schema`].
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub ty: ColumnType,
    /// Loading fails if the header lacks a required column.
    pub required: bool,
    /// Strip surrounding whitespace; empty results become null.
    pub trim: bool,
}

const fn key(name: &'static str) -> ColumnSpec {
    ColumnSpec {
        name,
        ty: ColumnType::Text,
        required: true,
        trim: true,
    }
}

const fn optional(name: &'static str, ty: ColumnType) -> ColumnSpec {
    ColumnSpec {
        name,
        ty,
        required: false,
        trim: matches!(ty, ColumnType::Text),
    }
}

/// Declared layout of a source table. Columns not listed are kept and
/// their type is inferred from the data.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
}

impl Schema {
    pub const SONGS: Schema = Schema {
        name: "songs",
        columns: &[
            key(columns::ARTIST),
            ColumnSpec {
                name: columns::TITLE,
                ty: ColumnType::Text,
                required: true,
                trim: false,
            },
            key(columns::ALBUM),
            key(columns::GENRE),
            ColumnSpec {
                name: columns::RELEASE_YEAR,
                ty: ColumnType::Year,
                required: true,
                trim: false,
            },
            ColumnSpec {
                name: columns::LYRICS,
                ty: ColumnType::Text,
                required: false,
                trim: false,
            },
            optional(columns::WORD_COUNT, ColumnType::Integer),
            optional(columns::SENTIMENT, ColumnType::Text),
            optional(columns::SCORE, ColumnType::Float),
            optional(columns::JOY, ColumnType::Float),
            optional(columns::SADNESS, ColumnType::Float),
            optional(columns::SURPRISE, ColumnType::Float),
            optional(columns::TRUST, ColumnType::Float),
            optional(columns::ANGER, ColumnType::Float),
            optional(columns::DISGUST, ColumnType::Float),
            optional(columns::ANTICIPATION, ColumnType::Float),
            optional(columns::FEAR, ColumnType::Float),
        ],
    };

    pub const ARTIST_POPULARITY: Schema = Schema {
        name: "artist_popularity",
        columns: &[
            key(columns::NAME),
            ColumnSpec {
                name: columns::POPULARITY,
                ty: ColumnType::Integer,
                required: true,
                trim: false,
            },
            ColumnSpec {
                name: columns::FOLLOWERS,
                ty: ColumnType::Integer,
                required: true,
                trim: false,
            },
            key(columns::KIND),
            ColumnSpec {
                name: columns::IMAGE,
                ty: ColumnType::Text,
                required: false,
                trim: true,
            },
        ],
    };

    pub const ARTIST_INFO: Schema = Schema {
        name: "artist_info",
        columns: &[
            key(columns::NAME),
            optional(columns::BAND, ColumnType::Text),
            optional(columns::SEX, ColumnType::Text),
        ],
    };

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }
}

// ---------------------------------------------------------------------------
// Table – the loaded, immutable dataset
// ---------------------------------------------------------------------------

/// One row; cells are stored in header order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<Value>,
}

impl Row {
    pub fn new(cells: Vec<Value>) -> Self {
        Row { cells }
    }

    pub fn cells(&self) -> &[Value] {
        &self.cells
    }
}

/// A column-named, typed, in-memory table. Once built it is never mutated;
/// derived tables (see [`crate::data::transform`]) are new values.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    types: Vec<ColumnType>,
    rows: Vec<Row>,
}

static NULL: Value = Value::Null;

impl Table {
    /// Build a table. Rows shorter than the header are padded with nulls,
    /// longer rows are truncated.
    pub fn new(
        name: impl Into<String>,
        columns: Vec<String>,
        types: Vec<ColumnType>,
        rows: Vec<Row>,
    ) -> Self {
        debug_assert_eq!(columns.len(), types.len());
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.cells.resize(width, Value::Null);
                row
            })
            .collect();
        Table {
            name: name.into(),
            columns,
            types,
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column headers in source order.
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.column_index(column).map(|i| self.types[i])
    }

    pub fn column_types(&self) -> &[ColumnType] {
        &self.types
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Cell at (`row`, `column`), or null when either is out of range.
    pub fn value(&self, row: usize, column: usize) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.cells.get(column))
            .unwrap_or(&NULL)
    }

    pub fn row(&self, index: usize) -> Option<RowRef<'_>> {
        (index < self.rows.len()).then_some(RowRef { table: self, index })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Borrowed handle to one row that resolves columns by name.
#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    table: &'a Table,
    index: usize,
}

impl<'a> RowRef<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn get(&self, column: &str) -> &'a Value {
        match self.table.column_index(column) {
            Some(col) => self.table.value(self.index, col),
            None => &NULL,
        }
    }

    fn text(&self, column: &str) -> Option<String> {
        match self.get(column) {
            Value::Null => None,
            v => Some(v.to_string()),
        }
    }

    fn float(&self, column: &str) -> Option<f64> {
        self.get(column).as_f64()
    }
}

impl Serialize for RowRef<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.table.columns.len()))?;
        for (col, name) in self.table.columns.iter().enumerate() {
            map.serialize_entry(name, self.table.value(self.index, col))?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Typed records
// ---------------------------------------------------------------------------

/// Per-emotion intensities of a song.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Emotions {
    pub joy: Option<f64>,
    pub sadness: Option<f64>,
    pub surprise: Option<f64>,
    pub trust: Option<f64>,
    pub anger: Option<f64>,
    pub disgust: Option<f64>,
    pub anticipation: Option<f64>,
    pub fear: Option<f64>,
}

/// Typed view of one row of the songs table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongRecord {
    pub artist: String,
    pub title: String,
    pub album: String,
    pub genre: String,
    pub release_year: i64,
    pub lyrics: Option<String>,
    pub word_count: Option<i64>,
    pub sentiment: Option<String>,
    pub score: Option<f64>,
    pub emotions: Emotions,
}

impl SongRecord {
    /// `None` when any identifying field (artist, title, album, genre, year)
    /// is null.
    pub fn from_row(row: RowRef<'_>) -> Option<Self> {
        Some(SongRecord {
            artist: row.text(columns::ARTIST)?,
            title: row.text(columns::TITLE)?,
            album: row.text(columns::ALBUM)?,
            genre: row.text(columns::GENRE)?,
            release_year: row.get(columns::RELEASE_YEAR).as_i64()?,
            lyrics: row.text(columns::LYRICS),
            word_count: row.get(columns::WORD_COUNT).as_i64(),
            sentiment: row.text(columns::SENTIMENT),
            score: row.float(columns::SCORE),
            emotions: Emotions {
                joy: row.float(columns::JOY),
                sadness: row.float(columns::SADNESS),
                surprise: row.float(columns::SURPRISE),
                trust: row.float(columns::TRUST),
                anger: row.float(columns::ANGER),
                disgust: row.float(columns::DISGUST),
                anticipation: row.float(columns::ANTICIPATION),
                fear: row.float(columns::FEAR),
            },
        })
    }
}

/// Typed view of one row of the artist popularity table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistPopularity {
    pub name: String,
    /// 0–100.
    pub popularity: i64,
    pub followers: i64,
    pub kind: String,
    pub image: Option<String>,
}

impl ArtistPopularity {
    pub fn from_row(row: RowRef<'_>) -> Option<Self> {
        Some(ArtistPopularity {
            name: row.text(columns::NAME)?,
            popularity: row.get(columns::POPULARITY).as_i64()?,
            followers: row.get(columns::FOLLOWERS).as_i64()?,
            kind: row.text(columns::KIND)?,
            image: row.text(columns::IMAGE),
        })
    }
}

/// Typed view of one row of the artist info table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtistInfo {
    pub name: String,
    pub band: Option<String>,
    pub sex: Option<String>,
}

impl ArtistInfo {
    pub fn from_row(row: RowRef<'_>) -> Option<Self> {
        Some(ArtistInfo {
            name: row.text(columns::NAME)?,
            band: row.text(columns::BAND),
            sex: row.text(columns::SEX),
        })
    }
}
