// Uploaded CSV data loading and column type inference.
//
// Every cell is kept as trimmed text; an empty cell is a missing value. Each
// column gets a kind inferred from its non-empty cells so profiling and plan
// execution can treat numbers and dates as such.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use indexmap::{IndexMap, IndexSet};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::Read;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("CSV file is empty or has no header row")]
    Empty,

    #[error("duplicate column name `{0}`")]
    DuplicateColumn(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Inferred storage kind of a column, named after the dataframe dtypes the
/// prompts describe to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Temporal,
    Categorical,
}

impl ColumnKind {
    pub fn dtype(self) -> &'static str {
        match self {
            ColumnKind::Integer => "int64",
            ColumnKind::Float => "float64",
            ColumnKind::Temporal => "datetime64",
            ColumnKind::Categorical => "object",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ColumnKind::Integer | ColumnKind::Float)
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    values: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: usize,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Parse a number that may carry thousands separators (`"12,500.5"`).
pub fn parse_loose_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Parse an ISO date, datetime, or RFC 3339 timestamp.
pub fn parse_temporal(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc())
}

fn infer_kind(values: &[String]) -> ColumnKind {
    let mut present = values.iter().filter(|v| !v.is_empty()).peekable();
    if present.peek().is_none() {
        return ColumnKind::Categorical;
    }
    let present: Vec<&String> = present.collect();

    if present.iter().all(|v| v.parse::<i64>().is_ok()) {
        ColumnKind::Integer
    } else if present
        .iter()
        .all(|v| v.parse::<f64>().is_ok_and(f64::is_finite))
    {
        ColumnKind::Float
    } else if present.iter().all(|v| parse_temporal(v).is_some()) {
        ColumnKind::Temporal
    } else {
        ColumnKind::Categorical
    }
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

impl Column {
    /// Raw trimmed cell text for each row; empty string means missing.
    pub fn raw(&self) -> &[String] {
        &self.values
    }

    pub fn get(&self, row: usize) -> Option<&str> {
        self.values
            .get(row)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_empty()).count()
    }

    /// Per-row numeric value for numeric columns; `None` for missing cells
    /// and for every cell of a non-numeric column.
    pub fn numbers(&self) -> Vec<Option<f64>> {
        if !self.kind.is_numeric() {
            return vec![None; self.values.len()];
        }
        self.values.iter().map(|v| v.parse::<f64>().ok()).collect()
    }

    /// Present numeric values in row order.
    pub fn present_numbers(&self) -> Vec<f64> {
        self.numbers().into_iter().flatten().collect()
    }

    /// Per-row numbers tolerating thousands separators, for any column kind.
    ///
    /// Returns the first offending cell when a non-empty cell is not numeric.
    pub fn loose_numbers(&self) -> Result<Vec<Option<f64>>, String> {
        self.values
            .iter()
            .map(|v| {
                if v.is_empty() {
                    Ok(None)
                } else {
                    parse_loose_number(v).map(Some).ok_or_else(|| v.clone())
                }
            })
            .collect()
    }

    /// Per-row timestamps for temporal columns.
    pub fn timestamps(&self) -> Vec<Option<NaiveDateTime>> {
        if self.kind != ColumnKind::Temporal {
            return vec![None; self.values.len()];
        }
        self.values.iter().map(|v| parse_temporal(v)).collect()
    }

    pub fn unique_count(&self) -> usize {
        self.values
            .iter()
            .filter(|v| !v.is_empty())
            .map(String::as_str)
            .collect::<IndexSet<_>>()
            .len()
    }

    /// Occurrence counts of non-empty values, most frequent first. Ties keep
    /// first-appearance order.
    pub fn value_counts(&self) -> Vec<(String, usize)> {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for v in self.values.iter().filter(|v| !v.is_empty()) {
            *counts.entry(v.as_str()).or_insert(0) += 1;
        }
        counts.sort_by(|_, a, _, b| b.cmp(a));
        counts
            .into_iter()
            .map(|(k, c)| (k.to_string(), c))
            .collect()
    }

    /// Partition `rows` by this column's value, in first-seen order. Rows
    /// with a missing value are left out.
    pub fn group_rows<I>(&self, rows: I) -> IndexMap<&str, Vec<usize>>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut groups: IndexMap<&str, Vec<usize>> = IndexMap::new();
        for row in rows {
            if let Some(key) = self.get(row) {
                groups.entry(key).or_default().push(row);
            }
        }
        groups
    }

    /// `value_counts` divided by the number of non-empty cells.
    pub fn normalized_value_counts(&self) -> Vec<(String, f64)> {
        let counts = self.value_counts();
        let total: usize = counts.iter().map(|(_, c)| c).sum();
        counts
            .into_iter()
            .map(|(k, c)| (k, c as f64 / total as f64))
            .collect()
    }

    /// JSON value of one cell, typed by the column kind.
    pub fn json_value(&self, row: usize) -> Value {
        let Some(raw) = self.get(row) else {
            return Value::Null;
        };
        match self.kind {
            ColumnKind::Integer => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(Value::Null),
            ColumnKind::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ColumnKind::Temporal | ColumnKind::Categorical => Value::String(raw.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset
// ---------------------------------------------------------------------------

impl Dataset {
    /// Parse CSV text with a header row.
    ///
    /// Header names are trimmed; blank names become `Unnamed: <index>`. Short
    /// rows are padded with missing values and surplus cells are dropped.
    pub fn from_reader<R: Read>(rdr: R) -> Result<Dataset, DatasetError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(rdr);

        let headers = reader.headers()?.clone();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            return Err(DatasetError::Empty);
        }

        let mut names = Vec::with_capacity(headers.len());
        let mut seen = HashSet::new();
        for (idx, header) in headers.iter().enumerate() {
            let name = if header.is_empty() {
                format!("Unnamed: {idx}")
            } else {
                header.to_string()
            };
            if !seen.insert(name.clone()) {
                return Err(DatasetError::DuplicateColumn(name));
            }
            names.push(name);
        }

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        let mut rows = 0;
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|c| c.is_empty()) {
                continue;
            }
            for (idx, column) in cells.iter_mut().enumerate() {
                column.push(record.get(idx).unwrap_or("").to_string());
            }
            rows += 1;
        }

        let columns = names
            .into_iter()
            .zip(cells)
            .map(|(name, values)| Column {
                name,
                kind: infer_kind(&values),
                values,
            })
            .collect();

        Ok(Dataset { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Case-insensitive lookup; an exact match wins over a folded one.
    pub fn column_ci(&self, name: &str) -> Option<&Column> {
        let name = name.trim();
        self.column(name).or_else(|| {
            self.columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(name))
        })
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.kind.is_numeric())
    }

    pub fn temporal_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Temporal)
    }

    pub fn categorical_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Categorical)
    }

    /// The first `n` rows as JSON records keyed by column name.
    pub fn head(&self, n: usize) -> Vec<Value> {
        (0..self.rows.min(n))
            .map(|row| {
                let record: Map<String, Value> = self
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.json_value(row)))
                    .collect();
                Value::Object(record)
            })
            .collect()
    }

    /// Column name to dtype label, in column order.
    pub fn dtypes(&self) -> Map<String, Value> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), Value::String(c.kind.dtype().to_string())))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
