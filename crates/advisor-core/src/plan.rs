// Analysis plan returned by the schema-understanding call, and its executor.
//
// The model describes each metric declaratively (operation, column, optional
// grouping and filter). The executor evaluates them against the uploaded
// dataset. A metric that cannot be computed yields `null` without affecting
// the others.

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::config::AnalysisSettings;
use crate::dataset::{parse_loose_number, Column, Dataset};
use crate::profile::stats;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricFilter {
    pub column: String,
    pub equals: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetricSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub group_by: Option<String>,
    #[serde(default)]
    pub numerator: Option<String>,
    #[serde(default)]
    pub denominator: Option<String>,
    #[serde(default)]
    pub filter: Option<MetricFilter>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnalysisPlan {
    pub metrics: Vec<MetricSpec>,
}

impl AnalysisPlan {
    /// Read the `metrics` array from a model response. Entries that do not
    /// describe a metric are skipped; a response without `metrics` is an
    /// empty plan.
    pub fn from_value(value: &Value) -> AnalysisPlan {
        let Some(entries) = value.get("metrics").and_then(Value::as_array) else {
            warn!("analysis plan has no `metrics` array");
            return AnalysisPlan::default();
        };
        let metrics = entries
            .iter()
            .filter_map(|entry| match MetricSpec::deserialize(entry) {
                Ok(spec) => Some(spec),
                Err(e) => {
                    warn!("skipping malformed plan entry {entry}: {e}");
                    None
                }
            })
            .collect();
        AnalysisPlan { metrics }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Sum,
    Mean,
    Median,
    Min,
    Max,
    Count,
    CountDistinct,
    Ratio,
    Growth,
    Share,
}

impl FromStr for Operation {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "sum" | "total" => Operation::Sum,
            "mean" | "avg" | "average" => Operation::Mean,
            "median" => Operation::Median,
            "min" | "minimum" => Operation::Min,
            "max" | "maximum" => Operation::Max,
            "count" => Operation::Count,
            "count_distinct" | "nunique" | "distinct_count" => Operation::CountDistinct,
            "ratio" => Operation::Ratio,
            "growth" | "pct_change" => Operation::Growth,
            "share" | "distribution" | "value_counts" => Operation::Share,
            other => return Err(PlanError::UnsupportedOperation(other.to_string())),
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    #[error("unsupported operation `{0}`")]
    UnsupportedOperation(String),

    #[error("operation requires field `{0}`")]
    MissingField(&'static str),

    #[error("unknown column `{0}`")]
    UnknownColumn(String),

    #[error("column `{column}` has non-numeric value {value:?}")]
    NotNumeric { column: String, value: String },

    #[error("denominator sums to zero")]
    DivisionByZero,
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// JSON number for a finite float, `null` otherwise.
pub fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Evaluate every metric of `plan`, keyed by metric name in plan order.
pub fn execute_plan(
    dataset: &Dataset,
    plan: &AnalysisPlan,
    settings: &AnalysisSettings,
) -> Map<String, Value> {
    let mut results = Map::new();
    for spec in &plan.metrics {
        let value = match evaluate(dataset, spec) {
            Ok(value) => {
                debug!(metric = %spec.name, "computed plan metric");
                collapse(value, settings)
            }
            Err(e) => {
                warn!(metric = %spec.name, "could not compute plan metric: {e}");
                Value::Null
            }
        };
        results.insert(spec.name.clone(), value);
    }
    results
}

fn evaluate(dataset: &Dataset, spec: &MetricSpec) -> Result<Value, PlanError> {
    let operation: Operation = spec.operation.parse()?;

    let mut rows: Vec<usize> = (0..dataset.row_count()).collect();
    if let Some(filter) = &spec.filter {
        let column = lookup(dataset, &filter.column)?;
        rows.retain(|row| column.get(*row) == Some(filter.equals.trim()));
    }

    let Some(group_by) = &spec.group_by else {
        return aggregate(dataset, spec, operation, &rows);
    };

    let key_column = lookup(dataset, group_by)?;
    let mut grouped = Map::new();
    for (key, rows) in key_column.group_rows(rows) {
        grouped.insert(key.to_string(), aggregate(dataset, spec, operation, &rows)?);
    }
    Ok(Value::Object(grouped))
}

fn aggregate(
    dataset: &Dataset,
    spec: &MetricSpec,
    operation: Operation,
    rows: &[usize],
) -> Result<Value, PlanError> {
    match operation {
        Operation::Count => match &spec.column {
            Some(name) => {
                let column = lookup(dataset, name)?;
                Ok(json!(rows.iter().filter(|r| column.get(**r).is_some()).count()))
            }
            None => Ok(json!(rows.len())),
        },
        Operation::CountDistinct => {
            let column = lookup(dataset, required(&spec.column, "column")?)?;
            let seen: IndexSet<&str> = rows.iter().filter_map(|r| column.get(*r)).collect();
            Ok(json!(seen.len()))
        }
        Operation::Share => {
            let column = lookup(dataset, required(&spec.column, "column")?)?;
            let mut counts: IndexMap<&str, usize> = IndexMap::new();
            for value in rows.iter().filter_map(|r| column.get(*r)) {
                *counts.entry(value).or_insert(0) += 1;
            }
            counts.sort_by(|_, a, _, b| b.cmp(a));
            let total: usize = counts.values().sum();
            let shares: Map<String, Value> = counts
                .into_iter()
                .map(|(k, c)| (k.to_string(), number(c as f64 / total as f64)))
                .collect();
            Ok(Value::Object(shares))
        }
        Operation::Ratio => {
            let numerator = numeric_values(dataset, required(&spec.numerator, "numerator")?, rows)?;
            let denominator =
                numeric_values(dataset, required(&spec.denominator, "denominator")?, rows)?;
            let denominator: f64 = denominator.iter().sum();
            if denominator == 0.0 {
                return Err(PlanError::DivisionByZero);
            }
            Ok(number(numerator.iter().sum::<f64>() / denominator))
        }
        Operation::Growth => {
            let values = numeric_values(dataset, required(&spec.column, "column")?, rows)?;
            match (values.first(), values.last()) {
                (Some(first), Some(last)) if values.len() >= 2 => {
                    if *first == 0.0 {
                        return Err(PlanError::DivisionByZero);
                    }
                    Ok(number((last / first - 1.0) * 100.0))
                }
                _ => Ok(Value::Null),
            }
        }
        Operation::Sum
        | Operation::Mean
        | Operation::Median
        | Operation::Min
        | Operation::Max => {
            let values = numeric_values(dataset, required(&spec.column, "column")?, rows)?;
            let result = match operation {
                Operation::Sum => Some(values.iter().sum()),
                Operation::Mean => stats::mean(&values),
                Operation::Median => stats::median(&values),
                Operation::Min => values.iter().copied().reduce(f64::min),
                _ => values.iter().copied().reduce(f64::max),
            };
            Ok(result.map_or(Value::Null, number))
        }
    }
}

fn required<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, PlanError> {
    field.as_deref().ok_or(PlanError::MissingField(name))
}

fn lookup<'a>(dataset: &'a Dataset, name: &str) -> Result<&'a Column, PlanError> {
    dataset
        .column_ci(name)
        .ok_or_else(|| PlanError::UnknownColumn(name.to_string()))
}

/// Present values of `name` at `rows`, tolerating thousands separators.
fn numeric_values(dataset: &Dataset, name: &str, rows: &[usize]) -> Result<Vec<f64>, PlanError> {
    let column = lookup(dataset, name)?;
    rows.iter()
        .filter_map(|r| column.get(*r))
        .map(|value| {
            parse_loose_number(value).ok_or_else(|| PlanError::NotNumeric {
                column: column.name.clone(),
                value: value.to_string(),
            })
        })
        .collect()
}

/// Replace oversized object results with a count, mean and leading sample.
fn collapse(value: Value, settings: &AnalysisSettings) -> Value {
    let Value::Object(map) = value else {
        return value;
    };
    if map.len() <= settings.max_result_rows {
        return Value::Object(map);
    }

    let numeric: Vec<f64> = map.values().filter_map(Value::as_f64).collect();
    let mean = if numeric.is_empty() {
        Value::Null
    } else {
        stats::mean(&numeric).map_or(Value::Null, number)
    };
    let count = map.len();
    let sample: Map<String, Value> = map.into_iter().take(settings.result_sample_rows).collect();

    json!({
        "summary": {
            "count": count,
            "mean": mean,
            "sample": sample,
        }
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
