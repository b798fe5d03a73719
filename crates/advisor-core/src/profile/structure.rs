// Per-column structure descriptions for the schema-understanding prompt.

use indexmap::IndexMap;
use serde::Serialize;

use crate::dataset::{Column, ColumnKind, Dataset};
use crate::profile::patterns::iso;
use crate::profile::stats;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub null_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Range {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnProfile {
    Numeric { stats: Option<NumericStats> },
    Temporal { range: Option<Range> },
    Categorical {
        unique_values: usize,
        distribution: IndexMap<String, f64>,
    },
}

/// Describe every column in dataset order.
pub fn column_profiles(dataset: &Dataset) -> IndexMap<String, ColumnProfile> {
    dataset
        .columns()
        .iter()
        .map(|c| (c.name.clone(), profile_column(c)))
        .collect()
}

fn profile_column(column: &Column) -> ColumnProfile {
    match column.kind {
        ColumnKind::Integer | ColumnKind::Float => {
            let values = column.present_numbers();
            let stats = stats::mean(&values).map(|mean| NumericStats {
                min: values.iter().copied().fold(f64::INFINITY, f64::min),
                max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                mean,
                null_percentage: column.null_count() as f64 / column.len() as f64 * 100.0,
            });
            ColumnProfile::Numeric { stats }
        }
        ColumnKind::Temporal => {
            let stamps: Vec<_> = column.timestamps().into_iter().flatten().collect();
            let range = stamps
                .iter()
                .min()
                .zip(stamps.iter().max())
                .map(|(start, end)| Range {
                    start: iso(start),
                    end: iso(end),
                });
            ColumnProfile::Temporal { range }
        }
        ColumnKind::Categorical => ColumnProfile::Categorical {
            unique_values: column.unique_count(),
            distribution: column
                .normalized_value_counts()
                .into_iter()
                .take(5)
                .collect(),
        },
    }
}
