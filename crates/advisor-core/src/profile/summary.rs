// Fixed-schema usage summary for widget performance exports.

use indexmap::IndexMap;
use serde::Serialize;

use crate::dataset::{Column, Dataset};
use crate::profile::ProfileError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Totals and distributions for the well-known export columns. Each field is
/// present only when its source column exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_views: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_clicks: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget_distribution: Option<IndexMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_distribution: Option<IndexMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_customers: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub total_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    pub metrics: SummaryMetrics,
}

/// Summarize the dataset for the fixed-schema analysis prompt.
pub fn prepare_data_summary(dataset: &Dataset) -> Result<DataSummary, ProfileError> {
    let date_range = dataset.column("week").and_then(week_range);

    let metrics = SummaryMetrics {
        total_views: total_of(dataset, "views")?,
        total_clicks: total_of(dataset, "clicks")?,
        total_revenue: total_of(dataset, "attributed_revenue")?,
        widget_distribution: dataset.column("widget_name").map(counts),
        layout_distribution: dataset.column("layout").map(counts),
        unique_customers: dataset.column("customer_id").map(Column::unique_count),
    };

    Ok(DataSummary {
        total_records: dataset.row_count(),
        date_range,
        metrics,
    })
}

fn week_range(column: &Column) -> Option<DateRange> {
    let present = column.raw().iter().filter(|v| !v.is_empty());
    let start = present.clone().min()?;
    let end = present.max()?;
    Some(DateRange {
        start: start.clone(),
        end: end.clone(),
    })
}

fn total_of(dataset: &Dataset, name: &str) -> Result<Option<f64>, ProfileError> {
    let Some(column) = dataset.column(name) else {
        return Ok(None);
    };
    let values = column
        .loose_numbers()
        .map_err(|value| ProfileError::NotNumeric {
            column: name.to_string(),
            value,
        })?;
    Ok(Some(values.into_iter().flatten().sum()))
}

fn counts(column: &Column) -> IndexMap<String, usize> {
    column.value_counts().into_iter().collect()
}
