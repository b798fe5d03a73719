// Context added to executed plan results before they are sent back to the
// model: growth trends over time and how unusual scalar results are.

use serde_json::{json, Map, Value};
use tracing::warn;

use crate::dataset::Dataset;
use crate::plan::number;
use crate::profile::stats;

/// Add `trends` and `statistical_significance` entries to `results` where
/// plan metric names line up with dataset columns. A plan metric already
/// using one of those names is kept and the section is dropped.
pub fn enrich_analysis(results: &mut Map<String, Value>, dataset: &Dataset) {
    let mut trends = Map::new();
    if dataset.temporal_columns().next().is_some() {
        for name in results.keys() {
            let Some(column) = dataset.column_ci(name).filter(|c| c.kind.is_numeric()) else {
                continue;
            };
            let values = column.present_numbers();
            let (Some(first), Some(last)) = (values.first(), values.last()) else {
                continue;
            };
            if values.len() < 2 {
                continue;
            }
            let growth = (last / first - 1.0) * 100.0;
            let volatility = stats::series_stats(&stats::pct_changes(&values))
                .and_then(|s| s.stdev)
                .map(|s| s * 100.0);
            trends.insert(
                format!("{}_growth", column.name),
                json!({
                    "total_growth_percent": number(growth),
                    "volatility": volatility.map_or(Value::Null, number),
                }),
            );
        }
    }

    let mut significance = Map::new();
    for (name, value) in results.iter() {
        let Some(value) = value.as_f64() else {
            continue;
        };
        let zscore = dataset
            .column_ci(name)
            .filter(|c| c.kind.is_numeric())
            .and_then(|c| stats::series_stats(&c.present_numbers()))
            .and_then(|s| stats::zscore(value, &s));
        significance.insert(
            name.clone(),
            json!({ "zscore": zscore.map_or(Value::Null, number) }),
        );
    }

    attach(results, "trends", trends);
    attach(results, "statistical_significance", significance);
}

fn attach(results: &mut Map<String, Value>, key: &str, section: Map<String, Value>) {
    if section.is_empty() {
        return;
    }
    if results.contains_key(key) {
        warn!(
            metric = key,
            "plan metric shares a name with an enrichment section, skipping section"
        );
        return;
    }
    results.insert(key.to_string(), Value::Object(section));
}
