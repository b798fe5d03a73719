// Schema-agnostic pattern detection: temporal cadence, numeric correlations,
// categorical impact on numeric columns, and the most connected metrics.
//
// The output is handed to the model as context for choosing an analysis plan,
// so it favors compact, rounded numbers over exhaustive statistics.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::Serialize;

use crate::config::AnalysisSettings;
use crate::dataset::{Column, ColumnKind, Dataset};
use crate::profile::stats::{self, round_to};

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalRange {
    pub start: String,
    pub end: String,
    pub span_days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemporalPattern {
    /// Sampling cadence (`D`, `W`, `<n>D`), or `None` when irregular.
    pub frequency: Option<String>,
    pub range: TemporalRange,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correlation {
    pub columns: [String; 2],
    pub correlation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelationshipCorrelation {
    pub strength: f64,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactLevel {
    High,
    Medium,
    Low,
}

impl ImpactLevel {
    fn from_strength(strength: f64) -> Self {
        if strength > 0.5 {
            ImpactLevel::High
        } else if strength > 0.2 {
            ImpactLevel::Medium
        } else {
            ImpactLevel::Low
        }
    }
}

/// How strongly a categorical column moves a numeric one: the spread of the
/// per-category means relative to the overall mean.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CategoricalImpact {
    pub strength: f64,
    pub impact: ImpactLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoricalPattern {
    pub unique_values: usize,
    pub distribution: IndexMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_impacts: Option<IndexMap<String, CategoricalImpact>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Relationships {
    pub correlations: IndexMap<String, RelationshipCorrelation>,
    pub dependencies: IndexMap<String, CategoricalImpact>,
    /// Participating column pairs, parallel to `correlations` then
    /// `dependencies`; used for key-metric ranking only.
    #[serde(skip)]
    links: Vec<(String, String, bool)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    CountMetric,
    ContinuousMetric,
    ChangeMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMetric {
    pub relationship_count: usize,
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    pub related_metrics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DataPatterns {
    pub temporal_patterns: IndexMap<String, TemporalPattern>,
    pub correlations: Vec<Correlation>,
    pub categorical_patterns: IndexMap<String, CategoricalPattern>,
    pub key_metrics: IndexMap<String, KeyMetric>,
    pub relationships: Relationships,
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Detect patterns across every column of the dataset.
pub fn detect_patterns(dataset: &Dataset, settings: &AnalysisSettings) -> DataPatterns {
    let mut patterns = DataPatterns::default();
    if dataset.row_count() == 0 {
        return patterns;
    }

    for column in dataset.temporal_columns() {
        if let Some(pattern) = temporal_pattern(column) {
            patterns.temporal_patterns.insert(column.name.clone(), pattern);
        }
    }

    let numeric: Vec<&Column> = dataset.numeric_columns().collect();
    if numeric.len() >= 2 {
        for (i, a) in numeric.iter().enumerate() {
            for b in &numeric[i + 1..] {
                let Some(r) = column_correlation(a, b) else {
                    continue;
                };
                if r.abs() > settings.strong_correlation {
                    patterns.correlations.push(Correlation {
                        columns: [a.name.clone(), b.name.clone()],
                        correlation: r,
                    });
                }
            }
        }
        patterns.relationships = analyze_relationships(dataset, settings);
    }

    let rows = dataset.row_count() as f64;
    for column in dataset.categorical_columns() {
        let unique = column.unique_count();
        if unique as f64 / rows >= settings.categorical_unique_ratio {
            continue;
        }
        let numeric_impacts = (!numeric.is_empty()).then(|| {
            numeric
                .iter()
                .map(|num| (num.name.clone(), categorical_impact(column, num)))
                .collect()
        });
        patterns.categorical_patterns.insert(
            column.name.clone(),
            CategoricalPattern {
                unique_values: unique,
                distribution: column.normalized_value_counts().into_iter().collect(),
                numeric_impacts,
            },
        );
    }

    patterns.key_metrics = identify_key_metrics(dataset, &patterns.relationships, settings);
    patterns
}

/// Pairwise numeric correlations and categorical dependencies above the
/// configured thresholds.
pub fn analyze_relationships(dataset: &Dataset, settings: &AnalysisSettings) -> Relationships {
    let mut rel = Relationships::default();
    let numeric: Vec<&Column> = dataset.numeric_columns().collect();

    for (i, a) in numeric.iter().enumerate() {
        for b in &numeric[i + 1..] {
            let Some(r) = column_correlation(a, b) else {
                continue;
            };
            if r.abs() > settings.relationship_correlation {
                let direction = if r > 0.0 {
                    Direction::Positive
                } else {
                    Direction::Negative
                };
                rel.correlations.insert(
                    format!("{}_{}", a.name, b.name),
                    RelationshipCorrelation {
                        strength: round_to(r, 3),
                        direction,
                    },
                );
                rel.links.push((a.name.clone(), b.name.clone(), true));
            }
        }
    }

    for cat in dataset.categorical_columns() {
        for num in &numeric {
            let impact = categorical_impact(cat, num);
            if impact.strength > settings.dependency_strength {
                rel.dependencies
                    .insert(format!("{}_{}", cat.name, num.name), impact);
                rel.links.push((cat.name.clone(), num.name.clone(), false));
            }
        }
    }

    rel
}

/// Impact of `cat` on `num`: sample deviation of the per-category means over
/// the overall mean, rounded to three places.
pub fn categorical_impact(cat: &Column, num: &Column) -> CategoricalImpact {
    let numbers = num.numbers();

    let mut groups: IndexMap<&str, Vec<f64>> = IndexMap::new();
    for (row, value) in numbers.iter().enumerate() {
        let (Some(key), Some(value)) = (cat.get(row), value) else {
            continue;
        };
        groups.entry(key).or_default().push(*value);
    }

    let group_means: Vec<f64> = groups.values().filter_map(|v| stats::mean(v)).collect();
    let overall = stats::mean(&num.present_numbers()).unwrap_or(0.0);
    let spread = stats::series_stats(&group_means).and_then(|s| s.stdev);

    let variation = match spread {
        Some(spread) if overall != 0.0 => spread / overall,
        _ => 0.0,
    };
    let strength = if variation.is_finite() {
        round_to(variation, 3)
    } else {
        0.0
    };

    CategoricalImpact {
        strength,
        impact: ImpactLevel::from_strength(strength),
    }
}

/// Rank numeric columns by how many recorded relationships they take part in.
pub fn identify_key_metrics(
    dataset: &Dataset,
    relationships: &Relationships,
    settings: &AnalysisSettings,
) -> IndexMap<String, KeyMetric> {
    let mut ranked: Vec<(String, KeyMetric)> = dataset
        .numeric_columns()
        .map(|column| {
            let name = column.name.as_str();
            let involved = relationships
                .links
                .iter()
                .filter(|(a, b, _)| a == name || b == name);
            let related_metrics = involved
                .clone()
                .filter(|(_, _, is_correlation)| *is_correlation)
                .map(|(a, b, _)| if a == name { b.clone() } else { a.clone() })
                .collect();
            (
                column.name.clone(),
                KeyMetric {
                    relationship_count: involved.count(),
                    metric_type: metric_type(column),
                    related_metrics,
                },
            )
        })
        .collect();

    ranked.sort_by(|a, b| b.1.relationship_count.cmp(&a.1.relationship_count));
    ranked.truncate(settings.key_metric_limit);
    ranked.into_iter().collect()
}

fn metric_type(column: &Column) -> MetricType {
    let values = column.present_numbers();
    if values.iter().any(|v| *v < 0.0) {
        MetricType::ChangeMetric
    } else if column.kind == ColumnKind::Integer {
        MetricType::CountMetric
    } else {
        MetricType::ContinuousMetric
    }
}

fn column_correlation(a: &Column, b: &Column) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .numbers()
        .into_iter()
        .zip(b.numbers())
        .filter_map(|(x, y)| Some((x?, y?)))
        .collect();
    stats::pearson(&pairs)
}

// ---------------------------------------------------------------------------
// Temporal helpers
// ---------------------------------------------------------------------------

pub(crate) fn iso(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn temporal_pattern(column: &Column) -> Option<TemporalPattern> {
    let stamps: Vec<NaiveDateTime> = column.timestamps().into_iter().flatten().collect();
    let start = stamps.iter().min()?;
    let end = stamps.iter().max()?;
    Some(TemporalPattern {
        frequency: infer_frequency(&stamps),
        range: TemporalRange {
            start: iso(start),
            end: iso(end),
            span_days: (*end - *start).num_days(),
        },
    })
}

/// A regular cadence of whole days between consecutive increasing stamps.
/// Needs at least three stamps.
pub fn infer_frequency(stamps: &[NaiveDateTime]) -> Option<String> {
    if stamps.len() < 3 {
        return None;
    }
    let step = stamps[1] - stamps[0];
    if step <= chrono::Duration::zero() || stamps.windows(2).any(|w| w[1] - w[0] != step) {
        return None;
    }
    if step.num_seconds() % 86_400 != 0 {
        return None;
    }
    match step.num_days() {
        1 => Some("D".to_string()),
        7 => Some("W".to_string()),
        n => Some(format!("{n}D")),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
