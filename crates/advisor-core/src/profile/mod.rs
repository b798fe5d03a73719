pub mod enrich;
pub mod patterns;
pub mod stats;
pub mod structure;
pub mod summary;

pub use enrich::enrich_analysis;
pub use patterns::{detect_patterns, DataPatterns};
pub use structure::column_profiles;
pub use summary::{prepare_data_summary, DataSummary};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::config::AnalysisSettings;
use crate::dataset::Dataset;
use structure::ColumnProfile;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("column `{column}` contains a non-numeric value: {value:?}")]
    NotNumeric { column: String, value: String },
}

/// Everything the schema-understanding prompt describes about an upload.
#[derive(Debug, Clone, Serialize)]
pub struct DataContext {
    pub columns: Vec<String>,
    pub sample_data: Vec<Value>,
    pub total_rows: usize,
    pub data_types: Map<String, Value>,
    pub column_profiles: IndexMap<String, ColumnProfile>,
    pub data_patterns: DataPatterns,
}

impl DataContext {
    pub fn build(dataset: &Dataset, patterns: DataPatterns, settings: &AnalysisSettings) -> Self {
        DataContext {
            columns: dataset.column_names(),
            sample_data: dataset.head(settings.sample_rows),
            total_rows: dataset.row_count(),
            data_types: dataset.dtypes(),
            column_profiles: column_profiles(dataset),
            data_patterns: patterns,
        }
    }
}
