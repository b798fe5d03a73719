// Business context submitted alongside an upload.

/// Input to the fixed-schema `/analyze` pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub business_model: String,
    pub value_proposition: String,
    pub target_metrics: Vec<String>,
    pub revenue_drivers: Vec<String>,
}

/// Input to the schema-agnostic `/analyze-dynamic` pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DynamicRequest {
    pub business_model: String,
    pub value_proposition: String,
    pub business_goal: Option<String>,
    /// When non-empty the pipeline answers these instead of recommending.
    pub questions: Vec<String>,
}

/// Split a comma-separated form value into trimmed, non-empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse the `questions` form value: a JSON array of strings, or one
/// question per line.
pub fn parse_questions(raw: &str) -> Vec<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
            return list
                .into_iter()
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty())
                .collect();
        }
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(String::from)
        .collect()
}

/// Treat a blank optional form value as absent.
pub fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}
