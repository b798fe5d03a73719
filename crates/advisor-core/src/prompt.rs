// Prompt templates and the chat prompts built from them.
//
// Templates come from config/prompts.toml. A template references request and
// profile data with `{name}` placeholders; `{{` and `}}` produce literal
// braces so templates can show the model an example JSON response.

use serde::Deserialize;
use serde_json::Value;

use crate::profile::{DataContext, DataPatterns, DataSummary};
use crate::request::{AnalysisRequest, DynamicRequest};

/// Placeholders available to the fixed-schema analysis template.
pub const ANALYSIS_VARS: &[&str] = &[
    "business_model",
    "value_proposition",
    "target_metrics",
    "revenue_drivers",
    "data_summary",
];

/// Placeholders available to the schema-understanding template.
pub const SCHEMA_VARS: &[&str] = &[
    "business_model",
    "value_proposition",
    "business_goal",
    "columns",
    "sample_data",
    "total_rows",
    "data_types",
    "column_profiles",
    "data_patterns",
];

/// Placeholders available to the recommendations template.
pub const RECOMMENDATION_VARS: &[&str] = &[
    "business_model",
    "value_proposition",
    "business_goal",
    "analysis_results",
    "data_patterns",
];

/// Placeholders available to the question-answering template.
pub const QUESTION_VARS: &[&str] = &[
    "business_model",
    "value_proposition",
    "business_goal",
    "analysis_results",
    "data_patterns",
    "questions",
];

const NO_GOAL: &str = "Not specified";

// ---------------------------------------------------------------------------
// Template types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromptTemplate {
    pub system_role: String,
    pub user_template: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DynamicPrompts {
    pub schema_understanding: PromptTemplate,
    pub recommendations: PromptTemplate,
    pub question_answering: PromptTemplate,
}

/// The full prompts.toml contents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromptSet {
    pub analysis: PromptTemplate,
    pub dynamic_analysis: DynamicPrompts,
}

/// A rendered system/user message pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("template references unknown placeholder `{{{0}}}`")]
    MissingVariable(String),

    #[error("unbalanced brace at byte {position}")]
    UnbalancedBrace { position: usize },

    #[error("invalid placeholder name {name:?} at byte {position}")]
    InvalidPlaceholder { name: String, position: usize },
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum Piece<'a> {
    Text(String),
    Var(&'a str),
}

fn parse(template: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if chars.peek().is_some_and(|(_, c)| *c == '{') => {
                chars.next();
                text.push('{');
            }
            '{' => {
                let start = pos + 1;
                let end = loop {
                    match chars.next() {
                        Some((i, '}')) => break i,
                        Some((_, '{')) | None => {
                            return Err(TemplateError::UnbalancedBrace { position: pos })
                        }
                        Some(_) => {}
                    }
                };
                let name = template[start..end].trim();
                if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Err(TemplateError::InvalidPlaceholder {
                        name: name.to_string(),
                        position: pos,
                    });
                }
                if !text.is_empty() {
                    pieces.push(Piece::Text(std::mem::take(&mut text)));
                }
                pieces.push(Piece::Var(name));
            }
            '}' if chars.peek().is_some_and(|(_, c)| *c == '}') => {
                chars.next();
                text.push('}');
            }
            '}' => return Err(TemplateError::UnbalancedBrace { position: pos }),
            other => text.push(other),
        }
    }
    if !text.is_empty() {
        pieces.push(Piece::Text(text));
    }
    Ok(pieces)
}

/// Distinct placeholder names in order of first use.
pub fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names: Vec<String> = Vec::new();
    for piece in parse(template)? {
        if let Piece::Var(name) = piece {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}

/// Substitute `vars` into `template`.
pub fn render(template: &str, vars: &[(&str, String)]) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len() + 256);
    for piece in parse(template)? {
        match piece {
            Piece::Text(text) => out.push_str(&text),
            Piece::Var(name) => {
                let value = vars
                    .iter()
                    .find(|(k, _)| *k == name)
                    .map(|(_, v)| v)
                    .ok_or_else(|| TemplateError::MissingVariable(name.to_string()))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    // Serializing these in-memory types cannot fail: no maps with non-string keys.
    serde_json::to_string_pretty(value).unwrap_or_default()
}

fn chat(template: &PromptTemplate, vars: &[(&str, String)]) -> Result<ChatPrompt, TemplateError> {
    Ok(ChatPrompt {
        system: template.system_role.clone(),
        user: render(&template.user_template, vars)?,
    })
}

// ---------------------------------------------------------------------------
// Prompt builders
// ---------------------------------------------------------------------------

/// Build the fixed-schema analysis prompt.
pub fn analysis_prompt(
    prompts: &PromptSet,
    request: &AnalysisRequest,
    summary: &DataSummary,
) -> Result<ChatPrompt, TemplateError> {
    chat(
        &prompts.analysis,
        &[
            ("business_model", request.business_model.clone()),
            ("value_proposition", request.value_proposition.clone()),
            ("target_metrics", request.target_metrics.join(", ")),
            ("revenue_drivers", request.revenue_drivers.join(", ")),
            ("data_summary", to_json(summary)),
        ],
    )
}

/// Build the prompt asking the model for an analysis plan.
pub fn schema_prompt(
    prompts: &PromptSet,
    request: &DynamicRequest,
    context: &DataContext,
) -> Result<ChatPrompt, TemplateError> {
    chat(
        &prompts.dynamic_analysis.schema_understanding,
        &[
            ("business_model", request.business_model.clone()),
            ("value_proposition", request.value_proposition.clone()),
            ("business_goal", goal(request)),
            ("columns", to_json(&context.columns)),
            ("sample_data", to_json(&context.sample_data)),
            ("total_rows", context.total_rows.to_string()),
            ("data_types", to_json(&context.data_types)),
            ("column_profiles", to_json(&context.column_profiles)),
            ("data_patterns", to_json(&context.data_patterns)),
        ],
    )
}

/// Build the prompt asking for recommendations from executed plan results.
pub fn recommendations_prompt(
    prompts: &PromptSet,
    request: &DynamicRequest,
    analysis_results: &Value,
    patterns: &DataPatterns,
) -> Result<ChatPrompt, TemplateError> {
    chat(
        &prompts.dynamic_analysis.recommendations,
        &[
            ("business_model", request.business_model.clone()),
            ("value_proposition", request.value_proposition.clone()),
            ("business_goal", goal(request)),
            ("analysis_results", to_json(analysis_results)),
            ("data_patterns", to_json(patterns)),
        ],
    )
}

/// Build the prompt asking the model to answer the user's questions.
pub fn questions_prompt(
    prompts: &PromptSet,
    request: &DynamicRequest,
    analysis_results: &Value,
    patterns: &DataPatterns,
) -> Result<ChatPrompt, TemplateError> {
    let questions = request
        .questions
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {q}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    chat(
        &prompts.dynamic_analysis.question_answering,
        &[
            ("business_model", request.business_model.clone()),
            ("value_proposition", request.value_proposition.clone()),
            ("business_goal", goal(request)),
            ("analysis_results", to_json(analysis_results)),
            ("data_patterns", to_json(patterns)),
            ("questions", questions),
        ],
    )
}

fn goal(request: &DynamicRequest) -> String {
    request
        .business_goal
        .clone()
        .unwrap_or_else(|| NO_GOAL.to_string())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
