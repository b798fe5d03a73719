// Configuration loading and parsing (server.toml, prompts.toml, credentials.toml).

use serde::Deserialize;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::prompt::{self, PromptSet, PromptTemplate};

/// Environment variable consulted when credentials.toml carries no key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to seed config at {path}: {message}")]
    SeedError { path: PathBuf, message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub analysis: AnalysisSettings,
    pub prompts: PromptSet,
    pub credentials: CredentialsConfig,
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire server.toml file.
#[derive(Debug, Clone, Deserialize)]
struct ServerFile {
    server: ServerConfig,
    llm: LlmConfig,
    analysis: AnalysisSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by the CORS layer (the browser form's dev server by default).
    pub allowed_origins: Vec<String>,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub analysis: ModelSettings,
    pub schema_understanding: ModelSettings,
    pub recommendations: ModelSettings,
}

/// Model and sampling temperature for one kind of completion call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f64,
}

/// Thresholds used by pattern detection and plan execution.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisSettings {
    /// |r| above which a numeric pair is reported as a strong correlation.
    pub strong_correlation: f64,
    /// |r| above which a numeric pair is recorded as a relationship.
    pub relationship_correlation: f64,
    /// Minimum categorical impact strength recorded as a dependency.
    pub dependency_strength: f64,
    /// Unique-to-row ratio below which a text column is treated as a category.
    pub categorical_unique_ratio: f64,
    pub key_metric_limit: usize,
    pub sample_rows: usize,
    pub max_result_rows: usize,
    pub result_sample_rows: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        AnalysisSettings {
            strong_correlation: 0.7,
            relationship_correlation: 0.3,
            dependency_strength: 0.1,
            categorical_unique_ratio: 0.1,
            key_metric_limit: 5,
            sample_rows: 5,
            max_result_rows: 100,
            result_sample_rows: 50,
        }
    }
}

// ---------------------------------------------------------------------------
// credentials.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsConfig {
    pub openai_api_key: Option<String>,
}

impl CredentialsConfig {
    /// Fill in the API key from `env_value` when the file carries none.
    /// An empty string in either place counts as absent.
    pub fn with_env_fallback(self, env_value: Option<String>) -> Self {
        let file_key = self.openai_api_key.filter(|k| !k.trim().is_empty());
        let openai_api_key = file_key.or_else(|| env_value.filter(|k| !k.trim().is_empty()));
        CredentialsConfig { openai_api_key }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/server.toml`,
/// `config/prompts.toml`, and (optionally) `config/credentials.toml`,
/// all relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- server.toml (required) ---
    let server_path = config_dir.join("server.toml");
    let server_file: ServerFile = parse_file(&server_path)?;

    // --- prompts.toml (required) ---
    let prompts_path = config_dir.join("prompts.toml");
    let prompts: PromptSet = parse_file(&prompts_path)?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join("credentials.toml");
    let credentials = if credentials_path.exists() {
        parse_file::<CredentialsConfig>(&credentials_path)?
    } else {
        CredentialsConfig::default()
    };
    let credentials = credentials.with_env_fallback(std::env::var(API_KEY_ENV).ok());

    let config = Config {
        server: server_file.server,
        llm: server_file.llm,
        analysis: server_file.analysis,
        prompts,
        credentials,
    };

    validate(&config)?;

    Ok(config)
}

/// Files `load_config_from` reads from `config/` that ship with a default.
/// credentials.toml is never seeded; `defaults/credentials.toml.example`
/// documents it.
pub const SEEDED_CONFIG_FILES: [&str; 2] = ["server.toml", "prompts.toml"];

/// Seed `config/` with any of [`SEEDED_CONFIG_FILES`] it lacks, copying from
/// `defaults/`. Files already in `config/` are left untouched. Returns the
/// paths that were written.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    match (defaults_dir.is_dir(), config_dir.is_dir()) {
        (false, false) => {
            return Err(seed_error(
                base_dir,
                "neither defaults/ nor config/ exists; run from the project root",
            ))
        }
        (false, true) => return Ok(Vec::new()),
        _ => {}
    }
    std::fs::create_dir_all(&config_dir).map_err(|e| seed_error(&config_dir, e))?;

    let mut seeded = Vec::new();
    for name in SEEDED_CONFIG_FILES {
        let source = defaults_dir.join(name);
        if !source.is_file() {
            continue;
        }
        if let Some(target) = seed_file(&source, &config_dir.join(name))? {
            info!(file = name, "seeded config file from defaults");
            seeded.push(target);
        }
    }
    Ok(seeded)
}

/// Copy `source` to `target` unless `target` already exists.
fn seed_file(source: &Path, target: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let mut dest = match OpenOptions::new().write(true).create_new(true).open(target) {
        Ok(dest) => dest,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(None),
        Err(e) => return Err(seed_error(target, e)),
    };
    let mut src = File::open(source).map_err(|e| seed_error(source, e))?;
    io::copy(&mut src, &mut dest).map_err(|e| seed_error(target, e))?;
    Ok(Some(target.to_path_buf()))
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

fn seed_error(path: &Path, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::SeedError {
        path: path.to_path_buf(),
        message: reason.to_string(),
    }
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate(config: &Config) -> Result<(), ConfigError> {
    let server = &config.server;
    if server.port == 0 {
        return Err(invalid("server.port", "must be greater than 0"));
    }
    if server.allowed_origins.is_empty() {
        return Err(invalid("server.allowed_origins", "must list at least one origin"));
    }
    if server.max_upload_bytes == 0 {
        return Err(invalid("server.max_upload_bytes", "must be greater than 0"));
    }

    if config.llm.base_url.trim().is_empty() {
        return Err(invalid("llm.base_url", "must not be empty"));
    }
    let models: &[(&str, &ModelSettings)] = &[
        ("llm.analysis", &config.llm.analysis),
        ("llm.schema_understanding", &config.llm.schema_understanding),
        ("llm.recommendations", &config.llm.recommendations),
    ];
    for (name, settings) in models {
        if settings.model.trim().is_empty() {
            return Err(invalid(&format!("{name}.model"), "must not be empty"));
        }
        if !(0.0..=2.0).contains(&settings.temperature) {
            return Err(invalid(
                &format!("{name}.temperature"),
                format!("must be between 0.0 and 2.0 inclusive, got {}", settings.temperature),
            ));
        }
    }

    let a = &config.analysis;
    let thresholds: &[(&str, f64)] = &[
        ("analysis.strong_correlation", a.strong_correlation),
        ("analysis.relationship_correlation", a.relationship_correlation),
        ("analysis.dependency_strength", a.dependency_strength),
        ("analysis.categorical_unique_ratio", a.categorical_unique_ratio),
    ];
    for (name, val) in thresholds {
        if !(0.0..=1.0).contains(val) {
            return Err(invalid(
                name,
                format!("must be between 0.0 and 1.0 inclusive, got {val}"),
            ));
        }
    }
    if a.key_metric_limit == 0 {
        return Err(invalid("analysis.key_metric_limit", "must be > 0"));
    }
    if a.max_result_rows == 0 {
        return Err(invalid("analysis.max_result_rows", "must be > 0"));
    }
    if a.result_sample_rows > a.max_result_rows {
        return Err(invalid(
            "analysis.result_sample_rows",
            format!("must not exceed max_result_rows ({})", a.max_result_rows),
        ));
    }

    let p = &config.prompts;
    let templates: &[(&str, &PromptTemplate, &[&str])] = &[
        ("prompts.analysis", &p.analysis, prompt::ANALYSIS_VARS),
        (
            "prompts.dynamic_analysis.schema_understanding",
            &p.dynamic_analysis.schema_understanding,
            prompt::SCHEMA_VARS,
        ),
        (
            "prompts.dynamic_analysis.recommendations",
            &p.dynamic_analysis.recommendations,
            prompt::RECOMMENDATION_VARS,
        ),
        (
            "prompts.dynamic_analysis.question_answering",
            &p.dynamic_analysis.question_answering,
            prompt::QUESTION_VARS,
        ),
    ];
    for (name, template, allowed) in templates {
        let found = prompt::placeholders(&template.user_template)
            .map_err(|e| invalid(&format!("{name}.user_template"), e.to_string()))?;
        if let Some(unknown) = found.iter().find(|p| !allowed.contains(&p.as_str())) {
            return Err(invalid(
                &format!("{name}.user_template"),
                format!("unknown placeholder `{{{unknown}}}`; allowed: {}", allowed.join(", ")),
            ));
        }
        if template.system_role.trim().is_empty() {
            return Err(invalid(&format!("{name}.system_role"), "must not be empty"));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
