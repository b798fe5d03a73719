// Analysis pipelines behind the two upload endpoints.
//
// `analyze` summarises a fixed widget-performance schema and asks the model
// for recommendations. `analyze_dynamic` profiles an arbitrary CSV, asks the
// model for a declarative metric plan, executes it locally, and then asks for
// recommendations or answers grounded in the computed numbers.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use advisor_core::config::{AnalysisSettings, Config, LlmConfig};
use advisor_core::dataset::{Dataset, DatasetError};
use advisor_core::plan::{execute_plan, AnalysisPlan};
use advisor_core::profile::summary::SummaryMetrics;
use advisor_core::profile::{
    detect_patterns, enrich_analysis, prepare_data_summary, DataContext, DataPatterns,
    ProfileError,
};
use advisor_core::prompt::{self, PromptSet, TemplateError};
use advisor_core::request::{AnalysisRequest, DynamicRequest};
use advisor_core::response::{fallback_answer, fallback_recommendation, non_empty_list};
use advisor_llm::{ChatRequest, JsonModel, LlmError};

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("prompt template error: {0}")]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// `data` payload of a successful `/analyze` response.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeData {
    pub recommendations: Vec<Value>,
    pub metrics: SummaryMetrics,
}

/// `data` payload of a successful `/analyze-dynamic` response.
#[derive(Debug, Clone, Serialize)]
pub struct DynamicData {
    pub analysis: Map<String, Value>,
    pub patterns: DataPatterns,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<Value>>,
}

pub struct AnalyticsEngine {
    model: Arc<dyn JsonModel>,
    prompts: PromptSet,
    llm: LlmConfig,
    settings: AnalysisSettings,
}

impl AnalyticsEngine {
    pub fn new(
        model: Arc<dyn JsonModel>,
        prompts: PromptSet,
        llm: LlmConfig,
        settings: AnalysisSettings,
    ) -> Self {
        Self {
            model,
            prompts,
            llm,
            settings,
        }
    }

    pub fn from_config(config: &Config, model: Arc<dyn JsonModel>) -> Self {
        Self::new(
            model,
            config.prompts.clone(),
            config.llm.clone(),
            config.analysis.clone(),
        )
    }

    pub fn llm_enabled(&self) -> bool {
        self.model.is_enabled()
    }

    /// Fixed-schema pipeline: summary, then one recommendations call.
    pub async fn analyze(
        &self,
        dataset: &Dataset,
        request: &AnalysisRequest,
    ) -> Result<AnalyzeData, AnalysisError> {
        let summary = prepare_data_summary(dataset)?;
        debug!(rows = summary.total_records, "prepared data summary");

        let chat = prompt::analysis_prompt(&self.prompts, request, &summary)?;
        let reply = self
            .model
            .complete_json(&ChatRequest::new(&self.llm.analysis, chat))
            .await?;

        let recommendations = non_empty_list(&reply, "recommendations").unwrap_or_else(|| {
            warn!("model returned no recommendations");
            vec![fallback_recommendation()]
        });
        info!(count = recommendations.len(), "analysis complete");

        Ok(AnalyzeData {
            recommendations,
            metrics: summary.metrics,
        })
    }

    /// Schema-agnostic pipeline: profile, plan, execute, then recommend or answer.
    pub async fn analyze_dynamic(
        &self,
        dataset: &Dataset,
        request: &DynamicRequest,
    ) -> Result<DynamicData, AnalysisError> {
        let patterns = detect_patterns(dataset, &self.settings);
        let context = DataContext::build(dataset, patterns.clone(), &self.settings);

        let chat = prompt::schema_prompt(&self.prompts, request, &context)?;
        let reply = self
            .model
            .complete_json(&ChatRequest::new(&self.llm.schema_understanding, chat))
            .await?;

        let plan = AnalysisPlan::from_value(&reply);
        if plan.metrics.is_empty() {
            warn!("model proposed no metrics");
        }
        info!(metrics = plan.metrics.len(), "executing analysis plan");

        let mut analysis = execute_plan(dataset, &plan, &self.settings);
        enrich_analysis(&mut analysis, dataset);
        let results = Value::Object(analysis.clone());

        if request.questions.is_empty() {
            let chat = prompt::recommendations_prompt(&self.prompts, request, &results, &patterns)?;
            let reply = self
                .model
                .complete_json(&ChatRequest::new(&self.llm.recommendations, chat))
                .await?;
            let recommendations = non_empty_list(&reply, "recommendations").unwrap_or_else(|| {
                warn!("model returned no recommendations");
                vec![fallback_recommendation()]
            });
            Ok(DynamicData {
                analysis,
                patterns,
                recommendations: Some(recommendations),
                answers: None,
            })
        } else {
            let chat = prompt::questions_prompt(&self.prompts, request, &results, &patterns)?;
            let reply = self
                .model
                .complete_json(&ChatRequest::new(&self.llm.recommendations, chat))
                .await?;
            let answers = non_empty_list(&reply, "answers").unwrap_or_else(|| {
                warn!(questions = request.questions.len(), "model returned no answers");
                request.questions.iter().map(|q| fallback_answer(q)).collect()
            });
            Ok(DynamicData {
                analysis,
                patterns,
                recommendations: None,
                answers: Some(answers),
            })
        }
    }
}
