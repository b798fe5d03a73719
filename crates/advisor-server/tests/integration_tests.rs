// Integration tests for the advisor service.
//
// These drive the axum router end-to-end with `tower::ServiceExt::oneshot`,
// backed by a scripted model in place of the OpenAI client, and check the
// response envelope, the prompts sent to the model, and the CORS/limit layers.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use advisor_core::config::{load_config_from, Config};
use advisor_llm::{ChatRequest, JsonModel, LlmError};
use advisor_server::engine::AnalyticsEngine;
use advisor_server::http::{router, AppState};

// ===========================================================================
// Test helpers
// ===========================================================================

const CAMPAIGN_CSV: &str = "week,widget_name,layout,views,clicks,attributed_revenue,customer_id
2024-01-01,Bestsellers,grid,1000,50,120.5,c1
2024-01-08,Recently Viewed,carousel,500,25,80,c2
2024-01-15,Bestsellers,grid,250,5,0,c1
";

const BOUNDARY: &str = "advisor-test-boundary";

/// Replays canned replies in order and records every request it receives.
struct ScriptedModel {
    replies: Mutex<VecDeque<Result<Value, LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    enabled: bool,
}

impl ScriptedModel {
    fn new(replies: Vec<Result<Value, LlmError>>) -> Arc<Self> {
        Arc::new(ScriptedModel {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            enabled: true,
        })
    }

    fn disabled() -> Arc<Self> {
        Arc::new(ScriptedModel {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            enabled: false,
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl JsonModel for ScriptedModel {
    async fn complete_json(&self, request: &ChatRequest) -> Result<Value, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.enabled {
            return Err(LlmError::NotConfigured);
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::MalformedResponse("no scripted reply".into())))
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// Config loaded from the shipped defaults/ via a scratch directory.
fn default_config(name: &str) -> Config {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
    let tmp = std::env::temp_dir().join(name);
    let config_dir = tmp.join("config");
    let _ = std::fs::remove_dir_all(&tmp);
    std::fs::create_dir_all(&config_dir).unwrap();
    for file in ["server.toml", "prompts.toml"] {
        std::fs::copy(root.join("defaults").join(file), config_dir.join(file)).unwrap();
    }
    let config = load_config_from(&tmp).unwrap();
    let _ = std::fs::remove_dir_all(&tmp);
    config
}

fn app_with(config: &Config, model: Arc<ScriptedModel>) -> Router {
    let engine = AnalyticsEngine::from_config(config, model);
    router(AppState::new(engine), &config.server).unwrap()
}

fn app(name: &str, model: Arc<ScriptedModel>) -> Router {
    app_with(&default_config(name), model)
}

/// Encode text fields and an optional CSV upload as multipart/form-data.
fn multipart_body(fields: &[(&str, &str)], file: Option<&str>) -> Vec<u8> {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    if let Some(csv) = file {
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"data.csv\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body.into_bytes()
}

async fn post_form(
    app: Router,
    path: &str,
    fields: &[(&str, &str)],
    file: Option<&str>,
) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri(path)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields, file)))
        .unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn analyze_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("business_model", "Shopify app selling recommendation widgets"),
        ("value_proposition", "Personalized product discovery"),
        ("target_metrics", "CTR, attributed revenue"),
        ("revenue_drivers", "widget placement,layout"),
    ]
}

fn dynamic_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("business_model", "Shopify app selling recommendation widgets"),
        ("value_proposition", "Personalized product discovery"),
    ]
}

fn ctr_plan() -> Value {
    json!({
        "metrics": [
            {
                "name": "total_revenue",
                "description": "All attributed revenue",
                "operation": "sum",
                "column": "attributed_revenue"
            },
            {
                "name": "ctr_by_widget",
                "operation": "ratio",
                "numerator": "clicks",
                "denominator": "views",
                "group_by": "widget_name"
            },
            {
                "name": "conversion_rate",
                "operation": "sum",
                "column": "orders"
            }
        ]
    })
}

// ===========================================================================
// /analyze
// ===========================================================================

#[tokio::test]
async fn analyze_returns_recommendations_and_metrics() {
    let model = ScriptedModel::new(vec![Ok(json!({
        "recommendations": [{
            "recommendation": "Promote Recently Viewed above the fold",
            "revenue_impact": "+4% attributed revenue",
            "confidence": 0.6
        }]
    }))]);
    let app = app("advisor_it_analyze", model.clone());

    let (status, body) = post_form(app, "/analyze", &analyze_fields(), Some(CAMPAIGN_CSV)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(
        data["recommendations"][0]["recommendation"],
        "Promote Recently Viewed above the fold"
    );
    assert_eq!(data["metrics"]["total_views"], 1750.0);
    assert_eq!(data["metrics"]["total_clicks"], 80.0);
    assert_eq!(data["metrics"]["total_revenue"], 200.5);
    assert_eq!(
        data["metrics"]["widget_distribution"],
        json!({"Bestsellers": 2, "Recently Viewed": 1})
    );
    assert_eq!(data["metrics"]["unique_customers"], 2);

    let requests = model.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].model, "gpt-4o-mini");
    assert_eq!(requests[0].temperature, 0.3);
    assert!(requests[0].user.contains("Target metrics: CTR, attributed revenue"));
    assert!(requests[0].user.contains("Revenue drivers: widget placement, layout"));
    assert!(requests[0].user.contains("\"total_records\": 3"));
}

#[tokio::test]
async fn analyze_falls_back_when_model_returns_nothing() {
    let model = ScriptedModel::new(vec![Ok(json!({"recommendations": []}))]);
    let app = app("advisor_it_analyze_fallback", model);

    let (status, body) = post_form(app, "/analyze", &analyze_fields(), Some(CAMPAIGN_CSV)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let recs = body["data"]["recommendations"].as_array().unwrap();
    assert_eq!(recs.len(), 1);
    assert_eq!(
        recs[0]["recommendation"],
        "Error: No recommendations generated. Please try again."
    );
    assert_eq!(recs[0]["confidence"], 0.0);
}

#[tokio::test]
async fn analyze_missing_field_is_422() {
    let model = ScriptedModel::new(vec![]);
    let app = app("advisor_it_missing_field", model.clone());
    let fields: Vec<_> = analyze_fields()
        .into_iter()
        .filter(|(name, _)| *name != "revenue_drivers")
        .collect();

    let (status, body) = post_form(app, "/analyze", &fields, Some(CAMPAIGN_CSV)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Field required: revenue_drivers");
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn analyze_missing_file_is_422() {
    let app = app("advisor_it_missing_file", ScriptedModel::new(vec![]));

    let (status, body) = post_form(app, "/analyze", &analyze_fields(), None).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Field required: file");
}

#[tokio::test]
async fn analyze_reports_model_failure_in_envelope() {
    let app = app("advisor_it_disabled", ScriptedModel::disabled());

    let (status, body) = post_form(app, "/analyze", &analyze_fields(), Some(CAMPAIGN_CSV)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Error processing data: LLM not configured");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn analyze_reports_non_numeric_totals() {
    let model = ScriptedModel::new(vec![]);
    let app = app("advisor_it_bad_views", model.clone());
    let csv = "week,views\n2024-01-01,100\n2024-01-08,lots\n";

    let (status, body) = post_form(app, "/analyze", &analyze_fields(), Some(csv)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    let error = body["error"].as_str().unwrap();
    assert!(error.starts_with("Error processing data:"), "{error}");
    assert!(error.contains("views"), "{error}");
    assert!(model.requests().is_empty());
}

#[tokio::test]
async fn analyze_reports_empty_upload() {
    let app = app("advisor_it_empty_csv", ScriptedModel::new(vec![]));

    let (status, body) = post_form(app, "/analyze", &analyze_fields(), Some("")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(
        body["error"],
        "Error processing data: CSV file is empty or has no header row"
    );
}

// ===========================================================================
// /analyze-dynamic
// ===========================================================================

#[tokio::test]
async fn dynamic_executes_plan_and_recommends() {
    let model = ScriptedModel::new(vec![
        Ok(ctr_plan()),
        Ok(json!({
            "recommendations": [{
                "recommendation": "Test a carousel layout for Bestsellers",
                "rationale": "ctr_by_widget",
                "revenue_impact": "Moderate",
                "confidence": 0.5
            }]
        })),
    ]);
    let app = app("advisor_it_dynamic", model.clone());

    let (status, body) =
        post_form(app, "/analyze-dynamic", &dynamic_fields(), Some(CAMPAIGN_CSV)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let data = &body["data"];

    let analysis = &data["analysis"];
    assert_eq!(analysis["total_revenue"], 200.5);
    assert_eq!(analysis["ctr_by_widget"]["Bestsellers"], 0.044);
    assert_eq!(analysis["ctr_by_widget"]["Recently Viewed"], 0.05);
    assert_eq!(analysis["conversion_rate"], Value::Null);
    assert!(analysis["statistical_significance"]
        .get("total_revenue")
        .is_some());

    assert!(data["patterns"]["temporal_patterns"].get("week").is_some());
    assert_eq!(
        data["recommendations"][0]["recommendation"],
        "Test a carousel layout for Bestsellers"
    );
    assert!(data.get("answers").is_none());

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, "gpt-4o");
    assert_eq!(requests[0].temperature, 0.5);
    assert!(requests[0].user.contains("Dataset: 3 rows."));
    assert!(requests[0].user.contains("\"attributed_revenue\""));
    assert_eq!(requests[1].model, "gpt-4o");
    assert_eq!(requests[1].temperature, 0.3);
    assert!(requests[1].user.contains("Business goal: Not specified"));
    assert!(requests[1].user.contains("\"ctr_by_widget\""));
}

#[tokio::test]
async fn dynamic_answers_questions_with_fallbacks() {
    let model = ScriptedModel::new(vec![Ok(json!({"metrics": []})), Ok(json!({}))]);
    let app = app("advisor_it_questions", model.clone());
    let mut fields = dynamic_fields();
    fields.push(("business_goal", "Grow average order value"));
    fields.push(("questions", "What drives revenue?\nWhich widget converts best?"));

    let (status, body) =
        post_form(app, "/analyze-dynamic", &fields, Some(CAMPAIGN_CSV)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let answers = body["data"]["answers"].as_array().unwrap();
    assert_eq!(answers.len(), 2);
    assert_eq!(answers[0]["question"], "What drives revenue?");
    assert_eq!(
        answers[1]["answer"],
        "Error: No answer generated. Please try again."
    );
    assert!(body["data"].get("recommendations").is_none());

    let requests = model.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].user.contains("Business goal: Grow average order value"));
    assert!(requests[1]
        .user
        .contains("1. What drives revenue?\n2. Which widget converts best?"));
}

#[tokio::test]
async fn dynamic_requires_business_context() {
    let app = app("advisor_it_dynamic_missing", ScriptedModel::new(vec![]));
    let fields = [("business_model", "Marketplace")];

    let (status, body) = post_form(app, "/analyze-dynamic", &fields, Some(CAMPAIGN_CSV)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Field required: value_proposition");
}

// ===========================================================================
// Health, multipart rejection, CORS, body limit
// ===========================================================================

#[tokio::test]
async fn health_reports_llm_state() {
    let request = || {
        Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap()
    };

    let app_on = app("advisor_it_health_on", ScriptedModel::new(vec![]));
    let (status, body) = send(app_on, request()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "llm": "active"}));

    let app_off = app("advisor_it_health_off", ScriptedModel::disabled());
    let (_, body) = send(app_off, request()).await;
    assert_eq!(body["llm"], "disabled");
}

#[tokio::test]
async fn non_multipart_body_is_400() {
    let app = app("advisor_it_not_multipart", ScriptedModel::new(vec![]));
    let request = Request::builder()
        .method(Method::POST)
        .uri("/analyze")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();

    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn cors_allows_configured_origin_with_credentials() {
    let preflight = |origin: &str| {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/analyze")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap()
    };

    let app_allowed = app("advisor_it_cors", ScriptedModel::new(vec![]));
    let response = app_allowed
        .oneshot(preflight("http://localhost:5173"))
        .await
        .unwrap();
    let headers = response.headers();
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

    let app_denied = app("advisor_it_cors_denied", ScriptedModel::new(vec![]));
    let response = app_denied
        .oneshot(preflight("http://evil.example"))
        .await
        .unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let mut config = default_config("advisor_it_limit");
    config.server.max_upload_bytes = 256;
    let app = app_with(&config, ScriptedModel::new(vec![]));
    let big_csv = format!("views\n{}", "1000\n".repeat(200));

    let (status, body) = post_form(app, "/analyze", &analyze_fields(), Some(&big_csv)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["success"], false);
}
