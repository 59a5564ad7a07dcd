/// HTTP surface for the funnel service.
///
/// Routes:
/// - `POST /chat`: one conversational turn
/// - `GET /categories`: distinct categories in catalog order
/// - `GET /services/{category_id}`: every service in a category
/// - `GET /next_question/{category_id}?current_question=`: next funnel step
/// - `GET /final_service?category_id=&answers=`: service matching the answers
/// - `POST /submit_personal_info`: store contact details for a service
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::contact::{submit_contact_info, ContactInfo, ContactSink};
use crate::error::AppError;
use crate::model::{
    Category, ConversationPhase, ConversationTurn, QuestionStep, ServiceSummary, TurnResult,
};
use crate::orchestrator::ConversationOrchestrator;
use crate::rate_limit::RateLimiter;

/// Shared state handed to every handler. The catalog behind the orchestrator is
/// read-only, so handlers never lock anything except the optional rate limiter.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<ConversationOrchestrator>,
    contacts: Arc<dyn ContactSink>,
    limiter: Option<RateLimiter>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        contacts: Arc<dyn ContactSink>,
        limiter: Option<RateLimiter>,
    ) -> Self {
        Self {
            orchestrator,
            contacts,
            limiter,
        }
    }

    async fn gate(&self) -> Result<(), AppError> {
        if let Some(limiter) = &self.limiter {
            limiter.check().await?;
        }
        Ok(())
    }
}

pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let origins: Vec<HeaderValue> = cors_origins
        .iter()
        .filter_map(|origin| {
            origin
                .parse::<HeaderValue>()
                .inspect_err(|e| warn!(error = %e, origin = %origin, "ignoring invalid CORS origin"))
                .ok()
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_credentials(true);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/chat", post(chat))
        .route("/categories", get(list_categories))
        .route("/services/{category_id}", get(list_services))
        .route("/next_question/{category_id}", get(next_question))
        .route("/final_service", get(final_service))
        .route("/submit_personal_info", post(submit_personal_info))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub categories: usize,
    pub services: usize,
    pub contact_backend: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub context: Option<Vec<ConversationTurn>>,
}

#[derive(Debug, Deserialize)]
pub struct NextQuestionParams {
    pub current_question: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FinalServiceParams {
    pub category_id: i64,
    pub answers: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub message: String,
    pub submission_id: String,
    pub phase: ConversationPhase,
}

async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the service funnel API".to_string(),
    })
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let catalog = state.orchestrator.catalog();
    Json(HealthResponse {
        status: "ok".to_string(),
        categories: catalog.category_count(),
        services: catalog.record_count(),
        contact_backend: state.contacts.backend().to_string(),
    })
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<TurnResult>, AppError> {
    state.gate().await?;
    let history = request.context.unwrap_or_default();
    let result = state
        .orchestrator
        .handle_turn(request.category_id, &history, &request.message)
        .await?;
    Ok(Json(result))
}

async fn list_categories(State(state): State<AppState>) -> Json<Vec<Category>> {
    Json(state.orchestrator.catalog().categories())
}

async fn list_services(
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
) -> Result<Json<Vec<ServiceSummary>>, AppError> {
    let records = state.orchestrator.catalog().records_for(category_id);
    if records.is_empty() {
        return Err(AppError::NotFound("Category not found".to_string()));
    }
    Ok(Json(records.iter().map(ServiceSummary::from).collect()))
}

async fn next_question(
    State(state): State<AppState>,
    Path(category_id): Path<i64>,
    Query(params): Query<NextQuestionParams>,
) -> Result<Json<QuestionStep>, AppError> {
    let step = state
        .orchestrator
        .traversal()
        .step_from(category_id, params.current_question.as_deref())?;
    Ok(Json(step))
}

async fn final_service(
    State(state): State<AppState>,
    Query(params): Query<FinalServiceParams>,
) -> Result<Json<ServiceSummary>, AppError> {
    let record = state
        .orchestrator
        .resolver()
        .final_service(params.category_id, &params.answers)?;
    Ok(Json(ServiceSummary::from(record)))
}

async fn submit_personal_info(
    State(state): State<AppState>,
    Json(info): Json<ContactInfo>,
) -> Result<Json<SubmitResponse>, AppError> {
    let submission = submit_contact_info(state.contacts.as_ref(), info).await?;
    Ok(Json(SubmitResponse {
        message: "Information submitted successfully".to_string(),
        submission_id: submission.submission_id,
        phase: ConversationPhase::Complete,
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::catalog::fixtures::plumbing_catalog;
    use crate::contact::MemoryContactSink;
    use crate::generator::testing::ScriptedGenerator;
    use crate::matching::SubstringMatch;
    use crate::termination::TerminationPolicy;

    struct Harness {
        app: Router,
        generator: Arc<ScriptedGenerator>,
        contacts: Arc<MemoryContactSink>,
    }

    fn harness_with(generator: ScriptedGenerator, limiter: Option<RateLimiter>) -> Harness {
        let generator = Arc::new(generator);
        let contacts = Arc::new(MemoryContactSink::new());
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            Arc::new(plumbing_catalog()),
            Box::new(SubstringMatch),
            TerminationPolicy::default(),
            generator.clone(),
        ));
        let state = AppState::new(orchestrator, contacts.clone(), limiter);
        let app = create_router(state, &["http://localhost:5173".to_string()]);
        Harness {
            app,
            generator,
            contacts,
        }
    }

    fn harness() -> Harness {
        harness_with(ScriptedGenerator::replying("Sure, tell me more."), None)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn root_and_health() {
        let h = harness();
        let (status, body) = send(&h.app, get_req("/")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["message"].as_str().unwrap().contains("Welcome"));

        let (status, body) = send(&h.app, get_req("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["categories"], 2);
        assert_eq!(body["services"], 4);
        assert_eq!(body["contact_backend"], "memory");
    }

    #[tokio::test]
    async fn categories_in_catalog_order() {
        let h = harness();
        let (status, body) = send(&h.app, get_req("/categories")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!([
                {"category_id": 1, "category_name": "Plumbing"},
                {"category_id": 2, "category_name": "Roofing"},
            ])
        );
    }

    #[tokio::test]
    async fn services_for_category() {
        let h = harness();
        let (status, body) = send(&h.app, get_req("/services/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
        assert_eq!(body[0]["question_funnel"], "type > leak > faucet");
        assert_eq!(body[1]["service_id"], 11);

        let (status, body) = send(&h.app, get_req("/services/99")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Category not found");
    }

    #[tokio::test]
    async fn next_question_steps() {
        let h = harness();
        let (status, body) = send(&h.app, get_req("/next_question/1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"question": "type", "options": ["leak"]}));

        let (status, body) = send(&h.app, get_req("/next_question/1?current_question=type")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"question": "leak", "options": ["faucet", "pipe"]}));

        let (status, body) = send(&h.app, get_req("/next_question/1?current_question=pipe")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No more questions");

        let (status, _) = send(&h.app, get_req("/next_question/99")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn final_service_lookup() {
        let h = harness();
        let (status, body) =
            send(&h.app, get_req("/final_service?category_id=1&answers=Leak%20%3E%20Pipe")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service_id"], 11);
        assert_eq!(body["category_name"], "Plumbing");

        let (status, body) =
            send(&h.app, get_req("/final_service?category_id=1&answers=gutter")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "No matching service found");

        let (status, _) = send(&h.app, get_req("/final_service?category_id=42&answers=leak")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn chat_turn_round_trip() {
        let h = harness();
        let request = json!({
            "message": "I have a leak",
            "category_id": 1,
            "context": [],
        });
        let (status, body) = send(&h.app, post_json("/chat", &request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Sure, tell me more.");
        assert_eq!(body["show_form"], false);
        assert_eq!(body["next_question"], "leak");
        assert_eq!(body["options"], json!(["faucet", "pipe"]));
        assert!(body["service_id"].is_null());
        assert_eq!(body["phase"], "in_funnel");
        assert_eq!(h.generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn chat_hands_off_to_form() {
        let h = harness();
        let request = json!({
            "message": "it's the faucet",
            "category_id": 1,
            "context": [
                {"role": "assistant", "content": "type"},
                {"role": "user", "content": "a leak"},
                {"role": "assistant", "content": "leak"},
                {"role": "user", "content": "my faucet"},
            ],
        });
        let (status, body) = send(&h.app, post_json("/chat", &request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["show_form"], true);
        assert_eq!(body["service_id"], 10);
        assert_eq!(body["phase"], "awaiting_form");
    }

    #[tokio::test]
    async fn chat_without_category_or_context() {
        let h = harness();
        let (status, body) = send(&h.app, post_json("/chat", &json!({"message": "hello"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["next_question"].is_null());
        assert_eq!(body["options"], json!([]));
    }

    #[tokio::test]
    async fn chat_upstream_failure_is_500() {
        let h = harness_with(ScriptedGenerator::failing(), None);
        let request = json!({"message": "hi", "category_id": 1, "context": []});
        let (status, body) = send(&h.app, post_json("/chat", &request)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("text generation failed"));
    }

    #[tokio::test]
    async fn chat_is_rate_limited() {
        let h = harness_with(
            ScriptedGenerator::replying("ok"),
            RateLimiter::new(1),
        );
        let request = json!({"message": "hi", "category_id": 1});
        let (status, _) = send(&h.app, post_json("/chat", &request)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = send(&h.app, post_json("/chat", &request)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["detail"].as_str().unwrap().contains("rate limit"));
        assert_eq!(h.generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn submit_contact_info_completes_funnel() {
        let h = harness();
        let request = json!({
            "name": "Jane Doe",
            "email": "jane@example.com",
            "zipcode": "12345",
            "address": "123 Main St",
            "phone": "5551234567",
            "service_id": 10,
        });
        let (status, body) = send(&h.app, post_json("/submit_personal_info", &request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Information submitted successfully");
        assert_eq!(body["phase"], "complete");

        let stored = h.contacts.submissions().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].info.service_id, 10);
        assert_eq!(body["submission_id"], stored[0].submission_id.as_str());
    }

    #[tokio::test]
    async fn submit_contact_info_validation() {
        let h = harness();
        let request = json!({
            "name": "Jane Doe",
            "email": "not-an-email",
            "zipcode": "12345",
            "address": "123 Main St",
            "phone": "5551234567",
            "service_id": 10,
        });
        let (status, body) = send(&h.app, post_json("/submit_personal_info", &request)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("email"));

        let missing = json!({"name": "Jane Doe", "service_id": 10});
        let (status, _) = send(&h.app, post_json("/submit_personal_info", &missing)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(h.contacts.submissions().await.is_empty());
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let h = harness();
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/chat")
            .header("origin", "http://localhost:5173")
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap();
        let resp = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(
            resp.headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost:5173")
        );
    }
}
