//! Axum route handlers for the federation server.
//!
//! Every handler answers with JSON. Errors are `{"error": "..."}` with a
//! status code chosen by [`error_status`].

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::FederationError;
use crate::policy::Caller;
use crate::service::ConfigurationService;

/// Header carrying the caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header carrying the caller's comma-separated credential set.
pub const OP_AUTHS_HEADER: &str = "x-op-auths";

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConfigurationService>,
}

impl AppState {
    pub fn new(service: Arc<ConfigurationService>) -> Self {
        Self { service }
    }
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/graph/urls", get(list_urls_handler).post(add_url_handler))
        .route("/graph/urls/:name", get(get_url_handler).delete(remove_url_handler))
        .route("/graph/refresh", post(refresh_handler))
        .route("/graph/status", get(status_handler))
        .route("/graph/schema", get(schema_handler))
        .route("/graph/operations", get(operations_handler))
        .route(
            "/graph/operations/:name/supported",
            get(operation_supported_handler),
        )
        .route("/graph/filterFunctions", get(filter_functions_handler))
        .route(
            "/graph/filterFunctions/:input_type",
            get(filter_functions_for_type_handler),
        )
        .route("/graph/transformFunctions", get(transform_functions_handler))
        .route("/graph/generators", get(generators_handler))
        .route("/graph/storeTraits", get(store_traits_handler))
        .route(
            "/graph/serialisedFields/:type_name",
            get(serialised_fields_handler),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn error_status(error: &FederationError) -> StatusCode {
    match error {
        FederationError::DuplicateName(_) | FederationError::DuplicateAddress(_) => {
            StatusCode::CONFLICT
        }
        FederationError::NotFound(_) => StatusCode::NOT_FOUND,
        FederationError::Unauthorized(_) => StatusCode::FORBIDDEN,
        FederationError::UnknownType(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(error: FederationError) -> (StatusCode, Json<Value>) {
    let status = error_status(&error);
    if error.is_user_error() {
        tracing::debug!(error = %error, "Request rejected");
    } else {
        tracing::error!(error = %error, "Request failed");
    }
    (status, Json(json!({ "error": error.to_string() })))
}

fn to_json<T: serde::Serialize>(value: &T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| error_response(e.into()))
}

/// Caller identity from the `x-user-id` / `x-op-auths` headers.
fn caller_from_headers(headers: &HeaderMap) -> Caller {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let mut caller = match user_id {
        Some(id) => Caller::new(id),
        None => Caller::anonymous(),
    };

    if let Some(auths) = headers.get(OP_AUTHS_HEADER).and_then(|v| v.to_str().ok()) {
        for auth in auths.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            caller = caller.with_auth(auth);
        }
    }
    caller
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// GET /health: liveness probe.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.service.snapshot();
    Json(json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "graph-federation",
        "generation": snapshot.generation,
    }))
}

// ---------------------------------------------------------------------------
// Endpoint registry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AddUrlRequest {
    name: String,
    url: String,
}

/// GET /graph/urls
async fn list_urls_handler(State(state): State<AppState>) -> ApiResult {
    to_json(&state.service.list_endpoints())
}

/// GET /graph/urls/:name
async fn get_url_handler(State(state): State<AppState>, Path(name): Path<String>) -> ApiResult {
    let endpoint = state.service.get_endpoint(&name).map_err(error_response)?;
    to_json(&endpoint)
}

/// POST /graph/urls: gated.
async fn add_url_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AddUrlRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    let Json(request) = payload.map_err(|rejection| {
        let body = json!({ "error": rejection.body_text() });
        (rejection.status(), Json(body))
    })?;
    let caller = caller_from_headers(&headers);
    let endpoint = state
        .service
        .add_endpoint(&caller, &request.name, &request.url)
        .await
        .map_err(error_response)?;

    let Json(body) = to_json(&endpoint)?;
    Ok((StatusCode::CREATED, Json(body)))
}

/// DELETE /graph/urls/:name: gated.
async fn remove_url_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult {
    let caller = caller_from_headers(&headers);
    let removed = state
        .service
        .remove_endpoint(&caller, &name)
        .await
        .map_err(error_response)?;
    Ok(Json(json!({ "removed": removed })))
}

// ---------------------------------------------------------------------------
// Refresh & status
// ---------------------------------------------------------------------------

/// POST /graph/refresh
async fn refresh_handler(State(state): State<AppState>) -> ApiResult {
    let statuses = state.service.refresh().await;
    to_json(&statuses)
}

/// GET /graph/status
async fn status_handler(State(state): State<AppState>) -> ApiResult {
    let snapshot = state.service.snapshot();
    Ok(Json(json!({
        "generation": snapshot.generation,
        "publishedAt": snapshot.published_at,
        "endpoints": snapshot.statuses,
        "conflicts": snapshot.conflicts,
    })))
}

// ---------------------------------------------------------------------------
// Federated capabilities
// ---------------------------------------------------------------------------

async fn schema_handler(State(state): State<AppState>) -> ApiResult {
    to_json(&state.service.get_schema())
}

async fn operations_handler(State(state): State<AppState>) -> ApiResult {
    to_json(&state.service.get_operations())
}

async fn operation_supported_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult {
    Ok(Json(json!({
        "operation": name,
        "supported": state.service.is_operation_supported(&name),
    })))
}

async fn filter_functions_handler(State(state): State<AppState>) -> ApiResult {
    to_json(&state.service.get_filter_functions())
}

async fn filter_functions_for_type_handler(
    State(state): State<AppState>,
    Path(input_type): Path<String>,
) -> ApiResult {
    let functions = state
        .service
        .get_filter_functions_applicable_to(&input_type)
        .map_err(error_response)?;
    to_json(&functions)
}

async fn transform_functions_handler(State(state): State<AppState>) -> ApiResult {
    to_json(&state.service.get_transform_functions())
}

async fn generators_handler(State(state): State<AppState>) -> ApiResult {
    to_json(&state.service.get_generators())
}

async fn store_traits_handler(State(state): State<AppState>) -> ApiResult {
    to_json(&state.service.get_traits())
}

async fn serialised_fields_handler(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
) -> ApiResult {
    let fields = state
        .service
        .get_serialised_fields(&type_name)
        .map_err(error_response)?;
    to_json(&fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::CapabilitySnapshot;
    use crate::config::FederationConfig;
    use crate::fetcher::InMemoryCapabilitySource;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const ADMIN: &str = "FederatedAdmin";

    async fn test_state() -> AppState {
        let source = Arc::new(InMemoryCapabilitySource::new());
        source.set_snapshot(
            "host1:8080",
            CapabilitySnapshot::new()
                .with_operations(["GetElements", "AddElements"])
                .with_filter_functions(["Exists"])
                .with_traits(["ORDERED"]),
        );
        let config = FederationConfig::with_admin_auth(ADMIN);
        let service = ConfigurationService::from_config(&config, source).await.unwrap();
        AppState::new(Arc::new(service))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn add_request(name: &str, url: &str, auths: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/graph/urls")
            .header("Content-Type", "application/json")
            .header(USER_ID_HEADER, "alice")
            .header(OP_AUTHS_HEADER, auths)
            .body(Body::from(json!({ "name": name, "url": url }).to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = app_router(test_state().await);

        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], crate::VERSION);
        assert_eq!(json["service"], "graph-federation");
    }

    #[tokio::test]
    async fn test_add_then_read_federated_view() {
        let state = test_state().await;

        let response = app_router(state.clone())
            .oneshot(add_request("g1", "host1:8080", "User, FederatedAdmin"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(body_json(response).await, json!({ "name": "g1", "url": "host1:8080" }));

        let response = app_router(state.clone()).oneshot(get("/graph/urls")).await.unwrap();
        assert_eq!(body_json(response).await, json!([{ "name": "g1", "url": "host1:8080" }]));

        let response = app_router(state.clone()).oneshot(get("/graph/operations")).await.unwrap();
        assert_eq!(body_json(response).await, json!(["AddElements", "GetElements"]));

        let response = app_router(state.clone())
            .oneshot(get("/graph/operations/AddElements/supported"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["supported"], true);

        let response = app_router(state.clone()).oneshot(get("/graph/storeTraits")).await.unwrap();
        assert_eq!(body_json(response).await, json!(["ORDERED"]));

        let response = app_router(state).oneshot(get("/graph/status")).await.unwrap();
        let json = body_json(response).await;
        assert_eq!(json["generation"], 2);
        assert_eq!(json["endpoints"][0]["reachable"], true);
    }

    #[tokio::test]
    async fn test_duplicate_is_conflict() {
        let state = test_state().await;
        app_router(state.clone())
            .oneshot(add_request("g1", "host1:8080", ADMIN))
            .await
            .unwrap();

        let response = app_router(state)
            .oneshot(add_request("g1", "host2:8080", ADMIN))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert!(body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("g1"));
    }

    #[tokio::test]
    async fn test_missing_credential_is_forbidden() {
        let state = test_state().await;

        let response = app_router(state.clone())
            .oneshot(add_request("g1", "host1:8080", "User"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let request = Request::builder()
            .method("DELETE")
            .uri("/graph/urls/g1")
            .body(Body::empty())
            .unwrap();
        let response = app_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(state.service.list_endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_remove_reports_whether_anything_was_removed() {
        let state = test_state().await;
        app_router(state.clone())
            .oneshot(add_request("g1", "host1:8080", ADMIN))
            .await
            .unwrap();

        for expected in [true, false] {
            let request = Request::builder()
                .method("DELETE")
                .uri("/graph/urls/g1")
                .header(OP_AUTHS_HEADER, ADMIN)
                .body(Body::empty())
                .unwrap();
            let response = app_router(state.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_json(response).await, json!({ "removed": expected }));
        }
    }

    #[tokio::test]
    async fn test_malformed_body_gets_json_error() {
        let state = test_state().await;

        let request = Request::builder()
            .method("POST")
            .uri("/graph/urls")
            .header("Content-Type", "application/json")
            .header(OP_AUTHS_HEADER, ADMIN)
            .body(Body::from(r#"{"name": "g1"}"#))
            .unwrap();
        let response = app_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("url"));

        let request = Request::builder()
            .method("POST")
            .uri("/graph/urls")
            .header(OP_AUTHS_HEADER, ADMIN)
            .body(Body::from("name=g1"))
            .unwrap();
        let response = app_router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert!(body_json(response).await["error"].is_string());
        assert!(state.service.list_endpoints().is_empty());
    }

    #[tokio::test]
    async fn test_get_single_endpoint() {
        let state = test_state().await;
        app_router(state.clone())
            .oneshot(add_request("g1", "host1:8080", ADMIN))
            .await
            .unwrap();

        let response = app_router(state.clone()).oneshot(get("/graph/urls/g1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "name": "g1", "url": "host1:8080" }));

        let response = app_router(state).oneshot(get("/graph/urls/g2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_json(response).await["error"].as_str().unwrap().contains("g2"));
    }

    #[tokio::test]
    async fn test_unknown_type_is_bad_request() {
        let app = app_router(test_state().await);
        let response = app
            .oneshot(get("/graph/serialisedFields/Unicorn"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["error"].as_str().unwrap().contains("Unicorn"));
    }

    #[tokio::test]
    async fn test_refresh_returns_statuses() {
        let state = test_state().await;
        let admin = Caller::new("admin").with_auth(ADMIN);
        state
            .service
            .add_endpoint(&admin, "g9", "host9:8080")
            .await
            .unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/graph/refresh")
            .body(Body::empty())
            .unwrap();
        let response = app_router(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json[0]["endpoint"]["name"], "g9");
        assert_eq!(json[0]["reachable"], false);
    }

    #[test]
    fn test_caller_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_ID_HEADER, "alice".parse().unwrap());
        headers.insert(OP_AUTHS_HEADER, " A, ,B ".parse().unwrap());

        let caller = caller_from_headers(&headers);
        assert_eq!(caller.user_id, "alice");
        assert!(caller.has_auth("A"));
        assert!(caller.has_auth("B"));
        assert_eq!(caller.op_auths.len(), 2);

        let anonymous = caller_from_headers(&HeaderMap::new());
        assert!(anonymous.op_auths.is_empty());
    }
}
