//! HTTP 接口（axum）
//!
//! 调用者身份由上游网关写入 `x-user-id` 请求头。错误统一返回
//! `{"error": "...", "requiresAction": "view_research"?, "retryable": bool}`。

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::SqlitePool;

use crate::cache::QueryCache;
use crate::config::HandoffSection;
use crate::core::{CacheError, Clock, FetchError, HandoffError, TripError};
use crate::handoff::{ChatEntry, HandoffDocument, HandoffLifecycle, HandoffStore};
use crate::llm::LlmClient;
use crate::planner::{ItineraryPlanner, TripEnricher};
use crate::providers::{FallbackOrchestrator, FlightCriteria, FlightQuote, HotelCriteria, HotelQuote, Lookup, ProviderSet};
use crate::resolver::{CityResolver, ResolvedCity};
use crate::trips::{Trip, TripIntake, TripLifecycle, TripOption, TripStatus, TripStore};

pub const USER_HEADER: &str = "x-user-id";

pub struct AppState {
    pub trips: TripLifecycle,
    pub handoffs: HandoffLifecycle,
    /// 没有配置 LLM 时为 None，研究与生成方案接口返回 503
    pub planner: Option<ItineraryPlanner>,
    pub enricher: TripEnricher,
    pub resolver: Arc<CityResolver>,
    pub providers: Arc<FallbackOrchestrator>,
    pub cache: QueryCache,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        cache: QueryCache,
        providers: ProviderSet,
        llm: Option<Arc<dyn LlmClient>>,
        clock: Arc<dyn Clock>,
        handoff_cfg: &HandoffSection,
    ) -> Self {
        let orchestrator = Arc::new(providers.orchestrator);
        let resolver = Arc::new(CityResolver::new(cache.clone(), providers.directory, orchestrator.clone()));
        Self {
            trips: TripLifecycle::with_clock(TripStore::new(pool.clone()), clock.clone()),
            handoffs: HandoffLifecycle::with_clock(HandoffStore::new(pool), clock, handoff_cfg),
            planner: llm.map(ItineraryPlanner::new),
            enricher: TripEnricher::new(resolver.clone(), orchestrator.clone()),
            resolver,
            providers: orchestrator,
            cache,
        }
    }

    fn planner(&self) -> Result<&ItineraryPlanner, ApiError> {
        self.planner.as_ref().ok_or_else(|| ApiError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "planner is not configured".to_string(),
            requires_action: None,
            retryable: false,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/trips", post(create_trip).get(list_trips))
        .route("/api/trips/:id", get(get_trip))
        .route("/api/trips/:id/research", post(run_research))
        .route("/api/trips/:id/research/viewed", post(research_viewed))
        .route("/api/trips/:id/options", post(generate_options))
        .route("/api/trips/:id/select", post(select_option))
        .route("/api/trips/:id/handoff", post(create_handoff))
        .route("/api/handoffs", get(list_pending_handoffs))
        .route("/api/handoffs/:id", get(get_handoff))
        .route("/api/handoffs/:id/quote", post(submit_quote))
        .route("/api/handoffs/:id/book", post(book_handoff))
        .route("/api/handoffs/:id/cancel", post(cancel_handoff))
        .route("/api/admin/handoffs/cleanup", post(cleanup_handoffs))
        .route("/api/admin/cache/sweep", post(sweep_cache))
        .route("/api/flights", get(search_flights))
        .route("/api/hotels", get(search_hotels))
        .route("/api/cities/resolve", get(resolve_city))
        .with_state(state)
}

// ---------- 错误 ----------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    requires_action: Option<&'static str>,
    retryable: bool,
}

impl ApiError {
    fn new(code: u16, message: String) -> Self {
        Self {
            status: StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message,
            requires_action: None,
            retryable: false,
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message.into())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    requires_action: Option<&'a str>,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        }
        let body = ErrorBody {
            error: &self.message,
            requires_action: self.requires_action,
            retryable: self.retryable,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<TripError> for ApiError {
    fn from(e: TripError) -> Self {
        let mut err = Self::new(e.status_code(), e.to_string());
        err.requires_action = e.requires_action();
        err.retryable = matches!(e, TripError::Planner(_));
        err
    }
}

impl From<HandoffError> for ApiError {
    fn from(e: HandoffError) -> Self {
        Self::new(e.status_code(), e.to_string())
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        let mut err = Self::new(e.status_code(), e.to_string());
        err.retryable = e.is_retryable();
        err
    }
}

impl From<CacheError> for ApiError {
    fn from(e: CacheError) -> Self {
        Self::new(500, e.to_string())
    }
}

// ---------- 身份 ----------

/// 来自 `x-user-id` 的调用者身份
pub struct UserId(pub String);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or_else(|| ApiError::new(401, format!("missing {} header", USER_HEADER)))
    }
}

// ---------- 行程 ----------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTripRequest {
    intake: TripIntake,
    #[serde(default)]
    template_id: Option<String>,
}

async fn create_trip(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    Json(req): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<Trip>), ApiError> {
    let trip = state.trips.create(&user, req.intake, req.template_id).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

async fn list_trips(State(state): State<Arc<AppState>>, UserId(user): UserId) -> Result<Json<Vec<Trip>>, ApiError> {
    Ok(Json(state.trips.list_for_user(&user).await?))
}

async fn get_trip(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Trip>, ApiError> {
    Ok(Json(state.trips.get(&id, &user).await?))
}

async fn run_research(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Trip>, ApiError> {
    let planner = state.planner()?;
    Ok(Json(planner.run_research(&state.trips, &id, &user).await?))
}

async fn research_viewed(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Trip>, ApiError> {
    Ok(Json(state.trips.mark_research_viewed(&id, &user).await?))
}

async fn generate_options(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    Path(id): Path<String>,
) -> Result<Json<Trip>, ApiError> {
    let planner = state.planner()?;
    Ok(Json(planner.generate_options(&state.trips, &id, &user).await?))
}

#[derive(Deserialize)]
struct SelectRequest {
    index: usize,
}

async fn select_option(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    Path(id): Path<String>,
    Json(req): Json<SelectRequest>,
) -> Result<Json<Trip>, ApiError> {
    Ok(Json(state.trips.select_option(&id, &user, req.index).await?))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct HandoffRequest {
    #[serde(default)]
    chat_history: Vec<ChatEntry>,
}

/// 补全选中方案并生成交接文档；重复调用返回同一份文档
async fn create_handoff(
    State(state): State<Arc<AppState>>,
    UserId(user): UserId,
    Path(id): Path<String>,
    body: Option<Json<HandoffRequest>>,
) -> Result<Json<HandoffDocument>, ApiError> {
    let trip = state.trips.get(&id, &user).await?;
    if trip.status == TripStatus::AbReady {
        if let Some(existing) = state.handoffs.get_by_trip(&trip.id).await? {
            return Ok(Json(existing));
        }
    }
    if trip.status != TripStatus::OptionSelected {
        return Err(TripError::InvalidTransition {
            from: trip.status.to_string(),
            to: TripStatus::AbReady.to_string(),
        }
        .into());
    }

    let option = selected_option(&trip)?;
    let chat_history = body.map(|Json(b)| b.chat_history).unwrap_or_default();
    let enrichment = state.enricher.enrich(&trip.intake, &option).await;
    let draft = TripEnricher::assemble_handoff(&trip, &enrichment, chat_history);
    let doc = state.handoffs.create(draft).await?;

    let itinerary = serde_json::to_value(&enrichment).map_err(TripError::from)?;
    state.trips.mark_handoff_ready(&trip.id, &user, itinerary).await?;
    Ok(Json(doc))
}

fn selected_option(trip: &Trip) -> Result<TripOption, TripError> {
    let value = trip
        .itinerary
        .clone()
        .ok_or_else(|| TripError::InvalidOption("no option selected".to_string()))?;
    Ok(serde_json::from_value(value)?)
}

// ---------- 交接（顾问端，不按用户过滤） ----------

async fn list_pending_handoffs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<HandoffDocument>>, ApiError> {
    Ok(Json(state.handoffs.list_pending().await?))
}

async fn get_handoff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HandoffDocument>, ApiError> {
    Ok(Json(state.handoffs.get(&id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest {
    quote_usd: f64,
}

async fn submit_quote(
    State(state): State<Arc<AppState>>,
    UserId(agent): UserId,
    Path(id): Path<String>,
    Json(req): Json<QuoteRequest>,
) -> Result<Json<HandoffDocument>, ApiError> {
    Ok(Json(state.handoffs.submit_quote(&id, &agent, req.quote_usd).await?))
}

async fn book_handoff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HandoffDocument>, ApiError> {
    Ok(Json(state.handoffs.mark_booked(&id).await?))
}

async fn cancel_handoff(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<HandoffDocument>, ApiError> {
    Ok(Json(state.handoffs.cancel(&id).await?))
}

async fn cleanup_handoffs(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let cancelled = state.handoffs.cleanup_expired().await?;
    Ok(Json(json!({ "cancelled": cancelled })))
}

async fn sweep_cache(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let removed = state.cache.sweep_expired().await?;
    Ok(Json(json!({ "removed": removed })))
}

// ---------- 数据查询 ----------

#[derive(Deserialize)]
struct FlightQuery {
    origin: String,
    destination: String,
    month: String,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    adults: Option<u32>,
}

async fn search_flights(
    State(state): State<Arc<AppState>>,
    Query(q): Query<FlightQuery>,
) -> Result<Json<Lookup<FlightQuote>>, ApiError> {
    let mut criteria = FlightCriteria::new(q.origin, q.destination, q.month).with_adults(q.adults.unwrap_or(1));
    if let Some(date) = q.date {
        criteria = criteria.with_date(date);
    }
    criteria.validate().map_err(ApiError::bad_request)?;
    Ok(Json(state.providers.search_flights(&criteria).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotelQuery {
    city_code: String,
    check_in: String,
    nights: u32,
    #[serde(default)]
    city_name: Option<String>,
    #[serde(default)]
    adults: Option<u32>,
}

async fn search_hotels(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HotelQuery>,
) -> Result<Json<Lookup<HotelQuote>>, ApiError> {
    let mut criteria = HotelCriteria::new(q.city_code, q.check_in, q.nights).with_adults(q.adults.unwrap_or(1));
    if let Some(name) = q.city_name {
        criteria = criteria.with_city_name(name);
    }
    criteria.validate().map_err(ApiError::bad_request)?;
    Ok(Json(state.providers.search_hotels(&criteria).await?))
}

#[derive(Deserialize)]
struct ResolveQuery {
    city: String,
    #[serde(default)]
    country: Option<String>,
}

async fn resolve_city(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ResolveQuery>,
) -> Result<Json<ResolvedCity>, ApiError> {
    if q.city.trim().is_empty() {
        return Err(ApiError::bad_request("city is required"));
    }
    Ok(Json(state.resolver.resolve(&q.city, q.country.as_deref()).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::TtlPolicy;
    use crate::core::ManualClock;
    use crate::llm::ScriptedLlmClient;
    use crate::providers::mock::{sample_flight_quote, FailingProvider, StaticFlightProvider};
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const OPTIONS_REPLY: &str = r#"[{"title": "Classic London", "summary": "",
        "cities": [{"name": "London", "country": "GB", "nights": 4}], "estimate_usd": 2500}]"#;

    async fn app(orchestrator: FallbackOrchestrator) -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let pool = crate::db::connect(dir.path().join("api.db")).await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_epoch(1_780_000_000));
        let cache = QueryCache::with_clock(pool.clone(), clock.clone(), TtlPolicy::default());
        let llm: Arc<dyn LlmClient> = Arc::new(ScriptedLlmClient::new(["London in June is busy.", OPTIONS_REPLY]));
        let providers = ProviderSet {
            orchestrator,
            directory: None,
        };
        let state = AppState::new(pool, cache, providers, Some(llm), clock, &HandoffSection::default());
        (dir, router(Arc::new(state)))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(USER_HEADER, "u1")
            .header("content-type", "application/json");
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (_dir, app) = app(FallbackOrchestrator::default()).await;
        let req = Request::builder().uri("/api/trips").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_research_gate_requires_action() {
        let (_dir, app) = app(FallbackOrchestrator::default()).await;
        let (status, trip) = send(
            &app,
            "POST",
            "/api/trips",
            Some(json!({"intake": {"from": "JFK", "to": "LHR", "month": "2026-06"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = trip["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, "POST", &format!("/api/trips/{}/research", id), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, "POST", &format!("/api/trips/{}/options", id), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["requiresAction"], "view_research");
        assert_eq!(body["retryable"], false);

        send(&app, "POST", &format!("/api/trips/{}/research/viewed", id), None).await;
        let (status, body) = send(&app, "POST", &format!("/api/trips/{}/options", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "options_ready");
    }

    #[tokio::test]
    async fn test_flight_errors_map_to_status() {
        let orch = FallbackOrchestrator::default()
            .with_flight_provider(Arc::new(FailingProvider::new("amadeus_flights", "HTTP 500")));
        let (_dir, app) = app(orch).await;

        let (status, _) = send(&app, "GET", "/api/flights?origin=JFK&destination=LHR&month=June", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "GET", "/api/flights?origin=JFK&destination=LHR&month=2026-06", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["retryable"], true);
    }

    #[tokio::test]
    async fn test_flight_lookup_ok() {
        let orch = FallbackOrchestrator::default().with_flight_provider(Arc::new(StaticFlightProvider::returning(
            "amadeus_flights",
            sample_flight_quote("JFK", "LHR", "2026-06"),
        )));
        let (_dir, app) = app(orch).await;
        let (status, body) = send(&app, "GET", "/api/flights?origin=JFK&destination=LHR&month=2026-06", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provider"], "amadeus_flights");
        assert_eq!(body["price_low"], 420.0);
    }
}
