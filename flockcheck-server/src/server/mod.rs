mod acl;
pub mod auth;
mod config;

use crate::checkin::pickup::{PickupVerdict, PresentingPerson};
use crate::checkin::{CheckinError, CheckinService};
use crate::server::auth::AuthCtx;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::response::Response as AxumResponse;
use axum::{
    Json, Router,
    extract::{Extension, Path, Query, State},
    http::{Method, StatusCode, header},
    routing::{get, post},
};
use bcrypt::verify;
use chrono::Utc;
pub use config::{
    AppConfig, AuthorizedPickupRecord, CheckinConfig, ConfigError, DeviceConfig, DirectoryConfig,
    FamilyRecord, GroupRecord, LocationRecord, PersonRecord, Role, ScheduleRecord, UserConfig,
};
use flockcheck_shared::api;
use flockcheck_shared::domain::FailureCode;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Span, info_span};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: crate::storage::Store,
    pub checkin: CheckinService,
    shutdown: CancellationToken,
    audit_worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl AppState {
    /// Builds the engine and starts the audit writer; call from within a
    /// tokio runtime.
    pub fn new(config: AppConfig, store: crate::storage::Store) -> Self {
        let (audit, worker) = crate::audit::AuditTrail::spawn(store.clone());
        let checkin = CheckinService::new(
            store.clone(),
            config.checkin.code_config(),
            config.tz(),
            audit,
        );
        Self {
            config,
            store,
            checkin,
            shutdown: CancellationToken::new(),
            audit_worker: Arc::new(Mutex::new(Some(worker))),
        }
    }

    /// Hands out the audit writer's handle once. The writer finishes after
    /// every `AppState` clone is dropped and the queue is flushed.
    pub fn take_audit_worker(&self) -> Option<JoinHandle<()>> {
        self.audit_worker.lock().ok().and_then(|mut slot| slot.take())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[derive(Clone, Debug)]
struct ReqId(pub String);

pub fn router(state: AppState) -> Router {
    let private = Router::new()
        .route("/api/v1/devices/{device_id}/register", post(api_device_register))
        .route(
            "/api/v1/families/{family_id}/opportunities",
            get(api_family_opportunities),
        )
        .route("/api/v1/checkins", post(api_commit_checkins))
        .route("/api/v1/attendances/{id}/present", post(api_confirm_presence))
        .route("/api/v1/attendances/{id}/checkout", post(api_checkout))
        .route("/api/v1/people/{child_id}/pickup/verify", post(api_verify_pickup))
        .route("/api/v1/rsvps", post(api_record_rsvp))
        .route("/api/v1/locations/{id}/occupancy", get(api_location_occupancy))
        .with_state(state.clone())
        // Outermost runs first: bearer check, then span fields, then ACL
        .layer(middleware::from_fn(acl::enforce_acl))
        .layer(middleware::from_fn(set_auth_span_fields))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    // Trace with request context (method, path, request_id)
    let trace = TraceLayer::new_for_http().make_span_with(|req: &axum::http::Request<_>| {
        let request_id = req
            .extensions()
            .get::<ReqId>()
            .map(|r| r.0.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info_span!(
            "request",
            method = %req.method(),
            path = %req.uri().path(),
            request_id = %request_id,
            username = tracing::field::Empty,
            role = tracing::field::Empty,
            device_id = tracing::field::Empty
        )
    });

    let app = Router::new()
        .route("/healthz", get(health))
        .route("/api/v1/version", get(api_version))
        .route("/api/v1/auth/login", post(api_auth_login))
        .merge(private)
        .with_state(state.clone())
        .layer(trace)
        .layer(middleware::from_fn(add_security_headers))
        .layer(middleware::from_fn(add_request_id));

    if let Some(origin) = &state.config.dev_cors_origin {
        let hv = header::HeaderValue::from_str(origin)
            .unwrap_or(header::HeaderValue::from_static("http://localhost:5173"));
        let cors = CorsLayer::new()
            .allow_origin(hv)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);
        app.layer(cors)
    } else {
        app
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn api_version() -> Json<api::VersionDto> {
    Json(api::VersionDto {
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn add_request_id(
    mut req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let hdr = HeaderName::from_static("x-request-id");
    let rid = req
        .headers()
        .get(&hdr)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    req.extensions_mut().insert(ReqId(rid.clone()));
    let mut resp = next.run(req).await;
    if let Ok(hv) = HeaderValue::from_str(&rid) {
        resp.headers_mut().insert(hdr, hv);
    }
    Ok(resp)
}

async fn add_security_headers(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    let mut resp = next.run(req).await;

    let headers = resp.headers_mut();
    headers.insert(
        HeaderName::from_static("x-content-type-options"),
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    headers.insert(
        HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("no-referrer"),
    );
    // Check-in state changes by the second; nothing here may be cached
    headers.insert(
        HeaderName::from_static("cache-control"),
        HeaderValue::from_static("no-store"),
    );
    Ok(resp)
}

async fn set_auth_span_fields(
    req: axum::http::Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Result<AxumResponse, AppError> {
    if let Some(auth) = req.extensions().get::<AuthCtx>() {
        let span = Span::current();
        span.record("username", tracing::field::display(&auth.claims.sub));
        span.record("role", tracing::field::debug(&auth.claims.role));
        if let Some(did) = &auth.claims.device_id {
            span.record("device_id", tracing::field::display(did));
        }
    }
    Ok(next.run(req).await)
}

async fn api_auth_login(
    State(state): State<AppState>,
    Json(body): Json<api::AuthReq>,
) -> Result<Json<api::AuthResp>, AppError> {
    let user = state.config.user(&body.username).ok_or_else(|| {
        tracing::warn!(username=%body.username, "login: unknown username");
        AppError::unauthorized()
    })?;
    if !verify(&body.password, &user.password_hash).map_err(|e| {
        tracing::error!(username=%body.username, error=%e, "login: bcrypt verify failed");
        AppError::internal(e)
    })? {
        tracing::warn!(username=%body.username, "login: invalid password");
        return Err(AppError::unauthorized());
    }
    if user.role == Role::Kiosk {
        tracing::warn!(username=%body.username, "login: kiosk credentials come from device registration");
        return Err(AppError::unauthorized());
    }
    let token = auth::issue_jwt_for_user(&state, &user.username, user.role, user.person_id).await?;
    Ok(Json(api::AuthResp { token }))
}

async fn api_device_register(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(device_id): Path<String>,
) -> Result<Json<api::DeviceRegisterResp>, AppError> {
    if state.config.device(&device_id).is_none() {
        return Err(AppError::not_found(format!("device not found: {device_id}")));
    }
    let (token, expires_at) = auth::issue_kiosk_token(&state, &device_id).await?;
    tracing::info!(device_id = %device_id, by = %auth.claims.sub, "device: kiosk token issued");
    Ok(Json(api::DeviceRegisterResp {
        token,
        device_id,
        expires_at,
    }))
}

async fn api_family_opportunities(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(family_id): Path<i32>,
) -> Result<Json<api::FamilyOpportunitiesDto>, AppError> {
    let actor = auth.actor(&state.config);
    let dto = state
        .checkin
        .resolve_opportunities(family_id, &actor, Utc::now())
        .await?;
    Ok(Json(dto))
}

async fn api_commit_checkins(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::CommitCheckinsReq>,
) -> Result<Json<Vec<api::CheckinResultDto>>, AppError> {
    if body.selections.is_empty() {
        return Err(AppError::bad_request("selections must not be empty"));
    }
    let actor = auth.actor(&state.config);
    let results = state
        .checkin
        .commit_checkins(body.selections, &actor, Utc::now())
        .await;
    Ok(Json(results))
}

async fn api_confirm_presence(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
) -> Result<Json<api::PresenceResp>, AppError> {
    let actor = auth.actor(&state.config);
    let resp = state.checkin.confirm_presence(id, &actor, Utc::now()).await?;
    Ok(Json(resp))
}

fn presenting(dto: api::PresentingPersonDto) -> Result<PresentingPerson, AppError> {
    let name = dto.name.filter(|n| !n.trim().is_empty());
    if dto.person_id.is_none() && name.is_none() {
        return Err(AppError::bad_request("presenting person needs person_id or name"));
    }
    Ok(PresentingPerson {
        person_id: dto.person_id,
        name,
    })
}

async fn api_verify_pickup(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(child_id): Path<i32>,
    Json(body): Json<api::PickupReq>,
) -> Result<Json<api::VerifyPickupResp>, AppError> {
    let actor = auth.actor(&state.config);
    let verdict = state
        .checkin
        .verify_pickup(
            child_id,
            presenting(body.presenting)?,
            body.security_code,
            body.force_override,
            &actor,
            Utc::now(),
        )
        .await?;
    let relationship = match &verdict {
        PickupVerdict::Authorized(grant) => Some(grant.relationship().to_string()),
        _ => None,
    };
    Ok(Json(api::VerifyPickupResp {
        verdict: verdict.kind(),
        reason: verdict.reason().map(str::to_string),
        relationship,
    }))
}

/// Verification runs here again; the caller's earlier verdict is not trusted.
async fn api_checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Json(body): Json<api::PickupReq>,
) -> Result<Json<api::CheckoutResp>, AppError> {
    let actor = auth.actor(&state.config);
    let now = Utc::now();
    let child_id = state
        .store
        .with_conn(move |conn| -> Result<i32, CheckinError> {
            crate::storage::queries::attendance(conn, id)?
                .map(|a| a.person_id)
                .ok_or_else(|| CheckinError::NotFound(format!("attendance {id}")))
        })
        .await?;
    let verdict = state
        .checkin
        .verify_pickup(
            child_id,
            presenting(body.presenting)?,
            body.security_code,
            body.force_override,
            &actor,
            now,
        )
        .await?;
    let resp = state.checkin.checkout(id, verdict, &actor, now).await?;
    Ok(Json(resp))
}

async fn api_record_rsvp(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<api::RsvpReq>,
) -> Result<Json<api::RsvpResp>, AppError> {
    let actor = auth.actor(&state.config);
    let resp = state.checkin.record_rsvp(body, &actor, Utc::now()).await?;
    Ok(Json(resp))
}

#[derive(Deserialize)]
struct OccupancyQuery {
    schedule_id: i32,
}

async fn api_location_occupancy(
    State(state): State<AppState>,
    Extension(_auth): Extension<AuthCtx>,
    Path(id): Path<i32>,
    Query(q): Query<OccupancyQuery>,
) -> Result<Json<api::OccupancyDto>, AppError> {
    let dto = state
        .checkin
        .occupancy(id, q.schedule_id, Utc::now())
        .await?;
    Ok(Json(dto))
}

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound(String),
    Checkin(CheckinError),
    Internal(String),
}

impl AppError {
    fn bad_request<T: Into<String>>(msg: T) -> Self {
        Self::BadRequest(msg.into())
    }
    fn unauthorized() -> Self {
        Self::Unauthorized
    }
    fn forbidden() -> Self {
        Self::Forbidden
    }
    fn not_found<T: Into<String>>(msg: T) -> Self {
        Self::NotFound(msg.into())
    }
    fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<CheckinError> for AppError {
    fn from(e: CheckinError) -> Self {
        AppError::Checkin(e)
    }
}

fn checkin_status(code: FailureCode) -> StatusCode {
    match code {
        FailureCode::NotFound => StatusCode::NOT_FOUND,
        FailureCode::PickupUnauthorized
        | FailureCode::OverrideForbidden
        | FailureCode::LocationNotServed => StatusCode::FORBIDDEN,
        FailureCode::IneligibleForGroup
        | FailureCode::ScheduleWindowClosed
        | FailureCode::InvalidSelection => StatusCode::UNPROCESSABLE_ENTITY,
        FailureCode::LocationFull
        | FailureCode::OverflowCycleDetected
        | FailureCode::DuplicateCheckin
        | FailureCode::CodeSpaceExhausted
        | FailureCode::OccurrenceConflict
        | FailureCode::InvalidTransition => StatusCode::CONFLICT,
        FailureCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, msg, code, detail) = match self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m, None, None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".into(), None, None),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into(), None, None),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m, Some(FailureCode::NotFound), None),
            AppError::Checkin(e) => {
                let code = e.failure_code();
                let detail = (code == FailureCode::Internal).then(|| e.to_string());
                (checkin_status(code), e.public_message(), Some(code), detail)
            }
            // Do not leak internal error details to clients, but log them
            AppError::Internal(m) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".into(),
                Some(FailureCode::Internal),
                Some(m),
            ),
        };
        if let Some(detail) = detail {
            tracing::error!(status = %status, code = ?code, message = %msg, detail = %detail, "request failed");
        } else if status.is_server_error() {
            tracing::error!(status = %status, code = ?code, message = %msg, "request failed");
        } else {
            tracing::info!(status = %status, code = ?code, message = %msg, "request rejected");
        }
        let body = axum::Json(api::ErrorDto { error: msg, code });
        (status, body).into_response()
    }
}
