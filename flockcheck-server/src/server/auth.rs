use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use flockcheck_shared::auth::Role;
use flockcheck_shared::jwt::{self, JwtClaims};
use tracing::{error, warn};

use super::{AppConfig, AppError, AppState};
use crate::checkin::{Actor, LocationScope};

/// Days of inactivity before a volunteer/supervisor session expires.
const USER_SESSION_IDLE_DAYS: i64 = 1;
/// Days before a volunteer/supervisor must log in again.
const USER_TOKEN_TTL_DAYS: i64 = 7;
/// Days of inactivity before a kiosk session expires.
const KIOSK_SESSION_IDLE_DAYS: i64 = 14;
/// Days before a kiosk must be registered again.
const KIOSK_TOKEN_TTL_DAYS: i64 = 30;

const KIOSK_SUBJECT_PREFIX: &str = "kiosk:";

#[derive(Clone, Debug)]
pub struct AuthCtx {
    pub claims: JwtClaims,
}

impl AuthCtx {
    /// The caller as seen by the check-in engine. Kiosks carry the room
    /// scope of their device entry.
    pub fn actor(&self, config: &AppConfig) -> Actor {
        let scope = self
            .claims
            .device_id
            .as_deref()
            .and_then(|id| config.device(id))
            .map(|d| LocationScope::from_ids(&d.location_ids))
            .unwrap_or_default();
        Actor {
            username: self.claims.sub.clone(),
            role: self.claims.role,
            person_id: self.claims.person_id,
            device_id: self.claims.device_id.clone(),
            scope,
        }
    }
}

pub async fn require_bearer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, AppError> {
    let unauthorized = || Err(AppError::unauthorized());
    let Some(header_val) = req.headers().get(header::AUTHORIZATION) else {
        return unauthorized();
    };
    let header_str = header_val.to_str().map_err(|_| AppError::unauthorized())?;
    let Some(token) = header_str.strip_prefix("Bearer ") else {
        return unauthorized();
    };

    let claims = match jwt::decode_and_verify(token, state.config.jwt_secret.as_bytes()) {
        Ok(c) => c,
        Err(e) => {
            warn!(error=%e, "auth: jwt decode failed");
            return unauthorized();
        }
    };

    validate_claims(&state, &claims).map_err(|e| {
        warn!(error=?e, username=%claims.sub, "auth: validate_claims failed");
        AppError::unauthorized()
    })?;

    let jti = claims.jti.clone();
    let idle_days = if claims.role == Role::Kiosk {
        KIOSK_SESSION_IDLE_DAYS
    } else {
        USER_SESSION_IDLE_DAYS
    };
    let cutoff = Utc::now() - Duration::days(idle_days);
    match state
        .store
        .touch_session_with_cutoff(&jti, cutoff.naive_utc())
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            warn!(
                jti = %jti,
                username = %claims.sub,
                cutoff = %cutoff,
                idle_days,
                "auth: session missing or expired (last_used_at < cutoff)"
            );
            return unauthorized();
        }
        Err(e) => {
            error!(jti = %jti, error=%e, "auth: touch_session_with_cutoff failed");
            return Err(AppError::internal(e));
        }
    }
    req.extensions_mut().insert(AuthCtx { claims });
    Ok(next.run(req).await)
}

pub async fn issue_jwt_for_user(
    state: &AppState,
    username: &str,
    role: Role,
    person_id: Option<i32>,
) -> Result<String, AppError> {
    let exp = Utc::now() + Duration::days(USER_TOKEN_TTL_DAYS);
    let claims = JwtClaims {
        sub: username.to_string(),
        jti: uuid::Uuid::new_v4().to_string(),
        exp: exp.timestamp(),
        role,
        person_id,
        device_id: None,
    };
    sign_session(state, claims).await
}

/// Token for a configured kiosk; returns it with its expiry.
pub async fn issue_kiosk_token(
    state: &AppState,
    device_id: &str,
) -> Result<(String, DateTime<Utc>), AppError> {
    let exp = Utc::now() + Duration::days(KIOSK_TOKEN_TTL_DAYS);
    let claims = JwtClaims {
        sub: format!("{KIOSK_SUBJECT_PREFIX}{device_id}"),
        jti: uuid::Uuid::new_v4().to_string(),
        exp: exp.timestamp(),
        role: Role::Kiosk,
        person_id: None,
        device_id: Some(device_id.to_string()),
    };
    let token = sign_session(state, claims).await?;
    Ok((token, exp))
}

async fn sign_session(state: &AppState, claims: JwtClaims) -> Result<String, AppError> {
    validate_claims(state, &claims)?;

    let username = claims.sub.as_str();
    state
        .store
        .create_session(&claims.jti, username)
        .await
        .map_err(|e| {
            error!(username, error=%e, "login/register: create_session failed");
            AppError::internal(e)
        })?;
    jwt::encode(&claims, state.config.jwt_secret.as_bytes()).map_err(|e| {
        error!(username, error=%e, "login/register: jwt encode failed");
        AppError::internal(e)
    })
}

fn validate_claims(state: &AppState, claims: &JwtClaims) -> Result<(), AppError> {
    if claims.role == Role::Kiosk {
        let device_id = claims.device_id.as_deref().ok_or_else(|| {
            warn!(username = %claims.sub, "issue_jwt: kiosk token missing device_id");
            AppError::forbidden()
        })?;
        if claims.sub != format!("{KIOSK_SUBJECT_PREFIX}{device_id}") || claims.person_id.is_some() {
            warn!(username = %claims.sub, device_id, "issue_jwt: malformed kiosk claims");
            return Err(AppError::forbidden());
        }
        if state.config.device(device_id).is_none() {
            warn!(device_id, "issue_jwt: device not configured");
            return Err(AppError::forbidden());
        }
        return Ok(());
    }

    let user = state.config.user(&claims.sub).ok_or_else(|| {
        warn!(username = %claims.sub, "issue_jwt: unknown user");
        AppError::forbidden()
    })?;
    if user.role != claims.role {
        warn!(
            username = %claims.sub,
            requested_role = ?claims.role,
            actual_role = ?user.role,
            "issue_jwt: role mismatch"
        );
        return Err(AppError::forbidden());
    }
    if claims.device_id.is_some() {
        warn!(username = %claims.sub, "issue_jwt: user token must not include a device");
        return Err(AppError::forbidden());
    }
    if claims.person_id != user.person_id {
        warn!(
            username = %claims.sub,
            expected = ?user.person_id,
            requested = ?claims.person_id,
            "issue_jwt: person mismatch"
        );
        return Err(AppError::forbidden());
    }
    Ok(())
}
