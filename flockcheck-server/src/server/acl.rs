use super::{AppError, auth::AuthCtx};
use axum::response::Response;
use axum::{
    extract::OriginalUri,
    http::{Method, Request},
    middleware::Next,
};
use flockcheck_shared::auth::Role;

pub async fn enforce_acl(req: Request<axum::body::Body>, next: Next) -> Result<Response, AppError> {
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map(|orig| orig.0.path().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let method = req.method().clone();
    let Some(auth) = req.extensions().get::<AuthCtx>() else {
        return Err(AppError::unauthorized());
    };
    let claims = &auth.claims;

    let segs = segmented(&path);
    let Some(rest) = segs.strip_prefix(&["api", "v1"][..]) else {
        tracing::warn!(?segs, "ACL: path outside api scope");
        return Err(AppError::forbidden());
    };

    let allowed = match claims.role {
        Role::Admin => allow_admin(&method, rest),
        Role::Supervisor | Role::Volunteer => allow_staff(&method, rest),
        Role::Kiosk => allow_kiosk(&method, rest),
    };

    if !allowed {
        tracing::warn!(
            method = %method,
            path = %path,
            username = %claims.sub,
            role = ?claims.role,
            token_device = ?claims.device_id,
            "ACL: no rule matched; denying"
        );
        return Err(AppError::forbidden());
    }

    Ok(next.run(req).await)
}

fn allow_admin(method: &Method, rest: &[&str]) -> bool {
    match rest {
        ["devices", device, "register"] => *method == Method::POST && !device.is_empty(),
        _ => allow_staff(method, rest),
    }
}

/// Volunteers and supervisors. Who may force an override is decided by the
/// pickup verifier, not here.
fn allow_staff(method: &Method, rest: &[&str]) -> bool {
    match rest {
        ["attendances", id, "present"] => *method == Method::POST && is_id(id),
        _ => allow_kiosk(method, rest),
    }
}

fn allow_kiosk(method: &Method, rest: &[&str]) -> bool {
    match rest {
        ["families", id, "opportunities"] => *method == Method::GET && is_id(id),
        ["checkins"] | ["rsvps"] => *method == Method::POST,
        ["people", id, "pickup", "verify"] => *method == Method::POST && is_id(id),
        ["attendances", id, "checkout"] => *method == Method::POST && is_id(id),
        ["locations", id, "occupancy"] => *method == Method::GET && is_id(id),
        _ => false,
    }
}

fn segmented(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn is_id(seg: &str) -> bool {
    seg.parse::<i32>().is_ok()
}
