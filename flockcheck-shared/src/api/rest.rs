//! Minimal REST client helpers for kiosk and supervisor consoles.

use super::endpoints as ep;
use super::*;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error("http: {0}")]
    Http(String),
    #[error("status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("serde: {0}")]
    Serde(String),
}

impl RestError {
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(90))
        // Kiosk calls are short request/response cycles
        .timeout(Duration::from_secs(30))
        .build()
        .expect("failed to build HTTP client")
});

async fn handle_json<T: DeserializeOwned>(res: reqwest::Response) -> Result<T, RestError> {
    let status = res.status();
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        return Err(RestError::Status {
            status: status.as_u16(),
            body,
        });
    }
    res.json::<T>()
        .await
        .map_err(|e| RestError::Serde(e.to_string()))
}

async fn get_json<T: DeserializeOwned>(url: String, bearer: Option<&str>) -> Result<T, RestError> {
    let mut req = HTTP_CLIENT.get(url);
    if let Some(b) = bearer {
        req = req.bearer_auth(b);
    }
    let res = req
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    url: String,
    bearer: Option<&str>,
    body: Option<&B>,
) -> Result<T, RestError> {
    let mut req = HTTP_CLIENT.post(url);
    if let Some(b) = bearer {
        req = req.bearer_auth(b);
    }
    if let Some(body) = body {
        req = req.json(body);
    }
    let res = req
        .send()
        .await
        .map_err(|e| RestError::Http(e.to_string()))?;
    handle_json(res).await
}

pub async fn login(base: &str, req: &AuthReq) -> Result<AuthResp, RestError> {
    post_json(ep::auth_login(base), None, Some(req)).await
}

pub async fn server_version(base: &str) -> Result<VersionDto, RestError> {
    get_json(ep::version(base), None).await
}

pub async fn register_device(
    base: &str,
    device_id: &str,
    bearer: &str,
) -> Result<DeviceRegisterResp, RestError> {
    post_json::<(), _>(ep::device_register(base, device_id), Some(bearer), None).await
}

pub async fn family_opportunities(
    base: &str,
    family_id: i32,
    bearer: &str,
) -> Result<FamilyOpportunitiesDto, RestError> {
    get_json(ep::family_opportunities(base, family_id), Some(bearer)).await
}

pub async fn commit_checkins(
    base: &str,
    bearer: &str,
    selections: Vec<CheckinSelectionDto>,
) -> Result<Vec<CheckinResultDto>, RestError> {
    let body = CommitCheckinsReq { selections };
    post_json(ep::checkins(base), Some(bearer), Some(&body)).await
}

pub async fn confirm_presence(
    base: &str,
    attendance_id: i32,
    bearer: &str,
) -> Result<PresenceResp, RestError> {
    post_json::<(), _>(ep::attendance_present(base, attendance_id), Some(bearer), None).await
}

pub async fn verify_pickup(
    base: &str,
    child_id: i32,
    bearer: &str,
    req: &PickupReq,
) -> Result<VerifyPickupResp, RestError> {
    post_json(ep::pickup_verify(base, child_id), Some(bearer), Some(req)).await
}

pub async fn checkout(
    base: &str,
    attendance_id: i32,
    bearer: &str,
    req: &PickupReq,
) -> Result<CheckoutResp, RestError> {
    post_json(ep::attendance_checkout(base, attendance_id), Some(bearer), Some(req)).await
}

pub async fn record_rsvp(base: &str, bearer: &str, req: &RsvpReq) -> Result<RsvpResp, RestError> {
    post_json(ep::rsvps(base), Some(bearer), Some(req)).await
}

pub async fn location_occupancy(
    base: &str,
    location_id: i32,
    schedule_id: i32,
    bearer: &str,
) -> Result<OccupancyDto, RestError> {
    get_json(ep::location_occupancy(base, location_id, schedule_id), Some(bearer)).await
}
