use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

pub fn auth_login(base: &str) -> String {
    base_join(base, &format!("{}/auth/login", API_V1_PREFIX))
}

pub fn version(base: &str) -> String {
    base_join(base, &format!("{}/version", API_V1_PREFIX))
}

pub fn device_register(base: &str, device_id: &str) -> String {
    base_join(
        base,
        &format!("{}/devices/{}/register", API_V1_PREFIX, enc(device_id)),
    )
}

pub fn family_opportunities(base: &str, family_id: i32) -> String {
    base_join(
        base,
        &format!("{}/families/{}/opportunities", API_V1_PREFIX, family_id),
    )
}

pub fn checkins(base: &str) -> String {
    base_join(base, &format!("{}/checkins", API_V1_PREFIX))
}

pub fn attendance_present(base: &str, attendance_id: i32) -> String {
    base_join(
        base,
        &format!("{}/attendances/{}/present", API_V1_PREFIX, attendance_id),
    )
}

pub fn attendance_checkout(base: &str, attendance_id: i32) -> String {
    base_join(
        base,
        &format!("{}/attendances/{}/checkout", API_V1_PREFIX, attendance_id),
    )
}

pub fn pickup_verify(base: &str, child_id: i32) -> String {
    base_join(
        base,
        &format!("{}/people/{}/pickup/verify", API_V1_PREFIX, child_id),
    )
}

pub fn rsvps(base: &str) -> String {
    base_join(base, &format!("{}/rsvps", API_V1_PREFIX))
}

pub fn location_occupancy(base: &str, location_id: i32, schedule_id: i32) -> String {
    base_join(
        base,
        &format!(
            "{}/locations/{}/occupancy?schedule_id={}",
            API_V1_PREFIX, location_id, schedule_id
        ),
    )
}
