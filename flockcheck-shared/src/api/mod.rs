use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AttendanceState, CapacityStatus, FailureCode, Rsvp};

pub mod endpoints;
#[cfg(feature = "rest-client")]
pub mod rest;

pub const API_V1_PREFIX: &str = "/api/v1";

// Auth
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthReq {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResp {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionDto {
    pub version: String,
}

// Kiosk registration
#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceRegisterResp {
    pub token: String,
    pub device_id: String,
    pub expires_at: DateTime<Utc>,
}

// Opportunities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyOpportunitiesDto {
    pub family_id: i32,
    pub members: Vec<MemberOpportunitiesDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberOpportunitiesDto {
    pub person_id: i32,
    pub display_name: String,
    pub current_attendance: Vec<AttendanceDto>,
    pub available_options: Vec<CheckinOptionDto>,
    /// Groups (or group schedules) the member cannot use right now, with the reason.
    pub exclusions: Vec<ExclusionDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceDto {
    pub id: i32,
    pub person_id: i32,
    pub group_id: i32,
    pub location_id: i32,
    pub schedule_id: i32,
    pub occurrence_date: NaiveDate,
    pub state: AttendanceState,
    pub security_code: Option<String>,
    pub start_date_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinOptionDto {
    pub group_id: i32,
    pub group_name: String,
    pub location_id: i32,
    pub location_name: String,
    pub schedule_id: i32,
    pub schedule_name: String,
    pub occurrence_date: NaiveDate,
    pub capacity_status: CapacityStatus,
    pub headcount: i64,
    /// Where a commit would land right now when the room is full and overflow applies.
    pub routed_location_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExclusionDto {
    pub group_id: i32,
    pub schedule_id: Option<i32>,
    pub reason: String,
}

// Commit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckinSelectionDto {
    pub person_id: i32,
    pub group_id: i32,
    pub location_id: i32,
    pub schedule_id: i32,
    #[serde(default)]
    pub rsvp: Option<Rsvp>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommitCheckinsReq {
    pub selections: Vec<CheckinSelectionDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckinResultDto {
    pub selection: CheckinSelectionDto,
    pub success: bool,
    pub attendance_id: Option<i32>,
    pub security_code: Option<String>,
    /// Room actually assigned; differs from the selection after overflow routing.
    pub location_id: Option<i32>,
    pub failure_code: Option<FailureCode>,
    pub failure_reason: Option<String>,
}

// Presence
#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceResp {
    pub attendance_id: i32,
    pub state: AttendanceState,
    pub present_at: DateTime<Utc>,
}

// Pickup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresentingPersonDto {
    pub person_id: Option<i32>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PickupReq {
    pub presenting: PresentingPersonDto,
    #[serde(default)]
    pub security_code: Option<String>,
    #[serde(default, rename = "override")]
    pub force_override: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickupVerdictKind {
    Authorized,
    Unauthorized,
    Override,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyPickupResp {
    pub verdict: PickupVerdictKind,
    pub reason: Option<String>,
    pub relationship: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CheckoutResp {
    pub success: bool,
    pub attendance_id: i32,
    pub verdict: PickupVerdictKind,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

// RSVP
#[derive(Debug, Serialize, Deserialize)]
pub struct RsvpReq {
    pub person_id: i32,
    pub group_id: i32,
    pub location_id: i32,
    pub schedule_id: i32,
    pub occurrence_date: NaiveDate,
    pub response: Rsvp,
    #[serde(default)]
    pub decline_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RsvpResp {
    pub attendance_id: i32,
    pub state: AttendanceState,
}

// Occupancy
#[derive(Debug, Serialize, Deserialize)]
pub struct OccupancyDto {
    pub location_id: i32,
    pub schedule_id: i32,
    pub occurrence_date: NaiveDate,
    pub headcount: i64,
    pub status: CapacityStatus,
    pub soft_room_threshold: Option<i32>,
    pub firm_room_threshold: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDto {
    pub error: String,
    pub code: Option<FailureCode>,
}
