//! Check-in admission, room capacity and pickup authorization.

pub mod attendance;
pub mod capacity;
pub mod codes;
pub mod eligibility;
pub mod pickup;
pub mod schedule;
mod service;

pub use service::{CheckinService, Committed};

use flockcheck_shared::auth::Role;
use flockcheck_shared::domain::{AttendanceState, EligibilityReason, FailureCode, UnknownVariant};

use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum CheckinError {
    #[error("person is not eligible for this group: {0}")]
    IneligibleForGroup(EligibilityReason),
    #[error("check-in window is closed")]
    ScheduleWindowClosed,
    #[error("location {location_id} is full")]
    LocationFull { location_id: i32 },
    #[error("overflow routing loops back to location {location_id}")]
    OverflowCycleDetected { location_id: i32 },
    #[error("person is already checked in to this group")]
    DuplicateCheckin,
    #[error("no free security code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },
    #[error("pickup not authorized: {0}")]
    PickupUnauthorized(String),
    #[error("pickup override requires a supervisor")]
    OverrideForbidden,
    #[error("occurrence could not be created")]
    OccurrenceConflict,
    #[error("cannot {action} an attendance that is {from}")]
    InvalidTransition {
        from: AttendanceState,
        action: &'static str,
    },
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("location {location_id} is not served by this kiosk")]
    LocationNotServed { location_id: i32 },
    #[error("{0} not found")]
    NotFound(String),
    #[error("unreadable stored value: {0}")]
    Data(#[from] UnknownVariant),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<diesel::result::Error> for CheckinError {
    fn from(e: diesel::result::Error) -> Self {
        CheckinError::Storage(StorageError::Database(e))
    }
}

impl CheckinError {
    pub fn failure_code(&self) -> FailureCode {
        match self {
            CheckinError::IneligibleForGroup(_) => FailureCode::IneligibleForGroup,
            CheckinError::ScheduleWindowClosed => FailureCode::ScheduleWindowClosed,
            CheckinError::LocationFull { .. } => FailureCode::LocationFull,
            CheckinError::OverflowCycleDetected { .. } => FailureCode::OverflowCycleDetected,
            CheckinError::DuplicateCheckin => FailureCode::DuplicateCheckin,
            CheckinError::CodeSpaceExhausted { .. } => FailureCode::CodeSpaceExhausted,
            CheckinError::PickupUnauthorized(_) => FailureCode::PickupUnauthorized,
            CheckinError::OverrideForbidden => FailureCode::OverrideForbidden,
            CheckinError::OccurrenceConflict => FailureCode::OccurrenceConflict,
            CheckinError::InvalidTransition { .. } => FailureCode::InvalidTransition,
            CheckinError::InvalidSelection(_) => FailureCode::InvalidSelection,
            CheckinError::LocationNotServed { .. } => FailureCode::LocationNotServed,
            CheckinError::NotFound(_) => FailureCode::NotFound,
            CheckinError::Data(_) | CheckinError::Storage(_) => FailureCode::Internal,
        }
    }

    /// Message safe to show on a kiosk; storage details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            CheckinError::Data(_) | CheckinError::Storage(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    fn not_found(what: &str, id: i32) -> Self {
        CheckinError::NotFound(format!("{what} {id}"))
    }
}

/// Rooms a kiosk may check children into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LocationScope {
    #[default]
    All,
    Only(Vec<i32>),
}

impl LocationScope {
    /// An empty id list means every room.
    pub fn from_ids(ids: &[i32]) -> Self {
        if ids.is_empty() {
            LocationScope::All
        } else {
            LocationScope::Only(ids.to_vec())
        }
    }

    pub fn allows(&self, location_id: i32) -> bool {
        match self {
            LocationScope::All => true,
            LocationScope::Only(ids) => ids.contains(&location_id),
        }
    }
}

/// The authenticated caller behind an engine operation.
#[derive(Debug, Clone)]
pub struct Actor {
    pub username: String,
    pub role: Role,
    /// Person record of the volunteer or supervisor, when known.
    pub person_id: Option<i32>,
    pub device_id: Option<String>,
    pub scope: LocationScope,
}
