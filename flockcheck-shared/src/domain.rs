use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Raised when a stored enum column holds an unknown value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// Occupancy of a room relative to its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStatus {
    Available,
    Warning,
    Full,
}

text_enum!(CapacityStatus, "capacity status", {
    Available => "available",
    Warning => "warning",
    Full => "full",
});

/// Outcome of matching a person against a group's age and grade bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EligibilityReason {
    Eligible,
    TooYoung,
    TooOld,
    GradeBelowRange,
    GradeAboveRange,
    InsufficientData,
}

impl EligibilityReason {
    pub fn is_eligible(self) -> bool {
        self == EligibilityReason::Eligible
    }
}

text_enum!(EligibilityReason, "eligibility reason", {
    Eligible => "Eligible",
    TooYoung => "TooYoung",
    TooOld => "TooOld",
    GradeBelowRange => "GradeBelowRange",
    GradeAboveRange => "GradeAboveRange",
    InsufficientData => "InsufficientData",
});

/// Life-cycle of one attendance record.
///
/// `Scheduled -> CheckedIn -> (Present) -> CheckedOut`, plus the terminal
/// `Declined` for RSVP records that never turn into a physical check-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceState {
    Scheduled,
    CheckedIn,
    Present,
    CheckedOut,
    Declined,
}

text_enum!(AttendanceState, "attendance state", {
    Scheduled => "scheduled",
    CheckedIn => "checked_in",
    Present => "present",
    CheckedOut => "checked_out",
    Declined => "declined",
});

impl AttendanceState {
    /// States that occupy a counted slot in a room.
    pub const OCCUPYING: [AttendanceState; 2] = [AttendanceState::CheckedIn, AttendanceState::Present];

    pub fn is_terminal(self) -> bool {
        matches!(self, AttendanceState::CheckedOut | AttendanceState::Declined)
    }

    pub fn is_open(self) -> bool {
        Self::OCCUPYING.contains(&self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Rsvp {
    #[default]
    Unknown,
    Yes,
    Maybe,
    No,
}

text_enum!(Rsvp, "rsvp", {
    Unknown => "unknown",
    Yes => "yes",
    Maybe => "maybe",
    No => "no",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationLevel {
    /// May pick the child up on sight.
    Always,
    /// Must also present the child's security code for today.
    Restricted,
}

text_enum!(AuthorizationLevel, "authorization level", {
    Always => "always",
    Restricted => "restricted",
});

/// Machine-readable failure codes returned to kiosks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    IneligibleForGroup,
    ScheduleWindowClosed,
    LocationFull,
    OverflowCycleDetected,
    DuplicateCheckin,
    CodeSpaceExhausted,
    PickupUnauthorized,
    OverrideForbidden,
    OccurrenceConflict,
    InvalidTransition,
    InvalidSelection,
    LocationNotServed,
    NotFound,
    Internal,
}
