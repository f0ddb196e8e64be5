//! Guarded transitions of the attendance life-cycle.

use flockcheck_shared::domain::AttendanceState;

use super::CheckinError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CheckIn,
    ConfirmPresence,
    CheckOut,
    Decline,
}

impl Transition {
    pub fn as_str(self) -> &'static str {
        match self {
            Transition::CheckIn => "check_in",
            Transition::ConfirmPresence => "confirm_presence",
            Transition::CheckOut => "check_out",
            Transition::Decline => "decline",
        }
    }
}

/// `Scheduled -> CheckedIn -> (Present) -> CheckedOut`; `Scheduled -> Declined`.
pub fn next_state(from: AttendanceState, transition: Transition) -> Result<AttendanceState, CheckinError> {
    use AttendanceState::*;
    let to = match (from, transition) {
        (Scheduled, Transition::CheckIn) => CheckedIn,
        (Scheduled, Transition::Decline) => Declined,
        (CheckedIn, Transition::ConfirmPresence) => Present,
        (CheckedIn | Present, Transition::CheckOut) => CheckedOut,
        _ => {
            return Err(CheckinError::InvalidTransition {
                from,
                action: transition.as_str(),
            });
        }
    };
    Ok(to)
}

/// States a transition may start from, for conditional UPDATEs.
pub fn sources(transition: Transition) -> &'static [AttendanceState] {
    match transition {
        Transition::CheckIn | Transition::Decline => &[AttendanceState::Scheduled],
        Transition::ConfirmPresence => &[AttendanceState::CheckedIn],
        Transition::CheckOut => &AttendanceState::OCCUPYING,
    }
}
