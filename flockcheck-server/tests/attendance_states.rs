use flockcheck_server::checkin::CheckinError;
use flockcheck_server::checkin::attendance::{Transition, next_state, sources};
use flockcheck_shared::domain::AttendanceState::{self, *};

const ALL: [AttendanceState; 5] = [Scheduled, CheckedIn, Present, CheckedOut, Declined];
const TRANSITIONS: [Transition; 4] = [
    Transition::CheckIn,
    Transition::ConfirmPresence,
    Transition::CheckOut,
    Transition::Decline,
];

#[test]
fn forward_path() {
    assert_eq!(next_state(Scheduled, Transition::CheckIn).unwrap(), CheckedIn);
    assert_eq!(next_state(CheckedIn, Transition::ConfirmPresence).unwrap(), Present);
    assert_eq!(next_state(Present, Transition::CheckOut).unwrap(), CheckedOut);
    // Presence confirmation is optional
    assert_eq!(next_state(CheckedIn, Transition::CheckOut).unwrap(), CheckedOut);
    assert_eq!(next_state(Scheduled, Transition::Decline).unwrap(), Declined);
}

#[test]
fn terminal_states_reject_everything() {
    for from in [CheckedOut, Declined] {
        assert!(from.is_terminal());
        for t in TRANSITIONS {
            let err = next_state(from, t).unwrap_err();
            assert!(
                matches!(err, CheckinError::InvalidTransition { from: f, action } if f == from && action == t.as_str()),
                "{from:?} {t:?}"
            );
        }
    }
}

#[test]
fn sources_agree_with_next_state() {
    for t in TRANSITIONS {
        for from in ALL {
            assert_eq!(
                sources(t).contains(&from),
                next_state(from, t).is_ok(),
                "{from:?} {t:?}"
            );
        }
    }
}

#[test]
fn only_checked_in_and_present_occupy_a_slot() {
    let occupying: Vec<_> = ALL.into_iter().filter(|s| s.is_open()).collect();
    assert_eq!(occupying, vec![CheckedIn, Present]);
}
