//! Age and grade matching of a person against a group's bounds.

use chrono::{Datelike, NaiveDate};
use flockcheck_shared::domain::EligibilityReason;

/// Age/grade bounds of a group. `None` leaves that bound open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupBounds {
    pub min_age_months: Option<i32>,
    pub max_age_months: Option<i32>,
    pub min_grade: Option<i32>,
    pub max_grade: Option<i32>,
}

impl GroupBounds {
    fn bounds_age(&self) -> bool {
        self.min_age_months.is_some() || self.max_age_months.is_some()
    }

    fn bounds_grade(&self) -> bool {
        self.min_grade.is_some() || self.max_grade.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersonFacts {
    pub birth_date: Option<NaiveDate>,
    pub grade: Option<i32>,
}

/// Whole calendar months elapsed from `birth` to `on`.
pub fn age_in_months(birth: NaiveDate, on: NaiveDate) -> i32 {
    let mut months = (on.year() - birth.year()) * 12 + on.month() as i32 - birth.month() as i32;
    if on.day() < birth.day() {
        months -= 1;
    }
    months
}

/// Checks the age axis first, then grade. A bound the group declares but the
/// person has no data for yields `InsufficientData`.
pub fn evaluate(person: &PersonFacts, group: &GroupBounds, on: NaiveDate) -> EligibilityReason {
    if group.bounds_age() {
        let Some(birth) = person.birth_date else {
            return EligibilityReason::InsufficientData;
        };
        let age = age_in_months(birth, on);
        if group.min_age_months.is_some_and(|min| age < min) {
            return EligibilityReason::TooYoung;
        }
        if group.max_age_months.is_some_and(|max| age > max) {
            return EligibilityReason::TooOld;
        }
    }
    if group.bounds_grade() {
        let Some(grade) = person.grade else {
            return EligibilityReason::InsufficientData;
        };
        if group.min_grade.is_some_and(|min| grade < min) {
            return EligibilityReason::GradeBelowRange;
        }
        if group.max_grade.is_some_and(|max| grade > max) {
            return EligibilityReason::GradeAboveRange;
        }
    }
    EligibilityReason::Eligible
}
