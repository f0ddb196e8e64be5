use chrono::NaiveDate;
use flockcheck_server::checkin::eligibility::{GroupBounds, PersonFacts, age_in_months, evaluate};
use flockcheck_shared::domain::EligibilityReason;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn toddlers() -> GroupBounds {
    GroupBounds {
        min_age_months: Some(24),
        max_age_months: Some(47),
        ..Default::default()
    }
}

#[test]
fn age_counts_whole_months_only() {
    assert_eq!(age_in_months(d(2022, 3, 15), d(2024, 3, 15)), 24);
    assert_eq!(age_in_months(d(2022, 3, 15), d(2024, 3, 14)), 23);
    assert_eq!(age_in_months(d(2022, 3, 31), d(2022, 4, 30)), 0);
    assert_eq!(age_in_months(d(2020, 2, 29), d(2021, 2, 28)), 11);
}

#[test]
fn age_bounds_are_inclusive() {
    let on = d(2024, 6, 1);
    let just_two = PersonFacts {
        birth_date: Some(d(2022, 6, 1)),
        grade: None,
    };
    assert_eq!(evaluate(&just_two, &toddlers(), on), EligibilityReason::Eligible);

    let almost_two = PersonFacts {
        birth_date: Some(d(2022, 6, 2)),
        grade: None,
    };
    assert_eq!(evaluate(&almost_two, &toddlers(), on), EligibilityReason::TooYoung);

    let four = PersonFacts {
        birth_date: Some(d(2020, 6, 1)),
        grade: None,
    };
    assert_eq!(evaluate(&four, &toddlers(), on), EligibilityReason::TooOld);
}

#[test]
fn grade_bounds() {
    let elementary = GroupBounds {
        min_grade: Some(1),
        max_grade: Some(5),
        ..Default::default()
    };
    let on = d(2024, 9, 1);
    let kid = |grade| PersonFacts {
        birth_date: None,
        grade: Some(grade),
    };
    assert_eq!(evaluate(&kid(0), &elementary, on), EligibilityReason::GradeBelowRange);
    assert_eq!(evaluate(&kid(1), &elementary, on), EligibilityReason::Eligible);
    assert_eq!(evaluate(&kid(5), &elementary, on), EligibilityReason::Eligible);
    assert_eq!(evaluate(&kid(6), &elementary, on), EligibilityReason::GradeAboveRange);
}

#[test]
fn missing_data_for_a_declared_bound_is_insufficient() {
    let on = d(2024, 6, 1);
    let unknown = PersonFacts::default();
    assert_eq!(evaluate(&unknown, &toddlers(), on), EligibilityReason::InsufficientData);

    let graded = GroupBounds {
        min_grade: Some(3),
        ..Default::default()
    };
    let has_birthday = PersonFacts {
        birth_date: Some(d(2015, 1, 1)),
        grade: None,
    };
    assert_eq!(evaluate(&has_birthday, &graded, on), EligibilityReason::InsufficientData);
}

#[test]
fn unbounded_group_admits_anyone() {
    let on = d(2024, 6, 1);
    assert_eq!(
        evaluate(&PersonFacts::default(), &GroupBounds::default(), on),
        EligibilityReason::Eligible
    );
}

#[test]
fn age_is_checked_before_grade() {
    let bounds = GroupBounds {
        min_age_months: Some(60),
        min_grade: Some(1),
        ..Default::default()
    };
    let young_and_low = PersonFacts {
        birth_date: Some(d(2022, 1, 1)),
        grade: Some(0),
    };
    assert_eq!(
        evaluate(&young_and_low, &bounds, d(2024, 6, 1)),
        EligibilityReason::TooYoung
    );
}
