//! Synchronous queries over a borrowed connection, composed by the check-in
//! engine inside its own transactions.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use flockcheck_shared::domain::{AttendanceState, Rsvp};

use super::models::{
    Attendance, AuthorizedPickup, Family, Group, Location, NewAttendance, NewAttendanceCode,
    NewOccurrence, NewPickupLog, Occurrence, Person, Schedule,
};
use super::schema::{
    attendance_codes, attendances, authorized_pickups, families, group_locations, group_schedules,
    locations, ministry_groups, occurrences, people, pickup_logs, schedules,
};

/// A group with the schedules it meets on and the rooms it meets in.
#[derive(Debug, Clone)]
pub struct GroupLinks {
    pub group: Group,
    pub schedule_ids: Vec<i32>,
    pub location_ids: Vec<i32>,
}

impl GroupLinks {
    pub fn serves(&self, schedule_id: i32, location_id: i32) -> bool {
        self.schedule_ids.contains(&schedule_id) && self.location_ids.contains(&location_id)
    }
}

/// An attendance with its occurrence and printed code.
#[derive(Debug, Clone)]
pub struct AttendanceView {
    pub attendance: Attendance,
    pub occurrence: Occurrence,
    pub security_code: Option<String>,
}

fn occupying() -> [&'static str; 2] {
    AttendanceState::OCCUPYING.map(AttendanceState::as_str)
}

fn attended() -> [&'static str; 3] {
    [
        AttendanceState::CheckedIn,
        AttendanceState::Present,
        AttendanceState::CheckedOut,
    ]
    .map(AttendanceState::as_str)
}

pub fn family(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Family>> {
    families::table
        .find(id)
        .select(Family::as_select())
        .first(conn)
        .optional()
}

pub fn family_members(conn: &mut SqliteConnection, family_id: i32) -> QueryResult<Vec<Person>> {
    people::table
        .filter(people::family_id.eq(family_id))
        .order(people::id.asc())
        .select(Person::as_select())
        .load(conn)
}

pub fn person(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Person>> {
    people::table
        .find(id)
        .select(Person::as_select())
        .first(conn)
        .optional()
}

pub fn schedule(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Schedule>> {
    schedules::table
        .find(id)
        .select(Schedule::as_select())
        .first(conn)
        .optional()
}

pub fn location(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Location>> {
    locations::table
        .find(id)
        .select(Location::as_select())
        .first(conn)
        .optional()
}

pub fn all_schedules(conn: &mut SqliteConnection) -> QueryResult<Vec<Schedule>> {
    schedules::table
        .order(schedules::id.asc())
        .select(Schedule::as_select())
        .load(conn)
}

pub fn all_locations(conn: &mut SqliteConnection) -> QueryResult<Vec<Location>> {
    locations::table
        .order(locations::id.asc())
        .select(Location::as_select())
        .load(conn)
}

pub fn group_links(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<GroupLinks>> {
    let Some(group) = ministry_groups::table
        .find(id)
        .select(Group::as_select())
        .first(conn)
        .optional()?
    else {
        return Ok(None);
    };
    let schedule_ids = group_schedules::table
        .filter(group_schedules::group_id.eq(id))
        .select(group_schedules::schedule_id)
        .load(conn)?;
    let location_ids = group_locations::table
        .filter(group_locations::group_id.eq(id))
        .select(group_locations::location_id)
        .load(conn)?;
    Ok(Some(GroupLinks {
        group,
        schedule_ids,
        location_ids,
    }))
}

pub fn all_group_links(conn: &mut SqliteConnection) -> QueryResult<Vec<GroupLinks>> {
    let groups = ministry_groups::table
        .order(ministry_groups::id.asc())
        .select(Group::as_select())
        .load(conn)?;
    let mut by_schedule: HashMap<i32, Vec<i32>> = HashMap::new();
    for (gid, sid) in group_schedules::table
        .order(group_schedules::schedule_id.asc())
        .load::<(i32, i32)>(conn)?
    {
        by_schedule.entry(gid).or_default().push(sid);
    }
    let mut by_location: HashMap<i32, Vec<i32>> = HashMap::new();
    for (gid, lid) in group_locations::table
        .order(group_locations::location_id.asc())
        .load::<(i32, i32)>(conn)?
    {
        by_location.entry(gid).or_default().push(lid);
    }
    Ok(groups
        .into_iter()
        .map(|group| GroupLinks {
            schedule_ids: by_schedule.remove(&group.id).unwrap_or_default(),
            location_ids: by_location.remove(&group.id).unwrap_or_default(),
            group,
        })
        .collect())
}

/// Occupied slots in a room for one schedule and date, across every group
/// meeting there.
pub fn headcount(
    conn: &mut SqliteConnection,
    location_id: i32,
    schedule_id: i32,
    date: NaiveDate,
) -> QueryResult<i64> {
    attendances::table
        .inner_join(occurrences::table)
        .filter(occurrences::location_id.eq(location_id))
        .filter(occurrences::schedule_id.eq(schedule_id))
        .filter(occurrences::occurrence_date.eq(date))
        .filter(attendances::state.eq_any(occupying()))
        .filter(attendances::end_date_time.is_null())
        .count()
        .get_result(conn)
}

pub fn open_attendances(
    conn: &mut SqliteConnection,
    person_id: i32,
) -> QueryResult<Vec<AttendanceView>> {
    let rows = attendances::table
        .inner_join(occurrences::table)
        .left_join(attendance_codes::table)
        .filter(attendances::person_id.eq(person_id))
        .filter(attendances::state.eq_any(occupying()))
        .filter(attendances::end_date_time.is_null())
        .order(attendances::id.asc())
        .select((
            Attendance::as_select(),
            Occurrence::as_select(),
            attendance_codes::code.nullable(),
        ))
        .load::<(Attendance, Occurrence, Option<String>)>(conn)?;
    Ok(rows
        .into_iter()
        .map(|(attendance, occurrence, security_code)| AttendanceView {
            attendance,
            occurrence,
            security_code,
        })
        .collect())
}

/// Whether the person already occupies a slot in this group's meeting,
/// whichever room it landed in.
pub fn has_open_attendance_for(
    conn: &mut SqliteConnection,
    person_id: i32,
    group_id: i32,
    schedule_id: i32,
    date: NaiveDate,
) -> QueryResult<bool> {
    let n: i64 = attendances::table
        .inner_join(occurrences::table)
        .filter(attendances::person_id.eq(person_id))
        .filter(occurrences::group_id.eq(group_id))
        .filter(occurrences::schedule_id.eq(schedule_id))
        .filter(occurrences::occurrence_date.eq(date))
        .filter(attendances::state.eq_any(occupying()))
        .filter(attendances::end_date_time.is_null())
        .count()
        .get_result(conn)?;
    Ok(n > 0)
}

pub fn has_attended_before(conn: &mut SqliteConnection, person_id: i32) -> QueryResult<bool> {
    let n: i64 = attendances::table
        .filter(attendances::person_id.eq(person_id))
        .filter(attendances::state.eq_any(attended()))
        .count()
        .get_result(conn)?;
    Ok(n > 0)
}

pub fn find_occurrence(
    conn: &mut SqliteConnection,
    group_id: i32,
    location_id: i32,
    schedule_id: i32,
    date: NaiveDate,
) -> QueryResult<Option<Occurrence>> {
    occurrences::table
        .filter(occurrences::group_id.eq(group_id))
        .filter(occurrences::location_id.eq(location_id))
        .filter(occurrences::schedule_id.eq(schedule_id))
        .filter(occurrences::occurrence_date.eq(date))
        .select(Occurrence::as_select())
        .first(conn)
        .optional()
}

/// Inserts unless the (group, location, schedule, date) tuple exists.
/// Returns the number of rows inserted.
pub fn insert_occurrence_if_absent(
    conn: &mut SqliteConnection,
    row: &NewOccurrence,
) -> QueryResult<usize> {
    diesel::insert_into(occurrences::table)
        .values(row)
        .on_conflict((
            occurrences::group_id,
            occurrences::location_id,
            occurrences::schedule_id,
            occurrences::occurrence_date,
        ))
        .do_nothing()
        .execute(conn)
}

pub fn attendance(conn: &mut SqliteConnection, id: i32) -> QueryResult<Option<Attendance>> {
    attendances::table
        .find(id)
        .select(Attendance::as_select())
        .first(conn)
        .optional()
}

/// The person's most recent record on an occurrence.
pub fn attendance_on(
    conn: &mut SqliteConnection,
    occurrence_id: i32,
    person_id: i32,
) -> QueryResult<Option<Attendance>> {
    attendances::table
        .filter(attendances::occurrence_id.eq(occurrence_id))
        .filter(attendances::person_id.eq(person_id))
        .order(attendances::id.desc())
        .select(Attendance::as_select())
        .first(conn)
        .optional()
}

/// A `Scheduled` record for the person in this group's slot, whichever room
/// the RSVP named.
pub fn scheduled_in_slot(
    conn: &mut SqliteConnection,
    person_id: i32,
    group_id: i32,
    schedule_id: i32,
    date: NaiveDate,
) -> QueryResult<Option<Attendance>> {
    attendances::table
        .inner_join(occurrences::table)
        .filter(attendances::person_id.eq(person_id))
        .filter(occurrences::group_id.eq(group_id))
        .filter(occurrences::schedule_id.eq(schedule_id))
        .filter(occurrences::occurrence_date.eq(date))
        .filter(attendances::state.eq(AttendanceState::Scheduled.as_str()))
        .order(attendances::id.desc())
        .select(Attendance::as_select())
        .first(conn)
        .optional()
}

pub fn insert_attendance(conn: &mut SqliteConnection, row: &NewAttendance) -> QueryResult<i32> {
    diesel::insert_into(attendances::table)
        .values(row)
        .returning(attendances::id)
        .get_result(conn)
}

/// Reserves `code` for `issue_date`. `None` when the day already has it.
pub fn reserve_code(
    conn: &mut SqliteConnection,
    issue_date_time: NaiveDateTime,
    issue_date: NaiveDate,
    code: &str,
) -> QueryResult<Option<i32>> {
    diesel::insert_into(attendance_codes::table)
        .values(&NewAttendanceCode {
            issue_date_time,
            issue_date,
            code,
        })
        .on_conflict((attendance_codes::issue_date, attendance_codes::code))
        .do_nothing()
        .returning(attendance_codes::id)
        .get_result(conn)
        .optional()
}

/// Active and inactive pickup rows for a child, each with the authorized
/// person's record when the row references one.
pub fn pickup_rules(
    conn: &mut SqliteConnection,
    child_person_id: i32,
) -> QueryResult<Vec<(AuthorizedPickup, Option<Person>)>> {
    let rules = authorized_pickups::table
        .filter(authorized_pickups::child_person_id.eq(child_person_id))
        .order(authorized_pickups::id.asc())
        .select(AuthorizedPickup::as_select())
        .load(conn)?;
    let ids: Vec<i32> = rules.iter().filter_map(|r| r.authorized_person_id).collect();
    let persons: HashMap<i32, Person> = people::table
        .filter(people::id.eq_any(&ids))
        .select(Person::as_select())
        .load(conn)?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();
    Ok(rules
        .into_iter()
        .map(|r| {
            let p = r.authorized_person_id.and_then(|id| persons.get(&id).cloned());
            (r, p)
        })
        .collect())
}

/// Codes on the child's open attendances.
pub fn open_codes(conn: &mut SqliteConnection, person_id: i32) -> QueryResult<Vec<String>> {
    attendances::table
        .inner_join(attendance_codes::table)
        .filter(attendances::person_id.eq(person_id))
        .filter(attendances::state.eq_any(occupying()))
        .filter(attendances::end_date_time.is_null())
        .select(attendance_codes::code)
        .load(conn)
}

pub fn insert_pickup_log(conn: &mut SqliteConnection, row: &NewPickupLog) -> QueryResult<usize> {
    diesel::insert_into(pickup_logs::table)
        .values(row)
        .execute(conn)
}

fn texts(states: &[AttendanceState]) -> Vec<&'static str> {
    states.iter().map(|s| s.as_str()).collect()
}

/// Fields written when a `Scheduled` record turns into a physical check-in.
pub struct CheckInUpdate<'a> {
    /// Where the child was placed; may differ from the RSVP's room.
    pub occurrence_id: i32,
    pub attendance_code_id: i32,
    pub device_id: Option<&'a str>,
    pub start_date_time: NaiveDateTime,
    pub is_first_time: bool,
    pub rsvp: &'a str,
}

/// The update helpers below only touch rows still in one of `from`, so a
/// transition applies at most once. They return the affected row count.
pub fn check_in_scheduled(
    conn: &mut SqliteConnection,
    id: i32,
    from: &[AttendanceState],
    upd: &CheckInUpdate<'_>,
) -> QueryResult<usize> {
    use super::schema::attendances::dsl as a;
    diesel::update(a::attendances.find(id).filter(a::state.eq_any(texts(from))))
        .set((
            a::state.eq(AttendanceState::CheckedIn.as_str()),
            a::occurrence_id.eq(upd.occurrence_id),
            a::attendance_code_id.eq(Some(upd.attendance_code_id)),
            a::device_id.eq(upd.device_id),
            a::start_date_time.eq(upd.start_date_time),
            a::is_first_time.eq(upd.is_first_time),
            a::rsvp.eq(upd.rsvp),
        ))
        .execute(conn)
}

pub fn mark_present(
    conn: &mut SqliteConnection,
    id: i32,
    from: &[AttendanceState],
    at: NaiveDateTime,
    by_person_id: Option<i32>,
) -> QueryResult<usize> {
    use super::schema::attendances::dsl as a;
    diesel::update(a::attendances.find(id).filter(a::state.eq_any(texts(from))))
        .set((
            a::state.eq(AttendanceState::Present.as_str()),
            a::present_date_time.eq(Some(at)),
            a::present_by_person_id.eq(by_person_id),
        ))
        .execute(conn)
}

pub fn close_attendance(
    conn: &mut SqliteConnection,
    id: i32,
    from: &[AttendanceState],
    at: NaiveDateTime,
    by_person_id: Option<i32>,
) -> QueryResult<usize> {
    use super::schema::attendances::dsl as a;
    diesel::update(
        a::attendances
            .find(id)
            .filter(a::state.eq_any(texts(from)))
            .filter(a::end_date_time.is_null()),
    )
    .set((
        a::state.eq(AttendanceState::CheckedOut.as_str()),
        a::end_date_time.eq(Some(at)),
        a::checked_out_by_person_id.eq(by_person_id),
        a::did_attend.eq(Some(true)),
    ))
    .execute(conn)
}

pub fn decline(
    conn: &mut SqliteConnection,
    id: i32,
    from: &[AttendanceState],
    reason: Option<&str>,
) -> QueryResult<usize> {
    use super::schema::attendances::dsl as a;
    diesel::update(a::attendances.find(id).filter(a::state.eq_any(texts(from))))
        .set((
            a::state.eq(AttendanceState::Declined.as_str()),
            a::rsvp.eq(Rsvp::No.as_str()),
            a::did_attend.eq(Some(false)),
            a::decline_reason.eq(reason),
        ))
        .execute(conn)
}

pub fn set_rsvp(
    conn: &mut SqliteConnection,
    id: i32,
    from: &[AttendanceState],
    rsvp: &str,
) -> QueryResult<usize> {
    use super::schema::attendances::dsl as a;
    diesel::update(a::attendances.find(id).filter(a::state.eq_any(texts(from))))
        .set(a::rsvp.eq(rsvp))
        .execute(conn)
}
