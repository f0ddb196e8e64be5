use crate::storage::schema::{
    attendance_codes, attendances, audit_log, authorized_pickups, families, locations,
    ministry_groups, occurrences, people, pickup_logs, schedules, sessions,
};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use diesel::prelude::*;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = families)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Family {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = people)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Person {
    pub id: i32,
    pub family_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub grade: Option<i32>,
}

impl Person {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = locations)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Location {
    pub id: i32,
    pub name: String,
    pub parent_location_id: Option<i32>,
    pub soft_room_threshold: Option<i32>,
    pub firm_room_threshold: Option<i32>,
    pub overflow_location_id: Option<i32>,
    pub auto_assign_overflow: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = schedules)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Schedule {
    pub id: i32,
    pub name: String,
    pub weekly_day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub weekly_time_of_day: NaiveTime,
    pub check_in_start_offset_minutes: i32,
    pub check_in_end_offset_minutes: Option<i32>,
    pub effective_start_date: Option<NaiveDate>,
    pub effective_end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = ministry_groups)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Group {
    pub id: i32,
    pub name: String,
    pub min_age_months: Option<i32>,
    pub max_age_months: Option<i32>,
    pub min_grade: Option<i32>,
    pub max_grade: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = occurrences)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Occurrence {
    pub id: i32,
    pub group_id: i32,
    pub location_id: i32,
    pub schedule_id: i32,
    pub occurrence_date: NaiveDate,
    pub sunday_date: NaiveDate,
    pub did_not_occur: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = occurrences)]
pub struct NewOccurrence {
    pub group_id: i32,
    pub location_id: i32,
    pub schedule_id: i32,
    pub occurrence_date: NaiveDate,
    pub sunday_date: NaiveDate,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = attendance_codes)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AttendanceCode {
    pub id: i32,
    pub issue_date_time: NaiveDateTime,
    pub issue_date: NaiveDate,
    pub code: String,
}

#[derive(Insertable)]
#[diesel(table_name = attendance_codes)]
pub struct NewAttendanceCode<'a> {
    pub issue_date_time: NaiveDateTime,
    pub issue_date: NaiveDate,
    pub code: &'a str,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = attendances)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Attendance {
    pub id: i32,
    pub occurrence_id: i32,
    pub person_id: i32,
    pub attendance_code_id: Option<i32>,
    pub device_id: Option<String>,
    pub state: String,
    pub rsvp: String,
    pub start_date_time: NaiveDateTime,
    pub present_date_time: Option<NaiveDateTime>,
    pub present_by_person_id: Option<i32>,
    pub end_date_time: Option<NaiveDateTime>,
    pub checked_out_by_person_id: Option<i32>,
    pub did_attend: Option<bool>,
    pub is_first_time: bool,
    pub decline_reason: Option<String>,
}

#[derive(Insertable)]
#[diesel(table_name = attendances)]
pub struct NewAttendance<'a> {
    pub occurrence_id: i32,
    pub person_id: i32,
    pub attendance_code_id: Option<i32>,
    pub device_id: Option<&'a str>,
    pub state: &'a str,
    pub rsvp: &'a str,
    pub start_date_time: NaiveDateTime,
    pub did_attend: Option<bool>,
    pub is_first_time: bool,
    pub decline_reason: Option<&'a str>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = authorized_pickups)]
#[diesel(treat_none_as_null = true)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AuthorizedPickup {
    pub id: i32,
    pub child_person_id: i32,
    pub authorized_person_id: Option<i32>,
    pub authorized_name: Option<String>,
    pub relationship: String,
    pub authorization_level: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = pickup_logs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PickupLog {
    pub id: i32,
    pub attendance_id: i32,
    pub child_person_id: i32,
    pub pickup_person_id: Option<i32>,
    pub pickup_name: Option<String>,
    pub was_authorized: bool,
    pub supervisor_override: bool,
    pub supervisor_person_id: Option<i32>,
    pub supervisor_username: Option<String>,
    pub checkout_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = pickup_logs)]
pub struct NewPickupLog<'a> {
    pub attendance_id: i32,
    pub child_person_id: i32,
    pub pickup_person_id: Option<i32>,
    pub pickup_name: Option<&'a str>,
    pub was_authorized: bool,
    pub supervisor_override: bool,
    pub supervisor_person_id: Option<i32>,
    pub supervisor_username: Option<&'a str>,
    pub checkout_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable)]
#[diesel(table_name = audit_log)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AuditEntry {
    pub id: i32,
    pub event: String,
    pub actor: String,
    pub subject: String,
    pub verdict: String,
    pub details: String,
    pub recorded_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = audit_log)]
pub struct NewAuditEntry<'a> {
    pub event: &'a str,
    pub actor: &'a str,
    pub subject: &'a str,
    pub verdict: &'a str,
    pub details: &'a str,
    pub recorded_at: NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = sessions)]
pub struct NewSession<'a> {
    pub jti: &'a str,
    pub username: &'a str,
}
