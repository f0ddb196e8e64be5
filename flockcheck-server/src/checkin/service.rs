use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use diesel::prelude::*;
use flockcheck_shared::api::{
    AttendanceDto, CheckinOptionDto, CheckinResultDto, CheckinSelectionDto, CheckoutResp,
    ExclusionDto, FamilyOpportunitiesDto, MemberOpportunitiesDto, OccupancyDto, PresenceResp,
    RsvpReq, RsvpResp,
};
use flockcheck_shared::domain::{AttendanceState, CapacityStatus, Rsvp};
use serde_json::json;
use tracing::{debug, info, warn};

use super::attendance::{self, Transition};
use super::capacity::{self, OccupancySource, RoomLimits};
use super::codes::{self, CodeConfig, CodeReserver};
use super::eligibility::{self, GroupBounds, PersonFacts};
use super::pickup::{self, PickupRequest, PickupRule, PickupVerdict, PresentingPerson};
use super::schedule::{self, ScheduleSpec};
use super::{Actor, CheckinError, LocationScope};
use crate::audit::{AuditEvent, AuditRecord, AuditTrail};
use crate::storage::Store;
use crate::storage::models::{
    AuthorizedPickup, Group, Location, NewAttendance, NewOccurrence, NewPickupLog, Occurrence,
    Person, Schedule,
};
use crate::storage::queries::{self, AttendanceView, CheckInUpdate, GroupLinks};

/// Attempts at the occurrence get-or-create before giving up.
const OCCURRENCE_ATTEMPTS: u32 = 3;

/// A selection that made it into a room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub attendance_id: i32,
    pub security_code: String,
    pub location_id: i32,
    pub overflowed_from: Vec<i32>,
}

/// Composes eligibility, schedule windows, capacity and code issuing over
/// the store. Every write runs in its own `BEGIN IMMEDIATE` transaction.
#[derive(Clone)]
pub struct CheckinService {
    store: Store,
    codes: CodeConfig,
    tz: Tz,
    audit: AuditTrail,
}

impl CheckinService {
    pub fn new(store: Store, codes: CodeConfig, tz: Tz, audit: AuditTrail) -> Self {
        Self {
            store,
            codes,
            tz,
            audit,
        }
    }

    /// Read-only: what each family member could check into right now.
    pub async fn resolve_opportunities(
        &self,
        family_id: i32,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<FamilyOpportunitiesDto, CheckinError> {
        let tz = self.tz;
        let scope = actor.scope.clone();
        self.store
            .with_conn(move |conn| {
                conn.transaction(|conn| resolve_family(conn, family_id, &scope, tz, now))
            })
            .await
    }

    /// Commits each selection independently; one full room never fails
    /// its siblings.
    pub async fn commit_checkins(
        &self,
        selections: Vec<CheckinSelectionDto>,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Vec<CheckinResultDto> {
        let mut results = Vec::with_capacity(selections.len());
        for selection in selections {
            let outcome = self.commit_one(selection.clone(), actor, now).await;
            let result = match outcome {
                Ok(c) => {
                    info!(
                        person_id = selection.person_id,
                        group_id = selection.group_id,
                        location_id = c.location_id,
                        attendance_id = c.attendance_id,
                        overflowed_from = ?c.overflowed_from,
                        "checkin: committed"
                    );
                    CheckinResultDto {
                        selection,
                        success: true,
                        attendance_id: Some(c.attendance_id),
                        security_code: Some(c.security_code),
                        location_id: Some(c.location_id),
                        failure_code: None,
                        failure_reason: None,
                    }
                }
                Err(e) => {
                    if matches!(e, CheckinError::Storage(_) | CheckinError::Data(_)) {
                        tracing::error!(person_id = selection.person_id, error = %e, "checkin: selection failed");
                    } else {
                        info!(
                            person_id = selection.person_id,
                            group_id = selection.group_id,
                            location_id = selection.location_id,
                            code = ?e.failure_code(),
                            reason = %e,
                            "checkin: selection rejected"
                        );
                    }
                    CheckinResultDto {
                        selection,
                        success: false,
                        attendance_id: None,
                        security_code: None,
                        location_id: None,
                        failure_code: Some(e.failure_code()),
                        failure_reason: Some(e.public_message()),
                    }
                }
            };
            results.push(result);
        }
        results
    }

    pub async fn commit_one(
        &self,
        selection: CheckinSelectionDto,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Committed, CheckinError> {
        let tz = self.tz;
        let codes = self.codes;
        let scope = actor.scope.clone();
        let device_id = actor.device_id.clone();
        self.store
            .with_conn(move |conn| {
                conn.immediate_transaction(|conn| {
                    let ctx = CommitCtx {
                        scope: &scope,
                        device_id: device_id.as_deref(),
                        codes: &codes,
                        tz,
                        now,
                    };
                    commit_selection(conn, &selection, &ctx)
                })
            })
            .await
    }

    pub async fn confirm_presence(
        &self,
        attendance_id: i32,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PresenceResp, CheckinError> {
        let by = actor.person_id;
        let resp = self
            .store
            .with_conn(move |conn| {
                conn.immediate_transaction(|conn| {
                    let a = queries::attendance(conn, attendance_id)?
                        .ok_or_else(|| CheckinError::not_found("attendance", attendance_id))?;
                    let from: AttendanceState = a.state.parse()?;
                    let to = attendance::next_state(from, Transition::ConfirmPresence)?;
                    let sources = attendance::sources(Transition::ConfirmPresence);
                    if queries::mark_present(conn, attendance_id, sources, now.naive_utc(), by)? == 0 {
                        return Err(CheckinError::InvalidTransition {
                            from,
                            action: Transition::ConfirmPresence.as_str(),
                        });
                    }
                    Ok(PresenceResp {
                        attendance_id,
                        state: to,
                        present_at: now,
                    })
                })
            })
            .await?;
        info!(attendance_id, by = ?by, "checkin: presence confirmed");
        Ok(resp)
    }

    /// Matches the presenting person against the child's pickup list. Every
    /// outcome, including a refused override, goes to the audit trail.
    pub async fn verify_pickup(
        &self,
        child_person_id: i32,
        presenting: PresentingPerson,
        security_code: Option<String>,
        force_override: bool,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<PickupVerdict, CheckinError> {
        let (rules, open_codes) = self
            .store
            .with_conn(move |conn| -> Result<_, CheckinError> {
                queries::person(conn, child_person_id)?
                    .ok_or_else(|| CheckinError::not_found("person", child_person_id))?;
                let rules = queries::pickup_rules(conn, child_person_id)?
                    .into_iter()
                    .map(|(r, p)| pickup_rule(r, p.as_ref()))
                    .collect::<Result<Vec<_>, _>>()?;
                let open_codes = queries::open_codes(conn, child_person_id)?;
                Ok((rules, open_codes))
            })
            .await?;

        let request = PickupRequest {
            child_person_id,
            presenting: &presenting,
            security_code: security_code.as_deref(),
            force_override,
        };
        let outcome = pickup::verify(&rules, &open_codes, &request, actor);
        self.audit_pickup(&request, actor, now, &outcome);
        outcome
    }

    fn audit_pickup(
        &self,
        request: &PickupRequest<'_>,
        actor: &Actor,
        now: DateTime<Utc>,
        outcome: &Result<PickupVerdict, CheckinError>,
    ) {
        let (event, verdict, reason) = match outcome {
            Ok(v @ PickupVerdict::Authorized(_)) => (AuditEvent::PickupVerification, "authorized", v.reason()),
            Ok(v @ PickupVerdict::Unauthorized { .. }) => {
                (AuditEvent::PickupVerification, "unauthorized", v.reason())
            }
            Ok(v @ PickupVerdict::Override(_)) => (AuditEvent::SupervisorOverride, "override", v.reason()),
            Err(CheckinError::OverrideForbidden) => {
                (AuditEvent::SupervisorOverride, "override_forbidden", None)
            }
            Err(_) => return,
        };
        let presenting = request.presenting.describe();
        if verdict == "authorized" {
            info!(child_person_id = request.child_person_id, presenting = %presenting, "pickup: authorized");
        } else {
            warn!(
                child_person_id = request.child_person_id,
                presenting = %presenting,
                username = %actor.username,
                role = ?actor.role,
                verdict,
                reason = ?reason,
                "pickup: not authorized by rule"
            );
        }
        self.audit.record(AuditRecord {
            event,
            actor: actor.username.clone(),
            subject: format!("person:{}", request.child_person_id),
            verdict,
            at: now,
            details: json!({
                "presenting": presenting,
                "reason": reason,
                "role": actor.role,
                "device_id": actor.device_id,
                "override_requested": request.force_override,
            }),
        });
    }

    /// Closes the attendance on an authorized or overridden verdict and
    /// writes the pickup log in the same transaction. An unauthorized
    /// verdict returns the reason without touching the attendance.
    pub async fn checkout(
        &self,
        attendance_id: i32,
        verdict: PickupVerdict,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<CheckoutResp, CheckinError> {
        let kind = verdict.kind();
        if let PickupVerdict::Unauthorized { reason, .. } = &verdict {
            return Ok(CheckoutResp {
                success: false,
                attendance_id,
                verdict: kind,
                checked_out_at: None,
                reason: Some(reason.clone()),
            });
        }
        let by = actor.person_id;
        let resp = self
            .store
            .with_conn(move |conn| {
                conn.immediate_transaction(|conn| close_with_log(conn, attendance_id, &verdict, by, now))
            })
            .await?;
        info!(attendance_id, verdict = ?kind, "checkin: checked out");
        Ok(resp)
    }

    /// Records an RSVP as a `Scheduled` or `Declined` attendance. No code is
    /// issued and no capacity is taken.
    pub async fn record_rsvp(
        &self,
        req: RsvpReq,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<RsvpResp, CheckinError> {
        let device_id = actor.device_id.clone();
        self.store
            .with_conn(move |conn| {
                conn.immediate_transaction(|conn| {
                    apply_rsvp(conn, &req, device_id.as_deref(), now.naive_utc())
                })
            })
            .await
    }

    /// Advisory occupancy for the schedule's open occurrence, or today's
    /// date when the window is closed.
    pub async fn occupancy(
        &self,
        location_id: i32,
        schedule_id: i32,
        now: DateTime<Utc>,
    ) -> Result<OccupancyDto, CheckinError> {
        let tz = self.tz;
        self.store
            .with_conn(move |conn| -> Result<OccupancyDto, CheckinError> {
                let location = queries::location(conn, location_id)?
                    .ok_or_else(|| CheckinError::not_found("location", location_id))?;
                let schedule = queries::schedule(conn, schedule_id)?
                    .ok_or_else(|| CheckinError::not_found("schedule", schedule_id))?;
                let window = ScheduleSpec::from(&schedule).evaluate(now, tz);
                let date = window
                    .occurrence_date
                    .filter(|_| window.is_open)
                    .unwrap_or_else(|| now.with_timezone(&tz).date_naive());
                let headcount = queries::headcount(conn, location_id, schedule_id, date)?;
                Ok(OccupancyDto {
                    location_id,
                    schedule_id,
                    occurrence_date: date,
                    headcount,
                    status: RoomLimits::from(&location).status(headcount),
                    soft_room_threshold: location.soft_room_threshold,
                    firm_room_threshold: location.firm_room_threshold,
                })
            })
            .await
    }
}

struct DbRooms<'c> {
    conn: &'c mut SqliteConnection,
    schedule_id: i32,
    date: NaiveDate,
}

impl OccupancySource for DbRooms<'_> {
    fn room(&mut self, location_id: i32) -> Result<Option<RoomLimits>, CheckinError> {
        Ok(queries::location(self.conn, location_id)?
            .as_ref()
            .map(RoomLimits::from))
    }

    fn headcount(&mut self, location_id: i32) -> Result<i64, CheckinError> {
        Ok(queries::headcount(
            self.conn,
            location_id,
            self.schedule_id,
            self.date,
        )?)
    }
}

struct DbCodes<'c> {
    conn: &'c mut SqliteConnection,
    issued_at: NaiveDateTime,
}

impl CodeReserver for DbCodes<'_> {
    fn try_reserve(&mut self, issue_date: NaiveDate, code: &str) -> Result<Option<i32>, CheckinError> {
        Ok(queries::reserve_code(
            self.conn,
            self.issued_at,
            issue_date,
            code,
        )?)
    }
}

fn utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc)
}

fn bounds(g: &Group) -> GroupBounds {
    GroupBounds {
        min_age_months: g.min_age_months,
        max_age_months: g.max_age_months,
        min_grade: g.min_grade,
        max_grade: g.max_grade,
    }
}

fn facts(p: &Person) -> PersonFacts {
    PersonFacts {
        birth_date: p.birth_date,
        grade: p.grade,
    }
}

fn pickup_rule(row: AuthorizedPickup, person: Option<&Person>) -> Result<PickupRule, CheckinError> {
    Ok(PickupRule {
        id: row.id,
        authorized_person_id: row.authorized_person_id,
        name: row
            .authorized_name
            .or_else(|| person.map(Person::display_name)),
        relationship: row.relationship,
        level: row.authorization_level.parse()?,
        is_active: row.is_active,
    })
}

fn attendance_dto(v: &AttendanceView) -> Result<AttendanceDto, CheckinError> {
    Ok(AttendanceDto {
        id: v.attendance.id,
        person_id: v.attendance.person_id,
        group_id: v.occurrence.group_id,
        location_id: v.occurrence.location_id,
        schedule_id: v.occurrence.schedule_id,
        occurrence_date: v.occurrence.occurrence_date,
        state: v.attendance.state.parse()?,
        security_code: v.security_code.clone(),
        start_date_time: utc(v.attendance.start_date_time),
    })
}

fn resolve_family(
    conn: &mut SqliteConnection,
    family_id: i32,
    scope: &LocationScope,
    tz: Tz,
    now: DateTime<Utc>,
) -> Result<FamilyOpportunitiesDto, CheckinError> {
    queries::family(conn, family_id)?
        .ok_or_else(|| CheckinError::not_found("family", family_id))?;
    let people = queries::family_members(conn, family_id)?;
    let groups = queries::all_group_links(conn)?;
    let schedules: HashMap<i32, _> = queries::all_schedules(conn)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let locations: HashMap<i32, _> = queries::all_locations(conn)?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();
    let windows: HashMap<i32, _> = schedules
        .values()
        .map(|s| (s.id, ScheduleSpec::from(s).evaluate(now, tz)))
        .collect();
    let today = now.with_timezone(&tz).date_naive();

    let mut members = Vec::with_capacity(people.len());
    for person in &people {
        let open = queries::open_attendances(conn, person.id)?;
        let mut available_options = Vec::new();
        let mut exclusions = Vec::new();

        for links in &groups {
            let reason = eligibility::evaluate(&facts(person), &bounds(&links.group), today);
            if !reason.is_eligible() {
                exclusions.push(ExclusionDto {
                    group_id: links.group.id,
                    schedule_id: None,
                    reason: reason.to_string(),
                });
                continue;
            }
            for sid in &links.schedule_ids {
                let (Some(sched), Some(window)) = (schedules.get(sid), windows.get(sid)) else {
                    continue;
                };
                let Some(date) = window.occurrence_date.filter(|_| window.is_open) else {
                    exclusions.push(ExclusionDto {
                        group_id: links.group.id,
                        schedule_id: Some(*sid),
                        reason: "ScheduleWindowClosed".to_string(),
                    });
                    continue;
                };
                let already_in = open.iter().any(|v| {
                    v.occurrence.group_id == links.group.id
                        && v.occurrence.schedule_id == *sid
                        && v.occurrence.occurrence_date == date
                });
                if already_in {
                    exclusions.push(ExclusionDto {
                        group_id: links.group.id,
                        schedule_id: Some(*sid),
                        reason: "DuplicateCheckin".to_string(),
                    });
                    continue;
                }
                for lid in links.location_ids.iter().filter(|l| scope.allows(**l)) {
                    let Some(location) = locations.get(lid) else {
                        continue;
                    };
                    available_options.push(option_for(conn, &links.group, sched.id, &sched.name, location, date)?);
                }
            }
        }

        members.push(MemberOpportunitiesDto {
            person_id: person.id,
            display_name: person.display_name(),
            current_attendance: open.iter().map(attendance_dto).collect::<Result<_, _>>()?,
            available_options,
            exclusions,
        });
    }
    Ok(FamilyOpportunitiesDto {
        family_id,
        members,
    })
}

fn option_for(
    conn: &mut SqliteConnection,
    group: &Group,
    schedule_id: i32,
    schedule_name: &str,
    location: &Location,
    date: NaiveDate,
) -> Result<CheckinOptionDto, CheckinError> {
    let headcount = queries::headcount(conn, location.id, schedule_id, date)?;
    let capacity_status = RoomLimits::from(location).status(headcount);
    // Advisory only; the commit resolves again under the write lock
    let routed_location_id = if capacity_status == CapacityStatus::Full {
        let mut rooms = DbRooms {
            conn: &mut *conn,
            schedule_id,
            date,
        };
        capacity::resolve(&mut rooms, location.id)
            .ok()
            .map(|p| p.location_id)
            .filter(|l| *l != location.id)
    } else {
        None
    };
    Ok(CheckinOptionDto {
        group_id: group.id,
        group_name: group.name.clone(),
        location_id: location.id,
        location_name: location.name.clone(),
        schedule_id,
        schedule_name: schedule_name.to_string(),
        occurrence_date: date,
        capacity_status,
        headcount,
        routed_location_id,
    })
}

struct CommitCtx<'a> {
    scope: &'a LocationScope,
    device_id: Option<&'a str>,
    codes: &'a CodeConfig,
    tz: Tz,
    now: DateTime<Utc>,
}

/// Loads and cross-checks the rows a selection names.
fn load_selection(
    conn: &mut SqliteConnection,
    person_id: i32,
    group_id: i32,
    schedule_id: i32,
    location_id: i32,
) -> Result<(Person, GroupLinks, Schedule), CheckinError> {
    let person = queries::person(conn, person_id)?
        .ok_or_else(|| CheckinError::not_found("person", person_id))?;
    let links = queries::group_links(conn, group_id)?
        .ok_or_else(|| CheckinError::not_found("group", group_id))?;
    let sched = queries::schedule(conn, schedule_id)?
        .ok_or_else(|| CheckinError::not_found("schedule", schedule_id))?;
    if queries::location(conn, location_id)?.is_none() {
        return Err(CheckinError::not_found("location", location_id));
    }
    if !links.serves(schedule_id, location_id) {
        return Err(CheckinError::InvalidSelection(format!(
            "group {group_id} does not meet in location {location_id} on schedule {schedule_id}"
        )));
    }
    Ok((person, links, sched))
}

fn commit_selection(
    conn: &mut SqliteConnection,
    sel: &CheckinSelectionDto,
    ctx: &CommitCtx<'_>,
) -> Result<Committed, CheckinError> {
    let (person, links, sched) =
        load_selection(conn, sel.person_id, sel.group_id, sel.schedule_id, sel.location_id)?;
    if !ctx.scope.allows(sel.location_id) {
        return Err(CheckinError::LocationNotServed {
            location_id: sel.location_id,
        });
    }

    let today = ctx.now.with_timezone(&ctx.tz).date_naive();
    let reason = eligibility::evaluate(&facts(&person), &bounds(&links.group), today);
    if !reason.is_eligible() {
        return Err(CheckinError::IneligibleForGroup(reason));
    }
    let window = ScheduleSpec::from(&sched).evaluate(ctx.now, ctx.tz);
    let date = match window.occurrence_date {
        Some(d) if window.is_open => d,
        _ => return Err(CheckinError::ScheduleWindowClosed),
    };

    if queries::has_open_attendance_for(conn, person.id, links.group.id, sched.id, date)? {
        return Err(CheckinError::DuplicateCheckin);
    }

    // Headcount is read under the write lock taken by BEGIN IMMEDIATE
    let placement = capacity::resolve(
        &mut DbRooms {
            conn: &mut *conn,
            schedule_id: sched.id,
            date,
        },
        sel.location_id,
    )?;
    if !ctx.scope.allows(placement.location_id) {
        return Err(CheckinError::LocationNotServed {
            location_id: placement.location_id,
        });
    }
    let occurrence = get_or_create_occurrence(conn, links.group.id, placement.location_id, sched.id, date)?;
    let is_first_time = !queries::has_attended_before(conn, person.id)?;

    let issued_at = ctx.now.naive_utc();
    let code = codes::issue(
        &mut DbCodes {
            conn: &mut *conn,
            issued_at,
        },
        ctx.codes,
        today,
        &mut rand::thread_rng(),
    )?;

    // An RSVP for another room of this slot follows the child to the placement
    let existing = queries::scheduled_in_slot(conn, person.id, links.group.id, sched.id, date)?;
    let attendance_id = match existing {
        Some(scheduled) => {
            attendance::next_state(AttendanceState::Scheduled, Transition::CheckIn)?;
            let rsvp = sel.rsvp.map(Rsvp::as_str).unwrap_or(scheduled.rsvp.as_str());
            let upd = CheckInUpdate {
                occurrence_id: occurrence.id,
                attendance_code_id: code.id,
                device_id: ctx.device_id,
                start_date_time: issued_at,
                is_first_time,
                rsvp,
            };
            let n = queries::check_in_scheduled(
                conn,
                scheduled.id,
                attendance::sources(Transition::CheckIn),
                &upd,
            )?;
            if n == 0 {
                return Err(CheckinError::InvalidTransition {
                    from: AttendanceState::Scheduled,
                    action: Transition::CheckIn.as_str(),
                });
            }
            debug!(attendance_id = scheduled.id, "checkin: converted rsvp record");
            scheduled.id
        }
        None => queries::insert_attendance(
            conn,
            &NewAttendance {
                occurrence_id: occurrence.id,
                person_id: person.id,
                attendance_code_id: Some(code.id),
                device_id: ctx.device_id,
                state: AttendanceState::CheckedIn.as_str(),
                rsvp: sel.rsvp.unwrap_or_default().as_str(),
                start_date_time: issued_at,
                did_attend: None,
                is_first_time,
                decline_reason: None,
            },
        )?,
    };

    Ok(Committed {
        attendance_id,
        security_code: code.code,
        location_id: placement.location_id,
        overflowed_from: placement.overflowed_from,
    })
}

/// Get-or-create under the occurrence tuple's unique index. A lost insert
/// race reuses the winner's row.
fn get_or_create_occurrence(
    conn: &mut SqliteConnection,
    group_id: i32,
    location_id: i32,
    schedule_id: i32,
    date: NaiveDate,
) -> Result<Occurrence, CheckinError> {
    for attempt in 1..=OCCURRENCE_ATTEMPTS {
        if let Some(o) = queries::find_occurrence(conn, group_id, location_id, schedule_id, date)? {
            return Ok(o);
        }
        let inserted = queries::insert_occurrence_if_absent(
            conn,
            &NewOccurrence {
                group_id,
                location_id,
                schedule_id,
                occurrence_date: date,
                sunday_date: schedule::sunday_date(date),
            },
        )?;
        if inserted == 0 {
            debug!(attempt, group_id, location_id, schedule_id, %date, "checkin: occurrence created concurrently, reusing");
        }
    }
    warn!(group_id, location_id, schedule_id, %date, "checkin: occurrence get-or-create exhausted");
    Err(CheckinError::OccurrenceConflict)
}

fn close_with_log(
    conn: &mut SqliteConnection,
    attendance_id: i32,
    verdict: &PickupVerdict,
    by: Option<i32>,
    now: DateTime<Utc>,
) -> Result<CheckoutResp, CheckinError> {
    let a = queries::attendance(conn, attendance_id)?
        .ok_or_else(|| CheckinError::not_found("attendance", attendance_id))?;
    if a.person_id != verdict.child_person_id() {
        return Err(CheckinError::InvalidSelection(format!(
            "pickup verdict is for person {}, attendance {attendance_id} belongs to person {}",
            verdict.child_person_id(),
            a.person_id
        )));
    }
    let from: AttendanceState = a.state.parse()?;
    attendance::next_state(from, Transition::CheckOut)?;

    let at = now.naive_utc();
    let log = match verdict {
        PickupVerdict::Authorized(grant) => NewPickupLog {
            attendance_id,
            child_person_id: a.person_id,
            pickup_person_id: grant.presenting().person_id,
            pickup_name: grant.presenting().name.as_deref(),
            was_authorized: true,
            supervisor_override: false,
            supervisor_person_id: None,
            supervisor_username: None,
            checkout_at: at,
        },
        PickupVerdict::Override(o) => NewPickupLog {
            attendance_id,
            child_person_id: a.person_id,
            pickup_person_id: o.presenting().person_id,
            pickup_name: o.presenting().name.as_deref(),
            was_authorized: false,
            supervisor_override: true,
            supervisor_person_id: o.supervisor_person_id(),
            supervisor_username: Some(o.supervisor_username()),
            checkout_at: at,
        },
        PickupVerdict::Unauthorized { reason, .. } => {
            return Err(CheckinError::PickupUnauthorized(reason.clone()));
        }
    };

    let sources = attendance::sources(Transition::CheckOut);
    if queries::close_attendance(conn, attendance_id, sources, at, by)? == 0 {
        return Err(CheckinError::InvalidTransition {
            from: AttendanceState::CheckedOut,
            action: Transition::CheckOut.as_str(),
        });
    }
    queries::insert_pickup_log(conn, &log)?;
    Ok(CheckoutResp {
        success: true,
        attendance_id,
        verdict: verdict.kind(),
        checked_out_at: Some(now),
        reason: verdict.reason().map(str::to_string),
    })
}

fn apply_rsvp(
    conn: &mut SqliteConnection,
    req: &RsvpReq,
    device_id: Option<&str>,
    at: NaiveDateTime,
) -> Result<RsvpResp, CheckinError> {
    if req.response == Rsvp::Unknown {
        return Err(CheckinError::InvalidSelection(
            "rsvp response must be yes, maybe or no".to_string(),
        ));
    }
    let (person, links, sched) =
        load_selection(conn, req.person_id, req.group_id, req.schedule_id, req.location_id)?;
    let occurrence = get_or_create_occurrence(
        conn,
        links.group.id,
        req.location_id,
        sched.id,
        req.occurrence_date,
    )?;
    let declining = req.response == Rsvp::No;

    if let Some(existing) = queries::attendance_on(conn, occurrence.id, person.id)? {
        let from: AttendanceState = existing.state.parse()?;
        let (state, n) = if declining {
            let to = attendance::next_state(from, Transition::Decline)?;
            let sources = attendance::sources(Transition::Decline);
            (to, queries::decline(conn, existing.id, sources, req.decline_reason.as_deref())?)
        } else if from == AttendanceState::Scheduled {
            let n = queries::set_rsvp(conn, existing.id, &[AttendanceState::Scheduled], req.response.as_str())?;
            (from, n)
        } else {
            (from, 0)
        };
        if n == 0 {
            return Err(CheckinError::InvalidTransition { from, action: "rsvp" });
        }
        return Ok(RsvpResp {
            attendance_id: existing.id,
            state,
        });
    }

    let state = if declining {
        AttendanceState::Declined
    } else {
        AttendanceState::Scheduled
    };
    let attendance_id = queries::insert_attendance(
        conn,
        &NewAttendance {
            occurrence_id: occurrence.id,
            person_id: person.id,
            attendance_code_id: None,
            device_id,
            state: state.as_str(),
            rsvp: req.response.as_str(),
            start_date_time: at,
            did_attend: declining.then_some(false),
            is_first_time: false,
            decline_reason: req.decline_reason.as_deref().filter(|_| declining),
        },
    )?;
    Ok(RsvpResp {
        attendance_id,
        state,
    })
}
