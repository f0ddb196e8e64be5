#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use flockcheck_server::audit::AuditTrail;
use flockcheck_server::checkin::codes::{CodeAlphabet, CodeConfig};
use flockcheck_server::checkin::{Actor, CheckinService, LocationScope};
use flockcheck_server::server::{
    AuthorizedPickupRecord, DirectoryConfig, FamilyRecord, GroupRecord, LocationRecord,
    PersonRecord, Role, ScheduleRecord,
};
use flockcheck_server::storage::Store;
use flockcheck_server::storage::models::AuditEntry;
use flockcheck_shared::api::CheckinSelectionDto;
use flockcheck_shared::domain::AuthorizationLevel;

pub const RIVERA: i32 = 1;
pub const CHEN: i32 = 2;
pub const GUESTS: i32 = 3;

pub const MIA: i32 = 10;
pub const LEO: i32 = 11;
pub const ANA: i32 = 12;
pub const SAM: i32 = 13;
pub const IVY: i32 = 20;
pub const KAI: i32 = 21;

pub const TODDLER_ROOM: i32 = 1;
pub const TODDLER_OVERFLOW: i32 = 2;
pub const ELEMENTARY_ROOM: i32 = 3;
pub const LOOP_A: i32 = 4;
pub const LOOP_B: i32 = 5;
/// Soft 10, firm 12, no overflow.
pub const HALL: i32 = 6;
/// Firm 20.
pub const ANNEX: i32 = 7;

/// Members of the guest family, ids `100..100 + GUEST_COUNT`.
pub const GUEST_COUNT: i32 = 16;

pub fn guest(n: i32) -> i32 {
    100 + n
}

pub const SUNDAY: i32 = 1;
pub const WEDNESDAY: i32 = 2;

pub const TODDLERS: i32 = 1;
pub const ELEMENTARY: i32 = 2;
pub const EVERYONE: i32 = 3;

/// Sunday 2024-06-02 14:00 UTC, inside the Sunday check-in window.
pub fn sunday_morning() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 2, 14, 0, 0).unwrap()
}

pub fn service_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 2).unwrap()
}

fn d(y: i32, m: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, day)
}

fn person(id: i32, family_id: i32, first: &str, birth: Option<NaiveDate>, grade: Option<i32>) -> PersonRecord {
    PersonRecord {
        id,
        family_id,
        first_name: first.into(),
        last_name: match family_id {
            RIVERA => "Rivera",
            CHEN => "Chen",
            _ => "Guest",
        }
        .into(),
        birth_date: birth,
        grade,
    }
}

fn room(id: i32, name: &str, soft: Option<i32>, firm: Option<i32>, overflow: Option<i32>) -> LocationRecord {
    LocationRecord {
        id,
        name: name.into(),
        parent_location_id: None,
        soft_room_threshold: soft,
        firm_room_threshold: firm,
        overflow_location_id: overflow,
        auto_assign_overflow: overflow.is_some(),
    }
}

/// Weekly schedule; `day` counts from Sunday = 0.
pub fn weekly(id: i32, name: &str, day: i32, at: NaiveTime) -> ScheduleRecord {
    ScheduleRecord {
        id,
        name: name.into(),
        weekly_day_of_week: Some(day),
        specific_date: None,
        time_of_day: at,
        check_in_start_offset_minutes: 60,
        check_in_end_offset_minutes: Some(30),
        effective_start_date: None,
        effective_end_date: None,
    }
}

pub fn directory_with(sunday: ScheduleRecord) -> DirectoryConfig {
    DirectoryConfig {
        families: vec![
            FamilyRecord {
                id: RIVERA,
                name: "Rivera".into(),
            },
            FamilyRecord {
                id: CHEN,
                name: "Chen".into(),
            },
            FamilyRecord {
                id: GUESTS,
                name: "Guests".into(),
            },
        ],
        people: vec![
            person(MIA, RIVERA, "Mia", d(2021, 3, 1), None),
            person(LEO, RIVERA, "Leo", d(2016, 5, 1), Some(2)),
            person(ANA, RIVERA, "Ana", d(1990, 7, 4), None),
            person(SAM, RIVERA, "Sam", d(2021, 8, 1), None),
            person(IVY, CHEN, "Ivy", d(2021, 5, 1), None),
            person(KAI, CHEN, "Kai", d(2022, 1, 1), None),
        ]
        .into_iter()
        .chain((0..GUEST_COUNT).map(|n| person(guest(n), GUESTS, &format!("Guest{n}"), None, None)))
        .collect(),
        locations: vec![
            room(TODDLER_ROOM, "Toddlers", Some(1), Some(2), Some(TODDLER_OVERFLOW)),
            room(TODDLER_OVERFLOW, "Toddler Overflow", None, Some(10), None),
            room(ELEMENTARY_ROOM, "Elementary", None, None, None),
            room(LOOP_A, "Loop A", None, Some(1), Some(LOOP_B)),
            room(LOOP_B, "Loop B", None, Some(1), Some(LOOP_A)),
            room(HALL, "Hall", Some(10), Some(12), None),
            room(ANNEX, "Annex", None, Some(20), None),
        ],
        schedules: vec![
            sunday,
            weekly(
                WEDNESDAY,
                "Wednesday Night",
                3,
                NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            ),
        ],
        groups: vec![
            GroupRecord {
                id: TODDLERS,
                name: "Toddlers".into(),
                min_age_months: Some(24),
                max_age_months: Some(47),
                min_grade: None,
                max_grade: None,
                schedule_ids: vec![SUNDAY, WEDNESDAY],
                location_ids: vec![TODDLER_ROOM, TODDLER_OVERFLOW],
            },
            GroupRecord {
                id: ELEMENTARY,
                name: "Elementary".into(),
                min_age_months: None,
                max_age_months: None,
                min_grade: Some(1),
                max_grade: Some(5),
                schedule_ids: vec![SUNDAY],
                location_ids: vec![ELEMENTARY_ROOM],
            },
            GroupRecord {
                id: EVERYONE,
                name: "Everyone".into(),
                min_age_months: None,
                max_age_months: None,
                min_grade: None,
                max_grade: None,
                schedule_ids: vec![SUNDAY],
                location_ids: vec![LOOP_A, LOOP_B, HALL, ANNEX],
            },
        ],
        authorized_pickups: vec![
            AuthorizedPickupRecord {
                id: 1,
                child_person_id: MIA,
                authorized_person_id: Some(ANA),
                authorized_name: None,
                relationship: "Mother".into(),
                authorization_level: AuthorizationLevel::Always,
                is_active: true,
            },
            AuthorizedPickupRecord {
                id: 2,
                child_person_id: MIA,
                authorized_person_id: None,
                authorized_name: Some("Gran Rivera".into()),
                relationship: "Grandmother".into(),
                authorization_level: AuthorizationLevel::Restricted,
                is_active: true,
            },
        ],
    }
}

/// Directory whose Sunday service opens at [`sunday_morning`].
pub fn directory() -> DirectoryConfig {
    directory_with(weekly(
        SUNDAY,
        "Sunday 9:30",
        0,
        NaiveTime::from_hms_opt(14, 30, 0).unwrap(),
    ))
}

pub struct Harness {
    pub store: Store,
    pub service: CheckinService,
    _dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checkin.db");
        let store = Store::connect_sqlite(path.to_str().unwrap()).await.expect("db");
        store.seed_from_config(&directory()).await.expect("seed");
        let (audit, _worker) = AuditTrail::spawn(store.clone());
        let codes = CodeConfig {
            length: 3,
            alphabet: CodeAlphabet::Alphanumeric,
            max_attempts: 20,
        };
        let service = CheckinService::new(store.clone(), codes, Tz::UTC, audit);
        Self {
            store,
            service,
            _dir: dir,
        }
    }

    /// Polls the audit log until an entry with `verdict` shows up.
    pub async fn wait_for_audit(&self, verdict: &str) -> AuditEntry {
        for _ in 0..100 {
            let entries = self.store.list_audit(50).await.expect("audit");
            if let Some(e) = entries.into_iter().find(|e| e.verdict == verdict) {
                return e;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("no audit entry with verdict {verdict}");
    }
}

pub fn actor(role: Role) -> Actor {
    Actor {
        username: format!("{role:?}").to_lowercase(),
        role,
        person_id: (role != Role::Kiosk).then_some(ANA),
        device_id: (role == Role::Kiosk).then(|| "lobby-1".to_string()),
        scope: LocationScope::All,
    }
}

pub fn select(person_id: i32, group_id: i32, location_id: i32) -> CheckinSelectionDto {
    CheckinSelectionDto {
        person_id,
        group_id,
        location_id,
        schedule_id: SUNDAY,
        rsvp: None,
    }
}
