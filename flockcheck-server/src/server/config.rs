use crate::checkin::codes::{CodeAlphabet, CodeConfig};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use serde::Deserialize;
use std::collections::HashSet;
use std::{env, fs, path::Path};

pub use flockcheck_shared::auth::Role;
use flockcheck_shared::domain::AuthorizationLevel;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub jwt_secret: String,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub checkin: CheckinConfig,
    #[serde(default)]
    pub directory: DirectoryConfig,
    pub dev_cors_origin: Option<String>,
    pub listen_port: Option<u16>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password_hash: String, // bcrypt hash
    pub role: Role,
    /// Person record of the volunteer/supervisor, recorded on presence,
    /// checkout and override entries.
    pub person_id: Option<i32>,
}

/// A check-in kiosk. An empty `location_ids` list serves every room.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location_ids: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckinConfig {
    pub code_length: usize,
    pub code_alphabet: CodeAlphabet,
    pub max_code_attempts: u32,
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            code_length: 3,
            code_alphabet: CodeAlphabet::Alphanumeric,
            max_code_attempts: 20,
        }
    }
}

impl CheckinConfig {
    pub fn code_config(&self) -> CodeConfig {
        CodeConfig {
            length: self.code_length,
            alphabet: self.code_alphabet,
            max_attempts: self.max_code_attempts,
        }
    }
}

/// Externally administered records, upserted into the store at startup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub families: Vec<FamilyRecord>,
    pub people: Vec<PersonRecord>,
    pub locations: Vec<LocationRecord>,
    pub schedules: Vec<ScheduleRecord>,
    pub groups: Vec<GroupRecord>,
    pub authorized_pickups: Vec<AuthorizedPickupRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FamilyRecord {
    pub id: i32,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonRecord {
    pub id: i32,
    pub family_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub birth_date: Option<NaiveDate>,
    pub grade: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationRecord {
    pub id: i32,
    pub name: String,
    pub parent_location_id: Option<i32>,
    pub soft_room_threshold: Option<i32>,
    pub firm_room_threshold: Option<i32>,
    pub overflow_location_id: Option<i32>,
    #[serde(default)]
    pub auto_assign_overflow: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleRecord {
    pub id: i32,
    pub name: String,
    /// 0 = Sunday .. 6 = Saturday
    pub weekly_day_of_week: Option<i32>,
    pub specific_date: Option<NaiveDate>,
    pub time_of_day: NaiveTime,
    #[serde(default)]
    pub check_in_start_offset_minutes: i32,
    pub check_in_end_offset_minutes: Option<i32>,
    pub effective_start_date: Option<NaiveDate>,
    pub effective_end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GroupRecord {
    pub id: i32,
    pub name: String,
    pub min_age_months: Option<i32>,
    pub max_age_months: Option<i32>,
    pub min_grade: Option<i32>,
    pub max_grade: Option<i32>,
    #[serde(default)]
    pub schedule_ids: Vec<i32>,
    #[serde(default)]
    pub location_ids: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedPickupRecord {
    pub id: i32,
    pub child_person_id: i32,
    pub authorized_person_id: Option<i32>,
    pub authorized_name: Option<String>,
    pub relationship: String,
    pub authorization_level: AuthorizationLevel,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
        Self::load_from_path(path)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path)?;
        let cfg: AppConfig = serde_yaml::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.jwt_secret.trim().is_empty() {
            return invalid("jwt_secret must not be empty".into());
        }
        if self.timezone.parse::<Tz>().is_err() {
            return invalid(format!("unknown timezone: {}", self.timezone));
        }
        if !(1..=10).contains(&self.checkin.code_length) {
            return invalid(format!(
                "checkin.code_length must be within 1..=10, got {}",
                self.checkin.code_length
            ));
        }
        if self.checkin.max_code_attempts == 0 {
            return invalid("checkin.max_code_attempts must be at least 1".into());
        }
        let mut seen = HashSet::new();
        for d in &self.devices {
            if !seen.insert(d.id.as_str()) {
                return invalid(format!("duplicate device id: {}", d.id));
            }
        }
        for s in &self.directory.schedules {
            if s.weekly_day_of_week.is_none() && s.specific_date.is_none() {
                return invalid(format!(
                    "schedule {} needs weekly_day_of_week or specific_date",
                    s.id
                ));
            }
            if let Some(day) = s.weekly_day_of_week
                && !(0..=6).contains(&day)
            {
                return invalid(format!("schedule {}: weekly_day_of_week {day} out of range", s.id));
            }
        }
        for p in &self.directory.authorized_pickups {
            if p.authorized_person_id.is_none() && p.authorized_name.is_none() {
                return invalid(format!(
                    "authorized pickup {} needs a person id or a name",
                    p.id
                ));
            }
        }
        Ok(())
    }

    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or(Tz::UTC)
    }

    pub fn device(&self, id: &str) -> Option<&DeviceConfig> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn user(&self, username: &str) -> Option<&UserConfig> {
        self.users.iter().find(|u| u.username == username)
    }
}
