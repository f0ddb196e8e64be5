pub mod models;
pub mod queries;
pub mod schema;

use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use models::{
    AuditEntry, AuthorizedPickup, Family, Group, Location, NewAuditEntry, NewSession, Person,
    Schedule,
};
use tracing::{debug, info};

use crate::server::DirectoryConfig;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A Diesel ORM error (query failure, constraint violation, etc.)
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(String),
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let manager = ConnectionManager::<SqliteConnection>::new(path);
        let pool = Pool::builder().max_size(8).build(manager)?;

        const MIGRATIONS: EmbeddedMigrations = embed_migrations!();
        let store = Store { pool };
        store
            .with_conn(|conn| -> Result<(), StorageError> {
                conn.run_pending_migrations(MIGRATIONS)
                    .map_err(|e| StorageError::Migration(e.to_string()))?;
                Ok(())
            })
            .await?;
        info!(path, "storage: sqlite ready");
        Ok(store)
    }

    /// Runs blocking diesel work on a pooled connection off the async runtime.
    pub async fn with_conn<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, E> {
            let mut conn = pool.get().map_err(StorageError::from)?;
            configure_sqlite_conn(&mut conn).map_err(StorageError::from)?;
            f(&mut conn)
        })
        .await
        .map_err(StorageError::from)?
    }

    /// Upserts the externally administered directory. Group links are
    /// replaced wholesale so removed links disappear on the next start, and
    /// pickup rules missing from the config are deactivated.
    pub async fn seed_from_config(&self, dir: &DirectoryConfig) -> Result<(), StorageError> {
        use schema::{
            authorized_pickups, families, group_locations, group_schedules, locations,
            ministry_groups, people, schedules,
        };

        debug!(
            families = dir.families.len(),
            people = dir.people.len(),
            groups = dir.groups.len(),
            locations = dir.locations.len(),
            "storage: seeding directory"
        );
        let dir = dir.clone();
        self.with_conn(move |conn| {
            conn.immediate_transaction(|conn| -> Result<(), StorageError> {
                for f in &dir.families {
                    let row = Family {
                        id: f.id,
                        name: f.name.clone(),
                    };
                    diesel::insert_into(families::table)
                        .values(&row)
                        .on_conflict(families::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }

                for p in &dir.people {
                    let row = Person {
                        id: p.id,
                        family_id: p.family_id,
                        first_name: p.first_name.clone(),
                        last_name: p.last_name.clone(),
                        birth_date: p.birth_date,
                        grade: p.grade,
                    };
                    diesel::insert_into(people::table)
                        .values(&row)
                        .on_conflict(people::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }

                for l in &dir.locations {
                    let row = Location {
                        id: l.id,
                        name: l.name.clone(),
                        parent_location_id: l.parent_location_id,
                        soft_room_threshold: l.soft_room_threshold,
                        firm_room_threshold: l.firm_room_threshold,
                        overflow_location_id: l.overflow_location_id,
                        auto_assign_overflow: l.auto_assign_overflow,
                    };
                    diesel::insert_into(locations::table)
                        .values(&row)
                        .on_conflict(locations::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }

                for s in &dir.schedules {
                    let row = Schedule {
                        id: s.id,
                        name: s.name.clone(),
                        weekly_day_of_week: s.weekly_day_of_week,
                        specific_date: s.specific_date,
                        weekly_time_of_day: s.time_of_day,
                        check_in_start_offset_minutes: s.check_in_start_offset_minutes,
                        check_in_end_offset_minutes: s.check_in_end_offset_minutes,
                        effective_start_date: s.effective_start_date,
                        effective_end_date: s.effective_end_date,
                    };
                    diesel::insert_into(schedules::table)
                        .values(&row)
                        .on_conflict(schedules::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }

                for g in &dir.groups {
                    let row = Group {
                        id: g.id,
                        name: g.name.clone(),
                        min_age_months: g.min_age_months,
                        max_age_months: g.max_age_months,
                        min_grade: g.min_grade,
                        max_grade: g.max_grade,
                    };
                    diesel::insert_into(ministry_groups::table)
                        .values(&row)
                        .on_conflict(ministry_groups::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;

                    diesel::delete(group_schedules::table.filter(group_schedules::group_id.eq(g.id)))
                        .execute(conn)?;
                    let links: Vec<_> = g
                        .schedule_ids
                        .iter()
                        .map(|sid| {
                            (
                                group_schedules::group_id.eq(g.id),
                                group_schedules::schedule_id.eq(*sid),
                            )
                        })
                        .collect();
                    if !links.is_empty() {
                        diesel::insert_into(group_schedules::table)
                            .values(&links)
                            .execute(conn)?;
                    }

                    diesel::delete(group_locations::table.filter(group_locations::group_id.eq(g.id)))
                        .execute(conn)?;
                    let links: Vec<_> = g
                        .location_ids
                        .iter()
                        .map(|lid| {
                            (
                                group_locations::group_id.eq(g.id),
                                group_locations::location_id.eq(*lid),
                            )
                        })
                        .collect();
                    if !links.is_empty() {
                        diesel::insert_into(group_locations::table)
                            .values(&links)
                            .execute(conn)?;
                    }
                }

                for a in &dir.authorized_pickups {
                    let row = AuthorizedPickup {
                        id: a.id,
                        child_person_id: a.child_person_id,
                        authorized_person_id: a.authorized_person_id,
                        authorized_name: a.authorized_name.clone(),
                        relationship: a.relationship.clone(),
                        authorization_level: a.authorization_level.as_str().to_string(),
                        is_active: a.is_active,
                    };
                    diesel::insert_into(authorized_pickups::table)
                        .values(&row)
                        .on_conflict(authorized_pickups::id)
                        .do_update()
                        .set(&row)
                        .execute(conn)?;
                }

                // Rules dropped from the config lose their effect; rows stay for pickup history
                let listed: Vec<i32> = dir.authorized_pickups.iter().map(|a| a.id).collect();
                let revoked = diesel::update(
                    authorized_pickups::table
                        .filter(authorized_pickups::id.ne_all(listed))
                        .filter(authorized_pickups::is_active.eq(true)),
                )
                .set(authorized_pickups::is_active.eq(false))
                .execute(conn)?;
                if revoked > 0 {
                    info!(revoked, "seed: deactivated pickup rules no longer in config");
                }
                Ok(())
            })
        })
        .await
    }

    pub async fn append_audit(
        &self,
        event: String,
        actor: String,
        subject: String,
        verdict: String,
        details: String,
        recorded_at: NaiveDateTime,
    ) -> Result<(), StorageError> {
        use schema::audit_log;
        self.with_conn(move |conn| -> Result<(), StorageError> {
            let row = NewAuditEntry {
                event: &event,
                actor: &actor,
                subject: &subject,
                verdict: &verdict,
                details: &details,
                recorded_at,
            };
            diesel::insert_into(audit_log::table)
                .values(&row)
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Most recent audit entries first.
    pub async fn list_audit(&self, limit: i64) -> Result<Vec<AuditEntry>, StorageError> {
        use schema::audit_log::dsl::*;
        self.with_conn(move |conn| -> Result<Vec<AuditEntry>, StorageError> {
            Ok(audit_log
                .order(id.desc())
                .limit(limit)
                .select(AuditEntry::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn create_session(&self, jti_: &str, username_: &str) -> Result<(), StorageError> {
        use schema::sessions::dsl::*;
        let j = jti_.to_string();
        let u = username_.to_string();
        self.with_conn(move |conn| -> Result<(), StorageError> {
            diesel::insert_into(sessions)
                .values(&NewSession {
                    jti: &j,
                    username: &u,
                })
                .execute(conn)?;
            Ok(())
        })
        .await
    }

    /// Bumps `last_used_at` unless the session went idle before `cutoff`.
    /// Returns false for missing or idle sessions.
    pub async fn touch_session_with_cutoff(
        &self,
        jti_: &str,
        cutoff: NaiveDateTime,
    ) -> Result<bool, StorageError> {
        use schema::sessions::dsl::*;
        let j = jti_.to_string();
        self.with_conn(move |conn| -> Result<bool, StorageError> {
            let now = Utc::now().naive_utc();
            let updated =
                diesel::update(sessions.filter(jti.eq(&j)).filter(last_used_at.ge(cutoff)))
                    .set(last_used_at.eq(now))
                    .execute(conn)?;
            Ok(updated > 0)
        })
        .await
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Set first so the remaining pragmas wait on a held write lock too
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    // WAL lets kiosks read while a check-in holds the write lock
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    Ok(())
}
