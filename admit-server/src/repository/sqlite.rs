//! SQLite implementation of `AdmissionsRepository`.
//!
//! Uses `tokio::task::spawn_blocking` to run synchronous rusqlite
//! operations without blocking the async runtime. The application form is
//! persisted as a JSON column; identity and lifecycle fields get real
//! columns so guards and uniqueness live at the storage layer.
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table tracking the schema version.
//! When the schema changes, increment `CURRENT_SCHEMA_VERSION` and add a
//! migration in `run_migrations()`. Migrations run sequentially from the
//! current version to the target version.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use admit_core::{ApplicationForm, Decision, Role, Status, UserId};

use super::{
    AdmissionsRepository, ReleaseOutcome, RepositoryError, Settings, StagedDecision, UserRecord,
};

/// Current schema version. Increment when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed admissions repository.
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open or create the database at the given path and run migrations.
    ///
    /// The database is configured with `journal_mode = WAL` and a busy
    /// timeout so concurrent request handlers don't trip over each other.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, RepositoryError> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| RepositoryError::storage("open database", e.to_string()))?;

        // In-memory databases report journal_mode "memory"; that's fine.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| RepositoryError::storage("set journal_mode", e.to_string()))?;
        if !journal_mode.eq_ignore_ascii_case("wal") && !journal_mode.eq_ignore_ascii_case("memory")
        {
            return Err(RepositoryError::storage(
                "configure journal_mode",
                format!("expected 'wal', SQLite returned '{}'", journal_mode),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            "#,
        )
        .map_err(|e| RepositoryError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| RepositoryError::storage("create schema_version table", e.to_string()))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| RepositoryError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database for tests.
    pub fn new_in_memory() -> Result<Self, RepositoryError> {
        Self::new(":memory:")
    }

    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), RepositoryError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(RepositoryError::storage(
                "schema version",
                format!(
                    "database schema version {} is newer than supported version {}; \
                     please upgrade the application",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version < 1 {
            let default = Settings::default();
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL UNIQUE,
                    credential_hash TEXT NOT NULL UNIQUE,
                    role TEXT NOT NULL DEFAULT 'hacker' CHECK(role IN (
                        'hacker', 'organizer', 'admin'
                    )),
                    status TEXT NOT NULL DEFAULT 'created' CHECK(status IN (
                        'created', 'verified', 'applied', 'accepted',
                        'rejected', 'waitlisted', 'confirmed', 'declined'
                    )),
                    application_json TEXT NOT NULL DEFAULT '{}'
                );

                CREATE TABLE IF NOT EXISTS staged_decisions (
                    user_id INTEGER PRIMARY KEY
                        REFERENCES users(id) ON DELETE CASCADE,
                    decision TEXT NOT NULL CHECK(decision IN (
                        'accepted', 'rejected', 'waitlisted'
                    ))
                );

                CREATE TABLE IF NOT EXISTS scan_counts (
                    user_id INTEGER NOT NULL
                        REFERENCES users(id) ON DELETE CASCADE,
                    action TEXT NOT NULL,
                    count INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (user_id, action)
                );

                CREATE TABLE IF NOT EXISTS settings (
                    id INTEGER PRIMARY KEY CHECK (id = 0),
                    application_open INTEGER NOT NULL,
                    confirm_by TEXT,
                    info TEXT NOT NULL,
                    rolling_admissions INTEGER NOT NULL,
                    acceptance_template TEXT NOT NULL
                );
                "#,
            )
            .map_err(|e| RepositoryError::storage("migration v1", e.to_string()))?;

            // Seed the singleton settings row; it is only ever updated after
            // this, never deleted.
            conn.execute(
                "INSERT OR IGNORE INTO settings
                     (id, application_open, confirm_by, info, rolling_admissions,
                      acceptance_template)
                 VALUES (0, ?1, NULL, ?2, ?3, ?4)",
                params![
                    default.application_open,
                    default.info,
                    default.rolling_admissions,
                    default.acceptance_template,
                ],
            )
            .map_err(|e| RepositoryError::storage("seed settings", e.to_string()))?;
        }

        conn.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = excluded.version",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| RepositoryError::storage("update schema version", e.to_string()))?;

        Ok(())
    }
}

/// Decode one `users` row. Column order: id, email, credential_hash, role,
/// status, application_json.
fn row_to_user(
    id: i64,
    email: String,
    credential_hash: String,
    role: String,
    status: String,
    application_json: String,
) -> Result<UserRecord, RepositoryError> {
    let role = Role::parse(&role).ok_or_else(|| RepositoryError::corruption("user role"))?;
    let status =
        Status::parse(&status).ok_or_else(|| RepositoryError::corruption("user status"))?;
    let application: ApplicationForm = serde_json::from_str(&application_json)
        .map_err(|_| RepositoryError::corruption("application JSON"))?;
    Ok(UserRecord {
        id: UserId(id),
        email,
        credential_hash,
        role,
        status,
        application,
    })
}

const USER_COLUMNS: &str = "id, email, credential_hash, role, status, application_json";

fn query_user(
    conn: &Connection,
    where_clause: &str,
    param: &dyn rusqlite::ToSql,
    operation: &str,
) -> Result<Option<UserRecord>, RepositoryError> {
    let sql = format!("SELECT {} FROM users WHERE {}", USER_COLUMNS, where_clause);
    let row: Option<(i64, String, String, String, String, String)> = conn
        .query_row(&sql, [param], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
                row.get(5)?,
            ))
        })
        .optional()
        .map_err(|e| RepositoryError::storage(operation, e.to_string()))?;

    row.map(|(id, email, hash, role, status, json)| {
        row_to_user(id, email, hash, role, status, json)
    })
    .transpose()
}

/// Render a status list as a SQL `IN` list. Status strings are a closed
/// vocabulary, so inlining them is safe.
fn status_in_list(expected: &[Status]) -> String {
    expected
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

#[async_trait]
impl AdmissionsRepository for SqliteRepository {
    async fn create_user(
        &self,
        email: &str,
        credential_hash: &str,
    ) -> Result<UserRecord, RepositoryError> {
        let conn = self.conn.clone();
        let email = email.to_string();
        let credential_hash = credential_hash.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO users (email, credential_hash) VALUES (?1, ?2)",
                params![email, credential_hash],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::conflict(format!("email {}", email))
                } else {
                    RepositoryError::storage("create_user", e.to_string())
                }
            })?;

            let id = conn.last_insert_rowid();
            Ok(UserRecord {
                id: UserId(id),
                email,
                credential_hash,
                role: Role::Hacker,
                status: Status::Created,
                application: ApplicationForm::default(),
            })
        })
        .await
        .map_err(|e| RepositoryError::storage("create_user", e.to_string()))?
    }

    async fn rotate_credential(
        &self,
        id: UserId,
        credential_hash: &str,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let credential_hash = credential_hash.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            conn.execute(
                "UPDATE users SET credential_hash = ?1 WHERE id = ?2",
                params![credential_hash, id.0],
            )
            .map_err(|e| RepositoryError::storage("rotate_credential", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("rotate_credential", e.to_string()))?
    }

    async fn user_by_id(&self, id: UserId) -> Result<Option<UserRecord>, RepositoryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            query_user(&conn, "id = ?1", &id.0, "user_by_id")
        })
        .await
        .map_err(|e| RepositoryError::storage("user_by_id", e.to_string()))?
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepositoryError> {
        let conn = self.conn.clone();
        let email = email.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            query_user(&conn, "email = ?1", &email, "user_by_email")
        })
        .await
        .map_err(|e| RepositoryError::storage("user_by_email", e.to_string()))?
    }

    async fn user_by_credential(
        &self,
        credential_hash: &str,
    ) -> Result<Option<UserRecord>, RepositoryError> {
        let conn = self.conn.clone();
        let hash = credential_hash.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            query_user(&conn, "credential_hash = ?1", &hash, "user_by_credential")
        })
        .await
        .map_err(|e| RepositoryError::storage("user_by_credential", e.to_string()))?
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<bool, RepositoryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            let changed = conn
                .execute(
                    "UPDATE users SET role = ?1 WHERE id = ?2",
                    params![role.as_str(), id.0],
                )
                .map_err(|e| RepositoryError::storage("set_role", e.to_string()))?;
            Ok(changed > 0)
        })
        .await
        .map_err(|e| RepositoryError::storage("set_role", e.to_string()))?
    }

    async fn update_status(
        &self,
        id: UserId,
        expected: &[Status],
        to: Status,
        discard_staged: bool,
    ) -> Result<bool, RepositoryError> {
        let conn = self.conn.clone();
        let guard = status_in_list(expected);

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("mutex poisoned");
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("update_status", e.to_string()))?;

            let changed = tx
                .execute(
                    &format!(
                        "UPDATE users SET status = ?1 WHERE id = ?2 AND status IN ({})",
                        guard
                    ),
                    params![to.as_str(), id.0],
                )
                .map_err(|e| RepositoryError::storage("update_status", e.to_string()))?;

            if changed > 0 && discard_staged {
                tx.execute(
                    "DELETE FROM staged_decisions WHERE user_id = ?1",
                    params![id.0],
                )
                .map_err(|e| RepositoryError::storage("update_status", e.to_string()))?;
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("update_status", e.to_string()))?;
            Ok(changed > 0)
        })
        .await
        .map_err(|e| RepositoryError::storage("update_status", e.to_string()))?
    }

    async fn save_application(
        &self,
        id: UserId,
        form: &ApplicationForm,
        expected: &[Status],
        to: Status,
    ) -> Result<bool, RepositoryError> {
        let conn = self.conn.clone();
        let guard = status_in_list(expected);
        let form_json = serde_json::to_string(form)
            .map_err(|e| RepositoryError::storage("serialize application", e.to_string()))?;

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("mutex poisoned");
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("save_application", e.to_string()))?;

            let changed = tx
                .execute(
                    &format!(
                        "UPDATE users SET application_json = ?1, status = ?2
                         WHERE id = ?3 AND status IN ({})",
                        guard
                    ),
                    params![form_json, to.as_str(), id.0],
                )
                .map_err(|e| RepositoryError::storage("save_application", e.to_string()))?;

            if changed > 0 {
                // Editing after staging discards the staged decision.
                tx.execute(
                    "DELETE FROM staged_decisions WHERE user_id = ?1",
                    params![id.0],
                )
                .map_err(|e| RepositoryError::storage("save_application", e.to_string()))?;
            }

            tx.commit()
                .map_err(|e| RepositoryError::storage("save_application", e.to_string()))?;
            Ok(changed > 0)
        })
        .await
        .map_err(|e| RepositoryError::storage("save_application", e.to_string()))?
    }

    async fn stage_decision(&self, id: UserId, decision: Decision) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO staged_decisions (user_id, decision) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET decision = excluded.decision",
                params![id.0, decision.as_str()],
            )
            .map_err(|e| RepositoryError::storage("stage_decision", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("stage_decision", e.to_string()))?
    }

    async fn staged_decisions(
        &self,
        ids: Option<&[UserId]>,
    ) -> Result<Vec<StagedDecision>, RepositoryError> {
        let conn = self.conn.clone();
        let ids: Option<Vec<i64>> = ids.map(|ids| ids.iter().map(|id| id.0).collect());

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            let sql = match &ids {
                Some(ids) => format!(
                    "SELECT user_id, decision FROM staged_decisions WHERE user_id IN ({})
                     ORDER BY user_id",
                    ids.iter()
                        .map(|id| id.to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                None => "SELECT user_id, decision FROM staged_decisions ORDER BY user_id"
                    .to_string(),
            };

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| RepositoryError::storage("staged_decisions", e.to_string()))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(|e| RepositoryError::storage("staged_decisions", e.to_string()))?;

            let mut results = Vec::new();
            for row in rows {
                let (user_id, decision) =
                    row.map_err(|e| RepositoryError::storage("staged_decisions", e.to_string()))?;
                let decision = Decision::parse(&decision)
                    .ok_or_else(|| RepositoryError::corruption("staged decision"))?;
                results.push(StagedDecision {
                    user_id: UserId(user_id),
                    decision,
                });
            }
            Ok(results)
        })
        .await
        .map_err(|e| RepositoryError::storage("staged_decisions", e.to_string()))?
    }

    async fn remove_staged(&self, ids: &[UserId]) -> Result<usize, RepositoryError> {
        let conn = self.conn.clone();
        let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();

        tokio::task::spawn_blocking(move || {
            if ids.is_empty() {
                return Ok(0);
            }
            let conn = conn.lock().expect("mutex poisoned");
            let sql = format!(
                "DELETE FROM staged_decisions WHERE user_id IN ({})",
                ids.iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            conn.execute(&sql, [])
                .map_err(|e| RepositoryError::storage("remove_staged", e.to_string()))
        })
        .await
        .map_err(|e| RepositoryError::storage("remove_staged", e.to_string()))?
    }

    async fn release_decision(
        &self,
        id: UserId,
        decision: Decision,
    ) -> Result<ReleaseOutcome, RepositoryError> {
        let conn = self.conn.clone();
        let new_status = decision.released_status();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().expect("mutex poisoned");
            let tx = conn
                .transaction()
                .map_err(|e| RepositoryError::storage("release_decision", e.to_string()))?;

            let deleted = tx
                .execute(
                    "DELETE FROM staged_decisions WHERE user_id = ?1",
                    params![id.0],
                )
                .map_err(|e| RepositoryError::storage("release_decision", e.to_string()))?;
            if deleted == 0 {
                tx.commit()
                    .map_err(|e| RepositoryError::storage("release_decision", e.to_string()))?;
                return Ok(ReleaseOutcome::NoDecision);
            }

            // Only move the status if the user still awaits a decision;
            // otherwise the staged row is cleaned up and nothing else changes.
            let moved = tx
                .execute(
                    "UPDATE users SET status = ?1
                     WHERE id = ?2 AND status IN ('applied', 'waitlisted')",
                    params![new_status.as_str(), id.0],
                )
                .map_err(|e| RepositoryError::storage("release_decision", e.to_string()))?;

            if moved == 0 {
                tx.commit()
                    .map_err(|e| RepositoryError::storage("release_decision", e.to_string()))?;
                return Ok(ReleaseOutcome::StatusMoved);
            }

            let (email, application_json): (String, String) = tx
                .query_row(
                    "SELECT email, application_json FROM users WHERE id = ?1",
                    params![id.0],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(|e| RepositoryError::storage("release_decision", e.to_string()))?;

            tx.commit()
                .map_err(|e| RepositoryError::storage("release_decision", e.to_string()))?;

            let application: ApplicationForm = serde_json::from_str(&application_json)
                .map_err(|_| RepositoryError::corruption("application JSON"))?;
            let greeting_name = application
                .preferred_name
                .as_deref()
                .or(application.name.as_deref())
                .unwrap_or(&email)
                .to_string();

            Ok(ReleaseOutcome::Applied {
                email,
                greeting_name,
                new_status,
            })
        })
        .await
        .map_err(|e| RepositoryError::storage("release_decision", e.to_string()))?
    }

    async fn increment_scan(&self, id: UserId, action: &str) -> Result<u64, RepositoryError> {
        let conn = self.conn.clone();
        let action = action.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            conn.query_row(
                "INSERT INTO scan_counts (user_id, action, count) VALUES (?1, ?2, 1)
                 ON CONFLICT(user_id, action) DO UPDATE SET count = count + 1
                 RETURNING count",
                params![id.0, action],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count as u64)
            .map_err(|e| RepositoryError::storage("increment_scan", e.to_string()))
        })
        .await
        .map_err(|e| RepositoryError::storage("increment_scan", e.to_string()))?
    }

    async fn scan_counts(&self, id: UserId) -> Result<BTreeMap<String, u64>, RepositoryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            let mut stmt = conn
                .prepare("SELECT action, count FROM scan_counts WHERE user_id = ?1")
                .map_err(|e| RepositoryError::storage("scan_counts", e.to_string()))?;
            let rows = stmt
                .query_map(params![id.0], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(|e| RepositoryError::storage("scan_counts", e.to_string()))?;

            let mut counts = BTreeMap::new();
            for row in rows {
                let (action, count) =
                    row.map_err(|e| RepositoryError::storage("scan_counts", e.to_string()))?;
                counts.insert(action, count as u64);
            }
            Ok(counts)
        })
        .await
        .map_err(|e| RepositoryError::storage("scan_counts", e.to_string()))?
    }

    async fn count_scanned(&self, action: &str) -> Result<u64, RepositoryError> {
        let conn = self.conn.clone();
        let action = action.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            conn.query_row(
                "SELECT COUNT(*) FROM scan_counts sc
                 JOIN users u ON u.id = sc.user_id
                 WHERE sc.action = ?1 AND sc.count > 0 AND u.role = 'hacker'",
                params![action],
                |row| row.get::<_, i64>(0),
            )
            .map(|count| count as u64)
            .map_err(|e| RepositoryError::storage("count_scanned", e.to_string()))
        })
        .await
        .map_err(|e| RepositoryError::storage("count_scanned", e.to_string()))?
    }

    async fn settings(&self) -> Result<Settings, RepositoryError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            let row: Option<(bool, Option<String>, String, bool, String)> = conn
                .query_row(
                    "SELECT application_open, confirm_by, info, rolling_admissions,
                            acceptance_template
                     FROM settings WHERE id = 0",
                    [],
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| RepositoryError::storage("settings", e.to_string()))?;

            match row {
                Some((application_open, confirm_by, info, rolling_admissions, template)) => {
                    let confirm_by = confirm_by
                        .map(|s| {
                            DateTime::parse_from_rfc3339(&s)
                                .map(|dt| dt.with_timezone(&Utc))
                                .map_err(|_| RepositoryError::corruption("confirm_by timestamp"))
                        })
                        .transpose()?;
                    Ok(Settings {
                        application_open,
                        confirm_by,
                        info,
                        rolling_admissions,
                        acceptance_template: template,
                    })
                }
                None => Ok(Settings::default()),
            }
        })
        .await
        .map_err(|e| RepositoryError::storage("settings", e.to_string()))?
    }

    async fn update_settings(&self, settings: &Settings) -> Result<(), RepositoryError> {
        let conn = self.conn.clone();
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().expect("mutex poisoned");
            conn.execute(
                "INSERT INTO settings
                     (id, application_open, confirm_by, info, rolling_admissions,
                      acceptance_template)
                 VALUES (0, ?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                     application_open = excluded.application_open,
                     confirm_by = excluded.confirm_by,
                     info = excluded.info,
                     rolling_admissions = excluded.rolling_admissions,
                     acceptance_template = excluded.acceptance_template",
                params![
                    settings.application_open,
                    settings.confirm_by.map(|dt| dt.to_rfc3339()),
                    settings.info,
                    settings.rolling_admissions,
                    settings.acceptance_template,
                ],
            )
            .map_err(|e| RepositoryError::storage("update_settings", e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| RepositoryError::storage("update_settings", e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn repo_with_user(email: &str) -> (SqliteRepository, UserRecord) {
        let repo = SqliteRepository::new_in_memory().expect("should create repository");
        let user = repo
            .create_user(email, &format!("hash-{}", email))
            .await
            .expect("should create user");
        (repo, user)
    }

    #[tokio::test]
    async fn test_create_user_defaults() {
        let (_repo, user) = repo_with_user("ada@example.com").await;
        assert_eq!(user.email, "ada@example.com");
        assert_eq!(user.role, Role::Hacker);
        assert_eq!(user.status, Status::Created);
        assert_eq!(user.application, ApplicationForm::default());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_a_conflict() {
        let (repo, _user) = repo_with_user("ada@example.com").await;
        let result = repo.create_user("ada@example.com", "other-hash").await;
        assert!(matches!(result, Err(RepositoryError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_lookup_by_email_and_credential() {
        let (repo, user) = repo_with_user("ada@example.com").await;

        let by_email = repo.user_by_email("ada@example.com").await.unwrap();
        assert_eq!(by_email, Some(user.clone()));

        let by_credential = repo.user_by_credential(&user.credential_hash).await.unwrap();
        assert_eq!(by_credential, Some(user));

        assert_eq!(repo.user_by_email("nobody@example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rotate_credential_invalidates_old() {
        let (repo, user) = repo_with_user("ada@example.com").await;
        repo.rotate_credential(user.id, "new-hash").await.unwrap();

        assert_eq!(
            repo.user_by_credential(&user.credential_hash).await.unwrap(),
            None
        );
        let rotated = repo.user_by_credential("new-hash").await.unwrap().unwrap();
        assert_eq!(rotated.id, user.id);
    }

    #[tokio::test]
    async fn test_update_status_compare_and_set() {
        let (repo, user) = repo_with_user("ada@example.com").await;

        let moved = repo
            .update_status(user.id, &[Status::Created], Status::Verified, false)
            .await
            .unwrap();
        assert!(moved);

        // Guard no longer matches: no change.
        let moved = repo
            .update_status(user.id, &[Status::Created], Status::Verified, false)
            .await
            .unwrap();
        assert!(!moved);

        let user = repo.user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, Status::Verified);
    }

    #[tokio::test]
    async fn test_save_application_resets_status_and_discards_decision() {
        let (repo, user) = repo_with_user("ada@example.com").await;
        repo.update_status(user.id, &[Status::Created], Status::Applied, false)
            .await
            .unwrap();
        repo.stage_decision(user.id, Decision::Accepted).await.unwrap();

        let mut form = ApplicationForm::default();
        form.name = Some("Ada".to_string());
        let saved = repo
            .save_application(
                user.id,
                &form,
                &[Status::Verified, Status::Applied],
                Status::Verified,
            )
            .await
            .unwrap();
        assert!(saved);

        let user = repo.user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, Status::Verified);
        assert_eq!(user.application.name.as_deref(), Some("Ada"));
        assert!(repo.staged_decisions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_application_guard_mismatch_saves_nothing() {
        let (repo, user) = repo_with_user("ada@example.com").await;
        repo.update_status(user.id, &[Status::Created], Status::Declined, false)
            .await
            .unwrap();

        let mut form = ApplicationForm::default();
        form.name = Some("Ada".to_string());
        let saved = repo
            .save_application(
                user.id,
                &form,
                &[Status::Verified, Status::Applied],
                Status::Verified,
            )
            .await
            .unwrap();
        assert!(!saved);

        let user = repo.user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, Status::Declined);
        assert_eq!(user.application.name, None);
    }

    #[tokio::test]
    async fn test_stage_decision_upserts() {
        let (repo, user) = repo_with_user("ada@example.com").await;
        repo.stage_decision(user.id, Decision::Waitlisted).await.unwrap();
        repo.stage_decision(user.id, Decision::Accepted).await.unwrap();

        let staged = repo.staged_decisions(None).await.unwrap();
        assert_eq!(
            staged,
            vec![StagedDecision {
                user_id: user.id,
                decision: Decision::Accepted,
            }]
        );
    }

    #[tokio::test]
    async fn test_staged_decisions_subset() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let a = repo.create_user("a@example.com", "hash-a").await.unwrap();
        let b = repo.create_user("b@example.com", "hash-b").await.unwrap();
        repo.stage_decision(a.id, Decision::Accepted).await.unwrap();
        repo.stage_decision(b.id, Decision::Rejected).await.unwrap();

        let subset = repo
            .staged_decisions(Some(&[b.id, UserId(999)]))
            .await
            .unwrap();
        assert_eq!(subset.len(), 1);
        assert_eq!(subset[0].user_id, b.id);
    }

    #[tokio::test]
    async fn test_release_decision_applies_and_deletes() {
        let (repo, user) = repo_with_user("ada@example.com").await;
        repo.update_status(user.id, &[Status::Created], Status::Applied, false)
            .await
            .unwrap();
        repo.stage_decision(user.id, Decision::Accepted).await.unwrap();

        let outcome = repo.release_decision(user.id, Decision::Accepted).await.unwrap();
        assert_eq!(
            outcome,
            ReleaseOutcome::Applied {
                email: "ada@example.com".to_string(),
                greeting_name: "ada@example.com".to_string(),
                new_status: Status::Accepted,
            }
        );

        let user = repo.user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, Status::Accepted);
        assert!(repo.staged_decisions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_decision_status_moved_still_deletes() {
        let (repo, user) = repo_with_user("ada@example.com").await;
        repo.update_status(user.id, &[Status::Created], Status::Declined, false)
            .await
            .unwrap();
        repo.stage_decision(user.id, Decision::Accepted).await.unwrap();

        let outcome = repo.release_decision(user.id, Decision::Accepted).await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::StatusMoved);

        let user = repo.user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, Status::Declined);
        assert!(repo.staged_decisions(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_release_decision_without_staged_row() {
        let (repo, user) = repo_with_user("ada@example.com").await;
        let outcome = repo.release_decision(user.id, Decision::Accepted).await.unwrap();
        assert_eq!(outcome, ReleaseOutcome::NoDecision);
    }

    #[tokio::test]
    async fn test_increment_scan_counts_every_call() {
        let (repo, user) = repo_with_user("ada@example.com").await;
        assert_eq!(repo.increment_scan(user.id, "checkin").await.unwrap(), 1);
        assert_eq!(repo.increment_scan(user.id, "checkin").await.unwrap(), 2);
        assert_eq!(repo.increment_scan(user.id, "lunch").await.unwrap(), 1);

        let counts = repo.scan_counts(user.id).await.unwrap();
        assert_eq!(counts.get("checkin"), Some(&2));
        assert_eq!(counts.get("lunch"), Some(&1));
    }

    #[tokio::test]
    async fn test_concurrent_increments_do_not_lose_updates() {
        let repo = Arc::new(SqliteRepository::new_in_memory().unwrap());
        let user = repo.create_user("ada@example.com", "hash").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let repo = repo.clone();
            let id = user.id;
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    repo.increment_scan(id, "checkin").await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let counts = repo.scan_counts(user.id).await.unwrap();
        assert_eq!(counts.get("checkin"), Some(&100));
    }

    #[tokio::test]
    async fn test_count_scanned_only_counts_hackers() {
        let repo = SqliteRepository::new_in_memory().unwrap();
        let hacker = repo.create_user("h@example.com", "hash-h").await.unwrap();
        let organizer = repo.create_user("o@example.com", "hash-o").await.unwrap();
        repo.set_role(organizer.id, Role::Organizer).await.unwrap();

        repo.increment_scan(hacker.id, "checkin").await.unwrap();
        repo.increment_scan(hacker.id, "checkin").await.unwrap();
        repo.increment_scan(organizer.id, "checkin").await.unwrap();

        // Re-scans don't inflate the distinct-user count.
        assert_eq!(repo.count_scanned("checkin").await.unwrap(), 1);
        assert_eq!(repo.count_scanned("lunch").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_settings_seeded_and_upserted() {
        let repo = SqliteRepository::new_in_memory().unwrap();

        let settings = repo.settings().await.unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.application_open);

        let updated = Settings {
            application_open: true,
            confirm_by: Some(Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()),
            info: "Spring hackathon".to_string(),
            rolling_admissions: true,
            acceptance_template: "You're in!".to_string(),
        };
        repo.update_settings(&updated).await.unwrap();
        assert_eq!(repo.settings().await.unwrap(), updated);
    }
}
