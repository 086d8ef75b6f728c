//! SQLite database module with schema migrations.
//!
//! Holds per-tenant session preferences, including dismissed banners. Each
//! operation opens its own connection inside `spawn_blocking`; WAL mode and a
//! busy timeout keep concurrent access safe.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

use crate::error::AppError;

/// Current schema version. Increment when adding new migrations.
const SCHEMA_VERSION: i32 = 1;

/// V1 schema: per-tenant preferences and banner dismissals.
const V1_SCHEMA: &str = r#"
-- Free-form per-tenant preferences
CREATE TABLE IF NOT EXISTS preferences (
    client_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (client_id, key)
);

-- Banners a tenant has dismissed
CREATE TABLE IF NOT EXISTS dismissed_banners (
    client_id TEXT NOT NULL,
    banner TEXT NOT NULL,
    dismissed_at INTEGER NOT NULL,
    PRIMARY KEY (client_id, banner)
);

CREATE INDEX IF NOT EXISTS idx_dismissed_banners_client_id ON dismissed_banners(client_id);
"#;

/// SQLite database handle.
#[derive(Debug)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Initializes the database at the given path.
    /// Creates parent directories if needed, opens the SQLite file, and runs migrations.
    pub async fn init(db_path: PathBuf) -> Result<Self, AppError> {
        let path = db_path.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Internal(format!("Failed to create database directory: {e}"))
                })?;
            }

            let mut conn = Connection::open(&path)
                .map_err(|e| AppError::Internal(format!("Failed to open database: {e}")))?;

            configure_connection(&conn)?;
            run_migrations(&mut conn)?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Database init task failed: {e}")))??;

        Ok(Self { db_path })
    }

    /// Returns the database path.
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Simple health check: executes SELECT 1.
    pub async fn health_check(&self) -> Result<(), AppError> {
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| AppError::Internal(format!("Failed to open database: {e}")))?;

            configure_connection(&conn)?;

            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| AppError::Internal(format!("Health check failed: {e}")))?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Health check task failed: {e}")))??;

        Ok(())
    }

    /// Sets (or replaces) a preference value for a tenant.
    pub async fn set_preference(
        &self,
        client_id: &str,
        key: &str,
        value: &str,
    ) -> Result<(), AppError> {
        let db_path = self.db_path.clone();
        let client_id = client_id.to_string();
        let key = key.to_string();
        let value = value.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| AppError::Internal(format!("Failed to open database: {e}")))?;

            configure_connection(&conn)?;

            conn.execute(
                r#"
                INSERT INTO preferences (client_id, key, value, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT (client_id, key) DO UPDATE SET value = ?3, updated_at = ?4
                "#,
                rusqlite::params![client_id, key, value, current_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to set preference: {e}")))?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Set preference task failed: {e}")))??;

        Ok(())
    }

    /// Reads a preference value for a tenant.
    pub async fn get_preference(
        &self,
        client_id: &str,
        key: &str,
    ) -> Result<Option<String>, AppError> {
        let db_path = self.db_path.clone();
        let client_id = client_id.to_string();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| AppError::Internal(format!("Failed to open database: {e}")))?;

            configure_connection(&conn)?;

            let value = conn
                .query_row(
                    "SELECT value FROM preferences WHERE client_id = ?1 AND key = ?2",
                    rusqlite::params![client_id, key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| AppError::Internal(format!("Failed to get preference: {e}")))?;

            Ok::<_, AppError>(value)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Get preference task failed: {e}")))?
    }

    /// Records that a tenant dismissed a banner. Idempotent.
    pub async fn dismiss_banner(&self, client_id: &str, banner: &str) -> Result<(), AppError> {
        let db_path = self.db_path.clone();
        let client_id = client_id.to_string();
        let banner = banner.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| AppError::Internal(format!("Failed to open database: {e}")))?;

            configure_connection(&conn)?;

            conn.execute(
                r#"
                INSERT INTO dismissed_banners (client_id, banner, dismissed_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT (client_id, banner) DO NOTHING
                "#,
                rusqlite::params![client_id, banner, current_timestamp()],
            )
            .map_err(|e| AppError::Internal(format!("Failed to dismiss banner: {e}")))?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Dismiss banner task failed: {e}")))??;

        Ok(())
    }

    /// True when the tenant previously dismissed the banner.
    pub async fn is_banner_dismissed(
        &self,
        client_id: &str,
        banner: &str,
    ) -> Result<bool, AppError> {
        let db_path = self.db_path.clone();
        let client_id = client_id.to_string();
        let banner = banner.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)
                .map_err(|e| AppError::Internal(format!("Failed to open database: {e}")))?;

            configure_connection(&conn)?;

            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM dismissed_banners WHERE client_id = ?1 AND banner = ?2",
                    rusqlite::params![client_id, banner],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| AppError::Internal(format!("Failed to check banner: {e}")))?;

            Ok::<_, AppError>(found.is_some())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Check banner task failed: {e}")))?
    }
}

/// Configures connection with busy timeout and WAL mode.
fn configure_connection(conn: &Connection) -> Result<(), AppError> {
    conn.busy_timeout(Duration::from_secs(10))
        .map_err(|e| AppError::Internal(format!("Failed to set busy timeout: {e}")))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Internal(format!("Failed to set WAL mode: {e}")))?;

    Ok(())
}

/// Runs database migrations using PRAGMA user_version.
fn run_migrations(conn: &mut Connection) -> Result<(), AppError> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| AppError::Internal(format!("Failed to get schema version: {e}")))?;

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|e| AppError::Internal(format!("Failed to start migration transaction: {e}")))?;

    if current_version < 1 {
        tx.execute_batch(V1_SCHEMA)
            .map_err(|e| AppError::Internal(format!("V1 migration failed: {e}")))?;
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| AppError::Internal(format!("Failed to update schema version: {e}")))?;

    tx.commit()
        .map_err(|e| AppError::Internal(format!("Failed to commit migration: {e}")))?;

    Ok(())
}

fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db_path() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        (temp_dir, db_path)
    }

    #[tokio::test]
    async fn init_creates_db_file_and_tables() {
        let (_temp_dir, db_path) = test_db_path();

        let db = Database::init(db_path.clone())
            .await
            .expect("Failed to init database");

        assert!(db_path.exists(), "Database file should exist");
        db.health_check().await.expect("Health check should pass");

        let conn = Connection::open(&db_path).expect("Failed to open db");
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .expect("Failed to prepare")
            .query_map([], |row| row.get(0))
            .expect("Failed to query")
            .collect::<Result<Vec<_>, _>>()
            .expect("Failed to collect");

        assert!(tables.contains(&"preferences".to_string()));
        assert!(tables.contains(&"dismissed_banners".to_string()));
    }

    #[tokio::test]
    async fn init_is_idempotent() {
        let (_temp_dir, db_path) = test_db_path();

        Database::init(db_path.clone()).await.expect("First init");
        Database::init(db_path.clone()).await.expect("Second init");

        let conn = Connection::open(&db_path).expect("Failed to open db");
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .expect("Failed to read version");
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn preferences_round_trip_and_overwrite() {
        let (_temp_dir, db_path) = test_db_path();
        let db = Database::init(db_path).await.expect("init");

        assert_eq!(
            db.get_preference("client-1", "theme").await.expect("get"),
            None
        );

        db.set_preference("client-1", "theme", "dark")
            .await
            .expect("set");
        assert_eq!(
            db.get_preference("client-1", "theme").await.expect("get"),
            Some("dark".to_string())
        );

        db.set_preference("client-1", "theme", "light")
            .await
            .expect("overwrite");
        assert_eq!(
            db.get_preference("client-1", "theme").await.expect("get"),
            Some("light".to_string())
        );

        // Preferences are scoped per tenant
        assert_eq!(
            db.get_preference("client-2", "theme").await.expect("get"),
            None
        );
    }

    #[tokio::test]
    async fn banner_dismissal_is_per_tenant_and_idempotent() {
        let (_temp_dir, db_path) = test_db_path();
        let db = Database::init(db_path).await.expect("init");

        assert!(!db
            .is_banner_dismissed("client-1", "import-hint")
            .await
            .expect("check"));

        db.dismiss_banner("client-1", "import-hint")
            .await
            .expect("dismiss");
        db.dismiss_banner("client-1", "import-hint")
            .await
            .expect("dismiss again");

        assert!(db
            .is_banner_dismissed("client-1", "import-hint")
            .await
            .expect("check"));
        assert!(!db
            .is_banner_dismissed("client-2", "import-hint")
            .await
            .expect("other tenant"));
    }
}
