//! # Database
//!
//! SQLite-backed [`VaultStore`].
//!
//! ## Database Operations
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DATABASE OPERATIONS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │ KeyVault /      │                                                   │
//! │  │ GrantEngine     │                                                   │
//! │  └────────┬────────┘                                                   │
//! │           │  VaultStore                                                 │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │  SqliteStore    │  Typed records in, typed records out              │
//! │  │  (this file)    │  - Schema versioning                              │
//! │  │                 │  - JSON columns for wire-format records           │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  Storage                                          │
//! │  │   (file or      │  - In-memory for tests                            │
//! │  │    memory)      │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Calls hold the connection lock only for the statement itself; nothing is
//! awaited while it is held.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use super::{schema, AccountRecord, Collaborator, VaultStore};
use crate::crypto::public_key_from_hex;
use crate::error::{Error, Result};
use crate::grants::CapabilityGrant;
use crate::identity::PublicProfile;
use crate::time::now_timestamp_millis;
use crate::vault::{EncryptedKeyRecord, LoginAttemptRecord, SyncedIdentityRecord};

/// The vault database handle
///
/// Wraps a SQLite connection and maps vault records onto the tables in
/// [`schema`].
pub struct SqliteStore {
    /// The underlying SQLite connection
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create a database
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub async fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::Database(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory().map_err(|e| {
                Error::Database(format!("Failed to create in-memory database: {}", e))
            })?,
        };

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::Database(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::Database(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Database schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::Database(format!(
                    "Database schema version {} is newer than supported {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Database schema is at version {}", v);
            }
        }

        Ok(())
    }

    /// Drop every table and recreate an empty schema
    pub fn reset(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(schema::DROP_TABLES)
            .map_err(|e| Error::Database(format!("Failed to drop tables: {}", e)))?;
        tracing::warn!("Database reset");
        self.init_schema()
    }
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> Error {
    Error::Database(format!("Corrupt {} row: {}", what, err))
}

fn optional<T>(result: rusqlite::Result<T>, what: &str) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::Database(format!("Failed to get {}: {}", what, e))),
    }
}

#[async_trait]
impl VaultStore for SqliteStore {
    // ── Accounts ──────────────────────────────────────────────────────────

    async fn save_account(&self, account: &AccountRecord) -> Result<()> {
        let encrypted_key = serde_json::to_string(&account.encrypted_key)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO accounts (username, did, signing_key, encryption_key, encrypted_key, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(username) DO UPDATE SET
                did = excluded.did,
                signing_key = excluded.signing_key,
                encryption_key = excluded.encryption_key,
                encrypted_key = excluded.encrypted_key,
                created_at = excluded.created_at",
            params![
                account.username,
                account.did,
                hex::encode(account.signing_public_key),
                hex::encode(account.encryption_public_key),
                encrypted_key,
                account.created_at,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to save account: {}", e)))?;
        Ok(())
    }

    async fn get_account(&self, username: &str) -> Result<Option<AccountRecord>> {
        let row = {
            let conn = self.conn.lock();
            optional(
                conn.query_row(
                    "SELECT username, did, signing_key, encryption_key, encrypted_key, created_at
                     FROM accounts WHERE username = ?",
                    params![username],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, i64>(5)?,
                        ))
                    },
                ),
                "account",
            )?
        };

        let Some((username, did, signing_key, encryption_key, encrypted_key, created_at)) = row
        else {
            return Ok(None);
        };

        let encrypted_key: EncryptedKeyRecord =
            serde_json::from_str(&encrypted_key).map_err(|e| corrupt("account", e))?;

        Ok(Some(AccountRecord {
            username,
            did,
            signing_public_key: public_key_from_hex(&signing_key)
                .map_err(|e| corrupt("account", e))?,
            encryption_public_key: public_key_from_hex(&encryption_key)
                .map_err(|e| corrupt("account", e))?,
            encrypted_key,
            created_at,
        }))
    }

    // ── Backups ───────────────────────────────────────────────────────────

    async fn save_backup(&self, did: &str, record: &SyncedIdentityRecord) -> Result<()> {
        let json = record.to_json()?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO backups (did, record, updated_at) VALUES (?, ?, ?)",
            params![did, json, now_timestamp_millis()],
        )
        .map_err(|e| Error::Database(format!("Failed to save backup: {}", e)))?;
        Ok(())
    }

    async fn get_backup(&self, did: &str) -> Result<Option<SyncedIdentityRecord>> {
        let json: Option<String> = {
            let conn = self.conn.lock();
            optional(
                conn.query_row(
                    "SELECT record FROM backups WHERE did = ?",
                    params![did],
                    |row| row.get(0),
                ),
                "backup",
            )?
        };

        json.map(|j| SyncedIdentityRecord::from_json(&j)).transpose()
    }

    // ── Login attempts ────────────────────────────────────────────────────

    async fn record_failed_login(
        &self,
        username: &str,
        at_ms: i64,
    ) -> Result<LoginAttemptRecord> {
        let conn = self.conn.lock();
        let failed_attempts: u32 = conn
            .query_row(
                "INSERT INTO login_attempts (username, failed_attempts, last_attempt_ms)
                 VALUES (?, 1, ?)
                 ON CONFLICT(username) DO UPDATE SET
                    failed_attempts = failed_attempts + 1,
                    last_attempt_ms = excluded.last_attempt_ms
                 RETURNING failed_attempts",
                params![username, at_ms],
                |row| row.get(0),
            )
            .map_err(|e| Error::Database(format!("Failed to record login attempt: {}", e)))?;

        Ok(LoginAttemptRecord {
            username: username.to_string(),
            failed_attempts,
            last_attempt_ms: at_ms,
        })
    }

    async fn get_login_attempts(&self, username: &str) -> Result<Option<LoginAttemptRecord>> {
        let conn = self.conn.lock();
        optional(
            conn.query_row(
                "SELECT username, failed_attempts, last_attempt_ms
                 FROM login_attempts WHERE username = ?",
                params![username],
                |row| {
                    Ok(LoginAttemptRecord {
                        username: row.get(0)?,
                        failed_attempts: row.get(1)?,
                        last_attempt_ms: row.get(2)?,
                    })
                },
            ),
            "login attempts",
        )
    }

    async fn clear_login_attempts(&self, username: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM login_attempts WHERE username = ?",
            params![username],
        )
        .map_err(|e| Error::Database(format!("Failed to clear login attempts: {}", e)))?;
        Ok(())
    }

    // ── Profiles ──────────────────────────────────────────────────────────

    async fn save_profile(&self, did: &str, profile: &PublicProfile) -> Result<()> {
        let json = serde_json::to_string(profile)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO profiles (did, profile, updated_at) VALUES (?, ?, ?)",
            params![did, json, profile.updated_at],
        )
        .map_err(|e| Error::Database(format!("Failed to save profile: {}", e)))?;
        Ok(())
    }

    async fn get_profile(&self, did: &str) -> Result<Option<PublicProfile>> {
        let json: Option<String> = {
            let conn = self.conn.lock();
            optional(
                conn.query_row(
                    "SELECT profile FROM profiles WHERE did = ?",
                    params![did],
                    |row| row.get(0),
                ),
                "profile",
            )?
        };

        json.map(|j| serde_json::from_str(&j).map_err(|e| corrupt("profile", e)))
            .transpose()
    }

    // ── Collaborators ─────────────────────────────────────────────────────

    async fn add_collaborator(&self, collaborator: &Collaborator) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO collaborators (did, display_name, encryption_key, added_at)
             VALUES (?, ?, ?, ?)",
            params![
                collaborator.did,
                collaborator.display_name,
                hex::encode(collaborator.encryption_key),
                collaborator.added_at,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to add collaborator: {}", e)))?;
        Ok(())
    }

    async fn list_collaborators(&self) -> Result<Vec<Collaborator>> {
        let rows: Vec<(String, String, String, i64)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT did, display_name, encryption_key, added_at
                 FROM collaborators ORDER BY did",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        rows.into_iter()
            .map(|(did, display_name, encryption_key, added_at)| {
                Ok(Collaborator {
                    did,
                    display_name,
                    encryption_key: public_key_from_hex(&encryption_key)
                        .map_err(|e| corrupt("collaborator", e))?,
                    added_at,
                })
            })
            .collect()
    }

    // ── Grants ────────────────────────────────────────────────────────────

    async fn save_grant(&self, grant: &CapabilityGrant) -> Result<()> {
        let json = serde_json::to_string(grant)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO grants (id, granter_did, subject_did, resource_id, issued_at, grant_json)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                grant.id,
                grant.granter_did(),
                grant.subject_did(),
                grant.resource_id(),
                grant.payload.issued_at,
                json,
            ],
        )
        .map_err(|e| Error::Database(format!("Failed to save grant: {}", e)))?;
        Ok(())
    }

    async fn get_grant(&self, id: &str) -> Result<Option<CapabilityGrant>> {
        let json: Option<String> = {
            let conn = self.conn.lock();
            optional(
                conn.query_row(
                    "SELECT grant_json FROM grants WHERE id = ?",
                    params![id],
                    |row| row.get(0),
                ),
                "grant",
            )?
        };

        json.map(|j| serde_json::from_str(&j).map_err(|e| corrupt("grant", e)))
            .transpose()
    }

    async fn list_grants_for_subject(&self, subject_did: &str) -> Result<Vec<CapabilityGrant>> {
        let rows: Vec<String> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT grant_json FROM grants WHERE subject_did = ?
                 ORDER BY issued_at, id",
            )?;
            let rows = stmt
                .query_map(params![subject_did], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        rows.iter()
            .map(|j| serde_json::from_str(j).map_err(|e| corrupt("grant", e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::conformance;

    #[tokio::test]
    async fn test_database_creation() {
        let db = SqliteStore::open(None).await.unwrap();
        assert!(db.list_collaborators().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_accounts() {
        conformance::accounts(&SqliteStore::open(None).await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_backups() {
        conformance::backups(&SqliteStore::open(None).await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_login_attempts() {
        conformance::login_attempts(&SqliteStore::open(None).await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_profiles_and_collaborators() {
        conformance::profiles_and_collaborators(&SqliteStore::open(None).await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_grants() {
        conformance::grants(&SqliteStore::open(None).await.unwrap()).await;
    }

    #[tokio::test]
    async fn test_file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let path = path.to_str().unwrap();

        {
            let db = SqliteStore::open(Some(path)).await.unwrap();
            db.record_failed_login("alice", 1_000).await.unwrap();
            db.save_profile("did:key:zA", &PublicProfile::new("alice", 3))
                .await
                .unwrap();
        }

        let db = SqliteStore::open(Some(path)).await.unwrap();
        assert_eq!(
            db.get_login_attempts("alice").await.unwrap().unwrap().failed_attempts,
            1
        );
        assert_eq!(
            db.get_profile("did:key:zA").await.unwrap().unwrap().username,
            "alice"
        );
    }

    #[tokio::test]
    async fn test_newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vault.db");
        let path = path.to_str().unwrap();

        {
            let db = SqliteStore::open(Some(path)).await.unwrap();
            db.conn
                .lock()
                .execute("UPDATE schema_version SET version = 99", [])
                .unwrap();
        }

        assert!(matches!(
            SqliteStore::open(Some(path)).await,
            Err(Error::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let db = SqliteStore::open(None).await.unwrap();
        db.record_failed_login("alice", 1).await.unwrap();
        db.reset().unwrap();
        assert!(db.get_login_attempts("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backup_json_is_stored_verbatim() {
        let db = SqliteStore::open(None).await.unwrap();
        let json = r#"{"version":1,"publicKey":"did:key:zA","public":null,"private":{"cipher":"AQID","iv":"BAUG","salt":"BwgJ","iterations":3}}"#;
        let record = SyncedIdentityRecord::from_json(json).unwrap();
        db.save_backup("did:key:zA", &record).await.unwrap();

        let stored: String = db
            .conn
            .lock()
            .query_row("SELECT record FROM backups WHERE did = 'did:key:zA'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(stored, json);
    }
}
