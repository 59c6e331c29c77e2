//! # Credential Repository
//!
//! The local credential snapshot and its single-entry staging slot.
//!
//! ## Lifecycle of a Record
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  pull ──► replace_all(snapshot)   DELETE + INSERT in ONE transaction   │
//! │                                                                         │
//! │  sync-data ──► merge_update(id)   UPDATE only; unknown id is rejected  │
//! │                                                                         │
//! │  RFID ──► stage_for_id(id)        copy credentials[id] → staging[0]    │
//! │                                   (miss: nothing written)              │
//! │                                                                         │
//! │  PIN ──► read_staged()            staging[0] → record to verify        │
//! │      └─► clear_staged()           slot emptied after every check       │
//! │                                                                         │
//! │  push ──► load()                  full snapshot, ordered by id         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Records are stored as `UserRecord` JSON text. The key set only grows
//! through `replace_all`.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use gatekeeper_core::{CredentialSnapshot, UserRecord};

/// Contents of the staging slot.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRecord {
    pub id: String,
    pub record: UserRecord,
    pub staged_at: DateTime<Utc>,
}

/// Repository for the credential snapshot and staging slot.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    pool: SqlitePool,
}

impl CredentialStore {
    /// Creates a new CredentialStore.
    pub fn new(pool: SqlitePool) -> Self {
        CredentialStore { pool }
    }

    // =========================================================================
    // Snapshot
    // =========================================================================

    /// Reads the full snapshot.
    ///
    /// ## Errors
    /// `CorruptOrMissingStore` if the table is missing or any stored record
    /// does not decode. Nothing is partially returned.
    pub async fn load(&self) -> StoreResult<CredentialSnapshot> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT id, record FROM credentials ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        let mut snapshot = CredentialSnapshot::new();
        for (id, record) in rows {
            let record: UserRecord = serde_json::from_str(&record).map_err(|e| {
                StoreError::CorruptOrMissingStore(format!("record for {}: {}", id, e))
            })?;
            snapshot.insert(id, record);
        }

        debug!(records = snapshot.len(), "Snapshot loaded");
        Ok(snapshot)
    }

    /// Atomically replaces the whole snapshot.
    ///
    /// Concurrent readers see either the old or the new snapshot, never a
    /// mix. Returns the number of records written.
    pub async fn replace_all(&self, snapshot: &CredentialSnapshot) -> StoreResult<usize> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM credentials")
            .execute(&mut *tx)
            .await?;

        for (id, record) in snapshot {
            let json = serde_json::to_string(record)
                .map_err(|e| StoreError::Internal(e.to_string()))?;

            sqlx::query("INSERT INTO credentials (id, record, updated_at) VALUES (?1, ?2, ?3)")
                .bind(id)
                .bind(json)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(records = snapshot.len(), "Credential snapshot replaced");
        Ok(snapshot.len())
    }

    /// Replaces the record of an existing id.
    ///
    /// ## Errors
    /// `UnknownUserId` if the id is not in the snapshot; nothing is written.
    pub async fn merge_update(&self, id: &str, record: &UserRecord) -> StoreResult<()> {
        let json =
            serde_json::to_string(record).map_err(|e| StoreError::Internal(e.to_string()))?;

        let result = sqlx::query("UPDATE credentials SET record = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(json)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownUserId(id.to_string()));
        }

        debug!(rfid_id = %id, "Credential record merged");
        Ok(())
    }

    /// Looks up a single record without staging it.
    pub async fn get(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT record FROM credentials WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some((json,)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Number of records in the snapshot.
    pub async fn count(&self) -> StoreResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM credentials")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Staging Slot
    // =========================================================================

    /// Copies the record for `id` into the staging slot and returns it.
    ///
    /// On a miss nothing is written and the slot keeps its previous value.
    pub async fn stage_for_id(&self, id: &str) -> StoreResult<Option<UserRecord>> {
        let Some(record) = self.get(id).await? else {
            debug!(rfid_id = %id, "No record to stage");
            return Ok(None);
        };

        let json =
            serde_json::to_string(&record).map_err(|e| StoreError::Internal(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO staging (slot, id, record, staged_at) VALUES (0, ?1, ?2, ?3)",
        )
        .bind(id)
        .bind(json)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(rfid_id = %id, "Record staged");
        Ok(Some(record))
    }

    /// Reads the staging slot.
    ///
    /// Returns `None` if nothing is staged or the staged JSON is corrupt.
    pub async fn read_staged(&self) -> StoreResult<Option<StagedRecord>> {
        let row: Option<(String, String, DateTime<Utc>)> =
            sqlx::query_as("SELECT id, record, staged_at FROM staging WHERE slot = 0")
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, json, staged_at)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(record) => Ok(Some(StagedRecord {
                id,
                record,
                staged_at,
            })),
            Err(e) => {
                warn!(rfid_id = %id, error = %e, "Staged record is corrupt, ignoring");
                Ok(None)
            }
        }
    }

    /// Empties the staging slot.
    pub async fn clear_staged(&self) -> StoreResult<()> {
        sqlx::query("DELETE FROM staging WHERE slot = 0")
            .execute(&self.pool)
            .await?;

        debug!("Staging slot cleared");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
