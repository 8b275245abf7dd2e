// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of certificate lifecycle events.
//
// Schema:
//   audit_log(
//     id        INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp TEXT    NOT NULL,   -- RFC 3339
//     action    TEXT    NOT NULL,   -- see AuditAction
//     subject   TEXT    NOT NULL,   -- certificate number, or "tx:<id>"
//     success   INTEGER NOT NULL,   -- 0 = failure, 1 = success
//     details   TEXT                -- optional free-form context
//   )

use std::path::Path;

use chrono::Utc;
use medcert_core::error::MedcertError;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT    NOT NULL,
    action    TEXT    NOT NULL,
    subject   TEXT    NOT NULL,
    success   INTEGER NOT NULL,
    details   TEXT
);
CREATE INDEX IF NOT EXISTS audit_log_subject ON audit_log(subject);";

/// Convert a `rusqlite::Error` into a `MedcertError::Database`.
fn db_err(e: rusqlite::Error) -> MedcertError {
    MedcertError::Database(e.to_string())
}

/// Kinds of recorded events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditAction {
    Issue,
    Verify,
    Download,
    StatusChange,
    /// Issuance stored an unencrypted document because encryption failed.
    PlaintextFallback,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Issue => "issue",
            Self::Verify => "verify",
            Self::Download => "download",
            Self::StatusChange => "status-change",
            Self::PlaintextFallback => "plaintext-fallback",
        }
    }
}

/// A single entry in the audit log, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub action: String,
    pub subject: String,
    pub success: bool,
    pub details: Option<String>,
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MedcertError> {
        let conn = Connection::open(path).map_err(db_err)?;

        // Enable WAL for concurrent readers.
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self, MedcertError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("in-memory audit log opened");
        Ok(Self { conn })
    }

    /// Record a new audit entry.
    #[instrument(skip(self, details), fields(action = action.as_str(), %subject, success))]
    pub fn record(
        &self,
        action: AuditAction,
        subject: &str,
        success: bool,
        details: Option<&str>,
    ) -> Result<(), MedcertError> {
        let timestamp = Utc::now().to_rfc3339();
        let success_int: i32 = if success { 1 } else { 0 };

        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, action, subject, success, details)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![timestamp, action.as_str(), subject, success_int, details],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// All entries for a subject, oldest first.
    pub fn entries_for_subject(&self, subject: &str) -> Result<Vec<AuditEntry>, MedcertError> {
        self.query(
            "SELECT id, timestamp, action, subject, success, details
             FROM audit_log
             WHERE subject = ?1
             ORDER BY id ASC",
            params![subject],
        )
    }

    /// Retrieve the most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, MedcertError> {
        self.query(
            "SELECT id, timestamp, action, subject, success, details
             FROM audit_log
             ORDER BY id DESC
             LIMIT ?1",
            params![limit],
        )
    }

    /// Return the total number of entries in the audit log.
    pub fn count(&self) -> Result<u64, MedcertError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }

    fn query(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<AuditEntry>, MedcertError> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    action: row.get(2)?,
                    subject: row.get(3)?,
                    success: row.get::<_, i32>(4)? != 0,
                    details: row.get(5)?,
                })
            })
            .map_err(db_err)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(db_err)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> AuditLog {
        AuditLog::open_in_memory().expect("open in-memory audit log")
    }

    #[test]
    fn record_and_count() {
        let log = make_log();
        assert_eq!(log.count().unwrap(), 0);

        log.record(AuditAction::Issue, "CERT-42-1", true, None).unwrap();
        log.record(AuditAction::Verify, "CERT-42-1", true, Some("qr"))
            .unwrap();

        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn entries_for_subject() {
        let log = make_log();
        log.record(AuditAction::Issue, "CERT-1-1", true, None).unwrap();
        log.record(AuditAction::Issue, "CERT-2-1", true, None).unwrap();
        log.record(AuditAction::Download, "CERT-1-1", false, Some("revoked"))
            .unwrap();

        let entries = log.entries_for_subject("CERT-1-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "issue");
        assert!(entries[0].success);
        assert_eq!(entries[1].action, "download");
        assert!(!entries[1].success);
        assert_eq!(entries[1].details.as_deref(), Some("revoked"));
    }

    #[test]
    fn recent_entries_ordering() {
        let log = make_log();
        for i in 0..5 {
            log.record(AuditAction::Verify, &format!("CERT-{i}-1"), true, None)
                .unwrap();
        }

        let recent = log.recent_entries(3).unwrap();
        assert_eq!(recent.len(), 3);
        // Newest first — IDs should be descending.
        assert!(recent[0].id > recent[1].id);
        assert!(recent[1].id > recent[2].id);
    }

    #[test]
    fn fallback_action_name() {
        let log = make_log();
        log.record(AuditAction::PlaintextFallback, "CERT-9-1", true, Some("key missing"))
            .unwrap();
        let entries = log.entries_for_subject("CERT-9-1").unwrap();
        assert_eq!(entries[0].action, "plaintext-fallback");
    }
}
