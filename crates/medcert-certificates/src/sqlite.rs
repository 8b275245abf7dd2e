// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SQLite-backed marketplace and certificate store.
//
// Holds the read-only marketplace tables the orchestrator consumes
// (services, profiles, transactions) and the certificates table. The
// at-most-one-certificate-per-transaction rule is a UNIQUE constraint here,
// so it holds across server instances sharing the database, not just within
// one process.
//
// Certificates store the subject snapshot as columns; verification
// recomputes hashes from these columns.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use tracing::{debug, info, instrument, warn};

use medcert_core::error::{MedcertError, Result};
use medcert_core::payment::{GatewayEvent, Settlement};
use medcert_core::types::{
    Certificate, CertificateId, CertificateMetadata, CertificateStatus, CertificateSubject,
    MedicalService, Money, Profile, ServiceId, Transaction, TransactionId, TransactionStatus,
    UserId,
};

use crate::store::{CertificateStore, TransactionStore};

const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS services (
        id INTEGER PRIMARY KEY,
        seller_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        icd11_code TEXT NOT NULL,
        unit_price_cents INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS profiles (
        user_id INTEGER PRIMARY KEY,
        organization_name TEXT NOT NULL,
        contact_email TEXT
    );
    CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY,
        buyer_id INTEGER NOT NULL,
        seller_id INTEGER NOT NULL,
        service_id INTEGER NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price_cents INTEGER NOT NULL,
        total_price_cents INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_at TEXT NOT NULL,
        completed_at TEXT,
        gateway_provider TEXT,
        gateway_event TEXT
    );
    CREATE TABLE IF NOT EXISTS certificates (
        id TEXT PRIMARY KEY,
        certificate_number TEXT NOT NULL UNIQUE,
        transaction_id INTEGER NOT NULL UNIQUE,
        status TEXT NOT NULL,
        issued_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        service_id INTEGER NOT NULL,
        service_name TEXT NOT NULL,
        service_description TEXT NOT NULL,
        icd11_code TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price_cents INTEGER NOT NULL,
        total_price_cents INTEGER NOT NULL,
        transaction_date TEXT NOT NULL,
        buyer_id INTEGER NOT NULL,
        buyer_name TEXT NOT NULL,
        seller_id INTEGER NOT NULL,
        seller_name TEXT NOT NULL,
        qr_code_data TEXT NOT NULL,
        qr_token TEXT NOT NULL,
        pdf_hash TEXT NOT NULL,
        verification_hash TEXT NOT NULL,
        digital_signature TEXT NOT NULL,
        encrypted_document_path TEXT NOT NULL,
        metadata TEXT NOT NULL
    );
"#;

const CERTIFICATE_COLUMNS: &str = "id, certificate_number, transaction_id, status, issued_at,
    expires_at, service_id, service_name, service_description, icd11_code, quantity,
    unit_price_cents, total_price_cents, transaction_date, buyer_id, buyer_name, seller_id,
    seller_name, qr_code_data, qr_token, pdf_hash, verification_hash, digital_signature,
    encrypted_document_path, metadata";

/// Marketplace and certificate tables in one SQLite database.
///
/// `rusqlite::Connection` is `Send` but not `Sync`; the mutex makes the
/// store shareable behind an `Arc`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| MedcertError::Database(format!("open: {e}")))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| MedcertError::Database(format!("WAL pragma: {e}")))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(|e| MedcertError::Database(format!("busy timeout: {e}")))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| MedcertError::Database(format!("create tables: {e}")))?;

        info!("certificate database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| MedcertError::Database(format!("open in-memory: {e}")))?;
        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| MedcertError::Database(format!("create tables: {e}")))?;

        debug!("in-memory certificate database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| MedcertError::Database("connection lock poisoned".into()))
    }

    // -- Marketplace writes ----------------------------------------------------

    pub fn insert_service(&self, service: &MedicalService) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO services (id, seller_id, name, description, icd11_code, unit_price_cents)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    service.id.0,
                    service.seller_id.0,
                    service.name,
                    service.description,
                    service.icd11_code,
                    service.unit_price.cents(),
                ],
            )
            .map_err(|e| MedcertError::Database(format!("insert service: {e}")))?;
        Ok(())
    }

    pub fn insert_profile(&self, profile: &Profile) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO profiles (user_id, organization_name, contact_email)
                 VALUES (?1, ?2, ?3)",
                params![
                    profile.user_id.0,
                    profile.organization_name,
                    profile.contact_email,
                ],
            )
            .map_err(|e| MedcertError::Database(format!("insert profile: {e}")))?;
        Ok(())
    }

    pub fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT INTO transactions (id, buyer_id, seller_id, service_id, quantity,
                 unit_price_cents, total_price_cents, status, created_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    tx.id.0,
                    tx.buyer_id.0,
                    tx.seller_id.0,
                    tx.service_id.0,
                    tx.quantity,
                    tx.unit_price.cents(),
                    tx.total_price.cents(),
                    tx.status.as_str(),
                    timestamp(tx.created_at),
                    tx.completed_at.map(timestamp),
                ],
            )
            .map_err(|e| MedcertError::Database(format!("insert transaction: {e}")))?;
        Ok(())
    }

    /// Apply a normalised gateway notification to a transaction.
    ///
    /// A transaction becomes `completed` only when the settled amount covers
    /// its total. A completed transaction is never moved back by a later
    /// event. Returns the resulting status.
    #[instrument(skip(self, event), fields(provider = event.provider(), reference = event.reference()))]
    pub fn apply_gateway_event(
        &self,
        id: TransactionId,
        event: &GatewayEvent,
        at: DateTime<Utc>,
    ) -> Result<TransactionStatus> {
        let tx = self.get_transaction(id)?;
        if tx.status == TransactionStatus::Completed {
            debug!("transaction already completed; event ignored");
            return Ok(TransactionStatus::Completed);
        }

        let (status, completed_at) = match event.settlement() {
            Settlement::Settled { amount } if amount >= tx.total_price => {
                (TransactionStatus::Completed, Some(at))
            }
            Settlement::Settled { amount } => {
                warn!(%amount, total = %tx.total_price, "settled amount below transaction total");
                return Err(MedcertError::Validation(format!(
                    "settled amount {amount} does not cover total {}",
                    tx.total_price
                )));
            }
            Settlement::Pending => (TransactionStatus::Pending, None),
            Settlement::Failed => (TransactionStatus::Failed, None),
        };

        let event_json = serde_json::to_string(event)?;
        self.lock()?
            .execute(
                "UPDATE transactions
                 SET status = ?1, completed_at = ?2, gateway_provider = ?3, gateway_event = ?4
                 WHERE id = ?5",
                params![
                    status.as_str(),
                    completed_at.map(timestamp),
                    event.provider(),
                    event_json,
                    id.0,
                ],
            )
            .map_err(|e| MedcertError::Database(format!("apply gateway event: {e}")))?;

        info!(transaction_id = %id, status = status.as_str(), "gateway event applied");
        Ok(status)
    }

    #[cfg(test)]
    pub(crate) fn execute_raw(&self, sql: &str) -> Result<usize> {
        self.lock()?
            .execute(sql, [])
            .map_err(|e| MedcertError::Database(e.to_string()))
    }

    fn query_certificate(&self, column: &str, value: &str) -> Result<Option<Certificate>> {
        let sql = format!("SELECT {CERTIFICATE_COLUMNS} FROM certificates WHERE {column} = ?1");
        self.lock()?
            .query_row(&sql, params![value], row_to_certificate)
            .optional()
            .map_err(|e| MedcertError::Database(format!("query certificate: {e}")))
    }
}

impl TransactionStore for SqliteStore {
    fn get_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.lock()?
            .query_row(
                "SELECT id, buyer_id, seller_id, service_id, quantity, unit_price_cents,
                        total_price_cents, status, created_at, completed_at
                 FROM transactions WHERE id = ?1",
                params![id.0],
                |row| {
                    let status: String = row.get(7)?;
                    Ok(Transaction {
                        id: TransactionId(row.get(0)?),
                        buyer_id: UserId(row.get(1)?),
                        seller_id: UserId(row.get(2)?),
                        service_id: ServiceId(row.get(3)?),
                        quantity: row.get(4)?,
                        unit_price: Money::from_cents(row.get(5)?),
                        total_price: Money::from_cents(row.get(6)?),
                        status: status.parse().map_err(|e| conversion_err(7, e))?,
                        created_at: parse_time(row, 8)?,
                        completed_at: row
                            .get::<_, Option<String>>(9)?
                            .map(|s| parse_rfc3339(9, &s))
                            .transpose()?,
                    })
                },
            )
            .optional()
            .map_err(|e| MedcertError::Database(format!("get transaction: {e}")))?
            .ok_or_else(|| MedcertError::not_found("transaction", id))
    }

    fn get_service(&self, id: ServiceId) -> Result<MedicalService> {
        self.lock()?
            .query_row(
                "SELECT id, seller_id, name, description, icd11_code, unit_price_cents
                 FROM services WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(MedicalService {
                        id: ServiceId(row.get(0)?),
                        seller_id: UserId(row.get(1)?),
                        name: row.get(2)?,
                        description: row.get(3)?,
                        icd11_code: row.get(4)?,
                        unit_price: Money::from_cents(row.get(5)?),
                    })
                },
            )
            .optional()
            .map_err(|e| MedcertError::Database(format!("get service: {e}")))?
            .ok_or_else(|| MedcertError::not_found("service", id))
    }

    fn get_profile(&self, user_id: UserId) -> Result<Profile> {
        self.lock()?
            .query_row(
                "SELECT user_id, organization_name, contact_email FROM profiles WHERE user_id = ?1",
                params![user_id.0],
                |row| {
                    Ok(Profile {
                        user_id: UserId(row.get(0)?),
                        organization_name: row.get(1)?,
                        contact_email: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(|e| MedcertError::Database(format!("get profile: {e}")))?
            .ok_or_else(|| MedcertError::not_found("profile", user_id))
    }
}

impl CertificateStore for SqliteStore {
    fn exists_for_transaction(&self, transaction_id: TransactionId) -> Result<bool> {
        self.lock()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM certificates WHERE transaction_id = ?1)",
                params![transaction_id.0],
                |row| row.get(0),
            )
            .map_err(|e| MedcertError::Database(format!("exists for transaction: {e}")))
    }

    fn number_exists(&self, certificate_number: &str) -> Result<bool> {
        self.lock()?
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM certificates WHERE certificate_number = ?1)",
                params![certificate_number],
                |row| row.get(0),
            )
            .map_err(|e| MedcertError::Database(format!("number exists: {e}")))
    }

    #[instrument(skip_all, fields(number = %certificate.certificate_number))]
    fn insert(&self, certificate: Certificate) -> Result<Certificate> {
        let metadata = serde_json::to_string(&certificate.metadata)?;
        let s = &certificate.subject;

        let result = self.lock()?.execute(
            &format!(
                "INSERT INTO certificates ({CERTIFICATE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
            ),
            params![
                certificate.id.to_string(),
                certificate.certificate_number,
                s.transaction_id.0,
                certificate.status.as_str(),
                timestamp(certificate.issued_at),
                timestamp(certificate.expires_at),
                s.service_id.0,
                s.service_name,
                s.service_description,
                s.icd11_code,
                s.quantity,
                s.unit_price.cents(),
                s.total_price.cents(),
                timestamp(s.transaction_date),
                s.buyer_id.0,
                s.buyer_name,
                s.seller_id.0,
                s.seller_name,
                certificate.qr_code_data,
                certificate.qr_token,
                certificate.pdf_hash,
                certificate.verification_hash,
                certificate.digital_signature,
                certificate.encrypted_document_path,
                metadata,
            ],
        );

        match result {
            Ok(_) => {
                info!(certificate_id = %certificate.id, "certificate stored");
                Ok(certificate)
            }
            Err(rusqlite::Error::SqliteFailure(e, msg)) if e.code == ErrorCode::ConstraintViolation => {
                Err(MedcertError::Conflict(format!(
                    "certificate for transaction {}: {}",
                    s.transaction_id,
                    msg.unwrap_or_else(|| "uniqueness constraint".into())
                )))
            }
            Err(e) => Err(MedcertError::Database(format!("insert certificate: {e}"))),
        }
    }

    fn get_by_number(&self, certificate_number: &str) -> Result<Certificate> {
        self.query_certificate("certificate_number", certificate_number)?
            .ok_or_else(|| MedcertError::not_found("certificate", certificate_number))
    }

    fn get_by_id(&self, id: CertificateId) -> Result<Certificate> {
        self.query_certificate("id", &id.to_string())?
            .ok_or_else(|| MedcertError::not_found("certificate", id))
    }

    #[instrument(skip(self), fields(certificate_id = %id))]
    fn update_status(
        &self,
        id: CertificateId,
        from: CertificateStatus,
        to: CertificateStatus,
    ) -> Result<Certificate> {
        let rows = self
            .lock()?
            .execute(
                "UPDATE certificates SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![to.as_str(), id.to_string(), from.as_str()],
            )
            .map_err(|e| MedcertError::Database(format!("update status: {e}")))?;

        if rows == 0 {
            let current = self.get_by_id(id)?;
            return Err(MedcertError::Conflict(format!(
                "certificate {id} is {}, expected {from}",
                current.status
            )));
        }

        debug!(%from, %to, "certificate status updated");
        self.get_by_id(id)
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Full-precision RFC 3339 so stored timestamps read back unchanged.
fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_rfc3339(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn parse_time(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_rfc3339(idx, &raw)
}

/// Column indices follow `CERTIFICATE_COLUMNS`.
fn row_to_certificate(row: &rusqlite::Row<'_>) -> rusqlite::Result<Certificate> {
    let id_str: String = row.get(0)?;
    let status_str: String = row.get(3)?;
    let metadata_json: String = row.get(24)?;

    let id: CertificateId = id_str.parse().map_err(|e| conversion_err(0, e))?;
    let status: CertificateStatus = status_str.parse().map_err(|e| conversion_err(3, e))?;
    let metadata: CertificateMetadata =
        serde_json::from_str(&metadata_json).map_err(|e| conversion_err(24, e))?;

    Ok(Certificate {
        id,
        certificate_number: row.get(1)?,
        status,
        issued_at: parse_time(row, 4)?,
        expires_at: parse_time(row, 5)?,
        subject: CertificateSubject {
            transaction_id: TransactionId(row.get(2)?),
            service_id: ServiceId(row.get(6)?),
            service_name: row.get(7)?,
            service_description: row.get(8)?,
            icd11_code: row.get(9)?,
            quantity: row.get(10)?,
            unit_price: Money::from_cents(row.get(11)?),
            total_price: Money::from_cents(row.get(12)?),
            transaction_date: parse_time(row, 13)?,
            buyer_id: UserId(row.get(14)?),
            buyer_name: row.get(15)?,
            seller_id: UserId(row.get(16)?),
            seller_name: row.get(17)?,
        },
        qr_code_data: row.get(18)?,
        qr_token: row.get(19)?,
        pdf_hash: row.get(20)?,
        verification_hash: row.get(21)?,
        digital_signature: row.get(22)?,
        encrypted_document_path: row.get(23)?,
        metadata,
    })
}
