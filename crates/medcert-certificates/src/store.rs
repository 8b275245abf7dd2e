// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Collaborator interfaces the certificate subsystem depends on.
//
// All methods are synchronous (the SQLite and filesystem implementations
// are). In an async context, call them from `tokio::task::spawn_blocking`.

use medcert_core::error::Result;
use medcert_core::types::{
    Certificate, CertificateId, CertificateStatus, MedicalService, Profile, ServiceId,
    Transaction, TransactionId, UserId,
};

/// Read-only access to marketplace records.
pub trait TransactionStore: Send + Sync {
    /// `NotFound` when the transaction does not exist.
    fn get_transaction(&self, id: TransactionId) -> Result<Transaction>;

    fn get_service(&self, id: ServiceId) -> Result<MedicalService>;

    fn get_profile(&self, user_id: UserId) -> Result<Profile>;
}

/// Persistence for issued certificates.
///
/// Implementations must enforce uniqueness of both the transaction id and
/// the certificate number at the storage layer; `insert` reports either
/// violation as `Conflict`.
pub trait CertificateStore: Send + Sync {
    fn exists_for_transaction(&self, transaction_id: TransactionId) -> Result<bool>;

    fn number_exists(&self, certificate_number: &str) -> Result<bool>;

    /// Insert a new certificate and return the stored record.
    fn insert(&self, certificate: Certificate) -> Result<Certificate>;

    fn get_by_number(&self, certificate_number: &str) -> Result<Certificate>;

    fn get_by_id(&self, id: CertificateId) -> Result<Certificate>;

    /// Compare-and-set on the stored status: succeeds only while the stored
    /// status is still `from`. A lost race is reported as `Conflict`.
    fn update_status(
        &self,
        id: CertificateId,
        from: CertificateStatus,
        to: CertificateStatus,
    ) -> Result<Certificate>;
}

/// Durable storage for certificate documents, keyed by relative path.
pub trait BlobStore: Send + Sync {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// `NotFound` (entity `"document"`) when no blob exists at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Idempotent: deleting a missing blob succeeds.
    fn delete(&self, path: &str) -> Result<()>;

    fn exists(&self, path: &str) -> Result<bool>;
}
