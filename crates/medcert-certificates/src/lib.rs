// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// medcert-certificates — Certificate lifecycle.
//
// Issuance, verification, document download, and administrative status
// changes, written against the store traits in `store`. SQLite and
// filesystem implementations of those traits live alongside.

pub mod admin;
pub mod blob;
pub mod download;
pub mod orchestrator;
pub mod sqlite;
pub mod store;
pub mod verifier;

#[cfg(test)]
mod fixtures;

pub use admin::{AdminCapability, CertificateAdmin};
pub use blob::{FsBlobStore, MemoryBlobStore};
pub use download::{DocumentAccess, DownloadDocument, DownloadOutcome};
pub use orchestrator::{CertificateIssuer, IssuedCertificate};
pub use sqlite::SqliteStore;
pub use store::{BlobStore, CertificateStore, TransactionStore};
pub use verifier::{CertificateVerifier, VerdictStatus, VerificationVerdict};
