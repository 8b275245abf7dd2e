// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document download — decrypts a stored certificate for a single response.
//
// Only usable certificates (stored `valid`, not past expiry) are served. The
// decrypted document lives in a `TransientPlaintext` owned by the response
// and is wiped when the response is dropped; nothing is written to disk.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use medcert_core::error::{MedcertError, Result};
use medcert_core::types::{CertificateId, CertificateStatus};
use medcert_security::{DocumentVault, TransientPlaintext, is_encrypted, verify_hash};

use crate::store::{BlobStore, CertificateStore};

/// A decrypted certificate ready to send.
#[derive(Debug)]
pub struct DownloadDocument {
    pub certificate_number: String,
    /// `certificate-<number>.pdf`
    pub filename: String,
    pub content: TransientPlaintext,
}

/// Outcome of a download request for an existing certificate.
#[derive(Debug)]
pub enum DownloadOutcome {
    Available(DownloadDocument),
    /// The certificate exists but is not usable; carries its effective
    /// status.
    NotAvailable { status: CertificateStatus },
}

/// Serves certificate documents.
pub struct DocumentAccess {
    certificates: Arc<dyn CertificateStore>,
    blobs: Arc<dyn BlobStore>,
    vault: Option<Arc<DocumentVault>>,
}

impl DocumentAccess {
    pub fn new(
        certificates: Arc<dyn CertificateStore>,
        blobs: Arc<dyn BlobStore>,
        vault: Option<Arc<DocumentVault>>,
    ) -> Self {
        Self {
            certificates,
            blobs,
            vault,
        }
    }

    /// Open the document of certificate `id` as of `now`.
    ///
    /// Errors keep their causes apart: `NotFound` (entity `certificate`)
    /// for an unknown id, `NotFound` (entity `document`) for a missing blob,
    /// `UnknownKeyVersion`/`Decryption` for key or ciphertext problems, and
    /// `IntegrityMismatch` when the document no longer matches its hash.
    #[instrument(skip(self, now), fields(certificate_id = %id))]
    pub fn open(&self, id: CertificateId, now: DateTime<Utc>) -> Result<DownloadOutcome> {
        let cert = self.certificates.get_by_id(id)?;

        let status = cert.effective_status(now);
        if status != CertificateStatus::Valid {
            info!(number = %cert.certificate_number, %status, "document not available");
            return Ok(DownloadOutcome::NotAvailable { status });
        }

        let blob = self.blobs.read(&cert.encrypted_document_path)?;
        let content = if is_encrypted(&blob) {
            let vault = self
                .vault
                .as_ref()
                .ok_or_else(|| MedcertError::Decryption("no document key configured".into()))?;
            vault.decrypt(&blob)?
        } else {
            warn!(number = %cert.certificate_number, "serving unencrypted document");
            TransientPlaintext::new(blob)
        };

        verify_hash(content.as_bytes(), &cert.pdf_hash)?;

        debug!(len = content.len(), "document decrypted for download");
        Ok(DownloadOutcome::Available(DownloadDocument {
            filename: cert.document_filename(),
            certificate_number: cert.certificate_number,
            content,
        }))
    }
}
