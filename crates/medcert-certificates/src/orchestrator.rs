// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate issuance — turns a completed transaction into exactly one
// certificate.
//
// Order of work:
//
//   1. load the transaction, reject if a certificate already exists
//   2. load service and both party profiles (no partial provenance)
//   3. pick a free certificate number
//   4. provisional QR, verification hash, final QR
//   5. render and self-check the PDF
//   6. document hash and issuer signature
//   7. encrypt (or take the configured fallback) and write the blob
//   8. insert the record; the blob is removed if the insert does not commit
//
// The insert is the last step, so an interrupted issuance never leaves a
// record without a document. The UNIQUE constraint on the transaction id
// decides races between concurrent issuers.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Timelike, Utc};
use tracing::{debug, error, info, instrument, warn};

use medcert_core::config::EncryptionFallback;
use medcert_core::error::{MedcertError, Result};
use medcert_core::types::{
    Certificate, CertificateId, CertificateMetadata, CertificateStatus, CertificateSubject,
    TransactionId, TransactionStatus, certificate_expiry, certificate_number,
};
use medcert_document::{
    CertificateRenderer, CertificateView, PdfReader, QrImage, QrPayload, RENDERER_VERSION,
};
use medcert_security::{
    CanonicalFields, CanonicalVersion, DocumentVault, IssuerSigner, TransientPlaintext,
    compute_document_hash, compute_verification_hash,
};

use crate::store::{BlobStore, CertificateStore, TransactionStore};

/// Attempts at finding a free certificate number before giving up.
pub const MAX_NUMBER_ATTEMPTS: u32 = 5;

/// Result of a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub certificate: Certificate,
    /// `false` when the document was stored as plaintext under
    /// [`EncryptionFallback::StorePlaintext`].
    pub document_encrypted: bool,
}

/// Issues certificates for completed transactions.
pub struct CertificateIssuer {
    transactions: Arc<dyn TransactionStore>,
    certificates: Arc<dyn CertificateStore>,
    blobs: Arc<dyn BlobStore>,
    /// `None` when no document key is configured; every encryption attempt
    /// then fails and the fallback policy decides.
    vault: Option<Arc<DocumentVault>>,
    signer: Arc<IssuerSigner>,
    renderer: CertificateRenderer,
    fallback: EncryptionFallback,
}

impl CertificateIssuer {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        certificates: Arc<dyn CertificateStore>,
        blobs: Arc<dyn BlobStore>,
        vault: Option<Arc<DocumentVault>>,
        signer: Arc<IssuerSigner>,
    ) -> Self {
        Self {
            transactions,
            certificates,
            blobs,
            vault,
            signer,
            renderer: CertificateRenderer::a4(),
            fallback: EncryptionFallback::Abort,
        }
    }

    pub fn with_renderer(mut self, renderer: CertificateRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_fallback(mut self, fallback: EncryptionFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Issue the certificate for `transaction_id`, timestamped `now`.
    ///
    /// Errors: `NotFound` for a missing transaction, service, or profile;
    /// `Conflict` when a certificate already exists (including when a
    /// concurrent issuer wins the race); `Validation` when the transaction
    /// is not completed. Any failure leaves neither a record nor a blob.
    #[instrument(skip(self, now), fields(transaction_id = %transaction_id))]
    pub fn issue(
        &self,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<IssuedCertificate> {
        let result = self.issue_inner(transaction_id, now);
        if let Err(ref e) = result {
            match e {
                MedcertError::Conflict(_) => {
                    info!(kind = %e.kind(), "certificate already exists; issuance rejected")
                }
                _ => error!(kind = %e.kind(), error = %e, "certificate issuance aborted"),
            }
        }
        result
    }

    fn issue_inner(
        &self,
        transaction_id: TransactionId,
        now: DateTime<Utc>,
    ) -> Result<IssuedCertificate> {
        let tx = self.transactions.get_transaction(transaction_id)?;

        if self.certificates.exists_for_transaction(transaction_id)? {
            return Err(already_issued(transaction_id));
        }

        if tx.status != TransactionStatus::Completed {
            return Err(MedcertError::Validation(format!(
                "transaction {transaction_id} is {}, not completed",
                tx.status.as_str()
            )));
        }

        let service = self.transactions.get_service(tx.service_id)?;
        let buyer = self.transactions.get_profile(tx.buyer_id)?;
        let seller = self.transactions.get_profile(tx.seller_id)?;
        let subject = CertificateSubject::from_records(&tx, &service, &buyer, &seller);

        let base = truncate_to_millis(now);
        for attempt in 0..MAX_NUMBER_ATTEMPTS {
            let issued_at = base + TimeDelta::milliseconds(i64::from(attempt));
            let number = certificate_number(transaction_id, issued_at);
            if self.certificates.number_exists(&number)? {
                debug!(%number, attempt, "certificate number taken");
                continue;
            }

            match self.build_and_store(&subject, number, issued_at) {
                Ok(issued) => return Ok(issued),
                Err(MedcertError::Conflict(reason)) => {
                    // Either a concurrent issuer won, or only the number
                    // collided. The transaction check tells them apart.
                    if self.certificates.exists_for_transaction(transaction_id)? {
                        return Err(already_issued(transaction_id));
                    }
                    warn!(attempt, %reason, "certificate number collided at insert; retrying");
                }
                Err(e) => return Err(e),
            }
        }

        // Not a Conflict: this transaction has no certificate yet.
        error!(%transaction_id, attempts = MAX_NUMBER_ATTEMPTS, "no free certificate number");
        Err(MedcertError::Storage(format!(
            "no free certificate number for transaction {transaction_id} after {MAX_NUMBER_ATTEMPTS} attempts"
        )))
    }

    fn build_and_store(
        &self,
        subject: &CertificateSubject,
        number: String,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedCertificate> {
        let expires_at = certificate_expiry(issued_at)?;
        let version = CanonicalVersion::CURRENT;

        // First pass: the payload without its hash must already fit a QR
        // symbol before anything is sealed.
        let provisional = QrPayload::provisional(&number, subject, issued_at, expires_at);
        QrImage::render(&provisional)?;

        let fields = CanonicalFields::new(&number, subject, issued_at, expires_at);
        let verification_hash = compute_verification_hash(&fields, version)?;

        // Second pass: embed the real hash and re-render.
        let payload = provisional.finalize(&verification_hash);
        let qr = QrImage::render(&payload)?;
        debug!(%number, qr_width = qr.width(), "QR finalised");

        let rendered = TransientPlaintext::new(self.renderer.render(&CertificateView {
            certificate_number: &number,
            issued_at,
            expires_at,
            subject,
            verification_hash: &verification_hash,
            qr: &qr,
        })?);

        let pages = PdfReader::from_bytes(rendered.as_bytes())?.page_count();
        if pages != 1 {
            return Err(MedcertError::PdfError(format!(
                "rendered certificate has {pages} pages, expected 1"
            )));
        }

        let pdf_hash = compute_document_hash(rendered.as_bytes());
        let digital_signature = self.signer.compute_signature(&fields, version)?;

        // Blob paths are unique per attempt: a concurrent issuer holding the
        // same number never overwrites or deletes this document.
        let id = CertificateId::new();
        let stored = self.seal_document(&number, id, &rendered)?;
        drop(rendered);

        self.blobs.write(&stored.path, &stored.bytes)?;
        let guard = BlobGuard::new(self.blobs.as_ref(), &stored.path);

        let certificate = Certificate {
            id,
            certificate_number: number,
            status: CertificateStatus::Valid,
            issued_at,
            expires_at,
            subject: subject.clone(),
            qr_code_data: qr.to_data_url()?,
            qr_token: qr.token().to_owned(),
            pdf_hash,
            verification_hash,
            digital_signature,
            encrypted_document_path: stored.path.clone(),
            metadata: CertificateMetadata {
                service_id: subject.service_id,
                buyer_id: subject.buyer_id,
                seller_id: subject.seller_id,
                generated_at: issued_at,
                canonical_version: version.as_u16(),
                renderer_version: RENDERER_VERSION.to_owned(),
                key_version: stored.key_version,
                document_encrypted: stored.key_version.is_some(),
            },
        };

        let certificate = self.certificates.insert(certificate)?;
        guard.commit();

        info!(
            number = %certificate.certificate_number,
            certificate_id = %certificate.id,
            encrypted = certificate.metadata.document_encrypted,
            "certificate issued"
        );
        Ok(IssuedCertificate {
            document_encrypted: certificate.metadata.document_encrypted,
            certificate,
        })
    }

    /// Encrypt the rendered document, or apply the fallback policy when
    /// encryption is impossible.
    fn seal_document(
        &self,
        number: &str,
        id: CertificateId,
        rendered: &TransientPlaintext,
    ) -> Result<StoredDocument> {
        let encrypted = match &self.vault {
            Some(vault) => vault
                .encrypt(rendered.as_bytes())
                .map(|bytes| (bytes, vault.active_version())),
            None => Err(MedcertError::Encryption("no document key configured".into())),
        };

        match (encrypted, self.fallback) {
            (Ok((bytes, key_version)), _) => Ok(StoredDocument {
                path: format!("certificates/{number}-{id}.pdf.enc"),
                bytes,
                key_version: Some(key_version),
            }),
            (Err(e), EncryptionFallback::Abort) => Err(e),
            (Err(e), EncryptionFallback::StorePlaintext) => {
                warn!(
                    %number,
                    error = %e,
                    "document encryption failed; storing plaintext per configured fallback"
                );
                Ok(StoredDocument {
                    path: format!("certificates/{number}-{id}.pdf"),
                    bytes: rendered.as_bytes().to_vec(),
                    key_version: None,
                })
            }
        }
    }
}

struct StoredDocument {
    path: String,
    bytes: Vec<u8>,
    key_version: Option<u16>,
}

/// Deletes a written blob on drop unless committed.
struct BlobGuard<'a> {
    blobs: &'a dyn BlobStore,
    path: &'a str,
    armed: bool,
}

impl<'a> BlobGuard<'a> {
    fn new(blobs: &'a dyn BlobStore, path: &'a str) -> Self {
        Self {
            blobs,
            path,
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for BlobGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.blobs.delete(self.path) {
            Ok(()) => debug!(path = self.path, "orphaned document removed"),
            Err(e) => error!(path = self.path, error = %e, "failed to remove orphaned document"),
        }
    }
}

fn already_issued(transaction_id: TransactionId) -> MedcertError {
    MedcertError::Conflict(format!(
        "certificate already exists for transaction {transaction_id}"
    ))
}

/// Stored timestamps and the certificate number use millisecond precision.
fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(t.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::MemoryBlobStore;
    use crate::fixtures::{self, TestEnv};
    use crate::sqlite::SqliteStore;
    use medcert_core::public_errors::{Operation, public_error};
    use medcert_core::types::{Money, UserId};
    use medcert_security::{is_encrypted, verify_hash};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn issues_certificate_for_scenario_transaction() {
        let env = TestEnv::new();
        let now = fixtures::issued_at();
        let issued = env.issuer().issue(TransactionId(42), now).expect("issue");
        let cert = &issued.certificate;

        assert!(issued.document_encrypted);
        assert!(cert.certificate_number.contains("42"));
        assert_eq!(cert.certificate_number, certificate_number(TransactionId(42), now));
        assert_eq!(cert.status, CertificateStatus::Valid);
        assert_eq!(cert.expires_at, certificate_expiry(cert.issued_at).unwrap());
        assert_eq!(cert.subject.service_name, "Tuberculosis Screening");
        assert_eq!(cert.subject.icd11_code, "1A01");
        assert_eq!(cert.subject.quantity, 3);
        assert_eq!(cert.subject.unit_price, Money::from_cents(5000));
        assert_eq!(cert.subject.buyer_name, "Acme Insurance");
        assert_eq!(cert.subject.seller_name, "City Clinic");

        // The stored hash recomputes from the same logical inputs.
        let recomputed =
            compute_verification_hash(&CanonicalFields::of(cert), CanonicalVersion::V2).unwrap();
        assert_eq!(recomputed, cert.verification_hash);
        assert!(cert.digital_signature.starts_with("hmac-sha256:"));

        // The QR token carries the final hash, not the placeholder.
        let payload = QrPayload::from_token(&cert.qr_token).unwrap();
        assert_eq!(payload.verification_hash, cert.verification_hash);
        assert_eq!(payload, QrPayload::for_certificate(cert));
        assert!(cert.qr_code_data.starts_with("data:image/png;base64,"));

        assert_eq!(cert.metadata.canonical_version, 2);
        assert_eq!(cert.metadata.renderer_version, RENDERER_VERSION);
        assert_eq!(cert.metadata.key_version, Some(1));

        // Record persisted and readable.
        assert_eq!(env.store.get_by_number(&cert.certificate_number).unwrap(), *cert);
    }

    #[test]
    fn stored_document_is_encrypted_and_matches_pdf_hash() {
        let env = TestEnv::new();
        let cert = env
            .issuer()
            .issue(TransactionId(42), fixtures::issued_at())
            .unwrap()
            .certificate;

        assert!(cert.encrypted_document_path.ends_with(".pdf.enc"));
        let blob = env.blobs.read(&cert.encrypted_document_path).unwrap();
        assert!(is_encrypted(&blob));
        assert!(!blob.windows(5).any(|w| w == b"%PDF-"));

        let plaintext = env.vault.decrypt(&blob).unwrap();
        verify_hash(plaintext.as_bytes(), &cert.pdf_hash).expect("pdf hash matches");
        assert_eq!(PdfReader::from_bytes(plaintext.as_bytes()).unwrap().page_count(), 1);
    }

    #[test]
    fn second_issuance_conflicts() {
        let env = TestEnv::new();
        let issuer = env.issuer();
        issuer.issue(TransactionId(42), fixtures::issued_at()).unwrap();

        let later = fixtures::issued_at() + TimeDelta::seconds(5);
        let err = issuer.issue(TransactionId(42), later).unwrap_err();
        assert!(matches!(err, MedcertError::Conflict(_)), "got {err:?}");
        assert_eq!(env.blobs.len(), 1, "no second document written");
    }

    #[test]
    fn missing_records_fail_with_not_found() {
        let env = TestEnv::new();
        let err = env.issuer().issue(TransactionId(999), fixtures::issued_at()).unwrap_err();
        assert!(matches!(err, MedcertError::NotFound { entity: "transaction", .. }));

        // Transaction referencing a seller with no profile.
        fixtures::insert_completed_transaction(&env.store, TransactionId(60), UserId(100), UserId(777));
        let err = env.issuer().issue(TransactionId(60), fixtures::issued_at()).unwrap_err();
        assert!(matches!(err, MedcertError::NotFound { entity: "profile", .. }));
        assert!(env.blobs.is_empty());
        assert!(!env.store.exists_for_transaction(TransactionId(60)).unwrap());
    }

    #[test]
    fn pending_transaction_is_rejected() {
        let env = TestEnv::new();
        fixtures::insert_pending_transaction(&env.store, TransactionId(50));
        let err = env.issuer().issue(TransactionId(50), fixtures::issued_at()).unwrap_err();
        assert!(matches!(err, MedcertError::Validation(_)));
    }

    #[test]
    fn missing_render_field_fails_closed() {
        let env = TestEnv::new();
        env.store
            .execute_raw("UPDATE profiles SET organization_name = '' WHERE user_id = 200")
            .unwrap();
        let err = env.issuer().issue(TransactionId(42), fixtures::issued_at()).unwrap_err();
        assert!(matches!(err, MedcertError::MissingField("seller_name")), "got {err:?}");
        assert!(env.blobs.is_empty());
    }

    #[test]
    fn number_collision_advances_timestamp() {
        let env = TestEnv::new();
        let now = fixtures::issued_at();
        let taken = certificate_number(TransactionId(42), now);
        env.store
            .insert(fixtures::bare_certificate(TransactionId(43), &taken))
            .unwrap();

        let cert = env.issuer().issue(TransactionId(42), now).unwrap().certificate;
        assert_ne!(cert.certificate_number, taken);
        assert_eq!(cert.issued_at, now + TimeDelta::milliseconds(1));
    }

    #[test]
    fn exhausted_numbers_fail_as_server_error() {
        let env = TestEnv::new();
        let now = fixtures::issued_at();
        for attempt in 0..MAX_NUMBER_ATTEMPTS {
            let taken = certificate_number(
                TransactionId(42),
                now + TimeDelta::milliseconds(i64::from(attempt)),
            );
            let holder = TransactionId(1000 + i64::from(attempt));
            env.store.insert(fixtures::bare_certificate(holder, &taken)).unwrap();
        }

        let err = env.issuer().issue(TransactionId(42), now).unwrap_err();
        assert!(matches!(err, MedcertError::Storage(_)), "got {err:?}");
        assert!(!env.store.exists_for_transaction(TransactionId(42)).unwrap());
        assert!(env.blobs.is_empty());

        let public = public_error(Operation::Issue, &err);
        assert_eq!(public.status, 500);
        assert_eq!(public.message, "failed to generate certificate");
    }

    #[test]
    fn issued_at_is_truncated_to_millis() {
        let env = TestEnv::new();
        let now = fixtures::issued_at() + TimeDelta::nanoseconds(1_234_567);
        let cert = env.issuer().issue(TransactionId(42), now).unwrap().certificate;
        assert_eq!(cert.issued_at, fixtures::issued_at() + TimeDelta::milliseconds(1));
    }

    /// Certificate store whose pre-insert checks are stale, as when two
    /// issuers pass them before either inserts.
    struct StaleCheck {
        inner: Arc<SqliteStore>,
        stale: AtomicBool,
    }

    impl CertificateStore for StaleCheck {
        fn exists_for_transaction(&self, id: TransactionId) -> Result<bool> {
            if self.stale.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.inner.exists_for_transaction(id)
        }
        fn number_exists(&self, n: &str) -> Result<bool> {
            if self.stale.load(Ordering::SeqCst) {
                return Ok(false);
            }
            self.inner.number_exists(n)
        }
        fn insert(&self, c: Certificate) -> Result<Certificate> {
            self.stale.store(false, Ordering::SeqCst);
            self.inner.insert(c)
        }
        fn get_by_number(&self, n: &str) -> Result<Certificate> {
            self.inner.get_by_number(n)
        }
        fn get_by_id(&self, id: CertificateId) -> Result<Certificate> {
            self.inner.get_by_id(id)
        }
        fn update_status(
            &self,
            id: CertificateId,
            from: CertificateStatus,
            to: CertificateStatus,
        ) -> Result<Certificate> {
            self.inner.update_status(id, from, to)
        }
    }

    #[test]
    fn race_loser_gets_conflict_and_leaves_no_blob() {
        let env = TestEnv::new();
        let winner = env.issuer().issue(TransactionId(42), fixtures::issued_at()).unwrap();

        let racing = Arc::new(StaleCheck {
            inner: Arc::clone(&env.store),
            stale: AtomicBool::new(true),
        });
        let loser = CertificateIssuer::new(
            env.store.clone(),
            racing,
            env.blobs.clone(),
            Some(env.vault.clone()),
            env.signer.clone(),
        );
        let later = fixtures::issued_at() + TimeDelta::seconds(1);
        let err = loser.issue(TransactionId(42), later).unwrap_err();
        assert!(matches!(err, MedcertError::Conflict(_)), "got {err:?}");

        assert_eq!(env.blobs.len(), 1, "loser's document must be cleaned up");
        assert!(env.blobs.exists(&winner.certificate.encrypted_document_path).unwrap());
    }

    #[test]
    fn same_millisecond_race_keeps_winner_document() {
        let env = TestEnv::new();
        let now = fixtures::issued_at();
        let winner = env.issuer().issue(TransactionId(42), now).unwrap().certificate;

        let loser = CertificateIssuer::new(
            env.store.clone(),
            Arc::new(StaleCheck {
                inner: Arc::clone(&env.store),
                stale: AtomicBool::new(true),
            }),
            env.blobs.clone(),
            Some(env.vault.clone()),
            env.signer.clone(),
        );
        let err = loser.issue(TransactionId(42), now).unwrap_err();
        assert!(matches!(err, MedcertError::Conflict(_)), "got {err:?}");

        assert_eq!(env.blobs.len(), 1);
        assert!(env.blobs.exists(&winner.encrypted_document_path).unwrap());
        match env.access().open(winner.id, now).unwrap() {
            crate::download::DownloadOutcome::Available(doc) => {
                verify_hash(doc.content.as_bytes(), &winner.pdf_hash).unwrap()
            }
            crate::download::DownloadOutcome::NotAvailable { status } => {
                panic!("winner not available: {status}")
            }
        }
    }

    /// Certificate store whose insert always fails.
    struct FailingInsert(Arc<SqliteStore>);

    impl CertificateStore for FailingInsert {
        fn exists_for_transaction(&self, id: TransactionId) -> Result<bool> {
            self.0.exists_for_transaction(id)
        }
        fn number_exists(&self, n: &str) -> Result<bool> {
            self.0.number_exists(n)
        }
        fn insert(&self, _: Certificate) -> Result<Certificate> {
            Err(MedcertError::Database("disk I/O error".into()))
        }
        fn get_by_number(&self, n: &str) -> Result<Certificate> {
            self.0.get_by_number(n)
        }
        fn get_by_id(&self, id: CertificateId) -> Result<Certificate> {
            self.0.get_by_id(id)
        }
        fn update_status(
            &self,
            id: CertificateId,
            from: CertificateStatus,
            to: CertificateStatus,
        ) -> Result<Certificate> {
            self.0.update_status(id, from, to)
        }
    }

    #[test]
    fn failed_insert_removes_written_document() {
        let env = TestEnv::new();
        let issuer = CertificateIssuer::new(
            env.store.clone(),
            Arc::new(FailingInsert(env.store.clone())),
            env.blobs.clone(),
            Some(env.vault.clone()),
            env.signer.clone(),
        );
        let err = issuer.issue(TransactionId(42), fixtures::issued_at()).unwrap_err();
        assert!(matches!(err, MedcertError::Database(_)));
        assert!(env.blobs.is_empty(), "orphaned document left behind");
    }

    #[test]
    fn encryption_failure_aborts_by_default() {
        let env = TestEnv::new();
        let issuer = CertificateIssuer::new(
            env.store.clone(),
            env.store.clone(),
            env.blobs.clone(),
            None,
            env.signer.clone(),
        );
        let err = issuer.issue(TransactionId(42), fixtures::issued_at()).unwrap_err();
        assert!(matches!(err, MedcertError::Encryption(_)));
        assert!(env.blobs.is_empty());
        assert!(!env.store.exists_for_transaction(TransactionId(42)).unwrap());
    }

    #[test]
    fn explicit_plaintext_fallback_is_recorded() {
        let env = TestEnv::new();
        let issuer = CertificateIssuer::new(
            env.store.clone(),
            env.store.clone(),
            env.blobs.clone(),
            None,
            env.signer.clone(),
        )
        .with_fallback(EncryptionFallback::StorePlaintext);

        let issued = issuer.issue(TransactionId(42), fixtures::issued_at()).unwrap();
        assert!(!issued.document_encrypted);
        let cert = issued.certificate;
        assert!(!cert.metadata.document_encrypted);
        assert_eq!(cert.metadata.key_version, None);
        assert!(cert.encrypted_document_path.ends_with(".pdf"));

        let blob = env.blobs.read(&cert.encrypted_document_path).unwrap();
        assert!(!is_encrypted(&blob));
        verify_hash(&blob, &cert.pdf_hash).unwrap();
    }

    #[test]
    fn independent_issuers_share_one_store() {
        let env = TestEnv::new();
        let blobs = Arc::new(MemoryBlobStore::new());
        let a = env.issuer();
        let b = CertificateIssuer::new(
            env.store.clone(),
            env.store.clone(),
            blobs.clone(),
            Some(env.vault.clone()),
            env.signer.clone(),
        );
        a.issue(TransactionId(42), fixtures::issued_at()).unwrap();
        assert!(matches!(
            b.issue(TransactionId(42), fixtures::issued_at()),
            Err(MedcertError::Conflict(_))
        ));
        assert!(blobs.is_empty());
    }
}
