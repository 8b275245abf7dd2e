// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — initialises the certificate backends and exposes
// the operations the HTTP handlers call.
//
// All calls here are synchronous (rusqlite, age, lopdf); handlers run them
// on the blocking pool. `AuditLog` is `Send` but not `Sync`, so it sits
// behind a `Mutex`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use medcert_certificates::{
    AdminCapability, BlobStore, CertificateAdmin, CertificateIssuer, CertificateVerifier,
    DocumentAccess, DownloadOutcome, FsBlobStore, IssuedCertificate, SqliteStore,
    VerificationVerdict,
};
use medcert_core::AppConfig;
use medcert_core::error::{MedcertError, Result};
use medcert_core::types::{Certificate, CertificateId, CertificateStatus, TransactionId};
use medcert_document::CertificateRenderer;
use medcert_security::audit::{AuditAction, AuditLog};
#[cfg(test)]
use medcert_security::audit::AuditEntry;
use medcert_security::{DocumentVault, IssuerSigner};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use super::data_dir;
use crate::config::EnvConfig;

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "medcert.db";
const AUDIT_FILE: &str = "audit.db";

/// Already-opened backends, for wiring services without touching the
/// filesystem layout.
pub struct Backends {
    pub store: Arc<SqliteStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub vault: Option<DocumentVault>,
    pub signer: IssuerSigner,
    pub admin_token: Option<Zeroizing<String>>,
    /// Only consulted when `config.audit_enabled`.
    pub audit_log: Option<AuditLog>,
}

/// Shared application services handed to every handler.
///
/// All fields are cheaply cloneable (Arc-wrapped).
#[derive(Clone)]
pub struct AppServices {
    issuer: Arc<CertificateIssuer>,
    verifier: Arc<CertificateVerifier>,
    access: Arc<DocumentAccess>,
    admin: Arc<CertificateAdmin>,
    audit_log: Option<Arc<Mutex<AuditLog>>>,
    admin_token_digest: Option<[u8; 32]>,
    config: Arc<AppConfig>,
}

impl AppServices {
    /// Initialise all services. Call once at startup.
    ///
    /// Creates the data directory, loads `config.json`, and opens the
    /// certificate database, document store, and audit log.
    pub fn init(env: EnvConfig) -> Result<Self> {
        let dir = data_dir::data_dir(env.data_dir.as_deref())?;
        info!(path = %dir.display(), "initialising app services");

        let config = match load_config(&dir) {
            Some(config) => config,
            None => {
                let config = AppConfig::default();
                if !dir.join(CONFIG_FILE).exists() {
                    persist_config(&dir, &config)?;
                    info!("wrote default {CONFIG_FILE}");
                }
                config
            }
        };

        let store = SqliteStore::open(dir.join(DATABASE_FILE))?;
        let blob_root = config
            .blob_dir
            .clone()
            .unwrap_or_else(|| dir.join("documents"));
        let blobs = FsBlobStore::new(blob_root)?;
        let audit_log = if config.audit_enabled {
            Some(AuditLog::open(dir.join(AUDIT_FILE))?)
        } else {
            None
        };

        let services = Self::from_backends(
            Backends {
                store: Arc::new(store),
                blobs: Arc::new(blobs),
                vault: env.vault,
                signer: env.signer,
                admin_token: env.admin_token,
                audit_log,
            },
            config,
        );
        info!("app services initialised");
        Ok(services)
    }

    pub fn from_backends(backends: Backends, config: AppConfig) -> Self {
        let Backends {
            store,
            blobs,
            vault,
            signer,
            admin_token,
            audit_log,
        } = backends;

        let vault = vault.map(Arc::new);
        let signer = Arc::new(signer);

        let issuer = CertificateIssuer::new(
            store.clone(),
            store.clone(),
            blobs.clone(),
            vault.clone(),
            signer.clone(),
        )
        .with_renderer(CertificateRenderer::new(config.paper_size))
        .with_fallback(config.encryption_fallback);
        let verifier = CertificateVerifier::new(store.clone(), signer);
        let access = DocumentAccess::new(store.clone(), blobs, vault);
        let admin = CertificateAdmin::new(store);

        let audit_log = audit_log
            .filter(|_| config.audit_enabled)
            .map(|log| Arc::new(Mutex::new(log)));

        Self {
            issuer: Arc::new(issuer),
            verifier: Arc::new(verifier),
            access: Arc::new(access),
            admin: Arc::new(admin),
            audit_log,
            admin_token_digest: admin_token.map(|t| token_digest(&t)),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // -- Certificates --------------------------------------------------------

    /// Issue the certificate for a completed transaction.
    pub fn issue(&self, transaction_id: TransactionId, now: DateTime<Utc>) -> Result<IssuedCertificate> {
        let subject = format!("tx:{transaction_id}");
        match self.issuer.issue(transaction_id, now) {
            Ok(issued) => {
                let number = issued.certificate.certificate_number.as_str();
                self.audit(AuditAction::Issue, &subject, true, Some(number));
                if !issued.document_encrypted {
                    self.audit(
                        AuditAction::PlaintextFallback,
                        number,
                        true,
                        Some("document stored without encryption"),
                    );
                }
                Ok(issued)
            }
            Err(e) => {
                self.audit(AuditAction::Issue, &subject, false, Some(e.kind().as_str()));
                Err(e)
            }
        }
    }

    /// Verify a certificate number or QR token.
    pub fn verify(&self, input: &str, qr_token: Option<&str>, now: DateTime<Utc>) -> VerificationVerdict {
        let verdict = self.verifier.verify(input, qr_token, now);
        let subject = if verdict.found() {
            verdict.certificate_number.as_str()
        } else {
            "unknown"
        };
        self.audit(AuditAction::Verify, subject, verdict.found(), Some(verdict.status.as_str()));
        verdict
    }

    /// Open a certificate document for download.
    pub fn download(&self, id: CertificateId, now: DateTime<Utc>) -> Result<DownloadOutcome> {
        let result = self.access.open(id, now);
        match &result {
            Ok(DownloadOutcome::Available(doc)) => {
                self.audit(AuditAction::Download, &doc.certificate_number, true, None)
            }
            Ok(DownloadOutcome::NotAvailable { status }) => {
                self.audit(AuditAction::Download, &id.to_string(), false, Some(status.as_str()))
            }
            Err(e) => self.audit(AuditAction::Download, &id.to_string(), false, Some(e.kind().as_str())),
        }
        result
    }

    /// Exchange a presented admin token for a capability.
    ///
    /// Fails with `Unauthorized` when no token is configured, none was
    /// presented, or it does not match.
    pub fn authorize(&self, presented: Option<&str>) -> Result<AdminCapability> {
        let expected = self.admin_token_digest.ok_or(MedcertError::Unauthorized)?;
        let presented = presented.ok_or(MedcertError::Unauthorized)?;
        // Comparing digests keeps the comparison independent of token length.
        if token_digest(presented) != expected {
            warn!("admin token rejected");
            return Err(MedcertError::Unauthorized);
        }
        Ok(AdminCapability::new("admin-token"))
    }

    /// Apply an administrative status change.
    pub fn change_status(
        &self,
        capability: &AdminCapability,
        id: CertificateId,
        target: CertificateStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Certificate> {
        let result = self.admin.transition(capability, id, target, now);
        let details = match reason {
            Some(reason) => format!("{target} by {}: {reason}", capability.actor()),
            None => format!("{target} by {}", capability.actor()),
        };
        match &result {
            Ok(cert) => self.audit(AuditAction::StatusChange, &cert.certificate_number, true, Some(&details)),
            Err(_) => self.audit(AuditAction::StatusChange, &id.to_string(), false, Some(&details)),
        }
        result
    }

    // -- Audit ---------------------------------------------------------------

    /// Record an audit event. Failures are logged, never propagated.
    pub fn audit(&self, action: AuditAction, subject: &str, success: bool, details: Option<&str>) {
        let Some(audit_log) = &self.audit_log else {
            return;
        };
        match audit_log.lock() {
            Ok(log) => {
                if let Err(e) = log.record(action, subject, success, details) {
                    error!(error = %e, "failed to record audit entry");
                }
            }
            Err(_) => error!("audit log lock poisoned"),
        }
    }

    /// Audit entries recorded against `subject`, oldest first.
    #[cfg(test)]
    pub fn audit_entries_for(&self, subject: &str) -> Result<Vec<AuditEntry>> {
        let Some(audit_log) = &self.audit_log else {
            return Ok(Vec::new());
        };
        let log = audit_log
            .lock()
            .map_err(|_| MedcertError::Database("audit log lock poisoned".into()))?;
        log.entries_for_subject(subject)
    }
}

fn token_digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

// -- Config persistence ------------------------------------------------------

fn load_config(data_dir: &Path) -> Option<AppConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&data) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring invalid config file");
            None
        }
    }
}

fn persist_config(data_dir: &Path, config: &AppConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
