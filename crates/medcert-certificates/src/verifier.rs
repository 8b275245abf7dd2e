// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate verification — public, unauthenticated checks of a
// certificate number or QR token.
//
// Nothing the client sends is trusted beyond locating the record: hashes are
// recomputed from the stored canonical fields and the issuer signature is
// checked server-side. Every failure, including tampering, collapses into a
// `not_found` verdict so callers learn nothing about why a record was
// rejected. The signature itself never leaves the server.
//
// Which fields a verdict attests depends on the canonical version the record
// was sealed with. Version 2 covers everything the verdict shows. Version 1
// records predate that: their organization names and service description
// are display text read from the row, not checked against the hash.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument, warn};

use medcert_core::error::{MedcertError, Result};
use medcert_core::types::{
    Certificate, CertificateStatus, Money, ServiceId, TransactionId, UserId,
};
use medcert_document::QrPayload;
use medcert_security::{CanonicalFields, CanonicalVersion, IssuerSigner, compute_verification_hash};

use crate::store::CertificateStore;

/// Status reported by a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictStatus {
    Valid,
    Expired,
    Revoked,
    Suspended,
    NotFound,
}

impl VerdictStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Suspended => "suspended",
            Self::NotFound => "not_found",
        }
    }

    fn message(&self) -> &'static str {
        match self {
            Self::Valid => "Certificate is valid",
            Self::Expired => "Certificate has expired",
            Self::Revoked => "Certificate has been revoked",
            Self::Suspended => "Certificate is suspended",
            Self::NotFound => "Certificate not found",
        }
    }
}

impl From<CertificateStatus> for VerdictStatus {
    fn from(status: CertificateStatus) -> Self {
        match status {
            CertificateStatus::Valid => Self::Valid,
            CertificateStatus::Expired => Self::Expired,
            CertificateStatus::Revoked => Self::Revoked,
            CertificateStatus::Suspended => Self::Suspended,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSummary {
    pub id: ServiceId,
    pub name: String,
    pub description: String,
    pub icd11_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub id: TransactionId,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub transaction_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartySummary {
    pub id: UserId,
    pub organization_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationBlock {
    pub hash: String,
    pub signature_present: bool,
    /// `None` when no QR token accompanied the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_valid: Option<bool>,
}

/// The only output of verification.
///
/// Every field is taken from the stored record after its integrity check
/// passed, never from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationVerdict {
    pub certificate_number: String,
    pub status: VerdictStatus,
    pub is_valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<ServiceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<PartySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seller: Option<PartySummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationBlock>,
}

impl VerificationVerdict {
    fn not_found(certificate_number: impl Into<String>) -> Self {
        let status = VerdictStatus::NotFound;
        Self {
            certificate_number: certificate_number.into(),
            status,
            is_valid: false,
            message: status.message().to_owned(),
            issued_at: None,
            expires_at: None,
            service: None,
            transaction: None,
            buyer: None,
            seller: None,
            verification: None,
        }
    }

    fn for_certificate(cert: &Certificate, status: VerdictStatus, block: VerificationBlock) -> Self {
        let s = &cert.subject;
        Self {
            certificate_number: cert.certificate_number.clone(),
            status,
            is_valid: status == VerdictStatus::Valid,
            message: status.message().to_owned(),
            issued_at: Some(cert.issued_at),
            expires_at: Some(cert.expires_at),
            service: Some(ServiceSummary {
                id: s.service_id,
                name: s.service_name.clone(),
                description: s.service_description.clone(),
                icd11_code: s.icd11_code.clone(),
            }),
            transaction: Some(TransactionSummary {
                id: s.transaction_id,
                quantity: s.quantity,
                unit_price: s.unit_price,
                total_price: s.total_price,
                transaction_date: s.transaction_date,
            }),
            buyer: Some(PartySummary {
                id: s.buyer_id,
                organization_name: s.buyer_name.clone(),
            }),
            seller: Some(PartySummary {
                id: s.seller_id,
                organization_name: s.seller_name.clone(),
            }),
            verification: Some(block),
        }
    }

    /// Whether a certificate record was found and passed integrity checks.
    pub fn found(&self) -> bool {
        self.status != VerdictStatus::NotFound
    }
}

/// Verifies certificates against their stored, sealed fields.
pub struct CertificateVerifier {
    certificates: Arc<dyn CertificateStore>,
    signer: Arc<IssuerSigner>,
}

impl CertificateVerifier {
    pub fn new(certificates: Arc<dyn CertificateStore>, signer: Arc<IssuerSigner>) -> Self {
        Self {
            certificates,
            signer,
        }
    }

    /// Verify `input` (a certificate number or a QR token) at `now`.
    ///
    /// `qr_token` is an optional token scanned alongside; when `input` is
    /// itself a token and no separate one is given, it is checked as well.
    /// Never fails: all problems become a `not_found` verdict.
    #[instrument(skip(self, input, qr_token, now))]
    pub fn verify(
        &self,
        input: &str,
        qr_token: Option<&str>,
        now: DateTime<Utc>,
    ) -> VerificationVerdict {
        let input = input.trim();
        let (number, token) = if QrPayload::looks_like_token(input) {
            match QrPayload::from_token(input) {
                Ok(payload) => (payload.certificate_number, qr_token.or(Some(input))),
                Err(e) => {
                    debug!(error = %e, "unparseable verification token");
                    return VerificationVerdict::not_found("");
                }
            }
        } else {
            (input.to_owned(), qr_token)
        };

        let cert = match self.certificates.get_by_number(&number) {
            Ok(cert) => cert,
            Err(MedcertError::NotFound { .. }) => {
                debug!(%number, "certificate not found");
                return VerificationVerdict::not_found(number);
            }
            Err(e) => {
                warn!(%number, kind = %e.kind(), error = %e, "certificate lookup failed");
                return VerificationVerdict::not_found(number);
            }
        };

        let recomputed = match self.check_integrity(&cert) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(%number, kind = %e.kind(), error = %e, "stored certificate failed integrity check");
                return VerificationVerdict::not_found(number);
            }
        };

        let qr_valid = token.map(|t| qr_matches(t, &cert, &recomputed));
        let status = VerdictStatus::from(cert.effective_status(now));
        debug!(%number, status = status.as_str(), ?qr_valid, "certificate verified");

        VerificationVerdict::for_certificate(
            &cert,
            status,
            VerificationBlock {
                hash: recomputed,
                signature_present: !cert.digital_signature.is_empty(),
                qr_valid,
            },
        )
    }

    /// Recompute the verification hash from stored fields, compare it to the
    /// stored hash, and check the issuer signature. Returns the recomputed
    /// hash.
    fn check_integrity(&self, cert: &Certificate) -> Result<String> {
        let version = CanonicalVersion::from_u16(cert.metadata.canonical_version)?;
        let fields = CanonicalFields::of(cert);
        let recomputed = compute_verification_hash(&fields, version)?;
        if recomputed != cert.verification_hash {
            return Err(MedcertError::IntegrityMismatch {
                expected: cert.verification_hash.clone(),
                actual: recomputed,
            });
        }
        self.signer
            .verify_signature(&fields, version, &cert.digital_signature)?;
        Ok(recomputed)
    }
}

/// A token is valid for a certificate only if it names that certificate and
/// carries the hash recomputed from its stored fields.
fn qr_matches(token: &str, cert: &Certificate, recomputed: &str) -> bool {
    match QrPayload::from_token(token) {
        Ok(payload) => {
            payload.certificate_number == cert.certificate_number
                && payload.verification_hash == recomputed
        }
        Err(_) => false,
    }
}
