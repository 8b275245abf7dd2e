// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Medcert certificate issuance.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{MedcertError, Result};

/// Certificates are valid for one calendar year from issuance.
pub const VALIDITY_MONTHS: u32 = 12;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a marketplace transaction.
    TransactionId
);
numeric_id!(
    /// Identifier of a listed medical service.
    ServiceId
);
numeric_id!(
    /// Identifier of a marketplace user (buyer or seller).
    UserId
);

/// Surrogate identifier for an issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(pub Uuid);

impl CertificateId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CertificateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CertificateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CertificateId {
    type Err = MedcertError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| MedcertError::Validation(format!("invalid certificate id {s:?}: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Money
// ---------------------------------------------------------------------------

/// A monetary amount in integer cents.
///
/// Serialised as a fixed two-decimal string (`"50.00"`) so that JSON and the
/// canonical hash input never go through floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money {
    cents: i64,
}

impl Money {
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    pub const fn cents(&self) -> i64 {
        self.cents
    }

    /// Multiply by a quantity, failing on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Option<Self> {
        self.cents.checked_mul(i64::from(quantity)).map(Self::from_cents)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl std::str::FromStr for Money {
    type Err = MedcertError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || MedcertError::Validation(format!("invalid amount {s:?}"));
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, "0"));
        let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !is_digits(whole) || !is_digits(frac) || frac.len() > 2 {
            return Err(invalid());
        }
        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let mut frac_cents: i64 = frac.parse().map_err(|_| invalid())?;
        if frac.len() == 1 {
            frac_cents *= 10;
        }
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac_cents))
            .ok_or_else(invalid)?;
        Ok(Self::from_cents(if negative { -cents } else { cents }))
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Marketplace entities (read-only to the certificate subsystem)
// ---------------------------------------------------------------------------

/// Lifecycle of a marketplace transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = MedcertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(MedcertError::Validation(format!(
                "unknown transaction status {other:?}"
            ))),
        }
    }
}

/// A purchase of a service by a buyer from a seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub service_id: ServiceId,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// The timestamp the certificate attests to: completion if known,
    /// otherwise creation.
    pub fn transaction_date(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }
}

/// A medical service listed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalService {
    pub id: ServiceId,
    pub seller_id: UserId,
    pub name: String,
    pub description: String,
    /// WHO ICD-11 code of the service category, e.g. `1A01`.
    pub icd11_code: String,
    pub unit_price: Money,
}

/// Organisation profile of a marketplace participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: UserId,
    pub organization_name: String,
    pub contact_email: Option<String>,
}

// ---------------------------------------------------------------------------
// Certificates
// ---------------------------------------------------------------------------

/// Persisted certificate status. `Expired` is normally derived at read time
/// (see [`Certificate::effective_status`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    Valid,
    Expired,
    Revoked,
    Suspended,
}

impl CertificateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Suspended => "suspended",
        }
    }

    /// Whether an administrative action may move a certificate from `self`
    /// to `target`. Expiry is time-derived and never a transition target.
    pub fn can_transition_to(&self, target: CertificateStatus) -> bool {
        matches!(
            (self, target),
            (Self::Valid, Self::Suspended)
                | (Self::Valid, Self::Revoked)
                | (Self::Suspended, Self::Revoked)
                | (Self::Suspended, Self::Valid)
        )
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CertificateStatus {
    type Err = MedcertError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "valid" => Ok(Self::Valid),
            "expired" => Ok(Self::Expired),
            "revoked" => Ok(Self::Revoked),
            "suspended" => Ok(Self::Suspended),
            other => Err(MedcertError::Validation(format!(
                "unknown certificate status {other:?}"
            ))),
        }
    }
}

/// Snapshot of the transaction, service, and parties a certificate attests
/// to, captured at issuance. Verification recomputes hashes from this
/// snapshot, never from live marketplace rows or client input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSubject {
    pub transaction_id: TransactionId,
    pub service_id: ServiceId,
    pub service_name: String,
    pub service_description: String,
    pub icd11_code: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub transaction_date: DateTime<Utc>,
    pub buyer_id: UserId,
    pub buyer_name: String,
    pub seller_id: UserId,
    pub seller_name: String,
}

impl CertificateSubject {
    /// Assemble the snapshot from the marketplace records.
    pub fn from_records(
        transaction: &Transaction,
        service: &MedicalService,
        buyer: &Profile,
        seller: &Profile,
    ) -> Self {
        Self {
            transaction_id: transaction.id,
            service_id: service.id,
            service_name: service.name.clone(),
            service_description: service.description.clone(),
            icd11_code: service.icd11_code.clone(),
            quantity: transaction.quantity,
            unit_price: transaction.unit_price,
            total_price: transaction.total_price,
            transaction_date: transaction.transaction_date(),
            buyer_id: buyer.user_id,
            buyer_name: buyer.organization_name.clone(),
            seller_id: seller.user_id,
            seller_name: seller.organization_name.clone(),
        }
    }
}

/// Provenance recorded alongside a certificate for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateMetadata {
    pub service_id: ServiceId,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub generated_at: DateTime<Utc>,
    /// Canonicalization format the hash and signature were computed over.
    pub canonical_version: u16,
    pub renderer_version: String,
    /// Document key version, `None` when the document is stored in plaintext.
    pub key_version: Option<u16>,
    pub document_encrypted: bool,
}

/// An issued certificate. Immutable after issuance except for `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: CertificateId,
    pub certificate_number: String,
    pub status: CertificateStatus,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub subject: CertificateSubject,
    /// PNG data URL of the verification QR code.
    pub qr_code_data: String,
    /// The token encoded in the QR code.
    pub qr_token: String,
    pub pdf_hash: String,
    pub verification_hash: String,
    pub digital_signature: String,
    pub encrypted_document_path: String,
    pub metadata: CertificateMetadata,
}

impl Certificate {
    /// Status as observed at `now`: a stored `Valid` past `expires_at`
    /// reads as `Expired`.
    pub fn effective_status(&self, now: DateTime<Utc>) -> CertificateStatus {
        match self.status {
            CertificateStatus::Valid if now > self.expires_at => CertificateStatus::Expired,
            other => other,
        }
    }

    /// Whether the certificate may be used (downloaded, relied upon) at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.effective_status(now) == CertificateStatus::Valid
    }

    /// Download filename derived from the certificate number.
    pub fn document_filename(&self) -> String {
        format!("certificate-{}.pdf", self.certificate_number)
    }
}

/// Expiry for a certificate issued at `issued_at`.
pub fn certificate_expiry(issued_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
    issued_at
        .checked_add_months(Months::new(VALIDITY_MONTHS))
        .ok_or_else(|| MedcertError::Validation(format!("expiry overflows for {issued_at}")))
}

/// Human-readable certificate number: transaction id plus issuance millis.
pub fn certificate_number(transaction_id: TransactionId, issued_at: DateTime<Utc>) -> String {
    format!("CERT-{}-{}", transaction_id, issued_at.timestamp_millis())
}

/// Page sizes supported by the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaperSize {
    A4,
    Letter,
}

impl PaperSize {
    /// Dimensions in millimetres (width, height).
    pub fn dimensions_mm(&self) -> (u32, u32) {
        match self {
            Self::A4 => (210, 297),
            Self::Letter => (216, 279),
        }
    }

    /// Dimensions in PDF points (1/72 inch).
    pub fn dimensions_pt(&self) -> (f32, f32) {
        let (w, h) = self.dimensions_mm();
        (w as f32 * 72.0 / 25.4, h as f32 * 72.0 / 25.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_certificate(status: CertificateStatus) -> Certificate {
        let issued_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        Certificate {
            id: CertificateId::new(),
            certificate_number: certificate_number(TransactionId(42), issued_at),
            status,
            issued_at,
            expires_at: certificate_expiry(issued_at).unwrap(),
            subject: CertificateSubject {
                transaction_id: TransactionId(42),
                service_id: ServiceId(7),
                service_name: "Tuberculosis Screening".into(),
                service_description: String::new(),
                icd11_code: "1A01".into(),
                quantity: 3,
                unit_price: Money::from_cents(5000),
                total_price: Money::from_cents(15000),
                transaction_date: issued_at,
                buyer_id: UserId(1),
                buyer_name: "Acme Insurance".into(),
                seller_id: UserId(2),
                seller_name: "City Clinic".into(),
            },
            qr_code_data: String::new(),
            qr_token: String::new(),
            pdf_hash: String::new(),
            verification_hash: String::new(),
            digital_signature: String::new(),
            encrypted_document_path: String::new(),
            metadata: CertificateMetadata {
                service_id: ServiceId(7),
                buyer_id: UserId(1),
                seller_id: UserId(2),
                generated_at: issued_at,
                canonical_version: 1,
                renderer_version: "test".into(),
                key_version: Some(1),
                document_encrypted: true,
            },
        }
    }

    #[test]
    fn money_formats_two_decimals() {
        assert_eq!(Money::from_cents(5000).to_string(), "50.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-1250).to_string(), "-12.50");
    }

    #[test]
    fn money_parses_decimal_strings() {
        assert_eq!("50.00".parse::<Money>().unwrap(), Money::from_cents(5000));
        assert_eq!("50".parse::<Money>().unwrap(), Money::from_cents(5000));
        assert_eq!("0.5".parse::<Money>().unwrap(), Money::from_cents(50));
        assert!("1.234".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
    }

    #[test]
    fn money_rejects_signs_inside_the_amount() {
        for input in ["1.-5", "1.+5", "+1.00", "--1.00", "-+1", "1. 5", " 1.00", "1.", ".50"] {
            assert!(input.parse::<Money>().is_err(), "{input:?} should be rejected");
        }
        assert_eq!("-12.50".parse::<Money>().unwrap(), Money::from_cents(-1250));
    }

    #[test]
    fn money_serializes_as_string() {
        let json = serde_json::to_string(&Money::from_cents(15000)).unwrap();
        assert_eq!(json, "\"150.00\"");
    }

    #[test]
    fn expiry_is_one_calendar_year() {
        let issued = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let expires = certificate_expiry(issued).unwrap();
        assert_eq!(expires, Utc.with_ymd_and_hms(2027, 10, 18, 9, 30, 0).unwrap());
    }

    #[test]
    fn number_contains_transaction_id() {
        let issued = Utc.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap();
        let number = certificate_number(TransactionId(42), issued);
        assert!(number.starts_with("CERT-42-"));
    }

    #[test]
    fn effective_status_derives_expiry() {
        let cert = sample_certificate(CertificateStatus::Valid);
        assert_eq!(cert.effective_status(cert.issued_at), CertificateStatus::Valid);
        assert_eq!(cert.effective_status(cert.expires_at), CertificateStatus::Valid);
        let later = cert.expires_at + chrono::TimeDelta::seconds(1);
        assert_eq!(cert.effective_status(later), CertificateStatus::Expired);
        assert!(!cert.is_usable(later));
    }

    #[test]
    fn revoked_stays_revoked_regardless_of_time() {
        let cert = sample_certificate(CertificateStatus::Revoked);
        assert_eq!(cert.effective_status(cert.issued_at), CertificateStatus::Revoked);
        assert!(!cert.is_usable(cert.issued_at));
    }

    #[test]
    fn status_transitions() {
        use CertificateStatus::*;
        assert!(Valid.can_transition_to(Suspended));
        assert!(Valid.can_transition_to(Revoked));
        assert!(Suspended.can_transition_to(Revoked));
        assert!(Suspended.can_transition_to(Valid));
        assert!(!Revoked.can_transition_to(Valid));
        assert!(!Expired.can_transition_to(Valid));
        assert!(!Valid.can_transition_to(Expired));
    }
}
