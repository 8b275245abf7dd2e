// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Canonical encoding of certificate content.
//
// The verification hash and the issuer signature are both computed over the
// bytes produced here. The encoding is versioned: a certificate records the
// version it was sealed with, and every version ever issued stays decodable
// here so older certificates keep verifying.
//
// Version 1 layout (UTF-8, `\n` terminated lines, fixed order):
//
//   medcert.canonical.v1
//   certificate_number=<str>
//   transaction_id=<int>
//   service_id=<int>
//   service_name=<str>
//   icd11_code=<str>
//   quantity=<int>
//   unit_price=<d.dd>
//   total_price=<d.dd>
//   buyer_id=<int>
//   seller_id=<int>
//   transaction_date=<rfc3339 millis Z>
//   issued_at=<rfc3339 millis Z>
//   expires_at=<rfc3339 millis Z>
//
// Version 2 uses the header `medcert.canonical.v2`, the same lines as v1,
// then seals the printed display text as well:
//
//   service_description=<str>
//   buyer_name=<str>
//   seller_name=<str>
//
// String values escape `\` as `\\` and newline as `\n`.

use chrono::{DateTime, SecondsFormat, Utc};
use medcert_core::error::{MedcertError, Result};
use medcert_core::types::{Certificate, CertificateSubject};

use crate::integrity::hash_bytes;

/// Supported canonicalization formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalVersion {
    /// Identifiers, amounts and timestamps only.
    V1,
    /// V1 plus the service description and both organization names.
    V2,
}

impl CanonicalVersion {
    /// Format used for newly issued certificates.
    pub const CURRENT: Self = Self::V2;

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    pub fn from_u16(version: u16) -> Result<Self> {
        match version {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            other => Err(MedcertError::Validation(format!(
                "unsupported canonical version {other}"
            ))),
        }
    }
}

/// The field set covered by the verification hash and the signature.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalFields<'a> {
    pub certificate_number: &'a str,
    pub subject: &'a CertificateSubject,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl<'a> CanonicalFields<'a> {
    pub fn new(
        certificate_number: &'a str,
        subject: &'a CertificateSubject,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            certificate_number,
            subject,
            issued_at,
            expires_at,
        }
    }

    /// The stored canonical fields of an issued certificate.
    pub fn of(certificate: &'a Certificate) -> Self {
        Self::new(
            &certificate.certificate_number,
            &certificate.subject,
            certificate.issued_at,
            certificate.expires_at,
        )
    }

    /// Serialize in the given format. Refuses to encode when a required
    /// string field is empty.
    pub fn encode(&self, version: CanonicalVersion) -> Result<Vec<u8>> {
        let s = self.subject;
        require("certificate_number", self.certificate_number)?;
        require("service_name", &s.service_name)?;
        require("icd11_code", &s.icd11_code)?;
        if version == CanonicalVersion::V2 {
            require("buyer_name", &s.buyer_name)?;
            require("seller_name", &s.seller_name)?;
        }

        let mut out = String::with_capacity(512);
        out.push_str(&format!("medcert.canonical.v{}\n", version.as_u16()));
        push_str_field(&mut out, "certificate_number", self.certificate_number);
        push_field(&mut out, "transaction_id", s.transaction_id);
        push_field(&mut out, "service_id", s.service_id);
        push_str_field(&mut out, "service_name", &s.service_name);
        push_str_field(&mut out, "icd11_code", &s.icd11_code);
        push_field(&mut out, "quantity", s.quantity);
        push_field(&mut out, "unit_price", s.unit_price);
        push_field(&mut out, "total_price", s.total_price);
        push_field(&mut out, "buyer_id", s.buyer_id);
        push_field(&mut out, "seller_id", s.seller_id);
        push_field(&mut out, "transaction_date", timestamp(s.transaction_date));
        push_field(&mut out, "issued_at", timestamp(self.issued_at));
        push_field(&mut out, "expires_at", timestamp(self.expires_at));

        match version {
            CanonicalVersion::V1 => {}
            CanonicalVersion::V2 => {
                push_str_field(&mut out, "service_description", &s.service_description);
                push_str_field(&mut out, "buyer_name", &s.buyer_name);
                push_str_field(&mut out, "seller_name", &s.seller_name);
            }
        }
        Ok(out.into_bytes())
    }
}

/// Digest of the canonical field tuple. Independent of document layout, so
/// verification never needs to re-render the PDF.
pub fn compute_verification_hash(
    fields: &CanonicalFields<'_>,
    version: CanonicalVersion,
) -> Result<String> {
    Ok(hash_bytes(&fields.encode(version)?))
}

/// Timestamp form used in canonical encodings.
pub fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn require(name: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(MedcertError::MissingField(name))
    } else {
        Ok(())
    }
}

fn push_field(out: &mut String, key: &str, value: impl std::fmt::Display) {
    out.push_str(key);
    out.push('=');
    out.push_str(&value.to_string());
    out.push('\n');
}

fn push_str_field(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('\n');
}
