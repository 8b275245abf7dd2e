// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// QR verification payload — a compact token naming a certificate and the
// verification hash it was sealed with, plus its rendered QR image.
//
// Token form: `MCV1.` followed by base64url (no padding) of a short-keyed
// JSON object. The embedded hash lets a verifier catch a token copied onto
// another certificate number: the hash will not match the one recomputed
// from that certificate's stored fields.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use image::{GrayImage, ImageFormat, Luma};
use medcert_core::error::{MedcertError, Result};
use medcert_core::types::{Certificate, CertificateSubject, TransactionId, UserId};
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Prefix identifying a verification token (as opposed to a bare
/// certificate number).
pub const TOKEN_PREFIX: &str = "MCV1.";

/// Placeholder hash carried by the first-pass payload, before the real
/// verification hash exists.
pub const PROVISIONAL_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Tokens longer than this are rejected before decoding.
const MAX_TOKEN_LEN: usize = 1024;

/// Quiet-zone width in modules around the symbol.
pub const QUIET_ZONE: usize = 4;

/// Verification payload embedded in the QR code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrPayload {
    #[serde(rename = "n")]
    pub certificate_number: String,
    /// Business key of the certificate: the transaction it attests to.
    #[serde(rename = "t")]
    pub transaction_id: TransactionId,
    #[serde(rename = "h")]
    pub verification_hash: String,
    #[serde(rename = "i")]
    pub issued_at_ms: i64,
    #[serde(rename = "e")]
    pub expires_at_ms: i64,
    #[serde(rename = "b")]
    pub buyer_id: UserId,
    #[serde(rename = "s")]
    pub seller_id: UserId,
}

impl QrPayload {
    /// First-pass payload: everything but the verification hash.
    pub fn provisional(
        certificate_number: &str,
        subject: &CertificateSubject,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            certificate_number: certificate_number.to_owned(),
            transaction_id: subject.transaction_id,
            verification_hash: PROVISIONAL_HASH.to_owned(),
            issued_at_ms: issued_at.timestamp_millis(),
            expires_at_ms: expires_at.timestamp_millis(),
            buyer_id: subject.buyer_id,
            seller_id: subject.seller_id,
        }
    }

    /// Second pass: embed the real verification hash.
    pub fn finalize(self, verification_hash: &str) -> Self {
        Self {
            verification_hash: verification_hash.to_owned(),
            ..self
        }
    }

    /// The payload an issued certificate carries. Deterministic, so a
    /// verifier can re-derive it from stored fields.
    pub fn for_certificate(certificate: &Certificate) -> Self {
        Self::provisional(
            &certificate.certificate_number,
            &certificate.subject,
            certificate.issued_at,
            certificate.expires_at,
        )
        .finalize(&certificate.verification_hash)
    }

    pub fn is_provisional(&self) -> bool {
        self.verification_hash == PROVISIONAL_HASH
    }

    /// Serialize to the `MCV1.` token form.
    pub fn to_token(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(format!("{TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(json)))
    }

    /// Parse a token. Any malformation is a `Validation` error.
    pub fn from_token(token: &str) -> Result<Self> {
        let token = token.trim();
        if token.len() > MAX_TOKEN_LEN {
            return Err(MedcertError::Validation("verification token too long".into()));
        }
        let body = token
            .strip_prefix(TOKEN_PREFIX)
            .ok_or_else(|| MedcertError::Validation("not a verification token".into()))?;
        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| MedcertError::Validation(format!("token encoding: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| MedcertError::Validation(format!("token payload: {e}")))
    }

    /// Whether `input` should be treated as a token rather than a
    /// certificate number.
    pub fn looks_like_token(input: &str) -> bool {
        input.trim().starts_with(TOKEN_PREFIX)
    }
}

/// A rendered QR symbol for a token.
#[derive(Debug, Clone)]
pub struct QrImage {
    token: String,
    width: usize,
    modules: Vec<bool>,
}

impl QrImage {
    /// Encode `payload` and render its QR symbol.
    #[instrument(skip_all, fields(number = %payload.certificate_number, provisional = payload.is_provisional()))]
    pub fn render(payload: &QrPayload) -> Result<Self> {
        Self::from_token(payload.to_token()?)
    }

    /// Render the QR symbol for an already-encoded token.
    pub fn from_token(token: String) -> Result<Self> {
        let code = QrCode::with_error_correction_level(token.as_bytes(), EcLevel::M)
            .map_err(|e| MedcertError::Qr(e.to_string()))?;
        let width = code.width();
        let modules = code
            .into_colors()
            .into_iter()
            .map(|c| c == Color::Dark)
            .collect();
        debug!(width, token_len = token.len(), "QR symbol rendered");
        Ok(Self {
            token,
            width,
            modules,
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Symbol width in modules, without the quiet zone.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        x < self.width && y < self.width && self.modules[y * self.width + x]
    }

    /// One byte per module (0 = dark, 255 = light), row-major from the top,
    /// including the quiet zone. Returns `(side, pixels)`.
    pub fn to_gray_pixels(&self) -> (usize, Vec<u8>) {
        let side = self.width + 2 * QUIET_ZONE;
        let mut pixels = vec![255u8; side * side];
        for y in 0..self.width {
            for x in 0..self.width {
                if self.is_dark(x, y) {
                    pixels[(y + QUIET_ZONE) * side + x + QUIET_ZONE] = 0;
                }
            }
        }
        (side, pixels)
    }

    /// PNG encoding with each module drawn as `scale`×`scale` pixels.
    pub fn to_png(&self, scale: u32) -> Result<Vec<u8>> {
        let (side, pixels) = self.to_gray_pixels();
        let scale = scale.max(1);
        let dim = side as u32 * scale;
        let img = GrayImage::from_fn(dim, dim, |x, y| {
            let idx = (y / scale) as usize * side + (x / scale) as usize;
            Luma([pixels[idx]])
        });

        let mut png = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| MedcertError::ImageError(e.to_string()))?;
        Ok(png)
    }

    /// `data:image/png;base64,...` form returned to clients.
    pub fn to_data_url(&self) -> Result<String> {
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(self.to_png(6)?)))
    }
}
