// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document integrity — SHA-256 hashing for tamper detection.

use medcert_core::error::MedcertError;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Fingerprint of the exact rendered document bytes, taken before
/// encryption. Detects document tampering independently of the logical
/// certificate fields.
pub fn compute_document_hash(rendered: &[u8]) -> String {
    hash_bytes(rendered)
}

/// Verify that `data` matches the expected SHA-256 hex digest.
///
/// Returns `Err(MedcertError::IntegrityMismatch)` with the expected and
/// actual values when it does not.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), MedcertError> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(MedcertError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}
