// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! medcert-security — cryptographic foundation for certificate issuance.
//!
//! Document and canonical-field hashing, issuer signatures, encrypted
//! document storage with key rotation, transient plaintext handling, and the
//! audit trail.

pub mod audit;
pub mod canonical;
pub mod integrity;
pub mod signing;
pub mod storage;
pub mod transient;

// PUBLIC API: Re-export core security primitives
pub use audit::{AuditAction, AuditLog};
pub use canonical::{CanonicalFields, CanonicalVersion, compute_verification_hash};
pub use integrity::{compute_document_hash, hash_bytes, verify_hash};
pub use signing::IssuerSigner;
pub use storage::{DocumentVault, is_encrypted};
pub use transient::TransientPlaintext;
