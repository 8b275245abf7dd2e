// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Medcert.

use thiserror::Error;

use crate::types::CertificateStatus;

/// Top-level error type for all Medcert operations.
#[derive(Debug, Error)]
pub enum MedcertError {
    // -- Lookup / uniqueness --
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    // -- Input validation --
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("required field is missing: {0}")]
    MissingField(&'static str),

    // -- Document errors --
    #[error("QR encoding failed: {0}")]
    Qr(String),

    #[error("PDF operation failed: {0}")]
    PdfError(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    // -- Security errors --
    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("no document key registered for version {0}")]
    UnknownKeyVersion(u16),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("signature error: {0}")]
    Signature(String),

    // -- Lifecycle --
    #[error("status transition {from} -> {to} is not allowed")]
    InvalidTransition {
        from: CertificateStatus,
        to: CertificateStatus,
    },

    #[error("caller is not authorized for this operation")]
    Unauthorized,

    // -- Storage / persistence --
    #[error("blob storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse failure taxonomy, used as a structured logging field and to pick
/// caller-facing responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    ValidationFailure,
    EncryptionFailure,
    StorageFailure,
    IntegrityMismatch,
    Unauthorized,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::ValidationFailure => "validation_failure",
            Self::EncryptionFailure => "encryption_failure",
            Self::StorageFailure => "storage_failure",
            Self::IntegrityMismatch => "integrity_mismatch",
            Self::Unauthorized => "unauthorized",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MedcertError {
    /// Shorthand for a missing entity.
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Which taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) | Self::InvalidTransition { .. } => ErrorKind::Conflict,
            Self::Validation(_)
            | Self::MissingField(_)
            | Self::Qr(_)
            | Self::PdfError(_)
            | Self::ImageError(_) => ErrorKind::ValidationFailure,
            Self::Encryption(_) | Self::Decryption(_) | Self::UnknownKeyVersion(_) => {
                ErrorKind::EncryptionFailure
            }
            Self::Storage(_) | Self::Database(_) | Self::Io(_) => ErrorKind::StorageFailure,
            Self::IntegrityMismatch { .. } | Self::Signature(_) => ErrorKind::IntegrityMismatch,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MedcertError>;
