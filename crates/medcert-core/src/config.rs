// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.
//
// Secrets (document keys, signing keys, admin token) are deliberately absent:
// they are supplied by the process environment and handed to the core
// explicitly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What issuance does when the rendered document cannot be encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionFallback {
    /// Fail the issuance. No certificate, no stored document.
    #[default]
    Abort,
    /// Store the plaintext document, flag it in the certificate metadata,
    /// and log a warning plus an audit entry.
    StorePlaintext,
}

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Address the HTTP server listens on.
    pub bind_addr: String,
    /// Policy for encryption failures during issuance.
    pub encryption_fallback: EncryptionFallback,
    /// Enable audit trail logging.
    pub audit_enabled: bool,
    /// Where certificate documents are stored. Defaults to
    /// `<data dir>/documents`.
    pub blob_dir: Option<PathBuf>,
    /// Page size of rendered certificates.
    pub paper_size: crate::PaperSize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            encryption_fallback: EncryptionFallback::Abort,
            audit_enabled: true,
            blob_dir: None,
            paper_size: crate::PaperSize::A4,
        }
    }
}
