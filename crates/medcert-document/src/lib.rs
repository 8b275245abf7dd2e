// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// medcert-document — Certificate artefacts.
//
// Builds the QR verification token and its image, lays out the certificate
// PDF, and reads rendered PDFs back for self-checks.

pub mod pdf;
pub mod qr;

// Re-export the primary structs so callers can use `medcert_document::QrPayload` etc.
pub use pdf::reader::PdfReader;
pub use pdf::writer::{CertificateRenderer, CertificateView, RENDERER_VERSION};
pub use qr::{QrImage, QrPayload};
