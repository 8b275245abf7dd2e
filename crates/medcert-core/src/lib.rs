// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Medcert — Core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod payment;
pub mod public_errors;
pub mod types;

pub use config::{AppConfig, EncryptionFallback};
pub use error::{ErrorKind, MedcertError};
pub use types::*;
