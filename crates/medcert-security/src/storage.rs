// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Encrypted document storage — age (X25519) encryption of rendered
// certificates, wrapped in a small versioned envelope.
//
// Envelope layout:
//
//   offset 0  5 bytes  magic "MCENC"
//   offset 5  1 byte   envelope format (1)
//   offset 6  2 bytes  document key version, big-endian
//   offset 8  ...      age ciphertext (header + payload)
//
// The key version lets old documents be decrypted after a key rotation; the
// magic lets readers tell ciphertext from legacy plaintext documents.

use std::collections::BTreeMap;
use std::io::{Read, Write};

use age::x25519::Identity;
use medcert_core::error::{MedcertError, Result};
use tracing::{debug, instrument};

use crate::transient::TransientPlaintext;

/// Leading bytes of every encrypted document.
pub const ENVELOPE_MAGIC: &[u8; 5] = b"MCENC";
const ENVELOPE_FORMAT: u8 = 1;
const HEADER_LEN: usize = 8;

/// Whether a stored blob is an encrypted envelope (as opposed to a legacy
/// plaintext document).
pub fn is_encrypted(blob: &[u8]) -> bool {
    blob.len() >= HEADER_LEN && blob.starts_with(ENVELOPE_MAGIC)
}

/// The document key version recorded in an envelope header.
pub fn key_version(blob: &[u8]) -> Option<u16> {
    if !is_encrypted(blob) {
        return None;
    }
    Some(u16::from_be_bytes([blob[6], blob[7]]))
}

/// Encrypts and decrypts certificate documents with a ring of versioned
/// X25519 identities.
///
/// New documents are always encrypted to the active version. Any loaded
/// version can decrypt.
pub struct DocumentVault {
    active_version: u16,
    identities: BTreeMap<u16, Identity>,
}

impl DocumentVault {
    /// Create a vault with one active key.
    pub fn new(version: u16, identity: Identity) -> Self {
        let mut identities = BTreeMap::new();
        identities.insert(version, identity);
        Self {
            active_version: version,
            identities,
        }
    }

    /// Create a vault from an `AGE-SECRET-KEY-1...` string.
    pub fn from_secret_key(version: u16, secret: &str) -> Result<Self> {
        Ok(Self::new(version, parse_identity(version, secret)?))
    }

    /// Load another key version (for decrypting older documents).
    pub fn add_secret_key(&mut self, version: u16, secret: &str) -> Result<()> {
        let identity = parse_identity(version, secret)?;
        self.identities.insert(version, identity);
        Ok(())
    }

    pub fn add_key(&mut self, version: u16, identity: Identity) {
        self.identities.insert(version, identity);
    }

    /// Make `version` the key used for new documents.
    pub fn activate(&mut self, version: u16) -> Result<()> {
        if !self.identities.contains_key(&version) {
            return Err(MedcertError::UnknownKeyVersion(version));
        }
        self.active_version = version;
        Ok(())
    }

    pub fn active_version(&self) -> u16 {
        self.active_version
    }

    pub fn versions(&self) -> impl Iterator<Item = u16> + '_ {
        self.identities.keys().copied()
    }

    /// Encrypt `plaintext` to the active key and return a complete envelope.
    #[instrument(skip_all, fields(plaintext_len = plaintext.len(), key_version = self.active_version))]
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let identity = self
            .identities
            .get(&self.active_version)
            .ok_or(MedcertError::UnknownKeyVersion(self.active_version))?;
        let recipient = identity.to_public();

        let encryptor =
            age::Encryptor::with_recipients(std::iter::once(&recipient as &dyn age::Recipient))
                .map_err(|e| MedcertError::Encryption(e.to_string()))?;

        let mut envelope = Vec::with_capacity(plaintext.len() + 256);
        envelope.extend_from_slice(ENVELOPE_MAGIC);
        envelope.push(ENVELOPE_FORMAT);
        envelope.extend_from_slice(&self.active_version.to_be_bytes());

        let mut writer = encryptor
            .wrap_output(&mut envelope)
            .map_err(|e| MedcertError::Encryption(e.to_string()))?;
        writer
            .write_all(plaintext)
            .map_err(|e| MedcertError::Encryption(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| MedcertError::Encryption(e.to_string()))?;

        debug!(envelope_len = envelope.len(), "encryption complete");
        Ok(envelope)
    }

    /// Decrypt an envelope. The plaintext is returned in a buffer that is
    /// wiped on drop.
    ///
    /// An unknown key version fails with `UnknownKeyVersion`; a damaged
    /// envelope or payload with `Decryption`.
    #[instrument(skip_all, fields(envelope_len = envelope.len()))]
    pub fn decrypt(&self, envelope: &[u8]) -> Result<TransientPlaintext> {
        if !is_encrypted(envelope) {
            return Err(MedcertError::Decryption("not an encrypted document".into()));
        }
        if envelope[5] != ENVELOPE_FORMAT {
            return Err(MedcertError::Decryption(format!(
                "unsupported envelope format {}",
                envelope[5]
            )));
        }
        let version = u16::from_be_bytes([envelope[6], envelope[7]]);
        let identity = self
            .identities
            .get(&version)
            .ok_or(MedcertError::UnknownKeyVersion(version))?;

        let decryptor = age::Decryptor::new(&envelope[HEADER_LEN..])
            .map_err(|e| MedcertError::Decryption(e.to_string()))?;
        let mut reader = decryptor
            .decrypt(std::iter::once(identity as &dyn age::Identity))
            .map_err(|e| MedcertError::Decryption(e.to_string()))?;

        let mut plaintext = Vec::new();
        if let Err(e) = reader.read_to_end(&mut plaintext) {
            // Wipe whatever was authenticated before the failure.
            drop(TransientPlaintext::new(plaintext));
            return Err(MedcertError::Decryption(e.to_string()));
        }

        debug!(key_version = version, plaintext_len = plaintext.len(), "decryption complete");
        Ok(TransientPlaintext::new(plaintext))
    }
}

fn parse_identity(version: u16, secret: &str) -> Result<Identity> {
    secret
        .trim()
        .parse::<Identity>()
        .map_err(|e| MedcertError::Encryption(format!("invalid document key v{version}: {e}")))
}
