// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transient plaintext — decrypted or freshly rendered document bytes that
// must not outlive the request that produced them.
//
// Plaintext documents are never written to disk. They live in a buffer that
// is zeroed when dropped, and dropping happens on every exit path: normal
// return, `?` propagation, or unwinding.

use zeroize::Zeroizing;

/// Document bytes that are wiped from memory on drop.
pub struct TransientPlaintext {
    bytes: Zeroizing<Vec<u8>>,
}

impl TransientPlaintext {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl AsRef<[u8]> for TransientPlaintext {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for TransientPlaintext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransientPlaintext")
            .field("len", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
