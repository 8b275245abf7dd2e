// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — parses rendered certificates back with `lopdf` so issuance can
// check the output before sealing it.

use lopdf::{Document, Object};
use medcert_core::error::{MedcertError, Result};
use tracing::{debug, instrument};

/// Read-only view over a parsed PDF.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let document = Document::load_mem(data).map_err(|err| {
            MedcertError::PdfError(format!("failed to load PDF from memory: {err}"))
        })?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    /// Number of pages in the document.
    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// `/Title` from the document information dictionary.
    pub fn title(&self) -> Option<String> {
        self.info_string(b"Title")
    }

    /// `/Producer` from the document information dictionary.
    pub fn producer(&self) -> Option<String> {
        self.info_string(b"Producer")
    }

    fn info_string(&self, key: &[u8]) -> Option<String> {
        let info = match self.document.trailer.get(b"Info").ok()? {
            Object::Reference(id) => self.document.get_object(*id).ok()?,
            other => other,
        };
        let Object::Dictionary(dict) = info else {
            return None;
        };
        match dict.get(key).ok()? {
            // Strings are written WinAnsi-encoded, which agrees with Latin-1
            // for every byte the renderer emits.
            Object::String(bytes, _) => Some(bytes.iter().map(|&b| b as char).collect()),
            _ => None,
        }
    }
}
