// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Issuer signatures — HMAC-SHA256 over the canonical certificate encoding.
//
// Anyone can recompute the verification hash; only the issuer holds the
// signing secret. A signature therefore proves a record was produced here
// and not assembled by a party who merely knows the hashing scheme.
//
// Stored form: `hmac-sha256:<key_id>:<hex tag>`. Several keys may be loaded
// at once so that signatures made before a rotation still verify.

use std::collections::BTreeMap;

use medcert_core::error::{MedcertError, Result};
use ring::hmac;
use tracing::{debug, instrument, warn};

use crate::canonical::{CanonicalFields, CanonicalVersion};

const ALGORITHM_TAG: &str = "hmac-sha256";

/// Minimum secret length accepted for a signing key.
pub const MIN_SECRET_LEN: usize = 32;

/// Holds the issuer's signing keys.
pub struct IssuerSigner {
    active_id: String,
    keys: BTreeMap<String, hmac::Key>,
}

impl std::fmt::Debug for IssuerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerSigner")
            .field("active_id", &self.active_id)
            .field("key_ids", &self.keys.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl IssuerSigner {
    /// Create a signer with a single active key.
    pub fn new(key_id: impl Into<String>, secret: &[u8]) -> Result<Self> {
        let key_id = key_id.into();
        let mut keys = BTreeMap::new();
        keys.insert(key_id.clone(), build_key(&key_id, secret)?);
        Ok(Self {
            active_id: key_id,
            keys,
        })
    }

    /// Load an additional key, used only to verify older signatures unless
    /// activated.
    pub fn add_key(&mut self, key_id: impl Into<String>, secret: &[u8]) -> Result<()> {
        let key_id = key_id.into();
        let key = build_key(&key_id, secret)?;
        self.keys.insert(key_id, key);
        Ok(())
    }

    /// Switch the key used for new signatures.
    pub fn activate(&mut self, key_id: &str) -> Result<()> {
        if !self.keys.contains_key(key_id) {
            return Err(MedcertError::Signature(format!("unknown signing key {key_id:?}")));
        }
        self.active_id = key_id.to_owned();
        Ok(())
    }

    pub fn active_key_id(&self) -> &str {
        &self.active_id
    }

    /// Sign the canonical encoding of `fields`.
    #[instrument(skip_all, fields(key_id = %self.active_id, number = fields.certificate_number))]
    pub fn compute_signature(
        &self,
        fields: &CanonicalFields<'_>,
        version: CanonicalVersion,
    ) -> Result<String> {
        let message = fields.encode(version)?;
        let key = self
            .keys
            .get(&self.active_id)
            .ok_or_else(|| MedcertError::Signature("active signing key missing".into()))?;
        let tag = hmac::sign(key, &message);
        debug!("canonical fields signed");
        Ok(format!(
            "{ALGORITHM_TAG}:{}:{}",
            self.active_id,
            hex::encode(tag.as_ref())
        ))
    }

    /// Check `signature` against the canonical encoding of `fields`.
    #[instrument(skip_all, fields(number = fields.certificate_number))]
    pub fn verify_signature(
        &self,
        fields: &CanonicalFields<'_>,
        version: CanonicalVersion,
        signature: &str,
    ) -> Result<()> {
        let (key_id, tag) = parse_signature(signature)?;
        let Some(key) = self.keys.get(key_id) else {
            warn!(key_id, "signature made with a key that is not loaded");
            return Err(MedcertError::Signature(format!("unknown signing key {key_id:?}")));
        };
        let message = fields.encode(version)?;
        hmac::verify(key, &message, &tag)
            .map_err(|_| MedcertError::Signature("signature does not match".into()))
    }
}

fn build_key(key_id: &str, secret: &[u8]) -> Result<hmac::Key> {
    if key_id.is_empty() || key_id.contains(':') {
        return Err(MedcertError::Signature(format!("invalid key id {key_id:?}")));
    }
    if secret.len() < MIN_SECRET_LEN {
        return Err(MedcertError::Signature(format!(
            "signing secret for {key_id:?} is shorter than {MIN_SECRET_LEN} bytes"
        )));
    }
    Ok(hmac::Key::new(hmac::HMAC_SHA256, secret))
}

fn parse_signature(signature: &str) -> Result<(&str, Vec<u8>)> {
    let mut parts = signature.splitn(3, ':');
    let (Some(alg), Some(key_id), Some(tag_hex)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(MedcertError::Signature("malformed signature".into()));
    };
    if alg != ALGORITHM_TAG {
        return Err(MedcertError::Signature(format!("unsupported algorithm {alg:?}")));
    }
    let tag = hex::decode(tag_hex).map_err(|_| MedcertError::Signature("malformed tag".into()))?;
    Ok((key_id, tag))
}
