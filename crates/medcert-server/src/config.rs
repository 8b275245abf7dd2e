// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Process environment — the only place secrets are read.
//
//   MEDCERT_DOCUMENT_KEYS        1=AGE-SECRET-KEY-1...,2=AGE-SECRET-KEY-1...
//   MEDCERT_ACTIVE_DOCUMENT_KEY  version used for new documents (default: highest)
//   MEDCERT_SIGNING_KEYS         k2026=<hex>,k2025=<hex>
//   MEDCERT_ACTIVE_SIGNING_KEY   key id used for new signatures (default: last listed)
//   MEDCERT_ADMIN_TOKEN          enables the admin status endpoint
//   MEDCERT_DATA_DIR             data directory override

use std::path::PathBuf;

use medcert_core::error::{MedcertError, Result};
use medcert_security::{DocumentVault, IssuerSigner};
use tracing::{info, warn};
use zeroize::Zeroizing;

pub const DOCUMENT_KEYS: &str = "MEDCERT_DOCUMENT_KEYS";
pub const ACTIVE_DOCUMENT_KEY: &str = "MEDCERT_ACTIVE_DOCUMENT_KEY";
pub const SIGNING_KEYS: &str = "MEDCERT_SIGNING_KEYS";
pub const ACTIVE_SIGNING_KEY: &str = "MEDCERT_ACTIVE_SIGNING_KEY";
pub const ADMIN_TOKEN: &str = "MEDCERT_ADMIN_TOKEN";
pub const DATA_DIR: &str = "MEDCERT_DATA_DIR";

/// Key material and overrides taken from the environment at startup.
pub struct EnvConfig {
    pub data_dir: Option<PathBuf>,
    /// `None` when no document keys are configured; issuance then follows
    /// the encryption fallback policy.
    pub vault: Option<DocumentVault>,
    pub signer: IssuerSigner,
    pub admin_token: Option<Zeroizing<String>>,
}

impl EnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(Zeroizing::new)
                .filter(|v| !v.trim().is_empty())
        };

        let active_document = get(ACTIVE_DOCUMENT_KEY);
        let vault = match get(DOCUMENT_KEYS) {
            Some(raw) => Some(parse_document_keys(
                &raw,
                active_document.as_deref().map(String::as_str),
            )?),
            None => {
                warn!("{DOCUMENT_KEYS} not set; certificate documents cannot be encrypted");
                None
            }
        };

        let raw_signing = get(SIGNING_KEYS)
            .ok_or_else(|| MedcertError::Validation(format!("{SIGNING_KEYS} must be set")))?;
        let active_signing = get(ACTIVE_SIGNING_KEY);
        let signer = parse_signing_keys(
            &raw_signing,
            active_signing.as_deref().map(String::as_str),
        )?;

        let admin_token = get(ADMIN_TOKEN);
        if admin_token.is_none() {
            info!("{ADMIN_TOKEN} not set; admin status changes are disabled");
        }

        Ok(Self {
            data_dir: lookup(DATA_DIR).filter(|v| !v.is_empty()).map(PathBuf::from),
            vault,
            signer,
            admin_token,
        })
    }
}

fn entries(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|e| match e.split_once('=') {
            Some((k, v)) => (k.trim(), v.trim()),
            None => (e, ""),
        })
}

/// Parse `version=AGE-SECRET-KEY-1...` entries into a key ring.
pub fn parse_document_keys(raw: &str, active: Option<&str>) -> Result<DocumentVault> {
    let mut vault: Option<DocumentVault> = None;
    for (version, secret) in entries(raw) {
        let version: u16 = version.parse().map_err(|_| {
            MedcertError::Validation(format!("{DOCUMENT_KEYS}: bad key version {version:?}"))
        })?;
        if secret.is_empty() {
            return Err(MedcertError::Validation(format!(
                "{DOCUMENT_KEYS}: key version {version} has no secret"
            )));
        }
        vault = Some(match vault.take() {
            Some(mut v) => {
                v.add_secret_key(version, secret)?;
                v
            }
            None => DocumentVault::from_secret_key(version, secret)?,
        });
    }
    let mut vault = vault
        .ok_or_else(|| MedcertError::Validation(format!("{DOCUMENT_KEYS} has no entries")))?;

    let active = match active {
        Some(v) => v.trim().parse().map_err(|_| {
            MedcertError::Validation(format!("{ACTIVE_DOCUMENT_KEY}: bad key version {v:?}"))
        })?,
        None => vault.versions().max().unwrap_or(vault.active_version()),
    };
    vault.activate(active)?;
    Ok(vault)
}

/// Parse `key_id=hexsecret` entries into a signer.
pub fn parse_signing_keys(raw: &str, active: Option<&str>) -> Result<IssuerSigner> {
    let mut signer: Option<IssuerSigner> = None;
    let mut last_id = None;
    for (key_id, secret_hex) in entries(raw) {
        if key_id.is_empty() {
            return Err(MedcertError::Validation(format!("{SIGNING_KEYS}: empty key id")));
        }
        let secret = Zeroizing::new(hex::decode(secret_hex).map_err(|_| {
            MedcertError::Validation(format!("{SIGNING_KEYS}: key {key_id:?} is not hex"))
        })?);
        signer = Some(match signer.take() {
            Some(mut s) => {
                s.add_key(key_id, &secret)?;
                s
            }
            None => IssuerSigner::new(key_id, &secret)?,
        });
        last_id = Some(key_id);
    }
    let mut signer = signer
        .ok_or_else(|| MedcertError::Validation(format!("{SIGNING_KEYS} has no entries")))?;

    if let Some(id) = active.map(str::trim).or(last_id) {
        signer.activate(id)?;
    }
    Ok(signer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use age::secrecy::ExposeSecret;
    use age::x25519::Identity;
    use std::collections::HashMap;

    fn age_secret() -> String {
        Identity::generate().to_string().expose_secret().to_string()
    }

    const HEX_SECRET: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn highest_document_key_is_active_by_default() {
        let raw = format!("1={},3={}", age_secret(), age_secret());
        let vault = parse_document_keys(&raw, None).unwrap();
        assert_eq!(vault.active_version(), 3);
        assert_eq!(vault.versions().collect::<Vec<_>>(), vec![1, 3]);

        let vault = parse_document_keys(&raw, Some("1")).unwrap();
        assert_eq!(vault.active_version(), 1);
    }

    #[test]
    fn unknown_active_document_key_is_rejected() {
        let raw = format!("1={}", age_secret());
        assert!(matches!(
            parse_document_keys(&raw, Some("9")),
            Err(MedcertError::UnknownKeyVersion(9))
        ));
    }

    #[test]
    fn malformed_document_keys_are_rejected() {
        assert!(parse_document_keys("x=AGE-SECRET-KEY-1", None).is_err());
        assert!(parse_document_keys("1=", None).is_err());
        assert!(parse_document_keys(" , ", None).is_err());
    }

    #[test]
    fn last_signing_key_is_active_by_default() {
        let raw = format!("old={HEX_SECRET}, new={HEX_SECRET}");
        let signer = parse_signing_keys(&raw, None).unwrap();
        assert_eq!(signer.active_key_id(), "new");
        let signer = parse_signing_keys(&raw, Some("old")).unwrap();
        assert_eq!(signer.active_key_id(), "old");
    }

    #[test]
    fn non_hex_signing_key_is_rejected() {
        assert!(parse_signing_keys("k=not-hex", None).is_err());
    }

    #[test]
    fn env_without_signing_keys_fails() {
        let err = EnvConfig::from_lookup(|_| None).err().unwrap();
        assert!(matches!(err, MedcertError::Validation(_)));
    }

    #[test]
    fn env_lookup_builds_everything() {
        let vars: HashMap<&str, String> = HashMap::from([
            (DOCUMENT_KEYS, format!("2={}", age_secret())),
            (SIGNING_KEYS, format!("k1={HEX_SECRET}")),
            (ADMIN_TOKEN, "s3cret".to_string()),
            (DATA_DIR, "/var/lib/medcert".to_string()),
        ]);
        let cfg = EnvConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(cfg.vault.as_ref().map(|v| v.active_version()), Some(2));
        assert_eq!(cfg.signer.active_key_id(), "k1");
        assert_eq!(cfg.admin_token.as_deref().map(String::as_str), Some("s3cret"));
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/var/lib/medcert")));
    }
}
