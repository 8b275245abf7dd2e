// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blob stores for certificate documents.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, instrument};

use medcert_core::error::{MedcertError, Result};

use crate::store::BlobStore;

/// Filesystem blob store rooted at a directory.
///
/// Paths are relative and may not escape the root.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create the store, creating `root` if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| MedcertError::Storage(format!("create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let rel = Path::new(path);
        let clean = !path.is_empty()
            && rel
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !clean {
            return Err(MedcertError::Storage(format!("invalid blob path {path:?}")));
        }
        Ok(self.root.join(rel))
    }
}

impl BlobStore for FsBlobStore {
    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MedcertError::Storage(format!("create {}: {e}", parent.display())))?;
        }

        // Write beside the target and rename, so readers never see a
        // truncated blob.
        let staging = target.with_extension("partial");
        std::fs::write(&staging, bytes)
            .map_err(|e| MedcertError::Storage(format!("write {path}: {e}")))?;
        std::fs::rename(&staging, &target).map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            MedcertError::Storage(format!("commit {path}: {e}"))
        })?;

        debug!("blob written");
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let target = self.resolve(path)?;
        std::fs::read(&target).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MedcertError::not_found("document", path),
            _ => MedcertError::Storage(format!("read {path}: {e}")),
        })
    }

    #[instrument(skip(self))]
    fn delete(&self, path: &str) -> Result<()> {
        let target = self.resolve(path)?;
        match std::fs::remove_file(&target) {
            Ok(()) => {
                debug!("blob deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(MedcertError::Storage(format!("delete {path}: {e}"))),
        }
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path)?.is_file())
    }
}

/// In-memory blob store for tests and ephemeral deployments.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        self.blobs
            .lock()
            .map_err(|_| MedcertError::Storage("blob map lock poisoned".into()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.lock()?.insert(path.to_owned(), bytes.to_vec());
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.lock()?
            .get(path)
            .cloned()
            .ok_or_else(|| MedcertError::not_found("document", path))
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.lock()?.remove(path);
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(path))
    }
}
