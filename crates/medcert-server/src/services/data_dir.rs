// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution.

use std::path::{Path, PathBuf};

use medcert_core::error::Result;

/// Return the application data directory, creating it if needed.
///
/// An explicit override (from `MEDCERT_DATA_DIR`) wins; otherwise the XDG
/// data directory is used.
pub fn data_dir(override_dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => dirs_fallback().join("medcert"),
    };
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn dirs_fallback() -> PathBuf {
    // Try XDG data dir, then fallback to home
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from("/var/lib")
}
