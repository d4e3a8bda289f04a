// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Atomic, lock-guarded file I/O primitives for the session store.
//!
//! Every write is `<name>.tmp` → fsync → rename onto `<name>`, performed
//! while holding an exclusive advisory lock on a sibling `<name>.lock` file.
//! A reader therefore observes either the previous complete file or the new
//! complete file, never a torn write — including across processes.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;

fn lock_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    target.with_file_name(name)
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}

/// Write `bytes` to `target` atomically under the sibling lock.
///
/// The advisory lock is released when the lock file handle drops (close
/// releases flock-style locks), which is after the rename completes.
pub fn atomic_write(target: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let lock_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(lock_path(target))?;
    lock_file.lock_exclusive()?;

    let tmp = tmp_path(target);
    let mut f = File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
    drop(f);
    fs::rename(&tmp, target)?;

    let _ = lock_file.unlock();
    Ok(())
}

/// Serialize `value` as pretty JSON (2-space indent) and write atomically.
pub fn write_json<T: serde::Serialize>(target: &Path, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    atomic_write(target, &bytes)
}

/// Read and deserialize a JSON file.
pub fn read_json<T: serde::de::DeserializeOwned>(target: &Path) -> io::Result<T> {
    let bytes = fs::read(target)?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
