//! The transient store: two flat directories shared by every request.
//!
//! * **incoming**: uploads copied in under a unique name, deleted by the
//!   operation that consumes them.
//! * **working**: finished artifacts waiting to be streamed, plus
//!   short-lived scratch directories and staged outputs.
//!
//! There is no per-request directory and no locking: isolation comes from
//! [`crate::naming`]. Anything left behind (crash, early return, a caller
//! that never deleted its artifact) is picked up by [`crate::reclaim`].
//!
//! Artifacts are never written in place. An operation stages its output in a
//! hidden temporary file inside the working area and renames it into its
//! final name only on success, so a failed operation cannot leave a
//! half-written artifact behind.

use crate::config::ConverterConfig;
use crate::error::DocConvError;
use crate::naming::unique_filename;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::{NamedTempFile, TempDir};
use tracing::{debug, info, warn};

/// Prefix of staged outputs and scratch directories inside the working area.
pub const STAGING_PREFIX: &str = ".docconv-";

/// A file materialised in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransientFile {
    /// Absolute path inside the store.
    pub path: PathBuf,
    /// Name the client supplied, before sanitising.
    pub original_name: String,
    pub bytes: u64,
    pub created: SystemTime,
}

impl TransientFile {
    /// Stored file name without its extension.
    pub fn stem(&self) -> String {
        file_stem(&self.path)
    }
}

/// Handle to the two store areas. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TransientStore {
    incoming: PathBuf,
    working: PathBuf,
    max_upload_bytes: u64,
}

impl TransientStore {
    /// Create both areas if needed and return a handle to them.
    pub fn open(config: &ConverterConfig) -> Result<Self, DocConvError> {
        for dir in [&config.incoming_dir, &config.working_dir] {
            std::fs::create_dir_all(dir).map_err(|e| DocConvError::storage(dir, e))?;
        }
        let incoming = absolute(&config.incoming_dir)?;
        let working = absolute(&config.working_dir)?;
        info!(
            "Transient store ready: incoming={} working={}",
            incoming.display(),
            working.display()
        );
        Ok(Self {
            incoming,
            working,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    pub fn incoming_dir(&self) -> &Path {
        &self.incoming
    }

    pub fn working_dir(&self) -> &Path {
        &self.working
    }

    /// Both areas, incoming first.
    pub fn areas(&self) -> [&Path; 2] {
        [&self.incoming, &self.working]
    }

    pub fn incoming_path(&self, name: &str) -> PathBuf {
        self.incoming.join(name)
    }

    pub fn working_path(&self, name: &str) -> PathBuf {
        self.working.join(name)
    }

    /// Copy an upload held in memory into the incoming area.
    pub async fn admit_bytes(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<TransientFile, DocConvError> {
        self.check_size(bytes.len() as u64)?;
        let path = self.incoming_path(&unique_filename(original_name));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| DocConvError::storage(&path, e))?;
        debug!("Admitted {} bytes as {}", bytes.len(), path.display());
        Ok(TransientFile {
            path,
            original_name: original_name.to_string(),
            bytes: bytes.len() as u64,
            created: SystemTime::now(),
        })
    }

    /// Copy an upload already on disk into the incoming area.
    ///
    /// `original_name` is the client-facing name used to derive the stored
    /// name; `source` is left untouched.
    pub async fn admit_file(
        &self,
        original_name: &str,
        source: &Path,
    ) -> Result<TransientFile, DocConvError> {
        let meta = tokio::fs::metadata(source)
            .await
            .map_err(|e| DocConvError::storage(source, e))?;
        self.check_size(meta.len())?;
        let path = self.incoming_path(&unique_filename(original_name));
        let bytes = tokio::fs::copy(source, &path)
            .await
            .map_err(|e| DocConvError::storage(&path, e))?;
        debug!("Admitted {} as {}", source.display(), path.display());
        Ok(TransientFile {
            path,
            original_name: original_name.to_string(),
            bytes,
            created: SystemTime::now(),
        })
    }

    fn check_size(&self, size: u64) -> Result<(), DocConvError> {
        if size > self.max_upload_bytes {
            return Err(DocConvError::UploadTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    /// Delete a store file. A file that is already gone is not an error:
    /// the reclamation sweep may have beaten us to it.
    pub fn discard(&self, path: &Path) -> Result<(), DocConvError> {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!("Discarded {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DocConvError::storage(path, e)),
        }
    }

    /// Whether `path` names a file directly inside the incoming area.
    pub fn is_incoming(&self, path: &Path) -> bool {
        path.parent()
            .and_then(|dir| std::fs::canonicalize(dir).ok())
            .is_some_and(|dir| dir == self.incoming)
    }

    /// Delete several store files, logging instead of failing on errors.
    pub fn discard_all<'a>(&self, paths: impl IntoIterator<Item = &'a PathBuf>) {
        for p in paths {
            if let Err(e) = self.discard(p) {
                warn!("Could not remove {}: {}", p.display(), e);
            }
        }
    }

    /// A private scratch directory inside the working area, removed with
    /// everything in it when the handle is dropped.
    pub fn scratch_dir(&self, label: &str) -> Result<TempDir, DocConvError> {
        tempfile::Builder::new()
            .prefix(&format!("{STAGING_PREFIX}{label}-"))
            .tempdir_in(&self.working)
            .map_err(|e| DocConvError::storage(&self.working, e))
    }

    /// Reserve `final_name` in the working area and open a staged file for it.
    pub fn stage_output(&self, final_name: &str) -> Result<StagedOutput, DocConvError> {
        let file = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(".part")
            .tempfile_in(&self.working)
            .map_err(|e| DocConvError::storage(&self.working, e))?;
        Ok(StagedOutput {
            file,
            target: self.working_path(final_name),
        })
    }

    /// Move an existing file (e.g. from a scratch directory) into the
    /// working area under `final_name`.
    pub fn adopt(&self, source: &Path, final_name: &str) -> Result<PathBuf, DocConvError> {
        let target = self.working_path(final_name);
        if let Err(rename_err) = std::fs::rename(source, &target) {
            // Scratch directories live inside the working area, so a failed
            // rename is not a cross-device move; copy as a last resort anyway.
            debug!("rename failed ({rename_err}), copying {}", source.display());
            std::fs::copy(source, &target).map_err(|e| DocConvError::storage(&target, e))?;
        }
        Ok(target)
    }
}

/// An output being written. Dropping it without [`StagedOutput::commit`]
/// deletes the partial file.
#[derive(Debug)]
pub struct StagedOutput {
    file: NamedTempFile,
    target: PathBuf,
}

impl StagedOutput {
    /// Writable handle to the staged file.
    pub fn file_mut(&mut self) -> &mut std::fs::File {
        self.file.as_file_mut()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flush and atomically rename into the final name.
    pub fn commit(self) -> Result<PathBuf, DocConvError> {
        let target = self.target;
        self.file
            .as_file()
            .sync_all()
            .map_err(|e| DocConvError::storage(&target, e))?;
        self.file
            .persist(&target)
            .map_err(|e| DocConvError::storage(&target, e.error))?;
        Ok(target)
    }
}

/// File name without extension, lossily converted.
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn absolute(dir: &Path) -> Result<PathBuf, DocConvError> {
    std::fs::canonicalize(dir).map_err(|e| DocConvError::storage(dir, e))
}
