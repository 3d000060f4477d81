//! Open-time configuration for a store instance.

use std::path::{Path, PathBuf};

use crate::crypto::MAX_KEY_BYTES;
use crate::error::{Error, Result};

/// Process model for an instance.
///
/// `MultiProcess` takes an advisory file lock around every operation and
/// re-reads the committed length after acquiring it, so several processes
/// can share one data file. `SingleProcess` skips both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    SingleProcess,
    MultiProcess,
}

/// Options for opening a [`Store`](crate::Store).
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Instance identifier; maps to one data file `<id>.mmkv` under `dir`.
    pub id: String,
    /// Root directory for data files. Created if missing.
    pub dir: PathBuf,
    /// Process model.
    pub mode: Mode,
    /// Optional encryption key, at most 16 bytes. An empty key means no
    /// encryption.
    pub encryption_key: Option<String>,
}

impl OpenOptions {
    pub fn new(id: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            dir: dir.as_ref().to_path_buf(),
            mode: Mode::default(),
            encryption_key: None,
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// The encryption key, with the empty-string spelling of "none"
    /// normalized away.
    pub(crate) fn key(&self) -> Option<&str> {
        self.encryption_key.as_deref().filter(|k| !k.is_empty())
    }

    pub(crate) fn file_name(&self) -> String {
        format!("{}.mmkv", self.id)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::EmptyId);
        }
        if let Some(key) = self.key() {
            if key.len() > MAX_KEY_BYTES {
                return Err(Error::EncryptionKeyTooLong(key.len()));
            }
        }
        Ok(())
    }
}
