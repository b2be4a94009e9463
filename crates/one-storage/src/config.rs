// SPDX-License-Identifier: MIT OR Apache-2.0
//! Init options and the persisted instance config.
//!
//! The shard depth chosen at first init is load-bearing: reading an object
//! back requires the same depth the file was placed with. It is therefore
//! persisted in `config.json` at the instance root and consulted on every
//! reopen; passing a conflicting explicit depth is an error rather than a
//! silent misread.

use one_core::Hash;
use one_error::{ErrorKind, OneError, Result, codes};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Highest supported shard depth (`16^4` leaf directories).
pub const MAX_SHARD_DEPTH: u8 = 4;

/// Options for [`Storage::init`](crate::Storage::init).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageInitOptions {
    /// Filesystem root the instance directory is created under.
    pub base_dir: PathBuf,
    /// Instance selector: the subdirectory name under `base_dir`.
    pub instance_id_hash: Hash,
    /// Delete and recreate the instance directory before use.
    #[serde(default)]
    pub wipe_storage: bool,
    /// Shard depth for `objects/` (`0..=4`). `None` defers to the value
    /// persisted at first init (or `0` for a fresh instance).
    #[serde(default)]
    pub n_hash_chars_for_sub_dirs: Option<u8>,
    /// Encrypt the object space. Not supported by this engine; `true` is
    /// rejected at init.
    #[serde(default)]
    pub encrypt_storage: bool,
    /// Key-derivation secret, mandatory when `encrypt_storage` is set.
    #[serde(default)]
    pub secret_for_storage_key: Option<String>,
    /// Referrer types whose writes produce `rmaps/` entries.
    #[serde(default)]
    pub initially_enabled_reverse_map_types: BTreeSet<String>,
}

impl StorageInitOptions {
    /// Options with every default: no wipe, unsharded, unencrypted, no
    /// reverse maps.
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>, instance_id_hash: Hash) -> Self {
        Self {
            base_dir: base_dir.into(),
            instance_id_hash,
            wipe_storage: false,
            n_hash_chars_for_sub_dirs: None,
            encrypt_storage: false,
            secret_for_storage_key: None,
            initially_enabled_reverse_map_types: BTreeSet::new(),
        }
    }

    /// Enable reverse maps for the given referrer types.
    #[must_use]
    pub fn with_reverse_map_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.initially_enabled_reverse_map_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Set the shard depth.
    #[must_use]
    pub fn with_shard_depth(mut self, depth: u8) -> Self {
        self.n_hash_chars_for_sub_dirs = Some(depth);
        self
    }

    /// Request a wipe before init.
    #[must_use]
    pub fn with_wipe(mut self) -> Self {
        self.wipe_storage = true;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(depth) = self.n_hash_chars_for_sub_dirs {
            if depth > MAX_SHARD_DEPTH {
                return Err(OneError::new(
                    ErrorKind::FatalStorage,
                    codes::SB_INIT1,
                    format!("nHashCharsForSubDirs must be 0..={MAX_SHARD_DEPTH}, got {depth}"),
                ));
            }
        }
        if self.encrypt_storage {
            if self.secret_for_storage_key.is_none() {
                return Err(OneError::new(
                    ErrorKind::FatalStorage,
                    codes::SB_INIT1,
                    "encryptStorage requires secretForStorageKey",
                ));
            }
            return Err(OneError::new(
                ErrorKind::FatalStorage,
                codes::SB_INIT1,
                "encrypted storage is not supported on this platform",
            ));
        }
        Ok(())
    }
}

/// The per-instance settings persisted in `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InstanceConfig {
    pub n_hash_chars_for_sub_dirs: u8,
    #[serde(default)]
    pub initially_enabled_reverse_map_types: BTreeSet<String>,
}
