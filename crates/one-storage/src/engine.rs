// SPDX-License-Identifier: MIT OR Apache-2.0
//! The storage engine proper.

use crate::config::{InstanceConfig, StorageInitOptions};
use one_core::Hash;
use one_error::{ErrorKind, OneError, Result, codes};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use one_sync::NamedSerializer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

const CONFIG_FILE: &str = "config.json";
const SUBDIRS: [&str; 6] = ["objects", "tmp", "rmaps", "vheads", "private", "acache"];
const COPY_BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Creation results
// ---------------------------------------------------------------------------

/// Outcome of a content-addressed create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreationStatus {
    /// The file did not exist and was written.
    New,
    /// A file with this hash already existed; nothing was written.
    Exists,
}

/// A creation status together with the file's content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileCreation {
    /// Whether the write created the file or found it in place.
    pub status: CreationStatus,
    /// The content hash (and file name).
    pub hash: Hash,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Handle to one instance directory.
///
/// Cloning is cheap; clones share the write serializer, so creation races
/// within one process always collapse to a single rename attempt.
#[derive(Clone)]
pub struct Storage {
    root: PathBuf,
    shard_depth: u8,
    reverse_map_types: BTreeSet<String>,
    serializer: NamedSerializer,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("root", &self.root)
            .field("shard_depth", &self.shard_depth)
            .finish()
    }
}

impl Storage {
    /// Initialize (or reopen) an instance directory.
    ///
    /// Creates the directory tree, pre-creates the `16^k` shard directories
    /// when a depth is configured, and persists the instance config. On
    /// reopen the persisted shard depth wins; passing a different explicit
    /// depth fails instead of silently misplacing reads.
    ///
    /// # Errors
    ///
    /// `SB-INIT1` for invalid options or a conflicting reopen, `SB-IO1`
    /// for unexpected filesystem failures.
    pub async fn init(options: StorageInitOptions) -> Result<Self> {
        options.validate()?;
        let root = options.base_dir.join(options.instance_id_hash.to_string());

        if options.wipe_storage && tokio::fs::try_exists(&root).await.unwrap_or(false) {
            info!(root = %root.display(), "wiping instance directory");
            tokio::fs::remove_dir_all(&root)
                .await
                .map_err(|e| fatal_io("wipe instance directory", &root, e))?;
        }

        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| fatal_io("create instance directory", &root, e))?;

        let config_path = root.join(CONFIG_FILE);
        let persisted = read_instance_config(&config_path).await?;
        let config = match (persisted, options.n_hash_chars_for_sub_dirs) {
            (Some(persisted), Some(requested)) if persisted.n_hash_chars_for_sub_dirs != requested => {
                return Err(OneError::new(
                    ErrorKind::FatalStorage,
                    codes::SB_INIT1,
                    format!(
                        "instance was created with nHashCharsForSubDirs={}, reopened with {requested}",
                        persisted.n_hash_chars_for_sub_dirs
                    ),
                ));
            }
            (Some(persisted), _) => InstanceConfig {
                n_hash_chars_for_sub_dirs: persisted.n_hash_chars_for_sub_dirs,
                initially_enabled_reverse_map_types: if options
                    .initially_enabled_reverse_map_types
                    .is_empty()
                {
                    persisted.initially_enabled_reverse_map_types
                } else {
                    options.initially_enabled_reverse_map_types.clone()
                },
            },
            (None, requested) => InstanceConfig {
                n_hash_chars_for_sub_dirs: requested.unwrap_or(0),
                initially_enabled_reverse_map_types: options
                    .initially_enabled_reverse_map_types
                    .clone(),
            },
        };
        write_instance_config(&config_path, &config).await?;

        for sub in SUBDIRS {
            let dir = root.join(sub);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| fatal_io("create subdirectory", &dir, e))?;
        }

        let depth = config.n_hash_chars_for_sub_dirs;
        if depth > 0 {
            let objects = root.join("objects");
            for i in 0..16usize.pow(u32::from(depth)) {
                let prefix = format!("{i:0width$x}", width = depth as usize);
                let dir = objects.join(prefix);
                tokio::fs::create_dir_all(&dir)
                    .await
                    .map_err(|e| fatal_io("create shard directory", &dir, e))?;
            }
        }

        info!(root = %root.display(), shard_depth = depth, "storage initialized");
        Ok(Self {
            root,
            shard_depth: depth,
            reverse_map_types: config.initially_enabled_reverse_map_types,
            serializer: NamedSerializer::new(),
        })
    }

    /// The instance root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The effective shard depth.
    #[must_use]
    pub fn shard_depth(&self) -> u8 {
        self.shard_depth
    }

    /// Referrer types whose writes record reverse-map entries.
    #[must_use]
    pub fn reverse_map_types(&self) -> &BTreeSet<String> {
        &self.reverse_map_types
    }

    /// Final path of the file named `hash`, respecting the shard depth.
    #[must_use]
    pub fn object_path(&self, hash: &Hash) -> PathBuf {
        let objects = self.root.join("objects");
        if self.shard_depth == 0 {
            objects.join(hash.to_string())
        } else {
            objects
                .join(hash.hex_prefix(self.shard_depth as usize))
                .join(hash.to_string())
        }
    }

    // -- Content-addressed creation -------------------------------------

    /// Store a one-line UTF-8 microdata string under its content hash.
    pub async fn store_utf8_object(&self, content: &str) -> Result<FileCreation> {
        let hash = Hash::digest(content.as_bytes());
        self.create_object_file(hash, content.as_bytes()).await
    }

    /// Store a UTF-8 CLOB under its content hash.
    pub async fn store_clob(&self, content: &str) -> Result<FileCreation> {
        let hash = Hash::digest(content.as_bytes());
        self.create_object_file(hash, content.as_bytes()).await
    }

    /// Store an in-memory BLOB under its content hash.
    ///
    /// Zero-byte BLOBs are legal and hash to the well-known empty-input
    /// digest.
    pub async fn store_blob(&self, bytes: &[u8]) -> Result<FileCreation> {
        let hash = Hash::digest(bytes);
        self.create_object_file(hash, bytes).await
    }

    /// Stream a BLOB to disk, computing its SHA-256 incrementally.
    ///
    /// The data is staged into `tmp/` while hashing, then renamed to its
    /// final content-addressed name like every other create.
    pub async fn store_blob_stream(
        &self,
        mut reader: impl AsyncRead + Unpin,
    ) -> Result<FileCreation> {
        let tmp_path = self.root.join("tmp").join(random_hex_name());
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .map_err(|e| fatal_io("create temp file", &tmp_path, e))?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUF_SIZE];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| fatal_io("read blob stream", &tmp_path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            file.write_all(&buf[..n])
                .await
                .map_err(|e| fatal_io("write temp file", &tmp_path, e))?;
        }
        file.flush()
            .await
            .map_err(|e| fatal_io("flush temp file", &tmp_path, e))?;
        drop(file);

        let hash = Hash::from_hasher(hasher);
        self.promote_temp_file(hash, tmp_path).await
    }

    /// Write `bytes` to a fresh temp file, then atomically promote it.
    async fn create_object_file(&self, hash: Hash, bytes: &[u8]) -> Result<FileCreation> {
        let tmp_path = self.root.join("tmp").join(random_hex_name());
        tokio::fs::write(&tmp_path, bytes)
            .await
            .map_err(|e| fatal_io("write temp file", &tmp_path, e))?;
        self.promote_temp_file(hash, tmp_path).await
    }

    /// Rename a fully-written temp file to its final name, or discard it if
    /// the name is already taken. Serialized per hash so racing creators
    /// collapse to one rename attempt.
    async fn promote_temp_file(&self, hash: Hash, tmp_path: PathBuf) -> Result<FileCreation> {
        let final_path = self.object_path(&hash);
        self.serializer
            .run_serial(&format!("write:{hash}"), async move {
                if tokio::fs::try_exists(&final_path).await.unwrap_or(false) {
                    debug!(%hash, "object already exists, dropping temp file");
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    return Ok(FileCreation {
                        status: CreationStatus::Exists,
                        hash,
                    });
                }
                match tokio::fs::rename(&tmp_path, &final_path).await {
                    Ok(()) => {
                        debug!(%hash, "object written");
                        Ok(FileCreation {
                            status: CreationStatus::New,
                            hash,
                        })
                    }
                    Err(e) => {
                        let _ = tokio::fs::remove_file(&tmp_path).await;
                        if e.kind() == io::ErrorKind::NotFound {
                            // The shard directory vanished under us.
                            Err(OneError::new(
                                ErrorKind::FatalStorage,
                                codes::SB_WRITE1,
                                format!("target directory vanished for {}", final_path.display()),
                            )
                            .with_source(e))
                        } else {
                            Err(fatal_io("rename temp file", &final_path, e))
                        }
                    }
                }
            })
            .await
    }

    // -- Reads ----------------------------------------------------------

    /// Read a stored object / CLOB as UTF-8 text.
    ///
    /// # Errors
    ///
    /// `SB-READ2` when the file does not exist.
    pub async fn read_utf8_object(&self, hash: &Hash) -> Result<String> {
        let path = self.object_path(hash);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| read_err(codes::SB_READ2, &path, e))
    }

    /// Read a stored BLOB as raw bytes.
    pub async fn read_blob(&self, hash: &Hash) -> Result<Vec<u8>> {
        let path = self.object_path(hash);
        tokio::fs::read(&path)
            .await
            .map_err(|e| read_err(codes::SB_READ2, &path, e))
    }

    /// Read a stored BLOB as a base64 string.
    pub async fn read_blob_base64(&self, hash: &Hash) -> Result<String> {
        Ok(base64::encode(self.read_blob(hash).await?))
    }

    /// Open a streaming reader over a stored file.
    pub async fn object_reader(&self, hash: &Hash) -> Result<tokio::fs::File> {
        let path = self.object_path(hash);
        tokio::fs::File::open(&path)
            .await
            .map_err(|e| read_err(codes::SB_READ2, &path, e))
    }

    /// Whether a file with this hash exists.
    pub async fn object_exists(&self, hash: &Hash) -> bool {
        tokio::fs::try_exists(self.object_path(hash)).await.unwrap_or(false)
    }

    // -- Private area ----------------------------------------------------

    /// Exclusive-create a raw byte file under `private/<name>`.
    ///
    /// # Errors
    ///
    /// `SB-WRITE2` when the name is already taken.
    pub async fn write_private(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.private_path(name)?;
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    OneError::new(
                        ErrorKind::AlreadyExists,
                        codes::SB_WRITE2,
                        format!("private file {name:?} already exists"),
                    )
                    .with_source(e)
                } else {
                    fatal_io("create private file", &path, e)
                }
            })?;
        file.write_all(bytes)
            .await
            .map_err(|e| fatal_io("write private file", &path, e))?;
        file.flush()
            .await
            .map_err(|e| fatal_io("flush private file", &path, e))?;
        Ok(())
    }

    /// Read a file from the private area.
    ///
    /// # Errors
    ///
    /// `SB-READ1` when the name does not exist.
    pub async fn read_private(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.private_path(name)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| read_err(codes::SB_READ1, &path, e))
    }

    fn private_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(OneError::new(
                ErrorKind::FatalStorage,
                codes::SB_IO1,
                format!("invalid private file name {name:?}"),
            ));
        }
        Ok(self.root.join("private").join(name))
    }

    // -- Append-only maps -------------------------------------------------

    /// Append one line to `vheads/<idHash>`. Appends to the same file are
    /// funneled through the named serializer, so lines are totally ordered.
    pub async fn append_vhead_line(&self, id_hash: &Hash, line: &str) -> Result<()> {
        let path = self.root.join("vheads").join(id_hash.to_string());
        self.append_line(&path, &format!("append:vheads/{id_hash}"), line).await
    }

    /// Read all non-empty lines of `vheads/<idHash>` in file order.
    ///
    /// # Errors
    ///
    /// `SB-READ1` when no version head exists for this ID.
    pub async fn read_vhead_lines(&self, id_hash: &Hash) -> Result<Vec<String>> {
        let path = self.root.join("vheads").join(id_hash.to_string());
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| read_err(codes::SB_READ1, &path, e))?;
        Ok(text.lines().filter(|l| !l.is_empty()).map(String::from).collect())
    }

    /// Whether a version head exists for this ID.
    pub async fn vhead_exists(&self, id_hash: &Hash) -> bool {
        let path = self.root.join("vheads").join(id_hash.to_string());
        tokio::fs::try_exists(&path).await.unwrap_or(false)
    }

    /// Append one line to `rmaps/<target>.<ReferrerType>`.
    pub async fn append_rmap_line(
        &self,
        target: &Hash,
        referrer_type: &str,
        line: &str,
    ) -> Result<()> {
        let name = format!("{target}.{referrer_type}");
        let path = self.root.join("rmaps").join(&name);
        self.append_line(&path, &format!("append:rmaps/{name}"), line).await
    }

    /// Read all non-empty lines of a reverse map. A map that was never
    /// written yields an empty list, not an error.
    pub async fn read_rmap_lines(&self, target: &Hash, referrer_type: &str) -> Result<Vec<String>> {
        let path = self
            .root
            .join("rmaps")
            .join(format!("{target}.{referrer_type}"));
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text.lines().filter(|l| !l.is_empty()).map(String::from).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(fatal_io("read reverse map", &path, e)),
        }
    }

    async fn append_line(&self, path: &Path, serial_name: &str, line: &str) -> Result<()> {
        let path = path.to_path_buf();
        let entry = format!("{line}\n");
        self.serializer
            .run_serial(serial_name, async move {
                let mut file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&path)
                    .await
                    .map_err(|e| fatal_io("open append file", &path, e))?;
                file.write_all(entry.as_bytes())
                    .await
                    .map_err(|e| fatal_io("append line", &path, e))?;
                file.flush()
                    .await
                    .map_err(|e| fatal_io("flush append file", &path, e))?;
                Ok(())
            })
            .await
    }

    // -- Listing ----------------------------------------------------------

    /// Every file name in `objects/`, respecting the shard depth.
    pub async fn list_all_object_hashes(&self) -> Result<Vec<Hash>> {
        let objects = self.root.join("objects");
        let mut hashes = Vec::new();
        if self.shard_depth == 0 {
            collect_hashes(&objects, &mut hashes).await?;
        } else {
            let mut dirs = tokio::fs::read_dir(&objects)
                .await
                .map_err(|e| fatal_io("list objects", &objects, e))?;
            while let Some(entry) = dirs
                .next_entry()
                .await
                .map_err(|e| fatal_io("list objects", &objects, e))?
            {
                if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                    collect_hashes(&entry.path(), &mut hashes).await?;
                }
            }
        }
        hashes.sort_unstable();
        Ok(hashes)
    }

    /// Every ID hash with a version head.
    pub async fn list_all_id_hashes(&self) -> Result<Vec<Hash>> {
        let vheads = self.root.join("vheads");
        let mut hashes = Vec::new();
        collect_hashes(&vheads, &mut hashes).await?;
        hashes.sort_unstable();
        Ok(hashes)
    }

    /// Every reverse-map file name, optionally filtered by prefix.
    pub async fn list_all_reverse_map_names(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let rmaps = self.root.join("rmaps");
        let mut names = Vec::new();
        let mut dir = tokio::fs::read_dir(&rmaps)
            .await
            .map_err(|e| fatal_io("list reverse maps", &rmaps, e))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| fatal_io("list reverse maps", &rmaps, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if prefix.is_none_or(|p| name.starts_with(p)) {
                names.push(name);
            }
        }
        names.sort_unstable();
        Ok(names)
    }
}

async fn collect_hashes(dir: &Path, out: &mut Vec<Hash>) -> Result<()> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| fatal_io("list directory", dir, e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| fatal_io("list directory", dir, e))?
    {
        if let Ok(hash) = entry.file_name().to_string_lossy().parse::<Hash>() {
            out.push(hash);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Instance config I/O
// ---------------------------------------------------------------------------

async fn read_instance_config(path: &Path) -> Result<Option<InstanceConfig>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let config = serde_json::from_slice(&bytes).map_err(|e| {
                OneError::new(
                    ErrorKind::FatalStorage,
                    codes::SB_INIT1,
                    format!("corrupt instance config at {}", path.display()),
                )
                .with_source(e)
            })?;
            Ok(Some(config))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(fatal_io("read instance config", path, e)),
    }
}

async fn write_instance_config(path: &Path, config: &InstanceConfig) -> Result<()> {
    let json = serde_json::to_vec_pretty(config).map_err(|e| {
        OneError::new(ErrorKind::FatalStorage, codes::SB_INIT1, "unserializable instance config")
            .with_source(e)
    })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| fatal_io("write instance config", path, e))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// 64 random lowercase hex characters, the temp-file naming scheme.
fn random_hex_name() -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..64).map(|_| HEX[rng.gen_range(0..16)] as char).collect()
}

fn read_err(code: &'static str, path: &Path, e: io::Error) -> OneError {
    if e.kind() == io::ErrorKind::NotFound {
        OneError::new(
            ErrorKind::FileNotFound,
            code,
            format!("no file at {}", path.display()),
        )
        .with_source(e)
    } else {
        fatal_io("read file", path, e)
    }
}

fn fatal_io(action: &str, path: &Path, e: io::Error) -> OneError {
    OneError::new(
        ErrorKind::FatalStorage,
        codes::SB_IO1,
        format!("{action} failed for {}", path.display()),
    )
    .with_source(e)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use one_core::EMPTY_HASH;

    async fn storage_with(options: impl FnOnce(StorageInitOptions) -> StorageInitOptions) -> (tempfile::TempDir, Storage) {
        let dir = tempfile::tempdir().unwrap();
        let opts = options(StorageInitOptions::new(dir.path(), Hash::digest(b"instance")));
        let storage = Storage::init(opts).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn init_creates_layout() {
        let (_dir, storage) = storage_with(|o| o).await;
        for sub in SUBDIRS {
            assert!(storage.root().join(sub).is_dir(), "{sub} missing");
        }
        assert!(storage.root().join(CONFIG_FILE).is_file());
    }

    #[tokio::test]
    async fn double_store_is_new_then_exists() {
        let (_dir, storage) = storage_with(|o| o).await;
        let first = storage.store_utf8_object("<div>x</div>").await.unwrap();
        let second = storage.store_utf8_object("<div>x</div>").await.unwrap();
        assert_eq!(first.status, CreationStatus::New);
        assert_eq!(second.status, CreationStatus::Exists);
        assert_eq!(first.hash, second.hash);
    }

    #[tokio::test]
    async fn stored_file_name_equals_content_hash() {
        let (_dir, storage) = storage_with(|o| o).await;
        let creation = storage.store_blob(b"payload").await.unwrap();
        let bytes = storage.read_blob(&creation.hash).await.unwrap();
        assert_eq!(Hash::digest(&bytes), creation.hash);
        // tmp/ is left clean.
        let mut tmp = tokio::fs::read_dir(storage.root().join("tmp")).await.unwrap();
        assert!(tmp.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_byte_blob_is_legal() {
        let (_dir, storage) = storage_with(|o| o).await;
        let creation = storage.store_blob(b"").await.unwrap();
        assert_eq!(creation.hash.to_string(), EMPTY_HASH);
        assert!(storage.read_blob(&creation.hash).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blob_stream_matches_in_memory_store() {
        let (_dir, storage) = storage_with(|o| o).await;
        let data = vec![7u8; 200_000];
        let streamed = storage.store_blob_stream(&data[..]).await.unwrap();
        assert_eq!(streamed.hash, Hash::digest(&data));
        assert_eq!(streamed.status, CreationStatus::New);
        let again = storage.store_blob(&data).await.unwrap();
        assert_eq!(again.status, CreationStatus::Exists);
    }

    #[tokio::test]
    async fn missing_object_read_is_sb_read2() {
        let (_dir, storage) = storage_with(|o| o).await;
        let err = storage.read_utf8_object(&Hash::digest(b"nope")).await.unwrap_err();
        assert_eq!(err.code(), "SB-READ2");
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[tokio::test]
    async fn sharded_placement_and_listing() {
        let (_dir, storage) = storage_with(|o| o.with_shard_depth(2)).await;
        let creation = storage.store_blob(b"sharded").await.unwrap();
        let expected = storage
            .root()
            .join("objects")
            .join(creation.hash.hex_prefix(2))
            .join(creation.hash.to_string());
        assert!(expected.is_file());
        assert_eq!(storage.list_all_object_hashes().await.unwrap(), vec![creation.hash]);
    }

    #[tokio::test]
    async fn shard_dirs_are_precreated() {
        let (_dir, storage) = storage_with(|o| o.with_shard_depth(1)).await;
        for i in 0..16 {
            let prefix = format!("{i:x}");
            assert!(storage.root().join("objects").join(prefix).is_dir());
        }
    }

    #[tokio::test]
    async fn reopen_uses_persisted_shard_depth() {
        let dir = tempfile::tempdir().unwrap();
        let instance = Hash::digest(b"instance");
        let storage = Storage::init(
            StorageInitOptions::new(dir.path(), instance).with_shard_depth(2),
        )
        .await
        .unwrap();
        let creation = storage.store_blob(b"persisted").await.unwrap();
        drop(storage);

        // Reopen without passing a depth: the persisted value is used.
        let reopened = Storage::init(StorageInitOptions::new(dir.path(), instance))
            .await
            .unwrap();
        assert_eq!(reopened.shard_depth(), 2);
        assert_eq!(reopened.read_blob(&creation.hash).await.unwrap(), b"persisted");

        // Reopening with a conflicting depth fails.
        let err = Storage::init(
            StorageInitOptions::new(dir.path(), instance).with_shard_depth(3),
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), "SB-INIT1");
    }

    #[tokio::test]
    async fn wipe_storage_clears_instance() {
        let dir = tempfile::tempdir().unwrap();
        let instance = Hash::digest(b"instance");
        let storage = Storage::init(StorageInitOptions::new(dir.path(), instance)).await.unwrap();
        let creation = storage.store_blob(b"doomed").await.unwrap();
        drop(storage);

        let wiped = Storage::init(StorageInitOptions::new(dir.path(), instance).with_wipe())
            .await
            .unwrap();
        assert!(!wiped.object_exists(&creation.hash).await);
    }

    #[tokio::test]
    async fn private_files_are_exclusive_create() {
        let (_dir, storage) = storage_with(|o| o).await;
        storage.write_private("secrets.bin", b"one").await.unwrap();
        let err = storage.write_private("secrets.bin", b"two").await.unwrap_err();
        assert_eq!(err.code(), "SB-WRITE2");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(storage.read_private("secrets.bin").await.unwrap(), b"one");
        let err = storage.read_private("missing.bin").await.unwrap_err();
        assert_eq!(err.code(), "SB-READ1");
    }

    #[tokio::test]
    async fn private_names_cannot_escape_the_area() {
        let (_dir, storage) = storage_with(|o| o).await;
        assert!(storage.write_private("../evil", b"x").await.is_err());
        assert!(storage.write_private("a/b", b"x").await.is_err());
    }

    #[tokio::test]
    async fn vhead_appends_accumulate_in_order() {
        let (_dir, storage) = storage_with(|o| o).await;
        let id = Hash::digest(b"id");
        storage.append_vhead_line(&id, "line-1").await.unwrap();
        storage.append_vhead_line(&id, "line-2").await.unwrap();
        assert_eq!(storage.read_vhead_lines(&id).await.unwrap(), vec!["line-1", "line-2"]);
        assert!(storage.vhead_exists(&id).await);
        assert_eq!(storage.list_all_id_hashes().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn missing_vhead_read_is_sb_read1() {
        let (_dir, storage) = storage_with(|o| o).await;
        let err = storage.read_vhead_lines(&Hash::digest(b"none")).await.unwrap_err();
        assert_eq!(err.code(), "SB-READ1");
    }

    #[tokio::test]
    async fn absent_reverse_map_reads_empty() {
        let (_dir, storage) = storage_with(|o| o).await;
        let target = Hash::digest(b"t");
        assert!(storage.read_rmap_lines(&target, "Person").await.unwrap().is_empty());
        storage.append_rmap_line(&target, "Person", "entry").await.unwrap();
        assert_eq!(storage.read_rmap_lines(&target, "Person").await.unwrap(), vec!["entry"]);
        let names = storage.list_all_reverse_map_names(None).await.unwrap();
        assert_eq!(names, vec![format!("{target}.Person")]);
        let filtered = storage
            .list_all_reverse_map_names(Some(&target.to_string()))
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert!(storage
            .list_all_reverse_map_names(Some("ffff"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn base64_read_encoding() {
        let (_dir, storage) = storage_with(|o| o).await;
        let creation = storage.store_blob(&[0xde, 0xad, 0xbe, 0xef]).await.unwrap();
        assert_eq!(storage.read_blob_base64(&creation.hash).await.unwrap(), "3q2+7w==");
    }

    #[tokio::test]
    async fn concurrent_creators_collapse_to_one_writer() {
        let (_dir, storage) = storage_with(|o| o).await;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let storage = storage.clone();
            tasks.push(tokio::spawn(async move {
                storage.store_blob(b"contended").await.unwrap()
            }));
        }
        let mut new_count = 0;
        for task in tasks {
            let creation = task.await.unwrap();
            if creation.status == CreationStatus::New {
                new_count += 1;
            }
        }
        assert_eq!(new_count, 1);
    }
}
