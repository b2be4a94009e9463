// SPDX-License-Identifier: MIT OR Apache-2.0
//! Streaming integrity verification.
//!
//! The scan re-reads every file under `objects/`, recomputes its hash, and
//! for decodable microdata verifies that each declared reference points at
//! an existing artifact. Findings are reported through a callback as they
//! are made; the scan never mutates state.

use crate::engine::Storage;
use one_core::{Hash, RefKind};
use one_error::Result;
use one_microdata::from_microdata;
use one_recipes::RecipeRegistry;
use serde::Serialize;
use tracing::warn;

/// One finding of the integrity scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "issue")]
pub enum IntegrityIssue {
    /// A file's bytes no longer hash to its name.
    HashMismatch {
        /// The file's name.
        file: Hash,
        /// What its bytes actually hash to.
        actual: Hash,
    },
    /// A file that looks like microdata fails strict decoding.
    Undecodable {
        /// The file's name.
        file: Hash,
        /// The decoder's message.
        reason: String,
    },
    /// A declared reference points at a missing artifact.
    DanglingReference {
        /// The referring object.
        referrer: Hash,
        /// The missing target.
        target: Hash,
        /// The reference kind that is dangling.
        kind: RefKind,
    },
}

/// Aggregate counts for one scan run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Files examined.
    pub scanned: usize,
    /// Issues reported.
    pub issues: usize,
}

impl Storage {
    /// Verify every stored file, reporting findings to `report`.
    ///
    /// Files that do not start with a microdata frame are treated as
    /// BLOBs/CLOBs and only hash-checked. Reference targets are checked by
    /// kind: object/CLOB/BLOB references must have a file under `objects/`,
    /// ID references a version head under `vheads/`.
    ///
    /// # Errors
    ///
    /// Only on filesystem failures while walking; per-file findings go to
    /// the callback instead.
    pub async fn scan_integrity(
        &self,
        registry: &RecipeRegistry,
        mut report: impl FnMut(IntegrityIssue),
    ) -> Result<ScanSummary> {
        let mut summary = ScanSummary::default();
        for hash in self.list_all_object_hashes().await? {
            summary.scanned += 1;
            let bytes = self.read_blob(&hash).await?;

            let actual = Hash::digest(&bytes);
            if actual != hash {
                warn!(file = %hash, "content hash mismatch");
                summary.issues += 1;
                report(IntegrityIssue::HashMismatch { file: hash, actual });
                continue;
            }

            if !bytes.starts_with(b"<div") {
                continue;
            }
            let Ok(text) = std::str::from_utf8(&bytes) else {
                summary.issues += 1;
                report(IntegrityIssue::Undecodable {
                    file: hash,
                    reason: "not valid UTF-8".into(),
                });
                continue;
            };
            let obj = match from_microdata(text, registry) {
                Ok(obj) => obj,
                Err(e) => {
                    summary.issues += 1;
                    report(IntegrityIssue::Undecodable {
                        file: hash,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let mut links = Vec::new();
            obj.for_each_reference(|link| links.push(*link));
            for link in links {
                let present = match link.kind {
                    RefKind::Id => self.vhead_exists(&link.hash).await,
                    _ => self.object_exists(&link.hash).await,
                };
                if !present {
                    summary.issues += 1;
                    report(IntegrityIssue::DanglingReference {
                        referrer: hash,
                        target: link.hash,
                        kind: link.kind,
                    });
                }
            }
        }
        Ok(summary)
    }
}
