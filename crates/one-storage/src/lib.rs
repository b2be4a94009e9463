// SPDX-License-Identifier: MIT OR Apache-2.0
//! one-storage
//!
//! The content-addressed storage engine. Everything lives under a single
//! `baseDir/<instanceIdHash>/` root:
//!
//! ```text
//! objects/  tmp/  rmaps/  vheads/  private/  acache/
//! ```
//!
//! `objects/` holds microdata files, BLOBs, and CLOBs under their content
//! hash, optionally sharded by a hex prefix. Writers stage into `tmp/` and
//! atomically rename; racing creators for the same hash collapse through a
//! named serializer, so a collision resolves to an `exists` status, never
//! an overwrite. `vheads/` and `rmaps/` are append-only line files the
//! engine never rewrites.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Init options and the persisted instance config.
pub mod config;
/// The storage engine proper.
pub mod engine;
/// Streaming integrity verification.
pub mod scan;

pub use config::StorageInitOptions;
pub use engine::{CreationStatus, FileCreation, Storage};
pub use scan::{IntegrityIssue, ScanSummary};
