// SPDX-License-Identifier: MIT OR Apache-2.0
//! Version-head and reverse-map line records.
//!
//! Both files are append-only, one self-contained entry per line:
//!
//! ```text
//! vheads/<idHash>:  <contentHash>\t<epochMillis>[\t<parentContentHash>]
//! rmaps/<target>.<ReferrerType>:  <referrerHash>\t<epochMillis>
//! ```
//!
//! The parent column is present only when the write supplied a parent
//! version, which is how the version tree is recorded.

use one_core::Hash;
use one_error::{ErrorKind, OneError, Result, codes};
use serde::Serialize;

/// One line of a version head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VersionNode {
    /// The content hash of this version.
    pub hash: Hash,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
    /// The version this one was derived from, if recorded.
    pub parent: Option<Hash>,
}

impl VersionNode {
    /// Render the line (without trailing newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        match self.parent {
            Some(parent) => format!("{}\t{}\t{parent}", self.hash, self.timestamp),
            None => format!("{}\t{}", self.hash, self.timestamp),
        }
    }

    /// Parse one version-head line.
    ///
    /// # Errors
    ///
    /// `VOB-LINE1` for a malformed line.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split('\t');
        let hash = fields
            .next()
            .ok_or_else(|| bad_line(line))?
            .parse::<Hash>()
            .map_err(|_| bad_line(line))?;
        let timestamp = fields
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| bad_line(line))?;
        let parent = match fields.next() {
            Some(p) => Some(p.parse::<Hash>().map_err(|_| bad_line(line))?),
            None => None,
        };
        if fields.next().is_some() {
            return Err(bad_line(line));
        }
        Ok(Self {
            hash,
            timestamp,
            parent,
        })
    }
}

/// One line of a reverse map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReverseMapEntry {
    /// The object referring to the map's target.
    pub referrer: Hash,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
}

impl ReverseMapEntry {
    /// Render the line (without trailing newline).
    #[must_use]
    pub fn to_line(&self) -> String {
        format!("{}\t{}", self.referrer, self.timestamp)
    }

    /// Parse one reverse-map line.
    ///
    /// # Errors
    ///
    /// `VOB-LINE1` for a malformed line.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split('\t');
        let referrer = fields
            .next()
            .ok_or_else(|| bad_line(line))?
            .parse::<Hash>()
            .map_err(|_| bad_line(line))?;
        let timestamp = fields
            .next()
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| bad_line(line))?;
        if fields.next().is_some() {
            return Err(bad_line(line));
        }
        Ok(Self {
            referrer,
            timestamp,
        })
    }
}

fn bad_line(line: &str) -> OneError {
    OneError::new(
        ErrorKind::Parse,
        codes::VOB_LINE1,
        format!("malformed map line {line:?}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_node_roundtrip_without_parent() {
        let node = VersionNode {
            hash: Hash::digest(b"v1"),
            timestamp: 1_700_000_000_000,
            parent: None,
        };
        let line = node.to_line();
        assert_eq!(line, format!("{}\t1700000000000", node.hash));
        assert_eq!(VersionNode::parse(&line).unwrap(), node);
    }

    #[test]
    fn version_node_roundtrip_with_parent() {
        let node = VersionNode {
            hash: Hash::digest(b"v2"),
            timestamp: 42,
            parent: Some(Hash::digest(b"v1")),
        };
        assert_eq!(VersionNode::parse(&node.to_line()).unwrap(), node);
    }

    #[test]
    fn malformed_lines_fail() {
        assert_eq!(VersionNode::parse("junk").unwrap_err().code(), "VOB-LINE1");
        assert_eq!(
            VersionNode::parse(&format!("{}\tnot-a-number", Hash::digest(b"x")))
                .unwrap_err()
                .code(),
            "VOB-LINE1"
        );
        let four_cols = format!(
            "{}\t1\t{}\textra",
            Hash::digest(b"x"),
            Hash::digest(b"y")
        );
        assert!(VersionNode::parse(&four_cols).is_err());
    }

    #[test]
    fn reverse_map_entry_roundtrip() {
        let entry = ReverseMapEntry {
            referrer: Hash::digest(b"r"),
            timestamp: 7,
        };
        assert_eq!(ReverseMapEntry::parse(&entry.to_line()).unwrap(), entry);
        assert!(ReverseMapEntry::parse("nope\t1").is_err());
    }
}
