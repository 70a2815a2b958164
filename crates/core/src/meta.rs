//! File metadata records exchanged with the metadata store
//!
//! A file's content is described by an ordered list of block digests. A
//! deleted file keeps its record as a tombstone: the reserved single-element
//! list `["0"]`, which no real SHA-256 hex digest can collide with.

use std::collections::HashMap;

use color_eyre::eyre::Result;
use serde::{Deserialize, Serialize};

use crate::hash::BlockHash;

/// The reserved hash-list entry marking a deleted file
pub const TOMBSTONE_MARKER: &str = "0";

/// Version returned by the metadata store when a proposal is rejected
pub const REJECTED_VERSION: i32 = -1;

/// Ordered content description of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<String>", try_from = "Vec<String>")]
pub enum HashList {
    /// Block digests in file order; an empty list is an empty file
    Blocks(Vec<BlockHash>),
    /// The file is deleted
    Tombstone,
}

impl HashList {
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::Tombstone)
    }

    /// The digests, or None for a tombstone
    #[must_use]
    pub fn as_blocks(&self) -> Option<&[BlockHash]> {
        match self {
            Self::Blocks(hashes) => Some(hashes),
            Self::Tombstone => None,
        }
    }
}

impl From<HashList> for Vec<String> {
    fn from(list: HashList) -> Self {
        match list {
            HashList::Tombstone => vec![TOMBSTONE_MARKER.to_string()],
            HashList::Blocks(hashes) => hashes.iter().map(BlockHash::to_hex).collect(),
        }
    }
}

impl TryFrom<Vec<String>> for HashList {
    type Error = color_eyre::Report;

    fn try_from(entries: Vec<String>) -> Result<Self> {
        if entries.len() == 1 && entries[0] == TOMBSTONE_MARKER {
            return Ok(Self::Tombstone);
        }
        let hashes = entries
            .iter()
            .map(|s| BlockHash::parse_hex(s))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::Blocks(hashes))
    }
}

/// Per-file record held by the metadata store and the local index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetaData {
    /// Path relative to the client base directory, forward slashes
    pub filename: String,
    /// Starts at 1, increments by 1 on each accepted mutation
    pub version: i32,
    pub hash_list: HashList,
}

impl FileMetaData {
    #[must_use]
    pub fn new(filename: impl Into<String>, version: i32, hash_list: HashList) -> Self {
        Self {
            filename: filename.into(),
            version,
            hash_list,
        }
    }

    /// A deletion record at the given version
    #[must_use]
    pub fn tombstone(filename: impl Into<String>, version: i32) -> Self {
        Self::new(filename, version, HashList::Tombstone)
    }

    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.hash_list.is_tombstone()
    }
}

/// The complete filename -> record mapping
pub type FileInfoMap = HashMap<String, FileMetaData>;
