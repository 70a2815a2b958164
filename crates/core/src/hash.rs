//! Content-addressed block hashing using SHA-256

use std::fmt;

use color_eyre::eyre::ensure;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A block digest: the SHA-256 of the block's bytes (256-bit)
///
/// The interchange form is 64 lowercase hex characters, which can never
/// collide with the one-character tombstone marker.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// Hash a block's bytes
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        Self(Sha256::digest(data).into())
    }

    /// Wrap an already-computed digest
    #[must_use]
    pub fn from_raw(raw: [u8; 32]) -> Self {
        Self(raw)
    }

    /// Get raw digest bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as 64 lowercase hex characters
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a 64-character hex digest
    ///
    /// Rejects anything else, in particular the tombstone marker `"0"`.
    ///
    /// # Errors
    /// Returns an error if the input is not exactly 64 hex characters.
    pub fn parse_hex(s: &str) -> color_eyre::Result<Self> {
        ensure!(
            s.len() == 64,
            "block hash must be 64 hex chars, got {} ({s:?})",
            s.len()
        );
        let mut raw = [0u8; 32];
        hex::decode_to_slice(s, &mut raw)?;
        Ok(Self(raw))
    }
}

impl From<BlockHash> for String {
    fn from(hash: BlockHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for BlockHash {
    type Error = color_eyre::Report;

    fn try_from(s: String) -> color_eyre::Result<Self> {
        Self::parse_hex(&s)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "BlockHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
