//! Content identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// How the bytes named by a [`ContentId`] are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Codec {
    /// Opaque payload bytes. Always a leaf.
    Raw,
    /// An encoded [`DagNode`](crate::DagNode) that may link to other blocks.
    Dag,
}

impl Codec {
    /// Text prefix used in the string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Codec::Raw => "raw",
            Codec::Dag => "dag",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A content identifier: a codec plus the 32-byte Blake3 hash of the block.
///
/// The text form is `<codec>:<64 hex chars>`, e.g. `raw:af13...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId {
    codec: Codec,
    hash: [u8; 32],
}

impl ContentId {
    /// Create an ID from a codec and a precomputed hash.
    pub const fn new(codec: Codec, hash: [u8; 32]) -> Self {
        Self { codec, hash }
    }

    /// Hash `data` and name it with `codec`.
    pub fn of(codec: Codec, data: &[u8]) -> Self {
        Self::new(codec, *blake3::hash(data).as_bytes())
    }

    /// The codec.
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    /// Whether this ID names a raw leaf block.
    pub const fn is_raw(&self) -> bool {
        matches!(self.codec, Codec::Raw)
    }

    /// Get the raw hash bytes.
    pub const fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    /// Hash as hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.codec, self.to_hex())
    }
}

impl FromStr for ContentId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidContentId {
            input: s.to_string(),
            reason,
        };

        let (prefix, digest) = s.split_once(':').ok_or_else(|| invalid("missing codec prefix"))?;
        let codec = match prefix {
            "raw" => Codec::Raw,
            "dag" => Codec::Dag,
            _ => return Err(invalid("unknown codec")),
        };

        let bytes = hex::decode(digest).map_err(|_| invalid("hash is not hex"))?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| invalid("hash must be 32 bytes"))?;

        Ok(Self::new(codec, hash))
    }
}

impl Serialize for ContentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
