//! DAG nodes and the blocks that carry them.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::cid::{Codec, ContentId};
use crate::error::{Error, Result};

/// A node in a content-addressed graph.
///
/// Nodes without links are leaves; only leaf payloads count as content bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    /// Child links, in content order.
    pub links: Vec<ContentId>,
    /// Payload carried by this node.
    pub data: Bytes,
}

impl DagNode {
    /// A leaf holding `data`.
    pub fn leaf(data: impl Into<Bytes>) -> Self {
        Self {
            links: Vec::new(),
            data: data.into(),
        }
    }

    /// An interior node linking to `links`.
    pub fn branch(links: Vec<ContentId>) -> Self {
        Self {
            links,
            data: Bytes::new(),
        }
    }

    /// Whether this node has no outgoing links.
    pub fn is_leaf(&self) -> bool {
        self.links.is_empty()
    }

    /// Payload size in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A block: bytes together with the ID they hash to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cid: ContentId,
    data: Bytes,
}

impl Block {
    /// Wrap raw payload bytes as a raw block.
    pub fn raw(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            cid: ContentId::of(Codec::Raw, &data),
            data,
        }
    }

    /// Encode a node as a dag block.
    pub fn encode(node: &DagNode) -> Result<Self> {
        let data = Bytes::from(bincode::serialize(node)?);
        Ok(Self {
            cid: ContentId::of(Codec::Dag, &data),
            data,
        })
    }

    /// Pair bytes received from elsewhere with the ID they were requested
    /// under, checking the hash.
    pub fn verified(cid: ContentId, data: impl Into<Bytes>) -> Result<Self> {
        let block = Self {
            cid,
            data: data.into(),
        };
        block.verify()?;
        Ok(block)
    }

    /// The block's content ID.
    pub fn cid(&self) -> &ContentId {
        &self.cid
    }

    /// The encoded bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Recompute the hash and compare it to the ID.
    pub fn verify(&self) -> Result<()> {
        let actual = ContentId::of(self.cid.codec(), &self.data);
        if actual != self.cid {
            return Err(Error::HashMismatch {
                expected: self.cid,
                actual,
            });
        }
        Ok(())
    }

    /// Decode into a [`DagNode`]. Raw blocks become leaves.
    pub fn decode(&self) -> Result<DagNode> {
        match self.cid.codec() {
            Codec::Raw => Ok(DagNode::leaf(self.data.clone())),
            Codec::Dag => Ok(bincode::deserialize(&self.data)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_block_decodes_to_leaf() {
        let block = Block::raw(&b"payload"[..]);
        let node = block.decode().unwrap();
        assert!(node.is_leaf());
        assert_eq!(node.size(), 7);
        assert!(block.cid().is_raw());
    }

    #[test]
    fn dag_block_roundtrip() {
        let child = Block::raw(&b"child"[..]);
        let node = DagNode::branch(vec![*child.cid()]);
        let block = Block::encode(&node).unwrap();

        assert_eq!(block.decode().unwrap(), node);
        block.verify().unwrap();
    }

    #[test]
    fn verified_rejects_tampered_bytes() {
        let block = Block::raw(&b"original"[..]);
        let err = Block::verified(*block.cid(), &b"tampered"[..]).unwrap_err();
        assert!(matches!(err, Error::HashMismatch { .. }));
    }
}
