//! Chunking bytes into a DAG and reassembling them.

use bytes::{Bytes, BytesMut};

use crate::cid::ContentId;
use crate::error::{Error, Result};
use crate::node::{Block, DagNode};
use crate::store::Blockstore;

/// Default leaf chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default maximum links per interior node.
pub const DEFAULT_MAX_LINKS: usize = 174;

/// Splits payloads into raw leaves under a balanced tree of dag nodes.
#[derive(Debug, Clone, Copy)]
pub struct DagBuilder {
    chunk_size: usize,
    max_links: usize,
}

impl Default for DagBuilder {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

/// Output of [`DagBuilder::build`].
#[derive(Debug, Clone)]
pub struct BuiltDag {
    /// Root of the graph.
    pub root: ContentId,
    /// Every block of the graph, leaves first, root last.
    pub blocks: Vec<Block>,
}

impl DagBuilder {
    /// Create a builder with explicit limits.
    pub fn new(chunk_size: usize, max_links: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::InvalidBuilder("chunk size must be non-zero"));
        }
        if max_links < 2 {
            return Err(Error::InvalidBuilder("nodes need room for at least two links"));
        }
        Ok(Self {
            chunk_size,
            max_links,
        })
    }

    /// Build the graph for `data`.
    ///
    /// Payloads that fit in one chunk (including the empty payload) become a
    /// single raw block.
    pub fn build(&self, data: &[u8]) -> Result<BuiltDag> {
        let mut blocks: Vec<Block> = if data.is_empty() {
            vec![Block::raw(Bytes::new())]
        } else {
            data.chunks(self.chunk_size)
                .map(|chunk| Block::raw(Bytes::copy_from_slice(chunk)))
                .collect()
        };

        let mut level: Vec<ContentId> = blocks.iter().map(|b| *b.cid()).collect();
        while level.len() > 1 {
            let mut parents = Vec::with_capacity(level.len().div_ceil(self.max_links));
            for group in level.chunks(self.max_links) {
                let block = Block::encode(&DagNode::branch(group.to_vec()))?;
                parents.push(*block.cid());
                blocks.push(block);
            }
            level = parents;
        }

        Ok(BuiltDag {
            root: level[0],
            blocks,
        })
    }
}

/// Concatenate the leaf payloads under `root`, in link order.
///
/// Every block must be present in `store`.
pub async fn read_all(store: &dyn Blockstore, root: &ContentId) -> Result<Bytes> {
    let mut out = BytesMut::new();
    let mut stack = vec![*root];

    while let Some(cid) = stack.pop() {
        let block = store.get(&cid).await?.ok_or(Error::NotFound(cid))?;
        let node = block.decode()?;
        if node.is_leaf() {
            out.extend_from_slice(&node.data);
        } else {
            stack.extend(node.links.iter().rev());
        }
    }

    Ok(out.freeze())
}
