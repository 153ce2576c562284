//! Blockstores.
//!
//! - [`MemoryStore`]: in-process map, used by tests and ephemeral nodes
//! - [`FlatfsStore`]: one file per block under a directory, sharded by the
//!   last two hex digits of the hash

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cid::ContentId;
use crate::error::Result;
use crate::node::Block;

/// Storage for blocks keyed by content ID.
#[async_trait]
pub trait Blockstore: Send + Sync {
    /// Get a block, if present.
    async fn get(&self, cid: &ContentId) -> Result<Option<Block>>;

    /// Store a block. Storing an existing block is a no-op.
    async fn put(&self, block: Block) -> Result<()>;

    /// Check presence without reading the block.
    async fn has(&self, cid: &ContentId) -> Result<bool>;
}

/// Blocks held in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<ContentId, Block>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks held.
    pub async fn len(&self) -> usize {
        self.blocks.read().await.len()
    }

    /// Check if empty.
    pub async fn is_empty(&self) -> bool {
        self.blocks.read().await.is_empty()
    }
}

#[async_trait]
impl Blockstore for MemoryStore {
    async fn get(&self, cid: &ContentId) -> Result<Option<Block>> {
        Ok(self.blocks.read().await.get(cid).cloned())
    }

    async fn put(&self, block: Block) -> Result<()> {
        self.blocks.write().await.entry(*block.cid()).or_insert(block);
        Ok(())
    }

    async fn has(&self, cid: &ContentId) -> Result<bool> {
        Ok(self.blocks.read().await.contains_key(cid))
    }
}

/// Blocks stored as files.
///
/// Layout: `<root>/<last two hex digits>/<codec>-<hex>`. Writes go to a
/// temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FlatfsStore {
    root: PathBuf,
}

impl FlatfsStore {
    /// Open or create a store rooted at `root`.
    pub async fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, cid: &ContentId) -> PathBuf {
        let hex = cid.to_hex();
        let shard = &hex[hex.len() - 2..];
        self.root
            .join(shard)
            .join(format!("{}-{}", cid.codec(), hex))
    }
}

#[async_trait]
impl Blockstore for FlatfsStore {
    async fn get(&self, cid: &ContentId) -> Result<Option<Block>> {
        match tokio::fs::read(self.path_for(cid)).await {
            Ok(data) => Ok(Some(Block::verified(*cid, data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, block: Block) -> Result<()> {
        let path = self.path_for(block.cid());
        if tokio::fs::try_exists(&path).await? {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, block.data()).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::trace!(cid = %block.cid(), "stored block");
        Ok(())
    }

    async fn has(&self, cid: &ContentId) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.path_for(cid)).await?)
    }
}
