//! Content node capability.
//!
//! The swarm transport needs two things from the node it runs on: a peer
//! directory that can be asked who provides a content ID, and a way to fetch
//! blocks by ID. [`ContentNode`] is that narrow interface; [`LocalNode`]
//! implements it over a local blockstore.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use wormhole_dag::{read_all, Block, Blockstore, ContentId, DagBuilder};

/// Unique peer identifier (256-bit hash of public key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 32]);

impl PeerId {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash a public key to create a PeerId.
    pub fn from_public_key(pubkey: &[u8]) -> Self {
        let hash = blake3::hash(pubkey);
        Self(*hash.as_bytes())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}...", &self.to_hex()[..8])
    }
}

/// A provider advertised by the peer directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRecord {
    /// The provider.
    pub id: PeerId,
    /// Addresses it can be reached on. May be empty.
    pub addresses: Vec<SocketAddr>,
}

impl ProviderRecord {
    /// Create a record.
    pub fn new(id: PeerId, addresses: Vec<SocketAddr>) -> Self {
        Self { id, addresses }
    }

    /// Whether the record lists any address to connect to.
    pub fn is_reachable(&self) -> bool {
        !self.addresses.is_empty()
    }
}

/// A content-addressed storage and transport node.
#[async_trait]
pub trait ContentNode: Send + Sync {
    /// Stream providers of `cid` until the directory is exhausted.
    ///
    /// The stream may be unbounded; callers stop polling when they have
    /// what they need.
    fn find_providers(&self, cid: &ContentId) -> BoxStream<'static, ProviderRecord>;

    /// Fetch and verify the block named by `cid`.
    async fn fetch(&self, cid: &ContentId) -> wormhole_dag::Result<Block>;
}

/// A node backed by a local blockstore and an in-memory provider table.
///
/// The node also answers as a provider of anything already in its store, so
/// content added by an earlier process is found again after a restart.
pub struct LocalNode {
    id: PeerId,
    addresses: Vec<SocketAddr>,
    store: Arc<dyn Blockstore>,
    providers: RwLock<HashMap<ContentId, Vec<ProviderRecord>>>,
    builder: DagBuilder,
}

impl LocalNode {
    /// Create a node with identity `id`, listening on `addresses`.
    pub fn new(id: PeerId, addresses: Vec<SocketAddr>, store: Arc<dyn Blockstore>) -> Self {
        Self {
            id,
            addresses,
            store,
            providers: RwLock::new(HashMap::new()),
            builder: DagBuilder::default(),
        }
    }

    /// Use `builder` for [`add`](Self::add).
    pub fn with_builder(mut self, builder: DagBuilder) -> Self {
        self.builder = builder;
        self
    }

    /// This node's peer ID.
    pub fn id(&self) -> PeerId {
        self.id
    }

    /// The underlying blockstore.
    pub fn store(&self) -> Arc<dyn Blockstore> {
        Arc::clone(&self.store)
    }

    /// Record `provider` as serving `cid`. Re-announcing replaces the
    /// provider's earlier record.
    pub fn provide(&self, cid: ContentId, provider: ProviderRecord) {
        let mut providers = self.providers.write();
        let records = providers.entry(cid).or_default();
        match records.iter_mut().find(|r| r.id == provider.id) {
            Some(existing) => *existing = provider,
            None => records.push(provider),
        }
    }

    /// Chunk `data` into a DAG, store every block and announce this node as
    /// a provider of the root.
    pub async fn add(&self, data: &[u8]) -> crate::Result<ContentId> {
        let built = self.builder.build(data)?;
        for block in built.blocks {
            self.store.put(block).await?;
        }

        self.provide(
            built.root,
            ProviderRecord::new(self.id, self.addresses.clone()),
        );

        tracing::info!(cid = %built.root, bytes = data.len(), "added content");
        Ok(built.root)
    }

    /// Reassemble the payload under `root` from the local store.
    pub async fn read(&self, root: &ContentId) -> crate::Result<Bytes> {
        Ok(read_all(self.store.as_ref(), root).await?)
    }
}

#[async_trait]
impl ContentNode for LocalNode {
    fn find_providers(&self, cid: &ContentId) -> BoxStream<'static, ProviderRecord> {
        let announced = self.providers.read().get(cid).cloned().unwrap_or_default();
        let own = (!announced.iter().any(|r| r.id == self.id))
            .then(|| ProviderRecord::new(self.id, self.addresses.clone()));

        let store = Arc::clone(&self.store);
        let cid = *cid;
        let stored = stream::iter(own).filter_map(move |record| {
            let store = Arc::clone(&store);
            async move {
                match store.has(&cid).await {
                    Ok(true) => Some(record),
                    Ok(false) => None,
                    Err(e) => {
                        tracing::debug!(%cid, "blockstore lookup failed: {}", e);
                        None
                    }
                }
            }
        });

        stream::iter(announced).chain(stored).boxed()
    }

    async fn fetch(&self, cid: &ContentId) -> wormhole_dag::Result<Block> {
        let block = self
            .store
            .get(cid)
            .await?
            .ok_or(wormhole_dag::Error::NotFound(*cid))?;
        block.verify()?;
        Ok(block)
    }
}
