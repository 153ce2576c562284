//! Shared test doubles.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use wormhole_dag::{Block, Blockstore, ContentId, DagNode, MemoryStore};

use crate::candidate::MinerAddress;
use crate::market::{MarketClient, MarketError, Proposal, QueryStatus, Quote, TokenAmount, TransferStats};
use crate::node::{ContentNode, LocalNode, PeerId, ProviderRecord};
use crate::progress::ProgressSink;

/// An available quote.
pub fn quote(price_per_byte: u64, size: u64, unseal: u64) -> Quote {
    Quote {
        status: QueryStatus::Available,
        size,
        min_price_per_byte: TokenAmount::from_atto(price_per_byte),
        unseal_price: TokenAmount::from_atto(unseal),
        payment_interval: 1 << 20,
        payment_interval_increase: 1 << 20,
        message: String::new(),
    }
}

/// A market whose answers are fixed up front.
///
/// Miners without an `answer` fail their query; miners without a `deliver`
/// fail their transfer.
#[derive(Default)]
pub struct ScriptedMarket {
    answers: HashMap<String, Quote>,
    deliveries: HashMap<String, u64>,
    stall_queries: bool,
    silent: HashSet<String>,
    stall_transfers: bool,
    queries: AtomicUsize,
    transfers: Mutex<Vec<(String, Proposal)>>,
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, miner: &str, quote: Quote) -> Self {
        self.answers.insert(miner.to_string(), quote);
        self
    }

    pub fn deliver(mut self, miner: &str, size: u64) -> Self {
        self.deliveries.insert(miner.to_string(), size);
        self
    }

    pub fn stall_queries(mut self) -> Self {
        self.stall_queries = true;
        self
    }

    /// This miner's query never answers.
    pub fn silent(mut self, miner: &str) -> Self {
        self.silent.insert(miner.to_string());
        self
    }

    pub fn stall_transfers(mut self) -> Self {
        self.stall_transfers = true;
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Acquire)
    }

    /// Miners a transfer was attempted with, in order.
    pub fn transfers(&self) -> Vec<String> {
        self.transfers.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn proposals(&self) -> Vec<Proposal> {
        self.transfers.lock().iter().map(|(_, p)| p.clone()).collect()
    }
}

#[async_trait]
impl MarketClient for ScriptedMarket {
    async fn query(&self, miner: &MinerAddress, _root: &ContentId) -> Result<Quote, MarketError> {
        self.queries.fetch_add(1, Ordering::AcqRel);
        if self.stall_queries || self.silent.contains(miner.as_str()) {
            futures::future::pending::<()>().await;
        }
        self.answers
            .get(miner.as_str())
            .cloned()
            .ok_or_else(|| MarketError::Query(format!("{miner} did not answer")))
    }

    async fn retrieve(
        &self,
        miner: &MinerAddress,
        proposal: &Proposal,
        progress: &dyn ProgressSink,
    ) -> Result<TransferStats, MarketError> {
        self.transfers
            .lock()
            .push((miner.to_string(), proposal.clone()));
        if self.stall_transfers {
            futures::future::pending::<()>().await;
        }
        let size = *self
            .deliveries
            .get(miner.as_str())
            .ok_or_else(|| MarketError::Transfer(format!("{miner} hung up")))?;
        progress.bytes_received(size);
        Ok(TransferStats {
            size,
            duration: Duration::from_millis(1),
            root: proposal.payload_cid,
        })
    }
}

/// Records the reports it receives.
#[derive(Debug, Default)]
pub struct CountingProgress {
    queried: AtomicUsize,
    bytes: AtomicU64,
}

impl CountingProgress {
    pub fn max_queried(&self) -> usize {
        self.queried.load(Ordering::Acquire)
    }

    /// Highest byte total reported.
    pub fn last_bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }
}

impl ProgressSink for CountingProgress {
    fn bytes_received(&self, total: u64) {
        self.bytes.fetch_max(total, Ordering::AcqRel);
    }

    fn candidates_queried(&self, checked: usize, _total: usize) {
        self.queried.fetch_max(checked, Ordering::AcqRel);
    }
}

/// A node announcing one reachable provider for everything it stores.
pub fn local_node() -> LocalNode {
    LocalNode::new(
        PeerId::from_public_key(b"fixture"),
        vec!["127.0.0.1:4001".parse().unwrap()],
        Arc::new(MemoryStore::new()),
    )
}

/// Store a diamond: `root -> {left, right}`, both linking one shared leaf
/// and a leaf of their own. Returns the root and the distinct leaf bytes.
pub async fn diamond(store: &dyn Blockstore) -> (ContentId, u64) {
    let shared = Block::raw(Bytes::from_static(b"shared child payload"));
    let only_left = Block::raw(Bytes::from_static(b"left"));
    let only_right = Block::raw(Bytes::from_static(b"right side"));

    let left = Block::encode(&DagNode::branch(vec![*shared.cid(), *only_left.cid()])).unwrap();
    let right = Block::encode(&DagNode::branch(vec![*only_right.cid(), *shared.cid()])).unwrap();
    let root = Block::encode(&DagNode::branch(vec![*left.cid(), *right.cid()])).unwrap();

    let bytes = (shared.data().len() + only_left.data().len() + only_right.data().len()) as u64;
    let root_cid = *root.cid();
    for block in [shared, only_left, only_right, left, right, root] {
        store.put(block).await.unwrap();
    }
    (root_cid, bytes)
}

/// A node with scripted discovery and fetch behaviour.
pub struct ScriptedNode {
    pub inner: LocalNode,
    /// Records streamed before the directory goes quiet.
    pub records: Vec<ProviderRecord>,
    /// Never finish the provider stream.
    pub endless_discovery: bool,
    /// Fetches of these IDs never complete.
    pub stall_fetch: HashSet<ContentId>,
    /// Fetches of these IDs fail.
    pub fail_fetch: HashSet<ContentId>,
    pub fetches: AtomicUsize,
}

impl ScriptedNode {
    pub fn new(inner: LocalNode) -> Self {
        Self {
            inner,
            records: Vec::new(),
            endless_discovery: false,
            stall_fetch: HashSet::new(),
            fail_fetch: HashSet::new(),
            fetches: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ContentNode for ScriptedNode {
    fn find_providers(&self, _cid: &ContentId) -> BoxStream<'static, ProviderRecord> {
        let records = stream::iter(self.records.clone());
        if self.endless_discovery {
            records.chain(stream::pending()).boxed()
        } else {
            records.boxed()
        }
    }

    async fn fetch(&self, cid: &ContentId) -> wormhole_dag::Result<Block> {
        self.fetches.fetch_add(1, Ordering::AcqRel);
        if self.stall_fetch.contains(cid) {
            futures::future::pending::<()>().await;
        }
        if self.fail_fetch.contains(cid) {
            return Err(wormhole_dag::Error::NotFound(*cid));
        }
        self.inner.fetch(cid).await
    }
}
