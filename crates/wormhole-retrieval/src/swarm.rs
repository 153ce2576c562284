//! Swarm retrieval attempt: find a provider, then walk the graph.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use wormhole_dag::ContentId;

use crate::error::{Error, Result};
use crate::node::{ContentNode, ProviderRecord};
use crate::progress::ProgressSink;
use crate::stats::RetrievalStats;

/// Default number of blocks fetched concurrently during the walk.
pub const DEFAULT_WALK_CONCURRENCY: usize = 32;

/// Retrieval over the peer-to-peer swarm.
#[derive(Debug, Clone)]
pub struct SwarmAttempt {
    cid: ContentId,
    discovery_timeout: Option<Duration>,
    concurrency: usize,
}

impl SwarmAttempt {
    /// Retrieve `cid` with no discovery timeout.
    pub fn new(cid: ContentId) -> Self {
        Self {
            cid,
            discovery_timeout: None,
            concurrency: DEFAULT_WALK_CONCURRENCY,
        }
    }

    /// Give up if no usable provider shows up within `timeout`.
    pub fn with_discovery_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Bound the number of in-flight block fetches. Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Target content.
    pub fn cid(&self) -> &ContentId {
        &self.cid
    }

    /// Run the attempt.
    pub async fn retrieve(
        &self,
        cancel: &CancellationToken,
        node: Arc<dyn ContentNode>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RetrievalStats> {
        info!("Searching IPFS for CID...");
        let provider = self.discover(cancel, node.as_ref()).await?;
        debug!(provider = %provider.id, addresses = provider.addresses.len(), "provider ready");

        info!("Starting retrieval");
        let start = Instant::now();
        let bytes = self.walk(cancel, node, progress).await?;

        info!("IPFS retrieval succeeded");
        Ok(RetrievalStats::new(bytes, start.elapsed()).with_root(self.cid))
    }

    /// Wait for the first provider that lists an address.
    async fn discover(
        &self,
        cancel: &CancellationToken,
        node: &dyn ContentNode,
    ) -> Result<ProviderRecord> {
        let mut providers = node.find_providers(&self.cid);
        let (ready_tx, ready_rx) = oneshot::channel();

        let discovery = tokio::spawn(async move {
            while let Some(record) = providers.next().await {
                if !record.is_reachable() {
                    debug!("Skipping IPFS provider with no addresses {}", record.id);
                    continue;
                }
                info!("Connected to IPFS provider {}", record.id);
                let _ = ready_tx.send(Some(record));
                return;
            }
            let _ = ready_tx.send(None);
        });

        let timeout = async {
            match self.discovery_timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => futures::future::pending().await,
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            ready = ready_rx => match ready {
                Ok(Some(record)) => Ok(record),
                // Sender dropped without answering only if the task died.
                Ok(None) | Err(_) => Err(Error::NotFound(self.cid)),
            },
            _ = timeout => Err(Error::DiscoveryTimeout {
                cid: self.cid,
                timeout: self.discovery_timeout.unwrap_or_default(),
            }),
        };

        discovery.abort();
        outcome
    }

    /// Visit every block under the root once, summing leaf payload bytes.
    async fn walk(
        &self,
        cancel: &CancellationToken,
        node: Arc<dyn ContentNode>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<u64> {
        let bytes = Arc::new(AtomicU64::new(0));
        let mut visited = HashSet::from([self.cid]);
        let mut queue = VecDeque::from([self.cid]);
        let mut tasks = JoinSet::new();

        loop {
            while tasks.len() < self.concurrency {
                let Some(cid) = queue.pop_front() else {
                    break;
                };
                let node = Arc::clone(&node);
                let bytes = Arc::clone(&bytes);
                let progress = Arc::clone(&progress);

                tasks.spawn(async move {
                    let fetched = match node.fetch(&cid).await {
                        Ok(block) => block.decode(),
                        Err(e) => Err(e),
                    };
                    let dag = fetched.map_err(|source| Error::Fetch { cid, source })?;

                    if dag.is_leaf() {
                        let size = dag.size();
                        let total = bytes.fetch_add(size, Ordering::AcqRel) + size;
                        progress.bytes_received(total);
                    }

                    if cid.is_raw() {
                        return Ok(Vec::new());
                    }
                    Ok::<_, Error>(dag.links)
                });
            }

            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };

            let links = match joined {
                None => break,
                Some(Ok(Ok(links))) => links,
                Some(Ok(Err(e))) => {
                    tasks.abort_all();
                    return Err(e);
                }
                Some(Err(e)) => {
                    tasks.abort_all();
                    return Err(e.into());
                }
            };

            for link in links {
                if visited.insert(link) {
                    queue.push_back(link);
                }
            }
        }

        Ok(bytes.load(Ordering::Acquire))
    }
}
