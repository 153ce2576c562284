//! The transports the orchestrator can try, and how a network choice turns
//! into an ordered list of them.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;
use wormhole_dag::ContentId;

use crate::candidate::Candidate;
use crate::error::{Error, Result};
use crate::market::{MarketAttempt, MarketClient, Selector, DEFAULT_QUERY_TIMEOUT};
use crate::node::ContentNode;
use crate::progress::ProgressSink;
use crate::stats::RetrievalStats;
use crate::swarm::SwarmAttempt;

/// One way of retrieving content.
#[derive(Debug, Clone)]
pub enum RetrievalAttempt {
    /// Free peer-to-peer swarm.
    Swarm(SwarmAttempt),
    /// Paid retrieval market.
    Market(MarketAttempt),
}

impl RetrievalAttempt {
    /// Short network name used in logs and aggregate errors.
    pub fn network(&self) -> &'static str {
        match self {
            RetrievalAttempt::Swarm(_) => "ipfs",
            RetrievalAttempt::Market(_) => "fil",
        }
    }

    /// Run the attempt against `node`.
    pub async fn retrieve(
        &self,
        cancel: &CancellationToken,
        node: Arc<dyn ContentNode>,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RetrievalStats> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self {
            RetrievalAttempt::Swarm(attempt) => attempt.retrieve(cancel, node, progress).await,
            RetrievalAttempt::Market(attempt) => attempt.retrieve(cancel, progress).await,
        }
    }
}

impl From<SwarmAttempt> for RetrievalAttempt {
    fn from(attempt: SwarmAttempt) -> Self {
        RetrievalAttempt::Swarm(attempt)
    }
}

impl From<MarketAttempt> for RetrievalAttempt {
    fn from(attempt: MarketAttempt) -> Self {
        RetrievalAttempt::Market(attempt)
    }
}

/// Which networks to retrieve from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Network {
    /// Paid market only.
    Fil,
    /// Swarm only.
    Ipfs,
    /// Swarm first, then the market.
    #[default]
    Auto,
}

impl Network {
    /// Whether the swarm transport is tried.
    pub fn uses_swarm(&self) -> bool {
        matches!(self, Network::Ipfs | Network::Auto)
    }

    /// Whether the market transport is tried.
    pub fn uses_market(&self) -> bool {
        matches!(self, Network::Fil | Network::Auto)
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "fil" => Ok(Network::Fil),
            "ipfs" => Ok(Network::Ipfs),
            "auto" => Ok(Network::Auto),
            other => Err(Error::UnknownNetwork(other.to_string())),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Fil => "fil",
            Network::Ipfs => "ipfs",
            Network::Auto => "auto",
        })
    }
}

/// Everything needed to build the attempt list for one retrieval.
pub struct AttemptPlan {
    pub cid: ContentId,
    pub network: Network,
    pub selector: Option<Selector>,
    pub no_sort: bool,
    pub query_timeout: Duration,
    pub candidates: Vec<Candidate>,
    pub swarm: SwarmAttempt,
    pub market: Arc<dyn MarketClient>,
}

impl AttemptPlan {
    /// Start a plan for `cid` over `network`. The swarm attempt uses default
    /// settings until replaced with [`with_swarm`](Self::with_swarm).
    pub fn new(cid: ContentId, network: Network, market: Arc<dyn MarketClient>) -> Self {
        Self {
            cid,
            network,
            selector: None,
            no_sort: false,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            candidates: Vec::new(),
            swarm: SwarmAttempt::new(cid),
            market,
        }
    }

    pub fn with_selector(mut self, selector: Option<Selector>) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_no_sort(mut self, no_sort: bool) -> Self {
        self.no_sort = no_sort;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn with_candidates(mut self, candidates: Vec<Candidate>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn with_swarm(mut self, swarm: SwarmAttempt) -> Self {
        self.swarm = swarm;
        self
    }

    /// Attempts in the order they should be tried: swarm, then market.
    pub fn build(self) -> Result<Vec<RetrievalAttempt>> {
        let mut attempts = Vec::with_capacity(2);

        if self.network.uses_swarm() {
            match (&self.selector, self.network) {
                (Some(_), Network::Ipfs) => return Err(Error::SelectorUnsupported),
                (Some(_), _) => info!("Skipping IPFS retrieval because a selector was specified"),
                (None, _) => attempts.push(self.swarm.into()),
            }
        }

        if self.network.uses_market() {
            attempts.push(
                MarketAttempt::new(self.market, self.cid, self.candidates)
                    .with_selector(self.selector)
                    .with_no_sort(self.no_sort)
                    .with_query_timeout(self.query_timeout)
                    .into(),
            );
        }

        Ok(attempts)
    }
}
