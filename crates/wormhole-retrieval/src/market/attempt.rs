//! Market retrieval attempt: query every candidate, rank, then try them one
//! at a time until a paid transfer succeeds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use wormhole_dag::ContentId;

use super::{rank, MarketClient, Proposal, Quote, Selector};
use crate::candidate::Candidate;
use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use crate::stats::RetrievalStats;

/// How long a candidate may take to answer a price query.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// A candidate together with the quote it answered with.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    pub candidate: Candidate,
    pub quote: Quote,
}

/// Retrieval over the paid market.
#[derive(Clone)]
pub struct MarketAttempt {
    client: Arc<dyn MarketClient>,
    cid: ContentId,
    candidates: Vec<Candidate>,
    selector: Option<Selector>,
    no_sort: bool,
    query_timeout: Duration,
}

impl std::fmt::Debug for MarketAttempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketAttempt")
            .field("cid", &self.cid)
            .field("candidates", &self.candidates.len())
            .field("selector", &self.selector)
            .field("no_sort", &self.no_sort)
            .field("query_timeout", &self.query_timeout)
            .finish()
    }
}

impl MarketAttempt {
    /// Retrieve `cid` from `candidates` through `client`.
    pub fn new(client: Arc<dyn MarketClient>, cid: ContentId, candidates: Vec<Candidate>) -> Self {
        Self {
            client,
            cid,
            candidates,
            selector: None,
            no_sort: false,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Only fetch the sub-graph named by `selector`.
    pub fn with_selector(mut self, selector: Option<Selector>) -> Self {
        self.selector = selector;
        self
    }

    /// Try candidates in the order they answered instead of ranking them.
    pub fn with_no_sort(mut self, no_sort: bool) -> Self {
        self.no_sort = no_sort;
        self
    }

    /// Drop candidates that have not answered a price query within
    /// `timeout`.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Target content.
    pub fn cid(&self) -> &ContentId {
        &self.cid
    }

    /// Candidates to query.
    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    /// Run the attempt.
    pub async fn retrieve(
        &self,
        cancel: &CancellationToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RetrievalStats> {
        if self.candidates.is_empty() {
            info!("No miners were provided, will not attempt FIL retrieval");
            return Err(Error::NoCandidates);
        }

        info!("Querying FIL retrieval candidates...");
        let mut queries = self.query_all(cancel, &progress).await?;
        info!(
            "Got back {} retrieval query results of a total of {} candidates",
            queries.len(),
            self.candidates.len()
        );

        if queries.is_empty() {
            return Err(Error::AllQueriesFailed);
        }

        if !self.no_sort {
            rank(&mut queries);
        }

        let stats = self.transfer_first(cancel, &queries, progress.as_ref()).await?;
        info!("FIL retrieval succeeded");
        Ok(stats)
    }

    /// Query every candidate concurrently. Failed queries are logged and
    /// dropped; results keep candidate order.
    async fn query_all(
        &self,
        cancel: &CancellationToken,
        progress: &Arc<dyn ProgressSink>,
    ) -> Result<Vec<CandidateQuery>> {
        let total = self.candidates.len();
        let timeout = self.query_timeout;
        let checked = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        for (index, candidate) in self.candidates.iter().cloned().enumerate() {
            let client = Arc::clone(&self.client);
            let checked = Arc::clone(&checked);
            let progress = Arc::clone(progress);

            tasks.spawn(async move {
                let result = tokio::time::timeout(
                    timeout,
                    client.query(&candidate.miner_address, &candidate.root_cid),
                )
                .await;
                match result {
                    Ok(Ok(quote)) => {
                        let n = checked.fetch_add(1, Ordering::AcqRel) + 1;
                        progress.candidates_queried(n, total);
                        Some((index, CandidateQuery { candidate, quote }))
                    }
                    Ok(Err(e)) => {
                        debug!(
                            "Retrieval query for miner {} failed: {}",
                            candidate.miner_address, e
                        );
                        None
                    }
                    Err(_) => {
                        debug!(
                            "Retrieval query for miner {} timed out after {:?}",
                            candidate.miner_address, timeout
                        );
                        None
                    }
                }
            });
        }

        let mut answered = Vec::with_capacity(total);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(Some(query))) => answered.push(query),
                    Some(Ok(None)) => {}
                    Some(Err(e)) => debug!("Retrieval query task failed: {}", e),
                    None => break,
                },
            }
        }

        answered.sort_by_key(|(index, _)| *index);
        Ok(answered.into_iter().map(|(_, query)| query).collect())
    }

    /// Try ranked candidates in order until one transfer succeeds.
    async fn transfer_first(
        &self,
        cancel: &CancellationToken,
        queries: &[CandidateQuery],
        progress: &dyn ProgressSink,
    ) -> Result<RetrievalStats> {
        for query in queries {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let miner = &query.candidate.miner_address;
            info!(
                "Attempting FIL retrieval with miner {} from root CID {} ({})",
                miner,
                query.candidate.root_cid,
                query.quote.total_cost()
            );
            if let Some(selector) = &self.selector {
                info!("Using selector {}", selector);
            }

            let proposal = match Proposal::for_quote(
                &query.quote,
                query.candidate.root_cid,
                self.selector.as_ref(),
            ) {
                Ok(proposal) => proposal,
                Err(e) => {
                    debug!(
                        "Failed to create retrieval proposal with candidate miner {}: {}",
                        miner, e
                    );
                    continue;
                }
            };

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                result = self.client.retrieve(miner, &proposal, progress) => result,
            };

            match result {
                Ok(stats) => return Ok(stats.into()),
                Err(e) => {
                    error!(
                        "Failed to retrieve content with candidate miner {}: {}",
                        miner, e
                    );
                }
            }
        }

        Err(Error::AllCandidatesFailed)
    }
}
