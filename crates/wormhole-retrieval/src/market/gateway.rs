//! HTTP market client.
//!
//! Talks to a market gateway that runs the negotiation protocol on our
//! behalf:
//!
//! - `POST <api>/query` with `{miner, root}` answers with a [`Quote`].
//! - `POST <api>/retrieve` with `{miner, proposal}` answers with
//!   newline-delimited JSON events, one per received block, then `done`
//!   (carrying the selected sub-root when the proposal has a selector).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::debug;
use wormhole_dag::{Block, Blockstore, ContentId};

use super::attempt::DEFAULT_QUERY_TIMEOUT;
use super::{MarketClient, MarketError, Proposal, Quote, TransferStats};
use crate::candidate::MinerAddress;
use crate::error::{Error, Result};
use crate::progress::ProgressSink;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct QueryRequest<'a> {
    miner: &'a MinerAddress,
    root: &'a ContentId,
}

#[derive(Serialize)]
struct RetrieveRequest<'a> {
    miner: &'a MinerAddress,
    proposal: &'a Proposal,
}

/// One line of a transfer response.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum TransferEvent {
    Block { cid: ContentId, data: String },
    /// `root` names the selected sub-root for selector transfers.
    Done {
        #[serde(default)]
        root: Option<ContentId>,
    },
    Error { message: String },
}

/// Market client backed by an HTTP gateway. Received blocks go into `store`.
#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    api: Url,
    store: Arc<dyn Blockstore>,
    query_timeout: Duration,
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("api", &self.api.as_str())
            .finish_non_exhaustive()
    }
}

impl GatewayClient {
    /// Create a client for the gateway at `api`.
    pub fn new(api: &str, store: Arc<dyn Blockstore>) -> Result<Self> {
        let api = Url::parse(api)
            .map_err(|e| Error::InvalidConfig(format!("market api {api} is not a valid url: {e}")))?;
        if api.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "market api {api} cannot have a path appended"
            )));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api,
            store,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        })
    }

    /// Abandon price queries that take longer than `timeout`.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// The gateway base URL.
    pub fn api(&self) -> &Url {
        &self.api
    }

    fn endpoint(&self, name: &str) -> Url {
        let mut url = self.api.clone();
        let path = format!("{}/{}", url.path().trim_end_matches('/'), name);
        url.set_path(&path);
        url
    }

    /// Verify and store one received block. Returns its leaf payload size.
    async fn accept_block(&self, cid: ContentId, data: &str) -> std::result::Result<u64, MarketError> {
        let data = hex::decode(data)
            .map_err(|e| MarketError::Transfer(format!("block {cid} is not valid hex: {e}")))?;
        let block = Block::verified(cid, data)?;
        let node = block.decode()?;
        self.store.put(block).await?;
        Ok(if node.is_leaf() { node.size() } else { 0 })
    }
}

#[async_trait]
impl MarketClient for GatewayClient {
    async fn query(&self, miner: &MinerAddress, root: &ContentId) -> std::result::Result<Quote, MarketError> {
        let url = self.endpoint("query");
        let response = self
            .http
            .post(url.clone())
            .timeout(self.query_timeout)
            .json(&QueryRequest { miner, root })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::Query(format!("{url} returned {status}")));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn retrieve(
        &self,
        miner: &MinerAddress,
        proposal: &Proposal,
        progress: &dyn ProgressSink,
    ) -> std::result::Result<TransferStats, MarketError> {
        let url = self.endpoint("retrieve");
        let start = Instant::now();

        let response = self
            .http
            .post(url.clone())
            .json(&RetrieveRequest { miner, proposal })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MarketError::Transfer(format!("{url} returned {status}")));
        }

        let mut body = response.bytes_stream();
        let mut buf = BytesMut::new();
        let mut transfer = Transfer::default();

        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);

            while let Some(end) = buf.iter().position(|b| *b == b'\n') {
                let raw = buf.split_to(end + 1);
                if let Some(root) = self.apply(&mut transfer, &raw, proposal, progress).await? {
                    debug!(%miner, bytes = transfer.received, "market transfer complete");
                    return Ok(transfer.finish(root, start));
                }
            }
        }

        // Final event without a trailing newline.
        if let Some(root) = self.apply(&mut transfer, &buf, proposal, progress).await? {
            debug!(%miner, bytes = transfer.received, "market transfer complete");
            return Ok(transfer.finish(root, start));
        }

        Err(MarketError::Transfer(
            "response ended before the transfer completed".to_string(),
        ))
    }
}

/// Running state of one transfer response.
#[derive(Default)]
struct Transfer {
    seen: HashSet<ContentId>,
    received: u64,
}

impl Transfer {
    fn finish(self, root: ContentId, start: Instant) -> TransferStats {
        TransferStats {
            size: self.received,
            duration: start.elapsed(),
            root,
        }
    }
}

impl GatewayClient {
    /// Apply one response line. Returns the transferred root once the
    /// gateway reports completion.
    async fn apply(
        &self,
        transfer: &mut Transfer,
        raw: &[u8],
        proposal: &Proposal,
        progress: &dyn ProgressSink,
    ) -> std::result::Result<Option<ContentId>, MarketError> {
        let line = raw.trim_ascii();
        if line.is_empty() {
            return Ok(None);
        }

        match serde_json::from_slice::<TransferEvent>(line)? {
            TransferEvent::Block { cid, data } => {
                if !transfer.seen.insert(cid) {
                    return Ok(None);
                }
                transfer.received += self.accept_block(cid, &data).await?;
                progress.bytes_received(transfer.received);
                Ok(None)
            }
            TransferEvent::Done { root } => match (root, &proposal.selector) {
                (Some(root), _) => Ok(Some(root)),
                (None, None) => Ok(Some(proposal.payload_cid)),
                (None, Some(selector)) => Err(MarketError::Transfer(format!(
                    "gateway did not report the root selected by {selector}"
                ))),
            },
            TransferEvent::Error { message } => Err(MarketError::Transfer(message)),
        }
    }
}
