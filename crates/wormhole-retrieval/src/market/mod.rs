//! Paid retrieval market.
//!
//! Providers ("miners") answer price queries with a [`Quote`]; a quote plus
//! the wanted root becomes a [`Proposal`], which a [`MarketClient`] turns
//! into a paid transfer. The negotiation protocol itself lives behind
//! [`MarketClient`]; this module only models what the retrieval core needs.

mod attempt;
mod gateway;
mod rank;

pub use attempt::{CandidateQuery, MarketAttempt, DEFAULT_QUERY_TIMEOUT};
pub use gateway::GatewayClient;
pub use rank::{compare_quotes, rank};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use wormhole_dag::ContentId;

use crate::candidate::MinerAddress;
use crate::progress::ProgressSink;
use crate::stats::RetrievalStats;

/// Atto-units per whole FIL.
const ATTO_PER_FIL: u64 = 1_000_000_000_000_000_000;

/// A token amount in atto-units. Arithmetic is exact.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(BigUint);

impl TokenAmount {
    /// Amount of `atto` atto-units.
    pub fn from_atto(atto: impl Into<BigUint>) -> Self {
        Self(atto.into())
    }

    /// Zero.
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    /// Whether the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The amount in atto-units.
    pub fn atto(&self) -> &BigUint {
        &self.0
    }
}

impl std::ops::Add for &TokenAmount {
    type Output = TokenAmount;

    fn add(self, rhs: Self) -> TokenAmount {
        TokenAmount(&self.0 + &rhs.0)
    }
}

impl std::ops::Mul<u64> for &TokenAmount {
    type Output = TokenAmount;

    fn mul(self, rhs: u64) -> TokenAmount {
        TokenAmount(&self.0 * BigUint::from(rhs))
    }
}

impl fmt::Display for TokenAmount {
    /// Whole-FIL decimal, e.g. `0.0000012 FIL`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = BigUint::from(ATTO_PER_FIL);
        let whole = &self.0 / &unit;
        let frac = &self.0 % &unit;
        if frac.is_zero() {
            return write!(f, "{} FIL", whole);
        }
        let frac = format!("{:018}", frac);
        write!(f, "{}.{} FIL", whole, frac.trim_end_matches('0'))
    }
}

impl FromStr for TokenAmount {
    type Err = num_bigint::ParseBigIntError;

    /// Parse a decimal atto-unit amount.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether the provider can serve the queried content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Available,
    Unavailable,
    Error,
}

/// A provider's price and terms for a content ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub status: QueryStatus,
    /// Advertised payload size in bytes.
    pub size: u64,
    pub min_price_per_byte: TokenAmount,
    /// Charged once if the provider must unseal its copy first.
    pub unseal_price: TokenAmount,
    pub payment_interval: u64,
    pub payment_interval_increase: u64,
    #[serde(default)]
    pub message: String,
}

impl Quote {
    /// `min_price_per_byte * size + unseal_price`.
    pub fn total_cost(&self) -> TokenAmount {
        &(&self.min_price_per_byte * self.size) + &self.unseal_price
    }

    /// Whether serving requires the slow unsealing step.
    pub fn requires_unseal(&self) -> bool {
        !self.unseal_price.is_zero()
    }
}

/// Restricts a retrieval to the sub-graph at a path below the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Selector(Vec<String>);

impl Selector {
    /// Parse a `/`-separated path such as `photos/2021/beach.jpg`.
    ///
    /// Leading and trailing slashes are ignored; empty segments are not.
    pub fn parse(text: &str) -> crate::Result<Self> {
        let invalid = |reason| crate::Error::InvalidSelector {
            input: text.to_string(),
            reason,
        };

        let trimmed = text.trim_matches('/');
        if trimmed.is_empty() {
            return Err(invalid("path is empty"));
        }

        let segments: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(invalid("path has an empty segment"));
        }
        if segments.iter().any(|s| s == "." || s == "..") {
            return Err(invalid("relative segments are not allowed"));
        }

        Ok(Self(segments))
    }

    /// Path segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

impl TryFrom<String> for Selector {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<Selector> for String {
    fn from(selector: Selector) -> Self {
        selector.to_string()
    }
}

/// A retrieval request built from a quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub payload_cid: ContentId,
    pub selector: Option<Selector>,
    pub price_per_byte: TokenAmount,
    pub unseal_price: TokenAmount,
    pub payment_interval: u64,
    pub payment_interval_increase: u64,
}

impl Proposal {
    /// Derive a proposal for `root` from `quote`.
    pub fn for_quote(
        quote: &Quote,
        root: ContentId,
        selector: Option<&Selector>,
    ) -> Result<Self, MarketError> {
        if quote.status != QueryStatus::Available {
            return Err(MarketError::Unavailable(if quote.message.is_empty() {
                format!("{:?}", quote.status).to_lowercase()
            } else {
                quote.message.clone()
            }));
        }

        Ok(Self {
            payload_cid: root,
            selector: selector.cloned(),
            price_per_byte: quote.min_price_per_byte.clone(),
            unseal_price: quote.unseal_price.clone(),
            payment_interval: quote.payment_interval,
            payment_interval_increase: quote.payment_interval_increase,
        })
    }
}

/// What a market client reports after a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    pub size: u64,
    pub duration: Duration,
    /// Root of the transferred graph; the selected sub-root when the
    /// proposal carried a selector.
    pub root: ContentId,
}

impl From<TransferStats> for RetrievalStats {
    fn from(stats: TransferStats) -> Self {
        RetrievalStats::new(stats.size, stats.duration).with_root(stats.root)
    }
}

/// Per-candidate market failures. Absorbed by the attempt loop.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Price query rejected or failed.
    #[error("query failed: {0}")]
    Query(String),

    /// Provider cannot serve the content.
    #[error("content unavailable: {0}")]
    Unavailable(String),

    /// Transfer started but did not complete.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Received block was invalid or could not be stored.
    #[error(transparent)]
    Dag(#[from] wormhole_dag::Error),
}

/// Client for a paid retrieval market.
#[async_trait]
pub trait MarketClient: Send + Sync {
    /// Ask `miner` for its terms on `root`.
    async fn query(&self, miner: &MinerAddress, root: &ContentId) -> Result<Quote, MarketError>;

    /// Run a paid transfer, reporting bytes received so far to `progress`.
    async fn retrieve(
        &self,
        miner: &MinerAddress,
        proposal: &Proposal,
        progress: &dyn ProgressSink,
    ) -> Result<TransferStats, MarketError>;
}
