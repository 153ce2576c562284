//! Retrieval configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::market::DEFAULT_QUERY_TIMEOUT;
use crate::node::PeerId;
use crate::swarm::DEFAULT_WALK_CONCURRENCY;

/// Default market gateway.
pub const DEFAULT_MARKET_API: &str = "https://api.chain.love";

/// Default address announced for locally added content.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:6746";

/// Configuration for a retrieval client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalConfig {
    /// Data directory; blocks live under `blocks/`.
    pub data_dir: PathBuf,

    /// Market gateway base URL
    pub market_api: String,

    /// Candidate discovery service, if any.
    pub discovery_endpoint: Option<String>,

    /// Give up on swarm discovery after this long.
    pub discovery_timeout: Option<Duration>,

    /// Drop market candidates that have not answered a price query in time.
    pub query_timeout: Duration,

    /// Concurrent block fetches during a swarm walk.
    pub walk_concurrency: usize,

    /// Address announced when providing content.
    pub listen_addr: SocketAddr,
}

impl RetrievalConfig {
    /// Create config from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = var("WORMHOLE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| match var("HOME") {
                Some(home) => PathBuf::from(home).join(".wormhole"),
                None => PathBuf::from(".wormhole"),
            });

        let market_api = var("WORMHOLE_MARKET_API").unwrap_or_else(|| DEFAULT_MARKET_API.to_string());

        let discovery_endpoint = var("WORMHOLE_DISCOVERY_ENDPOINT");

        let discovery_timeout = var("WORMHOLE_DISCOVERY_TIMEOUT_SECS")
            .map(|v| parse::<u64>("WORMHOLE_DISCOVERY_TIMEOUT_SECS", &v))
            .transpose()?
            .map(Duration::from_secs);

        let query_timeout = match var("WORMHOLE_QUERY_TIMEOUT_SECS") {
            Some(v) => match parse::<u64>("WORMHOLE_QUERY_TIMEOUT_SECS", &v)? {
                0 => {
                    return Err(Error::InvalidConfig(
                        "WORMHOLE_QUERY_TIMEOUT_SECS must be at least 1".to_string(),
                    ))
                }
                secs => Duration::from_secs(secs),
            },
            None => DEFAULT_QUERY_TIMEOUT,
        };

        let walk_concurrency = match var("WORMHOLE_WALK_CONCURRENCY") {
            Some(v) => match parse::<usize>("WORMHOLE_WALK_CONCURRENCY", &v)? {
                0 => {
                    return Err(Error::InvalidConfig(
                        "WORMHOLE_WALK_CONCURRENCY must be at least 1".to_string(),
                    ))
                }
                n => n,
            },
            None => DEFAULT_WALK_CONCURRENCY,
        };

        let listen_addr = parse(
            "WORMHOLE_LISTEN_ADDR",
            &var("WORMHOLE_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
        )?;

        Ok(Self {
            data_dir,
            market_api,
            discovery_endpoint,
            discovery_timeout,
            query_timeout,
            walk_concurrency,
            listen_addr,
        })
    }

    /// Directory holding the flat-file blockstore.
    pub fn blocks_dir(&self) -> PathBuf {
        self.data_dir.join("blocks")
    }

    /// Stable identity for the local node, derived from its data directory.
    pub fn peer_id(&self) -> PeerId {
        PeerId::from_public_key(self.data_dir.to_string_lossy().as_bytes())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("invalid {key} {value:?}: {e}")))
}
