//! Error types for wormhole-retrieval.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use wormhole_dag::ContentId;

/// Result type for retrieval operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a retrieval error, used to decide whether it is absorbed
/// or surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Bad input or settings. Fails fast, never retried.
    Configuration,
    /// Providers or candidates could not be found.
    Discovery,
    /// Price queries failed.
    Query,
    /// Content transfer failed.
    Transfer,
    /// The caller cancelled.
    Cancellation,
    /// Every transport failed.
    Aggregate,
}

/// Errors that can occur during retrieval.
#[derive(Debug, Error)]
pub enum Error {
    /// Market retrieval was configured without any candidates.
    #[error("retrieval failed: no miners were provided")]
    NoCandidates,

    /// Unknown `--network` value.
    #[error("unknown network {0:?} (expected fil, ipfs or auto)")]
    UnknownNetwork(String),

    /// A miner address failed validation.
    #[error("failed to parse miner {input:?}: {reason}")]
    InvalidMinerAddress { input: String, reason: &'static str },

    /// Selector text failed validation.
    #[error("invalid selector {input:?}: {reason}")]
    InvalidSelector { input: String, reason: &'static str },

    /// A partial selection was requested from the swarm transport.
    #[error("selectors are not supported by swarm retrieval")]
    SelectorUnsupported,

    /// A configured URL or setting is malformed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Provider lookup finished without a usable provider.
    #[error("couldn't find content {0}")]
    NotFound(ContentId),

    /// Provider lookup did not produce a usable provider in time.
    #[error("no provider for {cid} found within {timeout:?}")]
    DiscoveryTimeout { cid: ContentId, timeout: Duration },

    /// Candidate discovery service failed.
    #[error("candidate discovery failed: {0}")]
    Discovery(String),

    /// Every price query failed.
    #[error("retrieval failed: queries failed for all miners")]
    AllQueriesFailed,

    /// Every ranked candidate failed to transfer.
    #[error("retrieval failed for all miners")]
    AllCandidatesFailed,

    /// A block could not be fetched while walking the graph.
    #[error("failed to fetch {cid}: {source}")]
    Fetch {
        cid: ContentId,
        #[source]
        source: wormhole_dag::Error,
    },

    /// A spawned retrieval task panicked or was aborted.
    #[error("retrieval task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The retrieval was cancelled.
    #[error("retrieval cancelled")]
    Cancelled,

    /// Every attempt failed.
    #[error("all retrieval attempts failed{0}")]
    AllAttemptsFailed(AttemptFailures),

    /// DAG or blockstore error.
    #[error(transparent)]
    Dag(#[from] wormhole_dag::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::NoCandidates
            | Error::UnknownNetwork(_)
            | Error::InvalidMinerAddress { .. }
            | Error::InvalidSelector { .. }
            | Error::SelectorUnsupported
            | Error::InvalidConfig(_) => ErrorClass::Configuration,
            Error::NotFound(_)
            | Error::DiscoveryTimeout { .. }
            | Error::Discovery(_)
            | Error::Http(_) => ErrorClass::Discovery,
            Error::AllQueriesFailed => ErrorClass::Query,
            Error::AllCandidatesFailed
            | Error::Fetch { .. }
            | Error::Task(_)
            | Error::Dag(_)
            | Error::Io(_) => ErrorClass::Transfer,
            Error::Cancelled => ErrorClass::Cancellation,
            Error::AllAttemptsFailed(_) => ErrorClass::Aggregate,
        }
    }

    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

/// One failed attempt inside [`Error::AllAttemptsFailed`].
#[derive(Debug)]
pub struct AttemptFailure {
    /// Network the attempt targeted.
    pub network: &'static str,
    /// Why it failed.
    pub error: Error,
}

/// Per-attempt failures, in attempt order.
#[derive(Debug, Default)]
pub struct AttemptFailures(pub Vec<AttemptFailure>);

impl AttemptFailures {
    /// Iterate over the failures.
    pub fn iter(&self) -> impl Iterator<Item = &AttemptFailure> {
        self.0.iter()
    }

    /// Number of failed attempts.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AttemptFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        f.write_str(" (")?;
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", failure.network, failure.error)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_message_lists_attempts() {
        let err = Error::AllAttemptsFailed(AttemptFailures(vec![
            AttemptFailure {
                network: "ipfs",
                error: Error::Cancelled,
            },
            AttemptFailure {
                network: "fil",
                error: Error::NoCandidates,
            },
        ]));

        let msg = err.to_string();
        assert!(msg.starts_with("all retrieval attempts failed"));
        assert!(msg.contains("ipfs: retrieval cancelled"));
        assert!(msg.contains("fil: retrieval failed: no miners were provided"));
    }

    #[test]
    fn empty_aggregate_is_bare_message() {
        let err = Error::AllAttemptsFailed(AttemptFailures::default());
        assert_eq!(err.to_string(), "all retrieval attempts failed");
    }

    #[test]
    fn classes() {
        assert_eq!(Error::NoCandidates.class(), ErrorClass::Configuration);
        assert_eq!(Error::AllQueriesFailed.class(), ErrorClass::Query);
        assert_eq!(Error::AllCandidatesFailed.class(), ErrorClass::Transfer);
        assert_eq!(Error::Cancelled.class(), ErrorClass::Cancellation);
        assert!(Error::Cancelled.is_cancelled());
    }
}
