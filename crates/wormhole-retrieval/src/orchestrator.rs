//! Trying attempts in order until one works.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::attempt::RetrievalAttempt;
use crate::error::{AttemptFailure, AttemptFailures, Error, Result};
use crate::node::ContentNode;
use crate::progress::ProgressSink;
use crate::stats::RetrievalStats;

/// Run `attempts` one at a time, returning the first success.
///
/// A cancellation ends the run immediately. If every attempt fails the
/// result is [`Error::AllAttemptsFailed`] listing each failure in order.
pub async fn retrieve_from_best_candidate(
    node: Arc<dyn ContentNode>,
    cancel: &CancellationToken,
    attempts: &[RetrievalAttempt],
    progress: Arc<dyn ProgressSink>,
) -> Result<RetrievalStats> {
    let mut failures = Vec::with_capacity(attempts.len());

    for attempt in attempts {
        let network = attempt.network();
        info!(network, "starting retrieval attempt");

        match attempt
            .retrieve(cancel, Arc::clone(&node), Arc::clone(&progress))
            .await
        {
            Ok(stats) => return Ok(stats),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(network, error = %e, "retrieval attempt failed");
                failures.push(AttemptFailure { network, error: e });
            }
        }
    }

    Err(Error::AllAttemptsFailed(AttemptFailures(failures)))
}
