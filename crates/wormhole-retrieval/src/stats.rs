//! Retrieval statistics.

use std::time::Duration;

use wormhole_dag::ContentId;

/// Result of one successful retrieval, whichever transport produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalStats {
    byte_size: u64,
    duration: Duration,
    root: Option<ContentId>,
}

impl RetrievalStats {
    /// Stats for `byte_size` payload bytes moved in `duration`.
    pub fn new(byte_size: u64, duration: Duration) -> Self {
        Self {
            byte_size,
            duration,
            root: None,
        }
    }

    /// Record the root of what was actually retrieved.
    pub fn with_root(mut self, root: ContentId) -> Self {
        self.root = Some(root);
        self
    }

    /// Payload bytes transferred (leaf data only).
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// Wall-clock transfer time.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Root of the retrieved graph. A selector retrieval reports the
    /// selected sub-root here rather than the requested root.
    pub fn root(&self) -> Option<ContentId> {
        self.root
    }

    /// Average throughput, truncated. Zero when no time elapsed.
    pub fn average_bytes_per_second(&self) -> u64 {
        let secs = self.duration.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.byte_size as f64 / secs) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_mebibyte_per_second() {
        let stats = RetrievalStats::new(1_048_576, Duration::from_secs(1));
        assert_eq!(stats.average_bytes_per_second(), 1_048_576);
    }

    #[test]
    fn zero_duration_is_zero_rate() {
        let stats = RetrievalStats::new(1_048_576, Duration::ZERO);
        assert_eq!(stats.average_bytes_per_second(), 0);
    }

    #[test]
    fn rate_truncates() {
        let stats = RetrievalStats::new(10, Duration::from_secs(3));
        assert_eq!(stats.average_bytes_per_second(), 3);

        let stats = RetrievalStats::new(1000, Duration::from_millis(1500));
        assert_eq!(stats.average_bytes_per_second(), 666);
    }

    #[test]
    fn root_is_optional() {
        let stats = RetrievalStats::new(1, Duration::ZERO);
        assert_eq!(stats.root(), None);

        let root = ContentId::of(wormhole_dag::Codec::Raw, b"sub");
        assert_eq!(stats.with_root(root).root(), Some(root));
    }
}
