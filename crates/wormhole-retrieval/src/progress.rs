//! Progress reporting.
//!
//! Transports report progress through a [`ProgressSink`]. Reports are
//! advisory: a sink that drops everything must not change retrieval results.

use tokio::sync::mpsc;

/// Receives progress reports from a running retrieval.
pub trait ProgressSink: Send + Sync {
    /// Total payload bytes received so far by the current transfer.
    fn bytes_received(&self, total: u64);

    /// `checked` of `total` price queries have answered.
    fn candidates_queried(&self, _checked: usize, _total: usize) {}
}

/// Discards all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn bytes_received(&self, _total: u64) {}
}

/// A progress report forwarded over a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    /// See [`ProgressSink::bytes_received`].
    Bytes(u64),
    /// See [`ProgressSink::candidates_queried`].
    Queried { checked: usize, total: usize },
}

/// Forwards reports to a channel so rendering can run on its own task.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    /// Create a sink and the receiver its events arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgress {
    fn bytes_received(&self, total: u64) {
        // Receiver gone means nobody is rendering; that's fine.
        let _ = self.tx.send(ProgressEvent::Bytes(total));
    }

    fn candidates_queried(&self, checked: usize, total: usize) {
        let _ = self.tx.send(ProgressEvent::Queried { checked, total });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_forwards_events() {
        let (sink, mut rx) = ChannelProgress::new();

        sink.candidates_queried(1, 3);
        sink.bytes_received(42);

        assert_eq!(
            rx.recv().await,
            Some(ProgressEvent::Queried { checked: 1, total: 3 })
        );
        assert_eq!(rx.recv().await, Some(ProgressEvent::Bytes(42)));
    }

    #[test]
    fn channel_survives_dropped_receiver() {
        let (sink, rx) = ChannelProgress::new();
        drop(rx);
        sink.bytes_received(1);
    }
}
