//! Terminal progress rendering.

use indicatif::{HumanBytes, ProgressBar, ProgressDrawTarget, ProgressStyle};
use wormhole_retrieval::ProgressSink;

/// Live byte counter on stderr.
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { bar }
    }

    /// Remove the line once the retrieval is over.
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for TerminalProgress {
    fn bytes_received(&self, total: u64) {
        self.bar.set_message(format!("{} ({})", total, HumanBytes(total)));
    }

    fn candidates_queried(&self, checked: usize, total: usize) {
        self.bar
            .set_message(format!("{checked}/{total} retrieval queries answered"));
    }
}
