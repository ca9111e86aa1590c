//! Per-pass counters, logged as a summary when a crawl pass completes.

use log::info;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassMetrics {
    pub series_visited: usize,
    pub chapters_created: usize,
    pub chapters_skipped: usize,
    pub translations_fallen_back: usize,
    pub fetches_blocked: usize,
    /// Index pages no strategy could make sense of; needs operator
    /// attention, usually a new site layout.
    pub unrecognized_structures: usize,
    pub series_failed: usize,
}

impl PassMetrics {
    pub fn log_summary(&self, pass: u64) {
        info!(
            "pass {} done: {} series, {} chapters created, {} skipped, {} translations fell back, {} blocked, {} unrecognized, {} failed",
            pass,
            self.series_visited,
            self.chapters_created,
            self.chapters_skipped,
            self.translations_fallen_back,
            self.fetches_blocked,
            self.unrecognized_structures,
            self.series_failed,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let m = PassMetrics::default();
        assert_eq!(m.chapters_created, 0);
        assert_eq!(m, PassMetrics::default());
    }
}
