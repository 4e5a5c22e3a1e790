//! Run summary

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::relocate::RelocationOutcome;
use crate::sync::SyncTally;

/// Counters for one pipeline run, serialized as the run's JSON summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRunReport {
    pub pages_fetched: u64,
    pub fetched: u64,
    pub transformed: u64,
    pub malformed: u64,
    pub relocated_ok: u64,
    pub relocated_fallback: u64,
    pub inserted: u64,
    pub failed: u64,
    pub batches_written: u64,
    pub batches_failed: u64,
    pub deduplicated: u64,
    /// Set when pagination ended on an upstream failure
    pub fetch_error: Option<String>,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl PipelineRunReport {
    pub fn start() -> Self {
        Self {
            pages_fetched: 0,
            fetched: 0,
            transformed: 0,
            malformed: 0,
            relocated_ok: 0,
            relocated_fallback: 0,
            inserted: 0,
            failed: 0,
            batches_written: 0,
            batches_failed: 0,
            deduplicated: 0,
            fetch_error: None,
            cancelled: false,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_relocation(&mut self, outcome: RelocationOutcome) {
        match outcome {
            RelocationOutcome::Relocated => self.relocated_ok += 1,
            RelocationOutcome::Fallback => self.relocated_fallback += 1,
        }
    }

    pub fn absorb(&mut self, tally: SyncTally) {
        self.inserted += tally.inserted;
        self.failed += tally.failed;
        self.batches_written += tally.batches_written;
        self.batches_failed += tally.batches_failed;
        self.deduplicated += tally.deduplicated;
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Nothing was cut short and every batch landed
    pub fn is_complete(&self) -> bool {
        self.fetch_error.is_none() && !self.cancelled && self.batches_failed == 0
    }

    pub fn elapsed_secs(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

impl Default for PipelineRunReport {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_absorb_and_completion() {
        let mut report = PipelineRunReport::start();
        report.absorb(SyncTally {
            inserted: 50,
            batches_written: 1,
            ..Default::default()
        });
        report.absorb(SyncTally {
            failed: 10,
            batches_failed: 1,
            deduplicated: 2,
            ..Default::default()
        });

        assert_eq!(report.inserted, 50);
        assert_eq!(report.failed, 10);
        assert_eq!(report.deduplicated, 2);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_serializes_counters() {
        let mut report = PipelineRunReport::start();
        report.record_relocation(RelocationOutcome::Relocated);
        report.record_relocation(RelocationOutcome::Fallback);
        report.finish();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["relocated_ok"], 1);
        assert_eq!(json["relocated_fallback"], 1);
        assert_eq!(json["cancelled"], false);
        assert!(json["fetch_error"].is_null());
        assert!(json["finished_at"].is_string());
    }
}
