//! Pipelined batch ingest (spec §2, §4.3–§4.6, §4.9, §5).
//!
//! Three worker pools connected by bounded channels: fetch-TSID resolves
//! metadata/tsid for a sub-batch, then forks it to the update-date and
//! insert-samples pools concurrently. Enqueue at every stage is
//! non-blocking — a full channel sheds the task and returns `IngestBusy`
//! rather than block the caller, per spec §5.
//!
//! Grounded on the batch-drain-then-flush worker shape in
//! `observability/ingestion.rs::spawn_ingestion_workers`, generalized from
//! a single fixed "events" channel to the three-stage fork described in
//! `original_source/store/batch/fetch_tsid.go`.

mod pipeline;

pub use pipeline::IngestPipeline;

use crate::model::TimeSeries;

/// Default per-pool worker count (spec §5).
pub const DEFAULT_WORKER_COUNT: usize = 8;
/// Default bounded task-channel capacity per pool (spec §5).
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
/// Default sample-count threshold for the batch splitter (spec §4.6).
pub const DEFAULT_BATCH_THRESHOLD: usize = 500;

/// `BatchStore`'s batch splitter: accumulate series into a sub-batch until
/// the running sample count reaches `threshold`, then start a new one.
/// Translated from `original_source/store/batch/fetch_tsid.go::splitBatch`.
pub fn split_batch(batch: Vec<TimeSeries>, threshold: usize) -> Vec<Vec<TimeSeries>> {
    let mut sub_batches = Vec::new();
    let mut current = Vec::new();
    let mut current_samples = 0usize;

    for series in batch {
        current_samples += series.samples.len();
        current.push(series);
        if current_samples >= threshold {
            sub_batches.push(std::mem::take(&mut current));
            current_samples = 0;
        }
    }

    if !current.is_empty() {
        sub_batches.push(current);
    }

    sub_batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Label, Sample};

    fn series_with_n_samples(name: &str, n: usize) -> TimeSeries {
        TimeSeries {
            name: name.into(),
            labels: vec![Label::new("job", "test")],
            samples: (0..n)
                .map(|i| Sample {
                    timestamp_ms: i as i64,
                    value: 1.0,
                })
                .collect(),
        }
    }

    #[test]
    fn splits_along_series_boundaries_by_sample_count() {
        let batch = vec![
            series_with_n_samples("a", 300),
            series_with_n_samples("b", 300),
            series_with_n_samples("c", 10),
        ];
        let sub_batches = split_batch(batch, 500);
        assert_eq!(sub_batches.len(), 2);
        assert_eq!(sub_batches[0].len(), 2); // a + b together cross 500
        assert_eq!(sub_batches[1].len(), 1); // trailing c, under threshold
    }

    #[test]
    fn empty_batch_yields_no_sub_batches() {
        assert!(split_batch(vec![], 500).is_empty());
    }

    #[test]
    fn single_series_under_threshold_is_its_own_sub_batch() {
        let batch = vec![series_with_n_samples("a", 5)];
        let sub_batches = split_batch(batch, 500);
        assert_eq!(sub_batches.len(), 1);
        assert_eq!(sub_batches[0].len(), 1);
    }
}
