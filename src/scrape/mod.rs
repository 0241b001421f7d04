//! Scrape scheduler (spec §4.8).
//!
//! Per-job ticker spawning one task per target per tick, generalized from
//! `original_source/scrape/scrape.go` (ticker-per-job, goroutine-per-target,
//! no wait-for-previous-tick) to add the synthetic `up` /
//! `scrape_duration_seconds` / `scrape_samples_scraped` series and
//! `job`/`instance` label augmentation spec §4.8 items 5–6 call for, which
//! the original never does.

pub mod expo;

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::task::JoinSet;

use crate::cancel::CancellationToken;
use crate::config::ScrapeConfig;
use crate::ingest::IngestPipeline;
use crate::model::{Label, Sample, TimeSeries};

/// Owns the per-job ticker loops. `shutdown` cancels the root token and
/// `join` waits for every in-flight scrape (spec §4.8 "shutdown cancels the
/// root context and waits for all in-flight tasks").
pub struct Scheduler {
    tasks: JoinSet<()>,
    cancel: CancellationToken,
}

impl Scheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Spawn one ticker loop per configured scrape job.
    pub fn spawn(&mut self, configs: Vec<ScrapeConfig>, pipeline: Arc<IngestPipeline>) {
        let client = Client::builder()
            .build()
            .expect("building the scrape HTTP client cannot fail");

        for config in configs {
            let pipeline = pipeline.clone();
            let client = client.clone();
            let cancel = self.cancel.clone();
            self.tasks.spawn(job_loop(config, client, pipeline, cancel));
        }
    }

    /// Cancel the root token and wait for every spawned job loop (and the
    /// in-flight scrapes it was tracking) to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn job_loop(
    config: ScrapeConfig,
    client: Client,
    pipeline: Arc<IngestPipeline>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(config.scrape_interval);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for static_config in &config.static_configs {
                    for target in &static_config.targets {
                        let client = client.clone();
                        let pipeline = pipeline.clone();
                        let job_name = config.job_name.clone();
                        let scheme = config.scheme.clone();
                        let metrics_path = config.metrics_path.clone();
                        let timeout = config.scrape_timeout;
                        let target = target.clone();
                        // Overlapping ticks are intentional (spec §4.8): we
                        // never wait for a previous tick's scrapes before
                        // starting the next one.
                        in_flight.spawn(scrape_target(
                            client, job_name, scheme, metrics_path, target, timeout, pipeline,
                        ));
                    }
                }
            }
            _ = cancel.cancelled() => {
                break;
            }
        }

        // Reap completed scrapes without blocking the next tick on them.
        while in_flight.try_join_next().is_some() {}
    }

    // Drain whatever is still in flight before this job loop exits.
    while in_flight.join_next().await.is_some() {}
}

#[allow(clippy::too_many_arguments)]
async fn scrape_target(
    client: Client,
    job_name: String,
    scheme: String,
    metrics_path: String,
    target: String,
    timeout: Duration,
    pipeline: Arc<IngestPipeline>,
) {
    let url = format!("{scheme}://{target}{metrics_path}");
    let start = Instant::now();

    let outcome = tokio::time::timeout(timeout, do_scrape(&client, &url, timeout)).await;

    let duration = start.elapsed();
    let finish_ms = now_ms();

    let (mut series, up) = match outcome {
        Ok(Ok(body)) => match expo::parse(&body, finish_ms) {
            Ok(series) => (series, 1.0),
            Err(e) => {
                let scrape_error = crate::error::ScrapeError::Parse(e);
                tracing::warn!(target = %url, error = %scrape_error, "failed to parse scrape exposition body");
                (Vec::new(), 0.0)
            }
        },
        Ok(Err(e)) => {
            let scrape_error = crate::error::ScrapeError::Http(e);
            tracing::warn!(target = %url, error = %scrape_error, "scrape request failed");
            (Vec::new(), 0.0)
        }
        Err(_) => {
            let scrape_error = crate::error::ScrapeError::Timeout;
            tracing::warn!(target = %url, error = %scrape_error, "scrape timed out");
            (Vec::new(), 0.0)
        }
    };

    for s in &mut series {
        s.labels.push(Label::new("job", job_name.clone()));
        s.labels.push(Label::new("instance", target.clone()));
    }

    let samples_scraped = series.iter().map(|s| s.samples.len()).sum::<usize>() as f64;

    series.push(synthetic_series("up", up, finish_ms, &job_name, &target));
    series.push(synthetic_series(
        "scrape_duration_seconds",
        duration.as_secs_f64(),
        finish_ms,
        &job_name,
        &target,
    ));
    series.push(synthetic_series(
        "scrape_samples_scraped",
        samples_scraped,
        finish_ms,
        &job_name,
        &target,
    ));

    if let Err(e) = pipeline.store_batch(series).await {
        tracing::warn!(target = %url, error = %e, "failed to enqueue scrape batch for ingest");
    }
}

async fn do_scrape(client: &Client, url: &str, timeout: Duration) -> Result<String, reqwest::Error> {
    let resp = client.get(url).timeout(timeout).send().await?;
    resp.text().await
}

fn synthetic_series(name: &str, value: f64, timestamp_ms: i64, job_name: &str, target: &str) -> TimeSeries {
    TimeSeries {
        name: name.to_owned(),
        labels: vec![
            Label::new("job", job_name.to_owned()),
            Label::new("instance", target.to_owned()),
        ],
        samples: vec![Sample {
            timestamp_ms,
            value,
        }],
    }
}

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_series_carries_job_and_instance_labels() {
        let s = synthetic_series("up", 1.0, 0, "tidb", "127.0.0.1:10080");
        assert_eq!(s.name, "up");
        assert_eq!(
            s.labels,
            vec![
                Label::new("job", "tidb"),
                Label::new("instance", "127.0.0.1:10080"),
            ]
        );
        assert_eq!(s.samples[0].value, 1.0);
    }
}
