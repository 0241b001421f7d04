//! End-to-end seed scenarios (spec §8) against a live TiDB/MySQL instance.
//!
//! Run with: `cargo test --test store_and_query -- --ignored --nocapture`
//!
//! Bring up a target with:
//! `docker run -d --name flashmetrics-test-tidb -p 4000:4000 pingcap/tidb:latest`

use std::sync::Arc;

use flashmetrics::ingest::IngestPipeline;
use flashmetrics::meta::MetaDirectory;
use flashmetrics::model::{Label, Matcher, Sample, TimeSeries};
use flashmetrics::tsid_cache::TsidCache;
use flashmetrics::{db, query, schema};

const NOW: i64 = 1_700_000_000_000;

struct Harness {
    pool: sqlx::MySqlPool,
    meta_dir: Arc<MetaDirectory>,
    pipeline: Arc<IngestPipeline>,
}

async fn harness() -> Harness {
    let pool = db::create_pool("127.0.0.1:4000")
        .await
        .expect("connect to test TiDB");
    schema::teardown(&pool).await.ok();
    schema::bootstrap(&pool).await.expect("bootstrap schema");

    let meta_dir = Arc::new(MetaDirectory::new(pool.clone()));
    let tsid_cache = Arc::new(TsidCache::new());
    let pipeline = Arc::new(IngestPipeline::spawn(pool.clone(), meta_dir.clone(), tsid_cache));

    Harness {
        pool,
        meta_dir,
        pipeline,
    }
}

fn series(name: &str, labels: &[(&str, &str)], samples: &[(i64, f64)]) -> TimeSeries {
    TimeSeries {
        name: name.to_owned(),
        labels: labels
            .iter()
            .map(|(n, v)| Label::new(*n, *v))
            .collect(),
        samples: samples
            .iter()
            .map(|(t, v)| Sample {
                timestamp_ms: *t,
                value: *v,
            })
            .collect(),
    }
}

fn matcher(name: &str, value: &str, is_regex: bool, is_negative: bool) -> Matcher {
    Matcher {
        label_name: name.to_owned(),
        label_value: value.to_owned(),
        is_regex,
        is_negative,
    }
}

#[tokio::test]
#[ignore]
async fn write_then_query_exact() {
    let h = harness().await;

    let get_series = series(
        "api_http_requests_total",
        &[("method", "GET"), ("handler", "/messages")],
        &[(NOW, 100.0), (NOW + 15, 200.0)],
    );
    let post_series = series(
        "api_http_requests_total",
        &[("method", "POST"), ("handler", "/messages")],
        &[(NOW, 77.0)],
    );

    h.pipeline
        .store_batch(vec![get_series, post_series])
        .await
        .unwrap();

    let both = query::query(&h.pool, &h.meta_dir, NOW, NOW, "api_http_requests_total", &[])
        .await
        .unwrap();
    assert_eq!(both.len(), 2);
    for s in &both {
        assert_eq!(s.samples.len(), 1);
        assert_eq!(s.samples[0].timestamp_ms, NOW);
    }

    let get_only = query::query(
        &h.pool,
        &h.meta_dir,
        NOW,
        NOW + 15,
        "api_http_requests_total",
        &[matcher("method", "GET", false, false)],
    )
    .await
    .unwrap();
    assert_eq!(get_only.len(), 1);
    assert_eq!(get_only[0].samples.len(), 2);
}

#[tokio::test]
#[ignore]
async fn unknown_matcher_label_returns_empty_without_sql() {
    let h = harness().await;
    h.pipeline
        .store_batch(vec![series(
            "api_http_requests_total",
            &[("method", "GET")],
            &[(NOW, 1.0)],
        )])
        .await
        .unwrap();

    let result = query::query(
        &h.pool,
        &h.meta_dir,
        NOW,
        NOW + 15,
        "api_http_requests_total",
        &[matcher("job", "tidb", false, false)],
    )
    .await
    .unwrap();
    assert!(result.is_empty());
}

#[tokio::test]
#[ignore]
async fn regex_matchers() {
    let h = harness().await;
    h.pipeline
        .store_batch(vec![
            series("api_http_requests_total", &[("method", "GET")], &[(NOW, 1.0)]),
            series("api_http_requests_total", &[("method", "POST")], &[(NOW, 1.0)]),
        ])
        .await
        .unwrap();

    let both = query::query(
        &h.pool,
        &h.meta_dir,
        NOW,
        NOW,
        "api_http_requests_total",
        &[matcher("method", ".*T", true, false)],
    )
    .await
    .unwrap();
    assert_eq!(both.len(), 2);

    let get_only = query::query(
        &h.pool,
        &h.meta_dir,
        NOW,
        NOW,
        "api_http_requests_total",
        &[matcher("method", "PO.*", true, true)],
    )
    .await
    .unwrap();
    assert_eq!(get_only.len(), 1);
}

#[tokio::test]
#[ignore]
async fn nan_samples_are_dropped() {
    let h = harness().await;
    h.pipeline
        .store_batch(vec![series(
            "nan_metric",
            &[],
            &[(NOW, 1.0), (NOW + 1, f64::NAN), (NOW + 2, 2.0)],
        )])
        .await
        .unwrap();

    let result = query::query(&h.pool, &h.meta_dir, NOW, NOW + 2, "nan_metric", &[])
        .await
        .unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].samples.len(), 2);
}

#[tokio::test]
#[ignore]
async fn identical_store_calls_duplicate_sample_rows_but_not_series() {
    let h = harness().await;
    let s = series("dup_metric", &[("a", "b")], &[(NOW, 1.0)]);

    h.pipeline.store_batch(vec![s.clone()]).await.unwrap();
    h.pipeline.store_batch(vec![s]).await.unwrap();

    let result = query::query(&h.pool, &h.meta_dir, NOW, NOW, "dup_metric", &[])
        .await
        .unwrap();
    assert_eq!(result.len(), 1, "identical series must resolve to one tsid");
    assert_eq!(result[0].samples.len(), 2, "samples are append-only, duplicates preserved");
}
