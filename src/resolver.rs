//! Identity Resolver / Fetch-TSID stage (spec §4.3).
//!
//! Per-series preprocessing (slot assignment via the metadata directory)
//! followed by the two-statement race-free resolution protocol, translated
//! directly from `original_source/store/batch/fetch_tsid.go`'s
//! `batchFillSortedLabelValues` + `batchFillTSID`.

use sqlx::MySqlPool;

use crate::error::StoreError;
use crate::meta::MetaDirectory;
use crate::model::{ResolvedSeries, TimeSeries, MAX_LABEL_COUNT};
use crate::tsid_cache::TsidCache;

/// Assign label slots and resolve (or create) the `tsid` for every series in
/// `batch`, consulting the TSID cache first and falling back to the
/// insert-then-lookup protocol against `flash_metrics_index` for the rest.
pub async fn resolve_batch(
    pool: &MySqlPool,
    meta_dir: &MetaDirectory,
    tsid_cache: &TsidCache,
    batch: Vec<TimeSeries>,
) -> Result<Vec<ResolvedSeries>, StoreError> {
    let mut resolved = Vec::with_capacity(batch.len());
    for ts in batch {
        resolved.push(fill_sorted_label_values(meta_dir, ts).await?);
    }

    fill_tsid(pool, tsid_cache, &mut resolved).await?;

    Ok(resolved)
}

async fn fill_sorted_label_values(
    meta_dir: &MetaDirectory,
    ts: TimeSeries,
) -> Result<ResolvedSeries, StoreError> {
    let label_names: Vec<String> = ts.labels.iter().map(|l| l.name.clone()).collect();
    let meta = meta_dir.store_meta(&ts.name, &label_names).await?;

    let mut resolved = ResolvedSeries::new(ts.name, ts.samples);
    for label in &ts.labels {
        if let Some(&slot) = meta.labels.get(&label.name) {
            resolved.sorted_label_values[slot as usize] = label.value.clone();
        }
    }
    Ok(resolved)
}

async fn fill_tsid(
    pool: &MySqlPool,
    tsid_cache: &TsidCache,
    batch: &mut [ResolvedSeries],
) -> Result<(), StoreError> {
    let mut slow_path: Vec<usize> = Vec::new();
    for (i, series) in batch.iter_mut().enumerate() {
        let fingerprint = series.fingerprint();
        if let Some(tsid) = tsid_cache.get(&fingerprint) {
            series.tsid = Some(tsid);
        } else {
            slow_path.push(i);
        }
    }

    if slow_path.is_empty() {
        return Ok(());
    }

    insert_ignore_index(pool, batch, &slow_path).await?;
    let tsids = ordered_lookup(pool, batch, &slow_path).await?;

    for (&idx, tsid) in slow_path.iter().zip(tsids) {
        batch[idx].tsid = Some(tsid);
        tsid_cache.put(batch[idx].fingerprint(), tsid);
    }

    Ok(())
}

async fn insert_ignore_index(
    pool: &MySqlPool,
    batch: &[ResolvedSeries],
    slow_path: &[usize],
) -> Result<(), sqlx::Error> {
    let mut qb: sqlx::QueryBuilder<'_, sqlx::MySql> =
        sqlx::QueryBuilder::new("INSERT IGNORE INTO flash_metrics_index VALUES ");
    qb.push_values(slow_path, |mut b, &idx| {
        let series = &batch[idx];
        b.push_bind(&series.name);
        for v in &series.sorted_label_values {
            b.push_bind(v);
        }
    });
    qb.build().execute(pool).await?;
    Ok(())
}

/// `UNION ALL ... ORDER BY id` lookup: each subquery is tagged with its
/// position in `slow_path` so rows come back aligned with the input order
/// regardless of how the SQL engine evaluates the union.
async fn ordered_lookup(
    pool: &MySqlPool,
    batch: &[ResolvedSeries],
    slow_path: &[usize],
) -> Result<Vec<i64>, sqlx::Error> {
    let mut sql = String::from("SELECT t.tsid FROM (\n");
    for (i, _) in slow_path.iter().enumerate() {
        if i != 0 {
            sql.push_str("UNION ALL\n");
        }
        sql.push_str(&format!(
            "SELECT {i} AS id, _tidb_rowid AS tsid FROM flash_metrics_index WHERE metric_name = ? "
        ));
        for slot in 0..MAX_LABEL_COUNT {
            sql.push_str(&format!("AND label{slot} = ? "));
        }
    }
    sql.push_str(") t ORDER BY id");

    let mut query = sqlx::query_as(&sql);
    for &idx in slow_path {
        let series = &batch[idx];
        query = query.bind(series.name.clone());
        for v in &series.sorted_label_values {
            query = query.bind(v.clone());
        }
    }

    let rows: Vec<(i64,)> = query.fetch_all(pool).await?;
    Ok(rows.into_iter().map(|(tsid,)| tsid).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;

    #[test]
    fn fingerprint_changes_when_tsid_already_known_path_skipped() {
        // Pure-function sanity check of the cache-hit shortcut: a series
        // with a tsid already set should never reach the slow path. This
        // is exercised at the `fill_tsid` level in the DB-backed suite;
        // here we just assert the fingerprint function used as the cache
        // key is deterministic for identical inputs.
        let a = ResolvedSeries::new(
            "m".into(),
            vec![Sample {
                timestamp_ms: 0,
                value: 1.0,
            }],
        );
        let b = ResolvedSeries::new(
            "m".into(),
            vec![Sample {
                timestamp_ms: 1,
                value: 2.0,
            }],
        );
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
