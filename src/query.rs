//! Query Planner (spec §4.7).
//!
//! New code — the original service's equivalent is either an unimplemented
//! stub (`store/default_metrics.go::Query` panics) or the dead
//! `QPSSolver`/PromQL-rewrite path this spec explicitly excludes (§9). Built
//! directly from the SQL shape spec §4.7 describes, with row assembly
//! styled on `observability/storage.rs`'s query helpers (runtime-checked
//! `sqlx::query_as` against a row struct, not a compile-time macro).

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::MySqlPool;

use crate::error::QueryError;
use crate::meta::MetaDirectory;
use crate::model::{Label, Matcher, Sample, TimeSeries, MAX_LABEL_COUNT};

/// One row of the index ⋈ update ⋈ data join.
#[derive(Debug, sqlx::FromRow)]
struct SeriesRow {
    tsid: i64,
    label0: Option<String>,
    label1: Option<String>,
    label2: Option<String>,
    label3: Option<String>,
    label4: Option<String>,
    label5: Option<String>,
    label6: Option<String>,
    label7: Option<String>,
    label8: Option<String>,
    label9: Option<String>,
    label10: Option<String>,
    label11: Option<String>,
    label12: Option<String>,
    label13: Option<String>,
    label14: Option<String>,
    t: i64,
    v: f64,
}

impl SeriesRow {
    fn labels(&self) -> [Option<&str>; MAX_LABEL_COUNT] {
        [
            self.label0.as_deref(),
            self.label1.as_deref(),
            self.label2.as_deref(),
            self.label3.as_deref(),
            self.label4.as_deref(),
            self.label5.as_deref(),
            self.label6.as_deref(),
            self.label7.as_deref(),
            self.label8.as_deref(),
            self.label9.as_deref(),
            self.label10.as_deref(),
            self.label11.as_deref(),
            self.label12.as_deref(),
            self.label13.as_deref(),
            self.label14.as_deref(),
        ]
    }
}

/// `(start_ms, end_ms, metric_name, matchers)` → assembled series.
///
/// Returns an empty list (not an error) if any matcher references a label
/// name absent from the metric's `Meta` — no SQL is executed in that case.
pub async fn query(
    pool: &MySqlPool,
    meta_dir: &MetaDirectory,
    start_ms: i64,
    end_ms: i64,
    metric_name: &str,
    matchers: &[Matcher],
) -> Result<Vec<TimeSeries>, QueryError> {
    let meta = meta_dir.query_meta(metric_name).await?;

    let mut slots = Vec::with_capacity(matchers.len());
    for matcher in matchers {
        match meta.labels.get(&matcher.label_name) {
            Some(&slot) => slots.push(slot as usize),
            None => return Ok(Vec::new()),
        }
    }

    let start_date = date_of(start_ms);
    let end_date = date_of(end_ms);

    let sql = build_sql(matchers, &slots);
    let mut query = sqlx::query_as::<_, SeriesRow>(&sql).bind(metric_name.to_owned());
    for (matcher, slot) in matchers.iter().zip(&slots) {
        let _ = slot; // slot already baked into the SQL column name
        query = query.bind(matcher.label_value.clone());
    }
    query = query
        .bind(start_date)
        .bind(end_date)
        .bind(start_ms)
        .bind(end_ms);

    let rows = query.fetch_all(pool).await?;

    let mut slot_names: [Option<&str>; MAX_LABEL_COUNT] = [None; MAX_LABEL_COUNT];
    for (name, &slot) in &meta.labels {
        slot_names[slot as usize] = Some(name.as_str());
    }

    Ok(assemble(rows, metric_name, &slot_names))
}

fn date_of(ms: i64) -> NaiveDate {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .date_naive()
}

fn build_sql(matchers: &[Matcher], slots: &[usize]) -> String {
    let mut sql = String::from(
        "SELECT `index`.label0, `index`.label1, `index`.label2, `index`.label3, \
         `index`.label4, `index`.label5, `index`.label6, `index`.label7, \
         `index`.label8, `index`.label9, `index`.label10, `index`.label11, \
         `index`.label12, `index`.label13, `index`.label14, \
         `data`.tsid AS tsid, UNIX_TIMESTAMP(`data`.ts) * 1000 AS t, `data`.v AS v \
         FROM flash_metrics_index AS `index` \
         JOIN flash_metrics_update AS `update` ON `index`._tidb_rowid = `update`.tsid \
         JOIN flash_metrics_data AS `data` ON `update`.tsid = `data`.tsid \
         WHERE `index`.metric_name = ? ",
    );

    for (matcher, &slot) in matchers.iter().zip(slots) {
        sql.push_str(&format!(
            "AND `index`.label{slot} {} ? ",
            matcher.sql_operator()
        ));
    }

    sql.push_str("AND ? <= `update`.updated_date AND `update`.updated_date <= ? ");
    sql.push_str("AND ? <= `data`.ts AND `data`.ts <= ? ");
    sql.push_str("ORDER BY tsid, t");
    sql
}

fn assemble(
    rows: Vec<SeriesRow>,
    metric_name: &str,
    slot_names: &[Option<&str>; MAX_LABEL_COUNT],
) -> Vec<TimeSeries> {
    let mut series: Vec<TimeSeries> = Vec::new();
    let mut current_tsid: Option<i64> = None;

    for row in rows {
        if current_tsid != Some(row.tsid) {
            current_tsid = Some(row.tsid);
            let labels = row
                .labels()
                .into_iter()
                .enumerate()
                .filter_map(|(slot, value)| match (value, slot_names[slot]) {
                    (Some(v), Some(name)) if !v.is_empty() => Some(Label::new(name, v)),
                    _ => None,
                })
                .collect();
            series.push(TimeSeries {
                name: metric_name.to_owned(),
                labels,
                samples: Vec::new(),
            });
        }
        if let Some(last) = series.last_mut() {
            last.samples.push(Sample {
                timestamp_ms: row.t,
                value: row.v,
            });
        }
    }

    series
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_groups_by_tsid_and_starts_new_series_on_change() {
        let rows = vec![
            SeriesRow {
                tsid: 1,
                label0: Some("GET".into()),
                label1: None,
                label2: None,
                label3: None,
                label4: None,
                label5: None,
                label6: None,
                label7: None,
                label8: None,
                label9: None,
                label10: None,
                label11: None,
                label12: None,
                label13: None,
                label14: None,
                t: 100,
                v: 1.0,
            },
            SeriesRow {
                tsid: 1,
                label0: Some("GET".into()),
                label1: None,
                label2: None,
                label3: None,
                label4: None,
                label5: None,
                label6: None,
                label7: None,
                label8: None,
                label9: None,
                label10: None,
                label11: None,
                label12: None,
                label13: None,
                label14: None,
                t: 115,
                v: 2.0,
            },
            SeriesRow {
                tsid: 2,
                label0: Some("POST".into()),
                label1: None,
                label2: None,
                label3: None,
                label4: None,
                label5: None,
                label6: None,
                label7: None,
                label8: None,
                label9: None,
                label10: None,
                label11: None,
                label12: None,
                label13: None,
                label14: None,
                t: 100,
                v: 77.0,
            },
        ];

        let mut slot_names: [Option<&str>; MAX_LABEL_COUNT] = [None; MAX_LABEL_COUNT];
        slot_names[0] = Some("method");
        let series = assemble(rows, "api_http_requests_total", &slot_names);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].samples.len(), 2);
        assert_eq!(series[1].samples.len(), 1);
        assert_eq!(series[0].labels, vec![Label::new("method", "GET")]);
        assert_eq!(series[0].name, "api_http_requests_total");
        assert_eq!(series[1].name, "api_http_requests_total");
    }

    #[test]
    fn build_sql_includes_one_clause_per_matcher() {
        let matchers = vec![Matcher {
            label_name: "method".into(),
            label_value: "GET".into(),
            is_regex: false,
            is_negative: false,
        }];
        let sql = build_sql(&matchers, &[0]);
        assert!(sql.contains("AND `index`.label0 = ? "));
    }
}
