//! Core data types shared across the metadata directory, ingest pipeline,
//! query planner and scraper.

use std::collections::HashMap;

/// Maximum number of distinct label names a single metric may carry.
///
/// Slots `0..MAX_LABEL_COUNT` map onto the `label0..label14` columns of
/// `flash_metrics_index`.
pub const MAX_LABEL_COUNT: usize = 15;

/// A label name/value pair as carried on the wire and in scrape output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One observation on a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp_ms: i64,
    pub value: f64,
}

/// A single time series as handed to the ingest pipeline: a metric name, its
/// label set (unsorted, as received), and its samples.
#[derive(Debug, Clone)]
pub struct TimeSeries {
    pub name: String,
    pub labels: Vec<Label>,
    pub samples: Vec<Sample>,
}

impl TimeSeries {
    /// Drop NaN samples. Per spec §4.10, dropping a NaN sample never drops
    /// the rest of the batch or the series itself — only called sites must
    /// filter before the samples reach `insert_samples`.
    pub fn retain_finite_samples(&mut self) {
        self.samples.retain(|s| !s.value.is_nan());
    }
}

/// The per-metric label-name → slot-id directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Meta {
    pub labels: HashMap<String, i32>,
}

impl Meta {
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.labels.len()
    }
}

/// A single matcher in a remote-read query.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub label_name: String,
    pub label_value: String,
    pub is_regex: bool,
    pub is_negative: bool,
}

impl Matcher {
    /// The SQL comparison operator this matcher compiles to.
    #[must_use]
    pub const fn sql_operator(&self) -> &'static str {
        match (self.is_regex, self.is_negative) {
            (false, false) => "=",
            (false, true) => "!=",
            (true, false) => "REGEXP",
            (true, true) => "NOT REGEXP",
        }
    }
}

/// A series resolved to its canonical identity: metric name plus the
/// fixed-arity, slot-ordered label values (empty string = slot unused).
#[derive(Debug, Clone)]
pub struct ResolvedSeries {
    pub name: String,
    pub sorted_label_values: [String; MAX_LABEL_COUNT],
    pub samples: Vec<Sample>,
    pub tsid: Option<i64>,
}

impl ResolvedSeries {
    #[must_use]
    pub fn new(name: String, samples: Vec<Sample>) -> Self {
        Self {
            name,
            sorted_label_values: std::array::from_fn(|_| String::new()),
            samples,
            tsid: None,
        }
    }

    /// `canonical_fingerprint`: `metric_name + "$" + v0 + "$" + v1 + … + "$" + v{K-1}`.
    #[must_use]
    pub fn fingerprint(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.name.len() + self.sorted_label_values.len() * 9);
        buf.extend_from_slice(self.name.as_bytes());
        for v in &self.sorted_label_values {
            buf.push(b'$');
            buf.extend_from_slice(v.as_bytes());
        }
        buf
    }

    /// UTC calendar dates (`YYYY-MM-DD`) covered by this series' samples.
    #[must_use]
    pub fn distinct_dates(&self) -> Vec<chrono::NaiveDate> {
        use chrono::{DateTime, Utc};
        let mut dates: Vec<chrono::NaiveDate> = self
            .samples
            .iter()
            .map(|s| {
                DateTime::<Utc>::from_timestamp_millis(s.timestamp_ms)
                    .unwrap_or_default()
                    .date_naive()
            })
            .collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_dollar_joined() {
        let mut s = ResolvedSeries::new("http_requests_total".into(), vec![]);
        s.sorted_label_values[0] = "GET".into();
        s.sorted_label_values[1] = "/messages".into();
        let fp = s.fingerprint();
        assert_eq!(
            String::from_utf8(fp).unwrap(),
            "http_requests_total$GET$/messages$$$$$$$$$$$$$"
        );
    }

    #[test]
    fn retain_finite_samples_drops_nan_only() {
        let mut ts = TimeSeries {
            name: "m".into(),
            labels: vec![],
            samples: vec![
                Sample {
                    timestamp_ms: 1,
                    value: 1.0,
                },
                Sample {
                    timestamp_ms: 2,
                    value: f64::NAN,
                },
                Sample {
                    timestamp_ms: 3,
                    value: 2.0,
                },
            ],
        };
        ts.retain_finite_samples();
        assert_eq!(ts.samples.len(), 2);
        assert_eq!(ts.samples[0].value, 1.0);
        assert_eq!(ts.samples[1].value, 2.0);
    }

    #[test]
    fn matcher_operator_mapping() {
        let eq = Matcher {
            label_name: "x".into(),
            label_value: "y".into(),
            is_regex: false,
            is_negative: false,
        };
        assert_eq!(eq.sql_operator(), "=");
        let nre = Matcher {
            is_regex: true,
            is_negative: true,
            ..eq
        };
        assert_eq!(nre.sql_operator(), "NOT REGEXP");
    }
}
