//! Prometheus text exposition format parser.
//!
//! Hand-rolled: the original service leans on `prometheus/common/expfmt`,
//! which has no single-crate equivalent in the example pack, so this is a
//! small focused parser rather than an unlisted dependency (see
//! `SPEC_FULL.md` §4.8). Grounded on the metric-family handling in
//! `original_source/scrape/scrape.go::scrapeTarget` (type dispatch,
//! quantile/bucket label synthesis, `_sum`/`_count` series) — flattened
//! here since the text format already carries one exposition line per
//! quantile/bucket rather than a nested family structure to walk.

use std::collections::HashMap;

use crate::model::{Label, Sample, TimeSeries};

/// Parse a Prometheus text-exposition body into internal `TimeSeries`, one
/// per exposition line (summaries/histograms already appear as one line per
/// quantile/bucket plus `_sum`/`_count` in the text format). All samples are
/// stamped with `timestamp_ms`.
pub fn parse(body: &str, timestamp_ms: i64) -> Result<Vec<TimeSeries>, String> {
    let mut series: Vec<TimeSeries> = Vec::new();

    for line in body.lines() {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (name_and_labels, value_str) = split_sample_line(line)?;
        let (name, labels) = parse_name_and_labels(name_and_labels)?;
        let value: f64 = value_str
            .trim()
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .parse()
            .map_err(|_| format!("invalid sample value in line: {line}"))?;

        series.push(TimeSeries {
            name,
            labels,
            samples: vec![Sample {
                timestamp_ms,
                value,
            }],
        });
    }

    Ok(series)
}

fn split_sample_line(line: &str) -> Result<(&str, &str), String> {
    if let Some(close) = line.rfind('}') {
        let (head, tail) = line.split_at(close + 1);
        return Ok((head, tail));
    }
    let mut parts = line.splitn(2, ' ');
    let name = parts.next().ok_or_else(|| format!("empty line: {line}"))?;
    let value = parts
        .next()
        .ok_or_else(|| format!("missing value: {line}"))?;
    Ok((name, value))
}

fn parse_name_and_labels(text: &str) -> Result<(String, Vec<Label>), String> {
    let Some(brace) = text.find('{') else {
        return Ok((text.trim().to_owned(), Vec::new()));
    };
    let name = text[..brace].trim().to_owned();
    let inside = text[brace + 1..]
        .rfind('}')
        .map(|end| &text[brace + 1..brace + 1 + end])
        .unwrap_or_default();

    let mut labels = Vec::new();
    for pair in split_label_pairs(inside) {
        let Some(eq) = pair.find('=') else {
            continue;
        };
        let key = pair[..eq].trim().to_owned();
        let value = pair[eq + 1..].trim().trim_matches('"').to_owned();
        labels.push(Label::new(key, value));
    }
    Ok((name, labels))
}

/// Split `a="1",b="x,y"` on top-level commas only (not ones inside quotes).
fn split_label_pairs(inside: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    for (i, c) in inside.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(inside[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < inside.len() {
        parts.push(inside[start..].trim());
    }
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

/// Tracks declared `# TYPE` directives. Currently informational only — the
/// parser treats every exposition line uniformly since quantile/bucket
/// expansion is already flattened by the exposition format itself — but
/// kept so a future consumer (e.g. a metrics-explorer UI) can recover
/// family types without re-scanning the body.
#[must_use]
pub fn declared_types(body: &str) -> HashMap<String, String> {
    let mut types = HashMap::new();
    for line in body.lines() {
        if let Some(rest) = line.strip_prefix("# TYPE ") {
            let mut parts = rest.splitn(2, ' ');
            if let (Some(name), Some(kind)) = (parts.next(), parts.next()) {
                types.insert(name.to_owned(), kind.trim().to_owned());
            }
        }
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_counter_line() {
        let body = "# TYPE http_requests_total counter\nhttp_requests_total{method=\"GET\"} 42\n";
        let series = parse(body, 1000).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "http_requests_total");
        assert_eq!(series[0].labels, vec![Label::new("method", "GET")]);
        assert_eq!(series[0].samples[0].value, 42.0);
    }

    #[test]
    fn parses_bare_gauge_without_labels() {
        let body = "go_goroutines 7\n";
        let series = parse(body, 0).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "go_goroutines");
        assert!(series[0].labels.is_empty());
    }

    #[test]
    fn parses_histogram_buckets_and_sum_count() {
        let body = "\
# TYPE request_duration_seconds histogram
request_duration_seconds_bucket{le=\"0.1\"} 1
request_duration_seconds_bucket{le=\"+Inf\"} 3
request_duration_seconds_sum 1.2
request_duration_seconds_count 3
";
        let series = parse(body, 0).unwrap();
        assert_eq!(series.len(), 4);
        assert!(series
            .iter()
            .any(|s| s.name == "request_duration_seconds_sum"));
        assert!(series
            .iter()
            .any(|s| s.name == "request_duration_seconds_count"));
    }

    #[test]
    fn parses_summary_quantiles() {
        let body = "\
# TYPE rpc_duration_seconds summary
rpc_duration_seconds{quantile=\"0.5\"} 0.05
rpc_duration_seconds{quantile=\"0.9\"} 0.09
rpc_duration_seconds_sum 1.0
rpc_duration_seconds_count 10
";
        let series = parse(body, 0).unwrap();
        assert_eq!(series.len(), 4);
        let quantiles: Vec<_> = series
            .iter()
            .filter(|s| s.name == "rpc_duration_seconds")
            .collect();
        assert_eq!(quantiles.len(), 2);
    }

    #[test]
    fn ignores_help_and_blank_lines() {
        let body = "# HELP x docs\n\n# TYPE x counter\nx 1\n";
        let series = parse(body, 0).unwrap();
        assert_eq!(series.len(), 1);
    }

    #[test]
    fn declared_types_reads_type_directives() {
        let body = "# TYPE x counter\n# TYPE y histogram\n";
        let types = declared_types(body);
        assert_eq!(types.get("x"), Some(&"counter".to_string()));
        assert_eq!(types.get("y"), Some(&"histogram".to_string()));
    }
}
