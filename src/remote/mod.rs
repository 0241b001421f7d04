//! Remote-protocol adapters (spec §6): snappy-compressed protobuf on the
//! wire, translated to/from this crate's internal `TimeSeries`/`Matcher`
//! model. Grounded on the encode/compress pairing in
//! `other_examples/…__rondo-src-remote_write.rs.rs` (`serialize_write_request`
//! + `compress_snappy` via `snap::raw::Encoder`), generalized here to also
//! decompress/decode for both the write and read paths.

pub mod proto;

use proto::label_matcher::Type as MatcherType;

use crate::model::{Label, Matcher, Sample, TimeSeries};

const NAME_LABEL: &str = "__name__";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("snappy decompression failed: {0}")]
    Snappy(#[from] snap::Error),

    #[error("protobuf decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("protobuf encode failed: {0}")]
    Encode(#[from] prost::EncodeError),
}

/// Decompress and decode a `WriteRequest` body into internal `TimeSeries`.
///
/// Write decode rule: per timeseries, the label named `__name__` becomes the
/// metric name; if absent, the timeseries is skipped with a warning. NaN
/// samples are dropped.
pub fn decode_write_request(compressed: &[u8]) -> Result<Vec<TimeSeries>, CodecError> {
    let raw = decompress(compressed)?;
    let req: proto::WriteRequest = prost::Message::decode(raw.as_slice())?;

    let mut out = Vec::with_capacity(req.timeseries.len());
    for wire in req.timeseries {
        let mut name = None;
        let mut labels = Vec::with_capacity(wire.labels.len());
        for l in wire.labels {
            if l.name == NAME_LABEL {
                name = Some(l.value);
            } else {
                labels.push(Label::new(l.name, l.value));
            }
        }

        let Some(name) = name else {
            tracing::warn!("remote-write timeseries missing __name__ label, skipping");
            continue;
        };

        let samples = wire
            .samples
            .into_iter()
            .map(|s| Sample {
                timestamp_ms: s.timestamp,
                value: s.value,
            })
            .collect::<Vec<_>>();

        let mut series = TimeSeries { name, labels, samples };
        series.retain_finite_samples();
        out.push(series);
    }

    Ok(out)
}

/// Decoded form of a `ReadRequest`: one entry per query, `None` where the
/// query's `__name__` matcher made it unanswerable (spec §6 read decode rule:
/// "any other matcher on `__name__` causes that query to be skipped").
pub struct DecodedQuery {
    pub start_ms: i64,
    pub end_ms: i64,
    pub metric_name: String,
    pub matchers: Vec<Matcher>,
}

pub fn decode_read_request(compressed: &[u8]) -> Result<Vec<Option<DecodedQuery>>, CodecError> {
    let raw = decompress(compressed)?;
    let req: proto::ReadRequest = prost::Message::decode(raw.as_slice())?;

    Ok(req.queries.into_iter().map(decode_query).collect())
}

fn decode_query(q: proto::Query) -> Option<DecodedQuery> {
    let mut metric_name = None;
    let mut matchers = Vec::with_capacity(q.matchers.len());

    for m in q.matchers {
        let matcher_type = matcher_type_of(m.r#type);
        if m.name == NAME_LABEL {
            if matcher_type == MatcherType::Eq {
                metric_name = Some(m.value);
                continue;
            }
            // Any other matcher on __name__ makes the query unanswerable.
            return None;
        }
        matchers.push(Matcher {
            label_name: m.name,
            label_value: m.value,
            is_regex: matches!(matcher_type, MatcherType::Re | MatcherType::Nre),
            is_negative: matches!(matcher_type, MatcherType::Neq | MatcherType::Nre),
        });
    }

    let metric_name = metric_name?;

    Some(DecodedQuery {
        start_ms: q.start_timestamp_ms,
        end_ms: q.end_timestamp_ms,
        metric_name,
        matchers,
    })
}

fn matcher_type_of(raw: i32) -> MatcherType {
    match raw {
        1 => MatcherType::Neq,
        2 => MatcherType::Re,
        3 => MatcherType::Nre,
        _ => MatcherType::Eq,
    }
}

/// Encode and snappy-compress a `ReadResponse` carrying one `QueryResult` per
/// input query, in request order.
pub fn encode_read_response(results: Vec<Vec<TimeSeries>>) -> Result<Vec<u8>, CodecError> {
    let resp = proto::ReadResponse {
        results: results
            .into_iter()
            .map(|series| proto::QueryResult {
                timeseries: series.into_iter().map(encode_series).collect(),
            })
            .collect(),
    };

    let mut buf = Vec::with_capacity(prost::Message::encoded_len(&resp));
    prost::Message::encode(&resp, &mut buf)?;
    Ok(compress(&buf))
}

fn encode_series(series: TimeSeries) -> proto::TimeSeries {
    let mut labels = Vec::with_capacity(series.labels.len() + 1);
    labels.push(proto::Label {
        name: NAME_LABEL.to_owned(),
        value: series.name,
    });
    labels.extend(series.labels.into_iter().map(|l| proto::Label {
        name: l.name,
        value: l.value,
    }));

    proto::TimeSeries {
        labels,
        samples: series
            .samples
            .into_iter()
            .map(|s| proto::Sample {
                value: s.value,
                timestamp: s.timestamp_ms,
            })
            .collect(),
    }
}

fn decompress(input: &[u8]) -> Result<Vec<u8>, snap::Error> {
    snap::raw::Decoder::new().decompress_vec(input)
}

fn compress(input: &[u8]) -> Vec<u8> {
    snap::raw::Encoder::new()
        .compress_vec(input)
        .expect("snappy compression of an in-memory buffer cannot fail")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_compress(req: &proto::WriteRequest) -> Vec<u8> {
        let mut buf = Vec::new();
        prost::Message::encode(req, &mut buf).unwrap();
        compress(&buf)
    }

    #[test]
    fn decode_write_request_maps_name_label_and_drops_nan() {
        let req = proto::WriteRequest {
            timeseries: vec![proto::TimeSeries {
                labels: vec![
                    proto::Label {
                        name: NAME_LABEL.into(),
                        value: "http_requests_total".into(),
                    },
                    proto::Label {
                        name: "method".into(),
                        value: "GET".into(),
                    },
                ],
                samples: vec![
                    proto::Sample {
                        value: 1.0,
                        timestamp: 100,
                    },
                    proto::Sample {
                        value: f64::NAN,
                        timestamp: 200,
                    },
                ],
            }],
        };

        let compressed = roundtrip_compress(&req);
        let series = decode_write_request(&compressed).unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "http_requests_total");
        assert_eq!(series[0].labels, vec![Label::new("method", "GET")]);
        assert_eq!(series[0].samples.len(), 1);
    }

    #[test]
    fn decode_write_request_skips_timeseries_without_name_label() {
        let req = proto::WriteRequest {
            timeseries: vec![proto::TimeSeries {
                labels: vec![proto::Label {
                    name: "method".into(),
                    value: "GET".into(),
                }],
                samples: vec![],
            }],
        };
        let compressed = roundtrip_compress(&req);
        let series = decode_write_request(&compressed).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn decode_query_sets_metric_name_from_eq_name_matcher() {
        let q = proto::Query {
            start_timestamp_ms: 0,
            end_timestamp_ms: 1,
            matchers: vec![
                proto::LabelMatcher {
                    r#type: MatcherType::Eq as i32,
                    name: NAME_LABEL.into(),
                    value: "up".into(),
                },
                proto::LabelMatcher {
                    r#type: MatcherType::Neq as i32,
                    name: "job".into(),
                    value: "x".into(),
                },
            ],
        };
        let decoded = decode_query(q).unwrap();
        assert_eq!(decoded.metric_name, "up");
        assert_eq!(decoded.matchers.len(), 1);
        assert!(decoded.matchers[0].is_negative);
        assert!(!decoded.matchers[0].is_regex);
    }

    #[test]
    fn decode_query_skips_query_with_non_eq_name_matcher() {
        let q = proto::Query {
            start_timestamp_ms: 0,
            end_timestamp_ms: 1,
            matchers: vec![proto::LabelMatcher {
                r#type: MatcherType::Re as i32,
                name: NAME_LABEL.into(),
                value: "up.*".into(),
            }],
        };
        assert!(decode_query(q).is_none());
    }
}
