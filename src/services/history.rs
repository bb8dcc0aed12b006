//! Flattening of `getmeasure` payloads into samples and summary statistics.
//!
//! The provider returns `body` either as a list of entries or as an object of
//! entries. An entry is `{beg_time, step_time, value: [[t0], [t1], ...]}`;
//! sample `i` is at `beg_time + i * step_time`. The non-optimised form maps a
//! timestamp string straight to its value group (`{"1700000000": [19.5]}`).

use serde::Serialize;
use serde_json::Value;

const DEFAULT_STEP_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    pub timestamp: i64,
    pub temperature: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub count: usize,
}

impl Statistics {
    pub fn empty() -> Self {
        Statistics {
            average: None,
            min: None,
            max: None,
            count: 0,
        }
    }
}

fn first_value(group: &Value) -> Option<f64> {
    group.as_array()?.first()?.as_f64()
}

fn extend_from_entry(entry: &Value, out: &mut Vec<Sample>) {
    let Some(values) = entry.get("value").and_then(Value::as_array) else {
        return;
    };
    let base = entry.get("beg_time").and_then(Value::as_i64).unwrap_or(0);
    let step = entry
        .get("step_time")
        .and_then(Value::as_i64)
        .unwrap_or(DEFAULT_STEP_SECS);

    // Samples whose timestamp does not fit in an i64 are skipped.
    out.extend(values.iter().enumerate().filter_map(|(i, group)| {
        let timestamp = i64::try_from(i)
            .ok()
            .and_then(|i| i.checked_mul(step))
            .and_then(|offset| base.checked_add(offset))?;
        first_value(group).map(|temperature| Sample { timestamp, temperature })
    }));
}

/// All (timestamp, temperature) pairs. A list body keeps payload order; a
/// mapping body has no meaningful key order, so its samples are sorted by
/// timestamp. Absent temperatures are dropped.
pub fn flatten_samples(raw: &Value) -> Vec<Sample> {
    let mut samples = Vec::new();
    match raw.get("body") {
        Some(Value::Array(entries)) => {
            for entry in entries {
                extend_from_entry(entry, &mut samples);
            }
        }
        Some(Value::Object(entries)) => {
            for (key, entry) in entries {
                match entry {
                    Value::Object(_) => extend_from_entry(entry, &mut samples),
                    Value::Array(_) => {
                        if let (Ok(timestamp), Some(temperature)) = (key.parse::<i64>(), first_value(entry)) {
                            samples.push(Sample { timestamp, temperature });
                        }
                    }
                    _ => {}
                }
            }
            samples.sort_by_key(|s| s.timestamp);
        }
        _ => {}
    }
    samples
}

pub fn statistics_of(samples: &[Sample]) -> Statistics {
    if samples.is_empty() {
        return Statistics::empty();
    }
    let (sum, min, max) = samples.iter().fold(
        (0.0, f64::INFINITY, f64::NEG_INFINITY),
        |(sum, min, max), s| (sum + s.temperature, min.min(s.temperature), max.max(s.temperature)),
    );
    Statistics {
        average: Some(sum / samples.len() as f64),
        min: Some(min),
        max: Some(max),
        count: samples.len(),
    }
}

pub fn compute_statistics(raw: &Value) -> Statistics {
    statistics_of(&flatten_samples(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference_payload() -> Value {
        json!({"body": [{"beg_time": 1000, "step_time": 3600, "value": [[10.0], [12.0], [null]]}]})
    }

    #[test]
    fn null_samples_are_dropped() {
        assert_eq!(
            flatten_samples(&reference_payload()),
            vec![
                Sample {
                    timestamp: 1000,
                    temperature: 10.0
                },
                Sample {
                    timestamp: 4600,
                    temperature: 12.0
                },
            ]
        );
    }

    #[test]
    fn statistics_ignore_nulls() {
        assert_eq!(
            compute_statistics(&reference_payload()),
            Statistics {
                average: Some(11.0),
                min: Some(10.0),
                max: Some(12.0),
                count: 2
            }
        );
    }

    #[test]
    fn empty_history_yields_zero_count() {
        for raw in [
            json!({}),
            json!({"body": []}),
            json!({"body": {}}),
            json!({"body": [{"beg_time": 5, "value": []}]}),
            json!({"body": [{"beg_time": 5, "value": [[null], []]}]}),
            json!({"status": "ok", "body": "unexpected"}),
        ] {
            assert_eq!(compute_statistics(&raw), Statistics::empty(), "{raw}");
        }
    }

    #[test]
    fn step_defaults_to_one_hour_and_timestamps_follow_index() {
        let raw = json!({"body": [
            {"beg_time": 0, "value": [[null], [20.0], [21.0]]},
            {"beg_time": 100000, "step_time": 1800, "value": [[22.5]]}
        ]});
        let stamps: Vec<i64> = flatten_samples(&raw).iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![3600, 7200, 100000]);
    }

    #[test]
    fn mapping_of_entries_is_accepted() {
        let raw = json!({"body": {
            "a": {"beg_time": 2000, "step_time": 60, "value": [[18.0], [19.0]]},
            "b": {"note": "no values here"},
            "c": 42
        }});
        let samples = flatten_samples(&raw);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].timestamp, 2060);
        assert_eq!(compute_statistics(&raw).average, Some(18.5));
    }

    #[test]
    fn timestamp_keyed_mapping_is_accepted() {
        let raw = json!({"body": {"1700000000": [19.5], "1700003600": [null], "1700007200": [20.5], "oops": [1.0]}});
        let samples = flatten_samples(&raw);
        assert_eq!(
            samples,
            vec![
                Sample {
                    timestamp: 1700000000,
                    temperature: 19.5
                },
                Sample {
                    timestamp: 1700007200,
                    temperature: 20.5
                },
            ]
        );
    }

    #[test]
    fn integer_temperatures_are_read() {
        let raw = json!({"body": [{"beg_time": 0, "step_time": 10, "value": [[19], [21]]}]});
        let stats = compute_statistics(&raw);
        assert_eq!(stats.min, Some(19.0));
        assert_eq!(stats.max, Some(21.0));
    }

    #[test]
    fn timestamp_keys_of_different_widths_come_out_in_time_order() {
        let raw = json!({"body": {"999999999": [18.0], "1000000000": [19.0], "99": [17.0]}});
        let stamps: Vec<i64> = flatten_samples(&raw).iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![99, 999999999, 1000000000]);
    }

    #[test]
    fn overflowing_timestamps_are_skipped() {
        let raw = json!({"body": [
            {"beg_time": i64::MAX - 10, "step_time": 3600, "value": [[20.0], [21.0], [22.0]]},
            {"beg_time": -1, "step_time": i64::MIN, "value": [[15.0], [16.0]]}
        ]});
        assert_eq!(
            flatten_samples(&raw),
            vec![
                Sample {
                    timestamp: i64::MAX - 10,
                    temperature: 20.0
                },
                Sample {
                    timestamp: -1,
                    temperature: 15.0
                },
            ]
        );
    }
}
