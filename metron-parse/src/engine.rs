//! Extraction rule evaluation

use regex::Regex;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::debug;

use crate::metric::{MetricScope, ParsedMetric};
use metron_config::{ExtractionRule, ResponseParser};

/// Extraction result type
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Extraction errors
///
/// All variants map upstream to a failed command with the raw output
/// preserved for diagnosis; none is fatal to a capture run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Invalid pattern: {0}")]
    BadPattern(#[from] regex::Error),

    #[error("Pattern '{pattern}' matched nothing in the command output")]
    PatternMismatch { pattern: String },

    #[error("Pattern '{pattern}' has no value capture group")]
    MissingValueGroup { pattern: String },

    #[error("Captured '{text}' is not numeric")]
    NonNumeric { text: String },

    #[error("Command output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Path '{path}' not found in the command output")]
    PathMissing { path: String },

    #[error("Path '{path}' resolved to a value with no numeric content")]
    NonNumericLeaf { path: String },

    #[error("Parser for '{command}' has no sample response to self-test against")]
    EmptySample { command: String },
}

/// Apply a parser's extraction rule to raw command output.
///
/// Returns the extracted metrics in a deterministic order; an empty
/// result is reported as an error so the caller can mark the command
/// failed with the unmatched text preserved.
pub fn extract(
    parser: &ResponseParser,
    raw: &str,
    scope: &MetricScope,
) -> ExtractResult<Vec<ParsedMetric>> {
    let base_name = scope.render(&parser.metric_name);
    let metrics = match &parser.rule {
        ExtractionRule::Pattern { pattern } => {
            extract_pattern(pattern, raw, &base_name, &parser.metric_category)?
        }
        ExtractionRule::JsonPath { path } => {
            extract_json_path(path, raw, &base_name, &parser.metric_category)?
        }
    };

    debug!(
        command = %parser.command_name,
        count = metrics.len(),
        "extracted metrics"
    );
    Ok(metrics)
}

/// Regression-test a parser against its own sample response.
///
/// Run when a parser definition is created or edited, never during a
/// live capture. Succeeds only when the sample yields a non-empty
/// metric set; the result is the metric set a live capture returning
/// identical text would produce.
pub fn self_test(parser: &ResponseParser, scope: &MetricScope) -> ExtractResult<Vec<ParsedMetric>> {
    if parser.sample_response.is_empty() {
        return Err(ExtractError::EmptySample {
            command: parser.command_name.clone(),
        });
    }
    extract(parser, &parser.sample_response, scope)
}

fn extract_pattern(
    pattern: &str,
    raw: &str,
    base_name: &str,
    category: &str,
) -> ExtractResult<Vec<ParsedMetric>> {
    let regex = Regex::new(pattern)?;

    let mut metrics = Vec::new();
    for (index, caps) in regex.captures_iter(raw).enumerate() {
        let value_match = caps
            .name("value")
            .or_else(|| caps.get(1))
            .ok_or_else(|| ExtractError::MissingValueGroup {
                pattern: pattern.to_string(),
            })?;
        let value: f64 = value_match
            .as_str()
            .trim()
            .parse()
            .map_err(|_| ExtractError::NonNumeric {
                text: value_match.as_str().to_string(),
            })?;

        // A `name` group disambiguates repeated matches; unnamed
        // repeats fall back to an ordinal suffix
        let name = match caps.name("name") {
            Some(suffix) => format!("{}_{}", base_name, suffix.as_str().trim()),
            None if index == 0 => base_name.to_string(),
            None => format!("{}_{}", base_name, index + 1),
        };

        metrics.push(ParsedMetric::new(name, value, category));
    }

    if metrics.is_empty() {
        return Err(ExtractError::PatternMismatch {
            pattern: pattern.to_string(),
        });
    }
    Ok(metrics)
}

fn extract_json_path(
    path: &str,
    raw: &str,
    base_name: &str,
    category: &str,
) -> ExtractResult<Vec<ParsedMetric>> {
    let document: JsonValue = serde_json::from_str(raw)?;

    let mut current = &document;
    for segment in path.split('.') {
        current = match current {
            JsonValue::Object(map) => map.get(segment),
            JsonValue::Array(items) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index)),
            _ => None,
        }
        .ok_or_else(|| ExtractError::PathMissing {
            path: path.to_string(),
        })?;
    }

    match current {
        JsonValue::Object(map) => {
            // One metric per numeric field, key-sorted for determinism
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let metrics: Vec<ParsedMetric> = keys
                .into_iter()
                .filter_map(|key| {
                    numeric_value(&map[key])
                        .map(|value| ParsedMetric::new(format!("{}_{}", base_name, key), value, category))
                })
                .collect();
            if metrics.is_empty() {
                return Err(ExtractError::NonNumericLeaf {
                    path: path.to_string(),
                });
            }
            Ok(metrics)
        }
        leaf => {
            let value = numeric_value(leaf).ok_or_else(|| ExtractError::NonNumericLeaf {
                path: path.to_string(),
            })?;
            Ok(vec![ParsedMetric::new(base_name, value, category)])
        }
    }
}

/// Numeric coercion for JSON leaves; quoted numbers are common in
/// tool output, so numeric strings are accepted
fn numeric_value(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(number) => number.as_f64(),
        JsonValue::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
