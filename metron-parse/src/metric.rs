//! Metric value types

use serde::{Deserialize, Serialize};

/// One structured numeric measurement extracted from raw command output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedMetric {
    pub name: String,
    pub value: f64,
    /// Metric transaction-type label, e.g. `MEMORY` or `CPU_UTIL`
    pub category: String,
}

impl ParsedMetric {
    pub fn new(name: impl Into<String>, value: f64, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            category: category.into(),
        }
    }
}

impl std::fmt::Display for ParsedMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={} ({})", self.name, self.value, self.category)
    }
}

/// Naming scope for extracted metrics.
///
/// The same parser rule applied to several hosts must not produce
/// colliding metric names, so the scope carries the disambiguating
/// host label substituted into the parser's name template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricScope {
    pub host_label: String,
}

impl MetricScope {
    pub fn new(host_label: impl Into<String>) -> Self {
        Self {
            host_label: host_label.into(),
        }
    }

    /// Render a metric-name template against this scope
    pub fn render(&self, template: &str) -> String {
        template.replace("{host}", &self.host_label)
    }
}
