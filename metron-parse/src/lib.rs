//! Response parser engine
//!
//! Applies a configured extraction rule to the raw text of one command
//! execution and produces structured numeric metrics. Two rule forms
//! are supported, selected by the tagged [`ExtractionRule`] variant on
//! the parser definition: regex capture groups over free text, and
//! dot-path navigation into JSON-shaped output.

pub mod engine;
pub mod metric;

pub use engine::{extract, self_test, ExtractError, ExtractResult};
pub use metric::{MetricScope, ParsedMetric};

// Re-exported so embedders can build parser definitions without
// importing metron-config directly
pub use metron_config::{ExtractionRule, ResponseParser};
