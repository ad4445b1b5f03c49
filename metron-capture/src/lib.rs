//! Capture orchestrator for the Metron metrics engine
//!
//! Given a named server profile, runs the profile's commands in their
//! declared order through the command driver, routes each command's
//! output to its bound response parser, and aggregates everything into
//! one [`CompositeResult`] for the calling performance-test harness.
//!
//! The engine holds no mutable state between calls: concurrent
//! captures for different profiles (or the same profile) are
//! independent, each owning its own driver and transport sessions.
//!
//! ```no_run
//! use std::collections::HashMap;
//! use std::sync::Arc;
//! use metron_capture::CaptureEngine;
//! use metron_config::YamlStore;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let store = Arc::new(YamlStore::from_file("capture.yaml")?);
//! let engine = CaptureEngine::new(store);
//!
//! let result = engine
//!     .run_profile_capture("localhost-linux", &HashMap::new())
//!     .await?;
//! for metric in &result.metrics {
//!     println!("{}", metric);
//! }
//! # Ok(())
//! # }
//! ```

pub mod blocking;
pub mod orchestrator;
pub mod result;

pub use orchestrator::CaptureEngine;
pub use result::{CaptureError, CommandState, CompositeResult, ScriptResponse, SubResult};

// The metric type flows through the public result bundle
pub use metron_parse::ParsedMetric;
