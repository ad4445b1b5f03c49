//! Blocking facade for synchronous sampler threads
//!
//! Load-test harnesses typically invoke the capture engine from plain
//! sampler threads, one per monitored profile or virtual user. This
//! facade drives the async engine on a shared runtime so those callers
//! need no runtime of their own; concurrent calls remain independent.

use once_cell::sync::Lazy;
use std::collections::HashMap;
use tokio::runtime::Runtime;

use crate::orchestrator::CaptureEngine;
use crate::result::{CaptureError, CompositeResult};

static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("metron-capture")
        .enable_all()
        .build()
        .expect("failed to build capture runtime")
});

/// Run a full capture for the named profile, blocking the calling
/// thread until it completes. See
/// [`CaptureEngine::run_profile_capture`].
pub fn run_profile_capture(
    engine: &CaptureEngine,
    profile_name: &str,
    overrides: &HashMap<String, String>,
) -> Result<CompositeResult, CaptureError> {
    RUNTIME.block_on(engine.run_profile_capture(profile_name, overrides))
}
