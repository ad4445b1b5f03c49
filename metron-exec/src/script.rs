//! Embedded JavaScript backend
//!
//! Runs an inline script snippet inside a boa sandbox. The command's
//! resolved parameters are injected as global string bindings, and a
//! `print` function collects output; whatever the script printed is
//! returned as stdout, falling back to the script's completion value
//! when nothing was printed. An uncaught script error maps to a failed
//! outcome with the error text as stderr.

use async_trait::async_trait;
use boa_engine::{property::PropertyKey, Context, JsString, JsValue, Source};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::backend::{ExecOutcome, ExecutorBackend};
use crate::error::{ExecError, ExecResult};
use metron_config::ExecutorKind;

const PRINT_PRELUDE: &str = r#"
var __metron_out = [];
function print(value) { __metron_out.push(String(value)); }
"#;

/// Sandboxed JavaScript executor for one capture run
pub struct JsBackend {
    bindings: HashMap<String, String>,
}

impl JsBackend {
    /// Create a backend with the given global string bindings
    pub fn new(bindings: HashMap<String, String>) -> Self {
        Self { bindings }
    }
}

#[async_trait]
impl ExecutorBackend for JsBackend {
    async fn execute(&self, command: &str, timeout: Duration) -> ExecResult<ExecOutcome> {
        let script = command.to_string();
        let bindings = self.bindings.clone();

        // Boa evaluation is synchronous and non-preemptible; run it on
        // a blocking thread so the timeout can bound the caller. An
        // expired script's worker thread is abandoned.
        let evaluation = tokio::task::spawn_blocking(move || run_script(&script, &bindings));

        match tokio::time::timeout(timeout, evaluation).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Err(ExecError::Script(join_error.to_string())),
            Err(_) => Err(ExecError::Timeout {
                seconds: timeout.as_secs(),
            }),
        }
    }

    fn kind(&self) -> ExecutorKind {
        ExecutorKind::JavaScript
    }
}

fn run_script(script: &str, bindings: &HashMap<String, String>) -> ExecResult<ExecOutcome> {
    let mut context = Context::default();

    let global = context.global_object();
    for (name, value) in bindings {
        global
            .set(
                PropertyKey::from(JsString::from(name.as_str())),
                JsValue::from(JsString::from(value.as_str())),
                true,
                &mut context,
            )
            .map_err(|e| ExecError::Script(format!("cannot bind '{}': {}", name, e)))?;
    }

    context
        .eval(Source::from_bytes(PRINT_PRELUDE))
        .map_err(|e| ExecError::Script(format!("print prelude failed: {}", e)))?;

    match context.eval(Source::from_bytes(script)) {
        Ok(completion) => {
            let printed = collect_printed(&mut context);
            let stdout = if printed.is_empty() {
                completion_text(&mut context, &completion)
            } else {
                printed
            };
            debug!(bytes = stdout.len(), "script completed");
            Ok(ExecOutcome {
                stdout,
                stderr: String::new(),
                exit_failed: false,
            })
        }
        Err(error) => Ok(ExecOutcome {
            stdout: collect_printed(&mut context),
            stderr: error.to_string(),
            exit_failed: true,
        }),
    }
}

fn collect_printed(context: &mut Context) -> String {
    context
        .eval(Source::from_bytes("__metron_out.join('\\n')"))
        .ok()
        .and_then(|value| value.to_string(context).ok())
        .map(|text| text.to_std_string_escaped())
        .unwrap_or_default()
}

fn completion_text(context: &mut Context, completion: &JsValue) -> String {
    if completion.is_undefined() || completion.is_null() {
        return String::new();
    }
    completion
        .to_string(context)
        .map(|text| text.to_std_string_escaped())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn backend_with(bindings: &[(&str, &str)]) -> JsBackend {
        JsBackend::new(
            bindings
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_print_capture() {
        let backend = backend_with(&[]);
        let outcome = backend
            .execute("print('free 3.2'); print('cached 1.1');", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.stdout, "free 3.2\ncached 1.1");
        assert!(!outcome.exit_failed);
    }

    #[tokio::test]
    async fn test_parameter_bindings() {
        let backend = backend_with(&[("host", "db01"), ("mount", "/data")]);
        let outcome = backend
            .execute("print(host + ':' + mount);", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.stdout, "db01:/data");
    }

    #[tokio::test]
    async fn test_completion_value_fallback() {
        let backend = backend_with(&[]);
        let outcome = backend
            .execute("40 + 2", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(outcome.stdout, "42");
    }

    #[tokio::test]
    async fn test_uncaught_error_fails_command() {
        let backend = backend_with(&[]);
        let outcome = backend
            .execute("throw new Error('disk probe exploded');", Duration::from_secs(5))
            .await
            .unwrap();

        assert!(outcome.exit_failed);
        assert!(outcome.stderr.contains("disk probe exploded"));
    }

    #[tokio::test]
    async fn test_runaway_script_times_out() {
        let backend = backend_with(&[]);
        let started = Instant::now();
        let result = backend
            .execute("while (true) {}", Duration::from_millis(200))
            .await;

        assert!(matches!(result, Err(ExecError::Timeout { .. })));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
