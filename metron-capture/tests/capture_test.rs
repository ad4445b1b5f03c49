//! End-to-end capture tests
//!
//! The concrete scenarios run through the real driver (JavaScript
//! backend for the pass case, SSH against a dead port for the
//! unreachable case); orchestrator semantics that need scripted
//! transports use a stub runner.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metron_capture::CaptureEngine;
use metron_config::{
    AuthMethod, Command, ConfigError, ConfigResult, ConfigStore, Credentials, ExecutorKind,
    ExtractionRule, HostKeyPolicy, MemoryStore, ResponseParser, ServerProfile,
};
use metron_exec::{CommandResult, CommandRunner, ExecError, ExecOutcome};

fn profile(name: &str, host: &str, commands: &[&str]) -> ServerProfile {
    ServerProfile {
        name: name.to_string(),
        host: host.to_string(),
        port: 22,
        credentials: Credentials {
            username: "perf".to_string(),
            password: Some("secret".to_string()),
            ..Default::default()
        },
        preferred_auth: vec![AuthMethod::Password],
        host_key_policy: HostKeyPolicy::AcceptAny,
        command_timeout: Duration::from_secs(5),
        commands: commands.iter().map(|c| c.to_string()).collect(),
        params: HashMap::new(),
    }
}

fn command(name: &str, executor: ExecutorKind, template: &str) -> Command {
    Command {
        name: name.to_string(),
        executor,
        template: template.to_string(),
        ignore_stderr: false,
        comment: String::new(),
    }
}

fn pattern_parser(command_name: &str, metric_name: &str, category: &str, pattern: &str, sample: &str) -> ResponseParser {
    ResponseParser {
        command_name: command_name.to_string(),
        metric_category: category.to_string(),
        metric_name: metric_name.to_string(),
        rule: ExtractionRule::Pattern {
            pattern: pattern.to_string(),
        },
        comment: String::new(),
        sample_response: sample.to_string(),
    }
}

/// Store with the localhost-linux profile of the two-metric scenario,
/// with commands running on the embedded JavaScript backend
fn localhost_linux_store(memory_script: &str, cpu_script: &str) -> MemoryStore {
    let mut store = MemoryStore::new();
    store
        .add_profile(profile("localhost-linux", "localhost", &["MemoryCheck", "CPUCheck"]))
        .add_command(command("MemoryCheck", ExecutorKind::JavaScript, memory_script))
        .add_command(command("CPUCheck", ExecutorKind::JavaScript, cpu_script))
        .add_parser(pattern_parser(
            "MemoryCheck",
            "Memory_{host}_freeG",
            "MEMORY",
            r"free\s+(?<value>[0-9.]+)",
            "free 3.2",
        ))
        .add_parser(pattern_parser(
            "CPUCheck",
            "CPU_{host}_IDLE",
            "CPU_UTIL",
            r"idle\s+(?<value>[0-9.]+)",
            "idle 87",
        ));
    store
}

#[tokio::test]
async fn localhost_linux_pass_scenario() {
    let store = localhost_linux_store("print('free 3.2');", "print('idle 87');");
    let engine = CaptureEngine::new(Arc::new(store));

    let result = engine
        .run_profile_capture("localhost-linux", &HashMap::new())
        .await
        .unwrap();

    assert!(result.overall_pass);
    assert_eq!(result.sub_results.len(), 2);
    assert_eq!(result.sub_results[0].label, "MemoryCheck");
    assert_eq!(result.sub_results[1].label, "CPUCheck");
    assert!(result.sub_results.iter().all(|sub| sub.passed));

    let rendered: Vec<String> = result.metrics.iter().map(|m| m.to_string()).collect();
    assert_eq!(
        rendered,
        vec![
            "Memory_localhost_freeG=3.2 (MEMORY)",
            "CPU_localhost_IDLE=87 (CPU_UTIL)",
        ]
    );
}

#[tokio::test]
async fn unreachable_host_scenario() {
    // Same profile shape, but remote-shell commands against a dead
    // port: nothing listens on 127.0.0.1:1
    let mut store = MemoryStore::new();
    let mut target = profile("localhost-linux", "127.0.0.1", &["MemoryCheck", "CPUCheck"]);
    target.port = 1;
    target.command_timeout = Duration::from_secs(2);
    store
        .add_profile(target)
        .add_command(command("MemoryCheck", ExecutorKind::RemoteShell, "free -g"))
        .add_command(command("CPUCheck", ExecutorKind::RemoteShell, "mpstat 1 1"))
        .add_parser(pattern_parser(
            "MemoryCheck",
            "Memory_{host}_freeG",
            "MEMORY",
            r"free\s+(?<value>[0-9.]+)",
            "free 3.2",
        ))
        .add_parser(pattern_parser(
            "CPUCheck",
            "CPU_{host}_IDLE",
            "CPU_UTIL",
            r"idle\s+(?<value>[0-9.]+)",
            "idle 87",
        ));

    let engine = CaptureEngine::new(Arc::new(store));
    let result = engine
        .run_profile_capture("localhost-linux", &HashMap::new())
        .await
        .unwrap();

    assert!(!result.overall_pass);
    assert_eq!(result.sub_results.len(), 2);
    assert!(result.sub_results.iter().all(|sub| !sub.passed));
    assert!(result.metrics.is_empty());
    for sub in &result.sub_results {
        assert!(
            sub.message.contains("failed"),
            "transport error text missing from log: {}",
            sub.message
        );
    }
}

#[tokio::test]
async fn overrides_substitute_host_without_touching_store() {
    let store = localhost_linux_store("print('free 3.2');", "print('idle 87');");
    let engine = CaptureEngine::new(Arc::new(store));

    let mut overrides = HashMap::new();
    overrides.insert("host".to_string(), "10.0.0.7".to_string());

    let result = engine
        .run_profile_capture("localhost-linux", &overrides)
        .await
        .unwrap();
    assert_eq!(result.metrics[0].name, "Memory_10_0_0_7_freeG");

    // The stored profile still captures under its own host label
    let result = engine
        .run_profile_capture("localhost-linux", &HashMap::new())
        .await
        .unwrap();
    assert_eq!(result.metrics[0].name, "Memory_localhost_freeG");
}

#[tokio::test]
async fn concurrent_captures_are_independent() {
    let store = localhost_linux_store("print('free 3.2');", "print('idle 87');");
    let engine = Arc::new(CaptureEngine::new(Arc::new(store)));

    // One call per sampler task, no shared sessions or buffers
    let overrides = HashMap::new();
    let first = engine.run_profile_capture("localhost-linux", &overrides);
    let second = engine.run_profile_capture("localhost-linux", &overrides);
    let (first, second) = tokio::join!(first, second);

    for result in [first.unwrap(), second.unwrap()] {
        assert!(result.overall_pass);
        assert_eq!(result.metrics.len(), 2);
    }
}

#[tokio::test]
async fn missing_profile_is_top_level_failure() {
    let engine = CaptureEngine::new(Arc::new(MemoryStore::new()));
    let error = engine
        .run_profile_capture("nowhere", &HashMap::new())
        .await
        .unwrap_err();
    assert!(matches!(
        error,
        metron_capture::CaptureError::ProfileNotFound(_)
    ));
}

#[test]
fn blocking_facade_runs_on_plain_threads() {
    let store = localhost_linux_store("print('free 3.2');", "print('idle 87');");
    let engine = CaptureEngine::new(Arc::new(store));

    let result =
        metron_capture::blocking::run_profile_capture(&engine, "localhost-linux", &HashMap::new())
            .unwrap();
    assert!(result.overall_pass);
    assert_eq!(result.metrics.len(), 2);
}

// ---------------------------------------------------------------------
// Scripted-transport tests

enum Scripted {
    Output(&'static str),
    Noisy {
        stdout: &'static str,
        stderr: &'static str,
    },
    Transport(&'static str),
}

struct StubRunner {
    scripts: HashMap<String, Scripted>,
    closed: AtomicBool,
}

impl StubRunner {
    fn new(scripts: Vec<(&str, Scripted)>) -> Self {
        Self {
            scripts: scripts
                .into_iter()
                .map(|(name, script)| (name.to_string(), script))
                .collect(),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CommandRunner for StubRunner {
    async fn run(&self, command: &Command) -> CommandResult {
        let outcome = match self.scripts.get(&command.name) {
            Some(Scripted::Output(stdout)) => Ok(ExecOutcome {
                stdout: stdout.to_string(),
                ..Default::default()
            }),
            Some(Scripted::Noisy { stdout, stderr }) => Ok(ExecOutcome {
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
                exit_failed: false,
            }),
            Some(Scripted::Transport(message)) => Err(ExecError::Connect {
                host: "localhost".to_string(),
                port: 22,
                message: message.to_string(),
            }),
            None => Err(ExecError::Transport("unscripted command".to_string())),
        };

        let log = match &outcome {
            Ok(_) => format!("{}: completed\n", command.name),
            Err(error) => format!("{}: failed: {}\n", command.name, error),
        };
        CommandResult {
            command_name: command.name.clone(),
            resolved: command.template.clone(),
            outcome,
            elapsed: Duration::from_millis(5),
            log,
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

fn two_command_store() -> MemoryStore {
    localhost_linux_store("unused", "unused")
}

#[tokio::test]
async fn one_transport_failure_does_not_halt_later_commands() {
    let store = two_command_store();
    let target = store.find_server_profile("localhost-linux").unwrap().unwrap();
    let engine = CaptureEngine::new(Arc::new(store));

    let runner = StubRunner::new(vec![
        ("MemoryCheck", Scripted::Transport("connection refused")),
        ("CPUCheck", Scripted::Output("idle 87")),
    ]);

    let result = engine.capture_with_runner(&target, &runner).await.unwrap();

    assert!(!result.overall_pass);
    assert_eq!(result.sub_results.len(), 2);
    assert!(!result.sub_results[0].passed);
    assert!(result.sub_results[0].message.contains("connection refused"));
    assert!(result.sub_results[1].passed);
    assert_eq!(result.metrics.len(), 1);
    assert_eq!(result.metrics[0].name, "CPU_localhost_IDLE");

    runner.close().await;
    assert!(runner.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn parse_mismatch_fails_command_and_preserves_raw_output() {
    let store = two_command_store();
    let target = store.find_server_profile("localhost-linux").unwrap().unwrap();
    let engine = CaptureEngine::new(Arc::new(store));

    let runner = StubRunner::new(vec![
        ("MemoryCheck", Scripted::Output("total used available shared")),
        ("CPUCheck", Scripted::Output("idle 87")),
    ]);

    let result = engine.capture_with_runner(&target, &runner).await.unwrap();

    assert!(!result.sub_results[0].passed);
    assert!(result.sub_results[0].message.contains("extraction failed"));
    assert!(result.sub_results[0]
        .message
        .contains("total used available shared"));
    // Later command unaffected, its metric intact
    assert!(result.sub_results[1].passed);
    assert_eq!(result.metrics.len(), 1);
}

#[tokio::test]
async fn stderr_failure_is_configuration_dependent() {
    let noisy = Scripted::Noisy {
        stdout: "free 3.2",
        stderr: "vmstat: deprecated option\n",
    };

    // ignore_stderr unset: the warning fails the command
    let mut store = MemoryStore::new();
    store
        .add_profile(profile("strict", "localhost", &["MemoryCheck"]))
        .add_command(command("MemoryCheck", ExecutorKind::RemoteShell, "free -g"))
        .add_parser(pattern_parser(
            "MemoryCheck",
            "Memory_{host}_freeG",
            "MEMORY",
            r"free\s+(?<value>[0-9.]+)",
            "free 3.2",
        ));
    let target = store.find_server_profile("strict").unwrap().unwrap();
    let engine = CaptureEngine::new(Arc::new(store));
    let runner = StubRunner::new(vec![("MemoryCheck", noisy)]);

    let result = engine.capture_with_runner(&target, &runner).await.unwrap();
    assert!(!result.sub_results[0].passed);
    assert!(result.sub_results[0].message.contains("deprecated option"));

    // ignore_stderr set: same output passes
    let mut store = MemoryStore::new();
    let mut lenient = command("MemoryCheck", ExecutorKind::RemoteShell, "free -g");
    lenient.ignore_stderr = true;
    store
        .add_profile(profile("lenient", "localhost", &["MemoryCheck"]))
        .add_command(lenient)
        .add_parser(pattern_parser(
            "MemoryCheck",
            "Memory_{host}_freeG",
            "MEMORY",
            r"free\s+(?<value>[0-9.]+)",
            "free 3.2",
        ));
    let target = store.find_server_profile("lenient").unwrap().unwrap();
    let engine = CaptureEngine::new(Arc::new(store));
    let runner = StubRunner::new(vec![(
        "MemoryCheck",
        Scripted::Noisy {
            stdout: "free 3.2",
            stderr: "vmstat: deprecated option\n",
        },
    )]);

    let result = engine.capture_with_runner(&target, &runner).await.unwrap();
    assert!(result.sub_results[0].passed);
    assert_eq!(result.metrics[0].name, "Memory_localhost_freeG");
}

#[tokio::test]
async fn missing_records_fail_their_command_but_not_siblings() {
    let mut store = MemoryStore::new();
    store
        .add_profile(profile(
            "patchy",
            "localhost",
            &["MissingCommand", "NoParser", "Good"],
        ))
        // MissingCommand has no command record at all
        .add_command(command("NoParser", ExecutorKind::RemoteShell, "uptime"))
        .add_command(command("Good", ExecutorKind::RemoteShell, "free -g"))
        .add_parser(pattern_parser(
            "Good",
            "Memory_{host}_freeG",
            "MEMORY",
            r"free\s+(?<value>[0-9.]+)",
            "free 3.2",
        ));
    let target = store.find_server_profile("patchy").unwrap().unwrap();
    let engine = CaptureEngine::new(Arc::new(store));

    let runner = StubRunner::new(vec![("Good", Scripted::Output("free 3.2"))]);
    let result = engine.capture_with_runner(&target, &runner).await.unwrap();

    // Sub-result count and order track the declared command list
    assert_eq!(result.sub_results.len(), 3);
    assert!(!result.sub_results[0].passed);
    assert!(result.sub_results[0].message.contains("not found"));
    assert!(!result.sub_results[1].passed);
    assert!(result.sub_results[1].message.contains("no response parser"));
    assert!(result.sub_results[2].passed);
    assert_eq!(result.metrics.len(), 1);
}

// A store whose command lookups fail outright, as opposed to not-found
struct BrokenStore {
    profile: ServerProfile,
}

impl ConfigStore for BrokenStore {
    fn find_server_profile(&self, name: &str) -> ConfigResult<Option<ServerProfile>> {
        if name == self.profile.name {
            Ok(Some(self.profile.clone()))
        } else {
            Ok(None)
        }
    }

    fn find_command(&self, _name: &str) -> ConfigResult<Option<Command>> {
        Err(ConfigError::StoreUnavailable("backing file vanished".to_string()))
    }

    fn find_response_parser(&self, _command_name: &str) -> ConfigResult<Option<ResponseParser>> {
        Err(ConfigError::StoreUnavailable("backing file vanished".to_string()))
    }
}

#[tokio::test]
async fn store_read_failure_aborts_whole_capture() {
    let target = profile("localhost-linux", "localhost", &["MemoryCheck"]);
    let engine = CaptureEngine::new(Arc::new(BrokenStore {
        profile: target.clone(),
    }));
    let runner = StubRunner::new(vec![]);

    let error = engine
        .capture_with_runner(&target, &runner)
        .await
        .unwrap_err();
    assert!(matches!(error, metron_capture::CaptureError::Store(_)));
}
