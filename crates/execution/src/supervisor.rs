//! Worker supervision
//!
//! Spawns the external worker for an admitted execution, relays its output
//! into the registry, and resolves its exit. The process is one completion
//! path of two; every terminal transition taken here goes through the
//! registry's guard, so a webhook that finished the execution first always
//! wins and the process exit degrades to a no-op.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ocb_core::agent::{build_instructions, AgentProfile};
use ocb_core::task::TaskSpec;

use crate::error::{ExecutionError, Result};
use crate::record::{ExecutionStatus, LogKind};
use crate::registry::ExecutionRegistry;

/// Characters of stderr kept for the failure detail.
const STDERR_TAIL: usize = 2000;

/// Configuration for spawning the worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker executable name or path.
    pub program: String,
    /// Externally reachable origin of this dashboard, embedded in the
    /// instruction payload as the callback target.
    pub callback_base: String,
    /// Wall-clock budget when the agent profile does not override it.
    pub default_timeout_secs: u64,
    /// Hard ceiling on any per-agent override.
    pub max_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: "openclaw".to_string(),
            callback_base: "http://localhost:8080".to_string(),
            default_timeout_secs: 300,
            max_timeout_secs: 600,
        }
    }
}

impl WorkerConfig {
    fn effective_timeout(&self, profile: &AgentProfile) -> u64 {
        let requested = if profile.default_timeout_secs > 0 {
            profile.default_timeout_secs
        } else {
            self.default_timeout_secs
        };
        requested.min(self.max_timeout_secs)
    }
}

/// Spawns and watches worker processes, one per execution.
pub struct WorkerSupervisor {
    registry: Arc<ExecutionRegistry>,
    config: WorkerConfig,
    /// Kill switches for in-flight workers, removed when the process is reaped.
    kill_switches: Mutex<HashMap<Uuid, mpsc::Sender<()>>>,
}

impl WorkerSupervisor {
    pub fn new(registry: Arc<ExecutionRegistry>, config: WorkerConfig) -> Self {
        Self {
            registry,
            config,
            kill_switches: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Number of workers currently being supervised.
    pub fn supervised_count(&self) -> usize {
        self.kill_switches.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Launch the worker for an admitted (pending) execution.
    ///
    /// Returns immediately; everything that happens to the worker from here
    /// on is reported through the execution record and the event bus.
    pub fn launch(self: &Arc<Self>, execution_id: Uuid, task: TaskSpec, profile: &'static AgentProfile) {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            supervisor.supervise(execution_id, task, profile).await;
        });
    }

    /// Signal the worker for this execution to be killed. Returns false when
    /// no worker is being supervised for it.
    pub fn abort(&self, execution_id: Uuid) -> bool {
        let switch = {
            let mut switches = self.kill_switches.lock().unwrap_or_else(|e| e.into_inner());
            switches.remove(&execution_id)
        };
        match switch {
            Some(tx) => {
                let _ = tx.try_send(());
                true
            }
            None => false,
        }
    }

    async fn supervise(&self, execution_id: Uuid, task: TaskSpec, profile: &'static AgentProfile) {
        // A cancel may land between admission and here; the guard turns the
        // whole launch into a no-op and no process is ever spawned.
        if self
            .registry
            .set_status(execution_id, ExecutionStatus::Starting)
            .is_err()
        {
            debug!(execution_id = %execution_id, "launch skipped, execution no longer pending");
            return;
        }

        let timeout_secs = self.config.effective_timeout(profile);
        let prompt =
            build_instructions(profile, &task, &execution_id.to_string(), &self.config.callback_base);

        let _ = self.registry.append_log(
            execution_id,
            LogKind::System,
            &format!("Spawning {} worker (agent: {})...", self.config.program, profile.id),
            None,
        );

        let (mut child, stdout, stderr) = match self.spawn_worker(&prompt, profile.id, timeout_secs)
        {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(execution_id = %execution_id, "{}", e);
                let _ = self.registry.fail(execution_id, &e.to_string());
                return;
            }
        };

        let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
        {
            let mut switches = self.kill_switches.lock().unwrap_or_else(|e| e.into_inner());
            switches.insert(execution_id, kill_tx);
        }

        if self
            .registry
            .set_status(execution_id, ExecutionStatus::Running)
            .is_err()
        {
            // Cancelled while spawning; reap the process and walk away.
            let _ = child.kill().await;
            self.forget(execution_id);
            return;
        }
        info!(execution_id = %execution_id, agent = profile.id, "worker running");

        let stderr_tail = Arc::new(Mutex::new(String::new()));

        let stdout_task = {
            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                let mut buffer = String::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    buffer.push_str(&line);
                    buffer.push('\n');
                    // Best-effort fallback: the webhook is the authoritative
                    // progress path, so a scraped value only ever raises.
                    if let Some(value) = scan_progress(&buffer) {
                        let current = registry.get(execution_id).map(|r| r.progress);
                        if current.map(|p| value > p).unwrap_or(false) {
                            let _ = registry.update_progress(execution_id, value, None);
                        }
                    }
                }
            })
        };

        let stderr_task = {
            let registry = Arc::clone(&self.registry);
            let tail = Arc::clone(&stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    {
                        let mut tail = tail.lock().unwrap_or_else(|e| e.into_inner());
                        tail.push_str(trimmed);
                        tail.push('\n');
                        if tail.len() > STDERR_TAIL {
                            let mut cut = tail.len() - STDERR_TAIL;
                            while !tail.is_char_boundary(cut) {
                                cut += 1;
                            }
                            tail.drain(..cut);
                        }
                    }
                    // Worker diagnostics, not failure signals.
                    let _ = registry.append_log(execution_id, LogKind::Info, trimmed, None);
                }
            })
        };

        enum Outcome {
            Exited(std::io::Result<std::process::ExitStatus>),
            TimedOut,
            Killed,
        }

        // No select arm touches the child; its wait-future must be dropped
        // before kill() can borrow it again below.
        let outcome = tokio::select! {
            waited = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait()) => {
                match waited {
                    Ok(status) => Outcome::Exited(status),
                    Err(_) => Outcome::TimedOut,
                }
            }
            _ = kill_rx.recv() => Outcome::Killed,
        };

        if matches!(outcome, Outcome::TimedOut | Outcome::Killed) {
            // kill() also reaps the child.
            let _ = child.kill().await;
        }

        // Let the pipes drain before reading the stderr tail.
        let _ = stdout_task.await;
        let _ = stderr_task.await;
        self.forget(execution_id);

        match outcome {
            Outcome::Exited(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                let tail = stderr_tail.lock().unwrap_or_else(|e| e.into_inner());
                let detail = tail.trim();
                let _ = self.registry.resolve_exit(
                    execution_id,
                    code,
                    (!detail.is_empty()).then_some(detail),
                );
            }
            Outcome::Exited(Err(e)) => {
                warn!(execution_id = %execution_id, "failed waiting on worker: {}", e);
                let _ = self
                    .registry
                    .fail(execution_id, &format!("Failed waiting on worker: {}", e));
            }
            Outcome::TimedOut => {
                warn!(execution_id = %execution_id, timeout_secs, "worker timed out");
                let timeout = ExecutionError::Timeout {
                    seconds: timeout_secs,
                };
                let _ = self.registry.fail(execution_id, &timeout.to_string());
            }
            Outcome::Killed => {
                // The cancel path already moved the record; nothing to resolve.
                debug!(execution_id = %execution_id, "worker killed on request");
            }
        }
    }

    fn spawn_worker(
        &self,
        prompt: &str,
        agent_id: &str,
        timeout_secs: u64,
    ) -> Result<(Child, ChildStdout, ChildStderr)> {
        let mut child = Command::new(&self.config.program)
            .arg("agent")
            .arg("--message")
            .arg(prompt)
            .arg("--json")
            .arg("--agent")
            .arg(agent_id)
            .arg("--timeout")
            .arg(timeout_secs.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutionError::spawn_failed_with_source(
                    format!("Failed to spawn {}: {}", self.config.program, e),
                    e,
                )
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::spawn_failed("Failed to capture stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::spawn_failed("Failed to capture stderr"))?;

        Ok((child, stdout, stderr))
    }

    fn forget(&self, execution_id: Uuid) {
        let mut switches = self.kill_switches.lock().unwrap_or_else(|e| e.into_inner());
        switches.remove(&execution_id);
    }
}

/// Scan accumulated worker output for the newest valid `progress: <0-100>`
/// marker. Case-insensitive, tolerant of surrounding text; values out of
/// range are ignored.
fn scan_progress(output: &str) -> Option<u8> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| Regex::new(r"(?i)progress[:\s]+(\d{1,3})").unwrap());

    re.captures_iter(output)
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u16>().ok())
        .filter(|v| *v <= 100)
        .last()
        .map(|v| v as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocb_core::agent::profile_by_id;

    #[test]
    fn scan_progress_finds_marker_in_noise() {
        assert_eq!(scan_progress("[info] Progress: 45 (analysis)"), Some(45));
        assert_eq!(scan_progress("progress 80"), Some(80));
        assert_eq!(scan_progress("no marker here"), None);
    }

    #[test]
    fn scan_progress_prefers_latest_valid_value() {
        let output = "progress: 10\nsome text\nprogress: 60\nprogress: 400\n";
        assert_eq!(scan_progress(output), Some(60));
    }

    #[test]
    fn scan_progress_ignores_out_of_range() {
        assert_eq!(scan_progress("progress: 150"), None);
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use crate::registry::ExecutionRegistry;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        fn write_script(dir: &tempfile::TempDir, body: &str) -> String {
            let path = dir.path().join("worker.sh");
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "#!/bin/sh\n{}", body).unwrap();
            let mut perms = file.metadata().unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path.to_string_lossy().to_string()
        }

        fn setup(program: String, max_timeout_secs: u64) -> (Arc<ExecutionRegistry>, Arc<WorkerSupervisor>) {
            let registry = Arc::new(ExecutionRegistry::new());
            let supervisor = Arc::new(WorkerSupervisor::new(
                Arc::clone(&registry),
                WorkerConfig {
                    program,
                    max_timeout_secs,
                    ..WorkerConfig::default()
                },
            ));
            (registry, supervisor)
        }

        async fn wait_terminal(registry: &ExecutionRegistry, id: Uuid) -> ExecutionStatus {
            for _ in 0..100 {
                if let Some(record) = registry.get(id) {
                    if record.is_terminal() {
                        return record.status;
                    }
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            panic!("execution never reached a terminal state");
        }

        #[tokio::test]
        async fn missing_binary_fails_the_execution() {
            let (registry, supervisor) =
                setup("ocb-worker-that-does-not-exist".to_string(), 600);
            let record = registry.admit("task-1", false, 2).unwrap();

            supervisor.launch(record.id, TaskSpec::untitled("task-1"), profile_by_id("developer").unwrap());

            assert_eq!(wait_terminal(&registry, record.id).await, ExecutionStatus::Failed);
            let failed = registry.get(record.id).unwrap();
            assert!(failed.error.as_deref().unwrap().contains("Failed to spawn"));
        }

        #[tokio::test]
        async fn clean_exit_completes_a_running_execution() {
            let dir = tempfile::TempDir::new().unwrap();
            let script = write_script(&dir, "echo progress: 40\nexit 0");
            let (registry, supervisor) = setup(script, 600);
            let record = registry.admit("task-1", false, 2).unwrap();

            supervisor.launch(record.id, TaskSpec::untitled("task-1"), profile_by_id("developer").unwrap());

            assert_eq!(
                wait_terminal(&registry, record.id).await,
                ExecutionStatus::Completed
            );
            let done = registry.get(record.id).unwrap();
            assert_eq!(done.result.summary.as_deref(), Some("Worker process completed"));
            assert_eq!(done.progress, 100);
        }

        #[tokio::test]
        async fn nonzero_exit_fails_with_stderr_detail() {
            let dir = tempfile::TempDir::new().unwrap();
            let script = write_script(&dir, "echo 'missing credentials' >&2\nexit 3");
            let (registry, supervisor) = setup(script, 600);
            let record = registry.admit("task-1", false, 2).unwrap();

            supervisor.launch(record.id, TaskSpec::untitled("task-1"), profile_by_id("qa").unwrap());

            assert_eq!(wait_terminal(&registry, record.id).await, ExecutionStatus::Failed);
            let failed = registry.get(record.id).unwrap();
            assert!(failed.error.as_deref().unwrap().contains("missing credentials"));
            // stderr also landed as an info log
            assert!(failed
                .logs
                .iter()
                .any(|l| l.kind == LogKind::Info && l.message.contains("missing credentials")));
        }

        #[tokio::test]
        async fn wall_clock_timeout_kills_and_fails() {
            let dir = tempfile::TempDir::new().unwrap();
            let script = write_script(&dir, "sleep 30");
            let (registry, supervisor) = setup(script, 1);
            let record = registry.admit("task-1", false, 2).unwrap();

            supervisor.launch(record.id, TaskSpec::untitled("task-1"), profile_by_id("developer").unwrap());

            assert_eq!(wait_terminal(&registry, record.id).await, ExecutionStatus::Failed);
            let failed = registry.get(record.id).unwrap();
            assert!(failed.error.as_deref().unwrap().contains("timed out"));
        }

        #[tokio::test]
        async fn cancelled_pending_execution_never_spawns() {
            let dir = tempfile::TempDir::new().unwrap();
            let script = write_script(&dir, "exit 0");
            let (registry, supervisor) = setup(script, 600);
            let record = registry.admit("task-1", false, 2).unwrap();

            // Cancel before launch; the supervisor must bail at the guard.
            registry.cancel(record.id).unwrap();
            supervisor.launch(record.id, TaskSpec::untitled("task-1"), profile_by_id("developer").unwrap());

            tokio::time::sleep(Duration::from_millis(200)).await;
            let current = registry.get(record.id).unwrap();
            assert_eq!(current.status, ExecutionStatus::Cancelled);
            assert_eq!(supervisor.supervised_count(), 0);
        }

        #[tokio::test]
        async fn abort_kills_the_worker_without_a_second_transition() {
            let dir = tempfile::TempDir::new().unwrap();
            let script = write_script(&dir, "sleep 30");
            let (registry, supervisor) = setup(script, 600);
            let record = registry.admit("task-1", false, 2).unwrap();

            supervisor.launch(record.id, TaskSpec::untitled("task-1"), profile_by_id("developer").unwrap());

            // Wait for the worker to come up.
            for _ in 0..100 {
                if registry.get(record.id).unwrap().status == ExecutionStatus::Running {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }

            // Cancel flow: mark the record, then reap the process.
            registry.cancel(record.id).unwrap();
            assert!(supervisor.abort(record.id));

            for _ in 0..100 {
                if supervisor.supervised_count() == 0 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            assert_eq!(supervisor.supervised_count(), 0);
            assert_eq!(
                registry.get(record.id).unwrap().status,
                ExecutionStatus::Cancelled
            );
        }
    }
}
