//! Managed Process - one external client per account, with output draining
//!
//! - environment-parameterized spawn (`<program> [script] connect`)
//! - stdout/stderr drained into tracing (tagged per account) and a ring buffer
//! - non-blocking liveness via `try_wait`
//! - graceful stop with hard-kill escalation; drain tasks are joined on teardown

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command as TokioCommand};
use tokio::task::JoinHandle;

use super::error::SupervisorError;
use super::process;
use crate::accounts::{AccountConfig, AccountKey};
use crate::utils::current_timestamp;

const OUTPUT_BUFFER_LINES: usize = 500;
const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// How the client binary is launched. The account only contributes environment.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// Checked for existence before spawning
    pub script: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn from_config(cfg: &crate::config::GlobalConfig) -> Self {
        let script = cfg.client.script.as_ref().map(|s| cfg.resolve(s));
        let args = script
            .iter()
            .map(|s| s.to_string_lossy().to_string())
            .collect();
        Self {
            program: cfg.client.program.clone(),
            args,
            working_dir: cfg.project_dir.clone(),
            script,
        }
    }
}

// ─── Output ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A single line of client output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLine {
    pub id: u64,
    pub timestamp: u64,
    pub stream: OutputStream,
    pub content: String,
}

struct OutputBuffer {
    lines: VecDeque<OutputLine>,
    next_id: u64,
}

impl OutputBuffer {
    fn new() -> Self {
        Self {
            lines: VecDeque::with_capacity(OUTPUT_BUFFER_LINES),
            next_id: 0,
        }
    }

    fn push(&mut self, stream: OutputStream, content: String) {
        let line = OutputLine {
            id: self.next_id,
            timestamp: current_timestamp(),
            stream,
            content,
        };
        self.next_id += 1;
        if self.lines.len() >= OUTPUT_BUFFER_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn recent(&self, count: usize) -> Vec<OutputLine> {
        let skip = self.lines.len().saturating_sub(count);
        self.lines.iter().skip(skip).cloned().collect()
    }
}

// ─── Managed Process ─────────────────────────────────────────

/// A client process owned by the supervisor.
pub struct ManagedProcess {
    account: AccountKey,
    child: Child,
    pub pid: u32,
    pub started_at: u64,
    exit_code: Option<i32>,
    exited: bool,
    drains: Vec<JoinHandle<()>>,
    output: Arc<Mutex<OutputBuffer>>,
}

impl ManagedProcess {
    /// Launch the client for `account` with its connection environment.
    pub fn spawn(spec: &LaunchSpec, key: AccountKey, account: &AccountConfig) -> Result<Self, SupervisorError> {
        if let Some(script) = &spec.script {
            if !script.exists() {
                return Err(SupervisorError::DependencyMissing(format!(
                    "client script not found: {}",
                    script.display()
                )));
            }
        }

        let mut cmd = TokioCommand::new(&spec.program);
        cmd.args(&spec.args)
            .arg("connect")
            .current_dir(&spec.working_dir)
            .envs(account.environment())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        crate::utils::apply_creation_flags(&mut cmd);

        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SupervisorError::DependencyMissing(format!("'{}' is not installed", spec.program))
            } else {
                SupervisorError::SpawnFailed(format!("'{}': {}", spec.program, e))
            }
        })?;

        let pid = child
            .id()
            .ok_or_else(|| SupervisorError::SpawnFailed("process exited before reporting a PID".to_string()))?;

        let output = Arc::new(Mutex::new(OutputBuffer::new()));
        let tag = key.to_string();

        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(spawn_drain(stdout, OutputStream::Stdout, tag.clone(), output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(spawn_drain(stderr, OutputStream::Stderr, tag.clone(), output.clone()));
        }

        tracing::info!("[{}] Client process started with PID {}", tag, pid);

        Ok(Self {
            account: key,
            child,
            pid,
            started_at: current_timestamp(),
            exit_code: None,
            exited: false,
            drains,
            output,
        })
    }

    pub fn account(&self) -> &AccountKey {
        &self.account
    }

    /// Alive iff the OS has not reported an exit. Never blocks.
    pub fn is_alive(&mut self) -> bool {
        if self.exited {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.record_exit(status);
                false
            }
            Err(e) => {
                tracing::warn!("[{}] Failed to poll process {}: {}", self.account, self.pid, e);
                false
            }
        }
    }

    /// Last-known exit code; `None` while running or when killed by a signal.
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn uptime_secs(&self) -> u64 {
        current_timestamp().saturating_sub(self.started_at)
    }

    /// Graceful stop, then hard kill after `grace`. Terminating an exited
    /// process is a no-op. Output drains are finished before returning.
    pub async fn terminate(&mut self, grace: Duration) {
        if self.is_alive() {
            tracing::info!("[{}] Stopping client (pid: {})", self.account, self.pid);
            if let Err(e) = process::request_stop_async(self.pid).await {
                tracing::debug!("[{}] Graceful stop request failed: {}", self.account, e);
            }

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => self.record_exit(status),
                Ok(Err(e)) => tracing::warn!("[{}] Failed to wait for client: {}", self.account, e),
                Err(_) => {
                    tracing::warn!(
                        "[{}] Client did not exit within {}s, killing",
                        self.account,
                        grace.as_secs()
                    );
                    if let Err(e) = self.child.kill().await {
                        tracing::error!("[{}] Failed to kill client {}: {}", self.account, self.pid, e);
                    }
                    if let Ok(Some(status)) = self.child.try_wait() {
                        self.record_exit(status);
                    }
                    self.exited = true;
                }
            }
        }
        self.finish_drains().await;
    }

    pub fn recent_output(&self, count: usize) -> Vec<OutputLine> {
        match self.output.lock() {
            Ok(buf) => buf.recent(count),
            Err(poisoned) => poisoned.into_inner().recent(count),
        }
    }

    fn record_exit(&mut self, status: std::process::ExitStatus) {
        if !self.exited {
            tracing::info!("[{}] Client exited with {}", self.account, status);
        }
        self.exited = true;
        self.exit_code = status.code();
    }

    /// Drains end on EOF once the process is gone; anything still holding the
    /// pipe open past the timeout is aborted.
    async fn finish_drains(&mut self) {
        for handle in self.drains.drain(..) {
            let abort = handle.abort_handle();
            if tokio::time::timeout(DRAIN_JOIN_TIMEOUT, handle).await.is_err() {
                abort.abort();
            }
        }
    }
}

impl Drop for ManagedProcess {
    fn drop(&mut self) {
        // kill_on_drop covers the child; drains must not outlive the handle
        for handle in &self.drains {
            handle.abort();
        }
    }
}

fn spawn_drain<R>(
    reader: R,
    stream: OutputStream,
    tag: String,
    buffer: Arc<Mutex<OutputBuffer>>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    match stream {
                        OutputStream::Stdout => tracing::info!(target: "client", account = %tag, "{}", line),
                        OutputStream::Stderr => tracing::warn!(target: "client", account = %tag, "{}", line),
                    }
                    match buffer.lock() {
                        Ok(mut buf) => buf.push(stream, line),
                        Err(poisoned) => poisoned.into_inner().push(stream, line),
                    };
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("[{}] Output stream closed: {}", tag, e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::ConnectionDefaults;

    fn sh_spec(dir: &std::path::Path, script: &str) -> LaunchSpec {
        LaunchSpec {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "client".to_string()],
            working_dir: dir.to_path_buf(),
            script: None,
        }
    }

    fn account(name: &str) -> AccountConfig {
        AccountConfig {
            username: name.to_string(),
            password: "pw".to_string(),
            ..test_defaults()
        }
    }

    fn test_defaults() -> AccountConfig {
        let d = ConnectionDefaults::default();
        AccountConfig {
            username: String::new(),
            password: String::new(),
            host: d.host,
            port: d.port,
            client_type: d.client_type,
            protocol_version: d.protocol_version,
            auth_mode: d.auth_mode,
        }
    }

    #[test]
    fn test_output_buffer_ring() {
        let mut buffer = OutputBuffer::new();
        for i in 0..(OUTPUT_BUFFER_LINES + 10) {
            buffer.push(OutputStream::Stdout, format!("line {}", i));
        }
        assert_eq!(buffer.lines.len(), OUTPUT_BUFFER_LINES);
        let recent = buffer.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content, format!("line {}", OUTPUT_BUFFER_LINES + 9));
    }

    #[tokio::test]
    async fn test_missing_script_is_dependency_missing() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LaunchSpec {
            program: "node".into(),
            args: vec![],
            working_dir: dir.path().to_path_buf(),
            script: Some(dir.path().join("minecraft_client.js")),
        };
        let result = ManagedProcess::spawn(&spec, AccountKey::Main, &account("Main"));
        assert!(matches!(result, Err(SupervisorError::DependencyMissing(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_dependency_missing() {
        let dir = tempfile::tempdir().unwrap();
        let spec = LaunchSpec {
            program: "/nonexistent/bin/client-binary".into(),
            args: vec![],
            working_dir: dir.path().to_path_buf(),
            script: None,
        };
        let result = ManagedProcess::spawn(&spec, AccountKey::Main, &account("Main"));
        assert!(matches!(result, Err(SupervisorError::DependencyMissing(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_output_drained_with_account_environment() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh_spec(dir.path(), r#"echo "hello $MINECRAFT_USERNAME $1"; echo oops >&2"#);
        let mut proc = ManagedProcess::spawn(&spec, AccountKey::Afk("Afk1".into()), &account("Afk1")).unwrap();

        for _ in 0..50 {
            if !proc.is_alive() && proc.recent_output(10).len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let output = proc.recent_output(10);
        assert!(output
            .iter()
            .any(|l| l.stream == OutputStream::Stdout && l.content == "hello Afk1 connect"));
        assert!(output.iter().any(|l| l.stream == OutputStream::Stderr && l.content == "oops"));
        assert_eq!(proc.exit_code(), Some(0));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let spec = sh_spec(dir.path(), "sleep 30");
        let mut proc = ManagedProcess::spawn(&spec, AccountKey::Main, &account("Main")).unwrap();
        assert!(proc.is_alive());

        proc.terminate(Duration::from_secs(5)).await;
        assert!(!proc.is_alive());
        // second terminate on an exited handle is a no-op
        proc.terminate(Duration::from_secs(5)).await;
        assert!(!proc.is_alive());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_escalates_to_kill() {
        let dir = tempfile::tempdir().unwrap();
        // ignores SIGTERM
        let spec = sh_spec(dir.path(), "trap '' TERM; while true; do sleep 1; done");
        let mut proc = ManagedProcess::spawn(&spec, AccountKey::Main, &account("Main")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        proc.terminate(Duration::from_millis(300)).await;
        assert!(!proc.is_alive());
        assert_eq!(proc.exit_code(), None);
    }
}
