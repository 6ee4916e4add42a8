//! Script Sandbox
//!
//! Runs one script invocation under a restricted regime:
//! - Arguments screened by [`InputValidator::is_safe_string`]
//! - Path allow/deny lists (deny wins) and optional digest pinning
//! - Explicit argv, never a shell
//! - Cleared environment plus a fixed contract (`NLC_*` variables)
//! - Hard timeout with SIGKILL
//! - Per-stream output caps
//! - Optional throwaway working directory
//!
//! # Security Model
//!
//! This is hygiene, not isolation. There are no namespaces, cgroups or memory
//! limits; `NLC_NO_NETWORK` is advisory for the script.
//!
//! Invocation states:
//!
//! ```text
//! Pending → Validating → Rejected
//!                      → Spawned → Completed | TimedOut | SpawnError
//! ```
//!
//! A failed wait on a spawned child ends in `SpawnError`.

use super::script_config::ScriptConfig;
use super::validator::InputValidator;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default per-stream output cap (1 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Variables owned by the sandbox; scripts and callers cannot set them
const RESERVED_ENV: &[&str] = &[
    "NLC_SCRIPT_ID",
    "NLC_SCRIPT_NAME",
    "NLC_SANDBOX",
    "NLC_NO_NETWORK",
    "NLC_WRITE_DIRS",
];

/// Sandbox configuration
#[derive(Debug, Clone, Serialize)]
pub struct SandboxConfig {
    /// Scripts must live under one of these
    pub allowed_paths: Vec<PathBuf>,
    /// Checked before `allowed_paths`; `~` is expanded
    pub denied_paths: Vec<PathBuf>,
    /// Force `NLC_NO_NETWORK=1` for every script
    pub network_disabled: bool,
    /// Cap per stream (stdout and stderr each)
    pub max_output_bytes: usize,
    /// Run each invocation in a fresh temp directory
    pub use_temp_work_dir: bool,
    /// Used when a script config carries no timeout
    pub default_timeout_ms: u64,
    /// How long output readers may keep going after exit or kill
    pub reader_grace_ms: u64,
    /// Refuse scripts whose content changed since load
    pub verify_digests: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            allowed_paths: vec![std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))],
            denied_paths: default_denied_paths(),
            network_disabled: false,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            use_temp_work_dir: false,
            default_timeout_ms: super::script_config::DEFAULT_SCRIPT_TIMEOUT_MS,
            reader_grace_ms: 500,
            verify_digests: true,
        }
    }
}

impl SandboxConfig {
    /// Default regime with scripts confined to `root`
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_paths: vec![root.into()],
            ..Default::default()
        }
    }

    /// Strict sandbox - no network, temp working dir, small outputs
    pub fn strict(root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_paths: vec![root.into()],
            denied_paths: default_denied_paths(),
            network_disabled: true,
            max_output_bytes: 64 * 1024, // 64 KB
            use_temp_work_dir: true,
            default_timeout_ms: 3000,
            reader_grace_ms: 200,
            verify_digests: true,
        }
    }
}

fn default_denied_paths() -> Vec<PathBuf> {
    ["/etc", "~/.ssh"].iter().map(PathBuf::from).collect()
}

/// Per-call options
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub timeout_ms: Option<u64>,
    /// Working directory; defaults to the script's base directory
    pub cwd: Option<PathBuf>,
}

impl ExecuteOptions {
    pub fn with_args<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }
}

/// Terminal state of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptOutcome {
    Rejected,
    Completed,
    TimedOut,
    SpawnError,
}

/// Sandbox execution result
#[derive(Debug, Clone, Serialize)]
pub struct ScriptResult {
    /// Exit status 0 and not timed out
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// None if killed, rejected or never spawned
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    /// Some output was dropped by the cap
    pub truncated: bool,
    pub error: Option<String>,
    pub outcome: ScriptOutcome,
    /// Temp working dir used (already removed)
    pub temp_work_dir: Option<String>,
}

impl ScriptResult {
    fn failed(outcome: ScriptOutcome, error: String, start: Instant) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            duration_ms: start.elapsed().as_millis() as u64,
            timed_out: false,
            truncated: false,
            error: Some(error),
            outcome,
            temp_work_dir: None,
        }
    }
}

/// Anything that can run a script config
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, config: &ScriptConfig, options: ExecuteOptions) -> ScriptResult;
}

/// Invocation counters
#[derive(Debug, Default)]
pub struct SandboxStats {
    spawned: AtomicU64,
    rejected: AtomicU64,
    timed_out: AtomicU64,
}

/// Point-in-time copy of [`SandboxStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SandboxStatsSnapshot {
    pub spawned: u64,
    pub rejected: u64,
    pub timed_out: u64,
}

impl SandboxStats {
    pub fn snapshot(&self) -> SandboxStatsSnapshot {
        SandboxStatsSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
        }
    }
}

/// Output collected from one stream, bounded by `limit`
#[derive(Debug)]
struct CappedBuffer {
    data: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CappedBuffer {
    fn new(limit: usize) -> Self {
        Self {
            data: Vec::new(),
            limit,
            truncated: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.data.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.data.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn into_text(self) -> (String, bool) {
        let text = String::from_utf8_lossy(&self.data);
        (clamp_to(text.trim(), self.limit).to_string(), self.truncated)
    }
}

/// Longest prefix of `s` that fits in `limit` bytes without splitting a char
fn clamp_to(s: &str, limit: usize) -> &str {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Keep reading until EOF so the child never blocks on a full pipe;
/// bytes past the cap are dropped.
fn spawn_reader<R>(mut stream: R, sink: Arc<Mutex<CappedBuffer>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 8192];
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().push(&buf[..n]),
            }
        }
    })
}

async fn finish_reader(mut task: JoinHandle<()>, deadline: tokio::time::Instant) {
    if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
        // A grandchild still holds the pipe open
        task.abort();
    }
}

/// Map the wait on a spawned child to its terminal state; `None` means it timed out
fn settle(
    waited: Option<std::io::Result<ExitStatus>>,
    timeout_ms: u64,
) -> (Option<ExitStatus>, ScriptOutcome, Option<String>) {
    match waited {
        Some(Ok(status)) => (Some(status), ScriptOutcome::Completed, None),
        Some(Err(e)) => (
            None,
            ScriptOutcome::SpawnError,
            Some(format!("Failed to wait for script: {}", e)),
        ),
        None => (
            None,
            ScriptOutcome::TimedOut,
            Some(format!("Script timed out after {}ms", timeout_ms)),
        ),
    }
}

fn take_buffer(sink: Arc<Mutex<CappedBuffer>>) -> (String, bool) {
    let buffer = std::mem::replace(&mut *sink.lock(), CappedBuffer::new(0));
    buffer.into_text()
}

/// Expand `~` and canonicalize when the path exists
fn normalize_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    let expanded = PathBuf::from(shellexpand::tilde(&raw).as_ref());
    std::fs::canonicalize(&expanded).unwrap_or(expanded)
}

/// Script sandbox executor
pub struct ScriptSandbox {
    config: SandboxConfig,
    stats: SandboxStats,
}

impl ScriptSandbox {
    /// Create new sandbox with config
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            stats: SandboxStats::default(),
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn stats(&self) -> SandboxStatsSnapshot {
        self.stats.snapshot()
    }

    /// Deny list first, then allow list
    pub fn is_path_allowed(&self, path: &Path) -> bool {
        let path = normalize_path(path);
        if self
            .config
            .denied_paths
            .iter()
            .any(|denied| path.starts_with(normalize_path(denied)))
        {
            return false;
        }
        self.config
            .allowed_paths
            .iter()
            .any(|allowed| path.starts_with(normalize_path(allowed)))
    }

    /// Everything that must hold before a process is spawned
    async fn preflight(&self, config: &ScriptConfig, options: &ExecuteOptions) -> Result<PathBuf, String> {
        if let Some(arg) = options.args.iter().find(|a| !InputValidator::is_safe_string(a)) {
            let preview: String = arg.chars().take(50).collect();
            return Err(format!("Argument contains unsafe characters: {}", preview));
        }

        let script_path = std::fs::canonicalize(config.resolved_path())
            .map_err(|e| format!("Script not found: {} ({})", config.path, e))?;

        if !self.is_path_allowed(&script_path) {
            return Err(format!("Script path is not allowed: {}", script_path.display()));
        }

        if self.config.verify_digests {
            if let Some(expected) = &config.digest {
                let bytes = tokio::fs::read(&script_path)
                    .await
                    .map_err(|e| format!("Failed to read script {}: {}", config.path, e))?;
                let actual = hex::encode(Sha256::digest(&bytes));
                if &actual != expected {
                    return Err(format!("Script {} changed since it was loaded", config.id));
                }
            }
        }

        Ok(script_path)
    }

    fn build_env(&self, config: &ScriptConfig, options: &ExecuteOptions) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        for key in ["PATH", "HOME", "USER"] {
            env.insert(key.to_string(), std::env::var(key).unwrap_or_default());
        }
        env.insert(
            "LANG".to_string(),
            std::env::var("LANG").unwrap_or_else(|_| "en_US.UTF-8".to_string()),
        );
        env.insert("TERM".to_string(), "dumb".to_string());

        let caller_env = config.env.iter().chain(options.env.iter());
        for (key, value) in caller_env {
            if RESERVED_ENV.contains(&key.as_str()) {
                debug!("Ignoring reserved variable {} for script {}", key, config.id);
                continue;
            }
            env.insert(key.clone(), value.clone());
        }

        env.insert("NLC_SANDBOX".to_string(), "1".to_string());
        if config.allow_write && !config.write_directories.is_empty() {
            let dirs: Vec<String> = config
                .resolved_write_directories()
                .iter()
                .map(|d| d.display().to_string())
                .collect();
            env.insert("NLC_WRITE_DIRS".to_string(), dirs.join(":"));
        }
        if self.config.network_disabled || !config.allow_network {
            env.insert("NLC_NO_NETWORK".to_string(), "1".to_string());
        }
        env.insert("NLC_SCRIPT_ID".to_string(), config.id.clone());
        env.insert("NLC_SCRIPT_NAME".to_string(), config.name.clone());
        env
    }

    /// Execute a script config in the sandbox. Never returns an error:
    /// every failure is described by the result.
    pub async fn execute(&self, config: &ScriptConfig, options: ExecuteOptions) -> ScriptResult {
        let start = Instant::now();
        let invocation = uuid::Uuid::new_v4();

        let script_path = match self.preflight(config, &options).await {
            Ok(p) => p,
            Err(reason) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Rejected script '{}': {}", config.id, reason);
                return ScriptResult::failed(ScriptOutcome::Rejected, reason, start);
            }
        };

        // Removed on drop, whatever path we leave by
        let temp_dir = if self.config.use_temp_work_dir {
            match tempfile::Builder::new().prefix("nlc-sandbox-").tempdir() {
                Ok(dir) => Some(dir),
                Err(e) => {
                    return ScriptResult::failed(
                        ScriptOutcome::SpawnError,
                        format!("Failed to create temp working dir: {}", e),
                        start,
                    )
                }
            }
        } else {
            None
        };
        let temp_work_dir = temp_dir.as_ref().map(|d| d.path().display().to_string());

        let timeout_ms = options
            .timeout_ms
            .or(Some(config.timeout_ms).filter(|t| *t > 0))
            .unwrap_or(self.config.default_timeout_ms);
        let interpreter = config.interpreter.resolve_for(&script_path);
        let env = self.build_env(config, &options);
        let cwd = temp_dir
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .or_else(|| options.cwd.clone())
            .unwrap_or_else(|| config.base_dir.clone());

        debug!(
            "Sandbox {} running '{}' via {} with {} args (timeout {}ms)",
            invocation,
            config.id,
            interpreter,
            options.args.len(),
            timeout_ms
        );

        let mut cmd = Command::new(interpreter.program());
        cmd.arg(&script_path)
            .args(&options.args)
            .env_clear()
            .envs(&env)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to spawn {} for '{}': {}", interpreter, config.id, e);
                let mut result = ScriptResult::failed(
                    ScriptOutcome::SpawnError,
                    format!("Failed to spawn {}: {}", interpreter.program(), e),
                    start,
                );
                result.temp_work_dir = temp_work_dir;
                return result;
            }
        };
        self.stats.spawned.fetch_add(1, Ordering::Relaxed);

        let stdout_buf = Arc::new(Mutex::new(CappedBuffer::new(self.config.max_output_bytes)));
        let stderr_buf = Arc::new(Mutex::new(CappedBuffer::new(self.config.max_output_bytes)));
        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|s| spawn_reader(s, stdout_buf.clone())),
            child.stderr.take().map(|s| spawn_reader(s, stderr_buf.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        let waited = tokio::time::timeout(Duration::from_millis(timeout_ms), child.wait()).await;
        let waited = match waited {
            Ok(result) => Some(result),
            Err(_) => {
                // Timeout - kill the process
                let _ = child.kill().await;
                self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
                warn!("Script '{}' timed out after {}ms", config.id, timeout_ms);
                None
            }
        };
        let (status, outcome, error) = settle(waited, timeout_ms);
        let timed_out = outcome == ScriptOutcome::TimedOut;

        // stdout and stderr share one grace window
        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.config.reader_grace_ms);
        for reader in readers {
            finish_reader(reader, deadline).await;
        }

        let (stdout, out_truncated) = take_buffer(stdout_buf);
        let (stderr, err_truncated) = take_buffer(stderr_buf);
        let exit_code = status.and_then(|s| s.code());
        let success = status.map(|s| s.success()).unwrap_or(false);

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Script '{}' finished: success={} exit={:?} {}ms",
            config.id, success, exit_code, duration_ms
        );

        drop(temp_dir);

        ScriptResult {
            success,
            stdout,
            stderr,
            exit_code,
            duration_ms,
            timed_out,
            truncated: out_truncated || err_truncated,
            error,
            outcome,
            temp_work_dir,
        }
    }
}

#[async_trait]
impl ScriptRunner for ScriptSandbox {
    async fn run(&self, config: &ScriptConfig, options: ExecuteOptions) -> ScriptResult {
        self.execute(config, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> ScriptConfig {
        std::fs::write(dir.path().join(name), body).unwrap();
        ScriptConfig::new(name.trim_end_matches(".sh"), "Test Script", name, dir.path())
    }

    #[test]
    fn test_capped_buffer() {
        let mut buf = CappedBuffer::new(4);
        buf.push(b"ab");
        buf.push(b"cdef");
        assert!(buf.truncated);
        let (text, truncated) = buf.into_text();
        assert_eq!(text, "abcd");
        assert!(truncated);
    }

    #[test]
    fn test_settle_outcomes() {
        use std::os::unix::process::ExitStatusExt;

        let (status, outcome, error) = settle(Some(Ok(ExitStatus::from_raw(0))), 100);
        assert_eq!(status.and_then(|s| s.code()), Some(0));
        assert_eq!(outcome, ScriptOutcome::Completed);
        assert!(error.is_none());

        let (status, outcome, error) = settle(Some(Err(std::io::Error::other("no child"))), 100);
        assert!(status.is_none());
        assert_eq!(outcome, ScriptOutcome::SpawnError);
        assert_eq!(error.as_deref(), Some("Failed to wait for script: no child"));

        let (_, outcome, error) = settle(None, 100);
        assert_eq!(outcome, ScriptOutcome::TimedOut);
        assert_eq!(error.as_deref(), Some("Script timed out after 100ms"));
    }

    #[test]
    fn test_clamp_to_char_boundary() {
        assert_eq!(clamp_to("héllo", 2), "h");
        assert_eq!(clamp_to("héllo", 3), "hé");
        assert_eq!(clamp_to("abc", 10), "abc");
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let dir = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig {
            allowed_paths: vec![dir.path().to_path_buf()],
            denied_paths: vec![dir.path().join("private")],
            ..Default::default()
        });
        std::fs::create_dir(dir.path().join("private")).unwrap();

        assert!(sandbox.is_path_allowed(&dir.path().join("ok.sh")));
        assert!(!sandbox.is_path_allowed(&dir.path().join("private/x.sh")));
        assert!(!sandbox.is_path_allowed(Path::new("/usr/bin/env")));
    }

    #[tokio::test]
    async fn test_execute_echo() {
        let dir = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
        let config = script(&dir, "hello.sh", "echo \"hello $1\"\n");

        let result = sandbox.execute(&config, ExecuteOptions::with_args(["world"])).await;
        assert!(result.success);
        assert_eq!(result.outcome, ScriptOutcome::Completed);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout, "hello world");
        assert_eq!(sandbox.stats().spawned, 1);
    }

    #[tokio::test]
    async fn test_unsafe_args_never_spawn() {
        let dir = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
        let config = script(&dir, "noop.sh", "echo ran\n");

        for arg in ["a; rm -rf /", "`id`", "$(id)", "../secret"] {
            let result = sandbox.execute(&config, ExecuteOptions::with_args([arg])).await;
            assert!(!result.success);
            assert_eq!(result.outcome, ScriptOutcome::Rejected);
        }
        let stats = sandbox.stats();
        assert_eq!(stats.spawned, 0);
        assert_eq!(stats.rejected, 4);
    }

    #[tokio::test]
    async fn test_environment_is_isolated() {
        std::env::set_var("NLC_SANDBOX_TEST_LEAK", "leaked");
        let dir = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig {
            network_disabled: true,
            ..SandboxConfig::for_root(dir.path())
        });
        let config = script(
            &dir,
            "env.sh",
            "echo \"$NLC_SCRIPT_ID|$NLC_SCRIPT_NAME|$NLC_NO_NETWORK|${NLC_SANDBOX_TEST_LEAK:-none}|$TERM|$EXTRA\"\n",
        )
        .with_env("EXTRA", "from-config");

        let options = ExecuteOptions::default().env("NLC_SCRIPT_ID", "spoofed");
        let result = sandbox.execute(&config, options).await;
        assert!(result.success, "{:?}", result);
        assert_eq!(result.stdout, "env|Test Script|1|none|dumb|from-config");
    }

    #[tokio::test]
    async fn test_write_dirs_exported() {
        let dir = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
        let config = script(&dir, "w.sh", "echo \"$NLC_WRITE_DIRS\"\n").with_write_directories(&["out"]);

        let result = sandbox.execute(&config, ExecuteOptions::default()).await;
        assert_eq!(result.stdout, dir.path().join("out").display().to_string());
    }

    #[tokio::test]
    async fn test_script_outside_allowed_paths() {
        let allowed = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig::for_root(allowed.path()));
        let config = script(&other, "x.sh", "echo hi\n");

        let result = sandbox.execute(&config, ExecuteOptions::default()).await;
        assert_eq!(result.outcome, ScriptOutcome::Rejected);
        assert_eq!(sandbox.stats().spawned, 0);
    }

    #[tokio::test]
    async fn test_digest_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
        let config = script(&dir, "d.sh", "echo one\n").with_digest(&"0".repeat(64));

        let result = sandbox.execute(&config, ExecuteOptions::default()).await;
        assert_eq!(result.outcome, ScriptOutcome::Rejected);
        assert!(result.error.unwrap().contains("changed"));
    }

    #[tokio::test]
    async fn test_temp_work_dir_removed() {
        let dir = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig {
            use_temp_work_dir: true,
            ..SandboxConfig::for_root(dir.path())
        });
        let config = script(&dir, "pwd.sh", "pwd\n");

        let result = sandbox.execute(&config, ExecuteOptions::default()).await;
        assert!(result.success);
        let work_dir = result.temp_work_dir.unwrap();
        assert!(work_dir.contains("nlc-sandbox-"));
        assert!(result.stdout.contains("nlc-sandbox-"));
        assert!(!Path::new(&work_dir).exists());
    }

    #[tokio::test]
    async fn test_nonzero_exit() {
        let dir = TempDir::new().unwrap();
        let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
        let config = script(&dir, "fail.sh", "echo oops >&2\nexit 3\n");

        let result = sandbox.execute(&config, ExecuteOptions::default()).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, Some(3));
        assert_eq!(result.stderr, "oops");
        assert!(!result.timed_out);
    }
}
