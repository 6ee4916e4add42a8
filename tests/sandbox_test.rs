//! Script Sandbox Integration Tests
//!
//! Runs real shell scripts written into temp dirs.

use nlc_skills::skills::{
    ExecuteOptions, SandboxConfig, ScriptConfig, ScriptConfigLoader, ScriptOutcome, ScriptSandbox,
};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn create_script(dir: &TempDir, name: &str, body: &str) -> ScriptConfig {
    std::fs::write(dir.path().join(name), body).expect("Failed to write script");
    ScriptConfig::new(name.trim_end_matches(".sh"), name, name, dir.path())
}

#[tokio::test]
async fn test_json_output() {
    let dir = TempDir::new().unwrap();
    let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
    let config = create_script(&dir, "status.sh", "printf '{\"status\":\"ok\"}'\n");

    let result = sandbox.execute(&config, ExecuteOptions::default()).await;
    assert!(result.success);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.stdout, r#"{"status":"ok"}"#);
    assert!(!result.timed_out);
}

#[tokio::test]
async fn test_timeout_kills_script() {
    let dir = TempDir::new().unwrap();
    let sandbox = ScriptSandbox::new(SandboxConfig {
        reader_grace_ms: 200,
        ..SandboxConfig::for_root(dir.path())
    });
    let config = create_script(&dir, "slow.sh", "echo started\nsleep 10\necho never\n").with_timeout_ms(300);

    let start = Instant::now();
    let result = sandbox.execute(&config, ExecuteOptions::default()).await;
    let elapsed = start.elapsed();

    assert!(result.timed_out);
    assert!(!result.success);
    assert_eq!(result.outcome, ScriptOutcome::TimedOut);
    assert!(!result.stdout.contains("never"));
    assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    assert_eq!(sandbox.stats().timed_out, 1);
}

#[tokio::test]
async fn test_timeout_holds_after_heavy_output() {
    let dir = TempDir::new().unwrap();
    let sandbox = ScriptSandbox::new(SandboxConfig {
        reader_grace_ms: 1000,
        ..SandboxConfig::for_root(dir.path())
    });
    // 3 MiB on each stream, then a sleep that keeps both pipes open
    let config = create_script(
        &dir,
        "chatty.sh",
        "head -c 3145728 /dev/zero | tr '\\0' 'x'\nhead -c 3145728 /dev/zero | tr '\\0' 'y' >&2\nsleep 10\n",
    )
    .with_timeout_ms(300);

    let start = Instant::now();
    let result = sandbox.execute(&config, ExecuteOptions::default()).await;
    let elapsed = start.elapsed();

    assert!(result.timed_out);
    assert_eq!(result.outcome, ScriptOutcome::TimedOut);
    assert!(result.truncated);
    assert!(result.stdout.len() <= 1024 * 1024);
    // timeout plus a single grace window, not one per stream
    assert!(elapsed < Duration::from_millis(2000), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_background_child_does_not_stall_result() {
    let dir = TempDir::new().unwrap();
    let sandbox = ScriptSandbox::new(SandboxConfig {
        reader_grace_ms: 1000,
        ..SandboxConfig::for_root(dir.path())
    });
    let config = create_script(&dir, "detach.sh", "sleep 5 &\necho done\n");

    let start = Instant::now();
    let result = sandbox.execute(&config, ExecuteOptions::default()).await;
    let elapsed = start.elapsed();

    assert!(result.success);
    assert_eq!(result.outcome, ScriptOutcome::Completed);
    assert_eq!(result.stdout, "done");
    assert!(elapsed < Duration::from_millis(1800), "took {:?}", elapsed);
}

#[tokio::test]
async fn test_call_timeout_overrides_config() {
    let dir = TempDir::new().unwrap();
    let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
    let config = create_script(&dir, "nap.sh", "sleep 5\n").with_timeout_ms(10_000);

    let result = sandbox
        .execute(&config, ExecuteOptions::default().timeout_ms(200))
        .await;
    assert!(result.timed_out);
    assert!(result.duration_ms < 3000);
}

#[tokio::test]
async fn test_large_output_is_capped() {
    let dir = TempDir::new().unwrap();
    let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
    // 2 MiB on stdout against the default 1 MiB cap
    let config = create_script(&dir, "flood.sh", "head -c 2097152 /dev/zero | tr '\\0' 'x'\n");

    let result = sandbox.execute(&config, ExecuteOptions::default()).await;
    assert!(result.success);
    assert_eq!(result.exit_code, Some(0));
    assert!(result.truncated);
    assert!(result.stdout.len() <= 1024 * 1024);
    assert!(result.stdout.len() > 1000);
}

#[tokio::test]
async fn test_unsafe_arguments_never_spawn() {
    let dir = TempDir::new().unwrap();
    let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
    let config = create_script(&dir, "echo.sh", "echo \"$@\"\n");

    for arg in ["a; rm -rf /", "`id`", "$(whoami)", "../../etc/passwd", "a | b"] {
        let result = sandbox.execute(&config, ExecuteOptions::with_args([arg])).await;
        assert!(!result.success, "accepted {}", arg);
        assert_eq!(result.outcome, ScriptOutcome::Rejected);
    }
    assert_eq!(sandbox.stats().spawned, 0);
    assert_eq!(sandbox.stats().rejected, 5);
}

#[tokio::test]
async fn test_modified_script_rejected_after_load() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("scripts.yaml"),
        "scripts:\n  - id: hello\n    name: Hello\n    path: hello.sh\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("hello.sh"), "echo hello\n").unwrap();

    let catalog = ScriptConfigLoader::new(dir.path()).load().await;
    assert!(catalog.success(), "{:?}", catalog.errors);
    let config = catalog.get("hello").unwrap().clone();
    assert!(config.digest.is_some());

    let sandbox = ScriptSandbox::new(SandboxConfig::for_root(dir.path()));
    let ok = sandbox.execute(&config, ExecuteOptions::default()).await;
    assert_eq!(ok.stdout, "hello");

    std::fs::write(dir.path().join("hello.sh"), "echo tampered\n").unwrap();
    let rejected = sandbox.execute(&config, ExecuteOptions::default()).await;
    assert!(!rejected.success);
    assert_eq!(rejected.outcome, ScriptOutcome::Rejected);
    assert_eq!(sandbox.stats().spawned, 1);
}
