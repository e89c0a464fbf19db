//! Integration tests for the offcache binary
//!
//! Drives the built binary against temporary cache directories.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use offcache::cache::CacheManager;
use tempfile::TempDir;

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_offcache"))
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("OFFCACHE_DIR")
        .output()
        .expect("Failed to execute offcache")
}

/// Helper to run the CLI against `dir`
fn run_in(dir: &Path, args: &[&str]) -> std::process::Output {
    let dir = dir.to_str().expect("Temp path should be UTF-8");
    let mut full = vec!["--dir", dir];
    full.extend_from_slice(args);
    run_cli(&full)
}

async fn populate(dir: &Path, key: &str, value: &str) {
    let cache = CacheManager::with_dir(dir).expect("Cache should open");
    cache
        .put(key, &value.to_string(), Duration::from_secs(3600))
        .await
        .expect("Put should succeed");
    cache.close().await.expect("Close should succeed");
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("offcache"), "Help should mention offcache");
    assert!(stdout.contains("fetch"), "Help should list the fetch command");
}

#[test]
fn test_missing_subcommand_fails() {
    let output = run_cli(&[]);
    assert!(!output.status.success());
}

#[test]
fn test_stats_on_empty_directory() {
    let temp_dir = TempDir::new().unwrap();

    let output = run_in(temp_dir.path(), &["stats"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("entries: 0"), "Unexpected output: {}", stdout);
    assert!(temp_dir.path().join("journal").exists());
}

#[test]
fn test_cache_dir_from_environment() {
    let temp_dir = TempDir::new().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_offcache"))
        .arg("stats")
        .env("OFFCACHE_DIR", temp_dir.path())
        .output()
        .expect("Failed to execute offcache");

    assert!(output.status.success());
    assert!(temp_dir.path().join("journal").exists());
}

#[tokio::test]
async fn test_stats_and_inspect_see_library_writes() {
    let temp_dir = TempDir::new().unwrap();
    populate(temp_dir.path(), "abc123", "hello").await;

    let stats = run_in(temp_dir.path(), &["stats"]);
    assert!(stats.status.success());
    let stdout = String::from_utf8_lossy(&stats.stdout);
    assert!(stdout.contains("entries: 1"), "Unexpected output: {}", stdout);

    let inspect = run_in(temp_dir.path(), &["inspect", "abc123"]);
    assert!(inspect.status.success());
    let stdout = String::from_utf8_lossy(&inspect.stdout);
    assert!(stdout.contains("key: abc123"));
    assert!(stdout.contains("max age: 3600s"));
}

#[tokio::test]
async fn test_clear_removes_entries() {
    let temp_dir = TempDir::new().unwrap();
    populate(temp_dir.path(), "abc123", "hello").await;

    let clear = run_in(temp_dir.path(), &["clear"]);
    assert!(clear.status.success());
    assert!(!temp_dir.path().join("abc123").exists());

    let stats = run_in(temp_dir.path(), &["stats"]);
    let stdout = String::from_utf8_lossy(&stats.stdout);
    assert!(stdout.contains("entries: 0"), "Unexpected output: {}", stdout);
}

#[test]
fn test_sweep_on_empty_directory() {
    let temp_dir = TempDir::new().unwrap();

    let output = run_in(temp_dir.path(), &["sweep"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("removed: 0"), "Unexpected output: {}", stdout);
}

#[tokio::test]
async fn test_sweep_reports_entries_expired_since_last_run() {
    let temp_dir = TempDir::new().unwrap();
    let cache = CacheManager::with_dir(temp_dir.path()).expect("Cache should open");
    cache
        .put("short", &1_u32, Duration::from_millis(1))
        .await
        .expect("Put should succeed");
    cache
        .put("long", &2_u32, Duration::from_secs(3600))
        .await
        .expect("Put should succeed");
    cache.close().await.expect("Close should succeed");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let output = run_in(temp_dir.path(), &["sweep"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("removed: 1"), "Unexpected output: {}", stdout);
    assert!(stdout.contains("entries: 1"), "Unexpected output: {}", stdout);
}

#[test]
fn test_inspect_unknown_key_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = run_in(temp_dir.path(), &["inspect", "deadbeef"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("No cache entry"),
        "Should report the missing key: {}",
        stderr
    );
}

#[test]
fn test_fetch_unreachable_url_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = run_in(temp_dir.path(), &["fetch", "http://127.0.0.1:9/"]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("HTTP request failed"), "Unexpected error: {}", stderr);
}

#[test]
fn test_fetch_rejects_short_offline_ttl() {
    let temp_dir = TempDir::new().unwrap();

    let output = run_in(
        temp_dir.path(),
        &["fetch", "http://127.0.0.1:9/", "--ttl", "600", "--offline-ttl", "60"],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid offline TTL"), "Unexpected error: {}", stderr);
}
