//! CLI integration tests for reel-post
//!
//! None of these reach the network: the config points ffprobe at a binary
//! that does not exist, so every platform fails validation before upload.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Helper to escape path for TOML on Windows
fn escape_path_for_toml(path: &str) -> String {
    path.replace('\\', "\\\\")
}

struct TestEnv {
    _dir: TempDir,
    config: PathBuf,
    video: PathBuf,
}

fn setup_test_env(extra_toml: &str) -> TestEnv {
    let dir = TempDir::new().unwrap();

    let video = dir.path().join("short.mp4");
    fs::write(&video, b"not really a video").unwrap();

    let config = dir.path().join("config.toml");
    let content = format!(
        r#"
[video]
ffprobe_path = "{}"

[youtube]
token_file = "{}"

[instagram]
token_file = "{}"
{}
"#,
        escape_path_for_toml(&dir.path().join("no-ffprobe").to_string_lossy()),
        escape_path_for_toml(&dir.path().join("youtube.json").to_string_lossy()),
        escape_path_for_toml(&dir.path().join("instagram.json").to_string_lossy()),
        extra_toml
    );
    fs::write(&config, content).unwrap();

    TestEnv {
        _dir: dir,
        config,
        video,
    }
}

fn reel_post(env: &TestEnv) -> Command {
    let mut cmd = Command::cargo_bin("reel-post").unwrap();
    cmd.env_remove("REELCAST_MAX_ATTEMPTS")
        .env_remove("REELCAST_UPLOAD_TIMEOUT")
        .env_remove("REELCAST_MAX_DURATION_YOUTUBE")
        .env_remove("REELCAST_MAX_DURATION_INSTAGRAM")
        .env_remove("REELCAST_MAX_FILE_SIZE")
        .arg("--config")
        .arg(&env.config)
        .arg("--video-source")
        .arg(&env.video);
    cmd
}

#[test]
fn test_help_flag_output() {
    Command::cargo_bin("reel-post")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("YouTube Shorts and Instagram Reels"))
        .stdout(predicate::str::contains("--video-source"))
        .stdout(predicate::str::contains("--platforms"))
        .stdout(predicate::str::contains("--schedule-time"))
        .stdout(predicate::str::contains("EXIT CODES"));
}

#[test]
fn test_missing_video_is_invalid_input() {
    let env = setup_test_env("");
    Command::cargo_bin("reel-post")
        .unwrap()
        .arg("--config")
        .arg(&env.config)
        .args(["--video-source", "/definitely/not/here.mp4", "--title", "T"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Video file not found"));
}

#[test]
fn test_unknown_platform_is_invalid_input() {
    let env = setup_test_env("");
    reel_post(&env)
        .args(["--title", "T", "--platforms", "youtube,tiktok"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown platform 'tiktok'"));
}

#[test]
fn test_bad_schedule_time_is_invalid_input() {
    let env = setup_test_env("");
    reel_post(&env)
        .args(["--title", "T", "--schedule-time", "tomorrow"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("--schedule-time"));
}

#[test]
fn test_bad_privacy_is_invalid_input() {
    let env = setup_test_env("");
    reel_post(&env)
        .args(["--title", "T", "--privacy", "secret"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid privacy"));
}

#[test]
fn test_empty_title_is_invalid_input() {
    let env = setup_test_env("");
    reel_post(&env)
        .args(["--title", "   "])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Title cannot be empty"));
}

#[test]
fn test_invalid_config_fails() {
    let env = setup_test_env("");
    fs::write(&env.config, "[youtube]\nchunk_size = 1000\n").unwrap();

    reel_post(&env)
        .args(["--title", "T"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("youtube.chunk_size"));
}

#[test]
fn test_disabled_platform_only() {
    let env = setup_test_env("enabled = false\n");
    reel_post(&env)
        .args(["--title", "T", "--platforms", "instagram"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("None of the requested platforms is enabled"));
}

#[test]
fn test_check_reports_probe_failure() {
    let env = setup_test_env("");
    reel_post(&env)
        .args(["--title", "T", "--check"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("youtube: Could not read video properties"))
        .stdout(predicate::str::contains("instagram: Could not read video properties"));
}

#[test]
fn test_validation_failures_as_json() {
    let env = setup_test_env("");
    let output = reel_post(&env)
        .args(["--title", "T", "--format", "json"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));

    let results: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["platform"], "youtube");
    assert_eq!(results[1]["platform"], "instagram");
    for result in results {
        assert_eq!(result["success"], false);
        assert_eq!(result["error_kind"], "validation");
        assert_eq!(result["attempts"], 0);
    }
}

#[test]
fn test_platform_order_follows_request() {
    let env = setup_test_env("");
    reel_post(&env)
        .args(["--title", "T", "--platforms", "instagram,youtube"])
        .assert()
        .code(1)
        .stdout(predicate::str::is_match(r"(?s)^instagram: failed \[validation\].*\nyoutube: failed").unwrap());
}

#[test]
fn test_connection_without_tokens_needs_no_video() {
    let env = setup_test_env("");
    Command::cargo_bin("reel-post")
        .unwrap()
        .arg("--config")
        .arg(&env.config)
        .arg("--test-connection")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("youtube: not connected"))
        .stdout(predicate::str::contains("instagram: not connected"));
}

#[test]
fn test_video_source_required_for_upload() {
    Command::cargo_bin("reel-post")
        .unwrap()
        .args(["--title", "T"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--video-source"));
}
