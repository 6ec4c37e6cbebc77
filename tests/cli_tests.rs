use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;

/// End-to-end tests for the `inspector` binary: argument handling, exit
/// codes and the error text callers match on.

#[test]
fn test_help_lists_transport_flags() -> Result<()> {
    Command::cargo_bin("inspector")?
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--transport"))
        .stdout(predicate::str::contains("--insecure"));
    Ok(())
}

#[test]
fn test_prints_construction_report() -> Result<()> {
    Command::cargo_bin("inspector")?
        .args(["--transport", "http", "-H", "A: B", "http://x"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"transport\": \"http\""))
        .stdout(predicate::str::contains("\"url\": \"http://x/\""));
    Ok(())
}

#[test]
fn test_missing_url_exit_code_and_message() -> Result<()> {
    let temp_dir = tempfile::TempDir::new()?;
    let config_path = temp_dir.path().join("mcp.json");
    std::fs::write(&config_path, r#"{"mcpServers": {"broken": {"type": "sse"}}}"#)?;

    Command::cargo_bin("inspector")?
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Error: Failed to create transport: URL must be provided for SSE or HTTP transport types.",
        ));
    Ok(())
}

#[test]
fn test_unsupported_type_from_config() -> Result<()> {
    let temp_dir = tempfile::TempDir::new()?;
    let config_path = temp_dir.path().join("mcp.json");
    std::fs::write(
        &config_path,
        r#"{"mcpServers": {"ws": {"type": "websocket", "url": "ws://localhost:1"}}}"#,
    )?;

    Command::cargo_bin("inspector")?
        .arg("--config")
        .arg(&config_path)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Unsupported transport type: websocket"));
    Ok(())
}

#[test]
fn test_invalid_header_rejected_by_parser() -> Result<()> {
    Command::cargo_bin("inspector")?
        .args(["-H", "no-colon", "http://x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 'Name: Value'"));
    Ok(())
}
