//! Integration tests for the `stevedore` binary entry point.
//!
//! None of these need a container runtime: the runtime binary is pointed at a
//! path that does not exist, which the probe reports as unavailable.

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::str::contains;
use tempfile::TempDir;

fn offline_command(project: &TempDir, subcommand: Option<&str>) -> assert_cmd::Command {
    let mut command = cargo_bin_cmd!("stevedore");
    command
        .env_remove("STEVEDORE_CONFIG_PATH")
        .arg("--project-dir")
        .arg(project.path())
        .args(["--docker-binary", "/nonexistent/stevedore-test-docker"])
        .args(["--endpoint", "tcp://127.0.0.1:1"])
        .args(["--readiness-timeout-secs", "1"])
        .args(["--log-filter", "off"]);
    if let Some(subcommand) = subcommand {
        command.arg(subcommand);
    }
    command
}

#[test]
fn help_lists_subcommands() {
    let mut command = cargo_bin_cmd!("stevedore");
    command.arg("--help");
    command
        .assert()
        .success()
        .stdout(contains("status"))
        .stdout(contains("reconcile"));
}

#[test]
fn unknown_subcommand_exits_with_usage_error() {
    let mut command = cargo_bin_cmd!("stevedore");
    command.arg("deploy");
    command
        .assert()
        .code(2)
        .stderr(contains("unrecognized subcommand"));
}

#[test]
fn unsupported_endpoint_scheme_fails_configuration() {
    let mut command = cargo_bin_cmd!("stevedore");
    command.env("STEVEDORE_ENDPOINT", "unix:///tmp/mem0.sock").arg("status");
    command
        .assert()
        .failure()
        .stderr(contains("failed to load configuration"));
}

#[test]
fn missing_runtime_defers_reconciliation() {
    let project = TempDir::new().expect("temp dir");
    offline_command(&project, None)
        .assert()
        .success()
        .stdout(contains("observed:   indeterminate"))
        .stdout(contains("no action taken"))
        .stdout(contains("containers: unknown (runtime unavailable"))
        .stdout(contains("file not found"));
}

#[test]
fn status_reports_env_file_and_hints() {
    let project = TempDir::new().expect("temp dir");
    std::fs::write(
        project.path().join(".env"),
        "LLM_API_KEY=your-openai-api-key-here\n",
    )
    .expect("write env file");
    offline_command(&project, Some("status"))
        .assert()
        .success()
        .stdout(contains("stevedore status summary"))
        .stdout(contains("LLM_API_KEY still holds the template placeholder"))
        .stdout(contains("tcp://127.0.0.1:1 not reachable"))
        .stdout(contains("logs:       docker compose logs -f"));
}
