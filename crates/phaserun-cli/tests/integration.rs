#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn phaserun(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("phaserun").unwrap();
    cmd.current_dir(dir.path())
        .env("PHASERUN_ROOT", dir.path())
        .env_remove("PHASERUN_ENDPOINT");
    cmd
}

fn init_project(dir: &TempDir) {
    phaserun(dir).args(["init", "--name", "demo"]).assert().success();
}

fn write_plan(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("plan.json");
    std::fs::write(
        &path,
        r#"{"phases": [
            {"number": 1, "title": "Scaffold"},
            {"number": 2, "title": "Schema"}
        ]}"#,
    )
    .unwrap();
    path
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().unwrap();
    serde_json::from_slice(&output.stdout).unwrap()
}

const SSE_DONE: &str = "data: {\"content\":\"generated\"}\n\ndata: {\"done\":true}\n\n";

// ---------------------------------------------------------------------------
// phaserun init
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_checkpoint_dir() {
    let dir = TempDir::new().unwrap();
    phaserun(&dir)
        .args(["init", "--name", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .phaserun/config.yaml"));

    assert!(dir.path().join(".phaserun/checkpoints").is_dir());
    let config = std::fs::read_to_string(dir.path().join(".phaserun/config.yaml")).unwrap();
    assert!(config.contains("name: demo"));
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".phaserun/config.yaml"),
        "project:\n  name: edited\n",
    )
    .unwrap();

    phaserun(&dir)
        .args(["init", "--name", "other"])
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));
    let config = std::fs::read_to_string(dir.path().join(".phaserun/config.yaml")).unwrap();
    assert!(config.contains("edited"), "existing config is left alone");
}

#[test]
fn commands_before_init_point_at_init() {
    let dir = TempDir::new().unwrap();
    phaserun(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("phaserun init"));
}

// ---------------------------------------------------------------------------
// phaserun config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_accepts_defaults() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    phaserun(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_rejects_bad_endpoint() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    std::fs::write(
        dir.path().join(".phaserun/config.yaml"),
        "project:\n  name: demo\nbackend:\n  endpoint: ftp://nowhere\n",
    )
    .unwrap();
    phaserun(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_show_json_fills_defaults() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let config = json_stdout(phaserun(&dir).args(["--json", "config", "show"]));
    assert_eq!(config["project"]["name"], "demo");
    assert_eq!(config["execution"]["concurrency"], 3);
}

// ---------------------------------------------------------------------------
// phaserun run / resume
// ---------------------------------------------------------------------------

#[test]
fn run_streams_every_phase_and_checkpoints() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let plan = write_plan(&dir);

    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/execute")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(SSE_DONE)
        .expect(2)
        .create();
    let endpoint = format!("{}/execute", server.url());

    let result = json_stdout(phaserun(&dir).args([
        "--json",
        "--endpoint",
        &endpoint,
        "run",
        "--plan",
        plan.to_str().unwrap(),
    ]));
    mock.assert();

    assert_eq!(result["report"]["complete"], serde_json::json!([1, 2]));
    assert_eq!(result["phases"][0]["status"], "complete");
    assert_eq!(result["phases"][0]["output"], "generated");
    assert_eq!(result["checkpoint"]["name"], "run");

    let list = json_stdout(phaserun(&dir).args(["--json", "checkpoint", "list"]));
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["project_name"], "demo");
}

#[test]
fn run_against_unreachable_backend_fails_with_resume_hint() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let plan = write_plan(&dir);

    phaserun(&dir)
        .args(["--endpoint", "http://127.0.0.1:1/execute", "run", "--plan"])
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 phase(s) failed"))
        .stderr(predicate::str::contains("phaserun resume"));

    // the failed run is still checkpointed
    let list = json_stdout(phaserun(&dir).args(["--json", "checkpoint", "list"]));
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[test]
fn run_rejects_plan_without_phases() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let plan = dir.path().join("plan.json");
    std::fs::write(&plan, r#"{"phases": []}"#).unwrap();

    phaserun(&dir)
        .args(["run", "--plan"])
        .arg(&plan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid plan"));
}

#[test]
fn resume_reruns_only_unfinished_phases() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let plan = write_plan(&dir);

    phaserun(&dir)
        .args(["--endpoint", "http://127.0.0.1:1/execute", "run", "--plan"])
        .arg(&plan)
        .assert()
        .failure();
    let list = json_stdout(phaserun(&dir).args(["--json", "checkpoint", "list"]));
    let id = list[0]["id"].as_str().unwrap().to_string();

    let mut server = mockito::Server::new();
    let mock = server
        .mock("POST", "/execute")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(SSE_DONE)
        .expect(2)
        .create();
    let endpoint = format!("{}/execute", server.url());

    let result = json_stdout(phaserun(&dir).args([
        "--json",
        "--endpoint",
        &endpoint,
        "resume",
        &id,
    ]));
    mock.assert();
    assert_eq!(result["report"]["complete"], serde_json::json!([1, 2]));
    assert_eq!(result["checkpoint"]["name"], "resume");

    // everything is complete now, so another resume starts nothing
    let done_id = result["checkpoint"]["id"].as_str().unwrap().to_string();
    let again = json_stdout(phaserun(&dir).args([
        "--json",
        "--endpoint",
        "http://127.0.0.1:1/execute",
        "resume",
        &done_id,
    ]));
    assert_eq!(again["report"]["started"], serde_json::json!([]));
    assert_eq!(again["phases"][1]["output"], "generated");
}

#[test]
fn resume_unknown_checkpoint_fails() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    phaserun(&dir)
        .args(["resume", "not-a-checkpoint"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("checkpoint not found"));
}

// ---------------------------------------------------------------------------
// phaserun checkpoint
// ---------------------------------------------------------------------------

#[test]
fn checkpoint_list_empty() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    phaserun(&dir)
        .args(["checkpoint", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No checkpoints."));
}

#[test]
fn checkpoint_show_and_delete() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    let plan = write_plan(&dir);
    phaserun(&dir)
        .args(["--endpoint", "http://127.0.0.1:1/execute", "run", "--plan"])
        .arg(&plan)
        .arg("--checkpoint")
        .arg("first-try")
        .assert()
        .failure();

    let list = json_stdout(phaserun(&dir).args(["--json", "checkpoint", "list"]));
    let id = list[0]["id"].as_str().unwrap().to_string();
    assert_eq!(list[0]["name"], "first-try");

    phaserun(&dir)
        .args(["checkpoint", "show", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("Scaffold"))
        .stdout(predicate::str::contains("failed"));

    phaserun(&dir)
        .args(["checkpoint", "delete", &id])
        .assert()
        .success();
    phaserun(&dir)
        .args(["checkpoint", "show", &id])
        .assert()
        .failure();
}
