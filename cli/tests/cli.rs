use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command isolated from the caller's config files and API keys
fn sandloop(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sandloop").unwrap();
    cmd.current_dir(dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join("xdg"))
        .env_remove("API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env_remove("ANTHROPIC_API_KEY")
        .env_remove("SANDLOOP_PROTOCOL")
        .env_remove("MAX_STEPS")
        .env_remove("SANDBOX_BACKEND")
        .env_remove("SANDBOX_IMAGE")
        .env_remove("BASE_URL")
        .env_remove("MODEL_NAME");
    cmd
}

#[test]
fn tools_lists_catalog() {
    let dir = TempDir::new().unwrap();
    sandloop(&dir)
        .arg("tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("execute_command"))
        .stdout(predicate::str::contains("run_code"))
        .stdout(predicate::str::contains("list_files"));
}

#[test]
fn self_test_passes() {
    let dir = TempDir::new().unwrap();
    sandloop(&dir)
        .arg("test")
        .assert()
        .success()
        .stdout(predicate::str::contains("All self-test checks passed"));
}

#[test]
fn mock_run_in_memory_sandbox() {
    let dir = TempDir::new().unwrap();
    let transcript = dir.path().join("out").join("transcript.json");

    sandloop(&dir)
        .args(["--protocol", "mock", "--api-key", "unused", "--backend", "memory"])
        .arg("--transcript-file")
        .arg(&transcript)
        .arg("say hello")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mock response: say hello"))
        .stdout(predicate::str::contains("tool_exhausted"));

    let saved = std::fs::read_to_string(&transcript).unwrap();
    assert!(saved.contains("\"role\": \"assistant\""));
}

#[test]
fn task_file_drives_run() {
    let dir = TempDir::new().unwrap();
    let task = dir.path().join("task.json");
    std::fs::write(
        &task,
        r#"{"name": "greet", "goal": "greet the user", "max_steps": 2}"#,
    )
    .unwrap();

    sandloop(&dir)
        .args(["--protocol", "mock", "--api-key", "unused", "--backend", "memory"])
        .arg("--task-file")
        .arg(&task)
        .assert()
        .success()
        .stdout(predicate::str::contains("Mock response: greet the user"));
}

#[test]
fn yaml_task_file_rejected() {
    let dir = TempDir::new().unwrap();
    let task = dir.path().join("task.yaml");
    std::fs::write(&task, "name: greet\n").unwrap();

    sandloop(&dir)
        .args(["--protocol", "mock", "--api-key", "unused", "--backend", "memory"])
        .arg("--task-file")
        .arg(&task)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported file format"));
}

#[test]
fn missing_configuration_fails() {
    let dir = TempDir::new().unwrap();
    sandloop(&dir)
        .arg("do something")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No configuration found"));
}

#[test]
fn no_task_is_an_error() {
    let dir = TempDir::new().unwrap();
    sandloop(&dir).assert().failure();
}
