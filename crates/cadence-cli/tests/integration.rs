#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn cadence(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cadence").unwrap();
    cmd.current_dir(dir.path()).env("CADENCE_ROOT", dir.path());
    cmd
}

fn init_project(dir: &TempDir) {
    cadence(dir).args(["init", "--name", "demo"]).assert().success();
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let out = cmd.arg("--json").assert().success().get_output().stdout.clone();
    serde_json::from_slice(&out).unwrap()
}

// ---------------------------------------------------------------------------
// cadence init / config
// ---------------------------------------------------------------------------

#[test]
fn init_creates_config_and_content() {
    let dir = TempDir::new().unwrap();
    cadence(&dir)
        .args(["init", "--name", "demo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created: .cadence/config.yaml"));

    assert!(dir.path().join(".cadence/config.yaml").exists());
    assert!(dir.path().join(".cadence/content.yaml").exists());

    cadence(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:  .cadence/config.yaml"));
}

#[test]
fn commands_fail_before_init() {
    let dir = TempDir::new().unwrap();
    cadence(&dir)
        .args(["release", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn config_show_and_validate() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    let config = json_output(cadence(&dir).args(["config", "show"]));
    assert_eq!(config["project"]["name"], "demo");
    assert_eq!(config["releases"]["max_pending_releases"], 3);

    cadence(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

// ---------------------------------------------------------------------------
// cadence release / action
// ---------------------------------------------------------------------------

#[test]
fn release_publish_flow() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);

    let created = json_output(cadence(&dir).args(["release", "create", "Spring Launch"]));
    let id = created["id"].as_u64().unwrap().to_string();
    assert_eq!(created["status"], "empty");

    cadence(&dir)
        .args([
            "action",
            "add",
            &id,
            "--content-type",
            "api::article.article",
            "--entry-id",
            "1",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added action"));

    cadence(&dir)
        .args(["release", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Spring Launch").and(predicate::str::contains("ready")));

    let published = json_output(cadence(&dir).args(["release", "publish", &id]));
    assert_eq!(published["release"]["status"], "done");
    assert_eq!(published["meta"]["totalPublishedEntries"], 1);

    cadence(&dir)
        .args(["release", "publish", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Release already published"));
}

#[test]
fn duplicate_entry_is_rejected() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    cadence(&dir).args(["release", "create", "A"]).assert().success();

    let add = ["action", "add", "1", "--content-type", "api::article.article", "--entry-id", "1"];
    cadence(&dir).args(add).assert().success();
    cadence(&dir)
        .args(add)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists in release with id 1"));
}

#[test]
fn pending_release_limit_applies_offline() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    for name in ["a", "b", "c"] {
        cadence(&dir).args(["release", "create", name]).assert().success();
    }
    cadence(&dir)
        .args(["release", "create", "d"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("maximum number of pending releases"));
}

#[test]
fn update_reschedules_and_delete_removes() {
    let dir = TempDir::new().unwrap();
    init_project(&dir);
    cadence(&dir).args(["release", "create", "Later"]).assert().success();

    let at = (chrono::Utc::now() + chrono::Duration::days(1)).to_rfc3339();
    let updated = json_output(cadence(&dir).args([
        "release",
        "update",
        "1",
        "--scheduled-at",
        &at,
        "--timezone",
        "Europe/Paris",
    ]));
    assert_eq!(updated["name"], "Later");
    assert_eq!(updated["timezone"], "Europe/Paris");

    let cleared = json_output(cadence(&dir).args(["release", "update", "1", "--unschedule"]));
    assert!(cleared["scheduledAt"].is_null());

    cadence(&dir).args(["release", "delete", "1"]).assert().success();
    cadence(&dir)
        .args(["release", "show", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No release found for id 1"));
}
