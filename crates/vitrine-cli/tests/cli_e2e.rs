#![allow(deprecated)]

use assert_cmd::cargo::cargo_bin;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

struct Project {
    temp: TempDir,
}

impl Project {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("global")).unwrap();
        fs::write(
            temp.path().join("vitrine.toml"),
            "record_backend = \"json\"\n",
        )
        .unwrap();
        Self { temp }
    }

    fn root(&self) -> &Path {
        self.temp.path()
    }

    fn upload(&self, relative: &str, bytes: &[u8]) {
        let path = self.root().join("uploads").join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, bytes).unwrap();
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(cargo_bin("vitrine"));
        cmd.current_dir(self.root())
            .env("VITRINE_CONFIG_DIR", self.root().join("global"))
            .env("NO_COLOR", "1")
            .env_remove("VITRINE_LOG");
        cmd
    }
}

#[test]
fn test_version() {
    let project = Project::new();
    project
        .cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("vitrine v"));
}

#[test]
fn test_config_shows_project_settings() {
    let project = Project::new();
    project
        .cmd()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("record_backend = \"json\""))
        .stdout(predicate::str::contains("vitrine.toml"));
}

#[test]
fn test_doctor_then_repair_registers_orphans() {
    let project = Project::new();
    project.upload("stores/4/front.jpg", b"jpeg");

    project
        .cmd()
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("unregistered file stores/4/front.jpg"));

    project
        .cmd()
        .args(["repair", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would apply"));
    assert!(!project.root().join("records.json").exists());

    project
        .cmd()
        .arg("repair")
        .assert()
        .success()
        .stdout(predicate::str::contains("All records consistent."));

    project
        .cmd()
        .arg("repair")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to repair."));

    let output = project
        .cmd()
        .args(["resolve", "store:4", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let data: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(data["outcome"], "file");
    assert_eq!(data["relative"], "stores/4/front.jpg");
}

#[test]
fn test_promote_switches_primary() {
    let project = Project::new();
    project.upload("stores/4/a.jpg", b"a");
    project.upload("stores/4/b.jpg", b"b");
    project.cmd().arg("repair").assert().success();

    // Orphans register in name order: a.jpg primary (s1), b.jpg (s2).
    project
        .cmd()
        .args(["promote", "s2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("s2 is now the primary image of store:4"));

    let output = project
        .cmd()
        .args(["resolve", "store:4", "--json"])
        .output()
        .unwrap();
    let data: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(data["relative"], "stores/4/b.jpg");
}

#[test]
fn test_guard_forbids_traversal() {
    let project = Project::new();
    project
        .cmd()
        .args(["guard", "/uploads/../vitrine.toml"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("forbidden"));

    project
        .cmd()
        .args(["guard", "/uploads/stores/4/missing.jpg"])
        .assert()
        .success()
        .stdout(predicate::str::contains("placeholder"));
}

#[test]
fn test_unknown_owner_is_an_error() {
    let project = Project::new();
    project
        .cmd()
        .args(["resolve", "shop:1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid owner"));
}

#[test]
fn test_uploads_override() {
    let project = Project::new();
    let media = project.root().join("media");
    fs::create_dir_all(media.join("stores/9")).unwrap();
    fs::write(media.join("stores/9/x.png"), b"png").unwrap();

    project
        .cmd()
        .args(["route", "/uploads/stores/9/x.png", "--uploads", "media"])
        .assert()
        .success()
        .stdout(predicate::str::contains("image/png"));
}

#[test]
fn test_cascade_json_trace() {
    let project = Project::new();
    project.upload("stores/3/a.jpg", b"jpeg");

    let output = project
        .cmd()
        .args(["cascade", "/media/a.jpg", "--owner", "store:3", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let data: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(data["result"]["settled"], "loaded");
}
