use assert_cmd::Command;
use ndarray::array;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

use featnorm::features::HtkFile;
use featnorm::storage::{DirectoryStore, RecordStore};

const MANIFEST: &str = r#"
[[speakers]]
name = "S01"
features = "S01.htk"

[[speakers.utterances]]
id = "0001"
start = 0
end = 2

[[speakers.utterances]]
id = "0002"
start = 2
end = 4

[[speakers]]
name = "S02"
features = "S02.htk"

[[speakers.utterances]]
id = "0001"
start = 0
end = 3
"#;

fn write_corpus(dir: &Path) {
    HtkFile::new(array![[1.0f32, 2.0], [3.0, 4.0], [5.0, 7.0], [7.0, 6.0]])
        .unwrap()
        .save_to_file(dir.join("S01.htk"))
        .unwrap();
    HtkFile::new(array![[2.0f32, 1.0], [4.0, 9.0], [0.0, 3.0]])
        .unwrap()
        .save_to_file(dir.join("S02.htk"))
        .unwrap();
    std::fs::write(dir.join("manifest.toml"), MANIFEST).unwrap();
}

fn featnorm() -> Command {
    Command::cargo_bin("featnorm").unwrap()
}

#[test]
fn test_training_run_writes_outputs() {
    let temp_dir = TempDir::new().unwrap();
    write_corpus(temp_dir.path());
    let out = temp_dir.path().join("train");

    featnorm()
        .arg("--manifest").arg(temp_dir.path().join("manifest.toml"))
        .arg("--output").arg(&out)
        .args(["--training", "--workers", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Processing Complete"))
        .stdout(predicate::str::contains("Utterances: 3"));

    assert!(out.join("S01/S01_0001.htk").exists());
    assert!(out.join("S01/S01_0002.htk").exists());
    assert!(out.join("S02/S02_0001.htk").exists());
    assert!(out.join("frame_num.toml").exists());

    let statistics = DirectoryStore::new(&out).load_statistics().unwrap().unwrap();
    assert_eq!(statistics.require("global").unwrap().frame_count, 7);
}

#[test]
fn test_evaluation_without_statistics_fails() {
    let temp_dir = TempDir::new().unwrap();
    write_corpus(temp_dir.path());
    let out = temp_dir.path().join("eval");

    featnorm()
        .arg("--manifest").arg(temp_dir.path().join("manifest.toml"))
        .arg("--output").arg(&out)
        .args(["--workers", "1"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Missing statistics"));

    assert!(!out.join("frame_num.toml").exists());
    assert!(!out.join("S01").exists());
}

#[test]
fn test_evaluation_reuses_training_statistics() {
    let temp_dir = TempDir::new().unwrap();
    write_corpus(temp_dir.path());
    let manifest = temp_dir.path().join("manifest.toml");
    let train = temp_dir.path().join("train");
    let eval = temp_dir.path().join("eval");

    featnorm()
        .arg("--manifest").arg(&manifest)
        .arg("--output").arg(&train)
        .args(["--training", "--workers", "1"])
        .assert()
        .success();

    featnorm()
        .arg("--manifest").arg(&manifest)
        .arg("--output").arg(&eval)
        .arg("--statistics").arg(&train)
        .args(["--workers", "1"])
        .assert()
        .success();

    let trained = DirectoryStore::new(&train).read_matrix("S02", "S02_0001").unwrap();
    let evaluated = DirectoryStore::new(&eval).read_matrix("S02", "S02_0001").unwrap();
    assert_eq!(trained, evaluated);
    assert!(!eval.join("statistics.toml").exists());
}

#[test]
fn test_speaker_mode_needs_no_statistics() {
    let temp_dir = TempDir::new().unwrap();
    write_corpus(temp_dir.path());
    let out = temp_dir.path().join("out");

    featnorm()
        .arg("--manifest").arg(temp_dir.path().join("manifest.toml"))
        .arg("--output").arg(&out)
        .args(["--mode", "speaker", "--workers", "1"])
        .assert()
        .success();

    assert!(out.join("S01/S01_0002.htk").exists());
    assert!(!out.join("statistics.toml").exists());
}

#[test]
fn test_missing_manifest() {
    featnorm()
        .args(["--manifest", "/nonexistent/manifest.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Manifest does not exist"));
}
