mod common;

use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use common::write_script;
use predicates::prelude::*;
use std::process::Command;

const TOP_UP: &str = r#"{"cmd":"top_up","actor":"ani","amount":100000,"reference":"trf-1"}"#;

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("script.jsonl");
    write_script(&script, &[TOP_UP]).unwrap();

    let mut cmd = Command::new(cargo_bin!("niaga"));
    cmd.arg(&script).arg("--db-path").arg(dir.path().join("some_db"));

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."))
        .stdout(predicate::str::contains("ani,100000"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("script.jsonl");
    write_script(&script, &[TOP_UP]).unwrap();

    let mut cmd = Command::new(cargo_bin!("niaga"));
    cmd.arg(&script).arg("--db-path").arg(dir.path().join("test_db"));

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back").not());
}
