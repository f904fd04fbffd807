//! End-to-end tests for the generate pipeline through the real binary.

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

const CONFIG: &str = r#"
[[rules]]
source_root = "aio"
dest_root = "sync"

[rules.replacements]
adb = "db"
"#;

const ASYNC_CLIENT: &str = r#"class AsyncClient:
    """Talks to adb, see :ref:`async-connect`."""

    async def async_connect(self):
        return await adb.open()
"#;

const SYNC_CLIENT: &str = r#"class Client:
    """Talks to db, see :ref:`connect`."""

    def connect(self):
        return db.open()
"#;

fn desync(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("desync").expect("binary");
    cmd.current_dir(dir.path());
    cmd
}

fn fixture() -> TempDir {
    let tmp = TempDir::new().expect("tempdir");
    tmp.child("desync.toml").write_str(CONFIG).expect("config");
    tmp.child("aio/client.py")
        .write_str(ASYNC_CLIENT)
        .expect("source");
    tmp
}

#[test]
fn first_run_promotes_and_exits_nonzero() {
    let tmp = fixture();

    desync(&tmp)
        .args(["generate", "--no-color"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("regenerated"));

    tmp.child("sync/client.py").assert(SYNC_CLIENT);
    // The candidate never survives a pass.
    tmp.child("sync/client.py.new").assert(predicate::path::missing());
}

#[test]
fn consistent_tree_exits_zero_with_no_changes() {
    let tmp = fixture();

    desync(&tmp).arg("generate").assert().code(1);
    desync(&tmp)
        .args(["generate", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("all up to date"));

    tmp.child("sync/client.py").assert(SYNC_CLIENT);
}

#[test]
fn stale_committed_file_is_replaced() {
    let tmp = fixture();
    tmp.child("sync/client.py")
        .write_str("outdated = True\n")
        .expect("stale");

    desync(&tmp).arg("generate").assert().code(1);
    tmp.child("sync/client.py").assert(SYNC_CLIENT);
}

#[test]
fn json_report_is_emitted() {
    let tmp = fixture();

    let out = desync(&tmp)
        .args(["generate", "--json"])
        .assert()
        .code(1)
        .get_output()
        .stdout
        .clone();

    let report: serde_json::Value = serde_json::from_slice(&out).expect("valid JSON");
    assert_eq!(report["processed"], 1);
    assert_eq!(report["changed"].as_array().map(Vec::len), Some(1));
}

#[test]
fn dry_run_reports_without_writing() {
    let tmp = fixture();

    desync(&tmp)
        .args(["generate", "--dry-run", "--no-color"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("would regenerate"));

    tmp.child("sync/client.py").assert(predicate::path::missing());
}

#[test]
fn fixture_config_files_are_excluded() {
    let tmp = fixture();
    tmp.child("aio/conftest.py")
        .write_str("fixtures = 1\n")
        .expect("conftest");

    desync(&tmp).arg("generate").assert().code(1);
    tmp.child("sync/conftest.py").assert(predicate::path::missing());
}

#[test]
fn explicit_file_invocation() {
    let tmp = fixture();
    tmp.child("aio/other.py")
        .write_str("x = await f()\n")
        .expect("other");

    desync(&tmp)
        .args(["generate", "aio/other.py"])
        .assert()
        .code(1);

    tmp.child("sync/other.py").assert("x = f()\n");
    tmp.child("sync/client.py").assert(predicate::path::missing());
}

#[test]
fn init_writes_config_and_respects_force() {
    let tmp = TempDir::new().expect("tempdir");

    desync(&tmp).arg("init").assert().success();
    tmp.child("desync.toml")
        .assert(predicate::str::contains("[[rules]]"));

    desync(&tmp).arg("init").assert().failure();
    desync(&tmp).args(["init", "--force"]).assert().success();
}

#[test]
fn malformed_source_fails_loudly() {
    let tmp = fixture();
    tmp.child("aio/broken.py")
        .write_str("s = 'unterminated\n")
        .expect("broken");

    desync(&tmp)
        .arg("generate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.py"));
}
