use assert_cmd::Command;
use predicates::prelude::*;

fn pce() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pce"))
}

#[test]
fn test_help_command() {
    pce()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rootless container engine"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("internalrun").not());
}

#[test]
fn test_version_command() {
    pce()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("pce"));
}

#[test]
fn test_invalid_command() {
    pce()
        .arg("invalid")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_run_help_lists_options() {
    pce()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--hostname"))
        .stdout(predicate::str::contains("--grace-period"))
        .stdout(predicate::str::contains("--keep-rootfs"))
        .stdout(predicate::str::contains("--allow-absolute-symlinks"));
}

#[test]
fn test_run_without_image() {
    pce()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_run_rejects_bad_grace_period() {
    pce()
        .args(["run", "--grace-period", "soon", "alpine"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value"));
}

#[test]
fn test_run_rejects_bad_hostname() {
    pce()
        .args(["run", "--hostname", "not valid", "alpine", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("hostname"));
}

#[test]
fn test_run_rejects_bad_reference() {
    pce()
        .args(["run", "not a reference!", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid image reference"));
}

#[test]
fn test_download_rejects_bad_reference() {
    let output = tempfile::tempdir().unwrap();

    pce()
        .args(["download", "bad|ref", "--output"])
        .arg(output.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid image reference"));
}

#[test]
fn test_internalrun_requires_command() {
    pce()
        .args(["internalrun", "/tmp"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
#[ignore] // Requires network access
fn test_download_archive() {
    let output = tempfile::tempdir().unwrap();

    pce()
        .args(["download", "alpine", "--output"])
        .arg(output.path())
        .assert()
        .success();

    assert!(output.path().join("alpine.tar").is_file());
}

#[test]
#[ignore] // Requires network access
fn test_download_extract() {
    let output = tempfile::tempdir().unwrap();

    pce()
        .args(["download", "alpine", "--extract", "--output"])
        .arg(output.path())
        .assert()
        .success();

    assert!(output.path().join("alpine/bin").exists());
    assert!(output.path().join("alpine/etc/os-release").is_file());
}

#[test]
#[ignore] // Requires network access and unprivileged user namespaces
fn test_run_echo() {
    pce()
        .args(["run", "--hostname", "box", "alpine", "sh", "-c", "hostname; id -u"])
        .assert()
        .success()
        .stdout("box\n0\n");
}

#[test]
#[ignore] // Requires network access and unprivileged user namespaces
fn test_run_propagates_exit_code() {
    pce()
        .args(["run", "alpine", "sh", "-c", "exit 3"])
        .assert()
        .code(3);
}
