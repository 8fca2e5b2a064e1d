//! Failure exits of the `vtable-dump` binary
//!
//! Most runs stop at config, the discovery store, or device selection. The
//! last one drives a whole session against stub `adb` and bridge scripts.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use super::common::fixtures::{TestStore, DEVICE, SERVICE};

fn vtable_dump(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("vtable-dump").expect("binary should build");
    cmd.env("VTABLE_DUMP_HOME", home.path());
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_requires_service_and_device() {
    let home = TempDir::new().unwrap();
    vtable_dump(&home)
        .arg("-s")
        .arg(SERVICE)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--device"));
}

#[test]
fn test_undiscovered_service_exits_255() {
    let home = TempDir::new().unwrap();
    vtable_dump(&home)
        .args(["-s", SERVICE, "-d", DEVICE])
        .assert()
        .code(255)
        .stderr(predicate::str::contains("not in db"))
        .stderr(predicate::str::contains("onTransact enumeration"));

    // First run seeds the data directory
    assert!(home.path().join("config.toml").exists());
    assert!(home.path().join("binder.db").exists());
    assert!(home.path().join("logs").join("vtable_dump.log").exists());
    assert!(!home.path().join("targets").exists());
}

/// Writes an executable `/bin/sh` script
#[cfg(unix)]
fn write_script(path: &std::path::Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;

    std::fs::write(path, body).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(unix)]
#[test]
fn test_undiscovered_service_never_runs_adb() {
    let home = TempDir::new().unwrap();
    let fixture = TestStore::empty();
    fixture.add_undiscovered(SERVICE, DEVICE);

    let marker = home.path().join("adb-ran");
    let adb = home.path().join("adb");
    write_script(&adb, &format!("#!/bin/sh\ntouch {:?}\n", marker.display().to_string()));

    let config = home.path().join("custom.toml");
    std::fs::write(&config, format!("[adb]\nbinary = {:?}\n", adb.display().to_string())).unwrap();

    vtable_dump(&home)
        .args(["-s", SERVICE, "-d", DEVICE, "--config"])
        .arg(&config)
        .arg("--database")
        .arg(&fixture.db.path)
        .assert()
        .code(255)
        .stderr(predicate::str::contains("not in db"));

    assert!(!marker.exists(), "adb must not run before the store lookup succeeds");
}

#[test]
fn test_missing_explicit_config_exits_255() {
    let home = TempDir::new().unwrap();
    vtable_dump(&home)
        .args(["-s", SERVICE, "-d", DEVICE, "--config"])
        .arg(home.path().join("absent.toml"))
        .assert()
        .code(255)
        .stderr(predicate::str::contains("configuration error"));
}

#[cfg(unix)]
#[test]
fn test_unknown_device_lists_connected_devices() {
    use std::os::unix::fs::PermissionsExt;

    let home = TempDir::new().unwrap();
    let fixture = TestStore::discovered();

    let adb = home.path().join("adb");
    std::fs::write(
        &adb,
        "#!/bin/sh\nprintf 'List of devices attached\\nOTHER01 device usb:1-1 transport_id:2\\nOFF02 offline transport_id:3\\n'\n",
    )
    .unwrap();
    std::fs::set_permissions(&adb, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = home.path().join("custom.toml");
    std::fs::write(&config, format!("[adb]\nbinary = {:?}\n", adb.display().to_string())).unwrap();

    vtable_dump(&home)
        .args(["-s", SERVICE, "-d", DEVICE, "--config"])
        .arg(&config)
        .arg("--database")
        .arg(&fixture.db.path)
        .assert()
        .code(255)
        .stderr(predicate::str::contains("device not connected!"))
        .stderr(predicate::str::contains("OTHER01"))
        .stderr(predicate::str::contains("OFF02").not());
}

/// A session failure is reported once, on stderr
#[cfg(unix)]
#[test]
fn test_session_failure_is_reported_once() {
    let home = TempDir::new().unwrap();
    let fixture = TestStore::discovered();

    let adb = home.path().join("adb");
    write_script(
        &adb,
        &format!(
            "#!/bin/sh\nif [ \"$1\" = devices ]; then printf 'List of devices attached\\n{DEVICE} device usb:1-1\\n'; fi\n"
        ),
    );

    // Answers every request and reports readiness after load, but never
    // sends a vtable
    let bridge = home.path().join("bridge.sh");
    write_script(
        &bridge,
        r#"#!/bin/sh
while read line; do
  id=$(echo "$line" | sed 's/.*"id":\([0-9]*\).*/\1/')
  printf '{"id":%s,"result":true}\n' "$id"
  case "$line" in
    *'"method":"load"'*) printf '%s\n' '{"message":{"type":"send","payload":"{\"type\":\"setup_done\"}"}}' ;;
  esac
done
"#,
    );

    let config = home.path().join("custom.toml");
    std::fs::write(
        &config,
        format!(
            "[bridge]\nbinary = \"/bin/sh\"\nextra_args = [{:?}]\n\n[adb]\nbinary = {:?}\n\n[timing]\nready_poll_interval_ms = 20\ncapture_delay_ms = 50\nsession_deadline_secs = 30\nunload_grace_ms = 200\n",
            bridge.display().to_string(),
            adb.display().to_string(),
        ),
    )
    .unwrap();

    vtable_dump(&home)
        .args(["-s", SERVICE, "-d", DEVICE, "--config"])
        .arg(&config)
        .arg("--database")
        .arg(&fixture.db.path)
        .arg("--target-root")
        .arg(home.path().join("targets"))
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .code(255)
        .stdout(predicate::str::contains("[-]").not())
        .stderr(predicate::str::contains("no vtable payload received"))
        .stderr(predicate::function(|err: &str| err.matches("[-]").count() == 1));

    assert!(!home.path().join("targets").exists());
}
