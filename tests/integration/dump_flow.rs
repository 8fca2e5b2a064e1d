//! Integration tests for the dump flow
//!
//! Tests the flow: discovery store -> ServiceTarget -> session with a
//! scripted agent -> onTransact_vtable.txt

use std::fs;
use std::sync::Arc;

use vtable_dumper::agent::bridge::BridgeTransport;
use vtable_dumper::agent::mock::{MockConfig, MockTransport};
use vtable_dumper::agent::rpc::{EXPORT_CONFIGURE, EXPORT_INSTRUMENT};
use vtable_dumper::capture::{output_path, VTABLE_FILE_NAME};
use vtable_dumper::logging::SessionLog;
use vtable_dumper::stimulus::RecordingStimulus;
use vtable_dumper::{app, DumpError};

use super::common::fixtures::{setup_done, vtable_payload, TestStore, DEVICE, SERVICE};

fn quiet_log() -> SessionLog {
    SessionLog::new(DEVICE).quiet()
}

/// A discovered service with a cooperative agent ends up on disk
#[tokio::test(start_paused = true)]
async fn test_dump_writes_vtable_file() {
    let fixture = TestStore::discovered();
    let config = fixture.config();
    let target = app::resolve_target(&fixture.store, &config, SERVICE, DEVICE).unwrap();

    let transport = Arc::new(MockTransport::new(
        MockConfig::default()
            .emit_on_load(setup_done())
            .emit_after(EXPORT_INSTRUMENT, vtable_payload()),
    ));
    let stimulus = Arc::new(RecordingStimulus::new());

    let report = app::dump(&config, target, transport.clone(), stimulus.clone(), quiet_log())
        .await
        .expect("dump should succeed");

    let expected_path = fixture
        .target_root()
        .join(DEVICE)
        .join(SERVICE)
        .join(VTABLE_FILE_NAME);
    assert_eq!(report.path, expected_path);
    assert_eq!(report.table.len(), 2);
    assert_eq!(
        fs::read_to_string(&expected_path).unwrap(),
        "0x0\t0x10\tlibfoo.so\n0x1\t0x18\tlibfoo.so\n"
    );

    assert_eq!(
        transport.call_names(),
        vec![EXPORT_CONFIGURE, EXPORT_INSTRUMENT]
    );
    assert_eq!(stimulus.fired(), vec![SERVICE]);
    assert_eq!(transport.unload_count(), 1);
}

/// The agent's address and paths come from the store record
#[tokio::test(start_paused = true)]
async fn test_configure_uses_stored_on_transact() {
    let fixture = TestStore::discovered();
    let config = fixture.config();
    let target = app::resolve_target(&fixture.store, &config, SERVICE, DEVICE).unwrap();

    let transport = Arc::new(MockTransport::new(
        MockConfig::default()
            .emit_on_load(setup_done())
            .emit_after(EXPORT_INSTRUMENT, vtable_payload()),
    ));

    app::dump(
        &config,
        target,
        transport.clone(),
        Arc::new(RecordingStimulus::new()),
        quiet_log(),
    )
    .await
    .unwrap();

    let configure = &transport.calls()[0];
    assert_eq!(configure.export, EXPORT_CONFIGURE);
    assert_eq!(
        configure.args,
        vec![
            serde_json::json!(0x7a3c_1000u64),
            serde_json::json!("libmediaplayerservice.so"),
            serde_json::json!("/system/lib64/libbinder.so"),
            serde_json::json!("libmediaplayerservice"),
        ]
    );
}

/// No capture means no file, and the error says so
#[tokio::test(start_paused = true)]
async fn test_missing_capture_writes_nothing() {
    let fixture = TestStore::discovered();
    let config = fixture.config();
    let target = app::resolve_target(&fixture.store, &config, SERVICE, DEVICE).unwrap();

    let transport = Arc::new(MockTransport::new(
        MockConfig::default().emit_on_load(setup_done()),
    ));

    let err = app::dump(
        &config,
        target,
        transport.clone(),
        Arc::new(RecordingStimulus::new()),
        quiet_log(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, DumpError::CaptureMissing), "got {err:?}");
    assert!(!output_path(&fixture.target_root(), DEVICE, SERVICE).exists());
    assert_eq!(transport.unload_count(), 1);
}

/// An agent that never reports readiness runs into the session deadline
#[tokio::test(start_paused = true)]
async fn test_silent_agent_times_out() {
    let fixture = TestStore::discovered();
    let config = fixture.config();
    let target = app::resolve_target(&fixture.store, &config, SERVICE, DEVICE).unwrap();

    let transport = Arc::new(MockTransport::new(MockConfig::default()));
    let stimulus = Arc::new(RecordingStimulus::new());

    let err = app::dump(&config, target, transport.clone(), stimulus.clone(), quiet_log())
        .await
        .unwrap_err();

    assert!(matches!(err, DumpError::Timeout(5)), "got {err:?}");
    assert!(transport.call_names().is_empty());
    assert!(stimulus.fired().is_empty());
    assert_eq!(transport.unload_count(), 1);
}

/// Meta targets write under the shared id, not the device serial
#[tokio::test(start_paused = true)]
async fn test_meta_target_output_location() {
    let fixture = TestStore::empty();
    fixture.add_discovered(SERVICE, "pixel7-meta", Some(DEVICE));
    let config = fixture
        .config()
        .with_meta_target(Some("pixel7-meta".to_string()));
    let target = app::resolve_target(&fixture.store, &config, SERVICE, DEVICE).unwrap();
    assert_eq!(target.device_id, DEVICE);

    let transport = Arc::new(MockTransport::new(
        MockConfig::default()
            .emit_on_load(setup_done())
            .emit_after(EXPORT_INSTRUMENT, vtable_payload()),
    ));

    let report = app::dump(
        &config,
        target,
        transport,
        Arc::new(RecordingStimulus::new()),
        quiet_log(),
    )
    .await
    .unwrap();

    assert_eq!(
        report.path,
        output_path(&fixture.target_root(), "pixel7-meta", SERVICE)
    );
    assert!(report.path.exists());
}

#[test]
fn test_undiscovered_service_is_rejected() {
    let fixture = TestStore::empty();
    fixture.add_undiscovered(SERVICE, DEVICE);

    let err = app::resolve_target(&fixture.store, &fixture.config(), SERVICE, DEVICE).unwrap_err();
    assert!(
        matches!(err, DumpError::ServiceNotDiscovered { ref service, .. } if service == SERVICE),
        "got {err:?}"
    );
}

#[test]
fn test_unknown_service_is_rejected() {
    let fixture = TestStore::discovered();

    let err = app::resolve_target(&fixture.store, &fixture.config(), "vold", DEVICE).unwrap_err();
    assert!(matches!(err, DumpError::ServiceNotDiscovered { .. }));
    assert!(!fixture.target_root().exists());
}

/// A bridge that stops answering after setup_done still ends in cleanup
#[cfg(unix)]
#[tokio::test]
async fn test_unresponsive_bridge_session_ends_at_deadline() {
    use std::os::unix::fs::PermissionsExt;
    use std::time::Duration;

    let fixture = TestStore::discovered();
    let mut config = fixture.config();
    config.timing.session_deadline_secs = 1;
    config.timing.unload_grace_ms = 200;

    let stub = fixture.root.join("bridge.sh");
    fs::write(
        &stub,
        r#"#!/bin/sh
read line
id=$(echo "$line" | sed 's/.*"id":\([0-9]*\).*/\1/')
printf '{"id":%s,"result":true}\n' "$id"
printf '%s\n' '{"message":{"type":"send","payload":"{\"type\":\"setup_done\"}"}}'
while read line; do :; done
"#,
    )
    .unwrap();
    fs::set_permissions(&stub, fs::Permissions::from_mode(0o755)).unwrap();
    config.bridge.binary = "/bin/sh".into();
    config.bridge.extra_args = vec![stub.to_string_lossy().to_string()];

    let target = app::resolve_target(&fixture.store, &config, SERVICE, DEVICE).unwrap();
    let transport = Arc::new(BridgeTransport::new(app::bridge_config(&config, &target)));
    let stimulus = Arc::new(RecordingStimulus::new());

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        app::dump(&config, target, transport, stimulus.clone(), quiet_log()),
    )
    .await
    .expect("cleanup must not block past the deadline");

    assert!(matches!(result, Err(DumpError::Timeout(1))), "got {result:?}");
    assert!(stimulus.fired().is_empty());
    assert!(!output_path(&fixture.target_root(), DEVICE, SERVICE).exists());
}
