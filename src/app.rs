//! Dump orchestration shared by the binary and integration tests

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::agent::bridge::{BridgeConfig, BridgeTransport};
use crate::agent::{AgentTransport, CapturedTable};
use crate::capture;
use crate::config::Config;
use crate::data::ServiceStore;
use crate::error::DumpError;
use crate::logging::SessionLog;
use crate::session::{DumpSession, ServiceTarget};
use crate::stimulus::{AdbStimulus, Stimulus};

/// A successful dump
#[derive(Debug)]
pub struct DumpReport {
    pub session_id: Uuid,
    pub path: PathBuf,
    pub table: CapturedTable,
}

/// Resolve the service target from the discovery store.
///
/// With a meta target configured, records are keyed by the meta id and
/// `device_id` only narrows the match. No device is contacted.
pub fn resolve_target(
    store: &ServiceStore,
    config: &Config,
    service_name: &str,
    device_id: &str,
) -> Result<ServiceTarget, DumpError> {
    let owner = config.output_owner(device_id);
    let real_device = config.meta_target.as_ref().map(|_| device_id);

    let record = store
        .get_service(service_name, owner, real_device)?
        .ok_or_else(|| DumpError::ServiceNotDiscovered {
            service: service_name.to_string(),
            device: owner.to_string(),
        })?;

    ServiceTarget::from_record(&record, device_id)
}

/// Bridge launch settings for a target
pub fn bridge_config(config: &Config, target: &ServiceTarget) -> BridgeConfig {
    let binary = match config.bridge.binary.to_str() {
        Some(name) if !name.contains(std::path::MAIN_SEPARATOR) => BridgeConfig::find_binary(name),
        _ => config.bridge.binary.clone(),
    };

    BridgeConfig {
        binary,
        extra_args: config.bridge.extra_args.clone(),
        device_id: target.device_id.clone(),
        target: target.service_name.clone(),
        script: config.agent_script.clone(),
        unload_grace: config.timing.unload_grace(),
    }
}

/// Production collaborators: the bridge process and `adb shell service call`
pub fn production_collaborators(
    config: &Config,
    target: &ServiceTarget,
) -> (Arc<dyn AgentTransport>, Arc<dyn Stimulus>) {
    let transport = BridgeTransport::new(bridge_config(config, target));
    let stimulus = AdbStimulus::new(
        config.adb.binary.clone(),
        config.adb.privileged_prefix.clone(),
        config.stimulus_code,
    );
    (Arc::new(transport), Arc::new(stimulus))
}

/// Run one session and persist its capture.
///
/// Nothing is written unless a table was captured.
pub async fn dump(
    config: &Config,
    target: ServiceTarget,
    transport: Arc<dyn AgentTransport>,
    stimulus: Arc<dyn Stimulus>,
    log: SessionLog,
) -> Result<DumpReport, DumpError> {
    let path = capture::output_path(
        &config.target_root,
        config.output_owner(&target.device_id),
        &target.service_name,
    );

    let outcome = DumpSession::new(target, transport, stimulus, log.clone())
        .with_timing(config.timing.session_timing())
        .run()
        .await;

    match (outcome.table, outcome.error) {
        (Some(table), _) => {
            capture::write_capture(&path, &table)?;
            log.info(&format!("vtable written to {}", path.display()));
            Ok(DumpReport {
                session_id: outcome.session_id,
                path,
                table,
            })
        }
        (None, Some(err)) => Err(err),
        (None, None) => Err(DumpError::CaptureMissing),
    }
}
