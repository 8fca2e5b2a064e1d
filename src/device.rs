//! Connected device enumeration through `adb devices -l`

use std::path::Path;

use tokio::process::Command;

use crate::error::DumpError;

/// One line of `adb devices -l`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: String,
    /// adb state: `device`, `offline`, `unauthorized`, ...
    pub state: String,
    /// `usb:...` / `transport_id:...` detail when present
    pub transport: Option<String>,
    pub model: Option<String>,
}

impl DeviceInfo {
    /// Usable for instrumentation
    pub fn is_online(&self) -> bool {
        self.state == "device"
    }
}

/// Parse `adb devices -l` output.
///
/// Format:
/// ```text
/// List of devices attached
/// 1A2B3C         device usb:1-1 product:x model:Pixel_7 device:panther transport_id:3
/// emulator-5554  offline transport_id:1
/// ```
pub fn parse_adb_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.starts_with("List of devices") && !line.starts_with('*'))
        .filter_map(|line| {
            let mut words = line.split_whitespace();
            let id = words.next()?.to_string();
            let state = words.next()?.to_string();

            let mut transport = None;
            let mut model = None;
            for word in words {
                if let Some(value) = word.strip_prefix("model:") {
                    model = Some(value.to_string());
                } else if transport.is_none()
                    && (word.starts_with("usb:") || word.starts_with("transport_id:"))
                {
                    transport = Some(word.to_string());
                }
            }

            Some(DeviceInfo {
                id,
                state,
                transport,
                model,
            })
        })
        .collect()
}

/// List devices known to adb
pub async fn list_devices(adb: &Path) -> Result<Vec<DeviceInfo>, DumpError> {
    let output = Command::new(adb)
        .args(["devices", "-l"])
        .output()
        .await
        .map_err(|e| DumpError::Bridge(format!("failed to run {}: {}", adb.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DumpError::Bridge(format!(
            "adb devices failed: {}",
            stderr.trim()
        )));
    }

    let devices = parse_adb_devices(&String::from_utf8_lossy(&output.stdout));
    tracing::debug!(count = devices.len(), "Enumerated adb devices");
    Ok(devices)
}

/// Pick the requested device among the online ones
pub fn select_device<'a>(
    devices: &'a [DeviceInfo],
    device_id: &str,
) -> Result<&'a DeviceInfo, DumpError> {
    devices
        .iter()
        .filter(|d| d.is_online())
        .find(|d| d.id == device_id)
        .ok_or_else(|| DumpError::DeviceNotFound {
            device: device_id.to_string(),
            connected: devices
                .iter()
                .filter(|d| d.is_online())
                .map(|d| d.id.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        })
}
