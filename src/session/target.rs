use std::path::Path;

use crate::data::ServiceRecord;
use crate::error::DumpError;

/// Service whose onTransact vtable is captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub service_name: String,
    pub device_id: String,
    /// Virtual address of onTransact
    pub dispatch_entry_addr: u64,
    /// On-device path of the module holding onTransact
    pub dispatch_module_path: String,
    /// On-device path of the module holding `BBinder`
    pub base_object_path: String,
    pub dispatch_module_name: String,
}

impl ServiceTarget {
    /// Build a target from a discovery record.
    ///
    /// Fails with `ServiceNotDiscovered` when onTransact was never located.
    pub fn from_record(record: &ServiceRecord, device_id: &str) -> Result<Self, DumpError> {
        let on_transact =
            record
                .on_transact
                .as_ref()
                .ok_or_else(|| DumpError::ServiceNotDiscovered {
                    service: record.service_name.clone(),
                    device: record.device_id.clone(),
                })?;

        let target = Self {
            service_name: record.service_name.clone(),
            device_id: device_id.to_string(),
            dispatch_entry_addr: on_transact.entry_addr,
            dispatch_module_path: on_transact.bin.clone(),
            base_object_path: on_transact.bbinder_path.clone(),
            dispatch_module_name: on_transact.module.clone(),
        };
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> Result<(), DumpError> {
        if self.dispatch_entry_addr == 0 {
            return Err(DumpError::InvalidTarget(format!(
                "{}: onTransact address is null",
                self.service_name
            )));
        }
        for (field, value) in [
            ("service_name", &self.service_name),
            ("device_id", &self.device_id),
            ("dispatch_module_path", &self.dispatch_module_path),
            ("base_object_path", &self.base_object_path),
            ("dispatch_module_name", &self.dispatch_module_name),
        ] {
            if value.trim().is_empty() {
                return Err(DumpError::InvalidTarget(format!(
                    "{}: {field} is empty",
                    self.service_name
                )));
            }
        }
        Ok(())
    }

    /// File name of the onTransact module, as the agent expects it
    pub fn module_basename(&self) -> &str {
        Path::new(&self.dispatch_module_path)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(&self.dispatch_module_path)
    }
}
