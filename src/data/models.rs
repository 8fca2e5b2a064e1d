//! Records produced by interface discovery

/// Where a service's onTransact lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnTransactInfo {
    pub entry_addr: u64,
    /// On-device path of the binary holding onTransact
    pub bin: String,
    /// On-device path of the module holding `BBinder`
    pub bbinder_path: String,
    pub module: String,
}

/// A discovered native service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub service_name: String,
    /// Device id, or the meta target id when devices share one image
    pub device_id: String,
    /// Physical device the record was discovered on, for meta targets
    pub real_device_id: Option<String>,
    /// None until onTransact enumeration has run for the service
    pub on_transact: Option<OnTransactInfo>,
}
