//! Backend registry and initialization

use std::collections::BTreeMap;

use rfastboot_core::device::FastbootDevice;
use rfastboot_core::error::{Error, Result};

/// Parsed device parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParams {
    /// Backend name
    pub name: String,
    /// Key-value parameters, in key order
    pub params: BTreeMap<String, String>,
}

impl DeviceParams {
    /// Parameters as borrowed pairs
    pub fn options(&self) -> Vec<(&str, &str)> {
        self.params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }
}

/// Parse a device string into name and parameters
///
/// Format: "name" or "name:key1=value1,key2=value2"
pub fn parse_device_params(s: &str) -> Result<DeviceParams> {
    let (name, opts_str) = s.split_once(':').unwrap_or((s, ""));
    if name.is_empty() {
        return Err(Error::InvalidOption("empty device name".to_string()));
    }

    let mut params = BTreeMap::new();
    for opt in opts_str.split(',').filter(|o| !o.is_empty()) {
        let Some((key, value)) = opt.split_once('=') else {
            return Err(Error::InvalidOption(format!(
                "invalid parameter format: '{}' (expected key=value)",
                opt
            )));
        };
        params.insert(key.to_string(), value.to_string());
    }

    Ok(DeviceParams {
        name: name.to_string(),
        params,
    })
}

/// Open a fastboot device by its device string
pub fn open_device(device: &str) -> Result<Box<dyn FastbootDevice>> {
    let params = parse_device_params(device)?;

    match params.name.as_str() {
        #[cfg(feature = "dummy")]
        "dummy" | "emulator" => open_dummy(&params),

        _ => Err(Error::InvalidOption(format!(
            "unknown device backend: {} (available: {})",
            params.name,
            backend_names_short()
        ))),
    }
}

#[cfg(feature = "dummy")]
fn open_dummy(params: &DeviceParams) -> Result<Box<dyn FastbootDevice>> {
    use rfastboot_dummy::{DummyConfig, DummyDevice};

    let config = DummyConfig::from_options(&params.options())?;
    log::info!(
        "Opening dummy device ({} slot(s), {:?} mode)",
        config.slot_count,
        config.mode
    );
    Ok(Box::new(DummyDevice::new(config)))
}

/// Information about a device backend
#[derive(Debug, Clone, Copy)]
pub struct BackendInfo {
    /// Primary name (used for matching)
    pub name: &'static str,
    /// Alternative names
    pub aliases: &'static [&'static str],
    /// Short description
    pub description: &'static str,
}

/// Backends enabled at compile time
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "dummy")]
    backends.push(BackendInfo {
        name: "dummy",
        aliases: &["emulator"],
        description: "In-memory fastboot device (slots=<n>,slot=<x>,mode=<bootloader|fastbootd>,max-download=<size>)",
    });

    backends
}

/// Short list of backend names for CLI help
pub fn backend_names_short() -> String {
    let backends = available_backends();
    if backends.is_empty() {
        return "none (recompile with features)".to_string();
    }
    let names: Vec<&str> = backends.iter().map(|b| b.name).collect();
    names.join(", ")
}
