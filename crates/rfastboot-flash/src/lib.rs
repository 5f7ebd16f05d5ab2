//! Device backend registry
//!
//! The CLI opens fastboot devices through this crate with a simple string
//! such as `dummy` or `dummy:slot=b,max-download=16M`, and never depends on
//! a backend crate directly.
//!
//! # Example
//!
//! ```ignore
//! use rfastboot_flash::open_device;
//!
//! let mut device = open_device("dummy:slots=2,slot=a")?;
//! let product = device.get_var("product")?;
//! ```

mod registry;

pub use registry::{
    available_backends, backend_names_short, open_device, parse_device_params, BackendInfo,
    DeviceParams,
};

// Re-export core types that CLI needs
pub use rfastboot_core::device::FastbootDevice;
