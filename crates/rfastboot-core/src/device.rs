//! Fastboot device abstraction
//!
//! [`FastbootDevice`] is the seam to the transport. Implementors provide
//! variable queries, raw commands, downloads and the disconnect barrier; the
//! standard partition commands are provided on top of `raw_command`.
//!
//! The free functions below interpret the well-known device variables.

use crate::error::Result;
use crate::size::parse_number;
use crate::slot::{Slot, SlotLayout};
use crate::sparse::SparseImage;

/// Well-known device variable names
pub mod vars {
    /// Number of A/B slots
    pub const SLOT_COUNT: &str = "slot-count";
    /// Active slot letter
    pub const CURRENT_SLOT: &str = "current-slot";
    /// `has-slot:<partition>` - whether the partition is slotted
    pub const HAS_SLOT: &str = "has-slot";
    /// `is-logical:<partition>` - whether the partition lives in super
    pub const IS_LOGICAL: &str = "is-logical";
    /// Whether the device runs userspace fastboot (fastbootd)
    pub const IS_USERSPACE: &str = "is-userspace";
    /// Name of the super partition
    pub const SUPER_PARTITION_NAME: &str = "super-partition-name";
    /// `partition-size:<partition>`
    pub const PARTITION_SIZE: &str = "partition-size";
    /// `partition-type:<partition>` - filesystem type, empty if raw
    pub const PARTITION_TYPE: &str = "partition-type";
    /// Largest single download the device accepts
    pub const MAX_DOWNLOAD_SIZE: &str = "max-download-size";
}

/// Default super partition name when the device does not report one
pub const DEFAULT_SUPER_NAME: &str = "super";

/// A connected fastboot device session
///
/// Every call blocks until the device answers. A FAIL reply is reported as
/// [`crate::error::Error::CommandFailed`]; a broken session as
/// [`crate::error::Error::Transport`].
pub trait FastbootDevice {
    /// Query a device variable
    fn get_var(&mut self, key: &str) -> Result<String>;

    /// Send a raw command, returning the OKAY payload
    ///
    /// `message` is a human-readable description of the step.
    fn raw_command(&mut self, command: &str, message: &str) -> Result<String>;

    /// Transfer `data` to the device's download buffer
    fn download(&mut self, label: &str, data: &[u8]) -> Result<()>;

    /// Transfer a sparse image to the device's download buffer
    fn download_sparse(&mut self, label: &str, image: &SparseImage) -> Result<()>;

    /// Block until the current session has closed after a reboot
    fn wait_for_disconnect(&mut self) -> Result<()>;

    /// Write the download buffer to `partition`
    fn flash(&mut self, partition: &str) -> Result<()> {
        self.raw_command(
            &format!("flash:{}", partition),
            &format!("Writing '{}'", partition),
        )
        .map(drop)
    }

    /// Erase `partition`
    fn erase(&mut self, partition: &str) -> Result<()> {
        self.raw_command(
            &format!("erase:{}", partition),
            &format!("Erasing '{}'", partition),
        )
        .map(drop)
    }

    /// Resize a logical partition
    fn resize_partition(&mut self, partition: &str, size: u64) -> Result<()> {
        self.raw_command(
            &format!("resize-logical-partition:{}:{}", partition, size),
            &format!("Resizing '{}'", partition),
        )
        .map(drop)
    }

    /// Delete a logical partition
    fn delete_partition(&mut self, partition: &str) -> Result<()> {
        self.raw_command(
            &format!("delete-logical-partition:{}", partition),
            &format!("Deleting '{}'", partition),
        )
        .map(drop)
    }

    /// Reboot into `target` (bootloader, recovery, fastboot)
    fn reboot_to(&mut self, target: &str) -> Result<()> {
        self.raw_command(
            &format!("reboot-{}", target),
            &format!("Rebooting into {}", target),
        )
        .map(drop)
    }

    /// Reboot normally
    fn reboot(&mut self) -> Result<()> {
        self.raw_command("reboot", "Rebooting").map(drop)
    }
}

/// Query a variable, mapping a FAIL reply to `None`
pub fn get_var_opt(device: &mut dyn FastbootDevice, key: &str) -> Result<Option<String>> {
    match device.get_var(key) {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_command_failure() => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_yes(value: Option<String>) -> bool {
    value.is_some_and(|v| v.trim() == "yes")
}

/// Whether the device runs userspace fastboot
pub fn is_userspace(device: &mut dyn FastbootDevice) -> Result<bool> {
    Ok(is_yes(get_var_opt(device, vars::IS_USERSPACE)?))
}

/// Whether `partition` is a logical (dynamic) partition
pub fn is_logical(device: &mut dyn FastbootDevice, partition: &str) -> Result<bool> {
    Ok(is_yes(get_var_opt(
        device,
        &format!("{}:{}", vars::IS_LOGICAL, partition),
    )?))
}

/// Whether `partition` has A/B slots; `None` if the device could not tell
pub fn has_slot(device: &mut dyn FastbootDevice, partition: &str) -> Result<Option<bool>> {
    let value = get_var_opt(device, &format!("{}:{}", vars::HAS_SLOT, partition))?;
    Ok(value.map(|v| v.trim() == "yes"))
}

/// Read the device's slot count and active slot
pub fn slot_layout(device: &mut dyn FastbootDevice) -> Result<SlotLayout> {
    let slot_count = match get_var_opt(device, vars::SLOT_COUNT)? {
        Some(count) if !count.trim().is_empty() => parse_number(&count)
            .ok()
            .and_then(|n| u8::try_from(n).ok())
            .unwrap_or(0),
        _ => 0,
    };
    if slot_count < 2 {
        return Ok(SlotLayout {
            slot_count,
            current: None,
        });
    }

    let current = match get_var_opt(device, vars::CURRENT_SLOT)? {
        Some(slot) => match slot.trim().parse::<Slot>() {
            Ok(slot) => Some(slot),
            Err(_) => {
                log::warn!("Device reported an unusable current slot '{}'", slot.trim());
                None
            }
        },
        None => None,
    };

    Ok(SlotLayout {
        slot_count,
        current,
    })
}

/// Name of the super partition, defaulting to `super`
pub fn super_partition_name(device: &mut dyn FastbootDevice) -> Result<String> {
    Ok(get_var_opt(device, vars::SUPER_PARTITION_NAME)?
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_SUPER_NAME.to_string()))
}

/// Size of `partition` in bytes, if the device reports it
pub fn partition_size(device: &mut dyn FastbootDevice, partition: &str) -> Result<Option<u64>> {
    match get_var_opt(device, &format!("{}:{}", vars::PARTITION_SIZE, partition))? {
        Some(size) => parse_number(&size).map(Some),
        None => Ok(None),
    }
}

/// Largest download the device accepts, if it reports one
pub fn max_download_size(device: &mut dyn FastbootDevice) -> Result<Option<u64>> {
    match get_var_opt(device, vars::MAX_DOWNLOAD_SIZE)? {
        Some(size) => Ok(parse_number(&size).ok().filter(|&n| n > 0)),
        None => Ok(None),
    }
}
