//! Flashing plan - the session context shared by every task
//!
//! There is exactly one [`FlashingPlan`] per flashing session. Tasks receive
//! it by mutable reference when they run; since the queue runs tasks strictly
//! one after another, at most one task mutates the plan at any time.

use crate::device::{self, FastbootDevice};
use crate::error::{Error, Result};
use crate::fs::{FsFormatter, FsOptions};
use crate::progress::{NoProgress, TransferProgress};
use crate::size::format_size;
use crate::slot::{resolve_partitions, SlotLayout, SlotSpec};
use crate::source::ImageSource;
use crate::sparse::{SparseImage, DEFAULT_BLOCK_SIZE, RESPARSE_LIMIT};
use crate::super_layout::{SuperTemplate, SUPER_EMPTY_IMAGE};
use crate::vbmeta::{self, VbmetaFlags};

/// User-selected flashing options
#[derive(Debug, Clone, Default)]
pub struct FlashOptions {
    /// Requested slot
    pub slot: SlotSpec,
    /// Wipe user data (and the super metadata on update-super)
    pub wants_wipe: bool,
    /// Allow flashing dynamic partitions from the bootloader
    pub force: bool,
    /// Features for filesystems generated while wiping
    pub fs_options: FsOptions,
    /// Largest transfer to send, overriding the device's limit
    pub sparse_limit: Option<u64>,
    /// Flags patched into vbmeta images
    pub vbmeta: VbmetaFlags,
    /// Reboot once everything is flashed
    pub reboot: bool,
}

/// Shared session state
pub struct FlashingPlan {
    /// Device session; tasks that reboot the device mutate it
    pub device: Box<dyn FastbootDevice>,
    /// Where images come from
    pub source: Box<dyn ImageSource>,
    /// User options
    pub options: FlashOptions,
    /// Device slot configuration, see [`Self::determine_slot`]
    pub slot_layout: SlotLayout,
    formatter: Option<Box<dyn FsFormatter>>,
    progress: Box<dyn TransferProgress>,
}

impl FlashingPlan {
    /// Create a plan for a session on `device`
    pub fn new(
        device: Box<dyn FastbootDevice>,
        source: Box<dyn ImageSource>,
        options: FlashOptions,
    ) -> Self {
        Self {
            device,
            source,
            options,
            slot_layout: SlotLayout::default(),
            formatter: None,
            progress: Box::new(NoProgress),
        }
    }

    /// Use `formatter` to generate filesystems when wiping
    pub fn with_formatter(mut self, formatter: Box<dyn FsFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Report transfers to `progress`
    pub fn with_progress(mut self, progress: Box<dyn TransferProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Read the slot configuration from the device
    pub fn determine_slot(&mut self) -> Result<()> {
        self.slot_layout = device::slot_layout(self.device.as_mut())?;
        match self.slot_layout.current {
            Some(slot) => log::info!(
                "Device has {} slots, current slot is {}",
                self.slot_layout.slot_count,
                slot
            ),
            None if self.slot_layout.supports_ab() => {
                log::warn!("Device has {} slots but no current slot", self.slot_layout.slot_count)
            }
            None => log::debug!("Device does not use A/B slots"),
        }
        Ok(())
    }

    /// Whether the device supports A/B slots
    pub fn supports_ab(&self) -> bool {
        self.slot_layout.supports_ab()
    }

    /// Whether the device runs userspace fastboot
    pub fn is_userspace(&mut self) -> Result<bool> {
        device::is_userspace(self.device.as_mut())
    }

    /// Whether `partition` is a logical partition on the device
    pub fn is_logical(&mut self, partition: &str) -> Result<bool> {
        device::is_logical(self.device.as_mut(), partition)
    }

    /// Name of the super partition
    pub fn super_partition_name(&mut self) -> Result<String> {
        device::super_partition_name(self.device.as_mut())
    }

    /// The empty super template from the image source, if any
    ///
    /// A template that cannot be parsed is treated as absent, so no
    /// partition is considered dynamic.
    pub fn super_template(&self) -> Result<Option<SuperTemplate>> {
        let Some(data) = self.source.open(SUPER_EMPTY_IMAGE)? else {
            return Ok(None);
        };
        match SuperTemplate::from_bytes(&data) {
            Ok(template) => Ok(Some(template)),
            Err(e) => {
                log::debug!("Ignoring {}: {}", SUPER_EMPTY_IMAGE, e);
                Ok(None)
            }
        }
    }

    /// Whether `partition` is dynamic and therefore belongs to fastbootd
    pub fn should_flash_in_userspace(&self, partition: &str) -> Result<bool> {
        Ok(self
            .super_template()?
            .is_some_and(|template| template.contains(partition)))
    }

    /// Reboot into userspace fastboot and wait for the old session to close
    pub fn reboot_to_userspace(&mut self) -> Result<()> {
        log::info!("Rebooting into fastbootd");
        self.device.reboot_to("fastboot")?;
        self.device.wait_for_disconnect()
    }

    /// Concrete partition names for `partition` on slot `spec`
    ///
    /// With `force_slot`, asking for a slot on a partition without slots
    /// warns instead of silently ignoring the slot.
    pub fn resolve_partitions(
        &mut self,
        partition: &str,
        spec: &SlotSpec,
        force_slot: bool,
    ) -> Result<Vec<String>> {
        let has_slot = match device::has_slot(self.device.as_mut(), partition)? {
            Some(has_slot) => has_slot,
            None if *spec == SlotSpec::All && self.supports_ab() => {
                return Err(Error::SlotQueryFailed(partition.to_string()))
            }
            None => false,
        };

        if force_slot && !has_slot && spec.is_explicit() && self.supports_ab() {
            log::warn!(
                "{} does not support slots, and slot {} was requested",
                partition,
                spec
            );
        }

        resolve_partitions(partition, spec, has_slot, &self.slot_layout)
    }

    /// Run `f` on every concrete partition `partition` resolves to
    pub fn for_each_partition<F>(
        &mut self,
        partition: &str,
        spec: &SlotSpec,
        force_slot: bool,
        mut f: F,
    ) -> Result<()>
    where
        F: FnMut(&mut Self, &str) -> Result<()>,
    {
        for name in self.resolve_partitions(partition, spec, force_slot)? {
            f(self, &name)?;
        }
        Ok(())
    }

    /// Transfer limit for a payload of `size` bytes
    ///
    /// Returns `None` if the payload can be sent in one piece or no limit is
    /// known, otherwise the piece size to split it into.
    pub fn sparse_limit(&mut self, size: u64) -> Result<Option<u64>> {
        let limit = match self.options.sparse_limit.filter(|&n| n > 0) {
            Some(limit) => limit,
            None => match device::max_download_size(self.device.as_mut())? {
                Some(limit) => limit,
                None => return Ok(None),
            },
        };
        Ok((size > limit).then_some(limit.min(RESPARSE_LIMIT)))
    }

    /// Send sparse pieces to `partition`, strictly in order
    pub fn flash_sparse_pieces(&mut self, partition: &str, pieces: Vec<SparseImage>) -> Result<()> {
        let count = pieces.len();
        for (index, piece) in pieces.into_iter().enumerate() {
            let bytes = piece.transfer_len();
            log::info!(
                "Sending sparse '{}' {}/{} ({})",
                partition,
                index + 1,
                count,
                format_size(bytes)
            );
            self.progress.started(partition, index, count, bytes);
            self.device.download_sparse(partition, &piece)?;
            self.device.flash(partition)?;
            self.progress.finished(partition);
        }
        Ok(())
    }

    /// Send a sparse image, splitting it if it exceeds the transfer limit
    pub fn flash_sparse(&mut self, partition: &str, image: SparseImage) -> Result<()> {
        let pieces = match self.sparse_limit(image.transfer_len())? {
            Some(limit) => image.resparse(limit)?,
            None => vec![image],
        };
        self.flash_sparse_pieces(partition, pieces)
    }

    /// Flash raw image bytes, patching vbmeta flags if requested
    pub fn flash_buffer(&mut self, partition: &str, mut data: Vec<u8>, apply_vbmeta: bool) -> Result<()> {
        if apply_vbmeta && vbmeta::is_vbmeta_partition(partition) {
            vbmeta::patch_flags(&mut data, self.options.vbmeta)?;
        }

        if self.sparse_limit(data.len() as u64)?.is_some() {
            let image = SparseImage::from_raw(&data, DEFAULT_BLOCK_SIZE)?;
            return self.flash_sparse(partition, image);
        }

        log::info!("Sending '{}' ({})", partition, format_size(data.len() as u64));
        self.progress.started(partition, 0, 1, data.len() as u64);
        self.device.download(partition, &data)?;
        self.device.flash(partition)?;
        self.progress.finished(partition);
        Ok(())
    }

    /// Flash the named image from the image source to `partition`
    pub fn flash_image(&mut self, partition: &str, image_name: &str, apply_vbmeta: bool) -> Result<()> {
        let data = self
            .source
            .open(image_name)?
            .ok_or_else(|| Error::MissingImage(image_name.to_string()))?;
        self.flash_buffer(partition, data, apply_vbmeta)
    }

    /// Write a fresh `fs_type` filesystem to `partition`
    ///
    /// Skipped with a warning if the size is unknown or the type unsupported.
    pub fn format_partition(&mut self, partition: &str, fs_type: &str) -> Result<()> {
        let Some(size) = device::partition_size(self.device.as_mut(), partition)? else {
            log::warn!("Cannot format '{}': unknown partition size", partition);
            return Ok(());
        };
        let Some(formatter) = &self.formatter else {
            log::warn!("No filesystem generator available, '{}' was erased only", partition);
            return Ok(());
        };
        let Some(image) = formatter.generate(fs_type, size, self.options.fs_options)? else {
            log::warn!(
                "Formatting is not supported for file system with type '{}'",
                fs_type
            );
            return Ok(());
        };

        log::info!("Formatting '{}' as {}", partition, fs_type);
        self.flash_sparse(partition, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::task::tests::MockDevice;

    fn plan(device: MockDevice) -> FlashingPlan {
        FlashingPlan::new(Box::new(device), Box::new(MemorySource::new()), FlashOptions::default())
    }

    #[test]
    fn test_sparse_limit_from_device() {
        let device = MockDevice::new().var("max-download-size", "0x1000");
        let mut plan = plan(device);
        assert_eq!(plan.sparse_limit(100).unwrap(), None);
        assert_eq!(plan.sparse_limit(0x2000).unwrap(), Some(0x1000));
    }

    #[test]
    fn test_no_limit_without_device_size() {
        let mut plan = plan(MockDevice::new());
        assert_eq!(plan.sparse_limit(2 << 30).unwrap(), None);
    }

    #[test]
    fn test_unparseable_template_is_not_dynamic() {
        let source = MemorySource::new().with(
            SUPER_EMPTY_IMAGE,
            vec![0x67, 0x44, 0x6c, 0x61, 0xff, 0xfe, 0, 0],
        );
        let plan = FlashingPlan::new(Box::new(MockDevice::new()), Box::new(source), FlashOptions::default());
        assert!(plan.super_template().unwrap().is_none());
        assert!(!plan.should_flash_in_userspace("system").unwrap());
    }

    #[test]
    fn test_sparse_limit_user_override() {
        let device = MockDevice::new().var("max-download-size", "0x1000");
        let mut plan = plan(device);
        plan.options.sparse_limit = Some(0x8000);
        assert_eq!(plan.sparse_limit(0x2000).unwrap(), None);
        assert_eq!(plan.sparse_limit(0x9000).unwrap(), Some(0x8000));
    }

    #[test]
    fn test_sparse_limit_capped() {
        let mut plan = plan(MockDevice::new());
        plan.options.sparse_limit = Some(4 << 30);
        assert_eq!(plan.sparse_limit(8 << 30).unwrap(), Some(RESPARSE_LIMIT));
    }

    #[test]
    fn test_determine_slot() {
        let device = MockDevice::new()
            .var("slot-count", "2")
            .var("current-slot", "b");
        let mut plan = plan(device);
        plan.determine_slot().unwrap();
        assert!(plan.supports_ab());
        assert_eq!(plan.slot_layout.current.map(|s| s.letter()), Some('b'));
    }

    #[test]
    fn test_all_slots_without_has_slot_answer_fails() {
        let device = MockDevice::new()
            .var("slot-count", "2")
            .var("current-slot", "a");
        let mut plan = plan(device);
        plan.determine_slot().unwrap();
        let err = plan.resolve_partitions("boot", &SlotSpec::All, false).unwrap_err();
        assert!(matches!(err, Error::SlotQueryFailed(_)));
    }
}
