//! Flashing tasks
//!
//! A [`Task`] is one step of a flashing session. Every variant captures its
//! parameters when it is built and reaches the device only through the
//! [`FlashingPlan`] it is run against.

use core::fmt;
use core::str::FromStr;

use crate::device::{self, vars};
use crate::error::{Error, Result};
use crate::image::ImageEntry;
use crate::plan::FlashingPlan;
use crate::size::format_size;
use crate::slot::SlotSpec;
use crate::sparse::SparseImage;
use crate::super_layout::{SuperLayoutBuilder, SUPER_EMPTY_IMAGE};

/// Where a [`RebootTask`] sends the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebootTarget {
    /// Normal boot
    System,
    /// The bootloader
    Bootloader,
    /// Recovery
    Recovery,
    /// Userspace fastboot (fastbootd)
    Userspace,
}

impl FromStr for RebootTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(Self::System),
            "bootloader" => Ok(Self::Bootloader),
            "recovery" => Ok(Self::Recovery),
            "fastboot" | "userspace" => Ok(Self::Userspace),
            other => Err(Error::UnknownRebootTarget(other.to_string())),
        }
    }
}

/// Flash an image to every partition a base name resolves to
#[derive(Debug, Clone)]
pub struct FlashTask {
    slot: SlotSpec,
    partition: String,
    image_name: String,
    apply_vbmeta: bool,
}

impl FlashTask {
    /// Flash `image_name` to `partition` on `slot`
    pub fn new(
        slot: SlotSpec,
        partition: impl Into<String>,
        image_name: impl Into<String>,
        apply_vbmeta: bool,
    ) -> Self {
        Self {
            slot,
            partition: partition.into(),
            image_name: image_name.into(),
            apply_vbmeta,
        }
    }

    /// Partition base name
    pub fn partition(&self) -> &str {
        &self.partition
    }

    fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        let Self {
            slot,
            partition,
            image_name,
            apply_vbmeta,
        } = self;

        plan.for_each_partition(&partition, &slot, true, |plan, name| {
            if !plan.options.force
                && plan.should_flash_in_userspace(name)?
                && !plan.is_userspace()?
            {
                return Err(Error::DynamicPartitionInBootloader(name.to_string()));
            }
            plan.flash_image(name, &image_name, apply_vbmeta)
        })
    }
}

/// Reboot the device and wait for the session to close
#[derive(Debug, Clone)]
pub struct RebootTask {
    target: String,
}

impl RebootTask {
    /// Reboot into `target` ("" for a normal boot)
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        match self.target.parse::<RebootTarget>()? {
            RebootTarget::Userspace => {
                if !plan.is_userspace()? {
                    plan.reboot_to_userspace()?;
                }
                Ok(())
            }
            RebootTarget::Recovery => {
                plan.device.reboot_to("recovery")?;
                plan.device.wait_for_disconnect()
            }
            RebootTarget::Bootloader => {
                plan.device.reboot_to("bootloader")?;
                plan.device.wait_for_disconnect()
            }
            RebootTarget::System => {
                plan.device.reboot()?;
                plan.device.wait_for_disconnect()
            }
        }
    }
}

/// Resize the logical partitions a base name resolves to
#[derive(Debug, Clone)]
pub struct ResizeTask {
    partition: String,
    size: u64,
    slot: SlotSpec,
}

impl ResizeTask {
    /// Resize `partition` on `slot` to `size` bytes
    pub fn new(partition: impl Into<String>, size: u64, slot: SlotSpec) -> Self {
        Self {
            partition: partition.into(),
            size,
            slot,
        }
    }

    fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        let size = self.size;
        plan.for_each_partition(&self.partition, &self.slot, false, |plan, name| {
            if plan.is_logical(name)? {
                plan.device.resize_partition(name, size)
            } else {
                log::debug!("'{}' is not a logical partition, not resizing", name);
                Ok(())
            }
        })
    }
}

/// Delete one logical partition by its literal name
#[derive(Debug, Clone)]
pub struct DeleteTask {
    partition: String,
}

impl DeleteTask {
    /// Delete `partition`
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
        }
    }

    fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        plan.device.delete_partition(&self.partition)
    }
}

/// Erase a partition and write an empty filesystem of its reported type
#[derive(Debug, Clone)]
pub struct WipeTask {
    partition: String,
}

impl WipeTask {
    /// Wipe `partition`
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
        }
    }

    fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        let key = format!("{}:{}", vars::PARTITION_TYPE, self.partition);
        let fs_type = match device::get_var_opt(plan.device.as_mut(), &key)? {
            Some(fs_type) => fs_type.trim().to_string(),
            None => {
                log::debug!("Partition '{}' not found, not wiping", self.partition);
                return Ok(());
            }
        };
        if fs_type.is_empty() {
            log::debug!("Partition '{}' has no filesystem type, not wiping", self.partition);
            return Ok(());
        }

        match plan.device.erase(&self.partition) {
            Ok(()) => {}
            Err(e) if e.is_command_failure() => {
                log::error!("Erasing '{}' failed: {}", self.partition, e);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        plan.format_partition(&self.partition, &fs_type)
    }
}

/// Push the empty super layout and let fastbootd rebuild the metadata
#[derive(Debug, Clone, Default)]
pub struct UpdateSuperTask;

impl UpdateSuperTask {
    /// Create the task
    pub fn new() -> Self {
        Self
    }

    fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        let Some(template) = plan.source.open(SUPER_EMPTY_IMAGE)? else {
            log::debug!("No {}, device has no dynamic partitions", SUPER_EMPTY_IMAGE);
            return Ok(());
        };

        if !plan.is_userspace()? {
            plan.reboot_to_userspace()?;
        }

        let super_name = plan.super_partition_name()?;
        plan.device.download(&super_name, &template)?;

        let mut command = format!("update-super:{}", super_name);
        if plan.options.wants_wipe {
            command.push_str(":wipe");
        }
        plan.device
            .raw_command(&command, "Updating super partition")
            .map(drop)
    }
}

/// Flash one merged image covering several logical partitions
#[derive(Debug)]
pub struct FlashSuperLayoutTask {
    super_name: String,
    layout: SparseImage,
}

impl FlashSuperLayoutTask {
    /// Try to merge `entries` into a single super image
    ///
    /// Returns `Ok(None)` if the device or the request is not eligible, in
    /// which case `entries` is left untouched and must be flashed one by one.
    /// On success the covered entries are removed from `entries`, keeping the
    /// order of the rest.
    ///
    /// Each call consumes the candidate list it is given; calling it again on
    /// the remainder is not meaningful.
    pub fn initialize(plan: &mut FlashingPlan, entries: &mut Vec<ImageEntry>) -> Result<Option<Self>> {
        if !plan.supports_ab() {
            log::debug!("Cannot optimize flashing super on non-AB device");
            return Ok(None);
        }
        if plan.options.slot == SlotSpec::All {
            log::debug!("Cannot optimize flashing super for all slots");
            return Ok(None);
        }

        let Some(template) = plan.source.open(SUPER_EMPTY_IMAGE)? else {
            log::debug!("Cannot optimize flashing super without {}", SUPER_EMPTY_IMAGE);
            return Ok(None);
        };

        let super_name = plan.super_partition_name()?;
        let Some(super_size) = device::partition_size(plan.device.as_mut(), &super_name)? else {
            log::debug!("Cannot optimize flashing super: no size for '{}'", super_name);
            return Ok(None);
        };

        let mut builder = match SuperLayoutBuilder::open(plan.source.as_ref(), &template, super_size) {
            Ok(builder) => builder,
            Err(e) => {
                log::debug!("Cannot optimize flashing super: {}", e);
                return Ok(None);
            }
        };
        if let Some(name) = builder.template().geometry.name.as_deref() {
            if name != super_name {
                log::debug!(
                    "Cannot optimize flashing super: template is for '{}', device has '{}'",
                    name,
                    super_name
                );
                return Ok(None);
            }
        }

        let mut names = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            let registered = entry
                .partition_name(&plan.slot_layout)
                .and_then(|name| {
                    builder.add_partition(
                        &name,
                        &entry.image.image_name,
                        entry.image.optional_if_missing,
                    )?;
                    Ok(name)
                });
            match registered {
                Ok(name) => names.push(name),
                Err(e) => {
                    log::debug!("Cannot optimize flashing super: {}", e);
                    return Ok(None);
                }
            }
        }

        let layout = match builder.sparse_layout() {
            Ok(layout) => layout,
            Err(e) => {
                log::debug!("Cannot optimize flashing super: {}", e);
                return Ok(None);
            }
        };

        let mut covered = names
            .iter()
            .map(|name| builder.will_flash(name))
            .collect::<Vec<_>>()
            .into_iter();
        entries.retain(|_| !covered.next().unwrap_or(false));

        Ok(Some(Self { super_name, layout }))
    }

    /// Name of the super partition the layout is written to
    pub fn super_name(&self) -> &str {
        &self.super_name
    }

    /// The merged image
    pub fn layout(&self) -> &SparseImage {
        &self.layout
    }

    fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        let Self { super_name, layout } = self;
        log::info!(
            "Flashing optimized super layout to '{}' ({})",
            super_name,
            format_size(layout.len())
        );
        plan.flash_sparse(&super_name, layout)
    }
}

/// One step of a flashing session
#[derive(Debug)]
pub enum Task {
    /// Flash an image
    Flash(FlashTask),
    /// Reboot the device
    Reboot(RebootTask),
    /// Resize a logical partition
    Resize(ResizeTask),
    /// Delete a logical partition
    Delete(DeleteTask),
    /// Wipe and reformat a partition
    Wipe(WipeTask),
    /// Rebuild the super metadata
    UpdateSuper(UpdateSuperTask),
    /// Flash a merged super image
    FlashSuperLayout(FlashSuperLayoutTask),
}

impl Task {
    /// Execute the task against `plan`
    ///
    /// Consumes the task; a computed super layout is released once sent.
    pub fn run(self, plan: &mut FlashingPlan) -> Result<()> {
        match self {
            Task::Flash(task) => task.run(plan),
            Task::Reboot(task) => task.run(plan),
            Task::Resize(task) => task.run(plan),
            Task::Delete(task) => task.run(plan),
            Task::Wipe(task) => task.run(plan),
            Task::UpdateSuper(task) => task.run(plan),
            Task::FlashSuperLayout(task) => task.run(plan),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Flash(t) => match t.slot {
                SlotSpec::Active => write!(f, "flash {} {}", t.partition, t.image_name),
                slot => write!(f, "flash {} {} (slot {})", t.partition, t.image_name, slot),
            },
            Task::Reboot(t) if t.target.is_empty() => write!(f, "reboot"),
            Task::Reboot(t) => write!(f, "reboot {}", t.target),
            Task::Resize(t) => write!(f, "resize {} to {}", t.partition, t.size),
            Task::Delete(t) => write!(f, "delete {}", t.partition),
            Task::Wipe(t) => write!(f, "wipe {}", t.partition),
            Task::UpdateSuper(_) => write!(f, "update-super"),
            Task::FlashSuperLayout(t) => write!(f, "flash super layout to {}", t.super_name),
        }
    }
}

macro_rules! impl_from_task {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Task {
                fn from(task: $ty) -> Self {
                    Task::$variant(task)
                }
            }
        )*
    };
}

impl_from_task!(
    Flash(FlashTask),
    Reboot(RebootTask),
    Resize(ResizeTask),
    Delete(DeleteTask),
    Wipe(WipeTask),
    UpdateSuper(UpdateSuperTask),
    FlashSuperLayout(FlashSuperLayoutTask),
);

#[cfg(test)]
pub(crate) mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use super::*;
    use crate::device::FastbootDevice;
    use crate::image::{Image, ImageKind};
    use crate::plan::FlashOptions;
    use crate::source::MemorySource;

    /// Scripted device recording every command it receives
    pub(crate) struct MockDevice {
        vars: HashMap<String, String>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl MockDevice {
        pub(crate) fn new() -> Self {
            Self {
                vars: HashMap::new(),
                log: Rc::new(RefCell::new(Vec::new())),
            }
        }

        pub(crate) fn var(mut self, key: &str, value: &str) -> Self {
            self.vars.insert(key.to_string(), value.to_string());
            self
        }

        pub(crate) fn ab(self) -> Self {
            self.var("slot-count", "2").var("current-slot", "a")
        }

        pub(crate) fn log(&self) -> Rc<RefCell<Vec<String>>> {
            Rc::clone(&self.log)
        }
    }

    impl FastbootDevice for MockDevice {
        fn get_var(&mut self, key: &str) -> Result<String> {
            self.vars
                .get(key)
                .cloned()
                .ok_or_else(|| Error::command_failed(format!("getvar:{}", key), "unknown variable"))
        }

        fn raw_command(&mut self, command: &str, _message: &str) -> Result<String> {
            if command == "reboot-fastboot" {
                self.vars.insert("is-userspace".to_string(), "yes".to_string());
            }
            self.log.borrow_mut().push(command.to_string());
            Ok(String::new())
        }

        fn download(&mut self, label: &str, data: &[u8]) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("download:{}:{}", label, data.len()));
            Ok(())
        }

        fn download_sparse(&mut self, label: &str, image: &SparseImage) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("download-sparse:{}:{}", label, image.transfer_len()));
            Ok(())
        }

        fn wait_for_disconnect(&mut self) -> Result<()> {
            self.log.borrow_mut().push("wait".to_string());
            Ok(())
        }
    }

    const TEMPLATE: &str = r#"
[[partition]]
name = "system_a"

[[partition]]
name = "system_b"

[[partition]]
name = "vendor_a"

[[partition]]
name = "vendor_b"
"#;

    fn plan_with(device: MockDevice, source: MemorySource, options: FlashOptions) -> FlashingPlan {
        let mut plan = FlashingPlan::new(Box::new(device), Box::new(source), options);
        plan.determine_slot().unwrap();
        plan
    }

    fn run(plan: &mut FlashingPlan, task: impl Into<Task>) -> Result<()> {
        task.into().run(plan)
    }

    #[test]
    fn test_reboot_bootloader_waits_once() {
        let device = MockDevice::new();
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, RebootTask::new("bootloader")).unwrap();
        assert_eq!(*log.borrow(), vec!["reboot-bootloader", "wait"]);
    }

    #[test]
    fn test_reboot_recovery_waits_once() {
        let device = MockDevice::new();
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, RebootTask::new("recovery")).unwrap();
        assert_eq!(*log.borrow(), vec!["reboot-recovery", "wait"]);
    }

    #[test]
    fn test_reboot_plain() {
        let device = MockDevice::new();
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, RebootTask::new("")).unwrap();
        assert_eq!(*log.borrow(), vec!["reboot", "wait"]);
    }

    #[test]
    fn test_reboot_fastboot_when_already_userspace() {
        let device = MockDevice::new().var("is-userspace", "yes");
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, RebootTask::new("fastboot")).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_reboot_userspace_from_bootloader() {
        let device = MockDevice::new();
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, RebootTask::new("userspace")).unwrap();
        assert_eq!(*log.borrow(), vec!["reboot-fastboot", "wait"]);
    }

    #[test]
    fn test_reboot_unknown_target() {
        let device = MockDevice::new();
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        let err = run(&mut plan, RebootTask::new("sideways")).unwrap_err();
        assert!(matches!(err, Error::UnknownRebootTarget(t) if t == "sideways"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_wipe_empty_type_is_noop() {
        let device = MockDevice::new().var("partition-type:userdata", "");
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, WipeTask::new("userdata")).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_wipe_missing_partition_is_noop() {
        let device = MockDevice::new();
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, WipeTask::new("cache")).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_wipe_without_formatter_erases() {
        let device = MockDevice::new()
            .var("partition-type:userdata", "ext4")
            .var("partition-size:userdata", "0x100000");
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, WipeTask::new("userdata")).unwrap();
        assert_eq!(*log.borrow(), vec!["erase:userdata"]);
    }

    #[test]
    fn test_resize_skips_physical_partitions() {
        let device = MockDevice::new()
            .ab()
            .var("has-slot:system", "yes")
            .var("is-logical:system_a", "yes")
            .var("has-slot:boot", "yes");
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, ResizeTask::new("system", 0, SlotSpec::Active)).unwrap();
        run(&mut plan, ResizeTask::new("boot", 0, SlotSpec::Active)).unwrap();
        assert_eq!(*log.borrow(), vec!["resize-logical-partition:system_a:0"]);
    }

    #[test]
    fn test_delete_uses_literal_name() {
        let device = MockDevice::new().ab().var("has-slot:product", "yes");
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, DeleteTask::new("product")).unwrap();
        assert_eq!(*log.borrow(), vec!["delete-logical-partition:product"]);
    }

    fn dynamic_source() -> MemorySource {
        MemorySource::new()
            .with(SUPER_EMPTY_IMAGE, TEMPLATE)
            .with("system.img", vec![0x11; 8192])
            .with("vendor.img", vec![0x22; 4096])
    }

    #[test]
    fn test_flash_dynamic_partition_from_bootloader_refused() {
        let device = MockDevice::new().ab().var("has-slot:system", "yes");
        let log = device.log();
        let mut plan = plan_with(device, dynamic_source(), FlashOptions::default());

        let err = run(&mut plan, FlashTask::new(SlotSpec::Active, "system", "system.img", false))
            .unwrap_err();
        assert!(matches!(err, Error::DynamicPartitionInBootloader(ref p) if p == "system_a"));
        assert!(err.to_string().contains("fastboot reboot fastboot"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_flash_dynamic_partition_forced() {
        let device = MockDevice::new().ab().var("has-slot:system", "yes");
        let log = device.log();
        let options = FlashOptions {
            force: true,
            ..Default::default()
        };
        let mut plan = plan_with(device, dynamic_source(), options);

        run(&mut plan, FlashTask::new(SlotSpec::Active, "system", "system.img", false)).unwrap();
        assert_eq!(*log.borrow(), vec!["download:system_a:8192", "flash:system_a"]);
    }

    #[test]
    fn test_flash_all_slots_in_userspace() {
        let device = MockDevice::new()
            .ab()
            .var("is-userspace", "yes")
            .var("has-slot:vendor", "yes");
        let log = device.log();
        let mut plan = plan_with(device, dynamic_source(), FlashOptions::default());

        run(&mut plan, FlashTask::new(SlotSpec::All, "vendor", "vendor.img", false)).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                "download:vendor_a:4096",
                "flash:vendor_a",
                "download:vendor_b:4096",
                "flash:vendor_b"
            ]
        );
    }

    #[test]
    fn test_flash_boot_with_unparseable_template() {
        let device = MockDevice::new();
        let log = device.log();
        let source = MemorySource::new()
            .with(SUPER_EMPTY_IMAGE, vec![0x67, 0x44, 0x6c, 0x61, 0xff, 0xfe, 0, 0])
            .with("boot.img", vec![0x33; 4096]);
        let mut plan = plan_with(device, source, FlashOptions::default());

        run(&mut plan, FlashTask::new(SlotSpec::Active, "boot", "boot.img", false)).unwrap();
        assert_eq!(*log.borrow(), vec!["download:boot:4096", "flash:boot"]);
    }

    #[test]
    fn test_flash_missing_image() {
        let device = MockDevice::new();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        let err = run(&mut plan, FlashTask::new(SlotSpec::Active, "dtbo", "dtbo.img", false))
            .unwrap_err();
        assert!(matches!(err, Error::MissingImage(_)));
    }

    #[test]
    fn test_update_super_without_template_is_noop() {
        let device = MockDevice::new();
        let log = device.log();
        let mut plan = plan_with(device, MemorySource::new(), FlashOptions::default());

        run(&mut plan, UpdateSuperTask::new()).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_update_super_reboots_to_userspace_and_wipes() {
        let device = MockDevice::new();
        let log = device.log();
        let options = FlashOptions {
            wants_wipe: true,
            ..Default::default()
        };
        let mut plan = plan_with(device, dynamic_source(), options);

        run(&mut plan, UpdateSuperTask::new()).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![
                "reboot-fastboot".to_string(),
                "wait".to_string(),
                format!("download:super:{}", TEMPLATE.len()),
                "update-super:super:wipe".to_string(),
            ]
        );
    }

    fn entries(names: &[&str], slot: SlotSpec) -> Vec<ImageEntry> {
        names
            .iter()
            .map(|n| ImageEntry::new(Image::new(*n, true, ImageKind::Normal), slot))
            .collect()
    }

    #[test]
    fn test_super_layout_not_for_all_slots() {
        let device = MockDevice::new()
            .ab()
            .var("partition-size:super", "0x4000000");
        let options = FlashOptions {
            slot: SlotSpec::All,
            ..Default::default()
        };
        let mut plan = plan_with(device, dynamic_source(), options);
        let mut list = entries(&["system", "vendor"], SlotSpec::All);

        let task = FlashSuperLayoutTask::initialize(&mut plan, &mut list).unwrap();
        assert!(task.is_none());
        assert_eq!(list, entries(&["system", "vendor"], SlotSpec::All));
    }

    #[test]
    fn test_super_layout_not_on_single_slot_device() {
        let device = MockDevice::new().var("partition-size:super", "0x4000000");
        let mut plan = plan_with(device, dynamic_source(), FlashOptions::default());
        let mut list = entries(&["system"], SlotSpec::Active);

        assert!(FlashSuperLayoutTask::initialize(&mut plan, &mut list)
            .unwrap()
            .is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_super_layout_removes_covered_entries_in_order() {
        let device = MockDevice::new()
            .ab()
            .var("partition-size:super", "0x4000000");
        let mut plan = plan_with(device, dynamic_source(), FlashOptions::default());
        let mut list = entries(&["odm", "system", "product", "vendor"], SlotSpec::Active);

        let task = FlashSuperLayoutTask::initialize(&mut plan, &mut list)
            .unwrap()
            .unwrap();
        assert_eq!(task.super_name(), "super");
        assert_eq!(task.layout().len(), 0x4000000);
        assert_eq!(list, entries(&["odm", "product"], SlotSpec::Active));
    }

    #[test]
    fn test_super_layout_without_super_size() {
        let device = MockDevice::new().ab();
        let mut plan = plan_with(device, dynamic_source(), FlashOptions::default());
        let mut list = entries(&["system"], SlotSpec::Active);

        assert!(FlashSuperLayoutTask::initialize(&mut plan, &mut list)
            .unwrap()
            .is_none());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_super_layout_template_for_other_super() {
        let device = MockDevice::new()
            .ab()
            .var("partition-size:super", "0x4000000");
        let template = format!("[geometry]\nname = \"system_super\"\n{}", TEMPLATE);
        let source = dynamic_source().with(SUPER_EMPTY_IMAGE, template);
        let mut plan = plan_with(device, source, FlashOptions::default());
        let mut list = entries(&["system", "vendor"], SlotSpec::Active);

        assert!(FlashSuperLayoutTask::initialize(&mut plan, &mut list)
            .unwrap()
            .is_none());
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_display() {
        let task: Task = FlashTask::new(SlotSpec::Other, "boot", "boot.img", true).into();
        assert_eq!(task.to_string(), "flash boot boot.img (slot other)");
        assert_eq!(Task::from(RebootTask::new("")).to_string(), "reboot");
        assert_eq!(Task::from(WipeTask::new("cache")).to_string(), "wipe cache");
    }
}
