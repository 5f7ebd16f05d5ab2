//! rfastboot-dummy - In-memory fastboot device emulator for testing
//!
//! This crate provides a fake fastboot device that keeps its partitions in
//! memory. It understands the bootloader and fastbootd command sets closely
//! enough to run complete flashing sessions without hardware.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use rfastboot_core::device::{vars, FastbootDevice};
use rfastboot_core::error::{Error, Result};
use rfastboot_core::fs::{FsFormatter, FsOptions};
use rfastboot_core::size::parse_size;
use rfastboot_core::sparse::{SparseImage, DEFAULT_BLOCK_SIZE};
use rfastboot_core::super_layout::{LayoutMetadata, SuperTemplate};

const MIB: u64 = 1024 * 1024;

/// Which software the device is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Bootloader fastboot
    Bootloader,
    /// Userspace fastboot (fastbootd)
    Userspace,
    /// Recovery, not accepting fastboot commands
    Recovery,
    /// Normal boot, not accepting fastboot commands
    System,
}

/// A fixed partition of the emulated device
#[derive(Debug, Clone)]
pub struct PartitionConfig {
    /// Partition name including any slot suffix
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Filesystem type reported by `partition-type`
    pub fs_type: Option<String>,
}

impl PartitionConfig {
    /// A partition of `size` bytes without a filesystem
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            fs_type: None,
        }
    }

    /// A partition formatted as `fs_type`
    pub fn with_fs(name: impl Into<String>, size: u64, fs_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            fs_type: Some(fs_type.into()),
        }
    }
}

/// Configuration for the dummy device
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Number of slots; below 2 means no A/B
    pub slot_count: u8,
    /// Active slot letter
    pub current_slot: Option<char>,
    /// Mode the device starts in
    pub mode: Mode,
    /// Largest accepted download
    pub max_download_size: u64,
    /// Name reported by `super-partition-name`; `None` answers FAIL
    pub super_name: Option<String>,
    /// Size of the super partition; 0 means the device has none
    pub super_size: u64,
    /// Fixed partitions besides super
    pub partitions: Vec<PartitionConfig>,
    /// Logical partitions already present inside super
    pub logical_partitions: Vec<PartitionConfig>,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self::ab()
    }
}

impl DummyConfig {
    /// An A/B device on slot a with a 64 MiB super partition
    pub fn ab() -> Self {
        let mut partitions = Vec::new();
        for slot in ['a', 'b'] {
            partitions.push(PartitionConfig::new(format!("boot_{}", slot), 64 * MIB));
            partitions.push(PartitionConfig::new(format!("init_boot_{}", slot), 8 * MIB));
            partitions.push(PartitionConfig::new(format!("dtbo_{}", slot), 8 * MIB));
            partitions.push(PartitionConfig::new(format!("vbmeta_{}", slot), 64 * 1024));
            partitions.push(PartitionConfig::new(format!("vendor_boot_{}", slot), 64 * MIB));
        }
        partitions.extend(Self::data_partitions());

        let logical_partitions = ["system", "vendor", "product"]
            .iter()
            .flat_map(|base| ['a', 'b'].map(|slot| format!("{}_{}", base, slot)))
            .map(|name| PartitionConfig::new(name, 0))
            .collect();

        Self {
            slot_count: 2,
            current_slot: Some('a'),
            mode: Mode::Bootloader,
            max_download_size: 256 * MIB,
            super_name: Some("super".to_string()),
            super_size: 64 * MIB,
            partitions,
            logical_partitions,
        }
    }

    /// A device without slots
    pub fn single() -> Self {
        let mut partitions = vec![
            PartitionConfig::new("boot", 64 * MIB),
            PartitionConfig::new("dtbo", 8 * MIB),
            PartitionConfig::new("vbmeta", 64 * 1024),
            PartitionConfig::new("recovery", 64 * MIB),
        ];
        partitions.extend(Self::data_partitions());

        let logical_partitions = ["system", "vendor", "product"]
            .iter()
            .map(|name| PartitionConfig::new(*name, 0))
            .collect();

        Self {
            slot_count: 0,
            current_slot: None,
            partitions,
            logical_partitions,
            ..Self::ab()
        }
    }

    fn data_partitions() -> Vec<PartitionConfig> {
        vec![
            PartitionConfig::with_fs("userdata", 256 * MIB, "ext4"),
            PartitionConfig::with_fs("metadata", 16 * MIB, "ext4"),
            PartitionConfig::new("misc", MIB),
        ]
    }

    /// Add or replace a fixed partition
    pub fn with_partition(mut self, partition: PartitionConfig) -> Self {
        self.partitions.retain(|p| p.name != partition.name);
        self.partitions.push(partition);
        self
    }

    /// Change the largest accepted download
    pub fn with_max_download_size(mut self, size: u64) -> Self {
        self.max_download_size = size;
        self
    }

    /// Change the super partition size
    pub fn with_super_size(mut self, size: u64) -> Self {
        self.super_size = size;
        self
    }

    /// Start in `mode`
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Build a configuration from `key=value` options
    ///
    /// Recognised keys: `slots`, `slot`, `mode` (bootloader or fastbootd),
    /// `max-download`, `super`, `super-size`.
    pub fn from_options(options: &[(&str, &str)]) -> Result<Self> {
        let mut config = Self::ab();
        for &(key, value) in options {
            match key {
                "slots" => {
                    let count: u8 = value.parse().map_err(|_| {
                        Error::InvalidOption(format!("invalid slot count '{}'", value))
                    })?;
                    config = if count < 2 {
                        Self {
                            max_download_size: config.max_download_size,
                            super_name: config.super_name,
                            super_size: config.super_size,
                            mode: config.mode,
                            ..Self::single()
                        }
                    } else {
                        Self {
                            slot_count: count,
                            ..config
                        }
                    };
                }
                "slot" => {
                    let letter = value
                        .trim_start_matches('_')
                        .chars()
                        .next()
                        .filter(char::is_ascii_lowercase)
                        .ok_or_else(|| Error::InvalidOption(format!("invalid slot '{}'", value)))?;
                    config.current_slot = Some(letter);
                }
                "mode" => {
                    config.mode = match value {
                        "bootloader" => Mode::Bootloader,
                        "fastbootd" | "userspace" => Mode::Userspace,
                        other => {
                            return Err(Error::InvalidOption(format!("unknown mode '{}'", other)))
                        }
                    };
                }
                "max-download" => config.max_download_size = parse_size(value)?,
                "super" => config.super_name = Some(value.to_string()),
                "super-size" => config.super_size = parse_size(value)?,
                other => {
                    return Err(Error::InvalidOption(format!(
                        "unknown dummy option '{}'",
                        other
                    )))
                }
            }
        }
        Ok(config)
    }
}

#[derive(Debug)]
struct PartitionState {
    logical: bool,
    size: u64,
    fs_type: Option<String>,
    data: Vec<u8>,
}

#[derive(Debug)]
enum Staged {
    Raw(Vec<u8>),
    Sparse(SparseImage),
}

#[derive(Debug)]
struct State {
    config: DummyConfig,
    mode: Mode,
    /// Mode entered once the host sees the disconnect
    rebooting: Option<Mode>,
    partitions: BTreeMap<String, PartitionState>,
    staged: Option<Staged>,
    commands: Vec<String>,
    flashed: Vec<String>,
}

/// Dummy fastboot device
///
/// Clones share the same device, so a test can keep a handle for inspection
/// after giving one to a [`rfastboot_core::FlashingPlan`].
#[derive(Debug, Clone)]
pub struct DummyDevice {
    state: Rc<RefCell<State>>,
}

impl DummyDevice {
    /// Create a device with the given configuration
    pub fn new(config: DummyConfig) -> Self {
        let mut partitions = BTreeMap::new();
        for p in &config.partitions {
            partitions.insert(
                p.name.clone(),
                PartitionState {
                    logical: false,
                    size: p.size,
                    fs_type: p.fs_type.clone(),
                    data: Vec::new(),
                },
            );
        }
        for p in &config.logical_partitions {
            partitions.insert(
                p.name.clone(),
                PartitionState {
                    logical: true,
                    size: p.size,
                    fs_type: p.fs_type.clone(),
                    data: Vec::new(),
                },
            );
        }
        if config.super_size > 0 {
            let name = config.super_name.clone().unwrap_or_else(|| "super".to_string());
            partitions.insert(
                name,
                PartitionState {
                    logical: false,
                    size: config.super_size,
                    fs_type: None,
                    data: Vec::new(),
                },
            );
        }

        let state = State {
            mode: config.mode,
            config,
            rebooting: None,
            partitions,
            staged: None,
            commands: Vec::new(),
            flashed: Vec::new(),
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Create a device with the default A/B configuration
    pub fn new_default() -> Self {
        Self::new(DummyConfig::default())
    }

    /// Current mode
    pub fn mode(&self) -> Mode {
        self.state.borrow().mode
    }

    /// Every command received, in order
    ///
    /// Downloads appear as `download:<label>:<bytes>` or
    /// `download-sparse:<label>:<bytes>`.
    pub fn commands(&self) -> Vec<String> {
        self.state.borrow().commands.clone()
    }

    /// Partitions written by `flash`, including those unpacked from super
    pub fn flashed(&self) -> Vec<String> {
        self.state.borrow().flashed.clone()
    }

    /// Contents of a partition, as far as it was written
    pub fn partition_data(&self, name: &str) -> Option<Vec<u8>> {
        self.state.borrow().partitions.get(name).map(|p| p.data.clone())
    }

    /// Size of a partition
    pub fn partition_size(&self, name: &str) -> Option<u64> {
        self.state.borrow().partitions.get(name).map(|p| p.size)
    }

    /// Names of the logical partitions
    pub fn logical_partitions(&self) -> Vec<String> {
        self.state
            .borrow()
            .partitions
            .iter()
            .filter(|(_, p)| p.logical)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl State {
    fn check_session(&self) -> Result<()> {
        if self.rebooting.is_some() {
            return Err(Error::Transport("device is rebooting".to_string()));
        }
        match self.mode {
            Mode::Bootloader | Mode::Userspace => Ok(()),
            Mode::Recovery | Mode::System => {
                Err(Error::Transport("device is not in fastboot mode".to_string()))
            }
        }
    }

    fn userspace(&self) -> bool {
        self.mode == Mode::Userspace
    }

    fn super_name(&self) -> String {
        self.config
            .super_name
            .clone()
            .unwrap_or_else(|| "super".to_string())
    }

    /// Logical partitions are only known to fastbootd
    fn partition(&self, name: &str) -> Option<&PartitionState> {
        self.partitions
            .get(name)
            .filter(|p| !p.logical || self.userspace())
    }

    fn partition_mut(&mut self, name: &str) -> Option<&mut PartitionState> {
        let userspace = self.userspace();
        self.partitions
            .get_mut(name)
            .filter(|p| !p.logical || userspace)
    }

    fn current_slot(&self) -> Option<char> {
        self.config.current_slot.filter(|_| self.config.slot_count >= 2)
    }

    fn get_var(&self, key: &str) -> Result<String> {
        let fail = || Error::command_failed(format!("getvar:{}", key), "unknown variable");
        let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();

        let (name, arg) = key.split_once(':').unwrap_or((key, ""));
        match name {
            vars::SLOT_COUNT => Ok(self.config.slot_count.to_string()),
            vars::CURRENT_SLOT => self.current_slot().map(String::from).ok_or_else(fail),
            vars::IS_USERSPACE => Ok(yes_no(self.userspace())),
            vars::MAX_DOWNLOAD_SIZE => Ok(format!("0x{:x}", self.config.max_download_size)),
            vars::SUPER_PARTITION_NAME => self.config.super_name.clone().ok_or_else(fail),
            // Slot layout is a property of the device in either mode
            vars::HAS_SLOT => {
                let slotted = self.partitions.keys().any(|p| {
                    p.strip_prefix(arg)
                        .and_then(|rest| rest.strip_prefix('_'))
                        .is_some_and(|s| s.len() == 1)
                });
                if slotted {
                    Ok(yes_no(true))
                } else if self.partitions.contains_key(arg) {
                    Ok(yes_no(false))
                } else {
                    Err(fail())
                }
            }
            vars::IS_LOGICAL => self.partition(arg).map(|p| yes_no(p.logical)).ok_or_else(fail),
            vars::PARTITION_SIZE => self
                .partition(arg)
                .map(|p| format!("0x{:x}", p.size))
                .ok_or_else(fail),
            vars::PARTITION_TYPE => self
                .partition(arg)
                .map(|p| p.fs_type.clone().unwrap_or_default())
                .ok_or_else(fail),
            "product" => Ok("dummy".to_string()),
            _ => Err(fail()),
        }
    }

    fn command(&mut self, command: &str) -> Result<String> {
        let fail = |reason: &str| Err(Error::command_failed(command, reason));
        let (verb, arg) = command.split_once(':').unwrap_or((command, ""));

        match verb {
            "flash" => self.flash(command, arg),
            "erase" => match self.partition_mut(arg) {
                Some(p) => {
                    p.data.clear();
                    Ok(String::new())
                }
                None => fail("partition does not exist"),
            },
            "resize-logical-partition" => {
                let Some((name, size)) = arg.rsplit_once(':') else {
                    return fail("missing size");
                };
                let Ok(size) = size.parse::<u64>() else {
                    return fail("invalid size");
                };
                if !self.userspace() {
                    return fail("unknown command");
                }
                match self.partitions.get_mut(name).filter(|p| p.logical) {
                    Some(p) => {
                        p.size = size;
                        p.data.truncate(size as usize);
                        Ok(String::new())
                    }
                    None => fail("no such logical partition"),
                }
            }
            "delete-logical-partition" => {
                if !self.userspace() {
                    return fail("unknown command");
                }
                match self.partitions.get(arg) {
                    Some(p) if p.logical => {
                        self.partitions.remove(arg);
                        Ok(String::new())
                    }
                    _ => fail("no such logical partition"),
                }
            }
            "update-super" => self.update_super(command, arg),
            "reboot" => self.reboot(Mode::System),
            "reboot-bootloader" => self.reboot(Mode::Bootloader),
            "reboot-fastboot" => self.reboot(Mode::Userspace),
            "reboot-recovery" => self.reboot(Mode::Recovery),
            _ => fail("unknown command"),
        }
    }

    fn reboot(&mut self, mode: Mode) -> Result<String> {
        self.rebooting = Some(mode);
        Ok(String::new())
    }

    fn flash(&mut self, command: &str, name: &str) -> Result<String> {
        let Some(staged) = self.staged.take() else {
            return Err(Error::command_failed(command, "no data downloaded"));
        };
        let super_name = self.super_name();
        let Some(partition) = self.partition_mut(name) else {
            return Err(Error::command_failed(command, "partition does not exist"));
        };

        let len = match &staged {
            Staged::Raw(data) => data.len() as u64,
            Staged::Sparse(image) => image.len(),
        };
        if !partition.logical && len > partition.size {
            return Err(Error::command_failed(command, "image too large for partition"));
        }

        match staged {
            Staged::Raw(data) => partition.data = data,
            Staged::Sparse(image) => image.apply(&mut partition.data),
        }
        if partition.logical {
            partition.size = partition.size.max(partition.data.len() as u64);
        }
        self.flashed.push(name.to_string());

        if name == super_name {
            self.unpack_super();
        }
        Ok(String::new())
    }

    /// Rebuild the logical partition table from the metadata in super
    fn unpack_super(&mut self) {
        let Some(data) = self.partitions.get(&self.super_name()).map(|p| p.data.clone()) else {
            return;
        };
        let metadata = match LayoutMetadata::from_bytes(&data) {
            Ok(metadata) => metadata,
            Err(e) => {
                log::warn!("dummy: super holds no layout: {}", e);
                return;
            }
        };

        self.partitions.retain(|_, p| !p.logical);
        let block_size = metadata.block_size as u64;
        for extent in metadata.extents {
            let start = (extent.first_block * block_size) as usize;
            let end = start + extent.image_size as usize;
            let mut contents = data.get(start..end.min(data.len())).unwrap_or_default().to_vec();
            contents.resize(extent.image_size as usize, 0);

            self.flashed.push(extent.partition.clone());
            self.partitions.insert(
                extent.partition,
                PartitionState {
                    logical: true,
                    size: extent.blocks * block_size,
                    fs_type: None,
                    data: contents,
                },
            );
        }
    }

    fn update_super(&mut self, command: &str, arg: &str) -> Result<String> {
        if !self.userspace() {
            return Err(Error::command_failed(command, "unknown command"));
        }
        let (name, wipe) = match arg.split_once(':') {
            Some((name, "wipe")) => (name, true),
            Some(_) => return Err(Error::command_failed(command, "invalid option")),
            None => (arg, false),
        };
        if name != self.super_name() {
            return Err(Error::command_failed(command, "not the super partition"));
        }
        let Some(Staged::Raw(data)) = self.staged.take() else {
            return Err(Error::command_failed(command, "no metadata downloaded"));
        };
        let template = SuperTemplate::from_bytes(&data)
            .map_err(|e| Error::command_failed(command, e.to_string()))?;

        if wipe {
            self.partitions.retain(|_, p| !p.logical);
        }
        for partition in &template.partitions {
            self.partitions
                .entry(partition.name.clone())
                .or_insert_with(|| PartitionState {
                    logical: true,
                    size: 0,
                    fs_type: None,
                    data: Vec::new(),
                });
        }
        Ok(String::new())
    }
}

impl FastbootDevice for DummyDevice {
    fn get_var(&mut self, key: &str) -> Result<String> {
        let state = self.state.borrow();
        state.check_session()?;
        state.get_var(key)
    }

    fn raw_command(&mut self, command: &str, message: &str) -> Result<String> {
        let mut state = self.state.borrow_mut();
        state.check_session()?;
        log::debug!("dummy: {} ({})", command, message);
        state.commands.push(command.to_string());
        state.command(command)
    }

    fn download(&mut self, label: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.check_session()?;
        state
            .commands
            .push(format!("download:{}:{}", label, data.len()));
        if data.len() as u64 > state.config.max_download_size {
            return Err(Error::command_failed(
                format!("download:{:08x}", data.len()),
                "data too large",
            ));
        }
        state.staged = Some(Staged::Raw(data.to_vec()));
        Ok(())
    }

    fn download_sparse(&mut self, label: &str, image: &SparseImage) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.check_session()?;
        let len = image.transfer_len();
        state
            .commands
            .push(format!("download-sparse:{}:{}", label, len));
        if len > state.config.max_download_size {
            return Err(Error::command_failed(
                format!("download:{:08x}", len),
                "data too large",
            ));
        }
        state.staged = Some(Staged::Sparse(image.clone()));
        Ok(())
    }

    fn wait_for_disconnect(&mut self) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let mode = state
            .rebooting
            .take()
            .ok_or_else(|| Error::Transport("device did not disconnect".to_string()))?;
        state.commands.push("wait-for-disconnect".to_string());
        state.mode = mode;
        state.staged = None;
        Ok(())
    }
}

/// Formatter producing marker filesystems and recording every request
#[derive(Debug, Clone, Default)]
pub struct DummyFormatter {
    requests: Rc<RefCell<Vec<(String, u64, FsOptions)>>>,
}

impl DummyFormatter {
    /// Create a formatter
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(fs_type, size, options)` requested so far
    pub fn requests(&self) -> Vec<(String, u64, FsOptions)> {
        self.requests.borrow().clone()
    }
}

impl FsFormatter for DummyFormatter {
    fn generate(&self, fs_type: &str, size: u64, options: FsOptions) -> Result<Option<SparseImage>> {
        self.requests
            .borrow_mut()
            .push((fs_type.to_string(), size, options));
        if !matches!(fs_type, "ext4" | "f2fs") {
            return Ok(None);
        }
        let mut image = SparseImage::new(DEFAULT_BLOCK_SIZE, size)?;
        image.add_data(0, format!("{} {:?}", fs_type, options).as_bytes())?;
        Ok(Some(image))
    }
}
