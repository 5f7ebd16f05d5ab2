//! Error types for rfastboot-core

use thiserror::Error;

/// Remediation shown when a dynamic partition is flashed from the bootloader
const DYNAMIC_PARTITION_HELP: &str = "should be flashed via fastbootd. Please run:\n\
    \n    fastboot reboot fastboot\n\n\
    And try again. If you are intentionally trying to overwrite a fixed partition, use --force.";

/// Flashing errors
///
/// A task either completes or returns one of these; the queue stops at the
/// first error.
#[derive(Debug, Error)]
pub enum Error {
    /// Reboot target is not one of "", bootloader, recovery, fastboot, userspace
    #[error("unknown reboot target: {0}")]
    UnknownRebootTarget(String),

    /// Slot specifier does not name a slot on this device
    #[error("invalid slot '{slot}' (device has {count} slot(s))")]
    InvalidSlot {
        /// Slot as given by the user
        slot: String,
        /// Number of slots on the device
        count: u8,
    },

    /// Partition name embeds a slot suffix that contradicts the requested slot
    #[error("partition '{partition}' is on slot '{embedded}' but slot '{requested}' was requested")]
    SlotMismatch {
        /// Partition name with embedded suffix
        partition: String,
        /// Slot taken from the suffix
        embedded: String,
        /// Slot that was requested
        requested: String,
    },

    /// The active slot is needed but the device did not report one
    #[error("failed to identify current slot")]
    UnknownCurrentSlot,

    /// `has-slot` could not be queried while expanding "all"
    #[error("could not check if partition '{0}' has slots")]
    SlotQueryFailed(String),

    /// A single partition name was needed but the slot is "all"
    #[error("cannot resolve a single partition name for '{0}' with slot 'all'")]
    AmbiguousSlot(String),

    /// Refusal to flash a dynamic partition while in the bootloader
    #[error("the partition you are trying to flash ({0}) is dynamic, and {help}", help = DYNAMIC_PARTITION_HELP)]
    DynamicPartitionInBootloader(String),

    /// A required image is not present in the image source
    #[error("image '{0}' not found")]
    MissingImage(String),

    /// The vbmeta image cannot be patched
    #[error("vbmeta: {0}")]
    Vbmeta(String),

    /// The device answered FAIL
    #[error("command '{command}' failed: {reason}")]
    CommandFailed {
        /// Command or variable query that failed
        command: String,
        /// Reason reported by the device
        reason: String,
    },

    /// Communication with the device broke down
    #[error("transport error: {0}")]
    Transport(String),

    /// The super-partition template could not be parsed
    #[error("invalid super template: {0}")]
    Template(String),

    /// The super-partition layout could not be computed
    #[error("super layout: {0}")]
    Layout(String),

    /// Invalid sparse image operation
    #[error("sparse image: {0}")]
    Sparse(String),

    /// A size or number could not be parsed
    #[error("invalid size: {0}")]
    InvalidSize(String),

    /// An option value is not recognised
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Host I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a `CommandFailed` error
    pub fn command_failed(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            reason: reason.into(),
        }
    }

    /// Whether the device itself rejected the request
    ///
    /// Variable queries with a defined default fall back to it only for these
    /// errors; transport failures always propagate.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
