//! CLI argument parsing

use clap::{Parser, Subcommand};
use rfastboot_core::size::parse_size;
use rfastboot_core::{FsOptions, SlotSpec};
use std::path::PathBuf;

/// Parse a slot specifier ("a", "_b", "other", "all")
fn parse_slot(s: &str) -> Result<SlotSpec, String> {
    s.parse().map_err(|e| format!("{}", e))
}

/// Parse a size such as "256M", "0x1000" or "1 GiB"
fn parse_size_arg(s: &str) -> Result<u64, String> {
    parse_size(s).map_err(|e| format!("{}", e))
}

/// Parse a comma-separated filesystem option list
fn parse_fs_options(s: &str) -> Result<FsOptions, String> {
    s.parse().map_err(|e| format!("{}", e))
}

/// Generate dynamic help text for the device argument
fn device_help() -> String {
    format!(
        "Device to talk to, as name[:key=value,...] [available: {}]",
        rfastboot_flash::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "rfastboot")]
#[command(author, version, about = "Fastboot flashing tool", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 's', long, global = true, default_value = "dummy", help = device_help())]
    pub device: String,

    /// Slot to flash: a, b, other or all (default: the active slot)
    #[arg(long, global = true, value_parser = parse_slot)]
    pub slot: Option<SlotSpec>,

    /// Wipe user data
    #[arg(short = 'w', long = "wipe", global = true)]
    pub wipe: bool,

    /// Flash dynamic partitions from the bootloader anyway
    #[arg(long, global = true)]
    pub force: bool,

    /// Set the disable-verity flag in vbmeta images
    #[arg(long, global = true)]
    pub disable_verity: bool,

    /// Set the disable-verification flag in vbmeta images
    #[arg(long, global = true)]
    pub disable_verification: bool,

    /// Split images into sparse pieces of at most this size
    #[arg(short = 'S', long, global = true, value_parser = parse_size_arg)]
    pub sparse_limit: Option<u64>,

    /// Filesystem features for wiped partitions (casefold,projid,compress)
    #[arg(long, global = true, value_parser = parse_fs_options)]
    pub fs_options: Option<FsOptions>,

    /// Directory holding the images
    /// Defaults to $ANDROID_PRODUCT_OUT, then the current directory
    #[arg(long, global = true)]
    pub product_out: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print a device variable
    Getvar {
        /// Variable name (e.g. current-slot, partition-size:super)
        key: String,
    },

    /// Flash an image to a partition
    Flash {
        /// Partition base name
        partition: String,

        /// Image file (default: <partition>.img in the product directory)
        file: Option<PathBuf>,
    },

    /// Flash every image from the product directory
    Flashall {
        /// Stay in fastboot once flashing is done
        #[arg(long)]
        skip_reboot: bool,
    },

    /// Rebuild the super partition metadata from super_empty.img
    UpdateSuper,

    /// Erase a partition and write an empty filesystem
    Format {
        /// Partition name
        partition: String,
    },

    /// Resize a logical partition
    ResizeLogicalPartition {
        /// Partition base name
        partition: String,

        /// New size (e.g. "512M", "0x20000000")
        #[arg(value_parser = parse_size_arg)]
        size: u64,
    },

    /// Delete a logical partition
    DeleteLogicalPartition {
        /// Partition name
        partition: String,
    },

    /// Reboot the device
    Reboot {
        /// bootloader, recovery, fastboot (default: normal boot)
        target: Option<String>,
    },

    /// List supported device backends
    ListDevices,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_global_options() {
        let cli = Cli::try_parse_from([
            "rfastboot",
            "--slot",
            "other",
            "-w",
            "-S",
            "256M",
            "--fs-options",
            "casefold,projid",
            "flashall",
            "--skip-reboot",
        ])
        .unwrap();
        assert_eq!(cli.slot, Some(SlotSpec::Other));
        assert!(cli.wipe);
        assert_eq!(cli.sparse_limit, Some(256 * 1024 * 1024));
        assert_eq!(cli.fs_options, Some(FsOptions::CASEFOLD | FsOptions::PROJID));
        assert!(matches!(cli.command, Commands::Flashall { skip_reboot: true }));
    }

    #[test]
    fn test_invalid_slot_rejected() {
        assert!(Cli::try_parse_from(["rfastboot", "--slot", "9", "getvar", "product"]).is_err());
    }
}
