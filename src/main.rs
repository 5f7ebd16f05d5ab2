//! rfastboot - Fastboot flashing tool
//!
//! Turns a flashing request into an ordered queue of device operations and
//! runs it against a fastboot device. On A/B devices with dynamic partitions
//! the logical partitions are merged into one super image where possible.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use rfastboot_core::{DirImageSource, FlashOptions, FlashingPlan, VbmetaFlags};
use rfastboot_flash::open_device;
use std::path::PathBuf;

fn main() {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Commands::ListDevices = cli.command {
        commands::list_devices();
        return Ok(());
    }

    let mut plan = open_plan(&cli)?;

    match cli.command {
        Commands::Getvar { key } => commands::cmd_getvar(&mut plan, &key),
        Commands::Flash { partition, file } => {
            commands::cmd_flash(&mut plan, &partition, file.as_deref())
        }
        Commands::Flashall { skip_reboot } => {
            plan.options.reboot = !skip_reboot;
            commands::cmd_flashall(&mut plan)
        }
        Commands::UpdateSuper => commands::cmd_update_super(&mut plan),
        Commands::Format { partition } => commands::cmd_format(&mut plan, &partition),
        Commands::ResizeLogicalPartition { partition, size } => {
            commands::cmd_resize(&mut plan, &partition, size)
        }
        Commands::DeleteLogicalPartition { partition } => {
            commands::cmd_delete(&mut plan, &partition)
        }
        Commands::Reboot { target } => {
            commands::cmd_reboot(&mut plan, target.as_deref().unwrap_or(""))
        }
        Commands::ListDevices => Ok(()),
    }
}

/// Open the device and build the session from the global options
fn open_plan(cli: &Cli) -> Result<FlashingPlan, Box<dyn std::error::Error>> {
    let product_out = cli
        .product_out
        .clone()
        .or_else(|| std::env::var_os("ANDROID_PRODUCT_OUT").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    let mut vbmeta = VbmetaFlags::empty();
    if cli.disable_verity {
        vbmeta |= VbmetaFlags::DISABLE_VERITY;
    }
    if cli.disable_verification {
        vbmeta |= VbmetaFlags::DISABLE_VERIFICATION;
    }

    let options = FlashOptions {
        slot: cli.slot.unwrap_or_default(),
        wants_wipe: cli.wipe,
        force: cli.force,
        fs_options: cli.fs_options.unwrap_or_default(),
        sparse_limit: cli.sparse_limit,
        vbmeta,
        reboot: false,
    };

    let source = DirImageSource::new(product_out);
    log::debug!("Reading images from {}", source.root().display());

    let device = open_device(&cli.device)?;
    Ok(FlashingPlan::new(device, Box::new(source), options)
        .with_formatter(Box::new(commands::MkfsFormatter::new()))
        .with_progress(Box::new(commands::IndicatifProgress::new())))
}
