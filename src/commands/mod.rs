//! CLI command implementations
//!
//! Every command builds a task queue and runs it against the session, so
//! single-partition commands go through the same checks as `flashall`.

mod list;
mod mkfs;
mod progress;

pub use list::list_devices;
pub use mkfs::MkfsFormatter;
pub use progress::IndicatifProgress;

use rfastboot_core::device::get_var_opt;
use rfastboot_core::flashall::WIPE_PARTITIONS;
use rfastboot_core::task::{
    DeleteTask, FlashTask, RebootTask, ResizeTask, UpdateSuperTask, WipeTask,
};
use rfastboot_core::{default_images, plan_flashall, FlashingPlan, RebootTarget, TaskQueue};
use std::path::Path;

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Print a device variable
pub fn cmd_getvar(plan: &mut FlashingPlan, key: &str) -> CmdResult {
    match get_var_opt(plan.device.as_mut(), key)? {
        Some(value) => println!("{}: {}", key, value),
        None => return Err(format!("getvar:{} FAILED", key).into()),
    }
    Ok(())
}

/// Flash one partition from a file or the product directory
pub fn cmd_flash(plan: &mut FlashingPlan, partition: &str, file: Option<&Path>) -> CmdResult {
    plan.determine_slot()?;
    let image_name = match file {
        Some(path) => std::env::current_dir()?.join(path).to_string_lossy().into_owned(),
        None => format!("{}.img", partition),
    };

    let mut queue = TaskQueue::new();
    queue.push(FlashTask::new(plan.options.slot, partition, image_name, true));
    queue.run(plan)?;
    Ok(())
}

/// Flash the full image set
pub fn cmd_flashall(plan: &mut FlashingPlan) -> CmdResult {
    let queue = plan_flashall(plan, &default_images())?;
    println!("Flashing {} step(s)", queue.len());
    queue.run(plan)?;
    println!("Finished flashing");
    Ok(())
}

/// Rebuild the super metadata, wiping user data if requested
pub fn cmd_update_super(plan: &mut FlashingPlan) -> CmdResult {
    let mut queue = TaskQueue::new();
    queue.push(UpdateSuperTask::new());
    if plan.options.wants_wipe {
        for partition in WIPE_PARTITIONS {
            queue.push(WipeTask::new(partition));
        }
    }
    queue.run(plan)?;
    Ok(())
}

/// Erase a partition and write an empty filesystem
pub fn cmd_format(plan: &mut FlashingPlan, partition: &str) -> CmdResult {
    let mut queue = TaskQueue::new();
    queue.push(WipeTask::new(partition));
    queue.run(plan)?;
    Ok(())
}

/// Resize a logical partition on the selected slot
pub fn cmd_resize(plan: &mut FlashingPlan, partition: &str, size: u64) -> CmdResult {
    plan.determine_slot()?;
    let mut queue = TaskQueue::new();
    queue.push(ResizeTask::new(partition, size, plan.options.slot));
    queue.run(plan)?;
    Ok(())
}

/// Delete a logical partition
pub fn cmd_delete(plan: &mut FlashingPlan, partition: &str) -> CmdResult {
    let mut queue = TaskQueue::new();
    queue.push(DeleteTask::new(partition));
    queue.run(plan)?;
    Ok(())
}

/// Reboot into `target`
pub fn cmd_reboot(plan: &mut FlashingPlan, target: &str) -> CmdResult {
    // Reject unknown targets before touching the device
    target.parse::<RebootTarget>()?;
    let mut queue = TaskQueue::new();
    queue.push(RebootTask::new(target));
    queue.run(plan)?;
    Ok(())
}
