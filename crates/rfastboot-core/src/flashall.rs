//! Planning a full-device flash
//!
//! [`plan_flashall`] turns an image table into a task queue: boot-stage
//! images first, then the dynamic partitions (through one merged super image
//! when possible), then the optional wipe and reboot.

use crate::error::{Error, Result};
use crate::image::{Image, ImageEntry, ImageKind};
use crate::plan::FlashingPlan;
use crate::queue::TaskQueue;
use crate::task::{FlashSuperLayoutTask, FlashTask, RebootTask, ResizeTask, UpdateSuperTask, WipeTask};

/// Partitions reformatted when a wipe is requested
pub const WIPE_PARTITIONS: [&str; 3] = ["userdata", "cache", "metadata"];

/// Build the task queue flashing `images`
///
/// Reads the device slot configuration first. Optional images missing from
/// the image source are dropped; a missing required image fails.
pub fn plan_flashall(plan: &mut FlashingPlan, images: &[Image]) -> Result<TaskQueue> {
    plan.determine_slot()?;

    let mut available = Vec::with_capacity(images.len());
    for image in images.iter().cloned() {
        if plan.source.contains(&image.image_name)? {
            available.push(image);
        } else if image.optional_if_missing {
            log::debug!("Skipping {}: not found", image.image_name);
        } else {
            return Err(Error::MissingImage(image.image_name));
        }
    }

    let (os_images, boot_images): (Vec<Image>, Vec<Image>) = available
        .into_iter()
        .partition(|image| image.kind == ImageKind::Normal);

    let slot = plan.options.slot;
    let mut queue = TaskQueue::new();
    for image in &boot_images {
        queue.push(FlashTask::new(slot, &image.partition, &image.image_name, true));
    }

    let mut os_entries: Vec<ImageEntry> = os_images
        .into_iter()
        .map(|image| ImageEntry::new(image, slot))
        .collect();

    if !os_entries.is_empty() {
        match FlashSuperLayoutTask::initialize(plan, &mut os_entries)? {
            Some(task) => queue.push(task),
            None => {
                // Each logical partition starts empty so the new images fit
                queue.push(UpdateSuperTask::new());
                for entry in &os_entries {
                    queue.push(ResizeTask::new(&entry.image.partition, 0, entry.slot));
                }
            }
        }
    }

    for entry in &os_entries {
        queue.push(FlashTask::new(
            entry.slot,
            &entry.image.partition,
            &entry.image.image_name,
            true,
        ));
    }

    if plan.options.wants_wipe {
        for partition in WIPE_PARTITIONS {
            queue.push(WipeTask::new(partition));
        }
    }
    if plan.options.reboot {
        queue.push(RebootTask::new(""));
    }

    log::debug!("Planned {} task(s)", queue.len());
    Ok(queue)
}
