//! rfastboot-core - Flashing task sequencing for fastboot devices
//!
//! This crate turns a flashing request (which partitions, which slot, whether
//! to wipe) into an ordered queue of device operations that is safe on A/B
//! devices with dynamic partitions.
//!
//! # Overview
//!
//! - [`slot`] - Resolve a partition base name and slot specifier into concrete
//!   on-device partition names
//! - [`plan`] - The [`FlashingPlan`] session context shared by every task
//! - [`task`] - The closed set of [`Task`] variants and their execution
//! - [`super_layout`] - Build one merged super-partition image instead of
//!   flashing each logical partition individually
//! - [`sparse`] - Sparse image model and splitting into transferable chunks
//! - [`queue`] - Strictly sequential, fail-fast task driver
//!
//! The wire transport, the image source and the filesystem generators are
//! external collaborators, reached through the [`FastbootDevice`],
//! [`ImageSource`] and [`FsFormatter`] traits.
//!
//! # Example
//!
//! ```ignore
//! use rfastboot_core::{default_images, plan_flashall, FlashOptions, FlashingPlan};
//!
//! let mut plan = FlashingPlan::new(device, source, FlashOptions::default());
//! let queue = plan_flashall(&mut plan, &default_images())?;
//! queue.run(&mut plan)?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod device;
pub mod error;
pub mod flashall;
pub mod fs;
pub mod image;
pub mod plan;
pub mod progress;
pub mod queue;
pub mod size;
pub mod slot;
pub mod source;
pub mod sparse;
pub mod super_layout;
pub mod task;
pub mod vbmeta;

pub use device::FastbootDevice;
pub use error::{Error, Result};
pub use flashall::plan_flashall;
pub use fs::{FsFormatter, FsOptions};
pub use image::{default_images, Image, ImageEntry, ImageKind, ImageSpec, DEFAULT_IMAGES};
pub use plan::{FlashOptions, FlashingPlan};
pub use progress::{NoProgress, TransferProgress};
pub use queue::TaskQueue;
pub use slot::{Slot, SlotLayout, SlotSpec};
pub use source::{DirImageSource, ImageSource, MemorySource};
pub use sparse::SparseImage;
pub use task::{
    DeleteTask, FlashSuperLayoutTask, FlashTask, RebootTarget, RebootTask, ResizeTask, Task,
    UpdateSuperTask, WipeTask,
};
pub use vbmeta::VbmetaFlags;
