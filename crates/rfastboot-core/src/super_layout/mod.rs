//! Super-partition layout support
//!
//! Devices with dynamic partitions keep every logical partition inside one
//! container, the super partition. Instead of creating and flashing each
//! logical partition through fastbootd, the host can compute the complete
//! super image up front and write it in one transfer.
//!
//! - [`SuperTemplate`] - the empty layout shipped as `super_empty.img`
//! - [`SuperLayoutBuilder`] - assigns images to logical partitions and
//!   produces the merged sparse image
//!
//! # Template format
//!
//! ```toml
//! [geometry]
//! size = "2 GiB"
//! metadata_size = "64 KiB"
//! alignment = "1 MiB"
//!
//! [[group]]
//! name = "main_a"
//! max_size = "1 GiB"
//!
//! [[partition]]
//! name = "system_a"
//! group = "main_a"
//! ```

mod builder;
mod template;

pub use builder::{Extent, LayoutMetadata, SuperLayoutBuilder, METADATA_MAGIC};
pub use template::{Geometry, Group, Partition, SuperTemplate};

/// File name of the empty super layout in an image source
pub const SUPER_EMPTY_IMAGE: &str = "super_empty.img";
