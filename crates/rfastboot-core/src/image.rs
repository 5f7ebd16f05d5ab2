//! Image descriptors
//!
//! An [`Image`] names a partition and the file that is flashed to it. An
//! [`ImageEntry`] pairs an image with the slot it should land on and is the
//! unit of remaining work handed to the super-layout optimizer.

use crate::error::{Error, Result};
use crate::slot::{SlotLayout, SlotSpec};

/// Where an image is flashed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    /// Flashed from the bootloader before any dynamic partition
    BootCritical,
    /// Operating system image; dynamic on devices with a super partition
    Normal,
}

/// An image file and the partition it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    /// Partition base name (without slot suffix)
    pub partition: String,
    /// File name in the image source
    pub image_name: String,
    /// Skip silently if the image source does not have the file
    pub optional_if_missing: bool,
    /// Flashing stage
    pub kind: ImageKind,
}

impl Image {
    /// Image `<partition>.img`
    pub fn new(partition: impl Into<String>, optional_if_missing: bool, kind: ImageKind) -> Self {
        let partition = partition.into();
        Self {
            image_name: format!("{}.img", partition),
            partition,
            optional_if_missing,
            kind,
        }
    }
}

/// Static description of a default image
#[derive(Debug, Clone, Copy)]
pub struct ImageSpec {
    /// Partition base name; the file is `<partition>.img`
    pub partition: &'static str,
    /// Skip silently when absent
    pub optional: bool,
    /// Flashing stage
    pub kind: ImageKind,
}

impl ImageSpec {
    /// Owned image descriptor
    pub fn to_image(&self) -> Image {
        Image::new(self.partition, self.optional, self.kind)
    }
}

const fn boot_critical(partition: &'static str, optional: bool) -> ImageSpec {
    ImageSpec {
        partition,
        optional,
        kind: ImageKind::BootCritical,
    }
}

const fn normal(partition: &'static str, optional: bool) -> ImageSpec {
    ImageSpec {
        partition,
        optional,
        kind: ImageKind::Normal,
    }
}

/// Images flashed by `flashall`, in flashing order
pub const DEFAULT_IMAGES: [ImageSpec; 18] = [
    boot_critical("boot", false),
    boot_critical("init_boot", true),
    boot_critical("dtbo", true),
    boot_critical("pvmfw", true),
    boot_critical("recovery", true),
    boot_critical("vbmeta", true),
    boot_critical("vbmeta_system", true),
    boot_critical("vbmeta_vendor", true),
    boot_critical("vendor_boot", true),
    boot_critical("vendor_kernel_boot", true),
    normal("odm", true),
    normal("odm_dlkm", true),
    normal("product", true),
    normal("system", false),
    normal("system_dlkm", true),
    normal("system_ext", true),
    normal("vendor", true),
    normal("vendor_dlkm", true),
];

/// Owned copy of [`DEFAULT_IMAGES`]
pub fn default_images() -> Vec<Image> {
    DEFAULT_IMAGES.iter().map(ImageSpec::to_image).collect()
}

/// An image queued for flashing, with its target slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageEntry {
    /// The image
    pub image: Image,
    /// Target slot; [`SlotSpec::Active`] means the device's current slot
    pub slot: SlotSpec,
}

impl ImageEntry {
    /// Pair an image with a slot
    pub fn new(image: Image, slot: SlotSpec) -> Self {
        Self { image, slot }
    }

    /// The single concrete partition name this entry flashes
    ///
    /// The active slot resolves to the device's current slot; a device that
    /// reports none gets the bare name. "all" has no single answer.
    pub fn partition_name(&self, layout: &SlotLayout) -> Result<String> {
        let base = &self.image.partition;
        let slot = match self.slot {
            SlotSpec::Active => layout.current,
            SlotSpec::Slot(slot) => Some(slot),
            SlotSpec::Other => Some(layout.other()?),
            SlotSpec::All => return Err(Error::AmbiguousSlot(base.clone())),
        };
        Ok(match slot {
            Some(slot) => slot.apply(base),
            None => base.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::Slot;

    fn entry(partition: &str, slot: SlotSpec) -> ImageEntry {
        ImageEntry::new(Image::new(partition, false, ImageKind::Normal), slot)
    }

    #[test]
    fn test_partition_name_uses_current_slot() {
        let layout = SlotLayout::ab("b".parse::<Slot>().unwrap());
        let name = entry("system", SlotSpec::Active).partition_name(&layout).unwrap();
        assert_eq!(name, "system_b");
        let name = entry("system", SlotSpec::Other).partition_name(&layout).unwrap();
        assert_eq!(name, "system_a");
    }

    #[test]
    fn test_partition_name_without_slots() {
        let name = entry("system", SlotSpec::Active)
            .partition_name(&SlotLayout::single())
            .unwrap();
        assert_eq!(name, "system");
    }

    #[test]
    fn test_partition_name_all_is_ambiguous() {
        let layout = SlotLayout::ab("a".parse::<Slot>().unwrap());
        let err = entry("system", SlotSpec::All).partition_name(&layout).unwrap_err();
        assert!(matches!(err, Error::AmbiguousSlot(p) if p == "system"));
    }

    #[test]
    fn test_default_images() {
        let required: Vec<_> = DEFAULT_IMAGES
            .iter()
            .filter(|spec| !spec.optional)
            .map(|spec| spec.partition)
            .collect();
        assert_eq!(required, vec!["boot", "system"]);
        assert_eq!(DEFAULT_IMAGES[0].to_image().image_name, "boot.img");
    }
}
