//! Merged super image construction

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::template::SuperTemplate;
use crate::error::{Error, Result};
use crate::size::{align_up, format_size};
use crate::source::ImageSource;
use crate::sparse::SparseImage;

/// Magic at the start of the metadata region
pub const METADATA_MAGIC: &[u8; 8] = b"RFLPMETA";

/// Placement of one logical partition inside super
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    /// Concrete partition name
    pub partition: String,
    /// Group the partition belongs to
    pub group: String,
    /// First block of the extent
    pub first_block: u64,
    /// Length of the extent in blocks
    pub blocks: u64,
    /// Size of the image written into the extent
    pub image_size: u64,
}

/// Extent table stored in the metadata region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutMetadata {
    /// Super partition size in bytes
    pub super_size: u64,
    /// Block size all extents are expressed in
    pub block_size: u32,
    /// Extents in allocation order
    pub extents: Vec<Extent>,
}

impl LayoutMetadata {
    /// Encode as magic, little-endian length and TOML text
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let text = toml::to_string(self).map_err(|e| Error::Layout(e.to_string()))?;
        let mut out = Vec::with_capacity(METADATA_MAGIC.len() + 4 + text.len());
        out.extend_from_slice(METADATA_MAGIC);
        out.extend_from_slice(&(text.len() as u32).to_le_bytes());
        out.extend_from_slice(text.as_bytes());
        Ok(out)
    }

    /// Decode the metadata region of a super image
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = METADATA_MAGIC.len() + 4;
        if data.len() < header || &data[..METADATA_MAGIC.len()] != METADATA_MAGIC {
            return Err(Error::Layout("no layout metadata".to_string()));
        }
        let len_bytes: [u8; 4] = data[METADATA_MAGIC.len()..header]
            .try_into()
            .map_err(|_| Error::Layout("truncated metadata".to_string()))?;
        let len = u32::from_le_bytes(len_bytes) as usize;
        let text = data
            .get(header..header + len)
            .and_then(|t| std::str::from_utf8(t).ok())
            .ok_or_else(|| Error::Layout("truncated metadata".to_string()))?;
        toml::from_str(text).map_err(|e| Error::Layout(e.to_string()))
    }
}

/// An image assigned to a logical partition
struct Assignment {
    partition: String,
    data: Vec<u8>,
}

/// Accumulates partition images and computes the merged super image
///
/// Partitions the template does not declare are ignored, so callers can
/// register every candidate image and ask [`Self::will_flash`] afterwards
/// which ones the merged image covers.
pub struct SuperLayoutBuilder<'a> {
    source: &'a dyn ImageSource,
    template: SuperTemplate,
    super_size: u64,
    assignments: Vec<Assignment>,
}

impl<'a> SuperLayoutBuilder<'a> {
    /// Create a builder for a super partition of `super_size` bytes
    ///
    /// Fails if the template pins a different size.
    pub fn new(
        source: &'a dyn ImageSource,
        template: SuperTemplate,
        super_size: u64,
    ) -> Result<Self> {
        if let Some(expected) = template.geometry.size {
            if expected != super_size {
                return Err(Error::Layout(format!(
                    "template expects a {} super partition, device has {}",
                    format_size(expected),
                    format_size(super_size)
                )));
            }
        }
        Ok(Self {
            source,
            template,
            super_size,
            assignments: Vec::new(),
        })
    }

    /// Create a builder from the raw contents of `super_empty.img`
    pub fn open(source: &'a dyn ImageSource, template: &[u8], super_size: u64) -> Result<Self> {
        Self::new(source, SuperTemplate::from_bytes(template)?, super_size)
    }

    /// The template this builder was opened with
    pub fn template(&self) -> &SuperTemplate {
        &self.template
    }

    /// Assign `image_name` to `partition`
    ///
    /// Non-logical partitions and absent optional images are skipped; an
    /// absent required image or a second image for the same partition fails.
    pub fn add_partition(&mut self, partition: &str, image_name: &str, optional: bool) -> Result<()> {
        if !self.template.contains(partition) {
            log::debug!("'{}' is not a logical partition, flashing it separately", partition);
            return Ok(());
        }
        if self.will_flash(partition) {
            return Err(Error::Layout(format!(
                "partition '{}' was assigned twice",
                partition
            )));
        }

        let data = match self.source.open(image_name)? {
            Some(data) => data,
            None if optional => {
                log::debug!("Skipping '{}': {} not found", partition, image_name);
                return Ok(());
            }
            None => return Err(Error::MissingImage(image_name.to_string())),
        };

        log::debug!(
            "Assigned {} ({} bytes) to logical partition '{}'",
            image_name,
            data.len(),
            partition
        );
        self.assignments.push(Assignment {
            partition: partition.to_string(),
            data,
        });
        Ok(())
    }

    /// Whether the merged image will contain `partition`
    pub fn will_flash(&self, partition: &str) -> bool {
        self.assignments.iter().any(|a| a.partition == partition)
    }

    /// Allocate extents for every assigned partition
    pub fn metadata(&self) -> Result<LayoutMetadata> {
        let geometry = &self.template.geometry;
        let block_size = geometry.block_size as u64;
        let mut offset = align_up(geometry.metadata_size, geometry.alignment);
        let mut group_usage: HashMap<&str, u64> = HashMap::new();
        let mut extents = Vec::with_capacity(self.assignments.len());

        for assignment in &self.assignments {
            let group = self
                .template
                .partition(&assignment.partition)
                .map(|p| p.group.as_str())
                .ok_or_else(|| {
                    Error::Layout(format!("unknown partition '{}'", assignment.partition))
                })?;
            let size = align_up(assignment.data.len() as u64, block_size);

            let used = group_usage.entry(group).or_insert(0);
            *used += size;
            if let Some(max) = self.template.group(group).and_then(|g| g.max_size) {
                if *used > max {
                    return Err(Error::Layout(format!(
                        "group '{}' needs {} but may use at most {}",
                        group,
                        format_size(*used),
                        format_size(max)
                    )));
                }
            }

            let start = align_up(offset, geometry.alignment);
            if start + size > self.super_size {
                return Err(Error::Layout(format!(
                    "not enough space in super for '{}' ({} bytes)",
                    assignment.partition,
                    assignment.data.len()
                )));
            }

            extents.push(Extent {
                partition: assignment.partition.clone(),
                group: group.to_string(),
                first_block: start / block_size,
                blocks: size / block_size,
                image_size: assignment.data.len() as u64,
            });
            offset = start + size;
        }

        Ok(LayoutMetadata {
            super_size: self.super_size,
            block_size: geometry.block_size,
            extents,
        })
    }

    /// Compute the merged super image
    pub fn sparse_layout(&self) -> Result<SparseImage> {
        let metadata = self.metadata()?;
        let encoded = metadata.to_bytes()?;
        if encoded.len() as u64 > self.template.geometry.metadata_size {
            return Err(Error::Layout(format!(
                "metadata needs {} bytes, template reserves {}",
                encoded.len(),
                self.template.geometry.metadata_size
            )));
        }

        let mut image = SparseImage::new(metadata.block_size, self.super_size)?;
        image.add_data(0, &encoded)?;

        for (extent, assignment) in metadata.extents.iter().zip(&self.assignments) {
            let block = u32::try_from(extent.first_block)
                .map_err(|_| Error::Layout(format!("extent of '{}' out of range", extent.partition)))?;
            image.add_data(block, &assignment.data)?;
        }

        log::debug!(
            "Computed super layout with {} partition(s), {} bytes to transfer",
            metadata.extents.len(),
            image.transfer_len()
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    const MIB: u64 = 1024 * 1024;

    const TEMPLATE: &str = r#"
[geometry]
alignment = "1 MiB"

[[group]]
name = "main_a"
max_size = "3 MiB"

[[partition]]
name = "system_a"
group = "main_a"

[[partition]]
name = "vendor_a"
group = "main_a"
"#;

    fn source() -> MemorySource {
        MemorySource::new()
            .with("system.img", vec![0x5A; 2 * MIB as usize])
            .with("vendor.img", vec![0xA5; 5000])
    }

    #[test]
    fn test_assign_and_layout() {
        let source = source();
        let mut builder = SuperLayoutBuilder::open(&source, TEMPLATE.as_bytes(), 16 * MIB).unwrap();
        builder.add_partition("system_a", "system.img", false).unwrap();
        builder.add_partition("vendor_a", "vendor.img", false).unwrap();
        builder.add_partition("boot_a", "boot.img", false).unwrap();

        assert!(builder.will_flash("system_a"));
        assert!(builder.will_flash("vendor_a"));
        assert!(!builder.will_flash("boot_a"));

        let metadata = builder.metadata().unwrap();
        assert_eq!(metadata.extents[0].first_block, MIB / 4096);
        assert_eq!(metadata.extents[0].blocks, 2 * MIB / 4096);
        assert_eq!(metadata.extents[1].first_block, 3 * MIB / 4096);
        assert_eq!(metadata.extents[1].blocks, 2);

        let image = builder.sparse_layout().unwrap();
        assert_eq!(image.len(), 16 * MIB);
        let raw = image.to_raw();
        assert_eq!(LayoutMetadata::from_bytes(&raw).unwrap(), metadata);
        assert!(raw[MIB as usize..3 * MIB as usize].iter().all(|&b| b == 0x5A));
        assert!(raw[3 * MIB as usize..3 * MIB as usize + 5000].iter().all(|&b| b == 0xA5));
    }

    #[test]
    fn test_missing_optional_image_is_skipped() {
        let source = MemorySource::new();
        let mut builder = SuperLayoutBuilder::open(&source, TEMPLATE.as_bytes(), 16 * MIB).unwrap();
        builder.add_partition("vendor_a", "vendor.img", true).unwrap();
        assert!(!builder.will_flash("vendor_a"));
    }

    #[test]
    fn test_missing_required_image_fails() {
        let source = MemorySource::new();
        let mut builder = SuperLayoutBuilder::open(&source, TEMPLATE.as_bytes(), 16 * MIB).unwrap();
        let err = builder.add_partition("system_a", "system.img", false).unwrap_err();
        assert!(matches!(err, Error::MissingImage(name) if name == "system.img"));
    }

    #[test]
    fn test_duplicate_assignment_fails() {
        let source = source();
        let mut builder = SuperLayoutBuilder::open(&source, TEMPLATE.as_bytes(), 16 * MIB).unwrap();
        builder.add_partition("system_a", "system.img", false).unwrap();
        assert!(builder.add_partition("system_a", "system.img", false).is_err());
    }

    #[test]
    fn test_group_limit_enforced() {
        let source = MemorySource::new()
            .with("system.img", vec![1u8; 2 * MIB as usize])
            .with("vendor.img", vec![2u8; 2 * MIB as usize]);
        let mut builder = SuperLayoutBuilder::open(&source, TEMPLATE.as_bytes(), 16 * MIB).unwrap();
        builder.add_partition("system_a", "system.img", false).unwrap();
        builder.add_partition("vendor_a", "vendor.img", false).unwrap();
        assert!(matches!(builder.sparse_layout(), Err(Error::Layout(_))));
    }

    #[test]
    fn test_super_too_small() {
        let source = source();
        let mut builder = SuperLayoutBuilder::open(&source, TEMPLATE.as_bytes(), 2 * MIB).unwrap();
        builder.add_partition("system_a", "system.img", false).unwrap();
        assert!(matches!(builder.metadata(), Err(Error::Layout(_))));
    }

    #[test]
    fn test_template_size_must_match_device() {
        let source = MemorySource::new();
        let template = "[geometry]\nsize = \"2 GiB\"\n";
        assert!(SuperLayoutBuilder::open(&source, template.as_bytes(), 1 << 30).is_err());
        assert!(SuperLayoutBuilder::open(&source, template.as_bytes(), 2 << 30).is_ok());
    }
}
