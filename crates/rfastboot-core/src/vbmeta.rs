//! Verified-boot metadata patching
//!
//! The AVB vbmeta header starts with the magic `AVB0`; its big-endian flags
//! word at byte 120 tells the bootloader to skip dm-verity and/or
//! verification of the chained images.

use bitflags::bitflags;

use crate::error::{Error, Result};

/// vbmeta header magic
const AVB_MAGIC: &[u8; 4] = b"AVB0";

/// Size of the fixed vbmeta header
pub const VBMETA_HEADER_LEN: usize = 256;

/// Offset of the flags word within the header
const FLAGS_OFFSET: usize = 120;

bitflags! {
    /// vbmeta header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VbmetaFlags: u32 {
        /// Disable dm-verity on hashtree-protected partitions
        const DISABLE_VERITY = 1 << 0;
        /// Disable verification of descriptors and chained partitions
        const DISABLE_VERIFICATION = 1 << 1;
    }
}

/// Whether `partition` holds a vbmeta image (`vbmeta`, `vbmeta_system_a`, ...)
pub fn is_vbmeta_partition(partition: &str) -> bool {
    partition.starts_with("vbmeta")
}

/// Set `flags` in the header of a vbmeta image
///
/// Empty `flags` leave the image untouched.
pub fn patch_flags(image: &mut [u8], flags: VbmetaFlags) -> Result<()> {
    if flags.is_empty() {
        return Ok(());
    }
    if image.len() < VBMETA_HEADER_LEN {
        return Err(Error::Vbmeta(format!(
            "image is too small ({} bytes)",
            image.len()
        )));
    }
    if &image[0..4] != AVB_MAGIC {
        return Err(Error::Vbmeta("bad magic".to_string()));
    }

    let word = &mut image[FLAGS_OFFSET..FLAGS_OFFSET + 4];
    let current = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
    let patched = current | flags.bits();
    word.copy_from_slice(&patched.to_be_bytes());

    log::debug!("Patched vbmeta flags 0x{:08X} -> 0x{:08X}", current, patched);
    Ok(())
}
