//! Filesystem formatting support
//!
//! Wiping a partition erases it and writes a freshly generated filesystem of
//! the type the device reports. Generators live outside this crate behind
//! [`FsFormatter`].

use core::str::FromStr;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::sparse::SparseImage;

bitflags! {
    /// Optional filesystem features requested for generated images
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FsOptions: u8 {
        /// Case-insensitive file names
        const CASEFOLD = 1 << 0;
        /// Project quota support
        const PROJID = 1 << 1;
        /// Transparent compression
        const COMPRESS = 1 << 2;
    }
}

impl FromStr for FsOptions {
    type Err = Error;

    /// Parse a comma-separated list such as `casefold,projid`
    fn from_str(s: &str) -> Result<Self> {
        let mut options = FsOptions::empty();
        for name in s.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            options |= match name {
                "casefold" => FsOptions::CASEFOLD,
                "projid" => FsOptions::PROJID,
                "compress" => FsOptions::COMPRESS,
                other => {
                    return Err(Error::InvalidOption(format!(
                        "unsupported filesystem option '{}'",
                        other
                    )))
                }
            };
        }
        Ok(options)
    }
}

/// Generator of empty filesystem images
pub trait FsFormatter {
    /// Generate an empty `fs_type` filesystem for a partition of `size` bytes
    ///
    /// Returns `Ok(None)` if the filesystem type is not supported.
    fn generate(&self, fs_type: &str, size: u64, options: FsOptions)
        -> Result<Option<SparseImage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fs_options() {
        assert_eq!("".parse::<FsOptions>().unwrap(), FsOptions::empty());
        assert_eq!(
            "casefold, projid".parse::<FsOptions>().unwrap(),
            FsOptions::CASEFOLD | FsOptions::PROJID
        );
        assert_eq!("compress".parse::<FsOptions>().unwrap(), FsOptions::COMPRESS);
        assert!("journal".parse::<FsOptions>().is_err());
    }
}
