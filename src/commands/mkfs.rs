//! Filesystem generation through the host mkfs tools

use rfastboot_core::error::{Error, Result};
use rfastboot_core::sparse::{SparseImage, DEFAULT_BLOCK_SIZE};
use rfastboot_core::{FsFormatter, FsOptions};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

/// Generates ext4 images with `mke2fs` and f2fs images with `make_f2fs`
pub struct MkfsFormatter {
    scratch_dir: PathBuf,
}

impl MkfsFormatter {
    pub fn new() -> Self {
        Self {
            scratch_dir: std::env::temp_dir(),
        }
    }

    fn command(fs_type: &str, size: u64, options: FsOptions, path: &str) -> Option<Command> {
        let blocks = size / DEFAULT_BLOCK_SIZE as u64;
        match fs_type {
            "ext4" => {
                let mut cmd = Command::new("mke2fs");
                cmd.args(["-t", "ext4", "-b"]).arg(DEFAULT_BLOCK_SIZE.to_string());
                let mut features = Vec::new();
                if options.contains(FsOptions::CASEFOLD) {
                    features.push("casefold");
                }
                if options.contains(FsOptions::PROJID) {
                    features.push("project,quota");
                }
                if !features.is_empty() {
                    cmd.arg("-O").arg(features.join(","));
                }
                cmd.args(["-F", "-q", path]).arg(blocks.to_string());
                Some(cmd)
            }
            "f2fs" => {
                let mut cmd = Command::new("make_f2fs");
                let mut features = Vec::new();
                if options.contains(FsOptions::CASEFOLD) {
                    features.push("casefold");
                }
                if options.contains(FsOptions::PROJID) {
                    features.push("project_quota,extra_attr");
                }
                if options.contains(FsOptions::COMPRESS) {
                    features.push("compression,extra_attr");
                }
                if !features.is_empty() {
                    cmd.arg("-O").arg(features.join(","));
                }
                cmd.args(["-f", "-q", path]);
                Some(cmd)
            }
            _ => None,
        }
    }
}

impl Default for MkfsFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl FsFormatter for MkfsFormatter {
    fn generate(&self, fs_type: &str, size: u64, options: FsOptions) -> Result<Option<SparseImage>> {
        let scratch = scratch_file(&self.scratch_dir, size)?;
        let path = scratch.path().to_string_lossy().into_owned();
        let Some(mut cmd) = Self::command(fs_type, size, options, &path) else {
            return Ok(None);
        };

        log::debug!("Running {:?}", cmd);
        match cmd.status() {
            Ok(status) if status.success() => {
                let mut file = scratch.reopen()?;
                SparseImage::from_reader(&mut file, size, DEFAULT_BLOCK_SIZE).map(Some)
            }
            Ok(status) => Err(Error::Io(std::io::Error::other(format!(
                "{} generator exited with {}",
                fs_type, status
            )))),
            Err(e) => {
                log::warn!("Cannot run {} generator: {}", fs_type, e);
                Ok(None)
            }
        }
    }
}

/// Create an exclusive scratch image of `size` bytes, removed on drop
fn scratch_file(dir: &Path, size: u64) -> Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("rfastboot-")
        .suffix(".img")
        .tempfile_in(dir)?;
    file.as_file().set_len(size)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_file_is_private_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let scratch = scratch_file(dir.path(), 8192).unwrap();
            assert_eq!(scratch.as_file().metadata().unwrap().len(), 8192);
            let name = scratch.path().file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.starts_with("rfastboot-") && name.ends_with(".img"));
            scratch.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_names_are_unique() {
        let dir = tempfile::tempdir().unwrap();
        let first = scratch_file(dir.path(), 4096).unwrap();
        let second = scratch_file(dir.path(), 4096).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn test_unsupported_type_is_not_generated() {
        let dir = tempfile::tempdir().unwrap();
        let formatter = MkfsFormatter {
            scratch_dir: dir.path().to_path_buf(),
        };
        let image = formatter.generate("vfat", 1 << 20, FsOptions::empty()).unwrap();
        assert!(image.is_none());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_ext4_command_features() {
        let cmd = MkfsFormatter::command("ext4", 1 << 20, FsOptions::CASEFOLD, "/scratch.img").unwrap();
        let args: Vec<String> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(cmd.get_program(), "mke2fs");
        assert!(args.windows(2).any(|w| w[0] == "-O" && w[1] == "casefold"));
        assert_eq!(args.last().map(String::as_str), Some("256"));
    }
}
