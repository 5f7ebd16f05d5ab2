//! Empty super layout template (TOML)

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::size::parse_size;
use crate::sparse::DEFAULT_BLOCK_SIZE;

/// Default space reserved for layout metadata at the start of super
const DEFAULT_METADATA_SIZE: u64 = 64 * 1024;

/// Default extent alignment
const DEFAULT_ALIGNMENT: u64 = 1024 * 1024;

/// Super partition geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Geometry {
    /// Super partition name, if the template pins one
    pub name: Option<String>,
    /// Super partition size; `None` means "whatever the device reports"
    pub size: Option<u64>,
    /// Block size of the generated image
    pub block_size: u32,
    /// Bytes reserved for metadata before the first extent
    pub metadata_size: u64,
    /// Extent alignment in bytes
    pub alignment: u64,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            name: None,
            size: None,
            block_size: DEFAULT_BLOCK_SIZE,
            metadata_size: DEFAULT_METADATA_SIZE,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

/// Partition group; all partitions of a group share its size budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Group name
    pub name: String,
    /// Maximum combined size, unlimited if `None`
    pub max_size: Option<u64>,
}

/// Logical partition declared by the template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Concrete partition name, including slot suffix
    pub name: String,
    /// Group the partition belongs to
    pub group: String,
}

/// Parsed `super_empty.img`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SuperTemplate {
    /// Geometry
    pub geometry: Geometry,
    /// Groups
    pub groups: Vec<Group>,
    /// Logical partitions
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlTemplate {
    geometry: Option<TomlGeometry>,
    #[serde(default)]
    group: Vec<TomlGroup>,
    #[serde(default)]
    partition: Vec<TomlPartition>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGeometry {
    name: Option<String>,
    size: Option<SizeValue>,
    block_size: Option<u32>,
    metadata_size: Option<SizeValue>,
    alignment: Option<SizeValue>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlGroup {
    name: String,
    max_size: Option<SizeValue>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlPartition {
    name: String,
    #[serde(default = "default_group")]
    group: String,
}

fn default_group() -> String {
    "default".to_string()
}

/// A size given either as an integer or as a string like "1 GiB"
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Int(u64),
    Str(String),
}

impl SizeValue {
    fn resolve(&self) -> Result<u64> {
        match self {
            Self::Int(n) => Ok(*n),
            Self::Str(s) => parse_size(s),
        }
    }
}

impl SuperTemplate {
    /// Parse a template from the contents of `super_empty.img`
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|_| Error::Template("not a text document".to_string()))?;
        Self::from_toml_str(text)
    }

    /// Parse a template from TOML
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: TomlTemplate =
            toml::from_str(text).map_err(|e| Error::Template(e.to_string()))?;

        let mut geometry = Geometry::default();
        if let Some(g) = file.geometry {
            geometry.name = g.name;
            geometry.size = g.size.as_ref().map(SizeValue::resolve).transpose()?;
            if let Some(block_size) = g.block_size {
                geometry.block_size = block_size;
            }
            if let Some(size) = &g.metadata_size {
                geometry.metadata_size = size.resolve()?;
            }
            if let Some(alignment) = &g.alignment {
                geometry.alignment = alignment.resolve()?;
            }
        }

        let groups = file
            .group
            .iter()
            .map(|g| {
                Ok(Group {
                    name: g.name.clone(),
                    max_size: g.max_size.as_ref().map(SizeValue::resolve).transpose()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let partitions = file
            .partition
            .into_iter()
            .map(|p| Partition {
                name: p.name,
                group: p.group,
            })
            .collect();

        let template = Self {
            geometry,
            groups,
            partitions,
        };
        template.validate()?;
        Ok(template)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        let g = &self.geometry;
        if g.block_size == 0 || g.block_size % 512 != 0 {
            return Err(Error::Template(format!("invalid block size {}", g.block_size)));
        }
        if g.alignment == 0 || g.alignment % g.block_size as u64 != 0 {
            return Err(Error::Template(format!(
                "alignment {} is not a multiple of the block size",
                g.alignment
            )));
        }

        for (i, p) in self.partitions.iter().enumerate() {
            if self.partitions[..i].iter().any(|q| q.name == p.name) {
                return Err(Error::Template(format!("duplicate partition '{}'", p.name)));
            }
            if p.group != "default" && self.group(&p.group).is_none() {
                return Err(Error::Template(format!(
                    "partition '{}' references unknown group '{}'",
                    p.name, p.group
                )));
            }
        }
        Ok(())
    }

    /// Look up a group by name
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Look up a logical partition by its concrete name
    pub fn partition(&self, name: &str) -> Option<&Partition> {
        self.partitions.iter().find(|p| p.name == name)
    }

    /// Whether `name` is a logical partition of this layout
    pub fn contains(&self, name: &str) -> bool {
        self.partition(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATE: &str = r#"
[geometry]
size = "2 GiB"
metadata_size = "64 KiB"

[[group]]
name = "main_a"
max_size = "1 GiB"

[[group]]
name = "main_b"
max_size = 1073741824

[[partition]]
name = "system_a"
group = "main_a"

[[partition]]
name = "vendor_a"
group = "main_a"

[[partition]]
name = "system_b"
group = "main_b"
"#;

    #[test]
    fn test_parse_template() {
        let t = SuperTemplate::from_toml_str(TEMPLATE).unwrap();
        assert_eq!(t.geometry.size, Some(2 << 30));
        assert_eq!(t.geometry.block_size, 4096);
        assert_eq!(t.geometry.alignment, 1024 * 1024);
        assert_eq!(t.groups.len(), 2);
        assert_eq!(t.group("main_b").unwrap().max_size, Some(1 << 30));
        assert!(t.contains("vendor_a"));
        assert!(!t.contains("vendor_b"));
    }

    #[test]
    fn test_unknown_group_rejected() {
        let err = SuperTemplate::from_toml_str(
            r#"
[[partition]]
name = "system_a"
group = "missing"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Template(_)));
    }

    #[test]
    fn test_default_group_needs_no_declaration() {
        let t = SuperTemplate::from_toml_str("[[partition]]\nname = \"system\"\n").unwrap();
        assert_eq!(t.partitions[0].group, "default");
        assert_eq!(t.geometry, Geometry::default());
    }

    #[test]
    fn test_binary_template_rejected() {
        assert!(SuperTemplate::from_bytes(&[0xFF, 0xFE, 0x00]).is_err());
    }
}
