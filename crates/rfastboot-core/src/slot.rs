//! A/B slot model and partition name resolution
//!
//! A slot specifier is one of:
//!
//! - `""` - the currently active slot
//! - `"a"`, `"_b"`, ... - an explicit slot
//! - `"other"` - the inactive slot
//! - `"all"` - every slot on the device
//!
//! [`resolve_partitions`] maps a partition base name plus a specifier to the
//! concrete names to act on. It performs no device I/O: the caller supplies
//! whether the partition has slots and the device [`SlotLayout`].

use core::fmt;
use core::str::FromStr;

use crate::error::{Error, Result};

/// Highest number of slots a suffix letter can express (`a` through `z`)
const MAX_SLOTS: u8 = 26;

/// A single slot, identified by its suffix letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(char);

impl Slot {
    /// Slot for a zero-based index (0 = `a`)
    pub fn from_index(index: u8) -> Option<Self> {
        (index < MAX_SLOTS).then(|| Self((b'a' + index) as char))
    }

    /// Zero-based index of this slot
    pub fn index(self) -> u8 {
        self.0 as u8 - b'a'
    }

    /// Suffix letter
    pub fn letter(self) -> char {
        self.0
    }

    /// Append this slot's suffix to a partition base name
    pub fn apply(self, base: &str) -> String {
        format!("{}_{}", base, self.0)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Slot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let letter = s.strip_prefix('_').unwrap_or(s);
        let mut chars = letter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_lowercase() => Ok(Self(c)),
            _ => Err(Error::InvalidSlot {
                slot: s.to_string(),
                count: 0,
            }),
        }
    }
}

/// Which slot(s) an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotSpec {
    /// The currently active slot
    #[default]
    Active,
    /// An explicit slot
    Slot(Slot),
    /// The inactive slot
    Other,
    /// Every slot on the device
    All,
}

impl SlotSpec {
    /// Whether a specific slot was requested by the user
    pub fn is_explicit(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for SlotSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => Ok(()),
            Self::Slot(slot) => write!(f, "{}", slot),
            Self::Other => write!(f, "other"),
            Self::All => write!(f, "all"),
        }
    }
}

impl FromStr for SlotSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" => Ok(Self::Active),
            "all" => Ok(Self::All),
            "other" => Ok(Self::Other),
            _ => s.parse().map(Self::Slot),
        }
    }
}

/// Slot configuration of the connected device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SlotLayout {
    /// Number of slots (0 or 1 on non-A/B devices)
    pub slot_count: u8,
    /// Currently active slot, if the device reports one
    pub current: Option<Slot>,
}

impl SlotLayout {
    /// Layout of a non-A/B device
    pub fn single() -> Self {
        Self::default()
    }

    /// Layout of an A/B device with the given active slot
    pub fn ab(current: Slot) -> Self {
        Self {
            slot_count: 2,
            current: Some(current),
        }
    }

    /// Whether the device has redundant slots
    pub fn supports_ab(&self) -> bool {
        self.slot_count >= 2
    }

    /// All slots, in suffix order
    pub fn slots(&self) -> impl Iterator<Item = Slot> {
        (0..self.slot_count.min(MAX_SLOTS)).filter_map(Slot::from_index)
    }

    /// Validate that `slot` exists on this device
    pub fn check(&self, slot: Slot) -> Result<Slot> {
        if slot.index() < self.slot_count {
            Ok(slot)
        } else {
            Err(Error::InvalidSlot {
                slot: slot.to_string(),
                count: self.slot_count,
            })
        }
    }

    /// The active slot, or an error if the device reported none
    pub fn current(&self) -> Result<Slot> {
        self.current.ok_or(Error::UnknownCurrentSlot)
    }

    /// The slot following the active one
    pub fn other(&self) -> Result<Slot> {
        let current = self.current()?;
        if self.slot_count < 2 {
            return Err(Error::InvalidSlot {
                slot: "other".to_string(),
                count: self.slot_count,
            });
        }
        let next = (current.index() + 1) % self.slot_count;
        Slot::from_index(next).ok_or(Error::UnknownCurrentSlot)
    }
}

/// Split a name like `system_b` into its base and slot, if the suffix names a
/// slot of this device
pub fn split_slot_suffix<'a>(name: &'a str, layout: &SlotLayout) -> Option<(&'a str, Slot)> {
    if !layout.supports_ab() {
        return None;
    }
    let (base, suffix) = name.rsplit_once('_')?;
    if base.is_empty() {
        return None;
    }
    let slot: Slot = suffix.parse().ok()?;
    layout.check(slot).ok().map(|slot| (base, slot))
}

/// Resolve a partition base name and slot specifier into concrete names
///
/// - On a partition without slots, the bare name is returned exactly once,
///   whatever the specifier (including "all").
/// - A name that already carries a slot suffix is returned unchanged, after
///   checking it does not contradict an explicit specifier.
/// - Otherwise the active, explicit, other or every slot suffix is applied.
pub fn resolve_partitions(
    name: &str,
    spec: &SlotSpec,
    has_slot: bool,
    layout: &SlotLayout,
) -> Result<Vec<String>> {
    if let Some((_, embedded)) = split_slot_suffix(name, layout) {
        let conflicting = match spec {
            SlotSpec::Slot(slot) => Some(*slot),
            SlotSpec::Other => Some(layout.other()?),
            SlotSpec::Active | SlotSpec::All => None,
        };
        if let Some(requested) = conflicting.filter(|s| *s != embedded) {
            return Err(Error::SlotMismatch {
                partition: name.to_string(),
                embedded: embedded.to_string(),
                requested: requested.to_string(),
            });
        }
        return Ok(vec![name.to_string()]);
    }

    if !has_slot || !layout.supports_ab() {
        return Ok(vec![name.to_string()]);
    }

    match spec {
        SlotSpec::Active => Ok(vec![layout.current()?.apply(name)]),
        SlotSpec::Slot(slot) => Ok(vec![layout.check(*slot)?.apply(name)]),
        SlotSpec::Other => Ok(vec![layout.other()?.apply(name)]),
        SlotSpec::All => Ok(layout.slots().map(|slot| slot.apply(name)).collect()),
    }
}
