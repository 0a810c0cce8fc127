//! MCU device definitions, with chip-specific memory layout and quirks
use std::fmt;
use std::ops::Range;

use serde::Deserialize;

use crate::error::Result;

/// Device quirk flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum Flag {
    /// Mass erase is not supported, erase page by page
    NoMassErase,
    /// Option bytes are only reloaded on OBL_LAUNCH
    RequiresOblLaunch,
    /// PEMPTY bit must be cleared after programming an empty device
    RequiresPemptyClear,
}

/// Device family, one YAML file per family
#[derive(Debug, Clone, Deserialize)]
pub struct Family {
    pub name: String,
    pub description: String,
    pub variants: Vec<Device>,
}

/// Represents an STM32 device, as identified by the GetId command
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Device {
    pub name: String,
    #[serde(deserialize_with = "parse_device_id")]
    pub device_id: u16,
    #[serde(deserialize_with = "parse_range")]
    pub ram: Range<u32>,
    #[serde(deserialize_with = "parse_range")]
    pub flash: Range<u32>,
    pub pages_per_sector: u32,
    /// One entry for uniform layouts, the sector sizes otherwise
    #[serde(deserialize_with = "parse_sizes")]
    pub page_size: Vec<u32>,
    #[serde(deserialize_with = "parse_range")]
    pub option_bytes: Range<u32>,
    #[serde(deserialize_with = "parse_range")]
    pub system_memory: Range<u32>,
    #[serde(default)]
    pub flags: Vec<Flag>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:03x})", self.name, self.device_id)
    }
}

impl Device {
    pub fn flash_size(&self) -> u32 {
        self.flash.end - self.flash.start
    }

    pub fn ram_size(&self) -> u32 {
        self.ram.end - self.ram.start
    }

    pub fn has_flag(&self, flag: Flag) -> bool {
        self.flags.contains(&flag)
    }

    /// Page size of devices with a single page size.
    pub fn uniform_page_size(&self) -> Option<u32> {
        match self.page_size.as_slice() {
            [size] => Some(*size),
            _ => None,
        }
    }

    /// Copy of this device whose flash ends `size` bytes after its start.
    pub fn with_flash_size(&self, size: u32) -> Device {
        let mut dev = self.clone();
        dev.flash.end = dev.flash.start.saturating_add(size);
        dev
    }
}

pub struct DeviceDb {
    families: Vec<Family>,
}

impl DeviceDb {
    pub fn load() -> Result<Self> {
        Ok(DeviceDb {
            families: vec![
                serde_yaml::from_str(include_str!("../devices/STM32F0.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32F1.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32F2.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32F3.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32F4.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32F7.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32L0.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32L1.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32L4.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32G0.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/STM32G4.yaml"))?,
                serde_yaml::from_str(include_str!("../devices/legacy.yaml"))?,
            ],
        })
    }

    pub fn families(&self) -> &[Family] {
        &self.families
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.families.iter().flat_map(|f| f.variants.iter())
    }

    pub fn lookup(&self, device_id: u16) -> Option<Device> {
        self.devices().find(|d| d.device_id == device_id).cloned()
    }
}

/// Parses `0x` prefixed hex, plain decimal, or decimal with a `K`/`KB`/`KiB` suffix.
pub fn parse_number(s: &str) -> std::result::Result<u32, String> {
    let s = s.trim();
    let parsed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(kib) = ["KiB", "KB", "K"].iter().find_map(|sfx| s.strip_suffix(sfx)) {
        kib.parse::<u32>().ok().and_then(|k| k.checked_mul(1024))
    } else {
        s.parse().ok()
    };
    parsed.ok_or_else(|| format!("error while parsing {:?}", s))
}

fn parse_device_id<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    let id = parse_number(&s).map_err(serde::de::Error::custom)?;
    u16::try_from(id)
        .ok()
        .filter(|&id| id <= 0xfff)
        .ok_or_else(|| serde::de::Error::custom(format!("device id {} out of range", s)))
}

fn parse_range<'de, D>(deserializer: D) -> std::result::Result<Range<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let [start, end]: [String; 2] = Deserialize::deserialize(deserializer)?;
    let start = parse_number(&start).map_err(serde::de::Error::custom)?;
    let end = parse_number(&end).map_err(serde::de::Error::custom)?;
    if end < start {
        return Err(serde::de::Error::custom(format!(
            "range end 0x{:08x} below start 0x{:08x}",
            end, start
        )));
    }
    Ok(start..end)
}

fn parse_sizes<'de, D>(deserializer: D) -> std::result::Result<Vec<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let sizes: Vec<String> = Deserialize::deserialize(deserializer)?;
    if sizes.is_empty() {
        return Err(serde::de::Error::custom("empty page size list"));
    }
    sizes
        .iter()
        .map(|s| parse_number(s).map_err(serde::de::Error::custom))
        .collect()
}
