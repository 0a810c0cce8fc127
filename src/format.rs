//! Firmware file formats
use std::borrow::Cow;
use std::path::Path;
use std::str;

use anyhow::Result;
use object::{
    Endianness,
    elf::{FileHeader32, PT_LOAD},
    read::elf::{FileHeader, ProgramHeader},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareFormat {
    IntelHex,
    Elf,
    Binary,
}

/// A flat firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    /// Load address of the first byte, unknown for raw binaries.
    pub address: Option<u32>,
    pub data: Vec<u8>,
}

impl Firmware {
    pub fn from_binary(data: Vec<u8>) -> Self {
        Firmware { address: None, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// MD5 of the image, hex encoded.
    pub fn digest(&self) -> String {
        format!("{:x}", md5::compute(&self.data))
    }
}

pub fn read_firmware_from_file<P: AsRef<Path>>(path: P) -> Result<Firmware> {
    let p = path.as_ref();
    let raw = std::fs::read(p)?;

    let format = guess_format(p, &raw);
    log::info!("Read {} as {:?} format", p.display(), format);
    let firmware = match format {
        FirmwareFormat::IntelHex => read_ihex(str::from_utf8(&raw)?)?,
        FirmwareFormat::Elf => objcopy_binary(&raw)?,
        FirmwareFormat::Binary => Firmware::from_binary(raw),
    };
    anyhow::ensure!(!firmware.is_empty(), "{} contains no data", p.display());
    Ok(firmware)
}

pub fn guess_format(path: &Path, raw: &[u8]) -> FirmwareFormat {
    let ext = path
        .extension()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default()
        .to_lowercase();
    if ["ihex", "ihe", "h86", "hex", "a43", "a90"].contains(&&*ext) {
        return FirmwareFormat::IntelHex;
    }
    if ["bin", "raw"].contains(&&*ext) {
        return FirmwareFormat::Binary;
    }

    if raw.starts_with(&[0x7f, b'E', b'L', b'F']) {
        FirmwareFormat::Elf
    } else if raw.first() == Some(&b':')
        && raw
            .iter()
            .all(|&c| c.is_ascii_hexdigit() || c == b':' || c == b'\n' || c == b'\r')
    {
        FirmwareFormat::IntelHex
    } else {
        FirmwareFormat::Binary
    }
}

pub fn read_ihex(data: &str) -> Result<Firmware> {
    use ihex::Record;

    let mut base_address = 0u32;

    let mut records = vec![];
    for record in ihex::Reader::new(data) {
        match record? {
            Record::Data { offset, value } => {
                records.push((base_address + offset as u32, value.into()));
            }
            Record::ExtendedSegmentAddress(address) => {
                base_address = (address as u32) * 16;
            }
            Record::ExtendedLinearAddress(address) => {
                base_address = (address as u32) << 16;
            }
            Record::EndOfFile
            | Record::StartSegmentAddress { .. }
            | Record::StartLinearAddress(_) => (),
        };
    }
    merge_sections(records)
}

/// Simulates `objcopy -O binary`, keeping the load address.
pub fn objcopy_binary(elf_data: &[u8]) -> Result<Firmware> {
    match object::FileKind::parse(elf_data)? {
        object::FileKind::Elf32 => (),
        _ => anyhow::bail!("cannot read file as ELF32 format"),
    }
    let elf_header = FileHeader32::<Endianness>::parse(elf_data)?;
    let endian = elf_header.endian()?;

    let mut sections = vec![];
    for segment in elf_header.program_headers(endian, elf_data)? {
        if segment.p_type(endian) != PT_LOAD {
            continue;
        }
        // Programmed to the physical address, not where it runs.
        let p_paddr = segment.p_paddr(endian);
        let segment_data = segment
            .data(endian, elf_data)
            .map_err(|_| anyhow::format_err!("Failed to access data for an ELF segment."))?;
        if segment_data.is_empty() {
            continue;
        }
        log::debug!(
            "Found loadable segment, physical address: {:#010x}, virtual address: {:#010x}, size: {:#x}",
            p_paddr,
            segment.p_vaddr(endian),
            segment_data.len()
        );
        sections.push((p_paddr, segment_data.into()));
    }

    if sections.is_empty() {
        anyhow::bail!("empty ELF file");
    }
    log::debug!("found {} loadable segments", sections.len());
    merge_sections(sections)
}

/// Lay out sections by address, gaps are filled with the erased flash value.
fn merge_sections(mut sections: Vec<(u32, Cow<[u8]>)>) -> Result<Firmware> {
    sections.sort_by_key(|(addr, _)| *addr);

    let Some(start_address) = sections.first().map(|(addr, _)| *addr) else {
        return Ok(Firmware {
            address: None,
            data: vec![],
        });
    };
    let mut end_address = start_address;
    for (addr, sect) in &sections {
        let end = addr
            .checked_add(sect.len() as u32)
            .ok_or_else(|| anyhow::format_err!("section at 0x{:08x} overflows", addr))?;
        end_address = end_address.max(end);
    }

    let mut binary = vec![0xffu8; (end_address - start_address) as usize];
    let mut covered = start_address;
    for (addr, sect) in sections {
        anyhow::ensure!(addr >= covered, "overlapping data at 0x{:08x}", addr);
        let sect_start = (addr - start_address) as usize;
        binary[sect_start..sect_start + sect.len()].copy_from_slice(&sect);
        covered = addr + sect.len() as u32;
    }
    Ok(Firmware {
        address: Some(start_address),
        data: binary,
    })
}
