//! The underlying binary protocol of the STM32 USART bootloader (AN3155)

use scroll::{BE, Pwrite};

use crate::constants::{ACK, LEGACY_MASS_ERASE, MAX_EXTENDED_ERASE_COUNT, NACK};
use crate::error::{Error, Result};

/// STM32 bootloader command
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Command {
    /// Gets the bootloader version and the allowed commands
    Get = 0x00,
    /// Gets the bootloader version and the Read Protection status of the Flash memory
    GetVersionReadProtection = 0x01,
    /// Gets the chip ID
    GetId = 0x02,
    /// Reads up to 256 bytes of memory starting from an address specified by the application
    ReadMemory = 0x11,
    /// Jumps to user application code located in the internal Flash memory or in the SRAM
    Go = 0x21,
    /// Writes up to 256 bytes to the RAM or Flash memory
    WriteMemory = 0x31,
    /// Erases from one to all the Flash memory pages
    Erase = 0x43,
    /// Erases pages using two byte addressing mode (bootloader v3.0 and above)
    ExtendedErase = 0x44,
    /// Enables the write protection for some sectors
    WriteProtect = 0x63,
    /// Disables the write protection for all Flash memory sectors
    WriteUnprotect = 0x73,
    /// Enables the read protection
    ReadoutProtect = 0x82,
    /// Disables the read protection
    ReadoutUnprotect = 0x92,
}

impl Command {
    pub const ALL: [Command; 12] = [
        Command::Get,
        Command::GetVersionReadProtection,
        Command::GetId,
        Command::ReadMemory,
        Command::Go,
        Command::WriteMemory,
        Command::Erase,
        Command::ExtendedErase,
        Command::WriteProtect,
        Command::WriteUnprotect,
        Command::ReadoutProtect,
        Command::ReadoutUnprotect,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }

    /// Opcode followed by its complement.
    pub const fn into_raw(self) -> [u8; 2] {
        [self.code(), !self.code()]
    }
}

/// Single byte reply to a framed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nack,
    Other(u8),
}

impl From<u8> for Reply {
    fn from(b: u8) -> Self {
        match b {
            ACK => Reply::Ack,
            NACK => Reply::Nack,
            other => Reply::Other(other),
        }
    }
}

/// Special codes of the extended erase command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtendedEraseParam {
    MassErase,
    Bank1Erase,
    Bank2Erase,
}

impl ExtendedEraseParam {
    pub const fn code(self) -> u16 {
        match self {
            ExtendedEraseParam::MassErase => 0xffff,
            ExtendedEraseParam::Bank1Erase => 0xfffe,
            ExtendedEraseParam::Bank2Erase => 0xfffd,
        }
    }
}

/// XOR fold of `bytes`, starting from `seed`.
pub fn checksum(seed: u8, bytes: &[u8]) -> u8 {
    bytes.iter().fold(seed, |acc, &b| acc ^ b)
}

/// Big endian address followed by its checksum.
pub fn address_frame(address: u32) -> Result<[u8; 5]> {
    let mut buf = [0u8; 5];
    buf.pwrite_with(address, 0, BE)?;
    buf[4] = checksum(0, &buf[..4]);
    Ok(buf)
}

/// Byte count of a ReadMemory request, `len - 1` and its complement.
pub fn read_length_frame(len: usize) -> Result<[u8; 2]> {
    let n = length_byte(len, "read")?;
    Ok([n, !n])
}

/// `len - 1`, the payload and the XOR of both.
pub fn write_frame(data: &[u8]) -> Result<Vec<u8>> {
    let n = length_byte(data.len(), "write")?;
    let mut buf = Vec::with_capacity(data.len() + 2);
    buf.push(n);
    buf.extend_from_slice(data);
    buf.push(checksum(n, data));
    Ok(buf)
}

/// Legacy erase of up to 256 one-byte page numbers.
pub fn erase_frame(pages: &[u8]) -> Result<Vec<u8>> {
    let n = length_byte(pages.len(), "erase")?;
    let mut buf = Vec::with_capacity(pages.len() + 2);
    buf.push(n);
    buf.extend_from_slice(pages);
    buf.push(checksum(n, pages));
    Ok(buf)
}

/// Legacy global erase.
pub const fn mass_erase_frame() -> [u8; 2] {
    [LEGACY_MASS_ERASE, LEGACY_MASS_ERASE ^ LEGACY_MASS_ERASE]
}

/// Extended erase of two-byte page numbers, checksum over everything sent.
pub fn extended_erase_frame(pages: &[u16]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(Error::invalid("extended erase needs at least one page"));
    }
    let count = u16::try_from(pages.len() - 1)
        .ok()
        .filter(|&n| n < MAX_EXTENDED_ERASE_COUNT)
        .ok_or_else(|| Error::invalid(format!("too many pages: {}", pages.len())))?;

    let mut buf = vec![0u8; 2 + 2 * pages.len() + 1];
    let mut offset = buf.pwrite_with(count, 0, BE)?;
    for &page in pages {
        offset += buf.pwrite_with(page, offset, BE)?;
    }
    buf[offset] = checksum(0, &buf[..offset]);
    Ok(buf)
}

/// Extended erase with one of the special codes.
pub fn extended_erase_special_frame(param: ExtendedEraseParam) -> [u8; 3] {
    let [hi, lo] = param.code().to_be_bytes();
    [hi, lo, hi ^ lo]
}

fn length_byte(len: usize, what: &str) -> Result<u8> {
    match len {
        1..=256 => Ok((len - 1) as u8),
        _ => Err(Error::invalid(format!(
            "{} length must be within 1..=256, got {}",
            what, len
        ))),
    }
}
