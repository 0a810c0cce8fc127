//! Flash algorithms built on the bootloader primitives: page math, chunked
//! transfers, erase command selection and read-after-write verification.
use std::borrow::Cow;
use std::ops::Range;

use crate::bootloader::Bootloader;
use crate::constants::{MAX_EXTENDED_ERASE_PAGES, MAX_READ_SIZE, MAX_WRITE_SIZE};
use crate::device::{Device, Flag};
use crate::error::{Error, Result};
use crate::protocol::ExtendedEraseParam;
use crate::transport::Transport;

/// Inclusive range of flash page indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    pub start: u32,
    pub end: u32,
}

impl PageSpan {
    pub fn count(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

/// Pages covering `len` bytes from `address`.
///
/// Only devices with a single page size are supported, sector layouts have
/// to be erased as a whole.
pub fn page_span(device: &Device, address: u32, len: u32) -> Result<PageSpan> {
    let page_size = device.uniform_page_size().ok_or_else(|| {
        Error::invalid(format!(
            "unsupported: mixed page sizes on {}, use a full erase",
            device
        ))
    })?;
    if len == 0 {
        return Err(Error::invalid("erase length must not be zero"));
    }
    let last = address
        .checked_add(len - 1)
        .filter(|&last| address >= device.flash.start && last < device.flash.end)
        .ok_or_else(|| {
            Error::invalid(format!(
                "0x{:08x}+0x{:x} is outside flash 0x{:08x}..0x{:08x}",
                address, len, device.flash.start, device.flash.end
            ))
        })?;

    Ok(PageSpan {
        start: (address - device.flash.start) / page_size,
        end: (last - device.flash.start) / page_size,
    })
}

fn offset_address(address: u32, offset: usize) -> Result<u32> {
    u32::try_from(offset)
        .ok()
        .and_then(|o| address.checked_add(o))
        .ok_or_else(|| Error::invalid(format!("0x{:08x}+0x{:x} overflows", address, offset)))
}

/// Flash is programmed in words, pad the tail with the erased value.
fn pad_to_word(chunk: &[u8]) -> Cow<'_, [u8]> {
    match chunk.len() % 4 {
        0 => Cow::Borrowed(chunk),
        rem => {
            let mut padded = chunk.to_vec();
            padded.resize(chunk.len() + 4 - rem, 0xff);
            Cow::Owned(padded)
        }
    }
}

impl<T: Transport> Bootloader<T> {
    /// Erase the pages covering `len` bytes from `address`.
    pub fn erase_pages(&mut self, address: u32, len: u32) -> Result<()> {
        let span = {
            let device = self.device().ok_or_else(|| self.unknown_device())?;
            page_span(device, address, len)?
        };
        log::info!(
            "Erasing 0x{:08x}..0x{:08x}: {} pages ({}..={})",
            address,
            address as u64 + len as u64,
            span.count(),
            span.start,
            span.end
        );

        if self.supports_extended_erase() {
            let pages = span
                .pages()
                .map(|p| u16::try_from(p).map_err(|_| Error::invalid(format!("page {} out of range", p))))
                .collect::<Result<Vec<u16>>>()?;
            for batch in pages.chunks(MAX_EXTENDED_ERASE_PAGES) {
                self.extended_erase(batch)?;
            }
            Ok(())
        } else {
            let pages = span
                .pages()
                .map(|p| {
                    u8::try_from(p).map_err(|_| {
                        Error::invalid(format!(
                            "page {} cannot be expressed with legacy erase, use a full erase",
                            p
                        ))
                    })
                })
                .collect::<Result<Vec<u8>>>()?;
            self.erase(&pages)
        }
    }

    /// Erase the whole flash, page by page on devices without mass erase.
    pub fn erase_all(&mut self) -> Result<()> {
        let no_mass_erase = self
            .device()
            .is_some_and(|d| d.has_flag(Flag::NoMassErase));

        if no_mass_erase {
            let flash = self.flash_range()?;
            log::info!("Mass erase not supported, erasing page by page");
            self.erase_pages(flash.start, flash.end - flash.start)
        } else if self.supports_extended_erase() {
            self.extended_erase_special(ExtendedEraseParam::MassErase)
        } else {
            self.mass_erase()
        }
    }

    /// Read `len` bytes from `address` in protocol sized chunks. Nothing is
    /// returned unless every chunk was read.
    pub fn read_memory_range(
        &mut self,
        address: u32,
        len: usize,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len);
        while buf.len() < len {
            let chunk = (len - buf.len()).min(MAX_READ_SIZE);
            let data = self.read_memory(offset_address(address, buf.len())?, chunk)?;
            buf.extend_from_slice(&data);
            progress(buf.len(), len);
        }
        Ok(buf)
    }

    /// Read `len` bytes from the start of flash.
    pub fn read_flash(&mut self, len: usize, progress: impl FnMut(usize, usize)) -> Result<Vec<u8>> {
        let flash = self.flash_range()?;
        self.read_memory_range(flash.start, len, progress)
    }

    /// Write `data` from `address` in protocol sized chunks, optionally
    /// reading each chunk back. `progress` is called after each chunk that
    /// was written (and verified).
    pub fn write_memory_range(
        &mut self,
        address: u32,
        data: &[u8],
        verify: bool,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<()> {
        let total = data.len();
        for (i, chunk) in data.chunks(MAX_WRITE_SIZE).enumerate() {
            let offset = i * MAX_WRITE_SIZE;
            let chunk_address = offset_address(address, offset)?;
            let padded = pad_to_word(chunk);
            self.write_memory(chunk_address, &padded)?;

            if verify {
                let readback = self.read_memory(chunk_address, padded.len())?;
                let mismatch = chunk
                    .iter()
                    .zip(readback.iter())
                    .position(|(a, b)| a != b)
                    .or((readback.len() < chunk.len()).then_some(readback.len()));
                if let Some(pos) = mismatch {
                    log::warn!("Verify failed at 0x{:08x}", chunk_address as u64 + pos as u64);
                    return Err(Error::VerifyMismatch {
                        address: chunk_address.wrapping_add(pos as u32),
                        offset: offset + pos,
                    });
                }
            }

            progress(offset + chunk.len(), total);
        }
        Ok(())
    }

    /// Fails unless `len` bytes from `address` lie within flash, or within
    /// the RAM usable by the bootloader.
    pub fn check_writable(&self, address: u32, len: usize) -> Result<()> {
        let flash = self.flash_range()?;
        let end = u32::try_from(len).ok().and_then(|l| address.checked_add(l));
        let inside = |r: &Range<u32>| end.is_some_and(|end| address >= r.start && end <= r.end);
        if inside(&flash) || self.device().is_some_and(|d| inside(&d.ram)) {
            return Ok(());
        }
        Err(Error::invalid(format!(
            "{} bytes at 0x{:08x} do not fit in flash 0x{:08x}..0x{:08x}",
            len, address, flash.start, flash.end
        )))
    }

    /// Write `data` to the start of flash.
    pub fn write_flash(
        &mut self,
        data: &[u8],
        verify: bool,
        progress: impl FnMut(usize, usize),
    ) -> Result<()> {
        let start = self.flash_range()?.start;
        self.check_writable(start, data.len())?;
        self.write_memory_range(start, data, verify, progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDb;
    use pretty_assertions::assert_eq;

    fn device(id: u16) -> Device {
        DeviceDb::load().unwrap().lookup(id).unwrap()
    }

    #[test]
    fn pages_of_1k_device() {
        // STM32F10xxx Medium-density: 1KiB pages at 0x08000000
        let dev = device(0x410);
        let span = page_span(&dev, 0x0800_0400, 0x800).unwrap();
        assert_eq!(span, PageSpan { start: 1, end: 2 });
        assert_eq!(span.count(), 2);

        let span = page_span(&dev, 0x0800_0000, 1).unwrap();
        assert_eq!(span, PageSpan { start: 0, end: 0 });

        let span = page_span(&dev, 0x0800_03ff, 2).unwrap();
        assert_eq!(span, PageSpan { start: 0, end: 1 });

        let span = page_span(&dev, dev.flash.start, dev.flash_size()).unwrap();
        assert_eq!(span.count(), 128);
    }

    #[test]
    fn mixed_page_sizes_are_rejected() {
        let dev = device(0x413);
        assert!(matches!(
            page_span(&dev, 0x0800_0000, 0x4000),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn out_of_flash_is_rejected() {
        let dev = device(0x410);
        assert!(page_span(&dev, 0x07ff_fc00, 0x400).is_err());
        assert!(page_span(&dev, 0x0801_fc00, 0x800).is_err());
        assert!(page_span(&dev, 0x0800_0000, 0).is_err());
        assert!(page_span(&dev, 0xffff_ff00, 0x200).is_err());
    }

    #[test]
    fn padding() {
        assert_eq!(&*pad_to_word(&[1, 2, 3, 4]), &[1, 2, 3, 4]);
        assert_eq!(&*pad_to_word(&[1, 2, 3, 4, 5]), &[1, 2, 3, 4, 5, 0xff, 0xff, 0xff]);
    }
}
