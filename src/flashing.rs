//! Chip flashing logic.
use std::ops::Range;
use std::time::Duration;

use scroll::{LE, Pwrite};

use crate::bootloader::Bootloader;
use crate::constants::RESET_STUB;
use crate::device::Flag;
use crate::error::{Error, Result};
use crate::transport::{Baudrate, SerialTransport, Transport};

/// Observer of long running flash operations.
pub trait ProgressListener {
    /// `done` out of `total` bytes have been transferred.
    fn progress(&mut self, done: usize, total: usize);
    /// Called once at the end of every flash attempt.
    fn completed(&mut self, success: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressEvent {
    Progress { done: usize, total: usize },
    Completed { success: bool },
}

impl<F: FnMut(ProgressEvent)> ProgressListener for F {
    fn progress(&mut self, done: usize, total: usize) {
        self(ProgressEvent::Progress { done, total })
    }

    fn completed(&mut self, success: bool) {
        self(ProgressEvent::Completed { success })
    }
}

/// How flash is erased before programming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EraseMode {
    /// Only the pages covering the byte range.
    Partial(Range<u32>),
    /// The whole flash.
    Full,
}

#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Pulse DTR/RTS before the handshake.
    pub reset: bool,
    /// Time given to the bootloader to start after a reset pulse.
    pub reset_settle: Duration,
    /// Flash size to assume instead of the database value.
    pub flash_size: Option<u32>,
}

pub struct Flashing<T: Transport> {
    bootloader: Bootloader<T>,
    listeners: Vec<Box<dyn ProgressListener>>,
    options: Options,
}

impl Flashing<SerialTransport> {
    pub fn new_from_serial(port: Option<&str>, baudrate: Baudrate, options: Options) -> Result<Self> {
        let transport = match port {
            Some(port) => SerialTransport::open(port, baudrate)?,
            None => SerialTransport::open_any(baudrate)?,
        };
        Ok(Self::new(transport, options))
    }
}

impl<T: Transport> Flashing<T> {
    pub fn new(transport: T, options: Options) -> Self {
        let mut bootloader = Bootloader::new(transport);
        bootloader.set_flash_size_override(options.flash_size);
        Flashing {
            bootloader,
            listeners: Vec::new(),
            options,
        }
    }

    pub fn bootloader(&self) -> &Bootloader<T> {
        &self.bootloader
    }

    pub fn bootloader_mut(&mut self) -> &mut Bootloader<T> {
        &mut self.bootloader
    }

    pub fn into_transport(self) -> T {
        self.bootloader.into_transport()
    }

    /// Force the flash size, for parts with more flash than advertised or
    /// missing from the database.
    pub fn set_flash_size(&mut self, size: Option<u32>) {
        self.options.flash_size = size;
        self.bootloader.set_flash_size_override(size);
    }

    pub fn register_listener(&mut self, listener: impl ProgressListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    pub fn connect(&mut self) -> Result<()> {
        if self.options.reset && !self.bootloader.is_connected() {
            self.bootloader.hardware_reset(self.options.reset_settle)?;
        }
        self.bootloader.connect()?;
        if let Some(dev) = self.bootloader.device() {
            log::info!("Connected to {}", dev);
        }
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.bootloader.disconnect();
    }

    fn ensure_connected(&mut self) -> Result<()> {
        if !self.bootloader.is_connected() {
            self.connect()?;
        }
        Ok(())
    }

    pub fn dump_info(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let bl = &self.bootloader;
        let chip_id = bl.chip_id().ok_or(Error::NotConnected)?;
        match bl.device() {
            Some(dev) => {
                log::info!("Chip: {} (Flash: {}KiB, RAM: {}KiB)", dev, dev.flash_size() / 1024, dev.ram_size() / 1024);
                log::info!("Flash: 0x{:08x}..0x{:08x}", dev.flash.start, dev.flash.end);
                log::info!("RAM: 0x{:08x}..0x{:08x}", dev.ram.start, dev.ram.end);
                log::info!(
                    "Option bytes: 0x{:08x}..0x{:08x}",
                    dev.option_bytes.start,
                    dev.option_bytes.end
                );
                log::info!(
                    "System memory: 0x{:08x}..0x{:08x}",
                    dev.system_memory.start,
                    dev.system_memory.end
                );
                match dev.uniform_page_size() {
                    Some(size) => log::info!("Page size: {}B", size),
                    None => log::info!("Sector sizes: {:?}", dev.page_size),
                }
                if !dev.flags.is_empty() {
                    log::info!("Flags: {:?}", dev.flags);
                }
            }
            None => log::warn!("Chip: unknown (0x{:03x})", chip_id),
        }
        log::info!("Bootloader version: {}", bl.version());
        log::info!("Option bytes (GetVersion): {}", hex::encode(bl.read_protection()));
        log::info!(
            "Erase: {}",
            if bl.supports_extended_erase() { "extended" } else { "legacy" }
        );
        log::info!("Commands: {:?}", bl.commands());
        Ok(())
    }

    /// Program `data` at the start of flash.
    pub fn flash_firmware(&mut self, data: &[u8], erase: Option<EraseMode>, verify: bool) -> Result<()> {
        let ret = self.try_flash(None, data, erase, verify);
        self.notify_completed(&ret);
        ret
    }

    /// Program `data` at `address`, reporting to listeners.
    pub fn flash_firmware_at(
        &mut self,
        address: u32,
        data: &[u8],
        erase: Option<EraseMode>,
        verify: bool,
    ) -> Result<()> {
        let ret = self.try_flash(Some(address), data, erase, verify);
        self.notify_completed(&ret);
        ret
    }

    fn notify_completed(&mut self, ret: &Result<()>) {
        for listener in self.listeners.iter_mut() {
            listener.completed(ret.is_ok());
        }
        if let Err(e) = ret {
            log::warn!("Flashing failed: {}", e);
        }
    }

    fn try_flash(
        &mut self,
        address: Option<u32>,
        data: &[u8],
        erase: Option<EraseMode>,
        verify: bool,
    ) -> Result<()> {
        self.ensure_connected()?;
        let start = match address {
            Some(address) => address,
            None => self.bootloader.flash_range()?.start,
        };
        self.bootloader.check_writable(start, data.len())?;

        match erase {
            Some(EraseMode::Full) => self.bootloader.erase_all()?,
            Some(EraseMode::Partial(range)) => self
                .bootloader
                .erase_pages(range.start, range.end.saturating_sub(range.start))?,
            None => {}
        }

        let listeners = &mut self.listeners;
        let progress = |done, total| {
            for listener in listeners.iter_mut() {
                listener.progress(done, total);
            }
        };
        match address {
            Some(address) => self
                .bootloader
                .write_memory_range(address, data, verify, progress)?,
            None => self.bootloader.write_flash(data, verify, progress)?,
        }

        if self
            .bootloader
            .device()
            .is_some_and(|d| d.has_flag(Flag::RequiresPemptyClear))
        {
            log::warn!("Device needs its PEMPTY flag cleared, power cycle it before running from flash");
        }
        log::info!("Flashed {} bytes at 0x{:08x}", data.len(), start);
        Ok(())
    }

    /// Read `size` bytes of flash, the whole flash by default.
    pub fn dump_firmware(&mut self, size: Option<u32>) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        let flash = self.bootloader.flash_range()?;
        let size = size.unwrap_or(flash.end - flash.start);
        log::info!("Reading {} bytes from 0x{:08x}", size, flash.start);

        let listeners = &mut self.listeners;
        self.bootloader.read_flash(size as usize, |done, total| {
            for listener in listeners.iter_mut() {
                listener.progress(done, total);
            }
        })
    }

    pub fn erase_firmware(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.bootloader.erase_all()?;
        log::info!("Flash erased");
        Ok(())
    }

    pub fn erase_range(&mut self, address: u32, len: u32) -> Result<()> {
        self.ensure_connected()?;
        self.bootloader.erase_pages(address, len)?;
        log::info!("Erased 0x{:08x}..0x{:08x}", address, address as u64 + len as u64);
        Ok(())
    }

    /// Remove flash write protection. The device resets afterwards.
    pub fn unprotect(&mut self) -> Result<()> {
        self.ensure_connected()?;
        self.bootloader.write_unprotect()?;
        log::info!("Write protection removed");
        Ok(())
    }

    /// Reset the device by running a SYSRESETREQ stub from RAM.
    pub fn reset_device(&mut self) -> Result<()> {
        self.ensure_connected()?;
        let ram = self
            .bootloader
            .device()
            .map(|d| d.ram.clone())
            .ok_or_else(|| self.bootloader.unknown_device())?;
        let image = reset_image(&ram)?;

        self.bootloader.write_memory(ram.start, &image)?;
        self.bootloader.go(ram.start)?;
        self.bootloader.disconnect();
        log::info!("Device reset");
        Ok(())
    }

    /// Start the application at `address`, the flash start by default.
    pub fn run(&mut self, address: Option<u32>) -> Result<()> {
        self.ensure_connected()?;
        let address = match address {
            Some(address) => address,
            None => self.bootloader.flash_range()?.start,
        };
        self.bootloader.go(address)?;
        self.bootloader.disconnect();
        log::info!("Running from 0x{:08x}", address);
        Ok(())
    }
}

/// Go loads the stack pointer and entry point from the target address, so the
/// stub is prefixed with a two word vector table.
pub(crate) fn reset_image(ram: &Range<u32>) -> Result<Vec<u8>> {
    let len = 8 + RESET_STUB.len();
    if ram.end.saturating_sub(ram.start) < len as u32 {
        return Err(Error::invalid(format!(
            "not enough bootloader RAM at 0x{:08x} for the reset code",
            ram.start
        )));
    }
    let mut image = vec![0u8; len];
    image.pwrite_with::<u32>(ram.end & !7, 0, LE)?;
    image.pwrite_with::<u32>((ram.start + 8) | 1, 4, LE)?;
    image[8..].copy_from_slice(&RESET_STUB);
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn reset_image_layout() {
        let image = reset_image(&(0x2000_0200..0x2000_5000)).unwrap();
        assert_eq!(image.len(), 24);
        assert_eq!(&image[..8], &[0x00, 0x50, 0x00, 0x20, 0x09, 0x02, 0x00, 0x20]);
        assert_eq!(&image[8..], &RESET_STUB);
    }

    #[test]
    fn reset_image_needs_ram() {
        assert!(matches!(
            reset_image(&(0x2000_1800..0x2000_1800)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn closures_are_listeners() {
        let mut events = Vec::new();
        {
            let mut listener = |e: ProgressEvent| events.push(e);
            listener.progress(1, 2);
            listener.completed(true);
        }
        assert_eq!(
            events,
            vec![
                ProgressEvent::Progress { done: 1, total: 2 },
                ProgressEvent::Completed { success: true }
            ]
        );
    }
}
