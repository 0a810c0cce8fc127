//! Abstract Device transport interface.
use std::time::Duration;

use crate::error::{Error, Result};

pub use self::serial::{Baudrate, SerialTransport};

mod serial;

/// Abstraction of the byte link to the bootloader.
///
/// `recv_raw` returns exactly `len` bytes or fails; a read that runs out of
/// time must report [`Error::Timeout`](crate::Error::Timeout) so the
/// handshake can tell it apart from a broken link.
pub trait Transport {
    fn send_raw(&mut self, raw: &[u8]) -> Result<()>;
    fn recv_raw(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Drive the DTR line, used for reset sequencing. No-op by default.
    fn set_dtr(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    /// Drive the RTS line, used for BOOT0 sequencing. No-op by default.
    fn set_rts(&mut self, _level: bool) -> Result<()> {
        Ok(())
    }

    /// Drop stale input before the handshake. No-op by default.
    fn discard_input(&mut self) -> Result<()> {
        Ok(())
    }

    fn recv_byte(&mut self, timeout: Duration) -> Result<u8> {
        self.recv_raw(1, timeout)?
            .first()
            .copied()
            .ok_or(Error::Timeout)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        (**self).send_raw(raw)
    }

    fn recv_raw(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).recv_raw(len, timeout)
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        (**self).set_dtr(level)
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        (**self).set_rts(level)
    }

    fn discard_input(&mut self) -> Result<()> {
        (**self).discard_input()
    }
}
