//! Error types of the bootloader client.
use thiserror::Error;

use crate::protocol::Command;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Rejected locally, nothing was sent to the device.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("bootloader NACKed {0:?} command")]
    Nack(Command),
    #[error("unexpected response byte 0x{0:02x} (neither ACK nor NACK)")]
    UnexpectedResponse(u8),
    #[error("timed out waiting for the bootloader")]
    Timeout,
    #[error("IO error while using serial port: {0}")]
    Io(#[from] std::io::Error),
    #[error("device id 0x{0:03x} not found in the device database")]
    UnknownDevice(u16),
    #[error("verify failed at 0x{address:08x} (offset 0x{offset:x})")]
    VerifyMismatch { address: u32, offset: usize },
    #[error("bootloader version mismatch: Get reported 0x{get:02x}, GetVersion reported 0x{get_version:02x}")]
    VersionMismatch { get: u8, get_version: u8 },
    #[error("malformed response: {0}")]
    Malformed(#[from] scroll::Error),
    #[error("not connected to a bootloader")]
    NotConnected,
    #[error("device database is malformed: {0}")]
    DeviceDb(#[from] serde_yaml::Error),
}

impl From<serialport::Error> for Error {
    fn from(err: serialport::Error) -> Self {
        match err.kind() {
            serialport::ErrorKind::Io(kind) => Self::Io(std::io::Error::new(kind, err.description)),
            _ => Self::Io(std::io::Error::other(err.description)),
        }
    }
}

impl Error {
    /// True when the device answered, but not with what was asked for.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Nack(_) | Error::UnexpectedResponse(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }
}
