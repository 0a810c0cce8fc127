//! Serial Transportation.
use std::io::{ErrorKind, Read, Write};
use std::{fmt::Display, time::Duration};

use clap::{ValueEnum, builder::PossibleValue};
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};

use super::Transport;
use crate::constants::timeouts;
use crate::error::{Error, Result};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Baudrate {
    Baud9600,
    Baud19200,
    Baud38400,
    #[default]
    Baud57600,
    Baud115200,
}

impl From<Baudrate> for u32 {
    fn from(value: Baudrate) -> Self {
        match value {
            Baudrate::Baud9600 => 9600,
            Baudrate::Baud19200 => 19200,
            Baudrate::Baud38400 => 38400,
            Baudrate::Baud57600 => 57600,
            Baudrate::Baud115200 => 115200,
        }
    }
}

impl Display for Baudrate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u32::from(*self))
    }
}

impl ValueEnum for Baudrate {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Baudrate::Baud9600,
            Baudrate::Baud19200,
            Baudrate::Baud38400,
            Baudrate::Baud57600,
            Baudrate::Baud115200,
        ]
    }

    fn to_possible_value(&self) -> Option<PossibleValue> {
        match self {
            Baudrate::Baud9600 => Some(PossibleValue::new("Baud9600").aliases(["9600"])),
            Baudrate::Baud19200 => Some(PossibleValue::new("Baud19200").aliases(["19200"])),
            Baudrate::Baud38400 => Some(PossibleValue::new("Baud38400").aliases(["38400"])),
            Baudrate::Baud57600 => Some(PossibleValue::new("Baud57600").aliases(["57600"])),
            Baudrate::Baud115200 => {
                Some(PossibleValue::new("Baud115200").aliases(["115200", "115_200"]))
            }
        }
    }
}

/// Serial port configured the way the bootloader expects: 8 data bits,
/// even parity, one stop bit, no flow control.
pub struct SerialTransport {
    serial_port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialTransport {
    pub fn scan_ports() -> Result<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }

    pub fn open(port: &str, baudrate: Baudrate) -> Result<Self> {
        log::info!("Opening serial port: \"{}\" @ {} baud, 8E1", port, baudrate);
        let port = serialport::new(port, baudrate.into())
            .data_bits(DataBits::Eight)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(timeouts::DEFAULT)
            .open()?;
        Ok(SerialTransport {
            serial_port: port,
            timeout: timeouts::DEFAULT,
        })
    }

    pub fn open_nth(nth: usize, baudrate: Baudrate) -> Result<Self> {
        let ports = serialport::available_ports()?;

        match ports.get(nth) {
            Some(port) => Self::open(&port.port_name, baudrate),
            None => Err(Error::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("no serial port found at index #{}", nth),
            ))),
        }
    }

    pub fn open_any(baudrate: Baudrate) -> Result<Self> {
        Self::open_nth(0, baudrate)
    }
}

impl Transport for SerialTransport {
    fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
        log::trace!("=> {}", hex::encode(raw));
        self.serial_port.write_all(raw)?;
        self.serial_port.flush()?;
        Ok(())
    }

    fn recv_raw(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        if timeout != self.timeout {
            self.serial_port.set_timeout(timeout)?;
            self.timeout = timeout;
        }

        let mut buf = vec![0u8; len];
        match self.serial_port.read_exact(&mut buf) {
            Ok(()) => {
                log::trace!("<= {}", hex::encode(&buf));
                Ok(buf)
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => Err(Error::Timeout),
            Err(e) => Err(e.into()),
        }
    }

    fn set_dtr(&mut self, level: bool) -> Result<()> {
        self.serial_port.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<()> {
        self.serial_port.write_request_to_send(level)?;
        Ok(())
    }

    /// Drop whatever the device sent before we started talking to it.
    fn discard_input(&mut self) -> Result<()> {
        self.serial_port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}
