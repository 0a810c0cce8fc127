//! STM32 USART bootloader session, based on AN3155.
//!
//! [`Bootloader`] owns the transport and speaks the command/response
//! protocol: handshake, command framing, acknowledgements and the primitive
//! commands. Multi-block algorithms live in [`crate::planner`].
use std::fmt;
use std::ops::Range;
use std::thread::sleep;
use std::time::Duration;

use scroll::{BE, Pread};

use crate::constants::{DEFAULT_FLASH_START, INIT, INIT_ATTEMPTS, timeouts};
use crate::device::{Device, DeviceDb};
use crate::error::{Error, Result};
use crate::protocol::{self, Command, ExtendedEraseParam, Reply};
use crate::transport::Transport;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum State {
    Disconnected,
    Handshaking,
    Identified,
    Ready,
}

/// Bootloader version, major and minor packed into nibbles.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Version(pub u8);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.0 >> 4, self.0 & 0x0f)
    }
}

pub struct Bootloader<T: Transport> {
    transport: T,
    state: State,
    chip_id: Option<u16>,
    version: Version,
    commands: Vec<Command>,
    extended_erase: bool,
    /// Option bytes reported by GetVersionReadProtection
    read_protection: [u8; 2],
    /// Loaded on first connect
    db: Option<DeviceDb>,
    /// Database entry of the identified chip
    descriptor: Option<Device>,
    /// `descriptor` with the flash size override applied
    device: Option<Device>,
    flash_size_override: Option<u32>,
}

impl<T: Transport> Bootloader<T> {
    pub fn new(transport: T) -> Self {
        Bootloader {
            transport,
            state: State::Disconnected,
            chip_id: None,
            version: Version::default(),
            commands: Vec::new(),
            extended_erase: false,
            read_protection: [0; 2],
            db: None,
            descriptor: None,
            device: None,
            flash_size_override: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Ready
    }

    pub fn chip_id(&self) -> Option<u16> {
        self.chip_id
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Commands advertised by the Get command.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn supports_extended_erase(&self) -> bool {
        self.extended_erase
    }

    pub fn read_protection(&self) -> [u8; 2] {
        self.read_protection
    }

    /// Device descriptor, with any forced flash size applied.
    pub fn device(&self) -> Option<&Device> {
        self.device.as_ref()
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Overrides the flash size of the identified device, or provides one
    /// when the device is not in the database.
    /// `None` restores the database value.
    pub fn set_flash_size_override(&mut self, size: Option<u32>) {
        self.flash_size_override = size;
        self.apply_flash_size_override();
    }

    fn apply_flash_size_override(&mut self) {
        self.device = self.descriptor.as_ref().map(|dev| match self.flash_size_override {
            Some(size) => {
                log::info!("Forcing flash size of {} to {}KiB", dev, size / 1024);
                dev.with_flash_size(size)
            }
            None => dev.clone(),
        });
    }

    /// Flash address range of the connected device.
    pub fn flash_range(&self) -> Result<Range<u32>> {
        match (&self.device, self.flash_size_override) {
            (Some(dev), _) => Ok(dev.flash.clone()),
            (None, Some(size)) => Ok(DEFAULT_FLASH_START..DEFAULT_FLASH_START.saturating_add(size)),
            (None, None) => Err(self.unknown_device()),
        }
    }

    pub(crate) fn unknown_device(&self) -> Error {
        match self.chip_id {
            Some(id) => Error::UnknownDevice(id),
            None => Error::NotConnected,
        }
    }

    /// Pulse DTR/RTS to reset the target, then give the bootloader time to start.
    pub fn hardware_reset(&mut self, settle: Duration) -> Result<()> {
        log::debug!("Resetting device");
        self.transport.set_dtr(true)?;
        self.transport.set_rts(true)?;
        sleep(Duration::from_millis(100));
        self.transport.set_dtr(false)?;
        self.transport.set_rts(false)?;
        sleep(settle);
        Ok(())
    }

    /// Synchronise with the bootloader and identify the device.
    ///
    /// INIT is only sent when not already connected, a bootloader that has
    /// already seen it answers with NACK.
    pub fn connect(&mut self) -> Result<()> {
        let ret = self.try_connect();
        if ret.is_err() {
            self.disconnect();
        }
        ret
    }

    fn try_connect(&mut self) -> Result<()> {
        if self.state != State::Ready {
            self.state = State::Handshaking;
            self.init()?;
        }

        self.cmd_get()?;
        self.cmd_get_version()?;
        let chip_id = self.cmd_get_id()?;
        self.chip_id = Some(chip_id);
        self.state = State::Identified;

        if self.db.is_none() {
            self.db = Some(DeviceDb::load()?);
        }
        self.descriptor = match self.db.as_ref().and_then(|db| db.lookup(chip_id)) {
            Some(dev) => {
                log::debug!("Found device: {}", dev);
                Some(dev)
            }
            None => {
                log::warn!(
                    "Device id 0x{:03x} not found in the device database, page operations unavailable",
                    chip_id
                );
                None
            }
        };
        self.apply_flash_size_override();
        self.state = State::Ready;
        Ok(())
    }

    pub fn disconnect(&mut self) {
        self.state = State::Disconnected;
        self.chip_id = None;
        self.version = Version::default();
        self.commands.clear();
        self.extended_erase = false;
        self.read_protection = [0; 2];
        self.descriptor = None;
        self.device = None;
    }

    fn init(&mut self) -> Result<()> {
        self.transport.discard_input()?;
        let mut attempt = 1;
        loop {
            log::debug!("Sending init byte");
            self.transport.send_raw(&[INIT])?;
            match self.transport.recv_byte(timeouts::INIT) {
                Ok(b) => {
                    match Reply::from(b) {
                        Reply::Ack => log::debug!("Received bootloader ack"),
                        Reply::Nack => {
                            log::info!("Init NACKed, bootloader might already be initialised")
                        }
                        Reply::Other(b) => {
                            log::warn!("Init answered with unexpected 0x{:02x}, continuing", b)
                        }
                    }
                    return Ok(());
                }
                Err(Error::Timeout) if attempt < INIT_ATTEMPTS => {
                    log::warn!("No answer to init byte, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn cmd_get(&mut self) -> Result<()> {
        self.send_command(Command::Get)?;
        let n = self.transport.recv_byte(timeouts::DEFAULT)?;
        let data = self.transport.recv_raw(n as usize + 1, timeouts::DEFAULT)?;
        self.wait_ack(Command::Get, timeouts::DEFAULT)?;

        self.version = Version(data.pread_with::<u8>(0, BE)?);
        self.commands = data[1..]
            .iter()
            .filter_map(|&code| {
                let cmd = Command::from_code(code);
                if cmd.is_none() {
                    log::debug!("Ignoring unknown command code 0x{:02x}", code);
                }
                cmd
            })
            .collect();
        self.extended_erase = self.commands.contains(&Command::ExtendedErase);
        log::debug!(
            "Bootloader version {}, commands: {:?}",
            self.version,
            self.commands
        );
        Ok(())
    }

    fn cmd_get_version(&mut self) -> Result<()> {
        self.send_command(Command::GetVersionReadProtection)?;
        let data = self.transport.recv_raw(3, timeouts::DEFAULT)?;
        self.wait_ack(Command::GetVersionReadProtection, timeouts::DEFAULT)?;

        let version = data.pread_with::<u8>(0, BE)?;
        self.read_protection = [data.pread_with::<u8>(1, BE)?, data.pread_with::<u8>(2, BE)?];
        log::debug!(
            "GetVersion: version 0x{:02x}, option bytes {}",
            version,
            hex::encode(self.read_protection)
        );
        if version != self.version.0 {
            return Err(Error::VersionMismatch {
                get: self.version.0,
                get_version: version,
            });
        }
        Ok(())
    }

    fn cmd_get_id(&mut self) -> Result<u16> {
        self.send_command(Command::GetId)?;
        let n = self.transport.recv_byte(timeouts::DEFAULT)?;
        let data = self.transport.recv_raw(n as usize + 1, timeouts::DEFAULT)?;
        self.wait_ack(Command::GetId, timeouts::DEFAULT)?;

        let id = data.pread_with::<u16>(0, BE)?;
        log::debug!("Chip id: 0x{:03x}", id);
        Ok(id)
    }

    /// Reads `len` bytes at `address`. `len` must be within 1..=256 and
    /// `address` word aligned.
    pub fn read_memory(&mut self, address: u32, len: usize) -> Result<Vec<u8>> {
        check_aligned(address)?;
        let len_frame = protocol::read_length_frame(len)?;
        let addr_frame = protocol::address_frame(address)?;
        log::debug!("ReadMemory: {}b @ 0x{:08x}", len, address);

        self.send_command(Command::ReadMemory)?;
        self.send_frame(Command::ReadMemory, &addr_frame, timeouts::DEFAULT)?;
        self.send_frame(Command::ReadMemory, &len_frame, timeouts::DEFAULT)?;
        self.transport.recv_raw(len, timeouts::DEFAULT)
    }

    /// Writes `data` (1..=256 bytes) at the word aligned `address`.
    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<()> {
        check_aligned(address)?;
        let data_frame = protocol::write_frame(data)?;
        let addr_frame = protocol::address_frame(address)?;
        log::debug!("WriteMemory: {}b @ 0x{:08x}", data.len(), address);

        self.send_command(Command::WriteMemory)?;
        self.send_frame(Command::WriteMemory, &addr_frame, timeouts::DEFAULT)?;
        self.send_frame(Command::WriteMemory, &data_frame, timeouts::DEFAULT)
    }

    /// Legacy erase of up to 256 pages with one byte page numbers.
    pub fn erase(&mut self, pages: &[u8]) -> Result<()> {
        let frame = protocol::erase_frame(pages)?;
        log::debug!("Erase: {} pages", pages.len());

        self.send_command(Command::Erase)?;
        self.send_frame(Command::Erase, &frame, timeouts::ERASE)
    }

    /// Legacy global erase.
    pub fn mass_erase(&mut self) -> Result<()> {
        log::debug!("Erase: mass erase");
        self.send_command(Command::Erase)?;
        self.send_frame(Command::Erase, &protocol::mass_erase_frame(), timeouts::ERASE)
    }

    /// Extended erase with two byte page numbers.
    pub fn extended_erase(&mut self, pages: &[u16]) -> Result<()> {
        let frame = protocol::extended_erase_frame(pages)?;
        log::debug!("ExtendedErase: {} pages", pages.len());

        self.send_command(Command::ExtendedErase)?;
        self.send_frame(Command::ExtendedErase, &frame, timeouts::ERASE)
    }

    /// Extended erase of a whole bank or the whole flash.
    pub fn extended_erase_special(&mut self, param: ExtendedEraseParam) -> Result<()> {
        log::debug!("ExtendedErase: {:?}", param);
        self.send_command(Command::ExtendedErase)?;
        self.send_frame(
            Command::ExtendedErase,
            &protocol::extended_erase_special_frame(param),
            timeouts::ERASE,
        )
    }

    /// Jump to `address`. The bootloader does not answer after the address ACK.
    pub fn go(&mut self, address: u32) -> Result<()> {
        let addr_frame = protocol::address_frame(address)?;
        log::debug!("Go: 0x{:08x}", address);

        self.send_command(Command::Go)?;
        self.send_frame(Command::Go, &addr_frame, timeouts::DEFAULT)
    }

    /// Remove write protection of all sectors. The device resets afterwards,
    /// so the session ends here.
    pub fn write_unprotect(&mut self) -> Result<()> {
        log::debug!("WriteUnprotect");
        self.send_command(Command::WriteUnprotect)?;
        self.wait_ack(Command::WriteUnprotect, timeouts::ERASE)?;
        self.disconnect();
        Ok(())
    }

    fn send_command(&mut self, command: Command) -> Result<()> {
        self.transport.send_raw(&command.into_raw())?;
        self.wait_ack(command, timeouts::DEFAULT)
    }

    fn send_frame(&mut self, command: Command, frame: &[u8], timeout: Duration) -> Result<()> {
        log::trace!("{:?} => {}", command, hex::encode(frame));
        self.transport.send_raw(frame)?;
        self.wait_ack(command, timeout)
    }

    fn wait_ack(&mut self, command: Command, timeout: Duration) -> Result<()> {
        match Reply::from(self.transport.recv_byte(timeout)?) {
            Reply::Ack => Ok(()),
            Reply::Nack => {
                log::debug!("{:?}: NACK", command);
                Err(Error::Nack(command))
            }
            Reply::Other(b) => {
                log::warn!("{:?}: unexpected response 0x{:02x}", command, b);
                Err(Error::UnexpectedResponse(b))
            }
        }
    }
}

impl<T: Transport> fmt::Debug for Bootloader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootloader")
            .field("state", &self.state)
            .field("chip_id", &self.chip_id)
            .field("version", &self.version)
            .field("extended_erase", &self.extended_erase)
            .field("device", &self.device)
            .finish()
    }
}

fn check_aligned(address: u32) -> Result<()> {
    if address % 4 != 0 {
        return Err(Error::invalid(format!(
            "address 0x{:08x} is not word aligned",
            address
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::constants::{ACK, NACK};
    use pretty_assertions::assert_eq;

    /// Replays canned bytes, `None` standing for a read timeout.
    #[derive(Default)]
    struct Script {
        rx: VecDeque<Option<u8>>,
        tx: Vec<u8>,
        timeouts: Vec<Duration>,
        discards: usize,
    }

    impl Script {
        fn new(rx: &[u8]) -> Self {
            Script {
                rx: rx.iter().map(|&b| Some(b)).collect(),
                ..Default::default()
            }
        }

        fn timeout(mut self) -> Self {
            self.rx.push_front(None);
            self
        }
    }

    impl Transport for Script {
        fn send_raw(&mut self, raw: &[u8]) -> Result<()> {
            self.tx.extend_from_slice(raw);
            Ok(())
        }

        fn recv_raw(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
            self.timeouts.push(timeout);
            let mut buf = Vec::with_capacity(len);
            for _ in 0..len {
                match self.rx.pop_front() {
                    Some(Some(b)) => buf.push(b),
                    _ => return Err(Error::Timeout),
                }
            }
            Ok(buf)
        }

        fn discard_input(&mut self) -> Result<()> {
            self.discards += 1;
            Ok(())
        }
    }

    const COMMANDS: [u8; 11] = [
        0x00, 0x01, 0x02, 0x11, 0x21, 0x31, 0x44, 0x63, 0x73, 0x82, 0x92,
    ];

    fn identify_replies(id: u16, extended: bool) -> Vec<u8> {
        let mut rx = vec![ACK, COMMANDS.len() as u8, 0x31];
        rx.extend(COMMANDS.iter().map(|&c| if c == 0x44 && !extended { 0x43 } else { c }));
        rx.extend([ACK, ACK, 0x31, 0x00, 0x00, ACK]);
        rx.extend([ACK, 0x01]);
        rx.extend(id.to_be_bytes());
        rx.push(ACK);
        rx
    }

    fn connected(id: u16, extended: bool, rest: &[u8]) -> Bootloader<Script> {
        let mut rx = vec![ACK];
        rx.extend(identify_replies(id, extended));
        rx.extend_from_slice(rest);
        let mut bl = Bootloader::new(Script::new(&rx));
        bl.connect().unwrap();
        bl.transport_mut().tx.clear();
        bl
    }

    #[test]
    fn connect_identifies_device() {
        let mut rx = vec![ACK];
        rx.extend(identify_replies(0x410, true));
        let mut bl = Bootloader::new(Script::new(&rx));
        bl.connect().unwrap();

        assert_eq!(bl.state(), State::Ready);
        assert_eq!(bl.chip_id(), Some(0x410));
        assert_eq!(bl.version().to_string(), "3.1");
        assert!(bl.supports_extended_erase());
        assert_eq!(bl.commands().len(), 11);
        assert_eq!(bl.device().unwrap().name, "STM32F10xxx Medium-density");
        assert_eq!(
            bl.transport_mut().tx,
            vec![0x7f, 0x00, 0xff, 0x01, 0xfe, 0x02, 0xfd]
        );
        assert_eq!(bl.transport_mut().timeouts[0], timeouts::INIT);
    }

    #[test]
    fn legacy_erase_capability() {
        let bl = connected(0x410, false, &[]);
        assert!(!bl.supports_extended_erase());
        assert!(bl.commands().contains(&Command::Erase));
    }

    #[test]
    fn init_nack_is_tolerated() {
        let mut rx = vec![NACK];
        rx.extend(identify_replies(0x410, true));
        let mut bl = Bootloader::new(Script::new(&rx));
        bl.connect().unwrap();
        assert!(bl.is_connected());
    }

    #[test]
    fn init_retries_once_after_timeout() {
        let mut rx = vec![ACK];
        rx.extend(identify_replies(0x410, true));
        let mut bl = Bootloader::new(Script::new(&rx).timeout());
        bl.connect().unwrap();
        assert!(bl.is_connected());
        assert_eq!(&bl.transport_mut().tx[..2], &[0x7f, 0x7f]);
    }

    #[test]
    fn init_gives_up_after_second_timeout() {
        let mut bl = Bootloader::new(Script::new(&[]).timeout().timeout());
        assert!(matches!(bl.connect(), Err(Error::Timeout)));
        assert_eq!(bl.state(), State::Disconnected);
        assert_eq!(bl.transport_mut().tx, vec![0x7f, 0x7f]);
    }

    #[test]
    fn reconnect_skips_init() {
        let mut bl = connected(0x410, true, &identify_replies(0x410, true));
        bl.connect().unwrap();
        assert_eq!(bl.transport_mut().tx[0], 0x00);
    }

    #[test]
    fn stale_input_is_dropped_before_init() {
        let mut bl = connected(0x410, true, &identify_replies(0x410, true));
        assert_eq!(bl.transport_mut().discards, 1);
        bl.connect().unwrap();
        assert_eq!(bl.transport_mut().discards, 1);
    }

    #[test]
    fn device_database_outlives_session() {
        let mut bl = connected(0x410, true, &[]);
        assert!(bl.db.is_some());
        bl.disconnect();
        assert!(bl.db.is_some());
        assert!(bl.device().is_none());
    }

    #[test]
    fn clearing_flash_size_override_restores_database_size() {
        let mut bl = connected(0x410, true, &[]);
        bl.set_flash_size_override(Some(0x4_0000));
        assert_eq!(bl.flash_range().unwrap(), 0x0800_0000..0x0804_0000);
        bl.set_flash_size_override(None);
        assert_eq!(bl.flash_range().unwrap(), 0x0800_0000..0x0802_0000);
        assert_eq!(bl.device().unwrap().flash_size(), 128 * 1024);
    }

    #[test]
    fn version_mismatch_fails() {
        let mut rx = vec![ACK];
        let mut replies = identify_replies(0x410, true);
        // GetVersion reply version byte follows the Get ACK and command ACK
        let pos = 3 + COMMANDS.len() + 2;
        replies[pos] = 0x22;
        rx.extend(replies);
        let mut bl = Bootloader::new(Script::new(&rx));
        assert!(matches!(
            bl.connect(),
            Err(Error::VersionMismatch {
                get: 0x31,
                get_version: 0x22
            })
        ));
        assert!(!bl.is_connected());
    }

    #[test]
    fn unknown_device_still_connects() {
        let mut rx = vec![ACK];
        rx.extend(identify_replies(0x123, true));
        let mut bl = Bootloader::new(Script::new(&rx));
        bl.connect().unwrap();
        assert!(bl.device().is_none());
        assert!(matches!(bl.flash_range(), Err(Error::UnknownDevice(0x123))));

        bl.set_flash_size_override(Some(0x1_0000));
        assert_eq!(bl.flash_range().unwrap(), 0x0800_0000..0x0801_0000);
    }

    #[test]
    fn read_memory_framing() {
        let mut bl = connected(0x410, true, &[ACK, ACK, ACK, 1, 2, 3, 4]);
        let data = bl.read_memory(0x0800_0000, 4).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
        assert_eq!(
            bl.transport_mut().tx,
            vec![0x11, 0xee, 0x08, 0x00, 0x00, 0x00, 0x08, 0x03, 0xfc]
        );
    }

    #[test]
    fn write_memory_framing() {
        let mut bl = connected(0x410, true, &[ACK, ACK, ACK]);
        bl.write_memory(0x0800_0100, &[0xaa, 0xbb, 0xcc, 0xdd]).unwrap();
        assert_eq!(
            bl.transport_mut().tx,
            vec![
                0x31, 0xce, 0x08, 0x00, 0x01, 0x00, 0x09, 0x03, 0xaa, 0xbb, 0xcc, 0xdd,
                0x03 ^ 0xaa ^ 0xbb ^ 0xcc ^ 0xdd
            ]
        );
    }

    #[test]
    fn preconditions_are_checked_before_io() {
        let mut bl = connected(0x410, true, &[]);
        assert!(matches!(
            bl.read_memory(0x0800_0001, 4),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            bl.read_memory(0x0800_0000, 257),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            bl.write_memory(0x0800_0002, &[0; 4]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            bl.write_memory(0x0800_0000, &[0; 300]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(bl.erase(&[]), Err(Error::InvalidArgument(_))));
        assert!(bl.transport_mut().tx.is_empty());
    }

    #[test]
    fn nack_is_reported_with_command() {
        let mut bl = connected(0x410, true, &[NACK]);
        assert!(matches!(
            bl.read_memory(0x0800_0000, 4),
            Err(Error::Nack(Command::ReadMemory))
        ));
    }

    #[test]
    fn garbage_is_unexpected_response() {
        let mut bl = connected(0x410, true, &[0x42]);
        let err = bl.go(0x0800_0000).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(0x42)));
        assert!(err.is_protocol());
    }

    #[test]
    fn erase_uses_long_timeout() {
        let mut bl = connected(0x410, false, &[ACK, ACK]);
        bl.erase(&[1, 2]).unwrap();
        assert_eq!(bl.transport_mut().tx, vec![0x43, 0xbc, 0x01, 0x01, 0x02, 0x02]);
        assert_eq!(*bl.transport_mut().timeouts.last().unwrap(), timeouts::ERASE);
    }

    #[test]
    fn mass_erase_framing() {
        let mut bl = connected(0x410, false, &[ACK, ACK]);
        bl.mass_erase().unwrap();
        assert_eq!(bl.transport_mut().tx, vec![0x43, 0xbc, 0xff, 0x00]);

        let mut bl = connected(0x410, true, &[ACK, ACK]);
        bl.extended_erase_special(ExtendedEraseParam::MassErase)
            .unwrap();
        assert_eq!(bl.transport_mut().tx, vec![0x44, 0xbb, 0xff, 0xff, 0x00]);
    }

    #[test]
    fn go_reads_only_the_address_ack() {
        let mut bl = connected(0x410, true, &[ACK, ACK]);
        bl.go(0x2000_0000).unwrap();
        assert_eq!(
            bl.transport_mut().tx,
            vec![0x21, 0xde, 0x20, 0x00, 0x00, 0x00, 0x20]
        );
        assert!(bl.transport_mut().rx.is_empty());
    }

    #[test]
    fn disconnect_resets_session() {
        let mut bl = connected(0x410, true, &[]);
        bl.disconnect();
        assert_eq!(bl.state(), State::Disconnected);
        assert_eq!(bl.chip_id(), None);
        assert!(bl.device().is_none());
        assert!(!bl.supports_extended_erase());
    }
}
