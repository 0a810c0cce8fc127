use std::time::Duration;

/// Autobaud/synchronisation byte sent once after the bootloader starts.
pub const INIT: u8 = 0x7f;
pub const ACK: u8 = 0x79;
pub const NACK: u8 = 0x1f;

pub const MAX_READ_SIZE: usize = 256;
pub const MAX_WRITE_SIZE: usize = 256;
/// Some bootloaders refuse extended erase frames carrying more pages than this.
pub const MAX_EXTENDED_ERASE_PAGES: usize = 512;
/// Count field values 0xFFF0..=0xFFFF select the special erase codes, page
/// lists must stay below.
pub const MAX_EXTENDED_ERASE_COUNT: u16 = 0xfff0;

/// Legacy erase page count byte selecting a global erase.
pub const LEGACY_MASS_ERASE: u8 = 0xff;

/// Flash alias of every STM32 part, used when the device is not in the database.
pub const DEFAULT_FLASH_START: u32 = 0x0800_0000;

pub mod timeouts {
    use super::Duration;

    pub const DEFAULT: Duration = Duration::from_millis(1000);
    pub const INIT: Duration = Duration::from_millis(3000);
    pub const ERASE: Duration = Duration::from_millis(30_000);
}

/// Number of INIT attempts before a response timeout is reported.
pub const INIT_ATTEMPTS: usize = 2;

/// Reset code for ARMv7-M and ARMv6-M, loaded to RAM and started with Go.
///
/// Writes VECTKEY | SYSRESETREQ to the NVIC AIRCR register and spins.
pub const RESET_STUB: [u8; 16] = [
    0x01, 0x49, // ldr r1, [pc, #4]  ; AIRCR address
    0x02, 0x4a, // ldr r2, [pc, #8]  ; AIRCR reset value
    0x0a, 0x60, // str r2, [r1, #0]
    0xfe, 0xe7, // b .
    0x0c, 0xed, 0x00, 0xe0, // .word 0xe000ed0c
    0x04, 0x00, 0xfa, 0x05, // .word 0x05fa0004
];
