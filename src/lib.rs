//! STM32 USART bootloader (AN3155) implementation.

pub mod bootloader;
pub mod constants;
pub mod device;
pub mod error;
pub mod flashing;
pub mod format;
pub mod planner;
pub mod protocol;
pub mod transport;

pub use self::bootloader::{Bootloader, State};
pub use self::device::{Device, DeviceDb, Flag};
pub use self::error::{Error, Result};
pub use self::flashing::{EraseMode, Flashing, Options, ProgressEvent, ProgressListener};
pub use self::protocol::{Command, ExtendedEraseParam};
pub use self::transport::Transport;
