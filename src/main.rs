use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use simplelog::LevelFilter;

use stm32isp::device::parse_number;
use stm32isp::format::read_firmware_from_file;
use stm32isp::transport::{Baudrate, SerialTransport};
use stm32isp::{DeviceDb, EraseMode, Flashing, Options, ProgressListener};

#[derive(Parser)]
#[command(
    name = "stm32isp",
    version,
    about = "Command-line implementation of the STM32 USART bootloader protocol (AN3155)"
)]
struct Cli {
    /// Serial port, the first one found by default
    #[arg(short, long, global = true)]
    port: Option<String>,
    #[arg(short, long, global = true, value_enum, default_value_t = Baudrate::default())]
    baud: Baudrate,
    /// Assume this flash size (e.g. 128K, 0x20000) instead of the database value
    #[arg(long, global = true, value_parser = parse_number)]
    flash_size: Option<u32>,
    /// Pulse DTR/RTS to reset the target before connecting
    #[arg(long, global = true)]
    reset: bool,
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get info about current connected chip
    Info,
    /// Download to flash
    Flash {
        /// Firmware file: .bin, Intel HEX or ELF
        path: String,
        /// Do not erase before writing
        #[arg(long, conflicts_with = "full_erase")]
        no_erase: bool,
        /// Erase the whole flash instead of the pages being written
        #[arg(long)]
        full_erase: bool,
        /// Skip reading back each written block
        #[arg(long)]
        no_verify: bool,
        /// Start the firmware after flashing
        #[arg(long)]
        run: bool,
    },
    /// Read flash to a file, or hexdump it
    Dump {
        path: Option<String>,
        /// Bytes to read, the whole flash by default
        #[arg(long, value_parser = parse_number)]
        size: Option<u32>,
    },
    /// Erase flash, all of it unless a range is given
    Erase {
        #[arg(long, value_parser = parse_number, requires = "length")]
        address: Option<u32>,
        #[arg(long, value_parser = parse_number, requires = "address")]
        length: Option<u32>,
    },
    /// Remove flash write protection
    Unprotect,
    /// Reset the target connected
    Reset,
    /// Jump to an address
    Go {
        #[arg(value_parser = parse_number)]
        address: u32,
    },
    /// List known devices
    Devices,
}

struct ProgressBarListener {
    bar: ProgressBar,
}

impl ProgressBarListener {
    fn new() -> Result<Self> {
        let bar = ProgressBar::no_length();
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
                .progress_chars("#>-"),
        );
        Ok(ProgressBarListener { bar })
    }
}

impl ProgressListener for ProgressBarListener {
    fn progress(&mut self, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
    }

    fn completed(&mut self, success: bool) {
        if success {
            self.bar.finish();
        } else {
            self.bar.abandon();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _ = simplelog::TermLogger::init(
        cli.log_level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );

    if matches!(cli.command, Commands::Devices) {
        let db = DeviceDb::load()?;
        for family in db.families() {
            println!("{}: {}", family.name, family.description);
            for dev in &family.variants {
                println!(
                    "  0x{:03x} {} (Flash: {}KiB, RAM: {}KiB)",
                    dev.device_id,
                    dev.name,
                    dev.flash_size() / 1024,
                    dev.ram_size() / 1024
                );
            }
        }
        return Ok(());
    }

    if cli.port.is_none() {
        log::debug!("Available ports: {:?}", SerialTransport::scan_ports()?);
    }
    let options = Options {
        reset: cli.reset,
        reset_settle: Duration::from_millis(50),
        flash_size: cli.flash_size,
    };
    let mut flashing = Flashing::new_from_serial(cli.port.as_deref(), cli.baud, options)?;
    let listener = ProgressBarListener::new()?;
    let bar = listener.bar.clone();
    flashing.register_listener(listener);

    match cli.command {
        Commands::Info => {
            flashing.dump_info()?;
        }
        Commands::Flash {
            path,
            no_erase,
            full_erase,
            no_verify,
            run,
        } => {
            let firmware = read_firmware_from_file(path)?;
            log::info!(
                "Firmware size: {} bytes, MD5: {}",
                firmware.len(),
                firmware.digest()
            );
            flashing.connect()?;
            let address = match firmware.address {
                Some(address) => address,
                None => flashing.bootloader().flash_range()?.start,
            };
            let uniform_pages = flashing
                .bootloader()
                .device()
                .is_some_and(|d| d.uniform_page_size().is_some());
            let erase = if no_erase {
                None
            } else if full_erase || !uniform_pages {
                Some(EraseMode::Full)
            } else {
                Some(EraseMode::Partial(
                    address..address.saturating_add(firmware.len() as u32),
                ))
            };
            flashing.flash_firmware_at(address, &firmware.data, erase, !no_verify)?;
            if run {
                flashing.run(Some(address))?;
            }
        }
        Commands::Dump { path, size } => {
            let data = flashing.dump_firmware(size)?;
            bar.finish();
            match path {
                Some(path) => {
                    std::fs::write(&path, &data)?;
                    log::info!("Wrote {} bytes to {}", data.len(), path);
                }
                None => {
                    let mut out = std::io::stdout();
                    hxdmp::hexdump(&data, &mut out)?;
                    println!();
                }
            }
        }
        Commands::Erase { address, length } => match (address, length) {
            (Some(address), Some(length)) => flashing.erase_range(address, length)?,
            _ => flashing.erase_firmware()?,
        },
        Commands::Unprotect => {
            flashing.unprotect()?;
        }
        Commands::Reset => {
            flashing.reset_device()?;
        }
        Commands::Go { address } => {
            flashing.run(Some(address))?;
        }
        Commands::Devices => {}
    }

    Ok(())
}
