use std::path::PathBuf;

use actfw_core::firmware::DEFAULT_SEARCH_LIMIT;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;

use crate::args::{DeviceId, device_id_parser, num_parser};

mod args;
mod commands;
mod progress_bar;
mod session;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Opts {
    /// Verbose
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Which device to talk to.
#[derive(Args, Debug, Clone, Copy)]
pub struct Target {
    /// Device as VVVV:PPPP (hex vendor and product id)
    #[arg(short, long, value_parser = device_id_parser)]
    pub device: DeviceId,

    /// Logical unit number
    #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=7))]
    pub lun: u8,
}

/// Options shared by the commands that switch the device into firmware mode.
#[derive(Args, Debug, Clone, Copy)]
pub struct VendorTarget {
    #[command(flatten)]
    pub target: Target,

    /// Send DETACH when done, whether the command succeeded or not
    #[arg(long)]
    pub detach: bool,
}

/// Selects the alternate header copy instead of the one at sector 0.
#[derive(Args, Debug, Clone, Copy)]
pub struct AlternateArgs {
    /// Use the alternate header copy
    #[arg(long)]
    pub alternate: bool,

    /// Search the alternate header below this sector
    #[arg(long, value_parser = num_parser, default_value_t = DEFAULT_SEARCH_LIMIT)]
    pub max_lba: u32,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List mass storage devices and check which of them are Actions players
    Enumerate,

    /// Send SCSI INQUIRY and print the answer
    Inquiry(Target),

    /// Send SCSI READ CAPACITY and print the answer
    Capacity(Target),

    /// Print the firmware header
    HeaderInfo {
        #[command(flatten)]
        vendor: VendorTarget,

        /// Also list the firmware directory
        #[arg(long)]
        show_dir: bool,

        #[command(flatten)]
        alternate: AlternateArgs,
    },

    /// Dump sectors with SCSI READ(10)
    Read {
        #[command(flatten)]
        target: Target,

        /// First sector
        #[arg(long, value_parser = num_parser, default_value = "0")]
        lba: u32,

        /// Number of sectors
        #[arg(short = 'n', long, value_parser = num_parser, default_value = "1")]
        count: u32,

        /// Output file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Write a file to consecutive sectors with SCSI WRITE(10)
    Write {
        #[command(flatten)]
        target: Target,

        /// First sector
        #[arg(long, value_parser = num_parser)]
        lba: u32,

        /// Input file, the last sector is padded with zeros
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Dump NAND sectors with the vendor read command
    ReadFw {
        #[command(flatten)]
        vendor: VendorTarget,

        /// Read physical instead of logical sectors
        #[arg(long)]
        physical: bool,

        /// First sector
        #[arg(long, value_parser = num_parser, default_value = "0")]
        lba: u32,

        /// Number of sectors
        #[arg(short = 'n', long, value_parser = num_parser, default_value = "1")]
        count: u32,

        /// Output file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Dump device RAM
    ReadRam {
        #[command(flatten)]
        vendor: VendorTarget,

        /// First RAM sector
        #[arg(long, value_parser = num_parser, default_value = "0")]
        sector: u32,

        /// Number of 512-byte sectors
        #[arg(short = 'n', long, value_parser = num_parser, default_value = "1")]
        count: u32,

        /// Output file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the sysinfo block kept in RAM
    Sysinfo(VendorTarget),

    /// Dump the whole firmware image to a flat file
    DumpFw {
        #[command(flatten)]
        vendor: VendorTarget,

        #[command(flatten)]
        alternate: AlternateArgs,

        /// Output file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Dump every firmware entry into an AFI container
    DumpAfi {
        #[command(flatten)]
        vendor: VendorTarget,

        #[command(flatten)]
        alternate: AlternateArgs,

        /// Output file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Send the vendor ENTRY command
    Entry {
        #[command(flatten)]
        vendor: VendorTarget,

        /// Entry parameter
        #[arg(long, value_parser = num_parser)]
        address: u32,
    },
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    let level = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match opts.command {
        Command::Enumerate => commands::enumerate::enumerate(),
        Command::Inquiry(target) => commands::scsi::inquiry(target),
        Command::Capacity(target) => commands::scsi::capacity(target),
        Command::HeaderInfo {
            vendor,
            show_dir,
            alternate,
        } => commands::firmware::header_info(vendor, show_dir, alternate),
        Command::Read {
            target,
            lba,
            count,
            file,
        } => commands::scsi::read(target, lba, count, &file),
        Command::Write { target, lba, file } => commands::scsi::write(target, lba, &file),
        Command::ReadFw {
            vendor,
            physical,
            lba,
            count,
            file,
        } => commands::firmware::read_fw(vendor, physical, lba, count, &file),
        Command::ReadRam {
            vendor,
            sector,
            count,
            file,
        } => commands::ram::read_ram(vendor, sector, count, &file),
        Command::Sysinfo(vendor) => commands::ram::sysinfo(vendor),
        Command::DumpFw {
            vendor,
            alternate,
            file,
        } => commands::firmware::dump_fw(vendor, alternate, &file),
        Command::DumpAfi {
            vendor,
            alternate,
            file,
        } => commands::firmware::dump_afi(vendor, alternate, &file),
        Command::Entry { vendor, address } => commands::ram::entry(vendor, address),
    }
}
