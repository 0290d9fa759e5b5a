#![doc = include_str!("../README.md")]

pub mod bot;
pub mod codec;
pub mod commands;
pub mod storage;
pub mod transport;

/// Re-export of the `rusb` crate for raw USB device handling.
pub use rusb;

pub use bot::{BotError, BulkOnly, DataPhase, FramingError};
pub use codec::CommandError;
pub use commands::actions::{NandArea, SECTOR_SIZE};
pub use transport::BulkTransport;
