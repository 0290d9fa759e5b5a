//! Typed command operations on top of the bulk-only engine.

use log::{debug, warn};
use thiserror::Error;

use crate::bot::{BotError, BulkOnly, DataPhase};
use crate::commands::{
    actions::{
        DetachCommand, EntryCommand, INIT_READY, IDENTIFY_LEN, IdentifyCommand, IdentifyData,
        InitCommand, NandArea, ReadRamCommand, ReadSectorCommand, SECTOR_SIZE,
    },
    inquiry::{INQUIRY_LEN, InquiryCommand, InquiryData},
    read_capacity::{READ_CAPACITY_LEN, ReadCapacity10Command, ReadCapacity10Data},
    read10::Read10Command,
    write10::Write10Command,
};
use crate::transport::BulkTransport;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Bot(#[from] BotError),
    #[error("device reported failure status {0:#04x}")]
    DeviceStatus(u8),
    #[error("malformed {0} response")]
    Malformed(&'static str),
    #[error("not a compatible device")]
    NotActionsDevice,
    #[error("unable to init firmware mode (response {0:#04x})")]
    InitFailed(u8),
}

fn check_status(status: u8) -> Result<(), CommandError> {
    match status {
        0 => Ok(()),
        status => Err(CommandError::DeviceStatus(status)),
    }
}

impl<T: BulkTransport> BulkOnly<T> {
    pub fn inquiry(&mut self, lun: u8) -> Result<InquiryData, CommandError> {
        let mut buf = [0u8; INQUIRY_LEN];
        let cmd = InquiryCommand::new(lun, INQUIRY_LEN as u8);
        check_status(self.execute(&cmd, DataPhase::In(&mut buf))?)?;
        InquiryData::parse(&buf).ok_or(CommandError::Malformed("INQUIRY"))
    }

    pub fn read_capacity(&mut self, lun: u8) -> Result<ReadCapacity10Data, CommandError> {
        let mut buf = [0u8; READ_CAPACITY_LEN];
        let cmd = ReadCapacity10Command::new(lun);
        check_status(self.execute(&cmd, DataPhase::In(&mut buf))?)?;
        ReadCapacity10Data::parse(&buf).ok_or(CommandError::Malformed("READ CAPACITY"))
    }

    /// READ(10) of a single sector.
    pub fn read_sector(
        &mut self,
        lun: u8,
        lba: u32,
        buf: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), CommandError> {
        let cmd = Read10Command::new(lun, lba);
        check_status(self.execute(&cmd, DataPhase::In(buf))?)
    }

    /// WRITE(10) of a single sector.
    pub fn write_sector(
        &mut self,
        lun: u8,
        lba: u32,
        buf: &[u8; SECTOR_SIZE],
    ) -> Result<(), CommandError> {
        let cmd = Write10Command::new(lun, lba);
        check_status(self.execute(&cmd, DataPhase::Out(buf))?)
    }

    /// Checks that the device answers IDENTIFY with the Actions ID.
    ///
    /// Must succeed before any other vendor command is sent.
    pub fn identify(&mut self) -> Result<IdentifyData, CommandError> {
        let mut buf = [0u8; IDENTIFY_LEN];
        let status = self.execute(&IdentifyCommand, DataPhase::In(&mut buf))?;
        if status != 0 {
            debug!("IDENTIFY failed with status {status:#04x}");
            return Err(CommandError::NotActionsDevice);
        }

        let id = IdentifyData::parse(&buf).ok_or(CommandError::Malformed("IDENTIFY"))?;
        if !id.is_actions() {
            debug!("Actions identifier does not match: {:?}", id.id_string());
            return Err(CommandError::NotActionsDevice);
        }

        debug!(
            "Gathered ID: {} {:#04x} {:#04x}",
            id.id_string(),
            id.adfu,
            id.unknown
        );
        Ok(id)
    }

    /// Switches the device into firmware service mode.
    pub fn init_firmware_mode(&mut self) -> Result<(), CommandError> {
        let mut resp = [0u8; 1];
        check_status(self.execute(&InitCommand, DataPhase::In(&mut resp))?)?;
        if resp[0] != INIT_READY {
            return Err(CommandError::InitFailed(resp[0]));
        }
        Ok(())
    }

    /// Vendor read of one NAND sector.
    pub fn read_nand_sector(
        &mut self,
        lun: u8,
        lba: u32,
        area: NandArea,
        buf: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), CommandError> {
        let cmd = ReadSectorCommand::new(lun, lba, area);
        check_status(self.execute(&cmd, DataPhase::In(buf))?)
    }

    /// Vendor read of `buf.len()` bytes of RAM starting at `sector`.
    pub fn read_ram(&mut self, sector: u32, buf: &mut [u8]) -> Result<(), CommandError> {
        let cmd = ReadRamCommand::new(sector, buf.len() as u32);
        check_status(self.execute(&cmd, DataPhase::In(buf))?)
    }

    pub fn detach(&mut self) -> Result<(), CommandError> {
        check_status(self.execute(&DetachCommand, DataPhase::None)?)
    }

    pub fn entry(&mut self, param: u16) -> Result<(), CommandError> {
        check_status(self.execute(&EntryCommand::new(param), DataPhase::None)?)
    }

    /// DETACH that only logs failure, for the end of a vendor session.
    pub fn detach_quietly(&mut self) -> bool {
        match self.detach() {
            Ok(()) => true,
            Err(err) => {
                warn!("Detaching device failed: {err}");
                false
            }
        }
    }
}
