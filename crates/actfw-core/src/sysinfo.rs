//! System information block kept in device RAM by the boot code.

use log::debug;
use static_assertions::const_assert_eq;
use usbh_actions::{BulkOnly, BulkTransport};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::firmware::FirmwareError;

pub const SYSINFO_SIZE: usize = 192;
/// RAM sector the block is read from.
pub const SYSINFO_SECTOR: u32 = 4;
/// `"SYS INFO"` magic directly followed by the hardware scan frame type.
pub const SYSINFO_MAGIC: &[u8; 10] = b"SYS INFOHW";

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ScanFrame {
    /// `"HW"` or `"FW"`.
    pub frame_type: [u8; 2],
    pub data: [u8; 90],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SysInfo {
    pub magic: [u8; 8],
    pub hardware: ScanFrame,
    pub firmware: ScanFrame,
}

const_assert_eq!(core::mem::size_of::<ScanFrame>(), 92);
const_assert_eq!(core::mem::size_of::<SysInfo>(), SYSINFO_SIZE);

impl SysInfo {
    pub fn parse(bytes: &[u8]) -> Result<Self, FirmwareError> {
        if !bytes.starts_with(SYSINFO_MAGIC) {
            return Err(FirmwareError::BadSysInfoMagic);
        }
        Self::read_from_prefix(bytes)
            .map(|(info, _)| info)
            .map_err(|_| FirmwareError::BadSysInfoMagic)
    }

    pub fn frame_type_str(frame: &ScanFrame) -> String {
        String::from_utf8_lossy(&frame.frame_type).into_owned()
    }
}

/// Reads the sysinfo block from RAM.
pub fn read_sysinfo<T: BulkTransport>(bot: &mut BulkOnly<T>) -> Result<SysInfo, FirmwareError> {
    let mut info = SysInfo::new_zeroed();
    bot.read_ram(SYSINFO_SECTOR, info.as_mut_bytes())?;

    if !info.as_bytes().starts_with(SYSINFO_MAGIC) {
        return Err(FirmwareError::BadSysInfoMagic);
    }
    Ok(info)
}

/// Whether the device allows reading arbitrary RAM.
///
/// Devices without it answer every RAM read with the sysinfo block, so
/// finding the sysinfo magic at sector 0 means access is limited.
pub fn test_ram_access<T: BulkTransport>(bot: &mut BulkOnly<T>) -> Result<bool, FirmwareError> {
    let mut buf = [0u8; SYSINFO_SIZE];
    bot.read_ram(0, &mut buf)?;

    let supported = !buf.starts_with(SYSINFO_MAGIC);
    debug!("General RAM access supported: {supported}");
    Ok(supported)
}
