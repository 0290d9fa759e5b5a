use crate::commands::CommandBlock;

/// Size of the standard INQUIRY response we ask for.
pub const INQUIRY_LEN: usize = 36;

/// SCSI INQUIRY command (CDB).
///
/// Requests basic device identification (vendor, product, revision,
/// and type). Plain SCSI, so it works before the device has been
/// identified as an Actions player.
pub struct InquiryCommand {
    pub logical_unit_number: u8,
    /// Allocation length: how many bytes the host expects back
    /// in the standard INQUIRY response.
    pub alloc_len: u8,
}

impl InquiryCommand {
    /// Construct a new `INQUIRY` command with the given expected response size.
    pub fn new(logical_unit_number: u8, alloc_len: u8) -> Self {
        Self {
            logical_unit_number,
            alloc_len,
        }
    }
}

impl CommandBlock for InquiryCommand {
    fn to_bytes(&self) -> [u8; 16] {
        let mut cdb = [0u8; 16];
        cdb[0] = 0x12; // INQUIRY opcode
        cdb[1] = (self.logical_unit_number & 0x07) << 5; // EVPD = 0
        cdb[4] = self.alloc_len; // allocation length
        cdb
    }

    fn len(&self) -> u8 {
        6 // INQUIRY always 6-byte CDB
    }

    fn lun(&self) -> u8 {
        self.logical_unit_number
    }
}

/// SCSI Peripheral Device Type field (from byte 0 of INQUIRY data).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralDeviceType {
    /// Direct-access block device (e.g., disk).
    SbcDirectAccessDevice, // 0x00
    /// CD/DVD device.
    CdRomDevice, // 0x05
    /// Optical memory (e.g., MO disk).
    OpticalMemoryDevice, // 0x07
    /// RBC direct-access device.
    RbcDirectAccessDevice, // 0x0E
    /// Other or unrecognized value.
    OutOfScope(u8),
}

impl From<u8> for PeripheralDeviceType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => PeripheralDeviceType::SbcDirectAccessDevice,
            0x05 => PeripheralDeviceType::CdRomDevice,
            0x07 => PeripheralDeviceType::OpticalMemoryDevice,
            0x0E => PeripheralDeviceType::RbcDirectAccessDevice,
            other => PeripheralDeviceType::OutOfScope(other),
        }
    }
}

impl PeripheralDeviceType {
    pub fn code(&self) -> u8 {
        match self {
            PeripheralDeviceType::SbcDirectAccessDevice => 0x00,
            PeripheralDeviceType::CdRomDevice => 0x05,
            PeripheralDeviceType::OpticalMemoryDevice => 0x07,
            PeripheralDeviceType::RbcDirectAccessDevice => 0x0E,
            PeripheralDeviceType::OutOfScope(other) => *other,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PeripheralDeviceType::SbcDirectAccessDevice => "direct access block device",
            PeripheralDeviceType::CdRomDevice => "CD/DVD device",
            PeripheralDeviceType::OpticalMemoryDevice => "optical memory device",
            PeripheralDeviceType::RbcDirectAccessDevice => "simplified direct access device",
            PeripheralDeviceType::OutOfScope(_) => "unknown",
        }
    }
}

/// Parsed standard INQUIRY response data (first 36 bytes).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct InquiryData {
    pub peripheral_device_type: PeripheralDeviceType,
    /// Whether or not the usb device is removable or not
    pub is_removable: bool,
    /// Byte 2, bits 7-6.
    pub iso_version: u8,
    /// Byte 2, bits 5-3.
    pub ecma_version: u8,
    /// Byte 2, bits 2-0.
    pub ansi_version: u8,
    /// Byte 3, bits 3-0.
    pub response_data_format: u8,
    /// Indicates the number of bytes following byte 4 in the standard INQUIRY data.
    pub additional_length: u8,
    /// ASCII vendor ID (8 bytes, space padded).
    pub vendor_identification: [u8; 8],
    /// ASCII product ID (16 bytes, space padded).
    pub product_identification: [u8; 16],
    /// ASCII product revision (4 bytes, space padded).
    pub product_revision_level: [u8; 4],
}

impl std::fmt::Debug for InquiryData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InquiryData")
            .field("peripheral_device_type", &self.peripheral_device_type)
            .field("is_removable", &self.is_removable)
            .field("ansi_version", &self.ansi_version)
            .field("response_data_format", &self.response_data_format)
            .field("vendor", &self.vendor())
            .field("product", &self.product())
            .field("revision", &self.revision())
            .finish()
    }
}

impl InquiryData {
    /// Parse a standard 36-byte INQUIRY response.
    ///
    /// Returns `None` if the buffer is shorter than 36 bytes.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < INQUIRY_LEN {
            return None;
        }

        let mut vendor_identification = [0u8; 8];
        vendor_identification.copy_from_slice(&buf[8..16]);

        let mut product_identification = [0u8; 16];
        product_identification.copy_from_slice(&buf[16..32]);

        let mut product_revision_level = [0u8; 4];
        product_revision_level.copy_from_slice(&buf[32..36]);

        Some(Self {
            peripheral_device_type: PeripheralDeviceType::from(buf[0] & 0x1F),
            is_removable: buf[1] & 0x80 != 0,
            iso_version: buf[2] >> 6,
            ecma_version: (buf[2] >> 3) & 0x07,
            ansi_version: buf[2] & 0x07,
            response_data_format: buf[3] & 0x0F,
            additional_length: buf[4],
            vendor_identification,
            product_identification,
            product_revision_level,
        })
    }

    /// Vendor ID string (trimmed ASCII).
    pub fn vendor(&self) -> String {
        String::from_utf8_lossy(&self.vendor_identification)
            .trim()
            .to_string()
    }

    /// Product ID string (trimmed ASCII).
    pub fn product(&self) -> String {
        String::from_utf8_lossy(&self.product_identification)
            .trim()
            .to_string()
    }

    /// Revision string (trimmed ASCII).
    pub fn revision(&self) -> String {
        String::from_utf8_lossy(&self.product_revision_level)
            .trim()
            .to_string()
    }
}
