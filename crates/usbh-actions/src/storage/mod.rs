use std::time::Duration;

use log::{debug, warn};
use rusb::{ConfigDescriptor, Device, DeviceHandle, Direction, GlobalContext, TransferType};
use thiserror::Error;

use crate::transport::BulkTransport;

pub const MASS_STORAGE_CLASS: u8 = 0x08;
/// SFF-8070i (ATAPI) and SCSI transparent command set.
pub const SUPPORTED_SUBCLASSES: [u8; 2] = [0x05, 0x06];
/// Bulk-Only (BBB) Transport.
pub const BULK_ONLY_PROTOCOL: u8 = 0x50;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Error, Debug)]
pub enum UsbMassStorageError {
    #[error("failed to get usb devices from rusb")]
    FailedToGetUsbDevices(#[source] rusb::Error),
    #[error("failed to open usb device")]
    FailedToOpenUsbDevice(#[source] rusb::Error),
    #[error("device {vendor_id:04x}:{product_id:04x} not found")]
    NotFound { vendor_id: u16, product_id: u16 },
    #[error("device id 0000:0000 is not valid")]
    NullDeviceId,
    #[error("interface {0} is busy")]
    Busy(u8),
    #[error("failed to claim interface {interface}")]
    ClaimFailed {
        interface: u8,
        #[source]
        source: rusb::Error,
    },
}

/// Endpoints of a bulk-only mass storage interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOnlyTransport {
    pub in_address: u8,
    pub in_max_size: u16,
    pub out_address: u8,
    pub out_max_size: u16,
    pub interface_number: u8,
    pub sub_class: u8,
}

#[derive(Debug, Clone)]
pub struct UsbMassStorage<S = Closed> {
    pub device: Device<GlobalContext>,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bulk_only_transport: BulkOnlyTransport,
    pub extra: S,
}

#[derive(Debug, Clone)]
pub struct Closed;

#[derive(Debug)]
pub struct Opened {
    pub handle: DeviceHandle<GlobalContext>,
    pub interface_number: u8,
    pub claimed: bool,
    pub timeout_duration: Duration,
}

/// Looks for a bulk-only mass storage interface with a bulk IN/OUT pair.
fn find_bulk_only_interface(config: &ConfigDescriptor) -> Option<BulkOnlyTransport> {
    for interface in config.interfaces() {
        for interface_descriptor in interface.descriptors() {
            if interface_descriptor.class_code() != MASS_STORAGE_CLASS
                || !SUPPORTED_SUBCLASSES.contains(&interface_descriptor.sub_class_code())
                || interface_descriptor.protocol_code() != BULK_ONLY_PROTOCOL
            {
                continue;
            }

            let mut transfer_out_info = None;
            let mut transfer_in_info = None;

            for endpoint in interface_descriptor.endpoint_descriptors() {
                if endpoint.transfer_type() != TransferType::Bulk {
                    continue;
                }

                let info = Some((endpoint.address(), endpoint.max_packet_size()));
                match endpoint.direction() {
                    Direction::In => transfer_in_info = info,
                    Direction::Out => transfer_out_info = info,
                }
            }

            if let Some(in_info) = transfer_in_info
                && let Some(out_info) = transfer_out_info
            {
                return Some(BulkOnlyTransport {
                    in_address: in_info.0,
                    in_max_size: in_info.1,
                    out_address: out_info.0,
                    out_max_size: out_info.1,
                    interface_number: interface_descriptor.interface_number(),
                    sub_class: interface_descriptor.sub_class_code(),
                });
            }
        }
    }

    None
}

impl UsbMassStorage<Closed> {
    /// Inspects the active configuration (or the first one when the device is
    /// unconfigured) of a single device.
    pub fn probe(device: Device<GlobalContext>) -> Option<Self> {
        let desc = device.device_descriptor().ok()?;
        let config = device
            .active_config_descriptor()
            .or_else(|_| device.config_descriptor(0))
            .ok()?;
        let bulk_only_transport = find_bulk_only_interface(&config)?;

        Some(UsbMassStorage {
            device,
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
            bulk_only_transport,
            extra: Closed,
        })
    }

    /// Every attached device with a bulk-only mass storage interface.
    pub fn list() -> Result<Vec<Self>, UsbMassStorageError> {
        let rusb_devices = rusb::devices().map_err(UsbMassStorageError::FailedToGetUsbDevices)?;
        Ok(rusb_devices.iter().filter_map(Self::probe).collect())
    }

    /// The first mass storage device matching `vendor_id:product_id`.
    pub fn find(vendor_id: u16, product_id: u16) -> Result<Self, UsbMassStorageError> {
        if vendor_id == 0 && product_id == 0 {
            return Err(UsbMassStorageError::NullDeviceId);
        }

        Self::list()?
            .into_iter()
            .find(|dev| dev.vendor_id == vendor_id && dev.product_id == product_id)
            .ok_or(UsbMassStorageError::NotFound {
                vendor_id,
                product_id,
            })
    }

    pub fn open(self) -> Result<UsbMassStorage<Opened>, UsbMassStorageError> {
        let handle = self
            .device
            .open()
            .map_err(UsbMassStorageError::FailedToOpenUsbDevice)?;

        if let Err(err) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {err}");
        }

        debug!(
            "Opened {:04x}:{:04x} on bus {} address {}",
            self.vendor_id,
            self.product_id,
            self.device.bus_number(),
            self.device.address()
        );

        let interface_number = self.bulk_only_transport.interface_number;
        Ok(UsbMassStorage::<Opened> {
            device: self.device,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            bulk_only_transport: self.bulk_only_transport,
            extra: Opened {
                handle,
                interface_number,
                claimed: false,
                timeout_duration: DEFAULT_TIMEOUT,
            },
        })
    }
}

impl UsbMassStorage<Opened> {
    /// Claims the mass storage interface. Claiming twice is an error.
    pub fn claim(&mut self) -> Result<(), UsbMassStorageError> {
        let interface = self.extra.interface_number;
        if self.extra.claimed {
            return Err(UsbMassStorageError::Busy(interface));
        }

        match self.extra.handle.claim_interface(interface) {
            Ok(()) => {
                self.extra.claimed = true;
                Ok(())
            }
            Err(rusb::Error::Busy) => Err(UsbMassStorageError::Busy(interface)),
            Err(source) => Err(UsbMassStorageError::ClaimFailed { interface, source }),
        }
    }

    /// Releases the interface if it is claimed. Safe to call any number of times.
    pub fn release(&mut self) {
        self.extra.release();
    }

    /// Release the interface and close the handle.
    pub fn close(self) -> UsbMassStorage<Closed> {
        UsbMassStorage::<Closed> {
            device: self.device,
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            bulk_only_transport: self.bulk_only_transport,
            extra: Closed,
        }
    }
}

impl Opened {
    fn release(&mut self) {
        if !self.claimed {
            return;
        }
        self.claimed = false;
        if let Err(err) = self.handle.release_interface(self.interface_number) {
            warn!(
                "Failed to release interface {}: {err}",
                self.interface_number
            );
        }
    }
}

impl Drop for Opened {
    fn drop(&mut self) {
        self.release();
    }
}

impl BulkTransport for UsbMassStorage<Opened> {
    fn write_bulk(&mut self, data: &[u8]) -> rusb::Result<usize> {
        self.extra.handle.write_bulk(
            self.bulk_only_transport.out_address,
            data,
            self.extra.timeout_duration,
        )
    }

    fn read_bulk(&mut self, buf: &mut [u8]) -> rusb::Result<usize> {
        self.extra.handle.read_bulk(
            self.bulk_only_transport.in_address,
            buf,
            self.extra.timeout_duration,
        )
    }

    fn clear_in_halt(&mut self) -> rusb::Result<()> {
        self.extra
            .handle
            .clear_halt(self.bulk_only_transport.in_address)
    }
}
