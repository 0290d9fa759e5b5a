use anyhow::{Context, Result};
use usbh_actions::{
    BulkOnly,
    storage::{Opened, UsbMassStorage},
};

use crate::{Target, VendorTarget};

pub type Session = BulkOnly<UsbMassStorage<Opened>>;

/// Opens and claims the target device.
pub fn open(target: Target) -> Result<Session> {
    let device = target.device;
    let mut usb = UsbMassStorage::find(device.vendor_id, device.product_id)
        .with_context(|| format!("Cannot open device {device}"))?
        .open()
        .with_context(|| format!("Cannot open device {device}"))?;
    usb.claim().context("Cannot claim USB interface")?;

    log::debug!(
        "Claimed interface {} (in {:#04x}, out {:#04x})",
        usb.bulk_only_transport.interface_number,
        usb.bulk_only_transport.in_address,
        usb.bulk_only_transport.out_address
    );
    Ok(BulkOnly::new(usb))
}

/// Runs `f` with the device in firmware mode.
///
/// With `--detach` the device is sent DETACH afterwards, also when `f` or
/// the mode switch failed.
pub fn with_firmware_mode<R>(
    vendor: VendorTarget,
    f: impl FnOnce(&mut Session, u8) -> Result<R>,
) -> Result<R> {
    let mut session = open(vendor.target)?;

    let result = enter_firmware_mode(&mut session).and_then(|()| f(&mut session, vendor.target.lun));

    if vendor.detach {
        if session.detach_quietly() {
            println!("Detaching device successful.");
        } else {
            println!("Detaching device failed.");
        }
    }

    result
}

fn enter_firmware_mode(session: &mut Session) -> Result<()> {
    let id = session
        .identify()
        .context("Cannot identify Actions device")?;
    log::debug!("Device answered IDENTIFY with adfu {:#04x}", id.adfu);

    session
        .init_firmware_mode()
        .context("Unable to init firmware mode")?;
    Ok(())
}
