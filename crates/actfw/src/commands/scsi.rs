use std::{fs::File, io::Read, path::Path};

use anyhow::{Context, Result, bail};
use usbh_actions::SECTOR_SIZE;

use crate::{
    Target,
    args::humanize_size,
    commands::{dump_sectors, sector_range},
    session,
};

pub fn inquiry(target: Target) -> Result<()> {
    let mut session = session::open(target)?;

    println!(
        "\nSending SCSI INQUIRY command to the device {} LUN:{}\n",
        target.device, target.lun
    );
    let inquiry = session
        .inquiry(target.lun)
        .context("Inquiry command failed")?;

    let pdt = inquiry.peripheral_device_type;
    println!("Received information:");
    println!("Peripheral Device Type : {} ({})", pdt.code(), pdt.description());
    println!(
        "          Is removable : {}",
        if inquiry.is_removable { "YES" } else { "NO" }
    );
    println!("           ISO version : {}", inquiry.iso_version);
    println!("          ECMA version : {}", inquiry.ecma_version);
    println!("          ANSI version : {}", inquiry.ansi_version);
    println!("  Response data format : {}", inquiry.response_data_format);
    println!("                Vendor : {}", inquiry.vendor());
    println!("               Product : {}", inquiry.product());
    println!("              Revision : {}", inquiry.revision());
    Ok(())
}

pub fn capacity(target: Target) -> Result<()> {
    let mut session = session::open(target)?;

    println!(
        "\nSending SCSI READ CAPACITY command to the device {} LUN:{}\n",
        target.device, target.lun
    );
    let capacity = session
        .read_capacity(target.lun)
        .context("Read capacity command failed")?;

    println!(
        "Reported capacity is {} blocks of size {} bytes ({}).",
        capacity.block_count(),
        capacity.block_length_bytes,
        humanize_size(capacity.total_capacity_bytes())
    );
    Ok(())
}

pub fn read(target: Target, lba: u32, count: u32, path: &Path) -> Result<()> {
    let mut session = session::open(target)?;

    log::info!("Dumping {count} sectors from {lba:#x} to {path:?}");
    dump_sectors(path, lba, count, |lba, sector| {
        session.read_sector(target.lun, lba, sector)?;
        Ok(())
    })
}

pub fn write(target: Target, lba: u32, path: &Path) -> Result<()> {
    let mut input = Vec::new();
    File::open(path)
        .with_context(|| format!("Cannot open {path:?}"))?
        .read_to_end(&mut input)?;
    if input.is_empty() {
        bail!("{path:?} is empty");
    }

    let sectors = u32::try_from(input.len().div_ceil(SECTOR_SIZE))
        .with_context(|| format!("{path:?} is too large"))?;
    let range = sector_range(lba, sectors)?;

    let mut session = session::open(target)?;
    log::info!("Writing {sectors} sectors from {path:?} at {lba:#x}");

    for (current, chunk) in range.zip(input.chunks(SECTOR_SIZE)) {
        let mut sector = [0u8; SECTOR_SIZE];
        sector[..chunk.len()].copy_from_slice(chunk);

        session
            .write_sector(target.lun, current, &sector)
            .with_context(|| format!("Writing sector {current:#010x}"))?;
    }

    log::info!("Wrote {sectors} sectors");
    Ok(())
}
