use std::path::Path;

use actfw_core::{
    AfiEntry, AfiWriter, AlternateSearch, FirmwareHeader, compute_image_size,
    firmware::field_str, locate_alternate, read_entry, read_header, verify_checksums,
    verify_entry,
};
use anyhow::{Context, Result, bail};
use usbh_actions::NandArea;

use crate::{
    AlternateArgs, VendorTarget,
    commands::dump_sectors,
    progress_bar::ProgressBarReporter,
    session::{self, Session},
};

fn ok_or_error(ok: bool) -> &'static str {
    if ok { "OK" } else { "Error" }
}

/// Sector of the header to work with: 0, or the alternate copy.
fn header_sector(session: &mut Session, lun: u8, alternate: AlternateArgs) -> Result<u32> {
    if !alternate.alternate {
        return Ok(0);
    }

    println!("Searching for alternate header...");
    match locate_alternate(session, lun, alternate.max_lba, ProgressBarReporter::sectors())
        .context("Searching alternate header failed")?
    {
        AlternateSearch::Found(sector) => {
            println!("Alternate header found at sector {sector:#010x}\n");
            Ok(sector)
        }
        AlternateSearch::NotFound => bail!("Alternate header not found"),
    }
}

fn print_header(header: &FirmwareHeader) {
    let report = verify_checksums(header);

    println!("               Version : {}", header.version_string());
    println!("                  Date : {}", header.date_string());
    println!("             Vendor ID : {:#06x}", header.vendor_id.get());
    println!("            Product ID : {:#06x}", header.product_id.get());
    println!(
        "    Directory Checksum : {:#010x} ({})",
        header.directory_checksum.get(),
        ok_or_error(report.directory_ok)
    );
    println!("   Firmware Descriptor : {}", field_str(&header.firmware_descriptor));
    println!("              Producer : {}", field_str(&header.producer));
    println!("           Device Name : {}", field_str(&header.device_name));
    println!("         USB Attribute : {}", field_str(&header.usb_attributes));
    println!("    USB Identification : {}", field_str(&header.usb_identification));
    println!("   USB Product Version : {}", field_str(&header.usb_product_version));
    println!("              USB Name : {}", header.usb_string());
    println!(" MTP Manufacturer Info : {}", field_str(&header.mtp_manufacturer));
    println!("      MTP Product Info : {}", field_str(&header.mtp_product_info));
    println!("   MTP Product Version : {}", field_str(&header.mtp_product_version));
    println!("        MTP Product SN : {}", field_str(&header.mtp_serial_number));
    println!("         MTP Vendor ID : {:#06x}", header.mtp_vendor_id.get());
    println!("        MTP Product ID : {:#06x}", header.mtp_product_id.get());
    println!(
        "       Header Checksum : {:#06x} ({})",
        header.header_checksum.get(),
        ok_or_error(report.header_ok)
    );

    let common = &header.common;
    println!("\nCommon Values:\n");
    println!(" System Time (in 0.5s) : {:#010x}", common.system_time.get());
    println!("              RTC Rate : {}", common.rtc_rate.get());
    println!("              Contrast : {}", common.contrast);
    println!("            Light Time : {}", common.light_time);
    println!("          Standby Time : {}", common.standby_time);
    println!("            Sleep Time : {}", common.sleep_time);
    println!("           Language ID : {}", common.language_id);
    println!("           Replay Mode : {}", common.replay_mode);
    println!("           Online Mode : {}", common.online_mode);
    println!("          Battery Type : {}", common.battery_type);
    println!("           FM Built In : {}", common.fm_built_in);
}

pub fn header_info(vendor: VendorTarget, show_dir: bool, alternate: AlternateArgs) -> Result<()> {
    session::with_firmware_mode(vendor, |session, lun| {
        let start = header_sector(session, lun, alternate)?;

        println!(
            "\nReading ACTIONS firmware header from device {} LUN:{lun}\n",
            vendor.target.device
        );
        let header = read_header(session, lun, start)?;
        print_header(&header);

        if show_dir {
            println!("\nDirectory:\n");
            for (i, entry) in header.entries().enumerate() {
                println!("{i:>3} {entry}");
            }
            println!(
                "\nFirmware image spans {} sectors.",
                compute_image_size(&header)
            );
        }
        println!();
        Ok(())
    })
}

pub fn read_fw(vendor: VendorTarget, physical: bool, lba: u32, count: u32, path: &Path) -> Result<()> {
    let area = if physical {
        NandArea::Physical
    } else {
        NandArea::Logical
    };

    session::with_firmware_mode(vendor, |session, lun| {
        log::info!("Dumping {count} {area:?} sectors from {lba:#x} to {path:?}");
        dump_sectors(path, lba, count, |lba, sector| {
            session.read_nand_sector(lun, lba, area, sector)?;
            Ok(())
        })
    })
}

pub fn dump_fw(vendor: VendorTarget, alternate: AlternateArgs, path: &Path) -> Result<()> {
    session::with_firmware_mode(vendor, |session, lun| {
        let start = header_sector(session, lun, alternate)?;
        let header = read_header(session, lun, start)?;

        let sectors = compute_image_size(&header);
        if sectors == 0 {
            bail!("Firmware directory is empty");
        }

        log::info!("Dumping firmware image of {sectors} sectors to {path:?}");
        dump_sectors(path, start, sectors, |lba, sector| {
            session.read_nand_sector(lun, lba, NandArea::Logical, sector)?;
            Ok(())
        })
    })
}

pub fn dump_afi(vendor: VendorTarget, alternate: AlternateArgs, path: &Path) -> Result<()> {
    let device = vendor.target.device;

    session::with_firmware_mode(vendor, |session, lun| {
        let start = header_sector(session, lun, alternate)?;
        let header = read_header(session, lun, start)?;

        let mut afi = AfiWriter::create(path, device.vendor_id, device.product_id)
            .with_context(|| format!("Cannot create {path:?}"))?;

        for entry in header.entries() {
            let data = read_entry(session, lun, start, entry)
                .with_context(|| format!("Reading {}", entry.name()))?;

            let slot = afi.append_whole(AfiEntry::new(entry.filename, entry.attribute, 0), &data)?;
            println!(
                "{slot:>3} {:<12} {:>8} bytes  checksum {}",
                entry.name(),
                data.len(),
                ok_or_error(verify_entry(entry, &data))
            );
        }

        afi.into_inner()?;
        log::info!("Wrote AFI container to {path:?}");
        Ok(())
    })
}
