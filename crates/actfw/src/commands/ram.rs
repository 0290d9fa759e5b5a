use std::path::Path;

use actfw_core::{SysInfo, read_sysinfo, sysinfo::ScanFrame, test_ram_access};
use anyhow::{Context, Result, bail};

use crate::{VendorTarget, commands::dump_sectors, session};

pub fn read_ram(vendor: VendorTarget, sector: u32, count: u32, path: &Path) -> Result<()> {
    session::with_firmware_mode(vendor, |session, _lun| {
        if !test_ram_access(session).context("Reading RAM at sector 0 failed")? {
            bail!("Device does not allow general RAM access");
        }

        log::info!("Dumping {count} RAM sectors from {sector:#x} to {path:?}");
        dump_sectors(path, sector, count, |sector, buf| {
            session.read_ram(sector, buf)?;
            Ok(())
        })
    })
}

fn print_frame(name: &str, frame: &ScanFrame) {
    println!("{name} ({})", SysInfo::frame_type_str(frame));
    for (i, row) in frame.data.chunks(16).enumerate() {
        let hex: Vec<String> = row.iter().map(|b| format!("{b:02x}")).collect();
        println!("    {:04x}: {}", i * 16, hex.join(" "));
    }
}

pub fn sysinfo(vendor: VendorTarget) -> Result<()> {
    session::with_firmware_mode(vendor, |session, _lun| {
        let info = read_sysinfo(session).context("Reading sysinfo failed")?;

        println!("\n{}\n", String::from_utf8_lossy(&info.magic));
        print_frame("Hardware scan", &info.hardware);
        print_frame("Firmware scan", &info.firmware);

        let ram_access = test_ram_access(session)?;
        println!(
            "\nGeneral RAM access: {}",
            if ram_access { "supported" } else { "not supported" }
        );
        Ok(())
    })
}

pub fn entry(vendor: VendorTarget, address: u32) -> Result<()> {
    let Ok(param) = u16::try_from(address) else {
        bail!("Entry parameter {address:#x} does not fit 16 bits");
    };

    session::with_firmware_mode(vendor, |session, _lun| {
        session
            .entry(param)
            .with_context(|| format!("ENTRY {param:#06x} failed"))?;
        println!("ENTRY {param:#06x} OK");
        Ok(())
    })
}
