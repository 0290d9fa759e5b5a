use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use actfw_core::ProgressReporter;
use anyhow::{Context, Result, bail};
use usbh_actions::SECTOR_SIZE;

use crate::progress_bar::ProgressBarReporter;

pub mod enumerate;
pub mod firmware;
pub mod ram;
pub mod scsi;

/// The sectors `first..first + count`. Ranges that run past the last
/// addressable sector are refused, not shortened.
pub(crate) fn sector_range(first: u32, count: u32) -> Result<impl Iterator<Item = u32>> {
    if count > 0 && first.checked_add(count - 1).is_none() {
        bail!("{count} sectors from {first:#010x} run past sector {:#010x}", u32::MAX);
    }
    Ok((0..count).map(move |i| first + i))
}

/// Writes `count` sectors produced by `read_sector` to `path`.
///
/// Stops at the first failing sector; what was read up to then stays in the file.
pub(crate) fn dump_sectors(
    path: &Path,
    first: u32,
    count: u32,
    mut read_sector: impl FnMut(u32, &mut [u8; SECTOR_SIZE]) -> Result<()>,
) -> Result<()> {
    let range = sector_range(first, count)?;
    let file = File::create(path).with_context(|| format!("Cannot create {path:?}"))?;
    let mut output = BufWriter::new(file);
    let mut reporter = ProgressBarReporter::bytes();
    let mut sector = [0u8; SECTOR_SIZE];

    reporter.start(count as usize * SECTOR_SIZE);
    for lba in range {
        read_sector(lba, &mut sector).with_context(|| format!("Reading sector {lba:#010x}"))?;
        output.write_all(&sector)?;
        reporter.advance(SECTOR_SIZE);
    }
    output.flush()?;
    reporter.finish();

    log::info!("Wrote {count} sectors to {path:?}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("actfw-{}-{name}", std::process::id()))
    }

    #[test]
    fn failing_sector_keeps_what_was_read() {
        let path = temp_path("partial.bin");
        let mut calls = Vec::new();

        let result = dump_sectors(&path, 100, 5, |lba, sector| {
            calls.push(lba);
            if lba == 103 {
                bail!("device stalled");
            }
            sector.fill(lba as u8);
            Ok(())
        });

        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("0x00000067"), "{err:#}");
        assert_eq!(calls, [100, 101, 102, 103]);

        let written = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written.len(), 3 * SECTOR_SIZE);
        assert_eq!(written[0], 100);
        assert_eq!(written[2 * SECTOR_SIZE], 102);
    }

    #[test]
    fn range_past_last_sector_is_refused() {
        assert!(sector_range(u32::MAX - 1, 3).is_err());
        assert_eq!(
            sector_range(u32::MAX - 1, 2).unwrap().collect::<Vec<_>>(),
            [u32::MAX - 1, u32::MAX]
        );
        assert_eq!(sector_range(u32::MAX, 0).unwrap().count(), 0);

        let path = temp_path("refused.bin");
        let result = dump_sectors(&path, u32::MAX, 2, |_, _| Ok(()));
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
