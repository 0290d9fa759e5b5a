use std::io::{self, Write};

use anyhow::Result;
use usbh_actions::{BulkOnly, storage::UsbMassStorage};

pub fn enumerate() -> Result<()> {
    let devices = UsbMassStorage::list()?;

    println!("\nChecking for Actions Semiconductor compatible devices...\n");

    let mut found = 0;
    for closed in devices {
        let (vid, pid) = (closed.vendor_id, closed.product_id);
        print!("Testing USB mass storage device {vid:04X}:{pid:04X} - ");
        io::stdout().flush()?;

        let mut usb = match closed.open() {
            Ok(usb) => usb,
            Err(err) => {
                println!("FAIL ({err})");
                continue;
            }
        };
        if let Err(err) = usb.claim() {
            println!("FAIL ({err})");
            continue;
        }

        let mut bot = BulkOnly::new(usb);
        match bot.identify() {
            Ok(_) => {
                println!("FOUND");
                found += 1;
            }
            Err(err) => {
                log::debug!("{vid:04X}:{pid:04X}: {err}");
                println!("FAIL");
            }
        }
        bot.into_inner().close();
    }

    if found > 0 {
        println!("\nFound {found} compatible device(s).");
    } else {
        println!("\nNo compatible devices found.");
    }
    Ok(())
}
