use std::error::Error;

use usbh_actions::bot::BulkOnly;
use usbh_actions::storage::UsbMassStorage;

fn main() -> Result<(), Box<dyn Error>> {
    // Every attached bulk-only mass storage device.
    let devices = UsbMassStorage::list()?;
    if devices.is_empty() {
        eprintln!("No USB mass storage devices found.");
        return Ok(());
    }

    for closed in devices {
        let (vid, pid) = (closed.vendor_id, closed.product_id);
        let mut usb = closed.open()?;
        usb.claim()?;

        let mut bot = BulkOnly::new(usb);
        let inquiry = bot.inquiry(0)?;
        println!(
            "{vid:04x}:{pid:04x} '{}' '{}' '{}'",
            inquiry.vendor(),
            inquiry.product(),
            inquiry.revision()
        );

        match bot.identify() {
            Ok(id) => println!("    {} (adfu {})", id.id_string(), id.adfu),
            Err(err) => println!("    {err}"),
        }
        bot.into_inner().close();
    }

    Ok(())
}
