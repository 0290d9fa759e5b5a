use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceId {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor_id, self.product_id)
    }
}

// allow user to pass hex formatted numbers (typically the format used for sectors)
pub fn num_parser(s: &str) -> Result<u32, &'static str> {
    match s.get(0..2) {
        Some("0x") | Some("0X") => {
            u32::from_str_radix(&s[2..], 16).map_err(|_| "invalid hex number")
        }
        _ => s.parse::<u32>().map_err(|_| "invalid decimal number"),
    }
}

/// Parses `VVVV:PPPP`, both halves in hex.
pub fn device_id_parser(s: &str) -> Result<DeviceId, &'static str> {
    let (vid, pid) = s.split_once(':').ok_or("expected VVVV:PPPP")?;
    if vid.is_empty() || vid.len() > 4 || pid.is_empty() || pid.len() > 4 {
        return Err("expected VVVV:PPPP");
    }

    let vendor_id = u16::from_str_radix(vid, 16).map_err(|_| "invalid vendor id")?;
    let product_id = u16::from_str_radix(pid, 16).map_err(|_| "invalid product id")?;
    if vendor_id == 0 && product_id == 0 {
        return Err("0000:0000 is not a valid device");
    }

    Ok(DeviceId {
        vendor_id,
        product_id,
    })
}

/// `1.5 MiB` style size.
pub fn humanize_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
