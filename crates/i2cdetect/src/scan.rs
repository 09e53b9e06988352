use std::io::{self, Write};
use std::ops::RangeInclusive;

use gpiow::BusHandle;

/// Addresses that are probed; the rest are reserved.
pub const PROBE: RangeInclusive<u8> = 0x08..=0x77;

/// Probe every address with a zero-length write and print the classic
/// 16-column table. Returns the addresses that acknowledged.
pub fn scan(bus: &mut BusHandle, out: &mut impl Write) -> io::Result<Vec<u8>> {
    let mut found = Vec::new();

    let mut header = String::from("   ");
    for col in 0..16u8 {
        header.push_str(&format!("  {col:x}"));
    }
    writeln!(out, "{header}")?;

    for row in (0..0x80u8).step_by(16) {
        let mut line = format!("{row:02x}:");
        for address in row..row + 16 {
            let cell = match probe(bus, address) {
                Some(true) => {
                    found.push(address);
                    format!(" {address:02x}")
                }
                Some(false) => " --".to_owned(),
                None => "   ".to_owned(),
            };
            line.push_str(&cell);
        }
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(found)
}

/// `None` when the address is out of range or can't be opened.
fn probe(bus: &mut BusHandle, address: u8) -> Option<bool> {
    if !PROBE.contains(&address) {
        return None;
    }
    let handle = bus.open(address, 0).ok()?;
    let acked = bus.write(handle, &[]).is_ok();
    bus.close(handle);
    Some(acked)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(uri: &str) -> (Vec<u8>, Vec<String>) {
        let registry = gpiow::initialize();
        let mut bus = registry.create_bus(Some(uri)).unwrap();
        let mut out = Vec::new();
        let found = scan(&mut bus, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        (found, text.lines().map(str::to_owned).collect())
    }

    #[test]
    fn finds_simulated_devices() {
        let (found, lines) = table("sim:48,50");
        assert_eq!(found, [0x48, 0x50]);
        assert_eq!(lines.len(), 9);
        assert_eq!(
            lines[0],
            "     0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f"
        );
        assert_eq!(
            lines[5],
            "40: -- -- -- -- -- -- -- -- 48 -- -- -- -- -- -- --"
        );
        assert!(lines[6].starts_with("50: 50 --"));
    }

    #[test]
    fn reserved_addresses_stay_blank() {
        let (found, lines) = table("sim");
        assert!(found.is_empty());
        assert_eq!(lines[1], format!("00:{}{}", "   ".repeat(8), " --".repeat(8)));
        assert_eq!(lines[8], format!("70:{}", " --".repeat(8)));
    }
}
