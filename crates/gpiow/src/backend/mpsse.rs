//! I2C through an FTDI MPSSE adapter.
//!
//! Connection strings: `libmpsse[:[//vid[:pid]][/][clock_hz]]`. VID and PID
//! are hexadecimal, the clock speed decimal (400 kHz by default). The chip
//! driver itself is supplied by the caller through [`MpsseOpener`]; this
//! module only parses, opens and frames transactions through [`WireBus`].

use tracing::{error, info};

use crate::bus::I2cBus;
use crate::error::{BusError, Result};
use crate::factory::BusFactory;
use crate::framing::{Wire, WireBus};
use crate::uri::{parse_integer, MatchFlags, UriCursor};

pub const NAME: &str = "libmpsse";
pub const ONE_HUNDRED_KHZ: u32 = 100_000;
pub const FOUR_HUNDRED_KHZ: u32 = 400_000;
pub const ONE_MHZ: u32 = 1_000_000;

/// Adapter selection and line settings. Bytes always go out MSB first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpsseConfig {
    /// `None` lets the driver pick the first known adapter.
    pub vid: Option<u16>,
    pub pid: Option<u16>,
    pub clock_hz: u32,
}

impl Default for MpsseConfig {
    fn default() -> Self {
        Self {
            vid: None,
            pid: None,
            clock_hz: FOUR_HUNDRED_KHZ,
        }
    }
}

impl MpsseConfig {
    /// Parse `uri`. `Ok(None)` when the scheme is not `libmpsse`.
    pub fn parse(uri: &str) -> Result<Option<Self>> {
        let mut cursor = UriCursor::new(uri);
        if !cursor.scheme(NAME) {
            return Ok(None);
        }

        let mut config = Self::default();
        let mut vid = heapless::String::<4>::new();
        let mut pid = heapless::String::<4>::new();
        if cursor.exact("//") {
            cursor.capture(&mut vid, ":/", MatchFlags::UNMATCH_CHARS);
            if cursor.exact(":") {
                cursor.capture(&mut pid, "/", MatchFlags::UNMATCH_CHARS);
            }
        }
        config.vid = hex_id(&vid)?;
        config.pid = hex_id(&pid)?;

        cursor.exact("/");
        if let Some(hz) = cursor.integer(10, "")? {
            config.clock_hz = u32::try_from(hz)
                .ok()
                .filter(|&hz| hz > 0)
                .ok_or(BusError::InvalidUri)?;
        }
        if !cursor.is_empty() {
            return Err(BusError::InvalidUri);
        }
        Ok(Some(config))
    }
}

fn hex_id(field: &str) -> Result<Option<u16>> {
    if field.is_empty() {
        return Ok(None);
    }
    let id = parse_integer(field, 16)?;
    u16::try_from(id).map(Some).map_err(|_| BusError::InvalidUri)
}

/// Opens MPSSE adapters in I2C mode.
pub trait MpsseOpener {
    type Chip: Wire + 'static;

    /// `None` when no matching adapter could be opened.
    fn open(&self, config: &MpsseConfig) -> Option<Self::Chip>;
}

/// Backend factory for MPSSE adapters.
pub struct MpsseBackend<O> {
    opener: O,
}

impl<O: MpsseOpener> MpsseBackend<O> {
    pub fn new(opener: O) -> Self {
        Self { opener }
    }

    fn open(&self, config: &MpsseConfig) -> Option<O::Chip> {
        let chip = self.opener.open(config)?;
        // A chip that did not come up is dropped here, closing it.
        chip.is_open().then_some(chip)
    }
}

impl<O: MpsseOpener> BusFactory for MpsseBackend<O> {
    fn name(&self) -> &str {
        NAME
    }

    fn create(&self, uri: Option<&str>) -> Result<Option<Box<dyn I2cBus>>> {
        let Some(uri) = uri else {
            let chip = self.open(&MpsseConfig::default());
            return Ok(chip.map(|chip| Box::new(WireBus::new(chip)) as Box<dyn I2cBus>));
        };

        let config = match MpsseConfig::parse(uri) {
            Ok(Some(config)) => config,
            Ok(None) => return Ok(None),
            Err(err) => {
                error!(uri, "malformed connection string");
                return Err(err);
            }
        };

        info!(
            vid = ?config.vid,
            pid = ?config.pid,
            clock_hz = config.clock_hz,
            "opening MPSSE adapter"
        );
        let Some(chip) = self.open(&config) else {
            error!(uri, "MPSSE adapter could not be opened");
            return Err(BusError::BackendFailure);
        };
        Ok(Some(Box::new(WireBus::new(chip))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_and_clock() {
        assert_eq!(MpsseConfig::parse("libmpsse"), Ok(Some(MpsseConfig::default())));
        assert_eq!(MpsseConfig::parse("libmpsse:"), Ok(Some(MpsseConfig::default())));
        assert_eq!(
            MpsseConfig::parse("libmpsse://0403:6014/"),
            Ok(Some(MpsseConfig {
                vid: Some(0x0403),
                pid: Some(0x6014),
                ..Default::default()
            }))
        );
        assert_eq!(
            MpsseConfig::parse("libmpsse://0403/100000"),
            Ok(Some(MpsseConfig {
                vid: Some(0x0403),
                clock_hz: ONE_HUNDRED_KHZ,
                ..Default::default()
            }))
        );
        assert_eq!(
            MpsseConfig::parse("libmpsse:1000000"),
            Ok(Some(MpsseConfig { clock_hz: ONE_MHZ, ..Default::default() }))
        );
    }

    #[test]
    fn rejects_malformed() {
        assert_eq!(MpsseConfig::parse("pigpiod:1"), Ok(None));
        assert_eq!(MpsseConfig::parse("libmpsse://04g3"), Err(BusError::InvalidUri));
        assert_eq!(MpsseConfig::parse("libmpsse:fast"), Err(BusError::InvalidUri));
        assert_eq!(MpsseConfig::parse("libmpsse:0"), Err(BusError::InvalidUri));
    }

    #[test]
    fn long_ids_are_truncated_to_four_digits() {
        assert_eq!(
            MpsseConfig::parse("libmpsse://040312:6014"),
            Ok(Some(MpsseConfig {
                vid: Some(0x0403),
                pid: Some(0x6014),
                ..Default::default()
            }))
        );
    }
}
