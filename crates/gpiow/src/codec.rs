//! Device addresses, transfer direction and device handles.

use derive_more::Display;

use crate::error::{BusError, Result};

/// Highest 7-bit address.
pub const MAX_ADDRESS: u8 = 0x7f;
/// First address usable for data transfer; 0x00-0x07 are reserved.
pub const FIRST_DATA_ADDRESS: u8 = 0x08;
/// Last address usable for data transfer; 0x78-0x7f are reserved.
pub const LAST_DATA_ADDRESS: u8 = 0x77;

/// Represents data direction used for the R/W bit in the I2C header.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Write = 0,
    Read = 1,
}

/// A 7-bit device address.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[display("{_0:#04x}")]
pub struct Address(u8);

impl Address {
    /// Any 7-bit address, reserved ones included.
    pub const fn new(raw: u8) -> Option<Self> {
        if raw <= MAX_ADDRESS {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// An address a device can be opened at.
    ///
    /// Anything above 0x7f or inside the reserved ranges is
    /// [`BusError::InvalidArgument`].
    pub fn for_transfer(raw: u8) -> Result<Self> {
        match Self::new(raw) {
            Some(addr) if !addr.is_reserved() => Ok(addr),
            _ => Err(BusError::InvalidArgument),
        }
    }

    pub const fn get(self) -> u8 {
        self.0
    }

    pub const fn is_reserved(self) -> bool {
        self.0 < FIRST_DATA_ADDRESS || self.0 > LAST_DATA_ADDRESS
    }

    /// The address byte sent on the wire: `(address << 1) | direction`.
    pub const fn header(self, direction: Direction) -> u8 {
        (self.0 << 1) | direction as u8
    }

    pub const fn from_header(byte: u8) -> (Self, Direction) {
        let direction = if byte & 0x01 == 0 {
            Direction::Write
        } else {
            Direction::Read
        };
        (Self(byte >> 1), direction)
    }
}

/// Opaque token returned by `open`.
///
/// Backends choose the representation. Wire-level backends pack the address
/// with [`DeviceHandle::packed`]; daemon backends pass the daemon's own
/// handle through with [`DeviceHandle::from_raw`].
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceHandle(u32);

impl DeviceHandle {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// `address << 1`, leaving the low bit free for the direction.
    pub const fn packed(address: Address) -> Self {
        Self(address.header(Direction::Write) as u32)
    }

    /// Recover the address from a [`packed`](Self::packed) handle.
    ///
    /// The low bit must be clear and the address must be usable for data
    /// transfer, otherwise the handle is [`BusError::InvalidHandle`].
    pub fn address(self) -> Result<Address> {
        if self.0 & 0x01 != 0 || self.0 > u32::from(MAX_ADDRESS) << 1 {
            return Err(BusError::InvalidHandle);
        }
        let (addr, _) = Address::from_header(self.0 as u8);
        if addr.is_reserved() {
            return Err(BusError::InvalidHandle);
        }
        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        for raw in 0..=MAX_ADDRESS {
            let addr = Address::new(raw).unwrap();
            for dir in [Direction::Write, Direction::Read] {
                assert_eq!(Address::from_header(addr.header(dir)), (addr, dir));
            }
        }
    }

    #[test]
    fn transfer_range() {
        assert_eq!(Address::for_transfer(0x07), Err(BusError::InvalidArgument));
        assert_eq!(Address::for_transfer(0x78), Err(BusError::InvalidArgument));
        assert_eq!(Address::for_transfer(0x80), Err(BusError::InvalidArgument));
        assert_eq!(Address::for_transfer(0xff), Err(BusError::InvalidArgument));
        assert_eq!(Address::for_transfer(0x08).unwrap().get(), 0x08);
        assert_eq!(Address::for_transfer(0x77).unwrap().get(), 0x77);
        assert!(Address::new(0x80).is_none());
    }

    #[test]
    fn packed_handles() {
        let addr = Address::for_transfer(0x50).unwrap();
        let handle = DeviceHandle::packed(addr);
        assert_eq!(handle.raw(), 0xa0);
        assert_eq!(handle.address(), Ok(addr));

        assert_eq!(
            DeviceHandle::from_raw(0xa1).address(),
            Err(BusError::InvalidHandle)
        );
        assert_eq!(
            DeviceHandle::from_raw(0x100).address(),
            Err(BusError::InvalidHandle)
        );
        // 0x03 << 1: reserved address
        assert_eq!(
            DeviceHandle::from_raw(0x06).address(),
            Err(BusError::InvalidHandle)
        );
    }

    #[test]
    fn address_display() {
        assert_eq!(Address::new(0x48).unwrap().to_string(), "0x48");
        assert_eq!(Address::new(0x08).unwrap().to_string(), "0x08");
    }
}
