//! Transaction framing over a bit-level bus.
//!
//! One `read` or `write` is a strict sequence: start, header byte,
//! acknowledgment, data, stop. Failing to push bytes through the channel is a
//! [`BusError::BackendFailure`]; a device that does not acknowledge is a
//! [`BusError::CommunicationError`]. The stop condition is issued on every
//! exit path.

use core::fmt::Debug;
use core::ops::{Deref, DerefMut};

use tracing::{debug, trace};

use crate::bus::I2cBus;
use crate::codec::{Address, DeviceHandle, Direction};
use crate::error::{BusError, Result};

/// Reply sent after each byte pulled from a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Ack,
    Nack,
}

/// Primitive bus conditions a bit-level adapter provides.
pub trait Wire {
    /// Channel error; logged, then mapped to a [`BusError`].
    type Error: Debug;

    /// Creates a start condition on the bus.
    fn start(&mut self) -> core::result::Result<(), Self::Error>;

    /// Clocks `bytes` out to the bus.
    fn send(&mut self, bytes: &[u8]) -> core::result::Result<(), Self::Error>;

    /// Whether the last byte sent was acknowledged.
    fn acknowledged(&mut self) -> bool;

    /// Clocks one byte in, answering with `reply`.
    fn receive(&mut self, reply: Reply) -> core::result::Result<u8, Self::Error>;

    /// Creates a stop condition on the bus.
    fn stop(&mut self);

    /// Whether the adapter is still usable.
    fn is_open(&self) -> bool {
        true
    }

    /// Tear down the adapter. Called once when the owning bus is released.
    fn shutdown(&mut self) {}
}

/// Issues the stop condition when dropped.
struct Transaction<'w, W: Wire>(&'w mut W);

impl<'w, W: Wire> Transaction<'w, W> {
    fn begin(wire: &'w mut W) -> Result<Self> {
        let txn = Self(wire);
        txn.0.start().map_err(|err| {
            debug!(?err, "start condition failed");
            BusError::BackendFailure
        })?;
        Ok(txn)
    }

    fn address(&mut self, address: Address, direction: Direction) -> Result<()> {
        self.0.send(&[address.header(direction)]).map_err(|err| {
            debug!(%address, ?err, "sending header failed");
            BusError::BackendFailure
        })?;
        if !self.0.acknowledged() {
            trace!(%address, "header not acknowledged");
            return Err(BusError::CommunicationError);
        }
        Ok(())
    }
}

impl<W: Wire> Deref for Transaction<'_, W> {
    type Target = W;

    fn deref(&self) -> &W {
        self.0
    }
}

impl<W: Wire> DerefMut for Transaction<'_, W> {
    fn deref_mut(&mut self) -> &mut W {
        self.0
    }
}

impl<W: Wire> Drop for Transaction<'_, W> {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Write `data` to the device at `address` in one transaction.
pub fn write<W: Wire>(wire: &mut W, address: Address, data: &[u8]) -> Result<usize> {
    let mut txn = Transaction::begin(wire)?;
    txn.address(address, Direction::Write)?;
    if !data.is_empty() {
        txn.send(data).map_err(|err| {
            debug!(%address, ?err, "sending payload failed");
            BusError::BackendFailure
        })?;
        if !txn.acknowledged() {
            trace!(%address, "payload not acknowledged");
            return Err(BusError::CommunicationError);
        }
    }
    Ok(data.len())
}

/// Fill `buf` from the device at `address` in one transaction.
///
/// Every byte but the last is acknowledged; the last is answered with a NACK
/// so the device releases the bus.
pub fn read<W: Wire>(wire: &mut W, address: Address, buf: &mut [u8]) -> Result<usize> {
    let mut txn = Transaction::begin(wire)?;
    txn.address(address, Direction::Read)?;
    let last = buf.len().saturating_sub(1);
    for (i, byte) in buf.iter_mut().enumerate() {
        let reply = if i == last { Reply::Nack } else { Reply::Ack };
        *byte = txn.receive(reply).map_err(|err| {
            debug!(%address, ?err, index = i, "receiving byte failed");
            BusError::CommunicationError
        })?;
    }
    Ok(buf.len())
}

/// An [`I2cBus`] driven directly through a [`Wire`].
///
/// Device handles are packed addresses and carry no state, so `close` does
/// nothing.
pub struct WireBus<W: Wire> {
    wire: W,
}

impl<W: Wire> WireBus<W> {
    pub fn new(wire: W) -> Self {
        Self { wire }
    }

    fn target(&self, handle: DeviceHandle) -> Result<Address> {
        if !self.wire.is_open() {
            return Err(BusError::InvalidObject);
        }
        handle.address()
    }
}

impl<W: Wire> I2cBus for WireBus<W> {
    fn open(&mut self, address: Address, _flags: u32) -> Result<DeviceHandle> {
        if !self.wire.is_open() {
            return Err(BusError::InvalidObject);
        }
        Ok(DeviceHandle::packed(address))
    }

    fn read(&mut self, handle: DeviceHandle, buf: &mut [u8]) -> Result<usize> {
        let address = self.target(handle)?;
        read(&mut self.wire, address, buf)
    }

    fn write(&mut self, handle: DeviceHandle, data: &[u8]) -> Result<usize> {
        let address = self.target(handle)?;
        write(&mut self.wire, address, data)
    }

    fn close(&mut self, _handle: DeviceHandle) {}

    fn release(mut self: Box<Self>) {
        self.wire.shutdown();
    }
}
