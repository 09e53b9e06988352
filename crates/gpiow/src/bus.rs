use tracing::debug;

use crate::codec::{Address, DeviceHandle};
use crate::error::{BusError, Result};

/// The operations every backend exposes once constructed.
///
/// Implementors own all backend-private state. Addresses arrive already
/// checked by [`BusHandle::open`].
pub trait I2cBus {
    /// Prepare the device at `address`. Never performs a transaction.
    fn open(&mut self, address: Address, flags: u32) -> Result<DeviceHandle>;

    /// Fill `buf` from the device, returning the number of bytes read.
    fn read(&mut self, handle: DeviceHandle, buf: &mut [u8]) -> Result<usize>;

    /// Send `data` to the device, returning the number of bytes written.
    fn write(&mut self, handle: DeviceHandle, data: &[u8]) -> Result<usize>;

    /// Forget a device handle.
    fn close(&mut self, handle: DeviceHandle);

    /// Tear down the connection and every resource behind it.
    fn release(self: Box<Self>);
}

/// Owned connection to one backend instance.
///
/// Dropping a live handle releases the backend. After
/// [`release`](Self::release) every operation fails with
/// [`BusError::InvalidObject`].
pub struct BusHandle {
    backend: String,
    inner: Option<Box<dyn I2cBus>>,
}

impl BusHandle {
    pub fn new(backend: impl Into<String>, inner: Box<dyn I2cBus>) -> Self {
        Self { backend: backend.into(), inner: Some(inner) }
    }

    /// Name of the backend that produced this bus.
    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    fn inner(&mut self) -> Result<&mut (dyn I2cBus + 'static)> {
        match self.inner.as_deref_mut() {
            Some(bus) => Ok(bus),
            None => Err(BusError::InvalidObject),
        }
    }

    /// Open the device at `address` (0x08..=0x77).
    pub fn open(&mut self, address: u8, flags: u32) -> Result<DeviceHandle> {
        let bus = self.inner()?;
        let address = Address::for_transfer(address)?;
        bus.open(address, flags)
    }

    pub fn read(&mut self, handle: DeviceHandle, buf: &mut [u8]) -> Result<usize> {
        self.inner()?.read(handle, buf)
    }

    pub fn write(&mut self, handle: DeviceHandle, data: &[u8]) -> Result<usize> {
        self.inner()?.write(handle, data)
    }

    pub fn close(&mut self, handle: DeviceHandle) {
        match self.inner() {
            Ok(bus) => bus.close(handle),
            Err(_) => debug!(%handle, "close on a released bus ignored"),
        }
    }

    /// Release the backend. A second call reports [`BusError::InvalidObject`].
    pub fn release(&mut self) -> Result<()> {
        let inner = self.inner.take().ok_or(BusError::InvalidObject)?;
        debug!(backend = %self.backend, "releasing bus");
        inner.release();
        Ok(())
    }
}

impl Drop for BusHandle {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.release();
        }
    }
}

impl core::fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BusHandle")
            .field("backend", &self.backend)
            .field("released", &self.is_released())
            .finish()
    }
}
