//! I2C through the pigpio daemon.
//!
//! Connection strings: `pigpiod[:[//host[:port]][/][bus]]`. The bus number is
//! decimal and defaults to 1, the header pins of a Raspberry Pi. Missing
//! host and port come from `PIGPIO_ADDR` and `PIGPIO_PORT`, then
//! `localhost:8888`.
//!
//! The daemon keeps one handle per opened device, so `close` and `release`
//! hand those back.

use std::collections::BTreeSet;

use derive_more::{Display, Error, From};
use tracing::{debug, error, info, warn};

use crate::bus::I2cBus;
use crate::codec::{Address, DeviceHandle};
use crate::error::{BusError, Result};
use crate::factory::BusFactory;
use crate::uri::{parse_integer, UriCursor};

mod tcp;

pub use tcp::{TcpConnector, TcpDaemon};

pub const NAME: &str = "pigpiod";
/// Raspberry Pi's external I2C pins in the pin header.
pub const DEFAULT_BUS: u32 = 1;
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8888;

pub const PI_BAD_HANDLE: i32 = -25;
pub const PI_I2C_OPEN_FAILED: i32 = -71;
pub const PI_BAD_I2C_BUS: i32 = -74;
pub const PI_BAD_I2C_ADDR: i32 = -75;
pub const PI_BAD_FLAGS: i32 = -77;
pub const PI_BAD_PARAM: i32 = -81;
pub const PI_I2C_WRITE_FAILED: i32 = -82;
pub const PI_I2C_READ_FAILED: i32 = -83;

/// Errors reported while talking to the daemon.
#[derive(Debug, Display, Error, From)]
pub enum DaemonError {
    #[display("daemon connection: {_0}")]
    Io(#[error(source)] std::io::Error),
    /// Negative status returned by a daemon command.
    #[display("daemon status {_0}")]
    Status(#[error(not(source))] i32),
}

impl DaemonError {
    fn bus_error(&self) -> BusError {
        match *self {
            Self::Io(_) => BusError::BackendFailure,
            Self::Status(PI_BAD_HANDLE) => BusError::InvalidHandle,
            Self::Status(PI_BAD_I2C_ADDR | PI_BAD_FLAGS | PI_BAD_PARAM) => {
                BusError::InvalidArgument
            }
            Self::Status(PI_I2C_WRITE_FAILED | PI_I2C_READ_FAILED) => {
                BusError::CommunicationError
            }
            Self::Status(_) => BusError::BackendFailure,
        }
    }
}

/// The daemon's I2C commands, one session per value.
///
/// Dropping the value ends the session.
pub trait Daemon {
    fn i2c_open(
        &mut self,
        bus: u32,
        address: u8,
        flags: u32,
    ) -> Result<u32, DaemonError>;

    fn i2c_close(&mut self, handle: u32) -> Result<(), DaemonError>;

    /// Returns the number of bytes the daemon delivered.
    fn i2c_read_device(
        &mut self,
        handle: u32,
        buf: &mut [u8],
    ) -> Result<usize, DaemonError>;

    fn i2c_write_device(
        &mut self,
        handle: u32,
        data: &[u8],
    ) -> Result<(), DaemonError>;

    /// Address phase only, with `bit` as the R/W bit.
    fn i2c_write_quick(&mut self, handle: u32, bit: u8) -> Result<(), DaemonError>;
}

/// Opens daemon sessions.
pub trait Connector {
    type Daemon: Daemon + 'static;

    /// Connect to `host:port`; `None` fields use the configured defaults.
    fn connect(
        &self,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<Self::Daemon, DaemonError>;
}

/// Where the daemon listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonAddress {
    pub host: String,
    pub port: u16,
}

impl DaemonAddress {
    /// Fill missing fields from `PIGPIO_ADDR`/`PIGPIO_PORT`, then the
    /// library defaults.
    pub fn resolve(host: Option<&str>, port: Option<u16>) -> Self {
        let host = host
            .map(str::to_owned)
            .or_else(|| std::env::var("PIGPIO_ADDR").ok())
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| DEFAULT_HOST.to_owned());
        let port = port
            .or_else(|| {
                let raw = std::env::var("PIGPIO_PORT").ok()?;
                match raw.parse() {
                    Ok(port) => Some(port),
                    Err(_) => {
                        warn!(%raw, "ignoring malformed PIGPIO_PORT");
                        None
                    }
                }
            })
            .unwrap_or(DEFAULT_PORT);
        Self { host, port }
    }
}

/// What a `pigpiod` connection string asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Target<'a> {
    pub host: Option<&'a str>,
    pub port: Option<u16>,
    pub bus: u32,
}

impl<'a> Target<'a> {
    /// Parse `uri`. `Ok(None)` when the scheme is not `pigpiod`.
    pub fn parse(uri: &'a str) -> Result<Option<Self>> {
        let mut cursor = UriCursor::new(uri);
        if !cursor.scheme(NAME) {
            return Ok(None);
        }
        let endpoint = cursor.endpoint();
        let port = endpoint
            .port
            .map(|port| {
                parse_integer(port, 10).and_then(|n| {
                    u16::try_from(n).map_err(|_| BusError::InvalidUri)
                })
            })
            .transpose()?;
        let bus = match endpoint.tail {
            "" => DEFAULT_BUS,
            tail => u32::try_from(parse_integer(tail, 10)?)
                .map_err(|_| BusError::InvalidUri)?,
        };
        Ok(Some(Self { host: endpoint.host, port, bus }))
    }
}

/// Backend factory for the pigpio daemon.
pub struct PigpiodBackend<C = TcpConnector> {
    connector: C,
}

impl PigpiodBackend<TcpConnector> {
    pub fn tcp() -> Self {
        Self::new(TcpConnector)
    }
}

impl<C: Connector> PigpiodBackend<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

impl<C: Connector> BusFactory for PigpiodBackend<C> {
    fn name(&self) -> &str {
        NAME
    }

    fn create(&self, uri: Option<&str>) -> Result<Option<Box<dyn I2cBus>>> {
        let Some(uri) = uri else {
            return Ok(match self.connector.connect(None, None) {
                Ok(daemon) => {
                    info!("connected to the default pigpio daemon");
                    Some(Box::new(PigpiodBus::new(daemon, DEFAULT_BUS)))
                }
                Err(err) => {
                    debug!(%err, "no default pigpio daemon");
                    None
                }
            });
        };

        let target = match Target::parse(uri) {
            Ok(Some(target)) => target,
            Ok(None) => return Ok(None),
            Err(err) => {
                error!(uri, "malformed connection string");
                return Err(err);
            }
        };

        info!(
            host = ?target.host,
            port = ?target.port,
            bus = target.bus,
            "connecting to pigpiod"
        );
        let daemon = self
            .connector
            .connect(target.host, target.port)
            .map_err(|err| {
                error!(%err, uri, "pigpiod connection failed");
                BusError::BackendFailure
            })?;
        Ok(Some(Box::new(PigpiodBus::new(daemon, target.bus))))
    }
}

/// A bus served by one daemon session.
pub struct PigpiodBus<D: Daemon> {
    daemon: D,
    bus: u32,
    handles: BTreeSet<u32>,
}

impl<D: Daemon> PigpiodBus<D> {
    pub fn new(daemon: D, bus: u32) -> Self {
        Self { daemon, bus, handles: BTreeSet::new() }
    }

    fn known(&self, handle: DeviceHandle) -> Result<u32> {
        if self.handles.contains(&handle.raw()) {
            Ok(handle.raw())
        } else {
            Err(BusError::InvalidHandle)
        }
    }
}

impl<D: Daemon> I2cBus for PigpiodBus<D> {
    fn open(&mut self, address: Address, flags: u32) -> Result<DeviceHandle> {
        let handle = self
            .daemon
            .i2c_open(self.bus, address.get(), flags)
            .map_err(|err| {
                debug!(%address, %err, "i2c_open failed");
                err.bus_error()
            })?;
        self.handles.insert(handle);
        Ok(DeviceHandle::from_raw(handle))
    }

    /// A short read from the daemon is a [`BusError::CommunicationError`].
    fn read(&mut self, handle: DeviceHandle, buf: &mut [u8]) -> Result<usize> {
        let handle = self.known(handle)?;
        let count = self.daemon.i2c_read_device(handle, buf).map_err(|err| {
            debug!(handle, %err, "i2c_read_device failed");
            err.bus_error()
        })?;
        if count < buf.len() {
            debug!(handle, count, wanted = buf.len(), "short read");
            return Err(BusError::CommunicationError);
        }
        Ok(count)
    }

    fn write(&mut self, handle: DeviceHandle, data: &[u8]) -> Result<usize> {
        let handle = self.known(handle)?;
        let res = if data.is_empty() {
            self.daemon.i2c_write_quick(handle, 0)
        } else {
            self.daemon.i2c_write_device(handle, data)
        };
        res.map_err(|err| {
            debug!(handle, %err, "i2c write failed");
            err.bus_error()
        })?;
        Ok(data.len())
    }

    fn close(&mut self, handle: DeviceHandle) {
        if !self.handles.remove(&handle.raw()) {
            return;
        }
        if let Err(err) = self.daemon.i2c_close(handle.raw()) {
            warn!(%handle, %err, "i2c_close failed");
        }
    }

    fn release(mut self: Box<Self>) {
        for handle in core::mem::take(&mut self.handles) {
            if let Err(err) = self.daemon.i2c_close(handle) {
                warn!(handle, %err, "i2c_close failed during release");
            }
        }
    }
}
