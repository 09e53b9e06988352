//! Runtime-selectable I2C bus backends.
//!
//! A [`Registry`] holds the available backends in priority order. Given an
//! optional connection string, [`Registry::create_bus`] asks each backend in
//! turn to claim it; the first one that does returns a [`BusHandle`] with the
//! same open/read/write/close contract no matter which transport sits below.
//!
//! ```no_run
//! let registry = gpiow::initialize();
//! let mut bus = registry.create_bus(Some("pigpiod://raspberrypi:8888/1"))?;
//! let dev = bus.open(0x48, 0)?;
//! let mut temp = [0u8; 2];
//! bus.read(dev, &mut temp)?;
//! bus.close(dev);
//! # Ok::<(), gpiow::BusError>(())
//! ```
//!
//! Nothing here is thread-safe: a registry and every bus it creates must be
//! driven from one thread at a time, serialized by the caller.

pub mod backend;
mod bus;
pub mod codec;
mod error;
mod factory;
pub mod framing;
pub mod log;
mod registry;
pub mod uri;

pub use bus::{BusHandle, I2cBus};
pub use codec::{Address, DeviceHandle, Direction};
pub use error::{describe, BusError, DuplicateBackend, Result};
pub use factory::BusFactory;
pub use registry::Registry;

/// Build a registry holding every built-in backend.
///
/// `pigpiod` is tried first, then `sim`. Call once per process and keep the
/// returned registry around for the life of the program.
pub fn initialize() -> Registry {
    Registry::with_builtins()
}
