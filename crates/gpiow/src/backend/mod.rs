//! Concrete backends.
//!
//! * [`pigpiod`]: a Raspberry Pi's I2C controller through the pigpio daemon.
//! * [`mpsse`]: an FTDI MPSSE adapter, bit-level, through a caller-supplied
//!   chip driver.
//! * [`sim`]: an in-memory bus with simulated devices.

pub mod mpsse;
pub mod pigpiod;
pub mod sim;
