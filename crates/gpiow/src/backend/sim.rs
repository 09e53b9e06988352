//! An in-memory bus with simulated devices.
//!
//! Connection strings: `sim[:addr[,addr]...]` with hexadecimal addresses.
//! Each listed address gets a 256-byte register device: the first byte of a
//! write sets the register pointer, further bytes are stored from there, and
//! reads continue from the pointer. The backend never answers default
//! discovery.
//!
//! [`SimWire`] is a cheap handle onto shared state, so a clone kept by the
//! caller can inject faults and inspect traffic while the bus owns another.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use derive_more::{Display, Error};
use tracing::{debug, error};

use crate::bus::I2cBus;
use crate::codec::{Address, Direction, MAX_ADDRESS};
use crate::error::{BusError, Result};
use crate::factory::BusFactory;
use crate::framing::{Reply, Wire, WireBus};
use crate::uri::UriCursor;

pub const NAME: &str = "sim";
pub const REGISTER_SPACE: usize = 256;

/// A register-file device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimDevice {
    memory: Vec<u8>,
    pointer: usize,
    busy: bool,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::with_memory(vec![0; REGISTER_SPACE])
    }
}

impl SimDevice {
    /// A device whose registers start out as `memory`.
    pub fn with_memory(memory: Vec<u8>) -> Self {
        Self { memory, pointer: 0, busy: false }
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some((&pointer, data)) = bytes.split_first() else {
            return;
        };
        self.pointer = usize::from(pointer);
        for &byte in data {
            if let Some(slot) = self.memory.get_mut(self.pointer) {
                *slot = byte;
            }
            self.pointer = self.next(self.pointer);
        }
    }

    fn read(&mut self) -> u8 {
        let byte = self.memory.get(self.pointer).copied().unwrap_or(0xff);
        self.pointer = self.next(self.pointer);
        byte
    }

    fn next(&self, pointer: usize) -> usize {
        (pointer + 1) % self.memory.len().max(1)
    }
}

/// Bus traffic as seen by the simulated wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    Start,
    Send(Vec<u8>),
    Receive(Reply),
    Stop,
}

/// Injected channel failure.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
#[display("simulated channel fault")]
pub struct SimFault;

#[derive(Debug)]
struct State {
    devices: BTreeMap<u8, SimDevice>,
    events: Vec<SimEvent>,
    target: Option<u8>,
    awaiting_header: bool,
    acked: bool,
    fail_sends: bool,
    fail_receives: bool,
    open: bool,
    shutdowns: usize,
}

impl Default for State {
    fn default() -> Self {
        Self {
            devices: BTreeMap::new(),
            events: Vec::new(),
            target: None,
            awaiting_header: false,
            acked: false,
            fail_sends: false,
            fail_receives: false,
            open: true,
            shutdowns: 0,
        }
    }
}

/// Simulated wire shared between clones.
#[derive(Debug, Clone, Default)]
pub struct SimWire {
    state: Rc<RefCell<State>>,
}

impl SimWire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`attach`](Self::attach).
    pub fn with_device(self, address: u8, device: SimDevice) -> Self {
        self.attach(address, device);
        self
    }

    /// Put `device` on the bus at `address`, replacing any previous one.
    pub fn attach(&self, address: u8, device: SimDevice) {
        self.state.borrow_mut().devices.insert(address, device);
    }

    /// A busy device is present but does not acknowledge.
    pub fn set_busy(&self, address: u8, busy: bool) {
        if let Some(dev) = self.state.borrow_mut().devices.get_mut(&address) {
            dev.busy = busy;
        }
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.borrow_mut().fail_sends = fail;
    }

    pub fn fail_receives(&self, fail: bool) {
        self.state.borrow_mut().fail_receives = fail;
    }

    pub fn device(&self, address: u8) -> Option<SimDevice> {
        self.state.borrow().devices.get(&address).cloned()
    }

    pub fn addresses(&self) -> Vec<u8> {
        self.state.borrow().devices.keys().copied().collect()
    }

    /// Drain the recorded traffic.
    pub fn take_events(&self) -> Vec<SimEvent> {
        core::mem::take(&mut self.state.borrow_mut().events)
    }

    /// How many times a bus over this wire has been released.
    pub fn shutdowns(&self) -> usize {
        self.state.borrow().shutdowns
    }
}

impl Wire for SimWire {
    type Error = SimFault;

    fn start(&mut self) -> core::result::Result<(), SimFault> {
        let mut s = self.state.borrow_mut();
        s.events.push(SimEvent::Start);
        s.target = None;
        s.awaiting_header = true;
        s.acked = false;
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> core::result::Result<(), SimFault> {
        let mut s = self.state.borrow_mut();
        s.events.push(SimEvent::Send(bytes.to_vec()));
        if s.fail_sends {
            return Err(SimFault);
        }
        let mut data = bytes;
        if s.awaiting_header {
            let Some((&header, rest)) = bytes.split_first() else {
                return Ok(());
            };
            s.awaiting_header = false;
            let (address, direction) = Address::from_header(header);
            let present = s
                .devices
                .get(&address.get())
                .is_some_and(|dev| !dev.busy);
            s.target = present.then_some(address.get());
            s.acked = present;
            if direction == Direction::Read || rest.is_empty() {
                return Ok(());
            }
            data = rest;
        }
        let target = s.target;
        let acked = match target.and_then(|addr| s.devices.get_mut(&addr)) {
            Some(dev) => {
                dev.write(data);
                true
            }
            None => false,
        };
        s.acked = acked;
        Ok(())
    }

    fn acknowledged(&mut self) -> bool {
        self.state.borrow().acked
    }

    fn receive(&mut self, reply: Reply) -> core::result::Result<u8, SimFault> {
        let mut s = self.state.borrow_mut();
        s.events.push(SimEvent::Receive(reply));
        if s.fail_receives {
            return Err(SimFault);
        }
        let target = s.target;
        Ok(match target.and_then(|addr| s.devices.get_mut(&addr)) {
            Some(dev) => dev.read(),
            // Nobody drives the line: it reads as pulled up.
            None => 0xff,
        })
    }

    fn stop(&mut self) {
        let mut s = self.state.borrow_mut();
        s.events.push(SimEvent::Stop);
        s.target = None;
        s.awaiting_header = false;
    }

    fn is_open(&self) -> bool {
        self.state.borrow().open
    }

    fn shutdown(&mut self) {
        let mut s = self.state.borrow_mut();
        s.open = false;
        s.shutdowns += 1;
        debug!("simulated bus shut down");
    }
}

/// Backend factory for simulated buses.
#[derive(Debug, Default)]
pub struct SimBackend {
    shared: Option<SimWire>,
}

impl SimBackend {
    /// Every bus gets a fresh wire holding the devices listed in its string.
    pub fn new() -> Self {
        Self { shared: None }
    }

    /// Every bus runs over a clone of `wire`; listed addresses without a
    /// device get a fresh one.
    pub fn shared(wire: SimWire) -> Self {
        Self { shared: Some(wire) }
    }
}

/// Device addresses listed in a `sim` connection string.
///
/// `Ok(None)` when the scheme is not `sim`.
pub fn parse_addresses(uri: &str) -> Result<Option<Vec<u8>>> {
    let mut cursor = UriCursor::new(uri);
    if !cursor.scheme(NAME) {
        return Ok(None);
    }
    let mut addresses = Vec::new();
    while !cursor.is_empty() {
        let address = cursor
            .integer(16, ",")?
            .and_then(|n| u8::try_from(n).ok())
            .filter(|&n| n <= MAX_ADDRESS)
            .ok_or(BusError::InvalidUri)?;
        addresses.push(address);
        if !cursor.exact(",") && !cursor.is_empty() {
            return Err(BusError::InvalidUri);
        }
    }
    Ok(Some(addresses))
}

impl BusFactory for SimBackend {
    fn name(&self) -> &str {
        NAME
    }

    fn create(&self, uri: Option<&str>) -> Result<Option<Box<dyn I2cBus>>> {
        let Some(uri) = uri else {
            return Ok(None);
        };
        let addresses = match parse_addresses(uri) {
            Ok(Some(addresses)) => addresses,
            Ok(None) => return Ok(None),
            Err(err) => {
                error!(uri, "malformed connection string");
                return Err(err);
            }
        };

        let wire = self.shared.clone().unwrap_or_default();
        {
            let mut state = wire.state.borrow_mut();
            state.open = true;
            for address in addresses {
                state.devices.entry(address).or_default();
            }
        }
        debug!(devices = ?wire.addresses(), "simulated bus created");
        Ok(Some(Box::new(WireBus::new(wire))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing;

    fn addr(raw: u8) -> Address {
        Address::for_transfer(raw).unwrap()
    }

    #[test]
    fn address_lists() {
        assert_eq!(parse_addresses("sim"), Ok(Some(vec![])));
        assert_eq!(parse_addresses("sim:"), Ok(Some(vec![])));
        assert_eq!(parse_addresses("sim:48,0x50,7f"), Ok(Some(vec![0x48, 0x50, 0x7f])));
        assert_eq!(parse_addresses("simx:48"), Ok(None));
        assert_eq!(parse_addresses("sim:80"), Err(BusError::InvalidUri));
        assert_eq!(parse_addresses("sim:48,,50"), Err(BusError::InvalidUri));
        assert_eq!(parse_addresses("sim:zz"), Err(BusError::InvalidUri));
    }

    #[test]
    fn register_writes_then_reads() {
        let mut wire = SimWire::new().with_device(0x50, SimDevice::default());
        assert_eq!(framing::write(&mut wire, addr(0x50), &[0x10, 0xaa, 0xbb]), Ok(3));
        assert_eq!(framing::write(&mut wire, addr(0x50), &[0x10]), Ok(1));
        let mut buf = [0u8; 2];
        assert_eq!(framing::read(&mut wire, addr(0x50), &mut buf), Ok(2));
        assert_eq!(buf, [0xaa, 0xbb]);
        assert_eq!(wire.device(0x50).unwrap().memory()[0x10..0x12], [0xaa, 0xbb]);
    }

    #[test]
    fn absent_and_busy_devices_nack() {
        let mut wire = SimWire::new().with_device(0x50, SimDevice::default());
        assert_eq!(
            framing::write(&mut wire, addr(0x51), &[]),
            Err(BusError::CommunicationError)
        );
        wire.set_busy(0x50, true);
        assert_eq!(
            framing::write(&mut wire, addr(0x50), &[]),
            Err(BusError::CommunicationError)
        );
        wire.set_busy(0x50, false);
        assert_eq!(framing::write(&mut wire, addr(0x50), &[]), Ok(0));
    }

    #[test]
    fn faults_map_to_their_phase() {
        let mut wire = SimWire::new().with_device(0x50, SimDevice::default());
        wire.fail_sends(true);
        assert_eq!(framing::write(&mut wire, addr(0x50), &[]), Err(BusError::BackendFailure));
        wire.fail_sends(false);
        wire.fail_receives(true);
        let mut buf = [0u8; 1];
        assert_eq!(
            framing::read(&mut wire, addr(0x50), &mut buf),
            Err(BusError::CommunicationError)
        );
        let events = wire.take_events();
        assert_eq!(events.iter().filter(|e| **e == SimEvent::Start).count(), 2);
        assert_eq!(events.iter().filter(|e| **e == SimEvent::Stop).count(), 2);
    }
}
