//! The daemon's socket interface.
//!
//! Every command is four little-endian `u32`s (`cmd`, `p1`, `p2`, `p3`)
//! followed by `p3` bytes of extension. The reply echoes the first three
//! words and puts the signed status in the fourth; a read-device reply is
//! followed by that many data bytes.

use std::io::{Read, Write};
use std::net::TcpStream;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::trace;

use super::{Connector, Daemon, DaemonAddress, DaemonError};

pub const CMD_I2CO: u32 = 54;
pub const CMD_I2CC: u32 = 55;
pub const CMD_I2CRD: u32 = 56;
pub const CMD_I2CWD: u32 = 57;
pub const CMD_I2CWQ: u32 = 58;

/// Connects to the daemon over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Daemon = TcpDaemon;

    fn connect(
        &self,
        host: Option<&str>,
        port: Option<u16>,
    ) -> Result<TcpDaemon, DaemonError> {
        TcpDaemon::connect(&DaemonAddress::resolve(host, port))
    }
}

/// One command socket to the daemon.
pub struct TcpDaemon {
    stream: TcpStream,
}

impl TcpDaemon {
    pub fn connect(addr: &DaemonAddress) -> Result<Self, DaemonError> {
        let stream = TcpStream::connect((addr.host.as_str(), addr.port))?;
        stream.set_nodelay(true)?;
        trace!(host = %addr.host, port = addr.port, "daemon socket open");
        Ok(Self { stream })
    }

    fn command(
        &mut self,
        cmd: u32,
        p1: u32,
        p2: u32,
        ext: &[u8],
    ) -> Result<u32, DaemonError> {
        let mut frame = Vec::with_capacity(16 + ext.len());
        frame.write_u32::<LittleEndian>(cmd)?;
        frame.write_u32::<LittleEndian>(p1)?;
        frame.write_u32::<LittleEndian>(p2)?;
        frame.write_u32::<LittleEndian>(ext.len() as u32)?;
        frame.extend_from_slice(ext);
        self.stream.write_all(&frame)?;

        let mut reply = [0u8; 16];
        self.stream.read_exact(&mut reply)?;
        let status = (&reply[12..]).read_i32::<LittleEndian>()?;
        trace!(cmd, p1, p2, status, "daemon command");
        if status < 0 {
            return Err(DaemonError::Status(status));
        }
        Ok(status as u32)
    }
}

impl Daemon for TcpDaemon {
    fn i2c_open(
        &mut self,
        bus: u32,
        address: u8,
        flags: u32,
    ) -> Result<u32, DaemonError> {
        self.command(CMD_I2CO, bus, u32::from(address), &flags.to_le_bytes())
    }

    fn i2c_close(&mut self, handle: u32) -> Result<(), DaemonError> {
        self.command(CMD_I2CC, handle, 0, &[]).map(drop)
    }

    fn i2c_read_device(
        &mut self,
        handle: u32,
        buf: &mut [u8],
    ) -> Result<usize, DaemonError> {
        let count = self.command(CMD_I2CRD, handle, buf.len() as u32, &[])?;
        let count = count as usize;
        if count > buf.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "daemon returned more bytes than requested",
            )
            .into());
        }
        self.stream.read_exact(&mut buf[..count])?;
        Ok(count)
    }

    fn i2c_write_device(
        &mut self,
        handle: u32,
        data: &[u8],
    ) -> Result<(), DaemonError> {
        self.command(CMD_I2CWD, handle, 0, data).map(drop)
    }

    fn i2c_write_quick(&mut self, handle: u32, bit: u8) -> Result<(), DaemonError> {
        self.command(CMD_I2CWQ, handle, u32::from(bit), &[]).map(drop)
    }
}
