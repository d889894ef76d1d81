//! Adapter over a non-blocking `std::net::TcpStream`, for modems exposed over
//! a network bridge rather than directly on a serial port. Grounded on
//! `jpe::builder::BaseContextBuilder<Network>::build`'s
//! `TcpStream::connect_timeout` + `set_nonblocking(true)` pairing.

use std::net::TcpStream;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::adapter::Adapter;

pub struct TcpAdapter {
    stream: TcpStream,
}

impl TcpAdapter {
    pub fn connect(addr: std::net::SocketAddr, timeout: Duration) -> std::io::Result<Self> {
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nonblocking(true)?;
        Ok(Self { stream })
    }
}

impl Adapter for TcpAdapter {
    fn write(&self, buf: &[u8]) -> usize {
        use std::io::Write;
        (&self.stream).write(buf).unwrap_or(0)
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        use std::io::Read;
        match (&self.stream).read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(_) => 0,
        }
    }

    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
