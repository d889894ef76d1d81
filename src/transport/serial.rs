//! Serial-port adapter backed by `serial2`, feature-gated behind `sync`
//! exactly like the teacher's own `sync` feature. Grounded on
//! `jpe::transport::BufClear for SerialPort` and the builder's
//! `SerialPort::open(com_port, baud_rate)` call.

use std::time::{SystemTime, UNIX_EPOCH};

use serial2::SerialPort;

use crate::adapter::Adapter;

/// Wraps a [`serial2::SerialPort`] as an [`Adapter`]. `write`/`read` use the
/// port's already-nonblocking semantics (opened with a short read timeout)
/// so they never block the cooperative poll loop.
pub struct SerialAdapter {
    port: SerialPort,
}

impl SerialAdapter {
    pub fn open(path: &str, baud_rate: u32) -> std::io::Result<Self> {
        let mut port = SerialPort::open(path, baud_rate)?;
        port.set_read_timeout(std::time::Duration::from_millis(0))?;
        Ok(Self { port })
    }
}

impl Adapter for SerialAdapter {
    fn write(&self, buf: &[u8]) -> usize {
        use std::io::Write;
        (&self.port).write(buf).unwrap_or(0)
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        use std::io::Read;
        match (&self.port).read(buf) {
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => 0,
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => 0,
            Err(_) => 0,
        }
    }

    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn error(&self, event: crate::adapter::ErrorEvent<'_>) {
        let _ = self.port.discard_input_buffer();
        let _ = event;
    }
}
