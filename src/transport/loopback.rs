//! In-memory [`Adapter`] test double. Not gated behind any feature since it
//! has no external dependency, mirroring how the teacher's own tests drive
//! `BaseContext` against a concrete `Read`/`Write` implementor behind a trait
//! object rather than real hardware.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::adapter::Adapter;

/// A canned, queue-of-frames adapter: each [`Adapter::read`] call returns one
/// previously queued frame (or nothing, if the queue is empty), and every
/// [`Adapter::write`] call is recorded for later inspection. The clock
/// advances by a fixed step on every call so timeout-driven tests don't need
/// to sleep.
pub struct LoopbackAdapter {
    inner: Mutex<Inner>,
}

struct Inner {
    incoming: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    clock_ms: u64,
}

impl LoopbackAdapter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                incoming: VecDeque::new(),
                written: Vec::new(),
                clock_ms: 0,
            }),
        }
    }

    /// Queue one frame to be returned by the next [`Adapter::read`] call.
    pub fn push_incoming(&self, frame: &[u8]) {
        self.inner.lock().unwrap().incoming.push_back(frame.to_vec());
    }

    /// Everything written so far, for assertions.
    pub fn written(&self) -> Vec<u8> {
        self.inner.lock().unwrap().written.clone()
    }

    /// Advance the fake clock by an arbitrary amount, e.g. to force a timeout.
    pub fn advance_clock(&self, ms: u64) {
        self.inner.lock().unwrap().clock_ms += ms;
    }
}

impl Default for LoopbackAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for LoopbackAdapter {
    fn write(&self, buf: &[u8]) -> usize {
        self.inner.lock().unwrap().written.extend_from_slice(buf);
        buf.len()
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let Some(frame) = inner.incoming.pop_front() else {
            return 0;
        };
        let n = frame.len().min(buf.len());
        buf[..n].copy_from_slice(&frame[..n]);
        n
    }

    fn now_ms(&self) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        inner.clock_ms += 10;
        inner.clock_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_returns_queued_frames_in_order() {
        let adapter = LoopbackAdapter::new();
        adapter.push_incoming(b"OK\r\n");
        adapter.push_incoming(b"ERROR\r\n");
        let mut buf = [0u8; 16];
        let n = adapter.read(&mut buf);
        assert_eq!(&buf[..n], b"OK\r\n");
        let n = adapter.read(&mut buf);
        assert_eq!(&buf[..n], b"ERROR\r\n");
        assert_eq!(adapter.read(&mut buf), 0);
    }

    #[test]
    fn write_is_recorded() {
        let adapter = LoopbackAdapter::new();
        adapter.write(b"AT\r\n");
        assert_eq!(adapter.written(), b"AT\r\n");
    }

    #[test]
    fn clock_advances_each_call() {
        let adapter = LoopbackAdapter::new();
        let t1 = adapter.now_ms();
        let t2 = adapter.now_ms();
        assert!(t2 > t1);
    }
}
