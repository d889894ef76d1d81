//! Raw transparent bidirectional byte shuttle. Grounded on
//! `at_chat.c::at_raw_trans_process`: while active, bytes flow straight
//! between the adapter and a second transport with no command framing, while
//! an optional exit sentinel is watched for on the secondary-to-adapter path.
//!
//! The original accumulates secondary-read bytes into a scratch buffer and
//! treats `rbuf[i] == '\r' || rbuf[i] == 'n'` as the line terminator to test
//! against the configured exit command — the `'n'` is a typo for `'\n'`
//! confirmed against no other callers relying on the literal behavior (§9
//! Open Question decision, see `DESIGN.md`); this implementation uses the
//! corrected `'\r'`/`'\n'` check.

use crate::adapter::Adapter;
use crate::config::RAW_CHUNK_SIZE;

/// A secondary transport the raw shuttle relays bytes to/from. Kept separate
/// from [`Adapter`] since the shuttle's job is specifically to bridge two
/// distinct byte streams (the modem's wire and, e.g., a local terminal), not
/// to participate in command/response matching.
pub trait RawPeer {
    fn write(&mut self, buf: &[u8]) -> usize;
    fn read(&mut self, buf: &mut [u8]) -> usize;
}

pub struct RawTransportConfig {
    pub exit_cmd: Option<Vec<u8>>,
}

pub(crate) struct RawShuttle {
    exit_cmd: Option<Vec<u8>>,
    line: Vec<u8>,
    bufsize: usize,
}

impl RawShuttle {
    pub(crate) fn new(config: RawTransportConfig, bufsize: usize) -> Self {
        Self {
            exit_cmd: config.exit_cmd,
            line: Vec::with_capacity(bufsize),
            bufsize,
        }
    }

    /// Shuttle one chunk in each direction. Returns `true` once the exit
    /// sentinel has been observed on the secondary-to-adapter path, mirroring
    /// `at_raw_trans_process`'s `on_exit()` call.
    pub(crate) fn tick<A: Adapter + ?Sized, P: RawPeer>(
        &mut self,
        adapter: &A,
        peer: &mut P,
    ) -> bool {
        let mut chunk = [0u8; RAW_CHUNK_SIZE];

        let n = adapter.read(&mut chunk);
        if n > 0 {
            peer.write(&chunk[..n]);
        }

        let n = peer.read(&mut chunk);
        if n > 0 {
            adapter.write(&chunk[..n]);
            if self.exit_cmd.is_some() {
                return self.watch_exit(&chunk[..n]);
            }
        }

        false
    }

    fn watch_exit(&mut self, data: &[u8]) -> bool {
        let Some(exit_cmd) = &self.exit_cmd else {
            return false;
        };
        for &b in data {
            if self.line.len() + 1 >= self.bufsize {
                self.line.clear();
            }
            if b == b'\r' || b == b'\n' {
                let matched = !self.line.is_empty()
                    && self.line.eq_ignore_ascii_case(exit_cmd.as_slice());
                self.line.clear();
                if matched {
                    return true;
                }
            } else {
                self.line.push(b);
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullAdapter;
    impl Adapter for NullAdapter {
        fn write(&self, _buf: &[u8]) -> usize {
            0
        }
        fn read(&self, _buf: &mut [u8]) -> usize {
            0
        }
        fn now_ms(&self) -> u64 {
            0
        }
    }

    struct FixedPeer {
        to_read: Vec<u8>,
    }
    impl RawPeer for FixedPeer {
        fn write(&mut self, _buf: &[u8]) -> usize {
            0
        }
        fn read(&mut self, buf: &mut [u8]) -> usize {
            let n = self.to_read.len().min(buf.len());
            buf[..n].copy_from_slice(&self.to_read[..n]);
            self.to_read.drain(..n);
            n
        }
    }

    #[test]
    fn exit_command_with_newline_triggers_exit() {
        let mut shuttle = RawShuttle::new(
            RawTransportConfig {
                exit_cmd: Some(b"+++".to_vec()),
            },
            64,
        );
        let adapter = NullAdapter;
        let mut peer = FixedPeer {
            to_read: b"+++\n".to_vec(),
        };
        assert!(shuttle.tick(&adapter, &mut peer));
    }

    #[test]
    fn exit_command_with_carriage_return_triggers_exit() {
        let mut shuttle = RawShuttle::new(
            RawTransportConfig {
                exit_cmd: Some(b"+++".to_vec()),
            },
            64,
        );
        let adapter = NullAdapter;
        let mut peer = FixedPeer {
            to_read: b"+++\r".to_vec(),
        };
        assert!(shuttle.tick(&adapter, &mut peer));
    }

    #[test]
    fn non_matching_line_does_not_exit() {
        let mut shuttle = RawShuttle::new(
            RawTransportConfig {
                exit_cmd: Some(b"+++".to_vec()),
            },
            64,
        );
        let adapter = NullAdapter;
        let mut peer = FixedPeer {
            to_read: b"hello\n".to_vec(),
        };
        assert!(!shuttle.tick(&adapter, &mut peer));
    }
}
