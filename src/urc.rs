//! Two-phase unsolicited result code (URC) recognizer. Grounded on
//! `at_chat.c`'s `urc_recv_process`, `urc_handler_entry`,
//! `urc_timeout_process`, and `find_urc_item`.
//!
//! Recognition runs in two phases per URC: a *header* phase, which
//! accumulates bytes until one of the configured end marks is seen and then
//! looks up a subscription by prefix match, and a *payload* phase, entered
//! once a subscription's handler has requested more bytes, which accumulates
//! until the requested byte count is reached before invoking the handler
//! again.

use bytes::BytesMut;

use crate::adapter::Adapter;

/// Why a subscription's handler is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrcStatus {
    Ok,
    Timeout,
}

/// A URC subscription: an end mark plus a prefix to match against the header
/// phase, and a handler invoked once that prefix is recognized. Mirrors
/// `urc_item_t { prefix, endmark, handler }`.
///
/// The handler receives the bytes accumulated so far and returns how many
/// additional payload bytes it still wants: `0` means "done, go back to
/// header phase", any other value means "wait for that many more bytes, then
/// call me again" (`urc_handler_entry`'s nonzero-return branch).
pub struct UrcSubscription {
    pub prefix: Vec<u8>,
    pub end_mark: u8,
    pub handler: Box<dyn FnMut(UrcStatus, &[u8]) -> usize + Send>,
}

struct Inner {
    table: Vec<UrcSubscription>,
    buf: BytesMut,
    bufsize: usize,
    end_marks: Vec<u8>,
    matched: Option<usize>,
    in_payload: bool,
    target: usize,
    timeout_ms: u64,
    last_activity_ms: u64,
    enabled: bool,
    disabled_until_ms: u64,
}

pub(crate) struct UrcRecognizer(Inner);

impl UrcRecognizer {
    pub(crate) fn new(bufsize: usize, end_marks: &str, timeout_ms: u64) -> Self {
        Self(Inner {
            table: Vec::new(),
            buf: BytesMut::with_capacity(bufsize),
            bufsize,
            end_marks: end_marks.as_bytes().to_vec(),
            matched: None,
            in_payload: false,
            target: 0,
            timeout_ms,
            last_activity_ms: 0,
            enabled: true,
            disabled_until_ms: 0,
        })
    }

    pub(crate) fn subscribe(&mut self, sub: UrcSubscription) {
        self.0.table.push(sub);
    }

    /// Suppress URC recognition (still consumes bytes) until `now_ms +
    /// duration_ms`, mirrors `at_obj_urc_set_enable` used as a temporary
    /// guard around a command expected to produce URC-looking noise.
    pub(crate) fn disable_for(&mut self, now_ms: u64, duration_ms: u64) {
        self.0.disabled_until_ms = now_ms + duration_ms;
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.0.enabled = enabled;
    }

    fn reset(&mut self) {
        self.0.buf.clear();
        self.0.matched = None;
        self.0.in_payload = false;
        self.0.target = 0;
    }

    fn find(&self) -> Option<usize> {
        self.0.table.iter().position(|s| {
            !s.prefix.is_empty()
                && self
                    .0
                    .buf
                    .windows(s.prefix.len())
                    .any(|w| w == s.prefix.as_slice())
        })
    }

    /// Feed one newly-read byte. Returns `true` if it was consumed by URC
    /// recognition (so the caller's response matcher should not also see
    /// it), mirrors the per-byte loop body of `urc_recv_process`.
    pub(crate) fn feed_byte(&mut self, adapter: &dyn Adapter, now_ms: u64, byte: u8) -> bool {
        if !self.0.enabled || now_ms < self.0.disabled_until_ms {
            return false;
        }

        self.0.last_activity_ms = now_ms;

        if self.0.buf.len() + 1 >= self.0.bufsize {
            adapter.debug(format_args!("urc buffer overflow, discarding"));
            self.reset();
            return false;
        }
        self.0.buf.extend_from_slice(&[byte]);

        if self.0.in_payload {
            if self.0.buf.len() >= self.0.target {
                self.invoke(adapter, UrcStatus::Ok);
            }
            return true;
        }

        if !self.0.end_marks.contains(&byte) {
            return false;
        }

        if self.0.matched.is_none() {
            self.0.matched = self.find();
        }

        match self.0.matched {
            None => {
                adapter.debug(format_args!("unrecognized urc header, discarding"));
                self.reset();
                false
            }
            Some(idx) => {
                if self.0.table[idx].end_mark == byte {
                    self.invoke(adapter, UrcStatus::Ok);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn invoke(&mut self, adapter: &dyn Adapter, status: UrcStatus) {
        let Some(idx) = self.0.matched else {
            self.reset();
            return;
        };
        let remain = {
            let payload = self.0.buf.clone();
            let sub = &mut self.0.table[idx];
            (sub.handler)(status, &payload)
        };
        if remain > 0 {
            self.0.target = self.0.buf.len() + remain;
            self.0.in_payload = true;
        } else {
            adapter.debug(format_args!("urc handled"));
            self.reset();
        }
    }

    /// Called once per tick when no byte has arrived recently: fires a
    /// matched subscription's handler with `Timeout` if it has been
    /// recognized but stalled mid-payload, mirrors `urc_timeout_process`'s
    /// `urc_cnt > 2 && urc_item != NULL` guard, then always resets.
    pub(crate) fn poll_timeout(&mut self, adapter: &dyn Adapter, now_ms: u64) {
        if self.0.matched.is_none() || self.0.buf.len() <= 2 {
            return;
        }
        if now_ms.saturating_sub(self.0.last_activity_ms) < self.0.timeout_ms {
            return;
        }
        self.invoke(adapter, UrcStatus::Timeout);
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

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

    #[test]
    fn header_then_end_mark_dispatches_handler() {
        let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let mut urc = UrcRecognizer::new(64, ":,\n", 500);
        urc.subscribe(UrcSubscription {
            prefix: b"+CREG".to_vec(),
            end_mark: b'\n',
            handler: Box::new(move |_status, buf| {
                seen2.lock().unwrap().push(buf.to_vec());
                0
            }),
        });
        let adapter = NullAdapter;
        for &b in b"+CREG: 1\n" {
            urc.feed_byte(&adapter, 0, b);
        }
        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(seen.lock().unwrap()[0], b"+CREG: 1\n");
    }

    #[test]
    fn unrecognized_header_is_discarded() {
        let mut urc = UrcRecognizer::new(64, ":,\n", 500);
        let adapter = NullAdapter;
        for &b in b"+UNKNOWN\n" {
            urc.feed_byte(&adapter, 0, b);
        }
        assert!(urc.0.buf.is_empty());
    }

    #[test]
    fn disabled_window_ignores_bytes() {
        let mut urc = UrcRecognizer::new(64, ":,\n", 500);
        urc.disable_for(0, 1000);
        let adapter = NullAdapter;
        assert!(!urc.feed_byte(&adapter, 500, b'\n'));
    }
}
