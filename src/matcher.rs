//! Response accumulation and matching. Grounded on `at_chat.c`'s
//! `resp_recv_process` (append-with-overflow-reset) and `do_cmd_handler`'s
//! RECV-state scan (`strstr` for prefix, suffix-from-prefix-or-start, and an
//! independent whole-buffer scan for the fixed `"ERROR"` token), plus
//! `jpe::transport::Connection::read_buf`'s use of `bytes::BytesMut` as the
//! accumulation buffer.

use bytes::BytesMut;

use crate::config::ERROR_TOKEN;

/// Which of the three tokens have matched against the accumulated buffer so
/// far this attempt. Mirrors `at_chat.c`'s `MATCH_MASK_PREFIX`/`_SUFFIX`/`_ERR`
/// bits on `match_mask`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MatchMask {
    pub(crate) prefix: bool,
    pub(crate) suffix: bool,
    pub(crate) error: bool,
}

/// Accumulates response bytes for the current command attempt and scans them
/// for prefix/suffix/error tokens.
pub(crate) struct ResponseMatcher {
    buf: BytesMut,
    bufsize: usize,
    mask: MatchMask,
    match_len: usize,
}

impl ResponseMatcher {
    pub(crate) fn new(bufsize: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(bufsize),
            bufsize,
            mask: MatchMask::default(),
            match_len: 0,
        }
    }

    /// Reset accumulation state for a new attempt, matching
    /// `match_info_init`: an absent prefix is treated as already matched so
    /// the suffix scan starts from the buffer head immediately.
    pub(crate) fn reset(&mut self, has_prefix: bool) {
        self.buf.clear();
        self.match_len = 0;
        self.mask = MatchMask {
            prefix: !has_prefix,
            suffix: false,
            error: false,
        };
    }

    pub(crate) fn recv_len(&self) -> usize {
        self.buf.len()
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Append newly read bytes, matching `resp_recv_process`: on overflow the
    /// whole buffer is discarded and accumulation restarts from empty rather
    /// than truncating or growing unbounded.
    pub(crate) fn append(&mut self, data: &[u8]) {
        if self.buf.len() + data.len() >= self.bufsize {
            self.buf.clear();
            self.match_len = 0;
        }
        self.buf.extend_from_slice(data);
    }

    /// Re-scan the buffer for prefix/suffix/error tokens, only when new bytes
    /// have arrived since the last scan (`match_len != recv_cnt` in the C).
    /// Mirrors `do_cmd_handler`'s scan order exactly: prefix first (if not
    /// already matched), then suffix searched from the prefix position (or
    /// buffer start if there is no prefix), then an *independent* scan of the
    /// whole buffer for the error token regardless of whether prefix/suffix
    /// matched this round.
    pub(crate) fn scan(&mut self, prefix: Option<&[u8]>, suffix: &[u8]) -> MatchMask {
        if self.match_len == self.buf.len() {
            return self.mask;
        }
        self.match_len = self.buf.len();

        let mut prefix_at = 0usize;
        if !self.mask.prefix {
            if let Some(p) = prefix {
                if let Some(pos) = find(&self.buf, p) {
                    self.mask.prefix = true;
                    prefix_at = pos + p.len();
                }
            }
        }

        if self.mask.prefix {
            let start = if prefix.is_some() { prefix_at } else { 0 };
            if find(&self.buf[start..], suffix).is_some() {
                self.mask.suffix = true;
            }
        }

        if find(&self.buf, ERROR_TOKEN.as_bytes()).is_some() {
            self.mask.error = true;
        }

        self.mask
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_alone_matches_when_no_prefix_configured() {
        let mut m = ResponseMatcher::new(64);
        m.reset(false);
        m.append(b"OK\r\n");
        let mask = m.scan(None, b"OK");
        assert!(mask.prefix);
        assert!(mask.suffix);
        assert!(!mask.error);
    }

    #[test]
    fn prefix_gates_suffix_search() {
        let mut m = ResponseMatcher::new(64);
        m.reset(true);
        m.append(b"garbageOK");
        let mask = m.scan(Some(b"+CSQ"), b"OK");
        assert!(!mask.prefix);
        assert!(!mask.suffix);

        m.append(b"+CSQ: 10,99\r\nOK\r\n");
        let mask = m.scan(Some(b"+CSQ"), b"OK");
        assert!(mask.prefix);
        assert!(mask.suffix);
    }

    #[test]
    fn error_token_detected_independent_of_prefix_state() {
        let mut m = ResponseMatcher::new(64);
        m.reset(true);
        m.append(b"ERROR\r\n");
        let mask = m.scan(Some(b"+CSQ"), b"OK");
        assert!(!mask.prefix);
        assert!(mask.error);
    }

    #[test]
    fn overflow_resets_accumulation() {
        let mut m = ResponseMatcher::new(8);
        m.reset(false);
        m.append(b"1234567890");
        assert!(m.recv_len() < 10);
    }
}
