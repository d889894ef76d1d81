//! Per-tick scratch state handed to work drivers and general-purpose work
//! closures. Grounded on `at_chat.h::at_env_t` and its companion helpers in
//! `at_chat.c` (`at_is_timeout`, `at_next_wait`, `find_substr`, `at_finish`,
//! `at_println`).

use std::fmt;

use crate::work::ResponseCode;

/// Mutable scratch state threaded through one work item's drivers across
/// poll ticks. `i`/`j` are raw loop/retry counters exactly as in the C
/// (`env->i`, `env->j`); giving them real names would invent structure the
/// original drivers don't have, since `do_cmd_handler` and
/// `send_multiline_handler` use them for unrelated purposes.
///
/// `timer_ms` backs the user-facing [`Env::reset_timer`]/[`Env::is_timeout`]
/// pair and is distinct from `deadline_ms`, the per-attempt deadline the
/// command drivers compute from `attrs.timeout_ms`; both values are copied in
/// fresh each tick by the manager and, for `timer_ms`, copied back out after
/// the driver runs so a user work closure's timer survives across ticks the
/// same way `obj_map(env->obj)->timer` persists on the C side.
pub struct Env<'a> {
    pub i: usize,
    pub j: usize,
    pub state: u32,
    pub params: &'a [u8],
    pub(crate) recvbuf: &'a [u8],
    pub(crate) now_ms: u64,
    pub(crate) deadline_ms: u64,
    pub(crate) timer_ms: u64,
    pub(crate) next_wait_ms: Option<u64>,
    pub(crate) disposing: bool,
    pub(crate) recvclr: bool,
    pub(crate) finished: Option<ResponseCode>,
    pub(crate) to_write: Vec<u8>,
}

impl<'a> Env<'a> {
    pub(crate) fn new(params: &'a [u8], recvbuf: &'a [u8], now_ms: u64, deadline_ms: u64) -> Self {
        Self {
            i: 0,
            j: 0,
            state: 0,
            params,
            recvbuf,
            now_ms,
            deadline_ms,
            timer_ms: now_ms,
            next_wait_ms: None,
            disposing: false,
            recvclr: false,
            finished: None,
            to_write: Vec::new(),
        }
    }

    /// Set the reusable timer's starting point (§6, distinct from the
    /// per-attempt command deadline), mirrors `at_reset_timer`.
    pub fn reset_timer(&mut self) {
        self.timer_ms = self.now_ms;
    }

    /// Render a formatted command line into the driver's write buffer,
    /// appending the `"\r\n"` terminator. Grounded on `at_chat.c::at_println`
    /// (`vsnprintf` into a scratch buffer, then write); uses
    /// `std::fmt::Arguments` rather than a printf-compatible formatter since
    /// nothing upstream needs `%d`/`%s` compatibility (§6 ADDED decision).
    pub fn println(&mut self, args: fmt::Arguments<'_>) {
        use std::fmt::Write as _;
        let mut scratch = String::with_capacity(crate::config::SCRATCH_SIZE);
        let _ = scratch.write_fmt(args);
        self.to_write.extend_from_slice(scratch.as_bytes());
        self.to_write.extend_from_slice(b"\r\n");
    }

    /// Queue raw bytes for the driver to write with no terminator appended,
    /// mirroring `at_send_data`.
    pub fn write_raw(&mut self, data: &[u8]) {
        self.to_write.extend_from_slice(data);
    }

    /// Bytes accumulated for the current attempt so far.
    pub fn recvbuf(&self) -> &[u8] {
        self.recvbuf
    }

    pub fn recvlen(&self) -> usize {
        self.recvbuf.len()
    }

    /// Request the receive buffer be cleared before the next tick, mirrors
    /// `recvbuf_clear`. `recvbuf()`/`recvlen()`/`contains()` keep seeing this
    /// attempt's bytes until then since the snapshot handed to a driver is
    /// immutable for the duration of one call.
    pub fn recvclr(&mut self) {
        self.recvclr = true;
    }

    /// Substring search over the accumulated response, mirrors `find_substr`.
    pub fn contains(&self, needle: &[u8]) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.recvbuf
            .windows(needle.len())
            .any(|window| window == needle)
    }

    /// True once `ms` have elapsed since the last [`Env::reset_timer`] call
    /// (or since work start, if never reset), mirrors `at_is_timeout`. This
    /// is the general-purpose timer exposed to user work handlers, distinct
    /// from the per-attempt command deadline the command drivers check
    /// internally.
    pub fn is_timeout(&self, ms: u64) -> bool {
        self.now_ms.saturating_sub(self.timer_ms) >= ms
    }

    /// True once the per-attempt command deadline has passed. Crate-internal:
    /// used by the command/multi-line drivers, which track their own timeout
    /// via `attrs.timeout_ms` rather than the user-facing reusable timer.
    pub(crate) fn deadline_elapsed(&self) -> bool {
        self.now_ms >= self.deadline_ms
    }

    /// Request the poller not revisit this work item until `ms` have passed,
    /// mirrors `at_next_wait`'s one-shot wait gate used by `do_work_handler`.
    pub fn next_wait(&mut self, ms: u64) {
        self.next_wait_ms = Some(ms);
    }

    /// Whether the manager is in the middle of destroying this item, mirrors
    /// `env->disposing`.
    pub fn disposing(&self) -> bool {
        self.disposing
    }

    /// Mark the work item finished with `code`, mirrors `at_finish`. A
    /// [`crate::work::WorkKind::General`] poll closure uses this to report a
    /// code other than the bool-return default (`Ok`/nothing yet); a
    /// [`crate::work::WorkKind::CustomSender`] closure, which also receives a
    /// live `&mut Env` from the command driver's `SEND` state, can use it the
    /// same way to end its own item outright instead of waiting on a matched
    /// response.
    pub fn finish(&mut self, code: ResponseCode) {
        self.finished = Some(code);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn println_appends_terminator() {
        let mut env = Env::new(b"", b"", 0, 500);
        env.println(format_args!("AT+CSQ={}", 5));
        assert_eq!(env.to_write, b"AT+CSQ=5\r\n");
    }

    #[test]
    fn contains_scans_recvbuf() {
        let env = Env::new(b"", b"hello OK world", 0, 500);
        assert!(env.contains(b"OK"));
        assert!(!env.contains(b"ERROR"));
    }

    #[test]
    fn deadline_elapsed_respects_deadline() {
        let mut env = Env::new(b"", b"", 100, 500);
        assert!(!env.deadline_elapsed());
        env.now_ms = 500;
        assert!(env.deadline_elapsed());
    }

    #[test]
    fn is_timeout_tracks_reset_timer() {
        let mut env = Env::new(b"", b"", 100, 10_000);
        assert!(!env.is_timeout(50));
        env.now_ms = 200;
        assert!(env.is_timeout(50));
        env.reset_timer();
        assert!(!env.is_timeout(50));
        env.now_ms = 260;
        assert!(env.is_timeout(50));
    }

    #[test]
    fn finish_records_the_given_code() {
        let mut env = Env::new(b"", b"", 0, 500);
        assert_eq!(env.finished, None);
        env.finish(ResponseCode::Timeout);
        assert_eq!(env.finished, Some(ResponseCode::Timeout));
    }
}
