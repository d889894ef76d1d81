//! Capability interface the manager drives the physical link and its embedding
//! environment through (§4.1, §6). Grounded on `jpe::transport::{Transport, BufClear}`:
//! the teacher splits "can transact a framed command" from "can clear its buffers"
//! across two small traits implemented for concrete transports (`SerialPort`,
//! `TcpStream`). This port keeps the same shape — a small trait, implemented for
//! whatever concrete transport the embedder supplies — but collapses it to the one
//! capability bundle the original C `at_adapter_t` describes, since unlike the
//! teacher's request/response framing, the core here owns its own buffering
//! (`matcher::ResponseMatcher`, `urc::UrcRecognizer`) and only needs raw I/O.

use crate::work::ResponseCode;

/// A response snapshot passed to [`Adapter::error`] when a command finishes in
/// `error` or `timeout`.
#[derive(Debug, Clone, Copy)]
pub struct ErrorEvent<'a> {
    pub code: ResponseCode,
    pub recvbuf: &'a [u8],
}

/// The embedder-supplied capability bundle: byte I/O, an optional cross-thread
/// lock, a monotonic clock, and optional error/debug sinks.
///
/// All methods take `&self` rather than `&mut self`: the original C adapter's
/// `lock`/`unlock`/`write`/`read` fields are plain free functions with no object
/// state of their own (a global OS mutex, a UART register push), and modeling
/// them the same way here lets a manager hand out cheap `Arc<A>` clones to
/// producer threads that only ever call [`Adapter::lock`]/[`Adapter::unlock`],
/// while the poller thread's exclusive `&mut AtManager` borrow keeps `write`/
/// `read` effectively single-writer in practice.
pub trait Adapter: Send + Sync {
    /// Write as many bytes as can be accepted right now without blocking.
    fn write(&self, buf: &[u8]) -> usize;

    /// Read as many bytes as are available right now without blocking. `0`
    /// means "nothing available", not EOF.
    fn read(&self, buf: &mut [u8]) -> usize;

    /// Monotonic milliseconds since an arbitrary epoch, used for all timeout
    /// and retry-delay arithmetic.
    fn now_ms(&self) -> u64;

    /// Acquire the optional cross-thread lock guarding queue mutations.
    /// Default: no-op (no lock required).
    fn lock(&self) {}

    /// Release the lock acquired by [`Adapter::lock`].
    fn unlock(&self) {}

    /// Invoked once per command that finishes in `error` or `timeout`.
    /// Default: no-op.
    fn error(&self, _event: ErrorEvent<'_>) {}

    /// Trace sink for the manager's internal trace points. Default: no-op.
    /// Enable the `logging` feature to additionally forward these to `log::debug!`.
    fn debug(&self, _args: std::fmt::Arguments<'_>) {}
}

/// Convenience macro mirroring the original's `AT_DEBUG(ai, fmt, args...)`.
macro_rules! at_debug {
    ($adapter:expr, $($arg:tt)*) => {
        $adapter.debug(format_args!($($arg)*))
    };
}
pub(crate) use at_debug;

/// An [`Adapter`] wrapper that forwards every [`Adapter::debug`] call to both the
/// wrapped adapter's own sink and `log::debug!`. Grounded on `rrddmma`'s use of
/// the `log` crate for exactly this kind of ambient tracing; gated behind the
/// `logging` feature so adapters that don't want a `log` dependency pay nothing.
#[cfg(feature = "logging")]
#[derive(Debug)]
pub struct LoggingAdapter<A>(pub A);

#[cfg(feature = "logging")]
impl<A: Adapter> Adapter for LoggingAdapter<A> {
    fn write(&self, buf: &[u8]) -> usize {
        self.0.write(buf)
    }
    fn read(&self, buf: &mut [u8]) -> usize {
        self.0.read(buf)
    }
    fn now_ms(&self) -> u64 {
        self.0.now_ms()
    }
    fn lock(&self) {
        self.0.lock()
    }
    fn unlock(&self) {
        self.0.unlock()
    }
    fn error(&self, event: ErrorEvent<'_>) {
        self.0.error(event)
    }
    fn debug(&self, args: std::fmt::Arguments<'_>) {
        log::debug!("{}", args);
        self.0.debug(args);
    }
}
