//! Tunable defaults and bounds, grounded on `jpe::config`'s `RangeInclusive`
//! bounds constants (`BAUD_BOUNDS`, `STEP_FREQ_BOUNDS`, ...) and on the
//! `AT_DEF_*`/`AT_*` `#define`s in `at_port.h`.

use crate::error::Error;

/// Default response-suffix success token.
pub const DEFAULT_SUFFIX_OK: &str = "OK";
/// Fixed error token; unlike the success suffix this is not configurable
/// (§4.3, §6: "the fixed error token is \"ERROR\"").
pub const ERROR_TOKEN: &str = "ERROR";
/// Default per-attempt command timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 500;
/// Default number of retries on error/timeout.
pub const DEFAULT_RETRY: u8 = 2;
/// Delay observed in the `RETRY` state before re-sending (§4.4).
pub const RETRY_DELAY_MS: u64 = 100;
/// Default URC frame receive timeout.
pub const DEFAULT_URC_TIMEOUT_MS: u64 = 500;
/// Default URC end-mark alphabet.
pub const DEFAULT_URC_END_MARKS: &str = ":,\n";
/// Minimum allowed response/URC buffer size; smaller requests are clamped up.
pub const MIN_BUFSIZE: usize = 32;
/// Default work queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;
/// Scratch buffer size for rendered commands / `println` output.
pub const SCRATCH_SIZE: usize = 256;
/// Default global memory ceiling.
pub const DEFAULT_MEM_LIMIT: usize = 3 * 1024;
/// Chunk size used by the raw transparent shuttle (§4.8).
pub const RAW_CHUNK_SIZE: usize = 32;
/// Chunk size the poller reads from the adapter each tick (§4.9).
pub const POLL_CHUNK_SIZE: usize = 64;

/// Manager-wide configuration, validated at build time by
/// [`AtManagerBuilder`](crate::builder::AtManagerBuilder).
#[derive(Debug, Clone)]
pub struct AtConfig {
    pub recv_bufsize: usize,
    pub urc_bufsize: usize,
    pub queue_capacity: usize,
    pub urc_end_marks: String,
    pub urc_timeout_ms: u64,
    pub mem_limit: usize,
}

impl Default for AtConfig {
    fn default() -> Self {
        Self {
            recv_bufsize: MIN_BUFSIZE,
            urc_bufsize: MIN_BUFSIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            urc_end_marks: DEFAULT_URC_END_MARKS.to_string(),
            urc_timeout_ms: DEFAULT_URC_TIMEOUT_MS,
            mem_limit: DEFAULT_MEM_LIMIT,
        }
    }
}

impl AtConfig {
    /// Clamp buffer sizes up to [`MIN_BUFSIZE`] and reject a zero queue
    /// capacity. Mirrors `at_obj_create`'s
    /// `adap->recv_bufsize < 32 ? 32 : adap->recv_bufsize` clamp, which never
    /// fails, alongside a from-scratch validation of the queue depth (the
    /// original has no equivalent check because `AT_LIST_WORK_COUNT` is a
    /// compile-time constant, not a runtime parameter).
    pub(crate) fn normalize(mut self) -> Result<Self, Error> {
        if self.recv_bufsize < MIN_BUFSIZE {
            self.recv_bufsize = MIN_BUFSIZE;
        }
        if self.urc_bufsize != 0 && self.urc_bufsize < MIN_BUFSIZE {
            self.urc_bufsize = MIN_BUFSIZE;
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.urc_end_marks.is_empty() {
            return Err(Error::InvalidConfig(
                "urc_end_marks must not be empty".to_string(),
            ));
        }
        Ok(self)
    }

    /// URC recognition is disabled entirely when the configured buffer is zero
    /// (§6: "urc_bufsize (bytes; 0 disables URC)").
    pub(crate) fn urc_enabled(&self) -> bool {
        self.urc_bufsize != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_small_buffers_up_to_minimum() {
        let cfg = AtConfig {
            recv_bufsize: 4,
            urc_bufsize: 4,
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(cfg.recv_bufsize, MIN_BUFSIZE);
        assert_eq!(cfg.urc_bufsize, MIN_BUFSIZE);
    }

    #[test]
    fn zero_urc_bufsize_stays_zero_and_disables_urc() {
        let cfg = AtConfig {
            urc_bufsize: 0,
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(cfg.urc_bufsize, 0);
        assert!(!cfg.urc_enabled());
    }

    #[test]
    fn rejects_zero_queue_capacity() {
        let cfg = AtConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(cfg.normalize().is_err());
    }
}
