//! Multi-line command driver: sends several lines one at a time, each
//! awaiting its own response before the next is sent. Grounded on
//! `at_chat.c::send_multiline_handler` (index `i`, per-step retry counter
//! `j`, the `cmds[i] == NULL` terminal check, the `env->params`-as-success-flag
//! trick).
//!
//! Unlike the single-line driver, a per-line timeout ends the whole sequence
//! immediately rather than retrying, and exhausting a line's retries moves on
//! to the next line rather than failing the sequence — only the final
//! completion code depends on whether any line ever succeeded.

use crate::adapter::{Adapter, ErrorEvent};
use crate::environment::Env;
use crate::matcher::ResponseMatcher;
use crate::work::{ResponseCode, WorkAttributes};

use crate::state_machine::CmdState;

pub(crate) struct MultiLineDriver {
    index: usize,
    state: CmdState,
    step_retries: u8,
    retry_deadline_ms: u64,
    succeeded_any: bool,
}

impl MultiLineDriver {
    pub(crate) fn state(&self) -> CmdState {
        self.state
    }

    pub(crate) fn new(_attrs: &WorkAttributes) -> Self {
        Self {
            index: 0,
            state: CmdState::Send,
            step_retries: 0,
            retry_deadline_ms: 0,
            succeeded_any: false,
        }
    }
}

/// Advance one tick against `lines[driver.index]`. Returns `Some(code)` once
/// every line has been attempted: `Ok` if at least one line ever succeeded,
/// `Error` if none did, or `Timeout` the moment any single line's per-attempt
/// timeout elapses (no retry on timeout, unlike the single-line driver).
pub(crate) fn drive<A: Adapter + ?Sized>(
    lines: &[Vec<u8>],
    attrs: &WorkAttributes,
    driver: &mut MultiLineDriver,
    matcher: &mut ResponseMatcher,
    env: &mut Env,
    adapter: &A,
) -> Option<ResponseCode> {
    match driver.state {
        CmdState::Send => {
            if driver.index >= lines.len() {
                return Some(if driver.succeeded_any {
                    ResponseCode::Ok
                } else {
                    ResponseCode::Error
                });
            }
            matcher.reset(attrs.prefix.is_some());
            let line = &lines[driver.index];
            env.write_raw(line);
            env.write_raw(b"\r\n");
            adapter.write(&env.to_write);
            env.to_write.clear();
            driver.state = CmdState::Recv;
            None
        }
        CmdState::Recv => {
            let mask = matcher.scan(attrs.prefix.as_deref(), &attrs.suffix);

            if mask.suffix {
                driver.index += 1;
                driver.step_retries = 0;
                driver.succeeded_any = true;
                driver.state = CmdState::Send;
                return None;
            }

            if mask.error {
                adapter.debug(format_args!(
                    "multiline step {} failed, retry {}",
                    driver.index, driver.step_retries
                ));
                driver.step_retries += 1;
                if driver.step_retries >= attrs.retry {
                    driver.index += 1;
                    driver.step_retries = 0;
                    driver.state = CmdState::Send;
                } else {
                    driver.state = CmdState::Retry;
                    driver.retry_deadline_ms = env.now_ms + crate::config::RETRY_DELAY_MS;
                }
                return None;
            }

            if env.deadline_elapsed() {
                adapter.error(ErrorEvent {
                    code: ResponseCode::Timeout,
                    recvbuf: matcher.bytes(),
                });
                return Some(ResponseCode::Timeout);
            }

            None
        }
        CmdState::Retry => {
            if env.now_ms >= driver.retry_deadline_ms {
                driver.state = CmdState::Send;
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::Priority;

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

    fn attrs() -> WorkAttributes {
        WorkAttributes {
            prefix: None,
            suffix: b"OK".to_vec(),
            timeout_ms: 500,
            retry: 1,
            priority: Priority::Low,
        }
    }

    #[test]
    fn advances_through_each_line_on_success() {
        let attrs = attrs();
        let lines = vec![b"AT".to_vec(), b"AT+CSQ".to_vec()];
        let mut driver = MultiLineDriver::new(&attrs);
        let mut matcher = ResponseMatcher::new(64);
        let adapter = NullAdapter;

        let mut env = Env::new(b"", b"", 0, 500);
        drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);
        matcher.append(b"OK\r\n");
        let snapshot = matcher.bytes().to_vec();
        let mut env = Env::new(b"", &snapshot, 10, 500);
        assert!(drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter).is_none());
        assert_eq!(driver.index, 1);

        let mut env = Env::new(b"", b"", 10, 510);
        drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);
        matcher.append(b"OK\r\n");
        let snapshot = matcher.bytes().to_vec();
        let mut env = Env::new(b"", &snapshot, 20, 510);
        assert!(drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter).is_none());
        assert_eq!(driver.index, 2);

        // index now equals lines.len(); the next SEND-state tick is what
        // actually reports completion, mirroring the `cmds[i] == NULL` check
        // running at the top of the C loop rather than inline in the
        // suffix-match branch.
        let mut env = Env::new(b"", b"", 20, 510);
        let result = drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);
        assert_eq!(result, Some(ResponseCode::Ok));
    }

    #[test]
    fn error_retries_same_line_then_moves_on_with_overall_error() {
        let mut attrs = attrs();
        attrs.retry = 2;
        let lines = vec![b"AT".to_vec()];
        let mut driver = MultiLineDriver::new(&attrs);
        let mut matcher = ResponseMatcher::new(64);
        let adapter = NullAdapter;

        let mut env = Env::new(b"", b"", 0, 500);
        drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);
        matcher.append(b"ERROR\r\n");
        let snapshot = matcher.bytes().to_vec();
        let mut env = Env::new(b"", &snapshot, 10, 500);
        assert!(drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter).is_none());
        assert_eq!(driver.index, 0);
        assert_eq!(driver.state, CmdState::Retry);

        let mut env = Env::new(b"", b"", 120, 500);
        assert!(drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter).is_none());
        assert_eq!(driver.state, CmdState::Send);

        drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);
        matcher.append(b"ERROR\r\n");
        let snapshot = matcher.bytes().to_vec();
        let mut env = Env::new(b"", &snapshot, 130, 500);
        let result = drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);
        assert!(result.is_none());
        assert_eq!(driver.index, 1);

        let result = drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);
        assert_eq!(result, Some(ResponseCode::Error));
    }

    #[test]
    fn per_line_timeout_ends_the_whole_sequence_with_no_retry() {
        let attrs = attrs();
        let lines = vec![b"AT".to_vec(), b"AT+CSQ".to_vec()];
        let mut driver = MultiLineDriver::new(&attrs);
        let mut matcher = ResponseMatcher::new(64);
        let adapter = NullAdapter;

        let mut env = Env::new(b"", b"", 0, 500);
        drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);

        let snapshot = matcher.bytes().to_vec();
        let mut env = Env::new(b"", &snapshot, 500, 500);
        let result = drive(&lines, &attrs, &mut driver, &mut matcher, &mut env, &adapter);
        assert_eq!(result, Some(ResponseCode::Timeout));
    }
}
