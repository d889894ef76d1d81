//! SEND → RECV → RETRY driver for single-line, formatted-command,
//! custom-sender, and raw-buffer work (§4.4). Grounded on
//! `at_chat.c::do_cmd_handler`.
//!
//! The literal C only enforces "error wins" when retries are exhausted: the
//! error branch returns early with `AT_RESP_ERROR` in that case, but when
//! retries remain it sets `state = RETRY` and then falls through into a
//! separate, unconditional suffix check that can still finish the command
//! with `AT_RESP_OK` on the same tick. This driver implements the
//! specification's corrected rule instead — the error mask is checked first
//! and always short-circuits the suffix check on the same tick, independent
//! of whether retries remain (§9 Open Question decision, see `DESIGN.md`).

use crate::adapter::{Adapter, ErrorEvent};
use crate::environment::Env;
use crate::matcher::ResponseMatcher;
use crate::work::{ResponseCode, WorkAttributes, WorkKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmdState {
    Send,
    Recv,
    Retry,
}

pub(crate) struct CmdDriver {
    state: CmdState,
    retries_left: u8,
    retry_deadline_ms: u64,
}

impl CmdDriver {
    pub(crate) fn state(&self) -> CmdState {
        self.state
    }

    pub(crate) fn new(attrs: &WorkAttributes) -> Self {
        Self {
            state: CmdState::Send,
            retries_left: attrs.retry,
            retry_deadline_ms: 0,
        }
    }
}

/// Advance one tick. Returns `Some(code)` once the command has finished.
///
/// Error and timeout resends are deliberately asymmetric, mirroring
/// `do_cmd_handler`: an error token schedules a 100 ms `RETRY` delay before
/// re-sending, while a bare timeout goes straight back to `SEND` on the very
/// next tick with no delay.
pub(crate) fn drive<A: Adapter + ?Sized>(
    kind: &mut WorkKind,
    attrs: &WorkAttributes,
    driver: &mut CmdDriver,
    matcher: &mut ResponseMatcher,
    env: &mut Env,
    adapter: &A,
) -> Option<ResponseCode> {
    match driver.state {
        CmdState::Send => {
            matcher.reset(attrs.prefix.is_some());
            send(kind, env, adapter);
            env.next_wait(0);
            driver.state = CmdState::Recv;
            None
        }
        CmdState::Retry => {
            if env.now_ms >= driver.retry_deadline_ms {
                driver.state = CmdState::Send;
            }
            None
        }
        CmdState::Recv => {
            let mask = matcher.scan(attrs.prefix.as_deref(), &attrs.suffix);

            if mask.error {
                if driver.retries_left == 0 {
                    adapter.error(ErrorEvent {
                        code: ResponseCode::Error,
                        recvbuf: matcher.bytes(),
                    });
                    return Some(ResponseCode::Error);
                }
                driver.retries_left -= 1;
                driver.state = CmdState::Retry;
                driver.retry_deadline_ms = env.now_ms + crate::config::RETRY_DELAY_MS;
                return None;
            }

            if mask.suffix {
                return Some(ResponseCode::Ok);
            }

            if env.deadline_elapsed() {
                if driver.retries_left == 0 {
                    adapter.error(ErrorEvent {
                        code: ResponseCode::Timeout,
                        recvbuf: matcher.bytes(),
                    });
                    return Some(ResponseCode::Timeout);
                }
                driver.retries_left -= 1;
                driver.state = CmdState::Send;
            }

            None
        }
    }
}

fn send<A: Adapter + ?Sized>(kind: &mut WorkKind, env: &mut Env, adapter: &A) {
    match kind {
        WorkKind::SingleLine(bytes) | WorkKind::Command(bytes) => {
            env.write_raw(bytes);
            env.write_raw(b"\r\n");
        }
        WorkKind::RawBuffer(bytes) => {
            env.write_raw(bytes);
        }
        WorkKind::CustomSender(send_fn) => {
            send_fn(env);
        }
        WorkKind::General(_) | WorkKind::MultiLine(_) => {
            unreachable!("generic and multi-line work never enters the command driver")
        }
    }
    if !env.to_write.is_empty() {
        adapter.write(&env.to_write);
        env.to_write.clear();
    }
}
