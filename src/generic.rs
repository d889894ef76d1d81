//! Generic work driver: runs a user poll closure against an [`Env`] with no
//! response matching of its own. Grounded on `at_chat.c::do_work_handler`
//! and its `next_delay` one-shot wait gate.

use crate::environment::Env;
use crate::work::ResponseCode;

/// Advance one tick. The closure returns `true` once its work is done.
/// Mirrors `do_work_handler`'s direct call into the caller-supplied function
/// pointer, finishing the item the moment it reports completion.
pub(crate) fn drive(
    poll: &mut (dyn FnMut(&mut Env) -> bool + Send),
    env: &mut Env,
) -> Option<ResponseCode> {
    let done = poll(env);
    if let Some(code) = env.finished {
        return Some(code);
    }
    if done {
        Some(ResponseCode::Ok)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finishes_once_closure_reports_done() {
        let mut calls = 0;
        let mut poll = move |_: &mut Env| {
            calls += 1;
            calls >= 3
        };
        let mut env = Env::new(b"", b"", 0, 500);
        assert!(drive(&mut poll, &mut env).is_none());
        assert!(drive(&mut poll, &mut env).is_none());
        assert_eq!(drive(&mut poll, &mut env), Some(ResponseCode::Ok));
    }

    #[test]
    fn next_wait_requests_a_delay() {
        let mut poll = |env: &mut Env| {
            env.next_wait(250);
            false
        };
        let mut env = Env::new(b"", b"", 0, 500);
        drive(&mut poll, &mut env);
        assert_eq!(env.next_wait_ms, Some(250));
    }
}
