//! Top-level manager: the cooperative poll loop tying the work queue, URC
//! recognizer, response matcher, and per-kind drivers together. Grounded on
//! `at_chat.c::at_obj_process`/`at_work_process` — one call per tick, no
//! blocking, no error ever returned across this boundary (errors are
//! reported per-command through [`ResponseCode`] and [`Adapter::error`]).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::adapter::Adapter;
use crate::config::{AtConfig, POLL_CHUNK_SIZE};
use crate::environment::Env;
use crate::generic;
use crate::matcher::ResponseMatcher;
use crate::multiline::{self, MultiLineDriver};
use crate::queue::WorkQueue;
use crate::raw::{RawPeer, RawShuttle, RawTransportConfig};
use crate::state_machine::{self, CmdDriver};
use crate::urc::{UrcRecognizer, UrcSubscription};
use crate::work::{Priority, ResponseCode, WorkAttributes, WorkContext, WorkHandle, WorkItem, WorkKind, WorkState};

enum DriverState {
    Cmd(CmdDriver),
    MultiLine(MultiLineDriver),
    General,
}

struct RunningItem {
    handle: WorkHandle,
    matcher: ResponseMatcher,
    driver: DriverState,
    deadline_ms: u64,
    timer_ms: u64,
    wait_until_ms: Option<u64>,
}

/// The manager. Generic over the embedder's [`Adapter`] implementation, the
/// same shape as `jpe::base::context::BaseContext<B: BufClear>`.
pub struct AtManager<A: Adapter> {
    adapter: A,
    config: AtConfig,
    queue: WorkQueue,
    urc: UrcRecognizer,
    current: Option<RunningItem>,
    raw: Option<RawShuttle>,
    next_generation: AtomicU64,
}

impl<A: Adapter> AtManager<A> {
    pub(crate) fn new(adapter: A, config: AtConfig) -> Self {
        let urc = UrcRecognizer::new(
            config.urc_bufsize.max(1),
            &config.urc_end_marks,
            config.urc_timeout_ms,
        );
        let queue = WorkQueue::new(config.queue_capacity, config.mem_limit);
        Self {
            adapter,
            config,
            queue,
            urc,
            current: None,
            raw: None,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Queue a single pre-rendered line, mirrors `at_send_singlline`.
    pub fn send_line(&self, line: impl Into<Vec<u8>>, attrs: WorkAttributes) -> crate::error::AtResult<WorkHandle> {
        self.enqueue(WorkKind::SingleLine(line.into()), attrs)
    }

    /// Queue a formatted command rendered via `std::fmt::Arguments`, mirrors
    /// `at_exec_cmd`/`at_println`. Callers building the line with `format!`
    /// should pass `format_args!(...)` directly rather than pre-rendering a
    /// `String`.
    pub fn send_command(&self, args: fmt::Arguments<'_>, attrs: WorkAttributes) -> crate::error::AtResult<WorkHandle> {
        use std::fmt::Write as _;
        let mut rendered = String::new();
        let _ = rendered.write_fmt(args);
        self.enqueue(WorkKind::Command(rendered.into_bytes()), attrs)
    }

    /// Queue several lines sent one at a time, mirrors `at_send_multiline`.
    pub fn send_multiline(&self, lines: Vec<Vec<u8>>, attrs: WorkAttributes) -> crate::error::AtResult<WorkHandle> {
        self.enqueue(WorkKind::MultiLine(lines), attrs)
    }

    /// Queue raw bytes with no terminator appended, mirrors `at_send_data`.
    pub fn send_raw(&self, data: Vec<u8>, attrs: WorkAttributes) -> crate::error::AtResult<WorkHandle> {
        self.enqueue(WorkKind::RawBuffer(data), attrs)
    }

    /// Queue a caller-driven sender, mirrors `at_custom_cmd`.
    pub fn send_custom(
        &self,
        sender: impl FnMut(&mut Env) + Send + 'static,
        attrs: WorkAttributes,
    ) -> crate::error::AtResult<WorkHandle> {
        self.enqueue(WorkKind::CustomSender(Box::new(sender)), attrs)
    }

    /// Queue a generic poll closure with no response matching, mirrors
    /// `at_do_work`.
    pub fn do_work(
        &self,
        poll: impl FnMut(&mut Env) -> bool + Send + 'static,
        priority: Priority,
    ) -> crate::error::AtResult<WorkHandle> {
        self.enqueue(
            WorkKind::General(Box::new(poll)),
            WorkAttributes {
                priority,
                ..Default::default()
            },
        )
    }

    fn enqueue(&self, kind: WorkKind, attrs: WorkAttributes) -> crate::error::AtResult<WorkHandle> {
        let payload_len = match &kind {
            WorkKind::SingleLine(b) | WorkKind::Command(b) | WorkKind::RawBuffer(b) => b.len(),
            WorkKind::MultiLine(lines) => lines.iter().map(Vec::len).sum(),
            WorkKind::General(_) | WorkKind::CustomSender(_) => 0,
        };
        let generation = self.next_generation_value();
        let item = WorkItem::new(kind, attrs, generation);
        self.queue.enqueue(&self.adapter, item, payload_len)
    }

    fn next_generation_value(&self) -> u64 {
        // Per-manager interior counter: `enqueue` only needs `&self` so the
        // manager can be shared across producer threads the same way
        // `Adapter::lock`/`unlock` are designed to be called from outside the
        // poller thread. An `AtomicU64` field instead of a process-global
        // `static` keeps the sequence scoped to this manager, so two
        // managers in the same process don't share generations.
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    pub fn context_of(&self, handle: WorkHandle) -> Option<WorkContext> {
        self.queue.context_of(handle)
    }

    /// Release a finished/aborted item's slot immediately instead of waiting
    /// for a future [`AtManager::send_line`]-family call to reclaim it
    /// lazily. `handle` is stale after this call.
    pub fn dispose(&mut self, handle: WorkHandle) {
        self.queue.discard(handle);
        if self.current.as_ref().is_some_and(|running| running.handle == handle) {
            self.current = None;
        }
    }

    /// Mark every queued and running item aborted, mirrors `at_work_abort_all`.
    pub fn abort_all(&mut self) {
        self.queue.abort_all(&self.adapter);
        self.current = None;
    }

    pub fn subscribe_urc(&mut self, sub: UrcSubscription) {
        self.urc.subscribe(sub);
    }

    pub fn set_urc_enabled(&mut self, enabled: bool) {
        self.urc.set_enabled(enabled);
    }

    pub fn disable_urc_for(&mut self, duration_ms: u64) {
        let now = self.adapter.now_ms();
        self.urc.disable_for(now, duration_ms);
    }

    /// Enter raw transparent mode, mirrors `at_raw_transport_enter`. While
    /// active, `process` only shuttles bytes between the adapter and `peer`
    /// and performs no command/URC processing.
    pub fn enter_raw(&mut self, config: RawTransportConfig) {
        self.raw = Some(RawShuttle::new(config, self.config.recv_bufsize));
    }

    /// Leave raw transparent mode, mirrors `at_raw_transport_exit`.
    pub fn exit_raw(&mut self) {
        self.raw = None;
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    /// Drive the raw shuttle for one tick. Only meaningful while
    /// [`AtManager::is_raw`] is `true`.
    pub fn process_raw<P: RawPeer>(&mut self, peer: &mut P) -> bool {
        match &mut self.raw {
            Some(shuttle) => shuttle.tick(&self.adapter, peer),
            None => false,
        }
    }

    /// Advance the manager by one tick: start the next queued item if none is
    /// running, read available bytes, feed the URC recognizer and the
    /// running item's matcher, then drive it forward. Mirrors
    /// `at_obj_process`/`at_work_process`, with one deliberate reordering:
    /// a newly selected cursor's `match_info_init`-equivalent reset runs
    /// before this tick's bytes are read, so a response that arrives in the
    /// same tick a command is sent is not immediately discarded by that
    /// reset (the original's single persistent `recvbuf` has no such
    /// conflict since it is never reset and read independently of cursor
    /// selection; the per-item matcher here needs this ordering instead).
    pub fn process(&mut self) {
        let now = self.adapter.now_ms();

        if self.current.is_none() {
            if let Some(handle) = self.queue.pop_next(&self.adapter) {
                self.start(handle, now);
            }
        }
        // Flush a pending send/retry (and its matcher reset) before this
        // tick's bytes are read, so a same-tick response is not immediately
        // discarded by the reset. Only command/multi-line drivers have a
        // send/retry phase to flush; a general work closure runs once per
        // tick like any other driver.
        if self.current_awaits_send() {
            self.step(now);
        }

        let mut chunk = [0u8; POLL_CHUNK_SIZE];
        let n = self.adapter.read(&mut chunk);

        if n == 0 {
            self.urc.poll_timeout(&self.adapter, now);
        }

        for &byte in &chunk[..n] {
            // Every byte goes to both recognizers unconditionally, mirrors
            // `urc_recv_process`/`resp_recv_process` both running off the same
            // read chunk: a URC's own bytes are not removed from the running
            // command's receive buffer.
            if self.config.urc_enabled() {
                self.urc.feed_byte(&self.adapter, now, byte);
            }
            if let Some(running) = &mut self.current {
                running.matcher.append(&[byte]);
            }
        }

        if self.current.is_some() {
            self.step(now);
        }
    }

    fn current_awaits_send(&self) -> bool {
        match self.current.as_ref().map(|r| &r.driver) {
            Some(DriverState::Cmd(driver)) => driver.state() != state_machine::CmdState::Recv,
            Some(DriverState::MultiLine(driver)) => driver.state() != state_machine::CmdState::Recv,
            _ => false,
        }
    }

    fn start(&mut self, handle: WorkHandle, now: u64) {
        let ready = self.queue.with_item(handle, |item| {
            item.assert_tag();
            // Only a still-`Ready` item is promoted to `Running`, mirrors
            // `at_work_process` only entering RUN when `state ==
            // AT_WORK_STAT_READY`. An item `abort_all` marked `Aborted`
            // while it sat queued is finalized here instead — it never gets
            // a driver, so nothing is ever written for it.
            if item.state != WorkState::Ready {
                return None;
            }
            item.state = WorkState::Running;
            Some(item.attrs.clone())
        });
        let Some(attrs) = ready.flatten() else { return };

        let driver = self.queue.with_item(handle, |item| match &item.kind {
            WorkKind::General(_) => DriverState::General,
            WorkKind::MultiLine(_) => DriverState::MultiLine(MultiLineDriver::new(&item.attrs)),
            _ => DriverState::Cmd(CmdDriver::new(&item.attrs)),
        });
        let Some(driver) = driver else { return };

        self.current = Some(RunningItem {
            handle,
            matcher: ResponseMatcher::new(self.config.recv_bufsize),
            driver,
            deadline_ms: now + attrs.timeout_ms,
            timer_ms: now,
            wait_until_ms: None,
        });
    }

    fn step(&mut self, now: u64) {
        let Some(running) = &mut self.current else { return };
        // Honor a pending `Env::next_wait` gate: skip driving this item
        // entirely until the requested delay has elapsed, mirrors
        // `at_next_wait`/`next_delay` in `do_work_handler`.
        if let Some(wait_until) = running.wait_until_ms {
            if now < wait_until {
                return;
            }
            running.wait_until_ms = None;
        }
        let handle = running.handle;

        let finished = self.queue.with_item(handle, |item| {
            if item.state == WorkState::Aborted {
                item.code = Some(ResponseCode::Abort);
                return Some(ResponseCode::Abort);
            }
            let running = self.current.as_mut().unwrap();
            // A command about to (re)send gets a fresh per-attempt deadline,
            // mirroring `reset_timer()` being called in the original's SEND
            // state; without this a timeout-triggered resend (which re-enters
            // SEND on the very next tick, with no RETRY delay) would see its
            // new attempt as already timed out.
            let about_to_send = match &running.driver {
                DriverState::Cmd(driver) => driver.state() == state_machine::CmdState::Send,
                DriverState::MultiLine(driver) => driver.state() == state_machine::CmdState::Send,
                DriverState::General => false,
            };
            if about_to_send {
                running.deadline_ms = now + item.attrs.timeout_ms;
            }
            let recvbuf_snapshot = running.matcher.bytes().to_vec();
            let mut env = Env::new(&[], &recvbuf_snapshot, now, running.deadline_ms);
            env.timer_ms = running.timer_ms;
            let result = match (&mut item.kind, &mut running.driver) {
                (WorkKind::General(poll), DriverState::General) => generic::drive(poll.as_mut(), &mut env),
                (WorkKind::MultiLine(lines), DriverState::MultiLine(driver)) => {
                    multiline::drive(lines, &item.attrs, driver, &mut running.matcher, &mut env, &self.adapter)
                }
                (kind, DriverState::Cmd(driver)) => {
                    state_machine::drive(kind, &item.attrs, driver, &mut running.matcher, &mut env, &self.adapter)
                }
                _ => unreachable!("driver state always matches work kind"),
            };
            // Carry the reusable timer and any wait/clear request back out of
            // the per-tick `Env`, which is otherwise discarded once this
            // closure returns.
            running.timer_ms = env.timer_ms;
            if let Some(ms) = env.next_wait_ms {
                running.wait_until_ms = Some(now + ms);
            }
            if env.recvclr {
                running.matcher.reset(false);
            }
            let result = result.or(env.finished);
            if let Some(code) = result {
                item.state = WorkState::Finished;
                item.code = Some(code);
                item.response = running.matcher.bytes().to_vec();
            }
            result
        });

        // The finished item stays in its slot, inspectable via `context_of`,
        // until a future `enqueue` call reclaims the slot (§3 ADDED: a
        // `WorkHandle` only goes stale once its slot is actually reused, not
        // the instant the item finishes).
        if finished.flatten().is_some() {
            self.current = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::AtManagerBuilder;
    use crate::transport::loopback::LoopbackAdapter;

    #[test]
    fn single_line_command_completes_on_ok() {
        let adapter = LoopbackAdapter::new();
        adapter.push_incoming(b"OK\r\n");
        let mut manager = AtManagerBuilder::new()
            .with_adapter(adapter)
            .build()
            .unwrap();
        let handle = manager.send_line(b"AT".to_vec(), WorkAttributes::default()).unwrap();
        for _ in 0..4 {
            manager.process();
        }
        let ctx = manager.context_of(handle).unwrap();
        assert_eq!(ctx.state, WorkState::Finished);
        assert_eq!(ctx.code, Some(ResponseCode::Ok));
    }

    #[test]
    fn error_response_with_no_retries_finishes_error() {
        let adapter = LoopbackAdapter::new();
        adapter.push_incoming(b"ERROR\r\n");
        let mut manager = AtManagerBuilder::new()
            .with_adapter(adapter)
            .build()
            .unwrap();
        let attrs = WorkAttributes {
            retry: 0,
            ..Default::default()
        };
        let handle = manager.send_line(b"AT".to_vec(), attrs).unwrap();
        for _ in 0..4 {
            manager.process();
        }
        let ctx = manager.context_of(handle).unwrap();
        assert_eq!(ctx.state, WorkState::Finished);
        assert_eq!(ctx.code, Some(ResponseCode::Error));
    }

    #[test]
    fn retry_then_success_resends_and_finishes_ok() {
        let adapter = LoopbackAdapter::new();
        adapter.push_incoming(b"ERROR\r\n");
        let mut manager = AtManagerBuilder::new()
            .with_adapter(adapter)
            .build()
            .unwrap();
        let attrs = WorkAttributes {
            retry: 1,
            ..Default::default()
        };
        let handle = manager.send_line(b"AT".to_vec(), attrs).unwrap();

        // Drive until the 100 ms RETRY delay has elapsed and the command has
        // actually been re-sent (two "AT\r\n" writes observed), then supply
        // the successful response. A fake clock advancing 10ms/tick needs
        // ~12 ticks to clear the 100ms retry delay after the first error.
        for _ in 0..15 {
            manager.process();
        }
        let written = manager.adapter().written();
        assert_eq!(written.windows(4).filter(|w| *w == b"AT\r\n").count(), 2);

        manager.adapter().push_incoming(b"OK\r\n");
        for _ in 0..4 {
            manager.process();
        }
        let ctx = manager.context_of(handle).unwrap();
        assert_eq!(ctx.state, WorkState::Finished);
        assert_eq!(ctx.code, Some(ResponseCode::Ok));
    }

    #[test]
    fn abort_all_before_start_finalizes_without_sending() {
        let adapter = LoopbackAdapter::new();
        let mut manager = AtManagerBuilder::new()
            .with_adapter(adapter)
            .build()
            .unwrap();
        let handle = manager.send_line(b"AT".to_vec(), WorkAttributes::default()).unwrap();
        manager.abort_all();
        manager.process();
        assert!(manager.adapter().written().is_empty());
        let ctx = manager.context_of(handle).unwrap();
        assert_eq!(ctx.state, WorkState::Aborted);
        assert_eq!(ctx.code, Some(ResponseCode::Abort));
    }

    #[test]
    fn urc_bytes_stay_in_the_running_commands_buffer() {
        let adapter = LoopbackAdapter::new();
        adapter.push_incoming(b"+CREG: 0,1\r\nOK\r\n");
        let mut manager = AtManagerBuilder::new()
            .with_adapter(adapter)
            .build()
            .unwrap();
        manager.subscribe_urc(UrcSubscription {
            prefix: b"+CREG".to_vec(),
            end_mark: b'\n',
            handler: Box::new(|_status, _buf| 0),
        });
        let handle = manager.send_line(b"AT".to_vec(), WorkAttributes::default()).unwrap();
        for _ in 0..4 {
            manager.process();
        }
        let ctx = manager.context_of(handle).unwrap();
        assert_eq!(ctx.state, WorkState::Finished);
        assert_eq!(ctx.code, Some(ResponseCode::Ok));
        assert_eq!(ctx.response, b"+CREG: 0,1\r\nOK\r\n");
    }
}
