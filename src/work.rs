//! Work items: the unit of scheduling the manager drives through its state
//! machines. Grounded on `at_chat.h` (`at_work_state`, `at_resp_code`,
//! `at_cmd_priority`, `at_attr_t`, `at_context_t`) and, for the tagged-payload
//! shape, on `jpe::transport::Command` (`allowed_mod`/`allowed_mode`/`payload`).

use std::fmt;

/// Outcome of a finished command (§4.4, §6). Mirrors `at_resp_code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Ok,
    Error,
    Timeout,
    Abort,
}

/// Lifecycle of a queued work item (§3, §4.9). Mirrors `at_work_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkState {
    Ready,
    Running,
    Finished,
    Aborted,
}

/// Queue priority (§3). Mirrors `at_cmd_priority`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    #[default]
    Low,
    High,
}

/// What a work item actually does once dispatched. Each variant routes to one
/// driver: `SingleLine`/`Command`/`CustomSender`/`RawBuffer` to
/// `state_machine::drive`, `MultiLine` to `multiline::drive`, `General` to
/// `generic::drive`. Replaces the original's single `at_work_t` struct plus a
/// `work_handler_table[]` dispatch keyed on a `work_type` enum — a tagged enum
/// lets the dispatch live in `match` rather than a function-pointer table.
pub enum WorkKind {
    /// A poll function driven directly against an [`crate::environment::Env`],
    /// with no response matching at all (`do_work_handler`).
    General(Box<dyn FnMut(&mut crate::environment::Env) -> bool + Send>),
    /// A single pre-rendered line, terminator appended by the driver.
    SingleLine(Vec<u8>),
    /// A formatted command, already rendered into bytes by the caller's
    /// `println`-style call (§6 ADDED: `std::fmt::Arguments`-based formatting
    /// rather than a printf-compatible micro-formatter).
    Command(Vec<u8>),
    /// Several lines sent one at a time, each awaiting its own response
    /// before the next is sent (`send_multiline_handler`).
    MultiLine(Vec<Vec<u8>>),
    /// A caller-supplied closure that writes the command bytes itself instead
    /// of handing the driver a pre-rendered buffer (`at_custom_cmd`).
    CustomSender(Box<dyn FnMut(&mut crate::environment::Env) + Send>),
    /// Raw bytes sent with no terminator appended (`at_send_data`).
    RawBuffer(Vec<u8>),
}

impl fmt::Debug for WorkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkKind::General(_) => f.write_str("General(..)"),
            WorkKind::SingleLine(b) => f.debug_tuple("SingleLine").field(b).finish(),
            WorkKind::Command(b) => f.debug_tuple("Command").field(b).finish(),
            WorkKind::MultiLine(b) => f.debug_tuple("MultiLine").field(b).finish(),
            WorkKind::CustomSender(_) => f.write_str("CustomSender(..)"),
            WorkKind::RawBuffer(b) => f.debug_tuple("RawBuffer").field(b).finish(),
        }
    }
}

/// Per-command tuning, mirrors `at_attr_t`.
#[derive(Debug, Clone)]
pub struct WorkAttributes {
    pub prefix: Option<Vec<u8>>,
    pub suffix: Vec<u8>,
    pub timeout_ms: u64,
    pub retry: u8,
    pub priority: Priority,
}

impl Default for WorkAttributes {
    fn default() -> Self {
        Self {
            prefix: None,
            suffix: crate::config::DEFAULT_SUFFIX_OK.as_bytes().to_vec(),
            timeout_ms: crate::config::DEFAULT_TIMEOUT_MS,
            retry: crate::config::DEFAULT_RETRY,
            priority: Priority::Low,
        }
    }
}

/// Generation-counted identity for a queued work item, handed back to the
/// caller on enqueue and used to look up its [`WorkContext`] later. Replaces
/// the original's "magic tag" revalidation of a raw `at_work_t*` handle
/// (§3 ADDED): there is no raw pointer to revalidate in safe Rust, so identity
/// is instead an opaque `(slot, generation)` pair that can never alias a
/// stale or recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkHandle {
    pub(crate) slot: usize,
    pub(crate) generation: u64,
}

/// Caller-visible mirror of a queued item's progress, returned by
/// `AtManager::context_of`. Mirrors `at_context_t`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkContext {
    pub state: WorkState,
    pub code: Option<ResponseCode>,
    pub response: Vec<u8>,
}

/// Debug-assert-only magic tag retained from the original's runtime-checked
/// `work_item_t.magic` field, now checked only in debug builds since a
/// `WorkHandle`'s generation already prevents stale lookups in release code.
pub(crate) const WORK_TAG: u32 = 0xA7_0C_0DE;

pub(crate) struct WorkItem {
    pub(crate) tag: u32,
    pub(crate) kind: WorkKind,
    pub(crate) attrs: WorkAttributes,
    pub(crate) state: WorkState,
    pub(crate) code: Option<ResponseCode>,
    pub(crate) response: Vec<u8>,
    pub(crate) generation: u64,
}

impl WorkItem {
    pub(crate) fn new(kind: WorkKind, attrs: WorkAttributes, generation: u64) -> Self {
        Self {
            tag: WORK_TAG,
            kind,
            attrs,
            state: WorkState::Ready,
            code: None,
            response: Vec::new(),
            generation,
        }
    }

    pub(crate) fn assert_tag(&self) {
        debug_assert_eq!(self.tag, WORK_TAG, "work item corrupted or reused");
    }

    pub(crate) fn context(&self) -> WorkContext {
        WorkContext {
            state: self.state,
            code: self.code,
            response: self.response.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_attributes_match_spec_defaults() {
        let attrs = WorkAttributes::default();
        assert_eq!(attrs.suffix, b"OK");
        assert_eq!(attrs.timeout_ms, 500);
        assert_eq!(attrs.retry, 2);
        assert_eq!(attrs.priority, Priority::Low);
    }

    #[test]
    fn new_work_item_starts_ready_with_valid_tag() {
        let item = WorkItem::new(
            WorkKind::SingleLine(b"AT\r\n".to_vec()),
            WorkAttributes::default(),
            1,
        );
        item.assert_tag();
        assert_eq!(item.state, WorkState::Ready);
        assert!(item.code.is_none());
    }
}
