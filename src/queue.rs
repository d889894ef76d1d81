//! Two-priority work queue and the memory-watch counter. Grounded on
//! `at_chat.c`'s `hlist`/`llist` priority queues (`list_cnt`,
//! `AT_LIST_WORK_COUNT`) and its `at_core_malloc`/`at_core_free` counting
//! allocator (`AT_MEM_LIMIT_SIZE`, `at_cur_used_memory`, `at_max_used_memory`).

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::adapter::Adapter;
use crate::error::{AtResult, Error};
use crate::work::{Priority, ResponseCode, WorkContext, WorkHandle, WorkItem, WorkState};

/// Counting allocator tracking bytes charged against work item payloads,
/// failing closed once a configured ceiling is reached. Mirrors
/// `at_core_malloc`'s `used_mem + size >= AT_MEM_LIMIT_SIZE` check.
#[derive(Debug)]
pub(crate) struct MemWatch {
    limit: usize,
    used: usize,
    peak: usize,
}

impl MemWatch {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            limit,
            used: 0,
            peak: 0,
        }
    }

    pub(crate) fn charge(&mut self, bytes: usize) -> Result<(), Error> {
        if self.used + bytes >= self.limit {
            return Err(Error::MemoryLimitExceeded {
                limit: self.limit,
                requested: bytes,
            });
        }
        self.used += bytes;
        self.peak = self.peak.max(self.used);
        Ok(())
    }

    pub(crate) fn release(&mut self, bytes: usize) {
        self.used = self.used.saturating_sub(bytes);
    }

    pub(crate) fn current(&self) -> usize {
        self.used
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak
    }
}

struct Slot {
    item: Option<WorkItem>,
    generation: u64,
    payload_len: usize,
}

struct Inner {
    slots: Vec<Slot>,
    high: VecDeque<usize>,
    low: VecDeque<usize>,
    capacity: usize,
    mem: MemWatch,
}

/// The manager's pending/running work, guarded by a [`std::sync::Mutex`]. The
/// original trusted the embedder's `lock`/`unlock` adapter hooks alone to
/// serialize access from producer threads against the single poller thread;
/// safe Rust has no equivalent of "the embedder promised to call lock() before
/// touching this" (§5 ADDED), so this also takes a real `Mutex` around every
/// mutation. `Adapter::lock`/`unlock` are still invoked around the same
/// critical sections so a real embedder's external synchronization (e.g. an
/// IRQ mask) keeps firing exactly where the original expected it to.
pub(crate) struct WorkQueue {
    inner: Mutex<Inner>,
}

fn is_reclaimable(slot: &Slot) -> bool {
    match &slot.item {
        None => true,
        Some(item) => matches!(item.state, WorkState::Finished | WorkState::Aborted),
    }
}

impl WorkQueue {
    pub(crate) fn new(capacity: usize, mem_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                high: VecDeque::new(),
                low: VecDeque::new(),
                capacity,
                mem: MemWatch::new(mem_limit),
            }),
        }
    }

    pub(crate) fn enqueue<A: Adapter + ?Sized>(
        &self,
        adapter: &A,
        item: WorkItem,
        payload_len: usize,
    ) -> AtResult<WorkHandle> {
        adapter.lock();
        let result = (|| {
            let mut inner = self.inner.lock().unwrap();
            if inner.high.len() + inner.low.len() >= inner.capacity {
                return Err(Error::QueueFull);
            }
            let priority = item.attrs.priority;
            let generation = item.generation;
            let slot = inner.slots.iter().position(is_reclaimable).unwrap_or(inner.slots.len());
            if slot == inner.slots.len() {
                inner.slots.push(Slot {
                    item: None,
                    generation: 0,
                    payload_len: 0,
                });
            } else if inner.slots[slot].item.is_some() {
                // Reclaiming a finished/aborted item the caller never
                // inspected after completion: release its charge first.
                let stale_len = inner.slots[slot].payload_len;
                inner.mem.release(stale_len);
            }
            inner.mem.charge(payload_len)?;
            inner.slots[slot].item = Some(item);
            inner.slots[slot].generation = generation;
            inner.slots[slot].payload_len = payload_len;
            match priority {
                Priority::High => inner.high.push_back(slot),
                Priority::Low => inner.low.push_back(slot),
            }
            Ok(WorkHandle { slot, generation })
        })();
        adapter.unlock();
        result
    }

    /// Pop the next item to run: high-priority queue drains before low,
    /// matching `at_work_process`'s "hlist then llist" cursor selection.
    pub(crate) fn pop_next<A: Adapter + ?Sized>(&self, adapter: &A) -> Option<WorkHandle> {
        adapter.lock();
        let mut inner = self.inner.lock().unwrap();
        let slot = inner.high.pop_front().or_else(|| inner.low.pop_front());
        let handle = slot.map(|slot| WorkHandle {
            slot,
            generation: inner.slots[slot].generation,
        });
        drop(inner);
        adapter.unlock();
        handle
    }

    pub(crate) fn with_item<R>(&self, handle: WorkHandle, f: impl FnOnce(&mut WorkItem) -> R) -> Option<R> {
        let mut inner = self.inner.lock().unwrap();
        let slot = inner.slots.get_mut(handle.slot)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.item.as_mut().map(f)
    }

    pub(crate) fn context_of(&self, handle: WorkHandle) -> Option<WorkContext> {
        let inner = self.inner.lock().unwrap();
        let slot = inner.slots.get(handle.slot)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.item.as_ref().map(WorkItem::context)
    }

    /// Explicitly discard a finished/aborted item before its slot would
    /// otherwise be lazily reclaimed by a future `enqueue`: releases its
    /// memory charge and invalidates `handle` immediately.
    pub(crate) fn discard(&self, handle: WorkHandle) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(slot) = inner.slots.get_mut(handle.slot) {
            if slot.generation == handle.generation {
                let payload_len = slot.payload_len;
                slot.item = None;
                slot.payload_len = 0;
                slot.generation = slot.generation.wrapping_add(1);
                inner.mem.release(payload_len);
            }
        }
    }

    /// Mark every queued and running item aborted, mirrors `at_work_abort_all`.
    pub(crate) fn abort_all<A: Adapter + ?Sized>(&self, adapter: &A) {
        adapter.lock();
        let mut inner = self.inner.lock().unwrap();
        for slot in inner.slots.iter_mut() {
            if let Some(item) = slot.item.as_mut() {
                item.state = WorkState::Aborted;
                item.code = Some(ResponseCode::Abort);
            }
        }
        drop(inner);
        adapter.unlock();
    }

    pub(crate) fn mem_used(&self) -> usize {
        self.inner.lock().unwrap().mem.current()
    }

    pub(crate) fn mem_peak(&self) -> usize {
        self.inner.lock().unwrap().mem.peak()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::work::{WorkAttributes, WorkKind};

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

    fn item(priority: Priority, generation: u64) -> WorkItem {
        WorkItem::new(
            WorkKind::SingleLine(b"AT\r\n".to_vec()),
            WorkAttributes {
                priority,
                ..Default::default()
            },
            generation,
        )
    }

    #[test]
    fn high_priority_drains_before_low() {
        let q = WorkQueue::new(4, 1024);
        let a = NullAdapter;
        q.enqueue(&a, item(Priority::Low, 1), 4).unwrap();
        let high = q.enqueue(&a, item(Priority::High, 2), 4).unwrap();
        let popped = q.pop_next(&a).unwrap();
        assert_eq!(popped, high);
    }

    #[test]
    fn queue_full_is_rejected() {
        let q = WorkQueue::new(1, 1024);
        let a = NullAdapter;
        q.enqueue(&a, item(Priority::Low, 1), 4).unwrap();
        assert!(matches!(q.enqueue(&a, item(Priority::Low, 2), 4), Err(Error::QueueFull)));
    }

    #[test]
    fn discarded_handle_becomes_stale() {
        let q = WorkQueue::new(4, 1024);
        let a = NullAdapter;
        let h = q.enqueue(&a, item(Priority::Low, 1), 4).unwrap();
        q.discard(h);
        assert!(q.context_of(h).is_none());
    }

    #[test]
    fn finished_slot_is_reclaimed_by_a_later_enqueue() {
        let q = WorkQueue::new(1, 1024);
        let a = NullAdapter;
        let first = q.enqueue(&a, item(Priority::Low, 1), 4).unwrap();
        q.pop_next(&a).unwrap();
        q.with_item(first, |i| i.state = WorkState::Finished);
        // The pending-queue count has already dropped to zero even though
        // the slot is still occupied by a finished item, so this succeeds by
        // reclaiming that slot rather than growing the slot table.
        let second = q.enqueue(&a, item(Priority::Low, 2), 4).unwrap();
        assert_eq!(second.slot, first.slot);
        assert!(q.context_of(first).is_none());
        assert!(q.context_of(second).is_some());
    }

    #[test]
    fn memory_limit_rejects_oversized_payload() {
        let q = WorkQueue::new(4, 8);
        let a = NullAdapter;
        assert!(q.enqueue(&a, item(Priority::Low, 1), 100).is_err());
    }
}
