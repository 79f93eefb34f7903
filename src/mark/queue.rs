//! Per-worker bounded mark queues with work-stealing, a global overflow mark
//! stack, and the coarser region stack overflow promotes into (component
//! C6's queueing machinery). Grounded on `scheduler/scheduler.rs`'s
//! `crossbeam::deque::Injector`/`Worker`/`Stealer` usage for the teacher's
//! own work-stealing task queues.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam::deque::{Injector, Steal, Stealer, Worker};

use crate::util::address::Address;

/// A local queue holds at most this many entries before a push overflows a
/// batch to the global mark stack.
const LOCAL_QUEUE_CAPACITY: usize = 256;
/// How many entries move to the global stack in one overflow transfer.
const OVERFLOW_BATCH: usize = 64;
/// The global mark stack is considered overflown once it holds this many
/// entries; `has_overflown` is then set and the next overflow-handling pass
/// promotes to the coarser region stack.
const GLOBAL_MARK_STACK_CAPACITY: usize = 4096;

/// One worker's local gray-object queue.
pub struct WorkerMarkQueue {
    local: Worker<Address>,
}

impl WorkerMarkQueue {
    fn new() -> Self {
        WorkerMarkQueue {
            local: Worker::new_lifo(),
        }
    }

    pub fn stealer(&self) -> Stealer<Address> {
        self.local.stealer()
    }

    /// Push locally. Returns `false` if the queue is already at capacity;
    /// the caller must overflow a batch to the global stack first.
    fn try_push(&self, addr: Address) -> bool {
        if self.local.len() >= LOCAL_QUEUE_CAPACITY {
            return false;
        }
        self.local.push(addr);
        true
    }

    pub fn pop(&self) -> Option<Address> {
        self.local.pop()
    }

    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    fn drain_batch(&self, n: usize) -> Vec<Address> {
        let mut batch = Vec::with_capacity(n);
        for _ in 0..n {
            match self.local.pop() {
                Some(addr) => batch.push(addr),
                None => break,
            }
        }
        batch
    }
}

/// The complete queueing apparatus for one marking cycle: `num_workers`
/// local queues plus their stealers, a global overflow stack, and the
/// region stack used to replay work after a global overflow.
pub struct MarkQueueSet {
    queues: Vec<WorkerMarkQueue>,
    global: Injector<Address>,
    global_len: AtomicUsize,
    has_overflown: AtomicBool,
    region_stack: Mutex<Vec<(Address, Address)>>,
}

impl MarkQueueSet {
    pub fn new(num_workers: usize) -> Self {
        MarkQueueSet {
            queues: (0..num_workers.max(1)).map(|_| WorkerMarkQueue::new()).collect(),
            global: Injector::new(),
            global_len: AtomicUsize::new(0),
            has_overflown: AtomicBool::new(false),
            region_stack: Mutex::new(Vec::new()),
        }
    }

    pub fn num_workers(&self) -> usize {
        self.queues.len()
    }

    fn push_global(&self, addr: Address) {
        if self.global_len.fetch_add(1, Ordering::AcqRel) + 1 > GLOBAL_MARK_STACK_CAPACITY {
            self.has_overflown.store(true, Ordering::Release);
        }
        self.global.push(addr);
    }

    /// Push a newly-grayed object onto `worker_id`'s local queue, overflowing
    /// a batch to the global stack first if the local queue is full.
    pub fn push_local(&self, worker_id: usize, addr: Address) {
        let queue = &self.queues[worker_id];
        if queue.try_push(addr) {
            return;
        }
        for overflowed in queue.drain_batch(OVERFLOW_BATCH) {
            self.push_global(overflowed);
        }
        if !queue.try_push(addr) {
            self.push_global(addr);
        }
    }

    pub fn pop_local(&self, worker_id: usize) -> Option<Address> {
        self.queues[worker_id].pop()
    }

    pub fn pop_global(&self) -> Option<Address> {
        loop {
            match self.global.steal() {
                Steal::Success(addr) => {
                    self.global_len.fetch_sub(1, Ordering::AcqRel);
                    return Some(addr);
                }
                Steal::Retry => continue,
                Steal::Empty => return None,
            }
        }
    }

    /// Try to steal one entry from any peer other than `worker_id`.
    pub fn steal_from_peers(&self, worker_id: usize) -> Option<Address> {
        for (i, queue) in self.queues.iter().enumerate() {
            if i == worker_id {
                continue;
            }
            loop {
                match queue.stealer().steal() {
                    Steal::Success(addr) => return Some(addr),
                    Steal::Retry => continue,
                    Steal::Empty => break,
                }
            }
        }
        None
    }

    pub fn has_overflown(&self) -> bool {
        self.has_overflown.load(Ordering::Acquire)
    }

    /// Drop everything currently on the global stack (its entries are about
    /// to be superseded by a full region-stack rescan) and clear the
    /// overflow flag.
    pub fn drain_global_and_clear_overflow(&self) {
        while self.pop_global().is_some() {}
        self.has_overflown.store(false, Ordering::Release);
    }

    pub fn push_region(&self, start: Address, end: Address) {
        self.region_stack.lock().unwrap().push((start, end));
    }

    pub fn pop_region(&self) -> Option<(Address, Address)> {
        self.region_stack.lock().unwrap().pop()
    }

    pub fn region_stack_is_empty(&self) -> bool {
        self.region_stack.lock().unwrap().is_empty()
    }

    /// `true` iff every local queue and the global stack are empty. Used by
    /// a task's termination check once its peers and the SATB sink have
    /// nothing left either.
    pub fn all_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty()) && self.global_len.load(Ordering::Acquire) == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_push_pop_roundtrip() {
        let set = MarkQueueSet::new(2);
        set.push_local(0, Address::from_usize(0x1000));
        assert_eq!(set.pop_local(0), Some(Address::from_usize(0x1000)));
        assert_eq!(set.pop_local(0), None);
    }

    #[test]
    fn overflow_promotes_to_global() {
        let set = MarkQueueSet::new(1);
        for i in 0..LOCAL_QUEUE_CAPACITY + 1 {
            set.push_local(0, Address::from_usize(0x1000 + i * 8));
        }
        assert!(!set.all_empty());
        // The overflowed batch must be reachable from the global stack.
        let mut seen = 0;
        while set.pop_global().is_some() {
            seen += 1;
        }
        assert_eq!(seen, OVERFLOW_BATCH);
    }

    #[test]
    fn stealing_reaches_peer_queue() {
        let set = MarkQueueSet::new(2);
        set.push_local(1, Address::from_usize(0x2000));
        assert_eq!(set.steal_from_peers(0), Some(Address::from_usize(0x2000)));
    }

    #[test]
    fn region_stack_drains_to_empty() {
        let set = MarkQueueSet::new(1);
        set.push_region(Address::from_usize(0x1000), Address::from_usize(0x2000));
        assert!(!set.region_stack_is_empty());
        assert!(set.pop_region().is_some());
        assert!(set.region_stack_is_empty());
    }

    #[test]
    fn global_overflow_flag_sets_once_capacity_exceeded() {
        let set = MarkQueueSet::new(1);
        for i in 0..GLOBAL_MARK_STACK_CAPACITY + 1 {
            set.push_global(Address::from_usize(0x1000 + i * 8));
        }
        assert!(set.has_overflown());
        set.drain_global_and_clear_overflow();
        assert!(!set.has_overflown());
    }
}
