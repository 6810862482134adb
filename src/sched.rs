//! Multi-level ready queues.
//!
//! Processes sit in one of [`MAX_PRIO`] levels chosen by their `priority`;
//! level 0 is always served before level 1 and so on. Inside a level the
//! process with the higher `base_priority` goes first and equal ones leave
//! in arrival order.
//!
//! Two interchangeable dispatch strategies are provided. [`NaiveMlq`] scans
//! the levels from the top on every pop. [`IndexedMlq`] keeps a min-heap
//! holding one entry per queued process, keyed by level, so the most urgent
//! non-empty level is found without a scan.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use spin::Mutex;

use crate::constants::*;
use crate::error::SchedError;
use crate::process::Process;

struct Entry {
    seq: u64,
    proc: Box<Process>,
}

impl Entry {
    fn key(&self) -> (u32, Reverse<u64>) {
        (self.proc.base_priority, Reverse(self.seq))
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// One bounded level of the ready queue.
pub struct LevelQueue {
    heap: BinaryHeap<Entry>,
    seq: u64,
    capacity: usize,
}

impl LevelQueue {
    pub fn new(capacity: usize) -> Self {
        LevelQueue {
            heap: BinaryHeap::with_capacity(capacity),
            seq: 0,
            capacity,
        }
    }

    /// Hands the process back when the level is full.
    pub fn enqueue(&mut self, proc: Box<Process>) -> Result<(), Box<Process>> {
        if self.heap.len() >= self.capacity {
            return Err(proc);
        }
        self.heap.push(Entry { seq: self.seq, proc });
        self.seq += 1;
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<Box<Process>> {
        self.heap.pop().map(|e| e.proc)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Level a process is queued at. Out-of-range priorities land in the
/// least urgent level.
pub fn level_of(proc: &Process, levels: usize) -> usize {
    proc.priority.min(levels - 1)
}

/// A ready-queue dispatch strategy.
pub trait RunQueue: Send {
    fn push(&mut self, proc: Box<Process>) -> Result<(), SchedError>;
    fn pop(&mut self) -> Option<Box<Process>>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn new_levels(levels: usize, capacity: usize) -> Vec<LevelQueue> {
    (0..levels.max(1)).map(|_| LevelQueue::new(capacity)).collect()
}

fn overflow(proc: Box<Process>, level: usize) -> SchedError {
    SchedError::QueueOverflow {
        pid: proc.pid,
        level,
        process: proc,
    }
}

/// Scans every level from the most urgent on each pop.
pub struct NaiveMlq {
    levels: Vec<LevelQueue>,
}

impl NaiveMlq {
    pub fn new(levels: usize, capacity: usize) -> Self {
        NaiveMlq {
            levels: new_levels(levels, capacity),
        }
    }
}

impl RunQueue for NaiveMlq {
    fn push(&mut self, proc: Box<Process>) -> Result<(), SchedError> {
        let level = level_of(&proc, self.levels.len());
        self.levels[level]
            .enqueue(proc)
            .map_err(|proc| overflow(proc, level))
    }

    fn pop(&mut self) -> Option<Box<Process>> {
        self.levels.iter_mut().find_map(LevelQueue::dequeue)
    }

    fn len(&self) -> usize {
        self.levels.iter().map(LevelQueue::len).sum()
    }
}

/// Finds the next level through a min-heap of queued levels.
///
/// Invariant: the multiset of levels in `index` equals the multiset of
/// levels of queued processes. Both are only changed together, so a popped
/// index entry always names a non-empty level. Should they ever disagree,
/// `pop` skips stale entries and, once the index runs dry while processes
/// remain, rebuilds it from the queues.
pub struct IndexedMlq {
    levels: Vec<LevelQueue>,
    index: BinaryHeap<Reverse<usize>>,
}

impl IndexedMlq {
    pub fn new(levels: usize, capacity: usize) -> Self {
        IndexedMlq {
            levels: new_levels(levels, capacity),
            index: BinaryHeap::new(),
        }
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (level, queue) in self.levels.iter().enumerate() {
            self.index.extend(std::iter::repeat_n(Reverse(level), queue.len()));
        }
    }
}

impl RunQueue for IndexedMlq {
    fn push(&mut self, proc: Box<Process>) -> Result<(), SchedError> {
        let level = level_of(&proc, self.levels.len());
        self.levels[level]
            .enqueue(proc)
            .map_err(|proc| overflow(proc, level))?;
        self.index.push(Reverse(level));
        Ok(())
    }

    fn pop(&mut self) -> Option<Box<Process>> {
        loop {
            match self.index.pop() {
                Some(Reverse(level)) => {
                    if let Some(proc) = self.levels[level].dequeue() {
                        return Some(proc);
                    }
                    debug_assert!(false, "index named empty level {}", level);
                }
                None => {
                    if self.levels.iter().all(LevelQueue::is_empty) {
                        return None;
                    }
                    debug_assert!(false, "index empty while processes are queued");
                    self.rebuild_index();
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.levels.iter().map(LevelQueue::len).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    Naive,
    #[default]
    Indexed,
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naive" => Ok(Strategy::Naive),
            "indexed" => Ok(Strategy::Indexed),
            other => Err(format!("unknown strategy `{}` (naive|indexed)", other)),
        }
    }
}

/// Ready queue shared by every core. Each operation runs under one lock
/// that covers the level queues and the dispatch index together.
pub struct Scheduler {
    queue: Mutex<Box<dyn RunQueue>>,
}

impl Scheduler {
    pub fn new(strategy: Strategy) -> Self {
        Self::with_limits(strategy, MAX_PRIO, MAX_QUEUE_SIZE)
    }

    pub fn with_limits(strategy: Strategy, levels: usize, capacity: usize) -> Self {
        let queue: Box<dyn RunQueue> = match strategy {
            Strategy::Naive => Box::new(NaiveMlq::new(levels, capacity)),
            Strategy::Indexed => Box::new(IndexedMlq::new(levels, capacity)),
        };
        Scheduler {
            queue: Mutex::new(queue),
        }
    }

    pub fn add_proc(&self, proc: Box<Process>) -> Result<(), SchedError> {
        self.queue.lock().push(proc)
    }

    /// Enqueue several processes under one lock, so no core can observe a
    /// partially admitted batch. Returns the rejections.
    pub fn add_batch(&self, procs: Vec<Box<Process>>) -> Vec<SchedError> {
        let mut queue = self.queue.lock();
        procs.into_iter().filter_map(|p| queue.push(p).err()).collect()
    }

    pub fn get_proc(&self) -> Option<Box<Process>> {
        self.queue.lock().pop()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}
