//! Simulation-time deferred actions (timed despawns)
//!
//! The group polls the queue once per tick; actions fire in due-time order,
//! ties broken by scheduling order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::bubble::BubbleId;
use super::services::PoolHandle;

/// Work to run later
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    /// Return a fallen bubble to the pool
    ReleaseBubble(BubbleId),
    /// Return a match burst effect to the pool
    ReleaseEffect(PoolHandle),
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    due: f64,
    seq: u64,
    action: Deferred,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, earliest entry must pop first
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Deferred-event queue keyed by simulation time
#[derive(Debug, Clone, Default)]
pub struct DeferredQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `action` to fire `delay` seconds after `now`
    pub fn schedule(&mut self, now: f64, delay: f32, action: Deferred) {
        let delay = if delay < 0.0 {
            log::warn!("Negative delay {delay} for {action:?}, firing on next poll");
            0.0
        } else {
            delay
        };
        self.heap.push(Entry {
            due: now + f64::from(delay),
            seq: self.next_seq,
            action,
        });
        self.next_seq += 1;
    }

    /// Pop every action due at or before `now`
    pub fn poll(&mut self, now: f64) -> Vec<Deferred> {
        let mut due = Vec::new();
        while let Some(entry) = self.heap.peek() {
            if entry.due > now {
                break;
            }
            if let Some(entry) = self.heap.pop() {
                due.push(entry.action);
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
