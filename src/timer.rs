//! A queue of timers on the virtual animation clock.
//!
//! Timers are ordered by due time and then by the order in which they were scheduled, so timers
//! due at the same instant fire first-in first-out. Individual timers can be cancelled by ID, and
//! [`TimerQueue::cancel_all`] invalidates every pending timer at once by advancing the queue's
//! epoch: timers from an earlier epoch are silently dropped rather than fired.
use crate::timing::Millis;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Identifies a scheduled timer
pub type TimerId = u64;

/// A timer which has come due
#[derive(Debug, Clone, PartialEq)]
pub struct Timer<T> {
    /// The timer's ID
    pub id: TimerId,
    /// When the timer was due
    pub time: Millis,
    /// The payload supplied when the timer was scheduled
    pub data: T,
}

/// Heap entry for a pending timer
#[derive(Debug)]
struct Entry<T> {
    timer: Timer<T>,
    epoch: u64,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.timer.id == other.timer.id
    }
}

impl<T> Eq for Entry<T> {}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap, so reverse the order to pop the earliest timer first
        other
            .timer
            .time
            .cmp(&self.timer.time)
            .then_with(|| other.timer.id.cmp(&self.timer.id))
    }
}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A priority queue of timers with cancellation
#[derive(Debug)]
pub struct TimerQueue<T> {
    entries: BinaryHeap<Entry<T>>,
    cancelled: HashSet<TimerId>,
    next_id: TimerId,
    epoch: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            entries: BinaryHeap::new(),
            cancelled: HashSet::new(),
            next_id: 0,
            epoch: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a timer to fire at `time`
    pub fn schedule(&mut self, time: Millis, data: T) -> TimerId {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push(Entry {
            timer: Timer { id, time, data },
            epoch: self.epoch,
        });

        id
    }

    /// Cancel the timer with the given ID.
    ///
    /// Cancelling a timer which has already fired or been cancelled has no effect.
    pub fn cancel(&mut self, id: TimerId) {
        if self.entries.iter().any(|entry| entry.timer.id == id) {
            self.cancelled.insert(id);
        }
    }

    /// Cancel every pending timer
    pub fn cancel_all(&mut self) {
        self.epoch += 1;
        self.cancelled.clear();
    }

    /// The current epoch, which advances each time all timers are cancelled
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Drop cancelled and stale timers from the top of the heap
    fn discard_dead(&mut self) {
        while let Some(entry) = self.entries.peek() {
            let is_dead =
                entry.epoch != self.epoch || self.cancelled.contains(&entry.timer.id);
            if !is_dead {
                break;
            }
            if let Some(entry) = self.entries.pop() {
                self.cancelled.remove(&entry.timer.id);
            }
        }
    }

    /// When the next live timer is due, if there is one
    pub fn peek_time(&mut self) -> Option<Millis> {
        self.discard_dead();
        self.entries.peek().map(|entry| entry.timer.time)
    }

    /// Remove and return the next live timer, if it is due at or before `now`
    pub fn pop_due(&mut self, now: Millis) -> Option<Timer<T>> {
        if self.peek_time()? > now {
            return None;
        }

        self.entries.pop().map(|entry| entry.timer)
    }

    /// Number of live timers
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.epoch == self.epoch && !self.cancelled.contains(&entry.timer.id))
            .count()
    }

    /// Whether there are no live timers
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
