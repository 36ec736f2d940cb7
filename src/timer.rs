//! Per-packet deadline management over a single one-shot timer.
//!
//! The host exposes exactly one one-shot timer (see
//! [`crate::io::OneShotTimer`]), but the sender needs an independent
//! retransmission deadline for every in-flight packet.  [`TimerQueue`]
//! multiplexes them: it keeps `(seq, deadline)` records ordered by
//! increasing deadline and keeps the underlying timer armed for the head.
//!
//! Correctness property: after any sequence of [`TimerQueue::add`],
//! [`TimerQueue::cancel`], [`TimerQueue::pop_due`] + [`TimerQueue::rearm`]
//! calls, the underlying timer is set iff the queue is non-empty, and its
//! deadline equals the head's.

use std::collections::VecDeque;

use crate::io::OneShotTimer;
use crate::seq::SeqN;

/// Slack when expiring deadlines: the host may deliver fractional-time
/// events slightly late, so anything due within 5 ms of "now" counts as
/// fired.
pub const EPSILON: f64 = 5e-3;

/// One pending deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry {
    id: SeqN,
    deadline: f64,
}

/// An ordered queue of per-packet deadlines (earliest at the head).
#[derive(Debug, Default)]
pub struct TimerQueue {
    entries: VecDeque<Entry>,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `id` to expire `delay` seconds from now.
    ///
    /// If the new entry becomes the head, the underlying timer is restarted
    /// to match it.
    pub fn add<T: OneShotTimer>(&mut self, id: SeqN, delay: f64, timer: &mut T) {
        let deadline = timer.now() + delay;
        // Insert behind every entry that is due no later; ties keep FIFO order.
        let pos = self
            .entries
            .iter()
            .position(|e| e.deadline > deadline)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, Entry { id, deadline });

        if pos == 0 {
            if timer.is_set() {
                timer.stop();
            }
            timer.start(deadline - timer.now());
        }
    }

    /// Cancel the earliest pending deadline for `id`.
    ///
    /// Cancelling an id with no pending deadline is a warning, not an error.
    /// If the cancelled entry was the head, the underlying timer is
    /// restarted against the new head (or stopped when the queue empties).
    pub fn cancel<T: OneShotTimer>(&mut self, id: SeqN, timer: &mut T) {
        let Some(pos) = self.entries.iter().position(|e| e.id == id) else {
            log::warn!("[timer] cancel: id {id} not in queue");
            return;
        };
        self.entries.remove(pos);

        if pos == 0 {
            if timer.is_set() {
                timer.stop();
            }
            if let Some(head) = self.entries.front() {
                timer.start(head.deadline - timer.now());
            }
        }
    }

    /// Pop every head entry whose deadline is within [`EPSILON`] of `now`.
    ///
    /// Called from the underlying timer's expiry callback, so the timer is
    /// known to be disarmed; the caller handles each returned id and then
    /// restores the head invariant with [`TimerQueue::rearm`].
    pub fn pop_due(&mut self, now: f64) -> Vec<SeqN> {
        let mut due = Vec::new();
        while let Some(head) = self.entries.front() {
            if head.deadline <= now + EPSILON {
                due.push(head.id);
                self.entries.pop_front();
            } else {
                break;
            }
        }
        due
    }

    /// Arm the underlying timer for the head deadline if it is not already
    /// running.
    pub fn rearm<T: OneShotTimer>(&mut self, timer: &mut T) {
        if !timer.is_set() {
            if let Some(head) = self.entries.front() {
                timer.start(head.deadline - timer.now());
            }
        }
    }

    /// Deadline of the earliest entry, if any.
    pub fn head_deadline(&self) -> Option<f64> {
        self.entries.front().map(|e| e.deadline)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when `id` has at least one pending deadline.
    pub fn contains(&self, id: SeqN) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
