//! Contracts between the protocol core and its host.
//!
//! The endpoints contain no I/O of their own: every packet submission, timer
//! manipulation, and upward delivery goes through one of these traits, which
//! the host (an event framework, or the in-crate [`crate::simulator`])
//! implements.  This keeps the state machines testable without sockets or a
//! real clock.
//!
//! The host guarantees single-threaded, run-to-completion event dispatch: a
//! handler is never re-entered, and no new event is delivered while one is
//! executing.

use crate::packet::RawPacket;

/// The unreliable packet pipe.
///
/// Submission cannot fail and gives no feedback; the packet may be dropped,
/// corrupted, duplicated, or reordered in transit.
pub trait LowerLayer {
    /// Hand one fixed-size packet downstream.
    fn submit(&mut self, pkt: &RawPacket);
}

/// The host's single one-shot timer plus its clock (sender side only).
///
/// The protocol multiplexes many logical deadlines over this one timer via
/// [`crate::timer::TimerQueue`]; nothing else may touch it.
pub trait OneShotTimer {
    /// Arm the timer to fire after `delay` seconds.
    ///
    /// Must not be called while the timer is armed.
    fn start(&mut self, delay: f64);

    /// Disarm the timer.
    fn stop(&mut self);

    /// `true` while the timer is armed.
    fn is_set(&self) -> bool;

    /// Current simulation time, in seconds.
    fn now(&self) -> f64;
}

/// The consumer of delivered messages (receiver side only).
pub trait UpperLayer {
    /// Deliver one complete, in-order message.
    ///
    /// The receiver owns `msg`'s backing storage; implementations must copy
    /// out anything they keep.
    fn deliver(&mut self, msg: &[u8]);
}
