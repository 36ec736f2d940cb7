//! Sliding-window send-side state machine.
//!
//! [`Sender`] packetises upper-layer messages, keeps a window of up to
//! [`WINDOW_SIZE`] packets in flight, runs an independent retransmission
//! deadline per packet, and reacts to the receiver's cumulative ACKs and
//! selective NAKs.
//!
//! # Protocol contract
//!
//! - At most [`WINDOW_SIZE`] packets may be in flight at once.
//! - ACKs are **cumulative**: `ack = K` retires every sequence number up to
//!   and including `K`.
//! - A NAK carries the one sequence number the receiver is missing; the
//!   sender answers with an immediate retransmission throttled by
//!   [`NAK_TIMEOUT`].
//! - When the sequence ring is full, surplus bytes queue in an unbounded
//!   overflow FIFO and are promoted into the ring as ACKs retire slots.
//!
//! All packet submission and timer manipulation goes through the
//! [`crate::io`] traits; this module performs no I/O of its own.

use std::collections::VecDeque;

use crate::io::{LowerLayer, OneShotTimer};
use crate::packet::{Frame, RawPacket, PAYLOAD_MAX};
use crate::seq::{self, SeqN, SEQ_SPACE, WINDOW_SIZE};
use crate::timer::TimerQueue;

/// Retransmission deadline for a freshly sent data packet, in seconds.
pub const SENDER_TIMEOUT: f64 = 1.0;

/// Deadline after a NAK-triggered retransmission, in seconds.
///
/// Shorter than [`SENDER_TIMEOUT`] so NAK-driven recovery stays faster than
/// pure-timeout recovery; it also debounces storms of duplicate NAKs.
pub const NAK_TIMEOUT: f64 = 0.3;

// ---------------------------------------------------------------------------
// OutSlot
// ---------------------------------------------------------------------------

/// One slot of the sequence-indexed ring: a buffered payload plus
/// bookkeeping.  Wire bytes are produced from it by [`Frame::encode`] at
/// transmission time, so bookkeeping never leaks into the checksum.
#[derive(Debug, Clone, Default)]
struct OutSlot {
    /// Sequence number assigned when the slot was claimed.
    seq: SeqN,
    /// Buffered payload (at most [`PAYLOAD_MAX`] bytes).
    payload: Vec<u8>,
    /// A NAK-triggered retransmission is recent; further NAKs for this
    /// sequence are ignored until the slot retires.
    naking: bool,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Send-side endpoint state.
///
/// # Sequence-number layout
///
/// ```text
///  window_start       to_send        next_seq_number
///       │                │                 │
///  ─────┼────────────────┼─────────────────┼──────────────▶ seq space
///       │ <─ in flight ─▶│ <─ claimed,  ──▶│  (ring full ⇒
///       │                │    not yet sent │   overflow FIFO)
/// ```
///
/// The in-flight span never exceeds [`WINDOW_SIZE`]; every sequence in it
/// has exactly one pending deadline in the timer queue.
#[derive(Debug)]
pub struct Sender {
    /// Sequence-indexed ring of buffered packets.
    out_buf: Vec<OutSlot>,

    /// Lowest sequence number not yet acknowledged (left window edge).
    window_start: SeqN,

    /// One past the highest sequence number assigned to a buffered packet.
    next_seq_number: SeqN,

    /// Next sequence number to actually transmit.
    to_send: SeqN,

    /// Payload fragments queued while the ring is full, drained in FIFO
    /// order as ACKs retire slots.
    overflow: VecDeque<Vec<u8>>,

    /// Pending retransmission deadlines, one per in-flight packet.
    timers: TimerQueue,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

impl Sender {
    /// Create a sender in its initial state.
    ///
    /// Numbering starts at 1; slot 0 stays a never-transmitted sentinel that
    /// the first cumulative ACK retires along with the real packets.
    pub fn new() -> Self {
        Self {
            out_buf: vec![OutSlot::default(); SEQ_SPACE as usize],
            window_start: 0,
            next_seq_number: 1,
            to_send: 1,
            overflow: VecDeque::new(),
            timers: TimerQueue::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Event handlers
    // -----------------------------------------------------------------------

    /// Accept one message from the upper layer.
    ///
    /// The message is copied out before returning: split into ring slots
    /// (coalescing into a claimed-but-unsent tail slot where possible) or,
    /// once the ring is full, into the overflow FIFO.  Anything newly
    /// admissible under the window is transmitted before the handler
    /// returns.
    pub fn from_upper_layer(&mut self, msg: &[u8], io: &mut (impl LowerLayer + OneShotTimer)) {
        let mut cursor = 0;
        while cursor < msg.len() {
            let remaining = &msg[cursor..];
            cursor += if self.ring_full() {
                self.spill_to_overflow(remaining)
            } else {
                self.fill_ring(remaining)
            };
        }
        self.send_packets(io);
    }

    /// Handle one packet from the lower layer (an ACK or NAK control frame).
    ///
    /// Corrupted packets are dropped silently.
    pub fn from_lower_layer(&mut self, pkt: &RawPacket, io: &mut (impl LowerLayer + OneShotTimer)) {
        let frame = match Frame::parse(pkt) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("[sender] dropped corrupted packet: {e}");
                return;
            }
        };
        if frame.is_nak() {
            self.on_nak(frame.ack, io);
        } else {
            self.on_ack(frame.ack, io);
        }
    }

    /// Handle expiry of the underlying one-shot timer.
    ///
    /// Every deadline due within the queue's slack is a retransmission: the
    /// packet goes out again and is re-armed — with [`NAK_TIMEOUT`] when the
    /// last send was NAK-triggered, [`SENDER_TIMEOUT`] otherwise.
    pub fn on_timeout(&mut self, io: &mut (impl LowerLayer + OneShotTimer)) {
        let now = io.now();
        let due = self.timers.pop_due(now);
        if due.is_empty() {
            log::warn!("[sender] timer fired with nothing due at t={now:.3}");
        }
        for id in due {
            let in_window = seq::between(self.window_start, id, self.to_send);
            debug_assert!(in_window, "timeout for retired seq {id}");
            if !in_window {
                log::error!("[sender] timeout for out-of-window seq {id}, dropped");
                continue;
            }
            let slot = &self.out_buf[id as usize];
            io.submit(&Frame::data(slot.seq, &slot.payload).encode());
            let backoff = if slot.naking {
                NAK_TIMEOUT
            } else {
                SENDER_TIMEOUT
            };
            log::debug!("[sender] ⏰ retransmit seq={id}, next deadline in {backoff}s");
            self.timers.add(id, backoff, io);
        }
        self.timers.rearm(io);
    }

    // -----------------------------------------------------------------------
    // Packetisation
    // -----------------------------------------------------------------------

    /// `true` when claiming another slot would make `next_seq_number` catch
    /// up with `window_start` (one slot stays reserved).
    fn ring_full(&self) -> bool {
        seq::add(self.next_seq_number, 1) == self.window_start
    }

    /// Copy bytes into the ring: coalesce into the previously claimed slot
    /// when it is still outside the transmit window and has spare capacity,
    /// otherwise claim a fresh slot.  Returns the number of bytes consumed.
    fn fill_ring(&mut self, remaining: &[u8]) -> usize {
        let prev = seq::sub(self.next_seq_number, 1);
        // Judge "claimed and beyond the transmit window" by the exact ring
        // occupancy: the signed sequence comparisons are only meaningful
        // within half the sequence space, and the claimed backlog can run
        // deeper than that.
        let backlog = self.next_seq_number.wrapping_sub(self.window_start);
        let coalesce =
            backlog > WINDOW_SIZE && self.out_buf[prev as usize].payload.len() < PAYLOAD_MAX;

        let idx = if coalesce {
            prev
        } else {
            let claimed = self.next_seq_number;
            let slot = &mut self.out_buf[claimed as usize];
            slot.seq = claimed;
            slot.payload.clear();
            slot.naking = false;
            seq::inc(&mut self.next_seq_number);
            claimed
        };

        let slot = &mut self.out_buf[idx as usize];
        let take = (PAYLOAD_MAX - slot.payload.len()).min(remaining.len());
        slot.payload.extend_from_slice(&remaining[..take]);
        take
    }

    /// Append bytes to the overflow FIFO, starting a new fragment when the
    /// tail is full.  Returns the number of bytes consumed.
    fn spill_to_overflow(&mut self, remaining: &[u8]) -> usize {
        match self.overflow.back_mut() {
            Some(tail) if tail.len() < PAYLOAD_MAX => {
                let take = (PAYLOAD_MAX - tail.len()).min(remaining.len());
                tail.extend_from_slice(&remaining[..take]);
                take
            }
            _ => {
                let take = PAYLOAD_MAX.min(remaining.len());
                self.overflow.push_back(remaining[..take].to_vec());
                take
            }
        }
    }

    /// Transmit every claimed packet the window admits, arming a deadline
    /// for each.
    fn send_packets(&mut self, io: &mut (impl LowerLayer + OneShotTimer)) {
        let hard_end = seq::add(self.window_start, WINDOW_SIZE);
        let window_end = if seq::between(self.window_start, self.next_seq_number, hard_end) {
            self.next_seq_number
        } else {
            hard_end
        };

        while seq::between(self.window_start, self.to_send, window_end) {
            let slot = &self.out_buf[self.to_send as usize];
            let pkt = Frame::data(slot.seq, &slot.payload).encode();
            self.timers.add(slot.seq, SENDER_TIMEOUT, io);
            io.submit(&pkt);
            log::debug!(
                "[sender] → DATA seq={} len={} in_flight={}",
                slot.seq,
                slot.payload.len(),
                self.in_flight() + 1
            );
            seq::inc(&mut self.to_send);
        }
    }

    // -----------------------------------------------------------------------
    // Feedback handling
    // -----------------------------------------------------------------------

    /// Process a cumulative ACK: retire every slot up to and including
    /// `ack`, promoting overflow fragments into the freed slots.
    fn on_ack(&mut self, ack: SeqN, io: &mut (impl LowerLayer + OneShotTimer)) {
        // Reject ACKs behind the window or at/beyond the transmit cursor;
        // nothing past `to_send` can legitimately be acknowledged.
        if !seq::between(self.window_start, ack, self.to_send) {
            log::debug!("[sender] ← ACK ack={ack} outside window, ignored");
            return;
        }
        log::debug!("[sender] ← ACK ack={ack}");
        while seq::lte(self.window_start, ack) {
            self.timers
                .cancel(self.out_buf[self.window_start as usize].seq, io);
            self.advance_window(io);
        }
    }

    /// Process a NAK for `target`: retransmit immediately unless a recent
    /// NAK-triggered retransmission is already in flight.
    fn on_nak(&mut self, target: SeqN, io: &mut (impl LowerLayer + OneShotTimer)) {
        if !seq::between(self.window_start, target, self.to_send) {
            log::debug!("[sender] ← NAK seq={target} stale, ignored");
            return;
        }
        if self.out_buf[target as usize].naking {
            log::debug!("[sender] ← NAK seq={target} debounced");
            return;
        }
        self.timers.cancel(target, io);
        let pkt = {
            let slot = &self.out_buf[target as usize];
            Frame::data(slot.seq, &slot.payload).encode()
        };
        io.submit(&pkt);
        self.timers.add(target, NAK_TIMEOUT, io);
        self.out_buf[target as usize].naking = true;
        log::debug!("[sender] ← NAK seq={target}, retransmitted");
    }

    /// Retire the slot at `window_start`.
    ///
    /// If overflow fragments are queued the head is promoted into the one
    /// free ring slot; otherwise the retiring slot is simply cleared.  Newly
    /// admissible packets are transmitted before returning.
    fn advance_window(&mut self, io: &mut (impl LowerLayer + OneShotTimer)) {
        if let Some(chunk) = self.overflow.pop_front() {
            // Overflow is only ever fed while the ring is full, so the slot
            // at next_seq_number is exactly the one reserved free slot.
            debug_assert!(self.ring_full());
            let claimed = self.next_seq_number;
            let slot = &mut self.out_buf[claimed as usize];
            slot.seq = claimed;
            slot.payload = chunk;
            slot.naking = false;
            seq::inc(&mut self.next_seq_number);
        } else {
            self.out_buf[self.window_start as usize].payload.clear();
        }
        self.out_buf[self.window_start as usize].naking = false;
        seq::inc(&mut self.window_start);
        self.send_packets(io);
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    /// Number of packets currently in flight.
    pub fn in_flight(&self) -> u8 {
        self.to_send.wrapping_sub(self.window_start)
    }

    /// Number of payload fragments waiting in the overflow FIFO.
    pub fn overflow_len(&self) -> usize {
        self.overflow.len()
    }

    /// `true` when nothing is in flight and nothing is waiting to be sent.
    pub fn is_idle(&self) -> bool {
        self.window_start == self.to_send
            && self.to_send == self.next_seq_number
            && self.overflow.is_empty()
    }

    /// Left edge of the send window.
    pub fn window_start(&self) -> SeqN {
        self.window_start
    }

    /// Number of pending retransmission deadlines.
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for Sender {
    /// Finalisation.  There is no obligation to flush: anything still
    /// buffered or in flight is abandoned with the endpoint.
    fn drop(&mut self) {
        log::debug!(
            "[sender] finalizing: in_flight={} overflow={}",
            self.in_flight(),
            self.overflow.len()
        );
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
