//! Reorder-buffer receive-side state machine.
//!
//! [`Receiver`] validates inbound packets, buffers out-of-order arrivals in
//! a sequence-indexed window, delivers the in-order prefix to the upper
//! layer, and answers every accepted arrival with feedback:
//!
//! - a **cumulative ACK** (`ack = window_start − 1`) when no gap remains;
//! - a **NAK** naming `window_start` — the exact missing packet — while a
//!   later packet is buffered ahead of a hole.
//!
//! There is no receiver-side timer.  If a NAK is lost, the sender's own
//! retransmission deadline eventually re-delivers the gap, and that arrival
//! triggers a fresh feedback pass — the protocol degrades to go-back-N
//! pacing instead of stalling.

use crate::io::{LowerLayer, UpperLayer};
use crate::packet::{Frame, RawPacket};
use crate::seq::{self, SeqN, SEQ_SPACE, WINDOW_SIZE};

// ---------------------------------------------------------------------------
// InSlot
// ---------------------------------------------------------------------------

/// One slot of the sequence-indexed reorder ring.
#[derive(Debug, Clone, Default)]
struct InSlot {
    /// Buffered payload (at most [`crate::packet::PAYLOAD_MAX`] bytes).
    payload: Vec<u8>,
    /// The slot holds a valid, not-yet-delivered packet.
    received: bool,
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

/// Receive-side endpoint state.
#[derive(Debug)]
pub struct Receiver {
    /// Sequence-indexed ring of buffered packets.
    in_buf: Vec<InSlot>,

    /// Next sequence number expected for delivery.
    window_start: SeqN,

    /// Highest sequence number observed within the current window; a gap
    /// exists while it is ahead of `window_start`.
    received_last: SeqN,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    /// Create a receiver in its initial state.
    ///
    /// The sender numbers its first packet 1, so delivery starts there.
    pub fn new() -> Self {
        Self {
            in_buf: vec![InSlot::default(); SEQ_SPACE as usize],
            window_start: 1,
            received_last: 0,
        }
    }

    /// Handle one packet from the lower layer.
    ///
    /// Corrupted packets are dropped silently; everything else produces
    /// exactly one feedback frame (ACK or NAK) before the handler returns.
    pub fn from_lower_layer(&mut self, pkt: &RawPacket, io: &mut (impl LowerLayer + UpperLayer)) {
        let frame = match Frame::parse(pkt) {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("[recv] dropped corrupted packet: {e}");
                return;
            }
        };
        let seq = frame.seq;

        // A packet from before the window duplicates already-delivered
        // data: its original ACK was probably lost, so re-ACK and move on.
        if seq::lt(seq, self.window_start) {
            log::debug!("[recv] ← DATA seq={seq} already delivered, re-ACK");
            self.emit_ack(io);
            return;
        }

        // A packet from beyond the window cannot be buffered without
        // evicting undelivered data; drop it and let the sender's timer
        // re-deliver it once the window has moved.
        if !seq::between(self.window_start, seq, seq::add(self.window_start, WINDOW_SIZE)) {
            log::debug!("[recv] ← DATA seq={seq} beyond window, dropped");
            return;
        }

        if seq::lt(self.received_last, seq) {
            self.received_last = seq;
        }
        let slot = &mut self.in_buf[seq as usize];
        slot.payload = frame.payload;
        slot.received = true;
        log::debug!("[recv] ← DATA seq={seq} len={} buffered", slot.payload.len());

        self.deliver_prefix(io);

        if seq::lt(self.window_start, self.received_last) {
            // A hole remains below a buffered packet: ask for it by name.
            log::debug!("[recv] → NAK seq={}", self.window_start);
            io.submit(&Frame::nak(self.window_start).encode());
        } else {
            self.emit_ack(io);
        }
    }

    /// Hand every in-order buffered packet to the upper layer and slide the
    /// window past them.
    fn deliver_prefix(&mut self, io: &mut (impl LowerLayer + UpperLayer)) {
        while self.in_buf[self.window_start as usize].received {
            let slot = &mut self.in_buf[self.window_start as usize];
            io.deliver(&slot.payload);
            slot.received = false;
            slot.payload.clear();
            seq::inc(&mut self.window_start);
        }
    }

    /// Emit the cumulative ACK for everything delivered so far.
    fn emit_ack(&mut self, io: &mut (impl LowerLayer + UpperLayer)) {
        let ack = seq::sub(self.window_start, 1);
        log::debug!("[recv] → ACK ack={ack}");
        io.submit(&Frame::ack(ack).encode());
    }

    /// Next sequence number expected for delivery.
    pub fn window_start(&self) -> SeqN {
        self.window_start
    }

    /// `true` while a buffered packet sits ahead of an undelivered hole.
    pub fn has_gap(&self) -> bool {
        seq::lt(self.window_start, self.received_last)
    }
}

impl Drop for Receiver {
    /// Finalisation.  Undelivered buffered packets are abandoned with the
    /// endpoint.
    fn drop(&mut self) {
        log::debug!(
            "[recv] finalizing: window_start={} gap={}",
            self.window_start,
            self.has_gap()
        );
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
