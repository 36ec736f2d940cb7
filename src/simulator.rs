//! Deterministic network simulator for exercising both endpoints.
//!
//! Real networks drop, reorder, duplicate, and corrupt packets.  To exercise
//! the reliability mechanisms without depending on actual network
//! conditions, this module provides a [`Simulator`] that owns one
//! [`Sender`] and one [`Receiver`], a simulated clock, the sender's
//! one-shot timer, and a fault-injecting channel between them:
//!
//! | Fault       | Description                                          |
//! |-------------|------------------------------------------------------|
//! | Packet loss | Drop a packet with probability `loss_rate`.          |
//! | Corruption  | Flip one random bit with probability `corrupt_rate`. |
//! | Duplication | Deliver a packet twice.                              |
//! | Reordering  | Delay a packet by `reorder_delay`, letting later     |
//! |             | packets overtake it.                                 |
//!
//! All randomness comes from a seeded RNG, so any failing run can be
//! replayed bit-for-bit from its seed.
//!
//! Time is a simulated `f64` clock driven by a binary-heap event queue;
//! each event dispatches exactly one endpoint handler, which runs to
//! completion before the next event is popped (the scheduling model the
//! endpoints are written against).

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::mem;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::io::{LowerLayer, OneShotTimer, UpperLayer};
use crate::packet::{RawPacket, PKT_SIZE};
use crate::receiver::Receiver;
use crate::sender::Sender;

/// Safety cap on processed events for one [`Simulator::run`] call.
const MAX_EVENTS: u64 = 5_000_000;

// ---------------------------------------------------------------------------
// Configuration and statistics
// ---------------------------------------------------------------------------

/// Fault-model configuration.
///
/// All probabilities are in `[0.0, 1.0]` and apply independently per packet
/// per direction; out-of-range values are clamped.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Probability that any given packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that one random bit of a packet is flipped in transit.
    pub corrupt_rate: f64,
    /// Probability that a packet is delivered twice.
    pub duplicate_rate: f64,
    /// Probability that a packet is held back long enough for later packets
    /// to overtake it.
    pub reorder_rate: f64,
    /// Extra delay applied to reordered packets, in seconds.
    pub reorder_delay: f64,
    /// Base one-way propagation latency, in seconds.
    pub latency: f64,
    /// RNG seed; the same seed replays the same run.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        // No faults by default — the channel is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            duplicate_rate: 0.0,
            reorder_rate: 0.0,
            reorder_delay: 0.25,
            latency: 0.1,
            seed: 0,
        }
    }
}

/// Counters accumulated over one simulated transfer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimStats {
    /// Data frames handed to the channel by the sender.
    pub data_frames: u64,
    /// Control frames (ACK/NAK) handed to the channel by the receiver.
    pub control_frames: u64,
    /// Packets the channel dropped.
    pub dropped: u64,
    /// Packets the channel corrupted.
    pub corrupted: u64,
    /// Packets the channel duplicated.
    pub duplicated: u64,
    /// Packets the channel held back for reordering.
    pub reordered: u64,
    /// Messages delivered to the receiving upper layer.
    pub delivered: u64,
}

// ---------------------------------------------------------------------------
// Event queue
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Event {
    /// The sending upper layer hands over a message.
    UpperMessage(Vec<u8>),
    /// A packet arrives at the sender (control direction).
    SenderPacket(RawPacket),
    /// A packet arrives at the receiver (data direction).
    ReceiverPacket(RawPacket),
    /// The sender's one-shot timer fires; stale generations are ignored.
    TimerFire(u64),
}

#[derive(Debug)]
struct Scheduled {
    time: f64,
    id: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.id == other.id
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Ties break on insertion order so equal-time events stay FIFO.
        self.time
            .total_cmp(&other.time)
            .then(self.id.cmp(&other.id))
    }
}

// ---------------------------------------------------------------------------
// Host ports
// ---------------------------------------------------------------------------

/// The sender's view of the host: the channel inbox plus the one-shot
/// timer.  Submissions collect in `outbox` and enter the channel after the
/// handler returns.
#[derive(Default)]
struct SenderPort {
    now: f64,
    armed: Option<f64>,
    outbox: Vec<RawPacket>,
}

impl LowerLayer for SenderPort {
    fn submit(&mut self, pkt: &RawPacket) {
        self.outbox.push(*pkt);
    }
}

impl OneShotTimer for SenderPort {
    fn start(&mut self, delay: f64) {
        debug_assert!(self.armed.is_none(), "one-shot timer started while armed");
        self.armed = Some(self.now + delay);
    }
    fn stop(&mut self) {
        self.armed = None;
    }
    fn is_set(&self) -> bool {
        self.armed.is_some()
    }
    fn now(&self) -> f64 {
        self.now
    }
}

/// The receiver's view of the host: the channel inbox plus the consuming
/// upper layer.
#[derive(Default)]
struct ReceiverPort {
    outbox: Vec<RawPacket>,
    delivered: Vec<Vec<u8>>,
}

impl LowerLayer for ReceiverPort {
    fn submit(&mut self, pkt: &RawPacket) {
        self.outbox.push(*pkt);
    }
}

impl UpperLayer for ReceiverPort {
    fn deliver(&mut self, msg: &[u8]) {
        self.delivered.push(msg.to_vec());
    }
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

/// A complete two-endpoint setup over a fault-injecting channel.
pub struct Simulator {
    config: SimConfig,
    rng: StdRng,
    now: f64,
    next_id: u64,
    events: BinaryHeap<Reverse<Scheduled>>,

    sender: Sender,
    receiver: Receiver,
    sender_port: SenderPort,
    receiver_port: ReceiverPort,

    /// Generation tag of the currently scheduled timer-fire event.
    timer_gen: u64,
    /// Deadline of the timer-fire event currently in the queue, if any.
    scheduled_deadline: Option<f64>,

    delivered: Vec<Vec<u8>>,
    stats: SimStats,
}

impl Simulator {
    pub fn new(mut config: SimConfig) -> Self {
        for rate in [
            &mut config.loss_rate,
            &mut config.corrupt_rate,
            &mut config.duplicate_rate,
            &mut config.reorder_rate,
        ] {
            *rate = rate.clamp(0.0, 1.0);
        }
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            now: 0.0,
            next_id: 0,
            events: BinaryHeap::new(),
            sender: Sender::new(),
            receiver: Receiver::new(),
            sender_port: SenderPort::default(),
            receiver_port: ReceiverPort::default(),
            timer_gen: 0,
            scheduled_deadline: None,
            delivered: Vec::new(),
            stats: SimStats::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Driving the simulation
    // -----------------------------------------------------------------------

    /// Queue a message for the sending upper layer to hand over at the
    /// current simulation time.
    pub fn offer_message(&mut self, msg: &[u8]) {
        self.offer_message_at(self.now, msg);
    }

    /// Queue a message for hand-over at an absolute simulation time.
    pub fn offer_message_at(&mut self, time: f64, msg: &[u8]) {
        self.schedule(time, Event::UpperMessage(msg.to_vec()));
    }

    /// Process events until the queue drains (or the event safety cap is
    /// hit).  Returns the number of events processed.
    pub fn run(&mut self) -> u64 {
        let mut processed = 0;
        while let Some(Reverse(scheduled)) = self.events.pop() {
            if processed >= MAX_EVENTS {
                log::error!("[sim] event cap reached at t={:.3}, aborting run", self.now);
                break;
            }
            self.now = self.now.max(scheduled.time);
            self.sender_port.now = self.now;
            self.dispatch(scheduled.event);
            processed += 1;
        }
        processed
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::UpperMessage(msg) => {
                log::debug!("[sim] t={:.3} upper message of {} bytes", self.now, msg.len());
                self.sender
                    .from_upper_layer(&msg, &mut self.sender_port);
                self.flush_sender_side();
            }
            Event::SenderPacket(pkt) => {
                self.sender.from_lower_layer(&pkt, &mut self.sender_port);
                self.flush_sender_side();
            }
            Event::ReceiverPacket(pkt) => {
                self.receiver
                    .from_lower_layer(&pkt, &mut self.receiver_port);
                self.flush_receiver_side();
            }
            Event::TimerFire(gen) => {
                if gen != self.timer_gen {
                    return; // superseded by a later start/stop
                }
                // One-shot semantics: the timer is disarmed before the
                // expiry handler runs.
                self.sender_port.armed = None;
                self.scheduled_deadline = None;
                self.timer_gen += 1;
                self.sender.on_timeout(&mut self.sender_port);
                self.flush_sender_side();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Channel and timer plumbing
    // -----------------------------------------------------------------------

    fn schedule(&mut self, time: f64, event: Event) {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push(Reverse(Scheduled { time, id, event }));
    }

    /// Move the sender's freshly submitted packets into the channel and
    /// mirror its timer manipulations into the event queue.
    fn flush_sender_side(&mut self) {
        for pkt in mem::take(&mut self.sender_port.outbox) {
            self.stats.data_frames += 1;
            self.transmit(pkt, true);
        }
        if self.sender_port.armed != self.scheduled_deadline {
            self.timer_gen += 1;
            self.scheduled_deadline = self.sender_port.armed;
            if let Some(deadline) = self.scheduled_deadline {
                self.schedule(deadline, Event::TimerFire(self.timer_gen));
            }
        }
    }

    /// Move the receiver's feedback frames into the channel and collect its
    /// deliveries.
    fn flush_receiver_side(&mut self) {
        for pkt in mem::take(&mut self.receiver_port.outbox) {
            self.stats.control_frames += 1;
            self.transmit(pkt, false);
        }
        let msgs = mem::take(&mut self.receiver_port.delivered);
        self.stats.delivered += msgs.len() as u64;
        self.delivered.extend(msgs);
    }

    /// Pass one packet through the fault model and schedule its arrivals.
    fn transmit(&mut self, pkt: RawPacket, to_receiver: bool) {
        if self.rng.random_bool(self.config.loss_rate) {
            self.stats.dropped += 1;
            log::debug!("[sim] t={:.3} channel dropped a packet", self.now);
            return;
        }
        let copies = if self.rng.random_bool(self.config.duplicate_rate) {
            self.stats.duplicated += 1;
            2
        } else {
            1
        };
        for _ in 0..copies {
            let mut bytes = pkt;
            if self.rng.random_bool(self.config.corrupt_rate) {
                let bit = self.rng.random_range(0..PKT_SIZE * 8);
                bytes.0[bit / 8] ^= 1 << (bit % 8);
                self.stats.corrupted += 1;
            }
            let mut delay = self.config.latency;
            if self.rng.random_bool(self.config.reorder_rate) {
                delay += self.config.reorder_delay;
                self.stats.reordered += 1;
            }
            let event = if to_receiver {
                Event::ReceiverPacket(bytes)
            } else {
                Event::SenderPacket(bytes)
            };
            self.schedule(self.now + delay, event);
        }
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    /// Messages delivered to the receiving upper layer, in delivery order.
    ///
    /// Packetisation may split or merge upper-layer messages, so compare
    /// [`Simulator::delivered_bytes`] against the submitted concatenation
    /// rather than message-by-message.
    pub fn delivered(&self) -> &[Vec<u8>] {
        &self.delivered
    }

    /// Concatenation of all delivered payload bytes.
    pub fn delivered_bytes(&self) -> Vec<u8> {
        self.delivered.concat()
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Current simulation time, in seconds.
    pub fn now(&self) -> f64 {
        self.now
    }

    /// `true` when the sender holds no undelivered state.
    pub fn sender_idle(&self) -> bool {
        self.sender.is_idle()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_channel_delivers_without_retransmission() {
        let mut sim = Simulator::new(SimConfig::default());
        sim.offer_message(b"hello world");
        sim.run();

        assert_eq!(sim.delivered_bytes(), b"hello world");
        let stats = sim.stats();
        assert_eq!(stats.data_frames, 1); // no retransmission
        assert_eq!(stats.control_frames, 1); // one ACK
        assert!(sim.sender_idle());
    }

    #[test]
    fn equal_time_events_dispatch_in_fifo_order() {
        let mut sim = Simulator::new(SimConfig::default());
        sim.offer_message_at(0.0, b"first");
        sim.offer_message_at(0.0, b"second");
        sim.run();

        assert_eq!(sim.delivered_bytes(), b"firstsecond");
    }

    #[test]
    fn same_seed_replays_identically() {
        let config = SimConfig {
            loss_rate: 0.2,
            corrupt_rate: 0.1,
            duplicate_rate: 0.1,
            reorder_rate: 0.2,
            seed: 99,
            ..SimConfig::default()
        };
        let run = |cfg: SimConfig| {
            let mut sim = Simulator::new(cfg);
            for i in 0..20u8 {
                sim.offer_message(&[i; 50]);
            }
            sim.run();
            (sim.delivered_bytes(), sim.stats().data_frames)
        };

        assert_eq!(run(config.clone()), run(config));
    }

    #[test]
    fn out_of_range_rates_are_clamped() {
        let sim = Simulator::new(SimConfig {
            loss_rate: 7.0,
            corrupt_rate: -1.0,
            ..SimConfig::default()
        });
        assert_eq!(sim.config.loss_rate, 1.0);
        assert_eq!(sim.config.corrupt_rate, 0.0);
    }
}
