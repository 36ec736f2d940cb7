//! End-to-end transfer scenarios.
//!
//! The first group drives a `Sender` and a `Receiver` by hand, shuttling
//! individual packets so each fault (loss, corruption, reordering) lands on
//! an exact packet.  The second group runs whole transfers through the
//! seeded fault-injecting `Simulator`.

use std::collections::VecDeque;

use rdt::io::{LowerLayer, OneShotTimer, UpperLayer};
use rdt::simulator::{SimConfig, Simulator};
use rdt::{Frame, RawPacket, Receiver, Sender, PAYLOAD_MAX, SENDER_TIMEOUT};

// ---------------------------------------------------------------------------
// Manual-plumbing harness
// ---------------------------------------------------------------------------

/// Sender-side host: a packet outbox plus a hand-cranked one-shot timer.
#[derive(Default)]
struct SenderHost {
    now: f64,
    armed: Option<f64>,
    out: VecDeque<RawPacket>,
}

impl LowerLayer for SenderHost {
    fn submit(&mut self, pkt: &RawPacket) {
        self.out.push_back(*pkt);
    }
}

impl OneShotTimer for SenderHost {
    fn start(&mut self, delay: f64) {
        assert!(self.armed.is_none(), "start while armed");
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

impl SenderHost {
    /// Advance the clock to the armed deadline and fire the timer.
    fn fire(&mut self, sender: &mut Sender) {
        let deadline = self.armed.take().expect("timer not armed");
        self.now = deadline;
        sender.on_timeout(self);
    }
}

/// Receiver-side host: a feedback outbox plus the consuming upper layer.
#[derive(Default)]
struct ReceiverHost {
    out: VecDeque<RawPacket>,
    delivered: Vec<Vec<u8>>,
}

impl LowerLayer for ReceiverHost {
    fn submit(&mut self, pkt: &RawPacket) {
        self.out.push_back(*pkt);
    }
}

impl UpperLayer for ReceiverHost {
    fn deliver(&mut self, msg: &[u8]) {
        self.delivered.push(msg.to_vec());
    }
}

/// Assert a packet is wire-valid (zero reserved flag bits, good checksum)
/// and return its parsed form.
fn check_wire(pkt: &RawPacket) -> Frame {
    Frame::parse(pkt).expect("endpoint emitted an invalid wire packet")
}

/// Deliver every queued feedback frame to the sender.
fn shuttle_feedback(rx: &mut ReceiverHost, sender: &mut Sender, tx: &mut SenderHost) {
    while let Some(pkt) = rx.out.pop_front() {
        check_wire(&pkt);
        sender.from_lower_layer(&pkt, tx);
    }
}

// ---------------------------------------------------------------------------
// Scenario 1: perfect channel, single packet
// ---------------------------------------------------------------------------

#[test]
fn perfect_channel_single_packet() {
    let mut sender = Sender::new();
    let mut receiver = Receiver::new();
    let mut tx = SenderHost::default();
    let mut rx = ReceiverHost::default();

    sender.from_upper_layer(b"hello", &mut tx);

    let pkt = tx.out.pop_front().expect("no packet emitted");
    let frame = check_wire(&pkt);
    assert_eq!(frame.seq, 1);
    assert_eq!(frame.payload, b"hello");

    receiver.from_lower_layer(&pkt, &mut rx);
    assert_eq!(rx.delivered, vec![b"hello".to_vec()]);

    let ack = check_wire(rx.out.front().unwrap());
    assert!(!ack.is_nak());
    assert_eq!(ack.ack, 1);

    shuttle_feedback(&mut rx, &mut sender, &mut tx);
    assert_eq!(sender.window_start(), 2);
    assert!(sender.is_idle());
    assert!(!tx.is_set());
    assert_eq!(receiver.window_start(), 2);
}

// ---------------------------------------------------------------------------
// Scenario 2: lost data packet recovered by NAK
// ---------------------------------------------------------------------------

#[test]
fn lost_data_packet_recovered_by_nak() {
    let mut sender = Sender::new();
    let mut receiver = Receiver::new();
    let mut tx = SenderHost::default();
    let mut rx = ReceiverHost::default();

    for msg in [&b"one"[..], b"two", b"three"] {
        sender.from_upper_layer(msg, &mut tx);
    }
    let p1 = tx.out.pop_front().unwrap();
    let _lost = tx.out.pop_front().unwrap();
    let p3 = tx.out.pop_front().unwrap();

    receiver.from_lower_layer(&p1, &mut rx);
    receiver.from_lower_layer(&p3, &mut rx);
    assert_eq!(rx.delivered, vec![b"one".to_vec()]);

    // ACK for seq 1, then a NAK naming the hole.
    let ack = check_wire(&rx.out.pop_front().unwrap());
    assert_eq!((ack.is_nak(), ack.ack), (false, 1));
    let nak = check_wire(&rx.out.pop_front().unwrap());
    assert_eq!((nak.is_nak(), nak.ack), (true, 2));

    sender.from_lower_layer(&ack.encode(), &mut tx);
    sender.from_lower_layer(&nak.encode(), &mut tx);

    // The NAK produced an immediate retransmission of exactly seq 2.
    let retx = tx.out.pop_front().expect("no retransmission");
    let frame = check_wire(&retx);
    assert_eq!(frame.seq, 2);
    assert_eq!(frame.payload, b"two");

    receiver.from_lower_layer(&retx, &mut rx);
    assert_eq!(
        rx.delivered,
        vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
    );
    let ack = check_wire(&rx.out.pop_front().unwrap());
    assert_eq!((ack.is_nak(), ack.ack), (false, 3));

    sender.from_lower_layer(&ack.encode(), &mut tx);
    assert!(sender.is_idle());
    assert!(!tx.is_set());
}

// ---------------------------------------------------------------------------
// Scenario 3: lost ACK recovered by retransmission timeout
// ---------------------------------------------------------------------------

#[test]
fn lost_ack_recovered_by_timeout() {
    let mut sender = Sender::new();
    let mut receiver = Receiver::new();
    let mut tx = SenderHost::default();
    let mut rx = ReceiverHost::default();

    sender.from_upper_layer(b"hello", &mut tx);
    let pkt = tx.out.pop_front().unwrap();

    receiver.from_lower_layer(&pkt, &mut rx);
    rx.out.clear(); // the ACK is lost in transit

    // The data deadline fires and the packet goes out again.
    assert!((tx.armed.unwrap() - SENDER_TIMEOUT).abs() < 1e-9);
    tx.fire(&mut sender);
    let retx = tx.out.pop_front().expect("no retransmission");
    assert_eq!(check_wire(&retx).seq, 1);

    // The receiver has already delivered seq 1; it re-ACKs instead of
    // delivering twice.
    receiver.from_lower_layer(&retx, &mut rx);
    assert_eq!(rx.delivered.len(), 1);
    let ack = check_wire(rx.out.front().unwrap());
    assert_eq!((ack.is_nak(), ack.ack), (false, 1));

    shuttle_feedback(&mut rx, &mut sender, &mut tx);
    assert!(sender.is_idle());
    assert!(!tx.is_set());
}

// ---------------------------------------------------------------------------
// Scenario 4: corruption recovered by retransmission timeout
// ---------------------------------------------------------------------------

#[test]
fn corruption_recovered_by_timeout() {
    let mut sender = Sender::new();
    let mut receiver = Receiver::new();
    let mut tx = SenderHost::default();
    let mut rx = ReceiverHost::default();

    sender.from_upper_layer(b"hello", &mut tx);
    let mut pkt = tx.out.pop_front().unwrap();
    pkt.0[8] ^= 0x01; // one payload bit flips in transit

    receiver.from_lower_layer(&pkt, &mut rx);
    assert!(rx.delivered.is_empty());
    assert!(rx.out.is_empty()); // corrupted packets draw no feedback

    tx.fire(&mut sender);
    let retx = tx.out.pop_front().expect("no retransmission");
    receiver.from_lower_layer(&retx, &mut rx);
    assert_eq!(rx.delivered, vec![b"hello".to_vec()]);

    shuttle_feedback(&mut rx, &mut sender, &mut tx);
    assert!(sender.is_idle());
}

// ---------------------------------------------------------------------------
// Scenario 5: reordering with a late straggler
// ---------------------------------------------------------------------------

#[test]
fn reordering_delivers_in_order() {
    let mut sender = Sender::new();
    let mut receiver = Receiver::new();
    let mut tx = SenderHost::default();
    let mut rx = ReceiverHost::default();

    for msg in [&b"one"[..], b"two", b"three", b"four"] {
        sender.from_upper_layer(msg, &mut tx);
    }
    let pkts: Vec<RawPacket> = std::mem::take(&mut tx.out).into();

    // Channel order: 1, 3, 4, then the straggling 2.
    receiver.from_lower_layer(&pkts[0], &mut rx);
    receiver.from_lower_layer(&pkts[2], &mut rx);
    receiver.from_lower_layer(&pkts[3], &mut rx);
    shuttle_feedback(&mut rx, &mut sender, &mut tx);

    // Exactly one retransmission of seq 2 despite two NAK passes.
    assert_eq!(tx.out.len(), 1);
    assert_eq!(check_wire(tx.out.front().unwrap()).seq, 2);

    receiver.from_lower_layer(&pkts[1], &mut rx);
    assert_eq!(
        rx.delivered,
        vec![
            b"one".to_vec(),
            b"two".to_vec(),
            b"three".to_vec(),
            b"four".to_vec()
        ]
    );
    let ack = check_wire(rx.out.back().unwrap());
    assert_eq!((ack.is_nak(), ack.ack), (false, 4));

    shuttle_feedback(&mut rx, &mut sender, &mut tx);
    assert!(sender.is_idle());

    // The NAK-triggered copy of seq 2 finally arrives: stale, re-ACKed,
    // and the re-ACK is ignored by the idle sender.
    let retx = tx.out.pop_front().unwrap();
    receiver.from_lower_layer(&retx, &mut rx);
    assert_eq!(rx.delivered.len(), 4);
    shuttle_feedback(&mut rx, &mut sender, &mut tx);
    assert!(sender.is_idle());
}

// ---------------------------------------------------------------------------
// Scenario 6: ring overflow (simulator)
// ---------------------------------------------------------------------------

#[test]
fn ring_overflow_drains_in_order() {
    let mut sim = Simulator::new(SimConfig::default());
    let mut submitted = Vec::new();
    for i in 0..300u32 {
        let msg = vec![(i % 251) as u8; PAYLOAD_MAX];
        submitted.extend_from_slice(&msg);
        sim.offer_message(&msg);
    }
    sim.run();

    assert_eq!(sim.delivered_bytes(), submitted);
    assert_eq!(sim.stats().delivered, 300);
    assert!(sim.sender_idle());
    // Perfect channel: every frame crossed exactly once.
    assert_eq!(sim.stats().data_frames, 300);
    assert_eq!(sim.stats().dropped, 0);
}

// ---------------------------------------------------------------------------
// Sequence wrap: more than four trips around the sequence space
// ---------------------------------------------------------------------------

#[test]
fn transfer_survives_sequence_wraparound() {
    let mut sim = Simulator::new(SimConfig::default());
    let mut submitted = Vec::new();
    for i in 0..1200u32 {
        let msg = vec![(i % 256) as u8; PAYLOAD_MAX];
        submitted.extend_from_slice(&msg);
        sim.offer_message(&msg);
    }
    sim.run();

    assert_eq!(sim.delivered_bytes(), submitted);
    assert_eq!(sim.stats().delivered, 1200);
    assert!(sim.sender_idle());
}

// ---------------------------------------------------------------------------
// Boundary: empty message
// ---------------------------------------------------------------------------

#[test]
fn empty_message_is_a_no_op() {
    let mut sim = Simulator::new(SimConfig::default());
    sim.offer_message(b"");
    sim.run();

    assert!(sim.delivered().is_empty());
    assert_eq!(sim.stats().data_frames, 0);
    assert!(sim.sender_idle());
}

// ---------------------------------------------------------------------------
// Idempotence: duplicating every packet changes nothing
// ---------------------------------------------------------------------------

#[test]
fn full_duplication_is_idempotent() {
    let mut sim = Simulator::new(SimConfig {
        duplicate_rate: 1.0,
        seed: 7,
        ..SimConfig::default()
    });
    let mut submitted = Vec::new();
    for i in 0..40u8 {
        let msg = vec![i; 100];
        submitted.extend_from_slice(&msg);
        sim.offer_message(&msg);
    }
    sim.run();

    assert_eq!(sim.delivered_bytes(), submitted);
    assert!(sim.sender_idle());
}

// ---------------------------------------------------------------------------
// Soak: every fault at once, seeded
// ---------------------------------------------------------------------------

#[test]
fn lossy_channel_soak_is_byte_exact() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let mut sim = Simulator::new(SimConfig {
        loss_rate: 0.15,
        corrupt_rate: 0.1,
        duplicate_rate: 0.05,
        reorder_rate: 0.15,
        seed: 20240817,
        ..SimConfig::default()
    });

    let mut rng = StdRng::seed_from_u64(3);
    let mut submitted = Vec::new();
    for _ in 0..150 {
        let len = rng.random_range(1..=400);
        let msg: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        submitted.extend_from_slice(&msg);
        sim.offer_message(&msg);
    }
    sim.run();

    assert_eq!(sim.delivered_bytes(), submitted);
    assert!(sim.sender_idle());
    // The channel actually misbehaved during the run.
    let stats = sim.stats();
    assert!(stats.dropped > 0 && stats.corrupted > 0 && stats.reordered > 0);
}
