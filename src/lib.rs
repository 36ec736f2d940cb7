//! `rdt` — reliable in-order message delivery over an unreliable
//! fixed-size-packet layer.
//!
//! The lower layer may drop, corrupt, duplicate, and reorder packets; the
//! upper layer on the receiving side still sees every submitted message
//! intact, in order, exactly once.
//!
//! # Architecture
//!
//! ```text
//!  upper (producer)                              upper (consumer)
//!        │ messages                                      ▲ messages
//!        ▼                                               │
//!  ┌───────────┐     data packets      ┌────────────┐    │
//!  │  Sender   │──────────────────────▶│  Receiver  │────┘
//!  │           │◀──────────────────────│            │
//!  └─────┬─────┘       ACK / NAK       └────────────┘
//!        │
//!   one-shot timer (host-provided, multiplexed by TimerQueue)
//! ```
//!
//! Each module has a single responsibility:
//! - [`crc`]       — CRC-16-CCITT checksumming
//! - [`packet`]    — 128-byte wire format (encode / parse / validate)
//! - [`seq`]       — modular sequence arithmetic and window predicates
//! - [`io`]        — contracts between the endpoints and their host
//! - [`timer`]     — per-packet deadlines over one one-shot timer
//! - [`sender`]    — sliding-window send-side state machine
//! - [`receiver`]  — reorder-buffer receive-side state machine
//! - [`simulator`] — deterministic lossy-channel harness for testing
//!
//! The endpoints are plain state machines: all packet submission, timer
//! manipulation, and upward delivery goes through the [`io`] traits, so a
//! host event framework (or the in-crate [`simulator`]) drives them without
//! the crate owning any sockets, threads, or clocks.

pub mod crc;
pub mod io;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod seq;
pub mod simulator;
pub mod timer;

pub use packet::{Frame, FrameError, RawPacket, PAYLOAD_MAX, PKT_SIZE};
pub use receiver::Receiver;
pub use sender::{Sender, NAK_TIMEOUT, SENDER_TIMEOUT};
pub use seq::{SeqN, MAX_SEQ, WINDOW_SIZE};
