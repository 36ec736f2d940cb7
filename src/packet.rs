//! Wire-format definitions for protocol frames.
//!
//! Every unit exchanged with the lower layer is an opaque, fixed-size
//! [`RawPacket`] of [`PKT_SIZE`] bytes.  This module is responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Encoding a typed [`Frame`] into a [`RawPacket`], filling the checksum.
//! - Parsing a [`RawPacket`] back into a [`Frame`], rejecting corrupted or
//!   malformed input.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Layout
//!
//! | Offset | Field    | Size  | Notes                                 |
//! |--------|----------|-------|---------------------------------------|
//! | 0      | seq      | 1 B   | data-frame sequence number            |
//! | 1      | ack      | 1 B   | cumulative-ACK base or NAK target     |
//! | 2      | len      | 1 B   | 0 ≤ len ≤ 122                         |
//! | 3      | flags    | 1 B   | bits 1..7 must be zero on the wire    |
//! | 4      | checksum | 2 B   | CRC-16-CCITT, little-endian           |
//! | 6      | payload  | len B |                                       |
//!
//! The checksum covers bytes `[0..4)` followed by `[6..6 + len)`; the two
//! checksum bytes themselves are skipped.

use thiserror::Error;

use crate::crc;
use crate::seq::SeqN;

/// Fixed size of every lower-layer packet, in bytes.
pub const PKT_SIZE: usize = 128;

/// Size of the frame header (seq, ack, len, flags, checksum).
pub const HEADER_SIZE: usize = 6;

/// Maximum payload bytes a single frame can carry.
pub const PAYLOAD_MAX: usize = PKT_SIZE - HEADER_SIZE;

/// Values for the `flags` header field.
///
/// Only the least-significant bit is meaningful on the wire; it
/// distinguishes the two control-frame kinds the receiver can emit.  Data
/// frames always carry `ACK` (zero).
pub mod flags {
    /// Cumulative acknowledgement (also the value on every data frame).
    pub const ACK: u8 = 0b0000_0000;
    /// Negative acknowledgement requesting one specific sequence number.
    pub const NAK: u8 = 0b0000_0001;
}

// ---------------------------------------------------------------------------
// RawPacket
// ---------------------------------------------------------------------------

/// An opaque fixed-size packet — the unit the lower layer transports.
///
/// The lower layer sees only these bytes; all structure is imposed by
/// [`Frame::encode`] / [`Frame::parse`] at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket(pub [u8; PKT_SIZE]);

impl Default for RawPacket {
    fn default() -> Self {
        Self([0; PKT_SIZE])
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// A parsed protocol frame: header fields plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sequence number of a data frame; meaningless on control frames.
    pub seq: SeqN,
    /// Cumulative-ACK base or NAK target; meaningless on data frames.
    pub ack: SeqN,
    /// One of the [`flags`] values.
    pub flags: u8,
    /// Payload bytes (`len` on the wire); empty on control frames.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build a data frame.
    ///
    /// # Panics
    ///
    /// Panics in debug mode when `payload` exceeds [`PAYLOAD_MAX`]; the
    /// packetiser never produces such a fragment.
    pub fn data(seq: SeqN, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= PAYLOAD_MAX);
        Self {
            seq,
            ack: 0,
            flags: flags::ACK,
            payload: payload.to_vec(),
        }
    }

    /// Build a cumulative-ACK control frame.
    pub fn ack(ack: SeqN) -> Self {
        Self {
            seq: 0, // not a duplex protocol; the data direction owns seq
            ack,
            flags: flags::ACK,
            payload: Vec::new(),
        }
    }

    /// Build a NAK control frame requesting retransmission of `ack`.
    pub fn nak(ack: SeqN) -> Self {
        Self {
            seq: 0,
            ack,
            flags: flags::NAK,
            payload: Vec::new(),
        }
    }

    /// `true` when this is a NAK control frame.
    pub fn is_nak(&self) -> bool {
        self.flags & flags::NAK != 0
    }

    /// Encode this frame into a wire packet, filling the checksum.
    pub fn encode(&self) -> RawPacket {
        let mut buf = [0u8; PKT_SIZE];
        buf[0] = self.seq;
        buf[1] = self.ack;
        buf[2] = self.payload.len() as u8;
        buf[3] = self.flags;
        buf[HEADER_SIZE..HEADER_SIZE + self.payload.len()].copy_from_slice(&self.payload);

        let crc = crc::calc(
            &buf[HEADER_SIZE..HEADER_SIZE + self.payload.len()],
            crc::calc(&buf[0..4], 0),
        );
        buf[4..6].copy_from_slice(&crc.to_le_bytes());
        RawPacket(buf)
    }

    /// Parse a wire packet, validating length, reserved flag bits, and the
    /// checksum.
    ///
    /// Any failure means the packet is corrupted; callers drop it silently
    /// per the protocol's error policy.
    pub fn parse(pkt: &RawPacket) -> Result<Self, FrameError> {
        let buf = &pkt.0;
        let len = buf[2] as usize;
        if len > PAYLOAD_MAX {
            return Err(FrameError::Oversize { len });
        }
        if buf[3] & 0xfe != 0 {
            return Err(FrameError::ReservedFlags { flags: buf[3] });
        }

        let stored = u16::from_le_bytes([buf[4], buf[5]]);
        let computed = crc::calc(
            &buf[HEADER_SIZE..HEADER_SIZE + len],
            crc::calc(&buf[0..4], 0),
        );
        if stored != computed {
            return Err(FrameError::Checksum { stored, computed });
        }

        Ok(Self {
            seq: buf[0],
            ack: buf[1],
            flags: buf[3],
            payload: buf[HEADER_SIZE..HEADER_SIZE + len].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Why a wire packet failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The `len` field exceeds the payload capacity.
    #[error("payload length {len} exceeds {PAYLOAD_MAX}")]
    Oversize { len: usize },
    /// Reserved high bits of `flags` are set.
    #[error("reserved flag bits set: {flags:#010b}")]
    ReservedFlags { flags: u8 },
    /// The stored checksum does not match the recomputed value.
    #[error("checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    Checksum { stored: u16, computed: u16 },
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
