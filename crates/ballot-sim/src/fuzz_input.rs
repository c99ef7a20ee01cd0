//! Simulation parameters decoded from fuzzer bytes.
//!
//! # Wire Format
//!
//! 15 bytes, little-endian, no header:
//!
//! ```text
//! offset  size  field
//!      0     4  rng_seed
//!      4     1  nr_nodes
//!      5     2  election_timeout_min
//!      7     2  election_timeout_max
//!      9     2  heartbeat_interval
//!     11     2  max_network_delay
//!     13     2  max_steps
//! ```
//!
//! Decoding never fails. A field that does not fit in the remaining bytes
//! decodes as 0 and the result is always normalized, so any byte string is a
//! valid input.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Parameters of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuzzInput {
    pub rng_seed: u32,
    pub nr_nodes: u8,
    pub election_timeout_min: u16,
    pub election_timeout_max: u16,
    pub heartbeat_interval: u16,
    pub max_network_delay: u16,
    pub max_steps: u16,
}

impl FuzzInput {
    /// Length of the encoded form.
    pub const ENCODED_LEN: usize = 15;

    pub const MIN_NODES: u8 = 3;
    pub const MAX_NODES: u8 = 7;
    pub const MIN_ELECTION_TIMEOUT: u16 = 50;
    pub const MAX_ELECTION_TIMEOUT_MIN: u16 = 1000;
    pub const MAX_ELECTION_TIMEOUT: u16 = 2000;
    pub const MIN_HEARTBEAT: u16 = 10;
    pub const MIN_NETWORK_DELAY: u16 = 1;
    pub const MAX_NETWORK_DELAY: u16 = 500;
    pub const MIN_STEPS: u16 = 100;
    pub const MAX_STEPS: u16 = 50_000;

    /// Decodes and normalizes an input from raw bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut buf = data;
        let mut input = Self {
            rng_seed: read_u32(&mut buf),
            nr_nodes: read_u8(&mut buf),
            election_timeout_min: read_u16(&mut buf),
            election_timeout_max: read_u16(&mut buf),
            heartbeat_interval: read_u16(&mut buf),
            max_network_delay: read_u16(&mut buf),
            max_steps: read_u16(&mut buf),
        };
        input.normalize();
        input
    }

    /// Encodes this input in the 15-byte wire format.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.put_u32_le(self.rng_seed);
        buf.put_u8(self.nr_nodes);
        buf.put_u16_le(self.election_timeout_min);
        buf.put_u16_le(self.election_timeout_max);
        buf.put_u16_le(self.heartbeat_interval);
        buf.put_u16_le(self.max_network_delay);
        buf.put_u16_le(self.max_steps);
        buf
    }

    /// Clamps every field into its valid range.
    ///
    /// Afterwards `election_timeout_min < election_timeout_max` and
    /// `heartbeat_interval <= election_timeout_min / 2`.
    pub fn normalize(&mut self) {
        self.nr_nodes = self.nr_nodes.clamp(Self::MIN_NODES, Self::MAX_NODES);
        self.election_timeout_min = self
            .election_timeout_min
            .clamp(Self::MIN_ELECTION_TIMEOUT, Self::MAX_ELECTION_TIMEOUT_MIN);
        self.election_timeout_max = self
            .election_timeout_max
            .clamp(self.election_timeout_min + 1, Self::MAX_ELECTION_TIMEOUT);
        self.heartbeat_interval = self
            .heartbeat_interval
            .clamp(Self::MIN_HEARTBEAT, self.election_timeout_min / 2);
        self.max_network_delay = self
            .max_network_delay
            .clamp(Self::MIN_NETWORK_DELAY, Self::MAX_NETWORK_DELAY);
        self.max_steps = self.max_steps.clamp(Self::MIN_STEPS, Self::MAX_STEPS);
    }

    /// Returns a normalized copy.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Lowercase hex of the encoded form, as printed in reproduction reports.
    pub fn to_hex(&self) -> String {
        to_hex(&self.to_bytes())
    }
}

impl Default for FuzzInput {
    fn default() -> Self {
        Self {
            rng_seed: 0,
            nr_nodes: 5,
            election_timeout_min: 150,
            election_timeout_max: 300,
            heartbeat_interval: 50,
            max_network_delay: 100,
            max_steps: 10_000,
        }
    }
}

fn read_u32(buf: &mut &[u8]) -> u32 {
    if buf.remaining() < 4 {
        return 0;
    }
    buf.get_u32_le()
}

fn read_u16(buf: &mut &[u8]) -> u16 {
    if buf.remaining() < 2 {
        return 0;
    }
    buf.get_u16_le()
}

fn read_u8(buf: &mut &[u8]) -> u8 {
    if buf.remaining() < 1 {
        return 0;
    }
    buf.get_u8()
}

/// Lowercase hex encoding of `bytes`.
pub fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Parses lowercase or uppercase hex. Returns `None` on odd length or a bad digit.
pub fn from_hex(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}
