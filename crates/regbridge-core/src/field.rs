//! Fixed-width big-endian field assembly from a single-byte stream.

use std::fmt;

/// Widest field the accumulator can hold (one bus word).
pub const MAX_FIELD_BYTES: usize = 4;

/// Width in bytes of a write-data field.
pub const DATA_FIELD_BYTES: usize = 4;

/// Which multi-byte field of a command frame is being assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum FieldKind {
    /// Register address following `READ`/`WRITE`.
    Address,
    /// Data word following a write address.
    WriteData,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address => f.write_str("address"),
            Self::WriteData => f.write_str("write data"),
        }
    }
}

/// Transient buffer assembling one field, most-significant byte first.
///
/// The accumulator is a plain value: every mutation returns the next
/// accumulator so that parser state can be staged and committed per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldAccumulator {
    bytes: [u8; MAX_FIELD_BYTES],
    index: usize,
    width: usize,
    escape_pending: bool,
    received: bool,
}

impl FieldAccumulator {
    /// Creates an empty accumulator for a field of `width` bytes.
    ///
    /// `width` is clamped to `1..=MAX_FIELD_BYTES`.
    #[must_use]
    pub const fn new(width: usize) -> Self {
        let width = if width == 0 {
            1
        } else if width > MAX_FIELD_BYTES {
            MAX_FIELD_BYTES
        } else {
            width
        };
        Self {
            bytes: [0; MAX_FIELD_BYTES],
            index: 0,
            width,
            escape_pending: false,
            received: false,
        }
    }

    /// Field width in bytes.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Number of data bytes accumulated so far.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Returns `true` when an escape introducer is awaiting its second byte.
    #[must_use]
    pub const fn escape_pending(&self) -> bool {
        self.escape_pending
    }

    /// Returns `true` once any data byte, zero included, has been accumulated.
    #[must_use]
    pub const fn has_received(&self) -> bool {
        self.received
    }

    /// Returns `true` when `index == width`.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.index == self.width
    }

    /// Appends one data byte and clears any pending escape.
    ///
    /// Bytes pushed into a complete field are dropped.
    #[must_use]
    pub const fn with_byte(mut self, byte: u8) -> Self {
        if self.index < self.width {
            self.bytes[self.index] = byte;
            self.index += 1;
        }
        self.escape_pending = false;
        self.received = true;
        self
    }

    /// Sets or clears the escape-pending flag.
    #[must_use]
    pub const fn with_escape_pending(mut self, pending: bool) -> Self {
        self.escape_pending = pending;
        self
    }

    /// Returns an empty accumulator of the same width.
    #[must_use]
    pub const fn cleared(self) -> Self {
        Self::new(self.width)
    }

    /// Reassembles the accumulated bytes big-endian.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.bytes[..self.index]
            .iter()
            .fold(0_u32, |acc, byte| (acc << 8) | u32::from(*byte))
    }
}
