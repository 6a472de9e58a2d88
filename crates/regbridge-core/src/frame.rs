//! Host-side frame codec: builds inbound command frames and decodes the
//! bridge's reply stream.

use thiserror::Error;

use crate::api::DEFAULT_ADDRESS_FIELD_BYTES;
use crate::field::MAX_FIELD_BYTES;
use crate::{BridgeConfig, ConfigError};
use crate::{BREAK_BYTE, ESCAPE_BYTE, READ_BYTE, READ_DATA_BYTE, WRITE_BYTE};

/// Host-side encoding failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum FrameEncodeError {
    /// Address needs more bytes than the configured field width.
    #[error("address {addr:#06x} does not fit a {width}-byte address field")]
    AddressTooWide {
        /// Requested address.
        addr: u16,
        /// Configured address field width.
        width: usize,
    },
}

/// Malformed outbound stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ReplyDecodeError {
    /// Byte outside of a frame that is not an escape introducer.
    #[error("stray byte {0:#04x} outside a reply frame")]
    StrayByte(u8),
    /// Escape followed by something other than `READ_DATA` or `BREAK`.
    #[error("unexpected reply tag {0:#04x}")]
    UnexpectedTag(u8),
    /// Escape in the data section not followed by a second escape.
    #[error("unpaired escape before {0:#04x} in reply data")]
    UnpairedEscape(u8),
}

/// Decoded reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reply {
    /// Successful read carrying the data word.
    Data(u32),
    /// Read failed or timed out.
    Break,
}

/// Appends `bytes` to `out`, doubling every escape byte.
pub fn escape_into(out: &mut Vec<u8>, bytes: &[u8]) {
    for byte in bytes {
        if *byte == ESCAPE_BYTE {
            out.push(ESCAPE_BYTE);
        }
        out.push(*byte);
    }
}

/// Bare `E7 55` abort frame.
#[must_use]
pub const fn encode_break() -> [u8; 2] {
    [ESCAPE_BYTE, BREAK_BYTE]
}

/// Exact byte sequence the bridge emits for `reply`.
#[must_use]
pub fn encode_reply(reply: Reply) -> Vec<u8> {
    match reply {
        Reply::Data(word) => {
            let mut out = vec![ESCAPE_BYTE, READ_DATA_BYTE];
            escape_into(&mut out, &word.to_be_bytes());
            out
        }
        Reply::Break => encode_break().to_vec(),
    }
}

/// Builds escaped command frames for a given address field width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameEncoder {
    address_field_bytes: usize,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self {
            address_field_bytes: DEFAULT_ADDRESS_FIELD_BYTES,
        }
    }
}

impl FrameEncoder {
    /// Creates an encoder for `address_field_bytes`-wide address fields.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AddressFieldWidth`] outside `1..=4`.
    pub const fn new(address_field_bytes: usize) -> Result<Self, ConfigError> {
        if address_field_bytes == 0 || address_field_bytes > MAX_FIELD_BYTES {
            return Err(ConfigError::AddressFieldWidth(address_field_bytes));
        }
        Ok(Self {
            address_field_bytes,
        })
    }

    /// Encoder matching a bridge's parser configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AddressFieldWidth`] when the configured width
    /// is outside `1..=4`.
    pub const fn for_bridge(config: &BridgeConfig) -> Result<Self, ConfigError> {
        Self::new(config.parser.address_field_bytes)
    }

    /// Configured address field width.
    #[must_use]
    pub const fn address_field_bytes(&self) -> usize {
        self.address_field_bytes
    }

    /// `E7 13 <address>` frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameEncodeError::AddressTooWide`] when `addr` needs more
    /// bytes than the field holds.
    pub fn read(&self, addr: u16) -> Result<Vec<u8>, FrameEncodeError> {
        let mut out = vec![ESCAPE_BYTE, READ_BYTE];
        self.push_address(&mut out, addr)?;
        Ok(out)
    }

    /// `E7 23 <address> <data>` frame.
    ///
    /// # Errors
    ///
    /// Same as [`FrameEncoder::read`].
    pub fn write(&self, addr: u16, value: u32) -> Result<Vec<u8>, FrameEncodeError> {
        let mut out = vec![ESCAPE_BYTE, WRITE_BYTE];
        self.push_address(&mut out, addr)?;
        escape_into(&mut out, &value.to_be_bytes());
        Ok(out)
    }

    fn push_address(&self, out: &mut Vec<u8>, addr: u16) -> Result<(), FrameEncodeError> {
        let bytes = u32::from(addr).to_be_bytes();
        let (high, field) = bytes.split_at(MAX_FIELD_BYTES - self.address_field_bytes);
        if high.iter().any(|byte| *byte != 0) {
            return Err(FrameEncodeError::AddressTooWide {
                addr,
                width: self.address_field_bytes,
            });
        }
        escape_into(out, field);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
enum DecodeState {
    #[default]
    Idle,
    Tag,
    Data {
        bytes: [u8; 4],
        index: usize,
        escaped: bool,
    },
}

/// Incremental decoder for the bridge's outbound byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReplyDecoder {
    state: DecodeState,
}

impl ReplyDecoder {
    /// Creates a decoder positioned between frames.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when positioned between frames.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, DecodeState::Idle)
    }

    /// Consumes one byte; returns a reply when it completes a frame.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyDecodeError`] on a malformed stream; the decoder then
    /// resynchronizes on the next escape.
    pub fn push(&mut self, byte: u8) -> Result<Option<Reply>, ReplyDecodeError> {
        let (next, result) = match self.state {
            DecodeState::Idle if byte == ESCAPE_BYTE => (DecodeState::Tag, Ok(None)),
            DecodeState::Idle => (DecodeState::Idle, Err(ReplyDecodeError::StrayByte(byte))),
            DecodeState::Tag => match byte {
                READ_DATA_BYTE => (
                    DecodeState::Data {
                        bytes: [0; 4],
                        index: 0,
                        escaped: false,
                    },
                    Ok(None),
                ),
                BREAK_BYTE => (DecodeState::Idle, Ok(Some(Reply::Break))),
                other => (DecodeState::Idle, Err(ReplyDecodeError::UnexpectedTag(other))),
            },
            DecodeState::Data {
                mut bytes,
                index,
                escaped,
            } => {
                if escaped && byte != ESCAPE_BYTE {
                    (DecodeState::Idle, Err(ReplyDecodeError::UnpairedEscape(byte)))
                } else if byte == ESCAPE_BYTE && !escaped {
                    (
                        DecodeState::Data {
                            bytes,
                            index,
                            escaped: true,
                        },
                        Ok(None),
                    )
                } else {
                    bytes[index] = byte;
                    if index + 1 == bytes.len() {
                        (
                            DecodeState::Idle,
                            Ok(Some(Reply::Data(u32::from_be_bytes(bytes)))),
                        )
                    } else {
                        (
                            DecodeState::Data {
                                bytes,
                                index: index + 1,
                                escaped: false,
                            },
                            Ok(None),
                        )
                    }
                }
            }
        };
        self.state = next;
        result
    }

    /// Decodes a complete stream.
    ///
    /// # Errors
    ///
    /// Returns the first [`ReplyDecodeError`] encountered.
    pub fn decode_all(bytes: &[u8]) -> Result<Vec<Reply>, ReplyDecodeError> {
        let mut decoder = Self::new();
        let mut replies = Vec::new();
        for byte in bytes {
            replies.extend(decoder.push(*byte)?);
        }
        Ok(replies)
    }
}
