//! Outbound reply state machine.
//!
//! Waits for the register bus to acknowledge a read and streams the reply one
//! byte per step:
//!
//! ```text
//! success: E7 03 <d3> <d2> <d1> <d0>   (each 0xE7 data byte doubled)
//! timeout: E7 55
//! ```

use log::{debug, trace};

use crate::api::DEFAULT_READ_TIMEOUT_STEPS;
use crate::{BREAK_BYTE, ESCAPE_BYTE, READ_DATA_BYTE};

const WORD_BYTES: u8 = 4;

/// Registered streamer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StreamerState {
    /// Idle until a read request is observed.
    #[default]
    AwaitRequest,
    /// Read issued; counting steps until the bus acknowledges.
    AwaitAck {
        /// Steps spent waiting so far.
        waited: u16,
    },
    /// Escape already sent; `READ_DATA` goes out next.
    EmitReadDataTag {
        /// Word captured from the acknowledge.
        word: u32,
    },
    /// Streaming the captured word most-significant byte first.
    EmitDataBytes {
        /// Word captured from the acknowledge.
        word: u32,
        /// Index of the byte being emitted, `0..4`.
        index: u8,
        /// `true` once the first half of a doubled escape has been sent.
        doubled: bool,
    },
    /// Escape already sent; `BREAK` goes out next.
    EmitBreak,
}

/// Per-step streamer outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamerOutput {
    /// Byte strobed onto the outbound stream on this step.
    pub byte: Option<u8>,
    /// The pending read timed out on this step.
    pub timed_out: bool,
}

/// Response streamer FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseStreamer {
    timeout_steps: u16,
    state: StreamerState,
}

impl Default for ResponseStreamer {
    fn default() -> Self {
        Self::new(DEFAULT_READ_TIMEOUT_STEPS)
    }
}

impl ResponseStreamer {
    /// Creates an idle streamer that gives up after `timeout_steps` steps
    /// without an acknowledge.
    #[must_use]
    pub const fn new(timeout_steps: u16) -> Self {
        Self {
            timeout_steps,
            state: StreamerState::AwaitRequest,
        }
    }

    /// Current registered state.
    #[must_use]
    pub const fn state(&self) -> StreamerState {
        self.state
    }

    /// Configured acknowledge timeout in steps.
    #[must_use]
    pub const fn timeout_steps(&self) -> u16 {
        self.timeout_steps
    }

    /// Returns `true` when no reply is pending or in flight.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, StreamerState::AwaitRequest)
    }

    /// Returns to [`StreamerState::AwaitRequest`], dropping any reply in flight.
    pub fn reset(&mut self) {
        self.state = StreamerState::AwaitRequest;
    }

    /// Computes the next streamer and its outputs without mutating `self`.
    ///
    /// `read_requested` is the read request pulse; `ack` carries the word when
    /// the bus acknowledges on this step.
    #[must_use]
    pub fn step(&self, read_requested: bool, ack: Option<u32>) -> (Self, StreamerOutput) {
        let mut output = StreamerOutput::default();

        if read_requested && !self.is_idle() {
            debug!("read request ignored while a reply is in flight");
        }
        if ack.is_some() && !matches!(self.state, StreamerState::AwaitAck { .. }) {
            debug!("acknowledge dropped outside of a pending read");
        }

        let state = match self.state {
            StreamerState::AwaitRequest => {
                if read_requested {
                    StreamerState::AwaitAck { waited: 0 }
                } else {
                    StreamerState::AwaitRequest
                }
            }
            StreamerState::AwaitAck { waited } => {
                if let Some(word) = ack {
                    output.byte = Some(ESCAPE_BYTE);
                    StreamerState::EmitReadDataTag { word }
                } else {
                    let waited = waited.saturating_add(1);
                    if waited >= self.timeout_steps {
                        debug!("read not acknowledged within {waited} steps");
                        output.byte = Some(ESCAPE_BYTE);
                        output.timed_out = true;
                        StreamerState::EmitBreak
                    } else {
                        StreamerState::AwaitAck { waited }
                    }
                }
            }
            StreamerState::EmitReadDataTag { word } => {
                output.byte = Some(READ_DATA_BYTE);
                StreamerState::EmitDataBytes {
                    word,
                    index: 0,
                    doubled: false,
                }
            }
            StreamerState::EmitDataBytes {
                word,
                index,
                doubled,
            } => {
                let byte = word.to_be_bytes()[usize::from(index)];
                output.byte = Some(byte);
                if byte == ESCAPE_BYTE && !doubled {
                    StreamerState::EmitDataBytes {
                        word,
                        index,
                        doubled: true,
                    }
                } else if index + 1 == WORD_BYTES {
                    StreamerState::AwaitRequest
                } else {
                    StreamerState::EmitDataBytes {
                        word,
                        index: index + 1,
                        doubled: false,
                    }
                }
            }
            StreamerState::EmitBreak => {
                output.byte = Some(BREAK_BYTE);
                StreamerState::AwaitRequest
            }
        };

        if let Some(byte) = output.byte {
            trace!("emit {byte:#04x}");
        }

        (
            Self {
                timeout_steps: self.timeout_steps,
                state,
            },
            output,
        )
    }

    /// Steps and commits in one call, returning the emitted byte.
    pub fn advance(&mut self, read_requested: bool, ack: Option<u32>) -> StreamerOutput {
        let (next, output) = self.step(read_requested, ack);
        *self = next;
        output
    }
}
