//! Core crate for the escaped register bridge.
//!
//! A byte stream of escaped commands is parsed into single-step register bus
//! requests, and read results are streamed back as escaped reply frames. All
//! stages advance together, one byte-step at a time.

/// Command byte encoding and classification.
pub mod command;
pub use command::{
    Command, BREAK_BYTE, COMMAND_ENCODING_TABLE, ESCAPE_BYTE, NULL_BYTE, READ_BYTE,
    READ_DATA_BYTE, WRITE_BYTE,
};

/// Multi-byte field accumulation with escape tracking.
pub mod field;
pub use field::{FieldAccumulator, FieldKind, DATA_FIELD_BYTES, MAX_FIELD_BYTES};

/// Fatal violations, recoverable anomalies and configuration errors.
pub mod fault;
pub use fault::{Anomaly, BridgeError, ConfigError, ProtocolViolation};

/// Register storage image and bus trait.
pub mod storage;
pub use storage::{
    capacity_for, BusRead, RegisterBus, RegisterFile, StorageImage, REFERENCE_CAPACITY,
    REFERENCE_IMAGE,
};

/// Inbound command parser state machine.
pub mod parser;
pub use parser::{CommandParser, ParserConfig, ParserOutput, ParserState, Task};

/// Outbound reply streamer state machine.
pub mod streamer;
pub use streamer::{ResponseStreamer, StreamerOutput, StreamerState};

/// Public host-facing API contract and integration types.
pub mod api;
pub use api::{
    BridgeConfig, BusRequest, RunBoundary, RunOutcome, RunState, StepOutcome, TraceEvent,
    TraceSink, DEFAULT_ADDRESS_FIELD_BYTES, DEFAULT_DRAIN_STEPS, DEFAULT_READ_TIMEOUT_STEPS,
};

/// Step-synchronous composition of parser, bus and streamer.
pub mod bridge;
pub use bridge::Bridge;

/// Host-side frame encoding and reply decoding.
pub mod frame;
pub use frame::{
    encode_break, encode_reply, escape_into, FrameEncodeError, FrameEncoder, Reply,
    ReplyDecodeError, ReplyDecoder,
};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
