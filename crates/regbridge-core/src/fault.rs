use thiserror::Error;

use crate::field::FieldKind;
use crate::parser::Task;
use crate::Command;

/// Fatal desynchronization with the peer.
///
/// Only `ESCAPE`, `BREAK`, `READ` and `WRITE` may follow an escape introducer.
/// Anything else means the inbound stream is malformed and the session must be
/// abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ProtocolViolation {
    /// Illegal byte in command position, directly after an escape.
    #[error("byte {byte:#04x} ({command:?}) is not a command that may follow an escape")]
    IllegalCommand {
        /// Offending wire byte.
        byte: u8,
        /// Its decoded command.
        command: Command,
    },
    /// Illegal escape sequence inside an address or data field.
    #[error("byte {byte:#04x} ({command:?}) cannot follow an escape inside the {field} field")]
    IllegalEscapeSequence {
        /// Offending wire byte.
        byte: u8,
        /// Its decoded command.
        command: Command,
        /// Field being assembled when the byte arrived.
        field: FieldKind,
    },
}

impl ProtocolViolation {
    /// Wire byte that caused the violation.
    #[must_use]
    pub const fn byte(self) -> u8 {
        match self {
            Self::IllegalCommand { byte, .. } | Self::IllegalEscapeSequence { byte, .. } => byte,
        }
    }

    /// Decoded command of the offending byte.
    #[must_use]
    pub const fn command(self) -> Command {
        match self {
            Self::IllegalCommand { command, .. } | Self::IllegalEscapeSequence { command, .. } => {
                command
            }
        }
    }
}

/// Recoverable protocol anomaly. Logged and handled inline, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Anomaly {
    /// `ESCAPE ESCAPE` where a command byte was expected.
    DoubleEscape,
    /// A new `READ`/`WRITE` arrived after an escape in the middle of a field.
    CommandInterrupt {
        /// Field that was abandoned.
        field: FieldKind,
        /// Task the parser restarted with.
        restarted_as: Task,
    },
}

/// Invalid construction-time configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Storage image declares no valid address.
    #[error("storage image must declare at least one valid address")]
    EmptyImage,
    /// Storage image declares an address twice.
    #[error("address {0:#06x} is declared more than once")]
    DuplicateAddress(u16),
    /// Address field width outside `1..=4`.
    #[error("address field width must be between 1 and 4 bytes, got {0}")]
    AddressFieldWidth(usize),
    /// Read timeout of zero steps.
    #[error("read timeout must be at least one step")]
    ZeroReadTimeout,
}

/// Error returned by bridge stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BridgeError {
    /// The byte consumed on this step violated the protocol.
    #[error("protocol violation: {0}")]
    Violation(#[from] ProtocolViolation),
    /// An earlier violation is latched; only `reset` resumes the session.
    #[error("session aborted by earlier protocol violation: {0}")]
    FaultLatched(ProtocolViolation),
}

impl BridgeError {
    /// Underlying protocol violation.
    #[must_use]
    pub const fn violation(self) -> ProtocolViolation {
        match self {
            Self::Violation(violation) | Self::FaultLatched(violation) => violation,
        }
    }
}
