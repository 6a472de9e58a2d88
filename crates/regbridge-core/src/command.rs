//! Byte-level command vocabulary shared by the inbound and outbound streams.

/// Wire encoding of [`Command::Null`].
pub const NULL_BYTE: u8 = 0x00;
/// Wire encoding of [`Command::ReadData`].
pub const READ_DATA_BYTE: u8 = 0x03;
/// Wire encoding of [`Command::Read`].
pub const READ_BYTE: u8 = 0x13;
/// Wire encoding of [`Command::Write`].
pub const WRITE_BYTE: u8 = 0x23;
/// Wire encoding of [`Command::Break`].
pub const BREAK_BYTE: u8 = 0x55;
/// Wire encoding of [`Command::Escape`].
pub const ESCAPE_BYTE: u8 = 0xE7;

/// Closed command vocabulary of the escaped byte protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Command {
    /// Host requests a register read.
    Read,
    /// Host requests a register write.
    Write,
    /// Bridge tags a successful read reply.
    ReadData,
    /// Aborts the frame in progress, or reports a failed read.
    Break,
    /// Control introducer; doubled it encodes a literal `0xE7` data byte.
    Escape,
    /// Padding byte.
    Null,
    /// Any byte without an assigned meaning.
    Invalid,
}

/// Single source-of-truth byte/command table.
///
/// Any byte not present here decodes to [`Command::Invalid`].
pub const COMMAND_ENCODING_TABLE: &[(u8, Command)] = &[
    (NULL_BYTE, Command::Null),
    (READ_DATA_BYTE, Command::ReadData),
    (READ_BYTE, Command::Read),
    (WRITE_BYTE, Command::Write),
    (BREAK_BYTE, Command::Break),
    (ESCAPE_BYTE, Command::Escape),
];

impl Command {
    /// Decodes a wire byte. Total: unassigned bytes map to [`Command::Invalid`].
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            NULL_BYTE => Self::Null,
            READ_DATA_BYTE => Self::ReadData,
            READ_BYTE => Self::Read,
            WRITE_BYTE => Self::Write,
            BREAK_BYTE => Self::Break,
            ESCAPE_BYTE => Self::Escape,
            _ => Self::Invalid,
        }
    }

    /// Returns the canonical wire byte, or `None` for [`Command::Invalid`].
    #[must_use]
    pub const fn to_byte(self) -> Option<u8> {
        match self {
            Self::Null => Some(NULL_BYTE),
            Self::ReadData => Some(READ_DATA_BYTE),
            Self::Read => Some(READ_BYTE),
            Self::Write => Some(WRITE_BYTE),
            Self::Break => Some(BREAK_BYTE),
            Self::Escape => Some(ESCAPE_BYTE),
            Self::Invalid => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rstest::rstest;

    use super::{Command, COMMAND_ENCODING_TABLE};

    #[test]
    fn table_contains_unique_bytes_and_commands() {
        let bytes: HashSet<_> = COMMAND_ENCODING_TABLE.iter().map(|(b, _)| *b).collect();
        let commands: HashSet<_> = COMMAND_ENCODING_TABLE.iter().map(|(_, c)| *c).collect();
        assert_eq!(bytes.len(), COMMAND_ENCODING_TABLE.len());
        assert_eq!(commands.len(), COMMAND_ENCODING_TABLE.len());
        assert!(!commands.contains(&Command::Invalid));
    }

    #[rstest]
    #[case(0x00, Command::Null)]
    #[case(0x03, Command::ReadData)]
    #[case(0x13, Command::Read)]
    #[case(0x23, Command::Write)]
    #[case(0x55, Command::Break)]
    #[case(0xE7, Command::Escape)]
    #[case(0x01, Command::Invalid)]
    #[case(0xAA, Command::Invalid)]
    #[case(0xFF, Command::Invalid)]
    fn decodes_assigned_and_unassigned_bytes(#[case] byte: u8, #[case] expected: Command) {
        assert_eq!(Command::from_byte(byte), expected);
    }

    #[test]
    fn decode_then_encode_is_identity_for_every_assigned_byte() {
        for byte in 0_u8..=u8::MAX {
            match Command::from_byte(byte) {
                Command::Invalid => {
                    assert!(!COMMAND_ENCODING_TABLE.iter().any(|(b, _)| *b == byte));
                }
                command => assert_eq!(command.to_byte(), Some(byte)),
            }
        }
    }

    #[test]
    fn invalid_has_no_canonical_encoding() {
        assert_eq!(Command::Invalid.to_byte(), None);
    }
}
