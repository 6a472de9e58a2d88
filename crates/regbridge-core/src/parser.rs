//! Inbound protocol state machine.
//!
//! Consumes one valid byte per step and turns escaped command frames into
//! register-bus request pulses:
//!
//! ```text
//! E7 <READ|WRITE> <address field> [<data field> if WRITE]
//! ```
//!
//! Literal `0xE7` bytes inside a field travel doubled. `E7 55` aborts the frame,
//! and `E7 <READ|WRITE>` mid-field restarts it with the new task.

use log::{debug, trace, warn};

use crate::api::{BusRequest, DEFAULT_ADDRESS_FIELD_BYTES};
use crate::field::{FieldAccumulator, FieldKind, DATA_FIELD_BYTES, MAX_FIELD_BYTES};
use crate::{Anomaly, Command, ConfigError, ProtocolViolation, NULL_BYTE};

/// Transaction a frame was opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Task {
    /// Read the addressed register.
    Read,
    /// Write the addressed register.
    Write,
}

/// Static parser configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ParserConfig {
    /// Width of the address field on the wire, `1..=4` bytes.
    pub address_field_bytes: usize,
    /// Drops zero bytes that arrive before the first byte of a fresh field.
    pub skip_leading_nulls: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            address_field_bytes: DEFAULT_ADDRESS_FIELD_BYTES,
            skip_leading_nulls: false,
        }
    }
}

impl ParserConfig {
    /// Checks the configured field width.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AddressFieldWidth`] when the width is outside
    /// `1..=4`.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.address_field_bytes == 0 || self.address_field_bytes > MAX_FIELD_BYTES {
            return Err(ConfigError::AddressFieldWidth(self.address_field_bytes));
        }
        Ok(())
    }
}

/// Registered parser state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ParserState {
    /// Waiting for an escape introducer; everything else is ignored.
    #[default]
    AwaitEscape,
    /// Escape seen; the next byte selects the command.
    ParseCommand,
    /// Assembling the address field.
    ParseAddress {
        /// Transaction the frame was opened for.
        task: Task,
        /// Partially assembled address.
        field: FieldAccumulator,
    },
    /// Assembling the data word of a write.
    ParseWriteData {
        /// Address assembled by the preceding field.
        address: u32,
        /// Partially assembled data word.
        field: FieldAccumulator,
    },
}

/// Per-step parser outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ParserOutput {
    /// Bus request pulse issued on this step.
    pub request: Option<BusRequest>,
    /// Recoverable anomaly detected on this step.
    pub anomaly: Option<Anomaly>,
}

enum FieldEvent {
    Pending(FieldAccumulator),
    Complete(u32),
    Abort,
    Interrupt(Task),
}

/// Command parser FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CommandParser {
    config: ParserConfig,
    state: ParserState,
}

impl CommandParser {
    /// Creates an idle parser.
    ///
    /// # Errors
    ///
    /// Propagates [`ParserConfig::validate`] failures.
    pub const fn new(config: ParserConfig) -> Result<Self, ConfigError> {
        if let Err(error) = config.validate() {
            return Err(error);
        }
        Ok(Self {
            config,
            state: ParserState::AwaitEscape,
        })
    }

    /// Current registered state.
    #[must_use]
    pub const fn state(&self) -> ParserState {
        self.state
    }

    /// Parser configuration.
    #[must_use]
    pub const fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Returns `true` when no frame is in progress.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self.state, ParserState::AwaitEscape)
    }

    /// Returns to [`ParserState::AwaitEscape`], discarding any partial frame.
    pub fn reset(&mut self) {
        self.state = ParserState::AwaitEscape;
    }

    /// Computes the next parser and its outputs without mutating `self`.
    ///
    /// `None` means no valid byte on this step; the parser holds its state.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation`] when an escape is followed by a byte
    /// outside the legal set for the current state.
    pub fn step(&self, input: Option<u8>) -> Result<(Self, ParserOutput), ProtocolViolation> {
        let mut output = ParserOutput::default();
        let Some(byte) = input else {
            return Ok((*self, output));
        };
        let command = Command::from_byte(byte);

        let state = match self.state {
            ParserState::AwaitEscape => {
                if command == Command::Escape {
                    ParserState::ParseCommand
                } else {
                    trace!("ignoring byte {byte:#04x} outside a frame");
                    ParserState::AwaitEscape
                }
            }
            ParserState::ParseCommand => match command {
                Command::Read => self.open_field(Task::Read),
                Command::Write => self.open_field(Task::Write),
                Command::Break => ParserState::AwaitEscape,
                Command::Escape => {
                    warn!("double escape in command position");
                    output.anomaly = Some(Anomaly::DoubleEscape);
                    ParserState::AwaitEscape
                }
                Command::ReadData | Command::Null | Command::Invalid => {
                    return Err(ProtocolViolation::IllegalCommand { byte, command });
                }
            },
            ParserState::ParseAddress { task, field } => {
                match self.absorb(field, byte, FieldKind::Address)? {
                    FieldEvent::Pending(field) => ParserState::ParseAddress { task, field },
                    FieldEvent::Complete(address) => match task {
                        Task::Write => ParserState::ParseWriteData {
                            address,
                            field: FieldAccumulator::new(DATA_FIELD_BYTES),
                        },
                        Task::Read => {
                            output.request = Self::read_request(address);
                            ParserState::AwaitEscape
                        }
                    },
                    FieldEvent::Abort => ParserState::AwaitEscape,
                    FieldEvent::Interrupt(task) => {
                        output.anomaly = Some(Self::interrupted(FieldKind::Address, task));
                        self.open_field(task)
                    }
                }
            }
            ParserState::ParseWriteData { address, field } => {
                match self.absorb(field, byte, FieldKind::WriteData)? {
                    FieldEvent::Pending(field) => ParserState::ParseWriteData { address, field },
                    FieldEvent::Complete(value) => {
                        output.request = Self::write_request(address, value);
                        ParserState::AwaitEscape
                    }
                    FieldEvent::Abort => ParserState::AwaitEscape,
                    FieldEvent::Interrupt(task) => {
                        output.anomaly = Some(Self::interrupted(FieldKind::WriteData, task));
                        self.open_field(task)
                    }
                }
            }
        };

        Ok((
            Self {
                config: self.config,
                state,
            },
            output,
        ))
    }

    /// Steps and commits in one call.
    ///
    /// # Errors
    ///
    /// Same as [`CommandParser::step`]; on error the parser is left unchanged.
    pub fn advance(&mut self, input: Option<u8>) -> Result<ParserOutput, ProtocolViolation> {
        let (next, output) = self.step(input)?;
        *self = next;
        Ok(output)
    }

    const fn open_field(&self, task: Task) -> ParserState {
        ParserState::ParseAddress {
            task,
            field: FieldAccumulator::new(self.config.address_field_bytes),
        }
    }

    fn absorb(
        &self,
        field: FieldAccumulator,
        byte: u8,
        kind: FieldKind,
    ) -> Result<FieldEvent, ProtocolViolation> {
        let command = Command::from_byte(byte);

        if field.escape_pending() {
            return match command {
                Command::Null => Ok(FieldEvent::Pending(field)),
                Command::Break => Ok(FieldEvent::Abort),
                Command::Escape => Ok(Self::accept(field.with_byte(byte))),
                Command::Read => Ok(FieldEvent::Interrupt(Task::Read)),
                Command::Write => Ok(FieldEvent::Interrupt(Task::Write)),
                Command::ReadData | Command::Invalid => {
                    Err(ProtocolViolation::IllegalEscapeSequence {
                        byte,
                        command,
                        field: kind,
                    })
                }
            };
        }

        if command == Command::Escape {
            return Ok(FieldEvent::Pending(field.with_escape_pending(true)));
        }

        if byte == NULL_BYTE && self.config.skip_leading_nulls && !field.has_received() {
            trace!("dropping leading null in {kind} field");
            return Ok(FieldEvent::Pending(field));
        }

        Ok(Self::accept(field.with_byte(byte)))
    }

    fn accept(field: FieldAccumulator) -> FieldEvent {
        if field.is_complete() {
            FieldEvent::Complete(field.value())
        } else {
            FieldEvent::Pending(field)
        }
    }

    fn interrupted(field: FieldKind, task: Task) -> Anomaly {
        warn!("{task:?} command interrupted the {field} field");
        Anomaly::CommandInterrupt {
            field,
            restarted_as: task,
        }
    }

    fn read_request(address: u32) -> Option<BusRequest> {
        match u16::try_from(address) {
            Ok(addr) => Some(BusRequest::Read { addr }),
            Err(_) => {
                debug!("dropping read of out-of-range address {address:#010x}");
                None
            }
        }
    }

    fn write_request(address: u32, value: u32) -> Option<BusRequest> {
        match u16::try_from(address) {
            Ok(addr) => Some(BusRequest::Write { addr, value }),
            Err(_) => {
                debug!("dropping write of out-of-range address {address:#010x}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{CommandParser, ParserConfig, ParserOutput, ParserState, Task};
    use crate::api::BusRequest;
    use crate::field::FieldKind;
    use crate::{Anomaly, Command, ConfigError, ProtocolViolation};

    fn parser(address_field_bytes: usize) -> CommandParser {
        CommandParser::new(ParserConfig {
            address_field_bytes,
            ..ParserConfig::default()
        })
        .expect("valid parser config")
    }

    fn feed(
        parser: &mut CommandParser,
        bytes: &[u8],
    ) -> Result<Vec<ParserOutput>, ProtocolViolation> {
        bytes
            .iter()
            .map(|byte| parser.advance(Some(*byte)))
            .filter(|output| !matches!(output, Ok(ParserOutput { request: None, anomaly: None })))
            .collect()
    }

    fn requests(parser: &mut CommandParser, bytes: &[u8]) -> Vec<BusRequest> {
        feed(parser, bytes)
            .expect("well-formed stream")
            .into_iter()
            .filter_map(|output| output.request)
            .collect()
    }

    #[test]
    fn default_config_uses_bus_word_wide_addresses() {
        let config = ParserConfig::default();
        assert_eq!(config.address_field_bytes, 4);
        assert!(!config.skip_leading_nulls);
    }

    #[rstest]
    #[case(0)]
    #[case(5)]
    fn rejects_unsupported_address_width(#[case] width: usize) {
        let config = ParserConfig {
            address_field_bytes: width,
            ..ParserConfig::default()
        };
        assert_eq!(
            CommandParser::new(config),
            Err(ConfigError::AddressFieldWidth(width))
        );
    }

    #[test]
    fn ignores_everything_before_escape() {
        let mut parser = parser(4);
        assert!(requests(&mut parser, &[0x13, 0x00, 0x23, 0x55, 0x42]).is_empty());
        assert!(parser.is_idle());
    }

    #[test]
    fn missing_byte_holds_state() {
        let mut parser = parser(4);
        parser.advance(Some(0xE7)).expect("escape");
        let before = parser.state();
        assert_eq!(parser.advance(None), Ok(ParserOutput::default()));
        assert_eq!(parser.state(), before);
    }

    #[test]
    fn read_frame_issues_single_read_pulse() {
        let mut parser = parser(4);
        assert_eq!(
            requests(&mut parser, &[0xE7, 0x13, 0x00, 0x00, 0x00, 0x03]),
            vec![BusRequest::Read { addr: 3 }]
        );
        assert!(parser.is_idle());
    }

    #[test]
    fn two_byte_address_field() {
        let mut parser = parser(2);
        assert_eq!(
            requests(&mut parser, &[0xE7, 0x13, 0x01, 0x02]),
            vec![BusRequest::Read { addr: 0x0102 }]
        );
    }

    #[test]
    fn write_frame_collects_address_then_data() {
        let mut parser = parser(4);
        let stream = [
            0xE7, 0x23, 0x00, 0x00, 0x00, 0x02, 0xAA, 0xE7, 0xE7, 0x55, 0xAA,
        ];
        assert_eq!(
            requests(&mut parser, &stream),
            vec![BusRequest::Write {
                addr: 2,
                value: 0xAAE7_55AA
            }]
        );
    }

    #[test]
    fn doubled_escape_in_address_is_literal() {
        let mut parser = parser(4);
        assert_eq!(
            requests(&mut parser, &[0xE7, 0x13, 0x00, 0x00, 0x00, 0xE7, 0xE7]),
            vec![BusRequest::Read { addr: 0xE7 }]
        );
    }

    #[test]
    fn break_inside_field_aborts_frame() {
        let mut parser = parser(4);
        let stream = [0xE7, 0x23, 0x00, 0x00, 0x00, 0x01, 0xAA, 0xE7, 0x55];
        assert!(requests(&mut parser, &stream).is_empty());
        assert!(parser.is_idle());
    }

    #[test]
    fn break_in_command_position_returns_to_idle() {
        let mut parser = parser(4);
        assert!(requests(&mut parser, &[0xE7, 0x55, 0x00, 0x13]).is_empty());
        assert!(parser.is_idle());
    }

    #[test]
    fn null_after_escape_in_field_is_padding() {
        let mut parser = parser(2);
        let outputs = requests(&mut parser, &[0xE7, 0x13, 0x00, 0xE7, 0x00, 0x00, 0xE7, 0xE7]);
        assert_eq!(outputs, vec![BusRequest::Read { addr: 0x00E7 }]);
    }

    #[test]
    fn double_escape_in_command_position_is_recoverable() {
        let mut parser = parser(4);
        let outputs = feed(&mut parser, &[0xE7, 0xE7]).expect("recoverable");
        assert_eq!(
            outputs,
            vec![ParserOutput {
                request: None,
                anomaly: Some(Anomaly::DoubleEscape)
            }]
        );
        assert!(parser.is_idle());
    }

    #[rstest]
    #[case(0x13, Task::Read)]
    #[case(0x23, Task::Write)]
    fn command_mid_field_restarts_address(#[case] byte: u8, #[case] task: Task) {
        let mut parser = parser(4);
        let outputs = feed(&mut parser, &[0xE7, 0x23, 0x00, 0x00, 0xE7, byte]).expect("recoverable");
        assert_eq!(
            outputs,
            vec![ParserOutput {
                request: None,
                anomaly: Some(Anomaly::CommandInterrupt {
                    field: FieldKind::Address,
                    restarted_as: task,
                })
            }]
        );
        match parser.state() {
            ParserState::ParseAddress { task: restarted, field } => {
                assert_eq!(restarted, task);
                assert_eq!(field.index(), 0);
                assert!(!field.escape_pending());
            }
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn command_interrupt_in_data_field_reads_new_address() {
        let mut parser = parser(4);
        let stream = [
            0xE7, 0x23, 0x00, 0x00, 0x00, 0x01, 0xAA, 0xE7, 0x13, 0x00, 0x00, 0x00, 0x01,
        ];
        assert_eq!(
            requests(&mut parser, &stream),
            vec![BusRequest::Read { addr: 1 }]
        );
    }

    #[rstest]
    #[case(0x00, Command::Null)]
    #[case(0x03, Command::ReadData)]
    #[case(0x42, Command::Invalid)]
    fn illegal_command_after_escape_is_fatal(#[case] byte: u8, #[case] command: Command) {
        let mut parser = parser(4);
        let result = feed(&mut parser, &[0xE7, byte]);
        assert_eq!(
            result,
            Err(ProtocolViolation::IllegalCommand { byte, command })
        );
    }

    #[rstest]
    #[case(0x42, Command::Invalid)]
    #[case(0x03, Command::ReadData)]
    fn illegal_escape_inside_field_is_fatal(#[case] byte: u8, #[case] command: Command) {
        let mut parser = parser(4);
        let result = feed(&mut parser, &[0xE7, 0x23, 0x00, 0x00, 0x00, 0x00, 0x11, 0xE7, byte]);
        assert_eq!(
            result,
            Err(ProtocolViolation::IllegalEscapeSequence {
                byte,
                command,
                field: FieldKind::WriteData,
            })
        );
    }

    #[test]
    fn failed_step_leaves_parser_unchanged() {
        let mut parser = parser(4);
        parser.advance(Some(0xE7)).expect("escape");
        let before = parser;
        assert!(parser.advance(Some(0x42)).is_err());
        assert_eq!(parser, before);
    }

    #[test]
    fn out_of_range_address_is_dropped_without_request() {
        let mut parser = parser(4);
        assert!(requests(&mut parser, &[0xE7, 0x13, 0x00, 0x01, 0x00, 0x00]).is_empty());
        assert!(parser.is_idle());
    }

    #[test]
    fn out_of_range_write_still_consumes_data_field() {
        let mut parser = parser(4);
        let stream = [
            0xE7, 0x23, 0x01, 0x00, 0x00, 0x00, 0x11, 0x22, 0x33, 0x44, 0xE7, 0x13, 0x00, 0x00,
            0x00, 0x02,
        ];
        assert_eq!(
            requests(&mut parser, &stream),
            vec![BusRequest::Read { addr: 2 }]
        );
    }

    #[test]
    fn zero_bytes_are_data_by_default() {
        let mut parser = parser(2);
        assert_eq!(
            requests(&mut parser, &[0xE7, 0x13, 0x00, 0x03]),
            vec![BusRequest::Read { addr: 3 }]
        );
    }

    #[test]
    fn leading_nulls_are_dropped_when_enabled() {
        let mut parser = CommandParser::new(ParserConfig {
            address_field_bytes: 2,
            skip_leading_nulls: true,
        })
        .expect("valid parser config");
        // Leading zeros are padding, the zero after 0x01 is data.
        assert_eq!(
            requests(&mut parser, &[0xE7, 0x13, 0x00, 0x00, 0x01, 0x00]),
            vec![BusRequest::Read { addr: 0x0100 }]
        );
    }

    #[test]
    fn reset_discards_partial_frame() {
        let mut parser = parser(4);
        feed(&mut parser, &[0xE7, 0x13, 0x00]).expect("partial frame");
        assert!(!parser.is_idle());
        parser.reset();
        assert!(parser.is_idle());
    }
}
