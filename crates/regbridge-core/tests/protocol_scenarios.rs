//! End-to-end wire scenarios driven through the bridge over the reference
//! register file.

use log as _;
use proptest as _;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

use regbridge_core::{
    Anomaly, Bridge, BridgeConfig, BridgeError, BusRequest, Command, FieldKind, ParserConfig,
    ParserState, ProtocolViolation, RunState, Task, DEFAULT_DRAIN_STEPS,
};
use rstest::rstest;

fn bridge() -> Bridge {
    Bridge::new(BridgeConfig::default()).expect("default config is valid")
}

fn exchange(bytes: &[u8]) -> Vec<u8> {
    bridge()
        .exchange(bytes, DEFAULT_DRAIN_STEPS)
        .expect("stream is well formed")
}

#[rstest]
#[case::plain_read(
    &[0xE7, 0x13, 0x00, 0x00, 0x00, 0x03],
    &[0xE7, 0x03, 0x10, 0x20, 0x30, 0x40]
)]
#[case::escaped_address(
    &[0xE7, 0x13, 0x00, 0x00, 0x00, 0xE7, 0xE7],
    &[0xE7, 0x03, 0xDE, 0xAD, 0xBE, 0xEF]
)]
#[case::write_then_read_with_escaped_data(
    &[
        0xE7, 0x23, 0x00, 0x00, 0x00, 0x02, 0xAA, 0xE7, 0xE7, 0x55, 0xAA,
        0xE7, 0x13, 0x00, 0x00, 0x00, 0x02,
    ],
    &[0xE7, 0x03, 0xAA, 0xE7, 0xE7, 0x55, 0xAA]
)]
#[case::break_inside_write_data_keeps_old_value(
    &[
        0xE7, 0x23, 0x00, 0x00, 0x00, 0x01, 0xAA, 0xE7, 0x55,
        0xE7, 0x13, 0x00, 0x00, 0x00, 0x01,
    ],
    &[0xE7, 0x03, 0x89, 0xAB, 0xCD, 0xE7, 0xE7]
)]
#[case::invalid_address_gets_no_reply(&[0xE7, 0x13, 0x00, 0x00, 0x01, 0x00], &[])]
#[case::undeclared_index_gets_no_reply(&[0xE7, 0x13, 0x00, 0x00, 0x00, 0x04], &[])]
#[case::bare_break_is_silent(&[0xE7, 0x55], &[])]
#[case::noise_outside_frames_is_ignored(
    &[0x00, 0x13, 0x42, 0x55, 0xE7, 0x13, 0x00, 0x00, 0x00, 0x00],
    &[0xE7, 0x03, 0x01, 0x23, 0x45, 0x67]
)]
fn reference_vectors(#[case] input: &[u8], #[case] expected: &[u8]) {
    assert_eq!(exchange(input), expected);
}

#[rstest]
#[case::nulls_fill_the_field(false, &[0xE7, 0x03, 0x01, 0x23, 0x45, 0x67])]
#[case::leading_nulls_are_dropped(true, &[])]
fn two_byte_address_field_with_leading_nulls(
    #[case] skip_leading_nulls: bool,
    #[case] expected: &[u8],
) {
    let config = BridgeConfig {
        parser: ParserConfig {
            address_field_bytes: 2,
            skip_leading_nulls,
        },
        ..BridgeConfig::default()
    };
    let mut bridge = Bridge::new(config).expect("two-byte field is supported");

    let output = bridge
        .exchange(&[0xE7, 0x13, 0x00, 0x00, 0x01, 0x00], DEFAULT_DRAIN_STEPS)
        .expect("stream is well formed");

    assert_eq!(output, expected);
    assert_eq!(bridge.parser_state(), ParserState::AwaitEscape);
    assert!(bridge.is_quiescent());
}

#[test]
fn sequential_reads_reply_in_order() {
    let mut bridge = bridge();
    let mut output = Vec::new();
    for addr in [0x00, 0x03, 0xE7, 0x01] {
        let frame = if addr == 0xE7 {
            vec![0xE7, 0x13, 0x00, 0x00, 0x00, 0xE7, 0xE7]
        } else {
            vec![0xE7, 0x13, 0x00, 0x00, 0x00, addr]
        };
        output.extend(
            bridge
                .exchange(&frame, DEFAULT_DRAIN_STEPS)
                .expect("read is well formed"),
        );
    }
    assert_eq!(
        output,
        vec![
            0xE7, 0x03, 0x01, 0x23, 0x45, 0x67, //
            0xE7, 0x03, 0x10, 0x20, 0x30, 0x40, //
            0xE7, 0x03, 0xDE, 0xAD, 0xBE, 0xEF, //
            0xE7, 0x03, 0x89, 0xAB, 0xCD, 0xE7, 0xE7,
        ]
    );
}

#[test]
fn read_arriving_mid_reply_is_not_answered() {
    let mut bridge = bridge();
    let output = bridge
        .exchange(
            &[
                0xE7, 0x13, 0x00, 0x00, 0x00, 0x00, //
                0xE7, 0x13, 0x00, 0x00, 0x00, 0x03,
            ],
            DEFAULT_DRAIN_STEPS,
        )
        .expect("stream is well formed");
    assert_eq!(output, vec![0xE7, 0x03, 0x01, 0x23, 0x45, 0x67]);
    assert!(bridge.is_quiescent());
}

#[test]
fn null_after_escape_inside_field_is_padding() {
    assert_eq!(
        exchange(&[0xE7, 0x13, 0x00, 0x00, 0x00, 0xE7, 0x00, 0x00, 0xE7]),
        vec![0xE7, 0x03, 0xDE, 0xAD, 0xBE, 0xEF]
    );
}

#[test]
fn command_interrupt_restarts_with_new_task() {
    let mut bridge = bridge();
    let mut anomalies = Vec::new();
    let mut requests = Vec::new();
    for byte in [
        0xE7, 0x13, 0x00, 0x00, 0xE7, 0x23, 0x00, 0x00, 0x00, 0x01, 0x11, 0x22, 0x33, 0x44,
    ] {
        let outcome = bridge.step(Some(byte)).expect("interrupt is recoverable");
        anomalies.extend(outcome.anomaly);
        requests.extend(outcome.request);
    }
    assert_eq!(
        anomalies,
        vec![Anomaly::CommandInterrupt {
            field: FieldKind::Address,
            restarted_as: Task::Write,
        }]
    );
    assert_eq!(
        requests,
        vec![BusRequest::Write {
            addr: 1,
            value: 0x1122_3344
        }]
    );

    let output = bridge
        .exchange(&[0xE7, 0x13, 0x00, 0x00, 0x00, 0x01], DEFAULT_DRAIN_STEPS)
        .expect("read is well formed");
    assert_eq!(output, vec![0xE7, 0x03, 0x11, 0x22, 0x33, 0x44]);
}

#[test]
fn double_escape_in_command_position_resynchronizes() {
    let mut bridge = bridge();
    let first = bridge.step(Some(0xE7)).expect("escape");
    assert_eq!(first.anomaly, None);
    let second = bridge.step(Some(0xE7)).expect("double escape is recoverable");
    assert_eq!(second.anomaly, Some(Anomaly::DoubleEscape));
    assert_eq!(bridge.parser_state(), ParserState::AwaitEscape);

    let output = bridge
        .exchange(
            &[0x13, 0x00, 0xE7, 0x13, 0x00, 0x00, 0x00, 0x02],
            DEFAULT_DRAIN_STEPS,
        )
        .expect("stream is well formed");
    assert_eq!(output, vec![0xE7, 0x03, 0x0A, 0x0B, 0x0C, 0x0D]);
}

#[rstest]
#[case::read_data_as_command(
    &[0xE7, 0x03],
    ProtocolViolation::IllegalCommand { byte: 0x03, command: Command::ReadData }
)]
#[case::invalid_command(
    &[0xE7, 0x42],
    ProtocolViolation::IllegalCommand { byte: 0x42, command: Command::Invalid }
)]
#[case::invalid_after_escape_in_address(
    &[0xE7, 0x13, 0x00, 0xE7, 0x99],
    ProtocolViolation::IllegalEscapeSequence {
        byte: 0x99,
        command: Command::Invalid,
        field: FieldKind::Address,
    }
)]
#[case::read_data_after_escape_in_write_data(
    &[0xE7, 0x23, 0x00, 0x00, 0x00, 0x01, 0x10, 0xE7, 0x03],
    ProtocolViolation::IllegalEscapeSequence {
        byte: 0x03,
        command: Command::ReadData,
        field: FieldKind::WriteData,
    }
)]
fn violations_are_fatal_until_reset(#[case] input: &[u8], #[case] expected: ProtocolViolation) {
    let mut bridge = bridge();
    assert_eq!(bridge.feed(input), Err(BridgeError::Violation(expected)));
    assert_eq!(bridge.run_state(), RunState::FaultLatched(expected));
    assert_eq!(
        bridge.step(Some(0xE7)),
        Err(BridgeError::FaultLatched(expected))
    );
    assert_eq!(
        bridge.drain(DEFAULT_DRAIN_STEPS),
        Err(BridgeError::FaultLatched(expected))
    );

    bridge.reset();
    assert_eq!(bridge.run_state(), RunState::Running);
    let output = bridge
        .exchange(&[0xE7, 0x13, 0x00, 0x00, 0x00, 0x03], DEFAULT_DRAIN_STEPS)
        .expect("session resumes after reset");
    assert_eq!(output, vec![0xE7, 0x03, 0x10, 0x20, 0x30, 0x40]);
}

#[test]
fn violation_does_not_commit_the_failing_step() {
    let mut bridge = bridge();
    bridge
        .feed(&[0xE7, 0x23, 0x00, 0x00, 0x00, 0x03, 0x01, 0x02, 0x03, 0x04])
        .expect("write is well formed");
    let steps = bridge.steps();
    assert!(bridge.feed(&[0xE7, 0xFF]).is_err());
    assert_eq!(bridge.steps(), steps + 1);
    assert_eq!(bridge.parser_state(), ParserState::ParseCommand);
    assert_eq!(bridge.bus().peek(3), Some(0x0102_0304));
}

#[test]
fn writes_to_invalid_addresses_leave_storage_untouched() {
    let mut bridge = bridge();
    let before = bridge.bus().contents();
    let output = bridge
        .exchange(
            &[
                0xE7, 0x23, 0x00, 0x00, 0x00, 0x04, 0xFF, 0xFF, 0xFF, 0xFF, //
                0xE7, 0x23, 0x00, 0x00, 0x01, 0x00, 0xFF, 0xFF, 0xFF, 0xFF,
            ],
            DEFAULT_DRAIN_STEPS,
        )
        .expect("writes are well formed");
    assert!(output.is_empty());
    assert_eq!(bridge.bus().contents(), before);
}

#[test]
fn reset_restores_initial_image() {
    let mut bridge = bridge();
    let initial = bridge.bus().contents();
    bridge
        .exchange(
            &[0xE7, 0x23, 0x00, 0x00, 0x00, 0x00, 0xCA, 0xFE, 0xBA, 0xBE],
            DEFAULT_DRAIN_STEPS,
        )
        .expect("write is well formed");
    assert_eq!(bridge.bus().peek(0), Some(0xCAFE_BABE));

    bridge.reset();
    assert_eq!(bridge.bus().contents(), initial);
    assert_eq!(bridge.steps(), 0);
    assert!(bridge.is_quiescent());
}
