#![no_main]

use libfuzzer_sys::fuzz_target;
use regbridge_core::{
    Bridge, BridgeConfig, BridgeError, ParserConfig, ReplyDecoder, DEFAULT_DRAIN_STEPS,
};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, stream)) = data.split_first() else {
        return;
    };

    let config = BridgeConfig {
        parser: ParserConfig {
            address_field_bytes: usize::from(selector & 0x03) + 1,
            skip_leading_nulls: selector & 0x04 != 0,
        },
        read_timeout_steps: u16::from(selector >> 3) + 1,
    };
    let Ok(mut bridge) = Bridge::new(config) else {
        return;
    };

    // Output since the last reset; a reset may cut a reply short.
    let mut session = Vec::new();
    let mut decoder = ReplyDecoder::new();
    for byte in stream {
        match bridge.step(Some(*byte)) {
            Ok(outcome) => {
                if let Some(out) = outcome.output {
                    session.push(out);
                    assert!(decoder.push(out).is_ok(), "malformed reply in {session:02x?}");
                }
            }
            Err(BridgeError::Violation(_)) => {
                assert!(bridge.step(None).is_err());
                bridge.reset();
                assert!(bridge.is_quiescent());
                session.clear();
                decoder = ReplyDecoder::new();
            }
            Err(BridgeError::FaultLatched(_)) => unreachable!("reset clears latched faults"),
        }
    }

    let rest = bridge
        .drain(DEFAULT_DRAIN_STEPS)
        .expect("running session drains");
    for out in rest {
        session.push(out);
        assert!(decoder.push(out).is_ok(), "malformed reply in {session:02x?}");
    }
    assert!(bridge.is_quiescent());
    assert!(decoder.is_idle(), "truncated reply in {session:02x?}");
});
