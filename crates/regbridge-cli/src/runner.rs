//! Drives a stimulus script through a bridge and collects what came back.

use log::{debug, info};
use regbridge_core::{
    Anomaly, Bridge, BridgeConfig, BridgeError, ConfigError, ProtocolViolation, Reply,
    ReplyDecodeError, ReplyDecoder, DEFAULT_DRAIN_STEPS,
};
use thiserror::Error;

use crate::script::{Script, ScriptItem};

/// Runner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerConfig {
    /// Bridge configuration.
    pub bridge: BridgeConfig,
    /// Idle steps allowed after the script to flush pending replies.
    pub drain_steps: u32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeConfig::default(),
            drain_steps: DEFAULT_DRAIN_STEPS,
        }
    }
}

/// Failure that prevents a run from producing a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunError {
    /// Bridge configuration was rejected.
    #[error("invalid bridge configuration: {0}")]
    Config(#[from] ConfigError),
    /// Bridge refused to step.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// Outbound stream could not be decoded.
    #[error("malformed reply stream: {0}")]
    Reply(#[from] ReplyDecodeError),
}

/// Fatal violation together with the script line that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptViolation {
    /// 1-indexed script line.
    pub line: usize,
    /// Violation raised by the parser.
    pub violation: ProtocolViolation,
}

/// Everything observed during a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    /// Raw outbound bytes in emission order.
    pub output: Vec<u8>,
    /// Decoded reply frames.
    pub replies: Vec<Reply>,
    /// Recoverable anomalies, with their script line.
    pub anomalies: Vec<(usize, Anomaly)>,
    /// Total steps executed, including idle and drain steps.
    pub steps: u64,
    /// Violation that ended the run early, if any.
    pub violation: Option<ScriptViolation>,
    /// `true` when the bridge went quiet within the drain budget.
    pub drained: bool,
}

/// Runs `script` against the reference register file.
///
/// # Errors
///
/// Returns [`RunError`] when the bridge cannot be built or emits a stream
/// that does not decode.
pub fn run_script(script: &Script, config: &RunnerConfig) -> Result<RunReport, RunError> {
    let mut bridge = Bridge::new(config.bridge)?;
    let mut decoder = ReplyDecoder::new();
    let mut report = RunReport::default();
    debug!(
        "running {} script lines, {} inbound bytes",
        script.lines.len(),
        script.byte_count()
    );

    for entry in &script.lines {
        let inputs: Box<dyn Iterator<Item = Option<u8>>> = match &entry.item {
            ScriptItem::Bytes(bytes) => Box::new(bytes.iter().copied().map(Some)),
            ScriptItem::Idle(steps) => Box::new((0..*steps).map(|_| None)),
            ScriptItem::Reset => {
                debug!("line {}: reset", entry.line);
                report.steps += bridge.steps();
                bridge.reset();
                decoder = ReplyDecoder::new();
                continue;
            }
        };
        for input in inputs {
            if let Some(violation) = step(&mut bridge, &mut decoder, &mut report, entry.line, input)?
            {
                report.violation = Some(violation);
                report.steps += bridge.steps();
                return Ok(report);
            }
        }
    }

    for byte in bridge.drain(config.drain_steps)? {
        collect(&mut report, &mut decoder, byte)?;
    }
    report.drained = bridge.is_quiescent();
    report.steps += bridge.steps();
    info!(
        "ran {} steps, {} replies",
        report.steps,
        report.replies.len()
    );
    Ok(report)
}

fn step(
    bridge: &mut Bridge,
    decoder: &mut ReplyDecoder,
    report: &mut RunReport,
    line: usize,
    input: Option<u8>,
) -> Result<Option<ScriptViolation>, RunError> {
    match bridge.step(input) {
        Ok(outcome) => {
            if let Some(anomaly) = outcome.anomaly {
                report.anomalies.push((line, anomaly));
            }
            if let Some(byte) = outcome.output {
                collect(report, decoder, byte)?;
            }
            Ok(None)
        }
        Err(error) => Ok(Some(ScriptViolation {
            line,
            violation: error.violation(),
        })),
    }
}

fn collect(
    report: &mut RunReport,
    decoder: &mut ReplyDecoder,
    byte: u8,
) -> Result<(), ReplyDecodeError> {
    report.output.push(byte);
    if let Some(reply) = decoder.push(byte)? {
        report.replies.push(reply);
    }
    Ok(())
}
