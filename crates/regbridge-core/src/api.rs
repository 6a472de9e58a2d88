//! Public host-facing API contracts for embedding the bridge.

use crate::{Anomaly, ConfigError, ParserConfig, ProtocolViolation};

/// Default width of the address field on the wire (one bus word).
pub const DEFAULT_ADDRESS_FIELD_BYTES: usize = 4;

/// Default number of steps the streamer waits for a read acknowledge.
///
/// The register file acknowledges one step after it sees a request; the
/// margin covers slower buses plugged in through [`crate::RegisterBus`].
pub const DEFAULT_READ_TIMEOUT_STEPS: u16 = 4;

/// Default idle-step budget used when draining replies.
pub const DEFAULT_DRAIN_STEPS: u32 = 64;

/// Top-level immutable configuration for a bridge instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BridgeConfig {
    /// Inbound parser settings.
    pub parser: ParserConfig,
    /// Steps to wait for a read acknowledge before replying `E7 55`.
    pub read_timeout_steps: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            parser: ParserConfig::default(),
            read_timeout_steps: DEFAULT_READ_TIMEOUT_STEPS,
        }
    }
}

impl BridgeConfig {
    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AddressFieldWidth`] for an unsupported address
    /// width and [`ConfigError::ZeroReadTimeout`] for a zero timeout.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if let Err(error) = self.parser.validate() {
            return Err(error);
        }
        if self.read_timeout_steps == 0 {
            return Err(ConfigError::ZeroReadTimeout);
        }
        Ok(())
    }
}

/// Single-step register bus transaction issued by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BusRequest {
    /// Read the word at `addr`.
    Read {
        /// Logical register address.
        addr: u16,
    },
    /// Write `value` to `addr`.
    Write {
        /// Logical register address.
        addr: u16,
        /// Data word.
        value: u32,
    },
}

impl BusRequest {
    /// Target address of the request.
    #[must_use]
    pub const fn addr(self) -> u16 {
        match self {
            Self::Read { addr } | Self::Write { addr, .. } => addr,
        }
    }
}

/// Session state surfaced to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum RunState {
    /// Accepting bytes.
    #[default]
    Running,
    /// A fatal violation is latched; only reset resumes the session.
    FaultLatched(ProtocolViolation),
}

impl RunState {
    /// Returns the latched violation, if any.
    #[must_use]
    pub const fn latched_fault(self) -> Option<ProtocolViolation> {
        match self {
            Self::FaultLatched(violation) => Some(violation),
            Self::Running => None,
        }
    }
}

/// Signals observed during one bridge step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StepOutcome {
    /// Byte strobed onto the outbound stream.
    pub output: Option<u8>,
    /// Request pulse the parser issued; the bus sees it on the next step.
    pub request: Option<BusRequest>,
    /// Recoverable anomaly raised by the parser.
    pub anomaly: Option<Anomaly>,
    /// The pending read timed out on this step.
    pub timed_out: bool,
}

/// Stop conditions for batched idle stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunBoundary {
    /// Stop once nothing is latched and the streamer is idle.
    Quiescent,
    /// Stop after the streamer finishes a reply frame.
    ReplyComplete,
}

/// Aggregated outcome of a batched run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOutcome {
    /// Steps executed during this call.
    pub steps: u32,
    /// Outbound bytes emitted, in order.
    pub output: Vec<u8>,
    /// `true` when the requested boundary was reached within budget.
    pub reached: bool,
}

/// Deterministic trace events emitted in step order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceEvent {
    /// Parser consumed a valid inbound byte.
    ByteAccepted {
        /// Step index.
        step: u64,
        /// Inbound byte.
        byte: u8,
    },
    /// Parser issued a request pulse.
    RequestIssued {
        /// Step index.
        step: u64,
        /// Issued request.
        request: BusRequest,
    },
    /// Bus stage dropped a request whose address does not decode.
    RequestDropped {
        /// Step index.
        step: u64,
        /// Dropped request.
        request: BusRequest,
    },
    /// Streamer observed a read acknowledge.
    AckObserved {
        /// Step index.
        step: u64,
        /// Acknowledged data word.
        value: u32,
    },
    /// Streamer emitted an outbound byte.
    ByteEmitted {
        /// Step index.
        step: u64,
        /// Outbound byte.
        byte: u8,
    },
    /// Pending read timed out.
    ReadTimedOut {
        /// Step index.
        step: u64,
    },
    /// Parser raised a recoverable anomaly.
    AnomalyRaised {
        /// Step index.
        step: u64,
        /// Raised anomaly.
        anomaly: Anomaly,
    },
    /// Parser hit a fatal violation.
    ViolationRaised {
        /// Step index.
        step: u64,
        /// Raised violation.
        violation: ProtocolViolation,
    },
}

/// Sink trait for deterministic trace hooks.
pub trait TraceSink {
    /// Records an event in step order.
    fn on_event(&mut self, event: TraceEvent);
}

impl TraceSink for Vec<TraceEvent> {
    fn on_event(&mut self, event: TraceEvent) {
        self.push(event);
    }
}
