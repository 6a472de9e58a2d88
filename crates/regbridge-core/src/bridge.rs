//! Step-synchronous composition of parser, register bus and streamer.
//!
//! Every stage of a step reads only the signals latched at the end of the
//! previous step:
//!
//! 1. Parser consumes at most one inbound byte and may issue a request pulse.
//! 2. Bus observes the request latched last step; a read's acknowledge is
//!    latched for the next step.
//! 3. Streamer observes the same latched read request and the latched
//!    acknowledge, and may emit one outbound byte.
//!
//! Next states are staged and committed together. A fatal violation commits
//! nothing and latches the session.

use log::{debug, error};

use crate::api::{
    BridgeConfig, BusRequest, RunBoundary, RunOutcome, RunState, StepOutcome, TraceEvent,
    TraceSink,
};
use crate::{BridgeError, CommandParser, ConfigError, RegisterBus, RegisterFile, ResponseStreamer};
use crate::{ParserState, StorageImage, StreamerState};

/// Signals registered at the end of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
struct Latched {
    request: Option<BusRequest>,
    ack: Option<u32>,
}

struct NoTrace;

impl TraceSink for NoTrace {
    fn on_event(&mut self, _event: TraceEvent) {}
}

/// Byte-stream to register-bus bridge.
#[derive(Debug, Clone)]
pub struct Bridge<B = RegisterFile> {
    config: BridgeConfig,
    parser: CommandParser,
    streamer: ResponseStreamer,
    bus: B,
    latched: Latched,
    run_state: RunState,
    steps: u64,
}

impl Bridge<RegisterFile> {
    /// Creates a bridge over the reference register file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn new(config: BridgeConfig) -> Result<Self, ConfigError> {
        Self::with_bus(config, RegisterFile::default())
    }

    /// Creates a bridge over a register file loaded with `image`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn with_image(config: BridgeConfig, image: StorageImage) -> Result<Self, ConfigError> {
        Self::with_bus(config, RegisterFile::new(image))
    }
}

impl<B: RegisterBus> Bridge<B> {
    /// Creates a bridge driving an arbitrary register bus.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn with_bus(config: BridgeConfig, bus: B) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            parser: CommandParser::new(config.parser)?,
            streamer: ResponseStreamer::new(config.read_timeout_steps),
            bus,
            latched: Latched::default(),
            run_state: RunState::Running,
            steps: 0,
        })
    }

    /// Bridge configuration.
    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Register bus behind the bridge.
    #[must_use]
    pub const fn bus(&self) -> &B {
        &self.bus
    }

    /// Current session state.
    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Current parser state.
    #[must_use]
    pub const fn parser_state(&self) -> ParserState {
        self.parser.state()
    }

    /// Current streamer state.
    #[must_use]
    pub const fn streamer_state(&self) -> StreamerState {
        self.streamer.state()
    }

    /// Steps executed since construction or the last reset.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Returns `true` when no request or acknowledge is latched and the
    /// streamer is idle. Nothing more will be emitted without new input.
    #[must_use]
    pub const fn is_quiescent(&self) -> bool {
        self.latched.request.is_none() && self.latched.ack.is_none() && self.streamer.is_idle()
    }

    /// Forces both state machines to their initial states, drops latched
    /// signals (an acknowledge already in flight is not honored), clears any
    /// latched fault and restores the bus's initial contents.
    pub fn reset(&mut self) {
        self.parser.reset();
        self.streamer.reset();
        self.latched = Latched::default();
        self.run_state = RunState::Running;
        self.bus.reset();
        self.steps = 0;
    }

    /// Advances one step. `input` is the inbound byte strobed on this step.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Violation`] when this byte breaks the protocol,
    /// and [`BridgeError::FaultLatched`] on every step after that until
    /// [`Bridge::reset`].
    pub fn step(&mut self, input: Option<u8>) -> Result<StepOutcome, BridgeError> {
        self.step_traced(input, &mut NoTrace)
    }

    /// Advances one step, reporting what happened to `sink`.
    ///
    /// # Errors
    ///
    /// Same as [`Bridge::step`].
    pub fn step_traced(
        &mut self,
        input: Option<u8>,
        sink: &mut dyn TraceSink,
    ) -> Result<StepOutcome, BridgeError> {
        if let RunState::FaultLatched(violation) = self.run_state {
            return Err(BridgeError::FaultLatched(violation));
        }

        let step = self.steps;
        let latched = self.latched;

        if let Some(byte) = input {
            sink.on_event(TraceEvent::ByteAccepted { step, byte });
        }
        let (parser, parsed) = match self.parser.step(input) {
            Ok(next) => next,
            Err(violation) => {
                error!("protocol violation at step {step}: {violation}");
                sink.on_event(TraceEvent::ViolationRaised { step, violation });
                self.run_state = RunState::FaultLatched(violation);
                return Err(BridgeError::Violation(violation));
            }
        };
        if let Some(request) = parsed.request {
            sink.on_event(TraceEvent::RequestIssued { step, request });
        }
        if let Some(anomaly) = parsed.anomaly {
            sink.on_event(TraceEvent::AnomalyRaised { step, anomaly });
        }

        let mut ack = None;
        let mut read_requested = false;
        if let Some(request) = latched.request {
            if self.bus.decodes(request.addr()) {
                match request {
                    BusRequest::Read { addr } => {
                        read_requested = true;
                        ack = self.bus.read(addr).value();
                    }
                    BusRequest::Write { addr, value } => self.bus.write(addr, value),
                }
            } else {
                debug!("dropping {request:?}: address does not decode");
                sink.on_event(TraceEvent::RequestDropped { step, request });
            }
        }

        if let Some(value) = latched.ack {
            sink.on_event(TraceEvent::AckObserved { step, value });
        }
        let (streamer, emitted) = self.streamer.step(read_requested, latched.ack);
        if emitted.timed_out {
            sink.on_event(TraceEvent::ReadTimedOut { step });
        }
        if let Some(byte) = emitted.byte {
            sink.on_event(TraceEvent::ByteEmitted { step, byte });
        }

        self.parser = parser;
        self.streamer = streamer;
        self.latched = Latched {
            request: parsed.request,
            ack,
        };
        self.steps = self.steps.wrapping_add(1);

        Ok(StepOutcome {
            output: emitted.byte,
            request: parsed.request,
            anomaly: parsed.anomaly,
            timed_out: emitted.timed_out,
        })
    }

    /// Strobes `bytes` in, one per step, and returns everything emitted
    /// meanwhile. Replies still in flight are left for [`Bridge::drain`].
    ///
    /// # Errors
    ///
    /// Stops at the first failing step, see [`Bridge::step`].
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<u8>, BridgeError> {
        let mut output = Vec::new();
        for byte in bytes {
            output.extend(self.step(Some(*byte))?.output);
        }
        Ok(output)
    }

    /// Steps with no input until quiescent or `max_steps` elapse.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::FaultLatched`] when a violation is latched.
    pub fn drain(&mut self, max_steps: u32) -> Result<Vec<u8>, BridgeError> {
        Ok(self.run(RunBoundary::Quiescent, max_steps)?.output)
    }

    /// Feeds `bytes`, then drains for at most `max_drain_steps`.
    ///
    /// # Errors
    ///
    /// Stops at the first failing step, see [`Bridge::step`].
    pub fn exchange(&mut self, bytes: &[u8], max_drain_steps: u32) -> Result<Vec<u8>, BridgeError> {
        let mut output = self.feed(bytes)?;
        output.extend(self.drain(max_drain_steps)?);
        Ok(output)
    }

    /// Steps with no input until `boundary` is reached or `max_steps` elapse.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::FaultLatched`] when a violation is latched.
    pub fn run(&mut self, boundary: RunBoundary, max_steps: u32) -> Result<RunOutcome, BridgeError> {
        if let Some(violation) = self.run_state.latched_fault() {
            return Err(BridgeError::FaultLatched(violation));
        }
        let mut outcome = RunOutcome::default();
        let mut emitting = !self.streamer.is_idle();

        loop {
            let reached = match boundary {
                RunBoundary::Quiescent => self.is_quiescent(),
                RunBoundary::ReplyComplete => emitting && self.streamer.is_idle(),
            };
            if reached {
                outcome.reached = true;
                return Ok(outcome);
            }
            if outcome.steps == max_steps {
                return Ok(outcome);
            }

            let step = self.step(None)?;
            outcome.steps += 1;
            if let Some(byte) = step.output {
                emitting = true;
                outcome.output.push(byte);
            }
        }
    }
}
