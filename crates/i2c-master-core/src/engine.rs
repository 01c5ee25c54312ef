//! Top-level engine: one master-clock tick at a time.
//!
//! A tick runs in a fixed order:
//!
//! 1. the buffer write staged last tick commits and registered reads fetch;
//! 2. a zero clock divisor is restored to its default;
//! 3. the host access of this tick is decoded and applied;
//! 4. the controller consumes the phase engine outputs of the previous tick;
//! 5. the phase engine consumes the controller's request and the observed
//!    bus lines.

use crate::api::{HostAccess, HostResponse, TickInputs, TickOutputs, TraceEvent, TraceSink};
use crate::buffer::{PendingWrite, SharedBuffer, WriteSource, ALL_LANES};
use crate::controller::{CommandOutcome, Controller, ControllerState};
use crate::phase::{Phase, PhaseEngine, PhaseInputs, PhaseOutputs};
use crate::registers::{decode_command, encode_status, Register};
use crate::status::{InterruptState, TransactionStatus};
use crate::timing::ClockDivisor;
use crate::{ConfigError, EngineConfig};

/// Host access answered on the following tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingResponse {
    Ready(HostResponse),
    BufferRead,
}

/// Register-mapped I2C master engine.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    divisor: ClockDivisor,
    buffer: SharedBuffer,
    controller: Controller,
    phase: PhaseEngine,
    last_phase: PhaseOutputs,
    response: Option<PendingResponse>,
    ticks: u64,
}

impl Engine {
    /// Builds an engine in its reset state.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` fails validation.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            divisor: ClockDivisor::new(config.default_divisor, config.divisor_mask()),
            buffer: SharedBuffer::new(config.buffer_words(), config.byte_order),
            controller: Controller::new(&config),
            phase: PhaseEngine::new(),
            last_phase: PhaseOutputs::default(),
            response: None,
            ticks: 0,
            config,
        })
    }

    /// Returns every component to its initial state, buffer contents
    /// included.
    pub fn reset(&mut self) {
        log::debug!("engine reset after {} ticks", self.ticks);
        self.divisor.reset();
        self.buffer.clear();
        self.controller.reset();
        self.phase.reset();
        self.last_phase = PhaseOutputs::default();
        self.response = None;
        self.ticks = 0;
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Host-visible transaction status.
    #[must_use]
    pub const fn status(&self) -> &TransactionStatus {
        self.controller.status()
    }

    /// Current controller state.
    #[must_use]
    pub const fn controller_state(&self) -> ControllerState {
        self.controller.state()
    }

    /// Current phase of the bit engine.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase.phase()
    }

    /// Interrupt pending and enable flags.
    #[must_use]
    pub const fn interrupt(&self) -> InterruptState {
        self.controller.interrupt()
    }

    /// Clock divisor currently in effect.
    #[must_use]
    pub const fn divisor(&self) -> u32 {
        self.divisor.value()
    }

    /// Shared buffer.
    #[must_use]
    pub const fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// Ticks since construction or the last reset.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Whether a transaction is active.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.controller.status().busy
    }

    /// Advances the engine by one tick.
    pub fn tick(&mut self, inputs: TickInputs) -> TickOutputs {
        self.step(inputs, None)
    }

    /// Advances the engine by one tick, dispatching trace events to `sink`
    /// when tracing is enabled.
    pub fn tick_with_trace(&mut self, inputs: TickInputs, sink: &mut dyn TraceSink) -> TickOutputs {
        self.step(inputs, Some(sink))
    }

    fn step(&mut self, inputs: TickInputs, mut sink: Option<&mut dyn TraceSink>) -> TickOutputs {
        self.ticks = self.ticks.wrapping_add(1);
        self.buffer.begin_tick();

        let host = self.response.take().map(|pending| match pending {
            PendingResponse::Ready(response) => response,
            PendingResponse::BufferRead => HostResponse {
                data: self.buffer.read_data(),
                accepted: true,
            },
        });

        if self.divisor.heal() {
            self.emit(
                &mut sink,
                TraceEvent::DivisorHealed {
                    divisor: self.divisor.value(),
                },
            );
        }

        if let Some(access) = inputs.host {
            self.response = Some(self.host_access(access));
        }

        let control = self.controller.advance(&self.last_phase, &mut self.buffer);
        if let Some(request) = control.started {
            self.emit(&mut sink, TraceEvent::TransactionStarted { request });
        }
        if let Some(error) = control.finished {
            self.emit(&mut sink, TraceEvent::TransactionFinished { error });
        }

        let phase = self.phase.advance(PhaseInputs {
            request: control.request,
            scl: inputs.scl,
            sda: inputs.sda,
            divisor: self.divisor.value(),
        });
        if let Some(condition) = phase.condition {
            log::debug!("bus condition {condition:?}");
            self.emit(&mut sink, TraceEvent::Condition { condition });
        }
        if let Some(report) = phase.report {
            self.emit(
                &mut sink,
                TraceEvent::ByteFinished {
                    data: report.data,
                    outcome: report.outcome,
                },
            );
        }
        self.last_phase = phase;

        TickOutputs {
            scl: phase.scl,
            sda: phase.sda,
            interrupt: self.controller.interrupt().line(),
            host,
        }
    }

    fn emit(&self, sink: &mut Option<&mut dyn TraceSink>, event: TraceEvent) {
        if !self.config.tracing_enabled {
            return;
        }
        if let Some(sink) = sink.as_deref_mut() {
            sink.on_event(event);
        }
    }

    fn host_access(&mut self, access: HostAccess) -> PendingResponse {
        let register = Register::decode(
            access.offset(),
            self.config.buffer_base(),
            self.config.buffer_words(),
        );
        match access {
            HostAccess::Read { .. } => self.host_read(register),
            HostAccess::Write { value, lanes, .. } => {
                let accepted = lanes & ALL_LANES != 0 && self.host_write(register, value, lanes);
                PendingResponse::Ready(HostResponse { data: 0, accepted })
            }
        }
    }

    fn host_read(&mut self, register: Register) -> PendingResponse {
        let data = match register {
            Register::Command => {
                encode_status(self.controller.status(), self.config.address_mask())
            }
            Register::Speed => self.divisor.value(),
            Register::InterruptStatus => u32::from(self.controller.interrupt().pending),
            Register::InterruptEnable => u32::from(self.controller.interrupt().enable),
            Register::Reserved => 0,
            Register::Buffer(word) => {
                self.buffer.fetch(word);
                return PendingResponse::BufferRead;
            }
            Register::Unmapped => {
                return PendingResponse::Ready(HostResponse {
                    data: 0,
                    accepted: false,
                })
            }
        };
        PendingResponse::Ready(HostResponse {
            data,
            accepted: true,
        })
    }

    fn host_write(&mut self, register: Register, value: u32, lanes: u8) -> bool {
        let busy = self.controller.status().busy;
        match register {
            Register::Command => {
                let request = decode_command(value, self.config.address_mask());
                let outcome = self.controller.submit(request);
                if outcome != CommandOutcome::Accepted {
                    log::debug!("command {value:#010x} not started: {outcome:?}");
                }
                outcome != CommandOutcome::Busy
            }
            Register::Speed => {
                if self.config.speed_locked || busy {
                    return false;
                }
                self.divisor.set(value);
                true
            }
            Register::InterruptStatus => {
                self.controller.interrupt_mut().acknowledge();
                true
            }
            Register::InterruptEnable => {
                self.controller.interrupt_mut().enable = value & 1 != 0;
                true
            }
            Register::Reserved | Register::Unmapped => false,
            Register::Buffer(word) => {
                if busy || self.config.read_only {
                    return false;
                }
                let write = PendingWrite {
                    word,
                    lanes: lanes & ALL_LANES,
                    data: value,
                    source: WriteSource::Host,
                };
                match self.buffer.stage(write) {
                    Ok(()) => true,
                    Err(err) => {
                        log::debug!("host buffer write dropped: {err}");
                        false
                    }
                }
            }
        }
    }
}
