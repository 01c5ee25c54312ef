//! Bit-level phase engine.
//!
//! Drives one byte (eight data bits plus the acknowledge bit) across SCL/SDA
//! per request. Drive values follow open-drain conventions: `true` releases
//! the line (pulled high), `false` pulls it low. Every phase lasts one
//! divisor period; the rising-edge phases additionally wait for SCL to be
//! observed high, which is how a slave stretches the clock.

use crate::timing::PhaseTimer;
use crate::BusError;

/// Micro-step of the bus protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Phase {
    /// Bus released, nothing queued.
    #[default]
    Idle,
    /// SDA pulled low while SCL is high.
    Start,
    /// SCL low, data bit placed on SDA.
    BitSet,
    /// SCL released, data bit sampled at the end of the phase.
    BitRisingEdge,
    /// SCL pulled low again.
    BitFallingEdge,
    /// SCL low, data bit held before the next bit is placed.
    BitHold,
    /// SCL low, ack level placed on SDA.
    AckSet,
    /// SCL released, ack sampled at the end of the phase.
    AckRisingEdge,
    /// SCL pulled low after the ack bit.
    AckFallingEdge,
    /// SCL low, ack level held; the byte is reported at the end.
    AckHold,
    /// Bus claimed between bytes, SCL parked low.
    Held,
    /// SCL low, SDA released ahead of a repeated start.
    Restart,
    /// SCL released ahead of a repeated start.
    RestartRisingEdge,
    /// SCL and SDA low ahead of a stop.
    Stop,
    /// SCL released with SDA still low.
    StopRisingEdge,
    /// SDA released while SCL is high (stop condition), bus free time.
    Final,
}

impl Phase {
    /// Phases whose timer is suspended while SCL is observed low.
    #[must_use]
    pub const fn is_rising_edge(self) -> bool {
        matches!(
            self,
            Self::BitRisingEdge
                | Self::AckRisingEdge
                | Self::RestartRisingEdge
                | Self::StopRisingEdge
        )
    }

    /// Phases in which a new request may be queued.
    #[must_use]
    pub const fn accepts_request(self) -> bool {
        matches!(
            self,
            Self::Idle
                | Self::Held
                | Self::AckSet
                | Self::AckRisingEdge
                | Self::AckFallingEdge
                | Self::AckHold
        )
    }

    /// Phases in which the engine owns the bus.
    #[must_use]
    pub const fn holds_bus(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Direction and payload of one byte transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ByteOp {
    /// Drive the byte MSB first and expect the slave to acknowledge it.
    Write(u8),
    /// Capture a byte from the slave.
    Read {
        /// Pull SDA low in the ack slot; `false` leaves it released (NACK).
        ack: bool,
    },
}

/// One byte transfer request handed to the phase engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ByteRequest {
    /// Transfer direction and payload.
    pub op: ByteOp,
    /// Generate a repeated start before this byte when the bus is held.
    pub restart: bool,
    /// Issue a stop and release the bus once this byte's ack resolves.
    pub release: bool,
}

impl ByteRequest {
    /// Write request continuing the current cycle.
    #[must_use]
    pub const fn write(byte: u8) -> Self {
        Self {
            op: ByteOp::Write(byte),
            restart: false,
            release: false,
        }
    }

    /// Read request continuing the current cycle.
    #[must_use]
    pub const fn read(ack: bool) -> Self {
        Self {
            op: ByteOp::Read { ack },
            restart: false,
            release: false,
        }
    }

    /// Marks the request as starting with a repeated start.
    #[must_use]
    pub const fn with_restart(mut self) -> Self {
        self.restart = true;
        self
    }

    /// Marks the request as ending the bus cycle.
    #[must_use]
    pub const fn releasing(mut self, release: bool) -> Self {
        self.release = release;
        self
    }
}

/// Final disposition of an accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ByteOutcome {
    /// Data and ack bits transferred without error.
    Complete,
    /// Transfer ended with a protocol error.
    Failed(BusError),
    /// Request was queued behind a failed byte and never started.
    Flushed,
}

/// Completion report for one accepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ByteReport {
    /// Received byte for reads, the driven byte for writes.
    pub data: u8,
    /// Transfer result.
    pub outcome: ByteOutcome,
}

impl ByteReport {
    /// Returns the protocol error carried by a failed report.
    #[must_use]
    pub const fn error(self) -> Option<BusError> {
        match self.outcome {
            ByteOutcome::Failed(error) => Some(error),
            ByteOutcome::Complete | ByteOutcome::Flushed => None,
        }
    }
}

/// Bus conditions generated by the engine, reported for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum BusCondition {
    /// Start from a free bus.
    Start,
    /// Start while the bus was held.
    RepeatedStart,
    /// Stop; the bus is released.
    Stop,
}

/// Transient state of the byte in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PhaseSession {
    op: ByteOp,
    release: bool,
    shift: u8,
    bit: u8,
    error: Option<BusError>,
}

impl PhaseSession {
    const fn new(request: ByteRequest) -> Self {
        let shift = match request.op {
            ByteOp::Write(byte) => byte,
            ByteOp::Read { .. } => 0,
        };
        Self {
            op: request.op,
            release: request.release,
            shift,
            bit: 0,
            error: None,
        }
    }

    /// SDA level for the current data bit.
    const fn data_drive(&self) -> bool {
        match self.op {
            ByteOp::Write(byte) => match 7u8.checked_sub(self.bit) {
                Some(shift) => (byte >> shift) & 1 != 0,
                None => true,
            },
            ByteOp::Read { .. } => true,
        }
    }

    /// SDA level for the ack slot.
    const fn ack_drive(&self) -> bool {
        match self.op {
            ByteOp::Write(_) => true,
            ByteOp::Read { ack } => !ack,
        }
    }

    /// Number of data bits already transferred.
    #[must_use]
    pub const fn bits_done(&self) -> u8 {
        self.bit
    }

    /// Error observed so far in this byte.
    #[must_use]
    pub const fn error(&self) -> Option<BusError> {
        self.error
    }

    const fn report(&self) -> ByteReport {
        ByteReport {
            data: self.shift,
            outcome: match self.error {
                Some(error) => ByteOutcome::Failed(error),
                None => ByteOutcome::Complete,
            },
        }
    }
}

/// Per-tick inputs of the phase engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseInputs {
    /// Request offered this tick.
    pub request: Option<ByteRequest>,
    /// Observed SCL level.
    pub scl: bool,
    /// Observed SDA level.
    pub sda: bool,
    /// Ticks per phase.
    pub divisor: u32,
}

/// Per-tick outputs of the phase engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct PhaseOutputs {
    /// SCL drive (`true` = released).
    pub scl: bool,
    /// SDA drive (`true` = released).
    pub sda: bool,
    /// The offered request was queued this tick.
    pub accepted: bool,
    /// A byte finished this tick.
    pub report: Option<ByteReport>,
    /// Number of queued requests discarded after an error this tick.
    pub flushed: u8,
    /// The engine owns the bus.
    pub held: bool,
    /// Bus condition generated this tick.
    pub condition: Option<BusCondition>,
}

impl Default for PhaseOutputs {
    fn default() -> Self {
        Self {
            scl: true,
            sda: true,
            accepted: false,
            report: None,
            flushed: 0,
            held: false,
            condition: None,
        }
    }
}

/// Bit-level I2C phase engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PhaseEngine {
    phase: Phase,
    timer: PhaseTimer,
    session: Option<PhaseSession>,
    queued: Option<ByteRequest>,
}

impl PhaseEngine {
    /// Creates an idle engine with the bus released.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every field to its reset value.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Current protocol phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Byte in flight, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&PhaseSession> {
        self.session.as_ref()
    }

    /// Whether a request is waiting behind the byte in flight.
    #[must_use]
    pub const fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    /// SCL and SDA drive levels for the current phase.
    #[must_use]
    pub fn drives(&self) -> (bool, bool) {
        let data = self.session.map_or(true, |session| session.data_drive());
        let ack = self.session.map_or(true, |session| session.ack_drive());
        match self.phase {
            Phase::Idle | Phase::Final | Phase::RestartRisingEdge => (true, true),
            Phase::Start | Phase::StopRisingEdge => (true, false),
            Phase::BitSet | Phase::BitFallingEdge | Phase::BitHold => (false, data),
            Phase::BitRisingEdge => (true, data),
            Phase::AckSet | Phase::AckFallingEdge | Phase::AckHold => (false, ack),
            Phase::AckRisingEdge => (true, ack),
            Phase::Held | Phase::Restart => (false, true),
            Phase::Stop => (false, false),
        }
    }

    /// Advances the engine by one tick.
    pub fn advance(&mut self, inputs: PhaseInputs) -> PhaseOutputs {
        let mut out = PhaseOutputs::default();

        if let Some(request) = inputs.request {
            if self.queued.is_none() && self.phase.accepts_request() {
                self.queued = Some(request);
                out.accepted = true;
            }
        }

        match self.phase {
            Phase::Idle => {
                if let Some(request) = self.queued.take() {
                    self.session = Some(PhaseSession::new(request));
                    self.enter(Phase::Start, inputs.divisor);
                    out.condition = Some(BusCondition::Start);
                }
            }
            Phase::Held => {
                if let Some(request) = self.queued.take() {
                    self.begin_byte(request, inputs.divisor);
                }
            }
            phase => {
                let stretched = phase.is_rising_edge() && !inputs.scl;
                if self.timer.advance(stretched) {
                    self.complete_phase(inputs, &mut out);
                }
            }
        }

        let (scl, sda) = self.drives();
        out.scl = scl;
        out.sda = sda;
        out.held = self.phase.holds_bus();
        out
    }

    fn complete_phase(&mut self, inputs: PhaseInputs, out: &mut PhaseOutputs) {
        let divisor = inputs.divisor;
        match self.phase {
            Phase::Idle | Phase::Held => {}
            Phase::Start => self.enter(Phase::BitSet, divisor),
            Phase::BitSet => self.enter(Phase::BitRisingEdge, divisor),
            Phase::BitRisingEdge => {
                let Some(mut session) = self.session else {
                    self.enter(Phase::Stop, divisor);
                    return;
                };
                match session.op {
                    ByteOp::Write(_) => {
                        if session.data_drive() != inputs.sda {
                            session.error = Some(BusError::BusMismatch);
                            self.session = Some(session);
                            self.abort(out, divisor);
                            return;
                        }
                    }
                    ByteOp::Read { .. } => {
                        session.shift = (session.shift << 1) | u8::from(inputs.sda);
                    }
                }
                self.session = Some(session);
                self.enter(Phase::BitFallingEdge, divisor);
            }
            Phase::BitFallingEdge => self.enter(Phase::BitHold, divisor),
            Phase::BitHold => {
                let mut done = true;
                if let Some(session) = self.session.as_mut() {
                    session.bit += 1;
                    done = session.bit >= 8;
                }
                self.enter(if done { Phase::AckSet } else { Phase::BitSet }, divisor);
            }
            Phase::AckSet => self.enter(Phase::AckRisingEdge, divisor),
            Phase::AckRisingEdge => {
                if let Some(session) = self.session.as_mut() {
                    if matches!(session.op, ByteOp::Write(_)) && inputs.sda {
                        session.error = Some(BusError::NotAcknowledged);
                    }
                }
                self.enter(Phase::AckFallingEdge, divisor);
            }
            Phase::AckFallingEdge => self.enter(Phase::AckHold, divisor),
            Phase::AckHold => self.finish_byte(out, divisor),
            Phase::Restart => self.enter(Phase::RestartRisingEdge, divisor),
            Phase::RestartRisingEdge => {
                self.enter(Phase::Start, divisor);
                out.condition = Some(BusCondition::RepeatedStart);
            }
            Phase::Stop => self.enter(Phase::StopRisingEdge, divisor),
            Phase::StopRisingEdge => {
                self.enter(Phase::Final, divisor);
                out.condition = Some(BusCondition::Stop);
            }
            Phase::Final => self.enter(Phase::Idle, divisor),
        }
    }

    fn finish_byte(&mut self, out: &mut PhaseOutputs, divisor: u32) {
        let Some(session) = self.session.take() else {
            self.enter(Phase::Stop, divisor);
            return;
        };
        let report = session.report();
        out.report = Some(report);

        if let Some(error) = session.error {
            log::warn!("byte transfer failed: {error}");
            out.flushed = u8::from(self.queued.take().is_some());
            self.enter(Phase::Stop, divisor);
        } else if session.release {
            self.enter(Phase::Stop, divisor);
        } else if let Some(request) = self.queued.take() {
            self.begin_byte(request, divisor);
        } else {
            self.enter(Phase::Held, divisor);
        }
    }

    /// Reports the byte in flight as failed and heads for a stop.
    fn abort(&mut self, out: &mut PhaseOutputs, divisor: u32) {
        if let Some(session) = self.session.take() {
            if let Some(error) = session.error {
                log::warn!("byte transfer aborted: {error}");
            }
            out.report = Some(session.report());
        }
        out.flushed = u8::from(self.queued.take().is_some());
        self.enter(Phase::Stop, divisor);
    }

    fn begin_byte(&mut self, request: ByteRequest, divisor: u32) {
        self.session = Some(PhaseSession::new(request));
        if request.restart {
            self.enter(Phase::Restart, divisor);
        } else {
            self.enter(Phase::BitSet, divisor);
        }
    }

    fn enter(&mut self, phase: Phase, divisor: u32) {
        log::trace!("phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
        self.timer.load(divisor);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BusCondition, ByteOutcome, ByteReport, ByteRequest, Phase, PhaseEngine, PhaseInputs,
    };
    use crate::BusError;

    /// Bus stand-in: lines follow the master except where the closure pulls
    /// them low.
    struct Rig {
        engine: PhaseEngine,
        scl: bool,
        sda: bool,
        divisor: u32,
    }

    impl Rig {
        fn new(divisor: u32) -> Self {
            Self {
                engine: PhaseEngine::new(),
                scl: true,
                sda: true,
                divisor,
            }
        }

        fn tick(
            &mut self,
            request: Option<ByteRequest>,
            pull: impl Fn(&PhaseEngine) -> (bool, bool),
        ) -> super::PhaseOutputs {
            let out = self.engine.advance(PhaseInputs {
                request,
                scl: self.scl,
                sda: self.sda,
                divisor: self.divisor,
            });
            let (pull_scl, pull_sda) = pull(&self.engine);
            self.scl = out.scl && !pull_scl;
            self.sda = out.sda && !pull_sda;
            out
        }

        /// Offers `request` until accepted, then ticks until a report.
        fn transfer(
            &mut self,
            request: ByteRequest,
            pull: impl Fn(&PhaseEngine) -> (bool, bool),
        ) -> ByteReport {
            let mut pending = Some(request);
            for _ in 0..10_000 {
                let out = self.tick(pending, &pull);
                if out.accepted {
                    pending = None;
                }
                if let Some(report) = out.report {
                    return report;
                }
            }
            panic!("no report within tick limit");
        }

        fn run_until_idle(&mut self) {
            for _ in 0..10_000 {
                self.tick(None, |_| (false, false));
                if self.engine.phase() == Phase::Idle {
                    return;
                }
            }
            panic!("engine never returned to idle");
        }
    }

    fn ack_slave(engine: &PhaseEngine) -> (bool, bool) {
        let ack_slot = matches!(
            engine.phase(),
            Phase::AckSet | Phase::AckRisingEdge | Phase::AckFallingEdge
        );
        (false, ack_slot)
    }

    #[test]
    fn unanswered_write_reports_not_acknowledged_and_stops() {
        let mut rig = Rig::new(2);
        let report = rig.transfer(ByteRequest::write(0xA0), |_| (false, false));
        assert_eq!(
            report.outcome,
            ByteOutcome::Failed(BusError::NotAcknowledged)
        );
        assert_eq!(rig.engine.phase(), Phase::Stop);
        rig.run_until_idle();
        assert_eq!(rig.engine.drives(), (true, true));
    }

    #[test]
    fn acknowledged_write_parks_bus_in_held() {
        let mut rig = Rig::new(1);
        let report = rig.transfer(ByteRequest::write(0x5A), ack_slave);
        assert_eq!(report.outcome, ByteOutcome::Complete);
        assert_eq!(report.data, 0x5A);
        assert_eq!(rig.engine.phase(), Phase::Held);
        assert_eq!(rig.engine.drives(), (false, true));
    }

    #[test]
    fn releasing_write_ends_with_stop_condition() {
        let mut rig = Rig::new(1);
        rig.transfer(ByteRequest::write(0x01).releasing(true), ack_slave);
        let mut saw_stop = false;
        for _ in 0..20 {
            let out = rig.tick(None, |_| (false, false));
            saw_stop |= out.condition == Some(BusCondition::Stop);
        }
        assert!(saw_stop);
        assert_eq!(rig.engine.phase(), Phase::Idle);
    }

    #[test]
    fn stuck_low_data_line_is_a_bus_mismatch() {
        let mut rig = Rig::new(1);
        let report = rig.transfer(ByteRequest::write(0xFF), |_| (false, true));
        assert_eq!(report.outcome, ByteOutcome::Failed(BusError::BusMismatch));
        assert_eq!(rig.engine.phase(), Phase::Stop);
    }

    #[test]
    fn read_captures_bits_msb_first() {
        let pattern = 0b1011_0010u8;
        let mut rig = Rig::new(1);
        let report = rig.transfer(ByteRequest::read(true), move |engine| {
            let pull_sda = engine
                .session()
                .filter(|_| {
                    matches!(
                        engine.phase(),
                        Phase::BitSet | Phase::BitRisingEdge | Phase::BitFallingEdge
                    )
                })
                .is_some_and(|session| (pattern >> (7 - session.bits_done())) & 1 == 0);
            (false, pull_sda)
        });
        assert_eq!(report.outcome, ByteOutcome::Complete);
        assert_eq!(report.data, pattern);
    }

    #[test]
    fn read_ack_level_follows_request() {
        let mut rig = Rig::new(1);
        rig.tick(Some(ByteRequest::read(true)), |_| (false, false));
        while rig.engine.phase() != Phase::AckSet {
            rig.tick(None, |_| (false, false));
        }
        assert_eq!(rig.engine.drives(), (false, false));

        let mut nack = Rig::new(1);
        nack.tick(Some(ByteRequest::read(false)), |_| (false, false));
        while nack.engine.phase() != Phase::AckSet {
            nack.tick(None, |_| (false, false));
        }
        assert_eq!(nack.engine.drives(), (false, true));
    }

    #[test]
    fn clock_stretch_suspends_rising_edge_phase() {
        let stretch = |engine: &PhaseEngine| (engine.phase() == Phase::BitRisingEdge, false);
        let mut rig = Rig::new(1);
        rig.tick(Some(ByteRequest::write(0x80)), stretch);
        while rig.engine.phase() != Phase::BitRisingEdge {
            rig.tick(None, stretch);
        }
        for _ in 0..50 {
            rig.tick(None, stretch);
            assert_eq!(rig.engine.phase(), Phase::BitRisingEdge);
        }
        rig.tick(None, |_| (false, false));
        assert_eq!(rig.engine.phase(), Phase::BitRisingEdge);
        rig.tick(None, |_| (false, false));
        assert_eq!(rig.engine.phase(), Phase::BitFallingEdge);
    }

    #[test]
    fn requests_are_only_accepted_in_ack_phases() {
        let mut rig = Rig::new(1);
        let out = rig.tick(Some(ByteRequest::write(0x10)), ack_slave);
        assert!(out.accepted);
        assert_eq!(rig.engine.phase(), Phase::Start);

        let mut accepted_phase = None;
        for _ in 0..200 {
            let phase_before = rig.engine.phase();
            let out = rig.tick(Some(ByteRequest::write(0x20)), ack_slave);
            if out.accepted {
                accepted_phase = Some(phase_before);
                break;
            }
        }
        assert_eq!(accepted_phase, Some(Phase::AckSet));
    }

    #[test]
    fn queued_byte_continues_without_start() {
        let mut rig = Rig::new(1);
        let first = rig.transfer(ByteRequest::write(0x10), ack_slave);
        assert_eq!(first.outcome, ByteOutcome::Complete);
        let mut conditions = Vec::new();
        let mut pending = Some(ByteRequest::write(0x20));
        let mut report = None;
        for _ in 0..200 {
            let out = rig.tick(pending, ack_slave);
            if out.accepted {
                pending = None;
            }
            conditions.extend(out.condition);
            if out.report.is_some() {
                report = out.report;
                break;
            }
        }
        assert!(conditions.is_empty());
        assert_eq!(report.map(|r| r.outcome), Some(ByteOutcome::Complete));
    }

    #[test]
    fn restart_request_generates_repeated_start() {
        let mut rig = Rig::new(1);
        rig.transfer(ByteRequest::write(0xA0), ack_slave);
        let mut pending = Some(ByteRequest::write(0xA1).with_restart());
        let mut saw_restart = false;
        for _ in 0..200 {
            let out = rig.tick(pending, ack_slave);
            if out.accepted {
                pending = None;
            }
            saw_restart |= out.condition == Some(BusCondition::RepeatedStart);
            if out.report.is_some() {
                break;
            }
        }
        assert!(saw_restart);
    }

    #[test]
    fn queued_request_is_flushed_after_failure() {
        let mut rig = Rig::new(1);
        assert!(
            rig.tick(Some(ByteRequest::write(0xA0)), |_| (false, false))
                .accepted
        );
        let mut pending = Some(ByteRequest::write(0x00));
        let mut flushed = 0;
        let mut report = None;
        for _ in 0..200 {
            let out = rig.tick(pending, |_| (false, false));
            if out.accepted {
                pending = None;
            }
            flushed += out.flushed;
            if out.report.is_some() {
                report = out.report;
                break;
            }
        }
        assert!(pending.is_none());
        assert_eq!(
            report.map(|r| r.outcome),
            Some(ByteOutcome::Failed(BusError::NotAcknowledged))
        );
        assert_eq!(flushed, 1);
        assert!(!rig.engine.has_queued());
    }
}
