//! Transaction controller.
//!
//! Sequences the device address, the buffer offset, the optional repeated
//! start for reads, and the data bytes of one host command through the
//! phase engine. The engine reports each byte one phase after it accepted
//! the following request, so the controller counts acknowledgements still
//! in flight and drains them in `Cleanup` before going idle.

use crate::buffer::{SharedBuffer, WriteSource};
use crate::phase::{ByteOutcome, ByteReport, ByteRequest, PhaseOutputs};
use crate::status::{Direction, InterruptState, TransactionRequest, TransactionStatus};
use crate::{BusError, EngineConfig};

/// Transaction controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ControllerState {
    /// Waiting for a command.
    #[default]
    Idle,
    /// Device address byte issued; the buffer offset follows.
    DeviceAddress,
    /// Waiting for the offset byte's ack before switching direction.
    ReadTurnaround,
    /// Read-intent address issued behind a repeated start.
    ReadDevice,
    /// Sending buffer bytes.
    TransmitData,
    /// Receiving bytes into the buffer.
    ReceiveData,
    /// Draining in-flight acknowledgements and the stop condition.
    Cleanup,
}

/// Result of a command-register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandOutcome {
    /// Transaction latched; it starts on the next controller step.
    Accepted,
    /// A transaction is active; the write was ignored.
    Busy,
    /// Byte count was zero; nothing was issued.
    ZeroLength,
    /// Write direction requested on a read-only engine.
    ReadOnly,
}

/// Per-tick outputs of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerOutputs {
    /// Byte request offered to the phase engine this tick.
    pub request: Option<ByteRequest>,
    /// Transaction that left `Idle` this tick.
    pub started: Option<TransactionRequest>,
    /// Completed data byte: buffer address and value.
    pub data_byte: Option<(usize, u8)>,
    /// Transaction returned to `Idle` this tick; carries the sticky error.
    pub finished: Option<Option<BusError>>,
}

/// Transaction controller state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Controller {
    state: ControllerState,
    status: TransactionStatus,
    interrupt: InterruptState,
    command: Option<TransactionRequest>,
    active: Option<TransactionRequest>,
    issue: Option<ByteRequest>,
    pending_acks: u8,
    control_acks: u8,
    issue_addr: usize,
    to_issue: usize,
    address_mask: usize,
    read_only: bool,
    nack_final_read: bool,
}

impl Controller {
    /// Creates an idle controller for `config`.
    #[must_use]
    pub const fn new(config: &EngineConfig) -> Self {
        Self {
            state: ControllerState::Idle,
            status: TransactionStatus {
                busy: false,
                error: false,
                last_error: None,
                device: 0,
                direction: Direction::Write,
                address: 0,
                remaining: 0,
            },
            interrupt: InterruptState {
                pending: false,
                enable: false,
            },
            command: None,
            active: None,
            issue: None,
            pending_acks: 0,
            control_acks: 0,
            issue_addr: 0,
            to_issue: 0,
            address_mask: config.address_mask(),
            read_only: config.read_only,
            nack_final_read: config.nack_final_read,
        }
    }

    /// Returns every field except the configuration to its reset value.
    pub fn reset(&mut self) {
        *self = Self {
            address_mask: self.address_mask,
            read_only: self.read_only,
            nack_final_read: self.nack_final_read,
            ..Self::new(&EngineConfig::default())
        };
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ControllerState {
        self.state
    }

    /// Host-visible status.
    #[must_use]
    pub const fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Interrupt state.
    #[must_use]
    pub const fn interrupt(&self) -> InterruptState {
        self.interrupt
    }

    /// Mutable interrupt state for the register layer.
    pub const fn interrupt_mut(&mut self) -> &mut InterruptState {
        &mut self.interrupt
    }

    /// Acknowledgements expected from the phase engine.
    #[must_use]
    pub const fn pending_acks(&self) -> u8 {
        self.pending_acks
    }

    /// Handles a command-register write.
    pub fn submit(&mut self, request: TransactionRequest) -> CommandOutcome {
        if self.status.busy {
            return CommandOutcome::Busy;
        }
        let request = TransactionRequest {
            device: request.device & 0x7F,
            offset: request.offset & self.address_mask,
            count: request.count & self.address_mask,
            ..request
        };
        self.status.error = false;
        self.status.last_error = None;
        self.status.device = request.device;
        self.status.direction = request.direction;
        self.status.address = request.offset;
        self.status.remaining = request.count;

        if request.count == 0 {
            return CommandOutcome::ZeroLength;
        }
        if self.read_only && request.direction == Direction::Write {
            log::debug!("write command rejected by read-only engine");
            return CommandOutcome::ReadOnly;
        }
        self.status.busy = true;
        self.command = Some(request);
        CommandOutcome::Accepted
    }

    /// Advances the controller by one tick.
    ///
    /// `engine` holds the phase engine outputs registered at the end of the
    /// previous tick.
    pub fn advance(
        &mut self,
        engine: &PhaseOutputs,
        buffer: &mut SharedBuffer,
    ) -> ControllerOutputs {
        let mut out = ControllerOutputs::default();

        if engine.accepted {
            self.issue = None;
            self.pending_acks = self.pending_acks.saturating_add(1);
        }
        if let Some(report) = engine.report {
            self.pending_acks = self.pending_acks.saturating_sub(1);
            self.on_report(report, buffer, &mut out);
        }
        self.pending_acks = self.pending_acks.saturating_sub(engine.flushed);

        match self.state {
            ControllerState::Idle => {
                if let Some(request) = self.command.take() {
                    log::debug!(
                        "transaction start: device {:#04x} {:?} offset {} count {}",
                        request.device,
                        request.direction,
                        request.offset,
                        request.count
                    );
                    self.active = Some(request);
                    self.issue_addr = request.offset;
                    self.to_issue = request.count;
                    self.issue_control(ByteRequest::write(request.address_byte(Direction::Write)));
                    self.state = ControllerState::DeviceAddress;
                    out.started = Some(request);
                }
            }
            ControllerState::DeviceAddress => {
                if let (None, Some(request)) = (self.issue, self.active) {
                    #[allow(clippy::cast_possible_truncation)]
                    let offset = request.offset as u8;
                    self.issue_control(ByteRequest::write(offset));
                    self.state = match request.direction {
                        Direction::Read => ControllerState::ReadTurnaround,
                        Direction::Write => ControllerState::TransmitData,
                    };
                }
            }
            ControllerState::ReadTurnaround => {
                if let (None, 0, Some(request)) = (self.issue, self.pending_acks, self.active) {
                    self.issue_control(
                        ByteRequest::write(request.address_byte(Direction::Read)).with_restart(),
                    );
                    self.state = ControllerState::ReadDevice;
                }
            }
            ControllerState::ReadDevice => {
                if self.issue.is_none() {
                    self.state = ControllerState::ReceiveData;
                    self.issue_read();
                }
            }
            ControllerState::TransmitData => {
                if self.issue.is_none() {
                    if self.to_issue == 0 {
                        self.state = ControllerState::Cleanup;
                    } else {
                        let byte = buffer.byte(self.issue_addr);
                        let last = self.to_issue == 1;
                        self.issue = Some(ByteRequest::write(byte).releasing(last));
                        self.issue_addr = (self.issue_addr + 1) & self.address_mask;
                        self.to_issue -= 1;
                    }
                }
            }
            ControllerState::ReceiveData => {
                if self.status.remaining == 0 {
                    self.state = ControllerState::Cleanup;
                } else {
                    self.issue_read();
                }
            }
            ControllerState::Cleanup => {
                if self.pending_acks == 0 && !engine.held && self.issue.is_none() {
                    self.finish(&mut out);
                }
            }
        }

        buffer.set_write_lock(self.state == ControllerState::ReceiveData);
        out.request = self.issue;
        out
    }

    fn issue_control(&mut self, request: ByteRequest) {
        self.issue = Some(request);
        self.control_acks = self.control_acks.saturating_add(1);
    }

    fn issue_read(&mut self) {
        if self.issue.is_some() || self.to_issue == 0 {
            return;
        }
        let last = self.to_issue == 1;
        let ack = !(last && self.nack_final_read);
        self.issue = Some(ByteRequest::read(ack).releasing(last));
        self.to_issue -= 1;
    }

    fn on_report(
        &mut self,
        report: ByteReport,
        buffer: &mut SharedBuffer,
        out: &mut ControllerOutputs,
    ) {
        let control = self.control_acks > 0;
        if control && report.outcome != ByteOutcome::Flushed {
            self.control_acks -= 1;
        }
        match report.outcome {
            ByteOutcome::Flushed => {}
            ByteOutcome::Failed(error) => self.fail(error),
            ByteOutcome::Complete if control || self.status.error => {}
            ByteOutcome::Complete => {
                let addr = self.status.address;
                if self.status.direction == Direction::Read {
                    if let Err(err) =
                        buffer.stage_byte(addr, report.data, WriteSource::Controller)
                    {
                        log::warn!("received byte at {addr} dropped: {err}");
                    }
                }
                out.data_byte = Some((addr, report.data));
                self.status.address = (addr + 1) & self.address_mask;
                self.status.remaining = self.status.remaining.saturating_sub(1);
            }
        }
    }

    fn fail(&mut self, error: BusError) {
        if self.status.error {
            return;
        }
        log::warn!("transaction aborted: {error}");
        self.status.error = true;
        self.status.last_error = Some(error);
        self.issue = None;
        self.to_issue = 0;
        self.state = ControllerState::Cleanup;
    }

    fn finish(&mut self, out: &mut ControllerOutputs) {
        log::debug!(
            "transaction finished: address {} remaining {} error {:?}",
            self.status.address,
            self.status.remaining,
            self.status.last_error
        );
        self.state = ControllerState::Idle;
        self.status.busy = false;
        self.active = None;
        self.control_acks = 0;
        self.pending_acks = 0;
        self.interrupt.raise();
        out.finished = Some(self.status.last_error);
    }
}
