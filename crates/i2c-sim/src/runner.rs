//! Script execution against a simulated bus.

use std::fmt;

use i2c_master_core::{
    BusDevice, Direction, EngineConfig, HarnessError, LineDrive, MemorySlave, OpenBus, RegisterBus,
    Testbench, TraceEvent, TransactionRequest, TransactionStatus, WriteResult, REG_SPEED,
};

use crate::script::{ConfigChange, Script, SlaveSpec, Step};

/// Device currently attached to the simulated bus.
#[derive(Debug, Clone)]
pub enum AttachedDevice {
    /// Nothing attached.
    Empty(OpenBus),
    /// A memory slave.
    Memory(MemorySlave),
}

impl AttachedDevice {
    fn from_spec(spec: &SlaveSpec) -> Self {
        let mut slave = MemorySlave::new(spec.address).with_stretch(spec.stretch);
        if let Some(index) = spec.nack_at {
            slave = slave.with_nack_at(index);
        }
        if spec.nack_address {
            slave = slave.with_nack_on_address();
        }
        Self::Memory(slave)
    }
}

impl BusDevice for AttachedDevice {
    fn step(&mut self, bus: LineDrive) -> LineDrive {
        match self {
            Self::Empty(open) => open.step(bus),
            Self::Memory(slave) => slave.step(bus),
        }
    }
}

/// Options for a script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    /// Record trace events for every step.
    pub trace: bool,
}

/// Result of one script step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    /// Source line.
    pub line: usize,
    /// Command text.
    pub text: String,
    /// Failure description, `None` when the step passed.
    pub failure: Option<String>,
    /// Short note on what the step did.
    pub detail: String,
    /// Trace events recorded while the step ran.
    pub trace: Vec<TraceEvent>,
}

impl StepResult {
    /// Returns true if the step passed.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// Result of a whole script run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunReport {
    /// One entry per executed step.
    pub steps: Vec<StepResult>,
}

impl RunReport {
    /// Returns true if every step passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.steps.iter().all(StepResult::passed)
    }

    /// Pass/fail counts.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let passed = self.steps.iter().filter(|s| s.passed()).count();
        RunSummary {
            passed,
            failed: self.steps.len() - passed,
        }
    }
}

/// Pass/fail counts of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Steps that passed.
    pub passed: usize,
    /// Steps that failed.
    pub failed: usize,
}

/// Runs `script` from a fresh engine with default configuration and an
/// empty bus.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] when a `config` step yields an invalid
/// engine configuration.
pub fn run_script(script: &Script, options: RunOptions) -> Result<RunReport, HarnessError> {
    let mut session = Session::new(options)?;
    let mut report = RunReport::default();
    for line in &script.lines {
        let outcome = session.execute(&line.step)?;
        report.steps.push(StepResult {
            line: line.line,
            text: line.text.clone(),
            failure: outcome.failure,
            detail: outcome.detail,
            trace: session.bench.take_trace(),
        });
    }
    Ok(report)
}

struct Outcome {
    detail: String,
    failure: Option<String>,
}

impl Outcome {
    fn pass(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
            failure: None,
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            detail: String::new(),
            failure: Some(message.into()),
        }
    }
}

struct Session {
    config: EngineConfig,
    slave: Option<SlaveSpec>,
    bench: Testbench<AttachedDevice>,
}

impl Session {
    fn new(options: RunOptions) -> Result<Self, HarnessError> {
        let config = EngineConfig {
            tracing_enabled: options.trace,
            ..EngineConfig::default()
        };
        Ok(Self {
            config: config.clone(),
            slave: None,
            bench: Testbench::new(config, AttachedDevice::Empty(OpenBus))?,
        })
    }

    fn device(&self) -> AttachedDevice {
        self.slave
            .as_ref()
            .map_or(AttachedDevice::Empty(OpenBus), AttachedDevice::from_spec)
    }

    fn execute(&mut self, step: &Step) -> Result<Outcome, HarnessError> {
        let outcome = match step {
            Step::Config(change) => {
                match *change {
                    ConfigChange::Divisor(divisor) => self.config.default_divisor = divisor,
                    ConfigChange::ReadOnly => self.config.read_only = true,
                    ConfigChange::ByteOrder(order) => self.config.byte_order = order,
                }
                self.bench = Testbench::new(self.config.clone(), self.device())?;
                Outcome::pass("engine rebuilt")
            }
            Step::Slave(spec) => {
                self.slave = Some(*spec);
                *self.bench.device_mut() = self.device();
                Outcome::pass(format!("slave attached at {:#04x}", spec.address))
            }
            Step::Write {
                device,
                offset,
                bytes,
            } => self.transaction(*device, *offset, Direction::Write, bytes),
            Step::Read {
                device,
                offset,
                count,
            } => self.transaction(*device, *offset, Direction::Read, &vec![0; *count]),
            Step::Expect { offset, bytes } => match self.bench.read_buffer(*offset, bytes.len()) {
                Ok(actual) if actual == *bytes => {
                    Outcome::pass(format!("{} bytes match", bytes.len()))
                }
                Ok(actual) => Outcome::fail(format!(
                    "buffer mismatch: expected {}, got {}",
                    hex_bytes(bytes),
                    hex_bytes(&actual)
                )),
                Err(err) => Outcome::fail(err.to_string()),
            },
            Step::ExpectOk => {
                let status = self.bench.status();
                if status.error {
                    Outcome::fail(format!("expected no error, got {}", describe(&status)))
                } else {
                    Outcome::pass("no error")
                }
            }
            Step::ExpectError => {
                if self.bench.status().error {
                    Outcome::pass("error flag set")
                } else {
                    Outcome::fail("expected error flag, none set")
                }
            }
            Step::Speed(value) => match self.bench.write32(REG_SPEED, *value, 0b1111) {
                Ok(WriteResult::Applied) => {
                    Outcome::pass(format!("divisor now {}", self.bench.engine().divisor()))
                }
                Ok(WriteResult::Ignored) => Outcome::fail("speed write ignored"),
                Err(err) => Outcome::fail(err.to_string()),
            },
        };
        Ok(outcome)
    }

    fn transaction(
        &mut self,
        device: u8,
        offset: usize,
        direction: Direction,
        bytes: &[u8],
    ) -> Outcome {
        let limit = self.watchdog_budget(bytes.len());
        let result = self.run_transaction(device, offset, direction, bytes, limit);
        match result {
            Ok(Some(status)) => Outcome::pass(describe(&status)),
            Ok(None) => Outcome::pass("not started"),
            Err(err) => Outcome::fail(err.to_string()),
        }
    }

    fn run_transaction(
        &mut self,
        device: u8,
        offset: usize,
        direction: Direction,
        bytes: &[u8],
        limit: u64,
    ) -> Result<Option<TransactionStatus>, HarnessError> {
        // Read-only engines ignore buffer writes but still take the command.
        if direction == Direction::Write && !self.config.read_only {
            self.bench.load_buffer(offset, bytes)?;
        }
        self.bench.submit(TransactionRequest {
            device,
            direction,
            offset,
            count: bytes.len(),
        })?;
        if !self.bench.engine().is_busy() {
            return Ok(None);
        }
        self.bench.run_until_idle(limit)?;
        Ok(Some(self.bench.status()))
    }

    fn watchdog_budget(&self, count: usize) -> u64 {
        let divisor = u64::from(self.bench.engine().divisor());
        let stretch = self.slave.map_or(0, |s| u64::from(s.stretch));
        let bytes = u64::try_from(count).unwrap_or(u64::MAX).saturating_add(4);
        bytes.saturating_mul(divisor * 64 + stretch * 2 + 64)
    }
}

fn describe(status: &TransactionStatus) -> String {
    match (status.error, status.last_error) {
        (true, Some(err)) => format!(
            "{err} at address {}, {} remaining",
            status.address, status.remaining
        ),
        (true, None) => format!("error at address {}", status.address),
        _ => format!("done, address {}", status.address),
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    let parts: Vec<String> = bytes.iter().map(|b| format!("{b:#04x}")).collect();
    format!("[{}]", parts.join(" "))
}

impl fmt::Display for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.passed() {
            write!(f, "PASS (line {}): {}: {}", self.line, self.text, self.detail)
        } else {
            write!(
                f,
                "FAIL (line {}): {}: {}",
                self.line,
                self.text,
                self.failure.as_deref().unwrap_or("unknown failure")
            )
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} passed, {} failed", self.passed, self.failed)
    }
}
