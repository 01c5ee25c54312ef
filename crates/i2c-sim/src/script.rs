//! Parsing for transaction scripts.
//!
//! A script is a list of line-oriented commands run in order against one
//! simulated memory slave.
//!
//! ## Supported Syntax
//!
//! - `config divisor <n>`, `config read-only`, `config byte-order <big|little>`
//! - `slave <addr> [stretch <ticks>] [nack <index>] [nack-address]`
//! - `write <device> <offset> <byte>...`
//! - `read <device> <offset> <count>`
//! - `expect <offset> <byte>...`
//! - `expect-ok`, `expect-error`
//! - `speed <n>`
//! - Comments: `#` to end of line
//! - Literals: decimal, `0x` hex, `0b` binary

use i2c_master_core::ByteOrder;
use thiserror::Error;

/// Engine configuration change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigChange {
    /// Default clock divisor.
    Divisor(u32),
    /// Reject write transactions.
    ReadOnly,
    /// Buffer lane mapping.
    ByteOrder(ByteOrder),
}

/// Memory slave attached to the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveSpec {
    /// 7-bit address.
    pub address: u8,
    /// Ticks SCL is held low after each acknowledged byte.
    pub stretch: u32,
    /// Written data byte left unacknowledged.
    pub nack_at: Option<usize>,
    /// Address byte left unacknowledged.
    pub nack_address: bool,
}

/// One script command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Reconfigure and rebuild the engine.
    Config(ConfigChange),
    /// Attach a fresh memory slave.
    Slave(SlaveSpec),
    /// Load bytes into the buffer and write them to a device.
    Write {
        /// 7-bit device address.
        device: u8,
        /// Buffer and word-pointer offset.
        offset: usize,
        /// Bytes to write.
        bytes: Vec<u8>,
    },
    /// Read bytes from a device into the buffer.
    Read {
        /// 7-bit device address.
        device: u8,
        /// Buffer and word-pointer offset.
        offset: usize,
        /// Number of bytes.
        count: usize,
    },
    /// Compare buffer contents.
    Expect {
        /// First buffer byte.
        offset: usize,
        /// Expected bytes.
        bytes: Vec<u8>,
    },
    /// The last transaction finished without error.
    ExpectOk,
    /// The last transaction finished with the error flag set.
    ExpectError,
    /// Write the speed register.
    Speed(u32),
}

/// A step with its source line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLine {
    /// 1-indexed source line.
    pub line: usize,
    /// Command text without comments.
    pub text: String,
    /// Parsed step.
    pub step: Step,
}

/// Parsed script.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    /// Steps in source order.
    pub lines: Vec<ScriptLine>,
}

/// Script syntax error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message} (in '{text}')")]
pub struct ScriptError {
    /// 1-indexed source line.
    pub line: usize,
    /// Offending text.
    pub text: String,
    /// Description of the problem.
    pub message: String,
}

/// Parses a script.
///
/// # Errors
///
/// Returns the first [`ScriptError`] encountered.
pub fn parse_script(source: &str) -> Result<Script, ScriptError> {
    let mut lines = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let text = strip_comment(raw).trim();
        if text.is_empty() {
            continue;
        }
        let step = parse_step(text).map_err(|message| ScriptError {
            line: idx + 1,
            text: text.to_string(),
            message,
        })?;
        lines.push(ScriptLine {
            line: idx + 1,
            text: text.to_string(),
            step,
        });
    }
    Ok(Script { lines })
}

fn strip_comment(line: &str) -> &str {
    line.find('#').map_or(line, |pos| &line[..pos])
}

fn parse_step(text: &str) -> Result<Step, String> {
    let mut words = text.split_whitespace();
    let keyword = words.next().unwrap_or_default();
    let args: Vec<&str> = words.collect();

    match keyword {
        "config" => parse_config(&args).map(Step::Config),
        "slave" => parse_slave(&args).map(Step::Slave),
        "write" => {
            let [device, offset, bytes @ ..] = args.as_slice() else {
                return Err("expected: write <device> <offset> <byte>...".to_string());
            };
            if bytes.is_empty() {
                return Err("write needs at least one byte".to_string());
            }
            Ok(Step::Write {
                device: parse_device(device)?,
                offset: parse_number(offset)?,
                bytes: parse_bytes(bytes)?,
            })
        }
        "read" => {
            let [device, offset, count] = args.as_slice() else {
                return Err("expected: read <device> <offset> <count>".to_string());
            };
            Ok(Step::Read {
                device: parse_device(device)?,
                offset: parse_number(offset)?,
                count: parse_number(count)?,
            })
        }
        "expect" => {
            let [offset, bytes @ ..] = args.as_slice() else {
                return Err("expected: expect <offset> <byte>...".to_string());
            };
            if bytes.is_empty() {
                return Err("expect needs at least one byte".to_string());
            }
            Ok(Step::Expect {
                offset: parse_number(offset)?,
                bytes: parse_bytes(bytes)?,
            })
        }
        "expect-ok" => no_args(&args, Step::ExpectOk),
        "expect-error" => no_args(&args, Step::ExpectError),
        "speed" => {
            let [value] = args.as_slice() else {
                return Err("expected: speed <n>".to_string());
            };
            Ok(Step::Speed(parse_number(value)?))
        }
        other => Err(format!("unknown command '{other}'")),
    }
}

fn no_args(args: &[&str], step: Step) -> Result<Step, String> {
    if args.is_empty() {
        Ok(step)
    } else {
        Err("command takes no arguments".to_string())
    }
}

fn parse_config(args: &[&str]) -> Result<ConfigChange, String> {
    match args {
        ["divisor", value] => {
            let divisor: u32 = parse_number(value)?;
            if divisor == 0 {
                return Err("divisor must be non-zero".to_string());
            }
            Ok(ConfigChange::Divisor(divisor))
        }
        ["read-only"] => Ok(ConfigChange::ReadOnly),
        ["byte-order", "big"] => Ok(ConfigChange::ByteOrder(ByteOrder::Big)),
        ["byte-order", "little"] => Ok(ConfigChange::ByteOrder(ByteOrder::Little)),
        _ => Err(
            "expected: config divisor <n> | read-only | byte-order <big|little>".to_string(),
        ),
    }
}

fn parse_slave(args: &[&str]) -> Result<SlaveSpec, String> {
    let [address, options @ ..] = args else {
        return Err(
            "expected: slave <addr> [stretch <n>] [nack <index>] [nack-address]".to_string(),
        );
    };
    let mut spec = SlaveSpec {
        address: parse_device(address)?,
        stretch: 0,
        nack_at: None,
        nack_address: false,
    };
    let mut options = options.iter();
    while let Some(option) = options.next() {
        match *option {
            "stretch" => {
                let value = options.next().ok_or("missing value for stretch")?;
                spec.stretch = parse_number(value)?;
            }
            "nack" => {
                let value = options.next().ok_or("missing value for nack")?;
                spec.nack_at = Some(parse_number(value)?);
            }
            "nack-address" => spec.nack_address = true,
            other => return Err(format!("unknown slave option '{other}'")),
        }
    }
    Ok(spec)
}

fn parse_device(text: &str) -> Result<u8, String> {
    let value: u8 = parse_number(text)?;
    if value > 0x7F {
        return Err(format!("device address {text} exceeds 7 bits"));
    }
    Ok(value)
}

fn parse_bytes(texts: &[&str]) -> Result<Vec<u8>, String> {
    texts.iter().map(|text| parse_number(text)).collect()
}

fn parse_number<T: TryFrom<u64>>(text: &str) -> Result<T, String> {
    let lower = text.to_ascii_lowercase();
    let parsed = if let Some(hex) = lower.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        u64::from_str_radix(bin, 2)
    } else {
        lower.parse::<u64>()
    };
    let value = parsed.map_err(|_| format!("invalid number '{text}'"))?;
    T::try_from(value).map_err(|_| format!("number '{text}' out of range"))
}

#[cfg(test)]
mod tests {
    use super::{parse_script, ConfigChange, SlaveSpec, Step};
    use i2c_master_core::ByteOrder;

    #[test]
    fn parses_full_script() {
        let script = parse_script(
            "# setup\n\
             config divisor 4\n\
             config byte-order little\n\
             slave 0x50 stretch 10 nack 2\n\
             \n\
             write 0x50 4 0x11 0x22 0b110011 # inline\n\
             expect-ok\n\
             read 0x50 4 3\n\
             expect 4 0x11 0x22 51\n\
             speed 100\n\
             expect-error\n",
        )
        .expect("script should parse");

        let steps: Vec<_> = script.lines.iter().map(|line| line.step.clone()).collect();
        assert_eq!(
            steps,
            vec![
                Step::Config(ConfigChange::Divisor(4)),
                Step::Config(ConfigChange::ByteOrder(ByteOrder::Little)),
                Step::Slave(SlaveSpec {
                    address: 0x50,
                    stretch: 10,
                    nack_at: Some(2),
                    nack_address: false,
                }),
                Step::Write {
                    device: 0x50,
                    offset: 4,
                    bytes: vec![0x11, 0x22, 0x33],
                },
                Step::ExpectOk,
                Step::Read {
                    device: 0x50,
                    offset: 4,
                    count: 3,
                },
                Step::Expect {
                    offset: 4,
                    bytes: vec![0x11, 0x22, 0x33],
                },
                Step::Speed(100),
                Step::ExpectError,
            ]
        );
        assert_eq!(script.lines[3].line, 6);
    }

    #[test]
    fn reports_line_of_first_error() {
        let error = parse_script("slave 0x50\nwrite 0x50 0\n").expect_err("missing bytes");
        assert_eq!(error.line, 2);
        assert!(error.message.contains("at least one byte"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse_script("write 0x80 0 1").is_err());
        assert!(parse_script("write 0x50 0 256").is_err());
        assert!(parse_script("config divisor 0").is_err());
        assert!(parse_script("frobnicate").is_err());
        assert!(parse_script("expect-ok now").is_err());
    }

    #[test]
    fn slave_flags() {
        let script = parse_script("slave 0x20 nack-address").unwrap();
        assert_eq!(
            script.lines[0].step,
            Step::Slave(SlaveSpec {
                address: 0x20,
                stretch: 0,
                nack_at: None,
                nack_address: true,
            })
        );
    }
}
