//! Decodes operator instructions into machine commands.
//!
//! An instruction is an opcode followed by at most two numeric operands, one
//! per line. Blank lines and `#` comments are skipped. The engine executes
//! decoded instructions one at a time; waiting for the machine to settle
//! between them is up to the caller.

use crate::engine::Mode;
use crate::error::{MachineError, Result};
use std::fmt;
use std::str::FromStr;

/// A register a `clear` instruction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Setting,
    Result,
    Counter,
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Register::Setting => "setting",
            Register::Result => "result",
            Register::Counter => "counter",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Dial setting digit `index` to `value`.
    Set { index: usize, value: u32 },
    /// Turn setting digit `index` by `delta` steps.
    Rotate { index: usize, delta: i64 },
    /// One cycle of the operation handle.
    Turn,
    /// Move the carriage by a signed number of places.
    Shift(i64),
    Mode(Mode),
    Clear(Register),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Set { index, value } => write!(f, "set {index} {value}"),
            Instruction::Rotate { index, delta } => write!(f, "rotate {index} {delta}"),
            Instruction::Turn => f.write_str("turn"),
            Instruction::Shift(places) => write!(f, "shift {places}"),
            Instruction::Mode(Mode::Add) => f.write_str("mode add"),
            Instruction::Mode(Mode::Subtract) => f.write_str("mode sub"),
            Instruction::Clear(register) => write!(f, "clear {register}"),
        }
    }
}

impl Instruction {
    /// Decodes a single instruction. `line` is only used for error reporting.
    pub fn parse(line: usize, text: &str) -> Result<Self> {
        let mut words = text.split_whitespace();
        let Some(opcode) = words.next() else {
            return Err(MachineError::instruction(line, "empty instruction"));
        };
        let operands: Vec<&str> = words.collect();

        let instruction = match (opcode.to_ascii_lowercase().as_str(), operands.as_slice()) {
            ("set", [index, value]) => Instruction::Set {
                index: operand(line, "digit index", index)?,
                value: operand(line, "digit value", value)?,
            },
            ("rotate", [index, delta]) => Instruction::Rotate {
                index: operand(line, "digit index", index)?,
                delta: operand(line, "rotation", delta)?,
            },
            ("turn", []) => Instruction::Turn,
            ("shift", [places]) => Instruction::Shift(operand(line, "shift", places)?),
            ("mode", [mode]) => Instruction::Mode(match mode.to_ascii_lowercase().as_str() {
                "add" => Mode::Add,
                "sub" | "subtract" => Mode::Subtract,
                other => {
                    return Err(MachineError::instruction(
                        line,
                        format!("unknown mode '{other}', expected 'add' or 'sub'"),
                    ))
                }
            }),
            ("clear", [register]) => {
                Instruction::Clear(match register.to_ascii_lowercase().as_str() {
                    "setting" => Register::Setting,
                    "result" => Register::Result,
                    "counter" => Register::Counter,
                    other => {
                        return Err(MachineError::instruction(
                            line,
                            format!("unknown register '{other}'"),
                        ))
                    }
                })
            }
            ("set" | "rotate" | "turn" | "shift" | "mode" | "clear", _) => {
                return Err(MachineError::instruction(
                    line,
                    format!("wrong number of operands for '{opcode}'"),
                ))
            }
            (other, _) => {
                return Err(MachineError::instruction(
                    line,
                    format!("unknown opcode '{other}'"),
                ))
            }
        };
        Ok(instruction)
    }
}

impl FromStr for Instruction {
    type Err = MachineError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(1, s)
    }
}

fn operand<T: FromStr>(line: usize, what: &str, text: &str) -> Result<T> {
    text.parse()
        .map_err(|_| MachineError::instruction(line, format!("invalid {what} '{text}'")))
}

/// Decodes a whole program, one instruction per line.
pub fn parse_program(source: &str) -> Result<Vec<Instruction>> {
    source
        .lines()
        .enumerate()
        .filter_map(|(i, raw)| {
            let text = raw.split('#').next().unwrap_or_default().trim();
            (!text.is_empty()).then(|| Instruction::parse(i + 1, text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_opcode() {
        assert_eq!(
            "set 2 7".parse::<Instruction>().unwrap(),
            Instruction::Set { index: 2, value: 7 }
        );
        assert_eq!(
            "rotate 0 -3".parse::<Instruction>().unwrap(),
            Instruction::Rotate { index: 0, delta: -3 }
        );
        assert_eq!("TURN".parse::<Instruction>().unwrap(), Instruction::Turn);
        assert_eq!(
            "shift -1".parse::<Instruction>().unwrap(),
            Instruction::Shift(-1)
        );
        assert_eq!(
            "mode sub".parse::<Instruction>().unwrap(),
            Instruction::Mode(Mode::Subtract)
        );
        assert_eq!(
            "clear counter".parse::<Instruction>().unwrap(),
            Instruction::Clear(Register::Counter)
        );
    }

    #[test]
    fn display_reads_back_the_same_instruction() {
        for text in ["set 1 4", "rotate 3 -2", "turn", "shift 2", "mode add", "clear result"] {
            let instruction: Instruction = text.parse().unwrap();
            assert_eq!(instruction.to_string(), text);
        }
    }

    #[test]
    fn programs_skip_comments_and_blank_lines() {
        let program = parse_program(
            "# multiply 12 by 3\n\
             set 0 2\n\
             set 1 1   # tens\n\
             \n\
             turn\n",
        )
        .unwrap();
        assert_eq!(
            program,
            vec![
                Instruction::Set { index: 0, value: 2 },
                Instruction::Set { index: 1, value: 1 },
                Instruction::Turn,
            ]
        );
    }

    #[test]
    fn errors_name_the_offending_line() {
        let err = parse_program("turn\nshift\n").unwrap_err();
        assert!(matches!(err, MachineError::Instruction { line: 2, .. }));

        let err = parse_program("turn\n\nfly 3\n").unwrap_err();
        assert!(matches!(err, MachineError::Instruction { line: 3, .. }));

        let err = "set 1 -4".parse::<Instruction>().unwrap_err();
        assert!(err.to_string().contains("digit value"));
    }
}
