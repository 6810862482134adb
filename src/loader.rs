//! Process descriptor parsing.
//!
//! A descriptor starts with `base_priority code_size` followed by one
//! instruction per line:
//!
//! ```text
//! 1 4
//! alloc 300 0
//! write 100 0 20
//! read 0 20 1
//! free 0
//! ```

use std::fs;
use std::path::Path;
use std::str::SplitWhitespace;

use crate::constants::NUM_REGISTERS;
use crate::error::LoadError;
use crate::process::{Instruction, PidAllocator, Process};

/// Read and parse the descriptor at `path`.
pub fn load<P: AsRef<Path>>(path: P, pids: &PidAllocator) -> Result<Process, LoadError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_descriptor(&content, pids)
}

/// Parse descriptor text. A pid is taken from `pids` only once the whole
/// descriptor is valid.
pub fn parse_descriptor(content: &str, pids: &PidAllocator) -> Result<Process, LoadError> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    let (header_line, header) = lines.next().ok_or(LoadError::Parse {
        line: 1,
        message: "empty descriptor".to_string(),
    })?;
    let mut tokens = Operands::new(header_line, header);
    let base_priority: u32 = tokens.number("base priority")?;
    let code_size: usize = tokens.number("code size")?;
    tokens.finish()?;

    let code = lines
        .map(|(line, text)| parse_instruction(line, text))
        .collect::<Result<Vec<_>, _>>()?;
    if code.len() != code_size {
        return Err(LoadError::CountMismatch {
            what: "instructions",
            expected: code_size,
            found: code.len(),
        });
    }

    Ok(Process::new(pids.next(), base_priority, code))
}

fn parse_instruction(line: usize, text: &str) -> Result<Instruction, LoadError> {
    let mut ops = Operands::new(line, text);
    let opcode = ops.tokens.next().unwrap_or_default();

    let ins = match opcode {
        "calc" => Instruction::Calc,
        "alloc" => Instruction::Alloc {
            size: ops.number("size")?,
            reg: ops.register()?,
        },
        "free" => Instruction::Free { reg: ops.register()? },
        "read" => Instruction::Read {
            src: ops.register()?,
            offset: ops.number("offset")?,
            dst: ops.register()?,
        },
        "write" => Instruction::Write {
            value: ops.number("byte value")?,
            dst: ops.register()?,
            offset: ops.number("offset")?,
        },
        other => {
            return Err(LoadError::UnknownOpcode {
                line,
                opcode: other.to_string(),
            });
        }
    };
    ops.finish()?;
    Ok(ins)
}

/// Operand cursor over one line.
struct Operands<'a> {
    line: usize,
    tokens: SplitWhitespace<'a>,
}

impl<'a> Operands<'a> {
    fn new(line: usize, text: &'a str) -> Self {
        Operands {
            line,
            tokens: text.split_whitespace(),
        }
    }

    fn number<T: std::str::FromStr>(&mut self, what: &str) -> Result<T, LoadError> {
        let token = self.tokens.next().ok_or_else(|| LoadError::Parse {
            line: self.line,
            message: format!("missing {}", what),
        })?;
        token.parse().map_err(|_| LoadError::Parse {
            line: self.line,
            message: format!("invalid {}: {}", what, token),
        })
    }

    fn register(&mut self) -> Result<usize, LoadError> {
        let register: u32 = self.number("register")?;
        if register as usize >= NUM_REGISTERS {
            return Err(LoadError::BadRegister {
                line: self.line,
                register,
                max: NUM_REGISTERS,
            });
        }
        Ok(register as usize)
    }

    fn finish(mut self) -> Result<(), LoadError> {
        match self.tokens.next() {
            None => Ok(()),
            Some(extra) => Err(LoadError::Parse {
                line: self.line,
                message: format!("unexpected operand: {}", extra),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::Pid;

    #[test]
    fn test_parse_descriptor() {
        let pids = PidAllocator::new();
        let content = "2 5\ncalc\nalloc 300 0\nwrite 100 0 20\nread 0 20 1\nfree 0\n";
        let proc = parse_descriptor(content, &pids).unwrap();

        assert_eq!(proc.pid, Pid(1));
        assert_eq!(proc.base_priority, 2);
        assert_eq!(
            proc.code,
            vec![
                Instruction::Calc,
                Instruction::Alloc { size: 300, reg: 0 },
                Instruction::Write { value: 100, dst: 0, offset: 20 },
                Instruction::Read { src: 0, offset: 20, dst: 1 },
                Instruction::Free { reg: 0 },
            ]
        );
    }

    #[test]
    fn test_blank_lines_ignored() {
        let pids = PidAllocator::new();
        let proc = parse_descriptor("\n0 2\n\ncalc\n  calc  \n\n", &pids).unwrap();
        assert_eq!(proc.code.len(), 2);
    }

    #[test]
    fn test_empty_descriptor() {
        let pids = PidAllocator::new();
        assert!(matches!(
            parse_descriptor("   \n", &pids),
            Err(LoadError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_unknown_opcode() {
        let pids = PidAllocator::new();
        let err = parse_descriptor("0 2\ncalc\njump 4\n", &pids).unwrap_err();
        match err {
            LoadError::UnknownOpcode { line, opcode } => {
                assert_eq!(line, 3);
                assert_eq!(opcode, "jump");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_register_out_of_range() {
        let pids = PidAllocator::new();
        let err = parse_descriptor("0 1\nfree 10\n", &pids).unwrap_err();
        assert!(matches!(
            err,
            LoadError::BadRegister { line: 2, register: 10, max: NUM_REGISTERS }
        ));
    }

    #[test]
    fn test_write_value_must_fit_byte() {
        let pids = PidAllocator::new();
        let err = parse_descriptor("0 1\nwrite 256 0 0\n", &pids).unwrap_err();
        assert!(matches!(err, LoadError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_operand_count_checked() {
        let pids = PidAllocator::new();
        assert!(parse_descriptor("0 1\nalloc 10\n", &pids).is_err());
        assert!(parse_descriptor("0 1\ncalc 1\n", &pids).is_err());
        assert!(parse_descriptor("0 1 7\ncalc\n", &pids).is_err());
    }

    #[test]
    fn test_code_size_mismatch() {
        let pids = PidAllocator::new();
        let err = parse_descriptor("0 3\ncalc\ncalc\n", &pids).unwrap_err();
        assert!(matches!(
            err,
            LoadError::CountMismatch { expected: 3, found: 2, .. }
        ));
    }

    #[test]
    fn test_failed_parse_consumes_no_pid() {
        let pids = PidAllocator::new();
        assert!(parse_descriptor("0 1\nbogus\n", &pids).is_err());
        let proc = parse_descriptor("0 0\n", &pids).unwrap();
        assert_eq!(proc.pid, Pid(1));
        assert!(proc.is_finished());
    }

    #[test]
    fn test_load_missing_file() {
        let pids = PidAllocator::new();
        let err = load("/nonexistent/os-sim/descriptor", &pids).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
