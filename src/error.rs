use std::path::PathBuf;

use thiserror::Error;

use crate::process::{Pid, Process};

/// Why an allocation request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocFailure {
    EmptyRequest,
    OutOfFrames { needed: usize, free: usize },
    VirtualSpaceExhausted,
}

impl std::fmt::Display for AllocFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllocFailure::EmptyRequest => write!(f, "zero-sized request"),
            AllocFailure::OutOfFrames { needed, free } => {
                write!(f, "needs {} frames, {} free", needed, free)
            }
            AllocFailure::VirtualSpaceExhausted => write!(f, "virtual address space exhausted"),
        }
    }
}

/// Errors raised by the paged memory manager.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    #[error("cannot allocate {requested} bytes: {reason}")]
    AllocationFailed { requested: u32, reason: AllocFailure },

    #[error("invalid address {0:#07x}")]
    InvalidAddress(u32),
}

pub type MemResult<T> = Result<T, MemError>;

/// Errors raised by the ready queues.
#[derive(Error, Debug)]
pub enum SchedError {
    /// The process is handed back so the caller decides what to do with it.
    #[error("ready queue level {level} is full, process {pid} rejected")]
    QueueOverflow {
        pid: Pid,
        level: usize,
        process: Box<Process>,
    },
}

/// Failure of a single instruction. Never fatal to the process.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    #[error(transparent)]
    Memory(#[from] MemError),

    #[error("program counter {pc} past end of code ({len} instructions)")]
    PcOutOfRange { pc: usize, len: usize },

    #[error("no register {0}")]
    BadRegister(usize),
}

/// Fatal problems with configuration or process descriptors.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("line {line}: unknown opcode `{opcode}`")]
    UnknownOpcode { line: usize, opcode: String },

    #[error("line {line}: register {register} out of range (0..{max})")]
    BadRegister { line: usize, register: u32, max: usize },

    #[error("priority {priority} out of range (0..{max})")]
    BadPriority { priority: usize, max: usize },

    #[error("expected {expected} {what}, found {found}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}
