use std::sync::atomic::{AtomicU32, Ordering};

use crate::constants::*;
use crate::paging::PageTable;

/// Process identifier. Never 0 and never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(pub u32);

impl std::fmt::Display for Pid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:2}", self.0)
    }
}

/// Hands out process ids in increasing order.
#[derive(Debug)]
pub struct PidAllocator {
    next: AtomicU32,
}

impl PidAllocator {
    pub fn new() -> Self {
        PidAllocator {
            next: AtomicU32::new(1),
        }
    }

    pub fn next(&self) -> Pid {
        Pid(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Pure computation, no side effect.
    Calc,
    /// Allocate `size` bytes, store the base address in `reg`.
    Alloc { size: u32, reg: usize },
    /// Free the allocation whose address is in `reg`.
    Free { reg: usize },
    /// `regs[dst] = mem[regs[src] + offset]`
    Read { src: usize, offset: u32, dst: usize },
    /// `mem[regs[dst] + offset] = value`
    Write { value: u8, dst: usize, offset: u32 },
}

/// Process control block.
#[derive(Debug)]
pub struct Process {
    pub pid: Pid,
    /// Ready-queue level, lower is more urgent.
    pub priority: usize,
    /// Priority declared by the descriptor; orders processes sharing a level.
    pub base_priority: u32,
    pub code: Vec<Instruction>,
    pub regs: [u32; NUM_REGISTERS],
    pub pc: usize,
    pub page_table: PageTable,
    /// Next unused virtual address. Page 0 stays unmapped.
    pub bp: u32,
}

impl Process {
    pub fn new(pid: Pid, base_priority: u32, code: Vec<Instruction>) -> Self {
        Process {
            pid,
            priority: 0,
            base_priority,
            code,
            regs: [0; NUM_REGISTERS],
            pc: 0,
            page_table: PageTable::new(),
            bp: PAGE_SIZE,
        }
    }

    pub fn with_priority(mut self, priority: usize) -> Self {
        self.priority = priority;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.pc >= self.code.len()
    }

    /// Fetch the next instruction and advance the program counter.
    pub fn fetch(&mut self) -> Option<Instruction> {
        let ins = self.code.get(self.pc).copied()?;
        self.pc += 1;
        Some(ins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_allocator_is_monotonic() {
        let pids = PidAllocator::new();
        let a = pids.next();
        let b = pids.next();
        let c = pids.next();
        assert_eq!(a, Pid(1));
        assert!(a < b && b < c);
    }

    #[test]
    fn test_new_process_state() {
        let proc = Process::new(Pid(4), 3, vec![Instruction::Calc]);
        assert_eq!(proc.bp, PAGE_SIZE);
        assert_eq!(proc.pc, 0);
        assert_eq!(proc.priority, 0);
        assert!(proc.page_table.is_empty());
        assert!(!proc.is_finished());
    }

    #[test]
    fn test_fetch_advances_until_finished() {
        let mut proc = Process::new(
            Pid(1),
            0,
            vec![Instruction::Calc, Instruction::Free { reg: 2 }],
        );

        assert_eq!(proc.fetch(), Some(Instruction::Calc));
        assert_eq!(proc.fetch(), Some(Instruction::Free { reg: 2 }));
        assert!(proc.is_finished());
        assert_eq!(proc.fetch(), None);
        assert_eq!(proc.pc, 2);
    }

    #[test]
    fn test_empty_program_is_finished() {
        assert!(Process::new(Pid(1), 0, Vec::new()).is_finished());
    }
}
