use std::sync::Arc;

use crate::error::{ExecError, SchedError};
use crate::memory::PhysicalMemory;
use crate::os::{EventKind, Machine};
use crate::process::{Instruction, Process};
use crate::timer::{TickHandle, TickStatus};
use crate::{kdebug, kinfo, kwarn};

fn reg(proc: &Process, index: usize) -> Result<u32, ExecError> {
    proc.regs.get(index).copied().ok_or(ExecError::BadRegister(index))
}

fn set_reg(proc: &mut Process, index: usize, value: u32) -> Result<(), ExecError> {
    let slot = proc.regs.get_mut(index).ok_or(ExecError::BadRegister(index))?;
    *slot = value;
    Ok(())
}

/// Execute the instruction at `proc.pc`.
///
/// The program counter moves on whether or not the instruction succeeds.
pub fn execute(proc: &mut Process, mem: &PhysicalMemory) -> Result<(), ExecError> {
    let ins = proc.fetch().ok_or(ExecError::PcOutOfRange {
        pc: proc.pc,
        len: proc.code.len(),
    })?;

    match ins {
        Instruction::Calc => {}
        Instruction::Alloc { size, reg: dst } => {
            reg(proc, dst)?;
            let addr = mem.allocate(size, proc)?;
            set_reg(proc, dst, addr)?;
        }
        Instruction::Free { reg: src } => {
            let addr = reg(proc, src)?;
            mem.free(addr, proc)?;
        }
        Instruction::Read { src, offset, dst } => {
            let addr = reg(proc, src)?.wrapping_add(offset);
            reg(proc, dst)?;
            let byte = mem.read_byte(addr, proc)?;
            set_reg(proc, dst, byte as u32)?;
        }
        Instruction::Write { value, dst, offset } => {
            let addr = reg(proc, dst)?.wrapping_add(offset);
            mem.write_byte(addr, proc, value)?;
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreState {
    /// No process held.
    Idle,
    /// A process was handed out this tick and ran its first instruction
    /// of the slice.
    Dispatched,
    /// Executing the held process on a later tick of its slice.
    Running,
    /// Nothing left to run and nothing more will arrive.
    Draining,
}

/// One simulated CPU core.
pub struct VirtualCore {
    id: usize,
    time_slot: u32,
    machine: Arc<Machine>,
    state: CoreState,
    current: Option<Box<Process>>,
    budget: u32,
}

impl VirtualCore {
    pub fn new(id: usize, time_slot: u32, machine: Arc<Machine>) -> Self {
        VirtualCore {
            id,
            time_slot: time_slot.max(1),
            machine,
            state: CoreState::Idle,
            current: None,
            budget: 0,
        }
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    pub fn current(&self) -> Option<&Process> {
        self.current.as_deref()
    }

    /// Drive the core in lock-step with the clock until it drains or the
    /// deadline passes. Each tick's step runs in the handle's turn.
    pub fn run(mut self, clock: TickHandle) {
        loop {
            clock.wait_turn();
            if !self.step(clock.current_time()) {
                break;
            }
            if let TickStatus::Expired(tick) = clock.next_slot() {
                kwarn!("CPU {}: deadline reached at tick {}", self.id, tick);
                if let Some(proc) = self.current.take() {
                    kwarn!("CPU {}: abandoning process {}", self.id, proc.pid);
                }
                break;
            }
        }
    }

    /// Work for one tick. Returns `false` once the core has stopped.
    pub fn step(&mut self, tick: u64) -> bool {
        if let Some(proc) = self.current.take() {
            if proc.is_finished() {
                self.finish(tick, proc);
            } else if self.budget == 0 {
                kinfo!("\tCPU {}: Put process {} to run queue", self.id, proc.pid);
                self.machine.record(tick, EventKind::Preempted { core: self.id, pid: proc.pid });
                self.requeue(tick, proc);
            } else {
                self.current = Some(proc);
                self.state = CoreState::Running;
            }
        }

        if self.current.is_none() {
            self.state = CoreState::Idle;
            match self.acquire(tick) {
                Some(proc) => {
                    kinfo!("\tCPU {}: Dispatched process {}", self.id, proc.pid);
                    self.machine.record(tick, EventKind::Dispatched { core: self.id, pid: proc.pid });
                    self.current = Some(proc);
                    self.budget = self.time_slot;
                    self.state = CoreState::Dispatched;
                }
                None if self.machine.loader_done() => {
                    self.state = CoreState::Draining;
                    kinfo!("\tCPU {} stopped", self.id);
                    self.machine.record(tick, EventKind::CoreStopped { core: self.id });
                    return false;
                }
                // More processes may arrive in a later tick
                None => return true,
            }
        }

        let Some(proc) = self.current.as_deref_mut() else {
            return true;
        };
        if let Err(e) = execute(proc, &self.machine.memory) {
            kdebug!("\tCPU {}: process {} instruction {} failed: {}", self.id, proc.pid, proc.pc, e);
        }
        self.budget -= 1;
        true
    }

    /// Next runnable process. Processes with nothing left to execute are
    /// retired on the spot.
    fn acquire(&mut self, tick: u64) -> Option<Box<Process>> {
        loop {
            let proc = match self.machine.scheduler.get_proc() {
                Some(proc) => proc,
                // Re-check after the loader's completion flag: every
                // process it added is visible by now.
                None if self.machine.loader_done() => self.machine.scheduler.get_proc()?,
                None => return None,
            };
            if proc.is_finished() {
                self.finish(tick, proc);
                continue;
            }
            return Some(proc);
        }
    }

    fn finish(&self, tick: u64, proc: Box<Process>) {
        kinfo!("\tCPU {}: Processed {} has finished", self.id, proc.pid);
        self.machine.record(tick, EventKind::Finished { core: self.id, pid: proc.pid });
    }

    fn requeue(&self, tick: u64, proc: Box<Process>) {
        if let Err(SchedError::QueueOverflow { pid, level, .. }) = self.machine.scheduler.add_proc(proc) {
            kwarn!("\tCPU {}: ready queue {} full, dropping process {}", self.id, level, pid);
            self.machine.record(tick, EventKind::Dropped { pid });
        }
    }
}
