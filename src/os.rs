//! Simulation driver.
//!
//! One [`Machine`] holds everything the threads share: physical memory,
//! the ready queues and the event journal. [`Simulation::run`] spawns the
//! loader and one thread per core, all attached to a single
//! [`TickCoordinator`], and collects a [`SimReport`] when they finish.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use spin::Mutex;

use crate::constants::DEFAULT_MAX_TICKS;
use crate::cpu::VirtualCore;
use crate::error::SchedError;
use crate::memory::PhysicalMemory;
use crate::process::{Pid, Process};
use crate::sched::{Scheduler, Strategy};
use crate::timer::{TickCoordinator, TickHandle, TickStatus};
use crate::{kinfo, kwarn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Loaded { pid: Pid, priority: usize },
    Dispatched { core: usize, pid: Pid },
    Preempted { core: usize, pid: Pid },
    Finished { core: usize, pid: Pid },
    Dropped { pid: Pid },
    CoreStopped { core: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub tick: u64,
    pub kind: EventKind,
}

/// State shared by the loader and every core.
pub struct Machine {
    pub memory: PhysicalMemory,
    pub scheduler: Scheduler,
    journal: Mutex<Vec<Event>>,
    loader_done: AtomicBool,
}

impl Machine {
    pub fn new(strategy: Strategy) -> Arc<Self> {
        Self::with_scheduler(Scheduler::new(strategy))
    }

    pub fn with_scheduler(scheduler: Scheduler) -> Arc<Self> {
        Arc::new(Machine {
            memory: PhysicalMemory::new(),
            scheduler,
            journal: Mutex::new(Vec::new()),
            loader_done: AtomicBool::new(false),
        })
    }

    pub fn record(&self, tick: u64, kind: EventKind) {
        self.journal.lock().push(Event { tick, kind });
    }

    pub fn events(&self) -> Vec<Event> {
        self.journal.lock().clone()
    }

    /// No process will be added by the loader after this.
    pub fn set_loader_done(&self) {
        self.loader_done.store(true, Ordering::Release);
    }

    pub fn loader_done(&self) -> bool {
        self.loader_done.load(Ordering::Acquire)
    }
}

/// A process waiting for its start tick.
#[derive(Debug)]
pub struct Arrival {
    pub start_time: u64,
    /// Shown in the load message.
    pub name: String,
    pub process: Process,
}

#[derive(Debug, Clone, Copy)]
pub struct SimOptions {
    pub time_slot: u32,
    pub num_cpus: usize,
    pub strategy: Strategy,
    pub max_ticks: Option<u64>,
}

impl Default for SimOptions {
    fn default() -> Self {
        SimOptions {
            time_slot: 2,
            num_cpus: 1,
            strategy: Strategy::default(),
            max_ticks: Some(DEFAULT_MAX_TICKS),
        }
    }
}

#[derive(Debug)]
pub struct SimReport {
    pub ticks: u64,
    pub events: Vec<Event>,
    pub deadline_hit: bool,
    /// Frame dump taken after every thread has stopped.
    pub dump: String,
}

impl SimReport {
    pub fn finished(&self) -> Vec<Pid> {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Finished { pid, .. } => Some(pid),
                _ => None,
            })
            .collect()
    }

    pub fn dropped(&self) -> Vec<Pid> {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Dropped { pid } => Some(pid),
                _ => None,
            })
            .collect()
    }
}

pub struct Simulation {
    options: SimOptions,
    arrivals: Vec<Arrival>,
    machine: Arc<Machine>,
}

impl Simulation {
    pub fn new(options: SimOptions, mut arrivals: Vec<Arrival>) -> Self {
        arrivals.sort_by_key(|a| a.start_time);
        Simulation {
            options,
            arrivals,
            machine: Machine::new(options.strategy),
        }
    }

    pub fn run(self) -> SimReport {
        let Simulation {
            options,
            arrivals,
            machine,
        } = self;
        let clock = TickCoordinator::new(options.max_ticks);

        // Attach everyone before any thread starts so the first tick waits
        // for the full set. Seats: loader first, then cores by id.
        let loader_handle = clock.attach();
        let core_handles: Vec<TickHandle> = (0..options.num_cpus.max(1)).map(|_| clock.attach()).collect();

        thread::scope(|s| {
            let loader_machine = Arc::clone(&machine);
            s.spawn(move || loader_routine(loader_machine, arrivals, loader_handle));

            for (id, handle) in core_handles.into_iter().enumerate() {
                let core = VirtualCore::new(id, options.time_slot, Arc::clone(&machine));
                s.spawn(move || core.run(handle));
            }
        });

        SimReport {
            ticks: clock.current_time(),
            events: machine.events(),
            deadline_hit: clock.is_expired(),
            dump: machine.memory.dump(),
        }
    }
}

/// Admits each process at its start tick. The loader holds the first seat,
/// so a batch is queued before any core looks at the scheduler that tick.
fn loader_routine(machine: Arc<Machine>, arrivals: Vec<Arrival>, clock: TickHandle) {
    let mut pending = arrivals.into_iter().peekable();

    while pending.peek().is_some() {
        clock.wait_turn();
        let tick = clock.current_time();
        let mut due = Vec::new();
        while let Some(arrival) = pending.next_if(|a| a.start_time <= tick) {
            kinfo!(
                "\tLoaded a process at {}, PID: {} PRIO: {}",
                arrival.name,
                arrival.process.pid,
                arrival.process.priority
            );
            machine.record(
                tick,
                EventKind::Loaded {
                    pid: arrival.process.pid,
                    priority: arrival.process.priority,
                },
            );
            due.push(Box::new(arrival.process));
        }

        for SchedError::QueueOverflow { pid, level, .. } in machine.scheduler.add_batch(due) {
            kwarn!("\tLoader: ready queue {} full, dropping process {}", level, pid);
            machine.record(tick, EventKind::Dropped { pid });
        }

        if pending.peek().is_none() {
            break;
        }
        if let TickStatus::Expired(_) = clock.next_slot() {
            kwarn!("\tLoader: deadline reached before all processes arrived");
            break;
        }
    }
    machine.set_loader_done();
}
