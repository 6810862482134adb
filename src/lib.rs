#[macro_use]
pub mod log;

pub mod config;
pub mod constants;
pub mod cpu;
pub mod error;
pub mod loader;
pub mod memory;
pub mod os;
pub mod paging;
pub mod process;
pub mod sched;
pub mod timer;
pub mod translation;

// Re-export commonly used items for convenience
pub use constants::*;
pub use error::{ExecError, LoadError, MemError, SchedError};
pub use memory::PhysicalMemory;
pub use os::{SimOptions, SimReport, Simulation};
pub use process::{Instruction, Pid, PidAllocator, Process};
pub use sched::{Scheduler, Strategy};
pub use translation::{TranslationResult, VirtualAddress};
