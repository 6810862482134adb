// Virtual and physical addresses share the same 20-bit budget:
// | first level (5) | second level (5) | offset (10) |
pub const ADDRESS_SIZE: u32 = 20;
pub const OFFSET_LEN: u32 = 10;
pub const FIRST_LV_LEN: u32 = 5;
pub const SECOND_LV_LEN: u32 = 5;

pub const PAGE_SIZE: u32 = 1 << OFFSET_LEN;
pub const NUM_PAGES: usize = 1 << (ADDRESS_SIZE - OFFSET_LEN);
pub const RAM_SIZE: u32 = 1 << ADDRESS_SIZE;

pub const FIRST_LV_ENTRIES: usize = 1 << FIRST_LV_LEN;
pub const SECOND_LV_ENTRIES: usize = 1 << SECOND_LV_LEN;

pub const OFFSET_MASK: u32 = (1 << OFFSET_LEN) - 1;
pub const SECOND_LV_MASK: u32 = (1 << SECOND_LV_LEN) - 1;
pub const FIRST_LV_MASK: u32 = (1 << FIRST_LV_LEN) - 1;

pub const SECOND_LV_SHIFT: u32 = OFFSET_LEN;
pub const FIRST_LV_SHIFT: u32 = OFFSET_LEN + SECOND_LV_LEN;

pub const NUM_REGISTERS: usize = 10;

/// Number of ready-queue levels. Level 0 is served first.
pub const MAX_PRIO: usize = 5;
/// Capacity of a single ready-queue level.
pub const MAX_QUEUE_SIZE: usize = 10;

/// Default bound on simulated ticks before a run is abandoned.
pub const DEFAULT_MAX_TICKS: u64 = 100_000;
