use std::fmt::Write as _;
use std::sync::atomic::{AtomicU8, Ordering};

use spin::Mutex;

use crate::constants::*;
use crate::error::{AllocFailure, MemError, MemResult};
use crate::process::{Pid, Process};
use crate::translation::{TranslationResult, VirtualAddress};

/// Bookkeeping for one physical frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStatus {
    /// Process holding the frame, `None` when free.
    pub owner: Option<Pid>,
    /// Position of the frame inside its allocation.
    pub index: u32,
    /// Next frame of the same allocation.
    pub next: Option<usize>,
}

/// Physical memory shared by every core: RAM plus the frame-status table.
///
/// Frame status only changes under `frames`. RAM bytes are individual
/// atomics so concurrent reads and writes from different cores never race.
pub struct PhysicalMemory {
    frames: Mutex<Vec<FrameStatus>>,
    ram: Box<[AtomicU8]>,
}

impl PhysicalMemory {
    /// Create a new physical memory with every frame free and RAM zeroed
    pub fn new() -> Self {
        let ram = (0..RAM_SIZE).map(|_| AtomicU8::new(0)).collect();
        PhysicalMemory {
            frames: Mutex::new(vec![FrameStatus::default(); NUM_PAGES]),
            ram,
        }
    }

    /// Allocate `size` bytes for `proc` and return the virtual address of
    /// the first byte.
    ///
    /// Frames are taken first-fit by increasing index and chained in that
    /// order. The process break pointer moves past the new region. Nothing
    /// is touched when the request cannot be satisfied.
    pub fn allocate(&self, size: u32, proc: &mut Process) -> MemResult<u32> {
        let fail = |reason| MemError::AllocationFailed {
            requested: size,
            reason,
        };
        if size == 0 {
            return Err(fail(AllocFailure::EmptyRequest));
        }

        let needed = size.div_ceil(PAGE_SIZE) as usize;
        let mut frames = self.frames.lock();

        let chosen: Vec<usize> = frames
            .iter()
            .enumerate()
            .filter(|(_, f)| f.owner.is_none())
            .map(|(i, _)| i)
            .take(needed)
            .collect();
        if chosen.len() < needed {
            let free = frames.iter().filter(|f| f.owner.is_none()).count();
            return Err(fail(AllocFailure::OutOfFrames { needed, free }));
        }

        let span = needed as u64 * PAGE_SIZE as u64;
        if proc.bp as u64 + span > RAM_SIZE as u64 {
            return Err(fail(AllocFailure::VirtualSpaceExhausted));
        }

        let base = proc.bp;
        for (index, &frame) in chosen.iter().enumerate() {
            frames[frame] = FrameStatus {
                owner: Some(proc.pid),
                index: index as u32,
                next: chosen.get(index + 1).copied(),
            };
            proc.page_table.map(base + index as u32 * PAGE_SIZE, frame);
        }
        proc.bp += span as u32;

        Ok(base)
    }

    /// Release the page containing `address` and every later page of the
    /// same allocation.
    ///
    /// Frames from the translated one to the end of its chain are marked
    /// free and their page-table entries removed. When `address` is not in
    /// the first page, the frame before it becomes the end of the chain.
    pub fn free(&self, address: u32, proc: &mut Process) -> MemResult<()> {
        let mut frames = self.frames.lock();

        let Some(start) = proc.page_table.lookup(address) else {
            return Err(MemError::InvalidAddress(address));
        };
        if frames[start].owner != Some(proc.pid) {
            return Err(MemError::InvalidAddress(address));
        }

        if frames[start].index > 0 {
            let pred = frames
                .iter()
                .position(|f| f.owner == Some(proc.pid) && f.next == Some(start));
            if let Some(pred) = pred {
                frames[pred].next = None;
            }
        }

        let mut page = VirtualAddress::from_raw(address).page_base();
        let mut cursor = Some(start);
        while let Some(frame) = cursor {
            let unmapped = proc.page_table.unmap(page);
            debug_assert_eq!(unmapped, Some(frame));

            cursor = frames[frame].next;
            frames[frame] = FrameStatus::default();
            page += PAGE_SIZE;
        }
        Ok(())
    }

    pub fn translate(&self, address: u32, proc: &Process) -> TranslationResult {
        proc.page_table.translate(address)
    }

    pub fn read_byte(&self, address: u32, proc: &Process) -> MemResult<u8> {
        let pa = self.physical(address, proc)?;
        Ok(self.ram[pa].load(Ordering::Relaxed))
    }

    pub fn write_byte(&self, address: u32, proc: &Process, value: u8) -> MemResult<()> {
        let pa = self.physical(address, proc)?;
        self.ram[pa].store(value, Ordering::Relaxed);
        Ok(())
    }

    #[inline]
    fn physical(&self, address: u32, proc: &Process) -> MemResult<usize> {
        self.translate(address, proc)
            .physical()
            .map(|pa| pa as usize)
            .ok_or(MemError::InvalidAddress(address))
    }

    pub fn frame_status(&self, frame: usize) -> Option<FrameStatus> {
        self.frames.lock().get(frame).copied()
    }

    pub fn free_frames(&self) -> usize {
        self.frames.lock().iter().filter(|f| f.owner.is_none()).count()
    }

    /// Frames currently held by `pid`, in index order.
    pub fn owned_frames(&self, pid: Pid) -> Vec<usize> {
        self.frames
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, f)| f.owner == Some(pid))
            .map(|(i, _)| i)
            .collect()
    }

    /// Occupied frames with owner, chain position and non-zero bytes.
    pub fn dump(&self) -> String {
        let frames = self.frames.lock().clone();
        let mut out = String::new();

        for (i, status) in frames.iter().enumerate() {
            let Some(owner) = status.owner else { continue };
            let start = i << OFFSET_LEN;
            let end = ((i + 1) << OFFSET_LEN) - 1;
            let next = status.next.map_or(-1, |n| n as i64);
            let _ = writeln!(
                out,
                "{:03}: {:05x}-{:05x} - PID: {:02} (idx {:03}, nxt: {:03})",
                i, start, end, owner.0, status.index, next
            );
            for pa in start..=end {
                let byte = self.ram[pa].load(Ordering::Relaxed);
                if byte != 0 {
                    let _ = writeln!(out, "\t{:05x}: {:02x}", pa, byte);
                }
            }
        }
        out
    }
}

impl Default for PhysicalMemory {
    fn default() -> Self {
        Self::new()
    }
}
