//! Per-process two-level page table.
//!
//! The first level always exists. Each of its slots owns an optional
//! second-level table, created when the first page in its range is mapped
//! and dropped as soon as its last page is unmapped. A second-level slot
//! holds the physical frame backing that virtual page.

use crate::constants::*;
use crate::translation::{TranslationResult, VirtualAddress, compose, physical_address};

/// Table indices for `va`, or `None` when it has bits above `ADDRESS_SIZE`.
fn split(va: u32) -> Option<VirtualAddress> {
    (va < RAM_SIZE).then(|| VirtualAddress::from_raw(va))
}

#[derive(Debug, Clone)]
pub struct SecondLevel {
    frames: [Option<usize>; SECOND_LV_ENTRIES],
    live: usize,
}

impl SecondLevel {
    fn new() -> Self {
        SecondLevel {
            frames: [None; SECOND_LV_ENTRIES],
            live: 0,
        }
    }

    /// Number of mapped pages in this table
    pub fn live(&self) -> usize {
        self.live
    }
}

#[derive(Debug, Clone)]
pub struct PageTable {
    first: [Option<Box<SecondLevel>>; FIRST_LV_ENTRIES],
}

impl PageTable {
    pub fn new() -> Self {
        PageTable {
            first: std::array::from_fn(|_| None),
        }
    }

    /// Map the page containing `va` to `frame`, creating the second-level
    /// table on demand. Returns the frame previously mapped there, if any.
    /// Addresses outside the address space are never mapped.
    pub fn map(&mut self, va: u32, frame: usize) -> Option<usize> {
        let va = split(va)?;
        let table = self.first[va.first as usize].get_or_insert_with(|| Box::new(SecondLevel::new()));

        let slot = &mut table.frames[va.second as usize];
        let previous = slot.replace(frame);
        if previous.is_none() {
            table.live += 1;
        }
        previous
    }

    /// Remove the mapping of the page containing `va`. The second-level
    /// table goes away with its last entry.
    pub fn unmap(&mut self, va: u32) -> Option<usize> {
        let va = split(va)?;
        let entry = &mut self.first[va.first as usize];
        let table = entry.as_mut()?;

        let frame = table.frames[va.second as usize].take()?;
        table.live -= 1;
        if table.live == 0 {
            *entry = None;
        }
        Some(frame)
    }

    /// Frame backing the page containing `va`.
    pub fn lookup(&self, va: u32) -> Option<usize> {
        self.translate(va).physical().map(|pa| (pa >> OFFSET_LEN) as usize)
    }

    pub fn translate(&self, va: u32) -> TranslationResult {
        let Some(va) = split(va) else {
            return TranslationResult::OutOfRange;
        };
        let Some(table) = self.first[va.first as usize].as_deref() else {
            return TranslationResult::NoSecondLevel;
        };
        match table.frames[va.second as usize] {
            Some(frame) => TranslationResult::Mapped(physical_address(frame, va.offset)),
            None => TranslationResult::NoPage,
        }
    }

    pub fn second_level(&self, first: usize) -> Option<&SecondLevel> {
        self.first.get(first)?.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.first.iter().all(Option::is_none)
    }

    /// Every (virtual page base, frame) pair currently mapped, in
    /// ascending virtual order.
    pub fn mapped_pages(&self) -> Vec<(u32, usize)> {
        let mut pages = Vec::new();
        for (i, table) in self.first.iter().enumerate() {
            let Some(table) = table else { continue };
            for (j, frame) in table.frames.iter().enumerate() {
                if let Some(frame) = frame {
                    let base = compose(i as u32, j as u32, 0);
                    pages.push((base, *frame));
                }
            }
        }
        pages
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}
