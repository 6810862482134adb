use crate::constants::*;

/// Byte offset inside the page.
#[inline]
pub fn offset_of(addr: u32) -> u32 {
    addr & OFFSET_MASK
}

/// Index into the first-level table (top 5 bits of a 20-bit address).
#[inline]
pub fn first_level_of(addr: u32) -> u32 {
    (addr >> FIRST_LV_SHIFT) & FIRST_LV_MASK
}

/// Index into the second-level table (middle 5 bits).
#[inline]
pub fn second_level_of(addr: u32) -> u32 {
    (addr >> SECOND_LV_SHIFT) & SECOND_LV_MASK
}

/// Inverse of the three splits above.
#[inline]
pub fn compose(first: u32, second: u32, offset: u32) -> u32 {
    (first << FIRST_LV_SHIFT) | (second << SECOND_LV_SHIFT) | offset
}

/// Physical address of `offset` inside `frame`.
#[inline]
pub fn physical_address(frame: usize, offset: u32) -> u32 {
    ((frame as u32) << OFFSET_LEN) | offset
}

/// Represents the decomposed components of a virtual address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub va: u32,
    pub first: u32,
    pub second: u32,
    pub offset: u32,
}

impl VirtualAddress {
    pub fn from_raw(va: u32) -> Self {
        VirtualAddress {
            va,
            first: first_level_of(va),
            second: second_level_of(va),
            offset: offset_of(va),
        }
    }

    /// Address of the first byte of the page holding `va`.
    #[inline]
    pub fn page_base(&self) -> u32 {
        self.va & !OFFSET_MASK
    }
}

impl std::fmt::Display for VirtualAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VA({:#07x}) = (l1={}, l2={}, off={})",
            self.va, self.first, self.second, self.offset
        )
    }
}

/// Result of walking a page table for one address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationResult {
    Mapped(u32),
    /// Address wider than `ADDRESS_SIZE` bits.
    OutOfRange,
    NoSecondLevel,
    NoPage,
}

impl TranslationResult {
    pub fn physical(&self) -> Option<u32> {
        match self {
            TranslationResult::Mapped(pa) => Some(*pa),
            _ => None,
        }
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, TranslationResult::Mapped(_))
    }
}
