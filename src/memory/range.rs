// Tue Jan 13 2026 - Alex

use crate::memory::{Address, MemoryError};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryRange {
    start: Address,
    end: Address,
}

impl MemoryRange {
    pub fn new(start: Address, end: Address) -> Result<Self, MemoryError> {
        if end < start {
            return Err(MemoryError::InvalidRange);
        }
        Ok(Self { start, end })
    }

    pub fn from_start_size(start: Address, size: u64) -> Result<Self, MemoryError> {
        let end = start.checked_add(size).ok_or(MemoryError::InvalidRange)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn end(&self) -> Address {
        self.end
    }

    pub fn size(&self) -> u64 {
        self.end.as_u64() - self.start.as_u64()
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.end
    }

    /// True when `[addr, addr + len)` lies entirely inside the range.
    pub fn contains_span(&self, addr: Address, len: u64) -> bool {
        match addr.checked_add(len) {
            Some(end) => addr >= self.start && end <= self.end,
            None => false,
        }
    }

    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && self.end > other.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn align(&self, alignment: usize) -> Self {
        Self {
            start: self.start.align_down(alignment),
            end: self.end.align_up(alignment),
        }
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}
