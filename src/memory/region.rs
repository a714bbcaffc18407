// Tue Jan 13 2026 - Alex

use crate::memory::{Address, MemoryRange, Protection};
use std::fmt;

#[derive(Debug, Clone)]
pub struct MemoryRegion {
    range: MemoryRange,
    protection: Protection,
    name: String,
}

impl MemoryRegion {
    pub fn new(range: MemoryRange, protection: Protection, name: String) -> Self {
        Self {
            range,
            protection,
            name,
        }
    }

    pub fn range(&self) -> &MemoryRange {
        &self.range
    }

    pub fn protection(&self) -> Protection {
        self.protection
    }

    pub fn set_protection(&mut self, protection: Protection) {
        self.protection = protection;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(&self) -> Address {
        self.range.start()
    }

    pub fn end(&self) -> Address {
        self.range.end()
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.range.contains(addr)
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.range, self.protection, self.name)
    }
}
