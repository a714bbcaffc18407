// Wed Jan 15 2026 - Alex

use crate::memory::{Address, MemoryError, MemoryRange, Protection};

/// Read side of the raw memory view the image parser works through.
pub trait MemoryReader: Send + Sync {
    fn read_bytes(&self, addr: Address, len: usize) -> Result<Vec<u8>, MemoryError>;
    fn read_u8(&self, addr: Address) -> Result<u8, MemoryError>;
    fn read_u16(&self, addr: Address) -> Result<u16, MemoryError>;
    fn read_u32(&self, addr: Address) -> Result<u32, MemoryError>;
    fn read_u64(&self, addr: Address) -> Result<u64, MemoryError>;

    /// Reads a NUL-terminated string of at most `max_len` bytes. A string
    /// that runs into the limit is returned truncated.
    fn read_c_string(&self, addr: Address, max_len: usize) -> Result<String, MemoryError>;
}

/// Write side. Writes go through `&self` because the view is shared between
/// the submitting thread and loader callbacks.
pub trait MemoryWriter: Send + Sync {
    fn write_u32(&self, addr: Address, value: u32) -> Result<(), MemoryError>;
    fn write_u64(&self, addr: Address, value: u64) -> Result<(), MemoryError>;

    /// Changes the protection of every page covering `range`.
    fn protect(&self, range: MemoryRange, protection: Protection) -> Result<(), MemoryError>;
}

pub trait MemoryView: MemoryReader + MemoryWriter {}

impl<T: MemoryReader + MemoryWriter + ?Sized> MemoryView for T {}
