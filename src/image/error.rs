// Thu Jan 16 2026 - Alex

use crate::memory::MemoryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Unrecognised Mach-O magic {0:#010x}")]
    BadMagic(u32),
    #[error("Truncated {what} at offset {offset:#x}")]
    Truncated { what: &'static str, offset: u64 },
    #[error("Offset arithmetic overflow in {0}")]
    Overflow(&'static str),
    #[error("Image has no {0}")]
    MissingMetadata(&'static str),
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),
}
