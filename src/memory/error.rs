// Tue Jan 13 2026 - Alex

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Read failed at address {0:#x}")]
    ReadFailed(u64),
    #[error("Write failed at address {0:#x}")]
    WriteFailed(u64),
    #[error("Binary parse error: {0}")]
    BinaryParseError(String),
    #[error("Invalid memory range")]
    InvalidRange,
    #[error("Out of bounds: address {0:#x} not in range")]
    OutOfBounds(u64),
    #[error("Alignment error: address {0:#x} not aligned to {1}")]
    AlignmentError(u64, usize),
    #[error("Protection change failed at {address:#x}: {source}")]
    ProtectFailed {
        address: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("Value {value:#x} does not fit in {width} bytes")]
    ValueTooWide { value: u64, width: u64 },
}
