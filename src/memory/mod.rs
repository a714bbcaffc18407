// Tue Jan 13 2026 - Alex

pub mod address;
pub mod binary;
pub mod error;
#[cfg(unix)]
pub mod process;
pub mod protection;
pub mod range;
pub mod region;
pub mod traits;

pub use address::Address;
pub use binary::BinaryMemory;
pub use error::MemoryError;
#[cfg(unix)]
pub use process::ProcessMemory;
pub use protection::Protection;
pub use range::MemoryRange;
pub use region::MemoryRegion;
pub use traits::{MemoryReader, MemoryView, MemoryWriter};
