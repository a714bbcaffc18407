// Thu Jan 16 2026 - Alex

pub mod commands;
pub mod constants;
pub mod error;
pub mod metadata;

pub use commands::{DylibCommand, DysymtabCommand, Nlist, SectionHeader, SegmentCommand, SymtabCommand};
pub use error::ImageError;
pub use metadata::{ImageMetadata, LinkTables, LinkedLibrary, PointerSection};

use crate::memory::{Address, MemoryError, MemoryReader, MemoryWriter};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One mapped executable or library: where its header sits and the slide the
/// loader applied to its link-time addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageHandle {
    header: Address,
    slide: i64,
    path: Option<String>,
}

impl ImageHandle {
    pub fn new(header: Address, slide: i64) -> Self {
        Self {
            header,
            slide,
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn header(&self) -> Address {
        self.header
    }

    pub fn slide(&self) -> i64 {
        self.slide
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Runtime address of a link-time virtual address in this image.
    pub fn runtime_address(&self, vmaddr: u64) -> Result<Address, ImageError> {
        vmaddr
            .checked_add_signed(self.slide)
            .map(Address::new)
            .ok_or(ImageError::Overflow("slid address"))
    }
}

impl fmt::Display for ImageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(f, "{} ({})", path, self.header),
            None => write!(f, "{}", self.header),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub fn bytes(self) -> u64 {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    pub fn read<M: MemoryReader + ?Sized>(self, memory: &M, addr: Address) -> Result<u64, MemoryError> {
        match self {
            Self::Bits32 => memory.read_u32(addr).map(u64::from),
            Self::Bits64 => memory.read_u64(addr),
        }
    }

    pub fn fits(self, value: u64) -> bool {
        match self {
            Self::Bits32 => u32::try_from(value).is_ok(),
            Self::Bits64 => true,
        }
    }

    /// Stores a pointer. Values wider than the image's pointers are refused.
    pub fn write<M: MemoryWriter + ?Sized>(self, memory: &M, addr: Address, value: u64) -> Result<(), MemoryError> {
        match self {
            Self::Bits32 => {
                let narrow = u32::try_from(value).map_err(|_| MemoryError::ValueTooWide { value, width: 4 })?;
                memory.write_u32(addr, narrow)
            }
            Self::Bits64 => memory.write_u64(addr, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BinaryMemory;
    use crate::utils::testing::{MachOBuilder, SectionKind};

    #[test]
    fn test_runtime_address_applies_slide() {
        let image = ImageHandle::new(Address::new(0x1_0000_0000), 0x1000);
        assert_eq!(image.runtime_address(0x4000).unwrap(), Address::new(0x5000));
        let image = ImageHandle::new(Address::new(0x1000), -0x800);
        assert_eq!(image.runtime_address(0x1000).unwrap(), Address::new(0x800));
        assert!(matches!(image.runtime_address(0x10), Err(ImageError::Overflow(_))));
        let image = ImageHandle::new(Address::new(0x1000), 0x10);
        assert!(image.runtime_address(u64::MAX - 4).is_err());
    }

    #[test]
    fn test_narrow_pointer_refuses_wide_value() {
        let built = MachOBuilder::new()
            .bits32()
            .import("_exit", 0)
            .section("__DATA", "__nl_symbol_ptr", SectionKind::NonLazy, &[(0, 0x1000)])
            .build_image();
        let memory = BinaryMemory::from_macho_bytes(&built.bytes, BinaryMemory::DEFAULT_BASE).unwrap();
        let slot = memory
            .image()
            .runtime_address(built.section_addr("__nl_symbol_ptr"))
            .unwrap();

        assert!(!PointerWidth::Bits32.fits(0x1_0000_0000));
        assert!(matches!(
            PointerWidth::Bits32.write(&memory, slot, 0x1_0000_0000),
            Err(MemoryError::ValueTooWide { width: 4, .. })
        ));
        assert_eq!(memory.read_u32(slot).unwrap(), 0x1000);
        PointerWidth::Bits32.write(&memory, slot, 0xffff_ffff).unwrap();
        assert_eq!(PointerWidth::Bits32.read(&memory, slot).unwrap(), 0xffff_ffff);
    }
}
