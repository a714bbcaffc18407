// Tue Jan 13 2026 - Alex

use crate::image::ImageHandle;
use crate::memory::{
    Address, MemoryError, MemoryRange, MemoryReader, MemoryRegion, MemoryWriter, Protection,
};
use goblin::mach::{Mach, MachO};
use memmap2::Mmap;
use parking_lot::RwLock;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Largest virtual span a file image may be laid out into.
const MAX_IMAGE_SPAN: u64 = 1 << 30;

/// A Mach-O file laid out in a private buffer the way the loader would map
/// it: every segment copied to its virtual address relative to a chosen base.
///
/// Writes are checked against each segment's protection, so a rebinding pass
/// over a buffer behaves like one over live memory, including the need to
/// lift protection on read-only data segments. The source file is only ever
/// read.
pub struct BinaryMemory {
    data: RwLock<Vec<u8>>,
    base_address: Address,
    regions: RwLock<Vec<MemoryRegion>>,
    header_address: Address,
    slide: i64,
    path: Option<PathBuf>,
}

impl BinaryMemory {
    pub const DEFAULT_BASE: Address = Address::new(0x1_0000_0000);

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MemoryError> {
        Self::load_at(path, Self::DEFAULT_BASE)
    }

    pub fn load_at<P: AsRef<Path>>(path: P, base_address: Address) -> Result<Self, MemoryError> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(path.as_ref()).map_err(MemoryError::Io)?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(MemoryError::Io)?;
        let mut memory = Self::from_macho_bytes(&mmap, base_address)?;
        memory.path = Some(path_buf);
        Ok(memory)
    }

    pub fn from_macho_bytes(bytes: &[u8], base_address: Address) -> Result<Self, MemoryError> {
        let macho = Self::parse_macho(bytes)?;

        let mapped: Vec<_> = macho
            .segments
            .iter()
            .filter(|segment| segment.vmsize > 0 && !(segment.initprot == 0 && segment.filesize == 0))
            .collect();
        if mapped.is_empty() {
            return Err(MemoryError::BinaryParseError("no mapped segments".to_string()));
        }

        let min_vmaddr = mapped.iter().map(|s| s.vmaddr).min().unwrap_or(0);
        let mut max_end = 0u64;
        for segment in &mapped {
            let end = segment.vmaddr.checked_add(segment.vmsize).ok_or_else(|| {
                MemoryError::BinaryParseError("segment end overflows".to_string())
            })?;
            max_end = max_end.max(end);
        }
        let span = max_end - min_vmaddr;
        if span > MAX_IMAGE_SPAN {
            return Err(MemoryError::BinaryParseError(format!(
                "image spans {:#x} bytes, more than {:#x}",
                span, MAX_IMAGE_SPAN
            )));
        }

        let mut data = vec![0u8; span as usize];
        let mut regions = Vec::with_capacity(mapped.len());
        let mut header_vmaddr = None;

        for segment in &mapped {
            let segname = std::str::from_utf8(&segment.segname)
                .unwrap_or("")
                .trim_end_matches('\0');
            let start = (segment.vmaddr - min_vmaddr) as usize;
            let copy_len = segment.filesize.min(segment.vmsize) as usize;
            let fileoff = segment.fileoff as usize;
            let source = fileoff
                .checked_add(copy_len)
                .and_then(|end| bytes.get(fileoff..end))
                .ok_or_else(|| {
                    MemoryError::BinaryParseError(format!("segment {} exceeds file", segname))
                })?;
            data[start..start + copy_len].copy_from_slice(source);

            if segment.fileoff == 0 && segment.filesize > 0 {
                header_vmaddr = Some(segment.vmaddr);
            }

            let start_address = base_address
                .checked_add(segment.vmaddr - min_vmaddr)
                .ok_or(MemoryError::InvalidRange)?;
            let range = MemoryRange::from_start_size(start_address, segment.vmsize)?;
            regions.push(MemoryRegion::new(
                range,
                Protection::from_flags(segment.initprot),
                segname.to_string(),
            ));
        }

        let header_vmaddr = header_vmaddr.ok_or_else(|| {
            MemoryError::BinaryParseError("no segment maps the Mach-O header".to_string())
        })?;
        let header_address = base_address
            .checked_add(header_vmaddr - min_vmaddr)
            .ok_or(MemoryError::InvalidRange)?;
        let slide = header_address.distance(Address::new(header_vmaddr));

        Ok(Self {
            data: RwLock::new(data),
            base_address,
            regions: RwLock::new(regions),
            header_address,
            slide,
            path: None,
        })
    }

    fn parse_macho(bytes: &[u8]) -> Result<MachO<'_>, MemoryError> {
        let mach = Mach::parse(bytes)
            .map_err(|e| MemoryError::BinaryParseError(format!("Failed to parse Mach-O: {}", e)))?;

        match mach {
            Mach::Binary(m) => Ok(m),
            Mach::Fat(_) => Err(MemoryError::BinaryParseError(
                "Fat binaries not supported".to_string(),
            )),
        }
    }

    /// Handle describing where the header landed and the slide applied.
    pub fn image(&self) -> ImageHandle {
        let handle = ImageHandle::new(self.header_address, self.slide);
        match &self.path {
            Some(path) => handle.with_path(path.display().to_string()),
            None => handle,
        }
    }

    pub fn base_address(&self) -> Address {
        self.base_address
    }

    pub fn size(&self) -> usize {
        self.data.read().len()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn regions(&self) -> Vec<MemoryRegion> {
        self.regions.read().clone()
    }

    pub fn protection_at(&self, addr: Address) -> Option<Protection> {
        self.regions
            .read()
            .iter()
            .find(|region| region.contains(addr))
            .map(|region| region.protection())
    }

    fn offset(&self, addr: Address, len: usize) -> Result<usize, MemoryError> {
        let size = self.data.read().len() as u64;
        let offset = addr
            .as_u64()
            .checked_sub(self.base_address.as_u64())
            .ok_or(MemoryError::OutOfBounds(addr.as_u64()))?;
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => Ok(offset as usize),
            _ => Err(MemoryError::OutOfBounds(addr.as_u64())),
        }
    }

    fn read_array<const N: usize>(&self, addr: Address) -> Result<[u8; N], MemoryError> {
        let offset = self.offset(addr, N)?;
        let data = self.data.read();
        let mut out = [0u8; N];
        out.copy_from_slice(&data[offset..offset + N]);
        Ok(out)
    }

    fn write_slice(&self, addr: Address, bytes: &[u8]) -> Result<(), MemoryError> {
        let offset = self.offset(addr, bytes.len())?;
        match self.protection_at(addr) {
            Some(protection) if protection.can_write() => {}
            Some(protection) => {
                return Err(MemoryError::PermissionDenied(format!(
                    "{} is mapped {}",
                    addr, protection
                )))
            }
            None => return Err(MemoryError::WriteFailed(addr.as_u64())),
        }
        self.data.write()[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

impl MemoryReader for BinaryMemory {
    fn read_bytes(&self, addr: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        let offset = self.offset(addr, len)?;
        Ok(self.data.read()[offset..offset + len].to_vec())
    }

    fn read_u8(&self, addr: Address) -> Result<u8, MemoryError> {
        Ok(self.read_array::<1>(addr)?[0])
    }

    fn read_u16(&self, addr: Address) -> Result<u16, MemoryError> {
        Ok(u16::from_le_bytes(self.read_array(addr)?))
    }

    fn read_u32(&self, addr: Address) -> Result<u32, MemoryError> {
        Ok(u32::from_le_bytes(self.read_array(addr)?))
    }

    fn read_u64(&self, addr: Address) -> Result<u64, MemoryError> {
        Ok(u64::from_le_bytes(self.read_array(addr)?))
    }

    fn read_c_string(&self, addr: Address, max_len: usize) -> Result<String, MemoryError> {
        let offset = self.offset(addr, 0)?;
        let data = self.data.read();
        let end = offset.saturating_add(max_len).min(data.len());
        let slice = &data[offset..end];
        let len = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
        Ok(String::from_utf8_lossy(&slice[..len]).into_owned())
    }
}

impl MemoryWriter for BinaryMemory {
    fn write_u32(&self, addr: Address, value: u32) -> Result<(), MemoryError> {
        self.write_slice(addr, &value.to_le_bytes())
    }

    fn write_u64(&self, addr: Address, value: u64) -> Result<(), MemoryError> {
        self.write_slice(addr, &value.to_le_bytes())
    }

    fn protect(&self, range: MemoryRange, protection: Protection) -> Result<(), MemoryError> {
        let mut regions = self.regions.write();
        let mut touched = false;
        for region in regions.iter_mut().filter(|r| r.range().overlaps(&range)) {
            region.set_protection(protection);
            touched = true;
        }
        if !touched {
            return Err(MemoryError::OutOfBounds(range.start().as_u64()));
        }
        Ok(())
    }
}
