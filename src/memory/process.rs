// Tue Jan 13 2026 - Alex

use crate::memory::{Address, MemoryError, MemoryRange, MemoryReader, MemoryWriter, Protection};
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Direct view of the calling process's own address space.
///
/// Every read and write is a raw pointer access at the given address. This is
/// the only place in the crate that dereferences addresses derived from image
/// metadata; everything above it works with `Address` values and bounds that
/// the parser has already checked against the image's own load commands.
pub struct ProcessMemory {
    page_size: usize,
}

impl ProcessMemory {
    /// # Safety
    ///
    /// Callers must only hand this view addresses inside images that stay
    /// mapped for the duration of each access. The rebinding engine satisfies
    /// this for images supplied by the platform loader.
    pub unsafe fn new() -> Self {
        let page_size = match libc::sysconf(libc::_SC_PAGESIZE) {
            size if size > 0 => size as usize,
            _ => 4096,
        };
        Self { page_size }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn check_null(addr: Address) -> Result<(), MemoryError> {
        if addr.is_null() {
            return Err(MemoryError::ReadFailed(0));
        }
        Ok(())
    }
}

impl MemoryReader for ProcessMemory {
    fn read_bytes(&self, addr: Address, len: usize) -> Result<Vec<u8>, MemoryError> {
        Self::check_null(addr)?;
        let mut buffer = vec![0u8; len];
        unsafe {
            ptr::copy_nonoverlapping(addr.as_ptr(), buffer.as_mut_ptr(), len);
        }
        Ok(buffer)
    }

    fn read_u8(&self, addr: Address) -> Result<u8, MemoryError> {
        Self::check_null(addr)?;
        Ok(unsafe { ptr::read(addr.as_ptr()) })
    }

    fn read_u16(&self, addr: Address) -> Result<u16, MemoryError> {
        Self::check_null(addr)?;
        Ok(unsafe { ptr::read_unaligned(addr.as_ptr() as *const u16) })
    }

    fn read_u32(&self, addr: Address) -> Result<u32, MemoryError> {
        Self::check_null(addr)?;
        Ok(unsafe { ptr::read_unaligned(addr.as_ptr() as *const u32) })
    }

    fn read_u64(&self, addr: Address) -> Result<u64, MemoryError> {
        Self::check_null(addr)?;
        Ok(unsafe { ptr::read_unaligned(addr.as_ptr() as *const u64) })
    }

    fn read_c_string(&self, addr: Address, max_len: usize) -> Result<String, MemoryError> {
        Self::check_null(addr)?;
        let start = addr.as_ptr();
        let mut len = 0;
        while len < max_len && unsafe { *start.add(len) } != 0 {
            len += 1;
        }
        let bytes = unsafe { std::slice::from_raw_parts(start, len) };
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

impl MemoryWriter for ProcessMemory {
    fn write_u32(&self, addr: Address, value: u32) -> Result<(), MemoryError> {
        if addr.is_null() {
            return Err(MemoryError::WriteFailed(0));
        }
        if !addr.is_aligned(4) {
            return Err(MemoryError::AlignmentError(addr.as_u64(), 4));
        }
        // Other threads may be calling through this slot right now.
        let slot = unsafe { &*(addr.as_mut_ptr() as *const AtomicU32) };
        slot.store(value, Ordering::SeqCst);
        Ok(())
    }

    fn write_u64(&self, addr: Address, value: u64) -> Result<(), MemoryError> {
        if addr.is_null() {
            return Err(MemoryError::WriteFailed(0));
        }
        if !addr.is_aligned(8) {
            return Err(MemoryError::AlignmentError(addr.as_u64(), 8));
        }
        let slot = unsafe { &*(addr.as_mut_ptr() as *const AtomicU64) };
        slot.store(value, Ordering::SeqCst);
        Ok(())
    }

    fn protect(&self, range: MemoryRange, protection: Protection) -> Result<(), MemoryError> {
        let pages = range.align(self.page_size);
        let result = unsafe {
            libc::mprotect(
                pages.start().as_mut_ptr() as *mut libc::c_void,
                pages.size() as libc::size_t,
                protection.to_prot(),
            )
        };
        if result == 0 {
            return Ok(());
        }
        let source = std::io::Error::last_os_error();

        // mprotect refuses copy-on-write pages such as a shared-cache
        // __DATA_CONST; Mach can still hand out a private writable copy.
        if fallback_protect(pages, protection) {
            return Ok(());
        }

        Err(MemoryError::ProtectFailed {
            address: pages.start().as_u64(),
            source,
        })
    }
}

#[cfg(target_os = "macos")]
fn fallback_protect(pages: MemoryRange, protection: Protection) -> bool {
    use mach2::kern_return::KERN_SUCCESS;
    use mach2::traps::mach_task_self;
    use mach2::vm::mach_vm_protect;

    let kr = unsafe {
        mach_vm_protect(
            mach_task_self(),
            pages.start().as_u64(),
            pages.size(),
            0,
            protection.to_vm_prot(),
        )
    };
    if kr != KERN_SUCCESS {
        log::debug!("mach_vm_protect {} {} failed: {}", pages, protection, kr);
    }
    kr == KERN_SUCCESS
}

#[cfg(not(target_os = "macos"))]
fn fallback_protect(_pages: MemoryRange, _protection: Protection) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use memmap2::MmapMut;

    #[test]
    fn test_reads_and_atomic_writes() {
        let mut map = MmapMut::map_anon(4096).unwrap();
        map[..8].copy_from_slice(&0x1122_3344_5566_7788u64.to_le_bytes());
        map[16..22].copy_from_slice(b"_puts\0");
        let base = Address::from_ptr(map.as_ptr());
        let memory = unsafe { ProcessMemory::new() };

        assert_eq!(memory.read_u64(base).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(memory.read_u32(base).unwrap(), 0x5566_7788);
        assert_eq!(memory.read_c_string(base + 16, 64).unwrap(), "_puts");
        assert_eq!(memory.read_c_string(base + 16, 3).unwrap(), "_pu");

        memory.write_u64(base + 8, 0xdead_beef).unwrap();
        assert_eq!(memory.read_u64(base + 8).unwrap(), 0xdead_beef);
        assert!(matches!(
            memory.write_u64(base + 4, 1),
            Err(MemoryError::AlignmentError(_, 8))
        ));
    }

    #[test]
    fn test_protect_round_trip() {
        let map = MmapMut::map_anon(8192).unwrap();
        let base = Address::from_ptr(map.as_ptr());
        let memory = unsafe { ProcessMemory::new() };
        let range = MemoryRange::from_start_size(base + 8, 16).unwrap();

        memory.protect(range, Protection::Read).unwrap();
        assert_eq!(memory.read_u64(base + 8).unwrap(), 0);
        memory.protect(range, Protection::ReadWrite).unwrap();
        memory.write_u64(base + 8, 7).unwrap();
        assert_eq!(memory.read_u64(base + 8).unwrap(), 7);
    }

    #[test]
    fn test_null_address_rejected() {
        let memory = unsafe { ProcessMemory::new() };
        assert!(memory.read_u32(Address::zero()).is_err());
        assert!(memory.write_u64(Address::zero(), 1).is_err());
    }
}
