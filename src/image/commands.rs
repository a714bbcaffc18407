// Thu Jan 16 2026 - Alex

//! Typed read-only views over Mach-O load commands as they sit in memory.
//!
//! Each view is decoded field by field through a `MemoryReader`, and every
//! view checks that it fits inside the `cmdsize` its load command declares
//! before anything is read past the common `cmd`/`cmdsize` prefix.

use crate::image::constants::*;
use crate::image::{ImageError, PointerWidth};
use crate::memory::{Address, MemoryReader};

fn fixed_name<M: MemoryReader + ?Sized>(memory: &M, addr: Address) -> Result<String, ImageError> {
    let raw = memory.read_bytes(addr, 16)?;
    let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Ok(String::from_utf8_lossy(&raw[..len]).into_owned())
}

fn read_word<M: MemoryReader + ?Sized>(memory: &M, addr: Address, width: PointerWidth) -> Result<u64, ImageError> {
    Ok(width.read(memory, addr)?)
}

fn require_size(raw: &RawLoadCommand, needed: u64, what: &'static str) -> Result<(), ImageError> {
    if u64::from(raw.cmdsize) < needed {
        return Err(ImageError::Truncated {
            what,
            offset: raw.offset,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawLoadCommand {
    pub cmd: u32,
    pub cmdsize: u32,
    pub address: Address,
    /// Offset from the start of the load command area.
    pub offset: u64,
}

/// Walks `ncmds` load commands, refusing any command that is smaller than
/// its own header or that runs past `sizeofcmds`.
pub struct LoadCommands<'a, M: MemoryReader + ?Sized> {
    memory: &'a M,
    start: Address,
    size: u64,
    remaining: u32,
    offset: u64,
    failed: bool,
}

impl<'a, M: MemoryReader + ?Sized> LoadCommands<'a, M> {
    pub fn new(memory: &'a M, start: Address, ncmds: u32, sizeofcmds: u32) -> Self {
        Self {
            memory,
            start,
            size: u64::from(sizeofcmds),
            remaining: ncmds,
            offset: 0,
            failed: false,
        }
    }

    fn next_command(&mut self) -> Result<RawLoadCommand, ImageError> {
        if self.offset + LOAD_COMMAND_SIZE > self.size {
            return Err(ImageError::Truncated {
                what: "load command header",
                offset: self.offset,
            });
        }
        let address = self
            .start
            .checked_add(self.offset)
            .ok_or(ImageError::Overflow("load command address"))?;
        let cmd = self.memory.read_u32(address)?;
        let cmdsize = self.memory.read_u32(address + 4)?;
        let end = self.offset + u64::from(cmdsize);
        if u64::from(cmdsize) < LOAD_COMMAND_SIZE || end > self.size {
            return Err(ImageError::Truncated {
                what: "load command",
                offset: self.offset,
            });
        }
        let raw = RawLoadCommand {
            cmd,
            cmdsize,
            address,
            offset: self.offset,
        };
        self.offset = end;
        Ok(raw)
    }
}

impl<M: MemoryReader + ?Sized> Iterator for LoadCommands<'_, M> {
    type Item = Result<RawLoadCommand, ImageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.failed {
            return None;
        }
        self.remaining -= 1;
        let result = self.next_command();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCommand {
    pub segname: String,
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
    address: Address,
    width: PointerWidth,
}

impl SegmentCommand {
    pub fn command_size(width: PointerWidth) -> u64 {
        match width {
            PointerWidth::Bits32 => SEGMENT_COMMAND_SIZE,
            PointerWidth::Bits64 => SEGMENT_COMMAND_64_SIZE,
        }
    }

    pub fn read<M: MemoryReader + ?Sized>(memory: &M, raw: &RawLoadCommand, width: PointerWidth) -> Result<Self, ImageError> {
        let header_size = Self::command_size(width);
        require_size(raw, header_size, "segment command")?;

        let base = raw.address;
        let segname = fixed_name(memory, base + 8)?;
        let (vmaddr, vmsize, fileoff, filesize, tail) = match width {
            PointerWidth::Bits32 => (
                u64::from(memory.read_u32(base + 24)?),
                u64::from(memory.read_u32(base + 28)?),
                u64::from(memory.read_u32(base + 32)?),
                u64::from(memory.read_u32(base + 36)?),
                base + 40,
            ),
            PointerWidth::Bits64 => (
                memory.read_u64(base + 24)?,
                memory.read_u64(base + 32)?,
                memory.read_u64(base + 40)?,
                memory.read_u64(base + 48)?,
                base + 56,
            ),
        };
        let maxprot = memory.read_u32(tail)?;
        let initprot = memory.read_u32(tail + 4)?;
        let nsects = memory.read_u32(tail + 8)?;
        let flags = memory.read_u32(tail + 12)?;

        let sections_size = u64::from(nsects)
            .checked_mul(SectionHeader::header_size(width))
            .and_then(|size| size.checked_add(header_size))
            .ok_or(ImageError::Overflow("segment sections"))?;
        require_size(raw, sections_size, "segment sections")?;

        Ok(Self {
            segname,
            vmaddr,
            vmsize,
            fileoff,
            filesize,
            maxprot,
            initprot,
            nsects,
            flags,
            address: base,
            width,
        })
    }

    pub fn section<M: MemoryReader + ?Sized>(&self, memory: &M, index: u32) -> Result<SectionHeader, ImageError> {
        let addr = self.address
            + Self::command_size(self.width)
            + u64::from(index) * SectionHeader::header_size(self.width);
        SectionHeader::read(memory, addr, self.width)
    }

    pub fn sections<'m, M: MemoryReader + ?Sized>(
        &'m self,
        memory: &'m M,
    ) -> impl Iterator<Item = Result<SectionHeader, ImageError>> + 'm {
        (0..self.nsects).map(move |index| self.section(memory, index))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    pub sectname: String,
    pub segname: String,
    pub addr: u64,
    pub size: u64,
    pub flags: u32,
    /// Index of the section's first entry in the indirect symbol table.
    pub reserved1: u32,
    pub reserved2: u32,
}

impl SectionHeader {
    pub fn header_size(width: PointerWidth) -> u64 {
        match width {
            PointerWidth::Bits32 => SECTION_SIZE,
            PointerWidth::Bits64 => SECTION_64_SIZE,
        }
    }

    pub fn read<M: MemoryReader + ?Sized>(memory: &M, base: Address, width: PointerWidth) -> Result<Self, ImageError> {
        let sectname = fixed_name(memory, base)?;
        let segname = fixed_name(memory, base + 16)?;
        let addr = read_word(memory, base + 32, width)?;
        let size = read_word(memory, base + 32 + width.bytes(), width)?;
        // offset, align, reloff, nreloc precede flags
        let flags_at = base + 32 + 2 * width.bytes() + 16;
        let flags = memory.read_u32(flags_at)?;
        let reserved1 = memory.read_u32(flags_at + 4)?;
        let reserved2 = memory.read_u32(flags_at + 8)?;
        Ok(Self {
            sectname,
            segname,
            addr,
            size,
            flags,
            reserved1,
            reserved2,
        })
    }

    pub fn section_type(&self) -> u32 {
        self.flags & SECTION_TYPE
    }

    pub fn holds_symbol_pointers(&self) -> bool {
        matches!(self.section_type(), S_LAZY_SYMBOL_POINTERS | S_NON_LAZY_SYMBOL_POINTERS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymtabCommand {
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

impl SymtabCommand {
    pub fn read<M: MemoryReader + ?Sized>(memory: &M, raw: &RawLoadCommand) -> Result<Self, ImageError> {
        require_size(raw, SYMTAB_COMMAND_SIZE, "symtab command")?;
        let base = raw.address;
        Ok(Self {
            symoff: memory.read_u32(base + 8)?,
            nsyms: memory.read_u32(base + 12)?,
            stroff: memory.read_u32(base + 16)?,
            strsize: memory.read_u32(base + 20)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DysymtabCommand {
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
}

impl DysymtabCommand {
    pub fn read<M: MemoryReader + ?Sized>(memory: &M, raw: &RawLoadCommand) -> Result<Self, ImageError> {
        require_size(raw, DYSYMTAB_COMMAND_SIZE, "dysymtab command")?;
        let base = raw.address;
        Ok(Self {
            indirectsymoff: memory.read_u32(base + 56)?,
            nindirectsyms: memory.read_u32(base + 60)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DylibCommand {
    pub name: String,
}

impl DylibCommand {
    pub fn read<M: MemoryReader + ?Sized>(memory: &M, raw: &RawLoadCommand) -> Result<Self, ImageError> {
        require_size(raw, DYLIB_COMMAND_SIZE, "dylib command")?;
        let name_offset = memory.read_u32(raw.address + 8)?;
        if u64::from(name_offset) < DYLIB_COMMAND_SIZE || name_offset >= raw.cmdsize {
            return Err(ImageError::Truncated {
                what: "dylib name",
                offset: raw.offset,
            });
        }
        let max_len = (raw.cmdsize - name_offset) as usize;
        let name = memory.read_c_string(raw.address + u64::from(name_offset), max_len)?;
        Ok(Self { name })
    }
}

/// The fields of an `nlist`/`nlist_64` entry the rebinder needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nlist {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
}

impl Nlist {
    pub fn entry_size(width: PointerWidth) -> u64 {
        match width {
            PointerWidth::Bits32 => NLIST_SIZE,
            PointerWidth::Bits64 => NLIST_64_SIZE,
        }
    }

    pub fn read<M: MemoryReader + ?Sized>(memory: &M, addr: Address) -> Result<Self, ImageError> {
        Ok(Self {
            n_strx: memory.read_u32(addr)?,
            n_type: memory.read_u8(addr + 4)?,
            n_sect: memory.read_u8(addr + 5)?,
            n_desc: memory.read_u16(addr + 6)?,
        })
    }

    pub fn library_ordinal(&self) -> u8 {
        get_library_ordinal(self.n_desc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BinaryMemory, MemoryRange, MemoryWriter, Protection};
    use crate::utils::testing::{MachOBuilder, SectionKind};

    struct Sample {
        memory: BinaryMemory,
        start: Address,
        ncmds: u32,
        sizeofcmds: u32,
    }

    impl Sample {
        fn new() -> Self {
            let bytes = MachOBuilder::new()
                .dylib("/usr/lib/libSystem.B.dylib")
                .import("_puts", 1)
                .section("__DATA", "__la_symbol_ptr", SectionKind::Lazy, &[(0, 0x4242)])
                .build();
            let memory = BinaryMemory::from_macho_bytes(&bytes, BinaryMemory::DEFAULT_BASE).unwrap();
            let header = memory.image().header();
            let ncmds = memory.read_u32(header + 16).unwrap();
            let sizeofcmds = memory.read_u32(header + 20).unwrap();
            Self {
                memory,
                start: header + MACH_HEADER_64_SIZE,
                ncmds,
                sizeofcmds,
            }
        }

        fn walk(&self, sizeofcmds: u32) -> Vec<Result<RawLoadCommand, ImageError>> {
            LoadCommands::new(&self.memory, self.start, self.ncmds, sizeofcmds).collect()
        }
    }

    #[test]
    fn test_walks_every_command() {
        let sample = Sample::new();
        let commands = sample.walk(sample.sizeofcmds);
        assert_eq!(commands.len(), sample.ncmds as usize);
        assert!(commands.iter().all(Result::is_ok));
    }

    #[test]
    fn test_command_past_sizeofcmds_is_truncated() {
        let sample = Sample::new();
        let commands = sample.walk(sample.sizeofcmds - 8);
        let (last, rest) = commands.split_last().unwrap();
        assert!(rest.iter().all(Result::is_ok));
        assert!(matches!(last, Err(ImageError::Truncated { what: "load command", .. })));
    }

    #[test]
    fn test_area_too_small_for_any_header() {
        let sample = Sample::new();
        let commands = sample.walk(4);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0],
            Err(ImageError::Truncated { what: "load command header", offset: 0 })
        ));
    }

    #[test]
    fn test_undersized_cmdsize_stops_the_walk() {
        let sample = Sample::new();
        let prefix = MemoryRange::from_start_size(sample.start, 8).unwrap();
        sample.memory.protect(prefix, Protection::ReadWrite).unwrap();
        sample.memory.write_u32(sample.start + 4, 4).unwrap();

        let commands = sample.walk(sample.sizeofcmds);
        assert_eq!(commands.len(), 1);
        assert!(matches!(
            commands[0],
            Err(ImageError::Truncated { what: "load command", offset: 0 })
        ));
    }
}
