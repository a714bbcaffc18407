// Thu Jan 16 2026 - Alex

use crate::config::EngineConfig;
use crate::image::commands::{DylibCommand, DysymtabCommand, LoadCommands, Nlist, SegmentCommand, SymtabCommand};
use crate::image::constants::*;
use crate::image::{ImageError, ImageHandle, PointerWidth};
use crate::memory::{Address, MemoryReader, MemoryRange, Protection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedLibrary {
    pub ordinal: u32,
    pub name: String,
}

/// A lazy or non-lazy symbol pointer section, plus what the rewriter needs
/// to know about the segment holding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerSection {
    pub segname: String,
    pub sectname: String,
    pub addr: u64,
    pub size: u64,
    pub reserved1: u32,
    pub segment_protection: Protection,
}

impl PointerSection {
    pub fn qualified_name(&self) -> String {
        format!("{},{}", self.segname, self.sectname)
    }

    pub fn slot_count(&self, width: PointerWidth) -> u64 {
        self.size / width.bytes()
    }

    pub fn runtime_range(&self, image: &ImageHandle) -> Result<MemoryRange, ImageError> {
        MemoryRange::from_start_size(image.runtime_address(self.addr)?, self.size)
            .map_err(|_| ImageError::Overflow("section address range"))
    }

    /// Runtime address of slot `index`.
    pub fn slot_address(&self, image: &ImageHandle, width: PointerWidth, index: u64) -> Result<Address, ImageError> {
        index
            .checked_mul(width.bytes())
            .and_then(|offset| image.runtime_address(self.addr).ok()?.checked_add(offset))
            .ok_or(ImageError::Overflow("symbol pointer slot"))
    }
}

/// Address of entry `index` in a table of `entry`-byte records at `base`.
fn table_entry(base: Address, index: u32, entry: u64, what: &'static str) -> Result<Address, ImageError> {
    u64::from(index)
        .checked_mul(entry)
        .and_then(|offset| base.checked_add(offset))
        .ok_or(ImageError::Overflow(what))
}

/// Everything the rebinding pass extracts from one image's load commands.
#[derive(Debug, Clone)]
pub struct ImageMetadata {
    pub width: PointerWidth,
    pub two_level: bool,
    /// Linked libraries in ordinal order. Empty for flat-namespace images.
    pub libraries: Vec<LinkedLibrary>,
    pub symtab: Option<SymtabCommand>,
    pub dysymtab: Option<DysymtabCommand>,
    pub linkedit: Option<SegmentCommand>,
    pub pointer_sections: Vec<PointerSection>,
}

/// Runtime locations of the symbol, string and indirect symbol tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkTables {
    pub width: PointerWidth,
    pub symtab: Address,
    pub nsyms: u32,
    pub strtab: Address,
    pub strsize: u32,
    pub indirect: Address,
    pub nindirect: u32,
}

impl LinkTables {
    pub fn indirect_entry<M: MemoryReader + ?Sized>(&self, memory: &M, index: u32) -> Result<Option<u32>, ImageError> {
        if index >= self.nindirect {
            return Ok(None);
        }
        let addr = table_entry(self.indirect, index, 4, "indirect symbol table")?;
        Ok(Some(memory.read_u32(addr)?))
    }

    /// Every slot of `section` must have an indirect table entry and the
    /// section must sit at a representable address. Returns its runtime range.
    pub fn check_section(&self, image: &ImageHandle, section: &PointerSection) -> Result<MemoryRange, ImageError> {
        let end = u64::from(section.reserved1) + section.slot_count(self.width);
        if end > u64::from(self.nindirect) {
            return Err(ImageError::Truncated {
                what: "indirect symbols for section",
                offset: u64::from(section.reserved1),
            });
        }
        section.runtime_range(image)
    }

    pub fn symbol<M: MemoryReader + ?Sized>(&self, memory: &M, index: u32) -> Result<Option<Nlist>, ImageError> {
        if index >= self.nsyms {
            return Ok(None);
        }
        let addr = table_entry(self.symtab, index, Nlist::entry_size(self.width), "symbol table")?;
        Ok(Some(Nlist::read(memory, addr)?))
    }

    pub fn symbol_name<M: MemoryReader + ?Sized>(&self, memory: &M, strx: u32) -> Result<Option<String>, ImageError> {
        if strx >= self.strsize {
            return Ok(None);
        }
        let max_len = (self.strsize - strx) as usize;
        let addr = table_entry(self.strtab, strx, 1, "string table")?;
        Ok(Some(memory.read_c_string(addr, max_len)?))
    }
}

impl ImageMetadata {
    pub fn parse<M: MemoryReader + ?Sized>(
        memory: &M,
        image: &ImageHandle,
        config: &EngineConfig,
    ) -> Result<Self, ImageError> {
        let header = image.header();
        let magic = memory.read_u32(header)?;
        let (width, header_size, segment_cmd) = match magic {
            MH_MAGIC_64 => (PointerWidth::Bits64, MACH_HEADER_64_SIZE, LC_SEGMENT_64),
            MH_MAGIC => (PointerWidth::Bits32, MACH_HEADER_SIZE, LC_SEGMENT),
            other => return Err(ImageError::BadMagic(other)),
        };
        let commands = header
            .checked_add(header_size)
            .ok_or(ImageError::Overflow("mach header"))?;
        let ncmds = memory.read_u32(header + 16)?;
        let sizeofcmds = memory.read_u32(header + 20)?;
        let flags = memory.read_u32(header + 24)?;
        let two_level = flags & MH_TWOLEVEL != 0;
        // Every command address below stays inside this span.
        commands
            .checked_add(u64::from(sizeofcmds))
            .ok_or(ImageError::Overflow("load commands"))?;

        let mut metadata = Self {
            width,
            two_level,
            libraries: Vec::new(),
            symtab: None,
            dysymtab: None,
            linkedit: None,
            pointer_sections: Vec::new(),
        };
        let mut next_ordinal = 1u32;

        for raw in LoadCommands::new(memory, commands, ncmds, sizeofcmds) {
            let raw = raw?;
            match raw.cmd {
                cmd if is_dylib_command(cmd) => {
                    // Ordinals only mean something under two-level namespaces.
                    if !two_level {
                        continue;
                    }
                    let dylib = DylibCommand::read(memory, &raw)?;
                    metadata.libraries.push(LinkedLibrary {
                        ordinal: next_ordinal,
                        name: dylib.name,
                    });
                    next_ordinal += 1;
                }
                cmd if cmd == segment_cmd => {
                    let segment = SegmentCommand::read(memory, &raw, width)?;
                    if segment.segname == config.linkedit_segment {
                        metadata.linkedit = Some(segment);
                    } else if config.data_segments.iter().any(|name| name == &segment.segname) {
                        metadata.collect_pointer_sections(memory, &segment)?;
                    }
                }
                LC_SYMTAB => metadata.symtab = Some(SymtabCommand::read(memory, &raw)?),
                LC_DYSYMTAB => metadata.dysymtab = Some(DysymtabCommand::read(memory, &raw)?),
                _ => {}
            }
        }

        Ok(metadata)
    }

    fn collect_pointer_sections<M: MemoryReader + ?Sized>(
        &mut self,
        memory: &M,
        segment: &SegmentCommand,
    ) -> Result<(), ImageError> {
        // __DATA_CONST is mapped writable but locked down after fixups.
        let mut protection = Protection::from_flags(segment.initprot);
        if segment.flags & SG_READ_ONLY != 0 || segment.segname == SEG_DATA_CONST {
            protection = protection.without_write();
        }
        for section in segment.sections(memory) {
            let section = section?;
            if !section.holds_symbol_pointers() {
                continue;
            }
            self.pointer_sections.push(PointerSection {
                segname: segment.segname.clone(),
                sectname: section.sectname,
                addr: section.addr,
                size: section.size,
                reserved1: section.reserved1,
                segment_protection: protection,
            });
        }
        Ok(())
    }

    pub fn library(&self, ordinal: u32) -> Option<&LinkedLibrary> {
        self.libraries.iter().find(|lib| lib.ordinal == ordinal)
    }

    /// Locates the link-edit tables in memory. Images without a symbol
    /// table, dynamic symbol table, link-edit segment or any indirect symbols
    /// cannot be rebound.
    pub fn link_tables(&self, image: &ImageHandle) -> Result<LinkTables, ImageError> {
        let symtab = self.symtab.ok_or(ImageError::MissingMetadata("LC_SYMTAB"))?;
        let dysymtab = self.dysymtab.ok_or(ImageError::MissingMetadata("LC_DYSYMTAB"))?;
        let linkedit = self
            .linkedit
            .as_ref()
            .ok_or(ImageError::MissingMetadata("__LINKEDIT segment"))?;
        if dysymtab.nindirectsyms == 0 {
            return Err(ImageError::MissingMetadata("indirect symbols"));
        }

        // Tables are located at slide + vmaddr - fileoff + offset, and must lie
        // inside the segment's file-backed bytes.
        let segment = MemoryRange::from_start_size(image.runtime_address(linkedit.vmaddr)?, linkedit.filesize)
            .map_err(|_| ImageError::Overflow("__LINKEDIT address range"))?;
        let locate = |offset: u32, count: u32, entry: u64, what: &'static str| -> Result<Address, ImageError> {
            let truncated = ImageError::Truncated {
                what,
                offset: u64::from(offset),
            };
            let len = u64::from(count).checked_mul(entry).ok_or(ImageError::Overflow(what))?;
            let relative = match u64::from(offset).checked_sub(linkedit.fileoff) {
                Some(relative) => relative,
                None => return Err(truncated),
            };
            let addr = segment.start().checked_add(relative).ok_or(ImageError::Overflow(what))?;
            if !segment.contains_span(addr, len) {
                return Err(truncated);
            }
            Ok(addr)
        };

        Ok(LinkTables {
            width: self.width,
            symtab: locate(symtab.symoff, symtab.nsyms, Nlist::entry_size(self.width), "symbol table")?,
            nsyms: symtab.nsyms,
            strtab: locate(symtab.stroff, symtab.strsize, 1, "string table")?,
            strsize: symtab.strsize,
            indirect: locate(dysymtab.indirectsymoff, dysymtab.nindirectsyms, 4, "indirect symbol table")?,
            nindirect: dysymtab.nindirectsyms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::BinaryMemory;
    use crate::utils::testing::{MachOBuilder, SectionKind};

    fn load(builder: MachOBuilder) -> BinaryMemory {
        BinaryMemory::from_macho_bytes(&builder.build(), BinaryMemory::DEFAULT_BASE).unwrap()
    }

    fn parse(memory: &BinaryMemory) -> ImageMetadata {
        ImageMetadata::parse(memory, &memory.image(), &EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_libraries_get_sequential_ordinals() {
        let memory = load(
            MachOBuilder::new()
                .dylib("/usr/lib/libSystem.B.dylib")
                .dylib("/usr/lib/libc++.1.dylib")
                .dylib("/usr/lib/libobjc.A.dylib"),
        );
        let metadata = parse(&memory);
        assert!(metadata.two_level);
        let names: Vec<(u32, &str)> = metadata
            .libraries
            .iter()
            .map(|lib| (lib.ordinal, lib.name.as_str()))
            .collect();
        assert_eq!(
            names,
            vec![
                (1, "/usr/lib/libSystem.B.dylib"),
                (2, "/usr/lib/libc++.1.dylib"),
                (3, "/usr/lib/libobjc.A.dylib"),
            ]
        );
        assert_eq!(metadata.library(2).unwrap().name, "/usr/lib/libc++.1.dylib");
    }

    #[test]
    fn test_flat_namespace_assigns_no_ordinals() {
        let memory = load(MachOBuilder::new().flat_namespace().dylib("/usr/lib/libSystem.B.dylib"));
        let metadata = parse(&memory);
        assert!(!metadata.two_level);
        assert!(metadata.libraries.is_empty());
    }

    #[test]
    fn test_only_pointer_sections_in_data_segments() {
        let memory = load(
            MachOBuilder::new()
                .import("_a", 1)
                .section("__DATA", "__la_symbol_ptr", SectionKind::Lazy, &[(0, 0)])
                .section("__DATA", "__data", SectionKind::Regular, &[(0, 0)])
                .section("__DATA_CONST", "__got", SectionKind::NonLazy, &[(0, 0)])
                .section("__AUTH", "__auth_got", SectionKind::NonLazy, &[(0, 0)]),
        );
        let metadata = parse(&memory);
        let names: Vec<String> = metadata.pointer_sections.iter().map(|s| s.qualified_name()).collect();
        assert_eq!(names, vec!["__DATA,__la_symbol_ptr", "__DATA_CONST,__got"]);
        assert_eq!(metadata.pointer_sections[0].segment_protection, Protection::ReadWrite);
        assert_eq!(metadata.pointer_sections[1].segment_protection, Protection::Read);
        assert_eq!(metadata.pointer_sections[1].reserved1, 1);
    }

    #[test]
    fn test_link_tables_translate_file_offsets() {
        let memory = load(
            MachOBuilder::new()
                .dylib("/usr/lib/libSystem.B.dylib")
                .import("_fprintf", 1)
                .section("__DATA", "__la_symbol_ptr", SectionKind::Lazy, &[(0, 0)]),
        );
        let image = memory.image();
        let tables = parse(&memory).link_tables(&image).unwrap();
        assert_eq!(tables.nsyms, 1);
        assert_eq!(tables.nindirect, 1);
        assert_eq!(tables.indirect_entry(&memory, 0).unwrap(), Some(0));
        assert_eq!(tables.indirect_entry(&memory, 1).unwrap(), None);
        let symbol = tables.symbol(&memory, 0).unwrap().unwrap();
        assert_eq!(symbol.library_ordinal(), 1);
        assert_eq!(
            tables.symbol_name(&memory, symbol.n_strx).unwrap().as_deref(),
            Some("_fprintf")
        );
        assert!(tables.symbol(&memory, 1).unwrap().is_none());
    }

    #[test]
    fn test_missing_tables_are_reported() {
        let base = || {
            MachOBuilder::new()
                .import("_a", 0)
                .section("__DATA", "__la_symbol_ptr", SectionKind::Lazy, &[(0, 0)])
        };
        for builder in [base().without_symtab(), base().without_dysymtab(), base().without_linkedit()] {
            let memory = load(builder);
            let result = parse(&memory).link_tables(&memory.image());
            assert!(matches!(result, Err(ImageError::MissingMetadata(_))));
        }

        let memory = load(MachOBuilder::new().import("_a", 0));
        assert!(matches!(
            parse(&memory).link_tables(&memory.image()),
            Err(ImageError::MissingMetadata("indirect symbols"))
        ));
    }

    #[test]
    fn test_32bit_image() {
        let memory = load(
            MachOBuilder::new()
                .bits32()
                .dylib("/usr/lib/libSystem.B.dylib")
                .import("_puts", 1)
                .section("__DATA", "__nl_symbol_ptr", SectionKind::NonLazy, &[(0, 0), (0, 0)]),
        );
        let metadata = parse(&memory);
        assert_eq!(metadata.width, PointerWidth::Bits32);
        assert_eq!(metadata.pointer_sections[0].slot_count(PointerWidth::Bits32), 2);
        let tables = metadata.link_tables(&memory.image()).unwrap();
        let symbol = tables.symbol(&memory, 0).unwrap().unwrap();
        assert_eq!(tables.symbol_name(&memory, symbol.n_strx).unwrap().as_deref(), Some("_puts"));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let memory = load(MachOBuilder::new());
        let image = ImageHandle::new(memory.base_address() + 0x10, 0);
        assert!(ImageMetadata::parse(&memory, &image, &EngineConfig::default()).is_err());
    }
}
