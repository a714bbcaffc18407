// Tue Jan 13 2026 - Alex

//! Builds small, well-formed Mach-O images for tests.
//!
//! The produced file has a `__TEXT` page holding the header and load
//! commands, one page-aligned segment per data segment used by the sections,
//! and a `__LINKEDIT` segment holding the symbol, string and indirect symbol
//! tables. `__LINKEDIT` is given a virtual address one page above its file
//! offset so that file-offset translation is actually exercised.

use crate::image::constants::*;
use crate::image::PointerWidth;

const PAGE: u64 = 0x1000;
const N_UNDF_EXT: u8 = 0x01;
const N_SECT_EXT: u8 = 0x0f;
const MH_DYLIB: u32 = 0x6;
const MH_DYLDLINK: u32 = 0x4;
const CPU_TYPE_X86: u32 = 7;
const CPU_TYPE_ARM64: u32 = 0x0100_000c;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Lazy,
    NonLazy,
    Regular,
}

impl SectionKind {
    fn flags(self) -> u32 {
        match self {
            Self::Lazy => S_LAZY_SYMBOL_POINTERS,
            Self::NonLazy => S_NON_LAZY_SYMBOL_POINTERS,
            Self::Regular => 0,
        }
    }
}

#[derive(Debug, Clone)]
struct SymbolSpec {
    name: String,
    n_type: u8,
    n_desc: u16,
}

#[derive(Debug, Clone)]
struct SectionSpec {
    segment: String,
    name: String,
    kind: SectionKind,
    /// (indirect table entry, initial slot value)
    slots: Vec<(u32, u64)>,
}

#[derive(Debug, Clone)]
pub struct BuiltSection {
    pub segment: String,
    pub name: String,
    pub addr: u64,
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct BuiltImage {
    pub bytes: Vec<u8>,
    pub sections: Vec<BuiltSection>,
}

impl BuiltImage {
    /// Link-time address of the named section.
    pub fn section_addr(&self, name: &str) -> u64 {
        self.sections
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.addr)
            .unwrap_or_else(|| panic!("no section named {}", name))
    }
}

#[derive(Debug, Clone)]
pub struct MachOBuilder {
    width: PointerWidth,
    two_level: bool,
    dylibs: Vec<String>,
    symbols: Vec<SymbolSpec>,
    sections: Vec<SectionSpec>,
    segment_protections: Vec<(String, u32)>,
    with_symtab: bool,
    with_dysymtab: bool,
    with_linkedit: bool,
    /// Header-only overrides for producing malformed images.
    section_addrs: Vec<(String, u64)>,
    section_reserved1: Vec<(String, u32)>,
    linkedit_vmaddr: Option<u64>,
    linkedit_filesize: Option<u64>,
    indirect_count: Option<u32>,
    sizeofcmds_shortfall: u32,
}

impl Default for MachOBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MachOBuilder {
    pub fn new() -> Self {
        Self {
            width: PointerWidth::Bits64,
            two_level: true,
            dylibs: Vec::new(),
            symbols: Vec::new(),
            sections: Vec::new(),
            segment_protections: vec![(SEG_DATA_CONST.to_string(), 1)],
            with_symtab: true,
            with_dysymtab: true,
            with_linkedit: true,
            section_addrs: Vec::new(),
            section_reserved1: Vec::new(),
            linkedit_vmaddr: None,
            linkedit_filesize: None,
            indirect_count: None,
            sizeofcmds_shortfall: 0,
        }
    }

    pub fn bits32(mut self) -> Self {
        self.width = PointerWidth::Bits32;
        self
    }

    pub fn flat_namespace(mut self) -> Self {
        self.two_level = false;
        self
    }

    /// Adds a `LC_LOAD_DYLIB`; ordinals follow call order starting at 1.
    pub fn dylib(mut self, name: &str) -> Self {
        self.dylibs.push(name.to_string());
        self
    }

    /// Adds an undefined external symbol bound to `ordinal`. Symbol indices
    /// follow call order starting at 0.
    pub fn import(mut self, name: &str, ordinal: u8) -> Self {
        self.symbols.push(SymbolSpec {
            name: name.to_string(),
            n_type: N_UNDF_EXT,
            n_desc: u16::from(ordinal) << 8,
        });
        self
    }

    /// Adds a symbol defined in the image itself.
    pub fn local_symbol(mut self, name: &str) -> Self {
        self.symbols.push(SymbolSpec {
            name: name.to_string(),
            n_type: N_SECT_EXT,
            n_desc: 0,
        });
        self
    }

    pub fn section(mut self, segment: &str, name: &str, kind: SectionKind, slots: &[(u32, u64)]) -> Self {
        self.sections.push(SectionSpec {
            segment: segment.to_string(),
            name: name.to_string(),
            kind,
            slots: slots.to_vec(),
        });
        self
    }

    pub fn segment_protection(mut self, segment: &str, initprot: u32) -> Self {
        self.segment_protections.retain(|(name, _)| name != segment);
        self.segment_protections.push((segment.to_string(), initprot));
        self
    }

    pub fn without_symtab(mut self) -> Self {
        self.with_symtab = false;
        self
    }

    pub fn without_dysymtab(mut self) -> Self {
        self.with_dysymtab = false;
        self
    }

    pub fn without_linkedit(mut self) -> Self {
        self.with_linkedit = false;
        self
    }

    /// Records `addr` in the named section's header. Contents stay where
    /// the layout put them.
    pub fn section_header_addr(mut self, section: &str, addr: u64) -> Self {
        self.section_addrs.push((section.to_string(), addr));
        self
    }

    /// Records `reserved1` in the named section's header.
    pub fn section_header_reserved1(mut self, section: &str, reserved1: u32) -> Self {
        self.section_reserved1.push((section.to_string(), reserved1));
        self
    }

    pub fn linkedit_vmaddr(mut self, vmaddr: u64) -> Self {
        self.linkedit_vmaddr = Some(vmaddr);
        self
    }

    /// Declares a `__LINKEDIT` file size other than what its tables need.
    pub fn linkedit_filesize(mut self, filesize: u64) -> Self {
        self.linkedit_filesize = Some(filesize);
        self
    }

    /// Declares `count` indirect symbols regardless of how many are written.
    pub fn indirect_count(mut self, count: u32) -> Self {
        self.indirect_count = Some(count);
        self
    }

    /// Makes the header's `sizeofcmds` fall `bytes` short of the commands.
    pub fn sizeofcmds_shortfall(mut self, bytes: u32) -> Self {
        self.sizeofcmds_shortfall = bytes;
        self
    }

    fn header_addr(&self, section: &str, addr: u64) -> u64 {
        self.section_addrs
            .iter()
            .find(|(name, _)| name == section)
            .map_or(addr, |(_, addr)| *addr)
    }

    fn header_reserved1(&self, section: &str, reserved1: u32) -> u32 {
        self.section_reserved1
            .iter()
            .find(|(name, _)| name == section)
            .map_or(reserved1, |(_, reserved1)| *reserved1)
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_image().bytes
    }

    pub fn build_image(&self) -> BuiltImage {
        let ptr = self.width.bytes();
        let is_64 = self.width == PointerWidth::Bits64;
        let header_size = if is_64 { MACH_HEADER_64_SIZE } else { MACH_HEADER_SIZE };
        let seg_size = if is_64 { SEGMENT_COMMAND_64_SIZE } else { SEGMENT_COMMAND_SIZE };
        let sect_size = if is_64 { SECTION_64_SIZE } else { SECTION_SIZE };
        let nlist_size = if is_64 { NLIST_64_SIZE } else { NLIST_SIZE };
        let cmd_align = if is_64 { 8 } else { 4 };

        let mut segment_names: Vec<String> = Vec::new();
        for section in &self.sections {
            if !segment_names.contains(&section.segment) {
                segment_names.push(section.segment.clone());
            }
        }

        // Data segment layout.
        let mut built_sections = Vec::new();
        let mut section_records = Vec::new();
        let mut indirect: Vec<u32> = Vec::new();
        let mut segment_records = Vec::new();
        let mut next_vm = PAGE;
        for segname in &segment_names {
            let seg_start = next_vm;
            let mut cursor = seg_start;
            let mut records = Vec::new();
            for section in self.sections.iter().filter(|s| &s.segment == segname) {
                let size = section.slots.len() as u64 * ptr;
                let reserved1 = if section.kind == SectionKind::Regular {
                    0
                } else {
                    let first = indirect.len() as u32;
                    indirect.extend(section.slots.iter().map(|(entry, _)| *entry));
                    first
                };
                records.push((section.clone(), cursor, size, reserved1));
                built_sections.push(BuiltSection {
                    segment: segname.clone(),
                    name: section.name.clone(),
                    addr: cursor,
                    size,
                });
                cursor += size;
            }
            let seg_len = round_up((cursor - seg_start).max(1), PAGE);
            next_vm = seg_start + seg_len;
            let initprot = self
                .segment_protections
                .iter()
                .find(|(name, _)| name == segname)
                .map(|(_, prot)| *prot)
                .unwrap_or(3);
            segment_records.push((segname.clone(), seg_start, seg_len, initprot, records.len()));
            section_records.push(records);
        }

        // Link-edit contents.
        let linkedit_fileoff = next_vm;
        let mut strtab = vec![0u8];
        let mut string_offsets = Vec::new();
        for symbol in &self.symbols {
            string_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(symbol.name.as_bytes());
            strtab.push(0);
        }
        while strtab.len() % 4 != 0 {
            strtab.push(0);
        }
        let symoff = linkedit_fileoff;
        let stroff = symoff + self.symbols.len() as u64 * nlist_size;
        let indirectsymoff = stroff + strtab.len() as u64;
        let linkedit_filesize = (indirectsymoff + indirect.len() as u64 * 4 - linkedit_fileoff).max(4);
        let linkedit_vmaddr = self.linkedit_vmaddr.unwrap_or(linkedit_fileoff + PAGE);
        let file_len = linkedit_fileoff + linkedit_filesize;

        let mut out = vec![0u8; file_len as usize];

        // Load commands.
        let mut cmds: Vec<u8> = Vec::new();
        let mut ncmds = 0u32;

        let push_segment = |cmds: &mut Vec<u8>,
                                name: &str,
                                vmaddr: u64,
                                vmsize: u64,
                                fileoff: u64,
                                filesize: u64,
                                initprot: u32,
                                sections: &[(SectionSpec, u64, u64, u32)]| {
            let cmd = if is_64 { LC_SEGMENT_64 } else { LC_SEGMENT };
            let cmdsize = seg_size + sections.len() as u64 * sect_size;
            put_u32(cmds, cmd);
            put_u32(cmds, cmdsize as u32);
            put_name(cmds, name);
            put_word(cmds, vmaddr, is_64);
            put_word(cmds, vmsize, is_64);
            put_word(cmds, fileoff, is_64);
            put_word(cmds, filesize, is_64);
            put_u32(cmds, initprot | 3);
            put_u32(cmds, initprot);
            put_u32(cmds, sections.len() as u32);
            put_u32(cmds, 0);
            for (spec, addr, size, reserved1) in sections {
                put_name(cmds, &spec.name);
                put_name(cmds, name);
                put_word(cmds, self.header_addr(&spec.name, *addr), is_64);
                put_word(cmds, *size, is_64);
                put_u32(cmds, *addr as u32);
                put_u32(cmds, if is_64 { 3 } else { 2 });
                put_u32(cmds, 0);
                put_u32(cmds, 0);
                put_u32(cmds, spec.kind.flags());
                put_u32(cmds, self.header_reserved1(&spec.name, *reserved1));
                put_u32(cmds, 0);
                if is_64 {
                    put_u32(cmds, 0);
                }
            }
        };

        push_segment(&mut cmds, "__TEXT", 0, PAGE, 0, PAGE, 5, &[]);
        ncmds += 1;
        for ((name, start, len, initprot, _), records) in segment_records.iter().zip(&section_records) {
            push_segment(&mut cmds, name, *start, *len, *start, *len, *initprot, records);
            ncmds += 1;
        }
        if self.with_linkedit {
            push_segment(
                &mut cmds,
                SEG_LINKEDIT,
                linkedit_vmaddr,
                round_up(linkedit_filesize, PAGE),
                linkedit_fileoff,
                self.linkedit_filesize.unwrap_or(linkedit_filesize),
                1,
                &[],
            );
            ncmds += 1;
        }
        if self.with_symtab {
            put_u32(&mut cmds, LC_SYMTAB);
            put_u32(&mut cmds, SYMTAB_COMMAND_SIZE as u32);
            put_u32(&mut cmds, symoff as u32);
            put_u32(&mut cmds, self.symbols.len() as u32);
            put_u32(&mut cmds, stroff as u32);
            put_u32(&mut cmds, strtab.len() as u32);
            ncmds += 1;
        }
        if self.with_dysymtab {
            put_u32(&mut cmds, LC_DYSYMTAB);
            put_u32(&mut cmds, DYSYMTAB_COMMAND_SIZE as u32);
            for _ in 0..12 {
                put_u32(&mut cmds, 0);
            }
            put_u32(&mut cmds, indirectsymoff as u32);
            put_u32(&mut cmds, self.indirect_count.unwrap_or(indirect.len() as u32));
            for _ in 0..4 {
                put_u32(&mut cmds, 0);
            }
            ncmds += 1;
        }
        for dylib in &self.dylibs {
            let cmdsize = round_up(DYLIB_COMMAND_SIZE + dylib.len() as u64 + 1, cmd_align);
            put_u32(&mut cmds, LC_LOAD_DYLIB);
            put_u32(&mut cmds, cmdsize as u32);
            put_u32(&mut cmds, DYLIB_COMMAND_SIZE as u32);
            put_u32(&mut cmds, 2);
            put_u32(&mut cmds, 0x0001_0000);
            put_u32(&mut cmds, 0x0001_0000);
            cmds.extend_from_slice(dylib.as_bytes());
            cmds.resize(cmds.len() + (cmdsize as usize - DYLIB_COMMAND_SIZE as usize - dylib.len()), 0);
            ncmds += 1;
        }
        assert!(header_size + (cmds.len() as u64) <= PAGE, "load commands overflow the header page");

        // Header.
        let mut header = Vec::new();
        put_u32(&mut header, if is_64 { MH_MAGIC_64 } else { MH_MAGIC });
        put_u32(&mut header, if is_64 { CPU_TYPE_ARM64 } else { CPU_TYPE_X86 });
        put_u32(&mut header, 0);
        put_u32(&mut header, MH_DYLIB);
        put_u32(&mut header, ncmds);
        put_u32(&mut header, cmds.len() as u32 - self.sizeofcmds_shortfall);
        put_u32(&mut header, MH_DYLDLINK | if self.two_level { MH_TWOLEVEL } else { 0 });
        if is_64 {
            put_u32(&mut header, 0);
        }
        out[..header.len()].copy_from_slice(&header);
        let cmds_at = header_size as usize;
        out[cmds_at..cmds_at + cmds.len()].copy_from_slice(&cmds);

        // Initial slot values.
        for records in &section_records {
            for (spec, addr, _, _) in records {
                for (i, (_, value)) in spec.slots.iter().enumerate() {
                    let at = (*addr + i as u64 * ptr) as usize;
                    if is_64 {
                        out[at..at + 8].copy_from_slice(&value.to_le_bytes());
                    } else {
                        out[at..at + 4].copy_from_slice(&(*value as u32).to_le_bytes());
                    }
                }
            }
        }

        // Symbol table, string table, indirect table.
        let mut syms = Vec::new();
        for (symbol, strx) in self.symbols.iter().zip(&string_offsets) {
            put_u32(&mut syms, *strx);
            syms.push(symbol.n_type);
            syms.push(if symbol.n_type == N_SECT_EXT { 1 } else { 0 });
            syms.extend_from_slice(&symbol.n_desc.to_le_bytes());
            put_word(&mut syms, 0, is_64);
        }
        let symoff = symoff as usize;
        out[symoff..symoff + syms.len()].copy_from_slice(&syms);
        let stroff = stroff as usize;
        out[stroff..stroff + strtab.len()].copy_from_slice(&strtab);
        let mut table = Vec::new();
        for entry in &indirect {
            put_u32(&mut table, *entry);
        }
        let indirectsymoff = indirectsymoff as usize;
        out[indirectsymoff..indirectsymoff + table.len()].copy_from_slice(&table);

        BuiltImage {
            bytes: out,
            sections: built_sections,
        }
    }
}

fn round_up(value: u64, align: u64) -> u64 {
    (value + align - 1) / align * align
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_word(out: &mut Vec<u8>, value: u64, is_64: bool) {
    if is_64 {
        out.extend_from_slice(&value.to_le_bytes());
    } else {
        out.extend_from_slice(&(value as u32).to_le_bytes());
    }
}

fn put_name(out: &mut Vec<u8>, name: &str) {
    let mut raw = [0u8; 16];
    let len = name.len().min(16);
    raw[..len].copy_from_slice(&name.as_bytes()[..len]);
    out.extend_from_slice(&raw);
}

#[cfg(test)]
mod tests {
    use super::*;
    use goblin::mach::{Mach, MachO};

    fn parse(bytes: &[u8]) -> MachO<'_> {
        match Mach::parse(bytes).unwrap() {
            Mach::Binary(macho) => macho,
            Mach::Fat(_) => panic!("unexpected fat binary"),
        }
    }

    #[test]
    fn test_goblin_accepts_built_image() {
        let bytes = MachOBuilder::new()
            .dylib("/usr/lib/libSystem.B.dylib")
            .dylib("/usr/lib/libobjc.A.dylib")
            .import("_fprintf", 1)
            .section("__DATA", "__la_symbol_ptr", SectionKind::Lazy, &[(0, 0x10)])
            .section("__DATA_CONST", "__got", SectionKind::NonLazy, &[(0, 0x20)])
            .build();
        let macho = parse(&bytes);
        assert!(macho.is_64);
        assert_eq!(macho.header.flags & MH_TWOLEVEL, MH_TWOLEVEL);
        assert!(macho.libs.contains(&"/usr/lib/libSystem.B.dylib"));
        assert!(macho.libs.contains(&"/usr/lib/libobjc.A.dylib"));
        let names: Vec<String> = macho
            .segments
            .iter()
            .map(|s| s.name().unwrap_or("").to_string())
            .collect();
        assert_eq!(names, vec!["__TEXT", "__DATA", "__DATA_CONST", "__LINKEDIT"]);
    }

    #[test]
    fn test_goblin_accepts_32bit_image() {
        let bytes = MachOBuilder::new()
            .bits32()
            .dylib("/usr/lib/libSystem.B.dylib")
            .import("_puts", 1)
            .section("__DATA", "__nl_symbol_ptr", SectionKind::NonLazy, &[(0, 0x10)])
            .build();
        let macho = parse(&bytes);
        assert!(!macho.is_64);
    }

    #[test]
    fn test_sections_are_laid_out_in_segment_order() {
        let image = MachOBuilder::new()
            .import("_a", 1)
            .section("__DATA", "__la_symbol_ptr", SectionKind::Lazy, &[(0, 0), (0, 0)])
            .section("__DATA", "__data", SectionKind::Regular, &[(0, 0)])
            .build_image();
        assert_eq!(image.section_addr("__la_symbol_ptr"), PAGE);
        assert_eq!(image.section_addr("__data"), PAGE + 16);
    }
}
