// Thu Jan 16 2026 - Alex

pub use goblin::mach::constants::{
    SECTION_TYPE, SEG_DATA, SEG_LINKEDIT, S_LAZY_SYMBOL_POINTERS, S_NON_LAZY_SYMBOL_POINTERS,
};
pub use goblin::mach::header::{MH_MAGIC, MH_MAGIC_64, MH_TWOLEVEL};
pub use goblin::mach::load_command::{
    LC_DYSYMTAB, LC_LAZY_LOAD_DYLIB, LC_LOAD_DYLIB, LC_LOAD_UPWARD_DYLIB, LC_LOAD_WEAK_DYLIB,
    LC_REEXPORT_DYLIB, LC_SEGMENT, LC_SEGMENT_64, LC_SYMTAB,
};

pub const SEG_DATA_CONST: &str = "__DATA_CONST";

/// Segment flag: dyld makes the segment read-only once fixups are done.
pub const SG_READ_ONLY: u32 = 0x10;

pub const INDIRECT_SYMBOL_LOCAL: u32 = 0x8000_0000;
pub const INDIRECT_SYMBOL_ABS: u32 = 0x4000_0000;

/// `n_desc` library ordinal meaning "defined in this image".
pub const SELF_LIBRARY_ORDINAL: u8 = 0x0;

pub const MACH_HEADER_SIZE: u64 = 28;
pub const MACH_HEADER_64_SIZE: u64 = 32;
pub const LOAD_COMMAND_SIZE: u64 = 8;
pub const SEGMENT_COMMAND_SIZE: u64 = 56;
pub const SEGMENT_COMMAND_64_SIZE: u64 = 72;
pub const SECTION_SIZE: u64 = 68;
pub const SECTION_64_SIZE: u64 = 80;
pub const SYMTAB_COMMAND_SIZE: u64 = 24;
pub const DYSYMTAB_COMMAND_SIZE: u64 = 80;
pub const DYLIB_COMMAND_SIZE: u64 = 24;
pub const NLIST_SIZE: u64 = 12;
pub const NLIST_64_SIZE: u64 = 16;

pub fn get_library_ordinal(n_desc: u16) -> u8 {
    ((n_desc >> 8) & 0xff) as u8
}

pub fn is_dylib_command(cmd: u32) -> bool {
    matches!(
        cmd,
        LC_LOAD_DYLIB | LC_LOAD_WEAK_DYLIB | LC_REEXPORT_DYLIB | LC_LOAD_UPWARD_DYLIB | LC_LAZY_LOAD_DYLIB
    )
}

/// Indirect table entries that do not refer to an imported symbol.
pub fn is_reserved_indirect_index(index: u32) -> bool {
    index == INDIRECT_SYMBOL_ABS
        || index == INDIRECT_SYMBOL_LOCAL
        || index == (INDIRECT_SYMBOL_LOCAL | INDIRECT_SYMBOL_ABS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_ordinal_from_desc() {
        assert_eq!(get_library_ordinal(0x0100), 1);
        assert_eq!(get_library_ordinal(0x0300 | 0x0008), 3);
        assert_eq!(get_library_ordinal(0x0000), SELF_LIBRARY_ORDINAL);
    }

    #[test]
    fn test_reserved_indirect_indices() {
        assert!(is_reserved_indirect_index(INDIRECT_SYMBOL_LOCAL));
        assert!(is_reserved_indirect_index(INDIRECT_SYMBOL_ABS));
        assert!(is_reserved_indirect_index(0xC000_0000));
        assert!(!is_reserved_indirect_index(7));
    }
}
