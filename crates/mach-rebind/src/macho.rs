//! Mach-O loader metadata structures and constants.
//!
//! These are the `#[repr(C)]` declarations of the dyld-resolved metadata the
//! rebinding engine reinterprets in memory: the image header, the
//! load-command list, segments/sections, and the symbol, string and indirect
//! symbol tables referenced from `LC_SYMTAB`/`LC_DYSYMTAB`.
//!
//! Only 64-bit images are supported.

// Struct and constant names follow <mach-o/loader.h>.
#![allow(non_camel_case_types)]

// Load command types
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_SEGMENT_64: u32 = 0x19;

// Segment names the engine cares about
pub const SEG_DATA: &[u8] = b"__DATA";
pub const SEG_DATA_CONST: &[u8] = b"__DATA_CONST";
pub const SEG_LINKEDIT: &[u8] = b"__LINKEDIT";

// Section flags: low byte is the section type
pub const SECTION_TYPE: u32 = 0x000000ff;
pub const S_NON_LAZY_SYMBOL_POINTERS: u32 = 0x6;
pub const S_LAZY_SYMBOL_POINTERS: u32 = 0x7;

// Reserved indirect-symbol-table entries: the slot is absolute or resolved
// locally and has no corresponding import to rebind.
pub const INDIRECT_SYMBOL_LOCAL: u32 = 0x80000000;
pub const INDIRECT_SYMBOL_ABS: u32 = 0x40000000;

/// Mach-O 64-bit image header
#[derive(Debug)]
#[repr(C)]
pub struct mach_header_64 {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
    pub reserved: u32,
}

/// Generic load command header
#[derive(Debug)]
#[repr(C)]
pub struct load_command {
    pub cmd: u32,
    pub cmdsize: u32,
}

/// 64-bit segment load command; `nsects` `section_64` records follow inline
#[derive(Debug)]
#[repr(C)]
pub struct segment_command_64 {
    pub cmd: u32,
    pub cmdsize: u32,
    pub segname: [u8; 16],
    pub vmaddr: u64,
    pub vmsize: u64,
    pub fileoff: u64,
    pub filesize: u64,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
}

/// 64-bit section within a segment
///
/// For symbol-pointer sections `reserved1` is the section's base index into
/// the indirect symbol table.
#[derive(Debug)]
#[repr(C)]
pub struct section_64 {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u64,
    pub size: u64,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
    pub reserved3: u32,
}

/// Symbol table command (LC_SYMTAB); offsets are relative to `__LINKEDIT`'s
/// file mapping
#[derive(Debug)]
#[repr(C)]
pub struct symtab_command {
    pub cmd: u32,
    pub cmdsize: u32,
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
}

/// Dynamic symbol table command (LC_DYSYMTAB); the engine only consumes the
/// indirect symbol table fields
#[derive(Debug)]
#[repr(C)]
pub struct dysymtab_command {
    pub cmd: u32,
    pub cmdsize: u32,
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoff: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
}

/// 64-bit symbol table entry; `n_strx` is the byte offset of the symbol name
/// in the string table
#[derive(Debug)]
#[repr(C)]
pub struct nlist_64 {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u64,
}

/// Segment/section names are 16-byte buffers, NUL padded when shorter.
pub fn name_bytes(raw: &[u8; 16]) -> &[u8] {
    let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    &raw[..len]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::size_of;

    // Layout must match <mach-o/loader.h> exactly or every pointer the
    // locator derives is garbage.
    #[test]
    fn struct_sizes_match_loader_h() {
        assert_eq!(size_of::<mach_header_64>(), 32);
        assert_eq!(size_of::<load_command>(), 8);
        assert_eq!(size_of::<segment_command_64>(), 72);
        assert_eq!(size_of::<section_64>(), 80);
        assert_eq!(size_of::<symtab_command>(), 24);
        assert_eq!(size_of::<dysymtab_command>(), 80);
        assert_eq!(size_of::<nlist_64>(), 16);
    }

    #[test]
    fn name_bytes_stops_at_nul() {
        let mut raw = [0u8; 16];
        raw[..6].copy_from_slice(b"__DATA");
        assert_eq!(name_bytes(&raw), SEG_DATA);

        let full = *b"0123456789abcdef";
        assert_eq!(name_bytes(&full), &full[..]);
    }
}
