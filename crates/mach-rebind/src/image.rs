//! Image metadata locator.
//!
//! Walks a loaded image's load-command list once and derives the runtime
//! addresses of the pieces the patcher needs: the symbol table, the string
//! table, the indirect symbol table, and the data segments that may hold
//! symbol-pointer sections. The derived view is scratch state, recomputed on
//! every scan; nothing here is cached across loader operations.

use libc::c_char;

use crate::macho::{
    dysymtab_command, load_command, mach_header_64, name_bytes, nlist_64, segment_command_64,
    symtab_command, LC_DYSYMTAB, LC_SEGMENT_64, LC_SYMTAB, SEG_DATA, SEG_DATA_CONST, SEG_LINKEDIT,
};

/// One loaded binary image as reported by dyld: its in-memory header plus
/// the slide applied to all of its link-time addresses. Owned by the loader;
/// the engine never allocates or frees these.
#[derive(Debug, Clone, Copy)]
pub struct LoadedImage {
    pub header: *const mach_header_64,
    pub slide: isize,
}

unsafe impl Send for LoadedImage {}
unsafe impl Sync for LoadedImage {}

/// Derived per-scan view of the loader metadata inside one image.
pub struct ImageMetadata {
    pub symtab: *const nlist_64,
    pub nsyms: u32,
    pub strtab: *const c_char,
    pub strsize: u32,
    pub indirect_symtab: *const u32,
    pub data: Option<*const segment_command_64>,
    pub data_const: Option<*const segment_command_64>,
}

/// Classify the image's load commands and resolve the link-edit tables to
/// runtime addresses.
///
/// Returns `None` when the image has no `__LINKEDIT` segment, no symbol
/// table, or no dynamic symbol table. That is not an error: such images
/// simply carry nothing to rebind and are skipped.
///
/// # Safety
///
/// `image.header` must point at the mapped Mach-O header of a live image and
/// `image.slide` must be the slide dyld reported for it.
pub unsafe fn locate(image: &LoadedImage) -> Option<ImageMetadata> {
    let header = &*image.header;

    let mut seg_linkedit: Option<&segment_command_64> = None;
    let mut seg_data: Option<*const segment_command_64> = None;
    let mut seg_data_const: Option<*const segment_command_64> = None;
    let mut symtab_cmd: Option<&symtab_command> = None;
    let mut dysymtab_cmd: Option<&dysymtab_command> = None;

    let mut cur = (image.header as usize) + std::mem::size_of::<mach_header_64>();
    for _ in 0..header.ncmds {
        let lc = &*(cur as *const load_command);
        match lc.cmd {
            LC_SEGMENT_64 => {
                let seg = &*(cur as *const segment_command_64);
                match name_bytes(&seg.segname) {
                    n if n == SEG_LINKEDIT => seg_linkedit = Some(seg),
                    n if n == SEG_DATA => seg_data = Some(seg as *const _),
                    n if n == SEG_DATA_CONST => seg_data_const = Some(seg as *const _),
                    _ => {}
                }
            }
            LC_SYMTAB => symtab_cmd = Some(&*(cur as *const symtab_command)),
            LC_DYSYMTAB => dysymtab_cmd = Some(&*(cur as *const dysymtab_command)),
            _ => {}
        }
        cur += lc.cmdsize as usize;
    }

    let (linkedit, symtab_cmd, dysymtab_cmd) = match (seg_linkedit, symtab_cmd, dysymtab_cmd) {
        (Some(l), Some(s), Some(d)) => (l, s, d),
        _ => return None,
    };

    // File offsets in the symtab/dysymtab commands are relative to the
    // link-edit segment's file mapping; translate through its vmaddr.
    let linkedit_base = (image.slide as usize)
        .wrapping_add(linkedit.vmaddr as usize)
        .wrapping_sub(linkedit.fileoff as usize);

    Some(ImageMetadata {
        symtab: (linkedit_base + symtab_cmd.symoff as usize) as *const nlist_64,
        nsyms: symtab_cmd.nsyms,
        strtab: (linkedit_base + symtab_cmd.stroff as usize) as *const c_char,
        strsize: symtab_cmd.strsize,
        indirect_symtab: (linkedit_base + dysymtab_cmd.indirectsymoff as usize) as *const u32,
        data: seg_data,
        data_const: seg_data_const,
    })
}
