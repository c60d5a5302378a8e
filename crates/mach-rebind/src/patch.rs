//! Symbol-pointer section patcher.
//!
//! Rewrites the dyld-resolved function pointer slots of one lazy- or
//! non-lazy-symbol-pointer section against a registry snapshot. All of the
//! raw pointer arithmetic over loader structures lives here and in
//! [`crate::image`]; everything above operates on the derived views.

use std::ffi::CStr;
use std::mem;

use libc::c_void;
use tracing::trace;

use crate::image::ImageMetadata;
use crate::macho::{
    section_64, segment_command_64, INDIRECT_SYMBOL_ABS, INDIRECT_SYMBOL_LOCAL,
    SECTION_TYPE, S_LAZY_SYMBOL_POINTERS, S_NON_LAZY_SYMBOL_POINTERS,
};
use crate::registry::Entries;

/// Patch every eligible section of the given data segment.
///
/// # Safety
///
/// `segment` must be a `__DATA`/`__DATA_CONST` segment command of a live
/// image whose metadata is `meta`, with `slide` the image's slide.
pub unsafe fn patch_segment(
    segment: *const segment_command_64,
    slide: isize,
    meta: &ImageMetadata,
    snapshot: Entries,
) {
    let seg = &*segment;
    let first = (segment as usize + mem::size_of::<segment_command_64>()) as *const section_64;
    for i in 0..seg.nsects as usize {
        let section = &*first.add(i);
        let section_type = section.flags & SECTION_TYPE;
        if section_type == S_LAZY_SYMBOL_POINTERS || section_type == S_NON_LAZY_SYMBOL_POINTERS {
            patch_section(section, slide, meta, snapshot);
        }
    }
}

/// Patch one symbol-pointer section: resolve each slot's symbol name through
/// the indirect symbol table and rewrite slots whose name matches a
/// registered rebinding, newest registration first.
///
/// # Safety
///
/// `section` must be a lazy- or non-lazy-symbol-pointer section of the image
/// described by `meta`, and the image's data segment must be mapped
/// writable (dyld guarantees this for slid images).
pub unsafe fn patch_section(
    section: &section_64,
    slide: isize,
    meta: &ImageMetadata,
    snapshot: Entries,
) {
    let indirect_indices = meta.indirect_symtab.add(section.reserved1 as usize);
    let slots = (slide as usize).wrapping_add(section.addr as usize) as *mut *const c_void;
    let count = section.size as usize / mem::size_of::<*const c_void>();

    'slots: for i in 0..count {
        let symtab_index = *indirect_indices.add(i);
        // Absolute and locally-resolved slots carry no import to rebind.
        if symtab_index == INDIRECT_SYMBOL_ABS || symtab_index == INDIRECT_SYMBOL_LOCAL {
            continue;
        }
        if symtab_index >= meta.nsyms {
            continue;
        }

        let strtab_offset = (*meta.symtab.add(symtab_index as usize)).n_strx;
        if strtab_offset == 0 || strtab_offset >= meta.strsize {
            continue;
        }
        let name = CStr::from_ptr(meta.strtab.add(strtab_offset as usize)).to_bytes();
        // The linker prepends `_` to every C symbol; a name without it can
        // never correspond to a registered rebinding.
        let stripped = match name.split_first() {
            Some((b'_', rest)) if !rest.is_empty() => rest,
            _ => continue,
        };

        for batch in snapshot {
            for rebinding in batch {
                if rebinding.name.as_bytes() == stripped {
                    if !rebinding.replaced.is_null() && (*rebinding.replaced).is_null() {
                        *rebinding.replaced = *slots.add(i);
                    }
                    *slots.add(i) = rebinding.replacement;
                    trace!(
                        symbol = %rebinding.name,
                        slot = i,
                        "rebound symbol pointer"
                    );
                    continue 'slots;
                }
            }
        }
    }
}
