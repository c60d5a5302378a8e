//! C ABI surface for the rebinding engine.
//!
//! Builds as a `cdylib`/`staticlib` so the engine can be linked from C or
//! Objective-C harnesses, or injected with `DYLD_INSERT_LIBRARIES`. The
//! exported signature matches `include/mach_rebind.h`.

// `rebinding` matches the C struct name in the header.
#![allow(non_camel_case_types)]

use libc::{c_char, c_void};

/// Mirror of `struct rebinding` in `include/mach_rebind.h`.
#[repr(C)]
pub struct rebinding {
    pub name: *const c_char,
    pub replacement: *mut c_void,
    pub replaced: *mut *mut c_void,
}

/// Rebind the given symbols in all loaded images and all future images.
/// Returns 0 on success, -1 when the request batch cannot be recorded.
///
/// # Safety
///
/// `rebindings` must point to `rebindings_nel` valid entries whose `name`
/// fields are NUL-terminated strings; `replaced` cells, when non-NULL, must
/// stay writable for the process lifetime.
#[cfg(target_os = "macos")]
#[no_mangle]
pub unsafe extern "C" fn rebind_symbols(
    rebindings: *const rebinding,
    rebindings_nel: usize,
) -> libc::c_int {
    use std::ffi::CStr;

    use mach_rebind::Rebinding;

    if rebindings.is_null() && rebindings_nel != 0 {
        return -1;
    }

    let raw = std::slice::from_raw_parts(rebindings, rebindings_nel);
    let mut batch = Vec::with_capacity(rebindings_nel);
    for r in raw {
        if r.name.is_null() {
            continue;
        }
        let name = CStr::from_ptr(r.name).to_string_lossy().into_owned();
        batch.push(
            Rebinding::new(name, r.replacement as *const c_void)
                .with_replaced(r.replaced as *mut *const c_void),
        );
    }

    match mach_rebind::rebind_symbols(&batch) {
        Ok(()) => 0,
        Err(_) => -1,
    }
}
