//! # mach-rebind
//!
//! Runtime function interposition for Mach-O images: rewrites the function
//! pointers dyld resolved into lazy/non-lazy symbol-pointer sections so that
//! calls to a library symbol land in a replacement instead, in every loaded
//! image and in every image loaded afterwards. No recompiling, no relinking,
//! no instruction patching. Only the pointer tables the loader itself
//! maintains are touched.
//!
//! ```ignore
//! use mach_rebind::{rebind_symbols, Rebinding};
//!
//! static mut REAL_OPEN: *const libc::c_void = std::ptr::null();
//!
//! rebind_symbols(&[
//!     Rebinding::new("open", my_open as *const _)
//!         .with_replaced(unsafe { std::ptr::addr_of_mut!(REAL_OPEN) }),
//! ])?;
//! ```
//!
//! The engine is deliberately small: a prepend-only registry of request
//! batches ([`registry`]), a load-command walker that derives the symbol,
//! string and indirect-symbol tables of an image ([`image`]), a slot
//! patcher ([`patch`]), and a coordinator that runs the pipeline over the
//! loader's images and re-runs it on every future load ([`engine`]).
//!
//! There is no un-hooking. A rebinding can capture the prior slot value
//! (once), and a newer registration for the same name shadows an older one,
//! but slots are never restored.

pub mod engine;
pub mod image;
pub mod loader;
pub mod macho;
pub mod patch;
pub mod registry;

use thiserror::Error;

pub use engine::Rebinder;
pub use image::{ImageMetadata, LoadedImage};
pub use loader::{ImageLoader, ImageObserver};
pub use registry::{Entries, Rebinding, RebindingRegistry};

/// Errors surfaced by the rebinding engine.
///
/// Malformed or metadata-less images are not errors: they are skipped so
/// that one odd image cannot block rebinding in all the others.
#[derive(Error, Debug)]
pub enum RebindError {
    #[error("failed to allocate registry entry")]
    Allocation,
}

pub type Result<T> = std::result::Result<T, RebindError>;

#[cfg(target_os = "macos")]
pub use global::rebind_symbols;

#[cfg(target_os = "macos")]
mod global {
    use std::sync::OnceLock;

    use crate::loader::DyldLoader;
    use crate::{Rebinder, Rebinding, Result};

    static GLOBAL: OnceLock<Rebinder<DyldLoader>> = OnceLock::new();

    /// Process-wide rebind entry point over the real dyld, constructed
    /// lazily on first use.
    pub fn rebind_symbols(rebindings: &[Rebinding]) -> Result<()> {
        GLOBAL
            .get_or_init(|| Rebinder::new(DyldLoader))
            .rebind(rebindings)
    }
}
