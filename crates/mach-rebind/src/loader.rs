//! Loader abstraction.
//!
//! The engine's only external collaborator is the dynamic loader: it
//! enumerates the currently loaded images and notifies an observer for every
//! image loaded later. [`DyldLoader`] is the real thing on macOS; tests
//! drive the engine through a fake implementation.

use crate::image::LoadedImage;

/// Callback invoked once per newly loaded image.
pub type ImageObserver = Box<dyn Fn(LoadedImage) + Send + Sync>;

/// The dynamic loader as seen by the rebinding engine.
pub trait ImageLoader: Send + Sync {
    /// Visit every currently loaded image.
    fn for_each_image(&self, visit: &mut dyn FnMut(LoadedImage));

    /// Install a persistent observer for future image loads. Called at most
    /// once per [`crate::Rebinder`]; the loader keeps the observer for the
    /// process lifetime.
    fn register_observer(&self, observer: ImageObserver);
}

impl<L: ImageLoader> ImageLoader for std::sync::Arc<L> {
    fn for_each_image(&self, visit: &mut dyn FnMut(LoadedImage)) {
        (**self).for_each_image(visit)
    }

    fn register_observer(&self, observer: ImageObserver) {
        (**self).register_observer(observer)
    }
}

#[cfg(target_os = "macos")]
pub use dyld::DyldLoader;

#[cfg(target_os = "macos")]
mod dyld {
    use std::sync::OnceLock;

    use super::{ImageLoader, ImageObserver};
    use crate::image::LoadedImage;
    use crate::macho::mach_header_64;

    extern "C" {
        fn _dyld_image_count() -> u32;
        fn _dyld_get_image_header(image_index: u32) -> *const mach_header_64;
        fn _dyld_get_image_vmaddr_slide(image_index: u32) -> isize;
        fn _dyld_register_func_for_add_image(
            callback: extern "C" fn(*const mach_header_64, isize),
        );
    }

    // dyld's add-image callback carries no context pointer, so the one
    // observer this process installs lives here.
    static ADD_IMAGE_OBSERVER: OnceLock<ImageObserver> = OnceLock::new();

    extern "C" fn add_image_trampoline(header: *const mach_header_64, slide: isize) {
        if let Some(observer) = ADD_IMAGE_OBSERVER.get() {
            observer(LoadedImage { header, slide });
        }
    }

    /// The real dyld.
    pub struct DyldLoader;

    impl ImageLoader for DyldLoader {
        fn for_each_image(&self, visit: &mut dyn FnMut(LoadedImage)) {
            unsafe {
                let count = _dyld_image_count();
                for i in 0..count {
                    visit(LoadedImage {
                        header: _dyld_get_image_header(i),
                        slide: _dyld_get_image_vmaddr_slide(i),
                    });
                }
            }
        }

        fn register_observer(&self, observer: ImageObserver) {
            let _ = ADD_IMAGE_OBSERVER.set(observer);
            // dyld replays the callback for every already-loaded image and
            // keeps invoking it for each new load.
            unsafe { _dyld_register_func_for_add_image(add_image_trampoline) };
        }
    }
}
