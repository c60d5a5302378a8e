//! Rebind coordinator.
//!
//! Ties the registry, the image metadata locator and the section patcher
//! together: a rebind call links its batch, re-runs the locate-then-patch
//! pipeline over every loaded image, and makes sure the loader observer is
//! installed. The observer repeats the pipeline for every image loaded
//! later, against whatever registry state exists at that point.

use std::sync::{Arc, Once};

use tracing::debug;

use crate::image::{locate, LoadedImage};
use crate::loader::ImageLoader;
use crate::patch::patch_segment;
use crate::registry::{Rebinding, RebindingRegistry};
use crate::Result;

/// Rebinding engine bound to one loader.
///
/// This is process-wide state by design: the registry only grows, nodes are
/// never freed, and the loader observer keeps a handle to the engine for the
/// process lifetime. Construct it once (the macOS convenience entry point
/// [`crate::rebind_symbols`] does this lazily) and reuse it for every batch.
pub struct Rebinder<L: ImageLoader> {
    inner: Arc<Inner<L>>,
}

impl<L: ImageLoader> Clone for Rebinder<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<L: ImageLoader> {
    registry: RebindingRegistry,
    loader: L,
    observer_installed: Once,
}

impl<L: ImageLoader + 'static> Rebinder<L> {
    pub fn new(loader: L) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: RebindingRegistry::new(),
                loader,
                observer_installed: Once::new(),
            }),
        }
    }

    /// Register a batch of rebindings and apply the union of all batches to
    /// every currently loaded image.
    ///
    /// Newest batch wins when two batches name the same symbol. Images
    /// loaded after this call are patched automatically. Fails only when
    /// the registry copy cannot be allocated; no image is touched then.
    pub fn rebind(&self, rebindings: &[Rebinding]) -> Result<()> {
        self.inner.registry.prepend(rebindings)?;
        debug!(batch = rebindings.len(), "registered rebindings");

        let mut images = 0u32;
        self.inner.loader.for_each_image(&mut |image| {
            self.inner.rebind_image(image);
            images += 1;
        });
        debug!(images, "rescanned loaded images");

        self.inner.observer_installed.call_once(|| {
            let engine = Arc::clone(&self.inner);
            self.inner
                .loader
                .register_observer(Box::new(move |image| engine.rebind_image(image)));
        });
        Ok(())
    }

    /// Run the locate-then-patch pipeline for one image with the current
    /// registry state. Images without rebindable metadata are skipped.
    pub fn rebind_image(&self, image: LoadedImage) {
        self.inner.rebind_image(image);
    }
}

impl<L: ImageLoader> Inner<L> {
    fn rebind_image(&self, image: LoadedImage) {
        let snapshot = self.registry.entries();
        unsafe {
            let Some(meta) = locate(&image) else {
                return;
            };
            if let Some(data) = meta.data {
                patch_segment(data, image.slide, &meta, snapshot);
            }
            if let Some(data_const) = meta.data_const {
                patch_segment(data_const, image.slide, &meta, snapshot);
            }
        }
    }
}
