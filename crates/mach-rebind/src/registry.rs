//! Pending-rebinding registry.
//!
//! An append-only stack of request batches. Batches are prepended, so the
//! newest registration is always searched first and shadows older requests
//! for the same symbol. Nodes are immutable once linked and are never freed
//! (the registry lives for the process lifetime), which makes traversal safe
//! while another thread is prepending: a reader sees either the old head or
//! the new one, both of which are fully initialized.

use std::alloc::{alloc, Layout};
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Mutex;

use libc::c_void;

use crate::{RebindError, Result};

/// One rebinding request: redirect every dyld-resolved pointer slot for
/// `name` to `replacement`.
///
/// `name` is the plain C-level symbol name; the leading `_` the linker
/// prepends is stripped by the patcher before comparison, so callers write
/// `"malloc"`, not `"_malloc"`.
///
/// `replaced`, when non-null, receives the slot's value from before the
/// rewrite. It is written at most once process-wide: the capture only
/// happens while the cell still holds null, so a later rescan cannot
/// clobber the true original with an already-hooked pointer.
#[derive(Debug, Clone)]
pub struct Rebinding {
    pub name: String,
    pub replacement: *const c_void,
    pub replaced: *mut *const c_void,
}

impl Rebinding {
    pub fn new(name: impl Into<String>, replacement: *const c_void) -> Self {
        Self {
            name: name.into(),
            replacement,
            replaced: ptr::null_mut(),
        }
    }

    pub fn with_replaced(mut self, replaced: *mut *const c_void) -> Self {
        self.replaced = replaced;
        self
    }
}

// The raw pointers are opaque payload owned by the caller; the registry only
// stores and hands them back.
unsafe impl Send for Rebinding {}
unsafe impl Sync for Rebinding {}

struct Node {
    rebindings: Vec<Rebinding>,
    next: *const Node,
}

/// Append-only, newest-first registry of rebind request batches.
pub struct RebindingRegistry {
    head: AtomicPtr<Node>,
    // Serializes the head update between racing prepends; readers never
    // take it.
    link: Mutex<()>,
}

impl RebindingRegistry {
    pub const fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
            link: Mutex::new(()),
        }
    }

    /// Copy `rebindings` into a new node and link it as the head.
    ///
    /// Fails only if memory cannot be obtained, in which case the registry
    /// is unchanged.
    pub fn prepend(&self, rebindings: &[Rebinding]) -> Result<()> {
        let mut copy = Vec::new();
        copy.try_reserve_exact(rebindings.len())
            .map_err(|_| RebindError::Allocation)?;
        copy.extend(rebindings.iter().cloned());

        let node = unsafe { alloc(Layout::new::<Node>()) } as *mut Node;
        if node.is_null() {
            return Err(RebindError::Allocation);
        }

        let guard = self.link.lock().unwrap_or_else(|e| e.into_inner());
        unsafe {
            node.write(Node {
                rebindings: copy,
                next: self.head.load(Ordering::Relaxed),
            });
        }
        self.head.store(node, Ordering::Release);
        drop(guard);
        Ok(())
    }

    /// Snapshot iterator over the batches, newest first.
    ///
    /// The snapshot is taken at call time; batches prepended afterwards are
    /// not visible to it. A rebind pass always works with the state as of
    /// its own prepend, which it observes by construction.
    pub fn entries(&self) -> Entries {
        Entries {
            cur: self.head.load(Ordering::Acquire),
        }
    }
}

impl Default for RebindingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Newest-first traversal of registry batches. Cheap to clone, so the
/// patcher restarts it once per pointer slot.
#[derive(Clone, Copy)]
pub struct Entries {
    cur: *const Node,
}

impl Iterator for Entries {
    // Nodes are never unlinked or freed, so the borrow genuinely lives as
    // long as the process.
    type Item = &'static [Rebinding];

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur.is_null() {
            return None;
        }
        let node = unsafe { &*self.cur };
        self.cur = node.next;
        Some(&node.rebindings)
    }
}

unsafe impl Send for Entries {}
unsafe impl Sync for Entries {}
