//! Per-allocation bookkeeping entries.

use std::alloc::{self, Layout};
use std::fmt;

/// Per-allocation destructor, invoked with the region address immediately
/// before the collector releases the region.
///
/// A finalizer must not re-enter the collector: no allocation, no
/// rooting, no freeing of other managed pointers. The sweep may be
/// iterating the very chain such a call would touch.
pub type Finalizer = Box<dyn FnMut(*mut u8)>;

/// Tag bits. An allocation can be a ROOT (never collected automatically)
/// and, during a cycle, carry MARK (reached by the current scan).
pub(crate) mod tag {
    pub const NONE: u8 = 0x0;
    pub const ROOT: u8 = 0x1;
    pub const MARK: u8 = 0x2;
}

/// Bookkeeping entry for one managed region.
///
/// The entry is associated with — but does not own — the client region at
/// `ptr`; the registry decides when that region is released and runs the
/// finalizer just before.
pub struct Allocation {
    /// Address of the client region. Never zero after construction.
    pub(crate) ptr: usize,
    /// Byte length of the client region.
    pub(crate) size: usize,
    /// ROOT / MARK tag bits.
    pub(crate) tag: u8,
    /// Optional destructor.
    pub(crate) finalizer: Option<Finalizer>,
    /// Separate chaining link.
    pub(crate) next: Option<Box<Allocation>>,
}

#[cfg(test)]
thread_local! {
    /// Test seam: number of upcoming node allocations forced to fail,
    /// standing in for system-allocator exhaustion.
    static FAIL_NODE_ALLOCS: std::cell::Cell<u32> = const { std::cell::Cell::new(0) };
}

/// Force the next `count` node allocations on this thread to fail.
#[cfg(test)]
pub(crate) fn fail_next_node_allocs(count: u32) {
    FAIL_NODE_ALLOCS.with(|fail| fail.set(count));
}

/// Raw node memory, or null when the system allocator refuses.
fn node_alloc() -> *mut Allocation {
    #[cfg(test)]
    {
        let forced = FAIL_NODE_ALLOCS.with(|fail| {
            let remaining = fail.get();
            if remaining > 0 {
                fail.set(remaining - 1);
                true
            } else {
                false
            }
        });
        if forced {
            return std::ptr::null_mut();
        }
    }
    let layout = Layout::new::<Allocation>();
    (unsafe { alloc::alloc(layout) }) as *mut Allocation
}

impl Allocation {
    /// Fallible construction: the node is carved out of the system
    /// allocator by hand so that bookkeeping exhaustion surfaces as
    /// `None` instead of an abort inside `handle_alloc_error`. The record
    /// starts with no finalizer; callers install one only once the node
    /// exists, so a failed allocation leaves their finalizer untouched.
    pub(crate) fn try_new(ptr: usize, size: usize) -> Option<Box<Allocation>> {
        let raw = node_alloc();
        if raw.is_null() {
            return None;
        }
        // SAFETY: raw is non-null, properly aligned for Allocation, and
        // uninitialized.
        unsafe {
            raw.write(Allocation {
                ptr,
                size,
                tag: tag::NONE,
                finalizer: None,
                next: None,
            });
            Some(Box::from_raw(raw))
        }
    }

    /// Address of the client region.
    pub fn ptr(&self) -> usize {
        self.ptr
    }

    /// Byte length of the client region.
    pub fn size(&self) -> usize {
        self.size
    }

    /// True when the allocation is tagged as a root.
    pub fn is_root(&self) -> bool {
        self.tag & tag::ROOT != 0
    }

    /// True when the allocation carries a finalizer.
    pub fn has_finalizer(&self) -> bool {
        self.finalizer.is_some()
    }

    pub(crate) fn is_marked(&self) -> bool {
        self.tag & tag::MARK != 0
    }

    pub(crate) fn set_marked(&mut self) {
        self.tag |= tag::MARK;
    }

    pub(crate) fn clear_marked(&mut self) {
        self.tag &= !tag::MARK;
    }

    pub(crate) fn set_root(&mut self) {
        self.tag |= tag::ROOT;
    }

    pub(crate) fn clear_root(&mut self) {
        self.tag &= !tag::ROOT;
    }
}

impl fmt::Debug for Allocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocation")
            .field("ptr", &(self.ptr as *const u8))
            .field("size", &self.size)
            .field("root", &self.is_root())
            .field("marked", &self.is_marked())
            .field("finalizer", &self.finalizer.is_some())
            .finish()
    }
}
