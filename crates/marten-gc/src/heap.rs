//! Raw client regions from the system allocator.
//!
//! Every managed region is 8-byte aligned, which is what lets the
//! registry hash drop the three low address bits. The collector is the
//! sole releaser of a region but never reads or writes it outside of
//! mark, finalize, and free.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Alignment of every client region.
pub(crate) const ALIGN: usize = 8;

/// Zero-length requests still get a distinct, releasable region.
fn layout_for(size: usize) -> Option<Layout> {
    Layout::from_size_align(size.max(1), ALIGN).ok()
}

/// Uninitialized region of `size` bytes, or `None` when the system
/// allocator refuses.
pub(crate) fn alloc_uninit(size: usize) -> Option<NonNull<u8>> {
    let layout = layout_for(size)?;
    // SAFETY: layout has non-zero size.
    NonNull::new(unsafe { alloc::alloc(layout) })
}

/// Zero-initialized region of `size` bytes.
pub(crate) fn alloc_zeroed(size: usize) -> Option<NonNull<u8>> {
    let layout = layout_for(size)?;
    // SAFETY: layout has non-zero size.
    NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
}

/// Grow or shrink a region in place if possible. On failure the original
/// region is untouched and still valid.
///
/// # Safety
/// `ptr` must have been returned by this module for a request of
/// `old_size` bytes and not yet released.
pub(crate) unsafe fn realloc(
    ptr: NonNull<u8>,
    old_size: usize,
    new_size: usize,
) -> Option<NonNull<u8>> {
    let layout = layout_for(old_size)?;
    if new_size > isize::MAX as usize - (ALIGN - 1) {
        return None;
    }
    // SAFETY: the caller guarantees ptr/old_size; the new size is clamped
    // non-zero to mirror layout_for and checked against the allocator's
    // size ceiling above.
    NonNull::new(unsafe { alloc::realloc(ptr.as_ptr(), layout, new_size.max(1)) })
}

/// Return a region to the system allocator.
///
/// # Safety
/// `ptr` must have been returned by this module for a request of `size`
/// bytes and not yet released.
pub(crate) unsafe fn dealloc(ptr: NonNull<u8>, size: usize) {
    if let Some(layout) = layout_for(size) {
        // SAFETY: the caller guarantees ptr was allocated with this layout.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment() {
        let region = alloc_uninit(24).expect("allocation");
        assert_eq!(region.as_ptr() as usize % ALIGN, 0);
        unsafe { dealloc(region, 24) };
    }

    #[test]
    fn test_zeroed_region() {
        let region = alloc_zeroed(64).expect("allocation");
        for offset in 0..64 {
            assert_eq!(unsafe { region.as_ptr().add(offset).read() }, 0);
        }
        unsafe { dealloc(region, 64) };
    }

    #[test]
    fn test_zero_length_request() {
        let region = alloc_uninit(0).expect("allocation");
        unsafe { dealloc(region, 0) };
    }

    #[test]
    fn test_realloc_preserves_prefix() {
        let region = alloc_uninit(8).expect("allocation");
        unsafe { (region.as_ptr() as *mut u64).write(0xDEAD_BEEF) };
        let grown = unsafe { realloc(region, 8, 128) }.expect("reallocation");
        assert_eq!(unsafe { (grown.as_ptr() as *const u64).read() }, 0xDEAD_BEEF);
        unsafe { dealloc(grown, 128) };
    }
}
