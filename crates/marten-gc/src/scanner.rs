//! Conservative mark phase.
//!
//! A collection cycle marks in three steps: rooted records, callee-saved
//! registers spilled into the mark frame, and every aligned word of the
//! machine stack between the walk frame and the recorded bottom of stack.
//! Any value that matches a managed region address marks that region,
//! whose contents are then scanned for further candidates.

use crate::registry::AllocationRegistry;
use crate::stack;

const WORD: usize = std::mem::size_of::<usize>();

/// Run the full mark phase against `registry`, scanning the stack up to
/// (and including) the word at `bos`.
pub(crate) fn mark(registry: &mut AllocationRegistry, bos: usize) {
    mark_roots(registry);

    // Callee-saved registers land in this frame, which sits between the
    // walk frame and the BOS, so the walk observes them.
    let spilled = stack::capture_callee_saved();

    // Entering the walk through a volatile load keeps the compiler from
    // proving anything about what the walk can reach.
    let walk: fn(&mut AllocationRegistry, usize) = mark_stack;
    // SAFETY: reading a plain fn pointer from an initialized local.
    let walk = unsafe { std::ptr::read_volatile(&walk) };
    walk(registry, bos);

    std::hint::black_box(&spilled);
}

/// Every ROOT-tagged record is treated as reachable, pointer tracing
/// aside.
fn mark_roots(registry: &mut AllocationRegistry) {
    for root in registry.rooted() {
        #[cfg(feature = "gc_logging")]
        tracing::debug!(target: "marten::gc", ptr = root, "marking root");
        mark_from(registry, root);
    }
}

/// Walk the aligned words of the stack between this frame and `bos`
/// (inclusive), feeding each one to the conservative marker. The growth
/// direction is discovered by comparing the two ends; the walk always
/// proceeds from the lower address up.
#[inline(never)]
fn mark_stack(registry: &mut AllocationRegistry, bos: usize) {
    let tos = stack::approximate_tos();
    let (lo, hi) = if tos <= bos { (tos, bos) } else { (bos, tos) };
    let mut slot = (lo + WORD - 1) & !(WORD - 1);
    while slot <= hi {
        // SAFETY: every aligned word between a live local and the
        // recorded BOS is readable stack memory of this thread; volatile
        // reads keep the walk from being reasoned about as ordinary
        // accesses to unrelated locals.
        let candidate = unsafe { std::ptr::read_volatile(slot as *const usize) };
        mark_from(registry, candidate);
        slot += WORD;
    }
}

/// Transitive conservative marking from one candidate pointer value.
///
/// Worklist-driven; the MARK bit doubles as the visited set, so each
/// region is scanned at most once per cycle and depth is bounded by the
/// number of live records rather than the native stack.
fn mark_from(registry: &mut AllocationRegistry, candidate: usize) {
    let mut pending: Vec<(usize, usize)> = Vec::new();
    if let Some(region) = registry.mark_record(candidate) {
        pending.push(region);
    }
    while let Some((ptr, size)) = pending.pop() {
        if size < WORD {
            continue;
        }
        // Byte granularity catches pointers stored at unaligned offsets.
        // Offsets closer than one word to the end cannot hold a whole
        // pointer, so the scan stops there rather than read past the
        // region; a properly stored pointer always lies fully inside.
        for offset in 0..=(size - WORD) {
            // SAFETY: ptr..ptr+size is a live managed region and the read
            // stays inside it.
            let value = unsafe { std::ptr::read_unaligned((ptr + offset) as *const usize) };
            if let Some(region) = registry.mark_record(value) {
                pending.push(region);
            }
        }
    }
}
