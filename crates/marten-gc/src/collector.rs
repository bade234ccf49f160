//! Collector façade.
//!
//! [`Collector`] owns the allocation registry and the bottom-of-stack
//! recorded at start, and exposes the allocation API. Collection is
//! stop-the-world on the mutator's thread: callers must assume every
//! allocation is a potential collection point.

use std::cell::RefCell;
use std::ffi::CStr;
use std::ptr::NonNull;
use std::time::Instant;

use crate::config::GcConfig;
use crate::error::GcError;
use crate::heap;
use crate::record::Finalizer;
use crate::registry::AllocationRegistry;
use crate::scanner;

/// Collection statistics
#[derive(Debug, Default, Clone)]
pub struct GcStats {
    /// Number of completed collections
    pub collections: u64,
    /// Total time spent collecting (nanoseconds)
    pub total_time_ns: u64,
    /// Bytes reclaimed by the last collection
    pub last_reclaimed: usize,
    /// Bytes reclaimed over the collector's lifetime
    pub total_reclaimed: usize,
}

/// Conservative stop-the-world mark-and-sweep collector.
///
/// One collector serves one mutator thread. Multiple collectors are
/// independent; no address may be registered with more than one at a
/// time.
pub struct Collector {
    registry: AllocationRegistry,
    /// Inclusive far end of the stack region scanned during mark.
    bos: usize,
    /// While paused, automatic collections are suppressed; explicit
    /// [`Collector::run`] still works.
    paused: bool,
    stats: GcStats,
}

impl Collector {
    /// Start a collector with default tuning.
    ///
    /// `bos` must be the address of a local variable in a stack frame
    /// that outlives every frame allocating through this collector —
    /// typically the program's entry routine, which should also be the
    /// frame that calls [`Collector::stop`]. Violating this makes the
    /// stack scan unsound.
    pub fn new(bos: *const u8) -> Self {
        Self::with_config(bos, GcConfig::default())
    }

    /// Start a collector with explicit tuning. Non-positive factors fall
    /// back to their defaults and `initial_capacity` is raised to
    /// `min_capacity` if smaller.
    pub fn with_config(bos: *const u8, config: GcConfig) -> Self {
        let collector = Self {
            registry: AllocationRegistry::new(&config),
            bos: bos as usize,
            paused: false,
            stats: GcStats::default(),
        };
        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "marten::gc",
            capacity = collector.registry.capacity(),
            bos = collector.bos,
            "started collector"
        );
        collector
    }

    /// Allocation path shared by malloc and calloc: `count == 0` is the
    /// uninitialized single-region form, a nonzero `count` the
    /// zero-initialized array form.
    fn allocate(
        &mut self,
        count: usize,
        size: usize,
        finalizer: Option<Finalizer>,
    ) -> Result<NonNull<u8>, GcError> {
        let (length, zeroed) = if count == 0 {
            (size, false)
        } else {
            (count.checked_mul(size).ok_or(GcError::OutOfMemory)?, true)
        };
        let grab = |length| {
            if zeroed {
                heap::alloc_zeroed(length)
            } else {
                heap::alloc_uninit(length)
            }
        };

        let mut region = grab(length);
        if region.is_none() && !self.paused {
            // Allocator pressure: collect once and retry.
            self.run();
            region = grab(length);
        }
        let region = region.ok_or(GcError::OutOfMemory)?;
        let ptr = region.as_ptr() as usize;

        let mut finalizer = finalizer;
        match self.registry.put(ptr, length, &mut finalizer) {
            Ok(()) => {
                // Routine self-trigger: collect once the free-slot budget
                // is spent.
                if !self.paused && self.registry.len() > self.registry.sweep_limit() {
                    let _freed = self.run();
                    #[cfg(feature = "gc_logging")]
                    tracing::debug!(
                        target: "marten::gc",
                        freed_bytes = _freed,
                        "sweep limit crossed, collected"
                    );
                }
            }
            Err(_) => {
                // Metadata pressure: collect once, retry, then fail
                // cleanly by giving the fresh region back.
                if !self.paused {
                    self.run();
                }
                if self.paused || self.registry.put(ptr, length, &mut finalizer).is_err() {
                    #[cfg(feature = "gc_logging")]
                    tracing::error!(
                        target: "marten::gc",
                        size = length,
                        "allocation metadata exhausted"
                    );
                    // SAFETY: the region came from heap above and was
                    // never registered.
                    unsafe { heap::dealloc(region, length) };
                    return Err(GcError::MetadataExhausted);
                }
            }
        }
        Ok(region)
    }

    /// Uninitialized managed allocation of `size` bytes.
    pub fn malloc(&mut self, size: usize) -> Result<NonNull<u8>, GcError> {
        self.allocate(0, size, None)
    }

    /// Uninitialized managed allocation with a finalizer.
    pub fn malloc_ext(&mut self, size: usize, finalizer: Finalizer) -> Result<NonNull<u8>, GcError> {
        self.allocate(0, size, Some(finalizer))
    }

    /// Zero-initialized managed allocation of `count * size` bytes.
    /// `count == 0` degenerates to an uninitialized region of `size`
    /// bytes.
    pub fn calloc(&mut self, count: usize, size: usize) -> Result<NonNull<u8>, GcError> {
        self.allocate(count, size, None)
    }

    /// Zero-initialized managed allocation with a finalizer.
    pub fn calloc_ext(
        &mut self,
        count: usize,
        size: usize,
        finalizer: Finalizer,
    ) -> Result<NonNull<u8>, GcError> {
        self.allocate(count, size, Some(finalizer))
    }

    /// Resize the managed region at `p` to `new_size` bytes.
    ///
    /// A null `p` acts as a fresh, finalizer-less allocation. A non-null
    /// `p` the collector does not manage is an error and no memory is
    /// touched. On allocator failure the old region and its record stay
    /// intact. If the region moves, the record follows it to the new
    /// address and keeps its finalizer.
    pub fn realloc(&mut self, p: *mut u8, new_size: usize) -> Result<NonNull<u8>, GcError> {
        let Some(old_region) = NonNull::new(p) else {
            let region = heap::alloc_uninit(new_size).ok_or(GcError::OutOfMemory)?;
            let mut finalizer = None;
            if self
                .registry
                .put(region.as_ptr() as usize, new_size, &mut finalizer)
                .is_err()
            {
                // SAFETY: fresh region, never registered.
                unsafe { heap::dealloc(region, new_size) };
                return Err(GcError::MetadataExhausted);
            }
            return Ok(region);
        };

        let addr = old_region.as_ptr() as usize;
        let old_size = match self.registry.get(addr) {
            Some(record) => record.size(),
            None => return Err(GcError::InvalidPointer),
        };

        // SAFETY: addr is registered as a managed region of old_size
        // bytes; on failure the region is untouched.
        let new_region = unsafe { heap::realloc(old_region, old_size, new_size) }
            .ok_or(GcError::OutOfMemory)?;
        let new_addr = new_region.as_ptr() as usize;

        if new_addr == addr {
            if let Some(record) = self.registry.get_mut(addr) {
                record.size = new_size;
            }
        } else {
            // The region moved: re-home the record under the new address,
            // carrying the original finalizer over.
            let mut finalizer = self
                .registry
                .remove(addr)
                .and_then(|mut dead| dead.finalizer.take());
            if self.registry.put(new_addr, new_size, &mut finalizer).is_err() {
                #[cfg(feature = "gc_logging")]
                tracing::error!(
                    target: "marten::gc",
                    ptr = new_addr,
                    "lost bookkeeping for moved region"
                );
                return Err(GcError::MetadataExhausted);
            }
        }
        Ok(new_region)
    }

    /// Explicitly release the managed region at `p`: finalizer first,
    /// then the region, then the bookkeeping. Unknown pointers are logged
    /// at warning and ignored.
    pub fn free(&mut self, p: *mut u8) {
        match self.registry.remove(p as usize) {
            Some(mut record) => {
                if let Some(finalizer) = record.finalizer.as_mut() {
                    finalizer(p);
                }
                if let Some(region) = NonNull::new(p) {
                    // SAFETY: the region was handed out by this collector
                    // for a request of record.size bytes.
                    unsafe { heap::dealloc(region, record.size) };
                }
            }
            None => {
                #[cfg(feature = "gc_logging")]
                tracing::warn!(
                    target: "marten::gc",
                    ptr = p as usize,
                    "ignoring request to free unknown pointer"
                );
            }
        }
    }

    /// Tag the allocation at `p` as a root: it is treated as always
    /// reachable until untagged. Unknown pointers are silently ignored.
    pub fn make_static(&mut self, p: *mut u8) {
        if let Some(record) = self.registry.get_mut(p as usize) {
            record.set_root();
        }
    }

    /// Clear the root tag on the allocation at `p`. Unknown pointers are
    /// silently ignored.
    pub fn unmake_static(&mut self, p: *mut u8) {
        if let Some(record) = self.registry.get_mut(p as usize) {
            record.clear_root();
        }
    }

    /// Managed copy of a C string, nul terminator included.
    pub fn strdup(&mut self, s: &CStr) -> Result<NonNull<u8>, GcError> {
        let bytes = s.to_bytes_with_nul();
        let region = self.malloc(bytes.len())?;
        // SAFETY: the fresh region is bytes.len() long and does not
        // overlap the source.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), region.as_ptr(), bytes.len());
        }
        Ok(region)
    }

    /// Force a full mark-and-sweep cycle. Returns the bytes freed.
    pub fn run(&mut self) -> usize {
        let start = Instant::now();
        scanner::mark(&mut self.registry, self.bos);
        let freed = self.registry.sweep();

        let elapsed_ns = start.elapsed().as_nanos() as u64;
        self.stats.collections += 1;
        self.stats.total_time_ns += elapsed_ns;
        self.stats.last_reclaimed = freed;
        self.stats.total_reclaimed += freed;
        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "marten::gc",
            collection = self.stats.collections,
            reclaimed_bytes = freed,
            pause_us = elapsed_ns / 1_000,
            live = self.registry.len(),
            "collection complete"
        );
        freed
    }

    /// Suppress automatic collections. Allocation keeps working; the
    /// sweep-limit trigger and the collect-and-retry recoveries are
    /// skipped until [`Collector::resume`].
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Re-enable automatic collections.
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// True while automatic collections are suppressed.
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Run a final collection, then tear down the bookkeeping. Returns
    /// the bytes freed by the final collection.
    ///
    /// Client regions that are still reachable are NOT freed here — stop
    /// releases the collector's own memory only. For a leak-free
    /// shutdown, unroot all statics and [`Collector::run`] first.
    pub fn stop(mut self) -> usize {
        self.run()
    }

    /// Number of live managed allocations.
    pub fn allocation_count(&self) -> usize {
        self.registry.len()
    }

    /// True when `p` is the address of a managed region.
    pub fn managed(&self, p: *mut u8) -> bool {
        self.registry.contains(p as usize)
    }

    /// Byte length of the managed region at `p`, if any.
    pub fn size_of(&self, p: *mut u8) -> Option<usize> {
        self.registry.get(p as usize).map(|record| record.size())
    }

    /// True when the allocation at `p` is tagged as a root.
    pub fn is_root(&self, p: *mut u8) -> bool {
        self.registry
            .get(p as usize)
            .is_some_and(|record| record.is_root())
    }

    /// Current registry bucket count.
    pub fn capacity(&self) -> usize {
        self.registry.capacity()
    }

    /// Collection statistics so far.
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }
}

thread_local! {
    /// Optional ambient collector, for programs that want a single
    /// bind-once instance. Thread-local because a collector is confined
    /// to its mutator thread.
    static GLOBAL: RefCell<Option<Collector>> = const { RefCell::new(None) };
}

/// Bind `collector` as this thread's ambient instance, replacing (and
/// dropping the bookkeeping of) any previous one.
pub fn bind_global(collector: Collector) {
    GLOBAL.with(|global| *global.borrow_mut() = Some(collector));
}

/// Run `f` against the ambient collector. Returns `None` when no
/// collector is bound on this thread.
pub fn with_global<R>(f: impl FnOnce(&mut Collector) -> R) -> Option<R> {
    GLOBAL.with(|global| global.borrow_mut().as_mut().map(f))
}

/// Unbind and return this thread's ambient collector, typically to
/// [`Collector::stop`] it.
pub fn take_global() -> Option<Collector> {
    GLOBAL.with(|global| global.borrow_mut().take())
}
