//! Collector correctness tests
//!
//! End-to-end scenarios against the public API: conservative retention,
//! transitive marking through in-heap pointers, finalizer dispatch, and
//! registry growth under load.

use marten_gc::{Collector, GcConfig, GcError};

/// Disguise for pointer values a test must remember without keeping a
/// live word the conservative scan would treat as a reference.
const MASK: usize = 0x5555_5555_5555_5555;

/// Overwrite the stack region dead helper frames occupied, so stale
/// copies of managed addresses cannot keep garbage alive.
#[inline(never)]
fn clobber_stack() {
    let mut scratch = [0usize; 512];
    for slot in scratch.iter_mut() {
        unsafe { std::ptr::write_volatile(slot, 0) };
    }
    std::hint::black_box(&scratch);
}

#[inline(never)]
fn check_managed(gc: &Collector, disguised: usize) -> bool {
    gc.managed((disguised ^ MASK) as *mut u8)
}

/// Test bodies run in a frame strictly deeper than the BOS anchor, so
/// every local they hold sits inside the scanned stack range.
macro_rules! bos_test {
    ($name:ident, $body:ident) => {
        #[test]
        fn $name() {
            let bos_anchor = 0usize;
            $body(&bos_anchor as *const usize as *const u8);
        }
    };
}

bos_test!(test_linked_chain_survives_through_root, chain_body);
#[inline(never)]
fn chain_body(bos: *const u8) {
    const NODES: usize = 20;
    const NODE_SIZE: usize = 16;

    /// Builds head -> node -> ... -> tail, roots the head, and returns
    /// its disguised address.
    #[inline(never)]
    fn build_chain(gc: &mut Collector) -> usize {
        let mut next = 0usize;
        let mut head = std::ptr::null_mut();
        for _ in 0..NODES {
            let node = gc.calloc(1, NODE_SIZE).expect("allocation");
            unsafe { (node.as_ptr() as *mut usize).write(next) };
            next = node.as_ptr() as usize;
            head = node.as_ptr();
        }
        gc.make_static(head);
        head as usize ^ MASK
    }

    let mut gc = Collector::new(bos);
    let disguised_head = build_chain(&mut gc);
    clobber_stack();

    // Only the head is rooted; the rest hangs off it.
    let freed = gc.run();
    assert_eq!(freed, 0);
    assert_eq!(gc.allocation_count(), NODES);

    #[inline(never)]
    fn unroot(gc: &mut Collector, disguised: usize) {
        gc.unmake_static((disguised ^ MASK) as *mut u8);
    }
    unroot(&mut gc, disguised_head);
    clobber_stack();

    let freed = gc.run();
    assert_eq!(freed, NODES * NODE_SIZE);
    assert_eq!(gc.allocation_count(), 0);
    assert!(!check_managed(&gc, disguised_head));
    gc.stop();
}

bos_test!(test_registry_grows_under_load, growth_body);
#[inline(never)]
fn growth_body(bos: *const u8) {
    fn is_prime(n: usize) -> bool {
        if n < 2 {
            return false;
        }
        (2..n).take_while(|d| d * d <= n).all(|d| n % d != 0)
    }

    let config = GcConfig {
        initial_capacity: 5,
        min_capacity: 5,
        ..GcConfig::default()
    };
    let mut gc = Collector::with_config(bos, config);
    let initial_capacity = gc.capacity();

    let mut regions = Vec::new();
    for _ in 0..200 {
        let region = gc.calloc(1, 8).expect("allocation");
        gc.make_static(region.as_ptr());
        regions.push(region);
    }

    assert_eq!(gc.allocation_count(), 200);
    assert!(gc.capacity() > initial_capacity);
    assert!(is_prime(gc.capacity()));

    // Every pointer is still retrievable after the upsizes.
    for region in &regions {
        assert!(gc.managed(region.as_ptr()));
        assert_eq!(gc.size_of(region.as_ptr()), Some(8));
    }

    // Rooted records survive a collection wholesale.
    let freed = gc.run();
    assert_eq!(freed, 0);
    assert_eq!(gc.allocation_count(), 200);
    gc.stop();
}

bos_test!(test_explicit_free_releases_and_forgets, explicit_free_body);
#[inline(never)]
fn explicit_free_body(bos: *const u8) {
    let mut gc = Collector::new(bos);
    let region = gc.malloc(48).expect("allocation");
    assert_eq!(gc.size_of(region.as_ptr()), Some(48));

    gc.free(region.as_ptr());
    assert!(!gc.managed(region.as_ptr()));
    assert_eq!(gc.allocation_count(), 0);

    // Freeing a pointer the collector never saw is ignored.
    let mut unrelated = 0u8;
    gc.free(&mut unrelated as *mut u8);
    gc.stop();
}

bos_test!(test_realloc_round_trip, realloc_body);
#[inline(never)]
fn realloc_body(bos: *const u8) {
    let mut gc = Collector::new(bos);

    // Growing from null behaves like a plain allocation.
    let mut region = gc.realloc(std::ptr::null_mut(), 8).expect("allocation");
    unsafe { (region.as_ptr() as *mut u64).write(0x0123_4567_89AB_CDEF) };

    // Repeated growth keeps the prefix and the registration current.
    for new_size in [32usize, 256, 4096] {
        region = gc.realloc(region.as_ptr(), new_size).expect("reallocation");
        assert_eq!(gc.size_of(region.as_ptr()), Some(new_size));
        assert_eq!(
            unsafe { (region.as_ptr() as *const u64).read() },
            0x0123_4567_89AB_CDEF
        );
    }
    assert_eq!(gc.allocation_count(), 1);

    // A foreign pointer is rejected without touching memory.
    let mut unrelated = 0u8;
    assert_eq!(
        gc.realloc(&mut unrelated as *mut u8, 16),
        Err(GcError::InvalidPointer)
    );
    gc.stop();
}

bos_test!(test_strdup_allocates_managed_copy, strdup_body);
#[inline(never)]
fn strdup_body(bos: *const u8) {
    let mut gc = Collector::new(bos);
    let copy = gc.strdup(c"stop the world").expect("allocation");

    assert!(gc.managed(copy.as_ptr()));
    assert_eq!(gc.size_of(copy.as_ptr()), Some(15));
    let bytes = unsafe { std::slice::from_raw_parts(copy.as_ptr(), 15) };
    assert_eq!(bytes, b"stop the world\0");
    gc.stop();
}

bos_test!(test_collectors_are_independent, independence_body);
#[inline(never)]
fn independence_body(bos: *const u8) {
    let mut first = Collector::new(bos);
    let mut second = Collector::new(bos);

    let region = first.malloc(16).expect("allocation");
    assert!(first.managed(region.as_ptr()));
    assert!(!second.managed(region.as_ptr()));

    // The other collector ignores a free of a pointer it never issued.
    second.free(region.as_ptr());
    assert!(first.managed(region.as_ptr()));

    second.stop();
    first.stop();
}

bos_test!(test_stop_reports_final_sweep, stop_body);
#[inline(never)]
fn stop_body(bos: *const u8) {
    #[inline(never)]
    fn allocate_garbage(gc: &mut Collector, size: usize) -> usize {
        let region = gc.malloc(size).expect("allocation");
        region.as_ptr() as usize ^ MASK
    }

    let mut gc = Collector::new(bos);
    let disguised = allocate_garbage(&mut gc, 128);
    clobber_stack();

    // The final collection inside stop sweeps what is unreachable.
    let freed = gc.stop();
    assert_eq!(freed, 128);
    std::hint::black_box(disguised);
}
