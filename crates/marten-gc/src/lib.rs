//! # Marten GC
//!
//! Conservative, stop-the-world, mark-and-sweep garbage collector, usable
//! as a drop-in replacement for manual heap allocation in a host program.
//!
//! ## Design
//!
//! - **Address-keyed registry**: every managed region is tracked in an
//!   open-hashed, separately chained, prime-sized table keyed by raw
//!   address, with load-factor driven resizing
//! - **Conservative marking**: rooted records, spilled callee-saved
//!   registers, the machine stack between top-of-stack and a recorded
//!   bottom-of-stack, and region contents are all scanned for anything
//!   that matches a managed address
//! - **Stop-the-world**: collection runs synchronously on the mutator's
//!   thread, on demand or when the registry crosses its sweep limit
//! - **Finalizers**: optional per-allocation callbacks run during sweep,
//!   immediately before a region is released
//!
//! ## Usage
//!
//! ```no_run
//! use marten_gc::Collector;
//!
//! let stack_bottom = 0usize;
//! let mut gc = Collector::new(&stack_bottom as *const usize as *const u8);
//! let region = gc.malloc(64).expect("allocation");
//! gc.make_static(region.as_ptr());
//! gc.run();
//! gc.stop();
//! ```

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod collector;
pub mod config;
pub mod error;
mod heap;
pub mod primes;
pub mod record;
pub mod registry;
mod scanner;
mod stack;

pub use collector::{Collector, GcStats, bind_global, take_global, with_global};
pub use config::GcConfig;
pub use error::GcError;
pub use record::{Allocation, Finalizer};
pub use registry::AllocationRegistry;
