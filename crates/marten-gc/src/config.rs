//! Collector tuning knobs.

/// Default starting bucket count.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;
/// Default floor on the bucket count.
pub const DEFAULT_MIN_CAPACITY: usize = 1024;
/// Default load factor below which the registry halves its capacity.
pub const DEFAULT_DOWNSIZE_FACTOR: f64 = 0.2;
/// Default load factor above which the registry doubles its capacity.
pub const DEFAULT_UPSIZE_FACTOR: f64 = 0.8;
/// Default fraction of the free-slot budget consumed between collections.
pub const DEFAULT_SWEEP_FACTOR: f64 = 0.5;

/// Collector configuration
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Starting bucket count (raised to `min_capacity` if smaller)
    pub initial_capacity: usize,
    /// Floor on the bucket count; downsizing stops here
    pub min_capacity: usize,
    /// Load factor below which capacity is halved (default: 0.2)
    pub downsize_factor: f64,
    /// Load factor above which capacity is doubled (default: 0.8)
    pub upsize_factor: f64,
    /// Fraction of the remaining free slots consumed before the next
    /// automatic collection (default: 0.5)
    pub sweep_factor: f64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            min_capacity: DEFAULT_MIN_CAPACITY,
            downsize_factor: DEFAULT_DOWNSIZE_FACTOR,
            upsize_factor: DEFAULT_UPSIZE_FACTOR,
            sweep_factor: DEFAULT_SWEEP_FACTOR,
        }
    }
}

impl GcConfig {
    /// Non-positive factors fall back to their defaults; the initial
    /// capacity is raised to the configured floor.
    pub(crate) fn normalized(&self) -> GcConfig {
        fn or_default(factor: f64, default: f64) -> f64 {
            if factor > 0.0 { factor } else { default }
        }
        GcConfig {
            initial_capacity: self.initial_capacity.max(self.min_capacity),
            min_capacity: self.min_capacity,
            downsize_factor: or_default(self.downsize_factor, DEFAULT_DOWNSIZE_FACTOR),
            upsize_factor: or_default(self.upsize_factor, DEFAULT_UPSIZE_FACTOR),
            sweep_factor: or_default(self.sweep_factor, DEFAULT_SWEEP_FACTOR),
        }
    }
}
