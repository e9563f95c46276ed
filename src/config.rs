/// Configuration shared by the ring-based queues.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Ring size as a power of 2 (default: 16 = 64K cells)
    pub ring_bits: u8,
    /// Maximum number of producers for the sharded queue
    pub max_producers: usize,
    /// Enable traffic metrics collection (slight overhead)
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    ///
    /// # Panics
    ///
    /// Panics if `ring_bits` is 0 or greater than 20 (1M cells max), or if
    /// `max_producers` is 0 or greater than 128.
    pub const fn new(ring_bits: u8, max_producers: usize, enable_metrics: bool) -> Self {
        assert!(
            ring_bits > 0 && ring_bits <= 20,
            "ring_bits must be between 1 and 20 (max 1M cells)"
        );
        assert!(
            max_producers > 0 && max_producers <= 128,
            "max_producers must be between 1 and 128"
        );

        Self {
            ring_bits,
            max_producers,
            enable_metrics,
        }
    }

    /// Returns the number of cells in the ring.
    #[inline]
    pub const fn cells(&self) -> usize {
        1 << self.ring_bits
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.cells() - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ring_bits: 16, // 64K cells
            max_producers: 16,
            enable_metrics: false,
        }
    }
}

/// Low latency configuration (4K cells, fits in L1 cache)
pub const LOW_LATENCY_CONFIG: Config = Config::new(12, 16, false);

/// High throughput configuration (256K cells, 32 max producers)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(18, 32, false);

/// Configuration for the reorderer.
#[derive(Debug, Clone, Copy)]
pub struct ReorderConfig {
    /// Fast staging buffer size as a power of 2.
    ///
    /// The fast buffer absorbs light reordering without allocation; sequences
    /// colliding on a slot spill into the overflow map.
    ///
    /// Default: 10 (1024 slots)
    pub fast_slot_bits: u8,
    /// Output ring size as a power of 2. Sized to hold at least a full fast
    /// buffer worth of messages so one drain burst cannot wedge on its own
    /// output.
    ///
    /// Default: 12 (4096 cells)
    pub output_bits: u8,
    /// Whether to spawn the reorder worker at construction. When false the
    /// reorderer is inert and `get_next` never yields anything.
    pub enabled: bool,
}

impl Default for ReorderConfig {
    fn default() -> Self {
        Self {
            fast_slot_bits: 10,
            output_bits: 12,
            enabled: true,
        }
    }
}

impl ReorderConfig {
    /// Returns the number of fast buffer slots.
    #[inline]
    pub const fn fast_slots(&self) -> usize {
        1 << self.fast_slot_bits
    }

    /// Sets the fast buffer size.
    pub fn with_fast_slot_bits(mut self, bits: u8) -> Self {
        self.fast_slot_bits = bits;
        self
    }

    /// Sets the output ring size.
    pub fn with_output_bits(mut self, bits: u8) -> Self {
        self.output_bits = bits;
        self
    }

    /// Enables or disables the worker thread.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_cells_and_mask() {
        let config = Config::new(3, 4, false);
        assert_eq!(config.cells(), 8);
        assert_eq!(config.mask(), 7);
    }

    #[test]
    #[should_panic(expected = "ring_bits")]
    fn test_config_rejects_zero_bits() {
        let _ = Config::new(0, 4, false);
    }

    #[test]
    #[should_panic(expected = "max_producers")]
    fn test_config_rejects_zero_producers() {
        let _ = Config::new(4, 0, false);
    }

    #[test]
    fn test_reorder_config_builders() {
        let config = ReorderConfig::default()
            .with_fast_slot_bits(4)
            .with_output_bits(6)
            .with_enabled(false);
        assert_eq!(config.fast_slots(), 16);
        assert_eq!(config.output_bits, 6);
        assert!(!config.enabled);
    }
}
