//! Table construction parameters and the growth policy.

use core::fmt;

/// Logging callback invoked with a description of a fatal
/// internal-consistency fault, right before the table panics.
pub type FaultHook = Box<dyn Fn(&str)>;

/// Errors returned when validating a [`TableConfig`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The bucket array must start with at least one bucket.
    #[error("initial capacity must be greater than zero")]
    ZeroCapacity,
    /// Occupied-bucket ratio threshold outside `(0, 1]`.
    #[error("max load factor must be in (0, 1], got {0}")]
    InvalidLoadFactor(f64),
    /// Average chain threshold that is not a positive finite number.
    #[error("max average chain length must be positive and finite, got {0}")]
    InvalidAverageChain(f64),
    /// A chain limit of zero would grow on every insert.
    #[error("max chain length must be greater than zero")]
    ZeroChainLength,
}

/// Thresholds that trigger a doubling of the bucket array.
///
/// Evaluated after every insert; growth happens when any threshold is
/// exceeded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthPolicy {
    /// Maximum fraction of non-empty buckets.
    pub max_load_factor: f64,
    /// Maximum records per non-empty bucket.
    pub max_average_chain: f64,
    /// Maximum length of any single chain.
    pub max_chain_length: usize,
}

impl Default for GrowthPolicy {
    fn default() -> Self {
        Self {
            max_load_factor: 0.8,
            max_average_chain: 5.0,
            max_chain_length: 10,
        }
    }
}

impl GrowthPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_load_factor(mut self, factor: f64) -> Self {
        self.max_load_factor = factor;
        self
    }

    pub fn with_max_average_chain(mut self, average: f64) -> Self {
        self.max_average_chain = average;
        self
    }

    pub fn with_max_chain_length(mut self, length: usize) -> Self {
        self.max_chain_length = length;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_load_factor > 0.0 && self.max_load_factor <= 1.0) {
            return Err(ConfigError::InvalidLoadFactor(self.max_load_factor));
        }
        if !(self.max_average_chain.is_finite() && self.max_average_chain > 0.0) {
            return Err(ConfigError::InvalidAverageChain(self.max_average_chain));
        }
        if self.max_chain_length == 0 {
            return Err(ConfigError::ZeroChainLength);
        }
        Ok(())
    }

    /// Whether a table in the given shape should double its capacity.
    pub fn should_grow(&self, used: usize, total: usize, max_chain: usize, capacity: usize) -> bool {
        if used == 0 || capacity == 0 {
            return false;
        }
        let occupied = used as f64 / capacity as f64;
        let average = total as f64 / used as f64;
        occupied > self.max_load_factor
            || average > self.max_average_chain
            || max_chain > self.max_chain_length
    }
}

/// Construction parameters for a [`PtrTable`](crate::PtrTable).
pub struct TableConfig {
    /// Number of buckets before the first resize.
    pub initial_capacity: usize,
    pub growth: GrowthPolicy,
    /// Reserved hint that callers coordinate through an external mutex.
    /// The table never locks.
    pub wait_on_mutex: bool,
    /// Called on the fatal path before panicking.
    pub fault_hook: Option<FaultHook>,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 64,
            growth: GrowthPolicy::default(),
            wait_on_mutex: false,
            fault_hook: None,
        }
    }
}

impl fmt::Debug for TableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableConfig")
            .field("initial_capacity", &self.initial_capacity)
            .field("growth", &self.growth)
            .field("wait_on_mutex", &self.wait_on_mutex)
            .field("fault_hook", &self.fault_hook.is_some())
            .finish()
    }
}

impl TableConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_growth(mut self, growth: GrowthPolicy) -> Self {
        self.growth = growth;
        self
    }

    pub fn with_wait_on_mutex(mut self, wait: bool) -> Self {
        self.wait_on_mutex = wait;
        self
    }

    pub fn with_fault_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + 'static,
    {
        self.fault_hook = Some(Box::new(hook));
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        self.growth.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(TableConfig::default().validate(), Ok(()));
        let g = GrowthPolicy::default();
        assert_eq!(g.max_load_factor, 0.8);
        assert_eq!(g.max_average_chain, 5.0);
        assert_eq!(g.max_chain_length, 10);
    }

    /// Invariant: each malformed parameter is reported by its own variant.
    #[test]
    fn invalid_parameters_are_rejected() {
        assert_eq!(
            TableConfig::new().with_initial_capacity(0).validate(),
            Err(ConfigError::ZeroCapacity)
        );
        assert_eq!(
            GrowthPolicy::new().with_max_load_factor(0.0).validate(),
            Err(ConfigError::InvalidLoadFactor(0.0))
        );
        assert_eq!(
            GrowthPolicy::new().with_max_load_factor(1.5).validate(),
            Err(ConfigError::InvalidLoadFactor(1.5))
        );
        assert!(matches!(
            GrowthPolicy::new()
                .with_max_load_factor(f64::NAN)
                .validate(),
            Err(ConfigError::InvalidLoadFactor(_))
        ));
        assert_eq!(
            GrowthPolicy::new().with_max_average_chain(-1.0).validate(),
            Err(ConfigError::InvalidAverageChain(-1.0))
        );
        assert!(matches!(
            GrowthPolicy::new()
                .with_max_average_chain(f64::INFINITY)
                .validate(),
            Err(ConfigError::InvalidAverageChain(_))
        ));
        assert_eq!(
            GrowthPolicy::new().with_max_chain_length(0).validate(),
            Err(ConfigError::ZeroChainLength)
        );
    }

    /// Invariant: growth fires when any single threshold is strictly exceeded.
    #[test]
    fn should_grow_thresholds() {
        let g = GrowthPolicy::default();
        // occupied ratio
        assert!(!g.should_grow(4, 4, 1, 5));
        assert!(g.should_grow(5, 5, 1, 5));
        assert!(!g.should_grow(3, 3, 1, 4));
        assert!(g.should_grow(4, 4, 1, 4));
        // average chain length
        assert!(!g.should_grow(2, 10, 5, 64));
        assert!(g.should_grow(2, 11, 6, 64));
        // longest chain
        assert!(!g.should_grow(8, 20, 10, 64));
        assert!(g.should_grow(8, 20, 11, 64));
        // empty table never grows
        assert!(!g.should_grow(0, 0, 0, 4));
    }

    #[test]
    fn debug_hides_hook_body() {
        let cfg = TableConfig::new().with_fault_hook(|_| {});
        let s = format!("{cfg:?}");
        assert!(s.contains("fault_hook: true"));
    }

    #[test]
    fn errors_render_messages() {
        assert_eq!(
            ConfigError::ZeroCapacity.to_string(),
            "initial capacity must be greater than zero"
        );
        assert_eq!(
            ConfigError::InvalidLoadFactor(2.0).to_string(),
            "max load factor must be in (0, 1], got 2"
        );
    }
}
