//! How long a broken display list waits before it is rebuilt.
//!
//! The delay is counted in uncached renders. Rebuilding right after every
//! change would compile a new list each frame for a field that animates, so
//! a list is only rebuilt once its inputs have been quiet for a while.

/// Strategy deciding the rebuild delay of display lists.
pub trait CacheDelayPolicy: Send + Sync + 'static {
    /// Delay of a list that was never built.
    fn initial_delay(&self) -> u32;

    /// Delay after a break. `breaks_since_build` counts the breaks since
    /// the list was last built successfully, including this one.
    fn delay_after_break(&self, breaks_since_build: u32) -> u32;
}

/// The same delay after every break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay(pub u32);

impl Default for FixedDelay {
    fn default() -> Self {
        FixedDelay(3)
    }
}

impl CacheDelayPolicy for FixedDelay {
    fn initial_delay(&self) -> u32 {
        self.0
    }

    fn delay_after_break(&self, _breaks_since_build: u32) -> u32 {
        self.0
    }
}

/// Doubles the delay each time a list breaks again before it could be
/// rebuilt, up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptiveDelay {
    pub base: u32,
    pub max: u32,
}

impl CacheDelayPolicy for AdaptiveDelay {
    fn initial_delay(&self) -> u32 {
        self.base.min(self.max)
    }

    fn delay_after_break(&self, breaks_since_build: u32) -> u32 {
        let doublings = breaks_since_build.saturating_sub(1).min(31);
        self.base.saturating_mul(1 << doublings).min(self.max)
    }
}
