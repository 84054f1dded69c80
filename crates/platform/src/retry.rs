//! Bounded retry policy
//!
//! Every place that waits on hardware (a ready line after reset, a
//! self-clearing register bit, a device that has to acknowledge a cancel)
//! gets a [`RetryPolicy`]: a maximum number of retries plus the delay
//! between attempts. The policy is a value, so it can be stored in a
//! `const` and reused; each wait takes a fresh [`RetryBudget`] from it.

use embedded_hal_async::delay::DelayNs;

/// Maximum retries plus the pause between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt fails
    pub max_attempts: u16,
    /// Pause before each retry in microseconds (0 = back-to-back)
    pub interval_us: u32,
}

impl RetryPolicy {
    /// Policy with a fixed delay between attempts.
    pub const fn new(max_attempts: u16, interval_us: u32) -> Self {
        Self {
            max_attempts,
            interval_us,
        }
    }

    /// Policy without delay, for loops that are paced by other work.
    pub const fn immediate(max_attempts: u16) -> Self {
        Self::new(max_attempts, 0)
    }

    /// Worst-case time spent sleeping, in microseconds.
    pub const fn worst_case_us(&self) -> u64 {
        (self.max_attempts as u64).saturating_mul(self.interval_us as u64)
    }

    /// Fresh budget for one wait.
    pub const fn budget(&self) -> RetryBudget {
        RetryBudget {
            limit: self.max_attempts,
            remaining: self.max_attempts,
        }
    }

    /// Poll `ready` until it returns `true`, sleeping `interval_us` between
    /// attempts. Returns the number of retries that were needed.
    pub async fn poll_until<D, F>(&self, delay: &mut D, mut ready: F) -> Result<u16, RetryExhausted>
    where
        D: DelayNs,
        F: FnMut() -> bool,
    {
        let mut budget = self.budget();
        loop {
            if ready() {
                return Ok(budget.used());
            }
            if !budget.try_consume() {
                return Err(RetryExhausted {
                    attempts: budget.used(),
                });
            }
            if self.interval_us > 0 {
                delay.delay_us(self.interval_us).await;
            }
        }
    }
}

/// Retries left in one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryBudget {
    limit: u16,
    remaining: u16,
}

impl RetryBudget {
    /// Take one retry. Returns `false` once the budget is spent.
    pub fn try_consume(&mut self) -> bool {
        match self.remaining.checked_sub(1) {
            Some(left) => {
                self.remaining = left;
                true
            }
            None => false,
        }
    }

    /// Retries still available.
    pub const fn remaining(&self) -> u16 {
        self.remaining
    }

    /// Retries taken so far.
    pub const fn used(&self) -> u16 {
        self.limit.saturating_sub(self.remaining)
    }

    /// Whether no retries are left.
    pub const fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}

/// A bounded wait ran out of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RetryExhausted {
    /// Retries made before giving up
    pub attempts: u16,
}

impl core::fmt::Display for RetryExhausted {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "condition not met after {} retries", self.attempts)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RetryExhausted {}
