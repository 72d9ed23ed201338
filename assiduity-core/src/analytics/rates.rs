//! Attendance rate calculator
//!
//! A member's attendance rate is the share of their attendance records marked
//! present, in percent, rounded to two decimals. Members without any record
//! have a rate of 0.0.
//!
//! Rates are memoized in a [`RateCache`]. The cache is cleared wholesale by
//! [`RateCalculator::invalidate`]; [`crate::store::Registry`] calls it after
//! every member or attendance mutation.

use crate::error::Result;
use crate::store::AttendanceStore;
use crate::types::round2;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Anything that can answer "what is this member's attendance rate".
pub trait RateSource: Send + Sync {
    /// Rate in percent, `[0.0, 100.0]`. Unknown members yield 0.0.
    fn rate(&self, member_id: i64) -> f64;

    /// Like [`rate`](Self::rate), but reports a failed lookup instead of
    /// answering 0.0 for it.
    fn try_rate(&self, member_id: i64) -> Result<f64> {
        Ok(self.rate(member_id))
    }
}

/// Precomputed rates, e.g. for exports or tests.
impl RateSource for HashMap<i64, f64> {
    fn rate(&self, member_id: i64) -> f64 {
        self.get(&member_id).copied().unwrap_or(0.0)
    }
}

/// Member id → rate memo with a generation counter.
///
/// The generation is bumped on every [`RateCache::invalidate`]. A rate is only
/// stored if the generation is still the one observed before it was computed,
/// so a clear that races with a computation can never be undone by it.
#[derive(Debug, Default)]
pub struct RateCache {
    rates: RwLock<HashMap<i64, f64>>,
    generation: AtomicU64,
}

impl RateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation; changes on every invalidation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn get(&self, member_id: i64) -> Option<f64> {
        self.read().get(&member_id).copied()
    }

    /// Store `rate` unless the cache was invalidated since `observed`.
    ///
    /// Returns whether the value was stored.
    pub fn insert_if_current(&self, member_id: i64, rate: f64, observed: u64) -> bool {
        let mut rates = self.write();
        if self.generation.load(Ordering::Acquire) != observed {
            return false;
        }
        rates.insert(member_id, rate);
        true
    }

    /// Drop every cached rate.
    pub fn invalidate(&self) {
        let mut rates = self.write();
        rates.clear();
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // The map holds plain values, so a panic while locked cannot leave it
    // half-updated; keep serving it.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<i64, f64>> {
        self.rates.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i64, f64>> {
        self.rates.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Computes attendance rates from the store's counts, with memoization.
pub struct RateCalculator {
    store: Arc<dyn AttendanceStore>,
    cache: RateCache,
}

impl RateCalculator {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self {
            store,
            cache: RateCache::new(),
        }
    }

    /// Attendance rate of a member, from cache when fresh.
    ///
    /// Never fails: a store error degrades to 0.0 and is not cached.
    pub fn rate(&self, member_id: i64) -> f64 {
        self.try_rate(member_id).unwrap_or_else(|e| {
            tracing::warn!(member_id, error = %e, "Failed to compute attendance rate");
            0.0
        })
    }

    /// Attendance rate of a member, from cache when fresh. Store errors are
    /// returned and nothing is cached.
    pub fn try_rate(&self, member_id: i64) -> Result<f64> {
        let observed = self.cache.generation();
        if let Some(rate) = self.cache.get(member_id) {
            return Ok(rate);
        }

        let rate = self.compute(member_id)?;
        self.cache.insert_if_current(member_id, rate, observed);
        Ok(rate)
    }

    /// Uncached computation straight from the store.
    pub fn compute(&self, member_id: i64) -> Result<f64> {
        let total = self.store.count_attendance(member_id)?;
        if total <= 0 {
            return Ok(0.0);
        }
        let present = self.store.count_present(member_id)?;
        Ok(attendance_rate(present, total))
    }

    /// Rates for a batch of members.
    pub fn rates_for(&self, member_ids: &[i64]) -> HashMap<i64, f64> {
        member_ids.iter().map(|&id| (id, self.rate(id))).collect()
    }

    /// Drop every cached rate.
    pub fn invalidate(&self) {
        self.cache.invalidate();
        tracing::trace!(generation = self.cache.generation(), "Rate cache invalidated");
    }

    pub fn cache(&self) -> &RateCache {
        &self.cache
    }
}

impl RateSource for RateCalculator {
    fn rate(&self, member_id: i64) -> f64 {
        RateCalculator::rate(self, member_id)
    }

    fn try_rate(&self, member_id: i64) -> Result<f64> {
        RateCalculator::try_rate(self, member_id)
    }
}

/// `present / total` as a percentage rounded to two decimals; 0.0 when
/// there is nothing to divide by.
pub fn attendance_rate(present: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(present.clamp(0, total) as f64 / total as f64 * 100.0)
}
