// Rate engine: cumulative counter readings -> per-second rates.
//
// One engine per sampler. The sampler task is its only writer, so no locking here.

use std::collections::HashMap;
use std::time::Instant;

/// Previous reading of one counter key.
#[derive(Debug, Clone)]
struct CounterObservation {
    value: u64,
    at: Instant,
    /// Last computed rate, returned again when no time has elapsed.
    rate: f64,
    /// Engine tick in which the key was last observed (drives eviction).
    seen_tick: u64,
}

/// Stateful converter from cumulative counters to rates, keyed by stable identifiers
/// such as `"cpu.core.3.total"`, `"net.eth0.rx"` or `"proc.1234.cpu"`.
#[derive(Debug, Default)]
pub struct RateEngine {
    observations: HashMap<String, CounterObservation>,
    tick: u64,
}

impl RateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one reading and get the per-second rate since the previous reading.
    ///
    /// Returns 0.0 on first sight of `key` (rate not yet known) and after a counter
    /// reset. When `now` is not after the stored timestamp, the previous rate is
    /// returned and the stored reading is kept.
    pub fn observe(&mut self, key: &str, value: u64, now: Instant) -> f64 {
        let tick = self.tick;
        let Some(obs) = self.observations.get_mut(key) else {
            self.observations.insert(
                key.to_string(),
                CounterObservation {
                    value,
                    at: now,
                    rate: 0.0,
                    seen_tick: tick,
                },
            );
            return 0.0;
        };

        obs.seen_tick = tick;
        let elapsed = match now.checked_duration_since(obs.at) {
            Some(d) if !d.is_zero() => d.as_secs_f64(),
            _ => return obs.rate,
        };

        let rate = if value < obs.value {
            tracing::trace!(key, previous = obs.value, current = value, "counter reset");
            0.0
        } else {
            (value - obs.value) as f64 / elapsed
        };

        obs.value = value;
        obs.at = now;
        obs.rate = rate;
        rate
    }

    /// Windowed utilization in percent: Δactive / Δtotal over the interval since the
    /// previous reading of both keys. 0.0 until both keys have a baseline.
    pub fn utilization(
        &mut self,
        active_key: &str,
        active: u64,
        total_key: &str,
        total: u64,
        now: Instant,
    ) -> f64 {
        let active_rate = self.observe(active_key, active, now);
        let total_rate = self.observe(total_key, total, now);
        share_percent(active_rate, total_rate)
    }

    /// Start a new tick. Keys observed from now on count as seen in this tick.
    pub fn begin_tick(&mut self) {
        self.tick += 1;
    }

    /// Drop keys absent for more than `max_absent_ticks` ticks. Returns the number evicted.
    pub fn evict_stale(&mut self, max_absent_ticks: u64) -> usize {
        let tick = self.tick;
        let before = self.observations.len();
        self.observations
            .retain(|_, obs| tick.saturating_sub(obs.seen_tick) <= max_absent_ticks);
        before - self.observations.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.observations.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

/// `part` as a percentage of `total`, clamped to 0..=100; 0 when `total` is not positive.
pub fn share_percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        (part / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn secs(t0: Instant, s: u64) -> Instant {
        t0 + Duration::from_secs(s)
    }

    #[test]
    fn first_observation_is_zero() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        assert_eq!(engine.observe("a", 0, t0), 0.0);
        assert_eq!(engine.observe("b", u64::MAX, t0), 0.0);
        assert_eq!(engine.observe("c", 123_456_789, secs(t0, 30)), 0.0);
    }

    #[test]
    fn delta_over_elapsed() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        engine.observe("k", 100, t0);
        assert_eq!(engine.observe("k", 150, secs(t0, 2)), 25.0);
    }

    #[test]
    fn decrease_is_reset_not_negative() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        engine.observe("k", 100, t0);
        assert_eq!(engine.observe("k", 40, secs(t0, 1)), 0.0);
        // Resynchronised to 40.
        assert_eq!(engine.observe("k", 50, secs(t0, 2)), 10.0);
    }

    #[test]
    fn same_timestamp_returns_previous_rate() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        engine.observe("k", 0, t0);
        let t1 = secs(t0, 1);
        assert_eq!(engine.observe("k", 10, t1), 10.0);
        assert_eq!(engine.observe("k", 500, t1), 10.0);
        // Stored reading was not replaced by the zero-elapsed call.
        assert_eq!(engine.observe("k", 30, secs(t0, 2)), 20.0);
    }

    #[test]
    fn same_timestamp_on_second_sight_returns_zero() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        engine.observe("k", 5, t0);
        assert_eq!(engine.observe("k", 9, t0), 0.0);
    }

    #[test]
    fn earlier_timestamp_is_ignored() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        engine.observe("k", 0, secs(t0, 5));
        assert_eq!(engine.observe("k", 100, secs(t0, 6)), 100.0);
        assert_eq!(engine.observe("k", 200, secs(t0, 4)), 100.0);
    }

    #[test]
    fn utilization_uses_interval_deltas() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        // user=100 nice=0 system=50 idle=850 -> user=120 nice=0 system=60 idle=920
        assert_eq!(
            engine.utilization("cpu.active", 150, "cpu.total", 1000, t0),
            0.0
        );
        let pct = engine.utilization("cpu.active", 180, "cpu.total", 1100, secs(t0, 1));
        assert!((pct - 30.0).abs() < 1e-9);
    }

    #[test]
    fn utilization_with_flat_total_is_zero() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        engine.utilization("a", 10, "t", 100, t0);
        assert_eq!(engine.utilization("a", 10, "t", 100, secs(t0, 1)), 0.0);
    }

    #[test]
    fn eviction_after_absence_window() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        engine.observe("gone", 1, t0);
        engine.observe("kept", 1, t0);
        for s in 1..=3 {
            engine.begin_tick();
            engine.observe("kept", s, secs(t0, s));
            assert_eq!(engine.evict_stale(3), 0);
        }
        engine.begin_tick();
        engine.observe("kept", 4, secs(t0, 4));
        assert_eq!(engine.evict_stale(3), 1);
        assert!(!engine.contains("gone"));
        assert!(engine.contains("kept"));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn evicted_key_restarts_as_first_observation() {
        let mut engine = RateEngine::new();
        let t0 = Instant::now();
        engine.observe("k", 100, t0);
        engine.begin_tick();
        engine.begin_tick();
        engine.evict_stale(1);
        assert!(engine.is_empty());
        assert_eq!(engine.observe("k", 1_000, secs(t0, 2)), 0.0);
    }
}
