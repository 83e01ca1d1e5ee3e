//! Rotation schedulers, one per horizon
//!
//! - INSTANT rotates on every scan cycle
//! - H1 / H24 rotate on the first cycle at or after `last_rotated_at + period`
//!
//! Schedulers never touch storage themselves. The scan cycle asks `poll(now)`
//! after its evaluation pass and rotates the stores of every horizon that is due.
//! Rotation time is taken from the cycle clock, so drift of up to one scan
//! interval per rotation is expected.

use super::types::Horizon;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    /// Rotate unconditionally once per cycle
    EveryCycle,
    /// Rotate when at least `period_secs` elapsed since the last rotation
    Elapsed { period_secs: i64 },
}

#[derive(Debug, Clone)]
pub struct RotationScheduler {
    horizon: Horizon,
    policy: RotationPolicy,
    last_rotated_at: i64,
}

impl RotationScheduler {
    /// `started_at` counts as the first rotation (T0)
    pub fn new(horizon: Horizon, policy: RotationPolicy, started_at: i64) -> Self {
        Self {
            horizon,
            policy,
            last_rotated_at: started_at,
        }
    }

    /// Standard policy for a horizon: INSTANT every cycle, H1/H24 time-gated
    pub fn for_horizon(
        horizon: Horizon,
        h1_period_secs: i64,
        h24_period_secs: i64,
        started_at: i64,
    ) -> Self {
        let policy = match horizon {
            Horizon::Instant => RotationPolicy::EveryCycle,
            Horizon::H1 => RotationPolicy::Elapsed {
                period_secs: h1_period_secs,
            },
            Horizon::H24 => RotationPolicy::Elapsed {
                period_secs: h24_period_secs,
            },
        };
        Self::new(horizon, policy, started_at)
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn policy(&self) -> RotationPolicy {
        self.policy
    }

    pub fn last_rotated_at(&self) -> i64 {
        self.last_rotated_at
    }

    pub fn is_due(&self, now: i64) -> bool {
        match self.policy {
            RotationPolicy::EveryCycle => true,
            RotationPolicy::Elapsed { period_secs } => now - self.last_rotated_at >= period_secs,
        }
    }

    pub fn mark_rotated(&mut self, now: i64) {
        self.last_rotated_at = now;
    }

    /// Returns true (and records the rotation) when the horizon is due at `now`
    pub fn poll(&mut self, now: i64) -> bool {
        if !self.is_due(now) {
            return false;
        }
        self.mark_rotated(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: i64 = 1_700_000_000;

    #[test]
    fn test_instant_rotates_every_cycle() {
        let mut scheduler = RotationScheduler::for_horizon(Horizon::Instant, 3_600, 86_400, T0);

        assert!(scheduler.poll(T0));
        assert!(scheduler.poll(T0));
        assert!(scheduler.poll(T0 + 30));
    }

    #[test]
    fn test_h1_not_due_before_period() {
        let mut scheduler = RotationScheduler::for_horizon(Horizon::H1, 3_600, 86_400, T0);

        assert!(!scheduler.poll(T0 + 30));
        assert!(!scheduler.poll(T0 + 3_599));
        assert_eq!(scheduler.last_rotated_at(), T0);
    }

    #[test]
    fn test_h1_rotates_on_first_cycle_at_or_after_period() {
        let mut scheduler = RotationScheduler::for_horizon(Horizon::H1, 3_600, 86_400, T0);

        assert!(scheduler.poll(T0 + 3_600));
        assert_eq!(scheduler.last_rotated_at(), T0 + 3_600);

        // Next window is measured from the actual rotation time
        assert!(!scheduler.poll(T0 + 7_199));
        assert!(scheduler.poll(T0 + 7_200));
    }

    #[test]
    fn test_drift_carries_into_next_window() {
        let mut scheduler = RotationScheduler::for_horizon(Horizon::H1, 3_600, 86_400, T0);

        // Cycle lands 25s late
        assert!(scheduler.poll(T0 + 3_625));
        assert!(!scheduler.poll(T0 + 7_200));
        assert!(scheduler.poll(T0 + 7_225));
    }

    #[test]
    fn test_h24_uses_its_own_period() {
        let mut scheduler = RotationScheduler::for_horizon(Horizon::H24, 3_600, 86_400, T0);

        assert_eq!(scheduler.policy(), RotationPolicy::Elapsed { period_secs: 86_400 });
        assert!(!scheduler.poll(T0 + 3_600));
        assert!(!scheduler.poll(T0 + 86_399));
        assert!(scheduler.poll(T0 + 86_400));
    }

    #[test]
    fn test_is_due_does_not_mutate() {
        let scheduler = RotationScheduler::for_horizon(Horizon::H1, 3_600, 86_400, T0);

        assert!(scheduler.is_due(T0 + 4_000));
        assert!(scheduler.is_due(T0 + 4_000));
        assert_eq!(scheduler.last_rotated_at(), T0);
    }
}
