use std::time::Duration;

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_FULL_SCAN_EVERY: u64 = 21;
pub const DEFAULT_CHILDREN_SCAN_EVERY: u64 = 7;
pub const DEFAULT_THROTTLED_SCAN_INTERVAL: Duration = Duration::from_millis(15);

/// Cadence of the recurring status check, counted in ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub tick_interval: Duration,
    /// Ticks between catch-up full scans.
    pub full_scan_every: u64,
    /// Ticks between launcher children scans.
    pub children_scan_every: u64,
    /// Pause between processes during a catch-up full scan.
    pub throttled_scan_interval: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            full_scan_every: DEFAULT_FULL_SCAN_EVERY,
            children_scan_every: DEFAULT_CHILDREN_SCAN_EVERY,
            throttled_scan_interval: DEFAULT_THROTTLED_SCAN_INTERVAL,
        }
    }
}

/// Extra work for a single tick, on top of the manifest and running checks
/// every tick performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickPlan {
    pub catch_up: bool,
    pub children_scan: bool,
}

impl Schedule {
    /// A catch-up tick never also runs the children scan.
    pub fn plan(&self, tick: u64) -> TickPlan {
        if tick % self.full_scan_every.max(1) == 0 {
            TickPlan {
                catch_up: true,
                children_scan: false,
            }
        } else if tick % self.children_scan_every.max(1) == 0 {
            TickPlan {
                catch_up: false,
                children_scan: true,
            }
        } else {
            TickPlan::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_catch_up() {
        let plan = Schedule::default().plan(0);
        assert!(plan.catch_up);
        assert!(!plan.children_scan);
    }

    #[test]
    fn default_cadence_over_many_ticks() {
        let schedule = Schedule::default();
        let catch_ups: Vec<u64> = (0..64).filter(|t| schedule.plan(*t).catch_up).collect();
        let children: Vec<u64> = (0..64).filter(|t| schedule.plan(*t).children_scan).collect();

        assert_eq!(catch_ups, [0, 21, 42, 63]);
        assert_eq!(children, [7, 14, 28, 35, 49, 56]);
    }

    #[test]
    fn zero_cadence_is_treated_as_every_tick() {
        let schedule = Schedule {
            full_scan_every: 0,
            ..Schedule::default()
        };
        assert!(schedule.plan(5).catch_up);
    }
}
