use std::time::Duration;

/// Game time in whole seconds. Respawn schedules are expressed in this unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct GameTime(pub u64);

impl GameTime {
    pub fn plus_secs(self, secs: u64) -> Self {
        GameTime(self.0.saturating_add(secs))
    }
}

impl std::fmt::Display for GameTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t={}", self.0)
    }
}

/// Per-map clock advanced by the tick diff.
#[derive(Debug, Clone)]
pub struct GameClock {
    start: GameTime,
    elapsed: Duration,
}

impl GameClock {
    pub fn new(start: GameTime) -> Self {
        Self {
            start,
            elapsed: Duration::ZERO,
        }
    }

    pub fn from_system_time() -> Self {
        let secs = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self::new(GameTime(secs))
    }

    pub fn now(&self) -> GameTime {
        self.start.plus_secs(self.elapsed.as_secs())
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn advance(&mut self, diff: Duration) -> GameTime {
        self.elapsed = self.elapsed.saturating_add(diff);
        self.now()
    }
}

/// Cooperative countdown checked once per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalTimer {
    interval: Duration,
    current: Duration,
}

impl IntervalTimer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            current: Duration::ZERO,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn update(&mut self, diff: Duration) {
        self.current = self.current.saturating_add(diff);
    }

    pub fn passed(&self) -> bool {
        self.current >= self.interval
    }

    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
    }

    pub fn remaining(&self) -> Duration {
        self.interval.saturating_sub(self.current)
    }

    /// Returns true once per elapsed interval, carrying over any overshoot.
    pub fn consume(&mut self) -> bool {
        if !self.passed() {
            return false;
        }
        if self.interval.is_zero() {
            self.current = Duration::ZERO;
        } else {
            self.current = self.current.saturating_sub(self.interval).min(self.interval);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_reports_whole_seconds() {
        let mut clock = GameClock::new(GameTime(1_000));
        clock.advance(Duration::from_millis(900));
        assert_eq!(clock.now(), GameTime(1_000));
        clock.advance(Duration::from_millis(200));
        assert_eq!(clock.now(), GameTime(1_001));
    }

    #[test]
    fn interval_timer_passes_and_resets() {
        let mut timer = IntervalTimer::new(Duration::from_millis(100));
        timer.update(Duration::from_millis(60));
        assert!(!timer.passed());
        assert_eq!(timer.remaining(), Duration::from_millis(40));
        timer.update(Duration::from_millis(60));
        assert!(timer.passed());
        timer.reset();
        assert!(!timer.passed());
    }

    #[test]
    fn interval_timer_consume_carries_overshoot() {
        let mut timer = IntervalTimer::new(Duration::from_millis(100));
        timer.update(Duration::from_millis(130));
        assert!(timer.consume());
        assert!(!timer.consume());
        timer.update(Duration::from_millis(70));
        assert!(timer.consume());
    }

    #[test]
    fn zero_interval_fires_every_tick() {
        let mut timer = IntervalTimer::new(Duration::ZERO);
        assert!(timer.consume());
        timer.update(Duration::from_millis(5));
        assert!(timer.consume());
    }
}
