use crate::clock::Millis;

/// Shortest period a task can run at.
pub const MIN_PERIOD_MS: f64 = 1.0;

/// Accumulates elapsed time and releases it in fixed periods.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    period_ms: f64,
    accumulator_ms: f64,
}

impl FixedInterval {
    pub fn new(period_ms: f64) -> Self {
        Self {
            period_ms: period_ms.max(MIN_PERIOD_MS),
            accumulator_ms: 0.0,
        }
    }

    pub fn from_rate(per_second: u32) -> Self {
        Self::new(1000.0 / per_second.max(1) as f64)
    }

    pub fn period_ms(&self) -> f64 {
        self.period_ms
    }

    pub fn accumulate(&mut self, delta: Millis) {
        self.accumulator_ms += delta.max(0) as f64;
    }

    pub fn is_due(&self) -> bool {
        self.accumulator_ms >= self.period_ms
    }

    pub fn consume(&mut self) -> bool {
        if self.is_due() {
            self.accumulator_ms -= self.period_ms;
            true
        } else {
            false
        }
    }

    /// Consumes every elapsed period and returns how many there were.
    pub fn consume_all(&mut self) -> u64 {
        let periods = (self.accumulator_ms / self.period_ms).floor();
        self.accumulator_ms -= periods * self.period_ms;
        periods as u64
    }

    pub fn reset(&mut self) {
        self.accumulator_ms = 0.0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Tick,
    Broadcast,
    Diagnostics,
}

/// The authority's periodic tasks, driven by elapsed time and cancelled
/// together.
#[derive(Debug, Clone)]
pub struct Schedule {
    tasks: Vec<(Task, FixedInterval)>,
    cancelled: bool,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancelled: false,
        }
    }

    pub fn every(mut self, task: Task, interval: FixedInterval) -> Self {
        self.tasks.push((task, interval));
        self
    }

    /// Feeds `delta` ms to every task and returns the ones that came due, in
    /// registration order. Missed periods collapse into a single run.
    pub fn advance(&mut self, delta: Millis) -> Vec<Task> {
        if self.cancelled {
            return Vec::new();
        }

        self.tasks
            .iter_mut()
            .filter_map(|(task, interval)| {
                interval.accumulate(delta);
                (interval.consume_all() > 0).then_some(*task)
            })
            .collect()
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
        for (_, interval) in &mut self.tasks {
            interval.reset();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_interval_accumulation() {
        let mut interval = FixedInterval::from_rate(60);

        interval.accumulate(34);
        assert!(interval.is_due());
        assert!(interval.consume());
        assert!(interval.consume());
        assert!(!interval.consume());
    }

    #[test]
    fn schedule_runs_due_tasks_in_order() {
        let mut schedule = Schedule::new()
            .every(Task::Tick, FixedInterval::from_rate(60))
            .every(Task::Broadcast, FixedInterval::from_rate(12));

        assert!(schedule.advance(10).is_empty());
        assert_eq!(schedule.advance(10), vec![Task::Tick]);

        let mut broadcasts = 0;
        let mut ticks = 0;
        for _ in 0..990 {
            for task in schedule.advance(1) {
                match task {
                    Task::Tick => ticks += 1,
                    Task::Broadcast => broadcasts += 1,
                    Task::Diagnostics => {}
                }
            }
        }
        assert_eq!(broadcasts, 12);
        assert!((58..=60).contains(&ticks));
    }

    #[test]
    fn diagnostics_every_two_seconds() {
        let mut schedule = Schedule::new()
            .every(Task::Tick, FixedInterval::from_rate(60))
            .every(Task::Broadcast, FixedInterval::from_rate(12))
            .every(Task::Diagnostics, FixedInterval::new(2000.0));

        let mut runs = Vec::new();
        for ms in 1..=4_000 {
            if schedule.advance(1).contains(&Task::Diagnostics) {
                runs.push(ms);
            }
        }
        assert_eq!(runs, vec![2_000, 4_000]);
    }

    #[test]
    fn zero_period_is_clamped() {
        let mut interval = FixedInterval::new(0.0);
        assert_eq!(interval.period_ms(), MIN_PERIOD_MS);

        interval.accumulate(1_000_000_000);
        assert_eq!(interval.consume_all(), 1_000_000_000);
        assert!(!interval.is_due());

        let mut schedule = Schedule::new().every(Task::Diagnostics, FixedInterval::new(0.0));
        assert_eq!(schedule.advance(1), vec![Task::Diagnostics]);
        assert!(schedule.advance(0).is_empty());
    }

    #[test]
    fn consume_all_keeps_the_remainder() {
        let mut interval = FixedInterval::new(10.0);
        interval.accumulate(35);
        assert_eq!(interval.consume_all(), 3);
        interval.accumulate(5);
        assert!(interval.consume());
    }

    #[test]
    fn cancelled_schedule_stays_quiet() {
        let mut schedule = Schedule::new().every(Task::Tick, FixedInterval::new(5.0));
        schedule.cancel();
        assert!(schedule.is_cancelled());
        assert!(schedule.advance(1_000).is_empty());
    }
}
