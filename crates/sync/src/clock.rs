use std::cell::Cell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds, used for every timestamp, offset and delay.
pub type Millis = i64;

pub trait Clock {
    fn now_ms(&self) -> Millis;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> Millis {
        (**self).now_ms()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_ms(&self) -> Millis {
        (**self).now_ms()
    }
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Millis {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as Millis)
    }
}

/// Hand-driven clock. Clones share the same time source; `skewed` views read
/// it shifted by a constant, which models two hosts with unsynchronised clocks.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Millis>>,
    skew: Millis,
}

impl ManualClock {
    pub fn new(start: Millis) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
            skew: 0,
        }
    }

    pub fn skewed(&self, skew: Millis) -> Self {
        Self {
            now: Rc::clone(&self.now),
            skew: self.skew + skew,
        }
    }

    pub fn advance(&self, delta: Millis) {
        self.now.set(self.now.get() + delta);
    }

    pub fn set(&self, now: Millis) {
        self.now.set(now - self.skew);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Millis {
        self.now.get() + self.skew
    }
}
