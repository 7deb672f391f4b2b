use crate::clock::Millis;
use crate::error::SyncError;

/// Turns a receiver's local clock into the authority-relative time it should
/// render, `delay` ms behind the authority.
///
/// ```text
/// 0------------------------------------T   authority now
///             <---- backlog ----><- L ->   buffered history, L = latency
///                      <---- delay ---->
///                      ^ virtual time
/// ```
///
/// With `delay >= latency + one broadcast interval` the virtual time lands
/// inside the buffer and rendering interpolates. Otherwise it extrapolates
/// off the newest pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayoutScheduler {
    delay: Millis,
}

impl PlayoutScheduler {
    pub fn new(delay: Millis) -> Self {
        Self {
            delay: delay.max(0),
        }
    }

    pub fn delay(&self) -> Millis {
        self.delay
    }

    pub fn set_delay(&mut self, delay: Millis) {
        self.delay = delay.max(0);
    }

    pub fn virtual_time(&self, local_now: Millis, offset: Option<Millis>) -> Result<Millis, SyncError> {
        let offset = offset.ok_or(SyncError::Unsynced)?;
        Ok(local_now + offset - self.delay)
    }
}

/// Backlog that keeps the interpolation bracket around `now - delay` inside
/// the eviction window.
pub fn recommended_backlog(delay: Millis, margin: Millis) -> Millis {
    delay.max(0) + margin.max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lags_authority_by_delay() {
        let playout = PlayoutScheduler::new(100);
        assert_eq!(playout.virtual_time(10_000, Some(-9_000)), Ok(900));
    }

    #[test]
    fn needs_an_offset() {
        let playout = PlayoutScheduler::new(100);
        assert_eq!(playout.virtual_time(10_000, None), Err(SyncError::Unsynced));
    }

    #[test]
    fn negative_delay_is_clamped() {
        let mut playout = PlayoutScheduler::new(-20);
        assert_eq!(playout.delay(), 0);
        playout.set_delay(250);
        assert_eq!(playout.delay(), 250);
        assert_eq!(recommended_backlog(250, 150), 400);
    }
}
