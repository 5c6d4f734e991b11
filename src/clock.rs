use std::time::Instant;

/// Milliseconds on the engine's monotonic timeline.
pub type Millis = i64;

/// A monotonic millisecond clock, anchored at its construction time.
///
/// Timestamps are only ever compared against each other, so the absolute
/// origin is irrelevant; readings start near zero and never decrease.
#[derive(Debug, Clone)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Milliseconds elapsed since this clock was created.
    #[must_use]
    pub fn now_ms(&self) -> Millis {
        self.origin.elapsed().as_millis() as Millis
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn readings_never_decrease() {
        let clock = Clock::new();
        let mut last = clock.now_ms();
        for _ in 0..100 {
            let now = clock.now_ms();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn advances_with_wall_time() {
        let clock = Clock::new();
        let before = clock.now_ms();
        std::thread::sleep(Duration::from_millis(15));
        assert!(clock.now_ms() >= before + 10);
    }
}
