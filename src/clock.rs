use std::time::{Duration, Instant};

/// Time source for the frame loop, measured from session start.
pub trait Clock {
    fn now(&self) -> Duration;
    /// Block (or jump) until `deadline`. Returns immediately if it has passed.
    fn wait_until(&mut self, deadline: Duration);
}

/// Wall-clock time; waiting sleeps the thread.
pub struct RealtimeClock {
    origin: Instant,
}

impl RealtimeClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for RealtimeClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wait_until(&mut self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Simulated time that only moves when waited on. Offline renders run as fast
/// as frames can be produced.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: Duration,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn wait_until(&mut self, deadline: Duration) {
        self.now = self.now.max(deadline);
    }
}
