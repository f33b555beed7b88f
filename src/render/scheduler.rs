use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Highest frame rate the scheduler and sinks accept.
pub const MAX_FPS: u32 = 240;

/// Shared flag that stops a frame subscription.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug)]
pub struct Subscription {
    pub id: u64,
    pub token: CancellationToken,
}

/// A frame that is due now.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTick {
    pub subscription: u64,
    /// Frames drawn by this subscription before this one.
    pub index: u64,
    pub at: Duration,
}

/// Replacement for a self-rescheduling animation callback: at most one
/// subscription is live, and it is checked for cancellation every poll.
#[derive(Debug)]
pub struct FrameScheduler {
    interval: Duration,
    next_id: u64,
    active: Option<Active>,
}

#[derive(Debug)]
struct Active {
    subscription: Subscription,
    next_due: Duration,
    frames: u64,
}

impl FrameScheduler {
    pub fn new(fps: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / fps.max(1) as f64),
            next_id: 1,
            active: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start a new subscription, cancelling any previous one. The first frame
    /// is due immediately.
    pub fn request(&mut self, now: Duration) -> Subscription {
        self.cancel();

        let subscription = Subscription {
            id: self.next_id,
            token: CancellationToken::new(),
        };
        self.next_id += 1;
        self.active = Some(Active {
            subscription: subscription.clone(),
            next_due: now,
            frames: 0,
        });
        subscription
    }

    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            active.subscription.token.cancel();
        }
    }

    pub fn active(&self) -> Option<&Subscription> {
        self.active.as_ref().map(|a| &a.subscription)
    }

    pub fn active_count(&self) -> usize {
        usize::from(self.active.is_some())
    }

    /// When the next frame should be drawn, if anything is scheduled.
    pub fn next_due(&self) -> Option<Duration> {
        self.active.as_ref().map(|a| a.next_due)
    }

    pub fn poll(&mut self, now: Duration) -> Option<FrameTick> {
        if self
            .active
            .as_ref()
            .is_some_and(|a| a.subscription.token.is_cancelled())
        {
            self.active = None;
            return None;
        }

        let interval = self.interval;
        let active = self.active.as_mut()?;
        if now < active.next_due {
            return None;
        }

        let tick = FrameTick {
            subscription: active.subscription.id,
            index: active.frames,
            at: now,
        };
        active.frames += 1;

        // Missed frames are dropped rather than drawn in a burst.
        active.next_due += interval;
        if active.next_due <= now {
            let behind = (now - active.next_due).as_nanos() / interval.as_nanos().max(1);
            active.next_due += interval * (behind as u32 + 1);
        }

        Some(tick)
    }
}
