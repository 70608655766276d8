use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use crate::models::Event;

pub const DEFAULT_DURATION: Duration = Duration::from_millis(800);
pub const DEFAULT_FRAME: Duration = Duration::from_millis(16);

/// Scalar counts shown above an event list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestCounts {
    pub total: u64,
    pub featured: u64,
    pub deals: u64,
}

impl DigestCounts {
    pub fn from_events(events: &[Event]) -> Self {
        let mut counts = Self {
            total: events.len() as u64,
            ..Self::default()
        };
        for event in events {
            if event.is_featured {
                counts.featured += 1;
            }
            if !event.tags_deals.is_empty() {
                counts.deals += 1;
            }
        }
        counts
    }
}

/// Cubic ease-out: fast start, gentle landing.
pub fn ease_out_cubic(progress: f64) -> f64 {
    let p = progress.clamp(0.0, 1.0);
    1.0 - (1.0 - p).powi(3)
}

/// Value displayed `elapsed` into an animation toward `target`.
pub fn displayed_value(target: u64, elapsed: Duration, duration: Duration) -> u64 {
    if target == 0 {
        return 0;
    }
    if duration.is_zero() || elapsed >= duration {
        return target;
    }
    let progress = elapsed.as_secs_f64() / duration.as_secs_f64();
    let value = (target as f64 * ease_out_cubic(progress)).round() as u64;
    value.min(target)
}

struct AnimationState {
    target: u64,
    started_at: Instant,
    handle: JoinHandle<()>,
}

/// A counter that eases its displayed value toward a target.
///
/// At most one frame loop runs per counter: retargeting aborts the previous
/// loop before starting a new one, and dropping the counter aborts it too.
/// A loop only publishes while its generation is current, and the check runs
/// under the channel lock, so nothing lands after `cancel` returns even on a
/// multi-threaded runtime. Must be driven from inside a tokio runtime.
pub struct AnimatedCounter {
    duration: Duration,
    frame: Duration,
    displayed: Arc<watch::Sender<u64>>,
    generation: Arc<AtomicU64>,
    state: Option<AnimationState>,
}

impl AnimatedCounter {
    pub fn new(duration: Duration, frame: Duration) -> Self {
        let (displayed, _) = watch::channel(0);
        Self {
            duration,
            frame: frame.max(Duration::from_millis(1)),
            displayed: Arc::new(displayed),
            generation: Arc::new(AtomicU64::new(0)),
            state: None,
        }
    }

    pub fn value(&self) -> u64 {
        *self.displayed.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.displayed.subscribe()
    }

    pub fn target(&self) -> Option<u64> {
        self.state.as_ref().map(|state| state.target)
    }

    pub fn is_running(&self) -> bool {
        self.state
            .as_ref()
            .is_some_and(|state| !state.handle.is_finished())
    }

    /// Time since the current animation started.
    pub fn elapsed(&self) -> Option<Duration> {
        self.state.as_ref().map(|state| state.started_at.elapsed())
    }

    /// Starts easing toward `target` from 0. Re-sending the target that is
    /// already animating leaves the running loop alone.
    pub fn set_target(&mut self, target: u64) {
        if self.target() == Some(target) && self.is_running() {
            return;
        }
        self.cancel();

        if target == 0 {
            self.displayed.send_replace(0);
            return;
        }

        let started_at = Instant::now();
        let duration = self.duration;
        let frame = self.frame;
        let displayed = Arc::clone(&self.displayed);
        let generation = Arc::clone(&self.generation);
        let own_generation = generation.load(Ordering::SeqCst);
        debug!(goal = target, ?duration, "starting counter animation");

        let handle = tokio::spawn(async move {
            let mut ticker = interval(frame);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let elapsed = started_at.elapsed();
                let next = displayed_value(target, elapsed, duration);
                let published = displayed.send_if_modified(|value| {
                    if generation.load(Ordering::SeqCst) != own_generation {
                        return false;
                    }
                    *value = next;
                    true
                });
                if !published {
                    break;
                }
                if elapsed >= duration {
                    break;
                }
            }
        });

        self.state = Some(AnimationState {
            target,
            started_at,
            handle,
        });
    }

    /// Stops the frame loop, leaving the displayed value where it is.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(state) = self.state.take() {
            if !state.handle.is_finished() {
                debug!(goal = state.target, "cancelling counter animation");
            }
            state.handle.abort();
        }
    }
}

impl Default for AnimatedCounter {
    fn default() -> Self {
        Self::new(DEFAULT_DURATION, DEFAULT_FRAME)
    }
}

impl Drop for AnimatedCounter {
    fn drop(&mut self) {
        self.cancel();
    }
}
