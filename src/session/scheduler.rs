use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Default margin between the proactive refresh and the actual expiry.
pub const DEFAULT_REFRESH_SKEW: Duration = Duration::from_secs(30);

struct ArmedTimer {
    id: u64,
    fire_at: Instant,
    handle: JoinHandle<()>,
}

/// Holds at most one pending proactive-refresh timer.
///
/// Arming replaces (and cancels) whatever was armed before. When the timer
/// fires it leaves the armed state and hands the callback to a detached task,
/// so the callback may itself re-arm the scheduler.
pub struct RefreshScheduler {
    skew: Duration,
    next_id: AtomicU64,
    slot: Arc<Mutex<Option<ArmedTimer>>>,
}

fn lock_slot(slot: &Mutex<Option<ArmedTimer>>) -> MutexGuard<'_, Option<ArmedTimer>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RefreshScheduler {
    pub fn new(skew: Duration) -> Self {
        Self {
            skew,
            next_id: AtomicU64::new(1),
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn skew(&self) -> Duration {
        self.skew
    }

    /// Schedules `on_fire` at `now + max(expires_in - skew, 0)` and returns that instant.
    pub fn arm<F, Fut>(&self, expires_in: Duration, on_fire: F) -> Instant
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let delay = expires_in.saturating_sub(self.skew);
        let fire_at = Instant::now() + delay;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::clone(&self.slot);

        let mut armed = lock_slot(&self.slot);
        if let Some(stale) = armed.take() {
            stale.handle.abort();
            debug!(timer_id = stale.id, "replaced armed refresh timer");
        }

        let handle = tokio::spawn(async move {
            sleep_until(fire_at).await;
            {
                let mut armed = lock_slot(&slot);
                match armed.as_ref() {
                    Some(timer) if timer.id == id => {
                        armed.take();
                    }
                    // Superseded between waking up and getting here.
                    _ => return,
                }
            }
            debug!(timer_id = id, "refresh timer fired");
            tokio::spawn(on_fire());
        });

        *armed = Some(ArmedTimer {
            id,
            fire_at,
            handle,
        });
        debug!(
            timer_id = id,
            delay_secs = delay.as_secs(),
            "refresh timer armed"
        );
        fire_at
    }

    /// Cancels the armed timer. Returns whether one was armed.
    pub fn disarm(&self) -> bool {
        match lock_slot(&self.slot).take() {
            Some(timer) => {
                timer.handle.abort();
                debug!(timer_id = timer.id, "refresh timer disarmed");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }

    /// When the armed timer is due, if any.
    pub fn fire_at(&self) -> Option<Instant> {
        lock_slot(&self.slot).as_ref().map(|timer| timer.fire_at)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.disarm();
    }
}
