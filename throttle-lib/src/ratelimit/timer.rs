use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::watch;

/// A scheduled deadline for one host.
///
/// A timer starts out pending and elapses exactly once, when a task spawned at
/// creation time flips its state. If the runtime running that task shuts down
/// first, the timer counts as elapsed. It cannot be cancelled, shortened or
/// extended. Clones share the same state, so every request waiting on a host
/// observes the same timer elapse.
#[derive(Debug, Clone)]
pub struct CooldownTimer {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    /// Wall-clock time at which the timer was scheduled to elapse
    deadline: SystemTime,

    /// Becomes `true` once the deadline has passed
    elapsed: watch::Receiver<bool>,
}

impl CooldownTimer {
    /// Start a timer which elapses after `delay`
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime
    pub(crate) fn schedule(delay: Duration) -> Self {
        let now = SystemTime::now();
        let deadline = now.checked_add(delay).unwrap_or(now);

        let (sender, elapsed) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            sender.send_replace(true);
        });

        Self {
            inner: Arc::new(Inner { deadline, elapsed }),
        }
    }

    /// Whether the deadline has passed
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        // A closed channel means the task flipping the flag is gone
        *self.inner.elapsed.borrow() || self.inner.elapsed.has_changed().is_err()
    }

    /// Wait until the timer has elapsed.
    ///
    /// Returns immediately if it already has.
    pub async fn wait(&self) {
        let mut elapsed = self.inner.elapsed.clone();
        // The sender only disappears without flipping the flag when the
        // runtime shuts down, at which point there is nothing left to wait for.
        let _ = elapsed.wait_for(|elapsed| *elapsed).await;
    }

    /// The point in time the timer was scheduled to elapse at
    #[must_use]
    pub fn deadline(&self) -> SystemTime {
        self.inner.deadline
    }

    /// Time left until the deadline according to the system clock
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.inner
            .deadline
            .duration_since(SystemTime::now())
            .unwrap_or(Duration::ZERO)
    }
}

impl PartialEq for CooldownTimer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for CooldownTimer {}
