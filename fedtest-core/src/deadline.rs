//! Single wall-clock deadline for a multi-role case run.
//!
//! A [`DeadlineGuard`] holds at most one pending countdown. When the
//! countdown expires before it is disarmed, the expiry action runs exactly
//! once on a timer task. The orchestrator's expiry action cancels the
//! case-scoped teardown token, which makes every worker supervisor kill its
//! child process.
//!
//! Firing and disarming race through one atomic state, so an expiry action
//! can never run after a successful disarm. Dropping a guard disarms it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const DISARMED: u8 = 2;

/// Errors from deadline operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeadlineError {
    /// A countdown is already pending on this guard.
    #[error("deadline already armed ({duration:?} pending)")]
    AlreadyArmed {
        /// Duration of the pending countdown.
        duration: Duration,
    },
}

/// What a call to [`DeadlineGuard::disarm`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disarm {
    /// A pending countdown was cancelled before it fired.
    Cancelled,
    /// The countdown had already fired; nothing to cancel.
    AlreadyExpired,
    /// Nothing was armed.
    NotArmed,
}

/// The armed state: owns the timer task that runs the expiry action.
#[derive(Debug)]
struct DeadlineToken {
    state: Arc<AtomicU8>,
    timer: JoinHandle<()>,
    duration: Duration,
}

/// Holder of at most one pending deadline.
#[derive(Debug, Default)]
pub struct DeadlineGuard {
    token: Option<DeadlineToken>,
}

impl DeadlineGuard {
    /// Create an unarmed guard.
    pub fn new() -> Self {
        Self { token: None }
    }

    /// Create a guard that is already armed.
    ///
    /// Must be called within a tokio runtime.
    pub fn armed<F>(duration: Duration, on_expiry: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            token: Some(start(duration, on_expiry)),
        }
    }

    /// Start a countdown that runs `on_expiry` once unless disarmed first.
    ///
    /// Fails fast if a countdown is still pending. A guard whose countdown
    /// already fired may be armed again. Must be called within a tokio
    /// runtime.
    pub fn arm<F>(&mut self, duration: Duration, on_expiry: F) -> Result<(), DeadlineError>
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(token) = &self.token {
            if token.state.load(Ordering::Acquire) == ARMED {
                return Err(DeadlineError::AlreadyArmed {
                    duration: token.duration,
                });
            }
        }
        self.token = Some(start(duration, on_expiry));
        Ok(())
    }

    /// Cancel the pending countdown, if any. Never fails.
    pub fn disarm(&mut self) -> Disarm {
        let Some(token) = self.token.take() else {
            return Disarm::NotArmed;
        };
        match token
            .state
            .compare_exchange(ARMED, DISARMED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                token.timer.abort();
                Disarm::Cancelled
            }
            Err(_) => Disarm::AlreadyExpired,
        }
    }

    /// Returns true while a countdown is running.
    pub fn is_pending(&self) -> bool {
        self.state() == Some(ARMED)
    }

    /// Returns true if the current countdown has fired.
    pub fn has_expired(&self) -> bool {
        self.state() == Some(FIRED)
    }

    fn state(&self) -> Option<u8> {
        self.token
            .as_ref()
            .map(|token| token.state.load(Ordering::Acquire))
    }
}

impl Drop for DeadlineGuard {
    fn drop(&mut self) {
        self.disarm();
    }
}

fn start<F>(duration: Duration, on_expiry: F) -> DeadlineToken
where
    F: FnOnce() + Send + 'static,
{
    let state = Arc::new(AtomicU8::new(ARMED));
    let timer_state = state.clone();
    let timer = tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        if timer_state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::warn!("Deadline of {:?} expired", duration);
            on_expiry();
        }
    });
    DeadlineToken {
        state,
        timer,
        duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn fires_once_after_duration() {
        let (count, action) = counter();
        let guard = DeadlineGuard::armed(Duration::from_millis(20), action);
        assert!(guard.is_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(guard.has_expired());
        assert!(!guard.is_pending());
    }

    #[tokio::test]
    async fn disarm_before_expiry_prevents_action() {
        let (count, action) = counter();
        let mut guard = DeadlineGuard::armed(Duration::from_millis(50), action);
        assert_eq!(guard.disarm(), Disarm::Cancelled);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn disarm_is_idempotent() {
        let (_, action) = counter();
        let mut guard = DeadlineGuard::armed(Duration::from_secs(60), action);
        assert_eq!(guard.disarm(), Disarm::Cancelled);
        assert_eq!(guard.disarm(), Disarm::NotArmed);
        assert_eq!(guard.disarm(), Disarm::NotArmed);
    }

    #[tokio::test]
    async fn disarm_after_expiry_is_a_no_op() {
        let (count, action) = counter();
        let mut guard = DeadlineGuard::armed(Duration::from_millis(10), action);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(guard.disarm(), Disarm::AlreadyExpired);
        assert_eq!(guard.disarm(), Disarm::NotArmed);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn arming_twice_fails_fast() {
        let (_, first) = counter();
        let (_, second) = counter();
        let mut guard = DeadlineGuard::new();
        guard.arm(Duration::from_secs(60), first).unwrap();

        let err = guard.arm(Duration::from_secs(1), second).unwrap_err();
        assert_eq!(
            err,
            DeadlineError::AlreadyArmed {
                duration: Duration::from_secs(60)
            }
        );
    }

    #[tokio::test]
    async fn rearm_after_disarm_or_expiry() {
        let (count, first) = counter();
        let mut guard = DeadlineGuard::armed(Duration::from_millis(10), first);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(guard.has_expired());

        let c = count.clone();
        guard
            .arm(Duration::from_secs(60), move || {
                c.fetch_add(10, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(guard.disarm(), Disarm::Cancelled);

        let (_, third) = counter();
        guard.arm(Duration::from_secs(60), third).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_disarms() {
        let (count, action) = counter();
        {
            let _guard = DeadlineGuard::armed(Duration::from_millis(30), action);
        }
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn independent_guards_do_not_interfere() {
        let (fast_count, fast) = counter();
        let (slow_count, slow) = counter();
        let _fast = DeadlineGuard::armed(Duration::from_millis(10), fast);
        let mut slow_guard = DeadlineGuard::armed(Duration::from_secs(60), slow);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fast_count.load(Ordering::SeqCst), 1);
        assert!(slow_guard.is_pending());
        assert_eq!(slow_guard.disarm(), Disarm::Cancelled);
        assert_eq!(slow_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn disarm_without_runtime_on_unarmed_guard() {
        let mut guard = DeadlineGuard::new();
        assert_eq!(guard.disarm(), Disarm::NotArmed);
        assert!(!guard.has_expired());
    }
}
