//! Supervised long-lived loops with bounded restart backoff.
//!
//! Each loop (worker runtime, result correlator) runs on its own named
//! thread. The supervisor catches both `Err` returns and panics from the loop
//! body and restarts it after a backoff delay, so a single bad iteration can
//! never take the process down.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Restart policy: capped exponential backoff, restarting forever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first restart; doubles per consecutive failure.
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// A run lasting at least this long resets the attempt counter.
    pub healthy_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            healthy_after: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before restart number `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(20);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Cooperative shutdown flag shared between a loop and its owner.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early on shutdown.
    ///
    /// Returns `true` if shutdown was requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while !self.is_triggered() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(25)));
        }
        true
    }
}

/// Handle to a supervised loop.
#[derive(Debug)]
pub struct SupervisedHandle {
    name: String,
    shutdown: ShutdownSignal,
    restarts: Arc<AtomicU64>,
    join: Option<thread::JoinHandle<()>>,
}

impl SupervisedHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times the loop body was restarted after a failure.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }

    /// Request graceful shutdown and wait for the loop to stop.
    pub fn shutdown(mut self) {
        self.shutdown.trigger();
        self.wait();
    }

    /// Block until the loop stops on its own (or via a shared signal).
    pub fn join(mut self) {
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Runs a loop body under restart supervision.
#[derive(Debug)]
pub struct Supervisor;

impl Supervisor {
    /// Spawn `body` on a named thread.
    ///
    /// - `Ok(())` from the body means a clean stop (no restart)
    /// - `Err` or a panic triggers a restart after `policy`'s backoff
    /// - the body receives the shutdown signal and must return once it fires
    pub fn spawn<F, E>(
        name: impl Into<String>,
        policy: RetryPolicy,
        shutdown: ShutdownSignal,
        body: F,
    ) -> SupervisedHandle
    where
        F: FnMut(&ShutdownSignal) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let name = name.into();
        let restarts = Arc::new(AtomicU64::new(0));

        let join = {
            let name = name.clone();
            let shutdown = shutdown.clone();
            let restarts = restarts.clone();
            thread::Builder::new()
                .name(name.clone())
                .spawn(move || supervise(&name, &policy, &shutdown, &restarts, body))
                .expect("failed to spawn supervised thread")
        };

        SupervisedHandle {
            name,
            shutdown,
            restarts,
            join: Some(join),
        }
    }
}

fn supervise<F, E>(
    name: &str,
    policy: &RetryPolicy,
    shutdown: &ShutdownSignal,
    restarts: &AtomicU64,
    mut body: F,
) where
    F: FnMut(&ShutdownSignal) -> Result<(), E>,
    E: core::fmt::Display,
{
    info!(task = name, "supervised task started");
    let mut attempt: u32 = 0;

    while !shutdown.is_triggered() {
        let started = Instant::now();
        let failure = match panic::catch_unwind(AssertUnwindSafe(|| body(shutdown))) {
            Ok(Ok(())) => break,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
        };

        if shutdown.is_triggered() {
            break;
        }

        if started.elapsed() >= policy.healthy_after {
            attempt = 0;
        }
        attempt = attempt.saturating_add(1);

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            task = name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %failure,
            "supervised task failed; restarting"
        );
        restarts.fetch_add(1, Ordering::SeqCst);

        if shutdown.sleep(delay) {
            break;
        }
    }

    info!(task = name, "supervised task stopped");
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(800));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            ..Default::default()
        };
        assert_eq!(policy.delay_for_attempt(6), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(40), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(2));

        let huge = RetryPolicy {
            base_delay: Duration::MAX,
            ..policy
        };
        assert_eq!(huge.delay_for_attempt(3), Duration::from_secs(2));
    }

    #[test]
    fn restarts_after_panic_and_error() {
        let runs = Arc::new(AtomicU32::new(0));
        let handle = {
            let runs = runs.clone();
            Supervisor::spawn("flaky", quick_policy(), ShutdownSignal::new(), move |_: &ShutdownSignal| {
                match runs.fetch_add(1, Ordering::SeqCst) {
                    0 => panic!("first run explodes"),
                    1 => Err("second run fails".to_string()),
                    _ => Ok(()),
                }
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(handle.restarts(), 2);
        handle.join();
    }

    #[test]
    fn keeps_restarting_a_body_that_always_fails() {
        let runs = Arc::new(AtomicU32::new(0));
        let handle = {
            let runs = runs.clone();
            Supervisor::spawn("doomed", quick_policy(), ShutdownSignal::new(), move |_: &ShutdownSignal| {
                runs.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("always")
            })
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while runs.load(Ordering::SeqCst) < 10 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }

        assert!(runs.load(Ordering::SeqCst) >= 10);
        assert!(!handle.is_finished());
        assert!(handle.restarts() >= 9);
        handle.shutdown();
    }

    #[test]
    fn shutdown_stops_a_running_loop() {
        let handle = Supervisor::spawn(
            "idle",
            quick_policy(),
            ShutdownSignal::new(),
            |signal: &ShutdownSignal| -> Result<(), String> {
                while !signal.sleep(Duration::from_millis(10)) {}
                Ok(())
            },
        );

        thread::sleep(Duration::from_millis(30));
        assert!(!handle.is_finished());
        handle.shutdown();
    }
}
