//! Periodic background execution of generation cycles.
//!
//! The loop lives on its own OS thread and drives each cycle to completion
//! on the shared tokio runtime with `Handle::block_on`. Between cycles it
//! sleeps on a condition variable, so `stop` and `execute_single` wake it
//! without waiting out the interval.
//!
//! ```text
//! start ─▶ [startup delay] ─▶ InProgress ─▶ cycle ─▶ Healthy|Unhealthy ─▶ wait(interval) ─┐
//!                                  ▲                                                      │
//!                                  └──────────────── wake / timeout ◀─────────────────────┘
//! ```

use std::fmt;
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::manager::{CycleReport, Manager};

/// Aggregate health reported around each cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    InProgress,
    Healthy,
    Unhealthy,
}

impl HealthState {
    pub fn from_valid(valid: bool) -> Self {
        if valid {
            HealthState::Healthy
        } else {
            HealthState::Unhealthy
        }
    }

    /// `false` while a cycle runs or when some generator failed.
    pub fn is_valid(self) -> bool {
        self == HealthState::Healthy
    }
}

impl fmt::Display for HealthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthState::InProgress => "in progress",
            HealthState::Healthy => "healthy",
            HealthState::Unhealthy => "unhealthy",
        };
        f.write_str(label)
    }
}

/// Shortest pause between cycles; smaller intervals are raised to it.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

pub type StateCallback = Arc<dyn Fn(HealthState) + Send + Sync>;

#[derive(Debug, Default)]
struct LoopState {
    /// Loop should keep going.
    running: bool,
    /// A loop (background or `execute_loop`) is alive.
    active: bool,
    /// Latched wake request; survives until the loop next waits.
    wake: bool,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<LoopState>,
    signal: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, LoopState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` unless stopped or woken first.
    fn wait(&self, timeout: Duration) {
        let guard = self.lock();
        let (mut state, _) = self
            .signal
            .wait_timeout_while(guard, timeout, |s| s.running && !s.wake)
            .unwrap_or_else(PoisonError::into_inner);
        state.wake = false;
    }

    fn is_running(&self) -> bool {
        self.lock().running
    }
}

/// Cancellable periodic runner around a [`Manager`].
#[derive(Clone)]
pub struct Scheduler {
    manager: Arc<Mutex<Manager>>,
    runtime: Handle,
    shared: Arc<Shared>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
    callback: Option<StateCallback>,
}

impl Scheduler {
    pub fn new(manager: Manager, runtime: Handle) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
            runtime,
            shared: Arc::new(Shared::default()),
            worker: Arc::new(Mutex::new(None)),
            callback: None,
        }
    }

    /// Observer called with `InProgress` before each cycle and with the
    /// aggregate health after it.
    pub fn with_state_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(HealthState) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Spawn the loop on a background thread. No-op if a loop is already alive.
    pub fn start(&self, interval: Duration, startup_delay: Duration) -> io::Result<()> {
        if !self.claim_loop() {
            warn!("Generator loop already running");
            return Ok(());
        }

        let this = self.clone();
        let spawned = thread::Builder::new()
            .name("generator-loop".into())
            .spawn(move || this.run_loop(interval, startup_delay));

        match spawned {
            Ok(handle) => {
                *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                info!(interval_secs = interval.as_secs(), "Generator loop started");
                Ok(())
            }
            Err(e) => {
                let mut state = self.shared.lock();
                state.running = false;
                state.active = false;
                Err(e)
            }
        }
    }

    /// Run the loop on the calling thread until [`stop`](Self::stop).
    pub fn execute_loop(&self, interval: Duration, startup_delay: Duration) {
        if !self.claim_loop() {
            warn!("Generator loop already running");
            return;
        }
        self.run_loop(interval, startup_delay);
    }

    /// Ask the loop to finish. An in-flight cycle completes first.
    pub fn stop(&self) {
        let mut state = self.shared.lock();
        if state.running {
            info!("Stopping generator loop");
        }
        state.running = false;
        self.shared.signal.notify_all();
    }

    /// Run a cycle now.
    ///
    /// With a live loop this only wakes it and returns `None`. Otherwise the
    /// cycle runs on the calling thread, which must not be a runtime worker.
    pub fn execute_single(&self) -> Option<CycleReport> {
        {
            let mut state = self.shared.lock();
            if state.active {
                debug!("Waking generator loop");
                state.wake = true;
                self.shared.signal.notify_all();
                return None;
            }
        }
        Some(self.run_cycle())
    }

    /// Wait for the background thread to exit. No-op without one.
    pub fn join(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Generator loop thread panicked");
            }
        }
    }

    /// Release generators and the secret store.
    pub fn close(&self) {
        let mut manager = self.lock_manager();
        self.runtime.block_on(manager.close());
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn is_active(&self) -> bool {
        self.shared.lock().active
    }

    fn claim_loop(&self) -> bool {
        let mut state = self.shared.lock();
        if state.active {
            return false;
        }
        state.running = true;
        state.active = true;
        state.wake = false;
        true
    }

    fn run_loop(&self, interval: Duration, startup_delay: Duration) {
        let interval = if interval < MIN_INTERVAL {
            warn!(
                requested_ms = interval.as_millis() as u64,
                "Refresh interval too short, using {}s",
                MIN_INTERVAL.as_secs()
            );
            MIN_INTERVAL
        } else {
            interval
        };

        if !startup_delay.is_zero() {
            debug!(delay_secs = startup_delay.as_secs(), "Waiting before first cycle");
            self.shared.wait(startup_delay);
        }

        loop {
            if !self.shared.is_running() {
                break;
            }
            self.run_cycle();
            if !self.shared.is_running() {
                break;
            }
            self.shared.wait(interval);
        }

        self.shared.lock().active = false;
        info!("Generator loop finished");
    }

    fn run_cycle(&self) -> CycleReport {
        self.notify(HealthState::InProgress);

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let mut manager = self.lock_manager();
            let report = self.runtime.block_on(manager.generate_data());
            (report, manager.is_gen_valid())
        }));

        match outcome {
            Ok((report, valid)) => {
                self.notify(HealthState::from_valid(valid));
                report
            }
            Err(_) => {
                error!("Generation cycle panicked");
                self.notify(HealthState::Unhealthy);
                CycleReport::default()
            }
        }
    }

    fn notify(&self, health: HealthState) {
        debug!(%health, "Generator health");
        if let Some(callback) = &self.callback {
            callback(health);
        }
    }

    fn lock_manager(&self) -> MutexGuard<'_, Manager> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &*self.shared.lock())
            .finish_non_exhaustive()
    }
}
