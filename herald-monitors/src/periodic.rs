//! Periodic check tasks shared by the monitors

use herald_core::{AlertError, EngineState, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A group of interval tasks stopped together
pub struct PeriodicTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    runtime: tokio::runtime::Handle,
}

impl PeriodicTasks {
    /// Must be called from within a tokio runtime
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AlertError::NoRuntime("start a monitor"))?;
        Ok(Self {
            cancel: CancellationToken::new(),
            handles: Vec::new(),
            runtime,
        })
    }

    /// Run `tick` every `period` (first run after one period) until cancelled
    pub fn spawn<F>(&mut self, name: &'static str, period: Duration, mut tick: F)
    where
        F: FnMut() + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let period = period.max(Duration::from_millis(1));
        let handle = self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            debug!(task = name, ?period, "Periodic task started");
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => tick(),
                }
            }
            debug!(task = name, "Periodic task stopped");
        });
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Cancel every task and wait for them to exit
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for handle in std::mem::take(&mut self.handles) {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTasks {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Error for starting a monitor that is already running
pub(crate) fn already_running() -> AlertError {
    AlertError::Lifecycle {
        operation: "start monitor",
        state: EngineState::Running,
    }
}
