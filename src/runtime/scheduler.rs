use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};

use crate::error::EngineResult;
use crate::runtime::engine::Engine;
use crate::runtime::storage::ExecutionStore;

/// Periodically advances every live instance, so expired timers fire
/// without anybody touching the instance.
#[derive(Debug, Clone)]
pub struct TimeoutJob {
    engine: Arc<Engine>,
    store: Arc<Mutex<ExecutionStore>>,
    period: Duration,
}

// tokio intervals need a non-zero period.
const MIN_PERIOD: Duration = Duration::from_millis(1);

impl TimeoutJob {
    /// A zero `period` is raised to one millisecond.
    pub fn new(engine: Arc<Engine>, store: Arc<Mutex<ExecutionStore>>, period: Duration) -> Self {
        Self {
            engine,
            store,
            period: period.max(MIN_PERIOD),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// One `update_all` pass inside a transaction.
    pub async fn tick(&self) -> EngineResult<()> {
        let mut store = self.store.lock().await;
        store.transaction(|store| self.engine.update_all(store))
    }

    /// Ticks until `shutdown` resolves or a fatal error occurs.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> EngineResult<()> {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!(period_ms = self.period.as_millis() as u64, "Timeout job started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Timeout job stopped");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(()) => {}
                        Err(e) if e.is_fatal() => {
                            error!(error = %e, "Timeout job aborted");
                            return Err(e);
                        }
                        Err(e) => warn!(error = %e, "Timeout check failed, retrying next tick"),
                    }
                }
            }
        }
    }
}
