//! Background sweeps.
//!
//! Each periodic job runs on its own `tokio::time::interval` loop owned by a
//! [`Scheduler`]. Loops skip the immediate first tick and stop as soon as the
//! shared [`Shutdown`] signal fires; a job already running is left to finish
//! (long jobs poll [`Shutdown::is_triggered`] themselves).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::notify::NotificationDispatcher;
use crate::quorum::QuorumEngine;
use crate::trust::TrustService;

/// Fires the shutdown signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

/// Cloneable shutdown signal.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn new() -> (ShutdownTrigger, Shutdown) {
        let (sender, receiver) = watch::channel(false);
        (ShutdownTrigger { sender }, Shutdown { receiver })
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the signal fires, or the trigger is dropped.
    pub async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        let _ = receiver.wait_for(|&fired| fired).await;
    }
}

/// Sweep periods.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Delivery-cache eviction period (seconds).
    pub delivery_eviction_secs: u64,

    /// Pending expiry and repair period (seconds).
    pub pending_maintenance_secs: u64,

    /// Full trust recompute period (seconds).
    pub trust_recompute_secs: u64,
}

impl SweepConfig {
    pub fn delivery_eviction(&self) -> Duration {
        Duration::from_secs(self.delivery_eviction_secs)
    }

    pub fn pending_maintenance(&self) -> Duration {
        Duration::from_secs(self.pending_maintenance_secs)
    }

    pub fn trust_recompute(&self) -> Duration {
        Duration::from_secs(self.trust_recompute_secs)
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            delivery_eviction_secs: 5 * 60,
            pending_maintenance_secs: 5 * 60,
            trust_recompute_secs: 24 * 60 * 60,
        }
    }
}

/// Services whose maintenance methods the scheduler drives.
#[derive(Clone)]
pub struct Sweepers {
    pub quorum: Arc<QuorumEngine>,
    pub trust: TrustService,
    pub dispatcher: Arc<NotificationDispatcher>,
}

/// Owns the periodic background tasks.
pub struct Scheduler {
    trigger: ShutdownTrigger,
    shutdown: Shutdown,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// An empty scheduler.
    pub fn new() -> Self {
        let (trigger, shutdown) = Shutdown::new();
        Self {
            trigger,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Start the standard sweeps.
    pub fn start(config: &SweepConfig, sweepers: Sweepers) -> Self {
        let mut scheduler = Self::new();

        let dispatcher = sweepers.dispatcher;
        scheduler.every("delivery eviction", config.delivery_eviction(), move || {
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                dispatcher.evict_deliveries();
            }
        });

        let quorum = sweepers.quorum;
        scheduler.every("pending maintenance", config.pending_maintenance(), move || {
            let quorum = Arc::clone(&quorum);
            async move {
                if let Err(e) = quorum.expire_stale().await {
                    warn!(error = %e, "expiry sweep failed");
                }
                match quorum.repair_promoted().await {
                    Ok(0) => {}
                    Ok(repaired) => info!(repaired, "repair sweep restored incidents"),
                    Err(e) => warn!(error = %e, "repair sweep failed"),
                }
            }
        });

        let trust = sweepers.trust;
        let shutdown = scheduler.shutdown();
        scheduler.every("trust recompute", config.trust_recompute(), move || {
            let trust = trust.clone();
            let shutdown = shutdown.clone();
            async move {
                match trust.recompute_all(&shutdown).await {
                    Ok(updated) => info!(updated, "trust recompute finished"),
                    Err(e) => warn!(error = %e, "trust recompute failed"),
                }
            }
        });

        scheduler
    }

    /// A handle on the scheduler's shutdown signal.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run `job` every `period` until shutdown.
    pub fn every<F, Fut>(&mut self, name: &'static str, period: Duration, mut job: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval.tick().await; // First tick is immediate, skip it
            loop {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = interval.tick() => {
                        debug!(task = name, "sweep running");
                        job().await;
                    }
                }
            }
            debug!(task = name, "sweep stopped");
        });
        self.tasks.push((name, handle));
    }

    /// Signal every task to stop and wait for them.
    pub async fn stop(self) {
        self.trigger.trigger();
        for (name, handle) in self.tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "sweep task panicked");
            }
        }
        info!("background sweeps stopped");
    }
}
