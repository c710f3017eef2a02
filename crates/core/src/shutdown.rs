//! Graceful shutdown coordinator
//!
//! Background workers register with the coordinator and receive a
//! [`ShutdownHandle`] carrying a child [`CancellationToken`]. Cancellation is
//! cooperative: workers check the token at their own safe points (between
//! sync cycles, between movies) and report completion so the coordinator can
//! stop waiting early.
//!
//! # Shutdown Phases
//!
//! 1. **Drain**: cancel every registered task's token
//! 2. **Wait**: wait up to `wait_timeout` for tasks to report completion
//!
//! # Example
//!
//! ```no_run
//! use vod_catalog_core::shutdown::ShutdownCoordinator;
//!
//! # async fn example() {
//! let coordinator = ShutdownCoordinator::default();
//! let handle = coordinator.register_task("episode-sync");
//!
//! tokio::spawn(async move {
//!     handle.wait_for_shutdown().await;
//!     handle.notify_complete();
//! });
//!
//! coordinator.wait_for_signal().await;
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default time allowed for tasks to finish after cancellation (30 seconds)
const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;

/// Configuration for shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// How long to wait for registered tasks after cancelling them
    pub wait_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Default)]
struct TaskCounters {
    registered: AtomicUsize,
    completed: AtomicUsize,
    changed: Notify,
}

/// Shutdown coordinator for background workers
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    config: ShutdownConfig,
    token: CancellationToken,
    counters: Arc<TaskCounters>,
}

impl ShutdownCoordinator {
    /// Create a new shutdown coordinator with the given configuration
    pub fn new(config: ShutdownConfig) -> Self {
        Self {
            config,
            token: CancellationToken::new(),
            counters: Arc::new(TaskCounters::default()),
        }
    }

    /// Register a task that should be tracked during shutdown
    pub fn register_task(&self, task_name: &str) -> ShutdownHandle {
        let total = self.counters.registered.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            task_name = %task_name,
            total_tasks = total,
            "Task registered for shutdown coordination"
        );

        ShutdownHandle {
            task_name: task_name.to_string(),
            token: self.token.child_token(),
            counters: Arc::clone(&self.counters),
            completed: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }
    }

    /// Token cancelled when shutdown begins
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for SIGTERM/SIGINT (or Ctrl+C) and run the shutdown sequence
    pub async fn wait_for_signal(&self) {
        info!("Shutdown coordinator waiting for signal");

        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            match (
                signal(SignalKind::terminate()),
                signal(SignalKind::interrupt()),
            ) {
                (Ok(mut sigterm), Ok(mut sigint)) => {
                    tokio::select! {
                        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
                        _ = self.token.cancelled() => info!("Shutdown requested programmatically"),
                    }
                }
                _ => {
                    warn!("Failed to register signal handlers, falling back to Ctrl+C");
                    self.wait_for_ctrl_c().await;
                }
            }
        }

        #[cfg(not(unix))]
        self.wait_for_ctrl_c().await;

        self.shutdown().await;
    }

    async fn wait_for_ctrl_c(&self) {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!(error = %e, "Ctrl+C handler failed");
                }
                info!("Received Ctrl+C, initiating graceful shutdown");
            }
            _ = self.token.cancelled() => info!("Shutdown requested programmatically"),
        }
    }

    /// Cancel every registered task and wait for them to report completion
    ///
    /// Returns `true` when all tasks completed within the wait timeout.
    pub async fn shutdown(&self) -> bool {
        info!("Entering drain phase");
        self.token.cancel();

        let registered = self.counters.registered.load(Ordering::SeqCst);
        info!(
            timeout_ms = self.config.wait_timeout.as_millis() as u64,
            registered_tasks = registered,
            "Entering wait phase"
        );

        let counters = Arc::clone(&self.counters);
        let wait_all = async move {
            loop {
                let notified = counters.changed.notified();
                if counters.completed.load(Ordering::SeqCst)
                    >= counters.registered.load(Ordering::SeqCst)
                {
                    break;
                }
                notified.await;
            }
        };

        match tokio::time::timeout(self.config.wait_timeout, wait_all).await {
            Ok(()) => {
                info!("All tasks completed gracefully");
                true
            }
            Err(_) => {
                let completed = self.counters.completed.load(Ordering::SeqCst);
                warn!(
                    completed_tasks = completed,
                    remaining_tasks = registered.saturating_sub(completed),
                    "Wait timeout exceeded, abandoning remaining tasks"
                );
                false
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new(ShutdownConfig::default())
    }
}

/// Handle for a registered task
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    task_name: String,
    token: CancellationToken,
    counters: Arc<TaskCounters>,
    completed: Arc<std::sync::atomic::AtomicBool>,
}

impl ShutdownHandle {
    /// Cancellation token for this task
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Resolve once shutdown has been signalled
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// Report that this task finished its cleanup
    ///
    /// Only the first call per task is counted.
    pub fn notify_complete(&self) {
        if self.completed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
        self.counters.changed.notify_waiters();
        info!(task_name = %self.task_name, "Task completed shutdown");
    }
}
