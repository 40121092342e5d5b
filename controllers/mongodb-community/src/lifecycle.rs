//! Process lifecycle.
//!
//! Starts the manager and maps how it ends to the process exit status.
//! The first SIGINT or SIGTERM cancels the shutdown token and the manager
//! drains; a second one exits immediately.

use crate::error::{ControllerError, Stage};
use crate::manager::Manager;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Where the process is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Manager not started yet
    NotStarted,
    /// Manager running
    Running,
    /// Manager stopped after a shutdown request
    Stopped,
    /// Manager failed
    Crashed,
}

/// Drives a manager from start to exit.
#[derive(Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Lifecycle in the `NotStarted` state.
    pub fn new() -> Self {
        Self {
            state: LifecycleState::NotStarted,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Start `manager` and block until it stops.
    ///
    /// A lifecycle runs at most once; there is no in-process restart.
    pub async fn run(&mut self, manager: Manager, shutdown: CancellationToken) -> Result<(), ControllerError> {
        if self.state != LifecycleState::NotStarted {
            return Err(ControllerError::Runtime(format!(
                "manager cannot be started from state {:?}",
                self.state
            )));
        }

        info!("Starting the manager");
        self.state = LifecycleState::Running;
        match manager.start(shutdown).await {
            Ok(()) => {
                info!("Manager stopped");
                self.state = LifecycleState::Stopped;
                Ok(())
            }
            Err(e) => {
                self.state = LifecycleState::Crashed;
                Err(e)
            }
        }
    }

    /// Process exit status for the current state.
    pub fn exit_code(&self) -> u8 {
        match self.state {
            LifecycleState::Stopped => 0,
            LifecycleState::NotStarted | LifecycleState::Running | LifecycleState::Crashed => 1,
        }
    }
}

/// Token cancelled on the first termination signal.
///
/// Must be called from within a Tokio runtime. A second signal terminates
/// the process with status 1 without waiting for the manager.
pub fn shutdown_token() -> Result<CancellationToken, ControllerError> {
    let mut signals = ShutdownSignals::install()?;
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        signals.recv().await;
        info!("Received shutdown signal, stopping manager");
        trigger.cancel();

        signals.recv().await;
        warn!("Received second shutdown signal, exiting immediately");
        std::process::exit(1);
    });

    Ok(token)
}

#[cfg(unix)]
struct ShutdownSignals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl ShutdownSignals {
    fn install() -> Result<Self, ControllerError> {
        use tokio::signal::unix::{signal, SignalKind};

        let listen = |kind: SignalKind| {
            signal(kind).map_err(|e| ControllerError::construction(Stage::Signal, e.to_string()))
        };
        Ok(Self {
            interrupt: listen(SignalKind::interrupt())?,
            terminate: listen(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) {
        tokio::select! {
            _ = self.interrupt.recv() => {}
            _ = self.terminate.recv() => {}
        }
    }
}

#[cfg(not(unix))]
struct ShutdownSignals;

#[cfg(not(unix))]
impl ShutdownSignals {
    fn install() -> Result<Self, ControllerError> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for {}: {}", Stage::Signal, e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::ManagerOptions;
    use crate::test_utils::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn manager_with(behavior: TestBehavior) -> (Manager, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
        let mut manager = Manager::new(
            test_connection_config(),
            ManagerOptions::default(),
            &RecordingCachePrimitive::default(),
        )
        .unwrap();
        let (runnable, started) = TestRunnable::new("test", behavior);
        manager.add(Box::new(runnable)).unwrap();
        (manager, started)
    }

    #[tokio::test]
    async fn test_cancel_while_running_stops_cleanly() {
        let (manager, started) = manager_with(TestBehavior::UntilShutdown);
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::NotStarted);

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        lifecycle.run(manager, shutdown).await.unwrap();
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert_eq!(lifecycle.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_runnable_failure_crashes() {
        let (manager, _) = manager_with(TestBehavior::Fail("watch stream closed".to_string()));
        let mut lifecycle = Lifecycle::new();

        let err = lifecycle.run(manager, CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Run);
        assert_eq!(lifecycle.state(), LifecycleState::Crashed);
        assert_eq!(lifecycle.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_runs_at_most_once() {
        let (first, _) = manager_with(TestBehavior::UntilShutdown);
        let (second, second_started) = manager_with(TestBehavior::UntilShutdown);
        let mut lifecycle = Lifecycle::new();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        lifecycle.run(first, shutdown.clone()).await.unwrap();

        assert!(lifecycle.run(second, shutdown).await.is_err());
        assert_eq!(second_started.load(Ordering::SeqCst), 0);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_not_started_is_a_failure_exit() {
        assert_eq!(Lifecycle::default().exit_code(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_termination_signal_cancels_token() {
        let token = shutdown_token().unwrap();
        assert!(!token.is_cancelled());

        let status = tokio::process::Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .await
            .unwrap();
        assert!(status.success());

        tokio::time::timeout(Duration::from_secs(5), token.cancelled())
            .await
            .unwrap();
        assert!(token.is_cancelled());
    }
}
