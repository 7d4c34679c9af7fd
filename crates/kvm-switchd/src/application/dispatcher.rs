//! Single-consumer serialization point around the Switch Engine.
//!
//! The engine is moved into one worker task.  The control endpoint and the
//! hotkey monitor never touch it directly; they hold a cloneable
//! [`SwitchHandle`] that queues a request on a bounded channel and waits for
//! the worker's one-shot reply.  A transition requested while another is in
//! flight waits in the queue until the first one has finished.

use async_trait::async_trait;
use kvm_switch_core::SwitchTarget;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::application::switch_engine::{SwitchEngine, SwitchError, SwitchReport};

/// Maximum number of transitions waiting behind the one in flight.
const QUEUE_DEPTH: usize = 8;

/// Something that can perform a transition from async code.
#[async_trait]
pub trait Switcher: Send + Sync {
    async fn switch_to(
        &self,
        target: SwitchTarget,
        skip_optional: bool,
    ) -> Result<SwitchReport, SwitchError>;
}

/// Something that can perform a transition from a plain OS thread.
///
/// The hotkey monitor runs a blocking poll loop outside the async runtime
/// and uses this form.
pub trait BlockingSwitcher: Send + Sync {
    fn switch_to_blocking(
        &self,
        target: SwitchTarget,
        skip_optional: bool,
    ) -> Result<SwitchReport, SwitchError>;
}

impl<T: BlockingSwitcher + ?Sized> BlockingSwitcher for std::sync::Arc<T> {
    fn switch_to_blocking(
        &self,
        target: SwitchTarget,
        skip_optional: bool,
    ) -> Result<SwitchReport, SwitchError> {
        (**self).switch_to_blocking(target, skip_optional)
    }
}

struct SwitchJob {
    target: SwitchTarget,
    skip_optional: bool,
    reply: oneshot::Sender<Result<SwitchReport, SwitchError>>,
}

/// Producer side of the dispatcher.  Cheap to clone.
#[derive(Clone)]
pub struct SwitchHandle {
    jobs: mpsc::Sender<SwitchJob>,
}

impl SwitchHandle {
    fn job(
        target: SwitchTarget,
        skip_optional: bool,
    ) -> (SwitchJob, oneshot::Receiver<Result<SwitchReport, SwitchError>>) {
        let (reply, rx) = oneshot::channel();
        (
            SwitchJob {
                target,
                skip_optional,
                reply,
            },
            rx,
        )
    }
}

#[async_trait]
impl Switcher for SwitchHandle {
    async fn switch_to(
        &self,
        target: SwitchTarget,
        skip_optional: bool,
    ) -> Result<SwitchReport, SwitchError> {
        let (job, rx) = Self::job(target, skip_optional);
        self.jobs
            .send(job)
            .await
            .map_err(|_| SwitchError::WorkerStopped)?;
        rx.await.map_err(|_| SwitchError::WorkerStopped)?
    }
}

impl BlockingSwitcher for SwitchHandle {
    /// Must not be called from inside the async runtime.
    fn switch_to_blocking(
        &self,
        target: SwitchTarget,
        skip_optional: bool,
    ) -> Result<SwitchReport, SwitchError> {
        let (job, rx) = Self::job(target, skip_optional);
        self.jobs
            .blocking_send(job)
            .map_err(|_| SwitchError::WorkerStopped)?;
        rx.blocking_recv().map_err(|_| SwitchError::WorkerStopped)?
    }
}

/// Moves `engine` into a new worker task and returns the handle producers
/// use to reach it.
///
/// The worker exits once every [`SwitchHandle`] has been dropped.
pub fn spawn_switch_worker(engine: SwitchEngine) -> (SwitchHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let worker = tokio::spawn(run_worker(engine, rx));
    (SwitchHandle { jobs: tx }, worker)
}

async fn run_worker(engine: SwitchEngine, mut jobs: mpsc::Receiver<SwitchJob>) {
    while let Some(job) = jobs.recv().await {
        let transition_id = Uuid::new_v4();
        let span = info_span!(
            "transition",
            id = %transition_id,
            to = %job.target,
            skip_optional = job.skip_optional,
        );

        let result = engine
            .switch_to(job.target, job.skip_optional)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match &result {
            Ok(report) if report.has_soft_failures() => warn!(
                attached = report.attached.len(),
                detached = report.detached.len(),
                display_failures = report.display_failures.len(),
                command_failures = report.command_failures.len(),
                "switch finished with failures"
            ),
            Ok(report) => info!(
                attached = report.attached.len(),
                detached = report.detached.len(),
                "switch finished"
            ),
            Err(e) => error!("switch failed: {e}"),
        });

        if job.reply.send(result).is_err() {
            warn!(id = %transition_id, "requester went away before the switch finished");
        }
    }
    info!("switch worker stopped");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::switch_engine::{
        CommandRunner, DisplayController, HostdevManager, HypervisorError, SwitchProfile,
    };
    use crate::infrastructure::commands::mock::MockCommandRunner;
    use crate::infrastructure::display::mock::MockDisplayController;
    use crate::infrastructure::hypervisor::mock::MockHypervisor;
    use kvm_switch_core::{DeviceIdentity, DeviceRequirement, DeviceSelection};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const KEYBOARD: DeviceIdentity = DeviceIdentity::new(0x046d, 0xc52b);

    /// Hostdev manager that records how many calls overlap in time.
    #[derive(Default)]
    struct OverlapProbe {
        active: AtomicUsize,
        max_active: AtomicUsize,
        lists: AtomicUsize,
    }

    #[async_trait]
    impl HostdevManager for OverlapProbe {
        async fn list_attached(&self) -> Result<Vec<DeviceIdentity>, HypervisorError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.lists.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn attach(&self, _device: DeviceIdentity) -> Result<(), HypervisorError> {
            Ok(())
        }

        async fn detach(&self, _device: DeviceIdentity) -> Result<(), HypervisorError> {
            Ok(())
        }
    }

    fn engine_with(hostdevs: Arc<dyn HostdevManager>) -> SwitchEngine {
        let profile = SwitchProfile {
            devices: DeviceSelection::new([DeviceRequirement {
                identity: KEYBOARD,
                essential: true,
            }]),
            ..Default::default()
        };
        SwitchEngine::new(
            profile,
            hostdevs,
            Arc::new(MockDisplayController::default()) as Arc<dyn DisplayController>,
            Arc::new(MockCommandRunner::default()) as Arc<dyn CommandRunner>,
        )
    }

    #[tokio::test]
    async fn test_handle_returns_engine_report() {
        // Arrange
        let hypervisor = Arc::new(MockHypervisor::default());
        let (handle, _worker) =
            spawn_switch_worker(engine_with(Arc::clone(&hypervisor) as Arc<dyn HostdevManager>));

        // Act
        let report = handle.switch_to(SwitchTarget::Guest, false).await.unwrap();

        // Assert
        assert_eq!(report.target, SwitchTarget::Guest);
        assert_eq!(report.attached, vec![KEYBOARD]);
        assert_eq!(hypervisor.attached(), vec![KEYBOARD]);
    }

    #[tokio::test]
    async fn test_handle_returns_engine_error() {
        let hypervisor = Arc::new(MockHypervisor::offline());
        let (handle, _worker) = spawn_switch_worker(engine_with(hypervisor));

        let result = handle.switch_to(SwitchTarget::Host, false).await;

        assert!(matches!(result, Err(SwitchError::Hypervisor(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_never_overlap() {
        // Arrange
        let probe = Arc::new(OverlapProbe::default());
        let (handle, _worker) =
            spawn_switch_worker(engine_with(Arc::clone(&probe) as Arc<dyn HostdevManager>));

        // Act: six producers fire at once.
        let mut tasks = Vec::new();
        for i in 0..6 {
            let handle = handle.clone();
            let target = if i % 2 == 0 {
                SwitchTarget::Guest
            } else {
                SwitchTarget::Host
            };
            tasks.push(tokio::spawn(async move {
                handle.switch_to(target, false).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        // Assert
        assert_eq!(probe.lists.load(Ordering::SeqCst), 6);
        assert_eq!(probe.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_handle_works_from_os_thread() {
        // Arrange
        let hypervisor = Arc::new(MockHypervisor::default());
        let (handle, _worker) =
            spawn_switch_worker(engine_with(Arc::clone(&hypervisor) as Arc<dyn HostdevManager>));

        // Act
        let report = tokio::task::spawn_blocking(move || {
            handle.switch_to_blocking(SwitchTarget::Guest, true)
        })
        .await
        .unwrap()
        .unwrap();

        // Assert
        assert!(report.skip_optional);
        assert_eq!(hypervisor.attached(), vec![KEYBOARD]);
    }

    #[tokio::test]
    async fn test_stopped_worker_reports_worker_stopped() {
        // Arrange
        let (handle, worker) = spawn_switch_worker(engine_with(Arc::new(MockHypervisor::default())));
        worker.abort();
        let _ = worker.await;

        // Act
        let result = handle.switch_to(SwitchTarget::Guest, false).await;

        // Assert
        assert!(matches!(result, Err(SwitchError::WorkerStopped)));
    }
}
