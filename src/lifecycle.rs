//! Idempotent start/stop control for a long-running background task.
//!
//! A [`LifecycleController`] owns a task factory and an optional finalizer.
//! Its run state only moves `Stopped → Pending → Ready` on start and
//! `Ready → Pending → Stopped` on stop; a call made from any other state is
//! a no-op. Every transition happens under one `tokio::sync::Mutex`, held
//! across the finalizer so a concurrent `start` cannot slip in mid-stop.
//!
//! A task that ends on its own (success or failure) stops its controller,
//! running the finalizer like an external [`stop`](LifecycleController::stop)
//! would. Each run carries a generation number so a late completion from an
//! earlier run never stops a later one.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, TyphoonError};
use crate::BoxFuture;

/// Externally visible run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    /// No task running.
    Stopped,
    /// A start or stop is in progress.
    Pending,
    /// Task running.
    Ready,
}

/// How a call to [`LifecycleController::start`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The controller was not stopped; nothing was started.
    Skipped,
    /// The task ran to completion on its own.
    Completed,
    /// The task was interrupted by [`LifecycleController::stop`].
    Cancelled,
}

type TaskFactory<C> = Arc<dyn Fn(C, CancellationToken) -> BoxFuture<'static, Result<()>> + Send + Sync>;

type Finalizer = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug)]
struct RunState {
    status: RunStatus,
    /// Interrupts the current run.
    cancel: Option<CancellationToken>,
    /// Incremented on every start.
    generation: u64,
}

struct Inner<C> {
    name: String,
    state: Mutex<RunState>,
    status_tx: watch::Sender<RunStatus>,
    task: TaskFactory<C>,
    finalizer: Option<Finalizer>,
}

impl<C> Inner<C> {
    fn set(&self, state: &mut RunState, status: RunStatus) {
        debug!(name = %self.name, from = ?state.status, to = ?status, "lifecycle transition");
        state.status = status;
        self.status_tx.send_replace(status);
    }

    /// Stop the run if ready. With `Some(generation)`, only that run.
    async fn stop_run(&self, generation: Option<u64>) {
        let mut state = self.state.lock().await;

        if state.status != RunStatus::Ready {
            debug!(name = %self.name, status = ?state.status, "stop ignored");
            return;
        }
        if generation.is_some_and(|g| g != state.generation) {
            debug!(name = %self.name, "stale completion ignored");
            return;
        }

        self.set(&mut state, RunStatus::Pending);
        if let Some(finalizer) = &self.finalizer {
            finalizer().await;
        }
        if let Some(cancel) = state.cancel.take() {
            cancel.cancel();
        }
        self.set(&mut state, RunStatus::Stopped);
        info!(name = %self.name, generation = state.generation, "stopped");
    }
}

/// Builder for [`LifecycleController`].
pub struct LifecycleBuilder<C> {
    name: String,
    task: TaskFactory<C>,
    finalizer: Option<Finalizer>,
}

impl<C> LifecycleBuilder<C> {
    /// Name used in log fields.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Run `finalizer` on every stop, before the task is interrupted.
    pub fn finalizer<F, Fut>(mut self, finalizer: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.finalizer = Some(Arc::new(move || -> BoxFuture<'static, ()> {
            Box::pin(finalizer())
        }));
        self
    }

    /// Build the controller in the stopped state.
    pub fn build(self) -> LifecycleController<C> {
        let (status_tx, _) = watch::channel(RunStatus::Stopped);
        LifecycleController {
            inner: Arc::new(Inner {
                name: self.name,
                state: Mutex::new(RunState {
                    status: RunStatus::Stopped,
                    cancel: None,
                    generation: 0,
                }),
                status_tx,
                task: self.task,
                finalizer: self.finalizer,
            }),
        }
    }
}

/// Start/stop wrapper around a cancellable background task.
///
/// Cheap to clone; clones control the same task.
///
/// # Example
///
/// ```
/// use typhoon::lifecycle::{LifecycleController, RunOutcome, RunStatus};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let controller = LifecycleController::builder(|room: String, cancel| async move {
///     cancel.cancelled().await;
///     let _ = room;
///     Ok(())
/// })
/// .name("room-watch")
/// .build();
///
/// let runner = controller.clone();
/// let run = tokio::spawn(async move { runner.start("lobby".to_string()).await });
///
/// let mut status = controller.subscribe();
/// status.wait_for(|s| *s == RunStatus::Ready).await.unwrap();
///
/// controller.stop().await;
/// assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Cancelled);
/// assert_eq!(controller.status(), RunStatus::Stopped);
/// # });
/// ```
pub struct LifecycleController<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for LifecycleController<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Send + 'static> LifecycleController<C> {
    /// Controller for `task` with no finalizer.
    ///
    /// The task receives the start context and a token that is cancelled
    /// when the controller stops.
    pub fn new<F, Fut>(task: F) -> Self
    where
        F: Fn(C, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self::builder(task).build()
    }

    /// Start building a controller for `task`.
    pub fn builder<F, Fut>(task: F) -> LifecycleBuilder<C>
    where
        F: Fn(C, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        LifecycleBuilder {
            name: "task".to_string(),
            task: Arc::new(move |ctx, cancel| -> BoxFuture<'static, Result<()>> {
                Box::pin(task(ctx, cancel))
            }),
            finalizer: None,
        }
    }

    /// Start the task and wait for it to finish.
    ///
    /// Returns [`RunOutcome::Skipped`] immediately unless stopped. Otherwise
    /// the task is spawned, the controller becomes ready, and this call
    /// resolves when the run ends: [`RunOutcome::Completed`] or the task's
    /// error if it ended on its own (the controller has stopped itself by
    /// then), [`RunOutcome::Cancelled`] if [`stop`](Self::stop) interrupted it.
    ///
    /// Dropping the returned future does not stop the task, and a run that
    /// ends while nobody awaits it (including by panic) still stops the
    /// controller.
    pub async fn start(&self, ctx: C) -> Result<RunOutcome> {
        let handle = {
            let mut state = self.inner.state.lock().await;
            if state.status != RunStatus::Stopped {
                debug!(name = %self.inner.name, status = ?state.status, "start ignored");
                return Ok(RunOutcome::Skipped);
            }

            self.inner.set(&mut state, RunStatus::Pending);
            state.generation += 1;
            let generation = state.generation;

            let cancel = CancellationToken::new();
            let task = (self.inner.task)(ctx, cancel.clone());
            let inner = Arc::clone(&self.inner);
            let token = cancel.clone();

            let handle = tokio::spawn(async move {
                // Task panics come back here as a JoinError.
                let mut run = tokio::spawn(task);
                let outcome = tokio::select! {
                    _ = token.cancelled() => {
                        run.abort();
                        let _ = run.await;
                        Ok(RunOutcome::Cancelled)
                    }
                    joined = &mut run => match joined {
                        Ok(result) => result.map(|()| RunOutcome::Completed),
                        Err(e) => Err(TyphoonError::TaskFailed(e.to_string())),
                    },
                };
                if let Err(e) = &outcome {
                    warn!(name = %inner.name, generation, error = %e, "task failed");
                }
                inner.stop_run(Some(generation)).await;
                outcome
            });

            state.cancel = Some(cancel);
            self.inner.set(&mut state, RunStatus::Ready);
            info!(name = %self.inner.name, generation, "started");
            handle
        };

        handle
            .await
            .map_err(|e| TyphoonError::TaskFailed(e.to_string()))?
    }

    /// Stop the task if ready: run the finalizer, then interrupt the task.
    ///
    /// A no-op in any other state.
    pub async fn stop(&self) {
        self.inner.stop_run(None).await;
    }

    /// Current status snapshot.
    pub fn status(&self) -> RunStatus {
        *self.inner.status_tx.borrow()
    }

    /// Observe status transitions.
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.inner.status_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counters {
        runs: Arc<AtomicUsize>,
        finals: Arc<AtomicUsize>,
    }

    /// Task that runs until cancelled.
    fn waiting_controller() -> (LifecycleController<()>, Counters) {
        let runs = Arc::new(AtomicUsize::new(0));
        let finals = Arc::new(AtomicUsize::new(0));

        let run_count = runs.clone();
        let final_count = finals.clone();
        let controller = LifecycleController::builder(move |(), cancel: CancellationToken| {
            run_count.fetch_add(1, Ordering::SeqCst);
            async move {
                cancel.cancelled().await;
                Ok(())
            }
        })
        .name("test")
        .finalizer(move || {
            let final_count = final_count.clone();
            async move {
                final_count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();

        (controller, Counters { runs, finals })
    }

    async fn wait_ready(controller: &LifecycleController<()>) {
        controller
            .subscribe()
            .wait_for(|s| *s == RunStatus::Ready)
            .await
            .unwrap();
    }

    fn spawn_start(
        controller: &LifecycleController<()>,
    ) -> tokio::task::JoinHandle<Result<RunOutcome>> {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start(()).await })
    }

    #[tokio::test]
    async fn test_double_start_runs_one_task() {
        let (controller, counters) = waiting_controller();

        let first = spawn_start(&controller);
        wait_ready(&controller).await;

        assert_eq!(controller.start(()).await.unwrap(), RunOutcome::Skipped);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 1);

        controller.stop().await;
        assert_eq!(first.await.unwrap().unwrap(), RunOutcome::Cancelled);
        assert_eq!(counters.finals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_while_stopped_is_noop() {
        let (controller, counters) = waiting_controller();

        controller.stop().await;
        controller.stop().await;
        assert_eq!(controller.status(), RunStatus::Stopped);
        assert_eq!(counters.finals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_stop_start_runs_twice() {
        let (controller, counters) = waiting_controller();

        for round in 1..=2 {
            let run = spawn_start(&controller);
            wait_ready(&controller).await;
            controller.stop().await;
            assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Cancelled);
            assert_eq!(controller.status(), RunStatus::Stopped);
            assert_eq!(counters.runs.load(Ordering::SeqCst), round);
        }
        assert_eq!(counters.finals.load(Ordering::SeqCst), 2);

        // Repeated stop after the run ended does nothing.
        controller.stop().await;
        assert_eq!(counters.finals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_natural_completion_stops_controller() {
        let finals = Arc::new(AtomicUsize::new(0));
        let final_count = finals.clone();
        let controller = LifecycleController::builder(|ticks: u32, _cancel| async move {
            for _ in 0..ticks {
                tokio::task::yield_now().await;
            }
            Ok(())
        })
        .finalizer(move || {
            let final_count = final_count.clone();
            async move {
                final_count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .build();

        assert_eq!(controller.start(3).await.unwrap(), RunOutcome::Completed);
        assert_eq!(controller.status(), RunStatus::Stopped);
        assert_eq!(finals.load(Ordering::SeqCst), 1);

        // Stopped again, so it can be restarted.
        assert_eq!(controller.start(0).await.unwrap(), RunOutcome::Completed);
        assert_eq!(finals.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_task_failure_self_stops() {
        let controller = LifecycleController::new(|(), _cancel| async {
            Err(TyphoonError::TaskFailed("sheet fetch failed".into()))
        });

        let err = controller.start(()).await.unwrap_err();
        assert!(err.to_string().contains("sheet fetch failed"));
        assert_eq!(controller.status(), RunStatus::Stopped);

        // Stop after a self-stop is a no-op.
        controller.stop().await;
        assert_eq!(controller.status(), RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_task_panic_is_reported() {
        let controller = LifecycleController::new(|(), _cancel| async {
            if true {
                panic!("boom");
            }
            Ok(())
        });

        let err = controller.start(()).await.unwrap_err();
        assert!(matches!(err, TyphoonError::TaskFailed(_)));
        assert_eq!(controller.status(), RunStatus::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_stops_without_start_caller() {
        let controller = LifecycleController::new(|(), _cancel| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if true {
                panic!("sheet parser blew up");
            }
            Ok(())
        });

        let run = spawn_start(&controller);
        wait_ready(&controller).await;
        run.abort();
        assert!(run.await.unwrap_err().is_cancelled());

        let mut status = controller.subscribe();
        tokio::time::timeout(
            Duration::from_secs(1),
            status.wait_for(|s| *s == RunStatus::Stopped),
        )
        .await
        .expect("controller stayed ready after the task died")
        .unwrap();

        // Startable again.
        let run = spawn_start(&controller);
        wait_ready(&controller).await;
        assert!(matches!(
            run.await.unwrap(),
            Err(TyphoonError::TaskFailed(_))
        ));
        assert_eq!(controller.status(), RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_finalizer_runs_before_interrupt() {
        let observed = Arc::new(std::sync::Mutex::new(None));
        let seen = observed.clone();

        let token_slot: Arc<std::sync::Mutex<Option<CancellationToken>>> = Default::default();
        let slot = token_slot.clone();

        let controller = LifecycleController::builder(move |(), cancel: CancellationToken| {
            *slot.lock().unwrap() = Some(cancel.clone());
            async move {
                cancel.cancelled().await;
                Ok(())
            }
        })
        .finalizer(move || {
            let token = token_slot.lock().unwrap().clone();
            let seen = seen.clone();
            async move {
                let cancelled = token.map(|t| t.is_cancelled());
                *seen.lock().unwrap() = cancelled;
            }
        })
        .build();

        let run = spawn_start(&controller);
        wait_ready(&controller).await;
        controller.stop().await;
        run.await.unwrap().unwrap();

        assert_eq!(*observed.lock().unwrap(), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_subscription() {
        let (controller, _counters) = waiting_controller();
        let mut status = controller.subscribe();
        assert_eq!(*status.borrow(), RunStatus::Stopped);

        let run = spawn_start(&controller);
        status.wait_for(|s| *s == RunStatus::Ready).await.unwrap();
        assert_eq!(controller.status(), RunStatus::Ready);

        let stopper = controller.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            stopper.stop().await;
        });

        status.wait_for(|s| *s == RunStatus::Stopped).await.unwrap();
        assert_eq!(run.await.unwrap().unwrap(), RunOutcome::Cancelled);
    }
}
