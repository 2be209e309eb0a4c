use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::handler::{Dispatch, OwnershipSink, PodEventHandler};
use crate::ownership::JobLookup;
use crate::types::PodEvent;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// How long the initial list may take before the watch counts as failed.
    pub sync_timeout: Duration,
    /// Upper bound on concurrently running resolutions.
    pub max_in_flight: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            sync_timeout: Duration::from_secs(600),
            max_in_flight: 8,
        }
    }
}

/// Owns the task that drives a pod watch through the event handler.
pub struct WatchSupervisor {
    cancel: CancellationToken,
    ready: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

impl Default for WatchSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchSupervisor {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            ready: CancellationToken::new(),
            task: None,
        }
    }

    /// Cancelled once the initial list of pods has been handled.
    pub fn ready(&self) -> CancellationToken {
        self.ready.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawn the watch task. A second call while a task exists is ignored.
    pub fn start<St, L, S>(
        &mut self,
        events: St,
        handler: Arc<PodEventHandler<L, S>>,
        options: PipelineOptions,
    ) where
        St: Stream<Item = PodEvent> + Send + 'static,
        L: JobLookup + 'static,
        S: OwnershipSink + 'static,
    {
        if self.task.is_some() {
            warn!("Pod watch already started");
            return;
        }
        info!("start watching for pods");
        let task = tokio::spawn(run(
            events,
            handler,
            options,
            self.ready.clone(),
            self.cancel.clone(),
        ));
        self.task = Some(task);
    }

    /// Ask the watch task to terminate. Calling it more than once is harmless.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            info!("Stopping pod watch");
            self.cancel.cancel();
        }
    }

    /// Wait for the watch task to finish, returning its outcome.
    ///
    /// The task handle stays owned by the supervisor until the task has
    /// finished, so dropping a pending `wait` does not detach it.
    pub async fn wait(&mut self) -> Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let outcome = task.await;
        self.task = None;
        outcome?
    }
}

async fn run<St, L, S>(
    events: St,
    handler: Arc<PodEventHandler<L, S>>,
    options: PipelineOptions,
    ready: CancellationToken,
    cancel: CancellationToken,
) -> Result<()>
where
    St: Stream<Item = PodEvent> + Send + 'static,
    L: JobLookup + 'static,
    S: OwnershipSink + 'static,
{
    let resolving = handler.clone();
    let dispatches = events
        .map(move |event| {
            let handler = resolving.clone();
            async move { handler.prepare(event).await }
        })
        .buffered(options.max_in_flight.max(1));
    tokio::pin!(dispatches);

    let sync_deadline = tokio::time::sleep(options.sync_timeout);
    tokio::pin!(sync_deadline);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Pod watch stopped");
                return Ok(());
            }
            _ = &mut sync_deadline, if !ready.is_cancelled() => {
                return Err(Error::SyncTimeout(options.sync_timeout));
            }
            next = dispatches.next() => match next {
                Some(dispatch) => {
                    if matches!(dispatch, Dispatch::Synced) {
                        ready.cancel();
                    }
                    handler.emit(dispatch);
                }
                None => {
                    warn!("Pod watch stream ended");
                    return Ok(());
                }
            }
        }
    }
}
