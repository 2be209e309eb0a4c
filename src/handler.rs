use std::io::Write;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::ownership::{JobLookup, OwnershipResolver};
use crate::types::{EventKind, OwnershipRecord, PodEvent, PodSnapshot};

/// Destination for resolved ownership records.
pub trait OwnershipSink: Send + Sync {
    fn publish(&self, record: OwnershipRecord);
}

/// Emits each record as a structured log line.
pub struct LogSink;

impl OwnershipSink for LogSink {
    fn publish(&self, record: OwnershipRecord) {
        info!(
            pod = %record.pod,
            namespace = %record.namespace,
            event = %record.event,
            owners = %record.owners,
            "pod ownership resolved"
        );
    }
}

/// Writes each record as one JSON object per line.
pub struct JsonSink<W> {
    out: Mutex<W>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

impl<W: Write + Send> OwnershipSink for JsonSink<W> {
    fn publish(&self, record: OwnershipRecord) {
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize ownership of pod {}: {}", record.pod, e);
                return;
            }
        };
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            warn!("Failed to write ownership of pod {}: {}", record.pod, e);
        }
    }
}

impl<S: OwnershipSink + ?Sized> OwnershipSink for Box<S> {
    fn publish(&self, record: OwnershipRecord) {
        (**self).publish(record)
    }
}

/// Outcome of the resolution half of event handling, before anything is published.
#[derive(Debug)]
pub enum Dispatch {
    Publish(OwnershipRecord),
    Deleted(PodSnapshot),
    Synced,
}

/// Resolves ownership for added and updated pods and hands the result to a sink.
///
/// Deleted pods are only logged: their owners may already be gone.
pub struct PodEventHandler<L, S> {
    resolver: OwnershipResolver<L>,
    sink: S,
}

impl<L: JobLookup, S: OwnershipSink> PodEventHandler<L, S> {
    pub fn new(resolver: OwnershipResolver<L>, sink: S) -> Self {
        Self { resolver, sink }
    }

    #[cfg(test)]
    pub fn into_sink(self) -> S {
        self.sink
    }

    pub async fn on_add(&self, pod: PodSnapshot) {
        let record = self.resolve(pod, EventKind::Added).await;
        self.sink.publish(record);
    }

    pub async fn on_update(&self, pod: PodSnapshot) {
        let record = self.resolve(pod, EventKind::Updated).await;
        self.sink.publish(record);
    }

    pub fn on_delete(&self, pod: PodSnapshot) {
        info!("Watcher Pod delete: {}/{}", pod.namespace, pod.name);
    }

    pub async fn handle(&self, event: PodEvent) {
        let dispatch = self.prepare(event).await;
        self.emit(dispatch);
    }

    /// Resolution step. Safe to run for several events at once.
    pub async fn prepare(&self, event: PodEvent) -> Dispatch {
        match event {
            PodEvent::Added(pod) => Dispatch::Publish(self.resolve(pod, EventKind::Added).await),
            PodEvent::Updated(pod) => {
                Dispatch::Publish(self.resolve(pod, EventKind::Updated).await)
            }
            PodEvent::Deleted(pod) => Dispatch::Deleted(pod),
            PodEvent::Synced => Dispatch::Synced,
        }
    }

    /// Publishing step. Called once per event, in delivery order.
    pub fn emit(&self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Publish(record) => self.sink.publish(record),
            Dispatch::Deleted(pod) => self.on_delete(pod),
            Dispatch::Synced => debug!("Pod watch synced"),
        }
    }

    async fn resolve(&self, pod: PodSnapshot, event: EventKind) -> OwnershipRecord {
        debug!("Watcher Pod {}: {}/{}", event, pod.namespace, pod.name);
        let owners = self.resolver.resolve(&pod).await;
        OwnershipRecord {
            pod: pod.name,
            namespace: pod.namespace,
            event,
            observed_at: chrono::Utc::now(),
            owners,
        }
    }
}
