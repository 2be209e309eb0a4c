use std::collections::{HashMap, HashSet};
use std::path::Path;

use futures::stream::{self, BoxStream, Stream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::WatchStreamExt;
use kube::runtime::watcher::{self, Event, watcher};
use kube::{Api, Client, Config};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::types::{PodEvent, PodSnapshot};

/// Which pods to watch and how relists are treated.
#[derive(Debug, Clone, Default)]
pub struct WatchFilter {
    pub namespace: Option<String>,
    pub node: Option<String>,
    pub honor_resyncs: bool,
}

/// Build a client from an explicit kubeconfig, or from the in-cluster environment.
///
/// A kubeconfig that cannot be loaded falls back to in-cluster config.
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => match load_kubeconfig(path).await {
            Ok(config) => {
                info!("Using kubeconfig {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Could not load kubeconfig {}: {}. Falling back to in-cluster config",
                    path.display(),
                    e
                );
                Config::incluster()?
            }
        },
        None => {
            info!("No kubeconfig given, using in-cluster config");
            Config::incluster()?
        }
    };
    Ok(Client::try_from(config)?)
}

async fn load_kubeconfig(path: &Path) -> Result<Config> {
    let kubeconfig = Kubeconfig::read_from(path)?;
    Ok(Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?)
}

fn watcher_config(filter: &WatchFilter) -> watcher::Config {
    let cfg = watcher::Config::default();
    match filter.node.as_deref().filter(|n| !n.is_empty()) {
        Some(node) => cfg.fields(&format!("spec.nodeName={}", node)),
        None => cfg,
    }
}

/// Start a pod watch and expose it as typed [`PodEvent`]s.
pub fn watch_pods(client: Client, filter: &WatchFilter) -> BoxStream<'static, PodEvent> {
    let api: Api<Pod> = match filter.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let events = watcher(api, watcher_config(filter)).default_backoff();
    PodEventAdapter::new(filter.honor_resyncs)
        .adapt(events)
        .boxed()
}

type PodKey = (String, String);

/// Turns raw watcher events into [`PodEvent`]s.
///
/// Remembers the last snapshot of every pod so it can tell additions from
/// updates, drop unchanged objects on relist, and report pods that vanished
/// while the watch was being re-established.
pub struct PodEventAdapter {
    honor_resyncs: bool,
    known: HashMap<PodKey, PodSnapshot>,
    relisted: Option<HashSet<PodKey>>,
    synced_once: bool,
}

impl PodEventAdapter {
    pub fn new(honor_resyncs: bool) -> Self {
        Self {
            honor_resyncs,
            known: HashMap::new(),
            relisted: None,
            synced_once: false,
        }
    }

    pub fn adapt<S, E>(mut self, events: S) -> impl Stream<Item = PodEvent> + Send + 'static
    where
        S: Stream<Item = std::result::Result<Event<Pod>, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        events.flat_map(move |res| {
            let out = match res {
                Ok(event) => self.on_event(event),
                Err(e) => {
                    warn!("Pod watch error: {}", e);
                    Vec::new()
                }
            };
            stream::iter(out)
        })
    }

    pub fn on_event(&mut self, event: Event<Pod>) -> Vec<PodEvent> {
        match event {
            Event::Init => {
                debug!("Pod watch (re)listing");
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(pod) => {
                let Some(pod) = validate(pod) else {
                    return Vec::new();
                };
                let key = key_of(&pod);
                if let Some(relisted) = self.relisted.as_mut() {
                    relisted.insert(key.clone());
                }
                let previous = self.known.insert(key, pod.clone());
                match previous {
                    None => vec![PodEvent::Added(pod)],
                    Some(old) if old.resource_version != pod.resource_version => {
                        vec![PodEvent::Updated(pod)]
                    }
                    Some(_) if self.honor_resyncs => vec![PodEvent::Added(pod)],
                    Some(_) => Vec::new(),
                }
            }
            Event::InitDone => {
                let mut out = Vec::new();
                if let Some(relisted) = self.relisted.take() {
                    let gone: Vec<PodKey> = self
                        .known
                        .keys()
                        .filter(|k| !relisted.contains(*k))
                        .cloned()
                        .collect();
                    for key in gone {
                        if let Some(pod) = self.known.remove(&key) {
                            out.push(PodEvent::Deleted(pod));
                        }
                    }
                }
                if !self.synced_once {
                    self.synced_once = true;
                    info!("Pod watch initial sync complete ({} pods)", self.known.len());
                }
                out.push(PodEvent::Synced);
                out
            }
            Event::Apply(pod) => {
                let Some(pod) = validate(pod) else {
                    return Vec::new();
                };
                match self.known.insert(key_of(&pod), pod.clone()) {
                    None => vec![PodEvent::Added(pod)],
                    Some(_) => vec![PodEvent::Updated(pod)],
                }
            }
            Event::Delete(pod) => {
                let Some(pod) = validate(pod) else {
                    return Vec::new();
                };
                self.known.remove(&key_of(&pod));
                vec![PodEvent::Deleted(pod)]
            }
        }
    }
}

fn key_of(pod: &PodSnapshot) -> PodKey {
    (pod.namespace.clone(), pod.name.clone())
}

fn validate(pod: Pod) -> Option<PodSnapshot> {
    match PodSnapshot::try_from(pod) {
        Ok(pod) => Some(pod),
        Err(e) => {
            warn!("Dropping malformed pod from watch: {}", e);
            None
        }
    }
}
