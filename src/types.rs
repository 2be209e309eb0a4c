use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use serde::Serialize;

/// A pod as seen by the handler: already validated at the watch boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PodSnapshot {
    pub name: String,
    pub namespace: String,
    pub resource_version: Option<String>,
    pub owner_references: Vec<OwnerReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPod {
    #[error("pod has no name")]
    MissingName,
    #[error("pod {0} has no namespace")]
    MissingNamespace(String),
}

impl TryFrom<Pod> for PodSnapshot {
    type Error = InvalidPod;

    fn try_from(pod: Pod) -> Result<Self, Self::Error> {
        let meta = pod.metadata;
        let name = meta
            .name
            .filter(|n| !n.is_empty())
            .ok_or(InvalidPod::MissingName)?;
        let namespace = meta
            .namespace
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| InvalidPod::MissingNamespace(name.clone()))?;
        Ok(Self {
            name,
            namespace,
            resource_version: meta.resource_version,
            owner_references: meta.owner_references.unwrap_or_default(),
        })
    }
}

/// Typed watch payload handed to the event handler.
#[derive(Debug, Clone, PartialEq)]
pub enum PodEvent {
    Added(PodSnapshot),
    Updated(PodSnapshot),
    Deleted(PodSnapshot),
    /// The initial list of pods has been delivered.
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Added,
    Updated,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Added => f.write_str("added"),
            EventKind::Updated => f.write_str("updated"),
        }
    }
}

/// Flat `<kind>.name -> owner name` mapping for a single pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OwnershipMetadata(BTreeMap<String, String>);

impl OwnershipMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert only when the key is not there yet.
    pub fn insert_first(&mut self, key: String, name: String) {
        self.0.entry(key).or_insert(name);
    }

    pub fn set(&mut self, key: &str, name: String) {
        self.0.insert(key.to_string(), name);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for OwnershipMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pairs = self
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&pairs)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for OwnershipMetadata {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// What gets handed to the sink for each added or updated pod.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OwnershipRecord {
    pub pod: String,
    pub namespace: String,
    pub event: EventKind,
    pub observed_at: chrono::DateTime<chrono::Utc>,
    pub owners: OwnershipMetadata,
}
