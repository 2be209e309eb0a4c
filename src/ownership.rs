//! Resolution of a pod's controller-ownership chain into flat metadata.
//!
//! Pods only carry a reference to their immediate controller. For pods run by
//! a Job the CronJob behind it is found by fetching the Job and reading its
//! own controller reference.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Api, Client};
use tracing::debug;

use crate::error::JobLookupError;
use crate::types::{OwnershipMetadata, PodSnapshot};

pub const JOB_KEY: &str = "job.name";
pub const CRONJOB_KEY: &str = "cronjob.name";
const CRONJOB_KIND: &str = "CronJob";

const DEFAULT_KINDS: [&str; 6] = [
    "Deployment",
    "ReplicaSet",
    "StatefulSet",
    "DaemonSet",
    "Job",
    CRONJOB_KIND,
];

/// Controller kinds that produce a `<kind>.name` entry. Anything else is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerKinds(BTreeSet<String>);

impl Default for ControllerKinds {
    fn default() -> Self {
        Self(DEFAULT_KINDS.iter().map(|k| k.to_string()).collect())
    }
}

impl ControllerKinds {
    pub fn with_extra<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.0.extend(
            extra
                .into_iter()
                .map(Into::into)
                .filter(|kind: &String| !kind.is_empty()),
        );
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.0.contains(kind)
    }
}

fn metadata_key(kind: &str) -> String {
    format!("{}.name", kind.to_lowercase())
}

fn is_controller(owner: &OwnerReference) -> bool {
    matches!(owner.controller, Some(true))
}

/// Fetch a Job's owner references by namespace and name.
pub trait JobLookup: Send + Sync {
    fn job_owners(
        &self,
        namespace: &str,
        name: &str,
    ) -> impl Future<Output = Result<Vec<OwnerReference>, JobLookupError>> + Send;
}

/// `JobLookup` backed by the Kubernetes API, bounded by a per-call timeout.
#[derive(Clone)]
pub struct KubeJobLookup {
    client: Client,
    timeout: Duration,
}

impl KubeJobLookup {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl JobLookup for KubeJobLookup {
    async fn job_owners(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Vec<OwnerReference>, JobLookupError> {
        let api: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let job = tokio::time::timeout(self.timeout, api.get_opt(name))
            .await
            .map_err(|_| JobLookupError::Timeout {
                namespace: namespace.to_string(),
                name: name.to_string(),
                timeout: self.timeout,
            })?
            .map_err(|source| JobLookupError::Api {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            })?
            .ok_or_else(|| JobLookupError::NotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;
        Ok(job.metadata.owner_references.unwrap_or_default())
    }
}

/// Turns a pod's owner references into [`OwnershipMetadata`].
///
/// Holds no state between calls. The Job lookup is optional: without it,
/// `cronjob.name` is only ever set from a direct CronJob controller reference.
pub struct OwnershipResolver<L> {
    lookup: Option<L>,
    kinds: ControllerKinds,
}

impl<L: JobLookup> OwnershipResolver<L> {
    pub fn new(lookup: Option<L>, kinds: ControllerKinds) -> Self {
        Self { lookup, kinds }
    }

    pub async fn resolve(&self, pod: &PodSnapshot) -> OwnershipMetadata {
        let mut owners = OwnershipMetadata::new();
        for owner in pod.owner_references.iter().filter(|o| is_controller(o)) {
            if !self.kinds.contains(&owner.kind) {
                continue;
            }
            owners.insert_first(metadata_key(&owner.kind), owner.name.clone());
        }

        if let Some(job_name) = owners.get(JOB_KEY).map(str::to_string)
            && let Some(cronjob) = self.resolve_cronjob_of_job(&job_name, &pod.namespace).await
        {
            owners.set(CRONJOB_KEY, cronjob);
        }

        owners
    }

    /// Name of the CronJob controlling the given Job, if any.
    ///
    /// Every failure, including a missing Job or an API error, maps to `None`.
    pub async fn resolve_cronjob_of_job(&self, job_name: &str, namespace: &str) -> Option<String> {
        let lookup = self.lookup.as_ref()?;
        match lookup.job_owners(namespace, job_name).await {
            Ok(owners) => owners
                .into_iter()
                .find(|o| is_controller(o) && o.kind == CRONJOB_KIND)
                .map(|o| o.name),
            // TODO: decide whether API errors and timeouts should be logged above debug;
            // today the caller cannot tell them apart from a missing Job.
            Err(err) => {
                debug!(reason = err.reason(), "{}", err);
                None
            }
        }
    }
}
