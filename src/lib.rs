//! Watches pods and resolves their controller-ownership chain
//! (Deployment, ReplicaSet, StatefulSet, DaemonSet, Job and the CronJob
//! behind a Job) into flat `<kind>.name` metadata.

pub mod cli;
pub mod diagnostics;
pub mod error;
pub mod handler;
pub mod kubernetes;
pub mod ownership;
pub mod supervisor;
pub mod types;

pub use error::{Error, Result};
