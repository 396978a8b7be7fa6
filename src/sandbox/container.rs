/*!
 * Infra Container
 * The process holding a sandbox's namespaces open
 */

use crate::config::IdMappings;
use crate::core::id::short_id;
use crate::spec::RuntimeSpec;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

const STATE_FILE: &str = "state.json";

/// Process status as last reported by the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
}

/// Persisted container state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    pub status: ContainerStatus,
    pub pid: Option<i32>,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub started: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub finished: Option<OffsetDateTime>,
}

/// Construction parameters for an infra container
#[derive(Debug, Clone)]
pub struct ContainerParams {
    pub id: String,
    pub name: String,
    /// Ephemeral directory holding the effective `config.json`
    pub bundle_dir: PathBuf,
    /// Durable directory holding `state.json`
    pub dir: PathBuf,
    pub log_path: PathBuf,
    pub labels: BTreeMap<String, String>,
    pub kube_annotations: BTreeMap<String, String>,
    pub privileged: bool,
    pub runtime_handler: String,
    pub created_at: OffsetDateTime,
    pub stop_signal: String,
    pub mount_point: PathBuf,
    pub id_mappings: Option<IdMappings>,
    pub spec: RuntimeSpec,
}

#[derive(Debug)]
pub struct InfraContainer {
    id: String,
    name: String,
    bundle_dir: PathBuf,
    dir: PathBuf,
    log_path: PathBuf,
    labels: BTreeMap<String, String>,
    kube_annotations: BTreeMap<String, String>,
    privileged: bool,
    runtime_handler: String,
    stop_signal: String,
    mount_point: PathBuf,
    id_mappings: Option<IdMappings>,
    spec: RwLock<RuntimeSpec>,
    state: RwLock<ContainerState>,
}

impl InfraContainer {
    pub fn new(params: ContainerParams) -> Self {
        Self {
            id: params.id,
            name: params.name,
            bundle_dir: params.bundle_dir,
            dir: params.dir,
            log_path: params.log_path,
            labels: params.labels,
            kube_annotations: params.kube_annotations,
            privileged: params.privileged,
            runtime_handler: params.runtime_handler,
            stop_signal: params.stop_signal,
            mount_point: params.mount_point,
            id_mappings: params.id_mappings,
            spec: RwLock::new(params.spec),
            state: RwLock::new(ContainerState {
                status: ContainerStatus::Created,
                pid: None,
                created: params.created_at,
                started: None,
                finished: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn kube_annotations(&self) -> &BTreeMap<String, String> {
        &self.kube_annotations
    }

    pub fn privileged(&self) -> bool {
        self.privileged
    }

    pub fn runtime_handler(&self) -> &str {
        &self.runtime_handler
    }

    pub fn stop_signal(&self) -> &str {
        &self.stop_signal
    }

    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    pub fn id_mappings(&self) -> Option<&IdMappings> {
        self.id_mappings.as_ref()
    }

    pub fn spec(&self) -> RuntimeSpec {
        self.spec.read().clone()
    }

    /// Replace the runtime spec with the final persisted version
    pub fn set_spec(&self, spec: RuntimeSpec) {
        *self.spec.write() = spec;
    }

    pub fn state(&self) -> ContainerState {
        self.state.read().clone()
    }

    pub fn status(&self) -> ContainerStatus {
        self.state.read().status
    }

    pub fn pid(&self) -> Option<i32> {
        self.state.read().pid
    }

    /// Record a status reported by the runtime
    pub fn set_status(&self, status: ContainerStatus, pid: Option<i32>) {
        let mut state = self.state.write();
        let now = OffsetDateTime::now_utc();
        match status {
            ContainerStatus::Running if state.started.is_none() => state.started = Some(now),
            ContainerStatus::Stopped if state.finished.is_none() => state.finished = Some(now),
            _ => {}
        }
        state.status = status;
        state.pid = pid;
    }

    /// Human-readable identity used in log lines
    pub fn description(&self) -> String {
        format!("{}({})", self.name, short_id(&self.id))
    }

    /// Write `state.json` into the durable directory
    pub fn state_to_disk(&self) -> std::io::Result<PathBuf> {
        let path = self.dir.join(STATE_FILE);
        let bytes = serde_json::to_vec(&*self.state.read()).map_err(std::io::Error::from)?;
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}
