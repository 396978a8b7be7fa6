/*!
 * OCI Runtime
 * Drives an OCI runtime binary (runc-compatible command line)
 */

use super::*;
use crate::config::RuntimeHandler;
use crate::sandbox::ContainerStatus;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::process::{Command, Output};
use std::time::Instant;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const WAIT_LIMIT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct StateOutput {
    status: String,
    #[serde(default)]
    pid: i32,
}

/// Runtime selecting a binary per container runtime handler
#[derive(Debug, Clone)]
pub struct OciRuntime {
    handlers: BTreeMap<String, RuntimeHandler>,
}

impl OciRuntime {
    pub fn new(handlers: BTreeMap<String, RuntimeHandler>) -> Self {
        info!(handlers = handlers.len(), "OCI runtime initialized");
        Self { handlers }
    }

    fn handler(&self, container: &InfraContainer) -> RuntimeResult<&RuntimeHandler> {
        self.handlers
            .get(container.runtime_handler())
            .ok_or_else(|| RuntimeError::UnknownHandler(container.runtime_handler().to_string()))
    }

    fn run(&self, op: &'static str, container: &InfraContainer, args: &[&str]) -> RuntimeResult<Output> {
        let handler = self.handler(container)?;
        debug!(op, id = container.id(), runtime = %handler.runtime_path.display(), "invoking runtime");

        let output = Command::new(&handler.runtime_path)
            .arg("--root")
            .arg(&handler.runtime_root)
            .args(args)
            .output()?;

        if !output.status.success() {
            return Err(RuntimeError::Command {
                op,
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    fn state(&self, container: &InfraContainer) -> RuntimeResult<StateOutput> {
        let output = self.run("state", container, &["state", container.id()])?;
        serde_json::from_slice(&output.stdout).map_err(|e| RuntimeError::Command {
            op: "state",
            reason: format!("unparseable state output: {}", e),
        })
    }

    fn refresh(&self, container: &InfraContainer) -> RuntimeResult<ContainerStatus> {
        let state = self.state(container)?;
        let status = match state.status.as_str() {
            "created" => ContainerStatus::Created,
            "running" | "paused" => ContainerStatus::Running,
            _ => ContainerStatus::Stopped,
        };
        container.set_status(status, (state.pid > 0).then_some(state.pid));
        Ok(status)
    }

    fn poll_stopped(&self, container: &InfraContainer, limit: Duration) -> RuntimeResult<bool> {
        let started = Instant::now();
        loop {
            match self.refresh(container) {
                Ok(ContainerStatus::Stopped) => return Ok(true),
                Ok(_) => {}
                Err(RuntimeError::Command { op: "state", .. }) => {
                    // the runtime forgets containers once they are gone
                    container.set_status(ContainerStatus::Stopped, None);
                    return Ok(true);
                }
                Err(e) => return Err(e),
            }
            if started.elapsed() >= limit {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl ContainerRuntime for OciRuntime {
    fn create_container(&self, container: &InfraContainer, cgroup_parent: &str) -> RuntimeResult<()> {
        let bundle = container.bundle_dir().to_string_lossy().into_owned();
        let pid_file = container.bundle_dir().join("pidfile").to_string_lossy().into_owned();
        self.run(
            "create",
            container,
            &["create", "--bundle", &bundle, "--pid-file", &pid_file, container.id()],
        )?;
        if let Err(e) = self.refresh(container) {
            warn!(id = container.id(), error = %e, "created container has no readable state, deleting it");
            if let Err(del) = self.delete_container(container) {
                warn!(id = container.id(), error = %del, "unable to delete created container");
            }
            return Err(e);
        }
        info!(id = container.id(), cgroup_parent, "container created");
        Ok(())
    }

    fn start_container(&self, container: &InfraContainer) -> RuntimeResult<()> {
        self.run("start", container, &["start", container.id()])?;
        self.refresh(container)?;
        Ok(())
    }

    fn stop_container(&self, container: &InfraContainer, timeout: Duration) -> RuntimeResult<()> {
        let signal = match container.stop_signal() {
            "" => "SIGTERM",
            s => s,
        };
        self.run("kill", container, &["kill", container.id(), signal])?;
        if self.poll_stopped(container, timeout)? {
            return Ok(());
        }

        warn!(id = container.id(), ?timeout, "container ignored stop signal, killing");
        self.run("kill", container, &["kill", container.id(), "SIGKILL"])?;
        Ok(())
    }

    fn wait_stopped(&self, container: &InfraContainer) -> RuntimeResult<()> {
        if self.poll_stopped(container, WAIT_LIMIT)? {
            Ok(())
        } else {
            Err(RuntimeError::Timeout(WAIT_LIMIT))
        }
    }

    fn delete_container(&self, container: &InfraContainer) -> RuntimeResult<()> {
        self.run("delete", container, &["delete", "--force", container.id()])?;
        container.set_status(ContainerStatus::Stopped, None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ContainerParams;
    use crate::spec::SpecGenerator;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use tempfile::TempDir;
    use time::OffsetDateTime;

    /// Runtime binary that logs each subcommand and fails `state`
    fn scripted_runtime(dir: &Path) -> OciRuntime {
        let log = dir.join("calls");
        let script = dir.join("runtime");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\necho \"$3\" >> {}\nif [ \"$3\" = state ]; then echo boom >&2; exit 1; fi\nexit 0\n",
                log.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut handlers = BTreeMap::new();
        handlers.insert(
            "runc".to_string(),
            RuntimeHandler {
                runtime_path: script,
                runtime_root: dir.join("state"),
            },
        );
        OciRuntime::new(handlers)
    }

    fn container(dir: &Path) -> InfraContainer {
        InfraContainer::new(ContainerParams {
            id: "0123456789abcdef".into(),
            name: "k8s_POD_web_default_u1_0".into(),
            bundle_dir: dir.to_path_buf(),
            dir: dir.to_path_buf(),
            log_path: dir.join("x.log"),
            labels: BTreeMap::new(),
            kube_annotations: BTreeMap::new(),
            privileged: false,
            runtime_handler: "runc".into(),
            created_at: OffsetDateTime::now_utc(),
            stop_signal: String::new(),
            mount_point: dir.join("rootfs"),
            id_mappings: None,
            spec: SpecGenerator::new_linux().into_spec(),
        })
    }

    #[test]
    fn test_create_deletes_container_without_state() {
        let dir = TempDir::new().unwrap();
        let runtime = scripted_runtime(dir.path());
        let c = container(dir.path());

        let err = runtime.create_container(&c, "").unwrap_err();
        assert!(matches!(err, RuntimeError::Command { op: "state", .. }));

        let calls = std::fs::read_to_string(dir.path().join("calls")).unwrap();
        assert_eq!(calls, "create\nstate\ndelete\n");
        assert_eq!(c.status(), ContainerStatus::Stopped);
    }

    #[test]
    fn test_unknown_handler() {
        let dir = TempDir::new().unwrap();
        let runtime = OciRuntime::new(BTreeMap::new());

        let err = runtime.create_container(&container(dir.path()), "").unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownHandler(ref h) if h == "runc"));
    }
}
