use crate::compose::{ComposeCommand, ComposeInvocation};
use crate::engine::{
    ContainerEngine, ContainerInspect, ContainerRecord, ContainerState, ExecOutput, HealthStatus,
    ImageRecord,
};
use crate::ports::PortProbe;
use crate::RuntimeError;
use lectern_profile::{parse_compose_file, DataRoots, DeploymentProfile, ImageRef, ServiceRole};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const ARCHIVE_MAGIC: &str = "lectern-mock-image";

/// A service the mock compose tooling builds and starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockService {
    pub container: String,
    pub image: String,
    pub ports: Vec<u16>,
    pub healthcheck: bool,
}

#[derive(Debug, Clone)]
struct MockContainer {
    image: String,
    state: ContainerState,
    ports: Vec<u16>,
    health: Option<HealthStatus>,
}

#[derive(Debug, Default)]
struct MockState {
    images: BTreeMap<String, ImageRecord>,
    containers: BTreeMap<String, MockContainer>,
    /// Remaining inspections that report `starting` before `healthy`.
    health_delay: BTreeMap<String, u32>,
    calls: Vec<String>,
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Default)]
struct MockConfig {
    unavailable: bool,
    no_compose: bool,
    daemon_down: bool,
    parallel_build: bool,
    fail_build: bool,
    fail_up: bool,
    never_running: bool,
    fail_pull: bool,
    refuse_rm: bool,
    refuse_rmi: bool,
    mirrors: Vec<String>,
    failing_exec: Vec<String>,
    unhealthy: Vec<String>,
}

/// In-memory container engine.
///
/// Compose operations read the invoked compose file to learn which
/// containers and images the project produces. Every engine call is
/// recorded so tests can assert on what the orchestrator did.
#[derive(Default)]
pub struct MockEngine {
    config: MockConfig,
    state: Mutex<MockState>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_mut(&mut self) -> &mut MockState {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        self.state
            .lock()
            .map_err(|e| RuntimeError::Parse(format!("mock state poisoned: {e}")))
    }

    /// Register a local image, e.g. `lectern-backend:latest`.
    #[must_use]
    pub fn with_image(mut self, reference: &str) -> Self {
        let record = image_record(reference);
        self.state_mut().images.insert(record.reference(), record);
        self
    }

    #[must_use]
    pub fn with_container(mut self, name: &str, image: &str, state: ContainerState) -> Self {
        self.state_mut().containers.insert(
            name.to_owned(),
            MockContainer {
                image: image.to_owned(),
                state,
                ports: Vec::new(),
                health: None,
            },
        );
        self
    }

    /// The container reports `starting` for the first `polls` inspections.
    #[must_use]
    pub fn healthy_after(mut self, container: &str, polls: u32) -> Self {
        self.state_mut()
            .health_delay
            .insert(container.to_owned(), polls);
        self
    }

    #[must_use]
    pub fn unhealthy(mut self, container: &str) -> Self {
        self.config.unhealthy.push(container.to_owned());
        self
    }

    #[must_use]
    pub fn unavailable(mut self) -> Self {
        self.config.unavailable = true;
        self
    }

    #[must_use]
    pub fn without_compose(mut self) -> Self {
        self.config.no_compose = true;
        self
    }

    #[must_use]
    pub fn daemon_down(mut self) -> Self {
        self.config.daemon_down = true;
        self
    }

    #[must_use]
    pub fn with_parallel_build(mut self) -> Self {
        self.config.parallel_build = true;
        self
    }

    #[must_use]
    pub fn failing_build(mut self) -> Self {
        self.config.fail_build = true;
        self
    }

    #[must_use]
    pub fn failing_up(mut self) -> Self {
        self.config.fail_up = true;
        self
    }

    /// `compose up` succeeds but leaves every container stopped.
    #[must_use]
    pub fn never_running(mut self) -> Self {
        self.config.never_running = true;
        self
    }

    #[must_use]
    pub fn failing_pull(mut self) -> Self {
        self.config.fail_pull = true;
        self
    }

    /// Plain `rm` always fails; `rm -f` still works.
    #[must_use]
    pub fn refusing_rm(mut self) -> Self {
        self.config.refuse_rm = true;
        self
    }

    /// Plain `rmi` always fails; `rmi -f` follows the usual rules.
    #[must_use]
    pub fn refusing_rmi(mut self) -> Self {
        self.config.refuse_rmi = true;
        self
    }

    #[must_use]
    pub fn with_mirrors(mut self, mirrors: &[&str]) -> Self {
        self.config.mirrors = mirrors.iter().map(|m| (*m).to_owned()).collect();
        self
    }

    /// `exec` exits 1 when the joined command line contains `pattern`.
    #[must_use]
    pub fn failing_exec(mut self, pattern: &str) -> Self {
        self.config.failing_exec.push(pattern.to_owned());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    /// Number of recorded calls starting with `prefix`.
    pub fn count_calls(&self, prefix: &str) -> usize {
        self.lock()
            .map(|s| s.calls.iter().filter(|c| c.starts_with(prefix)).count())
            .unwrap_or(0)
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.lock()
            .map(|s| s.images.contains_key(reference))
            .unwrap_or(false)
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.lock()
            .map(|s| s.containers.contains_key(name))
            .unwrap_or(false)
    }

    fn record(&self, call: String) -> Result<MutexGuard<'_, MockState>, RuntimeError> {
        let mut state = self.lock()?;
        state.calls.push(call);
        Ok(state)
    }

    fn failure(command: &str, stderr: &str) -> RuntimeError {
        RuntimeError::CommandFailed {
            command: format!("mock {command}"),
            code: Some(1),
            stderr: stderr.to_owned(),
        }
    }

    fn project_services(&self, compose: &ComposeInvocation) -> Vec<MockService> {
        let Ok(file) = parse_compose_file(&compose.file) else {
            return Vec::new();
        };
        let roles: Vec<ServiceRole> = file
            .services
            .keys()
            .filter_map(|k| ServiceRole::from_service_key(k))
            .collect();
        let roots = DataRoots {
            local: PathBuf::from("data"),
            external: PathBuf::from("data"),
        };
        DeploymentProfile::from_compose(&compose.file, None, &file, &roles, &roots)
            .services
            .into_iter()
            .map(|s| MockService {
                container: s.container.into_inner(),
                image: s.image.to_string(),
                ports: s.ports,
                healthcheck: s.healthcheck,
            })
            .collect()
    }
}

fn image_record(reference: &str) -> ImageRecord {
    let image = ImageRef::parse(reference)
        .unwrap_or_else(|_| ImageRef::new(reference, lectern_profile::image::DEFAULT_TAG));
    ImageRecord {
        id: format!("sha256:{:012x}", fnv(reference.as_bytes())),
        repository: image.repository,
        tag: image.tag,
        size: "1MB".to_owned(),
    }
}

fn fnv(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl ContainerEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn available(&self) -> bool {
        !self.config.unavailable
    }

    fn compose_command(&self) -> Option<ComposeCommand> {
        if self.config.unavailable || self.config.no_compose {
            None
        } else {
            Some(ComposeCommand::plugin("mock"))
        }
    }

    fn ping(&self) -> Result<(), RuntimeError> {
        drop(self.record("info".to_owned())?);
        if self.config.daemon_down || self.config.unavailable {
            return Err(Self::failure("info", "Cannot connect to the engine daemon"));
        }
        Ok(())
    }

    fn registry_mirrors(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.config.mirrors.clone())
    }

    fn images(&self) -> Result<Vec<ImageRecord>, RuntimeError> {
        let state = self.record("images".to_owned())?;
        Ok(state.images.values().cloned().collect())
    }

    fn containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let state = self.record("ps -a".to_owned())?;
        Ok(state
            .containers
            .iter()
            .map(|(name, c)| ContainerRecord {
                name: name.clone(),
                image: c.image.clone(),
                state: c.state,
                status: c.state.to_string(),
                ports: c
                    .ports
                    .iter()
                    .map(|p| format!("0.0.0.0:{p}->{p}/tcp"))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect())
    }

    fn inspect(&self, name: &str) -> Result<Option<ContainerInspect>, RuntimeError> {
        let mut state = self.record(format!("inspect {name}"))?;
        let Some(container) = state.containers.get(name).cloned() else {
            return Ok(None);
        };
        let mut health = container.health;
        if health.is_some() && container.state == ContainerState::Running {
            if let Some(remaining) = state.health_delay.get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    health = Some(HealthStatus::Starting);
                }
            }
        }
        Ok(Some(ContainerInspect {
            state: container.state,
            health,
        }))
    }

    fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("stop {name}"))?;
        match state.containers.get_mut(name) {
            Some(c) => {
                c.state = ContainerState::Stopped;
                Ok(())
            }
            None => Err(Self::failure("stop", &format!("No such container: {name}"))),
        }
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        let call = if force {
            format!("rm -f {name}")
        } else {
            format!("rm {name}")
        };
        let mut state = self.record(call)?;
        let Some(container) = state.containers.get(name) else {
            return Err(Self::failure("rm", &format!("No such container: {name}")));
        };
        if !force && (self.config.refuse_rm || container.state == ContainerState::Running) {
            return Err(Self::failure("rm", "container is running or locked"));
        }
        state.containers.remove(name);
        Ok(())
    }

    fn remove_image(&self, reference: &str, force: bool) -> Result<(), RuntimeError> {
        let call = if force {
            format!("rmi -f {reference}")
        } else {
            format!("rmi {reference}")
        };
        let mut state = self.record(call)?;
        if !state.images.contains_key(reference) {
            return Err(Self::failure("rmi", &format!("No such image: {reference}")));
        }
        let mut users = state.containers.values().filter(|c| c.image == reference);
        let blocked = if force {
            users.any(|c| c.state == ContainerState::Running)
        } else {
            self.config.refuse_rmi || users.next().is_some()
        };
        if blocked {
            return Err(Self::failure(
                "rmi",
                "conflict: image is being used by a container",
            ));
        }
        state.images.remove(reference);
        Ok(())
    }

    fn pull(&self, reference: &str) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("pull {reference}"))?;
        if self.config.fail_pull {
            return Err(Self::failure("pull", "registry unreachable"));
        }
        let record = image_record(reference);
        state.images.insert(record.reference(), record);
        Ok(())
    }

    fn save(&self, reference: &str, dest: &Path) -> Result<(), RuntimeError> {
        let state = self.record(format!("save {reference}"))?;
        if !state.images.contains_key(reference) {
            return Err(Self::failure("save", &format!("No such image: {reference}")));
        }
        std::fs::write(dest, format!("{ARCHIVE_MAGIC}\n{reference}\n"))?;
        Ok(())
    }

    fn load(&self, archive: &Path) -> Result<(), RuntimeError> {
        let mut state = self.record(format!("load -i {}", archive.display()))?;
        let content = std::fs::read_to_string(archive)
            .map_err(|e| Self::failure("load", &format!("open {}: {e}", archive.display())))?;
        let mut lines = content.lines();
        if lines.next() != Some(ARCHIVE_MAGIC) {
            return Err(Self::failure("load", "invalid image archive"));
        }
        let Some(reference) = lines.next().filter(|r| !r.is_empty()) else {
            return Err(Self::failure("load", "archive names no image"));
        };
        let record = image_record(reference);
        state.images.insert(record.reference(), record);
        Ok(())
    }

    fn exec(
        &self,
        container: &str,
        user: Option<&str>,
        command: &[String],
    ) -> Result<ExecOutput, RuntimeError> {
        let line = command.join(" ");
        let call = match user {
            Some(u) => format!("exec -u {u} {container} {line}"),
            None => format!("exec {container} {line}"),
        };
        let state = self.record(call)?;
        let running = state
            .containers
            .get(container)
            .is_some_and(|c| c.state == ContainerState::Running);
        if !running {
            return Ok(ExecOutput {
                code: 1,
                stdout: String::new(),
                stderr: format!("container {container} is not running"),
            });
        }
        if self.config.failing_exec.iter().any(|p| line.contains(p)) {
            return Ok(ExecOutput {
                code: 1,
                stdout: String::new(),
                stderr: format!("{line}: command failed"),
            });
        }
        Ok(ExecOutput {
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }

    fn compose_supports_parallel(&self, _compose: &ComposeInvocation) -> bool {
        self.config.parallel_build
    }

    fn compose_build(
        &self,
        compose: &ComposeInvocation,
        parallel: bool,
    ) -> Result<(), RuntimeError> {
        let services = self.project_services(compose);
        let call = if parallel {
            "compose build --parallel"
        } else {
            "compose build"
        };
        let mut state = self.record(call.to_owned())?;
        if self.config.fail_build {
            return Err(Self::failure("compose build", "failed to solve: dockerfile error"));
        }
        for svc in services {
            let record = image_record(&svc.image);
            state.images.insert(record.reference(), record);
        }
        Ok(())
    }

    fn compose_up(&self, compose: &ComposeInvocation, build: bool) -> Result<(), RuntimeError> {
        let services = self.project_services(compose);
        let call = if build {
            "compose up -d --build"
        } else {
            "compose up -d"
        };
        let mut state = self.record(call.to_owned())?;
        if self.config.fail_up {
            return Err(Self::failure("compose up", "port is already allocated"));
        }
        for svc in &services {
            if build {
                let record = image_record(&svc.image);
                state.images.insert(record.reference(), record);
            } else if !state.images.contains_key(&svc.image) {
                return Err(Self::failure(
                    "compose up",
                    &format!("pull access denied for {}", svc.image),
                ));
            }
        }
        for svc in services {
            let health = if !svc.healthcheck {
                None
            } else if self.config.unhealthy.contains(&svc.container) {
                Some(HealthStatus::Unhealthy)
            } else {
                Some(HealthStatus::Healthy)
            };
            let container_state = if self.config.never_running {
                ContainerState::Stopped
            } else {
                ContainerState::Running
            };
            state.containers.insert(
                svc.container,
                MockContainer {
                    image: svc.image,
                    state: container_state,
                    ports: svc.ports,
                    health,
                },
            );
        }
        Ok(())
    }

    fn compose_down(
        &self,
        compose: &ComposeInvocation,
        remove_orphans: bool,
    ) -> Result<(), RuntimeError> {
        let services = self.project_services(compose);
        let call = if remove_orphans {
            "compose down --remove-orphans"
        } else {
            "compose down"
        };
        let mut state = self.record(call.to_owned())?;
        for svc in services {
            state.containers.remove(&svc.container);
        }
        Ok(())
    }

    fn compose_ps(&self, compose: &ComposeInvocation) -> Result<Vec<String>, RuntimeError> {
        let services = self.project_services(compose);
        let state = self.record("compose ps -a -q".to_owned())?;
        Ok(services
            .into_iter()
            .map(|s| s.container)
            .filter(|name| state.containers.contains_key(name))
            .collect())
    }
}

impl PortProbe for MockEngine {
    fn tool(&self) -> Option<&str> {
        Some("mock")
    }

    /// Occupied when a running container publishes the port.
    fn is_occupied(&self, port: u16) -> bool {
        self.lock()
            .map(|s| {
                s.containers
                    .values()
                    .any(|c| c.state == ContainerState::Running && c.ports.contains(&port))
            })
            .unwrap_or(false)
    }
}
