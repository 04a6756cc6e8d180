use crate::compose::{ComposeCommand, ComposeInvocation};
use crate::RuntimeError;
use lectern_profile::ImageRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// One entry of the engine's local image registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub repository: String,
    pub tag: String,
    pub id: String,
    pub size: String,
}

impl ImageRecord {
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Exact `(repository, tag)` match; nothing fuzzy.
    pub fn matches(&self, image: &ImageRef) -> bool {
        image.matches(&self.repository, &self.tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Absent,
    Stopped,
    Running,
}

impl ContainerState {
    /// Map an engine state string (`running`, `exited`, `created`, ...).
    pub fn from_engine(state: &str) -> Self {
        match state.trim().to_ascii_lowercase().as_str() {
            "running" => Self::Running,
            "" | "absent" => Self::Absent,
            _ => Self::Stopped,
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("absent"),
            Self::Stopped => f.write_str("stopped"),
            Self::Running => f.write_str("running"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Engine's human status line, e.g. `Up 2 minutes (healthy)`.
    pub status: String,
    pub ports: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn from_engine(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "starting" => Some(Self::Starting),
            "healthy" => Some(Self::Healthy),
            "unhealthy" => Some(Self::Unhealthy),
            _ => None,
        }
    }
}

/// Container state plus health-check status when the container has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInspect {
    pub state: ContainerState,
    pub health: Option<HealthStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// The container-engine command contract.
///
/// Every call blocks until the underlying engine command completes. Non-zero
/// exits surface as [`RuntimeError::CommandFailed`]; callers decide whether a
/// failure is fatal or advisory.
pub trait ContainerEngine: Send + Sync {
    fn name(&self) -> &str;

    /// The engine binary is installed and answers `--version`.
    fn available(&self) -> bool;

    /// Detect usable compose tooling for this engine.
    fn compose_command(&self) -> Option<ComposeCommand>;

    /// The engine daemon is reachable.
    fn ping(&self) -> Result<(), RuntimeError>;

    fn registry_mirrors(&self) -> Result<Vec<String>, RuntimeError>;

    /// Query the local image registry once.
    fn images(&self) -> Result<Vec<ImageRecord>, RuntimeError>;

    /// All containers, running or not.
    fn containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError>;

    /// `Ok(None)` when the container does not exist.
    fn inspect(&self, name: &str) -> Result<Option<ContainerInspect>, RuntimeError>;

    fn stop(&self, name: &str) -> Result<(), RuntimeError>;

    fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError>;

    fn remove_image(&self, reference: &str, force: bool) -> Result<(), RuntimeError>;

    fn pull(&self, reference: &str) -> Result<(), RuntimeError>;

    /// Serialize an image into a gzip-compressed archive at `dest`.
    fn save(&self, reference: &str, dest: &Path) -> Result<(), RuntimeError>;

    /// Load an image archive. Gzip-compressed archives are accepted.
    fn load(&self, archive: &Path) -> Result<(), RuntimeError>;

    /// Run a one-shot command in a running container. A non-zero exit is
    /// reported in [`ExecOutput::code`], not as an error.
    fn exec(
        &self,
        container: &str,
        user: Option<&str>,
        command: &[String],
    ) -> Result<ExecOutput, RuntimeError>;

    /// `compose build` advertises a `--parallel` flag.
    fn compose_supports_parallel(&self, compose: &ComposeInvocation) -> bool;

    fn compose_build(&self, compose: &ComposeInvocation, parallel: bool)
        -> Result<(), RuntimeError>;

    fn compose_up(&self, compose: &ComposeInvocation, build: bool) -> Result<(), RuntimeError>;

    fn compose_down(
        &self,
        compose: &ComposeInvocation,
        remove_orphans: bool,
    ) -> Result<(), RuntimeError>;

    /// Containers (running or stopped) managed by this compose project.
    fn compose_ps(&self, compose: &ComposeInvocation) -> Result<Vec<String>, RuntimeError>;

    fn running_names(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self
            .containers()?
            .into_iter()
            .filter(|c| c.state == ContainerState::Running)
            .map(|c| c.name)
            .collect())
    }

    fn container_state(&self, name: &str) -> Result<ContainerState, RuntimeError> {
        Ok(self
            .inspect(name)?
            .map_or(ContainerState::Absent, |i| i.state))
    }
}

pub fn select_engine(name: &str) -> Result<Box<dyn ContainerEngine>, RuntimeError> {
    match name {
        "docker" => Ok(Box::new(crate::docker::DockerEngine::docker())),
        "podman" => Ok(Box::new(crate::docker::DockerEngine::podman())),
        "mock" => Ok(Box::new(crate::mock::MockEngine::new())),
        other => Err(RuntimeError::EngineUnavailable(other.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_engines() {
        assert_eq!(select_engine("docker").unwrap().name(), "docker");
        assert_eq!(select_engine("podman").unwrap().name(), "podman");
        assert_eq!(select_engine("mock").unwrap().name(), "mock");
    }

    #[test]
    fn select_invalid_engine_fails() {
        assert!(select_engine("lxc").is_err());
    }

    #[test]
    fn container_state_mapping() {
        assert_eq!(ContainerState::from_engine("running"), ContainerState::Running);
        assert_eq!(ContainerState::from_engine("exited"), ContainerState::Stopped);
        assert_eq!(ContainerState::from_engine("created"), ContainerState::Stopped);
        assert_eq!(ContainerState::from_engine(""), ContainerState::Absent);
    }

    #[test]
    fn image_record_exact_match() {
        let rec = ImageRecord {
            repository: "lectern-backend".to_owned(),
            tag: "latest".to_owned(),
            id: "sha256:1".to_owned(),
            size: "1GB".to_owned(),
        };
        assert!(rec.matches(&ImageRef::new("lectern-backend", "latest")));
        assert!(!rec.matches(&ImageRef::new("lectern-backend", "1.0")));
        assert!(!rec.matches(&ImageRef::new("lectern-backen", "latest")));
        assert_eq!(rec.reference(), "lectern-backend:latest");
    }

    #[test]
    fn health_mapping() {
        assert_eq!(HealthStatus::from_engine("healthy"), Some(HealthStatus::Healthy));
        assert_eq!(HealthStatus::from_engine("none"), None);
    }
}
