//! Installation orchestration for Lectern.
//!
//! This crate ties together profile parsing and the container engine into
//! the `Installer`, the strictly sequential state machine that verifies
//! dependencies, resolves a deployment profile, materializes the
//! environment file and data directories, builds or reuses images, starts
//! the stack, probes readiness, and runs the optional provisioning steps.
//! It also provides the image lifecycle operations (export, import,
//! delete), the sidecar install path, and the advisory run lock.

pub mod concurrency;
pub mod envfile;
pub mod images;
pub mod installer;
pub mod lifecycle;
pub mod progress;
pub mod prompt;
pub mod provision;
pub mod readiness;
pub mod resolver;
pub mod scaffold;
pub mod session;
pub mod sidecar;

pub use concurrency::{install_signal_handler, shutdown_requested, DeployLock};
pub use envfile::{ensure_env_file, EnvFileOutcome};
pub use images::{
    BuildOutcome, DeleteReport, ExportOutcome, ImageManager, RemovalOutcome,
};
pub use installer::{InstallReport, Installer};
pub use lifecycle::{validate_transition, InstallStep};
pub use progress::{Progress, RecordingProgress, SilentProgress};
pub use prompt::{Answer, AssumeDefaults, Prompter, ScriptedPrompter};
pub use provision::{ProvisionOutcome, SidecarModel};
pub use readiness::{wait_ready, Readiness, Sleeper, ThreadSleeper};
pub use resolver::{
    declared_image, declared_service, resolve, resolve_sidecar, ResolvedDeployment,
};
pub use scaffold::{prepare_data_dirs, ScaffoldOutcome};
pub use session::Session;
pub use sidecar::{install_sidecar, SidecarReport};

use lectern_profile::ServiceRole;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("profile error: {0}")]
    Profile(#[from] lectern_profile::ProfileError),
    #[error("runtime error: {0}")]
    Runtime(#[from] lectern_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{what}")]
    MissingDependency { what: String, hint: String },
    #[error("default deployment profile not found: {}", .0.display())]
    DefaultProfileMissing(PathBuf),
    #[error("{role} sidecar profile not found: {}", .path.display())]
    SidecarProfileMissing { role: ServiceRole, path: PathBuf },
    #[error("image build failed: {source}")]
    BuildFailed {
        source: lectern_runtime::RuntimeError,
        retry: String,
    },
    #[error("service start failed: {source}")]
    StartFailed {
        source: lectern_runtime::RuntimeError,
        retry: String,
    },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("interrupted")]
    Interrupted,
    #[error("another lectern run is in progress (lock: {})", .0.display())]
    Locked(PathBuf),
    #[error("cancelled: {0}")]
    Declined(String),
}

impl CoreError {
    /// Remediation hint printed before a fatal exit.
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::MissingDependency { hint, .. } => Some(hint.clone()),
            Self::DefaultProfileMissing(path) => Some(format!(
                "restore {} or pass --profile <compose file>",
                path.display()
            )),
            Self::SidecarProfileMissing { path, .. } => {
                Some(format!("restore {} and retry", path.display()))
            }
            Self::BuildFailed { retry, .. } | Self::StartFailed { retry, .. } => {
                Some(format!("fix the error above, then retry manually: {retry}"))
            }
            Self::Interrupted => Some(
                "re-run the same command; image layers already built are cached and reused"
                    .to_owned(),
            ),
            Self::Locked(_) => Some("wait for the other lectern process to finish".to_owned()),
            Self::Profile(_) => Some("check the compose file and lectern.toml syntax".to_owned()),
            Self::Runtime(_) => Some("check that the container engine is running".to_owned()),
            Self::Io(_)
            | Self::Serialization(_)
            | Self::InvalidTransition { .. }
            | Self::Declined(_) => None,
        }
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, Self::Declined(_))
    }
}
