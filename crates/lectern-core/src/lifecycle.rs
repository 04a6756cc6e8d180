use crate::CoreError;
use serde::Serialize;
use std::fmt;

/// Steps of the installation workflow, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InstallStep {
    Pending,
    Dependencies,
    Profile,
    EnvFile,
    Directories,
    Ports,
    Teardown,
    BuildAndStart,
    Readiness,
    Report,
    RuntimeDependency,
    AdminBootstrap,
    Done,
}

impl InstallStep {
    /// Number of numbered steps between `Pending` and `Done`.
    pub const TOTAL: usize = 11;

    pub fn next(self) -> Option<Self> {
        Some(match self {
            Self::Pending => Self::Dependencies,
            Self::Dependencies => Self::Profile,
            Self::Profile => Self::EnvFile,
            Self::EnvFile => Self::Directories,
            Self::Directories => Self::Ports,
            Self::Ports => Self::Teardown,
            Self::Teardown => Self::BuildAndStart,
            Self::BuildAndStart => Self::Readiness,
            Self::Readiness => Self::Report,
            Self::Report => Self::RuntimeDependency,
            Self::RuntimeDependency => Self::AdminBootstrap,
            Self::AdminBootstrap => Self::Done,
            Self::Done => return None,
        })
    }

    /// 1-based step number; 0 for `Pending` and `Done`.
    pub fn number(self) -> usize {
        match self {
            Self::Pending | Self::Done => 0,
            Self::Dependencies => 1,
            Self::Profile => 2,
            Self::EnvFile => 3,
            Self::Directories => 4,
            Self::Ports => 5,
            Self::Teardown => 6,
            Self::BuildAndStart => 7,
            Self::Readiness => 8,
            Self::Report => 9,
            Self::RuntimeDependency => 10,
            Self::AdminBootstrap => 11,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dependencies => "Checking dependencies",
            Self::Profile => "Resolving deployment profile",
            Self::EnvFile => "Preparing environment file",
            Self::Directories => "Preparing data directories",
            Self::Ports => "Checking ports",
            Self::Teardown => "Checking for an existing deployment",
            Self::BuildAndStart => "Building and starting services",
            Self::Readiness => "Waiting for services",
            Self::Report => "Deployment status",
            Self::RuntimeDependency => "Runtime dependency",
            Self::AdminBootstrap => "Admin account",
            Self::Done => "done",
        }
    }

    /// Failures in optional steps never change the exit code.
    pub fn is_optional(self) -> bool {
        matches!(self, Self::RuntimeDependency | Self::AdminBootstrap)
    }
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Dependencies => "dependencies",
            Self::Profile => "profile",
            Self::EnvFile => "env-file",
            Self::Directories => "directories",
            Self::Ports => "ports",
            Self::Teardown => "teardown",
            Self::BuildAndStart => "build-and-start",
            Self::Readiness => "readiness",
            Self::Report => "report",
            Self::RuntimeDependency => "runtime-dependency",
            Self::AdminBootstrap => "admin-bootstrap",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// The workflow is strictly sequential: the only valid move is to the next step.
pub fn validate_transition(from: InstallStep, to: InstallStep) -> Result<(), CoreError> {
    if from.next() == Some(to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions() {
        let mut step = InstallStep::Pending;
        let mut seen = 0;
        while let Some(next) = step.next() {
            assert!(validate_transition(step, next).is_ok());
            step = next;
            seen += 1;
        }
        assert_eq!(step, InstallStep::Done);
        assert_eq!(seen, InstallStep::TOTAL + 1);
    }

    #[test]
    fn invalid_transitions() {
        assert!(validate_transition(InstallStep::Pending, InstallStep::Profile).is_err());
        assert!(validate_transition(InstallStep::Readiness, InstallStep::Teardown).is_err());
        assert!(validate_transition(InstallStep::Ports, InstallStep::Ports).is_err());
        assert!(validate_transition(InstallStep::Done, InstallStep::Pending).is_err());
    }

    #[test]
    fn numbering_matches_order() {
        let mut step = InstallStep::Dependencies;
        for n in 1..=InstallStep::TOTAL {
            assert_eq!(step.number(), n);
            step = step.next().unwrap();
        }
        assert_eq!(step, InstallStep::Done);
    }

    #[test]
    fn only_provisioning_is_optional() {
        assert!(InstallStep::RuntimeDependency.is_optional());
        assert!(InstallStep::AdminBootstrap.is_optional());
        assert!(!InstallStep::Readiness.is_optional());
    }
}
