use crate::session::Session;
use crate::CoreError;
use lectern_profile::ServiceRole;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ProvisionOutcome {
    AlreadyPresent,
    Completed,
    Skipped,
    Failed { reason: String, retry: String },
}

impl ProvisionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Models a sidecar can download into its `/app/models` volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SidecarModel {
    IndexTts2,
    CosyVoice,
    MultiTts,
    PaddleOcr,
}

impl SidecarModel {
    pub const ALL: [SidecarModel; 4] = [
        Self::IndexTts2,
        Self::CosyVoice,
        Self::MultiTts,
        Self::PaddleOcr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::IndexTts2 => "indextts2",
            Self::CosyVoice => "cosyvoice",
            Self::MultiTts => "multitts",
            Self::PaddleOcr => "paddleocr",
        }
    }

    pub fn role(self) -> ServiceRole {
        match self {
            Self::IndexTts2 | Self::CosyVoice | Self::MultiTts => ServiceRole::Tts,
            Self::PaddleOcr => ServiceRole::Ocr,
        }
    }

    pub fn for_role(role: ServiceRole) -> Vec<SidecarModel> {
        Self::ALL.into_iter().filter(|m| m.role() == role).collect()
    }

    /// Download command run inside the sidecar container.
    pub fn command(self) -> Vec<String> {
        let script = match self {
            Self::PaddleOcr => "/app/download_models.py".to_owned(),
            other => format!("/app/scripts/download-{}.py", other.name()),
        };
        vec!["python3".to_owned(), script, "/app/models".to_owned()]
    }
}

impl fmt::Display for SidecarModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for SidecarModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|m| m.name() == lower)
            .ok_or_else(|| {
                format!("unknown model '{s}' (expected: indextts2, cosyvoice, multitts, paddleocr)")
            })
    }
}

fn manual_command(
    session: &Session<'_>,
    container: &str,
    user: Option<&str>,
    cmd: &[String],
) -> String {
    let mut line = format!("{} exec", session.engine.name());
    if let Some(u) = user {
        line.push_str(" -u ");
        line.push_str(u);
    }
    line.push(' ');
    line.push_str(container);
    for part in cmd {
        line.push(' ');
        if part.contains(' ') {
            line.push('\'');
            line.push_str(part);
            line.push('\'');
        } else {
            line.push_str(part);
        }
    }
    line
}

fn run(
    session: &Session<'_>,
    container: &str,
    user: Option<&str>,
    cmd: &[String],
) -> Result<ProvisionOutcome, CoreError> {
    let retry = manual_command(session, container, user, cmd);
    debug!("provision: {retry}");
    let outcome = match session.engine.exec(container, user, cmd) {
        Ok(out) if out.success() => ProvisionOutcome::Completed,
        Ok(out) => ProvisionOutcome::Failed {
            reason: format!("exit code {}: {}", out.code, out.stderr.trim()),
            retry,
        },
        Err(e) => ProvisionOutcome::Failed {
            reason: e.to_string(),
            retry,
        },
    };
    Ok(outcome)
}

/// Detect the runtime dependency in the backend container and offer to
/// install it as root.
pub fn ensure_runtime_dependency(
    session: &Session<'_>,
    container: &str,
) -> Result<ProvisionOutcome, CoreError> {
    let provision = &session.config.provision;
    let probe = session
        .engine
        .exec(container, None, &provision.dependency_probe);
    if probe.as_ref().is_ok_and(lectern_runtime::ExecOutput::success) {
        info!("{} already installed in {container}", provision.dependency_name);
        return Ok(ProvisionOutcome::AlreadyPresent);
    }
    let prompt = format!(
        "{} is not installed in {container}. Install it now?",
        provision.dependency_name
    );
    if !session.confirm(&prompt, true) {
        return Ok(ProvisionOutcome::Skipped);
    }
    run(session, container, Some("root"), &provision.dependency_install)
}

/// Offer to create the initial admin account inside the backend container.
pub fn bootstrap_admin(
    session: &Session<'_>,
    container: &str,
) -> Result<ProvisionOutcome, CoreError> {
    if !session.confirm("Create the initial admin account now?", true) {
        return Ok(ProvisionOutcome::Skipped);
    }
    run(session, container, None, &session.config.provision.admin_command)
}

/// Download a model inside a running sidecar container.
pub fn download_model(
    session: &Session<'_>,
    container: &str,
    model: SidecarModel,
) -> Result<ProvisionOutcome, CoreError> {
    run(session, container, None, &model.command())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::SilentProgress;
    use crate::prompt::{Answer, AssumeDefaults, Prompter, ScriptedPrompter};
    use crate::readiness::ThreadSleeper;
    use lectern_profile::{LecternConfig, PlatformKind};
    use lectern_runtime::{ContainerState, HostEnvironment, MockEngine};

    fn backend_engine() -> MockEngine {
        MockEngine::new().with_container(
            "lectern-backend",
            "lectern-backend:latest",
            ContainerState::Running,
        )
    }

    fn session<'a>(engine: &'a MockEngine, prompter: &'a dyn Prompter) -> Session<'a> {
        Session::new(
            "/srv/lectern",
            LecternConfig::default(),
            HostEnvironment::fixed(PlatformKind::Linux, false),
            engine,
            engine,
            prompter,
            &SilentProgress,
            &ThreadSleeper,
        )
    }

    #[test]
    fn dependency_already_present() {
        let engine = backend_engine();
        let s = session(&engine, &AssumeDefaults);
        assert_eq!(
            ensure_runtime_dependency(&s, "lectern-backend").unwrap(),
            ProvisionOutcome::AlreadyPresent
        );
        assert_eq!(engine.count_calls("exec -u root"), 0);
    }

    #[test]
    fn dependency_installed_as_root() {
        let engine = backend_engine().failing_exec("command -v ebook-convert");
        let s = session(&engine, &AssumeDefaults);
        assert_eq!(
            ensure_runtime_dependency(&s, "lectern-backend").unwrap(),
            ProvisionOutcome::Completed
        );
        assert_eq!(engine.count_calls("exec -u root lectern-backend"), 1);
    }

    #[test]
    fn dependency_install_declined() {
        let engine = backend_engine().failing_exec("command -v");
        let prompter = ScriptedPrompter::new([Answer::Confirm(false)]);
        let s = session(&engine, &prompter);
        assert_eq!(
            ensure_runtime_dependency(&s, "lectern-backend").unwrap(),
            ProvisionOutcome::Skipped
        );
    }

    #[test]
    fn dependency_install_failure_carries_retry() {
        let engine = backend_engine()
            .failing_exec("command -v")
            .failing_exec("apk add");
        let s = session(&engine, &AssumeDefaults);
        match ensure_runtime_dependency(&s, "lectern-backend").unwrap() {
            ProvisionOutcome::Failed { retry, .. } => {
                assert!(retry.starts_with("mock exec -u root lectern-backend sh -c '"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn admin_bootstrap_failure_is_reported_not_raised() {
        let engine = backend_engine().failing_exec("init-admin");
        let s = session(&engine, &AssumeDefaults);
        let outcome = bootstrap_admin(&s, "lectern-backend").unwrap();
        assert!(outcome.is_failure());
        match outcome {
            ProvisionOutcome::Failed { retry, .. } => {
                assert_eq!(retry, "mock exec lectern-backend node scripts/init-admin.js");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn admin_bootstrap_runs_once() {
        let engine = backend_engine();
        let s = session(&engine, &AssumeDefaults);
        assert_eq!(
            bootstrap_admin(&s, "lectern-backend").unwrap(),
            ProvisionOutcome::Completed
        );
        assert_eq!(engine.count_calls("exec lectern-backend node"), 1);
    }

    #[test]
    fn model_commands() {
        assert_eq!(
            SidecarModel::IndexTts2.command(),
            vec!["python3", "/app/scripts/download-indextts2.py", "/app/models"]
        );
        assert_eq!(
            SidecarModel::PaddleOcr.command(),
            vec!["python3", "/app/download_models.py", "/app/models"]
        );
        assert_eq!(
            SidecarModel::for_role(ServiceRole::Tts),
            vec![SidecarModel::IndexTts2, SidecarModel::CosyVoice, SidecarModel::MultiTts]
        );
        assert_eq!("CosyVoice".parse::<SidecarModel>().unwrap(), SidecarModel::CosyVoice);
        assert!("whisper".parse::<SidecarModel>().is_err());
    }
}
