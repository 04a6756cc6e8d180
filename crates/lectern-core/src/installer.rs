use crate::concurrency::check_interrupt;
use crate::envfile::{ensure_env_file, EnvFileOutcome};
use crate::images::{BuildOutcome, ImageManager};
use crate::lifecycle::{validate_transition, InstallStep};
use crate::provision::{bootstrap_admin, ensure_runtime_dependency, ProvisionOutcome};
use crate::readiness::{wait_ready, Readiness};
use crate::resolver::{resolve, ResolvedDeployment};
use crate::scaffold::{prepare_data_dirs, ScaffoldOutcome};
use crate::session::Session;
use crate::CoreError;
use lectern_profile::{DeploymentProfile, ServiceRole};
use lectern_runtime::{
    check_engine_prereqs, check_mirrors, format_missing, ComposeCommand, ContainerRecord,
};
use serde::Serialize;
use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, info};

const MIRROR_TIMEOUT: Duration = Duration::from_secs(5);

/// Verify engine, compose tooling and daemon. Returns the compose command
/// to bind deployments to.
pub(crate) fn require_engine(session: &Session<'_>) -> Result<ComposeCommand, CoreError> {
    let missing = check_engine_prereqs(session.engine);
    if let Some(first) = missing.first() {
        return Err(CoreError::MissingDependency {
            what: format!("{} is not available", first.name),
            hint: format_missing(&missing),
        });
    }
    session
        .engine
        .compose_command()
        .ok_or_else(|| CoreError::MissingDependency {
            what: "compose tooling is not available".to_owned(),
            hint: format!(
                "install the {} compose plugin or a standalone compose binary",
                session.engine.name()
            ),
        })
}

/// Advisory check of configured registry mirrors. Irregularities ask the
/// operator whether to continue.
fn check_registry_mirrors(session: &Session<'_>) -> Result<(), CoreError> {
    let mirrors = match session.engine.registry_mirrors() {
        Ok(m) => m,
        Err(e) => {
            debug!("registry mirror query failed: {e}");
            return Ok(());
        }
    };
    if mirrors.is_empty() {
        return Ok(());
    }
    let issues = check_mirrors(&mirrors, MIRROR_TIMEOUT);
    if issues.is_empty() {
        debug!("{} registry mirror(s) reachable", mirrors.len());
        return Ok(());
    }
    for issue in &issues {
        session.warn(format!("registry mirror: {issue}"));
    }
    if session.confirm("Registry mirrors look misconfigured. Continue anyway?", true) {
        Ok(())
    } else {
        Err(CoreError::Declined("registry mirror check".to_owned()))
    }
}

/// Warn about occupied ports and ask whether to continue.
pub(crate) fn check_ports(
    session: &Session<'_>,
    ports: &[u16],
    what: &str,
) -> Result<(), CoreError> {
    let Some(tool) = session.ports.tool() else {
        session.warn("no port inspection tool found (lsof, ss, netstat); skipping port check");
        return Ok(());
    };
    debug!("probing ports {ports:?} with {tool}");
    let busy: Vec<u16> = ports
        .iter()
        .copied()
        .filter(|&p| session.ports.is_occupied(p))
        .collect();
    if busy.is_empty() {
        return Ok(());
    }
    let list = busy
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    session.warn(format!("port(s) {list} already in use"));
    if session.confirm(&format!("Continue installing {what} anyway?"), true) {
        Ok(())
    } else {
        Err(CoreError::Declined(format!("port {list} in use")))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub profile: DeploymentProfile,
    pub env_file: EnvFileOutcome,
    pub directories: ScaffoldOutcome,
    pub build: BuildOutcome,
    pub readiness: Readiness,
    pub containers: Vec<ContainerRecord>,
    pub urls: Vec<String>,
    pub runtime_dependency: ProvisionOutcome,
    pub admin: ProvisionOutcome,
    pub warnings: Vec<String>,
    pub finished_at: String,
}

/// The sequential installation workflow.
pub struct Installer<'s, 'a> {
    session: &'s Session<'a>,
    step: Cell<InstallStep>,
}

impl<'s, 'a> Installer<'s, 'a> {
    pub fn new(session: &'s Session<'a>) -> Self {
        Self {
            session,
            step: Cell::new(InstallStep::Pending),
        }
    }

    pub fn current(&self) -> InstallStep {
        self.step.get()
    }

    fn advance(&self, to: InstallStep) -> Result<(), CoreError> {
        validate_transition(self.step.get(), to)?;
        check_interrupt()?;
        self.step.set(to);
        if to != InstallStep::Done {
            self.session
                .progress
                .step(to.number(), InstallStep::TOTAL, to.title());
        }
        debug!("install step: {to}");
        Ok(())
    }

    fn dependencies(&self) -> Result<ComposeCommand, CoreError> {
        let command = require_engine(self.session)?;
        info!("using compose command: {command}");
        check_registry_mirrors(self.session)?;
        Ok(command)
    }

    fn profile(&self, command: &ComposeCommand) -> Result<ResolvedDeployment, CoreError> {
        let deployment = resolve(self.session, command)?;
        for missing in deployment.profile.missing_dockerfiles() {
            self.session
                .warn(format!("Dockerfile not found: {}", missing.display()));
        }
        self.session
            .progress
            .success(&format!("profile: {}", deployment.profile.display_name()));
        Ok(deployment)
    }

    fn directories(&self, profile: &DeploymentProfile) -> Result<ScaffoldOutcome, CoreError> {
        let outcome = prepare_data_dirs(profile)?;
        match &outcome {
            ScaffoldOutcome::ExternalMissing(root) => self.session.warn(format!(
                "data root {} does not exist; create or mount it before uploading books",
                root.display()
            )),
            ScaffoldOutcome::Created(paths) => self
                .session
                .progress
                .success(&format!("created {} data directories", paths.len())),
            ScaffoldOutcome::AlreadyPresent | ScaffoldOutcome::ExternalPresent(_) => {}
        }
        Ok(outcome)
    }

    fn teardown(&self, deployment: &ResolvedDeployment) {
        let existing = match self.session.engine.compose_ps(&deployment.compose) {
            Ok(ids) => ids,
            Err(e) => {
                self.session
                    .warn(format!("could not list existing containers: {e}"));
                return;
            }
        };
        if existing.is_empty() {
            return;
        }
        let prompt = format!(
            "{} existing container(s) found. Stop and remove them?",
            existing.len()
        );
        if !self.session.confirm(&prompt, true) {
            info!("keeping existing containers");
            return;
        }
        if let Err(e) = self.session.engine.compose_down(&deployment.compose, true) {
            self.session
                .warn(format!("removing existing containers failed: {e}"));
        }
    }

    fn build_and_start(&self, deployment: &ResolvedDeployment) -> Result<BuildOutcome, CoreError> {
        let images = self.session.config.images.clone();
        let manager = ImageManager::new(self.session.engine);
        let outcome = manager.build_or_reuse(deployment, &images.prefetch, images.parallel_build)?;
        if let BuildOutcome::Built {
            prefetch_failures, ..
        } = &outcome
        {
            for base in prefetch_failures {
                self.session
                    .warn(format!("pre-pull of {base} failed; the build will pull it"));
            }
        }
        check_interrupt()?;
        manager.start(deployment)?;
        self.session.progress.success("services started");
        Ok(outcome)
    }

    fn readiness(&self, deployment: &ResolvedDeployment) -> Result<Readiness, CoreError> {
        let readiness = wait_ready(
            self.session.engine,
            &deployment.profile.container_names(),
            self.session.config.readiness.max_attempts,
            self.session.readiness_interval(),
            self.session.sleeper,
        )?;
        match &readiness {
            Readiness::Ready { attempts } => self
                .session
                .progress
                .success(&format!("services ready after {attempts} poll(s)")),
            Readiness::TimedOut { pending, .. } => self.session.warn(format!(
                "services not ready yet: {}; check the logs with `{} logs <container>`",
                pending.join(", "),
                self.session.engine.name()
            )),
        }
        Ok(readiness)
    }

    fn report(&self, deployment: &ResolvedDeployment) -> (Vec<ContainerRecord>, Vec<String>) {
        let names = deployment.profile.container_names();
        let containers: Vec<ContainerRecord> = match self.session.engine.containers() {
            Ok(all) => all
                .into_iter()
                .filter(|c| names.iter().any(|n| *n == c.name.as_str()))
                .collect(),
            Err(e) => {
                self.session.warn(format!("could not list containers: {e}"));
                Vec::new()
            }
        };
        for c in &containers {
            self.session
                .progress
                .info(&format!("{}  {}  {}", c.name, c.state, c.status));
        }
        let ports = &self.session.config.ports;
        let urls = vec![
            format!("http://localhost:{}", ports.web),
            format!("http://localhost:{}", ports.api),
        ];
        self.session
            .progress
            .success(&format!("web interface: {}", urls[0]));
        self.session.progress.info(&format!("API: {}", urls[1]));
        self.session.progress.info(&format!(
            "logs: {}",
            deployment.compose.render(&["logs", "-f"])
        ));
        self.session.progress.info(&format!(
            "stop: {}",
            deployment.compose.render(&["down"])
        ));
        (containers, urls)
    }

    fn provision_step(
        &self,
        outcome: Result<ProvisionOutcome, CoreError>,
        what: &str,
    ) -> ProvisionOutcome {
        let outcome = outcome.unwrap_or_else(|e| ProvisionOutcome::Failed {
            reason: e.to_string(),
            retry: String::new(),
        });
        match &outcome {
            ProvisionOutcome::Failed { reason, retry } => {
                if retry.is_empty() {
                    self.session.warn(format!("{what} failed: {reason}"));
                } else {
                    self.session
                        .warn(format!("{what} failed: {reason}; retry manually: {retry}"));
                }
            }
            ProvisionOutcome::Completed => self.session.progress.success(&format!("{what} done")),
            ProvisionOutcome::AlreadyPresent | ProvisionOutcome::Skipped => {}
        }
        outcome
    }

    /// Run every step in order. Fatal errors abort; everything else is
    /// collected as warnings in the report.
    pub fn run(&self) -> Result<InstallReport, CoreError> {
        self.advance(InstallStep::Dependencies)?;
        let command = self.dependencies()?;

        self.advance(InstallStep::Profile)?;
        let deployment = self.profile(&command)?;

        self.advance(InstallStep::EnvFile)?;
        let env_file = ensure_env_file(&self.session.env_file(), &self.session.config.ports)?;
        if env_file == EnvFileOutcome::Created {
            self.session.progress.success(&format!(
                "created {} with a fresh signing secret",
                self.session.env_file().display()
            ));
        }

        self.advance(InstallStep::Directories)?;
        let directories = self.directories(&deployment.profile)?;

        self.advance(InstallStep::Ports)?;
        check_ports(self.session, &self.session.config.core_ports(), "Lectern")?;

        self.advance(InstallStep::Teardown)?;
        self.teardown(&deployment);

        self.advance(InstallStep::BuildAndStart)?;
        let build = self.build_and_start(&deployment)?;

        self.advance(InstallStep::Readiness)?;
        let readiness = self.readiness(&deployment)?;

        self.advance(InstallStep::Report)?;
        let (containers, urls) = self.report(&deployment);

        let backend = deployment
            .profile
            .service(ServiceRole::Backend)
            .map(|s| s.container.as_str().to_owned());

        self.advance(InstallStep::RuntimeDependency)?;
        let runtime_dependency = match &backend {
            Some(name) => self.provision_step(
                ensure_runtime_dependency(self.session, name),
                &format!("{} install", self.session.config.provision.dependency_name),
            ),
            None => ProvisionOutcome::Skipped,
        };

        self.advance(InstallStep::AdminBootstrap)?;
        let admin = match &backend {
            Some(name) => {
                self.provision_step(bootstrap_admin(self.session, name), "admin bootstrap")
            }
            None => ProvisionOutcome::Skipped,
        };

        self.advance(InstallStep::Done)?;
        Ok(InstallReport {
            profile: deployment.profile,
            env_file,
            directories,
            build,
            readiness,
            containers,
            urls,
            runtime_dependency,
            admin,
            warnings: self.session.take_warnings(),
            finished_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;
    use crate::prompt::{Answer, AssumeDefaults, Prompter, ScriptedPrompter};
    use crate::readiness::ThreadSleeper;
    use lectern_profile::{LecternConfig, PlatformKind};
    use lectern_runtime::{HostEnvironment, MockEngine, PortProbe, StaticPortProbe};

    fn with_session<T>(
        engine: &MockEngine,
        ports: &dyn PortProbe,
        prompter: &dyn Prompter,
        f: impl FnOnce(&Session<'_>) -> T,
    ) -> T {
        let progress = RecordingProgress::new();
        let session = Session::new(
            "/nonexistent/lectern",
            LecternConfig::default(),
            HostEnvironment::fixed(PlatformKind::Linux, false),
            engine,
            ports,
            prompter,
            &progress,
            &ThreadSleeper,
        );
        f(&session)
    }

    #[test]
    fn missing_engine_is_fatal_with_hint() {
        let engine = MockEngine::new().unavailable();
        let ports = StaticPortProbe::default();
        let err = with_session(&engine, &ports, &AssumeDefaults, |s| {
            Installer::new(s).run().unwrap_err()
        });
        assert!(matches!(err, CoreError::MissingDependency { .. }));
        assert!(err.hint().unwrap().contains("missing prerequisites"));
    }

    #[test]
    fn unreachable_daemon_is_fatal() {
        let engine = MockEngine::new().daemon_down();
        let ports = StaticPortProbe::default();
        let err = with_session(&engine, &ports, &AssumeDefaults, |s| {
            let installer = Installer::new(s);
            let err = installer.run().unwrap_err();
            assert_eq!(installer.current(), InstallStep::Dependencies);
            err
        });
        assert!(matches!(err, CoreError::MissingDependency { .. }));
    }

    #[test]
    fn busy_port_declined_aborts() {
        let engine = MockEngine::new();
        let ports = StaticPortProbe::new([1280]);
        let prompter = ScriptedPrompter::new([Answer::Confirm(false)]);
        let err = with_session(&engine, &ports, &prompter, |s| {
            check_ports(s, &[1280, 1281], "Lectern").unwrap_err()
        });
        assert!(err.is_declined());
    }

    #[test]
    fn missing_port_tool_only_warns() {
        let engine = MockEngine::new();
        let ports = StaticPortProbe::without_tool();
        with_session(&engine, &ports, &AssumeDefaults, |s| {
            check_ports(s, &[1280], "Lectern").unwrap();
            assert_eq!(s.take_warnings().len(), 1);
        });
    }
}
