use crate::session::Session;
use crate::CoreError;
use lectern_profile::{
    candidates_for, DeploymentProfile, ImageRef, ProfileKind, ServiceRole, ServiceSpec,
    OCR_COMPOSE_FILE, TTS_COMPOSE_FILE,
};
use lectern_runtime::{ComposeCommand, ComposeInvocation};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The configuration object produced by profile resolution and passed to
/// every later step.
#[derive(Debug, Clone)]
pub struct ResolvedDeployment {
    pub profile: DeploymentProfile,
    pub compose: ComposeInvocation,
}

impl ResolvedDeployment {
    pub fn new(profile: DeploymentProfile, command: ComposeCommand) -> Self {
        let compose = ComposeInvocation::new(command, &profile.path);
        Self { profile, compose }
    }
}

/// First existing path among `candidates`.
fn first_existing(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates.into_iter().find(|p| p.is_file())
}

/// An override path is tried as given, then relative to the compose directory.
pub fn find_override(path: &Path, compose_dir: &Path) -> Option<PathBuf> {
    first_existing([path.to_path_buf(), compose_dir.join(path)])
}

/// First catalog candidate whose file exists.
pub fn first_candidate(
    candidates: &[ProfileKind],
    compose_dir: &Path,
) -> Option<(ProfileKind, PathBuf)> {
    candidates
        .iter()
        .map(|&k| (k, k.path_in(compose_dir)))
        .find(|(_, p)| p.is_file())
}

fn load(
    session: &Session<'_>,
    command: &ComposeCommand,
    path: &Path,
    kind: Option<ProfileKind>,
    roles: &[ServiceRole],
) -> Result<ResolvedDeployment, CoreError> {
    let profile = DeploymentProfile::load(path, kind, roles, &session.data_roots())?;
    info!(
        "using profile {} (family {:?})",
        profile.path.display(),
        profile.family
    );
    Ok(ResolvedDeployment::new(profile, command.clone()))
}

fn manual_selection(
    session: &Session<'_>,
    command: &ComposeCommand,
    compose_dir: &Path,
) -> Result<ResolvedDeployment, CoreError> {
    let items: Vec<String> = ProfileKind::CATALOG
        .iter()
        .map(|k| k.label().to_owned())
        .collect();
    let idx = session
        .prompter
        .select("Select a deployment profile", &items, 0);
    let kind = ProfileKind::CATALOG
        .get(idx)
        .copied()
        .unwrap_or(ProfileKind::Standard);
    let path = kind.path_in(compose_dir);
    if path.is_file() {
        return load(session, command, &path, Some(kind), &ServiceRole::CORE);
    }

    let standard = ProfileKind::Standard.path_in(compose_dir);
    if !standard.is_file() {
        return Err(CoreError::DefaultProfileMissing(standard));
    }
    session.warn(format!(
        "{} not found, falling back to {}",
        path.display(),
        ProfileKind::Standard.file_name()
    ));
    load(
        session,
        command,
        &standard,
        Some(ProfileKind::Standard),
        &ServiceRole::CORE,
    )
}

/// Resolve the deployment profile for the core stack.
///
/// Order: explicit override, then the platform's candidate list (confirmed
/// by the operator), then manual selection. Only a missing standard profile
/// with nothing else resolved is fatal.
pub fn resolve(
    session: &Session<'_>,
    command: &ComposeCommand,
) -> Result<ResolvedDeployment, CoreError> {
    let compose_dir = session.compose_dir();

    if let Some(requested) = &session.profile_override {
        match find_override(requested, &compose_dir) {
            Some(path) => {
                debug!("profile override: {}", path.display());
                let kind = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(ProfileKind::from_file_name)
                    .filter(|k| k.path_in(&compose_dir) == path);
                return load(session, command, &path, kind, &ServiceRole::CORE);
            }
            None => session.warn(format!(
                "profile override {} does not exist, ignoring it",
                requested.display()
            )),
        }
    }

    let candidates = candidates_for(session.host.platform, session.host.nas);
    debug!(
        "profile candidates for {}: {:?}",
        session.host.platform, candidates
    );
    if let Some((kind, path)) = first_candidate(&candidates, &compose_dir) {
        let prompt = format!("Use the {} profile?", kind.label());
        if session.confirm(&prompt, true) {
            return load(session, command, &path, Some(kind), &ServiceRole::CORE);
        }
    }

    manual_selection(session, command, &compose_dir)
}

fn sidecar_file(role: ServiceRole) -> Option<&'static str> {
    match role {
        ServiceRole::Tts => Some(TTS_COMPOSE_FILE),
        ServiceRole::Ocr => Some(OCR_COMPOSE_FILE),
        ServiceRole::Frontend | ServiceRole::Backend => None,
    }
}

/// Resolve the compose file of a sidecar (`tts` or `ocr`).
pub fn resolve_sidecar(
    session: &Session<'_>,
    command: &ComposeCommand,
    role: ServiceRole,
) -> Result<ResolvedDeployment, CoreError> {
    let Some(file) = sidecar_file(role) else {
        return resolve(session, command);
    };
    let path = session.compose_dir().join(file);
    if !path.is_file() {
        return Err(CoreError::SidecarProfileMissing { role, path });
    }
    load(session, command, &path, None, &[role])
}

/// The service `role` is deployed as, read without prompting: the
/// sidecar's own compose file, else the override, else the first existing
/// platform candidate. `None` when no such file exists.
pub fn declared_service(
    session: &Session<'_>,
    role: ServiceRole,
) -> Result<Option<ServiceSpec>, CoreError> {
    let compose_dir = session.compose_dir();
    let found = match sidecar_file(role) {
        Some(file) => Some((None, compose_dir.join(file))).filter(|(_, p)| p.is_file()),
        None => session
            .profile_override
            .as_deref()
            .and_then(|p| find_override(p, &compose_dir))
            .map(|p| (None, p))
            .or_else(|| {
                let candidates = candidates_for(session.host.platform, session.host.nas);
                first_candidate(&candidates, &compose_dir).map(|(k, p)| (Some(k), p))
            }),
    };
    let Some((kind, path)) = found else {
        debug!("no profile declares {role}");
        return Ok(None);
    };
    let profile = DeploymentProfile::load(&path, kind, &[role], &session.data_roots())?;
    Ok(profile.service(role).cloned())
}

/// Image `role` runs from; `lectern-<role>:latest` when no profile exists.
pub fn declared_image(session: &Session<'_>, role: ServiceRole) -> Result<ImageRef, CoreError> {
    Ok(declared_service(session, role)?
        .map_or_else(|| ImageRef::default_for(role), |s| s.image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::RecordingProgress;
    use crate::prompt::{Answer, AssumeDefaults, Prompter, ScriptedPrompter};
    use crate::readiness::ThreadSleeper;
    use lectern_profile::{ContainerFamily, LecternConfig, PlatformKind};
    use lectern_runtime::{HostEnvironment, MockEngine, StaticPortProbe};

    const STANDARD: &str = "services:\n  frontend:\n    image: lectern-frontend:latest\n  backend:\n    image: lectern-backend:latest\n";

    fn root_with(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("deploy")).unwrap();
        for f in files {
            std::fs::write(dir.path().join("deploy").join(f), STANDARD).unwrap();
        }
        dir
    }

    fn with_session<T>(
        root: &Path,
        platform: PlatformKind,
        nas: bool,
        prompter: &dyn Prompter,
        f: impl FnOnce(&Session<'_>) -> T,
    ) -> T {
        let engine = MockEngine::new();
        let ports = StaticPortProbe::default();
        let progress = RecordingProgress::new();
        let session = Session::new(
            root,
            LecternConfig::default(),
            HostEnvironment::fixed(platform, nas),
            &engine,
            &ports,
            prompter,
            &progress,
            &ThreadSleeper,
        );
        f(&session)
    }

    fn cmd() -> ComposeCommand {
        ComposeCommand::plugin("mock")
    }

    #[test]
    fn platform_candidate_wins() {
        let root = root_with(&["docker-compose.yml", "docker-compose.macos.yml"]);
        let resolved = with_session(root.path(), PlatformKind::MacOs, false, &AssumeDefaults, |s| {
            resolve(s, &cmd()).unwrap()
        });
        assert_eq!(resolved.profile.kind, Some(ProfileKind::MacOs));
        assert_eq!(resolved.compose.project_dir, root.path().join("deploy"));
        assert!(resolved.compose.args(&[]).contains(
            &root
                .path()
                .join("deploy/docker-compose.macos.yml")
                .to_string_lossy()
                .into_owned()
        ));
    }

    #[test]
    fn linux_prefers_nas_when_detected() {
        let root = root_with(&[
            "docker-compose.yml",
            "docker-compose.linux.yml",
            "docker-compose.nas.yml",
        ]);
        let nas = with_session(root.path(), PlatformKind::Linux, true, &AssumeDefaults, |s| {
            resolve(s, &cmd()).unwrap()
        });
        assert_eq!(nas.profile.kind, Some(ProfileKind::Nas));
        assert_eq!(nas.profile.family, ContainerFamily::NasLinux);

        let linux = with_session(root.path(), PlatformKind::Linux, false, &AssumeDefaults, |s| {
            resolve(s, &cmd()).unwrap()
        });
        assert_eq!(linux.profile.kind, Some(ProfileKind::Linux));
    }

    #[test]
    fn missing_platform_file_falls_through_to_standard() {
        let root = root_with(&["docker-compose.yml"]);
        let resolved = with_session(root.path(), PlatformKind::Windows, false, &AssumeDefaults, |s| {
            resolve(s, &cmd()).unwrap()
        });
        assert_eq!(resolved.profile.kind, Some(ProfileKind::Standard));
        assert_eq!(resolved.profile.family, ContainerFamily::Default);
    }

    #[test]
    fn declining_confirmation_opens_manual_selection() {
        let root = root_with(&["docker-compose.yml", "docker-compose.linux.yml"]);
        let prompter = ScriptedPrompter::new([Answer::Confirm(false), Answer::Select(0)]);
        let resolved = with_session(root.path(), PlatformKind::Linux, false, &prompter, |s| {
            resolve(s, &cmd()).unwrap()
        });
        assert_eq!(resolved.profile.kind, Some(ProfileKind::Standard));
        assert_eq!(prompter.asked().len(), 2);
    }

    #[test]
    fn manual_choice_with_missing_file_falls_back_to_standard() {
        let root = root_with(&["docker-compose.yml"]);
        let prompter = ScriptedPrompter::new([Answer::Confirm(false), Answer::Select(4)]);
        let resolved = with_session(root.path(), PlatformKind::Unknown, false, &prompter, |s| {
            let r = resolve(s, &cmd()).unwrap();
            assert_eq!(s.take_warnings().len(), 1);
            r
        });
        assert_eq!(resolved.profile.kind, Some(ProfileKind::Standard));
    }

    #[test]
    fn missing_standard_profile_is_fatal() {
        let root = root_with(&[]);
        let err = with_session(root.path(), PlatformKind::Linux, false, &AssumeDefaults, |s| {
            resolve(s, &cmd()).unwrap_err()
        });
        assert!(matches!(err, CoreError::DefaultProfileMissing(_)));
    }

    #[test]
    fn missing_override_is_ignored() {
        let root = root_with(&["docker-compose.yml"]);
        let resolved = with_session(root.path(), PlatformKind::Linux, false, &AssumeDefaults, |s| {
            let mut s2 = Session::new(
                root.path(),
                LecternConfig::default(),
                s.host.clone(),
                s.engine,
                s.ports,
                s.prompter,
                s.progress,
                s.sleeper,
            );
            s2.profile_override = Some(PathBuf::from("nope.yml"));
            let r = resolve(&s2, &cmd()).unwrap();
            assert_eq!(s2.take_warnings().len(), 1);
            r
        });
        assert_eq!(resolved.profile.kind, Some(ProfileKind::Standard));
    }

    #[test]
    fn override_relative_to_compose_dir_skips_prompts() {
        let root = root_with(&["docker-compose.yml", "custom.yml"]);
        let prompter = ScriptedPrompter::new([]);
        let resolved = with_session(root.path(), PlatformKind::Linux, false, &prompter, |s| {
            let s2 = Session::new(
                root.path(),
                LecternConfig::default(),
                s.host.clone(),
                s.engine,
                s.ports,
                s.prompter,
                s.progress,
                s.sleeper,
            )
            .with_profile_override(Some(PathBuf::from("custom.yml")));
            resolve(&s2, &cmd()).unwrap()
        });
        assert_eq!(resolved.profile.kind, None);
        assert!(resolved.profile.path.ends_with("deploy/custom.yml"));
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn sidecar_profile_lookup() {
        let root = root_with(&["docker-compose.tts.yml"]);
        std::fs::write(
            root.path().join("deploy/docker-compose.tts.yml"),
            "services:\n  tts:\n    image: lectern-tts:latest\n    ports: ['5050:5050']\n",
        )
        .unwrap();
        with_session(root.path(), PlatformKind::Linux, false, &AssumeDefaults, |s| {
            let tts = resolve_sidecar(s, &cmd(), ServiceRole::Tts).unwrap();
            assert_eq!(tts.profile.services.len(), 1);
            assert_eq!(tts.profile.services[0].container, "lectern-tts");
            let err = resolve_sidecar(s, &cmd(), ServiceRole::Ocr).unwrap_err();
            assert!(matches!(err, CoreError::SidecarProfileMissing { .. }));
        });
    }

    #[test]
    fn declared_image_follows_the_profile_tag() {
        let root = root_with(&[]);
        std::fs::write(
            root.path().join("deploy/docker-compose.yml"),
            "services:\n  frontend:\n    image: lectern-frontend:2.0\n  backend:\n    image: registry.local:5000/lectern-backend:2.0\n",
        )
        .unwrap();
        let prompter = ScriptedPrompter::new([]);
        with_session(root.path(), PlatformKind::Linux, false, &prompter, |s| {
            assert_eq!(
                declared_image(s, ServiceRole::Frontend).unwrap().to_string(),
                "lectern-frontend:2.0"
            );
            assert_eq!(
                declared_image(s, ServiceRole::Backend).unwrap().to_string(),
                "registry.local:5000/lectern-backend:2.0"
            );
            // no sidecar file: role default
            assert_eq!(
                declared_image(s, ServiceRole::Tts).unwrap().to_string(),
                "lectern-tts:latest"
            );
        });
        assert!(prompter.asked().is_empty());
    }

    #[test]
    fn declared_service_without_profile_is_none() {
        let root = root_with(&[]);
        with_session(root.path(), PlatformKind::Linux, false, &AssumeDefaults, |s| {
            assert!(declared_service(s, ServiceRole::Backend).unwrap().is_none());
            assert_eq!(
                declared_image(s, ServiceRole::Backend).unwrap().to_string(),
                "lectern-backend:latest"
            );
        });
    }

    #[test]
    fn nas_declared_service_uses_nas_container_name() {
        let root = root_with(&["docker-compose.yml", "docker-compose.nas.yml"]);
        with_session(root.path(), PlatformKind::Linux, true, &AssumeDefaults, |s| {
            let spec = declared_service(s, ServiceRole::Backend).unwrap().unwrap();
            assert_eq!(spec.container, "lectern-nas-backend");
        });
    }
}
