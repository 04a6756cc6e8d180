use crate::concurrency::check_interrupt;
use crate::images::{BuildOutcome, ImageManager};
use crate::installer::{check_ports, require_engine};
use crate::provision::{download_model, ProvisionOutcome, SidecarModel};
use crate::readiness::{wait_ready, Readiness};
use crate::resolver::resolve_sidecar;
use crate::session::Session;
use crate::CoreError;
use lectern_profile::ServiceRole;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct SidecarReport {
    pub role: ServiceRole,
    pub container: String,
    pub build: BuildOutcome,
    pub readiness: Readiness,
    pub url: String,
    pub model: Option<(SidecarModel, ProvisionOutcome)>,
    pub warnings: Vec<String>,
}

fn sidecar_port(session: &Session<'_>, role: ServiceRole) -> u16 {
    match role {
        ServiceRole::Ocr => session.config.ports.ocr,
        _ => session.config.ports.tts,
    }
}

/// Offer the role's models; the default entry skips the download.
fn choose_model(session: &Session<'_>, role: ServiceRole) -> Option<SidecarModel> {
    let models = SidecarModel::for_role(role);
    let mut items = vec!["Skip model download".to_owned()];
    items.extend(models.iter().map(ToString::to_string));
    let idx = session
        .prompter
        .select("Download a model now?", &items, 0);
    idx.checked_sub(1).and_then(|i| models.get(i).copied())
}

/// Build (or reuse), start and probe a TTS or OCR sidecar, then optionally
/// download a model inside it.
pub fn install_sidecar(
    session: &Session<'_>,
    role: ServiceRole,
    model: Option<SidecarModel>,
) -> Result<SidecarReport, CoreError> {
    let command = require_engine(session)?;
    let port = sidecar_port(session, role);
    check_ports(session, &[port], &format!("the {role} sidecar"))?;

    let deployment = resolve_sidecar(session, &command, role)?;
    let container = deployment
        .profile
        .service(role)
        .map_or_else(
            || format!("lectern-{role}"),
            |s| s.container.as_str().to_owned(),
        );
    debug!("{role} sidecar container: {container}");

    let manager = ImageManager::new(session.engine);
    let build = manager.build_or_reuse(
        &deployment,
        &[],
        session.config.images.parallel_build,
    )?;
    check_interrupt()?;
    manager.start(&deployment)?;

    let readiness = wait_ready(
        session.engine,
        &deployment.profile.container_names(),
        session.config.readiness.max_attempts,
        session.readiness_interval(),
        session.sleeper,
    )?;
    if let Readiness::TimedOut { .. } = readiness {
        session.warn(format!("{container} is not ready yet"));
    }
    let url = format!("http://localhost:{port}");
    session
        .progress
        .success(&format!("{role} sidecar running at {url}"));

    let chosen = match model {
        Some(m) if m.role() != role => {
            session.warn(format!("model {m} does not belong to the {role} sidecar; skipping"));
            None
        }
        Some(m) => Some(m),
        None => choose_model(session, role),
    };
    let model = match chosen {
        Some(m) => {
            let outcome = download_model(session, &container, m)?;
            if let ProvisionOutcome::Failed { reason, retry } = &outcome {
                session.warn(format!(
                    "model {m} download failed: {reason}; retry manually: {retry}"
                ));
            }
            Some((m, outcome))
        }
        None => None,
    };

    Ok(SidecarReport {
        role,
        container,
        build,
        readiness,
        url,
        model,
        warnings: session.take_warnings(),
    })
}
