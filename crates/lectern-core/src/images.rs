use crate::resolver::ResolvedDeployment;
use crate::CoreError;
use lectern_profile::{ContainerFamily, ImageRef, ServiceRole};
use lectern_runtime::{ContainerEngine, ContainerState};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum BuildOutcome {
    /// Every required image was already present; no build ran.
    Reused,
    Built {
        parallel: bool,
        /// Base images whose pre-pull failed. The build pulls them itself.
        prefetch_failures: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "path", rename_all = "kebab-case")]
pub enum ExportOutcome {
    NotPresent,
    Exported(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "causes", rename_all = "kebab-case")]
pub enum RemovalOutcome {
    NotFound,
    Removed,
    /// The graceful attempt failed; the forced one succeeded.
    ForceRemoved,
    /// Both attempts failed.
    Failed(Vec<String>),
}

impl RemovalOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub image: String,
    pub containers: Vec<(String, RemovalOutcome)>,
    pub image_outcome: RemovalOutcome,
}

/// Archive name for a role's image inside the export directory.
pub fn archive_name(role: ServiceRole) -> String {
    format!("lectern-{role}.tar.gz")
}

/// Export archives present in `dir`, in role order.
pub fn archives_in(dir: &Path) -> Vec<PathBuf> {
    ServiceRole::ALL
        .iter()
        .map(|&r| dir.join(archive_name(r)))
        .filter(|p| p.is_file())
        .collect()
}

/// Image lifecycle operations over one engine. Holds no state: every
/// decision re-queries the engine.
pub struct ImageManager<'a> {
    engine: &'a dyn ContainerEngine,
}

impl<'a> ImageManager<'a> {
    pub fn new(engine: &'a dyn ContainerEngine) -> Self {
        Self { engine }
    }

    /// Required images with no exact `(repository, tag)` match locally.
    /// One `images` query.
    pub fn missing(&self, required: &[ImageRef]) -> Result<Vec<ImageRef>, CoreError> {
        let local = self.engine.images()?;
        Ok(required
            .iter()
            .filter(|r| !local.iter().any(|l| l.matches(r)))
            .cloned()
            .collect())
    }

    pub fn exists_all(&self, required: &[ImageRef]) -> Result<bool, CoreError> {
        Ok(self.missing(required)?.is_empty())
    }

    pub fn exists(&self, image: &ImageRef) -> Result<bool, CoreError> {
        self.exists_all(std::slice::from_ref(image))
    }

    /// Reuse when every image exists; otherwise best-effort pre-pull of the
    /// shared base images, then one compose build.
    pub fn build_or_reuse(
        &self,
        deployment: &ResolvedDeployment,
        prefetch: &[String],
        allow_parallel: bool,
    ) -> Result<BuildOutcome, CoreError> {
        let required = deployment.profile.images();
        let missing = self.missing(&required)?;
        if missing.is_empty() {
            info!("all {} images present, skipping build", required.len());
            return Ok(BuildOutcome::Reused);
        }
        debug!(
            "missing images: {}",
            missing
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        );

        let mut prefetch_failures = Vec::new();
        for base in prefetch {
            if let Err(e) = self.engine.pull(base) {
                warn!("pre-pull of {base} failed: {e}");
                prefetch_failures.push(base.clone());
            }
        }

        let parallel = allow_parallel && self.engine.compose_supports_parallel(&deployment.compose);
        self.engine
            .compose_build(&deployment.compose, parallel)
            .map_err(|source| CoreError::BuildFailed {
                source,
                retry: deployment.compose.render(&["build"]),
            })?;
        Ok(BuildOutcome::Built {
            parallel,
            prefetch_failures,
        })
    }

    pub fn start(&self, deployment: &ResolvedDeployment) -> Result<(), CoreError> {
        self.engine
            .compose_up(&deployment.compose, false)
            .map_err(|source| CoreError::StartFailed {
                source,
                retry: deployment.compose.render(&["up", "-d"]),
            })
    }

    /// Save `image` as `<export_dir>/lectern-<role>.tar.gz`. A failed save
    /// leaves no partial archive behind.
    pub fn export(
        &self,
        image: &ImageRef,
        role: ServiceRole,
        export_dir: &Path,
    ) -> Result<ExportOutcome, CoreError> {
        if !self.exists(image)? {
            return Ok(ExportOutcome::NotPresent);
        }
        std::fs::create_dir_all(export_dir)?;
        let dest = export_dir.join(archive_name(role));
        if let Err(e) = self.engine.save(&image.to_string(), &dest) {
            if dest.exists() {
                let _ = std::fs::remove_file(&dest);
            }
            return Err(e.into());
        }
        info!("exported {image} to {}", dest.display());
        Ok(ExportOutcome::Exported(dest))
    }

    /// Load an archive. No existence check: loading replaces the tag.
    pub fn import(&self, archive: &Path) -> Result<(), CoreError> {
        self.engine.load(archive)?;
        info!("imported {}", archive.display());
        Ok(())
    }

    /// Containers that must go before `image` can: both family names for
    /// the role plus every container created from exactly this reference.
    pub fn dependents(&self, image: &ImageRef, role: ServiceRole) -> Result<Vec<String>, CoreError> {
        let mut names: Vec<String> = ContainerFamily::ALL
            .iter()
            .map(|f| f.container_name(role).into_inner())
            .collect();
        let reference = image.to_string();
        for c in self.engine.containers()? {
            if c.image == reference && !names.contains(&c.name) {
                names.push(c.name);
            }
        }
        names.dedup();
        Ok(names)
    }

    fn remove_container(&self, name: &str) -> Result<RemovalOutcome, CoreError> {
        let state = self.engine.container_state(name)?;
        if state == ContainerState::Absent {
            return Ok(RemovalOutcome::NotFound);
        }
        if state == ContainerState::Running {
            if let Err(e) = self.engine.stop(name) {
                warn!("stopping {name} failed: {e}");
            }
        }
        if self.engine.remove_container(name, false).is_ok() {
            return Ok(RemovalOutcome::Removed);
        }
        match self.engine.remove_container(name, true) {
            Ok(()) => Ok(RemovalOutcome::ForceRemoved),
            Err(e) => Ok(RemovalOutcome::Failed(vec![e.to_string()])),
        }
    }

    /// Remove dependent containers, then the image: graceful first, forced
    /// second. Absent targets report `NotFound`.
    pub fn delete(&self, image: &ImageRef, role: ServiceRole) -> Result<DeleteReport, CoreError> {
        let reference = image.to_string();
        let mut containers = Vec::new();
        for name in self.dependents(image, role)? {
            let outcome = self.remove_container(&name)?;
            debug!("container {name}: {outcome:?}");
            containers.push((name, outcome));
        }

        let image_outcome = if !self.exists(image)? {
            RemovalOutcome::NotFound
        } else if self.engine.remove_image(&reference, false).is_ok() {
            RemovalOutcome::Removed
        } else {
            match self.engine.remove_image(&reference, true) {
                Ok(()) => RemovalOutcome::ForceRemoved,
                Err(e) => RemovalOutcome::Failed(vec![
                    e.to_string(),
                    "a container outside this deployment still uses the image".to_owned(),
                    "the image is referenced by additional tags".to_owned(),
                    "insufficient permission for the container engine".to_owned(),
                ]),
            }
        };

        Ok(DeleteReport {
            image: reference,
            containers,
            image_outcome,
        })
    }
}
