use crate::CoreError;
use lectern_profile::{ContainerFamily, DeploymentProfile};
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

/// Local data tree created for default-family profiles.
pub const DATA_SUBDIRS: [&str; 5] = ["books", "covers", "uploads", "database", "logs"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "paths", rename_all = "kebab-case")]
pub enum ScaffoldOutcome {
    /// Directories created under the local data root.
    Created(Vec<PathBuf>),
    AlreadyPresent,
    /// External data root assumed by the NAS/Linux family exists.
    ExternalPresent(PathBuf),
    /// External data root is absent. Not created; the operator must mount it.
    ExternalMissing(PathBuf),
}

pub fn prepare_data_dirs(profile: &DeploymentProfile) -> Result<ScaffoldOutcome, CoreError> {
    match profile.family {
        ContainerFamily::NasLinux => {
            let root = profile.data_root.clone();
            if root.is_dir() {
                Ok(ScaffoldOutcome::ExternalPresent(root))
            } else {
                Ok(ScaffoldOutcome::ExternalMissing(root))
            }
        }
        ContainerFamily::Default => {
            let mut created = Vec::new();
            for sub in DATA_SUBDIRS {
                let dir = profile.data_root.join(sub);
                if !dir.is_dir() {
                    std::fs::create_dir_all(&dir)?;
                    debug!("created {}", dir.display());
                    created.push(dir);
                }
            }
            if created.is_empty() {
                Ok(ScaffoldOutcome::AlreadyPresent)
            } else {
                Ok(ScaffoldOutcome::Created(created))
            }
        }
    }
}
