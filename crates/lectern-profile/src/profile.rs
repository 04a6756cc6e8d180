use crate::catalog::ProfileKind;
use crate::compose::{parse_compose_file, BuildSpec, ComposeFile};
use crate::image::ImageRef;
use crate::types::{ContainerFamily, ContainerName, ServiceRole};
use crate::ProfileError;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One managed service as declared (or defaulted) by a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSpec {
    pub role: ServiceRole,
    /// Compose service key, when the profile declares the role.
    pub service: Option<String>,
    pub image: ImageRef,
    pub container: ContainerName,
    #[serde(skip)]
    pub build: Option<BuildSpec>,
    pub ports: Vec<u16>,
    pub healthcheck: bool,
}

/// A resolved deployment profile: the compose file plus everything derived
/// from it.
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentProfile {
    /// Catalog entry, or `None` for an explicit override file.
    pub kind: Option<ProfileKind>,
    pub path: PathBuf,
    pub family: ContainerFamily,
    pub services: Vec<ServiceSpec>,
    pub data_root: PathBuf,
}

/// Inputs for deriving the data root.
#[derive(Debug, Clone)]
pub struct DataRoots {
    /// Local directory tree used by the default family.
    pub local: PathBuf,
    /// External data root assumed by the NAS/Linux family.
    pub external: PathBuf,
}

impl DeploymentProfile {
    pub fn load(
        path: &Path,
        kind: Option<ProfileKind>,
        roles: &[ServiceRole],
        roots: &DataRoots,
    ) -> Result<Self, ProfileError> {
        let compose = parse_compose_file(path)?;
        Ok(Self::from_compose(path, kind, &compose, roles, roots))
    }

    /// Derive a profile from an already-parsed compose file. Roles whose
    /// image reference cannot be parsed fall back to the role default.
    pub fn from_compose(
        path: &Path,
        kind: Option<ProfileKind>,
        compose: &ComposeFile,
        roles: &[ServiceRole],
        roots: &DataRoots,
    ) -> Self {
        let metadata = compose.metadata.clone().unwrap_or_default();
        let family = metadata.family.unwrap_or_else(|| {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ContainerFamily::infer_from_file_name(&file_name)
        });

        let services = roles
            .iter()
            .map(|&role| {
                let declared = compose
                    .services
                    .iter()
                    .find(|(key, _)| ServiceRole::from_service_key(key) == Some(role));
                match declared {
                    Some((key, svc)) => ServiceSpec {
                        role,
                        service: Some(key.clone()),
                        image: svc
                            .image
                            .as_deref()
                            .and_then(|i| ImageRef::parse(i).ok())
                            .unwrap_or_else(|| ImageRef::default_for(role)),
                        container: svc
                            .container_name
                            .as_deref()
                            .map_or_else(|| family.container_name(role), ContainerName::from),
                        build: svc.build.clone(),
                        ports: svc.published_ports(),
                        healthcheck: svc.has_healthcheck(),
                    },
                    None => ServiceSpec {
                        role,
                        service: None,
                        image: ImageRef::default_for(role),
                        container: family.container_name(role),
                        build: None,
                        ports: Vec::new(),
                        healthcheck: false,
                    },
                }
            })
            .collect();

        let data_root = metadata.data_root.unwrap_or_else(|| match family {
            ContainerFamily::Default => roots.local.clone(),
            ContainerFamily::NasLinux => roots.external.clone(),
        });

        Self {
            kind,
            path: path.to_path_buf(),
            family,
            services,
            data_root,
        }
    }

    /// Directory containing the profile file. Build contexts are relative
    /// to it, so every compose invocation runs from here.
    pub fn project_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
    }

    pub fn service(&self, role: ServiceRole) -> Option<&ServiceSpec> {
        self.services.iter().find(|s| s.role == role)
    }

    pub fn container_names(&self) -> Vec<ContainerName> {
        self.services.iter().map(|s| s.container.clone()).collect()
    }

    pub fn images(&self) -> Vec<ImageRef> {
        self.services.iter().map(|s| s.image.clone()).collect()
    }

    /// Dockerfiles referenced by build contexts that do not exist on disk.
    pub fn missing_dockerfiles(&self) -> Vec<PathBuf> {
        let base = self.project_dir();
        self.services
            .iter()
            .filter_map(|s| s.build.as_ref())
            .map(|b| b.dockerfile_path(&base))
            .filter(|p| !p.exists())
            .collect()
    }

    pub fn display_name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        )
    }
}
