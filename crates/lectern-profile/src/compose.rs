use crate::types::ContainerFamily;
use crate::ProfileError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// The subset of a compose file Lectern reads. Unknown keys are ignored:
/// compose files belong to the application, not to the installer.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ComposeFile {
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,
    /// Installer metadata carried as a compose extension field.
    #[serde(rename = "x-lectern", default)]
    pub metadata: Option<ProfileMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ComposeService {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub container_name: Option<String>,
    #[serde(default)]
    pub build: Option<BuildSpec>,
    #[serde(default)]
    pub ports: Vec<serde_yaml::Value>,
    #[serde(default)]
    pub healthcheck: Option<serde_yaml::Value>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BuildSpec {
    Context(String),
    Detailed {
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        dockerfile: Option<String>,
    },
}

impl BuildSpec {
    /// Dockerfile path relative to `base` (the compose file's directory).
    pub fn dockerfile_path(&self, base: &Path) -> PathBuf {
        let (context, dockerfile) = match self {
            Self::Context(c) => (c.as_str(), None),
            Self::Detailed {
                context,
                dockerfile,
            } => (context.as_deref().unwrap_or("."), dockerfile.as_deref()),
        };
        base.join(context).join(dockerfile.unwrap_or("Dockerfile"))
    }
}

/// `x-lectern:` block. Declares the naming family explicitly instead of
/// leaving it to file-name inference.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProfileMetadata {
    #[serde(default)]
    pub family: Option<ContainerFamily>,
    #[serde(default)]
    pub data_root: Option<PathBuf>,
}

impl ComposeService {
    /// Host ports published by this service (`"1280:80"`, `1280`,
    /// long-form `{published: 1280}`).
    pub fn published_ports(&self) -> Vec<u16> {
        self.ports.iter().filter_map(published_port).collect()
    }

    pub fn has_healthcheck(&self) -> bool {
        match &self.healthcheck {
            None => false,
            Some(value) => !value
                .get("disable")
                .and_then(serde_yaml::Value::as_bool)
                .unwrap_or(false),
        }
    }
}

fn published_port(value: &serde_yaml::Value) -> Option<u16> {
    match value {
        serde_yaml::Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
        serde_yaml::Value::String(s) => {
            // [ip:]host:container[/proto]
            let without_proto = s.split('/').next().unwrap_or(s);
            let parts: Vec<&str> = without_proto.split(':').collect();
            let host = match parts.len() {
                1 => parts[0],
                n => parts[n - 2],
            };
            host.parse().ok()
        }
        serde_yaml::Value::Mapping(_) => value.get("published").and_then(|p| match p {
            serde_yaml::Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok()),
            serde_yaml::Value::String(s) => s.parse().ok(),
            _ => None,
        }),
        _ => None,
    }
}

pub fn parse_compose_str(input: &str) -> Result<ComposeFile, ProfileError> {
    Ok(serde_yaml::from_str(input)?)
}

pub fn parse_compose_file(path: impl AsRef<Path>) -> Result<ComposeFile, ProfileError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ProfileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_compose_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_services_and_metadata() {
        let input = r#"
x-lectern:
  family: nas-linux
  data_root: /volume1/docker/lectern
services:
  frontend:
    image: lectern-frontend:2.1
    build:
      context: ../frontend
      dockerfile: Dockerfile.prod
    ports:
      - "1280:80"
  backend:
    image: lectern-backend:2.1
    container_name: lectern-nas-backend
    build: ../backend
    ports:
      - target: 3001
        published: 1281
    healthcheck:
      test: ["CMD", "wget", "-qO-", "http://localhost:3001/health"]
networks:
  default: {}
"#;
        let compose = parse_compose_str(input).unwrap();
        assert_eq!(compose.services.len(), 2);
        let meta = compose.metadata.unwrap();
        assert_eq!(meta.family, Some(ContainerFamily::NasLinux));

        let frontend = &compose.services["frontend"];
        assert_eq!(frontend.published_ports(), vec![1280]);
        assert!(!frontend.has_healthcheck());
        assert_eq!(
            frontend
                .build
                .as_ref()
                .unwrap()
                .dockerfile_path(Path::new("/srv/deploy")),
            PathBuf::from("/srv/deploy/../frontend/Dockerfile.prod")
        );

        let backend = &compose.services["backend"];
        assert_eq!(backend.published_ports(), vec![1281]);
        assert!(backend.has_healthcheck());
        assert_eq!(
            backend.build.as_ref().unwrap().dockerfile_path(Path::new("d")),
            PathBuf::from("d/../backend/Dockerfile")
        );
    }

    #[test]
    fn port_forms() {
        let input = r#"
services:
  web:
    ports:
      - "127.0.0.1:8080:80/tcp"
      - 9000
      - "5050"
"#;
        let compose = parse_compose_str(input).unwrap();
        assert_eq!(compose.services["web"].published_ports(), vec![8080, 9000, 5050]);
    }

    #[test]
    fn disabled_healthcheck_is_not_a_healthcheck() {
        let input = r"
services:
  api:
    healthcheck:
      disable: true
";
        let compose = parse_compose_str(input).unwrap();
        assert!(!compose.services["api"].has_healthcheck());
    }

    #[test]
    fn rejects_unknown_metadata_keys() {
        let input = r"
x-lectern:
  famly: nas
services: {}
";
        assert!(parse_compose_str(input).is_err());
    }

    #[test]
    fn empty_document_has_no_services() {
        let compose = parse_compose_str("services: {}\n").unwrap();
        assert!(compose.services.is_empty());
        assert!(compose.metadata.is_none());
    }
}
