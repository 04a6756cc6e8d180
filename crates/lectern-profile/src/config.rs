use crate::ProfileError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "lectern.toml";

/// Installer configuration, read from `<root>/lectern.toml` when present.
/// Every section is optional and defaults to the well-known values.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LecternConfig {
    #[serde(default)]
    pub ports: PortsSection,
    #[serde(default)]
    pub readiness: ReadinessSection,
    #[serde(default)]
    pub images: ImagesSection,
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub provision: ProvisionSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PortsSection {
    #[serde(default = "default_web_port")]
    pub web: u16,
    #[serde(default = "default_api_port")]
    pub api: u16,
    #[serde(default = "default_tts_port")]
    pub tts: u16,
    #[serde(default = "default_ocr_port")]
    pub ocr: u16,
}

impl Default for PortsSection {
    fn default() -> Self {
        Self {
            web: default_web_port(),
            api: default_api_port(),
            tts: default_tts_port(),
            ocr: default_ocr_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReadinessSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for ReadinessSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ImagesSection {
    /// Shared base images pulled before a build. Best-effort.
    #[serde(default = "default_prefetch")]
    pub prefetch: Vec<String>,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    /// Request a parallel build when the compose tooling supports it.
    #[serde(default = "default_true")]
    pub parallel_build: bool,
}

impl Default for ImagesSection {
    fn default() -> Self {
        Self {
            prefetch: default_prefetch(),
            export_dir: default_export_dir(),
            parallel_build: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PathsSection {
    #[serde(default = "default_compose_dir")]
    pub compose_dir: PathBuf,
    #[serde(default = "default_env_file")]
    pub env_file: PathBuf,
    #[serde(default = "default_local_data_dir")]
    pub local_data_dir: PathBuf,
    /// External data root on NAS hosts.
    #[serde(default = "default_nas_data_root")]
    pub nas_data_root: PathBuf,
    /// External data root on plain Linux hosts using the NAS/Linux family.
    #[serde(default = "default_linux_data_root")]
    pub linux_data_root: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            compose_dir: default_compose_dir(),
            env_file: default_env_file(),
            local_data_dir: default_local_data_dir(),
            nas_data_root: default_nas_data_root(),
            linux_data_root: default_linux_data_root(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProvisionSection {
    #[serde(default = "default_dependency_name")]
    pub dependency_name: String,
    /// Exits 0 inside the backend container when the dependency is present.
    #[serde(default = "default_dependency_probe")]
    pub dependency_probe: Vec<String>,
    /// Run as root inside the backend container.
    #[serde(default = "default_dependency_install")]
    pub dependency_install: Vec<String>,
    #[serde(default = "default_admin_command")]
    pub admin_command: Vec<String>,
}

impl Default for ProvisionSection {
    fn default() -> Self {
        Self {
            dependency_name: default_dependency_name(),
            dependency_probe: default_dependency_probe(),
            dependency_install: default_dependency_install(),
            admin_command: default_admin_command(),
        }
    }
}

fn default_web_port() -> u16 {
    1280
}
fn default_api_port() -> u16 {
    1281
}
fn default_tts_port() -> u16 {
    5050
}
fn default_ocr_port() -> u16 {
    5060
}
fn default_max_attempts() -> u32 {
    30
}
fn default_interval_ms() -> u64 {
    2000
}
fn default_true() -> bool {
    true
}
fn default_prefetch() -> Vec<String> {
    vec!["node:20-alpine".to_owned(), "nginx:alpine".to_owned()]
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("docker-images")
}
fn default_compose_dir() -> PathBuf {
    PathBuf::from("deploy")
}
fn default_env_file() -> PathBuf {
    PathBuf::from(".env")
}
fn default_local_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_nas_data_root() -> PathBuf {
    PathBuf::from("/volume1/docker/lectern")
}
fn default_linux_data_root() -> PathBuf {
    PathBuf::from("/opt/lectern/data")
}
fn default_dependency_name() -> String {
    "calibre".to_owned()
}
fn default_dependency_probe() -> Vec<String> {
    vec![
        "sh".to_owned(),
        "-c".to_owned(),
        "command -v ebook-convert".to_owned(),
    ]
}
fn default_dependency_install() -> Vec<String> {
    vec![
        "sh".to_owned(),
        "-c".to_owned(),
        "if command -v apk >/dev/null 2>&1; then apk add --no-cache calibre; \
         else apt-get update && apt-get install -y --no-install-recommends calibre; fi"
            .to_owned(),
    ]
}
fn default_admin_command() -> Vec<String> {
    vec!["node".to_owned(), "scripts/init-admin.js".to_owned()]
}

impl LecternConfig {
    pub fn parse(input: &str) -> Result<Self, ProfileError> {
        Ok(toml::from_str(input)?)
    }

    /// Load `<root>/lectern.toml`, or defaults when the file is absent.
    pub fn load(root: &Path) -> Result<Self, ProfileError> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path).map_err(|source| ProfileError::Read {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Resolve a configured path against the installation root.
    pub fn resolve(root: &Path, configured: &Path) -> PathBuf {
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            root.join(configured)
        }
    }

    pub fn core_ports(&self) -> [u16; 2] {
        [self.ports.web, self.ports.api]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = LecternConfig::parse("").unwrap();
        assert_eq!(cfg, LecternConfig::default());
        assert_eq!(cfg.core_ports(), [1280, 1281]);
        assert_eq!(cfg.readiness.max_attempts, 30);
        assert_eq!(cfg.readiness.interval_ms, 2000);
        assert!(cfg.images.parallel_build);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = LecternConfig::parse(
            r#"
[ports]
web = 8080

[readiness]
interval_ms = 10

[provision]
admin_command = ["npm", "run", "init-admin"]
"#,
        )
        .unwrap();
        assert_eq!(cfg.ports.web, 8080);
        assert_eq!(cfg.ports.api, 1281);
        assert_eq!(cfg.readiness.max_attempts, 30);
        assert_eq!(cfg.readiness.interval_ms, 10);
        assert_eq!(cfg.provision.admin_command, vec!["npm", "run", "init-admin"]);
        assert_eq!(cfg.provision.dependency_name, "calibre");
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(LecternConfig::parse("[ports]\nwebb = 1\n").is_err());
        assert!(LecternConfig::parse("[unknown]\n").is_err());
    }

    #[test]
    fn load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = LecternConfig::load(dir.path()).unwrap();
        assert_eq!(cfg, LecternConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "[images]\nprefetch = []\n").unwrap();
        let cfg = LecternConfig::load(dir.path()).unwrap();
        assert!(cfg.images.prefetch.is_empty());
    }

    #[test]
    fn resolve_relative_and_absolute() {
        let root = Path::new("/srv/lectern");
        assert_eq!(
            LecternConfig::resolve(root, Path::new("deploy")),
            PathBuf::from("/srv/lectern/deploy")
        );
        assert_eq!(
            LecternConfig::resolve(root, Path::new("/data")),
            PathBuf::from("/data")
        );
    }
}
