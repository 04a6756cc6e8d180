//! Core enumerations and identifier newtypes shared by every Lectern crate.
//!
//! Newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Exact runtime name of a container, as the engine reports it.
    ContainerName
);

/// Host operating environment, derived once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlatformKind {
    MacOs,
    Windows,
    Linux,
    /// Linux on a NAS appliance. Never produced by detection (NAS devices
    /// report plain Linux); bound to the NAS profile.
    NasLinux,
    Unknown,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MacOs => "macOS",
            Self::Windows => "Windows",
            Self::Linux => "Linux",
            Self::NasLinux => "NAS (Linux)",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Managed service roles. One image and one container exist per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    Frontend,
    Backend,
    Tts,
    Ocr,
}

impl ServiceRole {
    pub const ALL: [ServiceRole; 4] = [Self::Frontend, Self::Backend, Self::Tts, Self::Ocr];

    /// Roles every deployment profile must provide.
    pub const CORE: [ServiceRole; 2] = [Self::Frontend, Self::Backend];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Tts => "tts",
            Self::Ocr => "ocr",
        }
    }

    /// Map a compose service key to its role.
    pub fn from_service_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        let key = key.strip_prefix("lectern-").unwrap_or(&key);
        match key {
            "frontend" | "web" | "ui" => Some(Self::Frontend),
            "backend" | "api" | "server" => Some(Self::Backend),
            "tts" | "tts-api" => Some(Self::Tts),
            "ocr" | "ocr-api" => Some(Self::Ocr),
            _ => None,
        }
    }

    pub fn is_sidecar(self) -> bool {
        matches!(self, Self::Tts | Self::Ocr)
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServiceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_service_key(s).ok_or_else(|| {
            format!("unknown service role '{s}' (expected: frontend, backend, tts, ocr)")
        })
    }
}

/// Container naming scheme. Selected by the resolved profile; an external
/// contract with the compose files, not something the orchestrator chooses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerFamily {
    #[default]
    Default,
    #[serde(alias = "nas", alias = "linux")]
    NasLinux,
}

impl ContainerFamily {
    pub const ALL: [ContainerFamily; 2] = [Self::Default, Self::NasLinux];

    pub fn container_name(self, role: ServiceRole) -> ContainerName {
        if role.is_sidecar() {
            return ContainerName::new(format!("lectern-{role}"));
        }
        match self {
            Self::Default => ContainerName::new(format!("lectern-{role}")),
            Self::NasLinux => ContainerName::new(format!("lectern-nas-{role}")),
        }
    }

    /// Fallback inference from a profile file name, used only when the
    /// profile does not declare its family.
    pub fn infer_from_file_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.contains("nas") || lower.contains("linux") {
            Self::NasLinux
        } else {
            Self::Default
        }
    }
}

impl fmt::Display for ContainerFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::NasLinux => f.write_str("nas-linux"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_family_names() {
        let f = ContainerFamily::Default;
        assert_eq!(f.container_name(ServiceRole::Frontend), "lectern-frontend");
        assert_eq!(f.container_name(ServiceRole::Backend), "lectern-backend");
    }

    #[test]
    fn nas_family_names() {
        let f = ContainerFamily::NasLinux;
        assert_eq!(f.container_name(ServiceRole::Frontend), "lectern-nas-frontend");
        assert_eq!(f.container_name(ServiceRole::Backend), "lectern-nas-backend");
    }

    #[test]
    fn sidecar_names_ignore_family() {
        for family in ContainerFamily::ALL {
            assert_eq!(family.container_name(ServiceRole::Tts), "lectern-tts");
            assert_eq!(family.container_name(ServiceRole::Ocr), "lectern-ocr");
        }
    }

    #[test]
    fn family_inferred_from_file_name() {
        assert_eq!(
            ContainerFamily::infer_from_file_name("docker-compose.nas.yml"),
            ContainerFamily::NasLinux
        );
        assert_eq!(
            ContainerFamily::infer_from_file_name("docker-compose.linux.yml"),
            ContainerFamily::NasLinux
        );
        assert_eq!(
            ContainerFamily::infer_from_file_name("docker-compose.macos.yml"),
            ContainerFamily::Default
        );
    }

    #[test]
    fn service_keys_map_to_roles() {
        assert_eq!(ServiceRole::from_service_key("web"), Some(ServiceRole::Frontend));
        assert_eq!(ServiceRole::from_service_key("lectern-backend"), Some(ServiceRole::Backend));
        assert_eq!(ServiceRole::from_service_key("tts-api"), Some(ServiceRole::Tts));
        assert_eq!(ServiceRole::from_service_key("redis"), None);
    }

    #[test]
    fn container_name_compares_with_str() {
        let name = ContainerName::new("lectern-backend");
        assert_eq!(name, "lectern-backend");
        assert_eq!(name.as_str(), "lectern-backend");
    }
}
