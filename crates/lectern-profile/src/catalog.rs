use crate::types::{ContainerFamily, PlatformKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The built-in catalog of deployment profiles. Each entry is one compose
/// file inside the compose directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileKind {
    Standard,
    MacOs,
    Windows,
    Linux,
    Nas,
}

impl ProfileKind {
    /// Catalog order, as presented for manual selection.
    pub const CATALOG: [ProfileKind; 5] = [
        Self::Standard,
        Self::MacOs,
        Self::Windows,
        Self::Linux,
        Self::Nas,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Self::Standard => "docker-compose.yml",
            Self::MacOs => "docker-compose.macos.yml",
            Self::Windows => "docker-compose.windows.yml",
            Self::Linux => "docker-compose.linux.yml",
            Self::Nas => "docker-compose.nas.yml",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Standard => "Standard (docker-compose.yml)",
            Self::MacOs => "macOS (docker-compose.macos.yml)",
            Self::Windows => "Windows (docker-compose.windows.yml)",
            Self::Linux => "Linux (docker-compose.linux.yml)",
            Self::Nas => "NAS (docker-compose.nas.yml)",
        }
    }

    pub fn platform(self) -> PlatformKind {
        match self {
            Self::Standard => PlatformKind::Unknown,
            Self::MacOs => PlatformKind::MacOs,
            Self::Windows => PlatformKind::Windows,
            Self::Linux => PlatformKind::Linux,
            Self::Nas => PlatformKind::NasLinux,
        }
    }

    /// Naming family implied by the catalog entry.
    pub fn family(self) -> ContainerFamily {
        match self {
            Self::Linux | Self::Nas => ContainerFamily::NasLinux,
            Self::Standard | Self::MacOs | Self::Windows => ContainerFamily::Default,
        }
    }

    pub fn path_in(self, compose_dir: &Path) -> PathBuf {
        compose_dir.join(self.file_name())
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::CATALOG.into_iter().find(|k| k.file_name() == name)
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Standard => "standard",
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Nas => "nas",
        };
        f.write_str(s)
    }
}

/// Ordered preference list of profiles for a platform. The standard
/// profile always comes last.
pub fn candidates_for(platform: PlatformKind, nas_detected: bool) -> Vec<ProfileKind> {
    match platform {
        PlatformKind::MacOs => vec![ProfileKind::MacOs, ProfileKind::Standard],
        PlatformKind::Windows => vec![ProfileKind::Windows, ProfileKind::Standard],
        PlatformKind::Linux if nas_detected => {
            vec![ProfileKind::Nas, ProfileKind::Linux, ProfileKind::Standard]
        }
        PlatformKind::Linux => vec![ProfileKind::Linux, ProfileKind::Nas, ProfileKind::Standard],
        PlatformKind::NasLinux => {
            vec![ProfileKind::Nas, ProfileKind::Linux, ProfileKind::Standard]
        }
        PlatformKind::Unknown => vec![ProfileKind::Standard],
    }
}

/// Compose files for the optional sidecar services.
pub const TTS_COMPOSE_FILE: &str = "docker-compose.tts.yml";
pub const OCR_COMPOSE_FILE: &str = "docker-compose.ocr.yml";
