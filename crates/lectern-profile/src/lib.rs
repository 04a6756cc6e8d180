//! Declarative formats for Lectern deployments.
//!
//! This crate defines the schema layer: the built-in profile catalog
//! (`ProfileKind`), compose file parsing (`ComposeFile`), derived
//! `DeploymentProfile`s with their container naming family, exact
//! `ImageRef` matching, and the optional `lectern.toml` configuration.

pub mod catalog;
pub mod compose;
pub mod config;
pub mod image;
pub mod profile;
pub mod types;

pub use catalog::{candidates_for, ProfileKind, OCR_COMPOSE_FILE, TTS_COMPOSE_FILE};
pub use compose::{
    parse_compose_file, parse_compose_str, BuildSpec, ComposeFile, ComposeService,
    ProfileMetadata,
};
pub use config::{LecternConfig, CONFIG_FILE};
pub use image::ImageRef;
pub use profile::{DataRoots, DeploymentProfile, ServiceSpec};
pub use types::{ContainerFamily, ContainerName, PlatformKind, ServiceRole};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse compose file: {0}")]
    ParseYaml(#[from] serde_yaml::Error),
    #[error("failed to parse lectern.toml: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("invalid image reference: '{0}'")]
    InvalidImageRef(String),
}
