//! Container engine access and host probing for Lectern.
//!
//! This crate implements the execution layer: the `ContainerEngine` trait
//! that abstracts the engine's command contract (build, up, down, ps,
//! inspect, images, rmi, save/load, pull, exec), a subprocess driver for
//! docker and podman, an in-memory `MockEngine`, platform and NAS
//! detection, prerequisite checks, port probing, and registry-mirror
//! sanity checks.

pub mod compose;
pub mod docker;
pub mod engine;
pub mod host;
pub mod mirror;
pub mod mock;
pub mod ports;
pub mod prereq;

pub use compose::{ComposeCommand, ComposeInvocation};
pub use engine::{
    select_engine, ContainerEngine, ContainerInspect, ContainerRecord, ContainerState,
    ExecOutput, HealthStatus, ImageRecord,
};
pub use host::{classify, detect, is_nas, HostEnvironment, HostProbe, Virtualization};
pub use mirror::{check_mirrors, MirrorIssue};
pub use mock::{MockEngine, MockService};
pub use ports::{PortProbe, StaticPortProbe, SystemPortProbe};
pub use prereq::{check_engine_prereqs, format_missing, MissingPrereq};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("container engine '{0}' is not available on this system")]
    EngineUnavailable(String),
    #[error("no compose tooling found for '{0}'")]
    ComposeUnavailable(String),
    #[error("failed to run '{command}': {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("'{command}' exited with code {}: {stderr}", .code.map_or_else(|| "?".to_owned(), |c| c.to_string()))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
    #[error("failed to parse engine output: {0}")]
    Parse(String),
}

impl RuntimeError {
    pub(crate) fn failed(command: impl Into<String>, output: &std::process::Output) -> Self {
        Self::CommandFailed {
            command: command.into(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        }
    }
}
