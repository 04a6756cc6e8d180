use crate::progress::Progress;
use crate::prompt::Prompter;
use crate::readiness::Sleeper;
use lectern_profile::{DataRoots, LecternConfig};
use lectern_runtime::{ContainerEngine, HostEnvironment, PortProbe};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Everything one run needs, built once and passed by reference.
///
/// The session owns no global state. Collaborators (engine, port probe,
/// prompter, progress sink, sleeper) are injected so the whole workflow
/// runs unchanged against `MockEngine` and scripted answers.
pub struct Session<'a> {
    pub root: PathBuf,
    pub config: LecternConfig,
    pub host: HostEnvironment,
    pub engine: &'a dyn ContainerEngine,
    pub ports: &'a dyn PortProbe,
    pub prompter: &'a dyn Prompter,
    pub progress: &'a dyn Progress,
    pub sleeper: &'a dyn Sleeper,
    /// `--profile` / `LECTERN_COMPOSE_FILE`.
    pub profile_override: Option<PathBuf>,
    warnings: RefCell<Vec<String>>,
}

impl<'a> Session<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        root: impl Into<PathBuf>,
        config: LecternConfig,
        host: HostEnvironment,
        engine: &'a dyn ContainerEngine,
        ports: &'a dyn PortProbe,
        prompter: &'a dyn Prompter,
        progress: &'a dyn Progress,
        sleeper: &'a dyn Sleeper,
    ) -> Self {
        Self {
            root: root.into(),
            config,
            host,
            engine,
            ports,
            prompter,
            progress,
            sleeper,
            profile_override: None,
            warnings: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_profile_override(mut self, path: Option<PathBuf>) -> Self {
        self.profile_override = path;
        self
    }

    fn resolve(&self, configured: &Path) -> PathBuf {
        LecternConfig::resolve(&self.root, configured)
    }

    pub fn compose_dir(&self) -> PathBuf {
        self.resolve(&self.config.paths.compose_dir)
    }

    pub fn env_file(&self) -> PathBuf {
        self.resolve(&self.config.paths.env_file)
    }

    pub fn export_dir(&self) -> PathBuf {
        self.resolve(&self.config.images.export_dir)
    }

    pub fn data_roots(&self) -> DataRoots {
        let external = if self.host.nas {
            &self.config.paths.nas_data_root
        } else {
            &self.config.paths.linux_data_root
        };
        DataRoots {
            local: self.resolve(&self.config.paths.local_data_dir),
            external: self.resolve(external),
        }
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.config.readiness.interval_ms)
    }

    pub fn confirm(&self, prompt: &str, default: bool) -> bool {
        self.prompter.confirm(prompt, default)
    }

    /// Print a warning and keep it for the run report.
    pub fn warn(&self, msg: impl Into<String>) {
        let msg = msg.into();
        warn!("{msg}");
        self.progress.warn(&msg);
        self.warnings.borrow_mut().push(msg);
    }

    pub fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.borrow_mut())
    }
}
