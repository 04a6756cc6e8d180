pub mod delete;
pub mod docs;
pub mod doctor;
pub mod export;
pub mod import;
pub mod install;
pub mod menu;
pub mod provision;
pub mod sidecar;
pub mod status;

use console::Style;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use lectern_core::{
    AssumeDefaults, CoreError, DeployLock, Progress, Prompter, Session, SilentProgress,
    ThreadSleeper,
};
use lectern_profile::{LecternConfig, ServiceRole};
use lectern_runtime::{
    select_engine, ContainerEngine, HostEnvironment, MockEngine, PortProbe, SystemPortProbe,
};
use std::io::{stderr, stdin, IsTerminal};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn plain_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
    pb.set_style(style);
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    match state {
        "running" => Style::new().green().bold().apply_to(state).to_string(),
        "stopped" => Style::new().yellow().apply_to(state).to_string(),
        "absent" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Render a core error for the terminal, remediation hint included.
pub fn core_error(e: &CoreError) -> String {
    match e.hint() {
        Some(hint) => format!("{e}\n  hint: {hint}"),
        None => e.to_string(),
    }
}

/// Declined prompts end the operation without failing the process.
pub fn finish(result: Result<u8, CoreError>) -> Result<u8, String> {
    match result {
        Ok(code) => Ok(code),
        Err(e) if e.is_declined() => {
            eprintln!("{}", Style::new().yellow().apply_to(format!("! {e}")));
            Ok(EXIT_SUCCESS)
        }
        Err(e) => Err(core_error(&e)),
    }
}

pub fn parse_roles(roles: &[ServiceRole], default: &[ServiceRole]) -> Vec<ServiceRole> {
    if roles.is_empty() {
        default.to_vec()
    } else {
        roles.to_vec()
    }
}

/// Operator-facing progress lines on stdout.
pub struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn step(&self, number: usize, total: usize, title: &str) {
        println!(
            "{} {}",
            Style::new().cyan().bold().apply_to(format!("[{number}/{total}]")),
            Style::new().bold().apply_to(title)
        );
    }

    fn info(&self, msg: &str) {
        println!("    {msg}");
    }

    fn success(&self, msg: &str) {
        println!("  {} {msg}", Style::new().green().apply_to("✓"));
    }

    fn warn(&self, msg: &str) {
        println!("  {} {msg}", Style::new().yellow().bold().apply_to("!"));
    }
}

/// Terminal prompts. A failed prompt (closed terminal) takes the default.
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .unwrap_or(default)
    }

    fn select(&self, prompt: &str, items: &[String], default: usize) -> usize {
        Select::new()
            .with_prompt(prompt)
            .items(items)
            .default(default)
            .interact()
            .unwrap_or(default)
    }

    fn input(&self, prompt: &str, default: &str) -> String {
        Input::<String>::new()
            .with_prompt(prompt)
            .default(default.to_owned())
            .interact_text()
            .unwrap_or_else(|_| default.to_owned())
    }
}

pub fn is_tty() -> bool {
    stdin().is_terminal() && stderr().is_terminal()
}

/// The container engine plus the matching port probe. The in-memory engine
/// answers port queries itself.
pub enum EngineHandle {
    Real {
        engine: Box<dyn ContainerEngine>,
        ports: SystemPortProbe,
    },
    Mock(MockEngine),
}

impl EngineHandle {
    /// `LECTERN_ENGINE` when set, else docker, else podman.
    pub fn from_env() -> Result<Self, String> {
        let requested = std::env::var("LECTERN_ENGINE").ok();
        let name = match requested.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_ascii_lowercase(),
            _ => {
                let docker = select_engine("docker").map_err(|e| e.to_string())?;
                if docker.available() {
                    return Ok(Self::Real {
                        engine: docker,
                        ports: SystemPortProbe::detect(),
                    });
                }
                "podman".to_owned()
            }
        };
        if name == "mock" {
            return Ok(Self::Mock(MockEngine::new()));
        }
        let engine = select_engine(&name).map_err(|e| e.to_string())?;
        Ok(Self::Real {
            engine,
            ports: SystemPortProbe::detect(),
        })
    }

    pub fn engine(&self) -> &dyn ContainerEngine {
        match self {
            Self::Real { engine, .. } => engine.as_ref(),
            Self::Mock(mock) => mock,
        }
    }

    pub fn ports(&self) -> &dyn PortProbe {
        match self {
            Self::Real { ports, .. } => ports,
            Self::Mock(mock) => mock,
        }
    }
}

/// Process-wide options shared by every command.
#[derive(Debug, Clone)]
pub struct GlobalOpts {
    pub root: PathBuf,
    pub profile: Option<PathBuf>,
    pub yes: bool,
    pub json: bool,
}

/// Everything a command needs to build a `Session`.
pub struct Context {
    pub root: PathBuf,
    pub config: LecternConfig,
    pub host: HostEnvironment,
    pub json: bool,
    pub interactive: bool,
    handle: EngineHandle,
    prompter: Box<dyn Prompter>,
    progress: Box<dyn Progress>,
    profile_override: Option<PathBuf>,
}

impl Context {
    pub fn new(opts: &GlobalOpts) -> Result<Self, String> {
        let root = std::fs::canonicalize(&opts.root)
            .map_err(|e| format!("cannot use root {}: {e}", opts.root.display()))?;
        let config = LecternConfig::load(&root).map_err(|e| format!("config error: {e}"))?;
        let handle = EngineHandle::from_env()?;
        debug!(
            "root {} with engine {}",
            root.display(),
            handle.engine().name()
        );
        let interactive = !opts.yes && is_tty();
        let prompter: Box<dyn Prompter> = if interactive {
            Box::new(DialoguerPrompter)
        } else {
            Box::new(AssumeDefaults)
        };
        let progress: Box<dyn Progress> = if opts.json {
            Box::new(SilentProgress)
        } else {
            Box::new(ConsoleProgress)
        };
        let profile_override = opts.profile.clone().or_else(|| {
            std::env::var_os("LECTERN_COMPOSE_FILE")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        });
        Ok(Self {
            root,
            config,
            host: HostEnvironment::detect(),
            json: opts.json,
            interactive,
            handle,
            prompter,
            progress,
            profile_override,
        })
    }

    pub fn engine(&self) -> &dyn ContainerEngine {
        self.handle.engine()
    }

    pub fn session(&self) -> Session<'_> {
        Session::new(
            self.root.clone(),
            self.config.clone(),
            self.host.clone(),
            self.handle.engine(),
            self.handle.ports(),
            self.prompter.as_ref(),
            self.progress.as_ref(),
            &ThreadSleeper,
        )
        .with_profile_override(self.profile_override.clone())
    }

    pub fn lock(&self) -> Result<DeployLock, String> {
        DeployLock::for_root(&self.root).map_err(|e| core_error(&e))
    }

    pub fn confirm(&self, prompt: &str, default: bool) -> bool {
        self.prompter.confirm(prompt, default)
    }

    pub fn select(&self, prompt: &str, items: &[String], default: usize) -> usize {
        self.prompter.select(prompt, items, default)
    }

    pub fn spinner(&self, msg: &str) -> Option<ProgressBar> {
        if self.json {
            None
        } else {
            Some(spinner(msg))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_map() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_state_keeps_text() {
        for state in ["running", "stopped", "absent"] {
            assert!(colorize_state(state).contains(state));
        }
        assert_eq!(colorize_state("unknown"), "unknown");
    }

    #[test]
    fn declined_is_not_a_failure() {
        let result = finish(Err(CoreError::Declined("port 1280 in use".to_owned())));
        assert_eq!(result, Ok(EXIT_SUCCESS));
    }

    #[test]
    fn fatal_error_message_carries_hint() {
        let err = CoreError::Locked(PathBuf::from("/srv/lectern/.lectern.lock"));
        let msg = finish(Err(err)).unwrap_err();
        assert!(msg.contains("hint: wait for the other lectern process"));
    }

    #[test]
    fn empty_role_list_means_default() {
        assert_eq!(
            parse_roles(&[], &ServiceRole::CORE),
            ServiceRole::CORE.to_vec()
        );
        assert_eq!(
            parse_roles(&[ServiceRole::Tts], &ServiceRole::CORE),
            vec![ServiceRole::Tts]
        );
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
