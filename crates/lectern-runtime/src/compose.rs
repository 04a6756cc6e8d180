use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Base command for compose tooling: either an engine plugin
/// (`docker compose`, `podman compose`) or a standalone binary
/// (`docker-compose`, `podman-compose`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeCommand {
    pub program: String,
    pub prefix: Vec<String>,
}

impl ComposeCommand {
    pub fn plugin(engine: &str) -> Self {
        Self {
            program: engine.to_owned(),
            prefix: vec!["compose".to_owned()],
        }
    }

    pub fn standalone(program: &str) -> Self {
        Self {
            program: program.to_owned(),
            prefix: Vec::new(),
        }
    }
}

impl fmt::Display for ComposeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for p in &self.prefix {
            write!(f, " {p}")?;
        }
        Ok(())
    }
}

/// The compose invocation prefix bound by profile resolution: base command
/// plus `-f <profile file>`, executed from the profile file's directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeInvocation {
    pub command: ComposeCommand,
    pub file: PathBuf,
    pub project_dir: PathBuf,
}

impl ComposeInvocation {
    pub fn new(command: ComposeCommand, file: &Path) -> Self {
        let project_dir = file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        Self {
            command,
            file: file.to_path_buf(),
            project_dir,
        }
    }

    pub fn args(&self, extra: &[&str]) -> Vec<String> {
        let mut args = self.command.prefix.clone();
        args.push("-f".to_owned());
        args.push(self.file.to_string_lossy().into_owned());
        args.extend(extra.iter().map(|s| (*s).to_owned()));
        args
    }

    pub fn to_command(&self, extra: &[&str]) -> Command {
        let mut cmd = Command::new(&self.command.program);
        cmd.args(self.args(extra)).current_dir(&self.project_dir);
        cmd
    }

    /// Shell-ready rendering, used in remediation hints.
    pub fn render(&self, extra: &[&str]) -> String {
        let mut out = self.command.program.clone();
        for a in self.args(extra) {
            out.push(' ');
            if a.contains(' ') {
                out.push('"');
                out.push_str(&a);
                out.push('"');
            } else {
                out.push_str(&a);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_args_include_file() {
        let inv = ComposeInvocation::new(
            ComposeCommand::plugin("docker"),
            Path::new("/srv/lectern/deploy/docker-compose.yml"),
        );
        assert_eq!(
            inv.args(&["up", "-d"]),
            vec![
                "compose",
                "-f",
                "/srv/lectern/deploy/docker-compose.yml",
                "up",
                "-d"
            ]
        );
        assert_eq!(inv.project_dir, PathBuf::from("/srv/lectern/deploy"));
    }

    #[test]
    fn standalone_has_no_prefix() {
        let inv = ComposeInvocation::new(
            ComposeCommand::standalone("docker-compose"),
            Path::new("docker-compose.yml"),
        );
        assert_eq!(inv.args(&["ps"]), vec!["-f", "docker-compose.yml", "ps"]);
        assert_eq!(inv.project_dir, PathBuf::from("."));
        assert_eq!(inv.render(&["ps"]), "docker-compose -f docker-compose.yml ps");
    }

    #[test]
    fn render_quotes_spaces() {
        let inv = ComposeInvocation::new(
            ComposeCommand::plugin("docker"),
            Path::new("/home/me/my books/deploy/docker-compose.yml"),
        );
        assert_eq!(
            inv.render(&["down"]),
            "docker compose -f \"/home/me/my books/deploy/docker-compose.yml\" down"
        );
    }

    #[test]
    fn command_display() {
        assert_eq!(ComposeCommand::plugin("podman").to_string(), "podman compose");
        assert_eq!(
            ComposeCommand::standalone("docker-compose").to_string(),
            "docker-compose"
        );
    }
}
