use crate::compose::{ComposeCommand, ComposeInvocation};
use crate::engine::{
    ContainerEngine, ContainerInspect, ContainerRecord, ContainerState, ExecOutput, HealthStatus,
    ImageRecord,
};
use crate::RuntimeError;
use serde::Deserialize;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Subprocess driver for docker-compatible CLIs (`docker`, `podman`).
pub struct DockerEngine {
    program: String,
}

impl Default for DockerEngine {
    fn default() -> Self {
        Self::docker()
    }
}

impl DockerEngine {
    pub fn docker() -> Self {
        Self::with_program("docker")
    }

    pub fn podman() -> Self {
        Self::with_program("podman")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command_line(&self, args: &[&str]) -> String {
        let mut line = self.program.clone();
        for a in args {
            line.push(' ');
            line.push_str(a);
        }
        line
    }

    fn output(&self, args: &[&str]) -> Result<Output, RuntimeError> {
        debug!("exec: {}", self.command_line(args));
        Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RuntimeError::Spawn {
                command: self.command_line(args),
                source,
            })
    }

    /// Run and require a zero exit; returns stdout.
    fn checked(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(RuntimeError::failed(self.command_line(args), &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run with inherited stdio so build and pull progress reach the operator.
    fn streamed(mut cmd: Command, line: String) -> Result<(), RuntimeError> {
        debug!("exec: {line}");
        let status = cmd.status().map_err(|source| RuntimeError::Spawn {
            command: line.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(RuntimeError::CommandFailed {
                command: line,
                code: status.code(),
                stderr: String::new(),
            })
        }
    }

    fn compose_output(
        compose: &ComposeInvocation,
        extra: &[&str],
    ) -> Result<Output, RuntimeError> {
        debug!("exec: {}", compose.render(extra));
        compose
            .to_command(extra)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RuntimeError::Spawn {
                command: compose.render(extra),
                source,
            })
    }

    fn probe(program: &str, args: &[&str]) -> bool {
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }
}

impl ContainerEngine for DockerEngine {
    fn name(&self) -> &str {
        &self.program
    }

    fn available(&self) -> bool {
        Self::probe(&self.program, &["--version"])
    }

    fn compose_command(&self) -> Option<ComposeCommand> {
        if Self::probe(&self.program, &["compose", "version"]) {
            return Some(ComposeCommand::plugin(&self.program));
        }
        let standalone = format!("{}-compose", self.program);
        if Self::probe(&standalone, &["version"]) {
            return Some(ComposeCommand::standalone(&standalone));
        }
        None
    }

    fn ping(&self) -> Result<(), RuntimeError> {
        self.checked(&["info", "--format", "{{json .ServerVersion}}"])
            .map(|_| ())
    }

    fn registry_mirrors(&self) -> Result<Vec<String>, RuntimeError> {
        let out = self.checked(&["info", "--format", "{{json .RegistryConfig.Mirrors}}"])?;
        parse_mirrors(&out)
    }

    fn images(&self) -> Result<Vec<ImageRecord>, RuntimeError> {
        let out = self.checked(&["images", "--format", "{{json .}}"])?;
        parse_image_lines(&out)
    }

    fn containers(&self) -> Result<Vec<ContainerRecord>, RuntimeError> {
        let out = self.checked(&["ps", "-a", "--format", "{{json .}}"])?;
        parse_container_lines(&out)
    }

    fn inspect(&self, name: &str) -> Result<Option<ContainerInspect>, RuntimeError> {
        let args = [
            "inspect",
            "--type",
            "container",
            "--format",
            "{{json .State}}",
            name,
        ];
        let output = self.output(&args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if stderr.contains("no such") || stderr.contains("not found") {
                return Ok(None);
            }
            return Err(RuntimeError::failed(self.command_line(&args), &output));
        }
        parse_state_json(&String::from_utf8_lossy(&output.stdout)).map(Some)
    }

    fn stop(&self, name: &str) -> Result<(), RuntimeError> {
        self.checked(&["stop", name]).map(|_| ())
    }

    fn remove_container(&self, name: &str, force: bool) -> Result<(), RuntimeError> {
        if force {
            self.checked(&["rm", "-f", name])
        } else {
            self.checked(&["rm", name])
        }
        .map(|_| ())
    }

    fn remove_image(&self, reference: &str, force: bool) -> Result<(), RuntimeError> {
        if force {
            self.checked(&["rmi", "-f", reference])
        } else {
            self.checked(&["rmi", reference])
        }
        .map(|_| ())
    }

    fn pull(&self, reference: &str) -> Result<(), RuntimeError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["pull", reference]).stdin(Stdio::null());
        Self::streamed(cmd, self.command_line(&["pull", reference]))
    }

    fn save(&self, reference: &str, dest: &Path) -> Result<(), RuntimeError> {
        let line = self.command_line(&["save", reference]);
        debug!("exec: {line} (gzip -> {})", dest.display());
        let archive = File::create(dest)?;

        let mut save = Command::new(&self.program)
            .args(["save", reference])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RuntimeError::Spawn {
                command: line.clone(),
                source,
            })?;
        let Some(stdout) = save.stdout.take() else {
            let _ = save.kill();
            let _ = save.wait();
            return Err(RuntimeError::Parse("save produced no output stream".to_owned()));
        };

        let written = write_gzip(stdout, archive);
        let out = save.wait_with_output()?;
        if !out.status.success() {
            return Err(RuntimeError::failed(line, &out));
        }
        let bytes = written?;
        debug!("{reference}: {bytes} bytes compressed into {}", dest.display());
        Ok(())
    }

    fn load(&self, archive: &Path) -> Result<(), RuntimeError> {
        let path = archive.to_string_lossy();
        self.checked(&["load", "-i", &path]).map(|_| ())
    }

    fn exec(
        &self,
        container: &str,
        user: Option<&str>,
        command: &[String],
    ) -> Result<ExecOutput, RuntimeError> {
        let mut args: Vec<&str> = vec!["exec"];
        if let Some(user) = user {
            args.push("-u");
            args.push(user);
        }
        args.push(container);
        args.extend(command.iter().map(String::as_str));
        let output = self.output(&args)?;
        Ok(ExecOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn compose_supports_parallel(&self, compose: &ComposeInvocation) -> bool {
        Self::compose_output(compose, &["build", "--help"])
            .map(|o| {
                o.status.success() && String::from_utf8_lossy(&o.stdout).contains("--parallel")
            })
            .unwrap_or(false)
    }

    fn compose_build(
        &self,
        compose: &ComposeInvocation,
        parallel: bool,
    ) -> Result<(), RuntimeError> {
        let extra: &[&str] = if parallel {
            &["build", "--parallel"]
        } else {
            &["build"]
        };
        let mut cmd = compose.to_command(extra);
        cmd.stdin(Stdio::null());
        Self::streamed(cmd, compose.render(extra))
    }

    fn compose_up(&self, compose: &ComposeInvocation, build: bool) -> Result<(), RuntimeError> {
        let extra: &[&str] = if build {
            &["up", "-d", "--build"]
        } else {
            &["up", "-d"]
        };
        let mut cmd = compose.to_command(extra);
        cmd.stdin(Stdio::null());
        Self::streamed(cmd, compose.render(extra))
    }

    fn compose_down(
        &self,
        compose: &ComposeInvocation,
        remove_orphans: bool,
    ) -> Result<(), RuntimeError> {
        let extra: &[&str] = if remove_orphans {
            &["down", "--remove-orphans"]
        } else {
            &["down"]
        };
        let output = Self::compose_output(compose, extra)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(RuntimeError::failed(compose.render(extra), &output))
        }
    }

    fn compose_ps(&self, compose: &ComposeInvocation) -> Result<Vec<String>, RuntimeError> {
        let extra = ["ps", "-a", "-q"];
        let output = Self::compose_output(compose, &extra)?;
        if !output.status.success() {
            return Err(RuntimeError::failed(compose.render(&extra), &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_owned)
            .collect())
    }
}

#[derive(Deserialize)]
struct RawImage {
    #[serde(rename = "Repository", alias = "repository")]
    repository: String,
    #[serde(rename = "Tag", alias = "tag", default)]
    tag: String,
    #[serde(rename = "ID", alias = "Id", alias = "id", default)]
    id: String,
    #[serde(rename = "Size", alias = "size", default)]
    size: serde_json::Value,
}

/// Parse `images --format '{{json .}}'` output, one JSON object per line.
/// Dangling `<none>` entries are dropped.
/// Podman prefixes locally built images with `localhost/`; the compose file
/// names them without it.
fn strip_local_registry(reference: &str) -> &str {
    reference.strip_prefix("localhost/").unwrap_or(reference)
}

pub fn parse_image_lines(output: &str) -> Result<Vec<ImageRecord>, RuntimeError> {
    let mut images = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let raw: RawImage = serde_json::from_str(line)
            .map_err(|e| RuntimeError::Parse(format!("image line '{line}': {e}")))?;
        if raw.repository == "<none>" || raw.tag == "<none>" {
            continue;
        }
        let size = match raw.size {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        images.push(ImageRecord {
            repository: strip_local_registry(&raw.repository).to_owned(),
            tag: if raw.tag.is_empty() {
                "latest".to_owned()
            } else {
                raw.tag
            },
            id: raw.id,
            size,
        });
    }
    Ok(images)
}

#[derive(Deserialize)]
struct RawContainer {
    #[serde(rename = "Names", alias = "Name", default)]
    names: serde_json::Value,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Ports", default)]
    ports: serde_json::Value,
}

fn first_name(names: &serde_json::Value) -> Option<String> {
    match names {
        serde_json::Value::String(s) => s.split(',').next().map(|n| n.trim().to_owned()),
        serde_json::Value::Array(items) => items
            .first()
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

/// Parse `ps -a --format '{{json .}}'` output. Docker reports `Names` as a
/// comma-separated string, podman as an array.
pub fn parse_container_lines(output: &str) -> Result<Vec<ContainerRecord>, RuntimeError> {
    let mut containers = Vec::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let raw: RawContainer = serde_json::from_str(line)
            .map_err(|e| RuntimeError::Parse(format!("container line '{line}': {e}")))?;
        let Some(name) = first_name(&raw.names).filter(|n| !n.is_empty()) else {
            continue;
        };
        let ports = match raw.ports {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        containers.push(ContainerRecord {
            name: name.trim_start_matches('/').to_owned(),
            image: strip_local_registry(&raw.image).to_owned(),
            state: ContainerState::from_engine(&raw.state),
            status: raw.status,
            ports,
        });
    }
    Ok(containers)
}

#[derive(Deserialize)]
struct RawState {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Running", default)]
    running: bool,
    #[serde(rename = "Health", alias = "Healthcheck", default)]
    health: Option<RawHealth>,
}

#[derive(Deserialize)]
struct RawHealth {
    #[serde(rename = "Status", default)]
    status: String,
}

/// Parse `inspect --format '{{json .State}}'` output.
pub fn parse_state_json(output: &str) -> Result<ContainerInspect, RuntimeError> {
    let raw: RawState = serde_json::from_str(output.trim())
        .map_err(|e| RuntimeError::Parse(format!("container state: {e}")))?;
    let state = if raw.running {
        ContainerState::Running
    } else {
        match ContainerState::from_engine(&raw.status) {
            ContainerState::Absent => ContainerState::Stopped,
            other => other,
        }
    };
    Ok(ContainerInspect {
        state,
        health: raw
            .health
            .and_then(|h| HealthStatus::from_engine(&h.status)),
    })
}

/// Parse `info --format '{{json .RegistryConfig.Mirrors}}'` output.
pub fn parse_mirrors(output: &str) -> Result<Vec<String>, RuntimeError> {
    let trimmed = output.trim();
    if trimmed.is_empty() || trimmed == "null" || trimmed == "<no value>" {
        return Ok(Vec::new());
    }
    let mirrors: Option<Vec<String>> = serde_json::from_str(trimmed)
        .map_err(|e| RuntimeError::Parse(format!("registry mirrors: {e}")))?;
    Ok(mirrors.unwrap_or_default())
}

/// Gzip everything `src` yields into `dest`. Returns the uncompressed size.
pub fn write_gzip(mut src: impl Read, dest: File) -> std::io::Result<u64> {
    let mut encoder = GzEncoder::new(BufWriter::new(dest), Compression::default());
    let copied = std::io::copy(&mut src, &mut encoder)?;
    let mut out = encoder.finish()?;
    out.flush()?;
    out.get_ref().sync_all()?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_image_lines() {
        let out = r#"{"Containers":"N/A","ID":"sha256:aa","Repository":"lectern-backend","Size":"812MB","Tag":"latest"}
{"ID":"sha256:bb","Repository":"lectern-frontend","Size":"48MB","Tag":"1.2"}
{"ID":"sha256:cc","Repository":"<none>","Size":"10MB","Tag":"<none>"}
"#;
        let images = parse_image_lines(out).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].reference(), "lectern-backend:latest");
        assert_eq!(images[0].size, "812MB");
        assert_eq!(images[1].tag, "1.2");
    }

    #[test]
    fn parses_podman_image_line_with_numeric_size() {
        let out = r#"{"Id":"abc","Repository":"localhost/lectern-ocr","Tag":"latest","Size":123456}"#;
        let images = parse_image_lines(out).unwrap();
        assert_eq!(images[0].repository, "lectern-ocr");
        assert_eq!(images[0].size, "123456");
        assert_eq!(images[0].id, "abc");
    }

    #[test]
    fn podman_local_images_match_compose_refs() {
        let out = r#"{"Id":"abc","Repository":"localhost/lectern-backend","Tag":"2.0","Size":1}
{"Id":"def","Repository":"quay.io/localhost/tool","Tag":"latest","Size":1}"#;
        let images = parse_image_lines(out).unwrap();
        let wanted = lectern_profile::ImageRef::parse("lectern-backend:2.0").unwrap();
        assert!(images[0].matches(&wanted));
        assert_eq!(images[1].repository, "quay.io/localhost/tool");

        let ps = r#"{"Names":["lectern-backend"],"Image":"localhost/lectern-backend:2.0","State":"running","Status":"Up","Ports":null}"#;
        let containers = parse_container_lines(ps).unwrap();
        assert_eq!(containers[0].image, "lectern-backend:2.0");
    }

    #[test]
    fn image_parse_error_is_reported() {
        assert!(matches!(
            parse_image_lines("not json"),
            Err(RuntimeError::Parse(_))
        ));
    }

    #[test]
    fn parses_container_lines() {
        let out = r#"{"Names":"lectern-backend","Image":"lectern-backend:latest","State":"running","Status":"Up 3 minutes (healthy)","Ports":"0.0.0.0:1281->1281/tcp"}
{"Names":["lectern-tts"],"Image":"lectern-tts:latest","State":"exited","Status":"Exited (0)","Ports":[]}
"#;
        let containers = parse_container_lines(out).unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0].name, "lectern-backend");
        assert_eq!(containers[0].state, ContainerState::Running);
        assert!(containers[0].ports.contains("1281"));
        assert_eq!(containers[1].name, "lectern-tts");
        assert_eq!(containers[1].state, ContainerState::Stopped);
    }

    #[test]
    fn parses_state_with_health() {
        let out = r#"{"Status":"running","Running":true,"Pid":42,"Health":{"Status":"starting","FailingStreak":0}}"#;
        let inspect = parse_state_json(out).unwrap();
        assert_eq!(inspect.state, ContainerState::Running);
        assert_eq!(inspect.health, Some(HealthStatus::Starting));
    }

    #[test]
    fn parses_state_without_health() {
        let out = r#"{"Status":"exited","Running":false,"ExitCode":1}"#;
        let inspect = parse_state_json(out).unwrap();
        assert_eq!(inspect.state, ContainerState::Stopped);
        assert_eq!(inspect.health, None);
    }

    #[test]
    fn parses_mirrors() {
        assert!(parse_mirrors("null\n").unwrap().is_empty());
        assert!(parse_mirrors("").unwrap().is_empty());
        assert_eq!(
            parse_mirrors(r#"["https://mirror.example.com/"]"#).unwrap(),
            vec!["https://mirror.example.com/"]
        );
        assert!(parse_mirrors("{").is_err());
    }

    #[test]
    fn engine_names() {
        assert_eq!(DockerEngine::docker().name(), "docker");
        assert_eq!(DockerEngine::podman().name(), "podman");
    }

    #[test]
    fn missing_program_is_unavailable() {
        let engine = DockerEngine::with_program("lectern-definitely-not-an-engine");
        assert!(!engine.available());
        assert!(engine.compose_command().is_none());
        assert!(matches!(engine.ping(), Err(RuntimeError::Spawn { .. })));
    }

    #[test]
    fn archives_are_gzipped_in_process() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lectern-backend.tar.gz");
        let payload = b"image layer bytes ".repeat(512);
        let n = write_gzip(&payload[..], File::create(&path).unwrap()).unwrap();
        assert_eq!(n, payload.len() as u64);

        let raw = std::fs::read(&path).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);
        assert!(raw.len() < payload.len());
        let mut decoded = Vec::new();
        flate2::read::GzDecoder::new(&raw[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, payload);
    }
}
