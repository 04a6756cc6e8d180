use crate::CoreError;
use lectern_profile::config::PortsSection;
use serde::Serialize;
use std::fmt::Write as _;
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

const SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvFileOutcome {
    Created,
    Existing,
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

fn os_entropy() -> Result<[u8; SECRET_BYTES], getrandom::Error> {
    let mut buf = [0u8; SECRET_BYTES];
    getrandom::fill(&mut buf)?;
    Ok(buf)
}

/// Only used when the OS random source fails: a hash over per-process
/// values that differ between runs.
fn fallback_entropy(seed: &Path) -> [u8; SECRET_BYTES] {
    let mut hasher = blake3::Hasher::new();
    let now = chrono::Utc::now();
    hasher.update(now.to_rfc3339().as_bytes());
    hasher.update(&now.timestamp_subsec_nanos().to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(seed.to_string_lossy().as_bytes());
    let stack_marker = 0u8;
    hasher.update(&(std::ptr::addr_of!(stack_marker) as usize).to_le_bytes());
    *hasher.finalize().as_bytes()
}

/// 64 hex characters of signing secret.
pub fn generate_secret(seed: &Path) -> String {
    match os_entropy() {
        Ok(bytes) => hex(&bytes),
        Err(e) => {
            warn!("OS random source unavailable ({e}), using fallback secret generator");
            hex(&fallback_entropy(seed))
        }
    }
}

pub fn render_env_file(secret: &str, ports: &PortsSection) -> String {
    format!(
        "# Generated by lectern. Edit freely; lectern never overwrites this file.\n\
         JWT_SECRET={secret}\n\
         JWT_EXPIRES_IN=7d\n\
         \n\
         # Optional AI integrations\n\
         OPENAI_API_BASE=\n\
         OPENAI_API_KEY=\n\
         OLLAMA_URL=http://host.docker.internal:11434\n\
         \n\
         # Optional sidecars\n\
         TTS_API_URL=http://host.docker.internal:{tts}\n\
         OCR_API_URL=http://host.docker.internal:{ocr}\n",
        tts = ports.tts,
        ocr = ports.ocr,
    )
}

/// Create the environment file once. An existing file is never touched.
pub fn ensure_env_file(path: &Path, ports: &PortsSection) -> Result<EnvFileOutcome, CoreError> {
    if path.exists() {
        debug!("environment file {} already present", path.display());
        return Ok(EnvFileOutcome::Existing);
    }
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let content = render_env_file(&generate_secret(path), ports);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(path) {
        Ok(_) => Ok(EnvFileOutcome::Created),
        // Lost a race with another writer; theirs stands.
        Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
            Ok(EnvFileOutcome::Existing)
        }
        Err(e) => Err(CoreError::Io(e.error)),
    }
}

/// Value of `key` in a dotenv-style file.
pub fn read_env_value(path: &Path, key: &str) -> Result<Option<String>, CoreError> {
    let content = std::fs::read_to_string(path)?;
    Ok(content.lines().find_map(|line| {
        let (k, v) = line.split_once('=')?;
        (k.trim() == key).then(|| v.trim().to_owned())
    }))
}
