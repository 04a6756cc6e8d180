use lectern_profile::PlatformKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use tracing::debug;

/// Environment variables consulted by classification and NAS detection.
const PROBED_VARS: [&str; 5] = ["WSL_DISTRO_NAME", "WSL_INTEROP", "MSYSTEM", "OSTYPE", "LECTERN_NAS"];

/// Docker bridge subnets used by common NAS container managers.
const NAS_BRIDGE_SUBNETS: [(Ipv4Addr, u8); 3] = [
    (Ipv4Addr::new(10, 0, 3, 0), 24),
    (Ipv4Addr::new(10, 0, 5, 0), 24),
    (Ipv4Addr::new(172, 29, 0, 0), 16),
];

const NAS_HOSTNAME_MARKERS: [&str; 6] = [
    "synology",
    "diskstation",
    "qnap",
    "truenas",
    "unraid",
    "openmediavault",
];

/// Raw facts gathered from the host. Classification is a pure function of
/// this struct.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostProbe {
    pub kernel_name: String,
    pub kernel_release: String,
    pub hostname: String,
    pub env: BTreeMap<String, String>,
    pub in_container: bool,
    /// Destination networks from the kernel routing table.
    pub routes: Vec<Ipv4Addr>,
}

impl HostProbe {
    pub fn gather() -> Self {
        let (kernel_name, kernel_release, hostname) = uname();
        let env = PROBED_VARS
            .iter()
            .filter_map(|k| std::env::var(k).ok().map(|v| ((*k).to_owned(), v)))
            .collect();
        let in_container =
            Path::new("/.dockerenv").exists() || Path::new("/run/.containerenv").exists();
        let routes = std::fs::read_to_string("/proc/net/route")
            .map(|s| parse_routes(&s))
            .unwrap_or_default();
        let probe = Self {
            kernel_name,
            kernel_release,
            hostname,
            env,
            in_container,
            routes,
        };
        debug!(
            "host probe: kernel={} release={} hostname={} container={}",
            probe.kernel_name, probe.kernel_release, probe.hostname, probe.in_container
        );
        probe
    }

    fn var(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

#[cfg(unix)]
fn uname() -> (String, String, String) {
    fn field(raw: &[libc::c_char]) -> String {
        #[allow(clippy::cast_sign_loss)]
        let bytes: Vec<u8> = raw
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::uname(&raw mut uts) };
    if ret != 0 {
        return (std::env::consts::OS.to_owned(), String::new(), String::new());
    }
    (field(&uts.sysname), field(&uts.release), field(&uts.nodename))
}

#[cfg(not(unix))]
fn uname() -> (String, String, String) {
    let name = match std::env::consts::OS {
        "windows" => "Windows",
        "macos" => "Darwin",
        "linux" => "Linux",
        other => other,
    };
    let hostname = std::env::var("COMPUTERNAME").unwrap_or_default();
    (name.to_owned(), String::new(), hostname)
}

/// Classify the host platform. First match wins. Never yields `NasLinux`.
pub fn classify(probe: &HostProbe) -> PlatformKind {
    if probe.kernel_name == "Darwin" {
        return PlatformKind::MacOs;
    }
    if is_windows(probe) {
        return PlatformKind::Windows;
    }
    if probe.kernel_name == "Linux" {
        return PlatformKind::Linux;
    }
    PlatformKind::Unknown
}

fn is_windows(probe: &HostProbe) -> bool {
    if ["WSL_DISTRO_NAME", "WSL_INTEROP", "MSYSTEM"]
        .iter()
        .any(|k| probe.var(k).is_some_and(|v| !v.is_empty()))
    {
        return true;
    }
    if let Some(ostype) = probe.var("OSTYPE") {
        let ostype = ostype.to_ascii_lowercase();
        if ["msys", "cygwin", "win32"].iter().any(|m| ostype.contains(m)) {
            return true;
        }
    }
    let kernel = probe.kernel_name.to_ascii_uppercase();
    if ["MINGW", "MSYS", "CYGWIN", "WINDOWS"]
        .iter()
        .any(|p| kernel.starts_with(p))
    {
        return true;
    }
    let release = probe.kernel_release.to_ascii_lowercase();
    release.contains("microsoft") || release.contains("wsl")
}

/// NAS detection: explicit flag, vendor hostname, or a container attached
/// to a known NAS bridge network.
pub fn is_nas(probe: &HostProbe) -> bool {
    if probe
        .var("LECTERN_NAS")
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
    {
        return true;
    }
    if hostname_looks_like_nas(&probe.hostname) {
        return true;
    }
    probe.in_container && probe.routes.iter().any(|r| in_nas_subnet(*r))
}

fn hostname_looks_like_nas(hostname: &str) -> bool {
    let host = hostname.trim().to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    let model_prefix = |p: &str| {
        host.strip_prefix(p)
            .and_then(|rest| rest.chars().next())
            .is_some_and(|c| c.is_ascii_digit())
    };
    model_prefix("ds")
        || model_prefix("rs")
        || NAS_HOSTNAME_MARKERS.iter().any(|m| host.contains(m))
        || host.ends_with("-nas")
        || host.starts_with("nas")
}

fn in_nas_subnet(addr: Ipv4Addr) -> bool {
    NAS_BRIDGE_SUBNETS.iter().any(|(net, prefix)| {
        let mask = u32::MAX << (32 - u32::from(*prefix));
        u32::from(addr) & mask == u32::from(*net) & mask
    })
}

/// Destinations from `/proc/net/route`. Addresses are little-endian hex.
pub fn parse_routes(table: &str) -> Vec<Ipv4Addr> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|hex| u32::from_str_radix(hex, 16).ok())
        .map(|raw| Ipv4Addr::from(raw.to_le_bytes()))
        .filter(|a| !a.is_unspecified())
        .collect()
}

/// Classify the current host.
pub fn detect() -> PlatformKind {
    classify(&HostProbe::gather())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Virtualization {
    None,
    Wsl,
    Container,
}

/// Everything the installer knows about the host, built once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostEnvironment {
    pub platform: PlatformKind,
    pub nas: bool,
    pub virtualization: Virtualization,
    pub hostname: String,
}

impl HostEnvironment {
    pub fn detect() -> Self {
        Self::from_probe(&HostProbe::gather())
    }

    pub fn from_probe(probe: &HostProbe) -> Self {
        let wsl = probe.var("WSL_DISTRO_NAME").is_some()
            || probe.kernel_release.to_ascii_lowercase().contains("microsoft");
        let virtualization = if probe.in_container {
            Virtualization::Container
        } else if wsl {
            Virtualization::Wsl
        } else {
            Virtualization::None
        };
        Self {
            platform: classify(probe),
            nas: is_nas(probe),
            virtualization,
            hostname: probe.hostname.clone(),
        }
    }

    /// Fixed environment, for callers that bypass detection.
    pub fn fixed(platform: PlatformKind, nas: bool) -> Self {
        Self {
            platform,
            nas,
            virtualization: Virtualization::None,
            hostname: String::new(),
        }
    }
}
