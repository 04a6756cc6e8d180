use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Answers "is something already listening on this TCP port".
pub trait PortProbe {
    /// Name of the probing tool, or `None` when no tool is available and
    /// the check must be skipped.
    fn tool(&self) -> Option<&str>;

    fn is_occupied(&self, port: u16) -> bool;
}

/// Probes the host with the first available of `lsof`, `ss`, `netstat`.
#[derive(Debug, Clone)]
pub struct SystemPortProbe {
    tool: Option<&'static str>,
}

const PROBE_TOOLS: [&str; 3] = ["lsof", "ss", "netstat"];

impl SystemPortProbe {
    pub fn detect() -> Self {
        Self::detect_in(std::env::var_os("PATH"))
    }

    /// Look the tools up in `search_path` (`PATH` syntax). `PATHEXT` applies
    /// on Windows, where usually only `netstat` is found.
    pub fn detect_in(search_path: Option<OsString>) -> Self {
        let tool = PROBE_TOOLS
            .into_iter()
            .find(|t| which::which_in(t, search_path.as_ref(), Path::new(".")).is_ok());
        debug!("port probe tool: {}", tool.unwrap_or("none"));
        Self { tool }
    }
}

impl PortProbe for SystemPortProbe {
    fn tool(&self) -> Option<&str> {
        self.tool
    }

    fn is_occupied(&self, port: u16) -> bool {
        let Some(tool) = self.tool else {
            return false;
        };
        let port_arg = format!("-iTCP:{port}");
        let args: Vec<&str> = match tool {
            "lsof" => vec!["-nP", &port_arg, "-sTCP:LISTEN"],
            "ss" => vec!["-ltn"],
            _ => vec!["-an"],
        };
        let Ok(output) = Command::new(tool)
            .args(&args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
        else {
            return false;
        };
        let stdout = String::from_utf8_lossy(&output.stdout);
        if tool == "lsof" {
            // lsof already filtered on the port; any row after the header counts.
            return output.status.success() && stdout.lines().count() > 1;
        }
        output_lists_listener(&stdout, port)
    }
}

/// Scan `ss -ltn` / `netstat -an` output for a listener on `port`.
///
/// On `LISTEN` lines the first token carrying an address separator is the
/// local address; `*:1280`, `0.0.0.0:1280`, `[::]:1280` and BSD-style
/// `*.1280` all match.
pub fn output_lists_listener(output: &str, port: u16) -> bool {
    let colon = format!(":{port}");
    let dot = format!(".{port}");
    output
        .lines()
        .filter(|line| line.to_ascii_uppercase().contains("LISTEN"))
        .filter_map(|line| {
            line.split_whitespace()
                .find(|tok| tok.contains(':') || tok.contains('.'))
        })
        .any(|addr| addr.ends_with(&colon) || addr.ends_with(&dot))
}

/// Fixed answers, for tests and for callers that already know.
#[derive(Debug, Clone, Default)]
pub struct StaticPortProbe {
    occupied: BTreeSet<u16>,
    no_tool: bool,
}

impl StaticPortProbe {
    pub fn new(occupied: impl IntoIterator<Item = u16>) -> Self {
        Self {
            occupied: occupied.into_iter().collect(),
            no_tool: false,
        }
    }

    pub fn without_tool() -> Self {
        Self {
            occupied: BTreeSet::new(),
            no_tool: true,
        }
    }
}

impl PortProbe for StaticPortProbe {
    fn tool(&self) -> Option<&str> {
        if self.no_tool {
            None
        } else {
            Some("static")
        }
    }

    fn is_occupied(&self, port: u16) -> bool {
        self.occupied.contains(&port)
    }
}
