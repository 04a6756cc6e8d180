use super::{Context, EXIT_FAILURE, EXIT_SUCCESS};
use lectern_core::concurrency::LOCK_FILE;
use lectern_core::resolver::first_candidate;
use lectern_core::DeployLock;
use lectern_profile::{candidates_for, ProfileKind, CONFIG_FILE};
use lectern_runtime::{check_engine_prereqs, check_mirrors, format_missing, Virtualization};
use std::path::Path;
use std::time::Duration;

pub fn run(ctx: &Context) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    check_host(ctx, &mut checks);
    let engine_ok = check_engine(ctx, &mut checks, &mut all_pass);
    if engine_ok {
        check_registry_mirrors(ctx, &mut checks);
    }
    check_profile(ctx, &mut checks, &mut all_pass);
    check_files(ctx, &mut checks);
    check_ports(ctx, &mut checks);
    check_lock(&ctx.root, &mut checks, &mut all_pass);
    check_disk_space(&ctx.root, &mut checks);

    print_results(&checks, all_pass, ctx.json)
}

fn check_host(ctx: &Context, checks: &mut Vec<Check>) {
    let host = &ctx.host;
    let mut msg = format!("Platform: {}", host.platform);
    if host.nas {
        msg.push_str(" (NAS detected)");
    }
    match host.virtualization {
        Virtualization::Container => msg.push_str(", running inside a container"),
        Virtualization::Wsl => msg.push_str(", running under WSL"),
        Virtualization::None => {}
    }
    checks.push(Check::info("platform", &msg));
}

fn check_engine(ctx: &Context, checks: &mut Vec<Check>, all_pass: &mut bool) -> bool {
    let engine = ctx.engine();
    let missing = check_engine_prereqs(engine);
    if !missing.is_empty() {
        *all_pass = false;
        checks.push(Check::fail("engine_prereqs", &format_missing(&missing)));
        return false;
    }
    checks.push(Check::pass(
        "engine_prereqs",
        &format!("Container engine '{}' and daemon reachable", engine.name()),
    ));
    if let Some(compose) = engine.compose_command() {
        checks.push(Check::pass("compose", &format!("Compose tooling: {compose}")));
    }
    true
}

fn check_registry_mirrors(ctx: &Context, checks: &mut Vec<Check>) {
    let mirrors = match ctx.engine().registry_mirrors() {
        Ok(m) => m,
        Err(e) => {
            checks.push(Check::warn(
                "registry_mirrors",
                &format!("Cannot read registry mirrors: {e}"),
            ));
            return;
        }
    };
    if mirrors.is_empty() {
        checks.push(Check::info("registry_mirrors", "No registry mirrors configured"));
        return;
    }
    let issues = check_mirrors(&mirrors, Duration::from_secs(5));
    if issues.is_empty() {
        checks.push(Check::pass(
            "registry_mirrors",
            &format!("{} registry mirror(s) reachable", mirrors.len()),
        ));
    } else {
        for issue in issues {
            checks.push(Check::warn("registry_mirrors", &issue.to_string()));
        }
    }
}

fn check_profile(ctx: &Context, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let session = ctx.session();
    let compose_dir = session.compose_dir();
    let candidates = candidates_for(ctx.host.platform, ctx.host.nas);
    match first_candidate(&candidates, &compose_dir) {
        Some((kind, path)) => checks.push(Check::pass(
            "profile",
            &format!("Profile: {} ({})", kind.label(), path.display()),
        )),
        None => {
            *all_pass = false;
            checks.push(Check::fail(
                "profile",
                &format!(
                    "Default profile missing: {}",
                    ProfileKind::Standard.path_in(&compose_dir).display()
                ),
            ));
        }
    }
}

fn check_files(ctx: &Context, checks: &mut Vec<Check>) {
    let env_file = ctx.session().env_file();
    if env_file.is_file() {
        checks.push(Check::pass(
            "env_file",
            &format!("Environment file present: {}", env_file.display()),
        ));
    } else {
        checks.push(Check::info(
            "env_file",
            "Environment file not created yet (created on first install)",
        ));
    }
    if ctx.root.join(CONFIG_FILE).is_file() {
        checks.push(Check::pass("config", &format!("{CONFIG_FILE} parsed")));
    } else {
        checks.push(Check::info(
            "config",
            &format!("No {CONFIG_FILE}; using built-in defaults"),
        ));
    }
}

fn check_ports(ctx: &Context, checks: &mut Vec<Check>) {
    let session = ctx.session();
    let Some(tool) = session.ports.tool() else {
        checks.push(Check::warn(
            "ports",
            "No port inspection tool found (lsof, ss, netstat)",
        ));
        return;
    };
    let p = &ctx.config.ports;
    for (label, port) in [("web", p.web), ("api", p.api), ("tts", p.tts), ("ocr", p.ocr)] {
        let name = format!("port_{label}");
        if session.ports.is_occupied(port) {
            checks.push(Check::warn(
                &name,
                &format!("Port {port} ({label}) is in use (checked with {tool})"),
            ));
        } else {
            checks.push(Check::pass(&name, &format!("Port {port} ({label}) is free")));
        }
    }
}

fn check_lock(root: &Path, checks: &mut Vec<Check>, all_pass: &mut bool) {
    match DeployLock::try_acquire(&root.join(LOCK_FILE)) {
        Ok(Some(_)) => checks.push(Check::pass("run_lock", "No other lectern run in progress")),
        Ok(None) => checks.push(Check::warn(
            "run_lock",
            "Another lectern run holds the lock",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "run_lock",
                &format!("Cannot check run lock: {e}"),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Lectern Doctor\n");
        for check in checks {
            let icon = match check.status.as_str() {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: String,
    message: String,
}

impl Check {
    fn new(name: &str, status: &str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status: status.to_owned(),
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

/// Images and build layers land on the engine's disk, which is usually the
/// one holding the deployment root.
fn check_disk_space(root: &Path, checks: &mut Vec<Check>) {
    let Ok(c_path) = std::ffi::CString::new(root.to_string_lossy().as_bytes()) else {
        return;
    };

    // SAFETY: zeroed statvfs is a valid initial state for the struct.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: valid NUL-terminated path and a zeroed output struct that is
    // only read after the call succeeds.
    #[allow(unsafe_code, clippy::undocumented_unsafe_blocks)]
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &raw mut stat) };
    if ret != 0 {
        return;
    }

    #[allow(clippy::unnecessary_cast)]
    let avail_mb = (stat.f_bavail as u64 * stat.f_frsize as u64) / (1024 * 1024);

    if avail_mb < 2048 {
        checks.push(Check::warn(
            "disk_space",
            &format!("Low disk space: {avail_mb} MB available (image builds need several GB)"),
        ));
    } else {
        checks.push(Check::pass(
            "disk_space",
            &format!("Disk space: {} GB available", avail_mb / 1024),
        ));
    }
}
