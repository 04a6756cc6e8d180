use crate::engine::ContainerEngine;
use std::fmt;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

/// Check the engine binary, its compose tooling, and that the daemon
/// answers. Empty list means the engine is ready to use. A missing engine
/// binary is reported alone.
pub fn check_engine_prereqs(engine: &dyn ContainerEngine) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !engine.available() {
        missing.push(MissingPrereq {
            name: "container engine",
            purpose: "building and running the application containers",
            install_hint: "Docker Desktop (macOS/Windows), docker-ce or podman (Linux), \
                           or the Container Manager package on NAS devices",
        });
        return missing;
    }

    if engine.compose_command().is_none() {
        missing.push(MissingPrereq {
            name: "compose",
            purpose: "multi-container orchestration from the deployment profiles",
            install_hint: "the docker compose plugin (docker-compose-plugin) \
                           or standalone docker-compose / podman-compose",
        });
    }

    if engine.ping().is_err() {
        missing.push(MissingPrereq {
            name: "engine daemon",
            purpose: "the engine service must be running and reachable",
            install_hint: "start Docker Desktop, or: systemctl start docker \
                           (add your user to the docker group or rerun with sudo)",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nLectern needs a working container engine to install the application.");
    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockEngine;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "compose",
            purpose: "orchestration",
            install_hint: "apt install docker-compose-plugin",
        };
        let s = format!("{m}");
        assert!(s.contains("compose"));
        assert!(s.contains("orchestration"));
        assert!(s.contains("apt install docker-compose-plugin"));
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![
            MissingPrereq {
                name: "compose",
                purpose: "orchestration",
                install_hint: "docker-compose-plugin",
            },
            MissingPrereq {
                name: "engine daemon",
                purpose: "reachable service",
                install_hint: "systemctl start docker",
            },
        ];
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("compose"));
        assert!(output.contains("engine daemon"));
    }

    #[test]
    fn healthy_mock_has_no_missing_prereqs() {
        assert!(check_engine_prereqs(&MockEngine::new()).is_empty());
    }

    #[test]
    fn unavailable_engine_short_circuits() {
        let missing = check_engine_prereqs(&MockEngine::new().unavailable());
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "container engine");
    }

    #[test]
    fn compose_and_daemon_reported_together() {
        let engine = MockEngine::new().without_compose().daemon_down();
        let names: Vec<_> = check_engine_prereqs(&engine)
            .iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["compose", "engine daemon"]);
    }
}
