use std::fmt;
use std::time::Duration;
use tracing::debug;

/// An irregularity found in the engine's registry-mirror configuration.
/// Advisory only: the operator decides whether to continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorIssue {
    InvalidUrl { mirror: String, reason: String },
    Unreachable { mirror: String, error: String },
}

impl fmt::Display for MirrorIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidUrl { mirror, reason } => {
                write!(f, "registry mirror '{mirror}' is malformed: {reason}")
            }
            Self::Unreachable { mirror, error } => {
                write!(f, "registry mirror '{mirror}' is unreachable: {error}")
            }
        }
    }
}

fn validate_url(mirror: &str) -> Result<(), String> {
    let rest = mirror
        .strip_prefix("https://")
        .or_else(|| mirror.strip_prefix("http://"))
        .ok_or_else(|| "expected an http:// or https:// URL".to_owned())?;
    let host = rest.split('/').next().unwrap_or_default();
    if host.is_empty() {
        return Err("missing host".to_owned());
    }
    if host.chars().any(char::is_whitespace) {
        return Err("host contains whitespace".to_owned());
    }
    Ok(())
}

/// Check each configured mirror: well-formed URL, then a `GET /v2/` that
/// gets any HTTP answer within `timeout`. An error status still proves
/// the mirror is there (registries answer 401 without credentials).
pub fn check_mirrors(mirrors: &[String], timeout: Duration) -> Vec<MirrorIssue> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into();

    let mut issues = Vec::new();
    for mirror in mirrors {
        if let Err(reason) = validate_url(mirror) {
            issues.push(MirrorIssue::InvalidUrl {
                mirror: mirror.clone(),
                reason,
            });
            continue;
        }
        let url = format!("{}/v2/", mirror.trim_end_matches('/'));
        debug!("GET {url}");
        match agent.get(&url).call() {
            Ok(_) | Err(ureq::Error::StatusCode(_)) => {}
            Err(e) => issues.push(MirrorIssue::Unreachable {
                mirror: mirror.clone(),
                error: e.to_string(),
            }),
        }
    }
    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation() {
        assert!(validate_url("https://mirror.gcr.io").is_ok());
        assert!(validate_url("http://10.0.0.5:5000/").is_ok());
        assert!(validate_url("mirror.gcr.io").is_err());
        assert!(validate_url("https://").is_err());
        assert!(validate_url("ftp://mirror").is_err());
    }

    #[test]
    fn malformed_mirror_is_reported_without_network() {
        let issues = check_mirrors(&["registry.local".to_owned()], Duration::from_millis(50));
        assert!(matches!(issues[0], MirrorIssue::InvalidUrl { .. }));
        assert!(issues[0].to_string().contains("registry.local"));
    }

    #[test]
    fn closed_port_is_unreachable() {
        let issues = check_mirrors(&["http://127.0.0.1:1".to_owned()], Duration::from_secs(2));
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], MirrorIssue::Unreachable { .. }));
    }

    #[test]
    fn no_mirrors_no_issues() {
        assert!(check_mirrors(&[], Duration::from_millis(10)).is_empty());
    }
}
