use crate::types::ServiceRole;
use crate::ProfileError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TAG: &str = "latest";

/// A `(repository, tag)` pair identifying a buildable or pullable image.
///
/// Equality is exact string equality on both parts. `app:1.0` never
/// satisfies `app:latest`, and `docker.io/app` never satisfies `app`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    pub repository: String,
    pub tag: String,
}

impl ImageRef {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }

    /// Parse `repo[:tag]`. A colon that appears before the last `/` belongs
    /// to a registry host (`registry:5000/app`) and is not a tag separator.
    /// Digest references and compose variable interpolation are rejected.
    pub fn parse(input: &str) -> Result<Self, ProfileError> {
        let s = input.trim();
        if s.is_empty() || s.contains("${") || s.contains('$') || s.contains('@') {
            return Err(ProfileError::InvalidImageRef(input.to_owned()));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(ProfileError::InvalidImageRef(input.to_owned()));
        }

        let last_slash = s.rfind('/');
        let tag_colon = s
            .rfind(':')
            .filter(|&colon| last_slash.is_none_or(|slash| colon > slash));

        let (repository, tag) = match tag_colon {
            Some(colon) => (&s[..colon], &s[colon + 1..]),
            None => (s, DEFAULT_TAG),
        };
        if repository.is_empty() || tag.is_empty() || repository.ends_with('/') {
            return Err(ProfileError::InvalidImageRef(input.to_owned()));
        }
        Ok(Self::new(repository, tag))
    }

    /// Fixed fallback reference for a role when the profile does not yield one.
    pub fn default_for(role: ServiceRole) -> Self {
        Self::new(format!("lectern-{role}"), DEFAULT_TAG)
    }

    pub fn matches(&self, repository: &str, tag: &str) -> bool {
        self.repository == repository && self.tag == tag
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

impl std::str::FromStr for ImageRef {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_with_tag() {
        let r = ImageRef::parse("lectern-backend:1.2.0").unwrap();
        assert_eq!(r.repository, "lectern-backend");
        assert_eq!(r.tag, "1.2.0");
    }

    #[test]
    fn parse_without_tag_defaults_latest() {
        let r = ImageRef::parse("nginx").unwrap();
        assert_eq!(r.to_string(), "nginx:latest");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let r = ImageRef::parse("registry.local:5000/lectern/backend").unwrap();
        assert_eq!(r.repository, "registry.local:5000/lectern/backend");
        assert_eq!(r.tag, "latest");

        let r = ImageRef::parse("registry.local:5000/lectern/backend:v3").unwrap();
        assert_eq!(r.repository, "registry.local:5000/lectern/backend");
        assert_eq!(r.tag, "v3");
    }

    #[test]
    fn rejects_interpolation_and_digests() {
        assert!(ImageRef::parse("${BACKEND_IMAGE}").is_err());
        assert!(ImageRef::parse("lectern-backend:${TAG:-latest}").is_err());
        assert!(ImageRef::parse("app@sha256:abcd").is_err());
        assert!(ImageRef::parse("").is_err());
        assert!(ImageRef::parse("app:").is_err());
    }

    #[test]
    fn tag_mismatch_is_not_a_match() {
        let r = ImageRef::new("lectern-backend", "1.0");
        assert!(!r.matches("lectern-backend", "latest"));
        assert!(r.matches("lectern-backend", "1.0"));
    }

    #[test]
    fn role_defaults() {
        assert_eq!(
            ImageRef::default_for(ServiceRole::Frontend).to_string(),
            "lectern-frontend:latest"
        );
        assert_eq!(
            ImageRef::default_for(ServiceRole::Tts).to_string(),
            "lectern-tts:latest"
        );
    }
}
