use std::fmt;

use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_TAG: &str = "latest";
pub const DOCKER_HUB_DOMAIN: &str = "docker.io";
const DOCKER_HUB_LEGACY_DOMAIN: &str = "index.docker.io";
const DOCKER_HUB_OFFICIAL_NAMESPACE: &str = "library";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageParseError {
    #[error("Image reference is empty")]
    Empty,
    #[error("Malformed image reference '{0}'")]
    Malformed(String),
}

/// A parsed image reference, e.g. `registry.local:5000/team/app:1.2@sha256:...`.
///
/// The digest is dropped, only the tag is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    /// The repository exactly as it was written, without tag or digest.
    pub name: String,
    /// The registry domain, `docker.io` when none was written.
    pub domain: String,
    /// The repository path inside the registry, e.g. `library/nginx`.
    pub path: String,
    pub tag: String,
    /// The reference as written, digest removed. `myimage` stays `myimage`.
    #[serde(skip)]
    written: String,
}

impl ImageReference {
    pub fn parse(reference: &str) -> Result<Self, ImageParseError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ImageParseError::Empty);
        }

        let without_digest = match reference.split_once('@') {
            Some((image, _digest)) => image,
            None => reference,
        };

        // The tag separator is the last colon after the last slash, any colon before that
        // belongs to a registry port.
        let last_slash = without_digest.rfind('/').map(|i| i + 1).unwrap_or(0);
        let (name, tag) = match without_digest[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&without_digest[..split], Some(&without_digest[split + 1..]))
            },
            None => (without_digest, None),
        };

        let tag = match tag {
            Some("") => return Err(ImageParseError::Malformed(reference.to_string())),
            Some(tag) => tag,
            None => DEFAULT_TAG,
        };

        if name.is_empty() || name.starts_with('/') || name.ends_with('/') || name.contains("//") {
            return Err(ImageParseError::Malformed(reference.to_string()));
        }

        let (domain, path) = match name.split_once('/') {
            Some((first, rest)) if is_domain(first) => (first, rest.to_string()),
            _ => (DOCKER_HUB_DOMAIN, name.to_string()),
        };

        let domain = if domain == DOCKER_HUB_LEGACY_DOMAIN { DOCKER_HUB_DOMAIN } else { domain };
        let path = if domain == DOCKER_HUB_DOMAIN && !path.contains('/') {
            format!("{}/{}", DOCKER_HUB_OFFICIAL_NAMESPACE, path)
        } else {
            path
        };

        Ok(Self {
            name: name.to_string(),
            domain: domain.to_string(),
            path,
            tag: tag.to_string(),
            written: without_digest.to_string(),
        })
    }

    /// The registry qualified repository name, e.g. `docker.io/library/nginx`.
    pub fn canonical_name(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }

    /// The reference as it appeared in the service spec, without the digest.
    pub fn as_written(&self) -> &str {
        &self.written
    }

    /// The same repository, written the same way, pointing at another tag.
    pub fn with_tag(&self, tag: &str) -> ImageReference {
        Self {
            tag: tag.to_string(),
            written: format!("{}:{}", self.name, tag),
            ..self.clone()
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

fn is_domain(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}
