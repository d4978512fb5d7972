//! Base toolchain image references
//!
//! A reference is `repository[:tag][@sha256:<64 hex>]`. Only references with
//! a digest or an explicit non-`latest` tag count as pinned.

use std::fmt;
use std::str::FromStr;

use super::RecipeError;

/// Tag docker resolves when none is given
const FLOATING_TAG: &str = "latest";

/// A parsed base image reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseImage {
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl BaseImage {
    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Whether the reference resolves to the same toolchain on every build
    ///
    /// A digest is content addressed. A version tag is treated as pinned as
    /// long as it is not the floating `latest`.
    pub fn is_pinned(&self) -> bool {
        if self.digest.is_some() {
            return true;
        }
        matches!(self.tag.as_deref(), Some(tag) if tag != FLOATING_TAG)
    }

    /// Reject floating references unless explicitly allowed
    pub fn ensure_pinned(&self, allow_floating: bool) -> Result<(), RecipeError> {
        if self.is_pinned() {
            return Ok(());
        }
        if allow_floating {
            tracing::warn!(
                "Base image '{}' is not pinned; builds are not reproducible",
                self
            );
            return Ok(());
        }
        Err(RecipeError::FloatingBaseImage(self.to_string()))
    }

    /// Arguments for the daemon's image create call: `(from_image, tag)`
    ///
    /// Digest references are passed whole with an empty tag.
    pub fn pull_args(&self) -> (String, String) {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => (format!("{}@{}", self.repository, digest), String::new()),
            (None, Some(tag)) => (self.repository.clone(), tag.clone()),
            (None, None) => (self.repository.clone(), FLOATING_TAG.to_string()),
        }
    }
}

impl FromStr for BaseImage {
    type Err = RecipeError;

    fn from_str(reference: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| RecipeError::InvalidBaseImage {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("reference is empty"));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(invalid("reference contains whitespace"));
        }

        let (name, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                let hex = digest
                    .strip_prefix("sha256:")
                    .ok_or_else(|| invalid("digest must start with 'sha256:'"))?;
                if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(invalid("digest must be 64 hex characters"));
                }
                (name, Some(digest.to_ascii_lowercase()))
            }
            None => (trimmed, None),
        };

        // The tag separator is the last ':' after the last '/', so registry
        // ports like `localhost:5000/rust` are not mistaken for tags.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (repository, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                (&name[..split], Some(&name[split + 1..]))
            }
            None => (name, None),
        };

        if repository.is_empty() {
            return Err(invalid("repository is empty"));
        }
        if repository.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository must be lowercase"));
        }
        if let Some(tag) = tag {
            if tag.is_empty() {
                return Err(invalid("tag is empty"));
            }
        }

        Ok(Self {
            repository: repository.to_string(),
            tag: tag.map(str::to_string),
            digest,
        })
    }
}

impl fmt::Display for BaseImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{tag}")?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{digest}")?;
        }
        Ok(())
    }
}
