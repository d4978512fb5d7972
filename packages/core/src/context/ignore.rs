//! Inclusion/exclusion manifest for the build context
//!
//! Patterns follow `.dockerignore` rules: they are relative to the source
//! root, `*` does not cross `/`, `**` spans directories, a leading `!`
//! re-includes, and the last matching rule wins. A pattern that matches a
//! directory matches everything below it.

use std::path::{Component, Path};

use glob::{MatchOptions, Pattern};

use super::ContextError;

/// Always excluded unless re-included with `!`
///
/// Build output, VCS metadata, local secrets and editor state never belong
/// in an image layer.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    "target",
    ".git",
    ".env",
    ".env.*",
    "**/*.pem",
    "**/*.key",
    ".idea",
    ".vscode",
    "node_modules",
    "**/.DS_Store",
];

/// Name of the ignore file read from the source root
pub const IGNORE_FILE_NAME: &str = ".dockerignore";

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
struct Rule {
    pattern: Pattern,
    negated: bool,
}

/// Ordered exclusion rules plus optional include filter
#[derive(Debug, Clone)]
pub struct IgnoreManifest {
    rules: Vec<Rule>,
    include: Vec<Pattern>,
}

impl Default for IgnoreManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl IgnoreManifest {
    /// Manifest holding only [`DEFAULT_EXCLUDES`]
    pub fn new() -> Self {
        let mut manifest = Self::empty();
        for pattern in DEFAULT_EXCLUDES {
            // Defaults are static and known to compile
            if let Ok(rule) = parse_rule(pattern) {
                manifest.rules.extend(rule);
            }
        }
        manifest
    }

    /// Manifest without any rule
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            include: Vec::new(),
        }
    }

    /// Build the manifest for a source root
    ///
    /// Order: defaults, then `.dockerignore`, then configured excludes.
    /// Configured includes restrict the result further.
    pub fn load(
        source_root: &Path,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self, ContextError> {
        let mut manifest = Self::new();

        let ignore_path = source_root.join(IGNORE_FILE_NAME);
        if ignore_path.is_file() {
            let contents =
                std::fs::read_to_string(&ignore_path).map_err(|source| ContextError::Io {
                    path: ignore_path.clone(),
                    source,
                })?;
            manifest.add_ignore_file(&contents)?;
            tracing::debug!("Loaded ignore rules from {}", ignore_path.display());
        }

        for pattern in exclude {
            manifest.exclude(pattern)?;
        }
        for pattern in include {
            manifest.include(pattern)?;
        }
        Ok(manifest)
    }

    /// Append one rule; `!pattern` re-includes
    pub fn exclude(&mut self, pattern: &str) -> Result<(), ContextError> {
        self.rules.extend(parse_rule(pattern)?);
        Ok(())
    }

    /// Restrict the context to paths matching `pattern` (or below a match)
    pub fn include(&mut self, pattern: &str) -> Result<(), ContextError> {
        if let Some(normalized) = normalize_pattern(pattern) {
            let compiled = compile(&normalized)?;
            self.include.push(compiled);
        }
        Ok(())
    }

    /// Append every rule of a `.dockerignore` file
    pub fn add_ignore_file(&mut self, contents: &str) -> Result<(), ContextError> {
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.exclude(line)?;
        }
        Ok(())
    }

    /// Whether any rule can bring back a path below an excluded directory
    pub fn has_negations(&self) -> bool {
        self.rules.iter().any(|rule| rule.negated)
    }

    /// Whether the exclusion rules drop `relative`
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let candidates = ancestors(relative);
        let mut excluded = false;
        for rule in &self.rules {
            if candidates
                .iter()
                .any(|candidate| rule.pattern.matches_with(candidate, MATCH_OPTIONS))
            {
                excluded = !rule.negated;
            }
        }
        excluded
    }

    /// Whether the include filter keeps `relative`
    ///
    /// With no include patterns everything is kept. A directory is kept when
    /// it could contain an included path.
    pub fn is_included(&self, relative: &Path, is_dir: bool) -> bool {
        if self.include.is_empty() {
            return true;
        }
        let candidates = ancestors(relative);
        let matched = self.include.iter().any(|pattern| {
            candidates
                .iter()
                .any(|candidate| pattern.matches_with(candidate, MATCH_OPTIONS))
        });
        matched || (is_dir && self.include.iter().any(|p| could_contain(p, &candidates)))
    }

    /// Whether a file ends up in the build context
    pub fn allows(&self, relative: &Path) -> bool {
        !self.is_excluded(relative) && self.is_included(relative, false)
    }
}

fn parse_rule(raw: &str) -> Result<Option<Rule>, ContextError> {
    let (negated, body) = match raw.trim().strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, raw.trim()),
    };
    let Some(normalized) = normalize_pattern(body) else {
        return Ok(None);
    };
    Ok(Some(Rule {
        pattern: compile(&normalized)?,
        negated,
    }))
}

fn compile(pattern: &str) -> Result<Pattern, ContextError> {
    Pattern::new(pattern).map_err(|e| ContextError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })
}

/// Strip `./`, leading and trailing `/`; empty patterns are dropped
fn normalize_pattern(raw: &str) -> Option<String> {
    let mut pattern = raw.trim();
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
    if pattern.is_empty() || pattern == "." {
        None
    } else {
        Some(pattern.to_string())
    }
}

/// `a/b/c` → `["a", "a/b", "a/b/c"]`
fn ancestors(relative: &Path) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(&part.to_string_lossy());
            out.push(current.clone());
        }
    }
    out
}

/// Conservative check that `dir` may hold a path matched by `pattern`
fn could_contain(pattern: &Pattern, dir_candidates: &[String]) -> bool {
    let Some(dir) = dir_candidates.last() else {
        return true;
    };
    let pattern = pattern.as_str();
    if pattern.starts_with("**") {
        return true;
    }
    let dir_depth = dir.split('/').count();
    let prefix: Vec<&str> = pattern.split('/').take(dir_depth).collect();
    if prefix.len() < dir_depth {
        return false;
    }
    if prefix.iter().any(|part| *part == "**") {
        return true;
    }
    Pattern::new(&prefix.join("/"))
        .map(|p| p.matches_with(dir, MATCH_OPTIONS))
        .unwrap_or(false)
}
