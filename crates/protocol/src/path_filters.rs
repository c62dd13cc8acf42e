use serde::{Deserialize, Serialize};

pub const DEFAULT_SOURCE_EXTENSIONS: &[&str] = &[".py", ".js", ".ts", ".rb", ".java", ".go", ".md"];

/// Decides which repository paths are worth fetching.
///
/// Applied before any content is downloaded, so it doubles as a cost control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFilter {
    /// Accepted file suffixes; empty accepts every file.
    pub extensions: Vec<String>,
    /// Directory prefixes to keep; empty keeps everything.
    pub include: Vec<String>,
    /// Directory prefixes to drop; wins over `include`.
    pub exclude: Vec<String>,
    /// Substring or glob the path must match.
    pub file_pattern: Option<String>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_SOURCE_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            include: Vec::new(),
            exclude: Vec::new(),
            file_pattern: None,
        }
    }
}

impl PathFilter {
    /// A filter that accepts every path.
    pub fn allow_all() -> Self {
        Self {
            extensions: Vec::new(),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.extensions.iter().any(|ext| !ext.trim().is_empty())
            || prefixes(&self.include).next().is_some()
            || prefixes(&self.exclude).next().is_some()
            || self.pattern().is_some()
    }

    pub fn allows(&self, rel_path: &str) -> bool {
        let path = rel_path.replace('\\', "/");
        self.suffix_allowed(&path)
            && self.include_allowed(&path)
            && !prefixes(&self.exclude).any(|prefix| under_prefix(&path, &prefix))
            && self.pattern_allowed(&path)
    }

    fn suffix_allowed(&self, path: &str) -> bool {
        let mut suffixes = self
            .extensions
            .iter()
            .map(|ext| ext.trim())
            .filter(|ext| !ext.is_empty())
            .peekable();
        suffixes.peek().is_none() || suffixes.any(|ext| path.ends_with(ext))
    }

    fn include_allowed(&self, path: &str) -> bool {
        let mut include = prefixes(&self.include).peekable();
        include.peek().is_none() || include.any(|prefix| under_prefix(path, &prefix))
    }

    fn pattern(&self) -> Option<&str> {
        self.file_pattern
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    fn pattern_allowed(&self, path: &str) -> bool {
        match self.pattern() {
            None => true,
            Some(pattern) if pattern.contains(['*', '?']) => glob::Pattern::new(pattern)
                .map(|compiled| compiled.matches(path))
                .unwrap_or(false),
            Some(pattern) => path.contains(pattern),
        }
    }
}

/// Normalized, non-empty directory prefixes (`./src/` becomes `src`).
fn prefixes(raw: &[String]) -> impl Iterator<Item = String> + '_ {
    raw.iter().filter_map(|value| {
        let mut value = value.trim().replace('\\', "/");
        while let Some(rest) = value.strip_prefix("./") {
            value = rest.to_string();
        }
        let value = value.trim_matches('/');
        (!value.is_empty() && value != ".").then(|| value.to_string())
    })
}

fn under_prefix(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
