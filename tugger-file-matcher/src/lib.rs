// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*!
Include/exclude file matching.

A [FileMatcher] holds include patterns and exclude patterns. A path matches
when it matches at least one include pattern and no exclude pattern. A
matcher without include patterns matches nothing: exclusions only narrow
what was included.

Patterns are glob patterns (as understood by the `glob` crate) relative to
the root being matched. Before compilation, brace groups are expanded (see
[expand_braces]) and `../` / `..\` segments are removed so a pattern cannot
escape the matching root. Matching is case-insensitive unless configured
otherwise.

Paths are matched in their `/` separated relative form. The separator is
only converted to the platform's separator when a match is resolved back to
a filesystem path (see [FileMatcher::match_directory]).
*/

mod brace;
pub use brace::{expand_braces, MAX_EXPANSIONS};

use {
    glob::{MatchOptions, Pattern},
    log::debug,
    std::path::{Component, Path, PathBuf},
    thiserror::Error,
};

#[derive(Debug, Error)]
pub enum MatcherError {
    #[error("invalid glob pattern {0}: {1}")]
    Pattern(String, glob::PatternError),

    #[error("brace expansion of {0} produces too many patterns")]
    TooManyExpansions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error walking directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Whether a string contains glob syntax.
pub fn is_glob_pattern(s: &str) -> bool {
    s.contains(|c| matches!(c, '*' | '?' | '[' | '{'))
}

/// Render a relative path with `/` separators.
pub fn relative_path_string(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(p) => Some(p.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Remove parent directory traversal segments from a pattern.
fn strip_parent_traversal(pattern: &str) -> String {
    let mut res = pattern.to_string();

    loop {
        let next = res.replace("../", "").replace("..\\", "");
        if next == res {
            break;
        }
        res = next;
    }

    let res = res.trim_start_matches("./");

    res.trim_start_matches('/').to_string()
}

/// Matches relative paths against include and exclude glob patterns.
#[derive(Clone, Debug)]
pub struct FileMatcher {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
    case_sensitive: bool,
}

impl Default for FileMatcher {
    fn default() -> Self {
        Self {
            includes: vec![],
            excludes: vec![],
            case_sensitive: false,
        }
    }
}

impl FileMatcher {
    /// Construct an instance from file list lines.
    ///
    /// Lines starting with `!` are exclude patterns. Blank lines and lines
    /// starting with `#` are ignored. Everything else is an include pattern.
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Result<Self, MatcherError> {
        let mut matcher = Self::default();

        for line in lines {
            matcher.add_line(line)?;
        }

        Ok(matcher)
    }

    /// Construct an instance from a file containing one pattern per line.
    pub fn from_file_list(path: impl AsRef<Path>) -> Result<Self, MatcherError> {
        let data = std::fs::read_to_string(path.as_ref())?;

        Self::from_lines(data.lines())
    }

    /// Set whether matching is case sensitive.
    ///
    /// Affects patterns registered before and after the call.
    pub fn set_case_sensitive(&mut self, value: bool) {
        self.case_sensitive = value;
    }

    fn compile(pattern: &str) -> Result<Vec<Pattern>, MatcherError> {
        expand_braces(pattern)?
            .iter()
            .map(|expanded| {
                let cleaned = strip_parent_traversal(expanded);
                Pattern::new(&cleaned).map_err(|e| MatcherError::Pattern(expanded.clone(), e))
            })
            .collect()
    }

    /// Register an include pattern.
    pub fn add_include(&mut self, pattern: &str) -> Result<(), MatcherError> {
        self.includes.extend(Self::compile(pattern)?);
        Ok(())
    }

    /// Register an exclude pattern.
    ///
    /// The pattern is given without its `!` prefix.
    pub fn add_exclude(&mut self, pattern: &str) -> Result<(), MatcherError> {
        self.excludes.extend(Self::compile(pattern)?);
        Ok(())
    }

    /// Register a single file list line.
    pub fn add_line(&mut self, line: &str) -> Result<(), MatcherError> {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            Ok(())
        } else if let Some(pattern) = line.strip_prefix('!') {
            self.add_exclude(pattern.trim())
        } else {
            self.add_include(line)
        }
    }

    /// Whether any include pattern is registered.
    pub fn has_includes(&self) -> bool {
        !self.includes.is_empty()
    }

    fn match_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: self.case_sensitive,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        }
    }

    /// Whether a `/` separated relative path matches.
    pub fn is_match(&self, relative_path: &str) -> bool {
        let path = relative_path.trim_start_matches("./");
        let options = self.match_options();

        self.includes
            .iter()
            .any(|p| p.matches_with(path, options))
            && !self
                .excludes
                .iter()
                .any(|p| p.matches_with(path, options))
    }

    /// Filter a virtual listing of `/` separated relative paths.
    pub fn match_paths<I, S>(&self, paths: I) -> Vec<S>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        paths
            .into_iter()
            .filter(|p| self.is_match(p.as_ref()))
            .collect()
    }

    /// Find files under a directory that match.
    ///
    /// Returned paths are `root` joined with the matched relative path. Results
    /// are in a stable, sorted order.
    pub fn match_directory(&self, root: impl AsRef<Path>) -> Result<Vec<PathBuf>, MatcherError> {
        let root = root.as_ref();

        if !self.has_includes() {
            return Ok(vec![]);
        }

        let mut res = vec![];

        for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(root) {
                Ok(p) => relative_path_string(p),
                Err(_) => continue,
            };

            if self.is_match(&relative) {
                debug!("{} matches file patterns", relative);
                res.push(root.join(relative.split('/').collect::<PathBuf>()));
            }
        }

        Ok(res)
    }
}
