// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Canonical file identities.

use std::{
    ffi::OsString,
    hash::{Hash, Hasher},
    path::{Component, Path, PathBuf},
};

/// How two canonical paths are compared.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PathComparison {
    /// Paths differing only in case are the same file.
    CaseInsensitive,
    /// Paths must match exactly.
    CaseSensitive,
}

impl Default for PathComparison {
    /// Case-insensitive on Windows, case-sensitive elsewhere.
    fn default() -> Self {
        if cfg!(windows) {
            Self::CaseInsensitive
        } else {
            Self::CaseSensitive
        }
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut res = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(res.components().next_back(), Some(Component::Normal(_))) {
                    res.pop();
                } else if !res.has_root() {
                    res.push("..");
                }
            }
            c => res.push(c.as_os_str()),
        }
    }

    res
}

/// An absolute, normalized file path used as a deduplication key.
///
/// Equality and hashing use the raw path, lowercased when the
/// [PathComparison] given at construction is case-insensitive.
#[derive(Clone, Debug)]
pub struct FileIdentity {
    path: PathBuf,
    key: OsString,
}

impl FileIdentity {
    /// Resolve the identity of a path.
    ///
    /// Relative paths are resolved against the current directory.
    pub fn new(path: impl AsRef<Path>, comparison: PathComparison) -> std::io::Result<Self> {
        let path = path.as_ref();

        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let path = normalize_path(&absolute);

        let key = match comparison {
            PathComparison::CaseSensitive => path.as_os_str().to_os_string(),
            PathComparison::CaseInsensitive => match path.to_str() {
                Some(s) => OsString::from(s.to_lowercase()),
                None => path.as_os_str().to_ascii_lowercase(),
            },
        };

        Ok(Self { path, key })
    }

    /// The canonical path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PartialEq for FileIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for FileIdentity {}

impl Hash for FileIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}
