// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use {
    crate::container::ContainerKind,
    std::{path::PathBuf, time::Duration},
    thiserror::Error,
    tugger_file_matcher::MatcherError,
};

/// Unified error type for signing operations.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("error walking directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("file matching error: {0}")]
    Matcher(#[from] MatcherError),

    #[error("error parsing XML: {0}")]
    XmlRead(#[from] xml::reader::Error),

    #[error("error writing XML: {0}")]
    XmlWrite(#[from] xml::writer::Error),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("bad URL {0}: {1}")]
    BadUrl(String, url::ParseError),

    #[error("unknown digest algorithm: {0}")]
    UnknownDigestAlgorithm(String),

    #[error("base directory does not exist or is not a directory: {0}")]
    BadBaseDirectory(PathBuf),

    #[error("glob patterns must be relative to the base directory: {0}")]
    RootedGlob(String),

    #[error("input is a directory; use a glob pattern to select files: {0}")]
    InputIsDirectory(PathBuf),

    #[error("multiple inputs would be written to the same output file: {0}")]
    DuplicateOutput(PathBuf),

    #[error("input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("no input files matched")]
    NoInputs,

    #[error("{kind:?} container {path} is in state {state}; cannot {operation}")]
    ContainerInvalidState {
        path: PathBuf,
        kind: ContainerKind,
        state: &'static str,
        operation: &'static str,
    },

    #[error("archive entry escapes extraction directory: {0}")]
    ArchiveEntryEscapes(String),

    #[error("package manifest not found: {0}")]
    ManifestNotFound(PathBuf),

    #[error("failed to spawn {0}: {1}")]
    ToolSpawn(PathBuf, std::io::Error),

    #[error("{program} exited with {code:?}")]
    ToolFailed {
        program: PathBuf,
        code: Option<i32>,
        output: String,
    },

    #[error("{0} did not finish within {1:?}")]
    ToolTimeout(PathBuf, Duration),

    #[error("unable to terminate {0}: {1}")]
    ToolKill(PathBuf, std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0} does not support certificate selection {1}")]
    UnsupportedCertificateSelection(&'static str, String),

    #[error("error reading certificate: {0}")]
    Certificate(String),

    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl SigningError {
    /// Whether the error stems from invalid user configuration.
    ///
    /// Configuration errors are detected before any signing starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidOption(_)
                | Self::BadUrl(_, _)
                | Self::UnknownDigestAlgorithm(_)
                | Self::BadBaseDirectory(_)
                | Self::RootedGlob(_)
                | Self::InputIsDirectory(_)
                | Self::DuplicateOutput(_)
                | Self::Matcher(_)
                | Self::Certificate(_)
        )
    }

    /// Whether the error means requested inputs could not be found.
    pub fn is_input_missing(&self) -> bool {
        matches!(self, Self::InputNotFound(_) | Self::NoInputs)
    }

    /// Whether the error must stop the entire run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ToolKill(_, _))
    }
}
