// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Settings for a signing run.

use {
    crate::error::SigningError,
    std::{fmt::Formatter, num::NonZeroUsize},
    url::Url,
};

/// Default number of top-level inputs signed concurrently.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Digest algorithms accepted for file and time-stamp digests.
pub const SUPPORTED_DIGESTS: &[&str] = &["sha256", "sha384", "sha512"];

/// A digest algorithm.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Default for DigestAlgorithm {
    fn default() -> Self {
        Self::Sha256
    }
}

impl DigestAlgorithm {
    /// The lowercase name of the algorithm, as understood by signing tools.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

impl std::fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for DigestAlgorithm {
    type Error = SigningError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(SigningError::UnknownDigestAlgorithm(s.to_string())),
        }
    }
}

fn parse_url(value: &str) -> Result<Url, SigningError> {
    let url = Url::parse(value).map_err(|e| SigningError::BadUrl(value.to_string(), e))?;

    if matches!(url.scheme(), "http" | "https") {
        Ok(url)
    } else {
        Err(SigningError::InvalidOption(format!(
            "URL must use http or https: {}",
            value
        )))
    }
}

/// Options controlling how files are signed.
///
/// Instances are built once per run and shared read-only by every signer.
#[derive(Clone, Debug)]
pub struct SignOptions {
    application_name: Option<String>,
    publisher_name: Option<String>,
    description: Option<String>,
    description_url: Option<Url>,
    file_digest: DigestAlgorithm,
    timestamp_url: Option<Url>,
    timestamp_digest: DigestAlgorithm,
    max_concurrency: NonZeroUsize,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            application_name: None,
            publisher_name: None,
            description: None,
            description_url: None,
            file_digest: DigestAlgorithm::default(),
            timestamp_url: None,
            timestamp_digest: DigestAlgorithm::default(),
            max_concurrency: NonZeroUsize::new(DEFAULT_MAX_CONCURRENCY)
                .unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl SignOptions {
    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    pub fn set_application_name(&mut self, value: impl ToString) {
        self.application_name = Some(value.to_string());
    }

    /// Publisher name used for ClickOnce and package identities.
    pub fn publisher_name(&self) -> Option<&str> {
        self.publisher_name.as_deref()
    }

    pub fn set_publisher_name(&mut self, value: impl ToString) {
        self.publisher_name = Some(value.to_string());
    }

    /// Description of the signed content.
    ///
    /// Falls back to the application name when no description was set.
    pub fn description(&self) -> Option<&str> {
        self.description
            .as_deref()
            .or(self.application_name.as_deref())
    }

    pub fn set_description(&mut self, value: impl ToString) {
        self.description = Some(value.to_string());
    }

    pub fn description_url(&self) -> Option<&Url> {
        self.description_url.as_ref()
    }

    pub fn set_description_url(&mut self, value: &str) -> Result<(), SigningError> {
        self.description_url = Some(parse_url(value)?);
        Ok(())
    }

    pub fn file_digest(&self) -> DigestAlgorithm {
        self.file_digest
    }

    pub fn set_file_digest(&mut self, value: DigestAlgorithm) {
        self.file_digest = value;
    }

    /// URL of an RFC 3161 time-stamp server.
    pub fn timestamp_url(&self) -> Option<&Url> {
        self.timestamp_url.as_ref()
    }

    pub fn set_timestamp_url(&mut self, value: &str) -> Result<(), SigningError> {
        self.timestamp_url = Some(parse_url(value)?);
        Ok(())
    }

    pub fn timestamp_digest(&self) -> DigestAlgorithm {
        self.timestamp_digest
    }

    pub fn set_timestamp_digest(&mut self, value: DigestAlgorithm) {
        self.timestamp_digest = value;
    }

    /// Maximum number of signing operations in flight.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency.get()
    }

    pub fn set_max_concurrency(&mut self, value: usize) -> Result<(), SigningError> {
        self.max_concurrency = NonZeroUsize::new(value).ok_or_else(|| {
            SigningError::InvalidOption("max concurrency must be at least 1".into())
        })?;
        Ok(())
    }
}
