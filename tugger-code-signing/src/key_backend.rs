// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Access to the signing certificate and key.

Signatures are produced by external tools. They only need to be told which
key to use, expressed as a [CertificateSelection]. The public certificate,
when available, provides the publisher identity stamped into package
manifests.
*/

use {
    crate::{error::SigningError, sign_options::SignOptions},
    std::path::{Path, PathBuf},
    x509_certificate::CapturedX509Certificate,
};

/// How external signing tools select the signing key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CertificateSelection {
    /// Let the tool select the best available certificate.
    Auto,

    /// A certificate and key stored in a file, usually a `.pfx`.
    File {
        path: PathBuf,
        password: Option<String>,
    },

    /// A certificate in the user's store, matched by subject name.
    SubjectName(String),

    /// A certificate in the user's store, matched by its SHA-1 thumbprint.
    Thumbprint(String),
}

impl Default for CertificateSelection {
    fn default() -> Self {
        Self::Auto
    }
}

impl CertificateSelection {
    pub fn file(path: impl AsRef<Path>, password: Option<String>) -> Self {
        Self::File {
            path: path.as_ref().to_path_buf(),
            password,
        }
    }

    /// Short description for error messages. Never includes the password.
    pub fn describe(&self) -> String {
        match self {
            Self::Auto => "automatic".to_string(),
            Self::File { path, .. } => format!("file {}", path.display()),
            Self::SubjectName(name) => format!("subject {}", name),
            Self::Thumbprint(thumbprint) => format!("thumbprint {}", thumbprint),
        }
    }
}

/// A source of the signing certificate and key.
pub trait SigningKeyBackend: Send + Sync {
    /// The public signing certificate, if known.
    fn certificate(&self) -> Option<&CapturedX509Certificate>;

    /// How tools should locate the private key.
    fn key_handle(&self) -> &CertificateSelection;
}

/// A backend using certificates available on the local machine.
#[derive(Clone, Debug, Default)]
pub struct LocalKeyBackend {
    certificate: Option<CapturedX509Certificate>,
    selection: CertificateSelection,
}

impl LocalKeyBackend {
    pub fn new(selection: CertificateSelection) -> Self {
        Self {
            certificate: None,
            selection,
        }
    }

    /// Attach the public certificate from PEM data.
    pub fn set_certificate_pem(&mut self, data: impl AsRef<[u8]>) -> Result<(), SigningError> {
        let cert = CapturedX509Certificate::from_pem(data)
            .map_err(|e| SigningError::Certificate(format!("{:?}", e)))?;
        self.certificate = Some(cert);

        Ok(())
    }

    /// Attach the public certificate from a PEM file.
    pub fn set_certificate_pem_file(&mut self, path: impl AsRef<Path>) -> Result<(), SigningError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            SigningError::Certificate(format!("reading {}: {}", path.display(), e))
        })?;

        self.set_certificate_pem(data)
    }
}

impl SigningKeyBackend for LocalKeyBackend {
    fn certificate(&self) -> Option<&CapturedX509Certificate> {
        self.certificate.as_ref()
    }

    fn key_handle(&self) -> &CertificateSelection {
        &self.selection
    }
}

/// Resolve the publisher identity written into package manifests.
///
/// An explicit publisher name wins. Otherwise the subject of the backend's
/// certificate is used.
pub fn resolve_publisher(
    options: &SignOptions,
    backend: &dyn SigningKeyBackend,
) -> Result<Option<String>, SigningError> {
    if let Some(publisher) = options.publisher_name() {
        return Ok(Some(publisher.to_string()));
    }

    match backend.certificate() {
        Some(cert) => {
            let subject = cert
                .subject_name()
                .user_friendly_str()
                .map_err(|e| SigningError::Certificate(format!("{:?}", e)))?;

            Ok(if subject.is_empty() {
                None
            } else {
                Some(subject)
            })
        }
        None => Ok(None),
    }
}
