// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Authenticode signing with `signtool.exe`. */

use {
    crate::{
        error::SigningError,
        key_backend::CertificateSelection,
        process::{ToolEnvironment, ToolInvocation},
        provider::{has_extension, SignatureProvider},
        sign_options::{DigestAlgorithm, SignOptions},
    },
    log::debug,
    std::{
        io::Read,
        path::{Path, PathBuf},
        time::Duration,
    },
    url::Url,
};

/// Extensions of files signed with Authenticode.
pub const AUTHENTICODE_EXTENSIONS: &[&str] = &[
    "appx",
    "appxbundle",
    "cab",
    "cat",
    "cdxml",
    "dll",
    "eappx",
    "eappxbundle",
    "emsix",
    "emsixbundle",
    "exe",
    "msi",
    "msix",
    "msixbundle",
    "msm",
    "msp",
    "mst",
    "ocx",
    "ps1",
    "ps1xml",
    "psd1",
    "psm1",
    "stl",
    "sys",
    "vbs",
    "vxd",
    "winmd",
];

/// Compound file binary magic, used by MSI and related formats.
const CFB_MAGIC_NUMBER: [u8; 8] = [0xd0, 0xcf, 0x11, 0xe0, 0xa1, 0xb1, 0x1a, 0xe1];

/// Whether the bytes passed in look like a file header for a format that is signable.
///
/// The passed buffer must be at least 16 bytes long.
///
/// This could yield false positives.
#[allow(clippy::if_same_then_else)]
pub fn is_signable_binary_header(data: &[u8]) -> bool {
    if data.len() < 16 {
        false
    // DOS header.
    } else if data[0] == 0x4d && data[1] == 0x5a {
        true
    } else {
        data[0..CFB_MAGIC_NUMBER.len()] == CFB_MAGIC_NUMBER
    }
}

/// Determine whether a given filesystem path has a signable binary header.
pub fn is_file_signable(path: impl AsRef<Path>) -> Result<bool, SigningError> {
    let path = path.as_ref();

    if path.metadata()?.len() < 16 {
        return Ok(false);
    }

    let mut fh = std::fs::File::open(path)?;
    let mut buffer: [u8; 16] = [0; 16];
    fh.read_exact(&mut buffer)?;

    Ok(is_signable_binary_header(&buffer))
}

/// Represents an invocation of `signtool.exe sign` to sign some files.
#[derive(Clone, Debug)]
pub struct SigntoolSign {
    certificate: CertificateSelection,
    verbose: bool,
    description: Option<String>,
    description_url: Option<Url>,
    file_digest_algorithm: Option<DigestAlgorithm>,
    timestamp_server: Option<(Url, DigestAlgorithm)>,
    sign_files: Vec<PathBuf>,
}

impl SigntoolSign {
    /// Construct a new instance using a specified signing certificate.
    pub fn new(certificate: CertificateSelection) -> Self {
        Self {
            certificate,
            verbose: false,
            description: None,
            description_url: None,
            file_digest_algorithm: None,
            timestamp_server: None,
            sign_files: vec![],
        }
    }

    /// Construct an instance configured from run options.
    pub fn from_options(certificate: CertificateSelection, options: &SignOptions) -> Self {
        let mut sign = Self::new(certificate);

        sign.file_digest_algorithm(options.file_digest());

        if let Some(description) = options.description() {
            sign.description(description);
        }
        if let Some(url) = options.description_url() {
            sign.description_url(url.clone());
        }
        if let Some(url) = options.timestamp_url() {
            sign.timestamp_server(url.clone(), options.timestamp_digest());
        }

        sign
    }

    /// Run signtool in verbose mode.
    ///
    /// Activates the `/v` flag.
    pub fn verbose(&mut self) -> &mut Self {
        self.verbose = true;
        self
    }

    /// Set the description of the content to be signed.
    ///
    /// This is passed into the `/d` argument.
    pub fn description(&mut self, description: impl ToString) -> &mut Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set the URL describing the content to be signed.
    ///
    /// This is passed into the `/du` argument.
    pub fn description_url(&mut self, url: Url) -> &mut Self {
        self.description_url = Some(url);
        self
    }

    /// Set the file digest algorithm to use.
    ///
    /// This is passed into the `/fd` argument.
    pub fn file_digest_algorithm(&mut self, algorithm: DigestAlgorithm) -> &mut Self {
        self.file_digest_algorithm = Some(algorithm);
        self
    }

    /// Set the RFC 3161 timestamp server and its digest algorithm.
    pub fn timestamp_server(&mut self, url: Url, algorithm: DigestAlgorithm) -> &mut Self {
        self.timestamp_server = Some((url, algorithm));
        self
    }

    /// Mark a file path as to be signed.
    pub fn sign_file(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.sign_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Describe the `signtool sign` invocation with requested options.
    pub fn invocation(&self, signtool: &Path, timeout: Duration) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(signtool, timeout);
        invocation.arg("sign");

        if self.verbose {
            invocation.arg("/v");
        }

        match &self.certificate {
            CertificateSelection::Auto => {
                invocation.arg("/a");
            }
            CertificateSelection::File { path, password } => {
                invocation.arg("/f").path_arg(path);
                if let Some(password) = password {
                    invocation.arg("/p").arg(password);
                }
            }
            CertificateSelection::SubjectName(sn) => {
                invocation.arg("/n").arg(sn);
            }
            CertificateSelection::Thumbprint(thumbprint) => {
                invocation.arg("/sha1").arg(thumbprint);
            }
        }

        if let Some(description) = &self.description {
            invocation.arg("/d").arg(description);
        }

        if let Some(url) = &self.description_url {
            invocation.arg("/du").arg(url.as_str());
        }

        if let Some(algorithm) = &self.file_digest_algorithm {
            invocation.arg("/fd").arg(algorithm.as_str());
        }

        if let Some((url, algorithm)) = &self.timestamp_server {
            invocation
                .arg("/tr")
                .arg(url.as_str())
                .arg("/td")
                .arg(algorithm.as_str());
        }

        for path in &self.sign_files {
            invocation.path_arg(path);
        }

        invocation
    }
}

/// Signs PE images, scripts, installers and packages with `signtool`.
pub struct AuthenticodeProvider {
    env: ToolEnvironment,
    certificate: CertificateSelection,
}

impl AuthenticodeProvider {
    pub fn new(env: ToolEnvironment, certificate: CertificateSelection) -> Self {
        Self { env, certificate }
    }
}

impl SignatureProvider for AuthenticodeProvider {
    fn name(&self) -> &'static str {
        "authenticode"
    }

    fn can_sign(&self, path: &Path) -> bool {
        if has_extension(path, AUTHENTICODE_EXTENSIONS) {
            return true;
        }

        match is_file_signable(path) {
            Ok(signable) => signable,
            Err(e) => {
                debug!("unable to sniff {}: {}", path.display(), e);
                false
            }
        }
    }

    fn sign(&self, files: &[PathBuf], options: &SignOptions) -> Result<(), SigningError> {
        if files.is_empty() {
            return Ok(());
        }

        let mut sign = SigntoolSign::from_options(self.certificate.clone(), options);
        if self.env.tools.verbose {
            sign.verbose();
        }
        for path in files {
            sign.sign_file(path);
        }

        self.env.run(&sign.invocation(&self.env.tools.signtool, self.env.tools.timeout))
    }
}
