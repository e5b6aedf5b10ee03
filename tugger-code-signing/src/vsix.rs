// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! VSIX package signing with `OpenVsixSignTool`.

use {
    crate::{
        error::SigningError,
        key_backend::CertificateSelection,
        process::{ToolEnvironment, ToolInvocation},
        provider::{has_extension, SignatureProvider},
        sign_options::SignOptions,
    },
    std::path::{Path, PathBuf},
};

/// Signs Visual Studio extensions.
pub struct VsixProvider {
    env: ToolEnvironment,
    certificate: CertificateSelection,
}

impl VsixProvider {
    pub fn new(env: ToolEnvironment, certificate: CertificateSelection) -> Self {
        Self { env, certificate }
    }

    fn invocation(&self, path: &Path, options: &SignOptions) -> Result<ToolInvocation, SigningError> {
        let mut invocation = self.env.invocation(&self.env.tools.vsix_sign_tool);
        // A repacked VSIX still carries the signature parts of its last
        // signing. Without --force the tool refuses to replace them.
        invocation.arg("sign").arg("--force");

        match &self.certificate {
            CertificateSelection::File { path, password } => {
                invocation.arg("-c").path_arg(path);
                if let Some(password) = password {
                    invocation.arg("-p").arg(password);
                }
            }
            CertificateSelection::Thumbprint(thumbprint) => {
                invocation.arg("-s").arg(thumbprint);
            }
            CertificateSelection::Auto | CertificateSelection::SubjectName(_) => {
                return Err(SigningError::UnsupportedCertificateSelection(
                    "OpenVsixSignTool",
                    self.certificate.describe(),
                ));
            }
        }

        invocation.arg("-fd").arg(options.file_digest().as_str());

        if let Some(url) = options.timestamp_url() {
            invocation
                .arg("-t")
                .arg(url.as_str())
                .arg("-ta")
                .arg(options.timestamp_digest().as_str());
        }

        invocation.path_arg(path);

        Ok(invocation)
    }
}

impl SignatureProvider for VsixProvider {
    fn name(&self) -> &'static str {
        "vsix"
    }

    fn can_sign(&self, path: &Path) -> bool {
        has_extension(path, &["vsix"])
    }

    fn sign(&self, files: &[PathBuf], options: &SignOptions) -> Result<(), SigningError> {
        for path in files {
            self.env.run(&self.invocation(path, options)?)?;
        }

        Ok(())
    }
}
