// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! ClickOnce manifest signing with `mage.exe`.

A deployment manifest (`.application`, `.vsto`) embeds the hash of the
application manifest (`.manifest`) it references, which in turn hashes the
application's binaries. So binaries are signed first, then application
manifests, then deployment manifests.
*/

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

const APPLICATION_MANIFEST_EXTENSIONS: &[&str] = &["manifest"];
const DEPLOYMENT_MANIFEST_EXTENSIONS: &[&str] = &["application", "vsto"];

/// Signs ClickOnce application and deployment manifests.
pub struct ClickOnceProvider {
    env: ToolEnvironment,
    certificate: CertificateSelection,
}

impl ClickOnceProvider {
    pub fn new(env: ToolEnvironment, certificate: CertificateSelection) -> Self {
        Self { env, certificate }
    }

    fn certificate_args(&self, invocation: &mut ToolInvocation) -> Result<(), SigningError> {
        match &self.certificate {
            CertificateSelection::File { path, password } => {
                invocation.arg("-CertFile").path_arg(path);
                if let Some(password) = password {
                    invocation.arg("-Password").arg(password);
                }
            }
            CertificateSelection::Thumbprint(thumbprint) => {
                invocation.arg("-CertHash").arg(thumbprint);
            }
            CertificateSelection::Auto | CertificateSelection::SubjectName(_) => {
                return Err(SigningError::UnsupportedCertificateSelection(
                    "mage",
                    self.certificate.describe(),
                ));
            }
        }

        Ok(())
    }

    /// Stamp publisher and application names into a deployment manifest.
    fn update_invocation(&self, path: &Path, options: &SignOptions) -> Option<ToolInvocation> {
        if !has_extension(path, DEPLOYMENT_MANIFEST_EXTENSIONS) {
            return None;
        }

        let publisher = options.publisher_name();
        let application = options.application_name();
        if publisher.is_none() && application.is_none() {
            return None;
        }

        let mut invocation = self.env.invocation(&self.env.tools.mage);
        invocation.arg("-Update").path_arg(path);

        if let Some(publisher) = publisher {
            invocation.arg("-Publisher").arg(publisher);
        }
        if let Some(application) = application {
            invocation.arg("-Name").arg(application);
        }

        Some(invocation)
    }

    fn sign_invocation(
        &self,
        path: &Path,
        options: &SignOptions,
    ) -> Result<ToolInvocation, SigningError> {
        let mut invocation = self.env.invocation(&self.env.tools.mage);
        invocation.arg("-Sign").path_arg(path);

        self.certificate_args(&mut invocation)?;

        if let Some(url) = options.timestamp_url() {
            invocation.arg("-TimeStampUri").arg(url.as_str());
        }

        Ok(invocation)
    }
}

impl SignatureProvider for ClickOnceProvider {
    fn name(&self) -> &'static str {
        "clickonce"
    }

    fn can_sign(&self, path: &Path) -> bool {
        has_extension(path, APPLICATION_MANIFEST_EXTENSIONS)
            || has_extension(path, DEPLOYMENT_MANIFEST_EXTENSIONS)
    }

    fn phase(&self, path: &Path) -> u8 {
        if has_extension(path, DEPLOYMENT_MANIFEST_EXTENSIONS) {
            2
        } else {
            1
        }
    }

    fn sign(&self, files: &[PathBuf], options: &SignOptions) -> Result<(), SigningError> {
        for path in files {
            let sign = self.sign_invocation(path, options)?;

            if let Some(update) = self.update_invocation(path, options) {
                self.env.run(&update)?;
            }

            self.env.run(&sign)?;
        }

        Ok(())
    }
}
