// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NuGet package signing with `dotnet nuget sign`.

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

pub const NUGET_EXTENSIONS: &[&str] = &["nupkg", "snupkg"];

/// Signs NuGet packages with an author signature.
pub struct NuGetProvider {
    env: ToolEnvironment,
    certificate: CertificateSelection,
}

impl NuGetProvider {
    pub fn new(env: ToolEnvironment, certificate: CertificateSelection) -> Self {
        Self { env, certificate }
    }

    fn invocation(&self, path: &Path, options: &SignOptions) -> Result<ToolInvocation, SigningError> {
        let mut invocation = self.env.invocation(&self.env.tools.dotnet);
        invocation.arg("nuget").arg("sign").path_arg(path);

        match &self.certificate {
            CertificateSelection::File { path, password } => {
                invocation.arg("--certificate-path").path_arg(path);
                if let Some(password) = password {
                    invocation.arg("--certificate-password").arg(password);
                }
            }
            CertificateSelection::SubjectName(name) => {
                invocation.arg("--certificate-subject-name").arg(name);
            }
            CertificateSelection::Thumbprint(thumbprint) => {
                invocation.arg("--certificate-fingerprint").arg(thumbprint);
            }
            CertificateSelection::Auto => {
                return Err(SigningError::UnsupportedCertificateSelection(
                    "dotnet nuget sign",
                    self.certificate.describe(),
                ));
            }
        }

        invocation
            .arg("--hash-algorithm")
            .arg(options.file_digest().as_str());

        if let Some(url) = options.timestamp_url() {
            invocation
                .arg("--timestamper")
                .arg(url.as_str())
                .arg("--timestamp-hash-algorithm")
                .arg(options.timestamp_digest().as_str());
        }

        invocation.arg("--overwrite");

        Ok(invocation)
    }
}

impl SignatureProvider for NuGetProvider {
    fn name(&self) -> &'static str {
        "nuget"
    }

    fn can_sign(&self, path: &Path) -> bool {
        has_extension(path, NUGET_EXTENSIONS)
    }

    fn sign(&self, files: &[PathBuf], options: &SignOptions) -> Result<(), SigningError> {
        for path in files {
            self.env.run(&self.invocation(path, options)?)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{process::ToolSet, testutil::FakeToolRunner},
        std::sync::Arc,
    };

    #[test]
    fn dotnet_arguments() -> Result<(), SigningError> {
        let runner = Arc::new(FakeToolRunner::default());
        let provider = NuGetProvider::new(
            ToolEnvironment::new(ToolSet::default(), runner.clone()),
            CertificateSelection::Thumbprint("ABCDEF".into()),
        );

        let mut options = SignOptions::default();
        options.set_timestamp_url("http://timestamp.example.com")?;
        provider.sign(&[PathBuf::from("lib.nupkg")], &options)?;

        let invocations = runner.invocations();
        assert_eq!(invocations[0].program, PathBuf::from("dotnet"));
        assert_eq!(
            invocations[0].args_string(),
            "nuget sign lib.nupkg --certificate-fingerprint ABCDEF --hash-algorithm sha256 \
             --timestamper http://timestamp.example.com/ --timestamp-hash-algorithm sha256 \
             --overwrite"
        );

        Ok(())
    }

    #[test]
    fn automatic_selection_unsupported() {
        let runner = Arc::new(FakeToolRunner::default());
        let provider = NuGetProvider::new(
            ToolEnvironment::new(ToolSet::default(), runner.clone()),
            CertificateSelection::Auto,
        );

        assert!(matches!(
            provider.sign(&[PathBuf::from("lib.nupkg")], &SignOptions::default()),
            Err(SigningError::UnsupportedCertificateSelection(_, _))
        ));
        assert!(runner.invocations().is_empty());
    }
}
