// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signature providers.

A [SignatureProvider] knows how to sign some kinds of files, usually by
invoking an external tool. A [ProviderSet] holds the providers of a run and
dispatches each file to the first provider claiming it.
*/

use {
    crate::{
        app_installer::AppInstallerProvider, clickonce::ClickOnceProvider, error::SigningError,
        key_backend::CertificateSelection, nuget::NuGetProvider, process::ToolEnvironment,
        sign_options::SignOptions, signtool::AuthenticodeProvider, vsix::VsixProvider,
    },
    std::{
        path::{Path, PathBuf},
        sync::Arc,
    },
};

/// A capability to sign some files.
pub trait SignatureProvider: Send + Sync {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Whether this provider signs the given file.
    fn can_sign(&self, path: &Path) -> bool;

    /// Ordering of files within one directory level.
    ///
    /// Files of a lower phase are signed before files of a higher phase.
    fn phase(&self, _path: &Path) -> u8 {
        0
    }

    /// Sign files in place.
    fn sign(&self, files: &[PathBuf], options: &SignOptions) -> Result<(), SigningError>;
}

/// Whether a path has one of the given lowercase extensions.
pub fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|e| {
            let e = e.to_string_lossy().to_lowercase();
            extensions.contains(&e.as_str())
        })
        .unwrap_or(false)
}

/// An ordered collection of providers.
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: Vec<Arc<dyn SignatureProvider>>,
}

impl ProviderSet {
    /// The providers for the standard tool chain.
    ///
    /// More specific providers are registered first, so they take precedence
    /// over Authenticode for formats both could handle.
    pub fn with_default_providers(env: &ToolEnvironment, selection: &CertificateSelection) -> Self {
        let mut set = Self::default();

        set.register(AppInstallerProvider::new(env.publisher.clone()));
        set.register(ClickOnceProvider::new(env.clone(), selection.clone()));
        set.register(VsixProvider::new(env.clone(), selection.clone()));
        set.register(NuGetProvider::new(env.clone(), selection.clone()));
        set.register(AuthenticodeProvider::new(env.clone(), selection.clone()));

        set
    }

    pub fn register(&mut self, provider: impl SignatureProvider + 'static) {
        self.providers.push(Arc::new(provider));
    }

    pub fn register_arc(&mut self, provider: Arc<dyn SignatureProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// The first registered provider claiming a file.
    pub fn find(&self, path: &Path) -> Option<&dyn SignatureProvider> {
        self.providers
            .iter()
            .find(|p| p.can_sign(path))
            .map(|p| p.as_ref())
    }
}
