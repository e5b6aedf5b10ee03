// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `.appinstaller` files.
//!
//! These are not signed. They reference a package by publisher, which must
//! match the publisher of the signed package.

use {
    crate::{
        error::SigningError,
        package_manifest::{rewrite_publisher_file, APP_INSTALLER_PUBLISHER_ELEMENTS},
        provider::{has_extension, SignatureProvider},
        sign_options::SignOptions,
    },
    log::{info, warn},
    std::path::{Path, PathBuf},
};

/// Points `.appinstaller` files at the run's publisher identity.
pub struct AppInstallerProvider {
    publisher: Option<String>,
}

impl AppInstallerProvider {
    pub fn new(publisher: Option<String>) -> Self {
        Self { publisher }
    }
}

impl SignatureProvider for AppInstallerProvider {
    fn name(&self) -> &'static str {
        "appinstaller"
    }

    fn can_sign(&self, path: &Path) -> bool {
        has_extension(path, &["appinstaller"])
    }

    fn sign(&self, files: &[PathBuf], _options: &SignOptions) -> Result<(), SigningError> {
        for path in files {
            let publisher = match self.publisher.as_deref() {
                Some(publisher) => publisher,
                None => {
                    warn!(
                        "no publisher identity available; leaving {} unchanged",
                        path.display()
                    );
                    continue;
                }
            };

            let count =
                rewrite_publisher_file(path, APP_INSTALLER_PUBLISHER_ELEMENTS, publisher)?;
            info!(
                "set publisher of {} to {} ({} elements)",
                path.display(),
                publisher,
                count
            );
        }

        Ok(())
    }
}
