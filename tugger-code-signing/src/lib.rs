// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Recursive code signing of Windows artifacts.

This crate signs files and, recursively, the files inside the containers
that hold them: zip archives, VSIX extensions, APPX packages and bundles,
cabinet files and NuGet packages. Containers are extracted to temporary
directories, their content is signed, and they are repacked in place.
Formats that are signed as a whole, like NuGet packages and VSIX
extensions, are signed again after repacking.

Actual signatures are produced by external tools (`signtool.exe`,
`dotnet nuget sign`, `mage.exe`, `OpenVsixSignTool`) through
[SignatureProvider] implementations. [SigningEngine] holds what is shared
by a run: options, providers, external tools and a [SignedFileTracker]
ensuring every file is signed at most once. [AggregatingSigner] walks
files and containers. [Signer] resolves user inputs and outputs and runs
the work on a thread pool bounded by the configured concurrency.
*/

mod aggregate;
pub use aggregate::*;
mod app_installer;
pub use app_installer::*;
mod clickonce;
pub use clickonce::*;
mod container;
pub use container::*;
mod error;
pub use error::*;
mod file_identity;
pub use file_identity::*;
mod key_backend;
pub use key_backend::*;
mod nuget;
pub use nuget::*;
mod package_manifest;
pub use package_manifest::*;
mod process;
pub use process::*;
mod provider;
pub use provider::*;
mod sign_options;
pub use sign_options::*;
mod signed_files;
pub use signed_files::*;
mod signing;
pub use signing::*;
mod signtool;
pub use signtool::*;
mod vsix;
pub use vsix::*;
mod zip_archive;
pub use zip_archive::*;

#[cfg(test)]
mod testutil;
