// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Archives whose contents are signed.

A [Container] wraps a single archive file. Opening it extracts the content
into a private temporary directory, where signing mutates files in place.
Saving repacks the directory and replaces the archive. Disposing removes the
temporary directory.

Which [ContainerKind] a file is depends only on its extension. See
[ContainerKind::classify].
*/

use {
    crate::{
        error::SigningError,
        package_manifest::{rewrite_publisher_file, APPX_MANIFEST, APPX_PUBLISHER_ELEMENTS},
        process::ToolEnvironment,
        zip_archive::{extract_zip_file, write_directory_zip_file},
    },
    log::{debug, info, warn},
    std::path::{Path, PathBuf},
    tempfile::TempDir,
    tugger_file_matcher::relative_path_string,
};

/// Signature entry of a signed NuGet package.
pub const NUGET_SIGNATURE_ENTRY: &str = ".signature.p7s";

/// Files of an unpacked APPX package regenerated by `makeappx pack`.
const APPX_FOOTPRINT_FILES: &[&str] = &[
    "AppxBlockMap.xml",
    "AppxSignature.p7x",
    "[Content_Types].xml",
    "AppxMetadata/CodeIntegrity.cat",
];

/// Files of an unpacked APPX bundle regenerated by `makeappx bundle`.
const APPX_BUNDLE_FOOTPRINT_FILES: &[&str] = &[
    "AppxBlockMap.xml",
    "AppxSignature.p7x",
    "[Content_Types].xml",
    "AppxMetadata/AppxBundleManifest.xml",
];

/// The archive formats treated as containers.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ContainerKind {
    /// Plain zip and zip-based formats without dedicated handling.
    Zip,
    /// NuGet package.
    NuGet,
    /// APPX or MSIX package.
    Appx,
    /// APPX or MSIX bundle.
    AppxBundle,
    /// Windows cabinet.
    Cab,
    /// Windows Installer database.
    Msi,
}

impl ContainerKind {
    /// Determine the container kind of a file from its extension.
    ///
    /// Returns `None` when the file is not a container. File content is not
    /// consulted.
    pub fn classify(path: impl AsRef<Path>) -> Option<Self> {
        let extension = lowercase_extension(path.as_ref())?;

        match extension.as_str() {
            "appxbundle" | "eappxbundle" | "emsixbundle" | "msixbundle" => Some(Self::AppxBundle),
            "appx" | "eappx" | "emsix" | "msix" => Some(Self::Appx),
            "nupkg" | "snupkg" => Some(Self::NuGet),
            "appxupload" | "msixupload" | "vsix" | "zip" | "clickonce" => Some(Self::Zip),
            "cab" => Some(Self::Cab),
            "msi" => Some(Self::Msi),
            _ => None,
        }
    }

    /// Whether the container file itself is signed after its content.
    ///
    /// Of the zip-based formats only VSIX carries a package signature.
    pub fn participates_in_container_signing(&self, path: &Path) -> bool {
        match self {
            Self::NuGet | Self::Appx | Self::AppxBundle | Self::Cab | Self::Msi => true,
            Self::Zip => lowercase_extension(path).as_deref() == Some("vsix"),
        }
    }

    /// Whether content is extracted when opening.
    pub fn is_extractable(&self) -> bool {
        !matches!(self, Self::Msi)
    }
}

fn lowercase_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum ContainerState {
    Unopened,
    Opened,
    Closed,
}

impl ContainerState {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::Opened => "opened",
            Self::Closed => "closed",
        }
    }
}

/// An archive file being signed.
#[derive(Debug)]
pub struct Container {
    path: PathBuf,
    kind: ContainerKind,
    state: ContainerState,
    temp_dir: Option<TempDir>,
}

impl Container {
    pub fn new(path: impl AsRef<Path>, kind: ContainerKind) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            kind,
            state: ContainerState::Unopened,
            temp_dir: None,
        }
    }

    /// Construct an instance if the path is classified as a container.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();

        ContainerKind::classify(path).map(|kind| Self::new(path, kind))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.state == ContainerState::Opened
    }

    /// The directory holding extracted content while open.
    pub fn root(&self) -> Option<&Path> {
        match self.state {
            ContainerState::Opened => self.temp_dir.as_ref().map(|td| td.path()),
            _ => None,
        }
    }

    fn invalid_state(&self, operation: &'static str) -> SigningError {
        SigningError::ContainerInvalidState {
            path: self.path.clone(),
            kind: self.kind,
            state: self.state.as_str(),
            operation,
        }
    }

    fn require_root(&self, operation: &'static str) -> Result<&Path, SigningError> {
        self.root().ok_or_else(|| self.invalid_state(operation))
    }

    /// Extract the archive into a fresh temporary directory.
    pub fn open(&mut self, env: &ToolEnvironment) -> Result<(), SigningError> {
        if self.state == ContainerState::Opened {
            return Err(self.invalid_state("open"));
        }
        env.cancellation.check()?;

        // Dropping the directory on error removes partial extractions.
        let temp_dir = tempfile::Builder::new()
            .prefix("tugger-sign-")
            .tempdir()?;
        let dest = temp_dir.path();

        info!("opening {} into {}", self.path.display(), dest.display());

        match self.kind {
            ContainerKind::Zip | ContainerKind::NuGet => {
                extract_zip_file(&self.path, dest)?;
            }
            ContainerKind::Appx => {
                self.makeappx_extract(env, "unpack", dest)?;
                self.apply_publisher(env, dest)?;
            }
            ContainerKind::AppxBundle => {
                self.makeappx_extract(env, "unbundle", dest)?;
            }
            ContainerKind::Cab => {
                let mut invocation = env.invocation(&env.tools.expand);
                invocation
                    .path_arg(&self.path)
                    .arg("-F:*")
                    .path_arg(dest);
                env.run(&invocation)?;
            }
            ContainerKind::Msi => {
                debug!("{} content is not extracted", self.path.display());
            }
        }

        self.temp_dir = Some(temp_dir);
        self.state = ContainerState::Opened;

        Ok(())
    }

    fn makeappx_extract(
        &self,
        env: &ToolEnvironment,
        command: &str,
        dest: &Path,
    ) -> Result<(), SigningError> {
        let mut invocation = env.invocation(&env.tools.makeappx);
        invocation
            .arg(command)
            .arg("/p")
            .path_arg(&self.path)
            .arg("/d")
            .path_arg(dest)
            .arg("/o");

        env.run(&invocation)
    }

    fn apply_publisher(&self, env: &ToolEnvironment, dest: &Path) -> Result<(), SigningError> {
        let publisher = match &env.publisher {
            Some(publisher) => publisher,
            None => {
                warn!(
                    "no publisher identity available; leaving {} manifest unchanged",
                    self.path.display()
                );
                return Ok(());
            }
        };

        let manifest = dest.join(APPX_MANIFEST);
        if !manifest.is_file() {
            return Err(SigningError::ManifestNotFound(manifest));
        }

        let count = rewrite_publisher_file(&manifest, APPX_PUBLISHER_ELEMENTS, publisher)?;
        info!(
            "set publisher of {} to {} ({} elements)",
            self.path.display(),
            publisher,
            count
        );

        Ok(())
    }

    /// All files under the extraction root, in sorted order.
    pub fn files(&self) -> Result<Vec<PathBuf>, SigningError> {
        let root = self.require_root("enumerate files")?;

        let mut res = vec![];
        for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
            let entry = entry?;

            if entry.file_type().is_file() {
                res.push(entry.into_path());
            }
        }

        Ok(res)
    }

    /// Path of an extracted file relative to the extraction root, `/` separated.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let root = self.root()?;

        path.strip_prefix(root).ok().map(relative_path_string)
    }

    /// Repack the extracted content and replace the archive with it.
    ///
    /// The new archive is staged next to the backing file and renamed over
    /// it, so a failed save leaves the original intact. The container is
    /// closed afterwards, whether or not saving succeeded.
    pub fn save(&mut self, env: &ToolEnvironment) -> Result<(), SigningError> {
        let root = self.require_root("save")?.to_path_buf();

        let res = self.repack(env, &root);
        let closed = self.close();

        // A repack failure is reported over a cleanup failure.
        res?;
        closed
    }

    fn repack(&self, env: &ToolEnvironment, root: &Path) -> Result<(), SigningError> {
        env.cancellation.check()?;

        if !self.kind.is_extractable() {
            debug!("{} is saved in place", self.path.display());
            return Ok(());
        }

        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::env::current_dir()?,
        };
        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| SigningError::InputNotFound(self.path.clone()))?;

        let staging = tempfile::Builder::new()
            .prefix(".tugger-sign-")
            .tempdir_in(&parent)?;
        let staged = staging.path().join(file_name);

        info!("repacking {}", self.path.display());

        match self.kind {
            ContainerKind::Zip => {
                write_directory_zip_file(root, &staged)?;
            }
            ContainerKind::NuGet => {
                remove_files(root, &[NUGET_SIGNATURE_ENTRY])?;
                write_directory_zip_file(root, &staged)?;
            }
            ContainerKind::Appx => {
                remove_files(root, APPX_FOOTPRINT_FILES)?;
                self.makeappx_pack(env, "pack", root, &staged)?;
            }
            ContainerKind::AppxBundle => {
                remove_files(root, APPX_BUNDLE_FOOTPRINT_FILES)?;
                self.makeappx_pack(env, "bundle", root, &staged)?;
            }
            ContainerKind::Cab => {
                let ddf = staging.path().join("directives.ddf");
                std::fs::write(&ddf, cab_directives(root, &staged)?)?;

                let mut invocation = env.invocation(&env.tools.makecab);
                invocation.arg("/F").path_arg(&ddf);
                env.run(&invocation)?;
            }
            ContainerKind::Msi => {}
        }

        std::fs::rename(&staged, &self.path)?;

        Ok(())
    }

    fn makeappx_pack(
        &self,
        env: &ToolEnvironment,
        command: &str,
        root: &Path,
        dest: &Path,
    ) -> Result<(), SigningError> {
        let mut invocation = env.invocation(&env.tools.makeappx);
        invocation
            .arg(command)
            .arg("/d")
            .path_arg(root)
            .arg("/p")
            .path_arg(dest)
            .arg("/o");

        env.run(&invocation)
    }

    fn close(&mut self) -> Result<(), SigningError> {
        self.state = ContainerState::Closed;

        if let Some(temp_dir) = self.temp_dir.take() {
            temp_dir.close()?;
        }

        Ok(())
    }

    /// Remove the temporary directory, if any.
    ///
    /// Can be called in any state and any number of times.
    pub fn dispose(&mut self) -> Result<(), SigningError> {
        if self.state == ContainerState::Unopened && self.temp_dir.is_none() {
            return Ok(());
        }

        self.close()
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            warn!(
                "error removing working directory of {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

fn remove_files(root: &Path, relative_paths: &[&str]) -> Result<(), SigningError> {
    for relative in relative_paths {
        let path = root.join(relative.split('/').collect::<PathBuf>());

        if path.is_file() {
            debug!("removing {}", path.display());
            std::fs::remove_file(&path)?;
        }
    }

    Ok(())
}

/// Produce a `makecab` directive file packing every file under `root`.
fn cab_directives(root: &Path, dest: &Path) -> Result<String, SigningError> {
    let dest_dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let cab_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut ddf = String::new();
    let mut line = |s: String| {
        ddf.push_str(&s);
        ddf.push_str("\r\n");
    };

    line(".OPTION EXPLICIT".into());
    line(format!(".Set CabinetNameTemplate={}", cab_name));
    line(format!(".Set DiskDirectoryTemplate={}", dest_dir.display()));
    line(format!(
        ".Set RptFileName={}",
        dest_dir.join("setup.rpt").display()
    ));
    line(format!(
        ".Set InfFileName={}",
        dest_dir.join("setup.inf").display()
    ));
    line(".Set Cabinet=on".into());
    line(".Set Compress=on".into());
    line(".Set MaxDiskSize=0".into());

    let mut current_dir = String::new();
    line(".Set DestinationDir=".into());

    for entry in walkdir::WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        let relative = match entry.path().strip_prefix(root) {
            Ok(p) => relative_path_string(p),
            Err(_) => continue,
        };

        let (dir, name) = match relative.rsplit_once('/') {
            Some((dir, name)) => (dir.replace('/', "\\"), name.to_string()),
            None => (String::new(), relative.clone()),
        };

        if dir != current_dir {
            line(format!(".Set DestinationDir={}", dir));
            current_dir = dir;
        }

        line(format!("\"{}\" \"{}\"", entry.path().display(), name));
    }

    Ok(ddf)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            process::{ToolOutput, ToolSet},
            testutil::{write_zip, FakeToolRunner},
            zip_archive::zip_entry_names,
        },
        std::{collections::BTreeSet, sync::Arc},
    };

    fn zip_env() -> ToolEnvironment {
        ToolEnvironment::new(ToolSet::default(), Arc::new(FakeToolRunner::default()))
    }

    fn entry_set(path: &Path) -> Result<BTreeSet<String>, SigningError> {
        Ok(zip_entry_names(path)?.into_iter().collect())
    }

    #[test]
    fn classify() {
        for (name, kind) in [
            ("a.appxbundle", Some(ContainerKind::AppxBundle)),
            ("a.msixbundle", Some(ContainerKind::AppxBundle)),
            ("a.eappxbundle", Some(ContainerKind::AppxBundle)),
            ("a.emsixbundle", Some(ContainerKind::AppxBundle)),
            ("a.appx", Some(ContainerKind::Appx)),
            ("a.msix", Some(ContainerKind::Appx)),
            ("a.MSIX", Some(ContainerKind::Appx)),
            ("a.eappx", Some(ContainerKind::Appx)),
            ("a.nupkg", Some(ContainerKind::NuGet)),
            ("a.snupkg", Some(ContainerKind::NuGet)),
            ("a.zip", Some(ContainerKind::Zip)),
            ("a.vsix", Some(ContainerKind::Zip)),
            ("a.appxupload", Some(ContainerKind::Zip)),
            ("a.msixupload", Some(ContainerKind::Zip)),
            ("a.clickonce", Some(ContainerKind::Zip)),
            ("a.cab", Some(ContainerKind::Cab)),
            ("a.Msi", Some(ContainerKind::Msi)),
            ("a.dll", None),
            ("zip", None),
        ] {
            assert_eq!(ContainerKind::classify(name), kind, "{}", name);
        }
    }

    #[test]
    fn container_signing_participation() {
        let p = |s: &str| PathBuf::from(s);

        assert!(ContainerKind::NuGet.participates_in_container_signing(&p("a.nupkg")));
        assert!(ContainerKind::Appx.participates_in_container_signing(&p("a.msix")));
        assert!(ContainerKind::Msi.participates_in_container_signing(&p("a.msi")));
        assert!(ContainerKind::Zip.participates_in_container_signing(&p("a.VSIX")));
        assert!(!ContainerKind::Zip.participates_in_container_signing(&p("a.zip")));
        assert!(!ContainerKind::Zip.participates_in_container_signing(&p("a.appxupload")));
    }

    #[test]
    fn zip_round_trip() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("test.zip");
        write_zip(&path, &[(".a", "a"), ("b", "b"), ("c.d", "c")])?;

        let env = zip_env();
        let mut container = Container::from_path(&path).ok_or(SigningError::NoInputs)?;
        container.open(&env)?;
        let root = container.root().map(|p| p.to_path_buf());
        container.save(&env)?;

        assert_eq!(
            entry_set(&path)?,
            [".a", "b", "c.d"].iter().map(|s| s.to_string()).collect()
        );
        assert!(!root.map(|p| p.exists()).unwrap_or(true));

        Ok(())
    }

    #[test]
    fn save_preserves_additions() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("test.zip");
        write_zip(&path, &[("a", "a")])?;

        let env = zip_env();
        let mut container = Container::new(&path, ContainerKind::Zip);
        container.open(&env)?;
        let root = container.root().map(|p| p.to_path_buf()).ok_or(SigningError::NoInputs)?;
        std::fs::write(root.join("b"), b"b")?;
        container.save(&env)?;

        let mut container = Container::new(&path, ContainerKind::Zip);
        container.open(&env)?;
        let names = container
            .files()?
            .iter()
            .filter_map(|p| container.relative_path(p))
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
        container.dispose()?;

        Ok(())
    }

    #[test]
    fn nuget_save_strips_signature() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("Contoso.Lib.1.0.0.nupkg");
        write_zip(
            &path,
            &[
                ("Contoso.Lib.nuspec", "<package />"),
                ("lib/net6.0/Contoso.Lib.dll", "MZ"),
                (NUGET_SIGNATURE_ENTRY, "signature"),
            ],
        )?;

        let env = zip_env();
        let mut container = Container::from_path(&path).ok_or(SigningError::NoInputs)?;
        assert_eq!(container.kind(), ContainerKind::NuGet);
        container.open(&env)?;
        container.save(&env)?;

        let names = entry_set(&path)?;
        assert!(!names.contains(NUGET_SIGNATURE_ENTRY));
        assert!(names.contains("lib/net6.0/Contoso.Lib.dll"));
        assert!(names.contains("Contoso.Lib.nuspec"));

        Ok(())
    }

    #[test]
    fn vsix_save_keeps_signature_parts() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("ext.vsix");
        let signature = "package/services/digital-signature/xml-signature/sig.psdsxs";
        write_zip(
            &path,
            &[
                ("extension.vsixmanifest", "<PackageManifest />"),
                ("bin/ext.dll", "MZ"),
                (signature, "<Signature />"),
            ],
        )?;

        let env = zip_env();
        let mut container = Container::from_path(&path).ok_or(SigningError::NoInputs)?;
        container.open(&env)?;
        container.save(&env)?;

        // The stale signature is replaced when the package is signed again.
        let names = entry_set(&path)?;
        assert!(names.contains(signature));
        assert!(names.contains("bin/ext.dll"));

        Ok(())
    }

    #[test]
    fn invalid_state_transitions() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("test.zip");
        write_zip(&path, &[("a", "a")])?;

        let env = zip_env();
        let mut container = Container::new(&path, ContainerKind::Zip);

        assert!(matches!(
            container.save(&env),
            Err(SigningError::ContainerInvalidState { operation: "save", .. })
        ));
        assert!(container.files().is_err());

        container.open(&env)?;
        assert!(matches!(
            container.open(&env),
            Err(SigningError::ContainerInvalidState { operation: "open", .. })
        ));

        container.dispose()?;
        container.dispose()?;
        assert!(!container.is_open());

        // A closed container can be opened again.
        container.open(&env)?;
        assert!(container.is_open());

        Ok(())
    }

    #[test]
    fn failed_open_leaves_no_state() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("corrupt.zip");
        std::fs::write(&path, b"not a zip")?;

        let env = zip_env();
        let mut container = Container::new(&path, ContainerKind::Zip);
        assert!(container.open(&env).is_err());
        assert!(!container.is_open());
        assert!(container.root().is_none());

        Ok(())
    }

    #[test]
    fn failed_save_keeps_original() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("pkg.msix");
        std::fs::write(&path, b"original")?;

        let runner = Arc::new(FakeToolRunner::with_handler(|invocation| {
            let command = invocation.args.first().map(|a| a.to_string_lossy().to_string());
            Ok(ToolOutput {
                success: command.as_deref() != Some("pack"),
                code: Some(if command.as_deref() == Some("pack") { 1 } else { 0 }),
                output: String::new(),
            })
        }));
        let env = ToolEnvironment::new(ToolSet::default(), runner);

        let mut container = Container::new(&path, ContainerKind::Appx);
        container.open(&env)?;
        assert!(matches!(
            container.save(&env),
            Err(SigningError::ToolFailed { .. })
        ));
        assert_eq!(std::fs::read(&path)?, b"original");
        assert!(!container.is_open());

        Ok(())
    }

    #[test]
    fn appx_uses_makeappx() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("pkg.msix");
        std::fs::write(&path, b"package")?;

        let runner = Arc::new(FakeToolRunner::with_handler(|invocation| {
            let arg = |i: usize| invocation.args.get(i).map(PathBuf::from);

            match invocation.args.first().and_then(|a| a.to_str()) {
                Some("unpack") => {
                    let dest = arg(4).ok_or(SigningError::NoInputs)?;
                    std::fs::write(
                        dest.join(APPX_MANIFEST),
                        r#"<Package><Identity Name="App" Publisher="CN=Old" /></Package>"#,
                    )?;
                    std::fs::write(dest.join("AppxBlockMap.xml"), b"<BlockMap />")?;
                    std::fs::write(dest.join("app.exe"), b"MZ")?;
                }
                Some("pack") => {
                    let source = arg(2).ok_or(SigningError::NoInputs)?;
                    assert!(!source.join("AppxBlockMap.xml").exists());
                    assert!(source.join("app.exe").exists());
                    std::fs::write(arg(4).ok_or(SigningError::NoInputs)?, b"repacked")?;
                }
                _ => {}
            }

            Ok(ToolOutput {
                success: true,
                code: Some(0),
                output: String::new(),
            })
        }));

        let mut env = ToolEnvironment::new(ToolSet::default(), runner.clone());
        env.publisher = Some("CN=Contoso".to_string());

        let mut container = Container::from_path(&path).ok_or(SigningError::NoInputs)?;
        container.open(&env)?;

        let root = container.root().map(|p| p.to_path_buf()).ok_or(SigningError::NoInputs)?;
        let manifest = std::fs::read_to_string(root.join(APPX_MANIFEST))?;
        assert!(manifest.contains(r#"Publisher="CN=Contoso""#));

        container.save(&env)?;
        assert_eq!(std::fs::read(&path)?, b"repacked");

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].program, PathBuf::from("makeappx.exe"));
        assert_eq!(
            invocations[0].args_string(),
            format!(
                "unpack /p {} /d {} /o",
                path.display(),
                root.display()
            )
        );
        assert!(invocations[1].args_string().starts_with("pack /d "));
        assert!(invocations[1].args_string().ends_with(" /o"));

        Ok(())
    }

    #[test]
    fn appx_without_manifest_fails_open() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("pkg.appx");
        std::fs::write(&path, b"package")?;

        let mut env = ToolEnvironment::new(
            ToolSet::default(),
            Arc::new(FakeToolRunner::default()),
        );
        env.publisher = Some("CN=Contoso".to_string());

        let mut container = Container::new(&path, ContainerKind::Appx);
        assert!(matches!(
            container.open(&env),
            Err(SigningError::ManifestNotFound(_))
        ));
        assert!(!container.is_open());

        Ok(())
    }

    #[test]
    fn bundle_uses_makeappx_bundle() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("app.msixbundle");
        std::fs::write(&path, b"bundle")?;

        let runner = Arc::new(FakeToolRunner::with_handler(|invocation| {
            if invocation.args.first().and_then(|a| a.to_str()) == Some("bundle") {
                let dest = invocation.args.get(4).map(PathBuf::from).ok_or(SigningError::NoInputs)?;
                std::fs::write(dest, b"rebundled")?;
            }

            Ok(ToolOutput {
                success: true,
                code: Some(0),
                output: String::new(),
            })
        }));
        let env = ToolEnvironment::new(ToolSet::default(), runner.clone());

        let mut container = Container::from_path(&path).ok_or(SigningError::NoInputs)?;
        container.open(&env)?;
        container.save(&env)?;

        let commands = runner
            .invocations()
            .iter()
            .map(|i| i.args.first().map(|a| a.to_string_lossy().to_string()))
            .collect::<Vec<_>>();
        assert_eq!(
            commands,
            vec![Some("unbundle".to_string()), Some("bundle".to_string())]
        );
        assert_eq!(std::fs::read(&path)?, b"rebundled");

        Ok(())
    }

    #[test]
    fn cab_uses_expand_and_makecab() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("drivers.cab");
        std::fs::write(&path, b"cab")?;

        let runner = Arc::new(FakeToolRunner::with_handler(|invocation| {
            let program = invocation.program.to_string_lossy().to_string();

            if program == "expand.exe" {
                let dest = invocation.args.get(2).map(PathBuf::from).ok_or(SigningError::NoInputs)?;
                std::fs::create_dir_all(dest.join("x64"))?;
                std::fs::write(dest.join("x64").join("driver.sys"), b"MZ")?;
                std::fs::write(dest.join("driver.inf"), b"[Version]")?;
            } else if program == "makecab.exe" {
                let ddf = invocation.args.get(1).map(PathBuf::from).ok_or(SigningError::NoInputs)?;
                let directives = std::fs::read_to_string(&ddf)?;
                assert!(directives.contains(".Set CabinetNameTemplate=drivers.cab"));
                assert!(directives.contains(".Set DestinationDir=x64"));
                assert!(directives.contains("\"driver.sys\""));
                assert!(directives.contains("\"driver.inf\""));

                let dest = ddf.with_file_name("drivers.cab");
                std::fs::write(dest, b"new cab")?;
            }

            Ok(ToolOutput {
                success: true,
                code: Some(0),
                output: String::new(),
            })
        }));
        let env = ToolEnvironment::new(ToolSet::default(), runner.clone());

        let mut container = Container::from_path(&path).ok_or(SigningError::NoInputs)?;
        container.open(&env)?;
        assert_eq!(container.files()?.len(), 2);
        container.save(&env)?;

        assert_eq!(runner.invocations()[0].args.get(1).and_then(|a| a.to_str()), Some("-F:*"));
        assert_eq!(std::fs::read(&path)?, b"new cab");

        Ok(())
    }

    #[test]
    fn msi_is_sealed() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("setup.msi");
        std::fs::write(&path, b"msi")?;

        let runner = Arc::new(FakeToolRunner::default());
        let env = ToolEnvironment::new(ToolSet::default(), runner.clone());

        let mut container = Container::from_path(&path).ok_or(SigningError::NoInputs)?;
        container.open(&env)?;
        assert!(container.files()?.is_empty());
        container.save(&env)?;

        assert!(runner.invocations().is_empty());
        assert_eq!(std::fs::read(&path)?, b"msi");

        Ok(())
    }

    #[test]
    fn cancelled_open() -> Result<(), SigningError> {
        let td = tempfile::tempdir()?;
        let path = td.path().join("test.zip");
        write_zip(&path, &[("a", "a")])?;

        let env = zip_env();
        env.cancellation.cancel();

        let mut container = Container::new(&path, ContainerKind::Zip);
        assert!(matches!(container.open(&env), Err(SigningError::Cancelled)));

        Ok(())
    }
}
