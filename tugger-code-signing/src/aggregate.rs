// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Recursive signing of files and containers.

[AggregatingSigner] signs a set of files. Containers among them are opened,
their content is signed recursively, and they are repacked. Every other file
is handed to the first [SignatureProvider] claiming it.

Failures never abort sibling work. They are collected into a
[SigningReport] and surface once everything that could be signed was signed.
An opened container is always saved, even when some of its content failed to
sign, so successful work is not lost.

Sibling files and containers are processed in parallel on the current
`rayon` thread pool, whose width bounds concurrency for the whole run.
*/

use {
    crate::{
        container::{Container, ContainerKind},
        error::SigningError,
        file_identity::PathComparison,
        process::{CancellationToken, ToolEnvironment},
        provider::{ProviderSet, SignatureProvider},
        sign_options::SignOptions,
        signed_files::SignedFileTracker,
    },
    log::{debug, error, info, warn},
    rayon::prelude::*,
    std::{
        collections::BTreeMap,
        path::{Path, PathBuf},
    },
    tugger_file_matcher::FileMatcher,
};

/// A file that could not be signed.
#[derive(Debug)]
pub struct SigningFailure {
    pub path: PathBuf,
    pub error: SigningError,
}

/// Outcome of signing a set of files.
#[derive(Debug, Default)]
pub struct SigningReport {
    /// Files signed.
    pub signed: Vec<PathBuf>,
    /// Files already signed earlier in the run.
    pub skipped: Vec<PathBuf>,
    /// Files no provider claimed.
    pub unsigned: Vec<PathBuf>,
    pub failures: Vec<SigningFailure>,
}

impl SigningReport {
    /// Whether nothing failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Absorb the results of another report.
    pub fn merge(&mut self, other: SigningReport) {
        self.signed.extend(other.signed);
        self.skipped.extend(other.skipped);
        self.unsigned.extend(other.unsigned);
        self.failures.extend(other.failures);
    }

    pub fn record_failure(&mut self, path: impl AsRef<Path>, error: SigningError) {
        self.failures.push(SigningFailure {
            path: path.as_ref().to_path_buf(),
            error,
        });
    }

    fn merged(mut self, other: SigningReport) -> Self {
        self.merge(other);
        self
    }
}

/// State shared by everything signing during one run.
pub struct SigningEngine {
    options: SignOptions,
    providers: ProviderSet,
    tracker: SignedFileTracker,
    env: ToolEnvironment,
}

impl SigningEngine {
    pub fn new(options: SignOptions, providers: ProviderSet, env: ToolEnvironment) -> Self {
        Self::with_comparison(options, providers, env, PathComparison::default())
    }

    /// Construct an instance deduplicating files with the given path comparison.
    pub fn with_comparison(
        options: SignOptions,
        providers: ProviderSet,
        env: ToolEnvironment,
        comparison: PathComparison,
    ) -> Self {
        Self {
            options,
            providers,
            tracker: SignedFileTracker::new(comparison),
            env,
        }
    }

    pub fn options(&self) -> &SignOptions {
        &self.options
    }

    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    pub fn tracker(&self) -> &SignedFileTracker {
        &self.tracker
    }

    pub fn env(&self) -> &ToolEnvironment {
        &self.env
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.env.cancellation
    }
}

/// Signs files and, recursively, the content of containers.
pub struct AggregatingSigner<'a> {
    engine: &'a SigningEngine,
    filter: Option<&'a FileMatcher>,
}

impl<'a> AggregatingSigner<'a> {
    pub fn new(engine: &'a SigningEngine) -> Self {
        Self {
            engine,
            filter: None,
        }
    }

    /// Only sign container content matching a file matcher.
    ///
    /// Paths are matched relative to the root of the container holding them.
    /// Nested containers are always opened.
    pub fn with_filter(mut self, filter: &'a FileMatcher) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sign files.
    ///
    /// Containers are processed before other files. A repacked container
    /// taking part in whole-container signing is then signed like any other
    /// file.
    pub fn sign(&self, files: &[PathBuf]) -> SigningReport {
        let mut containers = vec![];
        let mut leaves = vec![];

        for path in files {
            match Container::from_path(path) {
                Some(container) => containers.push(container),
                None => leaves.push(path.clone()),
            }
        }

        let (mut report, saved) = containers
            .into_par_iter()
            .map(|container| {
                let (report, saved) = self.sign_container(container);
                (report, saved.into_iter().collect::<Vec<_>>())
            })
            .reduce(
                || (SigningReport::default(), vec![]),
                |(a, mut a_saved), (b, b_saved)| {
                    a_saved.extend(b_saved);
                    (a.merged(b), a_saved)
                },
            );

        leaves.extend(saved);
        report.merge(self.sign_leaves(leaves));

        report
    }

    fn record_failure(&self, report: &mut SigningReport, path: &Path, error: SigningError) {
        error!("error signing {}: {}", path.display(), error);

        if error.is_fatal() {
            error!("cancelling remaining work");
            self.engine.cancellation().cancel();
        }

        report.record_failure(path, error);
    }

    /// Open a container, sign its content and repack it.
    ///
    /// Returns the path of the container if it was saved and should itself
    /// be signed.
    fn sign_container(&self, mut container: Container) -> (SigningReport, Option<PathBuf>) {
        let backing = container.path().to_path_buf();
        let path = backing.as_path();
        let kind = container.kind();
        let env = self.engine.env();
        let tracker = self.engine.tracker();
        let mut report = SigningReport::default();

        match tracker.identify(path) {
            Ok(identity) => {
                if !tracker.try_open_container(identity) {
                    debug!("{} was already processed", path.display());
                    report.skipped.push(path.to_path_buf());
                    return (report, None);
                }
            }
            Err(e) => {
                self.record_failure(&mut report, path, e);
                return (report, None);
            }
        }

        if let Err(e) = container.open(env) {
            self.record_failure(&mut report, path, e);
            return (report, None);
        }

        match self.container_content(&container) {
            Ok(files) => {
                debug!("{} holds {} files to process", path.display(), files.len());
                report.merge(self.sign(&files));
            }
            Err(e) => self.record_failure(&mut report, path, e),
        }

        let saved = match container.save(env) {
            Ok(()) => true,
            Err(e) => {
                self.record_failure(&mut report, path, e);
                false
            }
        };

        if let Err(e) = container.dispose() {
            warn!("error cleaning up {}: {}", path.display(), e);
        }

        let resign = if saved && kind.participates_in_container_signing(path) {
            Some(path.to_path_buf())
        } else {
            None
        };

        (report, resign)
    }

    /// Files inside an opened container to process.
    fn container_content(&self, container: &Container) -> Result<Vec<PathBuf>, SigningError> {
        let files = container.files()?;

        Ok(match self.filter {
            Some(filter) => files
                .into_iter()
                .filter(|path| {
                    ContainerKind::classify(path).is_some()
                        || container
                            .relative_path(path)
                            .map(|relative| filter.is_match(&relative))
                            .unwrap_or(false)
                })
                .collect(),
            None => files,
        })
    }

    /// Sign files that are not opened as containers.
    ///
    /// Files are grouped by provider phase. Each phase completes before the
    /// next starts.
    fn sign_leaves(&self, files: Vec<PathBuf>) -> SigningReport {
        let mut report = SigningReport::default();
        let mut phases: BTreeMap<u8, Vec<(PathBuf, &dyn SignatureProvider)>> = BTreeMap::new();

        for path in files {
            match self.engine.providers().find(&path) {
                Some(provider) => {
                    phases
                        .entry(provider.phase(&path))
                        .or_default()
                        .push((path, provider));
                }
                None => {
                    debug!("no signer for {}", path.display());
                    report.unsigned.push(path);
                }
            }
        }

        for (phase, files) in phases {
            debug!("signing {} files in phase {}", files.len(), phase);

            report.merge(
                files
                    .into_par_iter()
                    .map(|(path, provider)| self.sign_leaf(&path, provider))
                    .reduce(SigningReport::default, SigningReport::merged),
            );
        }

        report
    }

    fn sign_leaf(&self, path: &Path, provider: &dyn SignatureProvider) -> SigningReport {
        let mut report = SigningReport::default();
        let tracker = self.engine.tracker();

        let identity = match tracker.identify(path) {
            Ok(identity) => identity,
            Err(e) => {
                self.record_failure(&mut report, path, e);
                return report;
            }
        };

        if !tracker.try_claim(&identity) {
            debug!("{} already signed", path.display());
            report.skipped.push(path.to_path_buf());
            return report;
        }

        if let Err(e) = self.engine.cancellation().check() {
            tracker.release(&identity);
            self.record_failure(&mut report, path, e);
            return report;
        }

        if ContainerKind::classify(path).is_some() {
            warn!("signing container {} with {}", path.display(), provider.name());
        } else {
            info!("signing {} with {}", path.display(), provider.name());
        }

        match provider.sign(&[path.to_path_buf()], self.engine.options()) {
            Ok(()) => {
                tracker.complete(identity);
                report.signed.push(path.to_path_buf());
            }
            Err(e) => {
                tracker.release(&identity);
                self.record_failure(&mut report, path, e);
            }
        }

        report
    }
}
