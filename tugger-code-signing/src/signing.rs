// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Signing of user-specified inputs.

[Signer] turns a [SignRequest] into files to sign, copies them to their
output locations, signs each with an [AggregatingSigner] on a thread pool
bounded by the configured concurrency, and condenses the outcome into an
[ExitCode].
*/

use {
    crate::{
        aggregate::{AggregatingSigner, SigningEngine, SigningReport},
        error::SigningError,
        file_identity::FileIdentity,
    },
    log::{debug, error, info, warn},
    rayon::prelude::*,
    std::{
        collections::HashSet,
        path::{Path, PathBuf},
        time::Instant,
    },
    tugger_file_matcher::{is_glob_pattern, FileMatcher},
};

/// Process exit status of a signing run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExitCode {
    Success = 0,
    /// At least one file failed to sign.
    SigningFailed = 1,
    /// Options or arguments were invalid. Nothing was signed.
    InvalidOptions = 2,
    /// No input files were found. Nothing was signed.
    NoInputsFound = 3,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    /// The exit status for a run that could not complete.
    pub fn from_error(error: &SigningError) -> Self {
        if error.is_configuration() {
            Self::InvalidOptions
        } else if error.is_input_missing() {
            Self::NoInputsFound
        } else {
            Self::SigningFailed
        }
    }

    pub fn from_report(report: &SigningReport) -> Self {
        if report.is_success() {
            Self::Success
        } else {
            Self::SigningFailed
        }
    }
}

/// What to sign and where signed files go.
#[derive(Clone, Debug, Default)]
pub struct SignRequest {
    /// Paths or glob patterns, relative to the base directory.
    pub inputs: Vec<String>,
    /// Output file or directory. Inputs are signed in place when absent.
    pub output: Option<PathBuf>,
    /// File of glob lines selecting which container content is signed.
    pub file_list: Option<PathBuf>,
    /// Directory inputs are resolved against.
    pub base_directory: PathBuf,
}

/// A single input and the working copy that is signed.
#[derive(Clone, Debug, Eq, PartialEq)]
struct WorkUnit {
    source: PathBuf,
    working: PathBuf,
}

fn absolute(path: &Path) -> Result<PathBuf, SigningError> {
    Ok(if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    })
}

fn is_rooted(pattern: &str) -> bool {
    Path::new(pattern).has_root() || pattern.starts_with('/') || pattern.starts_with('\\')
}

/// Resolve the base directory inputs are relative to.
fn resolve_base_directory(path: &Path) -> Result<PathBuf, SigningError> {
    let path = if path.as_os_str().is_empty() {
        std::env::current_dir()?
    } else {
        absolute(path)?
    };

    if path.is_dir() {
        Ok(path)
    } else {
        Err(SigningError::BadBaseDirectory(path))
    }
}

/// Resolve input strings to existing files.
///
/// Glob patterns may match nothing. Plain paths must name existing files.
fn resolve_inputs(base: &Path, inputs: &[String]) -> Result<Vec<PathBuf>, SigningError> {
    let mut res = vec![];

    for input in inputs {
        if is_glob_pattern(input) {
            if is_rooted(input) {
                return Err(SigningError::RootedGlob(input.clone()));
            }

            let mut matcher = FileMatcher::default();
            matcher.add_include(input)?;
            let matches = matcher.match_directory(base)?;

            if matches.is_empty() {
                warn!("{} did not match any files", input);
            }

            res.extend(matches);
        } else {
            let path = base.join(input);

            if path.is_dir() {
                return Err(SigningError::InputIsDirectory(path));
            } else if !path.is_file() {
                return Err(SigningError::InputNotFound(path));
            }

            res.push(path);
        }
    }

    Ok(res)
}

/// Drop inputs naming a file already listed under another spelling.
fn dedup_inputs(
    inputs: Vec<PathBuf>,
    engine: &SigningEngine,
) -> Result<Vec<PathBuf>, SigningError> {
    let mut seen = HashSet::new();
    let mut res = vec![];

    for path in inputs {
        if seen.insert(engine.tracker().identify(&path)?) {
            res.push(path);
        } else {
            debug!("ignoring repeated input {}", path.display());
        }
    }

    Ok(res)
}

/// Determine the working copy of every input.
fn resolve_outputs(
    inputs: &[PathBuf],
    output: Option<&Path>,
    engine: &SigningEngine,
) -> Result<Vec<WorkUnit>, SigningError> {
    let output = match output {
        Some(output) => absolute(output)?,
        None => {
            return Ok(inputs
                .iter()
                .map(|source| WorkUnit {
                    source: source.clone(),
                    working: source.clone(),
                })
                .collect());
        }
    };

    if output.is_file() || (!output.exists() && inputs.len() == 1) {
        return if inputs.len() == 1 {
            Ok(vec![WorkUnit {
                source: inputs[0].clone(),
                working: output,
            }])
        } else {
            Err(SigningError::InvalidOption(format!(
                "output {} is a file but {} inputs were given",
                output.display(),
                inputs.len()
            )))
        };
    }

    let mut seen = HashSet::new();
    let mut units = vec![];

    for source in inputs {
        let file_name = source
            .file_name()
            .ok_or_else(|| SigningError::InputNotFound(source.clone()))?;
        let working = output.join(file_name);

        if !seen.insert(engine.tracker().identify(&working)?) {
            return Err(SigningError::DuplicateOutput(working));
        }

        units.push(WorkUnit {
            source: source.clone(),
            working,
        });
    }

    Ok(units)
}

/// Copy inputs to their working locations.
fn prepare_working_copies(units: &[WorkUnit], engine: &SigningEngine) -> Result<(), SigningError> {
    let comparison = engine.tracker().comparison();

    for unit in units {
        if FileIdentity::new(&unit.source, comparison)? == FileIdentity::new(&unit.working, comparison)? {
            continue;
        }

        if let Some(parent) = unit.working.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(
            "copying {} to {}",
            unit.source.display(),
            unit.working.display()
        );
        std::fs::copy(&unit.source, &unit.working)?;
    }

    Ok(())
}

/// Signs the inputs of a request.
pub struct Signer {
    engine: SigningEngine,
}

impl Signer {
    pub fn new(engine: SigningEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &SigningEngine {
        &self.engine
    }

    /// Sign everything a request names and compute the exit status.
    pub fn sign(&self, request: &SignRequest) -> ExitCode {
        let start = Instant::now();

        let code = match self.sign_request(request) {
            Ok(report) => {
                info!(
                    "{} files signed; {} already signed; {} not signable; {} failed",
                    self.engine.tracker().signed_count(),
                    report.skipped.len(),
                    report.unsigned.len(),
                    report.failures.len()
                );
                for failure in &report.failures {
                    error!("{}: {}", failure.path.display(), failure.error);
                }

                ExitCode::from_report(&report)
            }
            Err(e) => {
                error!("{}", e);
                ExitCode::from_error(&e)
            }
        };

        info!(
            "signing completed in {:.3} seconds",
            start.elapsed().as_secs_f64()
        );

        code
    }

    /// Sign everything a request names.
    ///
    /// Returns `Err` for problems detected before signing starts.
    pub fn sign_request(&self, request: &SignRequest) -> Result<SigningReport, SigningError> {
        let base = resolve_base_directory(&request.base_directory)?;

        let filter = match &request.file_list {
            Some(path) => Some(FileMatcher::from_file_list(absolute(path)?)?),
            None => None,
        };

        let inputs = dedup_inputs(resolve_inputs(&base, &request.inputs)?, &self.engine)?;
        if inputs.is_empty() {
            return Err(SigningError::NoInputs);
        }

        let units = resolve_outputs(&inputs, request.output.as_deref(), &self.engine)?;
        prepare_working_copies(&units, &self.engine)?;

        let concurrency = self.engine.options().max_concurrency();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("tugger-sign-{}", i))
            .build()?;

        info!(
            "signing {} inputs with up to {} concurrent operations",
            units.len(),
            concurrency
        );

        let mut signer = AggregatingSigner::new(&self.engine);
        if let Some(filter) = &filter {
            signer = signer.with_filter(filter);
        }

        Ok(pool.install(|| {
            units
                .par_iter()
                .map(|unit| signer.sign(&[unit.working.clone()]))
                .reduce(SigningReport::default, |mut a, b| {
                    a.merge(b);
                    a
                })
        }))
    }
}
