// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Invocation of external packaging and signing tools.

Tools run as child processes through a [ToolRunner]. The default runner,
[DuctToolRunner], merges stderr into stdout, logs the captured output and
kills the child if it outlives its timeout or the run is cancelled.
*/

use {
    crate::error::SigningError,
    log::{info, warn},
    std::{
        ffi::OsString,
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    },
};

/// Default ceiling on how long a single external tool may run.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A cancellation signal shared by everything participating in a run.
///
/// Cancellation is either requested explicitly or happens implicitly once
/// an optional deadline passes. Clones observe the same signal.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Obtain a token that cancels itself after the given duration.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || matches!(self.deadline, Some(deadline) if Instant::now() >= deadline)
    }

    /// Error with [SigningError::Cancelled] if cancellation was requested.
    pub fn check(&self) -> Result<(), SigningError> {
        if self.is_cancelled() {
            Err(SigningError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Describes a single execution of an external tool.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub timeout: Duration,
}

impl ToolInvocation {
    pub fn new(program: impl AsRef<Path>, timeout: Duration) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: vec![],
            timeout,
        }
    }

    pub fn arg(&mut self, arg: impl Into<OsString>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(&mut self, path: impl AsRef<Path>) -> &mut Self {
        self.args.push(path.as_ref().as_os_str().to_os_string());
        self
    }

    /// Render the arguments for logging.
    pub fn args_string(&self) -> String {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished tool.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Runs external tools.
///
/// This abstraction exists so tool invocations can be observed and faked.
pub trait ToolRunner: Send + Sync {
    /// Run a tool to completion.
    ///
    /// Returns `Ok` with the captured output whether or not the tool succeeded.
    fn run(
        &self,
        invocation: &ToolInvocation,
        cancellation: &CancellationToken,
    ) -> Result<ToolOutput, SigningError>;

    /// Run a tool and treat a non-success exit as an error.
    fn run_checked(
        &self,
        invocation: &ToolInvocation,
        cancellation: &CancellationToken,
    ) -> Result<ToolOutput, SigningError> {
        let output = self.run(invocation, cancellation)?;

        if output.success {
            Ok(output)
        } else {
            Err(SigningError::ToolFailed {
                program: invocation.program.clone(),
                code: output.code,
                output: output.output,
            })
        }
    }
}

/// A [ToolRunner] spawning real processes with `duct`.
#[derive(Clone, Copy, Debug, Default)]
pub struct DuctToolRunner;

impl ToolRunner for DuctToolRunner {
    fn run(
        &self,
        invocation: &ToolInvocation,
        cancellation: &CancellationToken,
    ) -> Result<ToolOutput, SigningError> {
        cancellation.check()?;

        let program = &invocation.program;
        info!("running {} {}", program.display(), invocation.args_string());

        let handle = duct::cmd(program, invocation.args.clone())
            .stderr_to_stdout()
            .stdout_capture()
            .unchecked()
            .start()
            .map_err(|e| SigningError::ToolSpawn(program.clone(), e))?;

        let deadline = Instant::now() + invocation.timeout;

        loop {
            if let Some(output) = handle.try_wait()? {
                let text = String::from_utf8_lossy(&output.stdout).to_string();
                let success = output.status.success();

                for line in text.lines() {
                    if success {
                        info!("{}> {}", program.display(), line);
                    } else {
                        warn!("{}> {}", program.display(), line);
                    }
                }

                return Ok(ToolOutput {
                    success,
                    code: output.status.code(),
                    output: text,
                });
            }

            let cancelled = cancellation.is_cancelled();
            if cancelled || Instant::now() >= deadline {
                warn!("terminating {}", program.display());
                handle
                    .kill()
                    .map_err(|e| SigningError::ToolKill(program.clone(), e))?;

                return Err(if cancelled {
                    SigningError::Cancelled
                } else {
                    SigningError::ToolTimeout(program.clone(), invocation.timeout)
                });
            }

            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Locations of external tools and how long each invocation may take.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ToolSet {
    pub makeappx: PathBuf,
    pub expand: PathBuf,
    pub makecab: PathBuf,
    pub signtool: PathBuf,
    pub dotnet: PathBuf,
    pub mage: PathBuf,
    pub vsix_sign_tool: PathBuf,
    pub timeout: Duration,
    /// Ask tools for verbose output where they support it.
    pub verbose: bool,
}

impl Default for ToolSet {
    fn default() -> Self {
        Self {
            makeappx: "makeappx.exe".into(),
            expand: "expand.exe".into(),
            makecab: "makecab.exe".into(),
            signtool: "signtool.exe".into(),
            dotnet: "dotnet".into(),
            mage: "mage.exe".into(),
            vsix_sign_tool: "OpenVsixSignTool".into(),
            timeout: DEFAULT_TOOL_TIMEOUT,
            verbose: false,
        }
    }
}

impl ToolSet {
    /// Resolve tools via `PATH`.
    ///
    /// Tools that cannot be found keep their bare program name, so invoking
    /// them fails with a spawn error naming the tool.
    pub fn discover() -> Self {
        let resolve = |name: PathBuf| match which::which(&name) {
            Ok(path) => path,
            Err(_) => name,
        };

        let defaults = Self::default();

        Self {
            makeappx: resolve(defaults.makeappx),
            expand: resolve(defaults.expand),
            makecab: resolve(defaults.makecab),
            signtool: resolve(defaults.signtool),
            dotnet: resolve(defaults.dotnet),
            mage: resolve(defaults.mage),
            vsix_sign_tool: resolve(defaults.vsix_sign_tool),
            timeout: defaults.timeout,
            verbose: defaults.verbose,
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }
}

/// Everything needed to invoke external tools during a run.
///
/// Shared by containers, for packing and unpacking, and by signature
/// providers.
#[derive(Clone)]
pub struct ToolEnvironment {
    pub tools: ToolSet,
    pub runner: Arc<dyn ToolRunner>,
    /// Publisher identity written into package manifests.
    pub publisher: Option<String>,
    pub cancellation: CancellationToken,
}

impl ToolEnvironment {
    pub fn new(tools: ToolSet, runner: Arc<dyn ToolRunner>) -> Self {
        Self {
            tools,
            runner,
            publisher: None,
            cancellation: CancellationToken::default(),
        }
    }

    /// Start describing an invocation of a tool using the configured timeout.
    pub fn invocation(&self, program: &Path) -> ToolInvocation {
        ToolInvocation::new(program, self.tools.timeout)
    }

    /// Run a tool, failing unless it exits successfully.
    pub fn run(&self, invocation: &ToolInvocation) -> Result<(), SigningError> {
        self.runner.run_checked(invocation, &self.cancellation)?;
        Ok(())
    }
}
