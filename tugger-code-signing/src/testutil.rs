// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Test fakes for providers and external tools.

use {
    crate::{
        error::SigningError,
        process::{CancellationToken, ToolInvocation, ToolOutput, ToolRunner},
        provider::SignatureProvider,
        sign_options::SignOptions,
    },
    std::{
        io::Write,
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    },
    zip::{write::FileOptions, ZipWriter},
};

/// Bytes appended to files signed by [RecordingProvider].
pub const SIGNATURE_MARKER: &[u8] = b"#signed";

/// Write a zip file with the given entries.
pub fn write_zip(path: &Path, entries: &[(&str, &str)]) -> Result<(), SigningError> {
    let mut zf = ZipWriter::new(std::fs::File::create(path)?);

    for (name, content) in entries {
        zf.start_file(*name, FileOptions::default())?;
        zf.write_all(content.as_bytes())?;
    }

    zf.finish()?;

    Ok(())
}

/// Read an entry of a zip file as a string.
pub fn read_zip_entry(path: &Path, name: &str) -> Result<String, SigningError> {
    let mut za = zip::ZipArchive::new(std::fs::File::open(path)?)?;
    let mut zf = za.by_name(name)?;

    let mut res = String::new();
    std::io::Read::read_to_string(&mut zf, &mut res)?;

    Ok(res)
}

type FailurePredicate = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// A provider that signs by appending [SIGNATURE_MARKER].
///
/// Records every file it signs and the peak number of concurrent calls.
pub struct RecordingProvider {
    extensions: Vec<String>,
    delay: Duration,
    fail_when: Option<FailurePredicate>,
    signed: Mutex<Vec<PathBuf>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingProvider {
    /// Claim files with any of the given extensions.
    pub fn new(extensions: &[&str]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            delay: Duration::ZERO,
            fail_when: None,
            signed: Mutex::new(vec![]),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_when(mut self, predicate: impl Fn(&Path) -> bool + Send + Sync + 'static) -> Self {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    /// Files signed so far, in signing order.
    pub fn signed(&self) -> Vec<PathBuf> {
        self.signed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Number of recorded signing operations for files with this name.
    pub fn sign_count(&self, file_name: &str) -> usize {
        self.signed()
            .iter()
            .filter(|p| p.file_name().map(|n| n == file_name).unwrap_or(false))
            .count()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl SignatureProvider for RecordingProvider {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn can_sign(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| {
                let e = e.to_string_lossy().to_lowercase();
                self.extensions.iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }

    fn sign(&self, files: &[PathBuf], _options: &SignOptions) -> Result<(), SigningError> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }

        let mut res = Ok(());

        for path in files {
            if self.fail_when.as_ref().map(|f| f(path)).unwrap_or(false) {
                res = Err(SigningError::ToolFailed {
                    program: PathBuf::from("recording"),
                    code: Some(1),
                    output: format!("refusing to sign {}", path.display()),
                });
                break;
            }

            let mut data = std::fs::read(path)?;
            data.extend_from_slice(SIGNATURE_MARKER);
            std::fs::write(path, data)?;

            if let Ok(mut signed) = self.signed.lock() {
                signed.push(path.clone());
            }
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        res
    }
}

type ToolHandler =
    Box<dyn Fn(&ToolInvocation) -> Result<ToolOutput, SigningError> + Send + Sync>;

/// A [ToolRunner] recording invocations instead of spawning processes.
pub struct FakeToolRunner {
    handler: ToolHandler,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl Default for FakeToolRunner {
    fn default() -> Self {
        Self::with_handler(|_| {
            Ok(ToolOutput {
                success: true,
                code: Some(0),
                output: String::new(),
            })
        })
    }
}

impl FakeToolRunner {
    pub fn with_handler(
        handler: impl Fn(&ToolInvocation) -> Result<ToolOutput, SigningError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            invocations: Mutex::new(vec![]),
        }
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }
}

impl ToolRunner for FakeToolRunner {
    fn run(
        &self,
        invocation: &ToolInvocation,
        cancellation: &CancellationToken,
    ) -> Result<ToolOutput, SigningError> {
        cancellation.check()?;

        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(invocation.clone());
        }

        (self.handler)(invocation)
    }
}
