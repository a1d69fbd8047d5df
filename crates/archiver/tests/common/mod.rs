//! Shared helpers for coordinator integration tests.
//!
//! - `TestEnv`: temporary input/output directories and a matching config
//! - `ScriptedCompressor`: a compressor driven step by step from the test

#![allow(dead_code)]

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tempfile::TempDir;

use archiver::{ArchiveError, ArchiverConfig, CompressRequest, Compressor, ZipCompressor};

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Isolated directories for one test.
pub struct TestEnv {
    temp_dir: TempDir,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let input_dir = temp_dir.path().join("input");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&input_dir).expect("Failed to create input dir");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        Self {
            temp_dir,
            input_dir,
            output_dir,
        }
    }

    pub fn config(&self) -> ArchiverConfig {
        let mut config = ArchiverConfig::with_temp_directory(&self.output_dir);
        config.worker_count = 2;
        config
    }

    /// Writes `files` into `input_dir/<dir_name>` and returns the directory.
    pub fn write_dir(&self, dir_name: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.input_dir.join(dir_name);
        std::fs::create_dir_all(&dir).expect("Failed to create directory");
        for (name, content) in files {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).expect("Failed to create parent");
            }
            std::fs::write(&path, content).expect("Failed to write file");
        }
        dir
    }

    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.input_dir.join(name);
        std::fs::write(&path, content).expect("Failed to write file");
        path
    }
}

pub fn zip_entry_names(path: &Path) -> Vec<String> {
    let file = File::open(path).expect("Failed to open archive");
    let mut archive = zip::ZipArchive::new(file).expect("Failed to read archive");
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).expect("Bad entry").name().to_string())
        .collect();
    names.sort();
    names
}

/// One instruction for a [`ScriptedCompressor`] run.
#[derive(Debug, Clone)]
pub enum Step {
    Progress(f64),
    Finish,
    Fail(ArchiveError),
}

/// Compressor whose runs advance only when the test sends [`Step`]s.
///
/// Polls the cancellation predicate while waiting, so cancelled jobs and
/// shutdowns never hang on it, unless built with
/// [`ScriptedCompressor::ignoring_cancel`].
pub struct ScriptedCompressor {
    steps: Receiver<Step>,
    started: Sender<PathBuf>,
    calls: Arc<AtomicUsize>,
    honours_cancel: bool,
}

/// Test-side controls of a [`ScriptedCompressor`].
pub struct Script {
    steps: Sender<Step>,
    started: Receiver<PathBuf>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedCompressor {
    pub fn new() -> (Arc<Self>, Script) {
        Self::build(true)
    }

    /// Runs keep going after cancellation until the script ends them, like
    /// a job already past its last cancellation check.
    pub fn ignoring_cancel() -> (Arc<Self>, Script) {
        Self::build(false)
    }

    fn build(honours_cancel: bool) -> (Arc<Self>, Script) {
        let (step_tx, step_rx) = unbounded();
        let (started_tx, started_rx) = unbounded();
        let calls = Arc::new(AtomicUsize::new(0));

        let compressor = Arc::new(Self {
            steps: step_rx,
            started: started_tx,
            calls: Arc::clone(&calls),
            honours_cancel,
        });
        let script = Script {
            steps: step_tx,
            started: started_rx,
            calls,
        };
        (compressor, script)
    }
}

impl Compressor for ScriptedCompressor {
    fn compress(
        &self,
        request: &CompressRequest,
        progress: &mut dyn FnMut(f64),
        cancelled: &dyn Fn() -> bool,
    ) -> Result<PathBuf, ArchiveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _ = self.started.send(request.destination.clone());

        loop {
            if self.honours_cancel && cancelled() {
                return Err(ArchiveError::Cancelled);
            }
            match self.steps.recv_timeout(Duration::from_millis(10)) {
                Ok(Step::Progress(fraction)) => progress(fraction),
                Ok(Step::Finish) => return Ok(request.destination.clone()),
                Ok(Step::Fail(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ArchiveError::Zip("script ended".to_string()))
                }
            }
        }
    }
}

impl Script {
    /// Blocks until a compression run starts; returns its destination.
    pub fn wait_started(&self) -> PathBuf {
        self.started
            .recv_timeout(TIMEOUT)
            .expect("Compressor was never started")
    }

    /// Like [`wait_started`](Self::wait_started) but gives up after
    /// `timeout`.
    pub fn started_within(&self, timeout: Duration) -> Option<PathBuf> {
        self.started.recv_timeout(timeout).ok()
    }

    pub fn progress(&self, fraction: f64) {
        self.steps.send(Step::Progress(fraction)).unwrap();
    }

    pub fn finish(&self) {
        self.steps.send(Step::Finish).unwrap();
    }

    pub fn fail(&self, error: ArchiveError) {
        self.steps.send(Step::Fail(error)).unwrap();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Real zip compressor whose first run stalls in its initial progress report
/// until the test opens the gate.
pub struct GatedCompressor {
    inner: ZipCompressor,
    gate: Receiver<()>,
    entered: Sender<()>,
    first_run: AtomicBool,
    calls: AtomicUsize,
}

pub struct Gate {
    release: Sender<()>,
    entered: Receiver<()>,
}

impl GatedCompressor {
    pub fn new() -> (Arc<Self>, Gate) {
        let (release_tx, release_rx) = unbounded();
        let (entered_tx, entered_rx) = unbounded();
        let compressor = Arc::new(Self {
            inner: ZipCompressor::new(),
            gate: release_rx,
            entered: entered_tx,
            first_run: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
        });
        let gate = Gate {
            release: release_tx,
            entered: entered_rx,
        };
        (compressor, gate)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Compressor for GatedCompressor {
    fn compress(
        &self,
        request: &CompressRequest,
        progress: &mut dyn FnMut(f64),
        cancelled: &dyn Fn() -> bool,
    ) -> Result<PathBuf, ArchiveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.first_run.swap(false, Ordering::SeqCst) {
            return self.inner.compress(request, progress, cancelled);
        }

        let mut stalled = false;
        let mut gated = |fraction: f64| {
            if !stalled {
                stalled = true;
                let _ = self.entered.send(());
                let _ = self.gate.recv_timeout(TIMEOUT);
            }
            progress(fraction);
        };
        self.inner.compress(request, &mut gated, cancelled)
    }
}

impl Gate {
    /// Blocks until the first run is stalled inside the compressor.
    pub fn wait_entered(&self) {
        self.entered
            .recv_timeout(TIMEOUT)
            .expect("First run never reached the compressor");
    }

    pub fn open(&self) {
        self.release.send(()).unwrap();
    }
}
