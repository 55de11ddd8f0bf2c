//! Invocation of the downstream model binaries.
//!
//! A model runs as a child process inside the package directory with its
//! output appended to a log file. A monitor loop polls the child at a fixed
//! interval and kills it when the wall-clock limit passes or the run is
//! cancelled.

use a3d_dem::CancellationToken;
use a3d_metrics::metric_defs;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

/// Log file written next to the model's outputs.
pub const MODEL_LOG: &str = "model.log";

/// Errors of an external model run.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("Cannot start {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The wall-clock limit passed; the process was killed.
    #[error("{} exceeded its time limit of {timeout:?}", .binary.display())]
    Timeout { binary: PathBuf, timeout: Duration },

    /// The process exited unsuccessfully.
    #[error("{} failed with {status}", .binary.display())]
    ProcessFailed { binary: PathBuf, status: ExitStatus },

    #[error("{} was cancelled", .binary.display())]
    Cancelled { binary: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a successful run went.
#[derive(Debug, Clone)]
pub struct ModelOutcome {
    pub duration: Duration,
    pub log: PathBuf,
}

/// A model binary with its arguments and time limit.
#[derive(Debug, Clone)]
pub struct ModelRunner {
    binary: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    check_interval: Duration,
}

impl ModelRunner {
    pub fn new<P: AsRef<Path>>(binary: P, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
            args,
            timeout,
            check_interval: Duration::from_millis(200),
        }
    }

    /// Poll interval of the monitor loop.
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Run inside `working_dir`, appending output to `working_dir/output/model.log`.
    pub fn run(&self, working_dir: &Path, cancel: &CancellationToken) -> Result<ModelOutcome, ExternalError> {
        let log_dir = working_dir.join("output");
        std::fs::create_dir_all(&log_dir)?;
        let log = log_dir.join(MODEL_LOG);
        let stdout = OpenOptions::new().create(true).append(true).open(&log)?;
        let stderr: File = stdout.try_clone()?;

        info!(binary = %self.binary.display(), dir = %working_dir.display(), "Starting model");
        let started = Instant::now();
        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| ExternalError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            let elapsed = started.elapsed();
            if elapsed >= self.timeout || cancel.is_cancelled() {
                // The process may exit between try_wait and kill
                let _ = child.kill();
                child.wait()?;
                if cancel.is_cancelled() {
                    warn!(binary = %self.binary.display(), "Model run cancelled");
                    return Err(ExternalError::Cancelled {
                        binary: self.binary.clone(),
                    });
                }
                warn!(
                    binary = %self.binary.display(),
                    elapsed_s = elapsed.as_secs_f64(),
                    "Model exceeded its time limit, killed"
                );
                return Err(ExternalError::Timeout {
                    binary: self.binary.clone(),
                    timeout: self.timeout,
                });
            }
            thread::sleep(self.check_interval.min(self.timeout.saturating_sub(elapsed)));
        };

        let duration = started.elapsed();
        let label = self
            .binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        metrics::histogram!(metric_defs::MODEL_DURATION.name, "binary" => label).record(duration.as_secs_f64());

        if !status.success() {
            return Err(ExternalError::ProcessFailed {
                binary: self.binary.clone(),
                status,
            });
        }
        info!(binary = %self.binary.display(), duration_s = duration.as_secs_f64(), "Model finished");
        Ok(ModelOutcome { duration, log })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, timeout: Duration) -> ModelRunner {
        ModelRunner::new("/bin/sh", vec!["-c".to_string(), script.to_string()], timeout)
            .with_check_interval(Duration::from_millis(20))
    }

    #[test]
    fn test_success_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = sh("echo simulated; pwd", Duration::from_secs(10))
            .run(dir.path(), &CancellationToken::new())
            .unwrap();
        let log = std::fs::read_to_string(&outcome.log).unwrap();
        assert!(log.contains("simulated"));
        assert_eq!(outcome.log, dir.path().join("output").join(MODEL_LOG));
    }

    #[test]
    fn test_nonzero_exit_is_process_failed() {
        let dir = tempfile::tempdir().unwrap();
        let err = sh("exit 3", Duration::from_secs(10))
            .run(dir.path(), &CancellationToken::new())
            .unwrap_err();
        match err {
            ExternalError::ProcessFailed { status, .. } => assert_eq!(status.code(), Some(3)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_timeout_is_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let started = Instant::now();
        let err = sh("sleep 30", Duration::from_millis(200))
            .run(dir.path(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ExternalError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sh("sleep 30", Duration::from_secs(60)).run(dir.path(), &cancel).unwrap_err();
        assert!(matches!(err, ExternalError::Cancelled { .. }));
    }

    #[test]
    fn test_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelRunner::new("/nonexistent/alpine3d", vec![], Duration::from_secs(1))
            .run(dir.path(), &CancellationToken::new())
            .unwrap_err();
        assert!(matches!(err, ExternalError::Spawn { .. }));
    }
}
