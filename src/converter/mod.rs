//! External converter process invocation.
//!
//! One suspend-until-exit call per converter run. Standard error is
//! drained continuously into a bounded buffer while the child runs, so a
//! chatty converter never blocks on a full pipe. Timeout and caller
//! cancellation both kill the child.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ConvertError;

/// Keep at most this much captured stderr. Converters print their actual
/// error last, so the tail is the part worth keeping.
const MAX_DIAGNOSTIC_BYTES: usize = 16 * 1024;

/// Descriptor for one external process run. Built immediately before
/// spawning, discarded once the exit status is read.
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub cwd: PathBuf,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// What the converter did. A non-zero exit is reported here, not raised;
/// classification belongs to the orchestrator.
#[derive(Debug)]
pub struct InvokeOutcome {
    pub exit_code: i32,
    pub stderr: String,
}

impl InvokeOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Resolve a configured executable to an absolute path. Paths with a
/// directory component are checked directly; bare names are looked up on
/// PATH.
pub fn resolve_executable(name_or_path: &str) -> Result<PathBuf, ConvertError> {
    let candidate = Path::new(name_or_path);
    if candidate.components().count() > 1 {
        if candidate.is_file() {
            return Ok(candidate.to_path_buf());
        }
        return Err(ConvertError::ConverterUnavailable(format!(
            "{name_or_path} does not exist"
        )));
    }

    which::which(name_or_path).map_err(|e| {
        ConvertError::ConverterUnavailable(format!("{name_or_path} not found on PATH: {e}"))
    })
}

/// Run the converter and suspend until it exits, times out, or the caller
/// cancels. On timeout/cancel the child is killed before returning.
pub async fn invoke(
    invocation: Invocation,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<InvokeOutcome, ConvertError> {
    debug!(
        "Invoking {:?} with {} args in {:?}",
        invocation.program,
        invocation.args.len(),
        invocation.cwd
    );

    let mut child = tokio::process::Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(&invocation.cwd)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConvertError::ConverterUnavailable(format!(
                "{:?} not found",
                invocation.program
            )),
            _ => ConvertError::ConverterUnavailable(format!(
                "{:?} could not be started: {e}",
                invocation.program
            )),
        })?;

    // Drain stderr as it arrives so the child never stalls on a full pipe.
    let stderr_pipe = child.stderr.take();
    let stderr_handle = tokio::spawn(async move {
        let mut buf: Vec<u8> = Vec::new();
        if let Some(mut pipe) = stderr_pipe {
            let mut chunk = [0u8; 4096];
            loop {
                match pipe.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        if buf.len() > MAX_DIAGNOSTIC_BYTES {
                            let excess = buf.len() - MAX_DIAGNOSTIC_BYTES;
                            buf.drain(..excess);
                        }
                    }
                }
            }
        }
        buf
    });

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| {
                ConvertError::ConverterUnavailable(format!("failed to wait for converter: {e}"))
            })?;
            let stderr_bytes = stderr_handle.await.unwrap_or_default();
            let stderr = String::from_utf8_lossy(&stderr_bytes).into_owned();
            let exit_code = status.code().unwrap_or(-1);

            debug!("Converter exited with status {}", exit_code);
            Ok(InvokeOutcome { exit_code, stderr })
        }
        _ = tokio::time::sleep(timeout) => {
            let _ = child.kill().await;
            stderr_handle.abort();
            warn!("Converter {:?} timed out after {:?}, killed", invocation.program, timeout);
            Err(ConvertError::Timeout(timeout))
        }
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            stderr_handle.abort();
            debug!("Converter {:?} cancelled by caller, killed", invocation.program);
            Err(ConvertError::Cancelled)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_invoke_zero_exit() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation::new("true", dir.path());
        let outcome = invoke(inv, Duration::from_secs(5), &no_cancel())
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn test_invoke_nonzero_exit_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation::new("false", dir.path());
        let outcome = invoke(inv, Duration::from_secs(5), &no_cancel())
            .await
            .unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, 1);
    }

    #[tokio::test]
    async fn test_invoke_captures_stderr() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation::new("sh", dir.path())
            .arg("-c")
            .arg("echo conversion blew up >&2; exit 3");
        let outcome = invoke(inv, Duration::from_secs(5), &no_cancel())
            .await
            .unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.stderr.contains("conversion blew up"));
    }

    #[tokio::test]
    async fn test_invoke_missing_executable() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation::new("/nonexistent/converter-binary", dir.path());
        let err = invoke(inv, Duration::from_secs(5), &no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::ConverterUnavailable(_)));
    }

    #[tokio::test]
    async fn test_invoke_timeout_kills_child() {
        let dir = TempDir::new().unwrap();
        let inv = Invocation::new("sleep", dir.path()).arg("30");
        let err = invoke(inv, Duration::from_millis(100), &no_cancel())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_invoke_cancel_kills_child() {
        let dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        let inv = Invocation::new("sleep", dir.path()).arg("30");

        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_clone.cancel();
        });

        let err = invoke(inv, Duration::from_secs(30), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::Cancelled));
    }

    #[tokio::test]
    async fn test_invoke_drains_large_stderr_without_stalling() {
        let dir = TempDir::new().unwrap();
        // Well past any pipe buffer size; the run must still finish.
        let inv = Invocation::new("sh", dir.path())
            .arg("-c")
            .arg("i=0; while [ $i -lt 2000 ]; do echo 'xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx' >&2; i=$((i+1)); done");
        let outcome = invoke(inv, Duration::from_secs(10), &no_cancel())
            .await
            .unwrap();
        assert!(outcome.success());
        assert!(outcome.stderr.len() <= MAX_DIAGNOSTIC_BYTES);
    }

    #[test]
    fn test_resolve_executable_bare_name() {
        // `sh` exists on any unix PATH this runs on.
        let path = resolve_executable("sh").unwrap();
        assert!(path.is_absolute());
    }

    #[test]
    fn test_resolve_executable_missing_path() {
        let err = resolve_executable("/no/such/dir/ffmpeg").unwrap_err();
        assert!(matches!(err, ConvertError::ConverterUnavailable(_)));
    }
}
