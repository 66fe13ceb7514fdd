use std::io::ErrorKind;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::trace;

use crate::error::Error;
use crate::fingerprint::Fingerprint;

/// Typed failure modes of the external fingerprinter.
#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("file is not readable")]
    Unreadable,

    #[error("unsupported audio format")]
    UnsupportedFormat,

    #[error("fpcalc not found on PATH")]
    ToolMissing,

    #[error("fpcalc failed: {0}")]
    ToolError(String),
}

/// Verify that `fpcalc` is invocable. Called once at the start of any
/// operation that needs fingerprints; absence is fatal and user-actionable.
pub fn ensure_available() -> Result<(), Error> {
    match Command::new("fpcalc").arg("-version").output() {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::ToolMissing {
            tool: "fpcalc",
            hint: "install the chromaprint package",
        }),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Invoke `fpcalc -raw` on a file and parse the `FINGERPRINT=` record into
/// a raw fingerprint.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint, FingerprintError> {
    if !path.is_file() {
        return Err(FingerprintError::Unreadable);
    }

    let output = Command::new("fpcalc")
        .arg("-raw")
        .arg(path)
        .output()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => FingerprintError::ToolMissing,
            _ => FingerprintError::ToolError(e.to_string()),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        if stderr.contains("unsupported") || stderr.contains("Could not decode") {
            return Err(FingerprintError::UnsupportedFormat);
        }
        return Err(FingerprintError::ToolError(stderr.trim().to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    for line in stdout.lines() {
        if let Some(raw) = line.strip_prefix("FINGERPRINT=") {
            trace!("fpcalc produced fingerprint for {}", path.display());
            return Fingerprint::parse(raw).ok_or_else(|| {
                FingerprintError::ToolError("unparseable FINGERPRINT record".to_string())
            });
        }
    }

    Err(FingerprintError::ToolError(
        "no FINGERPRINT record in fpcalc output".to_string(),
    ))
}
