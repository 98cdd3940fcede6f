//! Model file lookup and verification

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{DemixError, DemixResult};

/// Model file extension
pub const MODEL_EXTENSION: &str = "onnx";

/// Default model name
pub const DEFAULT_MODEL: &str = "demucs";

/// `<models_dir>/<name>.onnx`
pub fn model_path<P: AsRef<Path>>(models_dir: P, name: &str) -> PathBuf {
    models_dir
        .as_ref()
        .join(format!("{}.{}", name, MODEL_EXTENSION))
}

/// Hex SHA-256 of a file, streamed in 4 KiB blocks
pub fn sha256_file<P: AsRef<Path>>(path: P) -> DemixResult<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 4096];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Check a model file against its expected hex digest (case-insensitive)
pub fn verify_model<P: AsRef<Path>>(path: P, expected: &str) -> DemixResult<()> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(DemixError::ModelNotFound {
            path: path.display().to_string(),
        });
    }

    let got = sha256_file(path)?;
    if !got.eq_ignore_ascii_case(expected.trim()) {
        return Err(DemixError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            got,
        });
    }

    log::debug!("Verified {} ({})", path.display(), got);
    Ok(())
}
