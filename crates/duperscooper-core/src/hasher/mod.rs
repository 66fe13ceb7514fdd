pub mod fpcalc;
pub mod probe;

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::Arc;

pub use fpcalc::FingerprintError;
pub use probe::AudioMetadata;

use crate::cache::FingerprintCache;
use crate::error::Error;
use crate::fingerprint::Fingerprint;

/// Supported audio file extensions, lowercase. The single source of truth
/// consulted by track and album discovery.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "wma"];

/// Algorithm tag recorded alongside cached fingerprints.
pub const CHROMAPRINT_ALGORITHM: &str = "chromaprint";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Exact,
    Perceptual,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Exact => "exact",
            Algorithm::Perceptual => "perceptual",
        }
    }
}

/// Produces content hashes and perceptual fingerprints, consulting the
/// cache according to the configured policy.
pub struct AudioHasher {
    cache: Option<Arc<dyn FingerprintCache>>,
    update_cache: bool,
}

impl AudioHasher {
    pub fn new(cache: Option<Arc<dyn FingerprintCache>>, update_cache: bool) -> Self {
        AudioHasher {
            cache,
            update_cache,
        }
    }

    pub fn cache(&self) -> Option<&Arc<dyn FingerprintCache>> {
        self.cache.as_ref()
    }

    /// Verify the external tools this hasher will invoke. Fatal when either
    /// executable is missing.
    pub fn ensure_tools(&self, algorithm: Algorithm) -> Result<(), Error> {
        probe::ensure_available()?;
        if algorithm == Algorithm::Perceptual {
            fpcalc::ensure_available()?;
        }
        Ok(())
    }

    pub fn is_audio_file(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    /// SHA-256 of the file bytes, streamed in 64 KiB chunks.
    pub fn compute_file_hash(path: &Path) -> std::io::Result<String> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = Sha256::new();
        let mut buffer = [0u8; 65536];

        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Perceptual fingerprint for a file whose content hash is already
    /// known. Cache policy: reuse on hit unless update-cache mode is on;
    /// compute and write back otherwise.
    pub fn fingerprint(
        &self,
        path: &Path,
        content_hash: &str,
    ) -> Result<Fingerprint, FingerprintError> {
        if !self.update_cache {
            if let Some(cache) = &self.cache {
                if let Some(fp) = cache.get(content_hash) {
                    return Ok(fp);
                }
            }
        }

        let fp = fpcalc::fingerprint_file(path)?;
        if let Some(cache) = &self.cache {
            cache.set(content_hash, &fp, CHROMAPRINT_ALGORITHM);
        }
        Ok(fp)
    }

    pub fn metadata(&self, path: &Path) -> Result<AudioMetadata, FingerprintError> {
        probe::probe(path)
    }
}
