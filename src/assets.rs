//! Content fingerprints for the directories shipped with a deploy: the
//! static site synced into the website bucket, and the function artifact
//! uploaded as a zip. A fingerprint only changes when a file's relative path
//! or bytes change, so re-running a deploy with unchanged content is a no-op.

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose, Engine as _};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::config::StackConfig;
use crate::error::{Result, StackError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    /// url-safe, so it can be used in object keys as is.
    pub digest: String,
    pub files: usize,
    pub bytes: u64,
}

fn iter_files_recursively(start_dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let readdir = std::fs::read_dir(start_dir).map_err(|e| StackError::io(start_dir, e))?;
    for entry in readdir {
        let direntry = entry.map_err(|e| StackError::io(start_dir, e))?;
        let path = direntry.path();
        let file_type = direntry.file_type().map_err(|e| StackError::io(&path, e))?;
        if file_type.is_dir() {
            iter_files_recursively(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Hashes every file under `dir`. Files are read and hashed in
/// parallel, then folded in sorted relative-path order so the result does
/// not depend on directory iteration order.
#[instrument]
pub fn fingerprint(dir: &Path) -> Result<Fingerprint> {
    if !dir.is_dir() {
        return Err(StackError::io(
            dir,
            std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        ));
    }
    let mut files = vec![];
    iter_files_recursively(dir, &mut files)?;
    let mut entries = files
        .par_iter()
        .map(|path| -> Result<(String, [u8; 32], u64)> {
            let contents = std::fs::read(path).map_err(|e| StackError::io(path, e))?;
            let relative = path.strip_prefix(dir).unwrap_or(path);
            // separators normalized so the digest is the same on every platform
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            Ok((relative, Sha256::digest(&contents).into(), contents.len() as u64))
        })
        .collect::<Result<Vec<_>>>()?;
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    let mut bytes = 0u64;
    for (relative, file_digest, len) in &entries {
        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update(file_digest);
        hasher.update(len.to_be_bytes());
        bytes += len;
    }
    let digest = hasher.finalize();
    let out = Fingerprint {
        digest: general_purpose::URL_SAFE_NO_PAD.encode(digest),
        files: entries.len(),
        bytes,
    };
    debug!(digest = %out.digest, files = out.files, bytes = out.bytes, "fingerprinted directory");
    Ok(out)
}

/// the fingerprints of both shipped directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetManifest {
    pub website: Fingerprint,
    pub function: Fingerprint,
}

impl AssetManifest {
    pub fn collect(config: &StackConfig) -> Result<Self> {
        Ok(Self {
            website: fingerprint(&config.website.build_dir)?,
            function: fingerprint(&config.function.artifact_dir)?,
        })
    }

    /// object key of the zipped function artifact in the artifact bucket.
    pub fn function_key(&self, function_name: &str) -> String {
        format!("{function_name}_{}.zip", self.function.digest)
    }
}
