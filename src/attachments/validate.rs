//! Local attachment validation

use crate::config::LimitSettings;
use crate::error::{Error, FileAccessError, Result};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A validated local file, ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub path: PathBuf,
    pub size: u64,
    pub mime_type: String,
    pub is_image: bool,
}

impl AttachmentDescriptor {
    /// File name sent to the service
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Validate `paths` against `limits`.
///
/// Paths are made absolute and canonical, de-duplicated in first-seen order,
/// counted, then checked one by one. Nothing touches the network.
pub fn validate_files<P: AsRef<Path>>(
    paths: &[P],
    limits: &LimitSettings,
) -> Result<Vec<AttachmentDescriptor>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for path in paths {
        let resolved = normalize(path.as_ref())?;
        if seen.insert(resolved.clone()) {
            unique.push(resolved);
        }
    }

    if unique.len() > limits.max_files {
        return Err(Error::TooManyFiles {
            count: unique.len(),
            max: limits.max_files,
        });
    }

    unique
        .into_iter()
        .map(|path| describe(path, limits.max_file_size))
        .collect()
}

/// Absolute, canonical form of `path`. Missing files keep their absolute
/// path so the not-found error can name them.
fn normalize(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(fs::canonicalize(&absolute).unwrap_or(absolute))
}

fn describe(path: PathBuf, max_size: u64) -> Result<AttachmentDescriptor> {
    let metadata = match fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(FileAccessError::NotFound(path).into())
        }
        Err(e) => return Err(e.into()),
    };

    if !metadata.is_file() {
        return Err(FileAccessError::NotAFile(path).into());
    }

    let size = metadata.len();
    if size == 0 {
        return Err(FileAccessError::Empty(path).into());
    }
    if size > max_size {
        return Err(FileAccessError::TooLarge {
            path,
            size,
            max: max_size,
        }
        .into());
    }

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let is_image = mime.type_() == mime_guess::mime::IMAGE;

    Ok(AttachmentDescriptor {
        mime_type: mime.to_string(),
        is_image,
        path,
        size,
    })
}
