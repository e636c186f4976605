//! One-shot selection of the directory that holds stored artifacts.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::AssetError;

/// Which of the configured directories is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Primary,
    Fallback,
}

/// The artifact directory chosen for this process.
///
/// Built once at startup. If the primary directory cannot be created or
/// written (read-only or restricted runtimes), the fallback is used for the
/// rest of the process lifetime. The handle is immutable after that.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    directory: PathBuf,
    kind: RootKind,
}

impl StorageRoot {
    pub fn initialize<P: AsRef<Path>, F: AsRef<Path>>(
        primary: P,
        fallback: F,
    ) -> Result<Self, AssetError> {
        let primary = primary.as_ref();
        let fallback = fallback.as_ref();

        match prepare_directory(primary) {
            Ok(()) => {
                info!("Storing artifacts in {}", primary.display());
                Ok(Self {
                    directory: primary.to_path_buf(),
                    kind: RootKind::Primary,
                })
            }
            Err(e) => {
                warn!(
                    "Primary artifact directory unusable ({}), falling back to {}",
                    e,
                    fallback.display()
                );
                prepare_directory(fallback)?;
                Ok(Self {
                    directory: fallback.to_path_buf(),
                    kind: RootKind::Fallback,
                })
            }
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn kind(&self) -> RootKind {
        self.kind
    }

    pub fn is_fallback(&self) -> bool {
        self.kind == RootKind::Fallback
    }
}

/// Creates the directory and checks it is writable with a marker file.
fn prepare_directory(path: &Path) -> Result<(), AssetError> {
    std::fs::create_dir_all(path).map_err(|e| AssetError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })?;

    let marker = path.join(format!(".writable-{}", uuid::Uuid::new_v4()));
    let written = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&marker)
        .and_then(|mut file| file.write_all(b"ok"));
    let _ = std::fs::remove_file(&marker);

    written.map_err(|e| AssetError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}
