//! Request-scoped temporary files.
//!
//! A [`StagedFile`] owns a path on local disk for the lifetime of one upload
//! request. Dropping the guard removes the file, so every exit path of a
//! pipeline (including a dropped request future) releases what it staged.

use std::{
    io::{self, ErrorKind},
    ops::Deref,
    path::{Path, PathBuf},
};
use tokio::fs::{self, File, OpenOptions};
use tracing::debug;
use uuid::Uuid;

#[must_use]
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    armed: bool,
}

impl StagedFile {
    /// Create a new, empty file with a collision-free name inside `dir`.
    ///
    /// The file is opened for writing and only adopted once creation
    /// succeeded, so a name clash never deletes a file we did not create.
    pub async fn create(dir: &Path, ext: &str) -> io::Result<(Self, File)> {
        let path = dir.join(format!("upload-{}.{}", Uuid::new_v4(), ext));
        let file = OpenOptions::new()
            .write(true)
            .read(true)
            .create_new(true)
            .open(&path)
            .await?;
        debug!("staged {}", path.display());
        Ok((Self::adopt(path), file))
    }

    /// Take ownership of a path that the current request is about to create.
    pub fn adopt(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now, reporting failures instead of swallowing them.
    /// A file that was never written counts as removed.
    pub async fn cleanup(mut self) -> io::Result<()> {
        self.armed = false;
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("removed staged {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

impl Deref for StagedFile {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
