//! File handle abstraction the follower reads through.

use crate::error::FollowError;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// A readable, re-openable file identified by a path.
pub trait FileSource {
    /// Path the source was opened from.
    fn path(&self) -> &Path;

    /// Size as reported by the filesystem for the path, not by the open
    /// handle. `Ok(None)` means the path no longer exists.
    fn current_len(&self) -> io::Result<Option<u64>>;

    /// Read into `buf` starting at `offset` through the open handle.
    /// Returns 0 at end of file.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Drop the current handle and open the path again.
    fn reopen(&mut self) -> io::Result<()>;
}

/// A file on the local filesystem.
#[derive(Debug)]
pub struct LocalFile {
    path: PathBuf,
    file: File,
}

impl LocalFile {
    /// Open `path` for following. Directories are rejected.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, FollowError> {
        let path = path.into();
        let file = File::open(&path).map_err(|e| FollowError::from_io(&path, e))?;
        let meta = file.metadata().map_err(|e| FollowError::from_io(&path, e))?;
        if meta.is_dir() {
            return Err(FollowError::Io {
                path,
                source: io::Error::new(io::ErrorKind::InvalidInput, "is a directory"),
            });
        }
        tracing::debug!(path = %path.display(), len = meta.len(), "opened file");
        Ok(Self { path, file })
    }
}

impl FileSource for LocalFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn current_len(&self) -> io::Result<Option<u64>> {
        match std::fs::metadata(&self.path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buf)
    }

    fn reopen(&mut self) -> io::Result<()> {
        self.file = File::open(&self.path)?;
        tracing::debug!(path = %self.path.display(), "reopened file");
        Ok(())
    }
}
