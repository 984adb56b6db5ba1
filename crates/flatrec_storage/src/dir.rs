//! Directory-backed volume for host use.

use crate::error::{StorageError, StorageResult};
use crate::time::DateTime;
use crate::volume::{DirEntry, FileHandle, OpenMode, Volume};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

/// A volume rooted at a host directory.
///
/// Volume paths are resolved relative to the root; components that
/// would escape it (`..`, absolute paths) are rejected.
///
/// # Durability
///
/// - `FileHandle::sync()` calls `File::sync_all()` to ensure data is on disk
/// - Modification times come from the host filesystem
///
/// # Example
///
/// ```no_run
/// use flatrec_storage::{DirVolume, OpenMode, Volume};
/// use std::path::Path;
///
/// let mut volume = DirVolume::open(Path::new("card")).unwrap();
/// let mut handle = volume.open("users.csv", OpenMode::ReadWriteCreate).unwrap();
/// handle.write(b"id,name\r\n").unwrap();
/// handle.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct DirVolume {
    root: PathBuf,
}

impl DirVolume {
    /// Opens a volume rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or `root`
    /// exists but is not a directory.
    pub fn open(root: &Path) -> StorageResult<Self> {
        let mut volume = Self {
            root: root.to_path_buf(),
        };
        volume.init()?;
        Ok(volume)
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(path.trim_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn modified_of(metadata: &fs::Metadata) -> Option<DateTime> {
    metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| DateTime::from_unix(elapsed.as_secs()))
}

impl Volume for DirVolume {
    fn init(&mut self) -> StorageResult<()> {
        if !self.root.exists() {
            fs::create_dir_all(&self.root)?;
        }
        if !self.root.is_dir() {
            return Err(StorageError::NotADirectory(self.root.display().to_string()));
        }
        Ok(())
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> StorageResult<Box<dyn FileHandle>> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(StorageError::IsADirectory(path.to_string()));
        }
        if mode == OpenMode::ReadOnly && !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(mode.is_writable())
            .create(mode.is_writable())
            .truncate(mode == OpenMode::CreateTruncate)
            .open(&full)?;

        Ok(Box::new(DirHandle {
            path: path.trim_matches('/').to_string(),
            file: Some(file),
            pos: 0,
        }))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn create_dir(&mut self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if full.exists() {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        fs::create_dir(&full)?;
        Ok(())
    }

    fn list_dir(&self, path: &str) -> StorageResult<Vec<DirEntry>> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        if !full.is_dir() {
            return Err(StorageError::NotADirectory(path.to_string()));
        }

        let mut entries = Vec::new();
        for item in fs::read_dir(&full)? {
            let item = item?;
            let metadata = item.metadata()?;
            entries.push(DirEntry {
                name: item.file_name().to_string_lossy().into_owned(),
                is_dir: metadata.is_dir(),
                size: if metadata.is_dir() { 0 } else { metadata.len() },
                modified: modified_of(&metadata),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn remove_file(&mut self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        fs::remove_file(&full)?;
        Ok(())
    }

    fn remove_dir(&mut self, path: &str) -> StorageResult<()> {
        let full = self.resolve(path)?;
        if !full.exists() {
            return Err(StorageError::NotFound(path.to_string()));
        }
        if fs::read_dir(&full)?.next().is_some() {
            return Err(StorageError::DirectoryNotEmpty(path.to_string()));
        }
        fs::remove_dir(&full)?;
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> StorageResult<()> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if !source.exists() {
            return Err(StorageError::NotFound(from.to_string()));
        }
        if target.exists() {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        fs::rename(&source, &target)?;
        Ok(())
    }

    fn free_space(&self) -> StorageResult<u64> {
        Ok(fs2::available_space(&self.root)?)
    }
}

/// A cursor over one host file.
struct DirHandle {
    path: String,
    file: Option<File>,
    pos: u64,
}

impl DirHandle {
    fn file(&mut self) -> StorageResult<&mut File> {
        self.file.as_mut().ok_or(StorageError::Closed)
    }
}

impl FileHandle for DirHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> StorageResult<u64> {
        let file = self.file.as_ref().ok_or(StorageError::Closed)?;
        Ok(file.metadata()?.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> StorageResult<u64> {
        let current = self.pos;
        let path = self.path.clone();
        let file = self.file()?;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => current as i64 + delta,
            SeekFrom::End(delta) => file.metadata()?.len() as i64 + delta,
        };
        if target < 0 {
            return Err(StorageError::InvalidSeek {
                path,
                offset: target,
            });
        }
        self.pos = file.seek(SeekFrom::Start(target as u64))?;
        Ok(self.pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        let file = self.file()?;
        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        self.pos += filled as u64;
        Ok(filled)
    }

    fn write(&mut self, data: &[u8]) -> StorageResult<usize> {
        let file = self.file()?;
        file.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(data.len())
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        let file = self.file()?;
        let size = file.metadata()?.len();
        if len > size {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to size {len} which is greater than current size {size}"),
            )));
        }
        file.set_len(len)?;
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file()?;
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> StorageResult<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}
