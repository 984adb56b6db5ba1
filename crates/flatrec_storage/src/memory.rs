//! In-memory volume for testing and simulation.

use crate::error::{StorageError, StorageResult};
use crate::fault::{FaultKind, FaultPlan};
use crate::time::{DateTime, TimeSource};
use crate::volume::{DeviceStatus, DirEntry, FileHandle, OpenMode, Volume};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

/// Default simulated device capacity: a small 32 MiB card.
const DEFAULT_CAPACITY: u64 = 32 * 1024 * 1024;

#[derive(Debug, Default)]
struct FileData {
    bytes: Vec<u8>,
    modified: Option<DateTime>,
}

type SharedFile = Arc<RwLock<FileData>>;

struct VolumeState {
    files: BTreeMap<String, SharedFile>,
    dirs: BTreeSet<String>,
    capacity: u64,
    status: DeviceStatus,
    init_count: u32,
    time_source: Option<Arc<dyn TimeSource>>,
}

impl Default for VolumeState {
    fn default() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
            capacity: DEFAULT_CAPACITY,
            status: DeviceStatus::default(),
            init_count: 0,
            time_source: None,
        }
    }
}

impl fmt::Debug for VolumeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeState")
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .field("dirs", &self.dirs)
            .field("capacity", &self.capacity)
            .field("status", &self.status)
            .field("init_count", &self.init_count)
            .finish()
    }
}

impl VolumeState {
    fn is_dir(&self, path: &str) -> bool {
        path.is_empty() || self.dirs.contains(path)
    }

    fn used(&self) -> u64 {
        self.files
            .values()
            .map(|file| file.read().bytes.len() as u64)
            .sum()
    }

    fn has_children(&self, path: &str) -> bool {
        self.files.keys().any(|p| parent_of(p) == path)
            || self.dirs.iter().any(|d| parent_of(d) == path)
    }
}

/// An in-memory volume.
///
/// This volume keeps every file in memory and is suitable for:
/// - Unit and integration tests
/// - Simulating device faults through its [`FaultPlan`]
/// - Host-side dry runs that must not touch the disk
///
/// Cloning the volume yields another handle to the same files and fault
/// plan, so a test can inspect contents while the engine owns a clone.
///
/// # Example
///
/// ```rust
/// use flatrec_storage::{InMemoryVolume, OpenMode, Volume};
///
/// let mut volume = InMemoryVolume::new();
/// volume.put_file("users.csv", b"id,name\r\n");
/// let handle = volume.open("users.csv", OpenMode::ReadOnly).unwrap();
/// assert_eq!(handle.size().unwrap(), 9);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryVolume {
    state: Arc<RwLock<VolumeState>>,
    faults: FaultPlan,
}

impl InMemoryVolume {
    /// Creates a new empty volume.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a volume with the given device capacity in bytes.
    #[must_use]
    pub fn with_capacity(capacity: u64) -> Self {
        let volume = Self::default();
        volume.state.write().capacity = capacity;
        volume
    }

    /// Returns the shared fault plan.
    #[must_use]
    pub fn faults(&self) -> FaultPlan {
        self.faults.clone()
    }

    /// Writes a whole file, creating missing parent directories.
    ///
    /// Useful for seeding test fixtures.
    pub fn put_file(&self, path: &str, bytes: &[u8]) {
        let path = path.trim_matches('/').to_string();
        let mut state = self.state.write();
        let mut parent = parent_of(&path).to_string();
        let mut missing = Vec::new();
        while !parent.is_empty() && !state.dirs.contains(&parent) {
            missing.push(parent.clone());
            parent = parent_of(&parent).to_string();
        }
        state.dirs.extend(missing);
        let modified = state.time_source.as_ref().map(|source| source.now());
        state.files.insert(
            path,
            Arc::new(RwLock::new(FileData {
                bytes: bytes.to_vec(),
                modified,
            })),
        );
    }

    /// Returns a copy of a file's contents, if it exists.
    #[must_use]
    pub fn file_contents(&self, path: &str) -> Option<Vec<u8>> {
        self.state
            .read()
            .files
            .get(path.trim_matches('/'))
            .map(|file| file.read().bytes.clone())
    }

    /// Returns every file path on the volume, sorted.
    #[must_use]
    pub fn file_paths(&self) -> Vec<String> {
        self.state.read().files.keys().cloned().collect()
    }

    /// Sets the codes reported by [`Volume::status`].
    pub fn set_status(&self, status: DeviceStatus) {
        self.state.write().status = status;
    }

    /// Returns how many times [`Volume::init`] has succeeded.
    #[must_use]
    pub fn init_count(&self) -> u32 {
        self.state.read().init_count
    }

    fn check(&self, kind: FaultKind) -> StorageResult<()> {
        if self.faults.check(kind) {
            return Err(StorageError::Injected { op: kind.op_name() });
        }
        Ok(())
    }
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map_or("", |(parent, _)| parent)
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn normalize(path: &str) -> StorageResult<String> {
    let trimmed = path.trim_matches('/');
    if trimmed
        .split('/')
        .any(|part| part == ".." || part == "." || (part.is_empty() && !trimmed.is_empty()))
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(trimmed.to_string())
}

impl Volume for InMemoryVolume {
    fn init(&mut self) -> StorageResult<()> {
        self.check(FaultKind::Init)?;
        self.state.write().init_count += 1;
        Ok(())
    }

    fn status(&self) -> DeviceStatus {
        self.state.read().status
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> StorageResult<Box<dyn FileHandle>> {
        self.check(FaultKind::Open)?;
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(StorageError::InvalidPath(path));
        }

        let mut state = self.state.write();
        if state.dirs.contains(&path) {
            return Err(StorageError::IsADirectory(path));
        }

        let file = match (state.files.get(&path).cloned(), mode) {
            (Some(file), OpenMode::CreateTruncate) => {
                file.write().bytes.clear();
                file
            }
            (Some(file), _) => file,
            (None, OpenMode::ReadOnly) => return Err(StorageError::NotFound(path)),
            (None, _) => {
                let parent = parent_of(&path);
                if !state.is_dir(parent) {
                    return Err(StorageError::NotFound(parent.to_string()));
                }
                let modified = state.time_source.as_ref().map(|source| source.now());
                let file = Arc::new(RwLock::new(FileData {
                    bytes: Vec::new(),
                    modified,
                }));
                state.files.insert(path.clone(), Arc::clone(&file));
                file
            }
        };

        Ok(Box::new(MemoryHandle {
            path,
            file,
            pos: 0,
            open: true,
            writable: mode.is_writable(),
            faults: self.faults.clone(),
            time_source: state.time_source.clone(),
        }))
    }

    fn exists(&self, path: &str) -> bool {
        let path = path.trim_matches('/');
        let state = self.state.read();
        state.is_dir(path) || state.files.contains_key(path)
    }

    fn create_dir(&mut self, path: &str) -> StorageResult<()> {
        self.check(FaultKind::Directory)?;
        let path = normalize(path)?;
        let mut state = self.state.write();
        if path.is_empty() || state.dirs.contains(&path) || state.files.contains_key(&path) {
            return Err(StorageError::AlreadyExists(path));
        }
        if !state.is_dir(parent_of(&path)) {
            return Err(StorageError::NotFound(parent_of(&path).to_string()));
        }
        state.dirs.insert(path);
        Ok(())
    }

    fn list_dir(&self, path: &str) -> StorageResult<Vec<DirEntry>> {
        let path = normalize(path)?;
        let state = self.state.read();
        if !state.is_dir(&path) {
            return Err(if state.files.contains_key(&path) {
                StorageError::NotADirectory(path)
            } else {
                StorageError::NotFound(path)
            });
        }

        let mut entries: Vec<DirEntry> = state
            .dirs
            .iter()
            .filter(|dir| parent_of(dir) == path)
            .map(|dir| DirEntry {
                name: name_of(dir).to_string(),
                is_dir: true,
                size: 0,
                modified: None,
            })
            .chain(
                state
                    .files
                    .iter()
                    .filter(|(file_path, _)| parent_of(file_path) == path)
                    .map(|(file_path, file)| {
                        let data = file.read();
                        DirEntry {
                            name: name_of(file_path).to_string(),
                            is_dir: false,
                            size: data.bytes.len() as u64,
                            modified: data.modified,
                        }
                    }),
            )
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn remove_file(&mut self, path: &str) -> StorageResult<()> {
        self.check(FaultKind::Directory)?;
        let path = normalize(path)?;
        let mut state = self.state.write();
        if state.dirs.contains(&path) {
            return Err(StorageError::IsADirectory(path));
        }
        state
            .files
            .remove(&path)
            .map(|_| ())
            .ok_or(StorageError::NotFound(path))
    }

    fn remove_dir(&mut self, path: &str) -> StorageResult<()> {
        self.check(FaultKind::Directory)?;
        let path = normalize(path)?;
        let mut state = self.state.write();
        if !state.dirs.contains(&path) {
            return Err(if state.files.contains_key(&path) {
                StorageError::NotADirectory(path)
            } else {
                StorageError::NotFound(path)
            });
        }
        if state.has_children(&path) {
            return Err(StorageError::DirectoryNotEmpty(path));
        }
        state.dirs.remove(&path);
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> StorageResult<()> {
        self.check(FaultKind::Directory)?;
        let from = normalize(from)?;
        let to = normalize(to)?;
        let mut state = self.state.write();
        if state.files.contains_key(&to) || state.dirs.contains(&to) {
            return Err(StorageError::AlreadyExists(to));
        }
        if !state.is_dir(parent_of(&to)) {
            return Err(StorageError::NotFound(parent_of(&to).to_string()));
        }
        let file = state
            .files
            .remove(&from)
            .ok_or_else(|| StorageError::NotFound(from.clone()))?;
        state.files.insert(to, file);
        Ok(())
    }

    fn free_space(&self) -> StorageResult<u64> {
        let state = self.state.read();
        Ok(state.capacity.saturating_sub(state.used()))
    }

    fn set_time_source(&mut self, source: Box<dyn TimeSource>) {
        self.state.write().time_source = Some(Arc::from(source));
    }
}

/// A cursor over one in-memory file.
struct MemoryHandle {
    path: String,
    file: SharedFile,
    pos: u64,
    open: bool,
    writable: bool,
    faults: FaultPlan,
    time_source: Option<Arc<dyn TimeSource>>,
}

impl MemoryHandle {
    fn check(&self, kind: FaultKind) -> StorageResult<()> {
        if !self.open {
            return Err(StorageError::Closed);
        }
        if self.faults.check(kind) {
            return Err(StorageError::Injected { op: kind.op_name() });
        }
        Ok(())
    }

    fn touch(&self, data: &mut FileData) {
        if let Some(source) = &self.time_source {
            data.modified = Some(source.now());
        }
    }
}

impl FileHandle for MemoryHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn position(&self) -> u64 {
        self.pos
    }

    fn size(&self) -> StorageResult<u64> {
        if !self.open {
            return Err(StorageError::Closed);
        }
        Ok(self.file.read().bytes.len() as u64)
    }

    fn seek(&mut self, pos: SeekFrom) -> StorageResult<u64> {
        self.check(FaultKind::Seek)?;
        let len = self.file.read().bytes.len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
            SeekFrom::End(delta) => len + delta,
        };
        if target < 0 {
            return Err(StorageError::InvalidSeek {
                path: self.path.clone(),
                offset: target,
            });
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> StorageResult<usize> {
        self.check(FaultKind::Read)?;
        let data = self.file.read();
        let start = (self.pos as usize).min(data.bytes.len());
        let n = buf.len().min(data.bytes.len() - start);
        buf[..n].copy_from_slice(&data.bytes[start..start + n]);
        drop(data);
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, bytes: &[u8]) -> StorageResult<usize> {
        self.check(FaultKind::Write)?;
        if !self.writable {
            return Err(StorageError::ReadOnly(self.path.clone()));
        }
        let n = self.faults.write_limit(bytes.len());
        let mut data = self.file.write();
        let start = self.pos as usize;
        if data.bytes.len() < start {
            data.bytes.resize(start, 0);
        }
        let overlap = (data.bytes.len() - start).min(n);
        data.bytes[start..start + overlap].copy_from_slice(&bytes[..overlap]);
        data.bytes.extend_from_slice(&bytes[overlap..n]);
        self.touch(&mut data);
        drop(data);
        self.pos += n as u64;
        Ok(n)
    }

    fn truncate(&mut self, len: u64) -> StorageResult<()> {
        self.check(FaultKind::Truncate)?;
        if !self.writable {
            return Err(StorageError::ReadOnly(self.path.clone()));
        }
        let mut data = self.file.write();
        let current = data.bytes.len() as u64;
        if len > current {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("cannot truncate to size {len} which is greater than current size {current}"),
            )));
        }
        data.bytes.truncate(len as usize);
        self.touch(&mut data);
        Ok(())
    }

    fn sync(&mut self) -> StorageResult<()> {
        // Nothing is buffered; only the fault hook matters here
        self.check(FaultKind::Sync)
    }

    fn close(&mut self) -> StorageResult<()> {
        self.open = false;
        Ok(())
    }
}
