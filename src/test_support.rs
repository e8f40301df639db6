use crate::config::LockConfig;
use crate::fs::{FileHandle, FileKind, FileSystem, StdFileSystem};
use crate::host::{HostIdentity, OwnerCheck};
use crate::locks::member::{LockKind, MemberRecord};
use crate::locks::naming::lock_directory_path;
use crate::locks::{LockManager, context::LockContext};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tempfile::TempDir;

/// Machine id used by test lockers.
pub(crate) const TEST_HOST: &str = "test-host";

/// A scratch directory holding one resource to lock.
pub(crate) struct TestBed {
    _temp_dir: TempDir,
    pub resource: PathBuf,
    pub identity: HostIdentity,
    pub config: LockConfig,
    pub fs: Arc<dyn FileSystem>,
    pub owner_check: ScriptedOwnerCheck,
}

impl TestBed {
    pub(crate) fn new() -> Self {
        Self::with_config(LockConfig::default())
    }

    pub(crate) fn with_config(config: LockConfig) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let resource = temp_dir.path().join("disk.img");
        Self {
            _temp_dir: temp_dir,
            resource,
            identity: HostIdentity::new(TEST_HOST, "1000"),
            config,
            fs: Arc::new(StdFileSystem),
            owner_check: ScriptedOwnerCheck::default(),
        }
    }

    pub(crate) fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub(crate) fn with_dead_execution(self, execution_id: &str) -> Self {
        self.owner_check.kill(execution_id);
        self
    }

    pub(crate) fn context(&self) -> LockContext<'_> {
        LockContext {
            fs: self.fs.as_ref(),
            owner_check: &self.owner_check,
            identity: &self.identity,
            config: &self.config,
        }
    }

    /// Manager for this bed's identity.
    pub(crate) fn manager(&self) -> LockManager {
        self.manager_as(&self.identity.execution_id)
    }

    /// Manager for another execution on the same host.
    pub(crate) fn manager_as(&self, execution_id: &str) -> LockManager {
        LockManager::with_collaborators(
            self.config.clone(),
            HostIdentity::new(TEST_HOST, execution_id),
            self.fs.clone(),
            Arc::new(self.owner_check.clone()),
        )
        .unwrap()
    }

    pub(crate) fn lock_dir(&self) -> PathBuf {
        lock_directory_path(&self.resource)
    }

    pub(crate) fn create_lock_dir(&self) -> PathBuf {
        let lock_dir = self.lock_dir();
        std::fs::create_dir_all(&lock_dir).unwrap();
        lock_dir
    }

    /// Write a well-formed member file directly.
    pub(crate) fn write_member(
        &self,
        name: &str,
        machine_id: &str,
        execution_id: &str,
        lamport_number: u64,
        kind: LockKind,
    ) {
        let record = MemberRecord {
            machine_id: machine_id.to_string(),
            execution_id: execution_id.to_string(),
            lamport_number,
            kind,
            payload: String::new(),
        };
        let bytes = record.encode(self.config.member_file_size).unwrap();
        std::fs::write(self.lock_dir().join(name), bytes).unwrap();
    }

    /// Sorted names in the lock directory; empty if it does not exist.
    pub(crate) fn entry_names(&self) -> Vec<String> {
        entry_names(&self.lock_dir())
    }
}

pub(crate) fn entry_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// `line` NUL padded to `size` bytes, bypassing record validation.
pub(crate) fn raw_member_bytes(line: &str, size: usize) -> Vec<u8> {
    let mut bytes = line.as_bytes().to_vec();
    bytes.resize(size, 0);
    bytes
}

/// Owner check whose dead executions are chosen by the test.
///
/// Clones share the same set, so a test can kill an owner while a lock
/// request is waiting on it.
#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedOwnerCheck {
    dead: Arc<Mutex<HashSet<String>>>,
}

impl ScriptedOwnerCheck {
    pub(crate) fn kill(&self, execution_id: &str) {
        self.dead.lock().unwrap().insert(execution_id.to_string());
    }
}

impl OwnerCheck for ScriptedOwnerCheck {
    fn is_valid_owner(&self, execution_id: &str, _payload: &str) -> bool {
        !self.dead.lock().unwrap().contains(execution_id)
    }
}

/// Injected failure mode.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Fault {
    /// Every mutating call fails with this error kind.
    Refuse(io::ErrorKind),
    /// Creating any entry directory reports that it already exists.
    EntryCollision,
}

/// `StdFileSystem` with an injected fault and a count of attempted mutations.
#[derive(Debug)]
pub(crate) struct FaultyFileSystem {
    fault: Fault,
    mutations: AtomicUsize,
}

impl FaultyFileSystem {
    pub(crate) fn new(fault: Fault) -> Self {
        Self {
            fault,
            mutations: AtomicUsize::new(0),
        }
    }

    pub(crate) fn read_only() -> Self {
        Self::new(Fault::Refuse(io::ErrorKind::ReadOnlyFilesystem))
    }

    pub(crate) fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    fn mutate(&self) -> io::Result<()> {
        self.mutations.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::Refuse(kind) => Err(io::Error::from(kind)),
            Fault::EntryCollision => Ok(()),
        }
    }
}

impl FileSystem for FaultyFileSystem {
    fn file_kind(&self, path: &Path) -> io::Result<FileKind> {
        StdFileSystem.file_kind(path)
    }

    fn create_directory(&self, path: &Path) -> io::Result<()> {
        self.mutate()?;
        let is_entry_directory = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('D'));
        if matches!(self.fault, Fault::EntryCollision) && is_entry_directory {
            return Err(io::Error::from(io::ErrorKind::AlreadyExists));
        }
        StdFileSystem.create_directory(path)
    }

    fn delete_directory(&self, path: &Path) -> io::Result<()> {
        self.mutate()?;
        StdFileSystem.delete_directory(path)
    }

    fn create_new(&self, path: &Path) -> io::Result<Box<dyn FileHandle>> {
        self.mutate()?;
        StdFileSystem.create_new(path)
    }

    fn open_read_only(&self, path: &Path) -> io::Result<Box<dyn FileHandle>> {
        StdFileSystem.open_read_only(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.mutate()?;
        StdFileSystem.rename(from, to)
    }

    fn delete_file(&self, path: &Path) -> io::Result<()> {
        self.mutate()?;
        StdFileSystem.delete_file(path)
    }

    fn list_directory(&self, path: &Path) -> io::Result<Vec<String>> {
        StdFileSystem.list_directory(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        StdFileSystem.modified(path)
    }
}
