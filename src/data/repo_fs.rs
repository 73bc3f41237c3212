//! Filesystem-backed dataset container.
//!
//! The container file is read once at open and all mutations stay in memory.
//! `commit` writes a temp sibling and renames it over the original, so the
//! file on disk is either untouched or fully updated.
//!
//! TODO: Stream column payloads instead of holding the whole document once
//!       containers outgrow memory.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::common::error::{AnnotateError, AnnotateResult};

use super::domain::{Container, Document, RowTable};

/// Fail with `MissingInput` unless `path` exists.
pub fn ensure_exists(path: &Path) -> AnnotateResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(AnnotateError::MissingInput {
            path: path.to_path_buf(),
        })
    }
}

/// Locks older than this are reclaimed when their owner cannot be checked.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(12 * 60 * 60);

/// Exclusive writer lock, removed on drop.
///
/// The lock file records the owner's pid and creation time. A lock left behind
/// by a process that died without dropping it is reclaimed by the next writer.
#[derive(Debug)]
struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    fn acquire(container: &Path) -> AnnotateResult<Self> {
        let path = sibling(container, "lock");
        let content = format!(
            "unix_time_ms={}\npid={}\n",
            unix_time_ms(),
            std::process::id()
        );
        let open_err = |err: io::Error| AnnotateError::container_open(container, err);
        let locked = || AnnotateError::ContainerLocked {
            path: container.to_path_buf(),
        };

        match create_lock(&path, &content) {
            Ok(()) => return Ok(Self { path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(open_err(err)),
        }

        if !is_lock_stale(&path).map_err(open_err)? {
            return Err(locked());
        }
        warn!(lock = %path.display(), "reclaiming stale container lock");
        let _ = fs::remove_file(&path);
        match create_lock(&path, &content) {
            Ok(()) => Ok(Self { path }),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Err(locked()),
            Err(err) => Err(open_err(err)),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

fn create_lock(path: &Path, content: &str) -> io::Result<()> {
    let mut f = OpenOptions::new().create_new(true).write(true).open(path)?;
    let written = f.write_all(content.as_bytes()).and_then(|_| f.sync_all());
    if written.is_err() {
        let _ = fs::remove_file(path);
    }
    written
}

/// A lock is stale when its owner is gone, or when liveness cannot be checked
/// and it is older than [`LOCK_STALE_AFTER`].
fn is_lock_stale(path: &Path) -> io::Result<bool> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(true),
        Err(err) => return Err(err),
    };

    let mut pid = None;
    let mut created_ms = None;
    for line in content.lines() {
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        match k.trim() {
            "pid" => pid = v.trim().parse::<u32>().ok(),
            "unix_time_ms" => created_ms = v.trim().parse::<u64>().ok(),
            _ => {}
        }
    }

    if let Some(alive) = pid.and_then(owner_alive) {
        return Ok(!alive);
    }
    let age = match created_ms {
        Some(ms) => Duration::from_millis(unix_time_ms().saturating_sub(ms)),
        None => fs::metadata(path)?
            .modified()?
            .elapsed()
            .unwrap_or_default(),
    };
    Ok(age >= LOCK_STALE_AFTER)
}

/// `None` where there is no procfs to ask.
fn owner_alive(pid: u32) -> Option<bool> {
    let proc_root = Path::new("/proc");
    if !proc_root.join("self").exists() {
        return None;
    }
    Some(proc_root.join(pid.to_string()).exists())
}

fn unix_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Container opened in update mode.
#[derive(Debug)]
pub struct FsContainer {
    path: PathBuf,
    doc: Document,
    _lock: LockGuard,
}

impl FsContainer {
    pub fn open(path: impl Into<PathBuf>) -> AnnotateResult<Self> {
        let path = path.into();
        ensure_exists(&path)?;
        let lock = LockGuard::acquire(&path)?;

        let file = File::open(&path).map_err(|err| AnnotateError::container_open(&path, err))?;
        let doc: Document = serde_json::from_reader(BufReader::new(file))
            .map_err(|err| AnnotateError::container_open(&path, err))?;
        doc.validate()
            .map_err(|reason| AnnotateError::container_open(&path, reason))?;

        debug!(path = %path.display(), directories = doc.directories.len(), "opened container");
        Ok(Self {
            path,
            doc,
            _lock: lock,
        })
    }

    /// Write a new container file. Fails if `path` already exists.
    pub fn create(path: &Path, doc: &Document) -> AnnotateResult<()> {
        doc.validate().map_err(AnnotateError::Inconsistent)?;
        let bytes = encode(doc)?;
        let mut f = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(path)
            .map_err(|source| persist_err(path, source))?;
        f.write_all(&bytes)
            .and_then(|_| f.sync_all())
            .map_err(|source| persist_err(path, source))
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }
}

impl Container for FsContainer {
    type Table = RowTable;

    fn keys(&self) -> Vec<String> {
        self.doc.keys()
    }

    fn table_mut(&mut self, dir: &str, table: &str) -> Option<&mut RowTable> {
        self.doc.table_mut(dir, table)
    }

    fn commit(&mut self) -> AnnotateResult<()> {
        self.doc.validate().map_err(AnnotateError::Inconsistent)?;
        let bytes = encode(&self.doc)?;
        write_atomic(&self.path, &bytes).map_err(|source| persist_err(&self.path, source))?;
        info!(path = %self.path.display(), bytes = bytes.len(), "container written");
        Ok(())
    }
}

fn encode(doc: &Document) -> AnnotateResult<Vec<u8>> {
    serde_json::to_vec(doc).map_err(|err| AnnotateError::Inconsistent(err.to_string()))
}

fn persist_err(path: &Path, source: io::Error) -> AnnotateError {
    AnnotateError::Persist {
        path: path.to_path_buf(),
        source,
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = sibling(path, &format!("tmp.{}", std::process::id()));
    let written = (|| {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}
