//! Low-level durability primitives for the event store file.
//!
//! Both file and directory fsyncs are required for crash safety: creating or
//! renaming a file updates the directory entry, and without syncing the
//! directory that entry may not survive a power loss even if the file
//! contents did.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Syncs a file's contents and metadata to disk.
pub fn fsync_file(file: &File) -> io::Result<()> {
    file.sync_all()
}

/// Syncs a directory so that entries created or renamed in it are durable.
pub fn fsync_dir(dir_path: &Path) -> io::Result<()> {
    let dir = OpenOptions::new().read(true).open(dir_path)?;
    dir.sync_all()
}

/// Directory containing `path`, treating a bare file name as the current directory.
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Sibling path used while replacing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the contents of `path` atomically.
///
/// 1. Write `bytes` to `<path>.tmp`
/// 2. fsync the temp file
/// 3. Rename over `path`
/// 4. fsync the parent directory
///
/// Readers observe either the old or the new contents, never a mix.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;

    let tmp = temp_path(path);
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(bytes)?;
        fsync_file(&file)?;
    }

    std::fs::rename(&tmp, path)?;
    fsync_dir(dir)
}

/// Appends `line` (which must end in a newline) to `path` and fsyncs it.
///
/// If the file ends in a torn line from an earlier interrupted write, a
/// newline is inserted first so the torn bytes cannot merge with the new
/// record. If this write fails part-way, the file is truncated back to its
/// previous length.
pub fn append_line(path: &Path, line: &str) -> io::Result<()> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(dir)?;

    let created = !path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .read(true)
        .open(path)?;

    let prior_len = file.metadata()?.len();
    let mut buf = String::with_capacity(line.len() + 1);
    if prior_len > 0 && !ends_with_newline(&mut file)? {
        buf.push('\n');
    }
    buf.push_str(line);

    write_or_rollback(&mut file, prior_len, buf.as_bytes())?;

    if created {
        fsync_dir(dir)?;
    }

    Ok(())
}

/// A writable medium that can be synced and cut back to a given length.
pub trait AppendTarget: Write {
    fn sync(&mut self) -> io::Result<()>;
    fn truncate_to(&mut self, len: u64) -> io::Result<()>;
}

impl AppendTarget for File {
    fn sync(&mut self) -> io::Result<()> {
        fsync_file(self)
    }

    fn truncate_to(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Writes and syncs `bytes`; on failure cuts `target` back to `prior_len`.
///
/// A full medium can accept part of a write before failing. Truncating back
/// keeps those partial bytes from surviving as a torn record.
pub fn write_or_rollback<T: AppendTarget>(
    target: &mut T,
    prior_len: u64,
    bytes: &[u8],
) -> io::Result<()> {
    if let Err(e) = target.write_all(bytes).and_then(|()| target.sync()) {
        // Best effort: a failed truncate leaves a torn tail that the next
        // append or load will step over.
        let _ = target.truncate_to(prior_len);
        return Err(e);
    }
    Ok(())
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
