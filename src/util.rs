//! Filesystem helpers shared by staging and the filesystem backend

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::errors::{OcflError, Result};

/// Collect every regular file at or under `path`, following symlinks.
///
/// A regular-file `path` yields itself. Order is directory-traversal order;
/// callers that need determinism sort the result.
pub fn list_files_recursive(path: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    collect_files(path, &mut files)?;
    Ok(files)
}

fn collect_files(path: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let metadata = fs::metadata(path).map_err(|e| OcflError::io_at(path, e))?;

    if metadata.is_file() {
        files.push(path.to_path_buf());
        return Ok(());
    }

    let entries = fs::read_dir(path).map_err(|e| OcflError::io_at(path, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| OcflError::io_at(path, e))?;
        collect_files(&entry.path(), files)?;
    }
    Ok(())
}

/// Copy a file, creating the destination's parent directories
pub fn copy_file_make_parents(src: &Path, dst: &Path) -> Result<()> {
    make_parents(dst)?;
    fs::copy(src, dst).map_err(|e| {
        OcflError::io(
            format!("Failed to copy {} to {}", src.display(), dst.display()),
            e,
        )
    })?;
    Ok(())
}

/// Move a file, creating the destination's parent directories. Falls back
/// to copy + delete when rename crosses a filesystem boundary.
pub fn move_file_make_parents(src: &Path, dst: &Path) -> Result<()> {
    make_parents(dst)?;
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    fs::copy(src, dst).map_err(|e| {
        OcflError::io(
            format!("Failed to move {} to {}", src.display(), dst.display()),
            e,
        )
    })?;
    fs::remove_file(src).map_err(|e| OcflError::io_at(src, e))
}

fn make_parents(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| OcflError::io_at(parent, e))?;
    }
    Ok(())
}

/// Recursively copy a directory tree. Symlinked files are copied through.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| OcflError::io_at(dst, e))?;

    let entries = fs::read_dir(src).map_err(|e| OcflError::io_at(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| OcflError::io_at(src, e))?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if src_path.is_file() {
            fs::copy(&src_path, &dst_path).map_err(|e| {
                OcflError::io(
                    format!(
                        "Failed to copy {} to {}",
                        src_path.display(),
                        dst_path.display()
                    ),
                    e,
                )
            })?;
        }
    }
    Ok(())
}

/// Move a directory into place. The destination must not exist. Falls back
/// to recursive copy + delete across filesystem boundaries.
pub fn move_dir(src: &Path, dst: &Path) -> Result<()> {
    if dst.exists() {
        return Err(OcflError::io(
            format!("Cannot move {} to {}", src.display(), dst.display()),
            io::Error::new(io::ErrorKind::AlreadyExists, "destination exists"),
        ));
    }
    make_parents(dst)?;
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_dir_recursive(src, dst)?;
    fs::remove_dir_all(src).map_err(|e| OcflError::io_at(src, e))
}

/// True when the directory exists and has at least one entry
pub fn has_children(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Remove all empty directories under `root`, deepest first. `root` itself
/// is kept.
pub fn delete_empty_dirs(root: &Path) -> Result<()> {
    if !root.is_dir() {
        return Ok(());
    }
    let entries = fs::read_dir(root).map_err(|e| OcflError::io_at(root, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| OcflError::io_at(root, e))?;
        let path = entry.path();
        if path.is_dir() {
            delete_empty_dirs(&path)?;
            if !has_children(&path) {
                fs::remove_dir(&path).map_err(|e| OcflError::io_at(&path, e))?;
            }
        }
    }
    Ok(())
}

/// Best-effort recursive delete; errors are swallowed.
pub fn safe_delete_dir(path: &Path) {
    if path.exists() {
        let _ = fs::remove_dir_all(path);
    }
}

/// Write bytes to a file and fsync it
pub fn write_file_sync(path: &Path, bytes: &[u8]) -> Result<()> {
    make_parents(path)?;
    let file = File::create(path).map_err(|e| OcflError::io_at(path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(bytes)
        .map_err(|e| OcflError::io_at(path, e))?;
    writer.flush().map_err(|e| OcflError::io_at(path, e))?;
    writer
        .into_inner()
        .map_err(|e| OcflError::io_at(path, e.into_error()))?
        .sync_all()
        .map_err(|e| OcflError::io_at(path, e))
}

/// Open a file for buffered reading
pub fn open_reader(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            OcflError::NotFound(format!("{} does not exist", path.display()))
        } else {
            OcflError::io_at(path, e)
        }
    })?;
    Ok(BufReader::new(file))
}

/// A uniquely named staging directory under the work dir, removed on drop.
///
/// Every mutation allocates one of these, so staging areas are cleaned on
/// every exit path: success, failure, and panic unwinding.
pub struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    /// Create `work_dir/<sanitized-id>-<uuid>`
    pub fn create(work_dir: &Path, object_id: &str) -> Result<StagingDir> {
        let sanitized: String = object_id
            .chars()
            .take(32)
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let path = work_dir.join(format!("{}-{}", sanitized, Uuid::new_v4()));
        fs::create_dir_all(&path).map_err(|e| OcflError::io_at(&path, e))?;
        Ok(StagingDir { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        safe_delete_dir(&self.path);
    }
}
