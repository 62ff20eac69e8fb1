//! Copying routed files into their destination folder

use std::fs::{self, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Why a copy was abandoned. Never fatal; the caller logs it and moves on.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("file has no name: {0}")]
    NoFileName(PathBuf),

    #[error("failed to create directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("copy of {} did not complete: {reason}", .path.display())]
    Aborted { path: PathBuf, reason: String },
}

impl CopyError {
    /// The source file vanished before it could be copied
    pub fn is_not_found(&self) -> bool {
        match self {
            CopyError::Copy { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Copy `source` into `target_dir`, keeping its file name.
///
/// The destination folder is created first, an existing destination file is
/// overwritten, and access/modification times are carried over where the
/// platform allows. Returns the destination path.
pub fn copy_into(source: &Path, target_dir: &Path) -> Result<PathBuf, CopyError> {
    let file_name = source
        .file_name()
        .ok_or_else(|| CopyError::NoFileName(source.to_path_buf()))?;

    fs::create_dir_all(target_dir).map_err(|e| CopyError::CreateDir {
        path: target_dir.to_path_buf(),
        source: e,
    })?;

    let dest = target_dir.join(file_name);

    // Copying a file onto itself would truncate it
    if is_same_file(source, &dest) {
        debug!("Skipping copy onto itself: {}", source.display());
        return Ok(dest);
    }

    if let Err(e) = clear_readonly(&dest) {
        debug!("Could not make {} writable: {}", dest.display(), e);
    }

    info!("Copying {} -> {}", source.display(), dest.display());
    fs::copy(source, &dest).map_err(|e| CopyError::Copy {
        from: source.to_path_buf(),
        to: dest.clone(),
        source: e,
    })?;

    if let Err(e) = preserve_times(source, &dest) {
        debug!("Could not preserve timestamps on {}: {}", dest.display(), e);
    }

    Ok(dest)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Give the owner write access to an existing read-only destination so it
/// can be overwritten. `fs::copy` reapplies the source permissions afterwards.
fn clear_readonly(dest: &Path) -> io::Result<()> {
    let mut permissions = match fs::metadata(dest) {
        Ok(metadata) => metadata.permissions(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if !permissions.readonly() {
        return Ok(());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        permissions.set_mode(permissions.mode() | 0o200);
    }
    #[cfg(not(unix))]
    permissions.set_readonly(false);

    fs::set_permissions(dest, permissions)
}

fn preserve_times(source: &Path, dest: &Path) -> io::Result<()> {
    let metadata = fs::metadata(source)?;
    let mut times = FileTimes::new().set_modified(metadata.modified()?);
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    open_for_times(dest)?.set_times(times)
}

// The copy carries the source permissions, which may be read-only. Setting
// times only needs ownership on unix, so a read handle is enough there.
#[cfg(unix)]
fn open_for_times(dest: &Path) -> io::Result<fs::File> {
    fs::File::open(dest)
}

#[cfg(not(unix))]
fn open_for_times(dest: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().write(true).open(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use predicates::prelude::*;
    use std::fs::OpenOptions;
    use std::time::{Duration, SystemTime};

    #[test]
    fn test_copy_creates_destination_and_keeps_source() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("in/part.stl");
        source.write_str("solid part").unwrap();
        let target = temp.child("out/nested/deeper");

        let dest = copy_into(source.path(), target.path()).unwrap();

        assert_eq!(dest, target.path().join("part.stl"));
        temp.child("out/nested/deeper/part.stl")
            .assert(predicate::str::contains("solid part"));
        source.assert(predicate::path::exists());
    }

    #[test]
    fn test_copy_overwrites_and_is_idempotent() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("in/part.stl");
        source.write_str("v2").unwrap();
        let existing = temp.child("out/part.stl");
        existing.write_str("stale contents").unwrap();

        copy_into(source.path(), &temp.path().join("out")).unwrap();
        let once = std::fs::read(existing.path()).unwrap();
        copy_into(source.path(), &temp.path().join("out")).unwrap();
        let twice = std::fs::read(existing.path()).unwrap();

        assert_eq!(once, b"v2");
        assert_eq!(once, twice);
    }

    #[test]
    fn test_copy_preserves_modification_time() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("part.pts");
        source.write_str("points").unwrap();
        let past = SystemTime::now() - Duration::from_secs(86_400);
        OpenOptions::new()
            .write(true)
            .open(source.path())
            .unwrap()
            .set_modified(past)
            .unwrap();

        let dest = copy_into(source.path(), &temp.path().join("out")).unwrap();

        let copied = std::fs::metadata(dest).unwrap().modified().unwrap();
        let diff = copied
            .duration_since(past)
            .unwrap_or_else(|e| e.duration());
        assert!(diff < Duration::from_secs(2));
    }

    #[test]
    fn test_copy_onto_itself_leaves_file_intact() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("part.stl");
        source.write_str("keep me").unwrap();

        copy_into(source.path(), temp.path()).unwrap();

        source.assert("keep me");
    }

    #[cfg(unix)]
    fn set_mode(path: &std::path::Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_readonly_source_keeps_mtime_and_can_be_copied_again() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("part.stl");
        source.write_str("solid").unwrap();
        let past = SystemTime::now() - Duration::from_secs(86_400);
        OpenOptions::new()
            .write(true)
            .open(source.path())
            .unwrap()
            .set_modified(past)
            .unwrap();
        set_mode(source.path(), 0o444);

        let dest = copy_into(source.path(), &temp.path().join("out")).unwrap();
        let copied = std::fs::metadata(&dest).unwrap().modified().unwrap();
        let diff = copied
            .duration_since(past)
            .unwrap_or_else(|e| e.duration());
        assert!(diff < Duration::from_secs(2));

        let again = copy_into(source.path(), &temp.path().join("out")).unwrap();
        assert_eq!(again, dest);
        temp.child("out/part.stl").assert("solid");
    }

    #[cfg(unix)]
    #[test]
    fn test_readonly_destination_is_overwritten() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("in/part.stl");
        source.write_str("new").unwrap();
        let existing = temp.child("out/part.stl");
        existing.write_str("old").unwrap();
        set_mode(existing.path(), 0o444);

        copy_into(source.path(), &temp.path().join("out")).unwrap();

        existing.assert("new");
    }

    #[test]
    fn test_missing_source_is_reported() {
        let temp = assert_fs::TempDir::new().unwrap();
        let err = copy_into(&temp.path().join("gone.stl"), &temp.path().join("out")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unwritable_target_is_create_dir_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let source = temp.child("part.stl");
        source.write_str("x").unwrap();
        let blocker = temp.child("blocker");
        blocker.write_str("not a directory").unwrap();

        let err = copy_into(source.path(), &blocker.path().join("sub")).unwrap_err();
        assert!(matches!(err, CopyError::CreateDir { .. }));
    }
}
