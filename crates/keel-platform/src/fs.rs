//! Files and directories on wide-character paths.
//!
//! Every path-taking operation has a wide (`&[u16]`) entry point and a
//! `_narrow` (`&str`) twin with identical semantics over the ASCII
//! subset. Open files are owning handles; the OS descriptor is released
//! exactly once, on drop.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use keel_core::calendar::FileTime;
use keel_core::text::wide_to_string;

use crate::error::{PlatformError, Result};
use crate::os;
use crate::time::file_time_from_system;

/// Decodes a wide path into the platform path type.
pub fn path_from_wide(path: &[u16]) -> PathBuf {
    PathBuf::from(wide_to_string(path))
}

// ---------------------------------------------------------------------------
// Attributes and times
// ---------------------------------------------------------------------------

/// Portable file attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileAttributes {
    pub read_only: bool,
    pub hidden: bool,
    pub directory: bool,
}

/// The three tracked file timestamps; `None` where the filesystem does
/// not record one.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileTimes {
    pub creation: Option<FileTime>,
    pub access: Option<FileTime>,
    pub write: Option<FileTime>,
}

/// Seek anchor for [`PlatformFile::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekAnchor {
    Begin,
    Current,
    End,
}

fn attributes_of(path: &Path, meta: &std::fs::Metadata) -> FileAttributes {
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(false);
    FileAttributes {
        read_only: meta.permissions().readonly(),
        hidden,
        directory: meta.is_dir(),
    }
}

// ---------------------------------------------------------------------------
// PlatformFile
// ---------------------------------------------------------------------------

/// Owning read/write file handle.
pub struct PlatformFile {
    file: File,
}

impl PlatformFile {
    /// Creates (or truncates) a file for read/write access.
    pub fn create(path: &[u16]) -> Result<Self> {
        Self::create_at(&path_from_wide(path))
    }

    pub fn create_narrow(path: &str) -> Result<Self> {
        Self::create_at(Path::new(path))
    }

    fn create_at(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(PlatformError::from)?;
        Ok(Self { file })
    }

    /// Opens an existing file for read/write access.
    pub fn open(path: &[u16]) -> Result<Self> {
        Self::open_at(&path_from_wide(path))
    }

    pub fn open_narrow(path: &str) -> Result<Self> {
        Self::open_at(Path::new(path))
    }

    fn open_at(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(PlatformError::from)?;
        Ok(Self { file })
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.file.read(buf).map_err(PlatformError::from)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.file.write(buf).map_err(PlatformError::from)
    }

    /// Forces buffered data to stable storage.
    pub fn flush(&mut self) -> Result<()> {
        self.file.sync_all().map_err(PlatformError::from)
    }

    /// Moves the cursor relative to an anchor; returns the resulting
    /// absolute offset.
    pub fn seek(&mut self, anchor: SeekAnchor, offset: i64) -> Result<u64> {
        let pos = match anchor {
            SeekAnchor::Begin => SeekFrom::Start(offset.max(0) as u64),
            SeekAnchor::Current => SeekFrom::Current(offset),
            SeekAnchor::End => SeekFrom::End(offset),
        };
        self.file.seek(pos).map_err(PlatformError::from)
    }

    pub fn size(&self) -> Result<u64> {
        Ok(self.file.metadata().map_err(PlatformError::from)?.len())
    }

    /// Truncates or extends the file to the current cursor position.
    pub fn set_end_at_cursor(&mut self) -> Result<()> {
        let pos = self.file.stream_position().map_err(PlatformError::from)?;
        self.file.set_len(pos).map_err(PlatformError::from)
    }

    /// Creation/access/write timestamps.
    pub fn times(&self) -> Result<FileTimes> {
        let meta = self.file.metadata().map_err(PlatformError::from)?;
        Ok(FileTimes {
            creation: meta.created().ok().map(file_time_from_system),
            access: meta.accessed().ok().map(file_time_from_system),
            write: meta.modified().ok().map(file_time_from_system),
        })
    }

    /// Rewrites access/write timestamps; `None` preserves a timestamp.
    /// Creation time is not settable on this backend.
    pub fn set_times(&self, access: Option<FileTime>, write: Option<FileTime>) -> Result<()> {
        Ok(os::set_file_times(
            self.file.as_raw_fd(),
            access.map(|t| t.to_epoch_millis()),
            write.map(|t| t.to_epoch_millis()),
        )?)
    }

    pub(crate) fn raw_fd(&self) -> std::os::fd::RawFd {
        self.file.as_raw_fd()
    }
}

// ---------------------------------------------------------------------------
// Path operations
// ---------------------------------------------------------------------------

macro_rules! wide_and_narrow {
    ($(#[$doc:meta])* $wide:ident, $narrow:ident($($arg:ident: $ty:ty),*) -> $ret:ty => $imp:ident) => {
        $(#[$doc])*
        pub fn $wide(path: &[u16] $(, $arg: $ty)*) -> $ret {
            $imp(&path_from_wide(path) $(, $arg)*)
        }

        #[doc = concat!("Narrow twin of [`", stringify!($wide), "`].")]
        pub fn $narrow(path: &str $(, $arg: $ty)*) -> $ret {
            $imp(Path::new(path) $(, $arg)*)
        }
    };
}

wide_and_narrow! {
    /// Removes a file.
    delete_file, delete_file_narrow() -> Result<()> => delete_file_at
}
fn delete_file_at(path: &Path) -> Result<()> {
    std::fs::remove_file(path).map_err(PlatformError::from)
}

wide_and_narrow! {
    /// Reads the portable attribute set of a file or directory.
    file_attributes, file_attributes_narrow() -> Result<FileAttributes> => file_attributes_at
}
fn file_attributes_at(path: &Path) -> Result<FileAttributes> {
    let meta = std::fs::metadata(path).map_err(PlatformError::from)?;
    Ok(attributes_of(path, &meta))
}

wide_and_narrow! {
    /// Applies attributes. Only the read-only bit is settable here;
    /// requesting a hidden-bit change reports `Unsupported` (hidden is a
    /// naming convention on this backend).
    set_file_attributes, set_file_attributes_narrow(attributes: FileAttributes) -> Result<()> => set_file_attributes_at
}
fn set_file_attributes_at(path: &Path, attributes: FileAttributes) -> Result<()> {
    let meta = std::fs::metadata(path).map_err(PlatformError::from)?;
    let current = attributes_of(path, &meta);
    if attributes.hidden != current.hidden {
        return Err(PlatformError::Unsupported);
    }
    let mut permissions = meta.permissions();
    permissions.set_readonly(attributes.read_only);
    std::fs::set_permissions(path, permissions).map_err(PlatformError::from)
}

wide_and_narrow! {
    /// Creates a directory (parents must exist).
    create_directory, create_directory_narrow() -> Result<()> => create_directory_at
}
fn create_directory_at(path: &Path) -> Result<()> {
    std::fs::create_dir(path).map_err(PlatformError::from)
}

wide_and_narrow! {
    /// Removes an empty directory.
    remove_directory, remove_directory_narrow() -> Result<()> => remove_directory_at
}
fn remove_directory_at(path: &Path) -> Result<()> {
    std::fs::remove_dir(path).map_err(PlatformError::from)
}

wide_and_narrow! {
    /// Resolves to an absolute, symlink-free path.
    absolute_path, absolute_path_narrow() -> Result<PathBuf> => absolute_path_at
}
fn absolute_path_at(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(PlatformError::from)
}

wide_and_narrow! {
    /// Changes the current directory of the process.
    set_current_directory, set_current_directory_narrow() -> Result<()> => set_current_directory_at
}
fn set_current_directory_at(path: &Path) -> Result<()> {
    std::env::set_current_dir(path).map_err(PlatformError::from)
}

/// Copies a file, destination first as in the classic surface.
pub fn copy_file(destination: &[u16], source: &[u16]) -> Result<()> {
    copy_file_at(&path_from_wide(destination), &path_from_wide(source))
}

pub fn copy_file_narrow(destination: &str, source: &str) -> Result<()> {
    copy_file_at(Path::new(destination), Path::new(source))
}

fn copy_file_at(destination: &Path, source: &Path) -> Result<()> {
    std::fs::copy(source, destination)
        .map(|_| ())
        .map_err(PlatformError::from)
}

/// Moves (renames) a file or directory tree.
pub fn move_file(destination: &[u16], source: &[u16]) -> Result<()> {
    move_file_at(&path_from_wide(destination), &path_from_wide(source))
}

pub fn move_file_narrow(destination: &str, source: &str) -> Result<()> {
    move_file_at(Path::new(destination), Path::new(source))
}

fn move_file_at(destination: &Path, source: &Path) -> Result<()> {
    std::fs::rename(source, destination).map_err(PlatformError::from)
}

/// Current working directory of the process.
pub fn current_directory() -> Result<PathBuf> {
    std::env::current_dir().map_err(PlatformError::from)
}

/// System scratch directory.
pub fn temp_path() -> PathBuf {
    std::env::temp_dir()
}

/// Whether the path is absolute (`/`-rooted here, drive-rooted on
/// backends with drives).
pub fn is_full_path(path: &[u16]) -> bool {
    path_from_wide(path).is_absolute()
}

pub fn is_full_path_narrow(path: &str) -> bool {
    Path::new(path).is_absolute()
}

// ---------------------------------------------------------------------------
// Directory enumeration
// ---------------------------------------------------------------------------

/// One enumerated directory entry.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub attributes: FileAttributes,
    pub size: u64,
    pub write_time: Option<FileTime>,
}

wide_and_narrow! {
    /// Enumerates the entries of a directory (no `.`/`..`).
    read_directory, read_directory_narrow() -> Result<Vec<DirectoryEntry>> => read_directory_at
}
fn read_directory_at(path: &Path) -> Result<Vec<DirectoryEntry>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(path).map_err(PlatformError::from)? {
        let entry = entry.map_err(PlatformError::from)?;
        let meta = entry.metadata().map_err(PlatformError::from)?;
        entries.push(DirectoryEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            attributes: attributes_of(&entry.path(), &meta),
            size: meta.len(),
            write_time: meta.modified().ok().map(file_time_from_system),
        });
    }
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Disk space
// ---------------------------------------------------------------------------

/// Free and total bytes of the volume holding `path`.
#[derive(Debug, Clone, Copy)]
pub struct DiskSpace {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

wide_and_narrow! {
    /// Queries volume capacity for the volume containing `path`.
    disk_space, disk_space_narrow() -> Result<DiskSpace> => disk_space_at
}
fn disk_space_at(path: &Path) -> Result<DiskSpace> {
    let (free_bytes, total_bytes) = os::disk_space(path)?;
    Ok(DiskSpace {
        free_bytes,
        total_bytes,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::text::wide;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scratch_dir(tag: &str) -> PathBuf {
        static COUNTER: AtomicU32 = AtomicU32::new(0);
        let dir = temp_path().join(format!(
            "keel-fs-{}-{}-{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn create_write_seek_read_round_trip() {
        let dir = scratch_dir("rw");
        let path = dir.join("data.bin");
        let wide_path = wide(path.to_str().unwrap());

        let mut file = PlatformFile::create(&wide_path).unwrap();
        assert_eq!(file.write(b"hello keel").unwrap(), 10);
        file.flush().unwrap();
        assert_eq!(file.size().unwrap(), 10);

        assert_eq!(file.seek(SeekAnchor::Begin, 6).unwrap(), 6);
        let mut buf = [0u8; 4];
        assert_eq!(file.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"keel");

        assert_eq!(file.seek(SeekAnchor::End, -4).unwrap(), 6);
        assert_eq!(file.seek(SeekAnchor::Current, 2).unwrap(), 8);
        drop(file);

        let mut reopened = PlatformFile::open(&wide_path).unwrap();
        assert_eq!(reopened.size().unwrap(), 10);
        reopened.seek(SeekAnchor::Begin, 5).unwrap();
        reopened.set_end_at_cursor().unwrap();
        assert_eq!(reopened.size().unwrap(), 5);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn narrow_and_wide_paths_agree() {
        let dir = scratch_dir("parity");
        let path = dir.join("twin.txt");
        let narrow = path.to_str().unwrap();

        let mut file = PlatformFile::create_narrow(narrow).unwrap();
        file.write(b"x").unwrap();
        drop(file);

        let via_wide = file_attributes(&wide(narrow)).unwrap();
        let via_narrow = file_attributes_narrow(narrow).unwrap();
        assert_eq!(via_wide, via_narrow);

        delete_file(&wide(narrow)).unwrap();
        assert!(PlatformFile::open_narrow(narrow).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn attributes_and_hidden_convention() {
        let dir = scratch_dir("attr");
        let visible = dir.join("plain.txt");
        let hidden = dir.join(".secret");
        std::fs::write(&visible, b"v").unwrap();
        std::fs::write(&hidden, b"h").unwrap();

        let attrs = file_attributes_narrow(visible.to_str().unwrap()).unwrap();
        assert!(!attrs.hidden);
        assert!(!attrs.directory);
        let attrs = file_attributes_narrow(hidden.to_str().unwrap()).unwrap();
        assert!(attrs.hidden);

        // Read-only bit round-trips; clearing it again allows cleanup.
        let target = visible.to_str().unwrap();
        set_file_attributes_narrow(
            target,
            FileAttributes {
                read_only: true,
                hidden: false,
                directory: false,
            },
        )
        .unwrap();
        assert!(file_attributes_narrow(target).unwrap().read_only);
        set_file_attributes_narrow(target, FileAttributes::default()).unwrap();

        // A hidden-bit change is a defined failure.
        let err = set_file_attributes_narrow(
            target,
            FileAttributes {
                hidden: true,
                ..Default::default()
            },
        );
        assert!(matches!(err, Err(PlatformError::Unsupported)));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn directory_lifecycle_and_enumeration() {
        let dir = scratch_dir("dir");
        let sub = dir.join("nested");
        let sub_str = sub.to_str().unwrap();
        create_directory_narrow(sub_str).unwrap();
        std::fs::write(sub.join("a.dat"), b"1234").unwrap();
        std::fs::write(sub.join("b.dat"), b"56").unwrap();

        let mut entries = read_directory_narrow(sub_str).unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.dat");
        assert_eq!(entries[0].size, 4);
        assert!(!entries[0].attributes.directory);
        assert!(entries[0].write_time.is_some());

        std::fs::remove_file(sub.join("a.dat")).unwrap();
        std::fs::remove_file(sub.join("b.dat")).unwrap();
        remove_directory_narrow(sub_str).unwrap();
        assert!(read_directory_narrow(sub_str).is_err());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn copy_and_move() {
        let dir = scratch_dir("cpmv");
        let a = dir.join("a");
        let b = dir.join("b");
        let c = dir.join("c");
        std::fs::write(&a, b"payload").unwrap();

        copy_file_narrow(b.to_str().unwrap(), a.to_str().unwrap()).unwrap();
        assert_eq!(std::fs::read(&b).unwrap(), b"payload");

        move_file_narrow(c.to_str().unwrap(), b.to_str().unwrap()).unwrap();
        assert!(!b.exists());
        assert_eq!(std::fs::read(&c).unwrap(), b"payload");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn file_times_can_be_rewritten() {
        let dir = scratch_dir("times");
        let path = dir.join("stamped");
        let file = PlatformFile::create_narrow(path.to_str().unwrap()).unwrap();

        let stamp = FileTime::from_epoch_millis(1_600_000_000_000);
        file.set_times(Some(stamp), Some(stamp)).unwrap();
        let times = file.times().unwrap();
        assert_eq!(times.write.unwrap().to_epoch_millis(), 1_600_000_000_000);
        assert_eq!(times.access.unwrap().to_epoch_millis(), 1_600_000_000_000);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn volume_and_path_queries() {
        let space = disk_space_narrow("/").unwrap();
        assert!(space.total_bytes > 0);
        assert!(space.total_bytes >= space.free_bytes);

        assert!(is_full_path_narrow("/etc"));
        assert!(!is_full_path_narrow("relative/path"));
        assert!(is_full_path(&wide("/tmp")));

        let cwd = current_directory().unwrap();
        assert!(cwd.is_absolute());
    }
}
