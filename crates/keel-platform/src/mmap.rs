//! Whole-file memory-mapped views.
//!
//! A view borrows the file it maps, so the borrow checker enforces the
//! unmap-before-close ordering the OS requires; the mapping itself is
//! released exactly once, on drop.

use std::ops::{Deref, DerefMut};

use crate::error::{PlatformError, Result};
use crate::fs::PlatformFile;
use crate::os;

/// A mapped view over the full contents of a file.
pub struct MappedView<'f> {
    ptr: *mut u8,
    len: usize,
    _file: &'f PlatformFile,
}

// The mapping is plain shared memory; nothing in the view is
// thread-affine.
unsafe impl Send for MappedView<'_> {}
unsafe impl Sync for MappedView<'_> {}

impl PlatformFile {
    /// Maps the whole file into the address space for shared read/write
    /// access. Empty files cannot be mapped.
    pub fn map_view(&self) -> Result<MappedView<'_>> {
        let len = self.size()? as usize;
        if len == 0 {
            return Err(PlatformError::Invalid("cannot map an empty file"));
        }
        let ptr = os::map_file(self.raw_fd(), len)?;
        Ok(MappedView {
            ptr,
            len,
            _file: self,
        })
    }
}

impl MappedView<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Deref for MappedView<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }
}

impl DerefMut for MappedView<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl Drop for MappedView<'_> {
    fn drop(&mut self) {
        os::unmap_file(self.ptr, self.len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{SeekAnchor, temp_path};

    fn scratch_file(tag: &str, contents: &[u8]) -> (std::path::PathBuf, PlatformFile) {
        let path = temp_path().join(format!("keel-map-{}-{}", tag, std::process::id()));
        let mut file = PlatformFile::create_narrow(path.to_str().unwrap()).unwrap();
        file.write(contents).unwrap();
        file.flush().unwrap();
        (path, file)
    }

    #[test]
    fn view_reflects_file_contents() {
        let (path, file) = scratch_file("read", b"mapped bytes");
        {
            let view = file.map_view().unwrap();
            assert_eq!(view.len(), 12);
            assert_eq!(&view[..], b"mapped bytes");
        }
        drop(file);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn writes_through_the_view_reach_the_file() {
        let (path, mut file) = scratch_file("write", b"aaaa");
        {
            let mut view = file.map_view().unwrap();
            view[..4].copy_from_slice(b"zzzz");
        }
        file.seek(SeekAnchor::Begin, 0).unwrap();
        let mut buf = [0u8; 4];
        file.read(&mut buf).unwrap();
        assert_eq!(&buf, b"zzzz");
        drop(file);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn empty_file_is_rejected() {
        let (path, file) = scratch_file("empty", b"");
        assert!(file.map_view().is_err());
        drop(file);
        std::fs::remove_file(path).unwrap();
    }
}
