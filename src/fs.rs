//! Local filesystem observations and positional file I/O.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// What the local filesystem says about one regular file.
///
/// An absent file is represented by `size == 0 && timestamp == 0`; a present
/// file always carries a strictly positive modification timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Path (or bare name, for directory listings), at most 255 bytes.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Modification time, seconds since the Unix epoch.
    pub timestamp: u32,
}

impl FileInfo {
    /// The observation of a file that does not exist.
    #[must_use]
    pub fn absent(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            timestamp: 0,
        }
    }

    /// True if this observation stands for a missing file.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.size == 0 && self.timestamp == 0
    }
}

fn unix_timestamp(meta: &std::fs::Metadata) -> u32 {
    meta.modified()
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |age| u32::try_from(age.as_secs()).unwrap_or(u32::MAX))
}

/// Stats one path. `Ok(None)` means no regular file exists there.
pub fn file_info(path: &str) -> io::Result<Option<FileInfo>> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some(FileInfo {
            path: path.to_owned(),
            size: meta.len(),
            timestamp: unix_timestamp(&meta),
        })),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Enumerates the regular files directly inside `path` (non-recursive;
/// subdirectories are skipped). Entries carry bare names, not full paths.
///
/// Entries that cannot be statted are skipped, as are names too long for the
/// wire format.
pub fn list_dir(path: &str) -> io::Result<Vec<FileInfo>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let Ok(entry) = entry else { continue };
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let Ok(meta) = entry.metadata() else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.len() > crate::protocol::MAX_PATH_BYTES {
            tracing::warn!("skipping entry with over-long name in {path:?}");
            continue;
        }
        entries.push(FileInfo {
            path: name,
            size: meta.len(),
            timestamp: unix_timestamp(&meta),
        });
    }
    Ok(entries)
}

/// Opens a file for sequential/positional reading.
pub fn open_read(path: &str) -> io::Result<File> {
    File::open(path)
}

/// Opens (creating or truncating) a file for writing.
pub fn open_truncate(path: &str) -> io::Result<File> {
    File::create(path)
}

/// Opens an existing file for combined positional read and write.
pub fn open_read_write(path: &str) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(Path::new(path))
}

/// Reads as much of `buf` as the file holds at `offset`; returns the number
/// of bytes read (short only at end of file).
pub fn read_chunk(file: &mut File, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    file.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Writes all of `bytes` at `offset`.
pub fn write_chunk(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)
}

#[cfg(test)]
mod tests {
    use super::{file_info, list_dir, open_read_write, read_chunk, write_chunk, FileInfo};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn path_str(dir: &TempDir, name: &str) -> String {
        dir.path().join(name).to_string_lossy().into_owned()
    }

    #[test]
    fn absent_observation() {
        let info = FileInfo::absent("nope");
        assert!(info.is_absent());
        assert_eq!(info.path, "nope");
    }

    #[test]
    fn stat_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(file_info(&path_str(&dir, "missing")).unwrap(), None);
    }

    #[test]
    fn stat_directory_is_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            file_info(&dir.path().to_string_lossy()).unwrap(),
            None
        );
    }

    #[test]
    fn stat_reports_size_and_positive_timestamp() {
        let dir = TempDir::new().unwrap();
        let path = path_str(&dir, "ten");
        std::fs::write(&path, b"ABCDEFGHIJ").unwrap();
        let info = file_info(&path).unwrap().unwrap();
        assert_eq!(info.size, 10);
        assert!(info.timestamp > 0);
        assert!(!info.is_absent());
    }

    #[test]
    fn listing_skips_subdirectories() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("one"), b"1").unwrap();
        std::fs::write(dir.path().join("two"), b"22").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("nested"), b"x").unwrap();

        let mut names: Vec<String> = list_dir(&dir.path().to_string_lossy())
            .unwrap()
            .into_iter()
            .map(|e| e.path)
            .collect();
        names.sort();
        assert_eq!(names, ["one", "two"]);
    }

    #[test]
    fn listing_empty_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(list_dir(&dir.path().to_string_lossy()).unwrap().is_empty());
    }

    #[test]
    fn listing_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(list_dir(&path_str(&dir, "nope")).is_err());
    }

    #[test]
    fn positional_read_write() {
        let dir = TempDir::new().unwrap();
        let path = path_str(&dir, "f");
        std::fs::write(&path, b"0123456789").unwrap();

        let mut file = open_read_write(&path).unwrap();
        write_chunk(&mut file, 4, b"XY").unwrap();

        let mut buf = [0u8; 16];
        let n = read_chunk(&mut file, 2, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"23XY6789");
    }
}
