use alloc::{string::String, vec::Vec};
use thiserror::Error;

pub mod fat;

#[derive(Debug, Error, Clone, Copy, Eq, PartialEq)]
pub enum FileError {
    #[error("I/O error")]
    Io,
    #[error("File not found")]
    NotFound,
    #[error("Invalid path")]
    InvalidPath,
    #[error("Invalid file name")]
    InvalidName,
    #[error("File already exists")]
    AlreadyExists,
    #[error("File system is full")]
    NotEnoughSpace,
    #[error("Unexpected end of file")]
    UnexpectedEof,
    #[error("Not a directory")]
    NotADirectory,
    #[error("Is a directory")]
    IsADirectory,
    #[error("File system is corrupted")]
    CorruptedFS,
    #[error("Unsupported operation")]
    UnsupportedOperation,
}

pub type FileResult<T> = Result<T, FileError>;

/// A trait representing a file system interface.
///
/// This trait defines the basic operations that can be performed on a file system,
/// such as creating, truncating, and reading files.
/// It is designed to be implemented by different file system types,
/// allowing for a uniform interface to interact with various file systems.
///
/// All paths are absolute.
pub trait FileSystem {
    /// Creates a new empty file at the given path, if it does not already exist.
    fn create(&mut self, path: Path) -> FileResult<()>;
    /// Creates a new empty directory at the given path, if it does not already exist.
    fn create_dir(&mut self, path: Path) -> FileResult<()>;
    /// Deletes the file at the given path.
    fn delete(&mut self, path: Path) -> FileResult<()>;
    /// Checks if a file exists at the given path.
    fn exists(&mut self, path: Path) -> FileResult<bool>;
    /// Opens the file at the given path.
    ///
    /// This can be a no-op for some filesystems.
    fn open(&mut self, path: Path) -> FileResult<()>;
    /// Closes the file.
    ///
    /// This can be a no-op for some filesystems.
    fn close(&mut self, path: Path) -> FileResult<()>;
    /// Reads from the file at the given path into the given buffer.
    ///
    /// This returns how many bytes were read.
    fn read(&mut self, path: Path, buffer: &mut [u8], offset: usize) -> FileResult<usize>;
    /// Writes the given buffer to the file at the given path.
    ///
    /// This returns how many bytes were written.
    fn write(&mut self, path: Path, buffer: &[u8], offset: usize) -> FileResult<usize>;
    /// Discards the whole content of the file at the given path.
    fn truncate(&mut self, path: Path) -> FileResult<()>;
    /// Returns information about the file at the given path.
    fn metadata(&mut self, path: Path) -> FileResult<FileMetadata>;
    /// Returns every entry in the directory at the given path.
    fn read_dir(&mut self, path: Path) -> FileResult<Vec<PathBuf>>;
}

#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct PathBuf(String);

#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd)]
pub struct Path<'a>(&'a str);

impl PathBuf {
    #[must_use]
    #[inline]
    /// Creates a new `PathBuf` from the given string.
    pub fn new(path: &str) -> Self {
        Self(String::from(path))
    }

    #[inline]
    #[doc(alias = "push_str")]
    /// Pushes a new path to the current path.
    pub fn push(&mut self, path: &str) {
        self.0.push_str(path);
    }

    #[must_use]
    #[inline]
    pub fn as_path(&self) -> Path<'_> {
        Path(&self.0)
    }

    #[must_use]
    /// Appends a single component, inserting a separator when needed.
    pub fn join(&self, name: &str) -> Self {
        let mut new_path = self.0.clone();
        if !new_path.ends_with('/') {
            new_path.push('/');
        }
        new_path.push_str(name);
        Self(new_path)
    }
}

impl core::borrow::Borrow<str> for PathBuf {
    #[inline]
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl<'a> Path<'a> {
    #[must_use]
    #[inline]
    /// Creates a new `Path` from the given string slice.
    pub const fn new(path: &'a str) -> Self {
        Self(path)
    }

    #[must_use]
    #[inline]
    pub const fn as_str(&self) -> &'a str {
        self.0
    }

    #[must_use]
    #[inline]
    /// Returns true if the path starts at the root directory.
    pub fn is_absolute(&self) -> bool {
        self.0.starts_with('/')
    }
}

impl Path<'_> {
    #[must_use]
    #[inline]
    /// Allocates a new `PathBuf` from the current path.
    pub fn to_owned(&self) -> PathBuf {
        PathBuf::new(self.0)
    }
}

impl<'a> From<&'a str> for Path<'a> {
    #[inline]
    fn from(value: &'a str) -> Self {
        Self(value)
    }
}

impl core::ops::Deref for Path<'_> {
    type Target = str;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.0
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FileType {
    File,
    Directory,
}

impl FileType {
    #[must_use]
    #[inline]
    pub const fn is_directory(self) -> bool {
        matches!(self, Self::Directory)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FileMetadata {
    size: usize,
    file_type: FileType,
}

impl FileMetadata {
    #[must_use]
    #[inline]
    pub const fn new(size: usize, file_type: FileType) -> Self {
        Self { size, file_type }
    }

    #[must_use]
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[must_use]
    #[inline]
    pub const fn file_type(&self) -> FileType {
        self.file_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pathbuf() {
        let mut path = PathBuf::new("/home/user");
        path.push("/documents");
        assert_eq!(path.as_path().as_str(), "/home/user/documents");
    }

    #[test]
    fn test_pathbuf_join() {
        assert_eq!(PathBuf::new("/").join("A.TXT").as_path().as_str(), "/A.TXT");
        assert_eq!(
            PathBuf::new("/DIR").join("A.TXT").as_path().as_str(),
            "/DIR/A.TXT"
        );
    }

    #[test]
    fn test_path_is_absolute() {
        assert!(Path::new("/A/B").is_absolute());
        assert!(!Path::new("A/B").is_absolute());
        assert!(!Path::new("").is_absolute());
    }
}
