//! The seam between the endpoint and persistent storage.
//!
//! The endpoint needs very little from a file system: random-access
//! reads for block transfer and FETCH, overwriting creation for
//! received transfers, and appends for iPATCH. [`crate::std::DirFs`]
//! implements this over a directory; tests use an in-memory map.

/// A byte-oriented file, open for reading or writing.
pub trait File {
  /// The error yielded by file operations
  type Error: core::fmt::Debug;

  /// Read up to `buf.len()` bytes from the current position,
  /// yielding how many were read (0 at end of file).
  fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

  /// Write all of `bytes` at the current position.
  fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;

  /// Move the cursor to `pos` bytes from the start.
  fn seek(&mut self, pos: u64) -> Result<(), Self::Error>;

  /// Total size of the file in bytes.
  fn size(&mut self) -> Result<u64, Self::Error>;
}

/// A named collection of [`File`]s.
pub trait FileSystem {
  /// The error yielded when a file can't be opened
  type Error: core::fmt::Debug;

  /// The file handles this file system yields
  type File: File<Error = Self::Error>;

  /// Open an existing file for reading.
  fn open_read(&mut self, name: &str) -> Result<Self::File, Self::Error>;

  /// Create `name` (truncating any existing content) for writing.
  fn create(&mut self, name: &str) -> Result<Self::File, Self::Error>;

  /// Open `name` for appending, creating it if absent.
  fn open_append(&mut self, name: &str) -> Result<Self::File, Self::Error>;
}
