use thiserror::Error;

/// Size of a sector, in bytes.
///
/// This is the only sector size the filesystem engine understands.
pub const SECTOR_SIZE: usize = 512;

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
/// An error that can occur when performing block device operations.
pub enum BlockDeviceError {
    #[error("I/O error")]
    Io,
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Unsupported operation")]
    Unsupported,
    #[error("Unaligned access")]
    UnalignedAccess,
}

/// A trait for block devices.
///
/// These are the media (disk images, memory-mapped files, real drives) a volume lives on.
/// The medium is opened before it is handed to a filesystem and released after the
/// filesystem gives it back: implementors own its whole lifetime.
pub trait BlockDevice {
    const BLOCK_SIZE: usize;

    /// Read blocks from the device into the given buffer.
    ///
    /// The `offset` parameter specifies the block offset from the start of the device.
    /// The number of blocks read is `dst.len() / Self::BLOCK_SIZE`.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the read operation failed
    /// or if `dst.len()` isn't a multiple or `Self::BLOCK_SIZE`.
    fn read(&mut self, dst: &mut [u8], offset: usize) -> Result<(), BlockDeviceError>;
    /// Write blocks to the device from the given buffer.
    ///
    /// ## Errors
    ///
    /// This function returns an error if the write operation failed
    /// or if `src.len()` isn't a multiple or `Self::BLOCK_SIZE`.
    fn write(&mut self, src: &[u8], offset: usize) -> Result<(), BlockDeviceError>;
}
