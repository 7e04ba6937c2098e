//! File Allocation Table (FAT32) file system implementation.
//!
//! Only the single layout family described by [`bpb::Bpb::validate`] is supported:
//! 512-byte sectors, one sector per cluster, two FATs and the root directory at cluster 2.
//!
//! ## Consistency
//!
//! Every operation is a sequence of whole-sector read-modify-writes with no journal.
//! A logical update that touches several sectors (for instance allocating a cluster and
//! recording it in a directory entry) is not atomic: if the device fails in between,
//! the volume is left with a cluster marked as allocated in the FAT but not reachable
//! from any file, or the other way around. There is no recovery path.
use super::{FileError, FileMetadata, FileResult, FileSystem, FileType, Path, PathBuf};
use crate::{BlockDevice, BlockDeviceError, SECTOR_SIZE};
use alloc::vec::Vec;
use thiserror::Error;

pub mod bpb;
pub mod dir;
pub mod dirent;
#[expect(clippy::module_inception, reason = "FS is named after this table")]
pub mod fat;
pub mod file;
pub mod inode;
pub mod path;

use bpb::{Bpb, VolumeDescriptor};
use fat::{ClusterAllocator, LinearScan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cluster(u32);

impl Cluster {
    /// First cluster of the data region.
    pub const FIRST_DATA: Self = Self(2);
    /// Largest cluster number a FAT32 entry can link to.
    const MAX_DATA: u32 = 0x0FFF_FFEF;

    #[must_use]
    #[inline]
    pub const fn new(cluster: u32) -> Self {
        Self(cluster)
    }

    #[must_use]
    #[inline]
    pub const fn value(&self) -> u32 {
        self.0
    }

    #[must_use]
    #[inline]
    /// Returns true if the cluster can hold data.
    ///
    /// Clusters 0 and 1 are reserved and never allocated.
    pub const fn is_valid(&self) -> bool {
        self.0 >= Self::FIRST_DATA.0 && self.0 <= Self::MAX_DATA
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
/// Invariant violations found while walking on-disk structures.
pub enum Corruption {
    #[error("free cluster inside a chain")]
    FreeInChain,
    #[error("bad cluster inside a chain")]
    BadInChain,
    #[error("chain links to a reserved or out-of-range cluster")]
    InvalidLink,
    #[error("cluster chain does not terminate")]
    EndlessChain,
    #[error("chain is shorter than the recorded size")]
    ChainTooShort,
    #[error("directory has no free slot")]
    NoFreeSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
/// Error type for FAT filesystem operations
pub enum FatError {
    #[error("I/O error")]
    Io,
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Invalid boot sector")]
    InvalidBootSector,
    #[error("Unsupported volume geometry")]
    UnsupportedGeometry,
    #[error("Not found")]
    NotFound,
    #[error("Invalid file name")]
    InvalidName,
    #[error("Invalid path")]
    InvalidPath,
    #[error("Invalid offset")]
    InvalidOffset,
    #[error("Invalid cluster")]
    InvalidCluster,
    #[error("No free cluster left")]
    OutOfSpace,
    #[error("Not a directory")]
    NotADirectory,
    #[error("Is a directory")]
    IsADirectory,
    #[error("Already exists")]
    AlreadyExists,
    #[error("Corrupted volume: {0}")]
    CorruptVolume(#[from] Corruption),
}

pub type FatResult<T> = Result<T, FatError>;

impl From<BlockDeviceError> for FatError {
    fn from(error: BlockDeviceError) -> Self {
        match error {
            BlockDeviceError::OutOfBounds => Self::OutOfBounds,
            BlockDeviceError::Io
            | BlockDeviceError::UnalignedAccess
            | BlockDeviceError::Unsupported => Self::Io,
        }
    }
}

impl From<FatError> for FileError {
    fn from(error: FatError) -> Self {
        match error {
            FatError::Io => Self::Io,
            FatError::NotFound => Self::NotFound,
            FatError::InvalidName => Self::InvalidName,
            FatError::InvalidPath => Self::InvalidPath,
            FatError::OutOfBounds | FatError::InvalidOffset => Self::UnexpectedEof,
            FatError::OutOfSpace => Self::NotEnoughSpace,
            FatError::NotADirectory => Self::NotADirectory,
            FatError::IsADirectory => Self::IsADirectory,
            FatError::AlreadyExists => Self::AlreadyExists,
            FatError::InvalidCluster | FatError::CorruptVolume(_) => Self::CorruptedFS,
            FatError::InvalidBootSector | FatError::UnsupportedGeometry => {
                Self::UnsupportedOperation
            }
        }
    }
}

/// Reports a corruption, leaving a trace in the log.
fn corrupt(kind: Corruption) -> FatError {
    log::warn!("FAT volume is corrupted: {kind}");
    FatError::CorruptVolume(kind)
}

#[inline]
pub(crate) fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

#[inline]
pub(crate) fn le_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Behaviour switches applied at mount time.
pub struct MountOptions {
    fat_mirroring: bool,
    truncate_reclaim: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl MountOptions {
    #[must_use]
    #[inline]
    pub const fn new() -> Self {
        Self {
            fat_mirroring: true,
            truncate_reclaim: false,
        }
    }

    #[must_use]
    #[inline]
    /// Writes every FAT update to all FAT copies instead of the first one only.
    pub const fn with_fat_mirroring(mut self, enabled: bool) -> Self {
        self.fat_mirroring = enabled;
        self
    }

    #[must_use]
    #[inline]
    /// Makes truncation return clusters to the free pool.
    ///
    /// When disabled, truncated clusters are marked as end-of-chain and are never
    /// handed out again by the allocator.
    pub const fn with_truncate_reclaim(mut self, enabled: bool) -> Self {
        self.truncate_reclaim = enabled;
        self
    }

    #[must_use]
    #[inline]
    pub const fn fat_mirroring(&self) -> bool {
        self.fat_mirroring
    }

    #[must_use]
    #[inline]
    pub const fn truncate_reclaim(&self) -> bool {
        self.truncate_reclaim
    }
}

/// A mounted FAT32 volume.
///
/// The volume owns its device for as long as it is mounted;
/// use [`FatFs::into_device`] to get it back.
pub struct FatFs<D: BlockDevice, A: ClusterAllocator = LinearScan> {
    device: D,
    volume: VolumeDescriptor,
    options: MountOptions,
    allocator: A,
}

impl<D: BlockDevice> FatFs<D> {
    /// Mounts the volume with the default options and the linear-scan allocator.
    pub fn mount(device: D) -> FatResult<Self> {
        Self::mount_with(device, MountOptions::new(), LinearScan)
    }
}

impl<D: BlockDevice, A: ClusterAllocator> FatFs<D, A> {
    /// Reads and validates the boot sector, then builds the volume descriptor.
    ///
    /// Nothing is written to the device.
    pub fn mount_with(mut device: D, options: MountOptions, allocator: A) -> FatResult<Self> {
        if D::BLOCK_SIZE != SECTOR_SIZE {
            log::debug!(
                "Unsupported device block size: {} (expected {SECTOR_SIZE})",
                D::BLOCK_SIZE
            );
            return Err(FatError::UnsupportedGeometry);
        }

        let mut boot_sector = [0u8; SECTOR_SIZE];
        device.read(&mut boot_sector, 0)?;
        let bpb = Bpb::parse(&boot_sector)?;
        let volume = VolumeDescriptor::new(bpb);

        log::info!(
            "FAT32 volume: {} sectors/cluster, {} reserved sectors, FAT size {} sectors, root cluster {}",
            volume.sectors_per_cluster(),
            volume.reserved_sectors(),
            volume.fat_size(),
            volume.root_cluster().value(),
        );
        log::info!(
            "FAT at {:#x} bytes, root directory at {:#x} bytes, {} clusters",
            volume.fat_sector(0, 0) as usize * SECTOR_SIZE,
            volume.root_dir_base_sector() as usize * SECTOR_SIZE,
            volume.cluster_count(),
        );

        Ok(Self {
            device,
            volume,
            options,
            allocator,
        })
    }

    #[must_use]
    #[inline]
    pub const fn volume(&self) -> &VolumeDescriptor {
        &self.volume
    }

    #[must_use]
    #[inline]
    pub const fn options(&self) -> MountOptions {
        self.options
    }

    #[must_use]
    #[inline]
    pub const fn device(&self) -> &D {
        &self.device
    }

    #[must_use]
    #[inline]
    /// Unmounts the volume and gives the device back.
    pub fn into_device(self) -> D {
        self.device
    }

    pub(crate) fn read_sector(
        &mut self,
        sector: u32,
        buffer: &mut [u8; SECTOR_SIZE],
    ) -> FatResult<()> {
        self.device.read(buffer, sector as usize)?;
        Ok(())
    }

    pub(crate) fn write_sector(&mut self, sector: u32, buffer: &[u8; SECTOR_SIZE]) -> FatResult<()> {
        self.device.write(buffer, sector as usize)?;
        Ok(())
    }
}

impl<D: BlockDevice, A: ClusterAllocator> FileSystem for FatFs<D, A> {
    fn create(&mut self, path: Path) -> FileResult<()> {
        let (parent, name) = self.resolve_parent(path)?;
        self.link(&parent, name, FileType::File)?;
        Ok(())
    }

    fn create_dir(&mut self, path: Path) -> FileResult<()> {
        let (parent, name) = self.resolve_parent(path)?;
        self.link(&parent, name, FileType::Directory)?;
        Ok(())
    }

    fn delete(&mut self, _path: Path) -> FileResult<()> {
        // Entries are never unlinked, only truncated
        Err(FileError::UnsupportedOperation)
    }

    fn exists(&mut self, path: Path) -> FileResult<bool> {
        match self.resolve(path) {
            Ok(_) => Ok(true),
            Err(FatError::NotFound) => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    fn open(&mut self, path: Path) -> FileResult<()> {
        self.resolve(path)?;
        Ok(())
    }

    fn close(&mut self, _path: Path) -> FileResult<()> {
        // No-op for FAT
        Ok(())
    }

    fn read(&mut self, path: Path, buffer: &mut [u8], offset: usize) -> FileResult<usize> {
        let inode = self.resolve(path)?;
        let offset = u32::try_from(offset).map_err(|_| FatError::InvalidOffset)?;
        Ok(self.read_inode(&inode, buffer, offset)?)
    }

    fn write(&mut self, path: Path, buffer: &[u8], offset: usize) -> FileResult<usize> {
        let mut inode = self.resolve(path)?;
        let offset = u32::try_from(offset).map_err(|_| FatError::InvalidOffset)?;
        Ok(self.write_inode(&mut inode, buffer, offset)?)
    }

    fn truncate(&mut self, path: Path) -> FileResult<()> {
        let mut inode = self.resolve(path)?;
        self.truncate_inode(&mut inode)?;
        Ok(())
    }

    fn metadata(&mut self, path: Path) -> FileResult<FileMetadata> {
        let inode = self.resolve(path)?;
        Ok(FileMetadata::new(inode.size() as usize, inode.kind()))
    }

    fn read_dir(&mut self, path: Path) -> FileResult<Vec<PathBuf>> {
        let dir = self.resolve(path)?;
        let base = path.to_owned();
        Ok(self
            .list_dir(&dir)?
            .into_iter()
            .filter(|entry| !entry.is_dot())
            .map(|entry| base.join(entry.name()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_methods() {
        assert!(!Cluster::new(0).is_valid());
        assert!(!Cluster::new(1).is_valid());
        assert!(Cluster::new(2).is_valid());
        assert!(Cluster::new(100).is_valid());
        assert!(Cluster::new(0x0FFF_FFEF).is_valid());
        assert!(!Cluster::new(0x0FFF_FFF0).is_valid());
        assert!(!Cluster::new(0x0FFF_FFF7).is_valid());
        assert!(!Cluster::new(0x0FFF_FFFF).is_valid());
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(FileError::from(FatError::OutOfSpace), FileError::NotEnoughSpace);
        assert_eq!(
            FileError::from(FatError::CorruptVolume(Corruption::FreeInChain)),
            FileError::CorruptedFS
        );
        assert_eq!(FatError::from(BlockDeviceError::OutOfBounds), FatError::OutOfBounds);
        assert_eq!(FatError::from(BlockDeviceError::UnalignedAccess), FatError::Io);
        assert_eq!(
            FatError::from(Corruption::NoFreeSlot),
            FatError::CorruptVolume(Corruption::NoFreeSlot)
        );
    }

    #[test]
    fn test_mount_options() {
        let options = MountOptions::default();
        assert!(options.fat_mirroring());
        assert!(!options.truncate_reclaim());

        let options = options
            .with_fat_mirroring(false)
            .with_truncate_reclaim(true);
        assert!(!options.fat_mirroring());
        assert!(options.truncate_reclaim());
    }

    #[test]
    fn test_le_helpers() {
        let bytes = [0x34, 0x12, 0x78, 0x56];
        assert_eq!(le_u16(&bytes, 0), 0x1234);
        assert_eq!(le_u32(&bytes, 0), 0x5678_1234);
    }
}
