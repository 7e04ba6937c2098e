use super::{
    Cluster, FatError, FatFs, FatResult,
    dirent::{DIR_ENTRY_SIZE, DirEntry},
    fat::ClusterAllocator,
};
use crate::{BlockDevice, SECTOR_SIZE, fs::FileType};
use tinyfat_core::static_assert;

/// Bits of a handle identifier holding the entry offset.
const OFFSET_BITS: u32 = 12;

static_assert!(
    SECTOR_SIZE <= 1 << OFFSET_BITS,
    "Entry offsets must fit in the handle identifier"
);
static_assert!(SECTOR_SIZE % DIR_ENTRY_SIZE == 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Location of the directory entry describing a file.
pub enum InodeHandle {
    /// The root directory, which has no entry.
    Root,
    /// Entry at byte `offset` of the data cluster `cluster`.
    EntryAt { cluster: Cluster, offset: u16 },
}

impl InodeHandle {
    /// Builds a handle to an entry, checking that it can exist on the volume layout.
    pub fn entry_at(cluster: Cluster, offset: u32) -> FatResult<Self> {
        if !cluster.is_valid() {
            return Err(FatError::InvalidCluster);
        }
        if offset as usize >= SECTOR_SIZE || offset as usize % DIR_ENTRY_SIZE != 0 {
            return Err(FatError::InvalidOffset);
        }
        let offset = u16::try_from(offset).map_err(|_| FatError::InvalidOffset)?;
        Ok(Self::EntryAt { cluster, offset })
    }

    #[must_use]
    #[inline]
    /// Returns a compact identifier, `0` being the root.
    pub const fn id(self) -> u64 {
        match self {
            Self::Root => 0,
            Self::EntryAt { cluster, offset } => {
                ((cluster.value() as u64) << OFFSET_BITS) | offset as u64
            }
        }
    }

    /// Inverse of [`InodeHandle::id`].
    pub fn from_id(id: u64) -> FatResult<Self> {
        if id == 0 {
            return Ok(Self::Root);
        }
        let cluster = u32::try_from(id >> OFFSET_BITS).map_err(|_| FatError::InvalidCluster)?;
        let offset = u32::try_from(id & ((1 << OFFSET_BITS) - 1)).map_err(|_| FatError::InvalidOffset)?;
        Self::entry_at(Cluster::new(cluster), offset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// A file or directory, as last read from the volume.
///
/// Nothing is cached: every load reads the backing entry again.
pub struct Inode {
    handle: InodeHandle,
    kind: FileType,
    size: u32,
}

impl Inode {
    #[must_use]
    #[inline]
    pub const fn handle(&self) -> InodeHandle {
        self.handle
    }

    #[must_use]
    #[inline]
    pub const fn kind(&self) -> FileType {
        self.kind
    }

    #[must_use]
    #[inline]
    pub const fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }

    #[must_use]
    #[inline]
    /// Returns the size in bytes.
    ///
    /// For directories, this is the length of the cluster chain.
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub(crate) const fn set_size(&mut self, size: u32) {
        self.size = size;
    }
}

impl<D: BlockDevice, A: ClusterAllocator> FatFs<D, A> {
    /// Loads the root directory.
    pub fn root(&mut self) -> FatResult<Inode> {
        self.load(InodeHandle::Root)
    }

    /// Builds an inode from its directory entry.
    pub fn load(&mut self, handle: InodeHandle) -> FatResult<Inode> {
        let (kind, size) = match handle {
            InodeHandle::Root => {
                let size = self.dir_size(self.volume.root_cluster())?;
                (FileType::Directory, size)
            }
            InodeHandle::EntryAt { .. } => {
                let entry = self.read_entry(handle)?;
                if entry.is_directory() {
                    (FileType::Directory, self.dir_size(entry.first_cluster())?)
                } else {
                    (FileType::File, entry.file_size())
                }
            }
        };

        Ok(Inode { handle, kind, size })
    }

    /// Writes the type and size of an inode back to its entry.
    ///
    /// Only the directory bit of the attributes is touched, and directory sizes
    /// are never stored. This is a no-op for the root.
    pub fn persist(&mut self, inode: &Inode) -> FatResult<()> {
        if inode.handle == InodeHandle::Root {
            return Ok(());
        }

        let mut entry = self.read_entry(inode.handle)?;
        entry.set_attributes(entry.attributes().with_directory(inode.is_directory()));
        if !inode.is_directory() {
            entry.set_file_size(inode.size);
        }
        self.write_entry(inode.handle, &entry)
    }

    fn dir_size(&mut self, first: Cluster) -> FatResult<u32> {
        let clusters = u32::try_from(self.chain(first)?.len()).unwrap_or(u32::MAX);
        Ok(clusters.saturating_mul(self.volume.bytes_per_cluster()))
    }

    fn entry_location(&self, handle: InodeHandle) -> FatResult<(u32, usize)> {
        match handle {
            InodeHandle::Root => Err(FatError::InvalidCluster),
            InodeHandle::EntryAt { cluster, offset } => {
                // The variant can be built by hand, skipping `entry_at`
                InodeHandle::entry_at(cluster, u32::from(offset))?;
                if cluster.value() >= self.volume.cluster_count() {
                    return Err(FatError::InvalidCluster);
                }
                Ok((self.volume.cluster_sector(cluster), usize::from(offset)))
            }
        }
    }

    /// Reads the directory entry a handle points to.
    pub fn read_entry(&mut self, handle: InodeHandle) -> FatResult<DirEntry> {
        let (sector, offset) = self.entry_location(handle)?;
        let mut buffer = [0u8; SECTOR_SIZE];
        self.read_sector(sector, &mut buffer)?;
        Ok(DirEntry::from_bytes(&buffer[offset..offset + DIR_ENTRY_SIZE]))
    }

    /// Overwrites the directory entry a handle points to.
    pub fn write_entry(&mut self, handle: InodeHandle, entry: &DirEntry) -> FatResult<()> {
        let (sector, offset) = self.entry_location(handle)?;
        let mut buffer = [0u8; SECTOR_SIZE];
        self.read_sector(sector, &mut buffer)?;
        entry.write_to(&mut buffer[offset..offset + DIR_ENTRY_SIZE]);
        self.write_sector(sector, &buffer)
    }

    /// Returns the first cluster of an inode, `0` if it has no data.
    pub fn first_cluster(&mut self, inode: &Inode) -> FatResult<Cluster> {
        match inode.handle {
            InodeHandle::Root => Ok(self.volume.root_cluster()),
            handle @ InodeHandle::EntryAt { .. } => Ok(self.read_entry(handle)?.first_cluster()),
        }
    }

    pub(crate) fn set_first_cluster(&mut self, inode: &Inode, cluster: Cluster) -> FatResult<()> {
        let mut entry = self.read_entry(inode.handle)?;
        entry.set_first_cluster(cluster);
        self.write_entry(inode.handle, &entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_id() {
        assert_eq!(InodeHandle::Root.id(), 0);

        let handle = InodeHandle::entry_at(Cluster::new(3), 64).unwrap();
        assert_eq!(handle.id(), (3 << 12) | 64);
        assert_eq!(InodeHandle::from_id(handle.id()), Ok(handle));
        assert_eq!(InodeHandle::from_id(0), Ok(InodeHandle::Root));
    }

    #[test]
    fn test_handle_checks() {
        assert_eq!(
            InodeHandle::entry_at(Cluster::new(1), 0),
            Err(FatError::InvalidCluster)
        );
        assert_eq!(
            InodeHandle::entry_at(Cluster::new(2), 512),
            Err(FatError::InvalidOffset)
        );
        assert_eq!(
            InodeHandle::entry_at(Cluster::new(2), 33),
            Err(FatError::InvalidOffset)
        );
        assert_eq!(
            InodeHandle::entry_at(Cluster::new(2), 480),
            Ok(InodeHandle::EntryAt {
                cluster: Cluster::new(2),
                offset: 480
            })
        );
        // Offset bits beyond the sector
        assert_eq!(
            InodeHandle::from_id((2 << 12) | 0x800),
            Err(FatError::InvalidOffset)
        );
    }
}
