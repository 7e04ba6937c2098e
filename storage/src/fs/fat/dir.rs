use super::{
    Cluster, Corruption, FatError, FatFs, FatResult, corrupt,
    dirent::{Attributes, DIR_ENTRY_SIZE, DirEntry, ShortName},
    fat::{ClusterAllocator, FatEntry},
    inode::{Inode, InodeHandle},
};
use crate::{BlockDevice, SECTOR_SIZE, fs::FileType};
use alloc::{string::String, vec::Vec};
use core::ops::ControlFlow;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A named entry of a directory.
pub struct DirListing {
    name: String,
    handle: InodeHandle,
    kind: FileType,
    size: u32,
}

impl DirListing {
    #[must_use]
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

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
    /// Returns the size recorded in the entry, which is 0 for directories.
    pub const fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    #[inline]
    /// Returns true for the `.` and `..` entries
    pub fn is_dot(&self) -> bool {
        self.name == "." || self.name == ".."
    }
}

impl<D: BlockDevice, A: ClusterAllocator> FatFs<D, A> {
    /// Visits every slot of a directory, in order, until `visit` breaks.
    ///
    /// `visit` receives the index of the slot within the directory.
    fn scan_dir<T>(
        &mut self,
        dir: &Inode,
        mut visit: impl FnMut(u32, InodeHandle, &DirEntry) -> ControlFlow<T>,
    ) -> FatResult<Option<T>> {
        if !dir.is_directory() {
            return Err(FatError::NotADirectory);
        }

        let first = self.first_cluster(dir)?;
        let clusters = self.chain(first)?;

        let mut buffer = [0u8; SECTOR_SIZE];
        let mut index = 0;
        for cluster in clusters {
            self.read_sector(self.volume.cluster_sector(cluster), &mut buffer)?;

            let slots = (0u32..)
                .step_by(DIR_ENTRY_SIZE)
                .zip(buffer.chunks_exact(DIR_ENTRY_SIZE));
            for (offset, bytes) in slots {
                let handle = InodeHandle::entry_at(cluster, offset)?;
                let entry = DirEntry::from_bytes(bytes);
                if let ControlFlow::Break(value) = visit(index, handle, &entry) {
                    return Ok(Some(value));
                }
                index += 1;
            }
        }

        Ok(None)
    }

    /// Finds an entry by name in a directory.
    ///
    /// The comparison is made on the encoded short name, hence is case-insensitive.
    pub fn lookup(&mut self, dir: &Inode, name: &str) -> FatResult<Inode> {
        let target = ShortName::encode(name)?;

        let found = self.scan_dir(dir, |_, handle, entry| {
            if entry.is_end() {
                ControlFlow::Break(None)
            } else if entry.is_named() && entry.short_name() == target {
                ControlFlow::Break(Some(handle))
            } else {
                ControlFlow::Continue(())
            }
        })?;

        match found.flatten() {
            Some(handle) => self.load(handle),
            None => Err(FatError::NotFound),
        }
    }

    /// Returns the first deleted or terminating slot of a directory.
    ///
    /// When the slot is the terminator and the last one of its cluster, the
    /// directory grows by one cluster, which starts with a new terminator.
    /// `dir` is reloaded from the volume first, so a stale size is never used.
    pub fn allocate_slot(&mut self, dir: &mut Inode) -> FatResult<InodeHandle> {
        let entries_per_cluster = self.volume.entries_per_cluster();
        *dir = self.load(dir.handle())?;

        let found = self.scan_dir(dir, |index, handle, entry| {
            if entry.is_end() || entry.is_deleted() {
                ControlFlow::Break((index, handle, entry.is_end()))
            } else {
                ControlFlow::Continue(())
            }
        })?;

        let Some((index, handle, is_end)) = found else {
            return Err(corrupt(Corruption::NoFreeSlot));
        };

        if is_end && index % entries_per_cluster == entries_per_cluster - 1 {
            let terminator = [0u8; DIR_ENTRY_SIZE];
            let end = (index + 1) * DIR_ENTRY_SIZE as u32;
            self.write_inode(dir, &terminator, end)?;
            log::debug!("Extended directory {:?} to {} bytes", dir.handle(), dir.size());
        }

        Ok(handle)
    }

    /// Creates an empty file or directory named `name` in `dir`.
    ///
    /// A new directory gets its first cluster, holding the `.` and `..` entries,
    /// before its entry is written. If the entry cannot be placed, that cluster
    /// is released.
    pub fn link(&mut self, dir: &Inode, name: &str, kind: FileType) -> FatResult<Inode> {
        let short_name = ShortName::encode(name)?;
        if short_name.is_dot() {
            return Err(FatError::InvalidName);
        }
        match self.lookup(dir, name) {
            Ok(_) => return Err(FatError::AlreadyExists),
            Err(FatError::NotFound) => {}
            Err(error) => return Err(error),
        }

        let mut parent = *dir;
        let own_cluster = if kind.is_directory() {
            let parent_cluster = self.first_cluster(&parent)?;
            Some(self.new_dir_cluster(parent_cluster)?)
        } else {
            None
        };

        let attributes = Attributes::default().with_directory(kind.is_directory());
        let mut entry = DirEntry::new(short_name, attributes);
        if let Some(cluster) = own_cluster {
            entry.set_first_cluster(cluster);
        }

        let placed = self
            .allocate_slot(&mut parent)
            .and_then(|handle| self.write_entry(handle, &entry).map(|()| handle));
        let handle = match placed {
            Ok(handle) => handle,
            Err(error) => {
                if let Some(cluster) = own_cluster {
                    self.set_entry(cluster, FatEntry::Free)?;
                }
                return Err(error);
            }
        };

        log::debug!("Linked {name} ({kind:?}) at {handle:?}");
        self.load(handle)
    }

    /// Allocates the first cluster of a new directory and fills in `.` and `..`.
    fn new_dir_cluster(&mut self, parent_cluster: Cluster) -> FatResult<Cluster> {
        let cluster = self.allocate_zeroed()?;

        let dot_attributes = Attributes::new(Attributes::DIRECTORY);
        let mut dot = DirEntry::new(ShortName::DOT, dot_attributes);
        dot.set_first_cluster(cluster);
        let mut dotdot = DirEntry::new(ShortName::DOTDOT, dot_attributes);
        dotdot.set_first_cluster(parent_cluster);

        let mut buffer = [0u8; SECTOR_SIZE];
        dot.write_to(&mut buffer[..DIR_ENTRY_SIZE]);
        dotdot.write_to(&mut buffer[DIR_ENTRY_SIZE..2 * DIR_ENTRY_SIZE]);

        if let Err(error) = self.write_sector(self.volume.cluster_sector(cluster), &buffer) {
            self.set_entry(cluster, FatEntry::Free)?;
            return Err(error);
        }
        Ok(cluster)
    }

    /// Lists the named entries of a directory, `.` and `..` included.
    ///
    /// Deleted slots, long name fragments and the volume label are skipped.
    pub fn list_dir(&mut self, dir: &Inode) -> FatResult<Vec<DirListing>> {
        if !dir.is_directory() {
            return Err(FatError::NotADirectory);
        }

        let mut listing = Vec::new();
        let mut bytes = [0u8; DIR_ENTRY_SIZE];
        let mut offset = 0;

        loop {
            let (read, location) = self.read_located(dir, &mut bytes, offset)?;
            if read < DIR_ENTRY_SIZE {
                break;
            }
            let entry = DirEntry::from_bytes(&bytes);
            if entry.is_end() {
                break;
            }
            offset += DIR_ENTRY_SIZE as u32;

            if !entry.is_named() {
                continue;
            }
            let handle = location.ok_or(FatError::InvalidOffset)?;
            let kind = if entry.is_directory() {
                FileType::Directory
            } else {
                FileType::File
            };
            listing.push(DirListing {
                name: entry.short_name().decode(),
                handle,
                kind,
                size: entry.file_size(),
            });
        }

        Ok(listing)
    }
}
