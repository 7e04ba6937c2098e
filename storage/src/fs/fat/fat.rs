use super::{
    Cluster, Corruption, FatError, FatFs, FatResult, bpb::VolumeDescriptor, corrupt, le_u32,
};
use crate::{BlockDevice, SECTOR_SIZE};
use alloc::vec::Vec;

/// Only the low 28 bits of a FAT32 entry are meaningful.
pub const FAT32_MASK: u32 = 0x0FFF_FFFF;

const ENTRIES_PER_SECTOR: u32 = VolumeDescriptor::ENTRIES_PER_FAT_SECTOR;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// FAT32 table entry
pub enum FatEntry {
    /// Free cluster
    Free,
    /// Used cluster, pointing to the next cluster in the chain
    Next(Cluster),
    /// Last cluster in the chain
    EndOfChain,
    /// Bad cluster
    Bad,
    /// Reserved cluster
    Reserved,
}

impl FatEntry {
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw & FAT32_MASK {
            0 => Self::Free,
            1 | 0x0FFF_FFF0..=0x0FFF_FFF6 => Self::Reserved,
            0x0FFF_FFF7 => Self::Bad,
            0x0FFF_FFF8..=0x0FFF_FFFF => Self::EndOfChain,
            next => Self::Next(Cluster::new(next)),
        }
    }

    #[must_use]
    /// Returns the 28-bit value stored on disk.
    ///
    /// End-of-chain is always written as the fully-set marker.
    pub const fn to_raw(self) -> u32 {
        match self {
            Self::Free => 0,
            Self::Next(next) => next.value() & FAT32_MASK,
            Self::EndOfChain => 0x0FFF_FFFF,
            Self::Bad => 0x0FFF_FFF7,
            Self::Reserved => 0x0FFF_FFF6,
        }
    }
}

#[must_use]
#[inline]
/// Returns true if the raw entry terminates a chain.
pub const fn is_eoc(raw: u32) -> bool {
    matches!(raw & FAT32_MASK, 0x0FFF_FFF8..=0x0FFF_FFFF)
}

/// Returns the FAT sector index and byte offset holding the entry of `cluster`.
fn locate(cluster: Cluster, entry_count: u32) -> FatResult<(u32, usize)> {
    if cluster.value() >= entry_count {
        return Err(FatError::InvalidCluster);
    }
    let index = cluster.value() / ENTRIES_PER_SECTOR;
    let offset = (cluster.value() % ENTRIES_PER_SECTOR) as usize * 4;
    Ok((index, offset))
}

/// Collection of FAT entries, accessed one sector at a time.
pub trait FatEntries {
    #[must_use]
    /// Returns the number of addressable entries, reserved ones included.
    fn entry_count(&self) -> u32;

    #[must_use]
    /// Returns the size of the table, in sectors.
    fn sector_count(&self) -> u32;

    /// Reads the `index`-th sector of the table.
    fn read_sector(&mut self, index: u32, buffer: &mut [u8; SECTOR_SIZE]) -> FatResult<()>;

    /// Writes the `index`-th sector of the table.
    fn write_sector(&mut self, index: u32, buffer: &[u8; SECTOR_SIZE]) -> FatResult<()>;

    /// Returns the entry value for the given cluster
    fn get(&mut self, cluster: Cluster) -> FatResult<FatEntry> {
        let (index, offset) = locate(cluster, self.entry_count())?;
        let mut buffer = [0u8; SECTOR_SIZE];
        self.read_sector(index, &mut buffer)?;
        Ok(FatEntry::from_raw(le_u32(&buffer, offset)))
    }

    /// Sets the entry value for the given cluster
    ///
    /// The reserved high bits of the entry are preserved.
    fn set(&mut self, cluster: Cluster, entry: FatEntry) -> FatResult<()> {
        if !cluster.is_valid() {
            return Err(FatError::InvalidCluster);
        }
        let (index, offset) = locate(cluster, self.entry_count())?;
        let mut buffer = [0u8; SECTOR_SIZE];
        self.read_sector(index, &mut buffer)?;

        let raw = (le_u32(&buffer, offset) & !FAT32_MASK) | entry.to_raw();
        buffer[offset..offset + 4].copy_from_slice(&raw.to_le_bytes());

        self.write_sector(index, &buffer)
    }

    #[must_use]
    /// Returns an iterator over all clusters in a chain starting from the given cluster
    ///
    /// Every visited entry is validated: the iterator yields a `CorruptVolume` error
    /// and stops on the first broken link.
    fn chain_iter(&mut self, start: Cluster) -> FatChainIter<'_, Self> {
        let remaining = self.entry_count().saturating_sub(Cluster::FIRST_DATA.value());
        FatChainIter {
            fat: self,
            next: Some(start),
            remaining,
        }
    }
}

/// Iterator over a chain of clusters
pub struct FatChainIter<'a, T: FatEntries + ?Sized> {
    fat: &'a mut T,
    next: Option<Cluster>,
    /// A chain cannot be longer than the number of data clusters.
    remaining: u32,
}

impl<T: FatEntries + ?Sized> Iterator for FatChainIter<'_, T> {
    type Item = FatResult<Cluster>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;

        if !current.is_valid() || current.value() >= self.fat.entry_count() {
            return Some(Err(corrupt(Corruption::InvalidLink)));
        }
        if self.remaining == 0 {
            return Some(Err(corrupt(Corruption::EndlessChain)));
        }
        self.remaining -= 1;

        match self.fat.get(current) {
            Ok(FatEntry::Next(next)) => self.next = Some(next),
            Ok(FatEntry::EndOfChain) => {}
            Ok(FatEntry::Free) => return Some(Err(corrupt(Corruption::FreeInChain))),
            Ok(FatEntry::Bad) => return Some(Err(corrupt(Corruption::BadInChain))),
            Ok(FatEntry::Reserved) => return Some(Err(corrupt(Corruption::InvalidLink))),
            Err(error) => return Some(Err(error)),
        }

        Some(Ok(current))
    }
}

/// The on-disk FAT of a mounted volume.
///
/// Reads always hit the first copy. Writes hit every copy when mirroring is enabled.
pub struct FatTable<'a, D: BlockDevice> {
    device: &'a mut D,
    volume: &'a VolumeDescriptor,
    mirror: bool,
}

impl<'a, D: BlockDevice> FatTable<'a, D> {
    #[must_use]
    #[inline]
    pub const fn new(device: &'a mut D, volume: &'a VolumeDescriptor, mirror: bool) -> Self {
        Self {
            device,
            volume,
            mirror,
        }
    }
}

impl<D: BlockDevice> FatEntries for FatTable<'_, D> {
    #[inline]
    fn entry_count(&self) -> u32 {
        self.volume.cluster_count()
    }

    #[inline]
    fn sector_count(&self) -> u32 {
        self.volume.fat_size()
    }

    fn read_sector(&mut self, index: u32, buffer: &mut [u8; SECTOR_SIZE]) -> FatResult<()> {
        if index >= self.sector_count() {
            return Err(FatError::OutOfBounds);
        }
        let sector = self.volume.fat_sector(0, index);
        self.device.read(buffer, sector as usize)?;
        Ok(())
    }

    fn write_sector(&mut self, index: u32, buffer: &[u8; SECTOR_SIZE]) -> FatResult<()> {
        if index >= self.sector_count() {
            return Err(FatError::OutOfBounds);
        }
        let copies = if self.mirror {
            self.volume.fat_count()
        } else {
            1
        };
        for copy in 0..copies {
            let sector = self.volume.fat_sector(copy, index);
            self.device.write(buffer, sector as usize)?;
        }
        Ok(())
    }
}

/// Strategy used to find a free cluster.
pub trait ClusterAllocator {
    /// Finds a free cluster, marks it as end-of-chain and returns it.
    ///
    /// Never returns a reserved cluster. Fails with [`FatError::OutOfSpace`]
    /// once the table has no free entry left.
    fn allocate<F: FatEntries + ?Sized>(&mut self, fat: &mut F) -> FatResult<Cluster>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Scans the whole table from the start on every allocation.
pub struct LinearScan;

impl ClusterAllocator for LinearScan {
    fn allocate<F: FatEntries + ?Sized>(&mut self, fat: &mut F) -> FatResult<Cluster> {
        let entry_count = fat.entry_count();
        let mut buffer = [0u8; SECTOR_SIZE];

        for index in 0..fat.sector_count() {
            let first = index * ENTRIES_PER_SECTOR;
            if first >= entry_count {
                break;
            }
            fat.read_sector(index, &mut buffer)?;

            let last = entry_count.min(first + ENTRIES_PER_SECTOR);
            for value in first.max(Cluster::FIRST_DATA.value())..last {
                let offset = (value - first) as usize * 4;
                let raw = le_u32(&buffer, offset);
                if FatEntry::from_raw(raw) != FatEntry::Free {
                    continue;
                }

                let raw = (raw & !FAT32_MASK) | FatEntry::EndOfChain.to_raw();
                buffer[offset..offset + 4].copy_from_slice(&raw.to_le_bytes());
                fat.write_sector(index, &buffer)?;
                return Ok(Cluster::new(value));
            }
        }

        Err(FatError::OutOfSpace)
    }
}

impl<D: BlockDevice, A: ClusterAllocator> FatFs<D, A> {
    #[inline]
    fn table(&mut self) -> FatTable<'_, D> {
        FatTable::new(
            &mut self.device,
            &self.volume,
            self.options.fat_mirroring(),
        )
    }

    /// Reads the FAT entry of a cluster.
    pub fn get_entry(&mut self, cluster: Cluster) -> FatResult<FatEntry> {
        self.table().get(cluster)
    }

    /// Overwrites the FAT entry of a data cluster.
    pub fn set_entry(&mut self, cluster: Cluster, entry: FatEntry) -> FatResult<()> {
        self.table().set(cluster, entry)
    }

    /// Allocates a cluster, already marked as end-of-chain.
    pub fn allocate_cluster(&mut self) -> FatResult<Cluster> {
        let mut table = FatTable::new(
            &mut self.device,
            &self.volume,
            self.options.fat_mirroring(),
        );
        let cluster = self.allocator.allocate(&mut table)?;
        log::debug!("Allocated cluster {}", cluster.value());
        Ok(cluster)
    }

    /// Collects the chain starting at `first`.
    ///
    /// Cluster 0 stands for an empty chain.
    pub fn chain(&mut self, first: Cluster) -> FatResult<Vec<Cluster>> {
        if first.value() == 0 {
            return Ok(Vec::new());
        }
        self.table().chain_iter(first).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory FAT with a single copy.
    struct MemFat {
        sectors: Vec<[u8; SECTOR_SIZE]>,
        entry_count: u32,
    }

    impl MemFat {
        fn new(sector_count: usize, entry_count: u32) -> Self {
            let mut fat = Self {
                sectors: vec![[0; SECTOR_SIZE]; sector_count],
                entry_count,
            };
            fat.sectors[0][0..4].copy_from_slice(&0x0FFF_FFF8u32.to_le_bytes());
            fat.sectors[0][4..8].copy_from_slice(&0x0FFF_FFFFu32.to_le_bytes());
            fat
        }
    }

    impl FatEntries for MemFat {
        fn entry_count(&self) -> u32 {
            self.entry_count
        }

        fn sector_count(&self) -> u32 {
            u32::try_from(self.sectors.len()).unwrap()
        }

        fn read_sector(&mut self, index: u32, buffer: &mut [u8; SECTOR_SIZE]) -> FatResult<()> {
            buffer.copy_from_slice(&self.sectors[index as usize]);
            Ok(())
        }

        fn write_sector(&mut self, index: u32, buffer: &[u8; SECTOR_SIZE]) -> FatResult<()> {
            self.sectors[index as usize].copy_from_slice(buffer);
            Ok(())
        }
    }

    #[test]
    fn test_entry_decoding() {
        assert_eq!(FatEntry::from_raw(0), FatEntry::Free);
        assert_eq!(FatEntry::from_raw(1), FatEntry::Reserved);
        assert_eq!(FatEntry::from_raw(5), FatEntry::Next(Cluster::new(5)));
        assert_eq!(FatEntry::from_raw(0x0FFF_FFF7), FatEntry::Bad);
        assert_eq!(FatEntry::from_raw(0x0FFF_FFF8), FatEntry::EndOfChain);
        assert_eq!(FatEntry::from_raw(0xFFFF_FFFF), FatEntry::EndOfChain);
        // High bits are ignored
        assert_eq!(FatEntry::from_raw(0xF000_0000), FatEntry::Free);
        assert_eq!(FatEntry::EndOfChain.to_raw(), 0x0FFF_FFFF);
        assert_eq!(FatEntry::Next(Cluster::new(9)).to_raw(), 9);
    }

    #[test]
    fn test_is_eoc() {
        assert!(is_eoc(0x0FFF_FFF8));
        assert!(is_eoc(0x0FFF_FFFF));
        assert!(is_eoc(0xFFFF_FFFF));
        assert!(!is_eoc(0x0FFF_FFF7));
        assert!(!is_eoc(0));
        assert!(!is_eoc(42));
    }

    #[test]
    fn test_set_preserves_high_bits() {
        let mut fat = MemFat::new(1, 128);
        fat.sectors[0][12..16].copy_from_slice(&0xA000_0000u32.to_le_bytes());

        fat.set(Cluster::new(3), FatEntry::Next(Cluster::new(7))).unwrap();
        assert_eq!(le_u32(&fat.sectors[0], 12), 0xA000_0007);
        assert_eq!(fat.get(Cluster::new(3)), Ok(FatEntry::Next(Cluster::new(7))));

        assert_eq!(
            fat.set(Cluster::new(1), FatEntry::EndOfChain),
            Err(FatError::InvalidCluster)
        );
        assert_eq!(
            fat.set(Cluster::new(128), FatEntry::EndOfChain),
            Err(FatError::InvalidCluster)
        );
    }

    #[test]
    fn test_linear_scan() {
        let mut fat = MemFat::new(2, 200);
        let mut allocator = LinearScan;

        let first = allocator.allocate(&mut fat).unwrap();
        let second = allocator.allocate(&mut fat).unwrap();
        assert_eq!(first, Cluster::new(2));
        assert_eq!(second, Cluster::new(3));
        assert_eq!(fat.get(first), Ok(FatEntry::EndOfChain));

        // Fill the first sector, allocation moves on to the second one
        for value in 4..128 {
            fat.set(Cluster::new(value), FatEntry::Bad).unwrap();
        }
        assert_eq!(allocator.allocate(&mut fat), Ok(Cluster::new(128)));
    }

    #[test]
    fn test_linear_scan_exhaustion() {
        // Entries past `entry_count` are padding and never handed out
        let mut fat = MemFat::new(1, 6);
        let mut allocator = LinearScan;

        let mut clusters = Vec::new();
        while let Ok(cluster) = allocator.allocate(&mut fat) {
            clusters.push(cluster.value());
        }
        assert_eq!(clusters, [2, 3, 4, 5]);
        assert_eq!(allocator.allocate(&mut fat), Err(FatError::OutOfSpace));
    }

    #[test]
    fn test_chain_iter() {
        let mut fat = MemFat::new(1, 128);
        fat.set(Cluster::new(2), FatEntry::Next(Cluster::new(5))).unwrap();
        fat.set(Cluster::new(5), FatEntry::Next(Cluster::new(3))).unwrap();
        fat.set(Cluster::new(3), FatEntry::EndOfChain).unwrap();

        let chain = fat
            .chain_iter(Cluster::new(2))
            .collect::<FatResult<Vec<_>>>()
            .unwrap();
        assert_eq!(chain, [Cluster::new(2), Cluster::new(5), Cluster::new(3)]);
    }

    #[test]
    fn test_chain_iter_corruption() {
        let mut fat = MemFat::new(1, 128);

        // Free entry in the middle of a chain
        fat.set(Cluster::new(2), FatEntry::Next(Cluster::new(4))).unwrap();
        let result = fat.chain_iter(Cluster::new(2)).collect::<FatResult<Vec<_>>>();
        assert_eq!(result, Err(FatError::CorruptVolume(Corruption::FreeInChain)));

        fat.set(Cluster::new(4), FatEntry::Bad).unwrap();
        let result = fat.chain_iter(Cluster::new(2)).collect::<FatResult<Vec<_>>>();
        assert_eq!(result, Err(FatError::CorruptVolume(Corruption::BadInChain)));

        fat.set(Cluster::new(4), FatEntry::Next(Cluster::new(1))).unwrap();
        let result = fat.chain_iter(Cluster::new(2)).collect::<FatResult<Vec<_>>>();
        assert_eq!(result, Err(FatError::CorruptVolume(Corruption::InvalidLink)));

        fat.set(Cluster::new(4), FatEntry::Next(Cluster::new(2))).unwrap();
        let result = fat.chain_iter(Cluster::new(2)).collect::<FatResult<Vec<_>>>();
        assert_eq!(result, Err(FatError::CorruptVolume(Corruption::EndlessChain)));
    }
}
