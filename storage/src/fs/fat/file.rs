use super::{
    Cluster, Corruption, FatError, FatFs, FatResult, corrupt,
    fat::{ClusterAllocator, FatEntry},
    inode::{Inode, InodeHandle},
};
use crate::{BlockDevice, SECTOR_SIZE};

const BLOCK_SIZE: u32 = SECTOR_SIZE as u32;

impl<D: BlockDevice, A: ClusterAllocator> FatFs<D, A> {
    /// Allocates a cluster and clears its content.
    pub(super) fn allocate_zeroed(&mut self) -> FatResult<Cluster> {
        let cluster = self.allocate_cluster()?;
        let zero = [0u8; SECTOR_SIZE];
        let first = self.volume.cluster_sector(cluster);
        for sector in first..first + self.volume.sectors_per_cluster() {
            self.write_sector(sector, &zero)?;
        }
        Ok(cluster)
    }

    fn check_link(&self, cluster: Cluster) -> FatResult<Cluster> {
        if cluster.is_valid() && cluster.value() < self.volume.cluster_count() {
            Ok(cluster)
        } else {
            Err(corrupt(Corruption::InvalidLink))
        }
    }

    /// Maps the `block`-th sector of an inode to its sector on the volume.
    ///
    /// When `extend` is set, missing clusters are allocated and linked at the end of
    /// the chain (or recorded as the first cluster of an empty inode). Otherwise,
    /// blocks past the end of the chain map to `None`.
    pub fn map(&mut self, inode: &Inode, block: u32, extend: bool) -> FatResult<Option<u32>> {
        let spc = self.volume.sectors_per_cluster();
        let cluster_index = block / spc;

        let mut current = self.first_cluster(inode)?;
        if current.value() == 0 {
            if !extend {
                return Ok(None);
            }
            let cluster = self.allocate_zeroed()?;
            self.set_first_cluster(inode, cluster)?;
            current = cluster;
        }
        current = self.check_link(current)?;

        for _ in 0..cluster_index {
            current = match self.get_entry(current)? {
                FatEntry::Next(next) => self.check_link(next)?,
                FatEntry::EndOfChain => {
                    if !extend {
                        return Ok(None);
                    }
                    let cluster = self.allocate_zeroed()?;
                    self.set_entry(current, FatEntry::Next(cluster))?;
                    cluster
                }
                FatEntry::Free => return Err(corrupt(Corruption::FreeInChain)),
                FatEntry::Bad => return Err(corrupt(Corruption::BadInChain)),
                FatEntry::Reserved => return Err(corrupt(Corruption::InvalidLink)),
            };
        }

        let sector = self.volume.cluster_sector(current) + block % spc;
        log::trace!(
            "Mapped block {block} of {:?} to sector {sector}",
            inode.handle()
        );
        Ok(Some(sector))
    }

    /// Reads from an inode into `buffer`, starting at byte `offset`.
    ///
    /// Reads are clamped to the size of the inode. Returns the number of bytes read.
    pub fn read_inode(&mut self, inode: &Inode, buffer: &mut [u8], offset: u32) -> FatResult<usize> {
        self.read_located(inode, buffer, offset)
            .map(|(read, _location)| read)
    }

    /// Same as [`FatFs::read_inode`], also returning where the first byte read lives.
    ///
    /// The location is only reported when that byte starts a directory entry.
    pub fn read_located(
        &mut self,
        inode: &Inode,
        buffer: &mut [u8],
        offset: u32,
    ) -> FatResult<(usize, Option<InodeHandle>)> {
        if offset >= inode.size() || buffer.is_empty() {
            return Ok((0, None));
        }

        let available = usize::try_from(inode.size() - offset).unwrap_or(usize::MAX);
        let len = buffer.len().min(available);
        let bytes_per_cluster = self.volume.bytes_per_cluster();

        let mut location = None;
        let mut block_buffer = [0u8; SECTOR_SIZE];
        let mut done = 0;

        while done < len {
            #[expect(clippy::cast_possible_truncation, reason = "bounded by a u32 size")]
            let position = offset + done as u32;
            let within = (position % BLOCK_SIZE) as usize;

            let sector = self
                .map(inode, position / BLOCK_SIZE, false)?
                .ok_or_else(|| corrupt(Corruption::ChainTooShort))?;

            if done == 0 {
                let cluster = self.volume.sector_cluster(sector);
                location = InodeHandle::entry_at(cluster, position % bytes_per_cluster).ok();
            }

            self.read_sector(sector, &mut block_buffer)?;
            let count = (SECTOR_SIZE - within).min(len - done);
            buffer[done..done + count].copy_from_slice(&block_buffer[within..within + count]);
            done += count;
        }

        Ok((done, location))
    }

    /// Writes `buffer` to an inode, starting at byte `offset`.
    ///
    /// Writing may extend the inode but never leaves a hole: `offset` cannot be past
    /// the current size. The inode is persisted afterwards, even if its size did not
    /// change, as its chain may have grown.
    pub fn write_inode(&mut self, inode: &mut Inode, buffer: &[u8], offset: u32) -> FatResult<usize> {
        if offset > inode.size() {
            return Err(FatError::InvalidOffset);
        }
        let end = u32::try_from(buffer.len())
            .ok()
            .and_then(|len| offset.checked_add(len))
            .ok_or(FatError::InvalidOffset)?;

        let mut block_buffer = [0u8; SECTOR_SIZE];
        let mut position = offset;

        while position < end {
            let within = (position % BLOCK_SIZE) as usize;
            let count = (SECTOR_SIZE - within).min((end - position) as usize);
            let done = (position - offset) as usize;

            let sector = self
                .map(inode, position / BLOCK_SIZE, true)?
                .ok_or_else(|| corrupt(Corruption::ChainTooShort))?;

            if count < SECTOR_SIZE {
                self.read_sector(sector, &mut block_buffer)?;
            }
            block_buffer[within..within + count].copy_from_slice(&buffer[done..done + count]);
            self.write_sector(sector, &block_buffer)?;

            #[expect(clippy::cast_possible_truncation, reason = "count is at most a sector")]
            let count = count as u32;
            position += count;
        }

        if end > inode.size() {
            let size = if inode.is_directory() {
                let bytes_per_cluster = self.volume.bytes_per_cluster();
                end.div_ceil(bytes_per_cluster)
                    .saturating_mul(bytes_per_cluster)
            } else {
                end
            };
            inode.set_size(size);
        }

        self.persist(inode)?;

        Ok(buffer.len())
    }

    /// Discards the whole content of a file.
    ///
    /// Every cluster of the chain is marked end-of-chain, or free when
    /// truncation reclaim is enabled. The entry is left in its directory.
    pub fn truncate_inode(&mut self, inode: &mut Inode) -> FatResult<()> {
        if inode.is_directory() {
            return Err(FatError::IsADirectory);
        }

        let first = self.first_cluster(inode)?;
        let chain = self.chain(first)?;

        let marker = if self.options.truncate_reclaim() {
            FatEntry::Free
        } else {
            FatEntry::EndOfChain
        };
        for &cluster in &chain {
            self.set_entry(cluster, marker)?;
        }

        self.set_first_cluster(inode, Cluster::new(0))?;
        inode.set_size(0);
        self.persist(inode)?;

        log::debug!(
            "Truncated {:?}, {} clusters marked {marker:?}",
            inode.handle(),
            chain.len()
        );
        Ok(())
    }
}
