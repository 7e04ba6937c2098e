#![allow(dead_code)]

use storage::{BlockDevice, BlockDeviceError, SECTOR_SIZE, fs::fat::bpb::Bpb};

/// Reserved sectors of the reference layout.
pub const RESERVED_SECTORS: u32 = 32;

/// An in-memory disk with 512-byte sectors.
pub struct MockDevice {
    data: Vec<u8>,
    writes: usize,
    /// Number of writes left before the device starts failing.
    write_budget: Option<usize>,
}

impl MockDevice {
    pub fn new(sectors: usize) -> Self {
        Self {
            data: vec![0; sectors * SECTOR_SIZE],
            writes: 0,
            write_budget: None,
        }
    }

    /// Number of successful writes so far.
    pub const fn writes(&self) -> usize {
        self.writes
    }

    /// Makes every write after the next `budget` ones fail.
    pub const fn fail_after(&mut self, budget: usize) {
        self.write_budget = Some(budget);
    }

    pub const fn heal(&mut self) {
        self.write_budget = None;
    }

    pub fn sector(&self, sector: u32) -> &[u8] {
        let start = sector as usize * SECTOR_SIZE;
        &self.data[start..start + SECTOR_SIZE]
    }

    pub fn sector_mut(&mut self, sector: u32) -> &mut [u8] {
        let start = sector as usize * SECTOR_SIZE;
        &mut self.data[start..start + SECTOR_SIZE]
    }

    /// Reads a raw entry from the given FAT copy.
    pub fn fat_entry(&self, fat_size: u32, copy: u32, cluster: u32) -> u32 {
        let sector = RESERVED_SECTORS + copy * fat_size + cluster / 128;
        let offset = (cluster % 128) as usize * 4;
        let bytes = &self.sector(sector)[offset..offset + 4];
        u32::from_le_bytes(bytes.try_into().unwrap())
    }

    /// Overwrites a raw entry in every FAT copy.
    pub fn set_fat_entry(&mut self, fat_size: u32, cluster: u32, value: u32) {
        for copy in 0..2 {
            let sector = RESERVED_SECTORS + copy * fat_size + cluster / 128;
            let offset = (cluster % 128) as usize * 4;
            self.sector_mut(sector)[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn range(&self, len: usize, offset: usize) -> Result<core::ops::Range<usize>, BlockDeviceError> {
        if len % SECTOR_SIZE != 0 {
            return Err(BlockDeviceError::UnalignedAccess);
        }
        let start = offset * SECTOR_SIZE;
        if start + len > self.data.len() {
            return Err(BlockDeviceError::OutOfBounds);
        }
        Ok(start..start + len)
    }
}

impl BlockDevice for MockDevice {
    const BLOCK_SIZE: usize = SECTOR_SIZE;

    fn read(&mut self, dst: &mut [u8], offset: usize) -> Result<(), BlockDeviceError> {
        let range = self.range(dst.len(), offset)?;
        dst.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, src: &[u8], offset: usize) -> Result<(), BlockDeviceError> {
        let range = self.range(src.len(), offset)?;
        match self.write_budget {
            Some(0) => return Err(BlockDeviceError::Io),
            Some(ref mut budget) => *budget -= 1,
            None => {}
        }
        self.data[range].copy_from_slice(src);
        self.writes += 1;
        Ok(())
    }
}

/// Lays down an empty reference FAT32 volume: boot sector and its backup, two FATs
/// and a zeroed root directory at cluster 2.
pub fn format_volume(total_sectors: u32, fat_size: u32) -> MockDevice {
    let mut device = MockDevice::new(total_sectors as usize);

    let bpb = Bpb::new()
        .with_total_sectors(total_sectors)
        .with_sectors_per_fat(fat_size)
        .with_volume_id(0xCAFE_F00D);
    let mut boot_sector = [0u8; SECTOR_SIZE];
    bpb.write_to(&mut boot_sector);
    device.sector_mut(0).copy_from_slice(&boot_sector);
    device
        .sector_mut(u32::from(bpb.backup_boot_sector()))
        .copy_from_slice(&boot_sector);

    // Media descriptor, reserved entry, then the root directory
    device.set_fat_entry(fat_size, 0, 0x0FFF_FFF8);
    device.set_fat_entry(fat_size, 1, 0x0FFF_FFFF);
    device.set_fat_entry(fat_size, 2, 0x0FFF_FFFF);

    device
}
