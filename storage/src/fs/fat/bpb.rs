use super::{Cluster, FatError, FatResult, dirent::DIR_ENTRY_SIZE, le_u16, le_u32};
use crate::SECTOR_SIZE;
use tinyfat_core::static_assert;

static_assert!(SECTOR_SIZE >= 512, "The boot sector must fit in one sector");

/// Boot sector signature, stored at bytes 510 and 511.
pub const BOOT_SIGNATURE: [u8; 2] = [0x55, 0xAA];

/// BIOS Parameter Block (BPB) for FAT32 file system.
///
/// Fields are decoded from and encoded to their standard little-endian offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bpb {
    // Generic FAT BPB fields.
    /// Jump instruction.
    jump_boot: [u8; 3],
    /// OEM name.
    oem_name: [u8; 8],
    /// Bytes per sector.
    bytes_per_sector: u16,
    /// Sectors per cluster.
    sectors_per_cluster: u8,
    /// Reserved sectors.
    reserved_sectors: u16,
    /// Number of FATs.
    fat_count: u8,
    root_entries: u16,
    /// Total sectors in the file system.
    ///
    /// Always 0 on FAT32, `total_sectors_large` is used instead.
    total_sectors: u16,
    /// Driver type.
    ///
    /// Example: 0xF8 for fixed disk and 0xF0 for removable disk.
    media_descriptor: u8,
    /// Sectors per FAT.
    ///
    /// DO NOT USE THIS FIELD FOR FAT32 FILE SYSTEMS.
    sectors_per_fat_small: u16,
    /// Sectors per track.
    sectors_per_track: u16,
    /// Number of heads.
    heads: u16,
    /// Hidden sectors.
    hidden_sectors: u32,
    /// Total sectors in the file system.
    total_sectors_large: u32,

    // FAT32 specific fields.
    /// Sectors per FAT.
    sectors_per_fat: u32,
    /// Flags.
    flags: u16,
    /// Version (major in the high byte).
    version: u16,
    /// Cluster number of the root directory.
    root_cluster: u32,
    /// Sector number of the FS Information Sector.
    fs_info_sector: u16,
    /// Sector number of the backup boot sector.
    backup_boot_sector: u16,
    /// Logical drive number.
    drive_number: u8,
    /// Boot signature.
    boot_flag: u8,
    /// Volume serial number.
    volume_id: u32,
    /// Volume label.
    volume_label: [u8; 11],
    /// File system type.
    fs_type: [u8; 8],
}

impl Default for Bpb {
    fn default() -> Self {
        Self::new()
    }
}

impl Bpb {
    /// Expected first byte of the jump instruction.
    const JUMP_OPCODE: u8 = 0xEB;
    /// Fixed disk media descriptor.
    const MEDIA_FIXED: u8 = 0xF8;

    #[must_use]
    /// Creates the reference layout with an empty size.
    ///
    /// `with_total_sectors` and `with_sectors_per_fat` must be called before
    /// the result passes [`Bpb::validate`].
    pub const fn new() -> Self {
        Self {
            jump_boot: [0xEB, 0x58, 0x90],
            oem_name: *b"TINYFAT ",
            bytes_per_sector: 512,
            sectors_per_cluster: 1,
            reserved_sectors: 32,
            fat_count: 2,
            root_entries: 0,
            total_sectors: 0,
            media_descriptor: Self::MEDIA_FIXED,
            sectors_per_fat_small: 0,
            sectors_per_track: 32,
            heads: 64,
            hidden_sectors: 0,
            total_sectors_large: 0,
            sectors_per_fat: 0,
            flags: 0,
            version: 0,
            root_cluster: 2,
            fs_info_sector: 1,
            backup_boot_sector: 6,
            drive_number: 0x80,
            boot_flag: 0x29,
            volume_id: 0,
            volume_label: *b"NO NAME    ",
            fs_type: *b"FAT32   ",
        }
    }

    #[must_use]
    pub const fn with_bytes_per_sector(mut self, bytes_per_sector: u16) -> Self {
        self.bytes_per_sector = bytes_per_sector;
        self
    }

    #[must_use]
    pub const fn with_sectors_per_cluster(mut self, sectors_per_cluster: u8) -> Self {
        self.sectors_per_cluster = sectors_per_cluster;
        self
    }

    #[must_use]
    pub const fn with_reserved_sectors(mut self, reserved_sectors: u16) -> Self {
        self.reserved_sectors = reserved_sectors;
        self
    }

    #[must_use]
    pub const fn with_fat_count(mut self, fat_count: u8) -> Self {
        self.fat_count = fat_count;
        self
    }

    #[must_use]
    pub const fn with_total_sectors(mut self, total_sectors: u32) -> Self {
        self.total_sectors_large = total_sectors;
        self
    }

    #[must_use]
    pub const fn with_sectors_per_fat(mut self, sectors_per_fat: u32) -> Self {
        self.sectors_per_fat = sectors_per_fat;
        self
    }

    #[must_use]
    pub const fn with_root_cluster(mut self, root_cluster: u32) -> Self {
        self.root_cluster = root_cluster;
        self
    }

    #[must_use]
    pub const fn with_volume_id(mut self, volume_id: u32) -> Self {
        self.volume_id = volume_id;
        self
    }

    #[must_use]
    pub const fn with_volume_label(mut self, volume_label: [u8; 11]) -> Self {
        self.volume_label = volume_label;
        self
    }

    /// Decodes and validates a boot sector.
    pub fn parse(sector: &[u8; SECTOR_SIZE]) -> FatResult<Self> {
        if sector[510..512] != BOOT_SIGNATURE {
            log::debug!(
                "Invalid boot signature: {:#04x} {:#04x}",
                sector[510],
                sector[511]
            );
            return Err(FatError::InvalidBootSector);
        }

        let mut jump_boot = [0u8; 3];
        jump_boot.copy_from_slice(&sector[0..3]);
        let mut oem_name = [0u8; 8];
        oem_name.copy_from_slice(&sector[3..11]);
        let mut volume_label = [0u8; 11];
        volume_label.copy_from_slice(&sector[71..82]);
        let mut fs_type = [0u8; 8];
        fs_type.copy_from_slice(&sector[82..90]);

        let bpb = Self {
            jump_boot,
            oem_name,
            bytes_per_sector: le_u16(sector, 11),
            sectors_per_cluster: sector[13],
            reserved_sectors: le_u16(sector, 14),
            fat_count: sector[16],
            root_entries: le_u16(sector, 17),
            total_sectors: le_u16(sector, 19),
            media_descriptor: sector[21],
            sectors_per_fat_small: le_u16(sector, 22),
            sectors_per_track: le_u16(sector, 24),
            heads: le_u16(sector, 26),
            hidden_sectors: le_u32(sector, 28),
            total_sectors_large: le_u32(sector, 32),
            sectors_per_fat: le_u32(sector, 36),
            flags: le_u16(sector, 40),
            version: le_u16(sector, 42),
            root_cluster: le_u32(sector, 44),
            fs_info_sector: le_u16(sector, 48),
            backup_boot_sector: le_u16(sector, 50),
            drive_number: sector[64],
            boot_flag: sector[66],
            volume_id: le_u32(sector, 67),
            volume_label,
            fs_type,
        };

        bpb.validate()?;
        Ok(bpb)
    }

    /// Encodes the boot sector, signature included.
    ///
    /// Bytes that are not part of the BPB (boot code) are left untouched.
    pub fn write_to(&self, sector: &mut [u8; SECTOR_SIZE]) {
        sector[0..3].copy_from_slice(&self.jump_boot);
        sector[3..11].copy_from_slice(&self.oem_name);
        sector[11..13].copy_from_slice(&self.bytes_per_sector.to_le_bytes());
        sector[13] = self.sectors_per_cluster;
        sector[14..16].copy_from_slice(&self.reserved_sectors.to_le_bytes());
        sector[16] = self.fat_count;
        sector[17..19].copy_from_slice(&self.root_entries.to_le_bytes());
        sector[19..21].copy_from_slice(&self.total_sectors.to_le_bytes());
        sector[21] = self.media_descriptor;
        sector[22..24].copy_from_slice(&self.sectors_per_fat_small.to_le_bytes());
        sector[24..26].copy_from_slice(&self.sectors_per_track.to_le_bytes());
        sector[26..28].copy_from_slice(&self.heads.to_le_bytes());
        sector[28..32].copy_from_slice(&self.hidden_sectors.to_le_bytes());
        sector[32..36].copy_from_slice(&self.total_sectors_large.to_le_bytes());
        sector[36..40].copy_from_slice(&self.sectors_per_fat.to_le_bytes());
        sector[40..42].copy_from_slice(&self.flags.to_le_bytes());
        sector[42..44].copy_from_slice(&self.version.to_le_bytes());
        sector[44..48].copy_from_slice(&self.root_cluster.to_le_bytes());
        sector[48..50].copy_from_slice(&self.fs_info_sector.to_le_bytes());
        sector[50..52].copy_from_slice(&self.backup_boot_sector.to_le_bytes());
        sector[52..64].fill(0);
        sector[64] = self.drive_number;
        sector[65] = 0;
        sector[66] = self.boot_flag;
        sector[67..71].copy_from_slice(&self.volume_id.to_le_bytes());
        sector[71..82].copy_from_slice(&self.volume_label);
        sector[82..90].copy_from_slice(&self.fs_type);
        sector[510..512].copy_from_slice(&BOOT_SIGNATURE);
    }

    /// Checks that the volume belongs to the supported layout family.
    ///
    /// Failures on the structure of the BPB itself are reported as
    /// [`FatError::InvalidBootSector`], well-formed but unsupported layouts as
    /// [`FatError::UnsupportedGeometry`].
    pub fn validate(&self) -> FatResult<()> {
        /// Supported bytes per sector.
        const BYTES_PER_SECTOR: u16 = 512;
        /// Supported number of FATs.
        const FAT_COUNT: u8 = 2;
        /// Supported sectors per cluster.
        const SECTORS_PER_CLUSTER: u8 = 1;
        /// Expected FSINFO sector.
        const FS_INFO_SECTOR: u16 = 1;
        /// Expected backup boot sector.
        const BACKUP_BOOT_SECTOR: u16 = 6;

        if self.jump_boot[0] != Self::JUMP_OPCODE {
            log::debug!("Invalid jump instruction: {:#04x}", self.jump_boot[0]);
            return Err(FatError::InvalidBootSector);
        }

        // These are always zero on FAT32
        if self.root_entries != 0 || self.total_sectors != 0 || self.sectors_per_fat_small != 0
        {
            log::debug!(
                "Not a FAT32 BPB: root entries {}, 16-bit total sectors {}, 16-bit FAT size {}",
                self.root_entries,
                self.total_sectors,
                self.sectors_per_fat_small
            );
            return Err(FatError::InvalidBootSector);
        }

        if self.total_sectors_large == 0 || self.sectors_per_fat == 0 {
            log::debug!(
                "Empty volume: {} total sectors, {} sectors per FAT",
                self.total_sectors_large,
                self.sectors_per_fat
            );
            return Err(FatError::InvalidBootSector);
        }

        if self.version != 0 {
            log::debug!("Unsupported FAT32 version: {:#06x}", self.version);
            return Err(FatError::UnsupportedGeometry);
        }

        if self.bytes_per_sector != BYTES_PER_SECTOR {
            log::debug!(
                "Invalid bytes_per_sector: {} (expected {BYTES_PER_SECTOR})",
                self.bytes_per_sector
            );
            return Err(FatError::UnsupportedGeometry);
        }

        if self.sectors_per_cluster != SECTORS_PER_CLUSTER {
            log::debug!(
                "Invalid sectors_per_cluster: {} (expected {SECTORS_PER_CLUSTER})",
                self.sectors_per_cluster
            );
            return Err(FatError::UnsupportedGeometry);
        }

        if self.fat_count != FAT_COUNT {
            log::debug!("Invalid fat_count: {} (expected {FAT_COUNT})", self.fat_count);
            return Err(FatError::UnsupportedGeometry);
        }

        if self.media_descriptor != Self::MEDIA_FIXED {
            log::debug!("Invalid media descriptor: {:#04x}", self.media_descriptor);
            return Err(FatError::UnsupportedGeometry);
        }

        if self.root_cluster != Cluster::FIRST_DATA.value() {
            log::debug!("Invalid root cluster: {}", self.root_cluster);
            return Err(FatError::UnsupportedGeometry);
        }

        if self.fs_info_sector != FS_INFO_SECTOR || self.backup_boot_sector != BACKUP_BOOT_SECTOR
        {
            log::debug!(
                "Invalid FSINFO/backup sectors: {}/{}",
                self.fs_info_sector,
                self.backup_boot_sector
            );
            return Err(FatError::UnsupportedGeometry);
        }

        if self.reserved_sectors <= self.backup_boot_sector {
            log::debug!("Invalid reserved_sectors: {}", self.reserved_sectors);
            return Err(FatError::InvalidBootSector);
        }

        let metadata_sectors =
            u64::from(self.reserved_sectors) + u64::from(self.sectors_per_fat) * u64::from(self.fat_count);
        if metadata_sectors >= u64::from(self.total_sectors_large) {
            log::debug!(
                "No data region: {metadata_sectors} metadata sectors out of {}",
                self.total_sectors_large
            );
            return Err(FatError::InvalidBootSector);
        }

        Ok(())
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_sector(&self) -> u16 {
        self.bytes_per_sector
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_cluster(&self) -> u8 {
        self.sectors_per_cluster
    }

    #[must_use]
    #[inline]
    pub const fn reserved_sectors(&self) -> u16 {
        self.reserved_sectors
    }

    #[must_use]
    #[inline]
    pub const fn fat_count(&self) -> u8 {
        self.fat_count
    }

    #[must_use]
    #[inline]
    pub const fn total_sectors(&self) -> u32 {
        self.total_sectors_large
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_fat(&self) -> u32 {
        self.sectors_per_fat
    }

    #[must_use]
    #[inline]
    pub const fn root_cluster(&self) -> u32 {
        self.root_cluster
    }

    #[must_use]
    #[inline]
    pub const fn fs_info_sector(&self) -> u16 {
        self.fs_info_sector
    }

    #[must_use]
    #[inline]
    pub const fn backup_boot_sector(&self) -> u16 {
        self.backup_boot_sector
    }

    #[must_use]
    #[inline]
    pub const fn volume_id(&self) -> u32 {
        self.volume_id
    }

    #[must_use]
    #[inline]
    pub const fn volume_label(&self) -> [u8; 11] {
        self.volume_label
    }
}

/// Validated boot sector plus the geometry derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDescriptor {
    bpb: Bpb,
    root_dir_base_sector: u32,
    cluster_count: u32,
}

impl VolumeDescriptor {
    /// FAT entries packed in a single sector.
    pub const ENTRIES_PER_FAT_SECTOR: u32 = (SECTOR_SIZE / 4) as u32;

    #[must_use]
    /// Derives the geometry of an already validated BPB.
    pub fn new(bpb: Bpb) -> Self {
        let root_dir_base_sector =
            u32::from(bpb.reserved_sectors) + bpb.sectors_per_fat * u32::from(bpb.fat_count);

        let data_clusters = bpb.total_sectors_large.saturating_sub(root_dir_base_sector)
            / u32::from(bpb.sectors_per_cluster.max(1));
        let fat_entries = bpb.sectors_per_fat.saturating_mul(Self::ENTRIES_PER_FAT_SECTOR);
        let cluster_count = fat_entries.min(data_clusters.saturating_add(2));

        Self {
            bpb,
            root_dir_base_sector,
            cluster_count,
        }
    }

    #[must_use]
    #[inline]
    pub const fn bpb(&self) -> &Bpb {
        &self.bpb
    }

    #[must_use]
    #[inline]
    pub const fn sectors_per_cluster(&self) -> u32 {
        self.bpb.sectors_per_cluster as u32
    }

    #[must_use]
    #[inline]
    pub const fn bytes_per_cluster(&self) -> u32 {
        self.sectors_per_cluster() * self.bpb.bytes_per_sector as u32
    }

    #[must_use]
    #[inline]
    /// Returns how many directory entries fit in a cluster.
    pub const fn entries_per_cluster(&self) -> u32 {
        self.bytes_per_cluster() / DIR_ENTRY_SIZE as u32
    }

    #[must_use]
    #[inline]
    pub const fn reserved_sectors(&self) -> u32 {
        self.bpb.reserved_sectors as u32
    }

    #[must_use]
    #[inline]
    pub const fn fat_count(&self) -> u32 {
        self.bpb.fat_count as u32
    }

    #[must_use]
    #[inline]
    /// Returns the size of one FAT, in sectors.
    pub const fn fat_size(&self) -> u32 {
        self.bpb.sectors_per_fat
    }

    #[must_use]
    #[inline]
    pub const fn root_cluster(&self) -> Cluster {
        Cluster::new(self.bpb.root_cluster)
    }

    #[must_use]
    #[inline]
    /// Returns the first sector of the data region, where the root directory starts.
    pub const fn root_dir_base_sector(&self) -> u32 {
        self.root_dir_base_sector
    }

    #[must_use]
    #[inline]
    /// Returns the number of addressable cluster numbers, reserved clusters 0 and 1 included.
    ///
    /// This is bounded both by the FAT size and by the data region size.
    pub const fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    #[must_use]
    #[inline]
    /// Returns the absolute sector of the `index`-th sector of the given FAT copy.
    pub const fn fat_sector(&self, copy: u32, index: u32) -> u32 {
        self.reserved_sectors() + copy * self.fat_size() + index
    }

    #[must_use]
    #[inline]
    /// Returns the first sector of a data cluster.
    pub const fn cluster_sector(&self, cluster: Cluster) -> u32 {
        self.root_dir_base_sector + (cluster.value() - 2) * self.sectors_per_cluster()
    }

    #[must_use]
    #[inline]
    /// Returns the data cluster holding the given sector.
    pub const fn sector_cluster(&self, sector: u32) -> Cluster {
        Cluster::new((sector - self.root_dir_base_sector) / self.sectors_per_cluster() + 2)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> Bpb {
        Bpb::new()
            .with_total_sectors(1070)
            .with_sectors_per_fat(8)
            .with_volume_id(0x1234_5678)
    }

    fn encode(bpb: &Bpb) -> [u8; SECTOR_SIZE] {
        let mut sector = [0u8; SECTOR_SIZE];
        bpb.write_to(&mut sector);
        sector
    }

    #[test]
    fn test_bpb_layout() {
        let sector = encode(&reference());

        assert_eq!(sector[0], 0xEB);
        assert_eq!(&sector[11..13], &512u16.to_le_bytes());
        assert_eq!(sector[13], 1);
        assert_eq!(&sector[14..16], &32u16.to_le_bytes());
        assert_eq!(sector[16], 2);
        assert_eq!(sector[21], 0xF8);
        assert_eq!(&sector[32..36], &1070u32.to_le_bytes());
        assert_eq!(&sector[36..40], &8u32.to_le_bytes());
        assert_eq!(&sector[44..48], &2u32.to_le_bytes());
        assert_eq!(&sector[48..50], &1u16.to_le_bytes());
        assert_eq!(&sector[50..52], &6u16.to_le_bytes());
        assert_eq!(&sector[67..71], &0x1234_5678u32.to_le_bytes());
        assert_eq!(&sector[82..90], b"FAT32   ");
        assert_eq!(sector[510..512], BOOT_SIGNATURE);
    }

    #[test]
    fn test_bpb_parse() {
        let bpb = reference();
        let parsed = Bpb::parse(&encode(&bpb)).unwrap();
        assert_eq!(parsed, bpb);
        assert_eq!(parsed.volume_id(), 0x1234_5678);
        assert_eq!(parsed.volume_label(), *b"NO NAME    ");
    }

    #[test]
    fn test_bpb_rejects_signature() {
        let mut sector = encode(&reference());
        sector[511] = 0;
        assert_eq!(Bpb::parse(&sector), Err(FatError::InvalidBootSector));
    }

    #[test]
    fn test_bpb_rejects_geometry() {
        let cases = [
            reference().with_bytes_per_sector(1024),
            reference().with_sectors_per_cluster(2),
            reference().with_fat_count(1),
            reference().with_root_cluster(3),
        ];
        for bpb in cases {
            assert_eq!(bpb.validate(), Err(FatError::UnsupportedGeometry));
        }
    }

    #[test]
    fn test_bpb_rejects_structure() {
        assert_eq!(
            Bpb::new().with_sectors_per_fat(8).validate(),
            Err(FatError::InvalidBootSector)
        );
        assert_eq!(
            reference().with_total_sectors(40).validate(),
            Err(FatError::InvalidBootSector)
        );
        assert_eq!(
            reference().with_reserved_sectors(4).validate(),
            Err(FatError::InvalidBootSector)
        );
        let mut sector = encode(&reference());
        sector[0] = 0xE9;
        assert_eq!(Bpb::parse(&sector), Err(FatError::InvalidBootSector));
    }

    #[test]
    fn test_volume_geometry() {
        let volume = VolumeDescriptor::new(reference());

        assert_eq!(volume.root_dir_base_sector(), 32 + 8 * 2);
        assert_eq!(volume.fat_sector(0, 0), 32);
        assert_eq!(volume.fat_sector(1, 3), 32 + 8 + 3);
        assert_eq!(volume.cluster_sector(Cluster::new(2)), 48);
        assert_eq!(volume.cluster_sector(Cluster::new(10)), 56);
        assert_eq!(volume.sector_cluster(56), Cluster::new(10));
        assert_eq!(volume.bytes_per_cluster(), 512);
        assert_eq!(volume.entries_per_cluster(), 16);
        // 1070 - 48 = 1022 data clusters, plus the two reserved entries
        assert_eq!(volume.cluster_count(), 1024);

        let small = VolumeDescriptor::new(reference().with_total_sectors(148));
        assert_eq!(small.cluster_count(), 102);
    }
}
