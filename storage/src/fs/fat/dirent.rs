use super::{Cluster, FatError, FatResult, le_u16, le_u32};
use alloc::string::String;

/// Size of a directory entry in bytes (always 32 bytes)
pub const DIR_ENTRY_SIZE: usize = 32;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// Directory entry attributes
pub struct Attributes(u8);

impl Attributes {
    /// Read-only attribute
    pub const READ_ONLY: u8 = 0x01;
    /// Hidden attribute
    pub const HIDDEN: u8 = 0x02;
    /// System attribute
    pub const SYSTEM: u8 = 0x04;
    /// Volume ID attribute
    pub const VOLUME_ID: u8 = 0x08;
    /// Directory attribute
    pub const DIRECTORY: u8 = 0x10;
    /// Archive attribute
    pub const ARCHIVE: u8 = 0x20;
    /// Long file name attribute
    pub const LONG_NAME: u8 = Self::READ_ONLY | Self::HIDDEN | Self::SYSTEM | Self::VOLUME_ID;
    /// Long file name mask
    pub const LONG_NAME_MASK: u8 = Self::READ_ONLY
        | Self::HIDDEN
        | Self::SYSTEM
        | Self::VOLUME_ID
        | Self::DIRECTORY
        | Self::ARCHIVE;

    #[must_use]
    #[inline]
    /// Creates a new attribute set
    pub const fn new(attributes: u8) -> Self {
        Self(attributes)
    }

    #[must_use]
    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    #[inline]
    /// Returns a copy with only the directory bit changed
    pub const fn with_directory(self, directory: bool) -> Self {
        if directory {
            Self(self.0 | Self::DIRECTORY)
        } else {
            Self(self.0 & !Self::DIRECTORY)
        }
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a volume ID
    pub const fn is_volume_id(self) -> bool {
        self.0 & Self::VOLUME_ID != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a directory
    pub const fn is_directory(self) -> bool {
        self.0 & Self::DIRECTORY != 0
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a long file name
    pub const fn is_long_name(self) -> bool {
        (self.0 & Self::LONG_NAME_MASK) == Self::LONG_NAME
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// An 8.3 name in its packed, space-padded on-disk form.
pub struct ShortName([u8; 11]);

impl ShortName {
    /// Current directory entry
    pub const DOT: Self = Self(*b".          ");
    /// Parent directory entry
    pub const DOTDOT: Self = Self(*b"..         ");

    /// Bytes that can never appear in a short name.
    const ILLEGAL: &'static [u8] = b"*+,:;<=>[]|\"?\x7F";
    /// Stored in place of a leading deleted-entry marker.
    const ESCAPED_DELETED: u8 = 0x05;

    #[must_use]
    #[inline]
    pub const fn from_raw(raw: [u8; 11]) -> Self {
        Self(raw)
    }

    #[must_use]
    #[inline]
    pub const fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }

    #[must_use]
    #[inline]
    /// Returns true for the `.` and `..` entries
    pub fn is_dot(&self) -> bool {
        *self == Self::DOT || *self == Self::DOTDOT
    }

    /// Packs a name into 8.3 form.
    ///
    /// Letters are uppercased. The base takes up to 8 characters and the optional
    /// extension up to 3; either may be empty, but not both. Characters outside of Latin-1, control characters,
    /// separators and the reserved punctuation are rejected.
    pub fn encode(name: &str) -> FatResult<Self> {
        match name {
            "." => return Ok(Self::DOT),
            ".." => return Ok(Self::DOTDOT),
            _ => {}
        }

        let mut raw = [b' '; 11];
        let mut len = 0;
        let mut limit = 8;

        for c in name.chars() {
            let byte = u8::try_from(c).map_err(|_| FatError::InvalidName)?;
            if byte <= b' ' || byte == b'/' || byte == b'\\' || Self::ILLEGAL.contains(&byte) {
                return Err(FatError::InvalidName);
            }

            if byte == b'.' {
                // Only one dot
                if limit == 11 {
                    return Err(FatError::InvalidName);
                }
                len = 8;
                limit = 11;
                continue;
            }

            if len >= limit {
                return Err(FatError::InvalidName);
            }
            raw[len] = byte.to_ascii_uppercase();
            len += 1;
        }

        // Nothing but a dot
        if raw == [b' '; 11] {
            return Err(FatError::InvalidName);
        }

        if raw[0] == DirEntry::DELETED_ENTRY {
            raw[0] = Self::ESCAPED_DELETED;
        }

        Ok(Self(raw))
    }

    #[must_use]
    /// Unpacks the name, dropping the padding.
    pub fn decode(&self) -> String {
        let base = trim_padding(&self.0[..8]);
        let extension = trim_padding(&self.0[8..]);

        let mut name = String::with_capacity(12);
        for (i, &byte) in base.iter().enumerate() {
            let byte = if i == 0 && byte == Self::ESCAPED_DELETED {
                DirEntry::DELETED_ENTRY
            } else {
                byte
            };
            name.push(char::from(byte));
        }
        if !extension.is_empty() {
            name.push('.');
            name.extend(extension.iter().copied().map(char::from));
        }
        name
    }
}

fn trim_padding(mut field: &[u8]) -> &[u8] {
    while let [rest @ .., b' '] = field {
        field = rest;
    }
    field
}

/// FAT short directory entry
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    /// 8.3 filename
    name: [u8; 11],
    /// File attributes
    attr: u8,
    /// Reserved for Windows NT
    nt_res: u8,
    creation_time_tenth: u8,
    creation_time: u16,
    creation_date: u16,
    last_access_date: u16,
    /// High word of first cluster number
    first_cluster_high: u16,
    write_time: u16,
    write_date: u16,
    /// Low word of first cluster number
    first_cluster_low: u16,
    /// File size in bytes
    file_size: u32,
}

impl DirEntry {
    /// Deleted entry marker (first byte)
    pub const DELETED_ENTRY: u8 = 0xE5;
    /// End of directory marker (first byte)
    pub const END_OF_ENTRIES: u8 = 0x00;

    #[must_use]
    #[inline]
    /// Creates an empty entry of the given name and type
    pub fn new(name: ShortName, attributes: Attributes) -> Self {
        Self {
            name: name.0,
            attr: attributes.value(),
            ..Self::default()
        }
    }

    #[must_use]
    /// Decodes an entry from the first 32 bytes of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut name = [0u8; 11];
        name.copy_from_slice(&bytes[0..11]);

        Self {
            name,
            attr: bytes[11],
            nt_res: bytes[12],
            creation_time_tenth: bytes[13],
            creation_time: le_u16(bytes, 14),
            creation_date: le_u16(bytes, 16),
            last_access_date: le_u16(bytes, 18),
            first_cluster_high: le_u16(bytes, 20),
            write_time: le_u16(bytes, 22),
            write_date: le_u16(bytes, 24),
            first_cluster_low: le_u16(bytes, 26),
            file_size: le_u32(bytes, 28),
        }
    }

    /// Encodes the entry into the first 32 bytes of `bytes`.
    pub fn write_to(&self, bytes: &mut [u8]) {
        bytes[0..11].copy_from_slice(&self.name);
        bytes[11] = self.attr;
        bytes[12] = self.nt_res;
        bytes[13] = self.creation_time_tenth;
        bytes[14..16].copy_from_slice(&self.creation_time.to_le_bytes());
        bytes[16..18].copy_from_slice(&self.creation_date.to_le_bytes());
        bytes[18..20].copy_from_slice(&self.last_access_date.to_le_bytes());
        bytes[20..22].copy_from_slice(&self.first_cluster_high.to_le_bytes());
        bytes[22..24].copy_from_slice(&self.write_time.to_le_bytes());
        bytes[24..26].copy_from_slice(&self.write_date.to_le_bytes());
        bytes[26..28].copy_from_slice(&self.first_cluster_low.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.file_size.to_le_bytes());
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry terminates the directory
    pub const fn is_end(&self) -> bool {
        self.name[0] == Self::END_OF_ENTRIES
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is deleted
    pub const fn is_deleted(&self) -> bool {
        self.name[0] == Self::DELETED_ENTRY
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is valid
    pub const fn is_valid(&self) -> bool {
        !self.is_end() && !self.is_deleted()
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry is a directory
    pub const fn is_directory(&self) -> bool {
        Attributes::new(self.attr).is_directory()
    }

    #[must_use]
    #[inline]
    /// Returns true if the entry names a file or a directory.
    ///
    /// Long name fragments and the volume label are not.
    pub const fn is_named(&self) -> bool {
        let attributes = Attributes::new(self.attr);
        self.is_valid() && !attributes.is_long_name() && !attributes.is_volume_id()
    }

    #[must_use]
    #[inline]
    pub const fn attributes(&self) -> Attributes {
        Attributes::new(self.attr)
    }

    #[inline]
    pub const fn set_attributes(&mut self, attributes: Attributes) {
        self.attr = attributes.0;
    }

    #[must_use]
    #[inline]
    pub const fn short_name(&self) -> ShortName {
        ShortName(self.name)
    }

    #[must_use]
    /// Returns the first cluster number
    pub fn first_cluster(&self) -> Cluster {
        Cluster::new((u32::from(self.first_cluster_high) << 16) | u32::from(self.first_cluster_low))
    }

    /// Sets the first cluster number
    pub const fn set_first_cluster(&mut self, cluster: Cluster) {
        self.first_cluster_low = (cluster.value() & 0xFFFF) as u16;
        self.first_cluster_high = (cluster.value() >> 16) as u16;
    }

    #[must_use]
    #[inline]
    /// Returns the file size
    pub const fn file_size(&self) -> u32 {
        self.file_size
    }

    #[inline]
    /// Sets the file size
    pub const fn set_file_size(&mut self, size: u32) {
        self.file_size = size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(name: &str) -> [u8; 11] {
        *ShortName::encode(name).unwrap().as_bytes()
    }

    #[test]
    fn test_encode() {
        assert_eq!(&encode("README.TXT"), b"README  TXT");
        assert_eq!(&encode("poem.txt"), b"POEM    TXT");
        assert_eq!(&encode("TEST_DIR"), b"TEST_DIR   ");
        assert_eq!(&encode("A.B"), b"A       B  ");
        assert_eq!(&encode("ABCDEFGH.IJK"), b"ABCDEFGHIJK");
        assert_eq!(&encode(".txt"), b"        TXT");
        assert_eq!(&encode("A."), b"A          ");
        assert_eq!(ShortName::encode("."), Ok(ShortName::DOT));
        assert_eq!(ShortName::encode(".."), Ok(ShortName::DOTDOT));
    }

    #[test]
    fn test_encode_rejects() {
        for name in [
            "", "ABCDEFGHI", "A.BCDE", "A.B.C", "A..B", "...", "A B", "A*", "A+B", "A,B", "A:B",
            "A;B", "A<B", "A=B", "A>B", "A[B", "A]B", "A|B", "A\"B", "A?B", "A\x7F", "A/B",
            "A\\B", "\u{263A}",
        ] {
            assert_eq!(
                ShortName::encode(name),
                Err(FatError::InvalidName),
                "{name:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_deleted_marker_escape() {
        let name = ShortName::encode("\u{E5}X.Y").unwrap();
        assert_eq!(name.as_bytes()[0], 0x05);
        assert_eq!(name.decode(), "\u{E5}X.Y");
    }

    #[test]
    fn test_decode() {
        assert_eq!(ShortName::from_raw(*b"README  TXT").decode(), "README.TXT");
        assert_eq!(ShortName::from_raw(*b"TEST_DIR   ").decode(), "TEST_DIR");
        assert_eq!(ShortName::from_raw(*b"        TXT").decode(), ".TXT");
        assert_eq!(ShortName::DOT.decode(), ".");
        assert_eq!(ShortName::DOTDOT.decode(), "..");
        assert!(ShortName::DOTDOT.is_dot());
        assert!(!ShortName::from_raw(*b"A          ").is_dot());
    }

    #[test]
    fn test_round_trip() {
        for name in ["a", "readme.txt", "Mixed.Ext", "12345678.123", "X_Y-Z.A~1", "#$%&.!@"] {
            let short = ShortName::encode(name).unwrap();
            assert_eq!(short.decode(), name.to_ascii_uppercase());
        }
    }

    #[test]
    fn test_attributes() {
        let attributes = Attributes::new(Attributes::ARCHIVE);
        assert!(!attributes.is_directory());
        let attributes = attributes.with_directory(true);
        assert!(attributes.is_directory());
        assert_eq!(attributes.value(), Attributes::ARCHIVE | Attributes::DIRECTORY);
        assert_eq!(attributes.with_directory(false).value(), Attributes::ARCHIVE);
        assert!(Attributes::new(Attributes::LONG_NAME).is_long_name());
        assert!(!Attributes::new(Attributes::VOLUME_ID).is_long_name());
    }

    #[test]
    fn test_dirent_layout() {
        let mut entry = DirEntry::new(
            ShortName::encode("POEM.TXT").unwrap(),
            Attributes::new(Attributes::ARCHIVE),
        );
        entry.set_first_cluster(Cluster::new(0x0012_3456));
        entry.set_file_size(600);

        let mut bytes = [0xFFu8; DIR_ENTRY_SIZE];
        entry.write_to(&mut bytes);

        assert_eq!(&bytes[0..11], b"POEM    TXT");
        assert_eq!(bytes[11], Attributes::ARCHIVE);
        assert_eq!(&bytes[20..22], &0x0012u16.to_le_bytes());
        assert_eq!(&bytes[26..28], &0x3456u16.to_le_bytes());
        assert_eq!(&bytes[28..32], &600u32.to_le_bytes());

        let decoded = DirEntry::from_bytes(&bytes);
        assert_eq!(decoded, entry);
        assert_eq!(decoded.first_cluster(), Cluster::new(0x0012_3456));
        assert!(decoded.is_named());
        assert!(!decoded.is_directory());
    }

    #[test]
    fn test_dirent_markers() {
        let mut bytes = [0u8; DIR_ENTRY_SIZE];
        assert!(DirEntry::from_bytes(&bytes).is_end());

        bytes[0] = DirEntry::DELETED_ENTRY;
        let entry = DirEntry::from_bytes(&bytes);
        assert!(entry.is_deleted());
        assert!(!entry.is_valid());

        bytes[0] = b'A';
        bytes[11] = Attributes::LONG_NAME;
        let entry = DirEntry::from_bytes(&bytes);
        assert!(entry.is_valid());
        assert!(!entry.is_named());
    }
}
