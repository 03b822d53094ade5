use std::io::{Read, Seek, SeekFrom};

use crate::error::{BlercuError, BlercuResult};

/// A three-part hardware or firmware version, as reported by the device or carried by an
/// upgrade image.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl Version {
    pub fn new(major: u8, minor: u8, patch: u8) -> Self {
        Version { major, minor, patch }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// An OTA firmware image held in memory, with the header fields the upgrade protocol needs to
/// negotiate and verify a transfer without re-reading the whole image each time.
#[derive(Clone, Debug)]
pub struct FirmwareImage {
    manufacturer_id: u8,
    hardware_version: Version,
    firmware_version: Version,
    data: Vec<u8>,
    crc32: u32,
}

impl FirmwareImage {
    pub fn new(
        manufacturer_id: u8,
        hardware_version: Version,
        firmware_version: Version,
        data: Vec<u8>,
    ) -> Self {
        let crc32 = crc32fast::hash(&data);
        FirmwareImage {
            manufacturer_id,
            hardware_version,
            firmware_version,
            data,
            crc32,
        }
    }

    pub fn manufacturer_id(&self) -> u8 {
        self.manufacturer_id
    }

    pub fn hardware_version(&self) -> Version {
        self.hardware_version
    }

    pub fn firmware_version(&self) -> Version {
        self.firmware_version
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Returns whether this image's header matches the given hardware version and manufacturer
    /// id. Used to decide whether the strict hardware match policy should reject an upgrade.
    pub fn matches_hardware(&self, manufacturer_id: u8, hardware_version: Version) -> bool {
        self.manufacturer_id == manufacturer_id && self.hardware_version == hardware_version
    }

    /// Read `length` bytes starting at `offset`. Returns `BadFormat` if the requested window
    /// runs past the end of the image.
    pub fn read_block(&self, offset: u32, length: u32) -> BlercuResult<&[u8]> {
        let start = offset as usize;
        let end = start
            .checked_add(length as usize)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                BlercuError::BadFormat(format!(
                    "requested block [{}, {}) is out of bounds for a {}-byte image",
                    offset,
                    offset as u64 + length as u64,
                    self.data.len()
                ))
            })?;
        Ok(&self.data[start..end])
    }
}

/// A read-only, seekable view over a [`FirmwareImage`], for callers that want to stream it
/// rather than slice it block by block.
pub struct FirmwareImageReader<'a> {
    image: &'a FirmwareImage,
    position: u64,
}

impl<'a> FirmwareImageReader<'a> {
    pub fn new(image: &'a FirmwareImage) -> Self {
        FirmwareImageReader { image, position: 0 }
    }
}

impl<'a> Read for FirmwareImageReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.image.data[self.position as usize..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.position += count as u64;
        Ok(count)
    }
}

impl<'a> Seek for FirmwareImageReader<'a> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let new_position = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.image.data.len() as i64 + offset,
            SeekFrom::Current(offset) => self.position as i64 + offset,
        };
        if new_position < 0 || new_position as usize > self.image.data.len() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek position out of bounds",
            ));
        }
        self.position = new_position as u64;
        Ok(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> FirmwareImage {
        FirmwareImage::new(
            0x01,
            Version::new(1, 0, 0),
            Version::new(2, 3, 4),
            vec![0xAA; 256],
        )
    }

    #[test]
    fn crc32_is_computed_on_construction() {
        let image = sample_image();
        assert_eq!(image.crc32(), crc32fast::hash(&[0xAA; 256]));
    }

    #[test]
    fn read_block_within_bounds() {
        let image = sample_image();
        let block = image.read_block(16, 32).unwrap();
        assert_eq!(block.len(), 32);
    }

    #[test]
    fn read_block_out_of_bounds_is_bad_format() {
        let image = sample_image();
        assert!(matches!(
            image.read_block(200, 100),
            Err(BlercuError::BadFormat(_))
        ));
    }

    #[test]
    fn matches_hardware_compares_manufacturer_and_version() {
        let image = sample_image();
        assert!(image.matches_hardware(0x01, Version::new(1, 0, 0)));
        assert!(!image.matches_hardware(0x02, Version::new(1, 0, 0)));
        assert!(!image.matches_hardware(0x01, Version::new(1, 0, 1)));
    }

    #[test]
    fn reader_reads_sequentially_and_seeks() {
        let image = FirmwareImage::new(
            0x01,
            Version::new(1, 0, 0),
            Version::new(1, 0, 0),
            (0u8..=255).collect(),
        );
        let mut reader = FirmwareImageReader::new(&image);
        let mut first = [0u8; 4];
        reader.read_exact(&mut first).unwrap();
        assert_eq!(first, [0, 1, 2, 3]);

        reader.seek(SeekFrom::Start(250)).unwrap();
        let mut tail = [0u8; 6];
        let n = reader.read(&mut tail).unwrap();
        assert_eq!(n, 6);
        assert_eq!(&tail, &[250, 251, 252, 253, 254, 255]);
    }
}
