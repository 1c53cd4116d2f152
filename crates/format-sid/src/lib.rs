//! PSID/RSID file format.
//!
//! SID files carry 6502 machine code plus playback metadata. All header
//! fields are big-endian at fixed offsets; the payload follows at
//! `data_offset`. A header load address of 0 means the real address is in
//! the first two payload bytes, little-endian.

mod relocate;

pub use relocate::relocate;

use thiserror::Error;

// Header field offsets (big-endian)
const HEADER_MIN_SIZE: usize = 0x76;
const OFFSET_VERSION: usize = 0x04;
const OFFSET_DATA: usize = 0x06;
const OFFSET_LOAD: usize = 0x08;
const OFFSET_INIT: usize = 0x0A;
const OFFSET_PLAY: usize = 0x0C;
const OFFSET_SONGS: usize = 0x0E;
const OFFSET_START: usize = 0x10;
const OFFSET_SPEED: usize = 0x12;
const OFFSET_NAME: usize = 0x16;
const OFFSET_AUTHOR: usize = 0x36;
const OFFSET_RELEASED: usize = 0x56;
const OFFSET_FLAGS: usize = 0x76;

/// SID file parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SidFormatError {
    #[error("file too small for a SID header ({0} bytes)")]
    TooShort(usize),
    #[error("invalid magic: {0:?}")]
    BadMagic(String),
    #[error("data offset {0:#06x} beyond end of file")]
    BadDataOffset(u16),
}

/// File kind from the magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidKind {
    /// Plays through exported init/play entry points.
    Psid,
    /// Requires a running machine; init installs its own interrupt.
    Rsid,
}

/// Parsed PSID/RSID file.
#[derive(Debug)]
pub struct SidFile {
    /// PSID or RSID.
    pub kind: SidKind,
    /// Format version (1-4).
    pub version: u16,
    /// Memory address the payload loads at.
    pub load_address: u16,
    /// Song initialisation entry point.
    pub init_address: u16,
    /// Per-frame play entry point (0 = init installs its own).
    pub play_address: u16,
    /// Number of songs.
    pub songs: u16,
    /// Default song (1-indexed).
    pub start_song: u16,
    /// Per-song timing flags.
    pub speed: u32,
    /// Song title.
    pub name: String,
    /// Composer.
    pub author: String,
    /// Release info.
    pub released: String,
    /// v2+ flags word.
    pub flags: u16,
    /// 6502 machine code and data (load-address prefix stripped).
    pub data: Vec<u8>,
}

impl SidFile {
    /// Parse PSID/RSID data from a byte slice.
    pub fn parse(bytes: &[u8]) -> Result<Self, SidFormatError> {
        if bytes.len() < HEADER_MIN_SIZE {
            return Err(SidFormatError::TooShort(bytes.len()));
        }

        let kind = match &bytes[0..4] {
            b"PSID" => SidKind::Psid,
            b"RSID" => SidKind::Rsid,
            other => {
                return Err(SidFormatError::BadMagic(
                    String::from_utf8_lossy(other).into_owned(),
                ));
            }
        };

        let version = read_u16_be(&bytes[OFFSET_VERSION..]);
        let data_offset = read_u16_be(&bytes[OFFSET_DATA..]);
        let mut load_address = read_u16_be(&bytes[OFFSET_LOAD..]);
        let init_address = read_u16_be(&bytes[OFFSET_INIT..]);
        let play_address = read_u16_be(&bytes[OFFSET_PLAY..]);
        let songs = read_u16_be(&bytes[OFFSET_SONGS..]);
        let start_song = read_u16_be(&bytes[OFFSET_START..]);
        let speed = read_u32_be(&bytes[OFFSET_SPEED..]);

        let name = read_string(&bytes[OFFSET_NAME..OFFSET_AUTHOR]);
        let author = read_string(&bytes[OFFSET_AUTHOR..OFFSET_RELEASED]);
        let released = read_string(&bytes[OFFSET_RELEASED..OFFSET_FLAGS]);

        let flags = if version >= 2 && bytes.len() > OFFSET_FLAGS + 1 {
            read_u16_be(&bytes[OFFSET_FLAGS..])
        } else {
            0
        };

        let data_start = data_offset as usize;
        if data_start > bytes.len() {
            return Err(SidFormatError::BadDataOffset(data_offset));
        }

        let mut data = bytes[data_start..].to_vec();

        // Load address 0: real address is the first two payload bytes (LE)
        if load_address == 0 && data.len() >= 2 {
            load_address = u16::from_le_bytes([data[0], data[1]]);
            data.drain(..2);
        }

        Ok(Self {
            kind,
            version,
            load_address,
            init_address,
            play_address,
            songs,
            start_song,
            speed,
            name,
            author,
            released,
            flags,
            data,
        })
    }

    /// True for RSID files.
    #[must_use]
    pub const fn is_rsid(&self) -> bool {
        matches!(self.kind, SidKind::Rsid)
    }

    /// Effective init entry: RSID files with init 0 start at the load
    /// address.
    #[must_use]
    pub const fn effective_init(&self) -> u16 {
        if self.init_address == 0 {
            self.load_address
        } else {
            self.init_address
        }
    }
}

fn read_u16_be(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Null-terminated Latin-1 string (SID headers are ISO-8859-1).
fn read_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    bytes[..end]
        .iter()
        .map(|&b| b as char)
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a minimal v2 PSID image.
    fn make_psid(load: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; 0x7C];
        bytes[0..4].copy_from_slice(b"PSID");
        bytes[OFFSET_VERSION + 1] = 2;
        bytes[OFFSET_DATA..OFFSET_DATA + 2].copy_from_slice(&0x7Cu16.to_be_bytes());
        bytes[OFFSET_LOAD..OFFSET_LOAD + 2].copy_from_slice(&load.to_be_bytes());
        bytes[OFFSET_INIT..OFFSET_INIT + 2].copy_from_slice(&0x1000u16.to_be_bytes());
        bytes[OFFSET_PLAY..OFFSET_PLAY + 2].copy_from_slice(&0x1003u16.to_be_bytes());
        bytes[OFFSET_SONGS..OFFSET_SONGS + 2].copy_from_slice(&1u16.to_be_bytes());
        bytes[OFFSET_START..OFFSET_START + 2].copy_from_slice(&1u16.to_be_bytes());
        bytes[OFFSET_NAME..OFFSET_NAME + 4].copy_from_slice(b"Test");
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn parses_header_fields() {
        let sid = SidFile::parse(&make_psid(0x1000, &[0xA9, 0x00, 0x60])).expect("parse");
        assert_eq!(sid.kind, SidKind::Psid);
        assert_eq!(sid.version, 2);
        assert_eq!(sid.load_address, 0x1000);
        assert_eq!(sid.init_address, 0x1000);
        assert_eq!(sid.play_address, 0x1003);
        assert_eq!(sid.name, "Test");
        assert_eq!(sid.data, vec![0xA9, 0x00, 0x60]);
    }

    #[test]
    fn zero_load_address_reads_payload_prefix() {
        let sid = SidFile::parse(&make_psid(0, &[0x00, 0x20, 0xEA])).expect("parse");
        assert_eq!(sid.load_address, 0x2000);
        assert_eq!(sid.data, vec![0xEA]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = make_psid(0x1000, &[]);
        bytes[0..4].copy_from_slice(b"XSID");
        assert!(matches!(
            SidFile::parse(&bytes),
            Err(SidFormatError::BadMagic(_))
        ));
    }

    #[test]
    fn rejects_short_file() {
        assert!(matches!(
            SidFile::parse(&[0u8; 16]),
            Err(SidFormatError::TooShort(16))
        ));
    }

    #[test]
    fn rejects_data_offset_beyond_file() {
        let mut bytes = make_psid(0x1000, &[]);
        bytes[OFFSET_DATA..OFFSET_DATA + 2].copy_from_slice(&0x7FFFu16.to_be_bytes());
        assert!(matches!(
            SidFile::parse(&bytes),
            Err(SidFormatError::BadDataOffset(0x7FFF))
        ));
    }
}
