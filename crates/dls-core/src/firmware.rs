//! Firmware image inspection for OpenStage/OpenScape phones.
//!
//! The image layout is reverse-engineered: two NUL-terminated strings
//! (phone model, firmware version) sit behind a fixed header, and a
//! trailer at a fixed distance from the end names the device type and the
//! firmware family. The family check is the sanity gate that tells a
//! firmware image apart from an arbitrary binary.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Offset of the phone-model string from the start of the image.
pub const MODEL_OFFSET: usize = 0x20;
/// Offset of the device-type trailer, counted from the end of the image.
pub const TRAILER_OFFSET: u64 = 0x128;
/// Bytes between the device-type and firmware-family strings in the trailer.
pub const TRAILER_GAP: usize = 0x2;

const FW_TYPE_SIP: &str = "Siemens SIP";
const FW_TYPE_HFA: &str = "Siemens HFA";

#[derive(Error, Debug)]
pub enum FwError {
    #[error("'{0}' is not a known firmware family - not a firmware image?")]
    NotAFirmwareImage(String),

    #[error("cannot parse firmware version '{0}'")]
    BadVersion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Firmware version `V{major}[.{submajor}] R{minor}.{fix}.{hotfix}`.
///
/// Field order matters: the derived `Ord` is the component-wise comparison
/// Major, Submajor, Minor, Fix, Hotfix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct FwVersion {
    pub major: u32,
    pub submajor: u32,
    pub minor: u32,
    pub fix: u32,
    pub hotfix: u32,
}

impl FwVersion {
    pub fn new(major: u32, submajor: u32, minor: u32, fix: u32, hotfix: u32) -> Self {
        Self {
            major,
            submajor,
            minor,
            fix,
            hotfix,
        }
    }

    /// Find and parse a version anywhere in `text`.
    ///
    /// A missing submajor defaults to 0, so `V3 R1.2.3` and `V3.0 R1.2.3`
    /// denote the same version.
    pub fn parse(text: &str) -> Result<Self, FwError> {
        let bytes = text.as_bytes();
        for (pos, byte) in bytes.iter().enumerate() {
            if *byte == b'V'
                && let Some(version) = Self::parse_at(bytes, pos + 1)
            {
                return Ok(version);
            }
        }
        Err(FwError::BadVersion(text.to_string()))
    }

    fn parse_at(bytes: &[u8], mut pos: usize) -> Option<Self> {
        let major = take_number(bytes, &mut pos)?;

        let mut submajor = 0;
        if bytes.get(pos) == Some(&b'.') {
            let mut after_dot = pos + 1;
            submajor = take_number(bytes, &mut after_dot)?;
            pos = after_dot;
        }

        if bytes.get(pos) != Some(&b' ') || bytes.get(pos + 1) != Some(&b'R') {
            return None;
        }
        pos += 2;

        let minor = take_number(bytes, &mut pos)?;
        if bytes.get(pos) != Some(&b'.') {
            return None;
        }
        pos += 1;
        let fix = take_number(bytes, &mut pos)?;
        if bytes.get(pos) != Some(&b'.') {
            return None;
        }
        pos += 1;
        let hotfix = take_number(bytes, &mut pos)?;

        Some(Self::new(major, submajor, minor, fix, hotfix))
    }
}

impl fmt::Display for FwVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.submajor != 0 {
            write!(
                f,
                "V{}.{} R{}.{}.{}",
                self.major, self.submajor, self.minor, self.fix, self.hotfix
            )
        } else {
            write!(
                f,
                "V{} R{}.{}.{}",
                self.major, self.minor, self.fix, self.hotfix
            )
        }
    }
}

fn take_number(bytes: &[u8], pos: &mut usize) -> Option<u32> {
    let start = *pos;
    while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if *pos == start {
        return None;
    }
    std::str::from_utf8(&bytes[start..*pos]).ok()?.parse().ok()
}

/// Everything the image tells us about itself.
#[derive(Debug, Clone)]
pub struct FwInfo {
    pub file: PathBuf,
    pub phone: String,
    pub dev_type: String,
    pub fw_type: String,
    pub version: FwVersion,
}

impl FwInfo {
    /// Two images are interchangeable when both phone model and device
    /// type match.
    pub fn is_compatible(&self, other: &FwInfo) -> bool {
        self.phone == other.phone && self.dev_type == other.dev_type
    }

    pub fn is_sip(&self) -> bool {
        self.fw_type == FW_TYPE_SIP
    }
}

/// Read the firmware descriptor of the image at `path`.
pub fn firmware_info(path: &Path) -> Result<FwInfo, FwError> {
    let file = File::open(path)?;
    read_firmware_info(file, path)
}

/// Extract `FwInfo` from any seekable source; `path` only labels the result.
pub fn read_firmware_info<R: Read + Seek>(source: R, path: &Path) -> Result<FwInfo, FwError> {
    let mut reader = BufReader::new(source);

    let mut header = [0u8; MODEL_OFFSET];
    reader.read_exact(&mut header)?;
    let phone = read_cstring(&mut reader)?;

    // The version string starts at the first non-zero byte after the
    // model string.
    let mut byte = [0u8; 1];
    let first = loop {
        reader.read_exact(&mut byte)?;
        if byte[0] != 0 {
            break byte[0];
        }
    };
    let mut version_text = String::new();
    version_text.push(first as char);
    version_text.push_str(&read_cstring(&mut reader)?);

    // Seeking drops the buffer, exactly what the trailer read needs.
    reader.seek(SeekFrom::End(-(TRAILER_OFFSET as i64)))?;
    let dev_type = read_cstring(&mut reader)?;

    let mut gap = [0u8; TRAILER_GAP];
    reader.read_exact(&mut gap)?;
    let fw_type = read_cstring(&mut reader)?;

    if fw_type != FW_TYPE_SIP && fw_type != FW_TYPE_HFA {
        return Err(FwError::NotAFirmwareImage(fw_type));
    }

    let version = FwVersion::parse(&version_text)?;

    Ok(FwInfo {
        file: path.to_path_buf(),
        phone,
        dev_type,
        fw_type,
        version,
    })
}

fn read_cstring<R: BufRead>(reader: &mut R) -> Result<String, FwError> {
    let mut buf = Vec::new();
    reader.read_until(0, &mut buf)?;
    if buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Build a synthetic firmware image for tests.
#[cfg(test)]
pub(crate) fn fake_image(phone: &str, version: &str, dev_type: &str, fw_type: &str) -> Vec<u8> {
    let mut image = vec![0u8; MODEL_OFFSET];
    image.extend_from_slice(phone.as_bytes());
    image.push(0);
    image.extend_from_slice(&[0, 0, 0]);
    image.extend_from_slice(version.as_bytes());
    image.push(0);
    image.resize(0x200, 0xAA);

    let mut trailer = Vec::new();
    trailer.extend_from_slice(dev_type.as_bytes());
    trailer.push(0);
    trailer.extend_from_slice(&[0; TRAILER_GAP]);
    trailer.extend_from_slice(fw_type.as_bytes());
    trailer.push(0);
    assert!(trailer.len() <= TRAILER_OFFSET as usize);
    trailer.resize(TRAILER_OFFSET as usize, 0);

    image.extend_from_slice(&trailer);
    image
}
