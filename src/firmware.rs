// Copyright 2021 Locha Mesh Developers <contact@locha.io>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # Firmware images
//!
//! Raw binaries are loaded as-is, `.hex`/`.ihex` files are decoded as
//! Intel HEX and flattened into a contiguous buffer, gaps are filled with
//! the erased flash value (`0xFF`).

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::crc::crc32;

/// Largest span an Intel HEX file may cover once flattened.
const MAX_IMAGE_SPAN: u32 = 16 * 1024 * 1024;

const ERASED_BYTE: u8 = 0xFF;

/// Errors loading a firmware image.
#[derive(Debug, thiserror::Error)]
pub enum FirmwareError {
    #[error("couldn't read firmware file `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("firmware image is empty")]
    Empty,

    #[error("firmware image is too large ({0} bytes)")]
    TooLarge(usize),

    #[error("invalid Intel HEX record on line {line}: {reason}")]
    InvalidHex { line: usize, reason: String },
}

/// A firmware image ready to be written, with its CRC32.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    bytes: Vec<u8>,
    crc32: u32,
}

impl FirmwareImage {
    /// Build an image from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<FirmwareImage, FirmwareError> {
        if bytes.is_empty() {
            return Err(FirmwareError::Empty);
        }

        if bytes.len() > MAX_IMAGE_SPAN as usize {
            return Err(FirmwareError::TooLarge(bytes.len()));
        }

        let crc32 = crc32(&bytes);
        Ok(FirmwareImage { bytes, crc32 })
    }

    /// Load a firmware file, Intel HEX files are detected by their
    /// extension.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<FirmwareImage, FirmwareError> {
        let path = path.as_ref();
        let io_err = |source| FirmwareError::Io {
            path: path.to_owned(),
            source,
        };

        let bytes = if is_intel_hex(path) {
            log::debug!("Decoding `{}` as Intel HEX", path.display());
            let text = fs::read_to_string(path).map_err(io_err)?;
            parse_intel_hex(&text)?
        } else {
            fs::read(path).map_err(io_err)?
        };

        let image = FirmwareImage::from_bytes(bytes)?;
        log::info!(
            "Firmware `{}`: {} bytes, CRC32 {:#010x}",
            path.display(),
            image.len(),
            image.crc32()
        );

        Ok(image)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// CRC32 of the whole image.
    pub fn crc32(&self) -> u32 {
        self.crc32
    }
}

fn is_intel_hex(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("hex") || ext.eq_ignore_ascii_case("ihex"))
        .unwrap_or(false)
}

fn hex_digit(c: u8) -> Option<u8> {
    char::from(c).to_digit(16).map(|digit| digit as u8)
}

fn parse_intel_hex(text: &str) -> Result<Vec<u8>, FirmwareError> {
    let mut chunks: Vec<(u32, Vec<u8>)> = Vec::new();
    let mut base: u32 = 0;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let invalid = |reason: &str| FirmwareError::InvalidHex {
            line: line_no,
            reason: reason.to_owned(),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let hex = line
            .strip_prefix(':')
            .ok_or_else(|| invalid("missing start code"))?;
        if hex.len() % 2 != 0 || hex.len() < 10 {
            return Err(invalid("truncated record"));
        }

        let record = hex
            .as_bytes()
            .chunks(2)
            .map(|pair| Some((hex_digit(pair[0])? << 4) | hex_digit(pair[1])?))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| invalid("not an hexadecimal digit"))?;

        let len = record[0] as usize;
        if record.len() != len + 5 {
            return Err(invalid("length doesn't match the record size"));
        }

        let checksum = record.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
        if checksum != 0 {
            return Err(invalid("bad checksum"));
        }

        let offset = u32::from(u16::from_be_bytes([record[1], record[2]]));
        let data = &record[4..4 + len];

        match record[3] {
            // Data
            0x00 => chunks.push((base.wrapping_add(offset), data.to_vec())),
            // End of file
            0x01 => break,
            // Extended segment address
            0x02 if len == 2 => {
                base = u32::from(u16::from_be_bytes([data[0], data[1]])) << 4;
            }
            // Extended linear address
            0x04 if len == 2 => {
                base = u32::from(u16::from_be_bytes([data[0], data[1]])) << 16;
            }
            // Start segment/linear address, the bootloader doesn't care.
            0x03 | 0x05 => (),
            _ => return Err(invalid("unsupported record type")),
        }
    }

    let start = match chunks.iter().map(|(addr, _)| *addr).min() {
        Some(start) => start,
        None => return Ok(Vec::new()),
    };
    let end = chunks
        .iter()
        .map(|(addr, data)| u64::from(*addr) + data.len() as u64)
        .max()
        .unwrap_or_else(|| u64::from(start));

    let span = end - u64::from(start);
    if span > u64::from(MAX_IMAGE_SPAN) {
        return Err(FirmwareError::TooLarge(span as usize));
    }

    let mut image = vec![ERASED_BYTE; span as usize];
    for (addr, data) in chunks {
        let offset = (addr - start) as usize;
        image[offset..offset + data.len()].copy_from_slice(&data);
    }

    Ok(image)
}
