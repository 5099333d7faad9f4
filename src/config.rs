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

//! # Flashing configuration
//!
//! [`FlashConfig`] is built once through [`FlashConfigBuilder`] and
//! validated there, it can't change during a run.

use std::path::{Path, PathBuf};

use crate::device::PageRange;

/// Baudrate used to talk to the bootloader before any speed upgrade.
pub const DEFAULT_BAUDRATE: u32 = 115_200;

/// Bytes read back when no length is given.
pub const DEFAULT_READ_LENGTH: u32 = 0x80000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("serial port can't be empty")]
    EmptyPort,
    #[error("baudrate must be greater than zero")]
    ZeroBaudrate,
    #[error("read length must be greater than zero")]
    ZeroReadLength,
    #[error("read back address {0:#X} must be 32-bits aligned")]
    UnalignedReadAddress(u32),
    #[error("unique address can't be zero")]
    ZeroUniqueAddress,
    #[error("invalid IEEE address `{0}`, expected 8 bytes like 00:12:4b:00:01:02:03:04")]
    InvalidIeeeAddress(String),
}

/// Configuration of one flashing run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashConfig {
    port: String,
    baudrate: u32,
    address: Option<u32>,
    erase: bool,
    erase_pages: Option<PageRange>,
    write: bool,
    verify: bool,
    read: bool,
    read_length: u32,
    read_output: Option<PathBuf>,
    unique_address: Option<u64>,
    disable_bootloader: bool,
    force_speed: bool,
    bootloader_active_high: bool,
    bootloader_invert_lines: bool,
}

impl FlashConfig {
    pub fn builder<S: Into<String>>(port: S) -> FlashConfigBuilder {
        FlashConfigBuilder {
            config: FlashConfig {
                port: port.into(),
                baudrate: DEFAULT_BAUDRATE,
                address: None,
                erase: false,
                erase_pages: None,
                write: false,
                verify: false,
                read: false,
                read_length: DEFAULT_READ_LENGTH,
                read_output: None,
                unique_address: None,
                disable_bootloader: false,
                force_speed: false,
                bootloader_active_high: false,
                bootloader_invert_lines: false,
            },
        }
    }

    /// Mass erase, write and verify at 115200 baud, the address comes from
    /// the device.
    pub fn dongle<S: Into<String>>(port: S) -> Result<FlashConfig, ConfigError> {
        FlashConfig::builder(port)
            .erase(true)
            .write(true)
            .verify(true)
            .build()
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }

    /// Write/verify/read address, `None` to use the start of flash.
    pub fn address(&self) -> Option<u32> {
        self.address
    }

    pub fn erase(&self) -> bool {
        self.erase
    }

    pub fn erase_pages(&self) -> Option<&PageRange> {
        self.erase_pages.as_ref()
    }

    pub fn write(&self) -> bool {
        self.write
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    pub fn read(&self) -> bool {
        self.read
    }

    pub fn read_length(&self) -> u32 {
        self.read_length
    }

    pub fn read_output(&self) -> Option<&Path> {
        self.read_output.as_deref()
    }

    pub fn unique_address(&self) -> Option<u64> {
        self.unique_address
    }

    pub fn disable_bootloader(&self) -> bool {
        self.disable_bootloader
    }

    /// Don't switch to the external oscillator, keep the initial baudrate.
    pub fn force_speed(&self) -> bool {
        self.force_speed
    }

    pub fn bootloader_active_high(&self) -> bool {
        self.bootloader_active_high
    }

    pub fn bootloader_invert_lines(&self) -> bool {
        self.bootloader_invert_lines
    }

    /// Whether the run needs a firmware image.
    pub fn needs_image(&self) -> bool {
        self.write || self.verify
    }
}

#[derive(Debug, Clone)]
pub struct FlashConfigBuilder {
    config: FlashConfig,
}

impl FlashConfigBuilder {
    pub fn baudrate(mut self, baudrate: u32) -> Self {
        self.config.baudrate = baudrate;
        self
    }

    pub fn address(mut self, address: u32) -> Self {
        self.config.address = Some(address);
        self
    }

    pub fn erase(mut self, erase: bool) -> Self {
        self.config.erase = erase;
        self
    }

    pub fn erase_pages(mut self, range: PageRange) -> Self {
        self.config.erase_pages = Some(range);
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.config.write = write;
        self
    }

    pub fn verify(mut self, verify: bool) -> Self {
        self.config.verify = verify;
        self
    }

    /// Read `length` bytes of flash into `output`.
    pub fn read<P: Into<PathBuf>>(mut self, length: u32, output: P) -> Self {
        self.config.read = true;
        self.config.read_length = length;
        self.config.read_output = Some(output.into());
        self
    }

    pub fn unique_address(mut self, address: u64) -> Self {
        self.config.unique_address = Some(address);
        self
    }

    pub fn disable_bootloader(mut self, disable: bool) -> Self {
        self.config.disable_bootloader = disable;
        self
    }

    pub fn force_speed(mut self, force: bool) -> Self {
        self.config.force_speed = force;
        self
    }

    pub fn bootloader_active_high(mut self, active_high: bool) -> Self {
        self.config.bootloader_active_high = active_high;
        self
    }

    pub fn bootloader_invert_lines(mut self, invert: bool) -> Self {
        self.config.bootloader_invert_lines = invert;
        self
    }

    pub fn build(self) -> Result<FlashConfig, ConfigError> {
        let config = self.config;

        if config.port.trim().is_empty() {
            return Err(ConfigError::EmptyPort);
        }

        if config.baudrate == 0 {
            return Err(ConfigError::ZeroBaudrate);
        }

        if config.read && config.read_length == 0 {
            return Err(ConfigError::ZeroReadLength);
        }

        if let (true, Some(address)) = (config.read, config.address) {
            if address % 4 != 0 {
                return Err(ConfigError::UnalignedReadAddress(address));
            }
        }

        if config.unique_address == Some(0) {
            return Err(ConfigError::ZeroUniqueAddress);
        }

        Ok(config)
    }
}

/// Parse an IEEE address, either as 8 colon separated hex bytes
/// (most significant first) or as a plain `0x` prefixed number.
pub fn parse_ieee_address(s: &str) -> Result<u64, ConfigError> {
    let invalid = || ConfigError::InvalidIeeeAddress(s.to_owned());

    let s = s.trim();
    if s.contains(':') {
        let bytes = s
            .split(':')
            .map(|b| u8::from_str_radix(b, 16))
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| invalid())?;
        if bytes.len() != 8 {
            return Err(invalid());
        }

        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    } else {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(digits, 16).map_err(|_| invalid())
    }
}

/// Format an IEEE address as colon separated bytes, most significant
/// first.
pub fn format_ieee_address(address: u64) -> String {
    address
        .to_be_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_dongle_config() {
        let config = FlashConfig::dongle("/dev/ttyS0").unwrap();
        assert_eq!(config.baudrate(), 115_200);
        assert!(config.erase() && config.write() && config.verify());
        assert!(!config.read());
        assert_eq!(config.address(), None);
        assert_eq!(config.unique_address(), None);
        assert!(!config.force_speed());
        assert!(config.needs_image());
    }

    #[test]
    fn test_validation() {
        assert_eq!(FlashConfig::builder("").build(), Err(ConfigError::EmptyPort));
        assert_eq!(
            FlashConfig::builder("/dev/ttyUSB0").baudrate(0).build(),
            Err(ConfigError::ZeroBaudrate)
        );
        assert_eq!(
            FlashConfig::builder("/dev/ttyUSB0").read(0, "out.bin").build(),
            Err(ConfigError::ZeroReadLength)
        );
        assert_eq!(
            FlashConfig::builder("/dev/ttyUSB0")
                .address(0x101)
                .read(4, "out.bin")
                .build(),
            Err(ConfigError::UnalignedReadAddress(0x101))
        );
        assert!(FlashConfig::builder("/dev/ttyUSB0")
            .address(0x101)
            .write(true)
            .build()
            .is_ok());
        assert_eq!(
            FlashConfig::builder("/dev/ttyUSB0").unique_address(0).build(),
            Err(ConfigError::ZeroUniqueAddress)
        );

        let config = FlashConfig::builder("/dev/ttyUSB0").build().unwrap();
        assert!(!config.needs_image());
    }

    #[test]
    fn test_parse_ieee_address() {
        assert_eq!(
            parse_ieee_address("00:12:4b:00:01:02:03:04").unwrap(),
            0x0012_4B00_0102_0304
        );
        assert_eq!(parse_ieee_address("0x00124b0001020304").unwrap(), 0x0012_4B00_0102_0304);
        assert!(parse_ieee_address("00:12:4b").is_err());
        assert!(parse_ieee_address("zz").is_err());
    }

    #[test]
    fn test_format_ieee_address() {
        assert_eq!(format_ieee_address(0x0012_4B00_0102_0304), "00:12:4b:00:01:02:03:04");
    }
}
